#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod command;
pub mod field;
pub mod leaf;
pub mod location;
pub mod operators;
pub mod registry;

use std::collections::BTreeMap;
use std::rc::Rc;

use thiserror::Error;

use command::{CommandError, DefineFieldCommand};
use field::evaluator::{self, EvaluationError, InversionError};
use field::{Field, FieldDefinition, FieldHandle, FieldSummary, FieldValues};
use leaf::LeafBacking;
use location::EvaluationLocation;
use operators::ConstructionError;
use registry::TypeRegistry;

/// Fouten van de engine-facade.
#[derive(Debug, Error)]
pub enum EngineError {
    /// De gevraagde veldnaam is niet gedefinieerd.
    #[error("onbekend veld `{0}`")]
    UnknownField(String),
    /// Het commando kon niet geparseerd worden.
    #[error(transparent)]
    Command(#[from] CommandError),
    /// De velddefinitie was structureel ongeldig.
    #[error(transparent)]
    Construction(#[from] ConstructionError),
    /// De evaluatie faalde; het veld is op die locatie niet gedefinieerd.
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    /// Het terugschrijven van waarden faalde; er is niets geschreven.
    #[error(transparent)]
    Inversion(#[from] InversionError),
}

/// Beheer van benoemde velden rond de evaluatiegraaf.
///
/// De engine houdt een tabel naam → veld bij, vertaalt tekstuele
/// define-commando's naar veldconstructies via de typeregistry en biedt de
/// evaluatie-, terugschrijf- en invalidatie-operaties aan omringende lagen
/// aan. Caches zijn per veld; de engine volgt zelf geen omgekeerde
/// afhankelijkheden en verwacht dat de beheerlaag na een wijziging alle
/// stroomafwaartse velden invalideert.
#[derive(Debug)]
pub struct FieldEngine {
    registry: TypeRegistry,
    fields: BTreeMap<String, FieldHandle>,
}

impl Default for FieldEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldEngine {
    /// Engine met de ingebouwde operatortypen.
    #[must_use]
    pub fn new() -> Self {
        Self::with_registry(TypeRegistry::default())
    }

    /// Engine met een eigen (bv. uitgebreide) registry.
    #[must_use]
    pub fn with_registry(registry: TypeRegistry) -> Self {
        Self {
            registry,
            fields: BTreeMap::new(),
        }
    }

    /// De typeregistry.
    #[must_use]
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Muteerbare toegang tot de registry, voor het registreren van
    /// uitbreidingstypen bij opstart.
    pub fn registry_mut(&mut self) -> &mut TypeRegistry {
        &mut self.registry
    }

    /// Definieer (of herdefinieer) een leaf-veld met de opgegeven backing.
    ///
    /// Een herdefinitie die het componentaantal zou wijzigen wordt geweigerd
    /// zolang er velden van de leaf afhangen; die zouden anders pas bij de
    /// volgende evaluatie op een componentfout stuklopen.
    pub fn define_leaf(
        &mut self,
        name: impl Into<String>,
        backing: Box<dyn LeafBacking>,
    ) -> Result<FieldHandle, EngineError> {
        let name = name.into();
        if let Some(existing) = self.fields.get(&name).cloned() {
            let expected = existing.borrow().component_count();
            let actual = backing.component_count();
            if actual != expected
                && self
                    .fields
                    .values()
                    .any(|field| field::depends_on(field, &existing))
            {
                return Err(EngineError::Construction(
                    ConstructionError::ComponentCountChanged {
                        field: name,
                        expected,
                        actual,
                    },
                ));
            }
            log::warn!("leaf-veld `{name}` wordt geherdefinieerd");
            field::set_type(&existing, FieldDefinition::leaf(backing))?;
            return Ok(existing);
        }
        let handle = Field::leaf(name.clone(), backing);
        self.fields.insert(name, Rc::clone(&handle));
        Ok(handle)
    }

    /// Voer een tekstueel `define field`-commando uit.
    pub fn execute(&mut self, input: &str) -> Result<FieldHandle, EngineError> {
        log::debug!("commando: {input}");
        let command = command::parse(input)?;
        self.define(command)
    }

    /// Definieer (of herdefinieer) een veld uit een geparseerd commando.
    ///
    /// Herdefinitie verloopt via [`field::set_type`] en is dus atomair: bij
    /// een fout blijft de bestaande definitie, inclusief cache, intact.
    pub fn define(&mut self, command: DefineFieldCommand) -> Result<FieldHandle, EngineError> {
        let definition = {
            let fields = &self.fields;
            let lookup = |name: &str| fields.get(name).map(Rc::clone);
            self.registry
                .construct(&command.type_name, &command.arguments, &lookup)?
        };

        if let Some(existing) = self.fields.get(&command.name).cloned() {
            log::warn!("veld `{}` wordt geherdefinieerd", command.name);
            field::set_type(&existing, definition)?;
            return Ok(existing);
        }

        let handle = Field::define(command.name.clone(), definition)?;
        self.fields.insert(command.name, Rc::clone(&handle));
        Ok(handle)
    }

    /// Vervang de definitie van een bestaand veld atomair.
    pub fn set_type(&self, name: &str, definition: FieldDefinition) -> Result<(), EngineError> {
        let handle = self.handle(name)?;
        field::set_type(&handle, definition)?;
        Ok(())
    }

    /// Zoek een veld op naam op.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<FieldHandle> {
        self.fields.get(name).cloned()
    }

    /// Evalueer een veld op een locatie.
    pub fn evaluate(
        &self,
        name: &str,
        location: &EvaluationLocation,
        want_derivatives: bool,
    ) -> Result<FieldValues, EngineError> {
        let handle = self.handle(name)?;
        Ok(evaluator::evaluate(&handle, location, want_derivatives)?)
    }

    /// Schrijf waarden terug door de inverteerbare keten van een veld.
    pub fn set_values(
        &self,
        name: &str,
        location: &EvaluationLocation,
        values: &[f64],
    ) -> Result<(), EngineError> {
        let handle = self.handle(name)?;
        Ok(evaluator::set_values(&handle, location, values)?)
    }

    /// Maak de cache van één veld leeg.
    pub fn invalidate(&self, name: &str) -> Result<(), EngineError> {
        let handle = self.handle(name)?;
        evaluator::invalidate(&handle);
        Ok(())
    }

    /// Maak alle caches leeg, bv. na een bulkwijziging in de meshdata.
    pub fn clear_caches(&self) {
        for handle in self.fields.values() {
            handle.borrow_mut().invalidate();
        }
    }

    /// Eénregelige beschrijving van een veld in commandostijl.
    pub fn describe(&self, name: &str) -> Result<String, EngineError> {
        let handle = self.handle(name)?;
        let description = handle.borrow().describe();
        Ok(description)
    }

    /// Samenvattingen van alle velden, gesorteerd op naam.
    #[must_use]
    pub fn summaries(&self) -> Vec<FieldSummary> {
        self.fields
            .values()
            .map(|handle| handle.borrow().summary())
            .collect()
    }

    /// Aantal gedefinieerde velden.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    fn handle(&self, name: &str) -> Result<FieldHandle, EngineError> {
        self.fields
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownField(name.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::{EngineError, FieldEngine};
    use crate::leaf::NodalLeaf;
    use crate::location::EvaluationLocation;
    use crate::operators::ConstructionError;

    fn engine_with_leaf(name: &str, node: usize, values: Vec<f64>) -> FieldEngine {
        let mut engine = FieldEngine::new();
        let mut backing = NodalLeaf::new(values.len());
        backing.set_node(node, values).unwrap();
        engine.define_leaf(name, Box::new(backing)).unwrap();
        engine
    }

    #[test]
    fn execute_defines_and_evaluates_a_field() {
        let mut engine = engine_with_leaf("coordinates", 0, vec![1.0, 2.0]);
        engine
            .execute("define field scaled type scale fields coordinates scale_factors 2 3")
            .expect("geldig commando");

        let location = EvaluationLocation::at_node(0, 0.0);
        let result = engine.evaluate("scaled", &location, false).unwrap();
        assert_eq!(result.values, vec![2.0, 6.0]);
    }

    #[test]
    fn unknown_field_is_reported_by_name() {
        let engine = FieldEngine::new();
        let location = EvaluationLocation::at_node(0, 0.0);
        let err = engine
            .evaluate("nergens", &location, false)
            .expect_err("veld bestaat niet");
        assert!(matches!(err, EngineError::UnknownField(name) if name == "nergens"));
    }

    #[test]
    fn describe_round_trips_through_the_command_style() {
        let mut engine = engine_with_leaf("coordinates", 0, vec![1.0]);
        engine
            .execute("define field shifted type offset fields coordinates offsets 5")
            .unwrap();
        assert_eq!(
            engine.describe("shifted").unwrap(),
            "offset fields coordinates offsets 5"
        );
    }

    #[test]
    fn redefinition_is_atomic() {
        let mut engine = engine_with_leaf("a", 0, vec![1.0, 2.0]);
        engine
            .execute("define field f type scale fields a scale_factors 2 2")
            .unwrap();

        // herdefinitie met een onbekende bron faalt en laat `f` intact
        let err = engine
            .execute("define field f type offset fields bestaat_niet")
            .expect_err("bron ontbreekt");
        assert!(matches!(err, EngineError::Construction(_)));

        let location = EvaluationLocation::at_node(0, 0.0);
        let result = engine.evaluate("f", &location, false).unwrap();
        assert_eq!(result.values, vec![2.0, 4.0]);
    }

    #[test]
    fn leaf_redefinition_cannot_change_component_count_under_dependents() {
        let mut engine = engine_with_leaf("a", 0, vec![1.0, 2.0]);
        engine
            .execute("define field f type scale fields a scale_factors 2 2")
            .unwrap();

        let err = engine
            .define_leaf("a", Box::new(NodalLeaf::new(3)))
            .expect_err("f hangt van a af");
        assert!(matches!(
            err,
            EngineError::Construction(ConstructionError::ComponentCountChanged {
                expected: 2,
                actual: 3,
                ..
            })
        ));

        // de oude backing blijft staan en `f` blijft gewoon evalueerbaar
        let location = EvaluationLocation::at_node(0, 0.0);
        let result = engine.evaluate("f", &location, false).unwrap();
        assert_eq!(result.values, vec![2.0, 4.0]);

        // zonder afhankelijke velden mag het componentaantal wel veranderen
        engine.define_leaf("b", Box::new(NodalLeaf::new(1))).unwrap();
        engine.define_leaf("b", Box::new(NodalLeaf::new(4))).unwrap();
        assert_eq!(engine.field("b").unwrap().borrow().component_count(), 4);
    }

    #[test]
    fn summaries_list_fields_in_name_order() {
        let mut engine = engine_with_leaf("b", 0, vec![1.0]);
        let mut backing = NodalLeaf::new(1);
        backing.set_node(0, vec![2.0]).unwrap();
        engine.define_leaf("a", Box::new(backing)).unwrap();

        let names: Vec<String> = engine
            .summaries()
            .into_iter()
            .map(|summary| summary.name)
            .collect();
        assert_eq!(names, vec!["a".to_owned(), "b".to_owned()]);
    }
}
