//! Veldknopen: de hoekpunten van de evaluatiegraaf.
//!
//! Een veld bestaat uit een componentaantal, een geordende lijst bronvelden,
//! scalaire parameters, een operator en een cache. Velden worden gedeeld via
//! referentietelling ([`FieldHandle`]); de graaf is altijd een DAG en een
//! herdefinitie via [`set_type`] is atomair.

use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::Rc;

use serde::Serialize;

use crate::leaf::LeafBacking;
use crate::operators::{ConstructionError, Operator, OperatorBehavior, component_ops};

pub mod cache;
pub mod evaluator;

use cache::FieldCache;

/// Gedeeld eigenaarschap van een veld. Eén logische controlelijn per regio;
/// interne mutabiliteit blijft beperkt tot evaluatie, terugschrijven en
/// herdefinitie.
pub type FieldHandle = Rc<RefCell<Field>>;

/// Resultaat van een veldevaluatie.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValues {
    /// De componentwaarden.
    pub values: Vec<f64>,
    /// Afgeleidenblok van `component_count * D` waarden, alleen aanwezig als
    /// elke betrokken bron geldige afgeleiden leverde.
    pub derivatives: Option<Vec<f64>>,
}

/// Een knoop in de veldgraaf.
#[derive(Debug)]
pub struct Field {
    name: String,
    component_count: usize,
    pub(crate) sources: Vec<FieldHandle>,
    pub(crate) parameters: Vec<f64>,
    pub(crate) operator: Operator,
    pub(crate) cache: FieldCache,
}

/// Een gevalideerde-of-nog-te-valideren velddefinitie: operator, bronnen en
/// parameters. Wordt door [`Field::define`] en [`set_type`] geconsumeerd.
#[derive(Debug)]
pub struct FieldDefinition {
    pub operator: Operator,
    pub sources: Vec<FieldHandle>,
    pub parameters: Vec<f64>,
}

impl FieldDefinition {
    /// Definitie met een ingebouwde operator.
    #[must_use]
    pub fn builtin(
        kind: component_ops::OperatorKind,
        sources: Vec<FieldHandle>,
        parameters: Vec<f64>,
    ) -> Self {
        Self {
            operator: Operator::Builtin(kind),
            sources,
            parameters,
        }
    }

    /// Definitie met een extern aangeleverd operatorgedrag.
    #[must_use]
    pub fn extension(
        behavior: Rc<dyn OperatorBehavior>,
        sources: Vec<FieldHandle>,
        parameters: Vec<f64>,
    ) -> Self {
        Self {
            operator: Operator::Extension(behavior),
            sources,
            parameters,
        }
    }

    /// Definitie van een leaf-veld.
    #[must_use]
    pub fn leaf(backing: Box<dyn LeafBacking>) -> Self {
        Self {
            operator: Operator::Leaf(backing),
            sources: Vec::new(),
            parameters: Vec::new(),
        }
    }

    /// Controleer alle structurele randvoorwaarden en bepaal het
    /// componentaantal dat het veld zou krijgen.
    pub fn validated_component_count(&self) -> Result<usize, ConstructionError> {
        let source_counts: Vec<usize> = self
            .sources
            .iter()
            .map(|source| source.borrow().component_count())
            .collect();
        self.operator.validate(&source_counts, &self.parameters)
    }
}

impl Field {
    /// Maak een leaf-veld aan dat rechtstreeks uit een backing leest.
    #[must_use]
    pub fn leaf(name: impl Into<String>, backing: Box<dyn LeafBacking>) -> FieldHandle {
        let component_count = backing.component_count();
        Rc::new(RefCell::new(Self {
            name: name.into(),
            component_count,
            sources: Vec::new(),
            parameters: Vec::new(),
            operator: Operator::Leaf(backing),
            cache: FieldCache::new(),
        }))
    }

    /// Maak een nieuw veld aan op basis van een definitie.
    pub fn define(
        name: impl Into<String>,
        definition: FieldDefinition,
    ) -> Result<FieldHandle, ConstructionError> {
        let component_count = definition.validated_component_count()?;
        Ok(Rc::new(RefCell::new(Self {
            name: name.into(),
            component_count,
            sources: definition.sources,
            parameters: definition.parameters,
            operator: definition.operator,
            cache: FieldCache::new(),
        })))
    }

    /// Naam van het veld.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Aantal componenten.
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.component_count
    }

    /// De bronvelden, in operatorvolgorde.
    #[must_use]
    pub fn sources(&self) -> &[FieldHandle] {
        &self.sources
    }

    /// De scalaire parameters.
    #[must_use]
    pub fn parameters(&self) -> &[f64] {
        &self.parameters
    }

    /// Het operatorgedrag.
    #[must_use]
    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    /// De evaluatiecache.
    #[must_use]
    pub fn cache(&self) -> &FieldCache {
        &self.cache
    }

    /// Maak de cache leeg. Aan te roepen wanneer bovenliggende definities of
    /// onderliggende meshdata veranderen.
    pub fn invalidate(&mut self) {
        self.cache.clear();
    }

    /// Eénregelige beschrijving in commandostijl: typenaam, bronnamen en
    /// parameterwaarden.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut description = self.operator.type_name().to_owned();
        if !self.sources.is_empty() {
            description.push_str(" fields");
            for source in &self.sources {
                let _ = write!(description, " {}", source.borrow().name());
            }
        }
        if !self.parameters.is_empty() {
            let _ = write!(
                description,
                " {}",
                self.operator.parameter_keyword().unwrap_or("parameters")
            );
            for parameter in &self.parameters {
                let _ = write!(description, " {parameter}");
            }
        }
        description
    }

    /// Gestructureerde samenvatting voor listings.
    #[must_use]
    pub fn summary(&self) -> FieldSummary {
        FieldSummary {
            name: self.name.clone(),
            type_name: self.operator.type_name().to_owned(),
            component_count: self.component_count,
            sources: self
                .sources
                .iter()
                .map(|source| source.borrow().name().to_owned())
                .collect(),
            parameters: self.parameters.clone(),
        }
    }
}

/// Samenvatting van een veld voor listings en API-grenzen.
#[derive(Debug, Clone, Serialize)]
pub struct FieldSummary {
    pub name: String,
    pub type_name: String,
    pub component_count: usize,
    pub sources: Vec<String>,
    pub parameters: Vec<f64>,
}

/// Vervang operator, bronnen en parameters van een bestaand veld in één
/// atomaire stap.
///
/// Bij elke fout blijft het veld exact zoals het was, inclusief cache; pas
/// wanneer alle randvoorwaarden (componentregels, parameterlengtes, geen
/// cykels) zijn gecontroleerd, wordt de definitie verwisseld en de cache
/// geleegd. De vorige bronnen verliezen hun referentie en worden vrijgegeven
/// zodra niemand ze nog vasthoudt.
pub fn set_type(
    handle: &FieldHandle,
    definition: FieldDefinition,
) -> Result<(), ConstructionError> {
    let component_count = definition.validated_component_count()?;

    for source in &definition.sources {
        if Rc::ptr_eq(source, handle) || depends_on(source, handle) {
            return Err(ConstructionError::CyclicDefinition {
                field: handle.borrow().name().to_owned(),
            });
        }
    }

    let mut field = handle.borrow_mut();
    log::debug!(
        "veld `{}` krijgt type `{}`",
        field.name,
        definition.operator.type_name()
    );
    field.operator = definition.operator;
    field.sources = definition.sources;
    field.parameters = definition.parameters;
    field.component_count = component_count;
    field.cache.clear();
    Ok(())
}

/// Hangt `field` (direct of transitief) van `target` af?
#[must_use]
pub fn depends_on(field: &FieldHandle, target: &FieldHandle) -> bool {
    field
        .borrow()
        .sources
        .iter()
        .any(|source| Rc::ptr_eq(source, target) || depends_on(source, target))
}
