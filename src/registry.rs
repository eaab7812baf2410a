//! Typeregistry: koppelt typenamen aan veldconstructors.
//!
//! De registry wordt één keer bij opstart gevuld (de ingebouwde operatoren
//! via [`TypeRegistry::default`], uitbreidingen via
//! [`TypeRegistry::register`]) en is daarna alleen-lezen; er worden tijdens
//! normale werking nooit registraties verwijderd.

use std::collections::BTreeMap;

use crate::field::{FieldDefinition, FieldHandle};
use crate::operators::component_ops::{self, OperatorKind};
use crate::operators::{ConstructionError, OperatorBehavior};
use std::rc::Rc;

/// Tekstuele argumenten van een define-commando: bronveldnamen en
/// parameterwaarden, zoals de commandolaag ze aanlevert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeArguments {
    /// Namen van de bronvelden, in operatorvolgorde.
    pub fields: Vec<String>,
    /// Scalaire parameters; leeg betekent "gebruik de standaardwaarden".
    pub parameters: Vec<f64>,
}

/// Zoekt een bestaand veld op naam op; aangeleverd door de beheerlaag.
pub type SourceLookup<'a> = dyn Fn(&str) -> Option<FieldHandle> + 'a;

/// Constructor die tekstuele argumenten omzet in een velddefinitie.
pub type Constructor =
    Box<dyn Fn(&TypeArguments, &SourceLookup<'_>) -> Result<FieldDefinition, ConstructionError>>;

/// Procesbrede registry van veldtypen.
pub struct TypeRegistry {
    constructors: BTreeMap<String, Constructor>,
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.type_names())
            .finish()
    }
}

impl Default for TypeRegistry {
    /// Registry met alle ingebouwde componentoperatoren.
    fn default() -> Self {
        let mut registry = Self::new();
        for registration in component_ops::REGISTRATIONS {
            registry
                .register(registration.type_name, builtin_constructor(registration.kind))
                .unwrap_or_else(|_| {
                    unreachable!("ingebouwde typenamen zijn uniek");
                });
        }
        registry
    }
}

impl TypeRegistry {
    /// Lege registry, zonder ingebouwde typen.
    #[must_use]
    pub fn new() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Registreer een constructor onder een typenaam. Een al geregistreerde
    /// naam wordt nooit stil overschreven.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        constructor: Constructor,
    ) -> Result<(), ConstructionError> {
        let name = name.into();
        if self.constructors.contains_key(&name) {
            return Err(ConstructionError::DuplicateTypeName { name });
        }
        self.constructors.insert(name, constructor);
        Ok(())
    }

    /// Registreer een [`OperatorBehavior`]-uitbreiding onder zijn eigen
    /// typenaam, met een standaardconstructor die bronnen opzoekt en de
    /// parameters doorgeeft.
    pub fn register_behavior(
        &mut self,
        behavior: Rc<dyn OperatorBehavior>,
    ) -> Result<(), ConstructionError> {
        let name = behavior.type_name().to_owned();
        self.register(
            name,
            Box::new(move |arguments, lookup| {
                let sources = resolve_sources(&arguments.fields, lookup)?;
                Ok(FieldDefinition::extension(
                    Rc::clone(&behavior),
                    sources,
                    arguments.parameters.clone(),
                ))
            }),
        )
    }

    /// Bouw een velddefinitie uit tekstuele argumenten. Onbekende typenamen
    /// geven een onderscheidbare fout.
    pub fn construct(
        &self,
        name: &str,
        arguments: &TypeArguments,
        lookup: &SourceLookup<'_>,
    ) -> Result<FieldDefinition, ConstructionError> {
        let constructor =
            self.constructors
                .get(name)
                .ok_or_else(|| ConstructionError::UnknownTypeName {
                    name: name.to_owned(),
                })?;
        constructor(arguments, lookup)
    }

    /// Is de typenaam geregistreerd?
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Alle geregistreerde typenamen, gesorteerd.
    #[must_use]
    pub fn type_names(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }
}

fn resolve_sources(
    names: &[String],
    lookup: &SourceLookup<'_>,
) -> Result<Vec<FieldHandle>, ConstructionError> {
    names
        .iter()
        .map(|name| {
            lookup(name).ok_or_else(|| ConstructionError::UnknownSource { name: name.clone() })
        })
        .collect()
}

/// Constructor voor een ingebouwde operator: lost bronnen op en vult een
/// weggelaten parameterlijst met de standaardwaarde van het type.
fn builtin_constructor(kind: OperatorKind) -> Constructor {
    Box::new(move |arguments, lookup| {
        let sources = resolve_sources(&arguments.fields, lookup)?;
        if sources.len() != kind.source_count() {
            return Err(ConstructionError::SourceCountMismatch {
                type_name: kind.type_name().to_owned(),
                expected: kind.source_count(),
                actual: sources.len(),
            });
        }

        let parameters = if arguments.parameters.is_empty() {
            let source_counts: Vec<usize> = sources
                .iter()
                .map(|source| source.borrow().component_count())
                .collect();
            vec![kind.default_parameter(); kind.parameter_count(&source_counts)]
        } else {
            arguments.parameters.clone()
        };

        Ok(FieldDefinition::builtin(kind, sources, parameters))
    })
}
