//! Operatorgedrag van velden: ingebouwde soorten en uitbreidingen.
//!
//! Ingebouwde operatoren vormen een gesloten enum zodat de dispatch
//! exhaustief blijft; via [`OperatorBehavior`] kunnen externe crates eigen
//! soorten aanleveren zonder de graph-machinerie te wijzigen.

use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::field::FieldValues;
use crate::field::evaluator::InversionError;
use crate::leaf::LeafBacking;

pub mod component_ops;

/// Fouten bij het opbouwen of herdefiniëren van een veld.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConstructionError {
    /// Het aantal bronvelden past niet bij het operatortype.
    #[error("type `{type_name}` verwacht {expected} bronvelden, kreeg {actual}")]
    SourceCountMismatch {
        type_name: String,
        expected: usize,
        actual: usize,
    },
    /// Bronvelden hebben onderling verschillende componentaantallen.
    #[error("bronvelden van `{type_name}` hebben ongelijke componentaantallen ({left} en {right})")]
    SourceComponentMismatch {
        type_name: String,
        left: usize,
        right: usize,
    },
    /// De parameterlijst heeft niet de vereiste lengte.
    #[error("type `{type_name}` verwacht {expected} parameters, kreeg {actual}")]
    ParameterCountMismatch {
        type_name: String,
        expected: usize,
        actual: usize,
    },
    /// Een bronveld kon niet op naam gevonden worden.
    #[error("bronveld `{name}` is niet gevonden")]
    UnknownSource { name: String },
    /// De typenaam is al in de registry aanwezig.
    #[error("typenaam `{name}` is al geregistreerd")]
    DuplicateTypeName { name: String },
    /// De typenaam komt niet in de registry voor.
    #[error("onbekend veldtype `{name}`")]
    UnknownTypeName { name: String },
    /// De nieuwe definitie zou het veld (indirect) tot zijn eigen bron maken.
    #[error("veld `{field}` zou zichzelf (indirect) als bron krijgen")]
    CyclicDefinition { field: String },
    /// Een leaf-definitie kreeg bronnen of parameters mee.
    #[error("leaf-type `{type_name}` verwacht geen bronvelden of parameters")]
    LeafTakesNoSources { type_name: String },
    /// Een herdefinitie zou het componentaantal wijzigen terwijl er nog
    /// velden van dit veld afhangen.
    #[error(
        "veld `{field}` heeft afhankelijke velden en kan niet van {expected} naar {actual} componenten"
    )]
    ComponentCountChanged {
        field: String,
        expected: usize,
        actual: usize,
    },
}

/// Fouten die een operator tijdens de voorwaartse evaluatie kan melden.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OperatorError {
    /// Deling door nul; het veld is op deze locatie niet gedefinieerd.
    #[error("deling door nul in component {component}")]
    DivideByZero { component: usize },
    /// Bronwaarden met een onverwachte lengte. Dit wijst op een interne
    /// inconsistentie: de constructie-invariant sluit dit normaal uit.
    #[error("bronwaarden hebben {actual} componenten waar er {expected} verwacht worden")]
    ComponentMismatch { expected: usize, actual: usize },
}

/// Interface voor operatorsoorten die van buitenaf geregistreerd worden.
///
/// De evaluator roept [`OperatorBehavior::evaluate`] pas aan nadat alle
/// bronvelden op dezelfde locatie geëvalueerd zijn; `xi_dimension` is de
/// parametrische dimensie van de locatie wanneer afgeleiden gevraagd zijn,
/// anders `None`.
pub trait OperatorBehavior: fmt::Debug {
    /// Typenaam zoals die in de registry en in listings verschijnt.
    fn type_name(&self) -> &str;

    /// Sleutelwoord waaronder de parameters in het define-commando staan.
    fn parameter_keyword(&self) -> Option<&str> {
        None
    }

    /// Controleer bron- en parameteraantallen en bepaal het componentaantal
    /// van het veld.
    fn validate(
        &self,
        source_counts: &[usize],
        parameters: &[f64],
    ) -> Result<usize, ConstructionError>;

    /// Combineer bronwaarden (en, indien beschikbaar, hun afgeleiden) tot het
    /// veldresultaat.
    fn evaluate(
        &self,
        parameters: &[f64],
        component_count: usize,
        xi_dimension: Option<usize>,
        sources: &[FieldValues],
    ) -> Result<FieldValues, OperatorError>;

    /// Bepaal de bronwaarden die tot de opgegeven veldwaarden zouden leiden.
    /// Standaard is een operator niet inverteerbaar.
    fn invert(&self, parameters: &[f64], values: &[f64]) -> Result<Vec<f64>, InversionError> {
        let _ = (parameters, values);
        Err(InversionError::NotInvertible {
            type_name: self.type_name().to_owned(),
        })
    }
}

/// Het gedrag van een veld: ingebouwd, uitbreiding of leaf.
#[derive(Debug)]
pub enum Operator {
    /// Een van de ingebouwde componentoperatoren.
    Builtin(component_ops::OperatorKind),
    /// Een via de registry aangeleverd gedrag.
    Extension(Rc<dyn OperatorBehavior>),
    /// Een leaf-veld dat rechtstreeks uit meshdata leest.
    Leaf(Box<dyn LeafBacking>),
}

impl Operator {
    /// Typenaam van dit gedrag.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::Builtin(kind) => kind.type_name(),
            Self::Extension(behavior) => behavior.type_name(),
            Self::Leaf(backing) => backing.type_name(),
        }
    }

    /// Sleutelwoord voor de parameters in listings en commando's.
    #[must_use]
    pub fn parameter_keyword(&self) -> Option<&str> {
        match self {
            Self::Builtin(kind) => kind.parameter_keyword(),
            Self::Extension(behavior) => behavior.parameter_keyword(),
            Self::Leaf(_) => None,
        }
    }

    /// Is dit een leaf-veld?
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }

    /// Controleer een definitie en bepaal het componentaantal.
    pub fn validate(
        &self,
        source_counts: &[usize],
        parameters: &[f64],
    ) -> Result<usize, ConstructionError> {
        match self {
            Self::Builtin(kind) => kind.validate(source_counts, parameters),
            Self::Extension(behavior) => behavior.validate(source_counts, parameters),
            Self::Leaf(backing) => {
                if source_counts.is_empty() && parameters.is_empty() {
                    Ok(backing.component_count())
                } else {
                    Err(ConstructionError::LeafTakesNoSources {
                        type_name: backing.type_name().to_owned(),
                    })
                }
            }
        }
    }

    /// Inverse van de operator; leaf-velden schrijven rechtstreeks en komen
    /// hier niet langs.
    pub fn invert(&self, parameters: &[f64], values: &[f64]) -> Result<Vec<f64>, InversionError> {
        match self {
            Self::Builtin(kind) => kind.invert(parameters, values),
            Self::Extension(behavior) => behavior.invert(parameters, values),
            Self::Leaf(backing) => Err(InversionError::NotInvertible {
                type_name: backing.type_name().to_owned(),
            }),
        }
    }
}
