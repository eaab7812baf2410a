//! De ingebouwde componentoperatoren: vermenigvuldigen, delen, gewogen
//! optellen, schalen, klemmen, verschuiven en sommeren van componenten.
//!
//! Alle operatoren werken componentsgewijs: `values[i]` volgt uit de i-de
//! componenten van de bronnen en de parameters. Afgeleiden lopen per
//! component over de parametrische dimensie `D` van de locatie en volgen de
//! bijbehorende product-, quotiënt- of kettingregel.

use crate::field::FieldValues;
use crate::field::evaluator::InversionError;

use super::{ConstructionError, OperatorError};

/// De beschikbare ingebouwde operatorsoorten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorKind {
    /// `a[i] * b[i]`
    MultiplyComponents,
    /// `a[i] / b[i]`; deling door nul is een evaluatiefout.
    DivideComponents,
    /// `s1*a[i] + s2*b[i]` met schaalfactoren als parameters.
    Add,
    /// `p[i] * a[i]`; inverteerbaar zolang geen factor nul is.
    Scale,
    /// `min(a[i], p[i])`; de afgeleide valt pas weg boven de limiet.
    ClampMaximum,
    /// `max(a[i], p[i])`; de afgeleide valt pas weg onder de limiet.
    ClampMinimum,
    /// `a[i] + p[i]`; altijd inverteerbaar.
    Offset,
    /// `Σ p[i]*a[i]`, reduceert tot één component.
    SumComponents,
}

/// Registratiegegevens voor de typeregistry.
#[derive(Debug, Clone, Copy)]
pub struct Registration {
    pub type_name: &'static str,
    pub kind: OperatorKind,
}

/// Volledige lijst van ingebouwde operatorregistraties.
pub const REGISTRATIONS: &[Registration] = &[
    Registration {
        type_name: "multiply_components",
        kind: OperatorKind::MultiplyComponents,
    },
    Registration {
        type_name: "divide_components",
        kind: OperatorKind::DivideComponents,
    },
    Registration {
        type_name: "add",
        kind: OperatorKind::Add,
    },
    Registration {
        type_name: "scale",
        kind: OperatorKind::Scale,
    },
    Registration {
        type_name: "clamp_maximum",
        kind: OperatorKind::ClampMaximum,
    },
    Registration {
        type_name: "clamp_minimum",
        kind: OperatorKind::ClampMinimum,
    },
    Registration {
        type_name: "offset",
        kind: OperatorKind::Offset,
    },
    Registration {
        type_name: "sum_components",
        kind: OperatorKind::SumComponents,
    },
];

impl OperatorKind {
    /// Typenaam zoals gebruikt in registry, listings en commando's.
    #[must_use]
    pub fn type_name(self) -> &'static str {
        match self {
            Self::MultiplyComponents => "multiply_components",
            Self::DivideComponents => "divide_components",
            Self::Add => "add",
            Self::Scale => "scale",
            Self::ClampMaximum => "clamp_maximum",
            Self::ClampMinimum => "clamp_minimum",
            Self::Offset => "offset",
            Self::SumComponents => "sum_components",
        }
    }

    /// Aantal bronvelden dat deze operator verwacht.
    #[must_use]
    pub fn source_count(self) -> usize {
        match self {
            Self::MultiplyComponents | Self::DivideComponents | Self::Add => 2,
            Self::Scale
            | Self::ClampMaximum
            | Self::ClampMinimum
            | Self::Offset
            | Self::SumComponents => 1,
        }
    }

    /// Sleutelwoord waaronder de parameters in het define-commando staan.
    #[must_use]
    pub fn parameter_keyword(self) -> Option<&'static str> {
        match self {
            Self::MultiplyComponents | Self::DivideComponents => None,
            Self::Add | Self::Scale => Some("scale_factors"),
            Self::ClampMaximum => Some("maximums"),
            Self::ClampMinimum => Some("minimums"),
            Self::Offset => Some("offsets"),
            Self::SumComponents => Some("weights"),
        }
    }

    /// Vereiste parameterlengte, gegeven de componentaantallen van de bronnen.
    #[must_use]
    pub fn parameter_count(self, source_counts: &[usize]) -> usize {
        match self {
            Self::MultiplyComponents | Self::DivideComponents => 0,
            Self::Add => 2,
            Self::Scale
            | Self::ClampMaximum
            | Self::ClampMinimum
            | Self::Offset
            | Self::SumComponents => source_counts.first().copied().unwrap_or(0),
        }
    }

    /// Waarde waarmee een weggelaten parameterlijst wordt opgevuld.
    #[must_use]
    pub fn default_parameter(self) -> f64 {
        match self {
            Self::MultiplyComponents
            | Self::DivideComponents
            | Self::Add
            | Self::Scale
            | Self::ClampMaximum
            | Self::SumComponents => 1.0,
            Self::ClampMinimum | Self::Offset => 0.0,
        }
    }

    /// Controleer bron- en parameteraantallen; geeft het componentaantal van
    /// het veld terug.
    pub fn validate(
        self,
        source_counts: &[usize],
        parameters: &[f64],
    ) -> Result<usize, ConstructionError> {
        let expected_sources = self.source_count();
        if source_counts.len() != expected_sources {
            return Err(ConstructionError::SourceCountMismatch {
                type_name: self.type_name().to_owned(),
                expected: expected_sources,
                actual: source_counts.len(),
            });
        }

        if expected_sources == 2 && source_counts[0] != source_counts[1] {
            return Err(ConstructionError::SourceComponentMismatch {
                type_name: self.type_name().to_owned(),
                left: source_counts[0],
                right: source_counts[1],
            });
        }

        let expected_parameters = self.parameter_count(source_counts);
        if parameters.len() != expected_parameters {
            return Err(ConstructionError::ParameterCountMismatch {
                type_name: self.type_name().to_owned(),
                expected: expected_parameters,
                actual: parameters.len(),
            });
        }

        Ok(match self {
            Self::SumComponents => 1,
            _ => source_counts[0],
        })
    }

    /// Voorwaartse evaluatie: combineer de bronresultaten tot het veld.
    ///
    /// `xi_dimension` is `Some(D)` wanneer afgeleiden gevraagd zijn op een
    /// continue locatie; afgeleiden worden alleen meegegeven als elke bron
    /// een geldig afgeleidenblok aanlevert.
    pub fn evaluate(
        self,
        parameters: &[f64],
        component_count: usize,
        xi_dimension: Option<usize>,
        sources: &[FieldValues],
    ) -> Result<FieldValues, OperatorError> {
        for source in sources {
            let expected = match self {
                Self::SumComponents => parameters.len(),
                _ => component_count,
            };
            if source.values.len() != expected {
                return Err(OperatorError::ComponentMismatch {
                    expected,
                    actual: source.values.len(),
                });
            }
        }

        // Afgeleiden alleen doorgeven als elke bron ze geldig aanlevert;
        // ongeldigheid propageert als "geen afgeleiden", nooit als vuilnis.
        let dimension = xi_dimension
            .filter(|_| sources.iter().all(|source| source.derivatives.is_some()));

        match self {
            Self::MultiplyComponents => Ok(multiply(sources, component_count, dimension)),
            Self::DivideComponents => divide(sources, component_count, dimension),
            Self::Add => Ok(weighted_add(parameters, sources, component_count, dimension)),
            Self::Scale => Ok(scale(parameters, sources, component_count, dimension)),
            Self::ClampMaximum => Ok(clamp_maximum(parameters, sources, component_count, dimension)),
            Self::ClampMinimum => Ok(clamp_minimum(parameters, sources, component_count, dimension)),
            Self::Offset => Ok(offset(parameters, sources, component_count, dimension)),
            Self::SumComponents => Ok(sum_components(parameters, sources, dimension)),
        }
    }

    /// Inverse van de operator: bepaal de bronwaarden die tot `values` leiden.
    pub fn invert(self, parameters: &[f64], values: &[f64]) -> Result<Vec<f64>, InversionError> {
        match self {
            Self::Scale => values
                .iter()
                .enumerate()
                .map(|(component, value)| {
                    if parameters[component] == 0.0 {
                        Err(InversionError::ZeroScaleFactor { component })
                    } else {
                        Ok(value / parameters[component])
                    }
                })
                .collect(),
            Self::Offset => Ok(values
                .iter()
                .zip(parameters)
                .map(|(value, parameter)| value - parameter)
                .collect()),
            Self::ClampMaximum => Ok(values
                .iter()
                .zip(parameters)
                .map(|(value, limit)| value.min(*limit))
                .collect()),
            Self::ClampMinimum => Ok(values
                .iter()
                .zip(parameters)
                .map(|(value, limit)| value.max(*limit))
                .collect()),
            Self::MultiplyComponents
            | Self::DivideComponents
            | Self::Add
            | Self::SumComponents => Err(InversionError::NotInvertible {
                type_name: self.type_name().to_owned(),
            }),
        }
    }
}

fn source_derivatives(source: &FieldValues) -> &[f64] {
    source
        .derivatives
        .as_deref()
        .unwrap_or_default()
}

fn multiply(sources: &[FieldValues], component_count: usize, dimension: Option<usize>) -> FieldValues {
    let (a, b) = (&sources[0], &sources[1]);
    let values: Vec<f64> = a
        .values
        .iter()
        .zip(&b.values)
        .map(|(left, right)| left * right)
        .collect();

    let derivatives = dimension.map(|d| {
        let (da, db) = (source_derivatives(a), source_derivatives(b));
        let mut block = vec![0.0; component_count * d];
        for i in 0..component_count {
            for j in 0..d {
                block[i * d + j] = da[i * d + j] * b.values[i] + db[i * d + j] * a.values[i];
            }
        }
        block
    });

    FieldValues { values, derivatives }
}

fn divide(
    sources: &[FieldValues],
    component_count: usize,
    dimension: Option<usize>,
) -> Result<FieldValues, OperatorError> {
    let (a, b) = (&sources[0], &sources[1]);

    // Een nuldeler maakt het veld hier ongedefinieerd; geen inf of NaN
    // doorlaten.
    if let Some(component) = b.values.iter().position(|divisor| *divisor == 0.0) {
        return Err(OperatorError::DivideByZero { component });
    }

    let values: Vec<f64> = a
        .values
        .iter()
        .zip(&b.values)
        .map(|(numerator, divisor)| numerator / divisor)
        .collect();

    let derivatives = dimension.map(|d| {
        let (da, db) = (source_derivatives(a), source_derivatives(b));
        let mut block = vec![0.0; component_count * d];
        for i in 0..component_count {
            let divisor_squared = b.values[i] * b.values[i];
            for j in 0..d {
                block[i * d + j] = (da[i * d + j] * b.values[i]
                    - db[i * d + j] * a.values[i])
                    / divisor_squared;
            }
        }
        block
    });

    Ok(FieldValues { values, derivatives })
}

fn weighted_add(
    parameters: &[f64],
    sources: &[FieldValues],
    component_count: usize,
    dimension: Option<usize>,
) -> FieldValues {
    let (a, b) = (&sources[0], &sources[1]);
    let (s1, s2) = (parameters[0], parameters[1]);
    let values: Vec<f64> = a
        .values
        .iter()
        .zip(&b.values)
        .map(|(left, right)| s1 * left + s2 * right)
        .collect();

    let derivatives = dimension.map(|d| {
        let (da, db) = (source_derivatives(a), source_derivatives(b));
        (0..component_count * d)
            .map(|slot| s1 * da[slot] + s2 * db[slot])
            .collect()
    });

    FieldValues { values, derivatives }
}

fn scale(
    parameters: &[f64],
    sources: &[FieldValues],
    component_count: usize,
    dimension: Option<usize>,
) -> FieldValues {
    let source = &sources[0];
    let values: Vec<f64> = source
        .values
        .iter()
        .zip(parameters)
        .map(|(value, factor)| factor * value)
        .collect();

    let derivatives = dimension.map(|d| {
        let da = source_derivatives(source);
        let mut block = vec![0.0; component_count * d];
        for i in 0..component_count {
            for j in 0..d {
                block[i * d + j] = parameters[i] * da[i * d + j];
            }
        }
        block
    });

    FieldValues { values, derivatives }
}

fn offset(
    parameters: &[f64],
    sources: &[FieldValues],
    component_count: usize,
    dimension: Option<usize>,
) -> FieldValues {
    let source = &sources[0];
    let values: Vec<f64> = source
        .values
        .iter()
        .zip(parameters)
        .map(|(value, offset)| value + offset)
        .collect();

    let derivatives = dimension.map(|d| {
        let da = source_derivatives(source);
        da[..component_count * d].to_vec()
    });

    FieldValues { values, derivatives }
}

fn clamp_maximum(
    parameters: &[f64],
    sources: &[FieldValues],
    component_count: usize,
    dimension: Option<usize>,
) -> FieldValues {
    let source = &sources[0];
    let values: Vec<f64> = source
        .values
        .iter()
        .zip(parameters)
        .map(|(value, limit)| value.min(*limit))
        .collect();

    let derivatives = dimension.map(|d| {
        let da = source_derivatives(source);
        let mut block = vec![0.0; component_count * d];
        for i in 0..component_count {
            // Strikte ongelijkheid: exact op de limiet geldt het veld als
            // ongeklemd en loopt de afgeleide door.
            if source.values[i] <= parameters[i] {
                block[i * d..(i + 1) * d].copy_from_slice(&da[i * d..(i + 1) * d]);
            }
        }
        block
    });

    FieldValues { values, derivatives }
}

fn clamp_minimum(
    parameters: &[f64],
    sources: &[FieldValues],
    component_count: usize,
    dimension: Option<usize>,
) -> FieldValues {
    let source = &sources[0];
    let values: Vec<f64> = source
        .values
        .iter()
        .zip(parameters)
        .map(|(value, limit)| value.max(*limit))
        .collect();

    let derivatives = dimension.map(|d| {
        let da = source_derivatives(source);
        let mut block = vec![0.0; component_count * d];
        for i in 0..component_count {
            if source.values[i] >= parameters[i] {
                block[i * d..(i + 1) * d].copy_from_slice(&da[i * d..(i + 1) * d]);
            }
        }
        block
    });

    FieldValues { values, derivatives }
}

fn sum_components(
    parameters: &[f64],
    sources: &[FieldValues],
    dimension: Option<usize>,
) -> FieldValues {
    let source = &sources[0];
    let total = source
        .values
        .iter()
        .zip(parameters)
        .map(|(value, weight)| weight * value)
        .sum();

    let derivatives = dimension.map(|d| {
        let da = source_derivatives(source);
        let mut block = vec![0.0; d];
        for (i, weight) in parameters.iter().enumerate() {
            for (j, slot) in block.iter_mut().enumerate() {
                *slot += weight * da[i * d + j];
            }
        }
        block
    });

    FieldValues {
        values: vec![total],
        derivatives,
    }
}
