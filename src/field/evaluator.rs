//! Recursieve evaluatie van de veldgraaf, met cachebeheer en het
//! terugschrijven van waarden door inverteerbare operatorketens.

use std::rc::Rc;

use thiserror::Error;

use crate::field::{FieldHandle, FieldValues};
use crate::leaf::LeafError;
use crate::location::EvaluationLocation;
use crate::operators::{Operator, OperatorBehavior, OperatorError, component_ops};

/// Fouten tijdens de voorwaartse evaluatie.
///
/// Bij elke fout blijft de cache van het veld achter als "verouderd": de
/// aanroeper moet het veld op die locatie als niet-evalueerbaar behandelen en
/// mag nooit een nulwaarde substitueren.
#[derive(Debug, Error)]
pub enum EvaluationError {
    /// Een bronveld kon niet geëvalueerd worden.
    #[error("veld `{field}`: {source}")]
    Source {
        field: String,
        #[source]
        source: Box<EvaluationError>,
    },
    /// De operator zelf meldde een fout (bv. deling door nul).
    #[error("veld `{field}`: {source}")]
    Operator {
        field: String,
        #[source]
        source: OperatorError,
    },
    /// De leaf-backing kon de locatie niet bedienen.
    #[error("leaf-veld `{field}`: {source}")]
    Leaf {
        field: String,
        #[source]
        source: LeafError,
    },
}

/// Fouten bij het terugschrijven van waarden.
#[derive(Debug, Error)]
pub enum InversionError {
    /// De operator heeft geen inverse.
    #[error("operator `{type_name}` ondersteunt geen terugschrijven van waarden")]
    NotInvertible { type_name: String },
    /// Een schaalfactor van exact nul is niet inverteerbaar.
    #[error("schaalfactor voor component {component} is nul en kan niet geïnverteerd worden")]
    ZeroScaleFactor { component: usize },
    /// De aangeboden waardenvector heeft de verkeerde lengte.
    #[error("veld `{field}` verwacht {expected} componenten, kreeg {actual}")]
    ValueCountMismatch {
        field: String,
        expected: usize,
        actual: usize,
    },
    /// De leaf-backing weigerde de schrijfactie.
    #[error("leaf-veld `{field}`: {source}")]
    Leaf {
        field: String,
        #[source]
        source: LeafError,
    },
}

enum Dispatch {
    Builtin(component_ops::OperatorKind),
    Extension(Rc<dyn OperatorBehavior>),
}

/// Evalueer een veld op een locatie.
///
/// Elke bron in de afsluiting wordt hoogstens één keer per (locatie, tijd)
/// geëvalueerd: een cache die al voor deze locatie geldt (en, indien
/// gevraagd, geldige afgeleiden bevat) wordt zonder herberekening
/// teruggegeven. De recursie garandeert dat bronnen volledig geëvalueerd zijn
/// voordat de operator van hun afnemer draait.
///
/// Het resultaat bevat alleen een afgeleidenblok als `want_derivatives` waar
/// is, de locatie continu is en elke betrokken bron geldige afgeleiden
/// leverde; ongeldigheid propageert als "geen afgeleiden".
pub fn evaluate(
    field: &FieldHandle,
    location: &EvaluationLocation,
    want_derivatives: bool,
) -> Result<FieldValues, EvaluationError> {
    let key = location.key();

    {
        let current = field.borrow();
        if current.cache.matches(&key)
            && (!want_derivatives || current.cache.derivatives_valid())
        {
            log::debug!("cache-hit voor veld `{}`", current.name());
            return Ok(current.cache.to_field_values(want_derivatives));
        }
    }

    // Leaf-velden lezen rechtstreeks uit hun backing; daar bodemt de
    // recursie uit.
    let leaf_output = {
        let current = field.borrow();
        match &current.operator {
            Operator::Leaf(backing) => Some(backing.evaluate(location).map_err(|source| {
                EvaluationError::Leaf {
                    field: current.name().to_owned(),
                    source,
                }
            })),
            _ => None,
        }
    };
    if let Some(result) = leaf_output {
        let output = result?;
        let mut current = field.borrow_mut();
        current.cache.store(key, &output);
        return Ok(current.cache.to_field_values(want_derivatives));
    }

    let (dispatch, sources, parameters, component_count, name) = {
        let current = field.borrow();
        let dispatch = match &current.operator {
            Operator::Builtin(kind) => Dispatch::Builtin(*kind),
            Operator::Extension(behavior) => Dispatch::Extension(Rc::clone(behavior)),
            Operator::Leaf(_) => unreachable!("leaf-velden zijn hierboven afgehandeld"),
        };
        (
            dispatch,
            current.sources().to_vec(),
            current.parameters().to_vec(),
            current.component_count(),
            current.name().to_owned(),
        )
    };

    let xi_dimension = location.xi_dimension();
    let want_source_derivatives = want_derivatives && xi_dimension.is_some();

    let mut samples = Vec::with_capacity(sources.len());
    for source in &sources {
        let sample =
            evaluate(source, location, want_source_derivatives).map_err(|source_error| {
                EvaluationError::Source {
                    field: name.clone(),
                    source: Box::new(source_error),
                }
            })?;
        samples.push(sample);
    }

    let derivative_dimension = if want_source_derivatives {
        xi_dimension
    } else {
        None
    };
    let output = match &dispatch {
        Dispatch::Builtin(kind) => {
            kind.evaluate(&parameters, component_count, derivative_dimension, &samples)
        }
        Dispatch::Extension(behavior) => {
            behavior.evaluate(&parameters, component_count, derivative_dimension, &samples)
        }
    }
    .map_err(|source| EvaluationError::Operator {
        field: name,
        source,
    })?;

    field.borrow_mut().cache.store(key, &output);
    Ok(output)
}

/// Schrijf nieuwe waarden terug door een inverteerbare operatorketen.
///
/// Voor inverteerbare operatoren wordt de geïmpliceerde bronwaarde berekend
/// en recursief doorgeschreven tot in de leaf-backing. Ofwel slaagt de hele
/// keten tot en met de leaf, ofwel wordt er niets geschreven; pas na een
/// geslaagde schrijfactie worden de caches langs de keten geleegd.
pub fn set_values(
    field: &FieldHandle,
    location: &EvaluationLocation,
    values: &[f64],
) -> Result<(), InversionError> {
    enum Action {
        WriteLeaf,
        Recurse {
            source: FieldHandle,
            source_values: Vec<f64>,
        },
    }

    let action = {
        let current = field.borrow();
        if values.len() != current.component_count() {
            return Err(InversionError::ValueCountMismatch {
                field: current.name().to_owned(),
                expected: current.component_count(),
                actual: values.len(),
            });
        }
        match &current.operator {
            Operator::Leaf(_) => Action::WriteLeaf,
            operator => {
                let source_values = operator.invert(current.parameters(), values)?;
                let Some(source) = current.sources().first() else {
                    return Err(InversionError::NotInvertible {
                        type_name: operator.type_name().to_owned(),
                    });
                };
                Action::Recurse {
                    source: Rc::clone(source),
                    source_values,
                }
            }
        }
    };

    match action {
        Action::WriteLeaf => {
            let mut current = field.borrow_mut();
            let field_name = current.name().to_owned();
            if let Operator::Leaf(backing) = &mut current.operator {
                backing
                    .set_values(location, values)
                    .map_err(|source| InversionError::Leaf {
                        field: field_name,
                        source,
                    })?;
            }
            current.cache.clear();
        }
        Action::Recurse {
            source,
            source_values,
        } => {
            set_values(&source, location, &source_values)?;
            field.borrow_mut().cache.clear();
        }
    }
    Ok(())
}

/// Maak de cache van één veld leeg.
///
/// De engine houdt geen omgekeerde afhankelijkheden bij; de beheerlaag roept
/// dit aan voor elk veld stroomafwaarts van een wijziging.
pub fn invalidate(field: &FieldHandle) {
    field.borrow_mut().invalidate();
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::{EvaluationError, InversionError, evaluate, invalidate, set_values};
    use crate::field::{Field, FieldDefinition, FieldHandle};
    use crate::leaf::{LinearElementLeaf, NodalLeaf};
    use crate::location::EvaluationLocation;
    use crate::operators::OperatorError;
    use crate::operators::component_ops::OperatorKind;

    fn nodal_leaf(name: &str, node: usize, values: Vec<f64>) -> FieldHandle {
        let mut backing = NodalLeaf::new(values.len());
        backing.set_node(node, values).unwrap();
        Field::leaf(name, Box::new(backing))
    }

    fn counted_leaf(
        name: &str,
        node: usize,
        values: Vec<f64>,
    ) -> (FieldHandle, Rc<Cell<usize>>) {
        let counter = Rc::new(Cell::new(0));
        let mut backing = NodalLeaf::with_counter(values.len(), Rc::clone(&counter));
        backing.set_node(node, values).unwrap();
        (Field::leaf(name, Box::new(backing)), counter)
    }

    #[test]
    fn multiply_combines_leaf_values() {
        let a = nodal_leaf("a", 0, vec![3.0, 4.0]);
        let b = nodal_leaf("b", 0, vec![1.0, 2.0]);
        let product = Field::define(
            "product",
            FieldDefinition::builtin(OperatorKind::MultiplyComponents, vec![a, b], vec![]),
        )
        .unwrap();

        let location = EvaluationLocation::at_node(0, 0.0);
        let result = evaluate(&product, &location, false).expect("product evalueert");
        assert_eq!(result.values, vec![3.0, 8.0]);
        assert_eq!(result.derivatives, None);
    }

    #[test]
    fn second_evaluation_hits_the_cache() {
        let (a, counter) = counted_leaf("a", 0, vec![2.0]);
        let doubled = Field::define(
            "doubled",
            FieldDefinition::builtin(OperatorKind::Scale, vec![a], vec![2.0]),
        )
        .unwrap();

        let location = EvaluationLocation::at_node(0, 0.0);
        let first = evaluate(&doubled, &location, false).unwrap();
        assert_eq!(counter.get(), 1);

        let second = evaluate(&doubled, &location, false).unwrap();
        assert_eq!(counter.get(), 1, "tweede aanroep mag de leaf niet raken");
        assert_eq!(first, second);
    }

    #[test]
    fn changed_location_recomputes() {
        let counter = Rc::new(Cell::new(0));
        let mut backing = NodalLeaf::with_counter(1, Rc::clone(&counter));
        backing.set_node(0, vec![1.0]).unwrap();
        backing.set_node(1, vec![5.0]).unwrap();
        let a = Field::leaf("a", Box::new(backing));
        let shifted = Field::define(
            "shifted",
            FieldDefinition::builtin(OperatorKind::Offset, vec![a], vec![10.0]),
        )
        .unwrap();

        let here = EvaluationLocation::at_node(0, 0.0);
        let there = EvaluationLocation::at_node(1, 0.0);
        assert_eq!(evaluate(&shifted, &here, false).unwrap().values, vec![11.0]);
        assert_eq!(evaluate(&shifted, &there, false).unwrap().values, vec![15.0]);
        assert_eq!(evaluate(&shifted, &here, false).unwrap().values, vec![11.0]);
        assert_eq!(counter.get(), 3);
    }

    #[test]
    fn invalidate_forces_recomputation() {
        let (a, counter) = counted_leaf("a", 0, vec![1.0]);
        let scaled = Field::define(
            "scaled",
            FieldDefinition::builtin(OperatorKind::Scale, vec![Rc::clone(&a)], vec![3.0]),
        )
        .unwrap();

        let location = EvaluationLocation::at_node(0, 0.0);
        evaluate(&scaled, &location, false).unwrap();
        evaluate(&scaled, &location, false).unwrap();
        assert_eq!(counter.get(), 1);

        invalidate(&scaled);
        invalidate(&a);
        evaluate(&scaled, &location, false).unwrap();
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn divide_by_zero_propagates_as_error() {
        let a = nodal_leaf("a", 0, vec![1.0]);
        let b = nodal_leaf("b", 0, vec![0.0]);
        let ratio = Field::define(
            "ratio",
            FieldDefinition::builtin(OperatorKind::DivideComponents, vec![a, b], vec![]),
        )
        .unwrap();

        let location = EvaluationLocation::at_node(0, 0.0);
        let err = evaluate(&ratio, &location, false).expect_err("nuldeler");
        assert!(matches!(
            err,
            EvaluationError::Operator {
                source: OperatorError::DivideByZero { component: 0 },
                ..
            }
        ));
        // de cache blijft verouderd: er is geen waarde voor deze locatie
        assert!(!ratio.borrow().cache().matches(&location.key()));
    }

    #[test]
    fn source_failure_propagates_with_field_context() {
        let empty = Field::leaf("empty", Box::new(NodalLeaf::new(1)));
        let shifted = Field::define(
            "shifted",
            FieldDefinition::builtin(OperatorKind::Offset, vec![empty], vec![1.0]),
        )
        .unwrap();

        let location = EvaluationLocation::at_node(4, 0.0);
        let err = evaluate(&shifted, &location, false).expect_err("lege leaf");
        assert!(matches!(err, EvaluationError::Source { ref field, .. } if field == "shifted"));
    }

    #[test]
    fn derivatives_flow_through_a_composition() {
        let base = Field::leaf(
            "base",
            Box::new(LinearElementLeaf::new(2, vec![1.0, 2.0], vec![1.0, 0.0, 0.0, 1.0]).unwrap()),
        );
        let scaled = Field::define(
            "scaled",
            FieldDefinition::builtin(OperatorKind::Scale, vec![base], vec![2.0, 3.0]),
        )
        .unwrap();

        let location = EvaluationLocation::in_element(0, vec![0.5, 0.25], 0.0);
        let result = evaluate(&scaled, &location, true).expect("element evalueert");
        assert_eq!(result.values, vec![2.0 * 1.5, 3.0 * 2.25]);
        assert_eq!(result.derivatives, Some(vec![2.0, 0.0, 0.0, 3.0]));
    }

    #[test]
    fn derivative_validity_does_not_leak_across_locations() {
        let base = Field::leaf(
            "base",
            Box::new(LinearElementLeaf::new(1, vec![0.0], vec![2.0]).unwrap()),
        );
        let doubled = Field::define(
            "doubled",
            FieldDefinition::builtin(OperatorKind::Scale, vec![base], vec![2.0]),
        )
        .unwrap();

        let here = EvaluationLocation::in_element(0, vec![0.25], 0.0);
        let there = EvaluationLocation::in_element(0, vec![0.75], 0.0);
        let first = evaluate(&doubled, &here, true).unwrap();
        assert_eq!(first.values, vec![2.0 * 0.5]);

        let second = evaluate(&doubled, &there, true).unwrap();
        assert_eq!(second.values, vec![2.0 * 1.5]);
        assert_eq!(second.derivatives, Some(vec![4.0]));
    }

    #[test]
    fn derivatives_requested_at_a_node_yield_none() {
        let a = nodal_leaf("a", 0, vec![2.0]);
        let doubled = Field::define(
            "doubled",
            FieldDefinition::builtin(OperatorKind::Scale, vec![a], vec![2.0]),
        )
        .unwrap();

        let location = EvaluationLocation::at_node(0, 0.0);
        let result = evaluate(&doubled, &location, true).expect("node evalueert");
        assert_eq!(result.values, vec![4.0]);
        assert_eq!(result.derivatives, None);
    }

    #[test]
    fn set_values_through_scale_and_offset() {
        let a = nodal_leaf("a", 0, vec![1.0, 1.0]);
        let scaled = Field::define(
            "scaled",
            FieldDefinition::builtin(OperatorKind::Scale, vec![a], vec![2.0, 4.0]),
        )
        .unwrap();
        let shifted = Field::define(
            "shifted",
            FieldDefinition::builtin(OperatorKind::Offset, vec![scaled], vec![1.0, -1.0]),
        )
        .unwrap();

        let location = EvaluationLocation::at_node(0, 0.0);
        set_values(&shifted, &location, &[9.0, 7.0]).expect("keten is inverteerbaar");

        let result = evaluate(&shifted, &location, false).unwrap();
        assert!((result.values[0] - 9.0).abs() < 1e-9);
        assert!((result.values[1] - 7.0).abs() < 1e-9);
    }

    #[test]
    fn set_values_fails_on_non_invertible_operator() {
        let a = nodal_leaf("a", 0, vec![1.0]);
        let b = nodal_leaf("b", 0, vec![2.0]);
        let product = Field::define(
            "product",
            FieldDefinition::builtin(OperatorKind::MultiplyComponents, vec![a, b], vec![]),
        )
        .unwrap();

        let location = EvaluationLocation::at_node(0, 0.0);
        let err = set_values(&product, &location, &[6.0]).expect_err("geen inverse");
        assert!(matches!(err, InversionError::NotInvertible { .. }));
    }

    #[test]
    fn failed_inversion_writes_nothing() {
        let a = nodal_leaf("a", 0, vec![5.0]);
        let scaled = Field::define(
            "scaled",
            FieldDefinition::builtin(OperatorKind::Scale, vec![Rc::clone(&a)], vec![0.0]),
        )
        .unwrap();

        let location = EvaluationLocation::at_node(0, 0.0);
        let err = set_values(&scaled, &location, &[3.0]).expect_err("nulfactor");
        assert!(matches!(err, InversionError::ZeroScaleFactor { component: 0 }));
        assert_eq!(evaluate(&a, &location, false).unwrap().values, vec![5.0]);
    }
}
