//! Leaf-velden: de koppeling tussen de veldgraaf en onderliggende meshdata.
//!
//! Een leaf-veld heeft geen bronvelden; zijn waarden komen rechtstreeks uit
//! een backing die door de mesh/topologielaag wordt aangeleverd. De engine is
//! agnostisch over de opslag; dit bestand levert daarnaast twee
//! referentie-backings waarmee de engine zonder volledige meshlaag bruikbaar
//! en testbaar is.

use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::field::FieldValues;
use crate::location::{EvaluationLocation, NodeId};

/// Fouten vanuit een leaf-backing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LeafError {
    /// Voor dit node-punt zijn geen waarden opgeslagen.
    #[error("geen waarden opgeslagen voor node {0:?}")]
    UnknownNode(NodeId),
    /// De backing ondersteunt dit locatietype niet.
    #[error("veld is niet evalueerbaar op dit locatietype")]
    NotEvaluable,
    /// De backing is alleen-lezen.
    #[error("veld is niet schrijfbaar")]
    NotWritable,
    /// Waardenvector met verkeerde lengte.
    #[error("verwacht {expected} componenten, kreeg {actual}")]
    ComponentMismatch { expected: usize, actual: usize },
    /// Parametrische dimensie past niet bij de backing.
    #[error("verwacht parametrische dimensie {expected}, kreeg {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Contract voor de concrete opslag achter een leaf-veld.
///
/// `evaluate` en `set_values` volgen dezelfde semantiek als de veld-evaluator:
/// een fout betekent "niet gedefinieerd op deze locatie", nooit een stille
/// nulwaarde.
pub trait LeafBacking: fmt::Debug {
    /// Typenaam zoals die in listings verschijnt.
    fn type_name(&self) -> &str;

    /// Aantal componenten dat deze backing levert.
    fn component_count(&self) -> usize;

    /// Lees de waarden (en waar mogelijk afgeleiden) op een locatie.
    fn evaluate(&self, location: &EvaluationLocation) -> Result<FieldValues, LeafError>;

    /// Schrijf nieuwe waarden terug naar de opslag. Backings zijn standaard
    /// alleen-lezen.
    fn set_values(
        &mut self,
        location: &EvaluationLocation,
        values: &[f64],
    ) -> Result<(), LeafError> {
        let _ = (location, values);
        Err(LeafError::NotWritable)
    }
}

/// Schrijfbare backing met per node opgeslagen componentvectoren.
///
/// Afgeleiden zijn op node-punten niet gedefinieerd; elementlocaties worden
/// geweigerd. De evaluatieteller maakt cache-gedrag van buitenaf waarneembaar.
#[derive(Debug)]
pub struct NodalLeaf {
    component_count: usize,
    values: HashMap<NodeId, Vec<f64>>,
    evaluations: Rc<Cell<usize>>,
}

impl NodalLeaf {
    /// Maak een lege nodale backing aan.
    #[must_use]
    pub fn new(component_count: usize) -> Self {
        Self::with_counter(component_count, Rc::new(Cell::new(0)))
    }

    /// Maak een backing aan die evaluaties telt op een gedeelde teller.
    #[must_use]
    pub fn with_counter(component_count: usize, evaluations: Rc<Cell<usize>>) -> Self {
        Self {
            component_count,
            values: HashMap::new(),
            evaluations,
        }
    }

    /// Ken waarden toe aan een node-punt.
    pub fn set_node(
        &mut self,
        node: impl Into<NodeId>,
        values: Vec<f64>,
    ) -> Result<(), LeafError> {
        if values.len() != self.component_count {
            return Err(LeafError::ComponentMismatch {
                expected: self.component_count,
                actual: values.len(),
            });
        }
        self.values.insert(node.into(), values);
        Ok(())
    }
}

impl LeafBacking for NodalLeaf {
    fn type_name(&self) -> &str {
        "nodal_values"
    }

    fn component_count(&self) -> usize {
        self.component_count
    }

    fn evaluate(&self, location: &EvaluationLocation) -> Result<FieldValues, LeafError> {
        match location {
            EvaluationLocation::AtNode { node, .. } => {
                self.evaluations.set(self.evaluations.get() + 1);
                let values = self
                    .values
                    .get(node)
                    .ok_or(LeafError::UnknownNode(*node))?;
                Ok(FieldValues {
                    values: values.clone(),
                    derivatives: None,
                })
            }
            EvaluationLocation::InElement { .. } => Err(LeafError::NotEvaluable),
        }
    }

    fn set_values(
        &mut self,
        location: &EvaluationLocation,
        values: &[f64],
    ) -> Result<(), LeafError> {
        match location {
            EvaluationLocation::AtNode { node, .. } => {
                if values.len() != self.component_count {
                    return Err(LeafError::ComponentMismatch {
                        expected: self.component_count,
                        actual: values.len(),
                    });
                }
                self.values.insert(*node, values.to_vec());
                Ok(())
            }
            EvaluationLocation::InElement { .. } => Err(LeafError::NotEvaluable),
        }
    }
}

/// Alleen-lezen backing die affien is in de parametrische coördinaten:
/// `values[i] = baseline[i] + Σ_j gradient[i*D + j] * xi[j]`.
///
/// Het afgeleidenblok is daarmee constant gelijk aan `gradient`.
#[derive(Debug, Clone)]
pub struct LinearElementLeaf {
    xi_dimension: usize,
    baseline: Vec<f64>,
    gradient: Vec<f64>,
}

impl LinearElementLeaf {
    /// Maak een affiene backing aan; `gradient` moet
    /// `baseline.len() * xi_dimension` lang zijn.
    pub fn new(
        xi_dimension: usize,
        baseline: Vec<f64>,
        gradient: Vec<f64>,
    ) -> Result<Self, LeafError> {
        let expected = baseline.len() * xi_dimension;
        if gradient.len() != expected {
            return Err(LeafError::ComponentMismatch {
                expected,
                actual: gradient.len(),
            });
        }
        Ok(Self {
            xi_dimension,
            baseline,
            gradient,
        })
    }
}

impl LeafBacking for LinearElementLeaf {
    fn type_name(&self) -> &str {
        "linear_element"
    }

    fn component_count(&self) -> usize {
        self.baseline.len()
    }

    fn evaluate(&self, location: &EvaluationLocation) -> Result<FieldValues, LeafError> {
        match location {
            EvaluationLocation::AtNode { .. } => Err(LeafError::NotEvaluable),
            EvaluationLocation::InElement { xi, .. } => {
                if xi.len() != self.xi_dimension {
                    return Err(LeafError::DimensionMismatch {
                        expected: self.xi_dimension,
                        actual: xi.len(),
                    });
                }
                let d = self.xi_dimension;
                let values = self
                    .baseline
                    .iter()
                    .enumerate()
                    .map(|(i, base)| {
                        base + xi
                            .iter()
                            .enumerate()
                            .map(|(j, coordinate)| self.gradient[i * d + j] * coordinate)
                            .sum::<f64>()
                    })
                    .collect();
                Ok(FieldValues {
                    values,
                    derivatives: Some(self.gradient.clone()),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::{LeafBacking, LeafError, LinearElementLeaf, NodalLeaf};
    use crate::location::EvaluationLocation;

    #[test]
    fn nodal_leaf_reads_and_writes_nodes() {
        let mut leaf = NodalLeaf::new(2);
        leaf.set_node(1, vec![3.0, 4.0]).unwrap();

        let location = EvaluationLocation::at_node(1, 0.0);
        let sample = leaf.evaluate(&location).expect("node heeft waarden");
        assert_eq!(sample.values, vec![3.0, 4.0]);
        assert_eq!(sample.derivatives, None);

        leaf.set_values(&location, &[5.0, 6.0]).unwrap();
        assert_eq!(leaf.evaluate(&location).unwrap().values, vec![5.0, 6.0]);
    }

    #[test]
    fn nodal_leaf_counts_evaluations() {
        let counter = Rc::new(Cell::new(0));
        let mut leaf = NodalLeaf::with_counter(1, Rc::clone(&counter));
        leaf.set_node(0, vec![1.0]).unwrap();

        let location = EvaluationLocation::at_node(0, 0.0);
        leaf.evaluate(&location).unwrap();
        leaf.evaluate(&location).unwrap();
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn nodal_leaf_rejects_element_locations_and_unknown_nodes() {
        let leaf = NodalLeaf::new(1);
        let element = EvaluationLocation::in_element(0, vec![0.5], 0.0);
        assert_eq!(leaf.evaluate(&element), Err(LeafError::NotEvaluable));

        let node = EvaluationLocation::at_node(9, 0.0);
        assert!(matches!(
            leaf.evaluate(&node),
            Err(LeafError::UnknownNode(_))
        ));
    }

    #[test]
    fn linear_leaf_is_affine_in_xi() {
        let leaf = LinearElementLeaf::new(2, vec![1.0, 0.0], vec![2.0, 0.0, 1.0, 3.0]).unwrap();
        let location = EvaluationLocation::in_element(4, vec![0.5, 1.0], 0.0);
        let sample = leaf.evaluate(&location).expect("element evalueert");
        assert_eq!(sample.values, vec![1.0 + 2.0 * 0.5, 1.0 * 0.5 + 3.0 * 1.0]);
        assert_eq!(sample.derivatives, Some(vec![2.0, 0.0, 1.0, 3.0]));
    }

    #[test]
    fn linear_leaf_is_read_only() {
        let mut leaf = LinearElementLeaf::new(1, vec![0.0], vec![1.0]).unwrap();
        let location = EvaluationLocation::in_element(0, vec![0.0], 0.0);
        assert_eq!(
            leaf.set_values(&location, &[1.0]),
            Err(LeafError::NotWritable)
        );
    }
}
