//! Evaluatielocaties binnen het eindige-elementendomein.
//!
//! Een veld wordt geëvalueerd op een [`EvaluationLocation`]: ofwel een
//! discreet node-punt (geen afgeleiden mogelijk), ofwel een continue positie
//! binnen een element, beschreven door parametrische `xi`-coördinaten. De
//! parametrische dimensie wordt altijd door de locatie zelf aangeleverd en
//! nooit elders opnieuw afgeleid, zodat een veld en zijn bronnen er niet
//! stilzwijgend over van mening kunnen verschillen.

use serde::Serialize;

/// Identifier voor een discreet node-punt in het domein.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
pub struct NodeId(pub usize);

impl NodeId {
    #[must_use]
    pub const fn new(id: usize) -> Self {
        Self(id)
    }
}

impl From<usize> for NodeId {
    fn from(value: usize) -> Self {
        Self::new(value)
    }
}

/// Identifier voor een element in het domein.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
pub struct ElementId(pub usize);

impl ElementId {
    #[must_use]
    pub const fn new(id: usize) -> Self {
        Self(id)
    }
}

impl From<usize> for ElementId {
    fn from(value: usize) -> Self {
        Self::new(value)
    }
}

/// Locatie waarop een veld geëvalueerd wordt.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationLocation {
    /// Een discreet node-punt; afgeleiden zijn hier niet gedefinieerd.
    AtNode {
        /// Het node-punt.
        node: NodeId,
        /// Tijdstip van de evaluatie.
        time: f64,
    },
    /// Een continue positie binnen een element.
    InElement {
        /// Het element waarin geëvalueerd wordt.
        element: ElementId,
        /// Parametrische coördinaten; `xi.len()` is de parametrische dimensie.
        xi: Vec<f64>,
        /// Het top-level element waartoe `element` behoort.
        top_level_element: ElementId,
        /// Tijdstip van de evaluatie.
        time: f64,
    },
}

impl EvaluationLocation {
    /// Maak een node-locatie aan.
    #[must_use]
    pub fn at_node(node: impl Into<NodeId>, time: f64) -> Self {
        Self::AtNode {
            node: node.into(),
            time,
        }
    }

    /// Maak een elementlocatie aan waarbij het element zelf top-level is.
    #[must_use]
    pub fn in_element(element: impl Into<ElementId>, xi: Vec<f64>, time: f64) -> Self {
        let element = element.into();
        Self::InElement {
            element,
            xi,
            top_level_element: element,
            time,
        }
    }

    /// Maak een elementlocatie aan met een expliciet top-level element.
    #[must_use]
    pub fn in_element_of(
        element: impl Into<ElementId>,
        xi: Vec<f64>,
        top_level_element: impl Into<ElementId>,
        time: f64,
    ) -> Self {
        Self::InElement {
            element: element.into(),
            xi,
            top_level_element: top_level_element.into(),
            time,
        }
    }

    /// Parametrische dimensie van de locatie, of `None` op een node-punt.
    #[must_use]
    pub fn xi_dimension(&self) -> Option<usize> {
        match self {
            Self::AtNode { .. } => None,
            Self::InElement { xi, .. } => Some(xi.len()),
        }
    }

    /// Tijdstip van de locatie.
    #[must_use]
    pub fn time(&self) -> f64 {
        match self {
            Self::AtNode { time, .. } | Self::InElement { time, .. } => *time,
        }
    }

    /// Sleutel waarmee de cache gelijkheid van locaties bepaalt.
    #[must_use]
    pub fn key(&self) -> LocationKey {
        LocationKey::from(self)
    }
}

/// Cache-sleutel voor een evaluatielocatie.
///
/// Coördinaten en tijd worden als bitpatronen vergeleken: twee locaties zijn
/// pas "dezelfde" in cache-zin als hun `xi` en `time` exact overeenkomen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationKey {
    AtNode {
        node: NodeId,
        time_bits: u64,
    },
    InElement {
        element: ElementId,
        top_level_element: ElementId,
        xi_bits: Vec<u64>,
        time_bits: u64,
    },
}

impl From<&EvaluationLocation> for LocationKey {
    fn from(location: &EvaluationLocation) -> Self {
        match location {
            EvaluationLocation::AtNode { node, time } => Self::AtNode {
                node: *node,
                time_bits: time.to_bits(),
            },
            EvaluationLocation::InElement {
                element,
                xi,
                top_level_element,
                time,
            } => Self::InElement {
                element: *element,
                top_level_element: *top_level_element,
                xi_bits: xi.iter().map(|value| value.to_bits()).collect(),
                time_bits: time.to_bits(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EvaluationLocation, LocationKey, NodeId};

    #[test]
    fn node_location_has_no_xi_dimension() {
        let location = EvaluationLocation::at_node(NodeId::new(3), 0.0);
        assert_eq!(location.xi_dimension(), None);
    }

    #[test]
    fn element_location_carries_its_dimension() {
        let location = EvaluationLocation::in_element(7, vec![0.25, 0.5], 1.0);
        assert_eq!(location.xi_dimension(), Some(2));
        assert!((location.time() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn keys_compare_xi_and_time_exactly() {
        let a = EvaluationLocation::in_element(1, vec![0.1], 0.0);
        let b = EvaluationLocation::in_element(1, vec![0.1], 0.0);
        let c = EvaluationLocation::in_element(1, vec![0.1 + 1e-16], 0.0);
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key() == c.key(), 0.1_f64.to_bits() == (0.1_f64 + 1e-16).to_bits());
    }

    #[test]
    fn different_tags_never_match() {
        let node = EvaluationLocation::at_node(1, 0.0);
        let element = EvaluationLocation::in_element(1, vec![0.0], 0.0);
        assert_ne!(node.key(), element.key());
        assert!(matches!(node.key(), LocationKey::AtNode { .. }));
    }
}
