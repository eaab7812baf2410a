//! Per-veld cache van de laatst berekende waarden en afgeleiden.

use crate::location::LocationKey;

use super::FieldValues;

/// Cache bij een veld: componentwaarden, afgeleidenblok en de locatie
/// waarvoor ze berekend zijn.
///
/// De cache wordt uitsluitend door de evaluator gevuld en is ofwel volledig
/// geldig voor de opgeslagen locatie, ofwel leeg; hij wordt nooit
/// gedeeltelijk bijgewerkt.
#[derive(Debug, Clone, Default)]
pub struct FieldCache {
    values: Vec<f64>,
    derivatives: Vec<f64>,
    derivatives_valid: bool,
    location: Option<LocationKey>,
}

impl FieldCache {
    /// Maak een lege cache aan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Is de cache geldig voor de opgegeven locatie?
    #[must_use]
    pub fn matches(&self, key: &LocationKey) -> bool {
        self.location.as_ref() == Some(key)
    }

    /// Zijn de opgeslagen afgeleiden geldig?
    #[must_use]
    pub fn derivatives_valid(&self) -> bool {
        self.derivatives_valid
    }

    /// De laatst berekende componentwaarden.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Het laatst berekende afgeleidenblok (alleen betekenisvol als
    /// [`Self::derivatives_valid`] waar is).
    #[must_use]
    pub fn derivatives(&self) -> &[f64] {
        &self.derivatives
    }

    /// Sla een volledig evaluatieresultaat op voor een locatie.
    pub fn store(&mut self, key: LocationKey, output: &FieldValues) {
        self.values.clear();
        self.values.extend_from_slice(&output.values);
        self.derivatives.clear();
        if let Some(derivatives) = &output.derivatives {
            self.derivatives.extend_from_slice(derivatives);
            self.derivatives_valid = true;
        } else {
            self.derivatives_valid = false;
        }
        self.location = Some(key);
    }

    /// Kopie van de cache-inhoud als evaluatieresultaat.
    #[must_use]
    pub fn to_field_values(&self, with_derivatives: bool) -> FieldValues {
        FieldValues {
            values: self.values.clone(),
            derivatives: if with_derivatives && self.derivatives_valid {
                Some(self.derivatives.clone())
            } else {
                None
            },
        }
    }

    /// Maak de cache leeg; waarden en afgeleiden gelden daarna voor geen
    /// enkele locatie meer.
    pub fn clear(&mut self) {
        self.values.clear();
        self.derivatives.clear();
        self.derivatives_valid = false;
        self.location = None;
    }
}
