//! Parser voor het tekstuele `define field`-commando.
//!
//! Grammatica:
//!
//! ```text
//! define field <naam> type <typenaam>
//!     [fields <bron> ...]
//!     [<parametersleutelwoord> <getal> ...]
//! ```
//!
//! Het parametersleutelwoord is dat van de operator (`scale_factors`,
//! `offsets`, `maximums`, `minimums`, `weights`) of het generieke
//! `parameters`. De parser levert alleen de tekstuele argumenten op; het
//! opzoeken van bronnen en alle structurele validatie gebeurt in de registry
//! en bij de veldconstructie.

use thiserror::Error;

use crate::registry::TypeArguments;

/// Sleutelwoorden die een parameterlijst inleiden.
const PARAMETER_KEYWORDS: &[&str] = &[
    "scale_factors",
    "offsets",
    "maximums",
    "minimums",
    "weights",
    "parameters",
];

/// Een geparseerd define-commando.
#[derive(Debug, Clone, PartialEq)]
pub struct DefineFieldCommand {
    /// Naam van het te definiëren of herdefiniëren veld.
    pub name: String,
    /// Typenaam waaronder de constructor in de registry staat.
    pub type_name: String,
    /// Bronnamen en parameterwaarden.
    pub arguments: TypeArguments,
}

/// Fouten bij het parsen van een commando.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    /// Het commando was leeg.
    #[error("leeg commando")]
    Empty,
    /// Het commando begint niet met `define field`.
    #[error("verwacht `define field`, kreeg `{0}`")]
    UnexpectedKeyword(String),
    /// Na `define field` ontbreekt de veldnaam.
    #[error("veldnaam ontbreekt")]
    MissingFieldName,
    /// Het verplichte `type <typenaam>` ontbreekt.
    #[error("typenaam ontbreekt (verwacht `type <naam>`)")]
    MissingTypeName,
    /// Een parameterwaarde kon niet als getal gelezen worden.
    #[error("ongeldige parameterwaarde `{value}` na `{keyword}`")]
    InvalidNumber { keyword: String, value: String },
    /// Een token dat geen sectie inleidt en nergens bij hoort.
    #[error("onbekend sleutelwoord `{0}`")]
    UnknownKeyword(String),
}

/// Parse een `define field`-commando.
pub fn parse(input: &str) -> Result<DefineFieldCommand, CommandError> {
    let mut tokens = input.split_whitespace();

    match tokens.next() {
        None => return Err(CommandError::Empty),
        Some("define") => {}
        Some(other) => return Err(CommandError::UnexpectedKeyword(other.to_owned())),
    }
    match tokens.next() {
        Some("field") => {}
        Some(other) => return Err(CommandError::UnexpectedKeyword(other.to_owned())),
        None => return Err(CommandError::MissingFieldName),
    }

    let name = tokens
        .next()
        .ok_or(CommandError::MissingFieldName)?
        .to_owned();

    match tokens.next() {
        Some("type") => {}
        _ => return Err(CommandError::MissingTypeName),
    }
    let type_name = tokens.next().ok_or(CommandError::MissingTypeName)?.to_owned();

    enum Section {
        None,
        Fields,
        Parameters(String),
    }

    let mut arguments = TypeArguments::default();
    let mut section = Section::None;

    for token in tokens {
        if token == "fields" {
            section = Section::Fields;
        } else if PARAMETER_KEYWORDS.contains(&token) {
            section = Section::Parameters(token.to_owned());
        } else {
            match &section {
                Section::None => return Err(CommandError::UnknownKeyword(token.to_owned())),
                Section::Fields => arguments.fields.push(token.to_owned()),
                Section::Parameters(keyword) => {
                    let value: f64 =
                        token
                            .parse()
                            .map_err(|_| CommandError::InvalidNumber {
                                keyword: keyword.clone(),
                                value: token.to_owned(),
                            })?;
                    arguments.parameters.push(value);
                }
            }
        }
    }

    Ok(DefineFieldCommand {
        name,
        type_name,
        arguments,
    })
}

#[cfg(test)]
mod tests {
    use super::{CommandError, parse};

    #[test]
    fn parses_a_full_define_command() {
        let command = parse("define field scaled type scale fields coordinates scale_factors 2 3")
            .expect("geldig commando");
        assert_eq!(command.name, "scaled");
        assert_eq!(command.type_name, "scale");
        assert_eq!(command.arguments.fields, vec!["coordinates".to_owned()]);
        assert_eq!(command.arguments.parameters, vec![2.0, 3.0]);
    }

    #[test]
    fn parses_without_parameters() {
        let command =
            parse("define field product type multiply_components fields a b").unwrap();
        assert_eq!(command.arguments.fields.len(), 2);
        assert!(command.arguments.parameters.is_empty());
    }

    #[test]
    fn generic_parameters_keyword_is_accepted() {
        let command = parse("define field s type sum_components fields a parameters 1 2 3").unwrap();
        assert_eq!(command.arguments.parameters, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn rejects_malformed_commands() {
        assert_eq!(parse("   "), Err(CommandError::Empty));
        assert_eq!(
            parse("delete field x"),
            Err(CommandError::UnexpectedKeyword("delete".to_owned()))
        );
        assert_eq!(parse("define field"), Err(CommandError::MissingFieldName));
        assert_eq!(parse("define field x"), Err(CommandError::MissingTypeName));
        assert_eq!(
            parse("define field x type scale bogus"),
            Err(CommandError::UnknownKeyword("bogus".to_owned()))
        );
        assert!(matches!(
            parse("define field x type scale scale_factors een"),
            Err(CommandError::InvalidNumber { .. })
        ));
    }
}
