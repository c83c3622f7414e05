use crate::error::CliResult;
use colored::Colorize;
use landtable_core::{convert_foreign, AnyIdentifier, Identifier, IdentifierKind};

/// Landtable id for a foreign (Airtable-style) id
pub fn converted(foreign: &str, kind: IdentifierKind) -> CliResult<Identifier> {
    Ok(Identifier::from_bytes(kind, convert_foreign(foreign)?))
}

pub fn convert(foreign: &str, kind: IdentifierKind) -> CliResult<()> {
    println!("{}", converted(foreign, kind)?);
    Ok(())
}

/// Human-readable breakdown of an identifier
pub fn describe(id: &str) -> CliResult<Vec<(&'static str, String)>> {
    Ok(match AnyIdentifier::parse(id)? {
        AnyIdentifier::Structured(identifier) => vec![
            ("kind", identifier.kind().to_string()),
            ("prefix", identifier.kind().prefix().to_string()),
            ("payload", identifier.uuid().to_string()),
            ("canonical", identifier.to_string()),
        ],
        AnyIdentifier::Key(key) => vec![
            ("kind", "key".to_string()),
            ("payload", "opaque".to_string()),
            ("canonical", key.to_string()),
        ],
    })
}

pub fn inspect(id: &str) -> CliResult<()> {
    for (label, value) in describe(id)? {
        println!("{:<10} {value}", format!("{label}:").bold());
    }
    Ok(())
}

pub fn new(kind: IdentifierKind) -> CliResult<()> {
    println!("{}", Identifier::generate(kind));
    Ok(())
}
