use crate::error::{CliError, CliResult};
use crate::input::read_file;
use colored::Colorize;
use landtable_state::{ReplicaSource, StateDocument, StateError, TableConfig};
use std::path::Path;

/// Check one table against its own rules and the document's databases
pub fn check_table(document: &StateDocument, table: &TableConfig) -> Result<(), StateError> {
    table.validate()?;
    for replica in table.replicas() {
        if let ReplicaSource::Reference { database, .. } = &replica.source {
            let known = document
                .databases
                .iter()
                .any(|db| db.name == *database || db.id.to_string() == *database);
            if !known {
                return Err(StateError::invalid_config(format!(
                    "table {}: replica references unknown database {database:?}",
                    table.name
                )));
            }
        }
    }
    Ok(())
}

pub fn run(state: &Path, quiet: bool) -> CliResult<()> {
    let document: StateDocument = serde_json::from_str(&read_file(state)?)?;

    let mut checked = 0;
    let mut failed = 0;
    for entry in &document.workspaces {
        for table in &entry.tables {
            checked += 1;
            let label = format!("{}/{}", entry.workspace.name, table.name);
            match check_table(&document, table) {
                Ok(()) => {
                    if !quiet {
                        println!("{} {label}", "ok".green().bold());
                    }
                }
                Err(e) => {
                    failed += 1;
                    eprintln!("{} {label}: {e}", "invalid".red().bold());
                }
            }
        }
    }

    if failed > 0 {
        return Err(CliError::Invalid(failed));
    }
    if !quiet {
        println!(
            "{} databases, {} workspaces, {checked} tables",
            document.databases.len(),
            document.workspaces.len()
        );
    }
    Ok(())
}
