use crate::error::CliResult;
use crate::input::{read_file, read_input, InputSource};
use colored::Colorize;
use landtable_backend::{
    BackendRegistry, LandtableTransaction, MemoryBackend, TransactionConsistency,
};
use landtable_state::MemoryConfigStore;
use landtable_transact::{
    ChannelHandoff, ReplicaResolver, ReplicationDegraded, ReplicationWorker,
    TransactionCoordinator, TransactionError,
};
use std::path::Path;
use std::sync::Arc;

pub struct ExecArgs<'a> {
    pub state: &'a Path,
    pub workspace: &'a str,
    pub table: &'a str,
    pub consistency: TransactionConsistency,
    pub use_names: bool,
    pub source: InputSource,
    pub quiet: bool,
}

/// Backends every `exec` deployment starts with
pub fn memory_registry() -> CliResult<BackendRegistry> {
    Ok(BackendRegistry::new()
        .with(Arc::new(MemoryBackend::strong()))?
        .with(Arc::new(MemoryBackend::sheet()))?)
}

/// Parse a transaction document, optionally forcing name-keyed results
pub fn parse_transaction(raw: &str, use_names: bool) -> CliResult<LandtableTransaction> {
    let transaction =
        LandtableTransaction::from_json(raw.as_bytes()).map_err(TransactionError::from)?;
    Ok(if use_names {
        transaction.with_use_id(false)
    } else {
        transaction
    })
}

pub async fn run(args: ExecArgs<'_>) -> CliResult<()> {
    let store = MemoryConfigStore::from_json(read_file(args.state)?.as_bytes())?;
    let transaction = parse_transaction(&read_input(&args.source)?, args.use_names)?;

    let registry = memory_registry()?;
    registry.initialise().await?;
    let resolver = Arc::new(ReplicaResolver::new(Arc::new(store), Arc::new(registry)));

    let (handoff, rx) = ChannelHandoff::channel();
    let worker = ReplicationWorker::new(resolver.clone()).spawn(rx);
    let coordinator = TransactionCoordinator::new(resolver.clone()).with_handoff(Arc::new(handoff));

    let result = coordinator
        .execute_named(args.workspace, args.table, &transaction, args.consistency)
        .await;

    // The worker drains delayed writes once the coordinator's sender is gone
    drop(coordinator);
    match worker.await {
        Ok(stats) => tracing::info!(
            applied = stats.applied,
            retries = stats.retries,
            abandoned = stats.abandoned,
            "delayed replication finished"
        ),
        Err(e) => tracing::warn!(error = %e, "replication worker did not finish"),
    }
    // Failures are logged by the registry and do not change the outcome
    let _ = resolver.registry().shutdown().await;

    let outcome = result?;
    println!("{}", serde_json::to_string_pretty(&outcome.results)?);

    if let Some(degraded) = &outcome.degraded {
        if !args.quiet {
            eprintln!("{}", degraded_warning(degraded));
        }
    }
    Ok(())
}

fn degraded_warning(degraded: &ReplicationDegraded) -> String {
    let mut out = format!(
        "{} committed on the primary, but {} secondaries were not updated",
        "warning:".yellow().bold(),
        degraded.failures.len()
    );
    for failure in &degraded.failures {
        out.push_str(&format!("\n  {}: {}", failure.replica.bold(), failure.reason));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CliError;
    use landtable_transact::ReplicaFailure;

    #[test]
    fn use_names_overrides_document() {
        let raw = r#"{"ops": [{"type": "create", "row": {"name": "x"}}], "use_id": true}"#;
        assert!(parse_transaction(raw, false).unwrap().use_id);
        assert!(!parse_transaction(raw, true).unwrap().use_id);
    }

    #[test]
    fn malformed_transaction_is_a_validation_error() {
        let err = parse_transaction("{\"ops\": 3}", false).unwrap_err();
        assert!(matches!(
            err,
            CliError::Transaction(TransactionError::Validation(_))
        ));
    }

    #[test]
    fn registry_serves_both_memory_flavours() {
        let registry = memory_registry().unwrap();
        let mut types: Vec<_> = registry.config_types().collect();
        types.sort_unstable();
        assert_eq!(types, vec!["memory_sheet_v0", "memory_v0"]);
    }

    #[test]
    fn degraded_warning_lists_each_replica() {
        colored::control::set_override(false);
        let warning = degraded_warning(&ReplicationDegraded {
            table: landtable_core::TableId::generate(),
            failures: vec![ReplicaFailure {
                replica: "pg".to_string(),
                reason: "unknown config type postgres_v0".to_string(),
            }],
        });
        assert!(warning.starts_with("warning: committed on the primary"));
        assert!(warning.contains("\n  pg: unknown config type postgres_v0"));
    }
}
