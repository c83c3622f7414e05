//! Landtable CLI library.
//!
//! Command handlers behind the `landtable` binary. `exec` runs a
//! transaction through the coordinator against in-memory backends built
//! from a state document, which makes it a quick way to check how a table's
//! replication rules treat a given transaction.

pub mod cli;
pub mod commands;
pub mod error;
pub mod input;

use cli::{Cli, Commands, IdAction};

/// Dispatch a parsed [`Cli`] to the matching command handler.
pub async fn run(cli: Cli) -> error::CliResult<()> {
    match cli.command {
        Commands::Exec {
            state,
            workspace,
            table,
            consistency,
            use_names,
            file,
            expr,
        } => {
            let source = input::resolve_input(expr.as_deref(), file.as_deref())?;
            commands::exec::run(commands::exec::ExecArgs {
                state: &state,
                workspace: &workspace,
                table: &table,
                consistency: consistency.into(),
                use_names,
                source,
                quiet: cli.quiet,
            })
            .await
        }

        Commands::Validate { state } => commands::validate::run(&state, cli.quiet),

        Commands::Id { action } => match action {
            IdAction::Convert { foreign, kind } => commands::id::convert(&foreign, kind.into()),
            IdAction::Inspect { id } => commands::id::inspect(&id),
            IdAction::New { kind } => commands::id::new(kind.into()),
        },
    }
}
