use clap::{Parser, Subcommand, ValueEnum};
use landtable_backend::TransactionConsistency;
use landtable_core::IdentifierKind;
use std::path::PathBuf;

/// Landtable operator CLI
#[derive(Parser)]
#[command(name = "landtable", about = "Landtable operator CLI", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a transaction against an in-memory deployment
    Exec {
        /// State document describing databases, workspaces and tables
        #[arg(long)]
        state: PathBuf,

        /// Workspace name, alias or id
        #[arg(long, short = 'w')]
        workspace: String,

        /// Table name, alias or id
        #[arg(long, short = 't')]
        table: String,

        /// Consistency level
        #[arg(long, short = 'c', value_enum, default_value_t = ConsistencyArg::Strict)]
        consistency: ConsistencyArg,

        /// Key result rows by field name instead of field id
        #[arg(long)]
        use_names: bool,

        /// Transaction file (JSON)
        file: Option<PathBuf>,

        /// Inline transaction JSON
        #[arg(short = 'e', long = "expr")]
        expr: Option<String>,
    },

    /// Load and validate every table in a state document
    Validate {
        /// State document to check
        #[arg(long)]
        state: PathBuf,
    },

    /// Inspect, convert and mint identifiers
    Id {
        #[command(subcommand)]
        action: IdAction,
    },
}

#[derive(Subcommand)]
pub enum IdAction {
    /// Convert a foreign (Airtable-style) id into a Landtable id
    Convert {
        /// Foreign id, e.g. recHiMhzCULf9TTF1
        foreign: String,

        /// Kind of the resulting identifier
        #[arg(long, short = 'k', value_enum, default_value_t = KindArg::Row)]
        kind: KindArg,
    },

    /// Show the kind and payload of an identifier
    Inspect {
        /// Landtable id (lrw…, lfd…, ltb…, lwk…, ldb… or lky…)
        id: String,
    },

    /// Generate a fresh random identifier
    New {
        #[arg(value_enum)]
        kind: KindArg,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ConsistencyArg {
    Strict,
    Relaxed,
    None,
}

impl From<ConsistencyArg> for TransactionConsistency {
    fn from(arg: ConsistencyArg) -> Self {
        match arg {
            ConsistencyArg::Strict => TransactionConsistency::Strict,
            ConsistencyArg::Relaxed => TransactionConsistency::Relaxed,
            ConsistencyArg::None => TransactionConsistency::None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Row,
    Field,
    Table,
    Workspace,
    Database,
}

impl From<KindArg> for IdentifierKind {
    fn from(arg: KindArg) -> Self {
        match arg {
            KindArg::Row => IdentifierKind::Row,
            KindArg::Field => IdentifierKind::Field,
            KindArg::Table => IdentifierKind::Table,
            KindArg::Workspace => IdentifierKind::Workspace,
            KindArg::Database => IdentifierKind::Database,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn exec_defaults_to_strict() {
        let cli = Cli::parse_from([
            "landtable", "exec", "--state", "state.json", "-w", "hq", "-t", "users", "txn.json",
        ]);
        match cli.command {
            Commands::Exec {
                consistency,
                use_names,
                file,
                expr,
                ..
            } => {
                assert_eq!(TransactionConsistency::from(consistency), TransactionConsistency::Strict);
                assert!(!use_names);
                assert_eq!(file, Some(PathBuf::from("txn.json")));
                assert!(expr.is_none());
            }
            _ => panic!("expected exec"),
        }
    }

    #[test]
    fn verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["landtable", "-v", "-q", "id", "new", "row"]).is_err());
    }
}
