use colored::Colorize;
use landtable_core::CoreError;
use landtable_state::StateError;
use landtable_transact::TransactionError;
use std::fmt;
use std::process;

/// Exit codes for the CLI.
#[allow(dead_code)]
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_ERROR: i32 = 1;
pub const EXIT_USAGE: i32 = 2;

/// Unified error type for CLI operations.
pub enum CliError {
    /// Transaction rejected or failed on the primary.
    Transaction(TransactionError),
    /// State document could not be loaded.
    State(StateError),
    /// State document loaded but failed validation.
    Invalid(usize),
    /// Malformed identifier.
    Identifier(CoreError),
    /// Bad file path, unreadable input, parse failure.
    Input(String),
    /// Argument / usage errors.
    Usage(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Transaction(e) => write!(
                f,
                "{} {e} ({})",
                "error:".red().bold(),
                e.code().as_str()
            ),
            CliError::State(StateError::NotFound(what)) => write!(
                f,
                "{} {what} not found\n  {} run 'landtable validate --state <file>' to check the state document",
                "error:".red().bold(),
                "help:".cyan().bold(),
            ),
            CliError::State(e) => write!(f, "{} {e}", "error:".red().bold()),
            CliError::Invalid(count) => write!(
                f,
                "{} {count} table(s) failed validation",
                "error:".red().bold()
            ),
            CliError::Identifier(e) => write!(f, "{} {e}", "error:".red().bold()),
            CliError::Input(msg) => write!(f, "{} {msg}", "error:".red().bold()),
            CliError::Usage(msg) => write!(f, "{} {msg}", "error:".red().bold()),
        }
    }
}

impl fmt::Debug for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<TransactionError> for CliError {
    fn from(e: TransactionError) -> Self {
        CliError::Transaction(e)
    }
}

impl From<StateError> for CliError {
    fn from(e: StateError) -> Self {
        CliError::State(e)
    }
}

impl From<CoreError> for CliError {
    fn from(e: CoreError) -> Self {
        CliError::Identifier(e)
    }
}

impl From<landtable_backend::BackendError> for CliError {
    fn from(e: landtable_backend::BackendError) -> Self {
        CliError::Transaction(e.into())
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Input(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Input(format!("JSON parse error: {e}"))
    }
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage(_) => EXIT_USAGE,
            _ => EXIT_ERROR,
        }
    }
}

/// Print the error to stderr and exit with the appropriate code.
pub fn exit_with_error(err: CliError) -> ! {
    eprintln!("{err}");
    process::exit(err.exit_code());
}

pub type CliResult<T> = std::result::Result<T, CliError>;
