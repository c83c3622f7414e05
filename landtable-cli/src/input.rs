use crate::error::{CliError, CliResult};
use colored::Colorize;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

/// Where a transaction document comes from.
#[derive(Debug, PartialEq)]
pub enum InputSource {
    /// From a file on disk.
    File(PathBuf),
    /// From the `-e` inline expression.
    Inline(String),
    /// From stdin (piped).
    Stdin,
}

/// Resolve the input source with priority: `-e` > positional file > stdin.
pub fn resolve_input(expr: Option<&str>, file: Option<&Path>) -> CliResult<InputSource> {
    if let Some(e) = expr {
        return Ok(InputSource::Inline(e.to_string()));
    }
    if let Some(f) = file {
        return Ok(InputSource::File(f.to_path_buf()));
    }
    if !io::stdin().is_terminal() {
        return Ok(InputSource::Stdin);
    }
    Err(CliError::Usage(format!(
        "no transaction provided\n  {} pass a file, use -e for inline JSON, or pipe via stdin",
        "help:".cyan().bold()
    )))
}

/// Read content from the resolved input source.
pub fn read_input(source: &InputSource) -> CliResult<String> {
    match source {
        InputSource::File(path) => read_file(path),
        InputSource::Inline(s) => Ok(s.clone()),
        InputSource::Stdin => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

pub fn read_file(path: &Path) -> CliResult<String> {
    std::fs::read_to_string(path)
        .map_err(|e| CliError::Input(format!("failed to read {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn expr_wins_over_file() {
        let source = resolve_input(Some("{\"ops\": []}"), Some(Path::new("txn.json"))).unwrap();
        assert_eq!(source, InputSource::Inline("{\"ops\": []}".to_string()));
    }

    #[test]
    fn reads_file_contents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{\"ops\": []}}").unwrap();
        let source = resolve_input(None, Some(file.path())).unwrap();
        assert_eq!(read_input(&source).unwrap(), "{\"ops\": []}");
    }

    #[test]
    fn missing_file_is_an_input_error() {
        let err = read_file(Path::new("/nonexistent/txn.json")).unwrap_err();
        assert!(matches!(err, CliError::Input(msg) if msg.contains("failed to read")));
    }
}
