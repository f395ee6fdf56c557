use std::path::PathBuf;

/// A required setting is absent or could not be parsed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {var}: '{value}' ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// The sent-alert ledger file could not be read or appended to.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Failed to read ledger {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to append to ledger {path}: {source}")]
    Append {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A scraped row did not have the number of cells an alert row requires.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Expected {expected} fields in alert row, found {found}")]
pub struct RowShapeError {
    pub expected: usize,
    pub found: usize,
}
