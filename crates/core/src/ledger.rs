//! Append-only record of alerts already delivered.
//!
//! The backing file holds one [`AlertId`] per line. It is read once when a
//! run starts; successful deliveries are appended as they happen. Nothing is
//! ever removed, so the set only grows across runs.
//!
//! Identifiers are stored exactly as derived. Scraped cells may contain line
//! breaks, so `\`, `\n` and `\r` are written as two-character escapes to keep
//! one identifier per line.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::alert::AlertId;
use crate::error::LedgerError;

/// Default ledger file name, resolved next to the agent executable.
pub const DEFAULT_LEDGER_FILE: &str = "sent_alerts.txt";

/// In-memory snapshot of the ledger plus the path new entries go to.
#[derive(Debug)]
pub struct SentLedger {
    path: PathBuf,
    seen: HashSet<String>,
}

impl SentLedger {
    /// Read the ledger at `path`.
    ///
    /// A missing file is an empty ledger. Blank lines are ignored; nothing
    /// else about a line is changed.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(source) => return Err(LedgerError::Read { path, source }),
        };

        let seen = contents
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect();

        Ok(Self { path, seen })
    }

    /// Whether `id` was present when the ledger was loaded.
    ///
    /// Entries written by [`record`](Self::record) during this run are not
    /// visible here.
    pub fn contains(&self, id: &AlertId) -> bool {
        self.seen.contains(&escape(id.as_str()))
    }

    /// Append `id` to the backing file, creating it if needed.
    pub fn record(&self, id: &AlertId) -> Result<(), LedgerError> {
        let append = |path: &Path| -> io::Result<()> {
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            writeln!(file, "{}", escape(id.as_str()))?;
            file.flush()
        };

        append(&self.path).map_err(|source| LedgerError::Append {
            path: self.path.clone(),
            source,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of identifiers loaded at start.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Ledger line for `id`.
fn escape(id: &str) -> String {
    let mut line = String::with_capacity(id.len());
    for ch in id.chars() {
        match ch {
            '\\' => line.push_str("\\\\"),
            '\n' => line.push_str("\\n"),
            '\r' => line.push_str("\\r"),
            other => line.push(other),
        }
    }
    line
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
