//! Domain types shared by the zbxwatch crates: alert rows, alert
//! identifiers, the sent-alert ledger and configuration errors.

pub mod alert;
pub mod env;
pub mod error;
pub mod ledger;

pub use alert::{AlertId, AlertRow, RawRow, Severity, ALERT_ROW_FIELDS};
pub use error::{ConfigError, LedgerError, RowShapeError};
pub use ledger::SentLedger;
