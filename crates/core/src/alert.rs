//! Alert rows scraped from the dashboard and the identifiers derived from them.

use std::fmt;


use crate::error::RowShapeError;

/// Number of cells a problem row must have to be treated as an alert.
pub const ALERT_ROW_FIELDS: usize = 9;

/// Cell positions within an alert row.
pub mod field {
    pub const TIME: usize = 0;
    pub const STATUS: usize = 2;
    pub const HOST: usize = 4;
    pub const INCIDENT: usize = 5;
    pub const DURATION: usize = 6;
    pub const ACKNOWLEDGED: usize = 7;
}

/// Separator placed between the identifying fields of an [`AlertId`].
pub const ALERT_ID_SEPARATOR: &str = "-";

/// Cell texts of one matched table row, in column order, as scraped.
pub type RawRow = Vec<String>;

/// Severity marker carried by a dashboard row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    High,
    Disaster,
}

impl Severity {
    /// Severities forwarded to the webhook.
    pub const FORWARDED: [Severity; 2] = [Severity::High, Severity::Disaster];

    /// CSS class the dashboard puts on a cell of a row with this severity.
    pub fn css_class(self) -> &'static str {
        match self {
            Severity::High => "high-bg",
            Severity::Disaster => "disaster-bg",
        }
    }

    /// CSS selector matching every table row flagged with one of `severities`.
    ///
    /// `[High, Disaster]` yields `tr:has(td.high-bg), tr:has(td.disaster-bg)`.
    pub fn row_selector(severities: &[Severity]) -> String {
        severities
            .iter()
            .map(|s| format!("tr:has(td.{})", s.css_class()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A scraped row known to have exactly [`ALERT_ROW_FIELDS`] cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertRow {
    fields: [String; ALERT_ROW_FIELDS],
}

impl AlertRow {
    /// Validate the shape of a raw row.
    ///
    /// Rows with any other cell count (header rows, collapsed groups,
    /// widgets with extra columns) are rejected with the observed count.
    pub fn try_from_cells(cells: RawRow) -> Result<Self, RowShapeError> {
        let fields: [String; ALERT_ROW_FIELDS] =
            cells.try_into().map_err(|rejected: Vec<String>| RowShapeError {
                expected: ALERT_ROW_FIELDS,
                found: rejected.len(),
            })?;
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn time(&self) -> &str {
        &self.fields[field::TIME]
    }

    pub fn status(&self) -> &str {
        &self.fields[field::STATUS]
    }

    pub fn host(&self) -> &str {
        &self.fields[field::HOST]
    }

    pub fn incident(&self) -> &str {
        &self.fields[field::INCIDENT]
    }

    pub fn duration(&self) -> &str {
        &self.fields[field::DURATION]
    }

    pub fn acknowledged(&self) -> &str {
        &self.fields[field::ACKNOWLEDGED]
    }
}

impl TryFrom<RawRow> for AlertRow {
    type Error = RowShapeError;

    fn try_from(cells: RawRow) -> Result<Self, Self::Error> {
        Self::try_from_cells(cells)
    }
}

/// Deduplication key of an alert: time, status, host and incident joined
/// by [`ALERT_ID_SEPARATOR`].
///
/// No normalisation is applied, so rows differing only in surrounding
/// whitespace produce different identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlertId(String);

impl AlertId {
    pub fn derive(row: &AlertRow) -> Self {
        Self(
            [row.time(), row.status(), row.host(), row.incident()].join(ALERT_ID_SEPARATOR),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for AlertId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for AlertId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(values: &[&str]) -> RawRow {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn disk_full_row() -> AlertRow {
        AlertRow::try_from_cells(cells(&[
            "2024-01-01T10:00",
            "",
            "PROBLEM",
            "",
            "host1",
            "Disk full",
            "5m",
            "No",
            "",
        ]))
        .expect("nine cells")
    }

    #[test]
    fn derive_joins_time_status_host_incident() {
        let id = AlertId::derive(&disk_full_row());
        assert_eq!(id.as_str(), "2024-01-01T10:00-PROBLEM-host1-Disk full");
    }

    #[test]
    fn derive_is_deterministic() {
        assert_eq!(AlertId::derive(&disk_full_row()), AlertId::derive(&disk_full_row()));
    }

    #[test]
    fn derive_ignores_non_identifying_columns() {
        let mut raw = disk_full_row().fields().to_vec();
        raw[field::DURATION] = "3h 12m".to_string();
        raw[field::ACKNOWLEDGED] = "Yes".to_string();
        let later = AlertRow::try_from_cells(raw).expect("nine cells");
        assert_eq!(AlertId::derive(&later), AlertId::derive(&disk_full_row()));
    }

    #[test]
    fn derive_distinguishes_each_identifying_column() {
        let base = AlertId::derive(&disk_full_row());
        for idx in [field::TIME, field::STATUS, field::HOST, field::INCIDENT] {
            let mut raw = disk_full_row().fields().to_vec();
            raw[idx].push('x');
            let changed = AlertRow::try_from_cells(raw).expect("nine cells");
            assert_ne!(AlertId::derive(&changed), base, "column {idx} must affect the id");
        }
    }

    #[test]
    fn derive_keeps_surrounding_whitespace() {
        let mut raw = disk_full_row().fields().to_vec();
        raw[field::HOST] = " host1 ".to_string();
        let padded = AlertRow::try_from_cells(raw).expect("nine cells");
        assert_ne!(AlertId::derive(&padded), AlertId::derive(&disk_full_row()));
    }

    #[test]
    fn accessors_map_fixed_positions() {
        let row = disk_full_row();
        assert_eq!(row.time(), "2024-01-01T10:00");
        assert_eq!(row.status(), "PROBLEM");
        assert_eq!(row.host(), "host1");
        assert_eq!(row.incident(), "Disk full");
        assert_eq!(row.duration(), "5m");
        assert_eq!(row.acknowledged(), "No");
    }

    #[test]
    fn eight_cells_rejected() {
        let err = AlertRow::try_from_cells(cells(&["a", "b", "c", "d", "e", "f", "g", "h"]))
            .unwrap_err();
        assert_eq!(err, RowShapeError { expected: 9, found: 8 });
    }

    #[test]
    fn ten_cells_rejected() {
        let raw = vec![String::new(); 10];
        let err = AlertRow::try_from(raw).unwrap_err();
        assert_eq!(err.found, 10);
        assert_eq!(err.to_string(), "Expected 9 fields in alert row, found 10");
    }

    #[test]
    fn row_selector_for_forwarded_severities() {
        assert_eq!(
            Severity::row_selector(&Severity::FORWARDED),
            "tr:has(td.high-bg), tr:has(td.disaster-bg)"
        );
    }

    #[test]
    fn row_selector_single_severity() {
        assert_eq!(Severity::row_selector(&[Severity::Disaster]), "tr:has(td.disaster-bg)");
    }
}
