//! One monitoring run: sign in, scrape, deduplicate, deliver, record.
//!
//! Rows are handled strictly in page order. An identifier reaches the
//! ledger only after the webhook accepted the alert, so anything that was
//! not delivered is attempted again by the next run.

use std::collections::HashSet;

use zbxwatch_core::{AlertId, AlertRow, LedgerError, RawRow, SentLedger};
use zbxwatch_dashboard::{DashboardError, DashboardScraper};
use zbxwatch_delivery::{DeliveryError, Notifier};

use crate::config::DeliveryPolicy;

/// Fatal errors that end a run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Dashboard(#[from] DashboardError),

    #[error("Failed to deliver alert '{alert_id}': {source}")]
    Delivery {
        alert_id: AlertId,
        #[source]
        source: DeliveryError,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// What happened to a single scraped row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    /// Wrong number of cells; never identified or delivered.
    Skipped,
    /// Already delivered by this or an earlier run.
    Deduplicated,
    /// Delivered and recorded.
    Sent,
    /// Delivery refused under [`DeliveryPolicy::Continue`]; not recorded.
    Failed,
}

/// Per-run counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub matched: usize,
    pub skipped: usize,
    pub deduplicated: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Drive `scraper` through a full run and close it afterwards.
///
/// The browser is closed whether or not the run succeeded; a failure to
/// close is logged and does not change the result.
pub async fn run<S, N>(
    mut scraper: S,
    notifier: &N,
    ledger: &SentLedger,
    policy: DeliveryPolicy,
) -> Result<RunSummary, RunError>
where
    S: DashboardScraper,
    N: Notifier,
{
    let result = scrape_and_deliver(&mut scraper, notifier, ledger, policy).await;

    if let Err(e) = scraper.close().await {
        tracing::warn!(error = %e, "Failed to close dashboard session");
    }

    // A fatal error is logged once, by the caller that exits on it.
    if let Ok(summary) = &result {
        tracing::info!(
            matched = summary.matched,
            skipped = summary.skipped,
            deduplicated = summary.deduplicated,
            sent = summary.sent,
            failed = summary.failed,
            "Run complete"
        );
    }

    result
}

async fn scrape_and_deliver<S, N>(
    scraper: &mut S,
    notifier: &N,
    ledger: &SentLedger,
    policy: DeliveryPolicy,
) -> Result<RunSummary, RunError>
where
    S: DashboardScraper,
    N: Notifier,
{
    scraper.authenticate().await?;
    scraper.load_view().await?;
    let rows = scraper.extract_matching_rows().await?;

    let total = rows.len();
    let mut batch = AlertBatch::new(notifier, ledger, policy);
    batch.summary.matched = total;

    for (idx, cells) in rows.into_iter().enumerate() {
        tracing::info!(row = idx + 1, total, "Processing row");
        batch.process(cells).await?;
    }

    Ok(batch.summary)
}

/// Row-by-row delivery state for one run.
pub struct AlertBatch<'a, N> {
    notifier: &'a N,
    ledger: &'a SentLedger,
    policy: DeliveryPolicy,
    /// Identifiers delivered during this run; the ledger snapshot does not
    /// see its own appends.
    sent_this_run: HashSet<AlertId>,
    summary: RunSummary,
}

impl<'a, N: Notifier> AlertBatch<'a, N> {
    pub fn new(notifier: &'a N, ledger: &'a SentLedger, policy: DeliveryPolicy) -> Self {
        Self {
            notifier,
            ledger,
            policy,
            sent_this_run: HashSet::new(),
            summary: RunSummary::default(),
        }
    }

    /// Handle one scraped row.
    ///
    /// Returns `Err` only for fatal conditions: a ledger write failure, or a
    /// delivery failure under [`DeliveryPolicy::Abort`].
    pub async fn process(&mut self, cells: RawRow) -> Result<RowOutcome, RunError> {
        let row = match AlertRow::try_from_cells(cells) {
            Ok(row) => row,
            Err(e) => {
                tracing::info!(found = e.found, expected = e.expected, "Skipping row with unexpected shape");
                return Ok(self.tally(RowOutcome::Skipped));
            }
        };

        let alert_id = AlertId::derive(&row);
        if self.ledger.contains(&alert_id) || self.sent_this_run.contains(&alert_id) {
            tracing::debug!(alert_id = %alert_id, "Alert already sent");
            return Ok(self.tally(RowOutcome::Deduplicated));
        }

        tracing::info!(alert_id = %alert_id, "Sending alert to webhook");
        if let Err(source) = self.notifier.notify(&row).await {
            match self.policy {
                DeliveryPolicy::Abort => {
                    return Err(RunError::Delivery { alert_id, source });
                }
                DeliveryPolicy::Continue => {
                    tracing::warn!(alert_id = %alert_id, error = %source, "Alert delivery failed, continuing");
                    return Ok(self.tally(RowOutcome::Failed));
                }
            }
        }

        self.ledger.record(&alert_id)?;
        self.sent_this_run.insert(alert_id);
        Ok(self.tally(RowOutcome::Sent))
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    fn tally(&mut self, outcome: RowOutcome) -> RowOutcome {
        match outcome {
            RowOutcome::Skipped => self.summary.skipped += 1,
            RowOutcome::Deduplicated => self.summary.deduplicated += 1,
            RowOutcome::Sent => self.summary.sent += 1,
            RowOutcome::Failed => self.summary.failed += 1,
        }
        outcome
    }
}
