use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use zbxwatch_core::env;
use zbxwatch_core::ledger::DEFAULT_LEDGER_FILE;
use zbxwatch_core::ConfigError;
use zbxwatch_dashboard::DashboardConfig;
use zbxwatch_delivery::WebhookConfig;

/// Log file used when `LOG_FILE` is unset.
pub const DEFAULT_LOG_FILE: &str = "zbxwatch.log";

/// What to do when the webhook refuses an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryPolicy {
    /// End the run with an error; later rows are not processed.
    #[default]
    Abort,
    /// Log the failure and carry on with the next row.
    Continue,
}

impl FromStr for DeliveryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "continue" => Ok(Self::Continue),
            other => Err(format!("expected 'abort' or 'continue', got '{other}'")),
        }
    }
}

impl fmt::Display for DeliveryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Abort => "abort",
            Self::Continue => "continue",
        })
    }
}

/// Everything one agent run needs, built once at start-up.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub dashboard: DashboardConfig,
    pub webhook: WebhookConfig,
    /// Sent-alert ledger file.
    pub ledger_path: PathBuf,
    /// File the log is appended to, alongside console output.
    pub log_file: PathBuf,
    pub delivery_policy: DeliveryPolicy,
}

impl AgentConfig {
    /// Load configuration from the process environment.
    ///
    /// The ledger defaults to `sent_alerts.txt` in the directory holding the
    /// agent executable, so scheduled runs find it regardless of their
    /// working directory.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&env::process_env, &executable_dir())
    }

    /// | Env Var                   | Default                         |
    /// |---------------------------|---------------------------------|
    /// | `SENT_ALERTS_FILE`        | `<ledger_dir>/sent_alerts.txt`  |
    /// | `LOG_FILE`                | `zbxwatch.log`                  |
    /// | `DELIVERY_FAILURE_POLICY` | `abort`                         |
    ///
    /// plus the dashboard and webhook variables, see
    /// [`DashboardConfig::from_lookup`] and [`WebhookConfig::from_lookup`].
    pub fn from_lookup<F>(lookup: &F, ledger_dir: &Path) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let ledger_path = env::optional(lookup, "SENT_ALERTS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| ledger_dir.join(DEFAULT_LEDGER_FILE));

        Ok(Self {
            dashboard: DashboardConfig::from_lookup(lookup)?,
            webhook: WebhookConfig::from_lookup(lookup)?,
            ledger_path,
            log_file: log_file_from_lookup(lookup),
            delivery_policy: env::parsed_or(lookup, "DELIVERY_FAILURE_POLICY", DeliveryPolicy::Abort)?,
        })
    }
}

/// Resolve the log file on its own so logging can start before the rest of
/// the configuration is validated.
pub fn log_file_from_lookup<F>(lookup: &F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    env::optional(lookup, "LOG_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE))
}

fn executable_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}
