//! Dashboard scraping capability and its shared types.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use zbxwatch_core::env;
use zbxwatch_core::{ConfigError, RawRow, Severity};

/// Default number of attempts made to start the browser process.
pub const DEFAULT_LAUNCH_ATTEMPTS: u32 = 3;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Errors raised while driving the dashboard. All of them end the run.
#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    /// The browser process could not be started.
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    /// A DevTools command failed during `stage`.
    #[error("Browser error during {stage}: {source}")]
    Browser {
        stage: &'static str,
        #[source]
        source: chromiumoxide::error::CdpError,
    },

    /// `stage` did not finish within the navigation timeout.
    #[error("Timed out after {}ms during {stage}", .timeout.as_millis())]
    Timeout {
        stage: &'static str,
        timeout: Duration,
    },

    /// The login form was still shown when the timeout expired after
    /// submitting credentials.
    #[error("Dashboard rejected the supplied credentials")]
    AuthRejected,

    /// The tab stopped reporting events before `stage` completed.
    #[error("Browser session ended during {stage}")]
    SessionClosed { stage: &'static str },
}

// ---------------------------------------------------------------------------
// Capability
// ---------------------------------------------------------------------------

/// What the run orchestrator needs from the monitoring dashboard.
///
/// Calls are made in order: `authenticate`, `load_view`,
/// `extract_matching_rows`, then `close`.
pub trait DashboardScraper: Send {
    /// Submit credentials on the login page.
    fn authenticate(&mut self) -> impl Future<Output = Result<(), DashboardError>> + Send;

    /// Open the problems view and wait until its network activity stops.
    fn load_view(&mut self) -> impl Future<Output = Result<(), DashboardError>> + Send;

    /// Cell texts of every row carrying one of the configured severity
    /// markers, in page order.
    fn extract_matching_rows(
        &mut self,
    ) -> impl Future<Output = Result<Vec<RawRow>, DashboardError>> + Send;

    /// Release the browser session.
    fn close(self) -> impl Future<Output = Result<(), DashboardError>> + Send
    where
        Self: Sized;
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Dashboard and browser settings.
#[derive(Clone)]
pub struct DashboardConfig {
    pub login_url: String,
    pub dashboard_url: String,
    pub username: String,
    pub password: String,
    /// Bound on every navigation and element wait.
    pub navigation_timeout: Duration,
    /// Chromium / Chrome executable.
    pub browser_path: PathBuf,
    /// How many times to try starting the browser before giving up.
    pub launch_attempts: u32,
    /// Severity markers whose rows are scraped.
    pub severities: Vec<Severity>,
}

impl DashboardConfig {
    /// | Env Var                   | Default |
    /// |---------------------------|---------|
    /// | `URL_LOGIN_ZABBIX`        | --      |
    /// | `URL_DASHBOARD_ZABBIX`    | --      |
    /// | `USER_ZABBIX`             | --      |
    /// | `PASS_ZABBIX`             | --      |
    /// | `TIMEOUT` (milliseconds)  | --      |
    /// | `BROWSER_PATH`            | --      |
    /// | `BROWSER_LAUNCH_ATTEMPTS` | `3`     |
    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let timeout_ms: u64 = env::required_parsed(lookup, "TIMEOUT")?;

        let launch_attempts: u32 =
            env::parsed_or(lookup, "BROWSER_LAUNCH_ATTEMPTS", DEFAULT_LAUNCH_ATTEMPTS)?;
        if launch_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: "BROWSER_LAUNCH_ATTEMPTS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            login_url: env::required(lookup, "URL_LOGIN_ZABBIX")?,
            dashboard_url: env::required(lookup, "URL_DASHBOARD_ZABBIX")?,
            username: env::required(lookup, "USER_ZABBIX")?,
            password: env::required(lookup, "PASS_ZABBIX")?,
            navigation_timeout: Duration::from_millis(timeout_ms),
            browser_path: PathBuf::from(env::required(lookup, "BROWSER_PATH")?),
            launch_attempts,
            severities: Severity::FORWARDED.to_vec(),
        })
    }

    /// CSS selector for the rows to scrape.
    pub fn row_selector(&self) -> String {
        Severity::row_selector(&self.severities)
    }
}

impl fmt::Debug for DashboardConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DashboardConfig")
            .field("login_url", &self.login_url)
            .field("dashboard_url", &self.dashboard_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("navigation_timeout", &self.navigation_timeout)
            .field("browser_path", &self.browser_path)
            .field("launch_attempts", &self.launch_attempts)
            .field("severities", &self.severities)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn full_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("URL_LOGIN_ZABBIX", "https://zabbix.example/index.php"),
            ("URL_DASHBOARD_ZABBIX", "https://zabbix.example/zabbix.php?action=dashboard.view"),
            ("USER_ZABBIX", "monitor"),
            ("PASS_ZABBIX", "hunter2"),
            ("TIMEOUT", "30000"),
            ("BROWSER_PATH", "/usr/bin/chromium"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<DashboardConfig, ConfigError> {
        let lookup = |k: &str| vars.get(k).map(|v| v.to_string());
        DashboardConfig::from_lookup(&lookup)
    }

    #[test]
    fn loads_required_settings() {
        let config = load(&full_env()).expect("complete env");
        assert_eq!(config.navigation_timeout, Duration::from_secs(30));
        assert_eq!(config.launch_attempts, DEFAULT_LAUNCH_ATTEMPTS);
        assert_eq!(config.browser_path, PathBuf::from("/usr/bin/chromium"));
        assert_eq!(
            config.row_selector(),
            "tr:has(td.high-bg), tr:has(td.disaster-bg)"
        );
    }

    #[test]
    fn missing_password_is_reported() {
        let mut vars = full_env();
        vars.remove("PASS_ZABBIX");
        assert_matches!(load(&vars), Err(ConfigError::Missing("PASS_ZABBIX")));
    }

    #[test]
    fn non_numeric_timeout_is_invalid() {
        let mut vars = full_env();
        vars.insert("TIMEOUT", "30s");
        assert_matches!(load(&vars), Err(ConfigError::Invalid { var: "TIMEOUT", .. }));
    }

    #[test]
    fn zero_launch_attempts_is_invalid() {
        let mut vars = full_env();
        vars.insert("BROWSER_LAUNCH_ATTEMPTS", "0");
        assert_matches!(
            load(&vars),
            Err(ConfigError::Invalid { var: "BROWSER_LAUNCH_ATTEMPTS", .. })
        );
    }

    #[test]
    fn debug_redacts_password() {
        let config = load(&full_env()).expect("complete env");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("monitor"));
    }

    #[test]
    fn timeout_error_reports_milliseconds() {
        let err = DashboardError::Timeout {
            stage: "dashboard network idle",
            timeout: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "Timed out after 1500ms during dashboard network idle");
    }
}
