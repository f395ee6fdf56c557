//! `zbxwatch-agent` -- forwards high and disaster alerts from a Zabbix
//! dashboard to a chat webhook.
//!
//! Meant to be started by a scheduler (cron, systemd timer). Each
//! invocation performs one run and exits; a non-zero exit status means the
//! run was aborted and undelivered alerts will be retried next time.
//!
//! # Environment variables
//!
//! | Variable                  | Required | Default           | Description                        |
//! |---------------------------|----------|-------------------|------------------------------------|
//! | `URL_LOGIN_ZABBIX`        | yes      | --                | Dashboard login page               |
//! | `URL_DASHBOARD_ZABBIX`    | yes      | --                | Dashboard view to scrape           |
//! | `USER_ZABBIX`             | yes      | --                | Dashboard user                     |
//! | `PASS_ZABBIX`             | yes      | --                | Dashboard password                 |
//! | `TIMEOUT`                 | yes      | --                | Navigation timeout in milliseconds |
//! | `BROWSER_PATH`            | yes      | --                | Chromium executable                |
//! | `URL_TEAMS`               | yes      | --                | Webhook endpoint                   |
//! | `TOKEN_TEAMS`             | yes      | --                | Token sent in every message        |
//! | `SENT_ALERTS_FILE`        | no       | next to binary    | Sent-alert ledger                  |
//! | `LOG_FILE`                | no       | `zbxwatch.log`    | Appended log file                  |
//! | `DELIVERY_FAILURE_POLICY` | no       | `abort`           | `abort` or `continue`              |
//! | `BROWSER_LAUNCH_ATTEMPTS` | no       | `3`               | Browser start attempts             |
//! | `WEBHOOK_TIMEOUT_SECS`    | no       | `10`              | Per-request webhook timeout        |

use anyhow::Context;

use zbxwatch_agent::config::{self, AgentConfig};
use zbxwatch_agent::logging;
use zbxwatch_agent::orchestrator::{self, RunSummary};
use zbxwatch_core::env;
use zbxwatch_core::SentLedger;
use zbxwatch_dashboard::BrowserDashboard;
use zbxwatch_delivery::WebhookNotifier;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenvy::dotenv().ok();

    let log_file = config::log_file_from_lookup(&env::process_env);
    if let Err(e) = logging::init(&log_file) {
        eprintln!("Failed to open log file {}: {e}", log_file.display());
        std::process::exit(1);
    }

    if let Err(e) = run().await {
        let message = format!("{e:#}");
        tracing::error!(error = %message, "zbxwatch-agent failed");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<RunSummary> {
    let config = AgentConfig::from_env().context("Invalid configuration")?;

    tracing::info!(
        dashboard = %config.dashboard.dashboard_url,
        policy = %config.delivery_policy,
        "Starting zbxwatch-agent",
    );

    let ledger = SentLedger::load(&config.ledger_path)?;
    tracing::info!(
        path = %ledger.path().display(),
        known = ledger.len(),
        "Loaded sent-alert ledger"
    );

    let notifier = WebhookNotifier::new(config.webhook.clone())
        .context("Failed to build webhook client")?;
    tracing::info!(url = %notifier.url(), "Webhook client ready");

    let dashboard = BrowserDashboard::launch(config.dashboard.clone()).await?;

    let summary = orchestrator::run(dashboard, &notifier, &ledger, config.delivery_policy).await?;
    Ok(summary)
}
