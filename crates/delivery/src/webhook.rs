//! Chat webhook delivery.
//!
//! [`WebhookNotifier`] posts one JSON message per alert to the configured
//! endpoint. The endpoint acknowledges with HTTP 202; every other outcome is
//! reported back as a [`DeliveryError`]. No retry is attempted here: the
//! caller decides whether a failure ends the run, and anything left
//! undelivered is picked up by the next scheduled run.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;

use zbxwatch_core::env;
use zbxwatch_core::{AlertRow, ConfigError};

/// Status the webhook returns when it accepted a message.
pub const ACCEPTED: StatusCode = StatusCode::ACCEPTED;

/// Default HTTP request timeout for a single delivery.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for webhook delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The webhook answered with something other than 202 Accepted.
    #[error("Webhook returned HTTP {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Capability to forward one alert to the outside world.
///
/// `Ok(())` means the alert was accepted and may be recorded as sent.
pub trait Notifier: Send + Sync {
    fn notify(&self, row: &AlertRow) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Webhook endpoint settings.
#[derive(Clone)]
pub struct WebhookConfig {
    pub url: String,
    pub token: String,
    pub request_timeout: Duration,
}

impl WebhookConfig {
    /// | Env Var                | Default |
    /// |------------------------|---------|
    /// | `URL_TEAMS`            | --      |
    /// | `TOKEN_TEAMS`          | --      |
    /// | `WEBHOOK_TIMEOUT_SECS` | `10`    |
    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            url: env::required(lookup, "URL_TEAMS")?,
            token: env::required(lookup, "TOKEN_TEAMS")?,
            request_timeout: Duration::from_secs(env::parsed_or(
                lookup,
                "WEBHOOK_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?),
        })
    }
}

impl fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// JSON body understood by the chat flow on the other end of the webhook.
#[derive(Debug, Serialize)]
pub struct AlertMessage<'a> {
    #[serde(rename = "Token")]
    pub token: &'a str,
    #[serde(rename = "Hora")]
    pub time: &'a str,
    #[serde(rename = "Status")]
    pub status: &'a str,
    #[serde(rename = "Host")]
    pub host: &'a str,
    #[serde(rename = "Incidente")]
    pub incident: &'a str,
    #[serde(rename = "Duração")]
    pub duration: &'a str,
    #[serde(rename = "Reconhecido")]
    pub acknowledged: &'a str,
}

impl<'a> AlertMessage<'a> {
    pub fn new(token: &'a str, row: &'a AlertRow) -> Self {
        Self {
            token,
            time: row.time(),
            status: row.status(),
            host: row.host(),
            incident: row.incident(),
            duration: row.duration(),
            acknowledged: row.acknowledged(),
        }
    }
}

// ---------------------------------------------------------------------------
// WebhookNotifier
// ---------------------------------------------------------------------------

/// Delivers alerts to a chat webhook over HTTP.
pub struct WebhookNotifier {
    client: reqwest::Client,
    config: WebhookConfig,
}

impl WebhookNotifier {
    /// Create a notifier with a pre-configured HTTP client.
    pub fn new(config: WebhookConfig) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }
}

impl Notifier for WebhookNotifier {
    async fn notify(&self, row: &AlertRow) -> Result<(), DeliveryError> {
        let message = AlertMessage::new(&self.config.token, row);

        let response = self
            .client
            .post(&self.config.url)
            .json(&message)
            .send()
            .await?;

        let status = response.status();
        if status != ACCEPTED {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(status = status.as_u16(), body = %body, "Webhook rejected alert");
            return Err(DeliveryError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(host = row.host(), "Webhook accepted alert");
        Ok(())
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

    fn row() -> AlertRow {
        let cells = [
            "2024-01-01T10:00",
            "",
            "PROBLEM",
            "",
            "host1",
            "Disk full",
            "5m",
            "No",
            "",
        ];
        AlertRow::try_from_cells(cells.iter().map(|c| c.to_string()).collect())
            .expect("nine cells")
    }

    #[test]
    fn message_uses_dashboard_column_names() {
        let row = row();
        let json = serde_json::to_value(AlertMessage::new("secret", &row)).expect("serialize");

        assert_eq!(json["Token"], "secret");
        assert_eq!(json["Hora"], "2024-01-01T10:00");
        assert_eq!(json["Status"], "PROBLEM");
        assert_eq!(json["Host"], "host1");
        assert_eq!(json["Incidente"], "Disk full");
        assert_eq!(json["Duração"], "5m");
        assert_eq!(json["Reconhecido"], "No");
        assert_eq!(json.as_object().map(|o| o.len()), Some(7));
    }

    #[test]
    fn unexpected_status_display() {
        let err = DeliveryError::UnexpectedStatus {
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "Webhook returned HTTP 500: boom");
    }

    #[test]
    fn request_error_display() {
        // Build a reqwest error from an invalid URL.
        let req_err = reqwest::Client::new().get("://bad").build().unwrap_err();
        let err = DeliveryError::Request(req_err);
        assert!(err.to_string().contains("HTTP request failed"));
    }

    #[test]
    fn config_requires_url_and_token() {
        let vars: HashMap<&str, &str> = HashMap::from([("URL_TEAMS", "http://hook")]);
        let lookup = |k: &str| vars.get(k).map(|v| v.to_string());
        assert_matches!(
            WebhookConfig::from_lookup(&lookup),
            Err(ConfigError::Missing("TOKEN_TEAMS"))
        );
    }

    #[test]
    fn config_debug_redacts_token() {
        let config = WebhookConfig {
            url: "http://hook".to_string(),
            token: "top-secret".to_string(),
            request_timeout: Duration::from_secs(10),
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("top-secret"));
        assert!(rendered.contains("http://hook"));
    }
}
