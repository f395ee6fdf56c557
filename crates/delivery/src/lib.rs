//! Outbound delivery of dashboard alerts.
//!
//! - [`Notifier`] — capability the run orchestrator depends on.
//! - [`WebhookNotifier`] — HTTP webhook implementation.

pub mod webhook;

pub use webhook::{AlertMessage, DeliveryError, Notifier, WebhookConfig, WebhookNotifier};
