//! Access to the monitoring dashboard.
//!
//! [`DashboardScraper`] is the capability the run orchestrator depends on;
//! [`BrowserDashboard`] implements it with a headless Chromium.

pub mod browser;
pub mod scraper;

pub use browser::BrowserDashboard;
pub use scraper::{DashboardConfig, DashboardError, DashboardScraper};
