//! Headless Chromium implementation of [`DashboardScraper`].
//!
//! The browser is driven over the DevTools protocol. Its event handler runs
//! on a background task for as long as the session is open; [`close`]
//! shuts the browser down and stops that task.
//!
//! Every step is bounded by [`DashboardConfig::navigation_timeout`]. Only
//! starting the browser process is retried; login and navigation failures
//! end the run.
//!
//! [`close`]: DashboardScraper::close

use std::future::Future;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::EventLifecycleEvent;
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use zbxwatch_core::RawRow;

use crate::scraper::{DashboardConfig, DashboardError, DashboardScraper};

/// Launch backoff in seconds; the last delay repeats for later attempts.
const LAUNCH_RETRY_DELAYS_SECS: [u64; 3] = [1, 2, 4];

/// Interval between checks while waiting for the login form to go away.
const LOGIN_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// `Page.lifecycleEvent` names: a new document committed, and no network
/// activity for 500 ms on it.
const LIFECYCLE_INIT: &str = "init";
const LIFECYCLE_NETWORK_IDLE: &str = "networkIdle";

/// Login form fields on the Zabbix sign-in page.
pub const USERNAME_INPUT_XPATH: &str = "//html/body/main/div[2]/form/ul/li[1]/input";
pub const PASSWORD_INPUT_XPATH: &str = "//html/body/main/div[2]/form/ul/li[2]/input";
pub const SIGN_IN_BUTTON_XPATH: &str = "//html/body/main/div[2]/form/ul/li[4]/button";

/// Cells of a matched row.
const CELL_SELECTOR: &str = "td";

/// A running headless browser with one open tab.
pub struct BrowserDashboard {
    browser: Browser,
    handler: JoinHandle<()>,
    page: Page,
    config: DashboardConfig,
    row_selector: String,
}

impl BrowserDashboard {
    /// Start the browser, retrying up to `config.launch_attempts` times.
    pub async fn launch(config: DashboardConfig) -> Result<Self, DashboardError> {
        let mut attempt: u32 = 1;
        loop {
            match Self::try_launch(&config).await {
                Ok(dashboard) => {
                    tracing::info!(attempt, "Browser started");
                    return Ok(dashboard);
                }
                Err(e) if attempt < config.launch_attempts => {
                    let delay = launch_retry_delay(attempt);
                    tracing::warn!(
                        attempt,
                        error = %e,
                        delay_secs = delay.as_secs(),
                        "Browser launch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(attempts = attempt, error = %e, "Browser launch failed after all attempts");
                    return Err(e);
                }
            }
        }
    }

    async fn try_launch(config: &DashboardConfig) -> Result<Self, DashboardError> {
        let browser_config = BrowserConfig::builder()
            .chrome_executable(&config.browser_path)
            .new_headless_mode()
            .no_sandbox()
            .arg("--disable-gpu")
            .request_timeout(config.navigation_timeout)
            .build()
            .map_err(DashboardError::Launch)?;

        let (browser, mut events) = Browser::launch(browser_config)
            .await
            .map_err(|e| DashboardError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "Browser event error");
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(source) => {
                handler.abort();
                return Err(DashboardError::Browser {
                    stage: "open tab",
                    source,
                });
            }
        };

        Ok(Self {
            browser,
            handler,
            page,
            row_selector: config.row_selector(),
            config: config.clone(),
        })
    }
}

impl DashboardScraper for BrowserDashboard {
    async fn authenticate(&mut self) -> Result<(), DashboardError> {
        let timeout = self.config.navigation_timeout;
        let page = &self.page;

        tracing::info!(url = %self.config.login_url, "Opening dashboard login page");
        bounded(timeout, "login page", async {
            page.goto(self.config.login_url.as_str()).await?;
            Ok::<_, CdpError>(())
        })
        .await?;

        tracing::info!(user = %self.config.username, "Submitting login form");
        let (username, password) = (&self.config.username, &self.config.password);
        let login_url = bounded(timeout, "login form", async {
            let login_url = page.url().await?;
            page.find_xpath(USERNAME_INPUT_XPATH)
                .await?
                .click()
                .await?
                .type_str(username)
                .await?;
            page.find_xpath(PASSWORD_INPUT_XPATH)
                .await?
                .click()
                .await?
                .type_str(password)
                .await?;
            page.find_xpath(SIGN_IN_BUTTON_XPATH).await?.click().await?;
            Ok::<_, CdpError>(login_url)
        })
        .await?;

        // A successful sign-in redirects away from the form. A rejected one
        // re-renders it, so only a form that outlives the timeout counts.
        let login_url = login_url.as_deref();
        let left_form = poll_until(timeout, LOGIN_POLL_INTERVAL, move || async move {
            match page.url().await {
                Ok(url) if url.as_deref() != login_url => return true,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "Page URL unavailable while signing in");
                    return false;
                }
            }
            match page.find_xpaths(PASSWORD_INPUT_XPATH).await {
                Ok(fields) => fields.is_empty(),
                Err(e) => {
                    tracing::debug!(error = %e, "Login form lookup failed while signing in");
                    false
                }
            }
        })
        .await;
        if !left_form {
            return Err(DashboardError::AuthRejected);
        }

        tracing::info!("Authenticated");
        Ok(())
    }

    async fn load_view(&mut self) -> Result<(), DashboardError> {
        let page = &self.page;
        let url = self.config.dashboard_url.as_str();
        let timeout = self.config.navigation_timeout;

        tracing::info!(url = %url, "Opening dashboard view");
        let (events, watch) = bounded(timeout, "dashboard navigation", async {
            // Subscribe before navigating so the new document's events are
            // not missed.
            let frame = page.mainframe().await?.map(|id| id.inner().clone());
            let events = page
                .event_listener::<EventLifecycleEvent>()
                .await?
                .map(|event| Lifecycle::from(&*event));
            page.goto(url).await?;
            Ok::<_, CdpError>((events, IdleWatch::new(frame)))
        })
        .await?;

        let idle = bounded(timeout, "dashboard network idle", async {
            Ok::<_, CdpError>(wait_network_idle(events, watch).await)
        })
        .await?;
        if !idle {
            return Err(DashboardError::SessionClosed {
                stage: "dashboard network idle",
            });
        }

        tracing::info!("Dashboard view settled");
        Ok(())
    }

    async fn extract_matching_rows(&mut self) -> Result<Vec<RawRow>, DashboardError> {
        let page = &self.page;
        let selector = self.row_selector.as_str();

        let extraction = async {
            let rows = page.find_elements(selector).await?;
            tracing::info!(count = rows.len(), selector, "Located rows with forwarded severities");

            let mut extracted = Vec::with_capacity(rows.len());
            for row in rows {
                let cells = row.find_elements(CELL_SELECTOR).await?;
                let mut texts = Vec::with_capacity(cells.len());
                for cell in cells {
                    texts.push(cell.inner_text().await?.unwrap_or_default());
                }
                extracted.push(texts);
            }
            Ok::<_, CdpError>(extracted)
        };

        bounded(self.config.navigation_timeout, "row extraction", extraction).await
    }

    async fn close(mut self) -> Result<(), DashboardError> {
        let timeout = self.config.navigation_timeout;
        let closed = bounded(timeout, "browser close", async {
            self.browser.close().await?;
            Ok::<_, CdpError>(())
        })
        .await;

        if let Err(e) = self.browser.wait().await {
            tracing::warn!(error = %e, "Failed to reap browser process");
        }
        self.handler.abort();

        tracing::info!("Browser closed");
        closed
    }
}

/// Run `fut`, mapping its DevTools error and the timeout to
/// [`DashboardError`] tagged with `stage`.
async fn bounded<T, F>(timeout: Duration, stage: &'static str, fut: F) -> Result<T, DashboardError>
where
    F: Future<Output = Result<T, CdpError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(|source| DashboardError::Browser { stage, source }),
        Err(_) => Err(DashboardError::Timeout { stage, timeout }),
    }
}

/// One `Page.lifecycleEvent`, reduced to the fields the idle wait reads.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Lifecycle {
    frame: String,
    loader: String,
    name: String,
}

impl From<&EventLifecycleEvent> for Lifecycle {
    fn from(event: &EventLifecycleEvent) -> Self {
        Self {
            frame: event.frame_id.inner().clone(),
            loader: event.loader_id.inner().clone(),
            name: event.name.clone(),
        }
    }
}

/// Tracks lifecycle events of the main frame and reports network idle for
/// a document committed after the watch was created. Idle events of the
/// document that was showing before are ignored.
#[derive(Debug, Default)]
struct IdleWatch {
    frame: Option<String>,
    loader: Option<String>,
}

impl IdleWatch {
    fn new(frame: Option<String>) -> Self {
        Self { frame, loader: None }
    }

    fn observe(&mut self, event: &Lifecycle) -> bool {
        if self.frame.as_deref().is_some_and(|frame| frame != event.frame) {
            return false;
        }
        match event.name.as_str() {
            LIFECYCLE_INIT => {
                self.loader = Some(event.loader.clone());
                false
            }
            LIFECYCLE_NETWORK_IDLE => self.loader.as_deref() == Some(event.loader.as_str()),
            _ => false,
        }
    }
}

/// Consume `events` until `watch` sees network idle. `false` if the stream
/// ends first, which happens when the tab goes away.
async fn wait_network_idle<S>(events: S, mut watch: IdleWatch) -> bool
where
    S: Stream<Item = Lifecycle>,
{
    let mut events = std::pin::pin!(events);
    while let Some(event) = events.next().await {
        if watch.observe(&event) {
            return true;
        }
    }
    false
}

/// Evaluate `done` every `interval` until it holds or `timeout` has passed.
/// Returns whether it held.
async fn poll_until<F, Fut>(timeout: Duration, interval: Duration, mut done: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if done().await {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}

/// Backoff before launch attempt `attempt + 1`.
fn launch_retry_delay(attempt: u32) -> Duration {
    let idx = (attempt as usize)
        .saturating_sub(1)
        .min(LAUNCH_RETRY_DELAYS_SECS.len() - 1);
    Duration::from_secs(LAUNCH_RETRY_DELAYS_SECS[idx])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
