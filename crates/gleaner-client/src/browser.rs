use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::fetch::{
    EnableParams, EventRequestPaused, FailRequestParams, RequestPattern,
};
use chromiumoxide::cdp::browser_protocol::network::{ErrorReason, ResourceType};
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use gleaner_core::error::AppError;
use gleaner_core::profile::Locator;
use gleaner_core::traits::{PageSession, SessionFactory};
use tokio::task::JoinHandle;

use crate::http::DESKTOP_USER_AGENT;
use crate::script;

/// Interval between readiness probes.
const READY_POLL: Duration = Duration::from_millis(250);

/// Subresources that are never downloaded.
const BLOCKED_RESOURCES: [ResourceType; 3] =
    [ResourceType::Image, ResourceType::Media, ResourceType::Font];

/// Launch options for [`BrowserSessionFactory`].
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    /// Show the browser window.
    pub headful: bool,
    pub user_agent: String,
    pub viewport: (u32, u32),
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headful: false,
            user_agent: DESKTOP_USER_AGENT.to_string(),
            viewport: (1366, 768),
        }
    }
}

/// Page sessions backed by one shared Chromium process.
///
/// Each [`SessionFactory::open`] call creates a tab with the desktop user
/// agent and viewport, and with image, media and font requests failed
/// before they leave the browser.
///
/// # Example
///
/// ```rust,no_run
/// use gleaner_client::{BrowserOptions, BrowserSessionFactory};
/// use gleaner_core::traits::{PageSession, SessionFactory};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let factory = BrowserSessionFactory::launch(BrowserOptions::default()).await?;
/// let mut page = factory.open().await?;
/// page.navigate("https://example.com", std::time::Duration::from_secs(25)).await?;
/// page.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BrowserSessionFactory {
    browser: Arc<Browser>,
    options: BrowserOptions,
}

impl BrowserSessionFactory {
    /// Launch Chromium.
    ///
    /// Requires a Chromium / Chrome binary reachable via `$PATH`, one of
    /// the well-known install locations, or `$CHROME_BIN`.
    pub async fn launch(options: BrowserOptions) -> Result<Self, AppError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .disable_default_args()
            .window_size(options.viewport.0, options.viewport.1);

        if let Some(bin) = find_chrome_binary() {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }

        if options.headful {
            builder = builder.with_head();
        } else {
            builder = builder.arg("--headless=new");
        }

        let config = builder
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--no-first-run")
            .build()
            .map_err(|e| AppError::BrowserError(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled continuously for the connection to work.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("Browser CDP handler error: {event:?}");
                    break;
                }
            }
        });

        Ok(Self {
            browser: Arc::new(browser),
            options,
        })
    }

    async fn configure(&self, page: &Page) -> Result<JoinHandle<()>, CdpError> {
        page.set_user_agent(self.options.user_agent.as_str()).await?;
        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(self.options.viewport.0),
            i64::from(self.options.viewport.1),
            1.0,
            false,
        ))
        .await?;

        let mut paused = page.event_listener::<EventRequestPaused>().await?;
        page.execute(
            EnableParams::builder()
                .patterns(
                    BLOCKED_RESOURCES
                        .iter()
                        .map(|kind| RequestPattern::builder().resource_type(kind.clone()).build()),
                )
                .build(),
        )
        .await?;

        let blocker = page.clone();
        Ok(tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let fail = FailRequestParams::new(event.request_id.clone(), ErrorReason::BlockedByClient);
                if let Err(e) = blocker.execute(fail).await {
                    tracing::debug!(error = %e, "Failed to block subresource");
                }
            }
        }))
    }
}

impl SessionFactory for BrowserSessionFactory {
    type Session = BrowserSession;

    async fn open(&self) -> Result<BrowserSession, AppError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to open tab: {e}")))?;

        match self.configure(&page).await {
            Ok(blocker) => Ok(BrowserSession { page, blocker }),
            Err(e) => {
                let _ = page.close().await;
                Err(AppError::BrowserError(format!("Failed to configure tab: {e}")))
            }
        }
    }
}

/// One browser tab owned by a worker.
pub struct BrowserSession {
    page: Page,
    blocker: JoinHandle<()>,
}

impl BrowserSession {
    async fn exists(&self, marker: &Locator) -> Result<bool, AppError> {
        self.page
            .evaluate(script::exists_script(marker))
            .await
            .map_err(|e| map_cdp_error(e, AppError::ExtractionError))?
            .into_value::<bool>()
            .map_err(|e| AppError::ExtractionError(format!("Unexpected readiness result: {e}")))
    }
}

impl PageSession for BrowserSession {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), AppError> {
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(map_cdp_error(e, |msg| {
                AppError::NavigationError(format!("Failed to navigate to {url}: {msg}"))
            })),
            Err(_) => Err(AppError::Timeout(timeout.as_secs())),
        }
    }

    async fn wait_for_ready(&mut self, marker: &Locator, timeout: Duration) -> Result<(), AppError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.exists(marker).await? {
                return Ok(());
            }
            if tokio::time::Instant::now() + READY_POLL > deadline {
                return Err(AppError::ReadinessTimeout {
                    marker: marker.to_string(),
                    seconds: timeout.as_secs(),
                });
            }
            tokio::time::sleep(READY_POLL).await;
        }
    }

    async fn read_texts(&mut self, locators: &[&Locator]) -> Result<Vec<Option<String>>, AppError> {
        self.page
            .evaluate(script::read_texts_script(locators))
            .await
            .map_err(|e| map_cdp_error(e, AppError::ExtractionError))?
            .into_value::<Vec<Option<String>>>()
            .map_err(|e| AppError::ExtractionError(format!("Unexpected field values: {e}")))
    }

    async fn close(self) -> Result<(), AppError> {
        self.blocker.abort();
        self.page
            .close()
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to close tab: {e}")))
    }
}

/// Transport failures mean the browser is gone; everything else is page-level.
fn map_cdp_error(err: CdpError, page_error: impl FnOnce(String) -> AppError) -> AppError {
    match err {
        CdpError::Ws(_) | CdpError::ChannelSendError(_) => AppError::BrowserError(err.to_string()),
        other => page_error(other.to_string()),
    }
}

/// Locate the real Chrome/Chromium binary.
///
/// The snap wrapper at `/snap/bin/chromium` strips unknown CLI flags, so
/// the binary inside the snap is tried first. `None` lets chromiumoxide
/// do its own lookup.
fn find_chrome_binary() -> Option<PathBuf> {
    let candidates: &[&str] = &[
        "/snap/chromium/current/usr/lib/chromium-browser/chrome",
        "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
    ];

    if let Ok(p) = std::env::var("CHROME_BIN") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    candidates.iter().map(PathBuf::from).find(|p| p.exists())
}
