use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use carwatch_core::error::AppError;
use carwatch_core::traits::Fetcher;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;

use crate::fetcher::random_user_agent;

/// Scroll passes that trigger lazy-loaded listing cards.
const SCROLL_PASSES: usize = 3;
const SCROLL_SETTLE: Duration = Duration::from_millis(1500);

/// Headless-Chromium fetcher for marketplace pages that only render
/// listings client-side.
///
/// One Chromium process is shared by all clones. Each fetch opens a tab,
/// scrolls to load more cards, grabs the DOM and closes the tab.
#[derive(Clone)]
pub struct BrowserFetcher {
    browser: Arc<Browser>,
    timeout: Duration,
}

impl BrowserFetcher {
    pub async fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(30)).await
    }

    /// Launch with a per-page timeout covering navigation and scrolling.
    pub async fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let mut builder = BrowserConfig::builder().no_sandbox().disable_default_args();

        if let Some(bin) = Self::find_chrome_binary() {
            tracing::info!(binary = %bin.display(), "Using Chrome binary");
            builder = builder.chrome_executable(bin);
        }

        let config = builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--window-size=1920,1080")
            .arg(format!("--user-agent={}", random_user_agent()))
            .arg("--no-first-run")
            .build()
            .map_err(|e| AppError::Generic(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::Generic(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled for the connection to stay alive.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::warn!(error = %e, "Browser CDP handler error");
                    break;
                }
            }
        });

        Ok(Self {
            browser: Arc::new(browser),
            timeout,
        })
    }

    /// `CARWATCH_CHROME_BIN`, then well-known install paths. `None` lets
    /// chromiumoxide do its own lookup.
    fn find_chrome_binary() -> Option<PathBuf> {
        if let Ok(p) = std::env::var("CARWATCH_CHROME_BIN") {
            let path = PathBuf::from(p);
            if path.exists() {
                return Some(path);
            }
        }

        [
            "/snap/chromium/current/usr/lib/chromium-browser/chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
        ]
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
    }
}

impl Fetcher for BrowserFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let timeout = self.timeout;

        let result = tokio::time::timeout(timeout, async {
            let page = self
                .browser
                .new_page(url)
                .await
                .map_err(|e| AppError::HttpError(format!("Failed to navigate to {url}: {e}")))?;

            page.find_element("body")
                .await
                .map_err(|e| AppError::HttpError(format!("Page did not render body: {e}")))?;

            for _ in 0..SCROLL_PASSES {
                if let Err(e) = page
                    .evaluate("window.scrollTo(0, document.body.scrollHeight)")
                    .await
                {
                    tracing::debug!(error = %e, "Scroll failed");
                    break;
                }
                tokio::time::sleep(SCROLL_SETTLE).await;
            }

            let html = page
                .content()
                .await
                .map_err(|e| AppError::HttpError(format!("Failed to read page content: {e}")))?;

            if let Err(e) = page.close().await {
                tracing::debug!(error = %e, "Failed to close tab");
            }
            Ok::<String, AppError>(html)
        })
        .await;

        result.unwrap_or(Err(AppError::Timeout(timeout.as_secs())))
    }
}
