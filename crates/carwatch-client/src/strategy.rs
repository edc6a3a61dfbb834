//! Concrete acquisition channels and the [`Source`] enum that dispatches
//! between them.

use std::time::Duration;

use carwatch_core::config::MonitorConfig;
use carwatch_core::error::AppError;
use carwatch_core::models::{CandidateListing, SearchSpec, StrategyKind};
use carwatch_core::pacing::{PacingPolicy, ThrottledFetcher};
use carwatch_core::traits::{Fetcher, ListingExtractor, SourceStrategy};

#[cfg(feature = "browser")]
use crate::browser_fetcher::BrowserFetcher;
use crate::extract::{ClassifiedsExtractor, MarketplaceExtractor};
use crate::fetcher::ReqwestFetcher;
use crate::remote::RemoteWorkerClient;
use crate::search_url::{
    MARKETPLACE_BASE_URL, classifieds_base_url, classifieds_url, marketplace_urls,
};
use crate::synthetic::SyntheticGenerator;

/// Per-host spacing between page requests from one channel.
const PAGE_PACING: PacingPolicy = PacingPolicy {
    min: Duration::from_secs(1),
    max: Duration::from_secs(3),
};

/// Which URL family a page strategy requests.
#[derive(Debug, Clone)]
pub enum SearchUrls {
    Marketplace { base: String },
    Classifieds { base: String },
}

impl SearchUrls {
    pub fn build(&self, search: &SearchSpec) -> Vec<String> {
        match self {
            SearchUrls::Marketplace { base } => marketplace_urls(base, search),
            SearchUrls::Classifieds { base } => vec![classifieds_url(base, search)],
        }
    }
}

// ---------------------------------------------------------------------------
// PageStrategy
// ---------------------------------------------------------------------------

/// Fetch search pages and extract listings from them.
///
/// URL variants are tried in order until one yields listings. A block
/// page ends the attempt at once; other fetch errors move on to the next
/// variant.
#[derive(Clone)]
pub struct PageStrategy<F, X> {
    id: String,
    kind: StrategyKind,
    fetcher: F,
    extractor: X,
    urls: SearchUrls,
}

impl<F: Fetcher, X: ListingExtractor> PageStrategy<F, X> {
    pub fn new(
        id: impl Into<String>,
        kind: StrategyKind,
        fetcher: F,
        extractor: X,
        urls: SearchUrls,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            fetcher,
            extractor,
            urls,
        }
    }
}

impl<F, X> SourceStrategy for PageStrategy<F, X>
where
    F: Fetcher + 'static,
    X: ListingExtractor + 'static,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> StrategyKind {
        self.kind
    }

    async fn attempt(&self, search: &SearchSpec) -> Result<Vec<CandidateListing>, AppError> {
        let mut responded = false;
        let mut last_error = None;

        for url in self.urls.build(search) {
            match self.fetcher.fetch(&url).await {
                Ok(raw) => {
                    responded = true;
                    if let Some(signature) = self.extractor.blocked_signature(&raw) {
                        return Err(AppError::AccessBlocked {
                            worker: self.id.clone(),
                            signature: signature.to_string(),
                        });
                    }
                    let listings = self.extractor.extract(&raw);
                    if !listings.is_empty() {
                        tracing::debug!(worker = %self.id, url = %url, count = listings.len(), "Extracted listings");
                        return Ok(listings);
                    }
                    tracing::debug!(worker = %self.id, url = %url, "No listings on page");
                }
                Err(e) if e.is_block() => return Err(e),
                Err(e) => {
                    tracing::debug!(worker = %self.id, url = %url, error = %e, "URL variant failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if !responded => Err(e),
            _ => Ok(Vec::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// Remote and synthetic
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct RemoteWorkerStrategy {
    client: RemoteWorkerClient,
}

impl RemoteWorkerStrategy {
    pub fn new(client: RemoteWorkerClient) -> Self {
        Self { client }
    }
}

impl SourceStrategy for RemoteWorkerStrategy {
    fn id(&self) -> &str {
        &self.client.config().id
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::RemoteWorker
    }

    async fn attempt(&self, search: &SearchSpec) -> Result<Vec<CandidateListing>, AppError> {
        self.client.scrape(search).await
    }

    async fn probe(&self) -> Option<bool> {
        Some(self.client.health().await)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyntheticStrategy {
    generator: SyntheticGenerator,
}

impl SourceStrategy for SyntheticStrategy {
    fn id(&self) -> &str {
        "synthetic"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Synthetic
    }

    async fn attempt(&self, search: &SearchSpec) -> Result<Vec<CandidateListing>, AppError> {
        Ok(self.generator.generate(search))
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

pub type DirectStrategy = PageStrategy<ThrottledFetcher<ReqwestFetcher>, MarketplaceExtractor>;
pub type SecondaryStrategy = PageStrategy<ThrottledFetcher<ReqwestFetcher>, ClassifiedsExtractor>;
#[cfg(feature = "browser")]
pub type HeadlessStrategy = PageStrategy<ThrottledFetcher<BrowserFetcher>, MarketplaceExtractor>;

/// Every channel the monitor can be configured with.
pub enum Source {
    Remote(RemoteWorkerStrategy),
    Direct(DirectStrategy),
    #[cfg(feature = "browser")]
    Headless(HeadlessStrategy),
    Secondary(SecondaryStrategy),
    Synthetic(SyntheticStrategy),
}

impl SourceStrategy for Source {
    fn id(&self) -> &str {
        match self {
            Source::Remote(s) => s.id(),
            Source::Direct(s) => s.id(),
            #[cfg(feature = "browser")]
            Source::Headless(s) => s.id(),
            Source::Secondary(s) => s.id(),
            Source::Synthetic(s) => s.id(),
        }
    }

    fn kind(&self) -> StrategyKind {
        match self {
            Source::Remote(s) => s.kind(),
            Source::Direct(s) => s.kind(),
            #[cfg(feature = "browser")]
            Source::Headless(s) => s.kind(),
            Source::Secondary(s) => s.kind(),
            Source::Synthetic(s) => s.kind(),
        }
    }

    async fn attempt(&self, search: &SearchSpec) -> Result<Vec<CandidateListing>, AppError> {
        match self {
            Source::Remote(s) => s.attempt(search).await,
            Source::Direct(s) => s.attempt(search).await,
            #[cfg(feature = "browser")]
            Source::Headless(s) => s.attempt(search).await,
            Source::Secondary(s) => s.attempt(search).await,
            Source::Synthetic(s) => s.attempt(search).await,
        }
    }

    async fn probe(&self) -> Option<bool> {
        match self {
            Source::Remote(s) => s.probe().await,
            _ => None,
        }
    }
}

fn page_fetcher(config: &MonitorConfig) -> Result<ThrottledFetcher<ReqwestFetcher>, AppError> {
    let fetcher = match &config.proxy_url {
        Some(proxy) => ReqwestFetcher::with_proxy(config.attempt_timeout, proxy)?,
        None => ReqwestFetcher::with_timeout(config.attempt_timeout)?,
    };
    Ok(ThrottledFetcher::new(fetcher, PAGE_PACING))
}

#[cfg(feature = "browser")]
async fn headless_source(config: &MonitorConfig) -> Option<Source> {
    match BrowserFetcher::with_timeout(config.attempt_timeout).await {
        Ok(browser) => Some(Source::Headless(PageStrategy::new(
            "headless",
            StrategyKind::HeadlessFetch,
            ThrottledFetcher::new(browser, PAGE_PACING),
            MarketplaceExtractor::default(),
            SearchUrls::Marketplace {
                base: MARKETPLACE_BASE_URL.to_string(),
            },
        ))),
        Err(e) => {
            tracing::warn!(error = %e, "Headless browser unavailable; continuing without it");
            None
        }
    }
}

#[cfg(not(feature = "browser"))]
async fn headless_source(_config: &MonitorConfig) -> Option<Source> {
    tracing::warn!("Headless fallback requested but this build lacks the `browser` feature");
    None
}

/// Build the configured channels in fallback-chain order.
///
/// Remote workers come first, then direct fetch, then the headless
/// variant when enabled, then the classifieds source, then synthetic data
/// when enabled.
pub async fn build_sources(config: &MonitorConfig) -> Result<Vec<Source>, AppError> {
    let mut sources = Vec::new();

    for worker in &config.remote_workers {
        let client = RemoteWorkerClient::new(worker.clone(), config.attempt_timeout)?;
        sources.push(Source::Remote(RemoteWorkerStrategy::new(client)));
    }

    sources.push(Source::Direct(PageStrategy::new(
        "direct",
        StrategyKind::DirectFetch,
        page_fetcher(config)?,
        MarketplaceExtractor::default(),
        SearchUrls::Marketplace {
            base: MARKETPLACE_BASE_URL.to_string(),
        },
    )));

    if config.headless_fallback {
        sources.extend(headless_source(config).await);
    }

    let classifieds_base = classifieds_base_url(&config.secondary_site);
    sources.push(Source::Secondary(PageStrategy::new(
        "classifieds",
        StrategyKind::SecondarySource,
        page_fetcher(config)?,
        ClassifiedsExtractor::new(classifieds_base.clone()),
        SearchUrls::Classifieds {
            base: classifieds_base,
        },
    )));

    if config.synthetic_data {
        sources.push(Source::Synthetic(SyntheticStrategy::default()));
    }

    tracing::info!(
        sources = ?sources.iter().map(|s| s.id()).collect::<Vec<_>>(),
        "Acquisition channels configured"
    );
    Ok(sources)
}
