#[cfg(feature = "browser")]
pub mod browser_fetcher;
pub mod extract;
pub mod fetcher;
pub mod remote;
pub mod search_url;
pub mod strategy;
pub mod synthetic;

#[cfg(feature = "browser")]
pub use browser_fetcher::BrowserFetcher;
pub use extract::{ClassifiedsExtractor, MarketplaceExtractor};
pub use fetcher::ReqwestFetcher;
pub use remote::RemoteWorkerClient;
pub use strategy::{PageStrategy, SearchUrls, Source, build_sources};
pub use synthetic::SyntheticGenerator;
