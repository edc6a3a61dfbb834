/// Smoke test for `BrowserFetcher` against a live marketplace search.
///
/// Launches headless Chromium, renders the first search URL variant for a
/// sample search and prints what the extractor finds (or the block page
/// it hit instead).
///
/// Run with:
///   cargo run -p carwatch-client --example browser_smoke --features browser
use carwatch_client::search_url::{MARKETPLACE_BASE_URL, marketplace_urls};
use carwatch_client::{BrowserFetcher, MarketplaceExtractor};
use carwatch_core::models::{Location, SearchSpec, Tier};
use carwatch_core::traits::{Fetcher, ListingExtractor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("carwatch=debug,info").init();

    let search = SearchSpec::new(Tier::Free)
        .with_vehicle("Honda", "Civic")
        .with_location(Location::new("Miami, FL"), 25);
    let url = marketplace_urls(MARKETPLACE_BASE_URL, &search)
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("no search URL"))?;

    println!("Launching headless browser…");
    let fetcher = BrowserFetcher::new().await?;

    println!("Fetching {url} …");
    let html = fetcher.fetch(&url).await?;
    println!("Got {} bytes of rendered HTML", html.len());

    let extractor = MarketplaceExtractor::default();
    if let Some(signature) = extractor.blocked_signature(&html) {
        println!("Blocked: {signature}");
        return Ok(());
    }

    let listings = extractor.extract(&html);
    println!("Extracted {} listings", listings.len());
    for listing in &listings {
        println!("  {} | {} | {}", listing.price, listing.title, listing.url.as_deref().unwrap_or("-"));
    }
    Ok(())
}
