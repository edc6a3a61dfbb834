use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use carwatch_client::{Source, build_sources};
use carwatch_core::models::{DEFAULT_RADIUS_MILES, EnrichedListing, Location, SearchSpec, Tier};
use carwatch_core::traits::{ListingStore, NullStore};
use carwatch_core::{
    Condition, Deduplicator, FetchOrchestrator, MonitorConfig, MonitorService, TieredScheduler,
    TracingSchedulerReporter, ValuationEngine,
};
use carwatch_db::{Database, DatabaseConfig};

#[derive(Parser)]
#[command(name = "carwatch", version, about = "Vehicle listing monitor and deal scorer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor every active search until interrupted (requires DATABASE_URL)
    Run,

    /// Poll one search and print the listings it produces
    Once {
        /// Saved search to poll, loaded from the database
        #[arg(long, conflicts_with_all = ["make", "model", "location"])]
        search_id: Option<Uuid>,

        #[command(flatten)]
        criteria: SearchArgs,

        /// Persist new listings and update dedup state (requires --search-id)
        #[arg(long, default_value_t = false, requires = "search_id")]
        save: bool,
    },

    /// Estimate a vehicle's market value and optionally score an asking price
    Estimate {
        #[arg(long)]
        make: String,

        #[arg(long)]
        model: String,

        /// Model year
        #[arg(short, long)]
        year: i32,

        /// Odometer reading in miles
        #[arg(short, long)]
        mileage: Option<u32>,

        /// excellent, very_good, good, fair or poor
        #[arg(short, long, default_value = "good")]
        condition: Condition,

        /// Asking price to score against the estimate
        #[arg(short, long)]
        price: Option<u32>,
    },

    /// Probe remote workers and show the state of every source worker
    Workers,
}

/// Ad-hoc search criteria for `once` without a saved search.
#[derive(Args)]
struct SearchArgs {
    #[arg(long)]
    make: Option<String>,

    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    year_min: Option<i32>,

    #[arg(long)]
    year_max: Option<i32>,

    #[arg(long)]
    price_min: Option<u32>,

    #[arg(long)]
    price_max: Option<u32>,

    #[arg(long)]
    mileage_max: Option<u32>,

    /// City or area, e.g. "Miami, FL"
    #[arg(long)]
    location: Option<String>,

    /// Search radius in miles
    #[arg(long, default_value_t = DEFAULT_RADIUS_MILES)]
    radius: u32,

    /// Tier the search is treated as (premium, pro or free)
    #[arg(long, default_value = "free")]
    tier: Tier,
}

impl SearchArgs {
    fn into_spec(self) -> SearchSpec {
        let mut search = SearchSpec::new(self.tier)
            .with_years(self.year_min, self.year_max)
            .with_prices(self.price_min, self.price_max)
            .with_location(Location::new(self.location.unwrap_or_default()), self.radius);
        search.make = self.make;
        search.model = self.model;
        if let Some(max) = self.mileage_max {
            search = search.with_mileage_max(max);
        }
        search
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("carwatch=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            let config = MonitorConfig::from_env()?;
            let db = connect_db().await?;
            cmd_run(&config, &db).await?;
        }
        Commands::Once {
            search_id,
            criteria,
            save,
        } => {
            let config = MonitorConfig::from_env()?;
            cmd_once(&config, search_id, criteria, save).await?;
        }
        Commands::Estimate {
            make,
            model,
            year,
            mileage,
            condition,
            price,
        } => {
            cmd_estimate(&make, &model, year, mileage, condition, price)?;
        }
        Commands::Workers => {
            let config = MonitorConfig::from_env()?;
            cmd_workers(&config).await?;
        }
    }

    Ok(())
}

/// Connect to PostgreSQL using DATABASE_URL and apply migrations.
async fn connect_db() -> Result<Database> {
    let config = DatabaseConfig::from_env()
        .context("DATABASE_URL not set. Required for run and once --search-id.")?;

    let db = Database::connect(&config)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await.map_err(|e| anyhow::anyhow!(e))?;

    Ok(db)
}

async fn build_orchestrator(config: &MonitorConfig) -> Result<FetchOrchestrator<Source>> {
    let sources = build_sources(config)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    if sources.is_empty() {
        bail!("No acquisition sources configured");
    }
    Ok(FetchOrchestrator::new(sources, config.orchestrator_config()))
}

fn monitor_service<L: ListingStore>(
    orchestrator: FetchOrchestrator<Source>,
    store: L,
    config: &MonitorConfig,
) -> MonitorService<Source, L> {
    MonitorService::new(orchestrator, store)
        .with_dedup(Deduplicator::new(&config.dedup_config()))
        .with_warm_dedup(config.warm_dedup)
}

async fn cmd_run(config: &MonitorConfig, db: &Database) -> Result<()> {
    let monitor = monitor_service(build_orchestrator(config).await?, db.listing_repo(), config);
    let scheduler = TieredScheduler::new(db.search_repo(), Arc::new(monitor), config.scheduler_config());

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received, finishing current search");
            shutdown.cancel();
        }
    });

    scheduler
        .run(cancel, &TracingSchedulerReporter)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    Ok(())
}

async fn cmd_once(
    config: &MonitorConfig,
    search_id: Option<Uuid>,
    criteria: SearchArgs,
    save: bool,
) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;

    let listings = match search_id {
        Some(id) => {
            let db = connect_db().await?;
            let search = db
                .search_repo()
                .get(id)
                .await
                .map_err(|e| anyhow::anyhow!(e))?
                .with_context(|| format!("Search {id} not found"))?;
            tracing::info!(search_id = %id, tier = %search.tier, save, "Polling saved search");

            if save {
                monitor_service(orchestrator, db.listing_repo(), config)
                    .monitor_once(&search)
                    .await
                    .map_err(|e| anyhow::anyhow!(e))?
            } else {
                monitor_service(orchestrator, NullStore, config)
                    .preview(&search)
                    .await
            }
        }
        None => {
            let search = criteria.into_spec();
            tracing::info!(query = %search.query_text(), tier = %search.tier, "Previewing ad-hoc search");
            monitor_service(orchestrator, NullStore, config)
                .preview(&search)
                .await
        }
    };

    print_listings(&listings);
    println!("{}", serde_json::to_string_pretty(&listings)?);
    Ok(())
}

fn print_listings(listings: &[EnrichedListing]) {
    eprintln!("{} listing(s)", listings.len());
    for listing in listings {
        let rating = listing
            .deal
            .as_ref()
            .map(|d| format!("{} ({})", d.rating, d.score))
            .unwrap_or_else(|| "unscored".to_string());
        eprintln!("  {:<48} {:>10}  {}", listing.listing.title, listing.listing.price, rating);
    }
}

fn cmd_estimate(
    make: &str,
    model: &str,
    year: i32,
    mileage: Option<u32>,
    condition: Condition,
    price: Option<u32>,
) -> Result<()> {
    let engine = ValuationEngine::current();
    let estimate = engine.estimate_value(make, model, year, mileage, condition);
    let deal = price.map(|p| engine.score_deal(p, &estimate));

    let output = serde_json::json!({
        "make": make,
        "model": model,
        "year": year,
        "mileage": mileage,
        "estimate": estimate,
        "deal": deal,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn cmd_workers(config: &MonitorConfig) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;
    let probed = orchestrator.probe_health().await;

    println!("Probed {probed} remote worker(s)\n");
    println!(
        "{:<20} {:<18} {:<8} {:>6} {:>6} {:>8}  LAST ERROR",
        "ID", "KIND", "HEALTHY", "OK", "FAIL", "RATE"
    );
    println!("{}", "-".repeat(90));

    for state in orchestrator.worker_states() {
        println!(
            "{:<20} {:<18} {:<8} {:>6} {:>6} {:>7.0}%  {}",
            state.id,
            state.kind.as_str(),
            if state.healthy { "yes" } else { "no" },
            state.success_count,
            state.failure_count,
            state.success_rate * 100.0,
            state.last_error.as_deref().unwrap_or("-"),
        );
    }

    Ok(())
}
