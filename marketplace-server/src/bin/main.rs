use clap::{Parser, Subcommand};
use common::db::{init_db_pool, run_migrations};
use common::Error;
use dotenv::dotenv;
use marketplace_server::{demo, Marketplace, MarketplaceConfig};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Bazaar marketplace CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Set the log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Commands
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the marketplace core and wait for Ctrl+C
    Start {
        /// Database URL; the in-memory store is used when absent
        #[arg(short, long)]
        database_url: Option<String>,

        /// Database pool size
        #[arg(short, long)]
        pool_size: Option<u32>,

        /// Minutes after a meeting before ratings are accepted
        #[arg(short, long)]
        rating_delay: Option<i64>,
    },
    /// Run one end-to-end flow against an in-memory store
    Demo,
    /// Apply database migrations and exit
    Migrate {
        /// Database URL
        #[arg(short, long)]
        database_url: Option<String>,
    },
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "marketplace_server={level},ledger_service={level},listing_service={level},booking_service={level},common={level}",
            level = log_level
        ))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    // Parse command line arguments
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Commands::Start { database_url, pool_size, rating_delay } => {
            let mut config = MarketplaceConfig::from_env();
            if database_url.is_some() {
                config.database_url = database_url;
            }
            if let Some(pool_size) = pool_size {
                config.db_pool_size = pool_size;
            }
            if let Some(minutes) = rating_delay {
                config.rating_delay_minutes = minutes;
            }

            info!(
                "Starting marketplace with {} store, database pool size: {}",
                if config.database_url.is_some() { "PostgreSQL" } else { "in-memory" },
                config.db_pool_size
            );
            let _marketplace = Marketplace::with_config(&config).await?;

            info!("Marketplace started. Press Ctrl+C to stop.");
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("Shutting down marketplace...");
                }
                Err(err) => {
                    error!("Error waiting for Ctrl+C: {}", err);
                }
            }
        }
        Commands::Demo => {
            let marketplace = Marketplace::with_config(&MarketplaceConfig::in_memory()).await?;
            demo::run(&marketplace).await?;
            info!("Demo finished");
        }
        Commands::Migrate { database_url } => {
            let config = MarketplaceConfig::from_env();
            let url = database_url.or(config.database_url).ok_or_else(|| {
                Error::ConfigurationError("DATABASE_URL must be set to migrate".to_string())
            })?;
            let pool = init_db_pool(&url, config.db_pool_size).await?;
            run_migrations(&pool).await?;
            info!("Migrations complete");
        }
    }

    Ok(())
}
