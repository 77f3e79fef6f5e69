mod media;
mod product;

use clap::{Parser, Subcommand};

use crate::media::MediaCommands;
use crate::product::ProductCommands;

#[derive(Debug, Parser)]
#[command(name = "catalog-cli")]
#[command(about = "Product catalog command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Image reconciliation queues
    Media {
        #[command(subcommand)]
        command: MediaCommands,
    },
    /// Product aggregates
    Product {
        #[command(subcommand)]
        command: ProductCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Apply pending migrations
    Migrate,
    /// Check database connectivity
    Ping,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("catalog-cli: no command given, see --help");
        return Ok(());
    };

    let config = catalog_core::load_app_config()?;
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool = catalog_db::connect_pool(
        &config.database_url,
        catalog_db::PoolConfig::from_app_config(&config),
    )
    .await?;

    match command {
        Commands::Db { command } => match command {
            DbCommands::Migrate => {
                catalog_db::run_migrations(&pool).await?;
                println!("migrations applied");
            }
            DbCommands::Ping => {
                catalog_db::ping(&pool).await?;
                println!("database reachable");
            }
        },
        Commands::Media { command } => media::run(pool, &config, command).await?,
        Commands::Product { command } => product::run(pool, &config, command).await?,
    }

    Ok(())
}
