//! Product aggregate commands.

use std::path::PathBuf;

use anyhow::Context;
use catalog_core::{AppConfig, FieldMask, NewProduct};
use catalog_pipeline::{CatalogPipeline, ProductLookup};
use clap::Subcommand;
use sqlx::PgPool;

/// Sub-commands available under `product`.
#[derive(Debug, Subcommand)]
pub enum ProductCommands {
    /// Print the assembled product as JSON
    Show {
        #[arg(long)]
        shop_id: i64,
        #[arg(long, conflicts_with = "handler", required_unless_present = "handler")]
        id: Option<i64>,
        #[arg(long)]
        handler: Option<String>,
        /// Comma-separated field list; all fields when omitted
        #[arg(long)]
        fields: Option<String>,
    },
    /// Create a product from a JSON file and wait for its media
    Create {
        #[arg(long)]
        shop_id: i64,
        /// Path to a JSON document shaped like the create request body
        #[arg(long)]
        file: PathBuf,
    },
    /// Soft-delete an unpublished product
    Delete {
        #[arg(long)]
        shop_id: i64,
        #[arg(long)]
        id: i64,
    },
}

fn lookup(id: Option<i64>, handler: Option<String>) -> anyhow::Result<ProductLookup> {
    match (id, handler) {
        (Some(id), _) => Ok(ProductLookup::Id(id)),
        (None, Some(handler)) => Ok(ProductLookup::Handler(handler)),
        (None, None) => anyhow::bail!("either --id or --handler is required"),
    }
}

/// Dispatch a `product` sub-command.
///
/// # Errors
///
/// Returns an error if the input file cannot be read or parsed, or the
/// pipeline rejects the operation.
pub(crate) async fn run(
    pool: PgPool,
    config: &AppConfig,
    command: ProductCommands,
) -> anyhow::Result<()> {
    let pipeline = CatalogPipeline::from_config(pool, config)?;
    let result = dispatch(&pipeline, command).await;
    // Drains reconciliation jobs queued by a create before the process exits.
    pipeline.shutdown().await;
    result
}

async fn dispatch(pipeline: &CatalogPipeline, command: ProductCommands) -> anyhow::Result<()> {
    match command {
        ProductCommands::Show {
            shop_id,
            id,
            handler,
            fields,
        } => {
            let mask = FieldMask::parse(fields.as_deref());
            let view = pipeline
                .reader()
                .get_product(shop_id, &lookup(id, handler)?, &mask)
                .await?;
            let value = mask.apply(serde_json::to_value(&view)?);
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        ProductCommands::Create { shop_id, file } => {
            let raw = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let mut input: NewProduct = serde_json::from_str(&raw)
                .with_context(|| format!("invalid product JSON in {}", file.display()))?;
            input.shop_id = shop_id;
            let created = pipeline.create_product(input).await?;
            tracing::info!(
                product_id = created.product_id,
                handler = %created.handler,
                "product created"
            );
            println!("{} {}", created.product_id, created.handler);
        }
        ProductCommands::Delete { shop_id, id } => {
            pipeline.delete_product(shop_id, id).await?;
            println!("deleted product {id}");
        }
    }
    Ok(())
}
