use clap::{Parser, Subcommand};
use std::path::PathBuf;
use storefront_search::Result;
use storefront_search::commands::{
    check, import_products, ingest_text, purge, reindex, search_products, serve_mcp, show_status,
};
use storefront_search::config::{Config, run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "storefront-search")]
#[command(about = "Semantic product search for the storefront assistant")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the embedding service and search settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Import products from a JSON array file and index them
    Import {
        /// Path to the products file
        file: PathBuf,
    },
    /// Ingest free text as a searchable resource
    Ingest {
        /// Text to ingest
        text: String,
        /// Resource type label
        #[arg(long = "type")]
        resource_type: Option<String>,
        /// Link the resource to a product ID
        #[arg(long)]
        product: Option<String>,
    },
    /// Search products the way the assistant does and print the JSON payload
    Search {
        /// What the shopper is looking for
        query: String,
        /// Maximum number of products
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Delete all resources of a type, with their embeddings
    Purge {
        /// Resource type to delete (default: the product resource type)
        #[arg(long = "type")]
        resource_type: Option<String>,
    },
    /// Delete product resources and re-index every product
    Reindex,
    /// Find resources whose embeddings do not match their content
    Check {
        /// Re-embed the resources that were found
        #[arg(long)]
        repair: bool,
    },
    /// Show store counts and configuration status
    Status,
    /// Start MCP server on stdio
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries MCP traffic during `serve`
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Config { show } = cli.command {
        if show {
            show_config()?;
        } else {
            run_interactive_config()?;
        }
        return Ok(());
    }

    let config = Config::load()?;

    match cli.command {
        Commands::Config { .. } => {}
        Commands::Import { file } => {
            import_products(&config, &file).await?;
        }
        Commands::Ingest {
            text,
            resource_type,
            product,
        } => {
            ingest_text(&config, &text, resource_type, product).await?;
        }
        Commands::Search { query, limit } => {
            search_products(&config, &query, limit).await?;
        }
        Commands::Purge { resource_type } => {
            purge(&config, resource_type).await?;
        }
        Commands::Reindex => {
            reindex(&config).await?;
        }
        Commands::Check { repair } => {
            check(&config, repair).await?;
        }
        Commands::Status => {
            show_status(&config).await?;
        }
        Commands::Serve => {
            serve_mcp(&config).await?;
        }
    }

    Ok(())
}
