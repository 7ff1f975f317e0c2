
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::database::sqlite::Database;
use crate::database::sqlite::models::{NewProduct, ResourceLink};
use crate::embeddings::{Embedder, OpenAiClient};
use crate::indexer::{ConsistencyValidator, Indexer, ReindexStats};
use crate::mcp::{McpServer, SearchProductsHandler};
use crate::search::SimilaritySearch;

/// Open (and migrate) the store under the configured directory
#[inline]
pub async fn open_database(config: &Config) -> Result<Arc<Database>> {
    let database = Database::initialize_from_config_dir(config.get_base_dir())
        .await
        .context("Failed to initialize database")?;
    Ok(Arc::new(database))
}

/// Build the hosted embedding client. Fails when the API key is not set.
#[inline]
pub fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let client = OpenAiClient::new(&config.embedding)
        .context("Failed to create embedding client")?;
    info!(
        "Using embedding model {} at {}",
        config.embedding.model,
        client.endpoint()
    );
    Ok(Arc::new(client))
}

async fn build_indexer(config: &Config) -> Result<Indexer> {
    let embedder = build_embedder(config)?;
    let database = open_database(config).await?;
    Ok(Indexer::new(database, embedder, config.indexing.clone()).with_progress(true))
}

/// Parse a JSON array of products
#[inline]
pub fn load_products_file(path: &Path) -> Result<Vec<NewProduct>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read products file: {}", path.display()))?;
    let products: Vec<NewProduct> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse products file: {}", path.display()))?;

    if let Some(blank) = products.iter().find(|p| p.id.trim().is_empty()) {
        anyhow::bail!("Product '{}' has an empty id", blank.name);
    }
    Ok(products)
}

fn print_run_stats(stats: &ReindexStats) {
    println!("  Products processed: {}", stats.total);
    println!("  ✅ Succeeded: {}", stats.succeeded);
    println!("  ❌ Failed: {}", stats.failed);
    println!("  📄 Total chunks: {}", stats.total_chunks);
}

/// Upsert products from a JSON file and ingest each of them
#[inline]
pub async fn import_products(config: &Config, path: &Path) -> Result<()> {
    let products = load_products_file(path)?;
    if products.is_empty() {
        println!("No products found in {}", path.display());
        return Ok(());
    }

    let indexer = build_indexer(config).await?;
    println!("Importing {} products...", products.len());
    let stats = indexer.import_products(&products).await?;

    println!("Import completed!");
    print_run_stats(&stats);
    Ok(())
}

/// Ingest free text as a resource
#[inline]
pub async fn ingest_text(
    config: &Config,
    text: &str,
    resource_type: Option<String>,
    product_id: Option<String>,
) -> Result<()> {
    let resource_type = resource_type.unwrap_or_else(|| {
        if product_id.is_some() {
            config.indexing.resource_type.clone()
        } else {
            "text".to_string()
        }
    });

    let indexer = build_indexer(config).await?;
    let report = indexer
        .ingest(
            text,
            ResourceLink {
                resource_type,
                product_id,
            },
        )
        .await?;

    println!("Created resource {}", report.resource.id);
    println!("  Type: {}", report.resource.resource_type);
    if let Some(product_id) = &report.resource.product_id {
        println!("  Product: {}", product_id);
    }
    println!(
        "  Chunks: {}, embeddings: {}",
        report.chunk_count, report.embedding_count
    );
    Ok(())
}

/// Run the assistant tool once and print its JSON payload
#[inline]
pub async fn search_products(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    let embedder = build_embedder(config)?;
    let database = open_database(config).await?;
    let search = SimilaritySearch::new(database, embedder, config.search.clone());
    let handler = SearchProductsHandler::new(Arc::new(search));

    let (payload, is_error) = handler.search_payload(query, limit).await;
    println!("{}", serde_json::to_string_pretty(&payload)?);

    if is_error {
        warn!("Search returned an error payload");
    }
    Ok(())
}

/// Delete every resource of a type, with its embeddings
#[inline]
pub async fn purge(config: &Config, resource_type: Option<String>) -> Result<u64> {
    let resource_type = resource_type.unwrap_or_else(|| config.indexing.resource_type.clone());
    let database = open_database(config).await?;

    let removed = database
        .delete_resources_by_type(&resource_type)
        .await
        .with_context(|| format!("Failed to delete resources of type '{}'", resource_type))?;

    println!("🗑️  Deleted {} '{}' resources", removed, resource_type);
    Ok(removed)
}

/// Purge product resources and re-ingest every product
#[inline]
pub async fn reindex(config: &Config) -> Result<()> {
    let indexer = build_indexer(config).await?;

    println!("Re-indexing products...");
    let stats = indexer.reindex_products().await?;

    println!("Re-index completed!");
    print_run_stats(&stats);
    Ok(())
}

/// Report resources whose embeddings do not match their content, optionally repairing them
#[inline]
pub async fn check(config: &Config, repair: bool) -> Result<()> {
    let database = open_database(config).await?;
    let validator = ConsistencyValidator::new(&database);
    let report = validator.validate().await?;

    println!("🔍 {}", report.summary());
    for issue in &report.issues {
        println!(
            "   {} {} ({}): {} chunks, {} embeddings",
            issue.kind,
            issue.resource_id,
            issue.product_id.as_deref().unwrap_or(&issue.resource_type),
            issue.expected_chunks,
            issue.stored_embeddings
        );
    }

    if repair && !report.is_consistent {
        let indexer = Indexer::new(
            Arc::clone(&database),
            build_embedder(config)?,
            config.indexing.clone(),
        );
        let repaired = validator.repair(&indexer, &report).await?;
        println!("🔧 Repaired {} of {} resources", repaired, report.total_issues());
    } else if !report.is_consistent {
        println!("Run 'storefront-search check --repair' to re-embed them.");
    }
    Ok(())
}

/// Show store counts and embedding configuration
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("📊 Storefront Search Status");
    println!("{}", "=".repeat(50));
    println!();

    println!("🤖 Embedding Service:");
    println!("   Model: {}", config.embedding.model);
    println!("   Endpoint: {}", config.embedding.base_url);
    match config.embedding.api_key() {
        Ok(_) => println!("   ✅ API key: ${} is set", config.embedding.api_key_env),
        Err(_) => println!("   ❌ API key: ${} is missing", config.embedding.api_key_env),
    }

    println!();
    println!("🗄️  Store:");
    let database = open_database(config).await?;
    let stats = database.statistics().await?;
    println!("   Products: {}", stats.products);
    println!("   Resources: {}", stats.resources);
    println!("   Embeddings: {}", stats.embeddings);
    if stats.resources_without_embeddings > 0 {
        println!(
            "   ⚠️  Resources without embeddings: {}",
            stats.resources_without_embeddings
        );
        println!("   Use 'storefront-search check' for details.");
    }

    println!();
    println!("💡 Next Steps:");
    println!("   • Use 'storefront-search import <file>' to load products");
    println!("   • Use 'storefront-search serve' to start the MCP server for the assistant");

    Ok(())
}

/// Serve the product search tool over stdio
#[inline]
pub async fn serve_mcp(config: &Config) -> Result<()> {
    let embedder = build_embedder(config)?;
    let database = open_database(config).await?;
    let search = Arc::new(SimilaritySearch::new(
        database,
        embedder,
        config.search.clone(),
    ));

    let server = McpServer::new(
        env!("CARGO_PKG_NAME").to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    );
    server
        .register_tool(
            SearchProductsHandler::tool_definition(),
            SearchProductsHandler::new(search),
        )
        .await;

    info!("MCP server ready on stdio");
    Arc::new(server)
        .serve_stdio()
        .await
        .context("MCP server failed")?;
    Ok(())
}
