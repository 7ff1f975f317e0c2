// Indexer module
// Turns text into a Resource plus one Embedding per chunk, and keeps products indexed

pub mod consistency;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::IndexingConfig;
use crate::database::sqlite::models::{
    NewEmbedding, NewProduct, NewResource, Product, Resource, ResourceLink,
};
use crate::database::sqlite::queries::{EmbeddingQueries, ResourceQueries};
use crate::database::sqlite::{Database, DbTransaction};
use crate::embeddings::{Embedder, Vector, embed_many_blocking, generate_chunks};
use crate::{Result, StorefrontError};

pub use consistency::{ConsistencyReport, ConsistencyValidator, ResourceIssue, ResourceIssueKind};

/// Outcome of ingesting or repairing one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionReport {
    pub resource: Resource,
    pub chunk_count: usize,
    pub embedding_count: usize,
}

impl IngestionReport {
    /// True when every chunk has a stored embedding
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.chunk_count == self.embedding_count
    }
}

/// Statistics about a bulk product run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReindexStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_chunks: usize,
}

/// Ingestion pipeline over a shared store and embedding client
pub struct Indexer {
    database: Arc<Database>,
    embedder: Arc<dyn Embedder>,
    config: IndexingConfig,
    show_progress: bool,
}

impl Indexer {
    #[inline]
    pub fn new(
        database: Arc<Database>,
        embedder: Arc<dyn Embedder>,
        config: IndexingConfig,
    ) -> Self {
        Self {
            database,
            embedder,
            config,
            show_progress: false,
        }
    }

    /// Draw a progress bar on stderr during bulk runs when a user is watching
    #[inline]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    #[inline]
    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    #[inline]
    pub fn config(&self) -> &IndexingConfig {
        &self.config
    }

    /// Store `content` as a new resource with one embedding per chunk.
    ///
    /// Embeddings are computed before anything is written, and the resource and
    /// its embeddings are committed together. Content with no chunks still
    /// produces a resource with zero embeddings.
    #[inline]
    pub async fn ingest(&self, content: &str, link: ResourceLink) -> Result<IngestionReport> {
        let (chunks, vectors) = self.embed_content(content).await?;

        let mut tx = self.database.begin().await?;
        let report = write_resource(&mut tx, content, link, chunks, vectors).await?;
        tx.commit().await?;

        info!(
            "Ingested resource {} ({} chunks)",
            report.resource.id, report.chunk_count
        );
        Ok(report)
    }

    /// Replace the product's indexed resources with a fresh one built from its document.
    /// Other resource types linked to the product are left alone.
    #[inline]
    pub async fn ingest_product(&self, product: &Product) -> Result<IngestionReport> {
        let document = product.document();
        let (chunks, vectors) = self.embed_content(&document).await?;

        let mut tx = self.database.begin().await?;
        let replaced = ResourceQueries::delete_for_product(
            &mut *tx,
            &product.id,
            &self.config.resource_type,
        )
        .await?;
        if replaced > 0 {
            debug!(
                "Replacing {} existing resources for product {}",
                replaced, product.id
            );
        }

        let link = ResourceLink {
            resource_type: self.config.resource_type.clone(),
            product_id: Some(product.id.clone()),
        };
        let report = write_resource(&mut tx, &document, link, chunks, vectors).await?;
        tx.commit().await?;

        debug!(
            "Indexed product {} as resource {} ({} chunks)",
            product.id, report.resource.id, report.chunk_count
        );
        Ok(report)
    }

    /// Re-chunk and re-embed an existing resource so its embeddings match its content
    #[inline]
    pub async fn repair_resource(&self, resource_id: &str) -> Result<IngestionReport> {
        let resource = self
            .database
            .get_resource(resource_id)
            .await?
            .ok_or_else(|| {
                StorefrontError::Storage(format!("Resource {} not found", resource_id))
            })?;

        let (chunks, vectors) = self.embed_content(&resource.content).await?;
        let chunk_count = chunks.len();

        let mut tx = self.database.begin().await?;
        store_embeddings(&mut tx, &resource.id, chunks, vectors).await?;
        let trimmed =
            EmbeddingQueries::delete_from_index(&mut *tx, &resource.id, chunk_count as i64)
                .await?;
        let embedding_count = EmbeddingQueries::count_for_resource(&mut *tx, &resource.id).await?;
        tx.commit().await?;

        if trimmed > 0 {
            debug!(
                "Removed {} stale embeddings from resource {}",
                trimmed, resource.id
            );
        }
        info!(
            "Repaired resource {} ({} chunks)",
            resource.id, chunk_count
        );

        Ok(IngestionReport {
            resource,
            chunk_count,
            embedding_count: embedding_count as usize,
        })
    }

    /// Delete every resource of `resource_type`; embeddings go with them
    #[inline]
    pub async fn purge_type(&self, resource_type: &str) -> Result<u64> {
        let removed = self.database.delete_resources_by_type(resource_type).await?;
        info!(
            "Deleted {} resources of type '{}'",
            removed, resource_type
        );
        Ok(removed)
    }

    /// Purge product resources, then ingest every product one at a time
    #[inline]
    pub async fn reindex_products(&self) -> Result<ReindexStats> {
        self.purge_type(&self.config.resource_type).await?;
        let products = self.database.list_products().await?;
        Ok(self.ingest_products_sequentially(&products).await)
    }

    /// Upsert products into the catalog and ingest each of them
    #[inline]
    pub async fn import_products(&self, products: &[NewProduct]) -> Result<ReindexStats> {
        let mut stored = Vec::with_capacity(products.len());
        for product in products {
            stored.push(self.database.upsert_product(product).await?);
        }
        info!("Upserted {} products", stored.len());

        Ok(self.ingest_products_sequentially(&stored).await)
    }

    /// Per-item failures are counted and logged; the run carries on
    async fn ingest_products_sequentially(&self, products: &[Product]) -> ReindexStats {
        let mut stats = ReindexStats {
            total: products.len(),
            ..ReindexStats::default()
        };
        let delay = Duration::from_millis(self.config.item_delay_ms);
        let bar = self.progress_bar(products.len());

        for (position, product) in products.iter().enumerate() {
            if position > 0 && !delay.is_zero() {
                sleep(delay).await;
            }

            bar.set_message(product.name.clone());
            match self.ingest_product(product).await {
                Ok(report) => {
                    stats.succeeded += 1;
                    stats.total_chunks += report.chunk_count;
                }
                Err(e) => {
                    stats.failed += 1;
                    error!("Failed to index product {}: {}", product.id, e);
                }
            }
            bar.inc(1);
        }
        bar.finish_and_clear();

        if stats.failed > 0 {
            warn!(
                "Indexed {} of {} products ({} failed)",
                stats.succeeded, stats.total, stats.failed
            );
        } else {
            info!(
                "Indexed {} products, {} chunks",
                stats.succeeded, stats.total_chunks
            );
        }
        stats
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress || !console::user_attended_stderr() {
            return ProgressBar::hidden();
        }

        let style = ProgressStyle::with_template("{spinner} [{pos}/{len}] Indexing {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        ProgressBar::new(len as u64).with_style(style)
    }

    async fn embed_content(&self, content: &str) -> Result<(Vec<String>, Vec<Vector>)> {
        let chunks = generate_chunks(content);
        let vectors = embed_many_blocking(&self.embedder, chunks.clone()).await?;

        if vectors.len() != chunks.len() {
            return Err(StorefrontError::EmbeddingService(format!(
                "expected {} embeddings, got {}",
                chunks.len(),
                vectors.len()
            )));
        }

        Ok((chunks, vectors))
    }
}

async fn write_resource(
    tx: &mut DbTransaction<'_>,
    content: &str,
    link: ResourceLink,
    chunks: Vec<String>,
    vectors: Vec<Vector>,
) -> Result<IngestionReport> {
    let resource = ResourceQueries::create(
        &mut **tx,
        &NewResource {
            content: content.to_string(),
            link,
        },
    )
    .await?;

    let chunk_count = chunks.len();
    let embedding_count = store_embeddings(tx, &resource.id, chunks, vectors).await?;

    Ok(IngestionReport {
        resource,
        chunk_count,
        embedding_count,
    })
}

async fn store_embeddings(
    tx: &mut DbTransaction<'_>,
    resource_id: &str,
    chunks: Vec<String>,
    vectors: Vec<Vector>,
) -> Result<usize> {
    let mut stored = 0;
    for (chunk_index, (content, vector)) in chunks.into_iter().zip(vectors).enumerate() {
        EmbeddingQueries::upsert(
            &mut **tx,
            &NewEmbedding {
                resource_id: resource_id.to_string(),
                chunk_index: chunk_index as i64,
                content,
                vector,
            },
        )
        .await?;
        stored += 1;
    }
    Ok(stored)
}
