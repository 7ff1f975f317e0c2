// Search module
// Cosine similarity over stored chunk vectors, plus the join back to products


use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::Result;
use crate::config::SearchConfig;
use crate::database::sqlite::Database;
use crate::database::sqlite::models::{EmbeddingCandidate, Product};
use crate::embeddings::{Embedder, cosine_similarity, embed_one_blocking};

/// One stored chunk that scored above the similarity floor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarChunk {
    pub content: String,
    pub similarity: f32,
    pub resource_id: String,
    pub product_id: Option<String>,
}

/// A product reached through one of its chunks
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductMatch {
    #[serde(flatten)]
    pub product: Product,
    pub price: Option<f64>,
    pub similarity: f32,
}

pub struct SimilaritySearch {
    database: Arc<Database>,
    embedder: Arc<dyn Embedder>,
    config: SearchConfig,
}

impl SimilaritySearch {
    #[inline]
    pub fn new(database: Arc<Database>, embedder: Arc<dyn Embedder>, config: SearchConfig) -> Self {
        Self {
            database,
            embedder,
            config,
        }
    }

    #[inline]
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Chunks most similar to `query`, capped at the configured resource limit
    #[inline]
    pub async fn search(&self, query: &str) -> Result<Vec<SimilarChunk>> {
        self.search_with_limit(query, self.config.resource_limit)
            .await
    }

    #[inline]
    pub async fn search_with_limit(&self, query: &str, limit: usize) -> Result<Vec<SimilarChunk>> {
        let query_vector = embed_one_blocking(&self.embedder, query).await?;
        let candidates = self.database.embedding_candidates(None).await?;
        debug!("Scoring {} stored chunks", candidates.len());

        let results = rank_candidates(
            &query_vector,
            candidates,
            self.config.similarity_floor,
            limit,
        )?;

        info!(
            "Search for '{}' returned {} chunks",
            query,
            results.len()
        );
        Ok(results)
    }

    /// Up to `limit` distinct products linked to chunks above the floor, in
    /// ranking order.
    ///
    /// Every chunk above the floor is ranked, so a product with many matching
    /// chunks does not crowd out the others. A product appears once, at its
    /// best rank. Linked ids that no longer resolve to a product are dropped.
    #[inline]
    pub async fn find_products(&self, query: &str, limit: usize) -> Result<Vec<ProductMatch>> {
        let chunks = self.search_with_limit(query, usize::MAX).await?;

        let mut ranked: Vec<(String, f32)> = Vec::new();
        for chunk in chunks {
            if ranked.len() == limit {
                break;
            }
            let Some(product_id) = chunk.product_id else {
                continue;
            };
            if !ranked.iter().any(|(id, _)| *id == product_id) {
                ranked.push((product_id, chunk.similarity));
            }
        }

        let ids: Vec<String> = ranked.iter().map(|(id, _)| id.clone()).collect();
        let mut by_id: HashMap<String, Product> = self
            .database
            .get_products(&ids)
            .await?
            .into_iter()
            .map(|product| (product.id.clone(), product))
            .collect();

        let matches: Vec<ProductMatch> = ranked
            .into_iter()
            .filter_map(|(id, similarity)| {
                by_id.remove(&id).map(|product| ProductMatch {
                    price: product.price(),
                    product,
                    similarity,
                })
            })
            .collect();

        debug!(
            "Resolved {} of {} linked products",
            matches.len(),
            ids.len()
        );
        Ok(matches)
    }
}

/// Score every candidate against `query`, keep those strictly above `floor`,
/// and return the best `limit` in descending order. Ties keep store order.
#[inline]
pub fn rank_candidates(
    query: &[f32],
    candidates: Vec<EmbeddingCandidate>,
    floor: f32,
    limit: usize,
) -> Result<Vec<SimilarChunk>> {
    let mut scored = Vec::new();
    for candidate in candidates {
        let similarity = cosine_similarity(query, &candidate.vector()?);
        if similarity > floor {
            scored.push(SimilarChunk {
                content: candidate.content,
                similarity,
                resource_id: candidate.resource_id,
                product_id: candidate.product_id,
            });
        }
    }

    scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    scored.truncate(limit);
    Ok(scored)
}
