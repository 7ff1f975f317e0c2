
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::{Result, StorefrontError};

/// Storefront product row. Owned by the storefront; read here for ingestion and
/// for joining search hits back to full records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub brand: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price_cents: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub price_cents: Option<i64>,
}

/// A stored unit of ingested text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Resource {
    pub id: String,
    pub content: String,
    pub resource_type: String,
    pub product_id: Option<String>,
    pub created_at: NaiveDateTime,
}

/// What a new resource is and where it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLink {
    pub resource_type: String,
    pub product_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewResource {
    pub content: String,
    pub link: ResourceLink,
}

/// One chunk of a resource plus its encoded vector
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct StoredEmbedding {
    pub id: String,
    pub resource_id: String,
    pub chunk_index: i64,
    pub content: String,
    pub embedding: Vec<u8>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewEmbedding {
    pub resource_id: String,
    pub chunk_index: i64,
    pub content: String,
    pub vector: Vec<f32>,
}

/// Row shape scanned by similarity search
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct EmbeddingCandidate {
    pub embedding_id: String,
    pub resource_id: String,
    pub product_id: Option<String>,
    pub content: String,
    pub embedding: Vec<u8>,
}

/// Per-resource embedding tally used by consistency checks
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ResourceEmbeddingCount {
    pub resource_id: String,
    pub resource_type: String,
    pub product_id: Option<String>,
    pub content: String,
    pub embedding_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStatistics {
    pub products: i64,
    pub resources: i64,
    pub embeddings: i64,
    pub resources_without_embeddings: i64,
}

impl Product {
    /// Text ingested for this product: name, brand and description joined as sentences
    #[inline]
    pub fn document(&self) -> String {
        [
            Some(self.name.as_str()),
            self.brand.as_deref(),
            self.description.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(|part| part.trim().trim_end_matches('.').trim())
        .filter(|part| !part.is_empty())
        .map(|part| format!("{}.", part))
        .collect::<Vec<_>>()
        .join(" ")
    }

    #[inline]
    pub fn price(&self) -> Option<f64> {
        self.price_cents.map(|cents| cents as f64 / 100.0)
    }
}

impl ResourceLink {
    #[inline]
    pub fn product(product_id: impl Into<String>) -> Self {
        Self {
            resource_type: "product".to_string(),
            product_id: Some(product_id.into()),
        }
    }

    #[inline]
    pub fn untyped(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            product_id: None,
        }
    }
}

impl StoredEmbedding {
    #[inline]
    pub fn vector(&self) -> Result<Vec<f32>> {
        decode_vector(&self.embedding)
    }
}

impl EmbeddingCandidate {
    #[inline]
    pub fn vector(&self) -> Result<Vec<f32>> {
        decode_vector(&self.embedding)
    }
}

/// Serialize a vector as little-endian `f32` bytes for the BLOB column
#[inline]
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

#[inline]
pub fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(StorefrontError::Storage(format!(
            "Corrupt vector column: {} bytes is not a multiple of 4",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}
