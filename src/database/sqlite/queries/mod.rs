#[cfg(test)]
mod tests;

use super::StorageResultExt;
use super::models::*;
use crate::Result;
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteExecutor};
use tracing::debug;
use uuid::Uuid;

const PRODUCT_COLUMNS: &str =
    "id, name, brand, description, category, price_cents, created_at, updated_at";
const RESOURCE_COLUMNS: &str = "id, content, resource_type, product_id, created_at";
const EMBEDDING_COLUMNS: &str = "id, resource_id, chunk_index, content, embedding, created_at";

pub struct ProductQueries;

impl ProductQueries {
    /// Insert a product, or refresh its fields if the id already exists
    #[inline]
    pub async fn upsert<'e, E>(executor: E, product: &NewProduct) -> Result<Product>
    where
        E: SqliteExecutor<'e>,
    {
        let now = Utc::now().naive_utc();
        let sql = format!(
            r#"
            INSERT INTO products (id, name, brand, description, category, price_cents, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                brand = excluded.brand,
                description = excluded.description,
                category = excluded.category,
                price_cents = excluded.price_cents,
                updated_at = excluded.updated_at
            RETURNING {}
            "#,
            PRODUCT_COLUMNS
        );

        sqlx::query_as::<_, Product>(&sql)
            .bind(&product.id)
            .bind(&product.name)
            .bind(&product.brand)
            .bind(&product.description)
            .bind(&product.category)
            .bind(product.price_cents)
            .bind(now)
            .bind(now)
            .fetch_one(executor)
            .await
            .storage_context("Failed to upsert product")
    }

    #[inline]
    pub async fn get_by_id<'e, E>(executor: E, id: &str) -> Result<Option<Product>>
    where
        E: SqliteExecutor<'e>,
    {
        let sql = format!("SELECT {} FROM products WHERE id = ?", PRODUCT_COLUMNS);
        sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await
            .storage_context("Failed to get product by id")
    }

    /// Batch lookup. Result order is unspecified; missing ids are simply absent.
    #[inline]
    pub async fn get_by_ids<'e, E>(executor: E, ids: &[String]) -> Result<Vec<Product>>
    where
        E: SqliteExecutor<'e>,
    {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM products WHERE id IN (",
            PRODUCT_COLUMNS
        ));
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        builder
            .build_query_as::<Product>()
            .fetch_all(executor)
            .await
            .storage_context("Failed to get products by ids")
    }

    #[inline]
    pub async fn list_all<'e, E>(executor: E) -> Result<Vec<Product>>
    where
        E: SqliteExecutor<'e>,
    {
        let sql = format!(
            "SELECT {} FROM products ORDER BY created_at, id",
            PRODUCT_COLUMNS
        );
        sqlx::query_as::<_, Product>(&sql)
            .fetch_all(executor)
            .await
            .storage_context("Failed to list products")
    }

    /// Delete a product; its resources and embeddings cascade
    #[inline]
    pub async fn delete<'e, E>(executor: E, id: &str) -> Result<bool>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id)
            .execute(executor)
            .await
            .storage_context("Failed to delete product")?;

        Ok(result.rows_affected() > 0)
    }

    #[inline]
    pub async fn count<'e, E>(executor: E) -> Result<i64>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(executor)
            .await
            .storage_context("Failed to count products")
    }
}

pub struct ResourceQueries;

impl ResourceQueries {
    #[inline]
    pub async fn create<'e, E>(executor: E, new_resource: &NewResource) -> Result<Resource>
    where
        E: SqliteExecutor<'e>,
    {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();
        let sql = format!(
            "INSERT INTO resources (id, content, resource_type, product_id, created_at) \
             VALUES (?, ?, ?, ?, ?) RETURNING {}",
            RESOURCE_COLUMNS
        );

        let resource = sqlx::query_as::<_, Resource>(&sql)
            .bind(&id)
            .bind(&new_resource.content)
            .bind(&new_resource.link.resource_type)
            .bind(&new_resource.link.product_id)
            .bind(now)
            .fetch_one(executor)
            .await
            .storage_context("Failed to create resource")?;

        debug!(
            "Created resource {} (type {})",
            resource.id, resource.resource_type
        );
        Ok(resource)
    }

    #[inline]
    pub async fn get_by_id<'e, E>(executor: E, id: &str) -> Result<Option<Resource>>
    where
        E: SqliteExecutor<'e>,
    {
        let sql = format!("SELECT {} FROM resources WHERE id = ?", RESOURCE_COLUMNS);
        sqlx::query_as::<_, Resource>(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await
            .storage_context("Failed to get resource by id")
    }

    #[inline]
    pub async fn list_by_type<'e, E>(executor: E, resource_type: &str) -> Result<Vec<Resource>>
    where
        E: SqliteExecutor<'e>,
    {
        let sql = format!(
            "SELECT {} FROM resources WHERE resource_type = ? ORDER BY created_at, id",
            RESOURCE_COLUMNS
        );
        sqlx::query_as::<_, Resource>(&sql)
            .bind(resource_type)
            .fetch_all(executor)
            .await
            .storage_context("Failed to list resources by type")
    }

    #[inline]
    pub async fn list_for_product<'e, E>(executor: E, product_id: &str) -> Result<Vec<Resource>>
    where
        E: SqliteExecutor<'e>,
    {
        let sql = format!(
            "SELECT {} FROM resources WHERE product_id = ? ORDER BY created_at, id",
            RESOURCE_COLUMNS
        );
        sqlx::query_as::<_, Resource>(&sql)
            .bind(product_id)
            .fetch_all(executor)
            .await
            .storage_context("Failed to list resources for product")
    }

    /// Delete one resource; its embeddings cascade
    #[inline]
    pub async fn delete<'e, E>(executor: E, id: &str) -> Result<bool>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM resources WHERE id = ?")
            .bind(id)
            .execute(executor)
            .await
            .storage_context("Failed to delete resource")?;

        Ok(result.rows_affected() > 0)
    }

    /// Bulk cleanup of every resource carrying `resource_type`
    #[inline]
    pub async fn delete_by_type<'e, E>(executor: E, resource_type: &str) -> Result<u64>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM resources WHERE resource_type = ?")
            .bind(resource_type)
            .execute(executor)
            .await
            .storage_context("Failed to delete resources by type")?;

        Ok(result.rows_affected())
    }

    #[inline]
    pub async fn delete_for_product<'e, E>(
        executor: E,
        product_id: &str,
        resource_type: &str,
    ) -> Result<u64>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM resources WHERE product_id = ? AND resource_type = ?")
            .bind(product_id)
            .bind(resource_type)
            .execute(executor)
            .await
            .storage_context("Failed to delete resources for product")?;

        Ok(result.rows_affected())
    }

    #[inline]
    pub async fn count<'e, E>(executor: E) -> Result<i64>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_scalar("SELECT COUNT(*) FROM resources")
            .fetch_one(executor)
            .await
            .storage_context("Failed to count resources")
    }

    /// Every resource with the number of embeddings it currently owns
    #[inline]
    pub async fn embedding_counts<'e, E>(executor: E) -> Result<Vec<ResourceEmbeddingCount>>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, ResourceEmbeddingCount>(
            r#"
            SELECT r.id AS resource_id,
                   r.resource_type,
                   r.product_id,
                   r.content,
                   COUNT(e.id) AS embedding_count
            FROM resources r
            LEFT JOIN embeddings e ON e.resource_id = r.id
            GROUP BY r.id
            ORDER BY r.created_at, r.id
            "#,
        )
        .fetch_all(executor)
        .await
        .storage_context("Failed to count embeddings per resource")
    }
}

pub struct EmbeddingQueries;

impl EmbeddingQueries {
    /// Write one chunk vector, replacing any existing row at the same
    /// `(resource_id, chunk_index)`
    #[inline]
    pub async fn upsert<'e, E>(executor: E, embedding: &NewEmbedding) -> Result<StoredEmbedding>
    where
        E: SqliteExecutor<'e>,
    {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();
        let sql = format!(
            r#"
            INSERT INTO embeddings (id, resource_id, chunk_index, content, embedding, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(resource_id, chunk_index) DO UPDATE SET
                content = excluded.content,
                embedding = excluded.embedding,
                created_at = excluded.created_at
            RETURNING {}
            "#,
            EMBEDDING_COLUMNS
        );

        sqlx::query_as::<_, StoredEmbedding>(&sql)
            .bind(&id)
            .bind(&embedding.resource_id)
            .bind(embedding.chunk_index)
            .bind(&embedding.content)
            .bind(encode_vector(&embedding.vector))
            .bind(now)
            .fetch_one(executor)
            .await
            .storage_context("Failed to store embedding")
    }

    #[inline]
    pub async fn list_for_resource<'e, E>(
        executor: E,
        resource_id: &str,
    ) -> Result<Vec<StoredEmbedding>>
    where
        E: SqliteExecutor<'e>,
    {
        let sql = format!(
            "SELECT {} FROM embeddings WHERE resource_id = ? ORDER BY chunk_index",
            EMBEDDING_COLUMNS
        );
        sqlx::query_as::<_, StoredEmbedding>(&sql)
            .bind(resource_id)
            .fetch_all(executor)
            .await
            .storage_context("Failed to list embeddings for resource")
    }

    #[inline]
    pub async fn count_for_resource<'e, E>(executor: E, resource_id: &str) -> Result<i64>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_scalar("SELECT COUNT(*) FROM embeddings WHERE resource_id = ?")
            .bind(resource_id)
            .fetch_one(executor)
            .await
            .storage_context("Failed to count embeddings for resource")
    }

    #[inline]
    pub async fn count_for_product<'e, E>(executor: E, product_id: &str) -> Result<i64>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM embeddings e JOIN resources r ON r.id = e.resource_id \
             WHERE r.product_id = ?",
        )
        .bind(product_id)
        .fetch_one(executor)
        .await
        .storage_context("Failed to count embeddings for product")
    }

    /// Drop chunk rows at or beyond `first_index`, used when content now yields fewer chunks
    #[inline]
    pub async fn delete_from_index<'e, E>(
        executor: E,
        resource_id: &str,
        first_index: i64,
    ) -> Result<u64>
    where
        E: SqliteExecutor<'e>,
    {
        let result =
            sqlx::query("DELETE FROM embeddings WHERE resource_id = ? AND chunk_index >= ?")
                .bind(resource_id)
                .bind(first_index)
                .execute(executor)
                .await
                .storage_context("Failed to delete stale embeddings")?;

        Ok(result.rows_affected())
    }

    #[inline]
    pub async fn count<'e, E>(executor: E) -> Result<i64>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_scalar("SELECT COUNT(*) FROM embeddings")
            .fetch_one(executor)
            .await
            .storage_context("Failed to count embeddings")
    }

    /// All stored vectors with their resource link, optionally limited to one resource type
    #[inline]
    pub async fn candidates<'e, E>(
        executor: E,
        resource_type: Option<&str>,
    ) -> Result<Vec<EmbeddingCandidate>>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, EmbeddingCandidate>(
            r#"
            SELECT e.id AS embedding_id,
                   e.resource_id,
                   r.product_id,
                   e.content,
                   e.embedding
            FROM embeddings e
            JOIN resources r ON r.id = e.resource_id
            WHERE ?1 IS NULL OR r.resource_type = ?1
            ORDER BY r.created_at, e.resource_id, e.chunk_index
            "#,
        )
        .bind(resource_type)
        .fetch_all(executor)
        .await
        .storage_context("Failed to load embedding candidates")
    }
}
