use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite, Transaction};
use std::path::Path;
use tracing::{debug, info};

use crate::database::sqlite::models::{
    EmbeddingCandidate, NewProduct, Product, Resource, ResourceEmbeddingCount, StoreStatistics,
    StoredEmbedding,
};
use crate::database::sqlite::queries::{EmbeddingQueries, ProductQueries, ResourceQueries};
use crate::{Result, StorefrontError};


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;
pub type DbTransaction<'a> = Transaction<'a, Sqlite>;

pub const DATABASE_FILE_NAME: &str = "storefront.db";

/// Attach a human-readable context to storage failures
pub(crate) trait StorageResultExt<T> {
    fn storage_context(self, context: &str) -> Result<T>;
}

impl<T> StorageResultExt<T> for std::result::Result<T, sqlx::Error> {
    #[inline]
    fn storage_context(self, context: &str) -> Result<T> {
        self.map_err(|e| StorefrontError::Storage(format!("{}: {}", context, e)))
    }
}

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .storage_context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn begin(&self) -> Result<DbTransaction<'static>> {
        self.pool
            .begin()
            .await
            .storage_context("Failed to begin transaction")
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    #[inline]
    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(config_dir).map_err(|e| {
            StorefrontError::Storage(format!(
                "Failed to create config directory {}: {}",
                config_dir.display(),
                e
            ))
        })?;

        Self::new(config_dir.join(DATABASE_FILE_NAME)).await
    }

    // Product operations
    #[inline]
    pub async fn upsert_product(&self, product: &NewProduct) -> Result<Product> {
        ProductQueries::upsert(&self.pool, product).await
    }

    #[inline]
    pub async fn get_product(&self, id: &str) -> Result<Option<Product>> {
        ProductQueries::get_by_id(&self.pool, id).await
    }

    #[inline]
    pub async fn get_products(&self, ids: &[String]) -> Result<Vec<Product>> {
        ProductQueries::get_by_ids(&self.pool, ids).await
    }

    #[inline]
    pub async fn list_products(&self) -> Result<Vec<Product>> {
        ProductQueries::list_all(&self.pool).await
    }

    #[inline]
    pub async fn delete_product(&self, id: &str) -> Result<bool> {
        ProductQueries::delete(&self.pool, id).await
    }

    // Resource operations
    #[inline]
    pub async fn get_resource(&self, id: &str) -> Result<Option<Resource>> {
        ResourceQueries::get_by_id(&self.pool, id).await
    }

    #[inline]
    pub async fn list_resources_by_type(&self, resource_type: &str) -> Result<Vec<Resource>> {
        ResourceQueries::list_by_type(&self.pool, resource_type).await
    }

    #[inline]
    pub async fn list_resources_for_product(&self, product_id: &str) -> Result<Vec<Resource>> {
        ResourceQueries::list_for_product(&self.pool, product_id).await
    }

    #[inline]
    pub async fn delete_resource(&self, id: &str) -> Result<bool> {
        ResourceQueries::delete(&self.pool, id).await
    }

    #[inline]
    pub async fn delete_resources_by_type(&self, resource_type: &str) -> Result<u64> {
        ResourceQueries::delete_by_type(&self.pool, resource_type).await
    }

    #[inline]
    pub async fn resource_embedding_counts(&self) -> Result<Vec<ResourceEmbeddingCount>> {
        ResourceQueries::embedding_counts(&self.pool).await
    }

    // Embedding operations
    #[inline]
    pub async fn get_embeddings_for_resource(
        &self,
        resource_id: &str,
    ) -> Result<Vec<StoredEmbedding>> {
        EmbeddingQueries::list_for_resource(&self.pool, resource_id).await
    }

    #[inline]
    pub async fn embedding_candidates(
        &self,
        resource_type: Option<&str>,
    ) -> Result<Vec<EmbeddingCandidate>> {
        EmbeddingQueries::candidates(&self.pool, resource_type).await
    }

    #[inline]
    pub async fn statistics(&self) -> Result<StoreStatistics> {
        let products = ProductQueries::count(&self.pool).await?;
        let resources = ResourceQueries::count(&self.pool).await?;
        let embeddings = EmbeddingQueries::count(&self.pool).await?;
        let resources_without_embeddings: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM resources r \
             WHERE NOT EXISTS (SELECT 1 FROM embeddings e WHERE e.resource_id = r.id)",
        )
        .fetch_one(&self.pool)
        .await
        .storage_context("Failed to count resources without embeddings")?;

        Ok(StoreStatistics {
            products,
            resources,
            embeddings,
            resources_without_embeddings,
        })
    }

    /// Optimize database performance by running VACUUM and ANALYZE
    #[inline]
    pub async fn optimize(&self) -> Result<()> {
        info!("Optimizing database performance");

        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .storage_context("Failed to vacuum database")?;

        sqlx::query("ANALYZE")
            .execute(&self.pool)
            .await
            .storage_context("Failed to analyze database")?;

        debug!("Database optimization completed");
        Ok(())
    }
}
