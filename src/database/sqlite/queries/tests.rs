use super::*;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tempfile::TempDir;

async fn create_test_pool() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("test.db");

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(
            SqliteConnectOptions::new()
                .filename(&db_path)
                .create_if_missing(true)
                .foreign_keys(true),
        )
        .await
        .expect("Failed to create test pool");

    sqlx::migrate!("src/database/sqlite/migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    (temp_dir, pool)
}

fn new_product(id: &str, name: &str) -> NewProduct {
    NewProduct {
        id: id.to_string(),
        name: name.to_string(),
        brand: Some("Everlast".to_string()),
        description: Some("Built for the gym.".to_string()),
        category: None,
        price_cents: Some(4999),
    }
}

fn new_embedding(resource_id: &str, chunk_index: i64, content: &str) -> NewEmbedding {
    NewEmbedding {
        resource_id: resource_id.to_string(),
        chunk_index,
        content: content.to_string(),
        vector: vec![chunk_index as f32, 1.0],
    }
}

#[tokio::test]
async fn product_upsert_inserts_then_updates() {
    let (_temp_dir, pool) = create_test_pool().await;

    let created = ProductQueries::upsert(&pool, &new_product("p-1", "Heavy Bag"))
        .await
        .expect("Failed to insert product");
    assert_eq!(created.name, "Heavy Bag");

    let mut changed = new_product("p-1", "Heavy Bag 70lb");
    changed.price_cents = None;
    let updated = ProductQueries::upsert(&pool, &changed)
        .await
        .expect("Failed to update product");

    assert_eq!(updated.id, "p-1");
    assert_eq!(updated.name, "Heavy Bag 70lb");
    assert!(updated.price_cents.is_none());
    assert_eq!(updated.created_at, created.created_at);
    assert_eq!(ProductQueries::count(&pool).await.expect("count"), 1);
}

#[tokio::test]
async fn product_batch_lookup_skips_missing_ids() {
    let (_temp_dir, pool) = create_test_pool().await;

    for (id, name) in [("a", "Gloves"), ("b", "Wraps"), ("c", "Mouthguard")] {
        ProductQueries::upsert(&pool, &new_product(id, name))
            .await
            .expect("Failed to insert product");
    }

    let ids = vec!["c".to_string(), "missing".to_string(), "a".to_string()];
    let mut found: Vec<String> = ProductQueries::get_by_ids(&pool, &ids)
        .await
        .expect("Failed to look up products")
        .into_iter()
        .map(|p| p.id)
        .collect();
    found.sort();
    assert_eq!(found, vec!["a".to_string(), "c".to_string()]);

    let none = ProductQueries::get_by_ids(&pool, &[])
        .await
        .expect("empty lookup should succeed");
    assert!(none.is_empty());
}

#[tokio::test]
async fn resource_create_and_list() {
    let (_temp_dir, pool) = create_test_pool().await;
    ProductQueries::upsert(&pool, &new_product("p-1", "Gloves"))
        .await
        .expect("Failed to insert product");

    let linked = ResourceQueries::create(
        &pool,
        &NewResource {
            content: "Gloves. Everlast.".to_string(),
            link: ResourceLink::product("p-1"),
        },
    )
    .await
    .expect("Failed to create resource");
    let faq = ResourceQueries::create(
        &pool,
        &NewResource {
            content: "Returns accepted within 30 days.".to_string(),
            link: ResourceLink::untyped("faq"),
        },
    )
    .await
    .expect("Failed to create resource");

    assert_ne!(linked.id, faq.id);
    assert_eq!(linked.product_id.as_deref(), Some("p-1"));

    let products = ResourceQueries::list_by_type(&pool, "product")
        .await
        .expect("Failed to list resources");
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].id, linked.id);

    let for_product = ResourceQueries::list_for_product(&pool, "p-1")
        .await
        .expect("Failed to list resources");
    assert_eq!(for_product.len(), 1);

    let fetched = ResourceQueries::get_by_id(&pool, &faq.id)
        .await
        .expect("Failed to get resource")
        .expect("Resource should exist");
    assert_eq!(fetched.content, "Returns accepted within 30 days.");
}

#[tokio::test]
async fn resource_requires_existing_product() {
    let (_temp_dir, pool) = create_test_pool().await;

    let result = ResourceQueries::create(
        &pool,
        &NewResource {
            content: "Orphan".to_string(),
            link: ResourceLink::product("does-not-exist"),
        },
    )
    .await;

    assert!(matches!(result, Err(crate::StorefrontError::Storage(_))));
}

#[tokio::test]
async fn embedding_upsert_replaces_same_chunk_index() {
    let (_temp_dir, pool) = create_test_pool().await;
    let resource = ResourceQueries::create(
        &pool,
        &NewResource {
            content: "One. Two.".to_string(),
            link: ResourceLink::untyped("faq"),
        },
    )
    .await
    .expect("Failed to create resource");

    EmbeddingQueries::upsert(&pool, &new_embedding(&resource.id, 0, "One"))
        .await
        .expect("Failed to store embedding");
    EmbeddingQueries::upsert(&pool, &new_embedding(&resource.id, 1, "Two"))
        .await
        .expect("Failed to store embedding");

    let mut replacement = new_embedding(&resource.id, 1, "Two again");
    replacement.vector = vec![9.0, 9.0];
    EmbeddingQueries::upsert(&pool, &replacement)
        .await
        .expect("Failed to replace embedding");

    let stored = EmbeddingQueries::list_for_resource(&pool, &resource.id)
        .await
        .expect("Failed to list embeddings");
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].content, "One");
    assert_eq!(stored[1].content, "Two again");
    assert_eq!(stored[1].vector().expect("decode"), vec![9.0, 9.0]);
}

#[tokio::test]
async fn embedding_delete_from_index_trims_tail() {
    let (_temp_dir, pool) = create_test_pool().await;
    let resource = ResourceQueries::create(
        &pool,
        &NewResource {
            content: "a. b. c.".to_string(),
            link: ResourceLink::untyped("faq"),
        },
    )
    .await
    .expect("Failed to create resource");

    for (i, text) in ["a", "b", "c"].iter().enumerate() {
        EmbeddingQueries::upsert(&pool, &new_embedding(&resource.id, i as i64, text))
            .await
            .expect("Failed to store embedding");
    }

    let removed = EmbeddingQueries::delete_from_index(&pool, &resource.id, 1)
        .await
        .expect("Failed to trim embeddings");
    assert_eq!(removed, 2);
    assert_eq!(
        EmbeddingQueries::count_for_resource(&pool, &resource.id)
            .await
            .expect("count"),
        1
    );
}

#[tokio::test]
async fn deleting_product_cascades_to_embeddings() {
    let (_temp_dir, pool) = create_test_pool().await;
    ProductQueries::upsert(&pool, &new_product("p-1", "Gloves"))
        .await
        .expect("Failed to insert product");
    let resource = ResourceQueries::create(
        &pool,
        &NewResource {
            content: "Gloves. Everlast.".to_string(),
            link: ResourceLink::product("p-1"),
        },
    )
    .await
    .expect("Failed to create resource");
    EmbeddingQueries::upsert(&pool, &new_embedding(&resource.id, 0, "Gloves"))
        .await
        .expect("Failed to store embedding");
    assert_eq!(
        EmbeddingQueries::count_for_product(&pool, "p-1")
            .await
            .expect("count"),
        1
    );

    assert!(
        ProductQueries::delete(&pool, "p-1")
            .await
            .expect("Failed to delete product")
    );

    assert!(
        ResourceQueries::get_by_id(&pool, &resource.id)
            .await
            .expect("lookup")
            .is_none()
    );
    assert_eq!(EmbeddingQueries::count(&pool).await.expect("count"), 0);
}

#[tokio::test]
async fn delete_by_type_leaves_other_types() {
    let (_temp_dir, pool) = create_test_pool().await;

    for (content, kind) in [("x", "faq"), ("y", "faq"), ("z", "policy")] {
        let resource = ResourceQueries::create(
            &pool,
            &NewResource {
                content: content.to_string(),
                link: ResourceLink::untyped(kind),
            },
        )
        .await
        .expect("Failed to create resource");
        EmbeddingQueries::upsert(&pool, &new_embedding(&resource.id, 0, content))
            .await
            .expect("Failed to store embedding");
    }

    let removed = ResourceQueries::delete_by_type(&pool, "faq")
        .await
        .expect("Failed to delete resources");
    assert_eq!(removed, 2);
    assert_eq!(ResourceQueries::count(&pool).await.expect("count"), 1);
    assert_eq!(EmbeddingQueries::count(&pool).await.expect("count"), 1);
}

#[tokio::test]
async fn candidates_carry_product_link_and_filter_by_type() {
    let (_temp_dir, pool) = create_test_pool().await;
    ProductQueries::upsert(&pool, &new_product("p-1", "Gloves"))
        .await
        .expect("Failed to insert product");

    let product_resource = ResourceQueries::create(
        &pool,
        &NewResource {
            content: "Gloves.".to_string(),
            link: ResourceLink::product("p-1"),
        },
    )
    .await
    .expect("Failed to create resource");
    let faq_resource = ResourceQueries::create(
        &pool,
        &NewResource {
            content: "Shipping.".to_string(),
            link: ResourceLink::untyped("faq"),
        },
    )
    .await
    .expect("Failed to create resource");

    EmbeddingQueries::upsert(&pool, &new_embedding(&product_resource.id, 0, "Gloves"))
        .await
        .expect("Failed to store embedding");
    EmbeddingQueries::upsert(&pool, &new_embedding(&faq_resource.id, 0, "Shipping"))
        .await
        .expect("Failed to store embedding");

    let all = EmbeddingQueries::candidates(&pool, None)
        .await
        .expect("Failed to load candidates");
    assert_eq!(all.len(), 2);

    let products = EmbeddingQueries::candidates(&pool, Some("product"))
        .await
        .expect("Failed to load candidates");
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].product_id.as_deref(), Some("p-1"));
    assert_eq!(products[0].content, "Gloves");
}

#[tokio::test]
async fn embedding_counts_include_resources_without_vectors() {
    let (_temp_dir, pool) = create_test_pool().await;

    let empty = ResourceQueries::create(
        &pool,
        &NewResource {
            content: "Nothing yet.".to_string(),
            link: ResourceLink::untyped("faq"),
        },
    )
    .await
    .expect("Failed to create resource");
    let full = ResourceQueries::create(
        &pool,
        &NewResource {
            content: "One. Two.".to_string(),
            link: ResourceLink::untyped("faq"),
        },
    )
    .await
    .expect("Failed to create resource");
    for i in 0..2 {
        EmbeddingQueries::upsert(&pool, &new_embedding(&full.id, i, "chunk"))
            .await
            .expect("Failed to store embedding");
    }

    let counts = ResourceQueries::embedding_counts(&pool)
        .await
        .expect("Failed to count embeddings");
    let count_for = |id: &str| {
        counts
            .iter()
            .find(|c| c.resource_id == id)
            .map(|c| c.embedding_count)
    };

    assert_eq!(count_for(&empty.id), Some(0));
    assert_eq!(count_for(&full.id), Some(2));
}
