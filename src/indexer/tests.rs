use super::*;
use crate::database::sqlite::models::NewProduct;
use crate::embeddings::chunk_count;
use crate::embeddings::fake::FakeEmbedder;
use std::sync::atomic::Ordering;
use tempfile::TempDir;

pub(crate) async fn create_test_indexer(
    embedder: Arc<dyn Embedder>,
) -> (TempDir, Indexer) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let database = Database::initialize_from_config_dir(temp_dir.path())
        .await
        .expect("Failed to create database");
    let config = IndexingConfig {
        resource_type: "product".to_string(),
        item_delay_ms: 0,
    };

    (
        temp_dir,
        Indexer::new(Arc::new(database), embedder, config),
    )
}

pub(crate) fn sample_product(id: &str, name: &str, description: &str) -> NewProduct {
    NewProduct {
        id: id.to_string(),
        name: name.to_string(),
        brand: Some("Everlast".to_string()),
        description: Some(description.to_string()),
        category: Some("boxing".to_string()),
        price_cents: Some(3999),
    }
}

#[tokio::test]
async fn ingest_stores_one_embedding_per_chunk_in_order() {
    let (_temp_dir, indexer) = create_test_indexer(Arc::new(FakeEmbedder::new(4))).await;

    let report = indexer
        .ingest(
            "Leather gloves. Padded cuffs. Lifetime warranty.",
            ResourceLink::untyped("faq"),
        )
        .await
        .expect("ingest should succeed");

    assert_eq!(report.chunk_count, 3);
    assert_eq!(report.embedding_count, 3);
    assert!(report.is_complete());

    let stored = indexer
        .database()
        .get_embeddings_for_resource(&report.resource.id)
        .await
        .expect("Failed to list embeddings");
    let contents: Vec<&str> = stored.iter().map(|e| e.content.as_str()).collect();
    assert_eq!(
        contents,
        vec!["Leather gloves", "Padded cuffs", "Lifetime warranty"]
    );
    assert!(stored.iter().all(|e| e.vector().expect("decode").len() == 4));
}

#[tokio::test]
async fn whitespace_content_creates_resource_without_embeddings() {
    let fake = Arc::new(FakeEmbedder::new(4));
    let (_temp_dir, indexer) =
        create_test_indexer(Arc::clone(&fake) as Arc<dyn Embedder>).await;

    let report = indexer
        .ingest("   \n\t ", ResourceLink::untyped("faq"))
        .await
        .expect("empty content is a valid outcome");

    assert_eq!(report.chunk_count, 0);
    assert_eq!(report.embedding_count, 0);
    assert_eq!(fake.batch_calls.load(Ordering::SeqCst), 0);

    let resource = indexer
        .database()
        .get_resource(&report.resource.id)
        .await
        .expect("lookup")
        .expect("resource should be stored");
    assert_eq!(resource.resource_type, "faq");
}

#[tokio::test]
async fn embedding_failure_leaves_nothing_behind() {
    let (_temp_dir, indexer) = create_test_indexer(Arc::new(FakeEmbedder::failing(4))).await;

    let result = indexer
        .ingest("Heavy bag. Chains included.", ResourceLink::untyped("faq"))
        .await;
    assert!(matches!(result, Err(StorefrontError::EmbeddingService(_))));

    let stats = indexer.database().statistics().await.expect("stats");
    assert_eq!(stats.resources, 0);
    assert_eq!(stats.embeddings, 0);
}

#[tokio::test]
async fn ingest_product_replaces_previous_resources() {
    let (_temp_dir, indexer) = create_test_indexer(Arc::new(FakeEmbedder::new(4))).await;
    let product = indexer
        .database()
        .upsert_product(&sample_product("p-1", "Hand Wraps", "180 inch. Cotton blend."))
        .await
        .expect("Failed to insert product");

    let first = indexer
        .ingest_product(&product)
        .await
        .expect("first ingest should succeed");
    let second = indexer
        .ingest_product(&product)
        .await
        .expect("second ingest should succeed");

    assert_ne!(first.resource.id, second.resource.id);
    assert_eq!(second.resource.product_id.as_deref(), Some("p-1"));

    let resources = indexer
        .database()
        .list_resources_for_product("p-1")
        .await
        .expect("Failed to list resources");
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].id, second.resource.id);
    assert_eq!(resources[0].content, product.document());
}

#[tokio::test]
async fn reindex_keeps_other_resource_types_linked_to_product() {
    let (_temp_dir, indexer) = create_test_indexer(Arc::new(FakeEmbedder::new(4))).await;
    indexer
        .import_products(&[sample_product("gloves", "Sparring Gloves", "16 oz.")])
        .await
        .expect("import should succeed");

    let policy = indexer
        .ingest(
            "Returns accepted within 30 days. Unworn only.",
            ResourceLink {
                resource_type: "policy".to_string(),
                product_id: Some("gloves".to_string()),
            },
        )
        .await
        .expect("ingest should succeed");

    let stats = indexer.reindex_products().await.expect("reindex");
    assert_eq!(stats.succeeded, 1);

    let kept = indexer
        .database()
        .get_resource(&policy.resource.id)
        .await
        .expect("Failed to get resource")
        .expect("policy resource survives reindex");
    assert_eq!(kept.resource_type, "policy");
    assert_eq!(
        indexer
            .database()
            .get_embeddings_for_resource(&policy.resource.id)
            .await
            .expect("Failed to list embeddings")
            .len(),
        2
    );

    let product = indexer
        .database()
        .get_product("gloves")
        .await
        .expect("Failed to get product")
        .expect("product exists");
    indexer
        .ingest_product(&product)
        .await
        .expect("ingest should succeed");

    let mut types: Vec<String> = indexer
        .database()
        .list_resources_for_product("gloves")
        .await
        .expect("Failed to list resources")
        .into_iter()
        .map(|r| r.resource_type)
        .collect();
    types.sort();
    assert_eq!(types, vec!["policy".to_string(), "product".to_string()]);
}

#[tokio::test]
async fn repair_resource_fills_missing_and_trims_excess() {
    let (_temp_dir, indexer) = create_test_indexer(Arc::new(FakeEmbedder::new(4))).await;
    let report = indexer
        .ingest("One. Two. Three.", ResourceLink::untyped("faq"))
        .await
        .expect("ingest should succeed");
    let resource_id = report.resource.id.clone();

    // Knock out the middle chunk and add one past the end
    sqlx::query("DELETE FROM embeddings WHERE resource_id = ? AND chunk_index = 1")
        .bind(&resource_id)
        .execute(indexer.database().pool())
        .await
        .expect("Failed to delete embedding");
    EmbeddingQueries::upsert(
        indexer.database().pool(),
        &NewEmbedding {
            resource_id: resource_id.clone(),
            chunk_index: 7,
            content: "stale".to_string(),
            vector: vec![0.0; 4],
        },
    )
    .await
    .expect("Failed to add stale embedding");

    let repaired = indexer
        .repair_resource(&resource_id)
        .await
        .expect("repair should succeed");
    assert_eq!(repaired.chunk_count, 3);
    assert_eq!(repaired.embedding_count, 3);

    let stored = indexer
        .database()
        .get_embeddings_for_resource(&resource_id)
        .await
        .expect("Failed to list embeddings");
    let indices: Vec<i64> = stored.iter().map(|e| e.chunk_index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    assert_eq!(stored[1].content, "Two");
}

#[tokio::test]
async fn repair_unknown_resource_is_storage_error() {
    let (_temp_dir, indexer) = create_test_indexer(Arc::new(FakeEmbedder::new(4))).await;

    let result = indexer.repair_resource("missing").await;
    assert!(matches!(result, Err(StorefrontError::Storage(_))));
}

#[tokio::test]
async fn purge_type_removes_only_that_type() {
    let (_temp_dir, indexer) = create_test_indexer(Arc::new(FakeEmbedder::new(4))).await;
    let product = indexer
        .database()
        .upsert_product(&sample_product("p-1", "Jump Rope", "Steel cable."))
        .await
        .expect("Failed to insert product");
    indexer
        .ingest_product(&product)
        .await
        .expect("ingest should succeed");
    indexer
        .ingest("Free shipping over 50 dollars.", ResourceLink::untyped("faq"))
        .await
        .expect("ingest should succeed");

    let removed = indexer.purge_type("product").await.expect("purge");
    assert_eq!(removed, 1);
    assert!(
        indexer
            .database()
            .list_resources_by_type("product")
            .await
            .expect("Failed to list resources")
            .is_empty()
    );
    let faqs = indexer
        .database()
        .list_resources_by_type("faq")
        .await
        .expect("Failed to list resources");
    assert_eq!(faqs.len(), 1);

    let stats = indexer.database().statistics().await.expect("stats");
    assert_eq!(stats.products, 1);
    assert_eq!(stats.resources, 1);
    assert_eq!(stats.embeddings, 1);
}

#[tokio::test]
async fn reindex_leaves_chunk_count_embeddings_per_product() {
    let (_temp_dir, indexer) = create_test_indexer(Arc::new(FakeEmbedder::new(4))).await;
    let catalog = [
        sample_product("p-1", "Sparring Gloves", "16 oz. Hook and loop closure."),
        sample_product("p-2", "Mouthguard", "Boil and bite."),
        sample_product("p-3", "Headgear", ""),
    ];
    for product in &catalog {
        let stored = indexer
            .database()
            .upsert_product(product)
            .await
            .expect("Failed to insert product");
        indexer
            .ingest_product(&stored)
            .await
            .expect("ingest should succeed");
    }

    let stats = indexer.reindex_products().await.expect("reindex");
    assert_eq!(stats.total, 3);
    assert_eq!(stats.succeeded, 3);
    assert_eq!(stats.failed, 0);

    let mut expected_total = 0;
    for product in indexer.database().list_products().await.expect("list") {
        let expected = chunk_count(&product.document());
        expected_total += expected;
        let stored = EmbeddingQueries::count_for_product(indexer.database().pool(), &product.id)
            .await
            .expect("count");
        assert_eq!(stored as usize, expected, "product {}", product.id);
        assert_eq!(
            indexer
                .database()
                .list_resources_for_product(&product.id)
                .await
                .expect("list")
                .len(),
            1
        );
    }
    assert_eq!(stats.total_chunks, expected_total);
}

#[tokio::test]
async fn reindex_counts_failures_and_keeps_going() {
    let (_temp_dir, indexer) = create_test_indexer(Arc::new(FakeEmbedder::failing(4))).await;
    indexer
        .database()
        .upsert_product(&sample_product("p-1", "Speed Bag", "Leather."))
        .await
        .expect("Failed to insert product");
    indexer
        .database()
        .upsert_product(&sample_product("p-2", "Bag Gloves", "Light padding."))
        .await
        .expect("Failed to insert product");

    let stats = indexer
        .reindex_products()
        .await
        .expect("per-item failures do not fail the run");

    assert_eq!(stats.total, 2);
    assert_eq!(stats.succeeded, 0);
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.total_chunks, 0);
}

#[tokio::test]
async fn import_products_upserts_and_ingests() {
    let (_temp_dir, indexer) = create_test_indexer(Arc::new(FakeEmbedder::new(4))).await;

    let stats = indexer
        .import_products(&[
            sample_product("p-1", "Focus Mitts", "Curved. Lightweight."),
            sample_product("p-2", "Ring Bell", "Brass."),
        ])
        .await
        .expect("import should succeed");

    assert_eq!(stats.succeeded, 2);
    let db_stats = indexer.database().statistics().await.expect("stats");
    assert_eq!(db_stats.products, 2);
    assert_eq!(db_stats.resources, 2);
    assert_eq!(db_stats.embeddings as usize, stats.total_chunks);
}
