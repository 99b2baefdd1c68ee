use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use storefront_catalog::{
    CategoryId, NewProduct, Product, ProductChanges, ProductDetail, ProductId, ProductInput,
    ProductPatch, ProductTag, TagId, TagLink,
};
use storefront_core::{
    CatalogStore, CatalogTransaction, CoreError, ProductService, StoreError, StoreResult,
};
use storefront_store::InMemoryCatalog;

fn input(value: serde_json::Value) -> ProductInput {
    serde_json::from_value(value).unwrap()
}

fn patch(value: serde_json::Value) -> ProductPatch {
    serde_json::from_value(value).unwrap()
}

fn tag_ids(detail: &ProductDetail) -> Vec<i32> {
    detail.tags.iter().map(|tag| tag.id.0).collect()
}

/// Store seeded with one category and tags 1..=6, plus a product tagged with `tags`.
async fn setup(tags: &[i32]) -> (InMemoryCatalog, ProductService, ProductId) {
    let store = InMemoryCatalog::new();
    store.add_category("Shirts").await;
    for name in ["rock", "pop", "blue", "red", "green", "white"] {
        store.add_tag(name).await;
    }

    let service = ProductService::new(Arc::new(store.clone()));
    let created = service
        .create_product(input(json!({
            "product_name": "Tee",
            "price": 14.99,
            "category_id": 1,
            "tagIds": tags,
        })))
        .await
        .unwrap();

    (store, service, created.product.id)
}

#[tokio::test]
async fn test_create_links_requested_tags() {
    let (store, service, id) = setup(&[1, 2, 3]).await;

    let detail = service.get_product(id).await.unwrap();
    assert_eq!(tag_ids(&detail), vec![1, 2, 3]);
    assert_eq!(detail.category.unwrap().category_name, "Shirts");
    assert_eq!(detail.product.stock, 10);
    assert_eq!(store.product_tags().await.len(), 3);
}

#[tokio::test]
async fn test_create_without_tag_ids_creates_no_links() {
    let (store, service, _) = setup(&[]).await;

    let created = service
        .create_product(input(json!({"product_name": "Plain", "price": 3})))
        .await
        .unwrap();

    assert!(created.product_tags.is_empty());
    assert!(store.product_tags().await.is_empty());
}

#[tokio::test]
async fn test_create_rejects_unknown_references() {
    let (store, service, _) = setup(&[]).await;

    let err = service
        .create_product(input(json!({"product_name": "Cap", "price": 5, "tagIds": [2, 99]})))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ValidationError(msg) if msg.contains("99")));

    let err = service
        .create_product(input(json!({"product_name": "Cap", "price": 5, "category_id": 42})))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ValidationError(_)));

    assert_eq!(store.list_products().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_update_adds_missing_tag() {
    let (_, service, id) = setup(&[1, 2, 3]).await;

    let updated = service
        .update_product(id, patch(json!({"tagIds": [1, 2, 3, 4]})))
        .await
        .unwrap();

    assert_eq!(updated.destroyed_tags, 0);
    assert_eq!(updated.created_tags.len(), 1);
    assert_eq!(updated.created_tags[0].tag_id, TagId(4));
    assert_eq!(tag_ids(&updated.product), vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_update_removes_unwanted_tags() {
    let (_, service, id) = setup(&[1, 2, 3]).await;

    let updated = service
        .update_product(id, patch(json!({"tagIds": [2]})))
        .await
        .unwrap();

    assert_eq!(updated.destroyed_tags, 2);
    assert!(updated.created_tags.is_empty());
    assert_eq!(tag_ids(&updated.product), vec![2]);
}

#[tokio::test]
async fn test_update_from_no_tags() {
    let (_, service, id) = setup(&[]).await;

    let updated = service
        .update_product(id, patch(json!({"tagIds": [5, 6]})))
        .await
        .unwrap();

    assert_eq!(updated.created_tags.len(), 2);
    assert_eq!(tag_ids(&updated.product), vec![5, 6]);
}

#[tokio::test]
async fn test_update_with_empty_list_clears_tags() {
    let (store, service, id) = setup(&[1, 2]).await;

    let updated = service
        .update_product(id, patch(json!({"tagIds": []})))
        .await
        .unwrap();

    assert_eq!(updated.destroyed_tags, 2);
    assert!(updated.product.tags.is_empty());
    assert!(store.product_tags().await.is_empty());
}

#[tokio::test]
async fn test_update_with_same_tags_writes_nothing() {
    let (store, service, id) = setup(&[1, 2]).await;
    let before = store.product_tags().await;

    let updated = service
        .update_product(id, patch(json!({"tagIds": [2, 1]})))
        .await
        .unwrap();

    assert_eq!(updated.destroyed_tags, 0);
    assert!(updated.created_tags.is_empty());
    assert_eq!(store.product_tags().await, before);
}

#[tokio::test]
async fn test_update_without_tag_ids_keeps_links() {
    let (_, service, id) = setup(&[1, 3]).await;

    let updated = service
        .update_product(id, patch(json!({"stock": 0, "price": 20})))
        .await
        .unwrap();

    assert_eq!(updated.product.product.stock, 0);
    assert_eq!(tag_ids(&updated.product), vec![1, 3]);
    assert_eq!(updated.destroyed_tags, 0);
}

#[tokio::test]
async fn test_update_can_detach_category() {
    let (_, service, id) = setup(&[]).await;

    let updated = service
        .update_product(id, patch(json!({"category_id": null})))
        .await
        .unwrap();

    assert_eq!(updated.product.product.category_id, None);
    assert!(updated.product.category.is_none());
}

#[tokio::test]
async fn test_update_missing_product_is_not_found() {
    let (_, service, _) = setup(&[]).await;

    let err = service
        .update_product(ProductId(404), patch(json!({"tagIds": [1]})))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ProductNotFound(ProductId(404))));
}

#[tokio::test]
async fn test_update_rejects_invalid_fields_before_writing() {
    let (store, service, id) = setup(&[1]).await;

    let err = service
        .update_product(id, patch(json!({"price": -5, "tagIds": []})))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ValidationError(_)));
    assert_eq!(store.product_tags().await.len(), 1);
}

#[tokio::test]
async fn test_delete_and_not_found() {
    let (store, service, id) = setup(&[1, 2]).await;

    assert_eq!(service.delete_product(id).await.unwrap(), 1);
    assert!(store.product_tags().await.is_empty());
    assert!(matches!(
        service.delete_product(id).await.unwrap_err(),
        CoreError::ProductNotFound(_)
    ));
    assert!(matches!(
        service.get_product(id).await.unwrap_err(),
        CoreError::ProductNotFound(_)
    ));
}

#[tokio::test]
async fn test_update_missing_product_is_not_found_before_reference_checks() {
    let (_, service, _) = setup(&[]).await;

    let err = service
        .update_product(
            ProductId(404),
            patch(json!({"category_id": 42, "tagIds": [99]})),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ProductNotFound(ProductId(404))));
}

#[tokio::test]
async fn test_update_with_unknown_tag_changes_nothing() {
    let (store, service, id) = setup(&[1]).await;
    let before = store.get_product(id).await.unwrap().unwrap();

    let err = service
        .update_product(id, patch(json!({"product_name": "Renamed", "tagIds": [1, 99]})))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ValidationError(msg) if msg.contains("99")));
    assert_eq!(store.get_product(id).await.unwrap().unwrap(), before);
}

// ============================================================================
// Failures inside the transaction
// ============================================================================

#[derive(Clone, Copy)]
enum Fault {
    Inserts,
    Deletes,
}

/// Wraps the in-memory store and fails one kind of bulk association write.
struct FaultyStore {
    inner: InMemoryCatalog,
    fault: Fault,
}

struct FaultyTx {
    inner: Box<dyn CatalogTransaction>,
    fault: Fault,
}

fn injected() -> StoreError {
    StoreError::backend("connection reset")
}

#[async_trait]
impl CatalogStore for FaultyStore {
    async fn list_products(&self) -> StoreResult<Vec<ProductDetail>> {
        self.inner.list_products().await
    }

    async fn get_product(&self, id: ProductId) -> StoreResult<Option<ProductDetail>> {
        self.inner.get_product(id).await
    }

    async fn delete_product(&self, id: ProductId) -> StoreResult<u64> {
        self.inner.delete_product(id).await
    }

    async fn begin(&self) -> StoreResult<Box<dyn CatalogTransaction>> {
        Ok(Box::new(FaultyTx {
            inner: self.inner.begin().await?,
            fault: self.fault,
        }))
    }
}

#[async_trait]
impl CatalogTransaction for FaultyTx {
    async fn category_exists(&mut self, id: CategoryId) -> StoreResult<bool> {
        self.inner.category_exists(id).await
    }

    async fn missing_tags(&mut self, ids: &[TagId]) -> StoreResult<Vec<TagId>> {
        self.inner.missing_tags(ids).await
    }

    async fn insert_product(&mut self, product: &NewProduct) -> StoreResult<Product> {
        self.inner.insert_product(product).await
    }

    async fn update_product(
        &mut self,
        id: ProductId,
        changes: &ProductChanges,
    ) -> StoreResult<Option<Product>> {
        self.inner.update_product(id, changes).await
    }

    async fn product_tag_ids(&mut self, product_id: ProductId) -> StoreResult<Vec<TagId>> {
        self.inner.product_tag_ids(product_id).await
    }

    async fn insert_product_tags(&mut self, links: &[TagLink]) -> StoreResult<Vec<ProductTag>> {
        match self.fault {
            Fault::Inserts => Err(injected()),
            Fault::Deletes => self.inner.insert_product_tags(links).await,
        }
    }

    async fn delete_product_tags(
        &mut self,
        product_id: ProductId,
        tag_ids: &[TagId],
    ) -> StoreResult<u64> {
        match self.fault {
            Fault::Deletes => Err(injected()),
            Fault::Inserts => self.inner.delete_product_tags(product_id, tag_ids).await,
        }
    }

    async fn product_detail(&mut self, id: ProductId) -> StoreResult<Option<ProductDetail>> {
        self.inner.product_detail(id).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.inner.commit().await
    }
}

fn faulty_service(store: &InMemoryCatalog, fault: Fault) -> ProductService {
    ProductService::new(Arc::new(FaultyStore {
        inner: store.clone(),
        fault,
    }))
}

#[tokio::test]
async fn test_failed_delete_rolls_back_inserts_and_field_changes() {
    let (store, _, id) = setup(&[1, 2]).await;
    let before = store.get_product(id).await.unwrap().unwrap();

    let service = faulty_service(&store, Fault::Deletes);
    let err = service
        .update_product(id, patch(json!({"product_name": "Renamed", "tagIds": [2, 3]})))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::StoreError(_)));

    let after = store.get_product(id).await.unwrap().unwrap();
    assert_eq!(after, before);
    assert_eq!(tag_ids(&after), vec![1, 2]);
}

#[tokio::test]
async fn test_failed_link_insert_rolls_back_created_product() {
    let (store, _, _) = setup(&[1]).await;
    let products_before = store.list_products().await.unwrap();
    let links_before = store.product_tags().await;

    let service = faulty_service(&store, Fault::Inserts);
    let err = service
        .create_product(input(json!({
            "product_name": "Hoodie",
            "price": 39.99,
            "category_id": 1,
            "tagIds": [2, 3],
        })))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::StoreError(_)));

    assert_eq!(store.list_products().await.unwrap(), products_before);
    assert_eq!(store.product_tags().await, links_before);

    // The store lock was released and the id sequence was not advanced.
    let created = ProductService::new(Arc::new(store.clone()))
        .create_product(input(json!({"product_name": "Hoodie", "price": 39.99})))
        .await
        .unwrap();
    assert_eq!(created.product.id, ProductId(2));
}
