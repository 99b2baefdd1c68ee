use async_trait::async_trait;
use storefront_catalog::{
    CategoryId, NewProduct, Product, ProductChanges, ProductDetail, ProductId, ProductTag, TagId,
    TagLink,
};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(#[source] BoxError),
}

impl StoreError {
    pub fn backend(err: impl Into<BoxError>) -> Self {
        Self::Backend(err.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Repository trait for product catalog access
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// All products ordered by id, each with its category and tags.
    async fn list_products(&self) -> StoreResult<Vec<ProductDetail>>;

    async fn get_product(&self, id: ProductId) -> StoreResult<Option<ProductDetail>>;

    /// Deletes the product and its tag associations. Returns the number of
    /// product rows removed.
    async fn delete_product(&self, id: ProductId) -> StoreResult<u64>;

    /// Opens a unit of work. Nothing written through it is visible to other
    /// callers until [`CatalogTransaction::commit`]; dropping it uncommitted
    /// rolls everything back.
    async fn begin(&self) -> StoreResult<Box<dyn CatalogTransaction>>;
}

/// Writes and reads scoped to one store transaction
#[async_trait]
pub trait CatalogTransaction: Send {
    async fn category_exists(&mut self, id: CategoryId) -> StoreResult<bool>;

    /// Returns the ids from `ids` that have no tag row, in input order.
    async fn missing_tags(&mut self, ids: &[TagId]) -> StoreResult<Vec<TagId>>;

    async fn insert_product(&mut self, product: &NewProduct) -> StoreResult<Product>;

    /// Applies `changes` and returns the updated row, or `None` when the
    /// product does not exist. The row stays locked until the transaction
    /// ends, even when `changes` is empty.
    async fn update_product(
        &mut self,
        id: ProductId,
        changes: &ProductChanges,
    ) -> StoreResult<Option<Product>>;

    /// Tag ids currently associated with the product, ordered by association id.
    async fn product_tag_ids(&mut self, product_id: ProductId) -> StoreResult<Vec<TagId>>;

    /// Bulk insert. Pairs that already exist are skipped and not returned.
    async fn insert_product_tags(&mut self, links: &[TagLink]) -> StoreResult<Vec<ProductTag>>;

    /// Bulk delete. Returns the number of associations removed.
    async fn delete_product_tags(
        &mut self,
        product_id: ProductId,
        tag_ids: &[TagId],
    ) -> StoreResult<u64>;

    async fn product_detail(&mut self, id: ProductId) -> StoreResult<Option<ProductDetail>>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
