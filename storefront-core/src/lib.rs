pub mod repository;
pub mod service;

pub use repository::{CatalogStore, CatalogTransaction, StoreError, StoreResult};
pub use service::{CreatedProduct, ProductService, UpdatedProduct};

use storefront_catalog::{CatalogError, ProductId};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Could not find product with ID: {0}")]
    ProductNotFound(ProductId),
    #[error("Storage failure: {0}")]
    StoreError(#[from] StoreError),
}

impl From<CatalogError> for CoreError {
    fn from(err: CatalogError) -> Self {
        Self::ValidationError(err.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
