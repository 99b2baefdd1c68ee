use std::sync::Arc;

use storefront_core::{CatalogStore, ProductService};

#[derive(Clone)]
pub struct AppState {
    pub products: ProductService,
}

impl AppState {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self {
            products: ProductService::new(store),
        }
    }
}
