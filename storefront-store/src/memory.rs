use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use storefront_catalog::{
    Category, CategoryId, NewProduct, Product, ProductChanges, ProductDetail, ProductId,
    ProductTag, ProductTagId, Tag, TagId, TagLink,
};
use storefront_core::{CatalogStore, CatalogTransaction, StoreResult};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default)]
struct CatalogState {
    categories: BTreeMap<CategoryId, Category>,
    tags: BTreeMap<TagId, Tag>,
    products: BTreeMap<ProductId, Product>,
    product_tags: Vec<ProductTag>,
    last_category_id: i32,
    last_tag_id: i32,
    last_product_id: i32,
    last_product_tag_id: i32,
}

impl CatalogState {
    fn detail(&self, id: ProductId) -> Option<ProductDetail> {
        let product = self.products.get(&id)?.clone();
        let category = product
            .category_id
            .and_then(|category_id| self.categories.get(&category_id).cloned());

        let mut tags: Vec<Tag> = self
            .product_tags
            .iter()
            .filter(|pt| pt.product_id == id)
            .filter_map(|pt| self.tags.get(&pt.tag_id).cloned())
            .collect();
        tags.sort_by_key(|tag| tag.id);

        Some(ProductDetail {
            product,
            category,
            tags,
        })
    }
}

/// In-process catalog store.
///
/// Intended for tests and local runs. Transactions take the store lock for
/// their whole lifetime and work on a copy of the state that replaces the
/// shared one on commit.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    state: Arc<Mutex<CatalogState>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store preloaded with a handful of categories and tags.
    pub async fn seeded() -> Self {
        let store = Self::new();
        for name in ["Shirts", "Shorts", "Music", "Hats", "Shoes"] {
            store.add_category(name).await;
        }
        for name in ["rock music", "pop music", "blue", "red", "green", "white", "gold", "pop culture"] {
            store.add_tag(name).await;
        }
        store
    }

    pub async fn add_category(&self, name: &str) -> Category {
        let mut state = self.state.lock().await;
        state.last_category_id += 1;
        let category = Category {
            id: CategoryId(state.last_category_id),
            category_name: name.to_string(),
        };
        state.categories.insert(category.id, category.clone());
        category
    }

    pub async fn add_tag(&self, name: &str) -> Tag {
        let mut state = self.state.lock().await;
        state.last_tag_id += 1;
        let tag = Tag {
            id: TagId(state.last_tag_id),
            tag_name: name.to_string(),
        };
        state.tags.insert(tag.id, tag.clone());
        tag
    }

    /// Every stored association, ordered by association id.
    pub async fn product_tags(&self) -> Vec<ProductTag> {
        self.state.lock().await.product_tags.clone()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn list_products(&self) -> StoreResult<Vec<ProductDetail>> {
        let state = self.state.lock().await;
        Ok(state
            .products
            .keys()
            .filter_map(|id| state.detail(*id))
            .collect())
    }

    async fn get_product(&self, id: ProductId) -> StoreResult<Option<ProductDetail>> {
        Ok(self.state.lock().await.detail(id))
    }

    async fn delete_product(&self, id: ProductId) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        if state.products.remove(&id).is_none() {
            return Ok(0);
        }
        state.product_tags.retain(|pt| pt.product_id != id);
        Ok(1)
    }

    async fn begin(&self) -> StoreResult<Box<dyn CatalogTransaction>> {
        let guard = self.state.clone().lock_owned().await;
        let staged = (*guard).clone();
        Ok(Box::new(InMemoryTransaction { guard, staged }))
    }
}

pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<CatalogState>,
    staged: CatalogState,
}

#[async_trait]
impl CatalogTransaction for InMemoryTransaction {
    async fn category_exists(&mut self, id: CategoryId) -> StoreResult<bool> {
        Ok(self.staged.categories.contains_key(&id))
    }

    async fn missing_tags(&mut self, ids: &[TagId]) -> StoreResult<Vec<TagId>> {
        Ok(ids
            .iter()
            .copied()
            .filter(|id| !self.staged.tags.contains_key(id))
            .collect())
    }

    async fn insert_product(&mut self, product: &NewProduct) -> StoreResult<Product> {
        let now = Utc::now();
        self.staged.last_product_id += 1;
        let row = Product {
            id: ProductId(self.staged.last_product_id),
            product_name: product.product_name.clone(),
            price: product.price,
            stock: product.stock,
            category_id: product.category_id,
            created_at: now,
            updated_at: now,
        };
        self.staged.products.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_product(
        &mut self,
        id: ProductId,
        changes: &ProductChanges,
    ) -> StoreResult<Option<Product>> {
        let Some(product) = self.staged.products.get_mut(&id) else {
            return Ok(None);
        };
        if !changes.is_empty() {
            changes.apply_to(product);
            product.updated_at = Utc::now();
        }
        Ok(Some(product.clone()))
    }

    async fn product_tag_ids(&mut self, product_id: ProductId) -> StoreResult<Vec<TagId>> {
        Ok(self
            .staged
            .product_tags
            .iter()
            .filter(|pt| pt.product_id == product_id)
            .map(|pt| pt.tag_id)
            .collect())
    }

    async fn insert_product_tags(&mut self, links: &[TagLink]) -> StoreResult<Vec<ProductTag>> {
        let mut created = Vec::with_capacity(links.len());
        for link in links {
            let exists = self
                .staged
                .product_tags
                .iter()
                .any(|pt| pt.product_id == link.product_id && pt.tag_id == link.tag_id);
            if exists {
                continue;
            }

            self.staged.last_product_tag_id += 1;
            let row = ProductTag {
                id: ProductTagId(self.staged.last_product_tag_id),
                product_id: link.product_id,
                tag_id: link.tag_id,
            };
            self.staged.product_tags.push(row.clone());
            created.push(row);
        }
        Ok(created)
    }

    async fn delete_product_tags(
        &mut self,
        product_id: ProductId,
        tag_ids: &[TagId],
    ) -> StoreResult<u64> {
        let before = self.staged.product_tags.len();
        self.staged
            .product_tags
            .retain(|pt| !(pt.product_id == product_id && tag_ids.contains(&pt.tag_id)));
        Ok((before - self.staged.product_tags.len()) as u64)
    }

    async fn product_detail(&mut self, id: ProductId) -> StoreResult<Option<ProductDetail>> {
        Ok(self.staged.detail(id))
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let InMemoryTransaction { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }
}
