use std::sync::Arc;

use storefront_catalog::{
    reconcile, CategoryId, Product, ProductChanges, ProductDetail, ProductId, ProductInput,
    ProductPatch, ProductTag, TagId,
};
use tracing::info;

use crate::repository::{CatalogStore, CatalogTransaction};
use crate::{CoreError, CoreResult};

/// Result of a product creation
#[derive(Debug, Clone)]
pub struct CreatedProduct {
    pub product: Product,
    pub product_tags: Vec<ProductTag>,
}

/// Result of a product update
#[derive(Debug, Clone)]
pub struct UpdatedProduct {
    pub product: ProductDetail,
    /// Number of tag associations deleted.
    pub destroyed_tags: u64,
    /// Tag associations inserted.
    pub created_tags: Vec<ProductTag>,
}

/// Product operations over an explicit catalog store
#[derive(Clone)]
pub struct ProductService {
    store: Arc<dyn CatalogStore>,
}

impl ProductService {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    pub async fn list_products(&self) -> CoreResult<Vec<ProductDetail>> {
        Ok(self.store.list_products().await?)
    }

    pub async fn get_product(&self, id: ProductId) -> CoreResult<ProductDetail> {
        self.store
            .get_product(id)
            .await?
            .ok_or(CoreError::ProductNotFound(id))
    }

    /// Inserts the product and one association per requested tag, atomically.
    pub async fn create_product(&self, input: ProductInput) -> CoreResult<CreatedProduct> {
        let new = input.validate()?;

        let mut tx = self.store.begin().await?;
        ensure_references(&mut *tx, new.category_id, &new.tag_ids).await?;

        let product = tx.insert_product(&new).await?;

        // A fresh product has no associations, so the plan is "create all".
        let plan = reconcile(product.id, &[], &new.tag_ids);
        let product_tags = if plan.to_create.is_empty() {
            Vec::new()
        } else {
            tx.insert_product_tags(&plan.to_create).await?
        };

        tx.commit().await?;

        info!(
            product_id = %product.id,
            tags = product_tags.len(),
            "Product created"
        );

        Ok(CreatedProduct {
            product,
            product_tags,
        })
    }

    /// Updates the supplied fields and, when `tagIds` is present, reconciles
    /// the product's tag associations to exactly that set. Either everything
    /// is applied or nothing is.
    pub async fn update_product(&self, id: ProductId, patch: ProductPatch) -> CoreResult<UpdatedProduct> {
        let update = patch.validate()?;

        let mut tx = self.store.begin().await?;

        // Lock the row first; a missing product wins over bad references.
        tx.update_product(id, &ProductChanges::default())
            .await?
            .ok_or(CoreError::ProductNotFound(id))?;

        ensure_references(
            &mut *tx,
            update.changes.category_id.flatten(),
            update.tag_ids.as_deref().unwrap_or_default(),
        )
        .await?;

        if !update.changes.is_empty() {
            tx.update_product(id, &update.changes)
                .await?
                .ok_or(CoreError::ProductNotFound(id))?;
        }

        let mut destroyed_tags = 0;
        let mut created_tags = Vec::new();

        if let Some(desired) = &update.tag_ids {
            let current = tx.product_tag_ids(id).await?;
            let plan = reconcile(id, &current, desired);

            if !plan.to_create.is_empty() {
                created_tags = tx.insert_product_tags(&plan.to_create).await?;
            }
            if !plan.to_remove.is_empty() {
                destroyed_tags = tx.delete_product_tags(id, &plan.to_remove).await?;
            }

            info!(
                product_id = %id,
                created = plan.to_create.len(),
                removed = plan.to_remove.len(),
                "Tags reconciled"
            );
        }

        let product = tx
            .product_detail(id)
            .await?
            .ok_or(CoreError::ProductNotFound(id))?;

        tx.commit().await?;

        info!(product_id = %id, "Product updated");

        Ok(UpdatedProduct {
            product,
            destroyed_tags,
            created_tags,
        })
    }

    pub async fn delete_product(&self, id: ProductId) -> CoreResult<u64> {
        let deleted = self.store.delete_product(id).await?;
        if deleted == 0 {
            return Err(CoreError::ProductNotFound(id));
        }

        info!(product_id = %id, "Product deleted");
        Ok(deleted)
    }
}

async fn ensure_references(
    tx: &mut dyn CatalogTransaction,
    category_id: Option<CategoryId>,
    tag_ids: &[TagId],
) -> CoreResult<()> {
    if let Some(category_id) = category_id {
        if !tx.category_exists(category_id).await? {
            return Err(CoreError::ValidationError(format!(
                "Unknown category_id: {}",
                category_id
            )));
        }
    }

    if !tag_ids.is_empty() {
        let missing = tx.missing_tags(tag_ids).await?;
        if !missing.is_empty() {
            let ids = missing
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<String>>()
                .join(", ");
            return Err(CoreError::ValidationError(format!("Unknown tagIds: {}", ids)));
        }
    }

    Ok(())
}
