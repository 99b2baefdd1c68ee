use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use storefront_catalog::{
    Category, CategoryId, NewProduct, Product, ProductChanges, ProductDetail, ProductId,
    ProductTag, ProductTagId, Tag, TagId, TagLink,
};
use storefront_core::{CatalogStore, CatalogTransaction, StoreError, StoreResult};

const PRODUCT_COLUMNS: &str = "id, product_name, price, stock, category_id, created_at, updated_at";

pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub struct PgCatalogTransaction {
    tx: Transaction<'static, Postgres>,
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct ProductRow {
    id: i32,
    product_name: String,
    price: Decimal,
    stock: i32,
    category_id: Option<i32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: ProductId(row.id),
            product_name: row.product_name,
            price: row.price,
            stock: row.stock,
            category_id: row.category_id.map(CategoryId),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: i32,
    category_name: String,
}

#[derive(sqlx::FromRow)]
struct ProductTagRow {
    id: i32,
    product_id: i32,
    tag_id: i32,
}

impl From<ProductTagRow> for ProductTag {
    fn from(row: ProductTagRow) -> Self {
        ProductTag {
            id: ProductTagId(row.id),
            product_id: ProductId(row.product_id),
            tag_id: TagId(row.tag_id),
        }
    }
}

#[derive(sqlx::FromRow)]
struct TaggedRow {
    product_id: i32,
    id: i32,
    tag_name: String,
}

fn db_error(err: sqlx::Error) -> StoreError {
    StoreError::backend(err)
}

fn raw_ids<T: Copy>(ids: &[T], f: impl Fn(T) -> i32) -> Vec<i32> {
    ids.iter().copied().map(f).collect()
}

/// Loads products with their category and tags. `only` restricts the result
/// to a single product.
async fn load_details(
    conn: &mut PgConnection,
    only: Option<ProductId>,
) -> Result<Vec<ProductDetail>, sqlx::Error> {
    let products: Vec<ProductRow> = sqlx::query_as(&format!(
        "SELECT {} FROM product WHERE ($1::int4 IS NULL OR id = $1) ORDER BY id",
        PRODUCT_COLUMNS
    ))
    .bind(only.map(|id| id.0))
    .fetch_all(&mut *conn)
    .await?;

    if products.is_empty() {
        return Ok(Vec::new());
    }

    let product_ids: Vec<i32> = products.iter().map(|p| p.id).collect();
    let category_ids: Vec<i32> = products
        .iter()
        .filter_map(|p| p.category_id)
        .collect::<HashSet<i32>>()
        .into_iter()
        .collect();

    let categories: HashMap<i32, Category> = sqlx::query_as::<_, CategoryRow>(
        "SELECT id, category_name FROM category WHERE id = ANY($1)",
    )
    .bind(&category_ids)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|row| {
        (
            row.id,
            Category {
                id: CategoryId(row.id),
                category_name: row.category_name,
            },
        )
    })
    .collect();

    let tagged: Vec<TaggedRow> = sqlx::query_as(
        r#"
        SELECT pt.product_id, t.id, t.tag_name
        FROM product_tag pt
        JOIN tag t ON t.id = pt.tag_id
        WHERE pt.product_id = ANY($1)
        ORDER BY pt.product_id, t.id
        "#,
    )
    .bind(&product_ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut tags_by_product: HashMap<i32, Vec<Tag>> = HashMap::new();
    for row in tagged {
        tags_by_product.entry(row.product_id).or_default().push(Tag {
            id: TagId(row.id),
            tag_name: row.tag_name,
        });
    }

    let details = products
        .into_iter()
        .map(|row| {
            let category = row.category_id.and_then(|id| categories.get(&id).cloned());
            let tags = tags_by_product.remove(&row.id).unwrap_or_default();
            ProductDetail {
                product: row.into(),
                category,
                tags,
            }
        })
        .collect();

    Ok(details)
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn list_products(&self) -> StoreResult<Vec<ProductDetail>> {
        let mut conn = self.pool.acquire().await.map_err(db_error)?;
        load_details(&mut conn, None).await.map_err(db_error)
    }

    async fn get_product(&self, id: ProductId) -> StoreResult<Option<ProductDetail>> {
        let mut conn = self.pool.acquire().await.map_err(db_error)?;
        let details = load_details(&mut conn, Some(id)).await.map_err(db_error)?;
        Ok(details.into_iter().next())
    }

    async fn delete_product(&self, id: ProductId) -> StoreResult<u64> {
        // product_tag rows go with it via ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM product WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected())
    }

    async fn begin(&self) -> StoreResult<Box<dyn CatalogTransaction>> {
        let tx = self.pool.begin().await.map_err(db_error)?;
        Ok(Box::new(PgCatalogTransaction { tx }))
    }
}

#[async_trait]
impl CatalogTransaction for PgCatalogTransaction {
    async fn category_exists(&mut self, id: CategoryId) -> StoreResult<bool> {
        let found: Option<i32> = sqlx::query_scalar("SELECT id FROM category WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error)?;

        Ok(found.is_some())
    }

    async fn missing_tags(&mut self, ids: &[TagId]) -> StoreResult<Vec<TagId>> {
        let found: HashSet<i32> = sqlx::query_scalar::<_, i32>("SELECT id FROM tag WHERE id = ANY($1)")
            .bind(raw_ids(ids, |id| id.0))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_error)?
            .into_iter()
            .collect();

        Ok(ids.iter().copied().filter(|id| !found.contains(&id.0)).collect())
    }

    async fn insert_product(&mut self, product: &NewProduct) -> StoreResult<Product> {
        let row: ProductRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO product (product_name, price, stock, category_id)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            PRODUCT_COLUMNS
        ))
        .bind(&product.product_name)
        .bind(product.price)
        .bind(product.stock)
        .bind(product.category_id.map(|id| id.0))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error)?;

        Ok(row.into())
    }

    async fn update_product(
        &mut self,
        id: ProductId,
        changes: &ProductChanges,
    ) -> StoreResult<Option<Product>> {
        let row: Option<ProductRow> = if changes.is_empty() {
            sqlx::query_as(&format!(
                "SELECT {} FROM product WHERE id = $1 FOR UPDATE",
                PRODUCT_COLUMNS
            ))
            .bind(id.0)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error)?
        } else {
            sqlx::query_as(&format!(
                r#"
                UPDATE product
                SET product_name = COALESCE($2, product_name),
                    price = COALESCE($3, price),
                    stock = COALESCE($4, stock),
                    category_id = CASE WHEN $5 THEN $6 ELSE category_id END,
                    updated_at = NOW()
                WHERE id = $1
                RETURNING {}
                "#,
                PRODUCT_COLUMNS
            ))
            .bind(id.0)
            .bind(changes.product_name.as_deref())
            .bind(changes.price)
            .bind(changes.stock)
            .bind(changes.category_id.is_some())
            .bind(changes.category_id.flatten().map(|c| c.0))
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error)?
        };

        Ok(row.map(Product::from))
    }

    async fn product_tag_ids(&mut self, product_id: ProductId) -> StoreResult<Vec<TagId>> {
        let ids: Vec<i32> =
            sqlx::query_scalar("SELECT tag_id FROM product_tag WHERE product_id = $1 ORDER BY id")
                .bind(product_id.0)
                .fetch_all(&mut *self.tx)
                .await
                .map_err(db_error)?;

        Ok(ids.into_iter().map(TagId).collect())
    }

    async fn insert_product_tags(&mut self, links: &[TagLink]) -> StoreResult<Vec<ProductTag>> {
        if links.is_empty() {
            return Ok(Vec::new());
        }

        let product_ids = raw_ids(links, |link| link.product_id.0);
        let tag_ids = raw_ids(links, |link| link.tag_id.0);

        let rows: Vec<ProductTagRow> = sqlx::query_as(
            r#"
            INSERT INTO product_tag (product_id, tag_id)
            SELECT * FROM UNNEST($1::int4[], $2::int4[])
            ON CONFLICT (product_id, tag_id) DO NOTHING
            RETURNING id, product_id, tag_id
            "#,
        )
        .bind(&product_ids)
        .bind(&tag_ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(ProductTag::from).collect())
    }

    async fn delete_product_tags(
        &mut self,
        product_id: ProductId,
        tag_ids: &[TagId],
    ) -> StoreResult<u64> {
        if tag_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query("DELETE FROM product_tag WHERE product_id = $1 AND tag_id = ANY($2)")
            .bind(product_id.0)
            .bind(raw_ids(tag_ids, |id| id.0))
            .execute(&mut *self.tx)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected())
    }

    async fn product_detail(&mut self, id: ProductId) -> StoreResult<Option<ProductDetail>> {
        let details = load_details(&mut self.tx, Some(id)).await.map_err(db_error)?;
        Ok(details.into_iter().next())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(db_error)
    }
}
