use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    routing::get,
    Json, Router,
};
use serde::Serialize;
use storefront_catalog::{Product, ProductDetail, ProductId, ProductInput, ProductPatch, ProductTag};

use crate::{error::AppError, state::AppState};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct CreateProductResponse {
    pub product: Product,
    #[serde(rename = "productTags")]
    pub product_tags: Vec<ProductTag>,
}

#[derive(Debug, Serialize)]
pub struct UpdateProductResponse {
    #[serde(rename = "productData")]
    pub product_data: ProductDetail,
    #[serde(rename = "destroyedProductTags")]
    pub destroyed_product_tags: u64,
    #[serde(rename = "updatedProductTags")]
    pub updated_product_tags: Vec<ProductTag>,
}

#[derive(Debug, Serialize)]
pub struct DeleteProductResponse {
    pub response: u16,
    #[serde(rename = "deletedProduct")]
    pub deleted_product: u64,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route(
            "/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/products
async fn list_products(State(state): State<AppState>) -> Result<Json<Vec<ProductDetail>>, AppError> {
    Ok(Json(state.products.list_products().await?))
}

/// GET /api/products/{id}
async fn get_product(
    State(state): State<AppState>,
    id: Result<Path<i32>, PathRejection>,
) -> Result<Json<ProductDetail>, AppError> {
    let Path(id) = id?;
    Ok(Json(state.products.get_product(ProductId(id)).await?))
}

/// POST /api/products
async fn create_product(
    State(state): State<AppState>,
    payload: Result<Json<ProductInput>, JsonRejection>,
) -> Result<Json<CreateProductResponse>, AppError> {
    let Json(input) = payload?;
    let created = state.products.create_product(input).await?;

    Ok(Json(CreateProductResponse {
        product: created.product,
        product_tags: created.product_tags,
    }))
}

/// PUT /api/products/{id}
///
/// Absent fields are left as they are. When `tagIds` is present the stored
/// associations are made to match it exactly.
async fn update_product(
    State(state): State<AppState>,
    id: Result<Path<i32>, PathRejection>,
    payload: Result<Json<ProductPatch>, JsonRejection>,
) -> Result<Json<UpdateProductResponse>, AppError> {
    let Path(id) = id?;
    let Json(patch) = payload?;
    let updated = state.products.update_product(ProductId(id), patch).await?;

    Ok(Json(UpdateProductResponse {
        product_data: updated.product,
        destroyed_product_tags: updated.destroyed_tags,
        updated_product_tags: updated.created_tags,
    }))
}

/// DELETE /api/products/{id}
async fn delete_product(
    State(state): State<AppState>,
    id: Result<Path<i32>, PathRejection>,
) -> Result<Json<DeleteProductResponse>, AppError> {
    let Path(id) = id?;
    let deleted = state.products.delete_product(ProductId(id)).await?;

    Ok(Json(DeleteProductResponse {
        response: 200,
        deleted_product: deleted,
    }))
}
