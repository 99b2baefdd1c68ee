pub mod product;
pub mod tags;

pub use product::{
    CatalogError, Category, CategoryId, NewProduct, Product, ProductChanges, ProductDetail,
    ProductId, ProductInput, ProductPatch, ProductTag, ProductTagId, ProductUpdate, Tag, TagId,
};
pub use tags::{reconcile, TagLink, TagPlan};
