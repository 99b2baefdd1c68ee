pub mod app_config;
pub mod database;
pub mod catalog_repo;
pub mod memory;

pub use database::DbClient;
pub use catalog_repo::PgCatalogStore;
pub use memory::InMemoryCatalog;
