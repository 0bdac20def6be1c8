pub mod catalog;
pub mod datasource;
pub mod error;
pub mod generate;
pub mod model;
pub mod news;
pub mod render;
pub mod sitemap;
pub mod storage;
pub mod store;

pub use catalog::Catalog;
pub use error::{Result, SitemapError};
pub use generate::{Generator, GeneratorConfig, IndexReport};
pub use store::SitemapStore;
