pub mod models;
pub mod resolver;

pub use models::{SchemaRegistry, Shop};
pub use resolver::{resolve_shop, ShopHint};
