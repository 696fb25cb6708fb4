pub mod schema_registry;
pub mod shop;

pub use schema_registry::SchemaRegistry;
pub use shop::Shop;
