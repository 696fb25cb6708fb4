pub mod images;
pub mod pipeline;
pub mod schema_sync;
