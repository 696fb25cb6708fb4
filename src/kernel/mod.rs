// Infrastructure layer: retry discipline, remote API clients, scheduler.

pub mod retry;
pub mod scheduled_tasks;
pub mod shopify_client;
pub mod traits;
pub mod workflow_client;

#[cfg(test)]
pub mod test_support;

pub use retry::{retry_with_backoff, ErrorClass, RetryPolicy};
pub use shopify_client::ShopifyClient;
pub use traits::BaseAdminApi;
pub use workflow_client::WorkflowClient;
