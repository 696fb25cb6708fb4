// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Business logic (schema sync, publishing) lives in domain functions that
// consume these traits.

use anyhow::Result;
use async_trait::async_trait;

/// Access to the catalog's Admin GraphQL API.
///
/// Everything the schema synchronizer, image materializer and publish
/// pipeline do goes through this single seam, which keeps those components
/// testable against canned responses.
#[async_trait]
pub trait BaseAdminApi: Send + Sync {
    /// Execute a GraphQL document and return the response `data` value.
    async fn graphql(&self, query: &str, variables: serde_json::Value)
        -> Result<serde_json::Value>;
}
