// AI Sales Page Builder - API Core
//
// Backend service that dispatches product info to an external AI workflow
// engine, receives generated sales-page content over a webhook, and publishes
// it into the shop's catalog as linked metaobjects.
//
// Architecture follows domain-driven design: business logic lives in
// domains/*, infrastructure (HTTP clients, retry, scheduler) in kernel/.

pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
