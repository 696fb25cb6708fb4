pub mod dispatcher;
pub mod models;
pub mod webhook;

pub use models::{GenerationJob, JobStatus};
