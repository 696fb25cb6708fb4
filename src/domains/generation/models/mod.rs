pub mod job;

pub use job::{GenerationJob, JobStatus, STALE_JOB_TIMEOUT};
