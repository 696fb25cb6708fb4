pub mod draft;

pub use draft::{ContentDraft, DraftStatus};
