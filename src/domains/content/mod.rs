// Sales-page content: the section registry, payload transformation, and
// the draft model.
pub mod models;
pub mod sections;
pub mod transform;

pub use sections::*;
pub use transform::*;
