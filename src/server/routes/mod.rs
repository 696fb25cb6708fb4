// HTTP routes
pub mod generate;
pub mod health;
pub mod images;
pub mod webhook;

pub use generate::*;
pub use health::*;
pub use images::*;
pub use webhook::*;
