// Business domains
pub mod content;
pub mod generation;
pub mod publish;
pub mod shops;
