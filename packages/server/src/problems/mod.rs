pub mod archive;
pub mod repository;
pub mod service;
pub mod statement;
pub mod tests_archive;

pub use service::{IngestSettings, ProblemService};
