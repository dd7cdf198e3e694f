pub mod evaluation;
pub mod levels;
pub mod models;
pub mod scoring;
