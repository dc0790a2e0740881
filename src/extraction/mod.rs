//! Whole-screenshot extraction: classification, name reading and record assembly.

pub mod orchestrator;
pub mod record;

pub use orchestrator::Extractor;
pub use record::ExtractedRecord;
