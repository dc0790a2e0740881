//! Collaborators for reading item names.
//!
//! - Tesseract-backed text recognition of a cell's name label
//! - Local normalisation plus an optional remote correction service
//! - Reference database lookup (local catalogue or remote service)

pub mod correction;
pub mod engine;
pub mod lookup;
pub mod preprocess;
pub mod setup;

pub use correction::{correct_or_passthrough, HttpNameCorrector, NameCorrector};
pub use engine::{TesseractRecognizer, TextRecognizer};
pub use lookup::{CatalogLookup, HttpReferenceLookup, ReferenceEntry, ReferenceLookup};
pub use setup::ensure_tesseract;
