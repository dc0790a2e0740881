use serde::{Deserialize, Serialize};

use crate::grid::Quantity;
use crate::ocr::ReferenceEntry;

/// One non-empty cell read from a screenshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedRecord {
    /// 1-based
    pub column: u32,
    /// 1-based
    pub row: u32,
    /// Text exactly as recognised
    pub raw_text: String,
    /// Normalised and, if a correction service ran, corrected name
    pub name: String,
    pub quantity: Quantity,
    /// Recognition or correction confidence, whichever is more informative
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<ReferenceEntry>,
}

/// Outcome of one extraction run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionReport {
    pub records: Vec<ExtractedRecord>,
    /// Cells classified as empty and skipped
    pub empty_cells: usize,
    /// Cells whose text recognition failed; they still produce a record
    pub recognition_failures: usize,
    /// True when the run was interrupted before every cell was processed
    pub cancelled: bool,
}

impl ExtractionReport {
    pub fn unmatched(&self) -> impl Iterator<Item = &ExtractedRecord> {
        self.records.iter().filter(|r| r.reference.is_none())
    }
}
