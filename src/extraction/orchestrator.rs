//! Extraction orchestrator.
//!
//! Drives the grid classifiers across all 36 cells of one screenshot and hands
//! only the occupied cells to the text recognition, correction and lookup
//! collaborators. Classification is pure, so it can optionally fan out across
//! threads; collaborator calls stay sequential.

use anyhow::{Context, Result};
use image::RgbaImage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use super::record::{ExtractedRecord, ExtractionReport};
use crate::calibration::preview::text_region;
use crate::calibration::CalibrationSettings;
use crate::grid::{
    analyze_occupancy, analyze_quantity, compute_grid_cells, Diagnostics, GridCell,
    OccupancyAnalysis, Quantity,
};
use crate::ocr::{correct_or_passthrough, NameCorrector, ReferenceLookup, TextRecognizer};

/// Pure classification result for one cell.
#[derive(Clone, Copy, Debug)]
pub struct CellReading {
    pub cell: GridCell,
    pub occupancy: OccupancyAnalysis,
    /// Only read for filled cells
    pub quantity: Option<Quantity>,
}

/// Cell that survived the empty filter, waiting for name correction.
struct PendingCell {
    cell: GridCell,
    quantity: Quantity,
    raw_text: String,
    ocr_confidence: Option<f32>,
}

/// Runs one screenshot through the whole pipeline.
pub struct Extractor<'a> {
    recognizer: &'a dyn TextRecognizer,
    corrector: Option<&'a dyn NameCorrector>,
    lookup: Option<&'a dyn ReferenceLookup>,
    cancel: Option<&'a AtomicBool>,
    diagnostics: Option<&'a dyn Diagnostics>,
    parallel: bool,
}

impl<'a> Extractor<'a> {
    pub fn new(recognizer: &'a dyn TextRecognizer) -> Self {
        Self {
            recognizer,
            corrector: None,
            lookup: None,
            cancel: None,
            diagnostics: None,
            parallel: false,
        }
    }

    pub fn with_corrector(mut self, corrector: &'a dyn NameCorrector) -> Self {
        self.corrector = Some(corrector);
        self
    }

    pub fn with_lookup(mut self, lookup: &'a dyn ReferenceLookup) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Flag checked between cells; setting it stops the run early.
    /// The CLI has no interrupt source, so only tests set it today.
    #[allow(dead_code)]
    pub fn with_cancel_flag(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Diagnostics are only forwarded for serial classification.
    pub fn with_diagnostics(mut self, sink: &'a dyn Diagnostics) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    pub fn parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Extracts every occupied cell.
    ///
    /// Fails only when the calibration itself is invalid. Collaborator failures
    /// for a single cell are logged and degrade that cell's record.
    pub fn extract(&self, img: &RgbaImage, settings: &CalibrationSettings) -> Result<ExtractionReport> {
        settings.validate().context("Invalid calibration settings")?;

        let cells = compute_grid_cells(img.width(), img.height(), &settings.layout);
        let precomputed = if self.parallel {
            Some(classify_parallel(img, &cells, settings))
        } else {
            None
        };

        let mut report = ExtractionReport::default();
        let mut pending: Vec<PendingCell> = Vec::new();

        for (i, cell) in cells.iter().enumerate() {
            if self.is_cancelled() {
                crate::log(&format!("Extraction cancelled before cell {}", cell.label()));
                report.cancelled = true;
                break;
            }

            let reading = match &precomputed {
                Some(readings) => readings[i],
                None => classify_cell(img, cell, settings, self.diagnostics),
            };

            let quantity = match reading.quantity {
                Some(quantity) if !reading.occupancy.is_empty => quantity,
                _ => {
                    report.empty_cells += 1;
                    continue;
                }
            };

            let label_box = text_region(&cell.bounds, &settings.text_region);
            let (raw_text, ocr_confidence) = match self.recognizer.recognize(img, &label_box) {
                Ok(recognition) => (recognition.text, Some(recognition.confidence)),
                Err(e) => {
                    crate::log(&format!("Text recognition failed for {}: {:#}", cell.label(), e));
                    report.recognition_failures += 1;
                    (String::new(), None)
                }
            };

            pending.push(PendingCell {
                cell: *cell,
                quantity,
                raw_text,
                ocr_confidence,
            });
        }

        let raw: Vec<String> = pending.iter().map(|p| p.raw_text.clone()).collect();
        let corrections = correct_or_passthrough(self.corrector, &raw);

        for (cell, correction) in pending.into_iter().zip(corrections) {
            if self.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let reference = match self.lookup {
                Some(lookup) if !correction.text.is_empty() => match lookup.find(&correction.text) {
                    Ok(found) => found,
                    Err(e) => {
                        crate::log(&format!(
                            "Lookup failed for '{}' ({}): {:#}",
                            correction.text,
                            cell.cell.label(),
                            e
                        ));
                        None
                    }
                },
                _ => None,
            };

            // A correction confidence of 0 means no service answered
            let confidence = if correction.confidence > 0.0 {
                Some(correction.confidence)
            } else {
                cell.ocr_confidence
            };

            report.records.push(ExtractedRecord {
                column: cell.cell.column,
                row: cell.cell.row,
                raw_text: cell.raw_text,
                name: correction.text,
                quantity: cell.quantity,
                confidence,
                reference,
            });
        }

        crate::log(&format!(
            "Extraction finished: {} records, {} empty cells, {} recognition failures{}",
            report.records.len(),
            report.empty_cells,
            report.recognition_failures,
            if report.cancelled { " (cancelled)" } else { "" }
        ));

        Ok(report)
    }
}

/// Occupancy for one cell, plus its quantity when the cell is filled.
pub fn classify_cell(
    img: &RgbaImage,
    cell: &GridCell,
    settings: &CalibrationSettings,
    diagnostics: Option<&dyn Diagnostics>,
) -> CellReading {
    let occupancy = analyze_occupancy(img, &cell.bounds, &settings.occupancy, diagnostics);
    let quantity = (!occupancy.is_empty).then(|| {
        analyze_quantity(img, &cell.bounds, &settings.quantity_region, diagnostics).quantity
    });
    CellReading {
        cell: *cell,
        occupancy,
        quantity,
    }
}

/// Classifies all cells using scoped worker threads over the shared read-only buffer.
pub fn classify_parallel(
    img: &RgbaImage,
    cells: &[GridCell],
    settings: &CalibrationSettings,
) -> Vec<CellReading> {
    if cells.is_empty() {
        return Vec::new();
    }
    let workers = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .clamp(1, cells.len());
    let chunk_size = cells.len().div_ceil(workers);

    thread::scope(|scope| {
        let handles: Vec<_> = cells
            .chunks(chunk_size)
            .map(|chunk| {
                scope.spawn(move || {
                    chunk
                        .iter()
                        .map(|cell| classify_cell(img, cell, settings, None))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|handle| match handle.join() {
                Ok(readings) => readings,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{BoundingBox, CollectingDiagnostics, CELL_COUNT};
    use crate::ocr::correction::Correction;
    use crate::ocr::engine::Recognition;
    use crate::ocr::ReferenceEntry;
    use anyhow::anyhow;
    use image::{ImageBuffer, Rgba};
    use std::cell::RefCell;

    const BACKGROUND: Rgba<u8> = Rgba([90, 110, 130, 255]);

    /// 1920x1080 screenshot. Each `(index, pips)` cell is drawn as a checkerboard
    /// with `pips` dark zones filled in its indicator strip.
    fn screenshot(filled: &[(usize, usize)], settings: &CalibrationSettings) -> RgbaImage {
        let cells = compute_grid_cells(1920, 1080, &settings.layout);
        let mut img = ImageBuffer::from_pixel(1920, 1080, BACKGROUND);
        for &(index, pips) in filled {
            let b = cells[index].bounds;
            for y in b.y..b.bottom() {
                for x in b.x..b.right() {
                    let c = if (x + y) % 2 == 0 { 20 } else { 230 };
                    img.put_pixel(x as u32, y as u32, Rgba([c, c, c, 255]));
                }
            }
            let strip = crate::grid::quantity::indicator_region(&b, &settings.quantity_region);
            for (zone_idx, zone) in crate::grid::quantity::zone_bounds(&strip).iter().enumerate() {
                if zone_idx >= pips {
                    continue;
                }
                for y in zone.y..zone.bottom() {
                    for x in zone.x..zone.right() {
                        img.put_pixel(x as u32, y as u32, Rgba([25, 25, 25, 255]));
                    }
                }
            }
        }
        img
    }

    /// Returns "item <x>" so tests can tell which label was read.
    struct FakeRecognizer {
        calls: RefCell<usize>,
        fail_at: Option<usize>,
    }

    impl FakeRecognizer {
        fn new() -> Self {
            Self {
                calls: RefCell::new(0),
                fail_at: None,
            }
        }
    }

    impl TextRecognizer for FakeRecognizer {
        fn recognize(&self, _img: &RgbaImage, region: &BoundingBox) -> Result<Recognition> {
            let call = *self.calls.borrow();
            *self.calls.borrow_mut() += 1;
            if self.fail_at == Some(call) {
                return Err(anyhow!("tesseract crashed"));
            }
            Ok(Recognition {
                text: format!("item {}", region.x),
                confidence: 0.75,
            })
        }
    }

    struct TitleCase;

    impl NameCorrector for TitleCase {
        fn correct(&self, raw: &[String]) -> Result<Vec<Correction>> {
            Ok(raw
                .iter()
                .map(|r| Correction {
                    text: r.replace("item", "Item"),
                    confidence: 0.95,
                })
                .collect())
        }
    }

    struct KnowsFirst;

    impl ReferenceLookup for KnowsFirst {
        fn find(&self, name: &str) -> Result<Option<ReferenceEntry>> {
            if name.ends_with(" 59") {
                Ok(Some(ReferenceEntry {
                    id: "first".to_string(),
                    name: name.to_string(),
                    metadata: serde_json::Map::new(),
                }))
            } else {
                Ok(None)
            }
        }
    }

    #[test]
    fn test_only_filled_cells_reach_recognizer() {
        let settings = CalibrationSettings::default();
        let img = screenshot(&[(0, 3), (13, 0), (35, 4)], &settings);
        let recognizer = FakeRecognizer::new();

        let report = Extractor::new(&recognizer).extract(&img, &settings).unwrap();

        assert_eq!(*recognizer.calls.borrow(), 3);
        assert_eq!(report.empty_cells, CELL_COUNT - 3);
        assert_eq!(report.records.len(), 3);
        assert!(!report.cancelled);

        let first = &report.records[0];
        assert_eq!((first.column, first.row), (1, 1));
        assert_eq!(first.quantity, Quantity::Count(3));
        assert_eq!(first.confidence, Some(0.75));
        assert_eq!((report.records[1].column, report.records[1].row), (2, 2));
        assert_eq!(report.records[1].quantity, Quantity::Count(0));
        assert_eq!(report.records[2].quantity, Quantity::Count(4));
    }

    #[test]
    fn test_parallel_matches_serial() {
        let settings = CalibrationSettings::default();
        let img = screenshot(&[(2, 1), (14, 2), (30, 4)], &settings);
        let cells = compute_grid_cells(1920, 1080, &settings.layout);

        let parallel = classify_parallel(&img, &cells, &settings);
        assert_eq!(parallel.len(), CELL_COUNT);
        for (cell, reading) in cells.iter().zip(&parallel) {
            let serial = classify_cell(&img, cell, &settings, None);
            assert_eq!(reading.cell, serial.cell);
            assert_eq!(reading.occupancy, serial.occupancy);
            assert_eq!(reading.quantity, serial.quantity);
        }

        let recognizer = FakeRecognizer::new();
        let report = Extractor::new(&recognizer)
            .parallel(true)
            .extract(&img, &settings)
            .unwrap();
        assert_eq!(report.records.len(), 3);
        assert_eq!(report.records[1].quantity, Quantity::Count(2));
    }

    #[test]
    fn test_quantity_read_only_for_filled_cells() {
        let settings = CalibrationSettings::default();
        let img = screenshot(&[(4, 2), (20, 1)], &settings);
        let cells = compute_grid_cells(1920, 1080, &settings.layout);

        assert_eq!(classify_cell(&img, &cells[0], &settings, None).quantity, None);
        assert_eq!(
            classify_cell(&img, &cells[4], &settings, None).quantity,
            Some(Quantity::Count(2))
        );

        let notes = CollectingDiagnostics::new();
        let recognizer = FakeRecognizer::new();
        let report = Extractor::new(&recognizer)
            .with_diagnostics(&notes)
            .extract(&img, &settings)
            .unwrap();
        assert_eq!(report.records.len(), 2);
        let strip_notes = notes.lines().iter().filter(|l| l.starts_with("strip")).count();
        assert_eq!(strip_notes, 2);
    }

    #[test]
    fn test_correction_and_lookup_are_applied() {
        let settings = CalibrationSettings::default();
        let img = screenshot(&[(0, 1), (1, 1)], &settings);
        let recognizer = FakeRecognizer::new();

        let report = Extractor::new(&recognizer)
            .with_corrector(&TitleCase)
            .with_lookup(&KnowsFirst)
            .extract(&img, &settings)
            .unwrap();

        let first = &report.records[0];
        // Text region starts 7px into the 137px cell at x=52
        assert_eq!(first.raw_text, "item 59");
        assert_eq!(first.name, "Item 59");
        assert_eq!(first.confidence, Some(0.95));
        assert_eq!(first.reference.as_ref().map(|r| r.id.as_str()), Some("first"));
        assert_eq!(report.records[1].name, "Item 211");
        assert_eq!(report.unmatched().count(), 1);
    }

    #[test]
    fn test_recognition_failure_keeps_record() {
        let settings = CalibrationSettings::default();
        let img = screenshot(&[(0, 2), (5, 2)], &settings);
        let recognizer = FakeRecognizer {
            calls: RefCell::new(0),
            fail_at: Some(0),
        };

        let report = Extractor::new(&recognizer).extract(&img, &settings).unwrap();
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.recognition_failures, 1);
        assert_eq!(report.records[0].raw_text, "");
        assert_eq!(report.records[0].confidence, None);
        assert_eq!(report.records[0].quantity, Quantity::Count(2));
    }

    #[test]
    fn test_cancelled_before_start() {
        let settings = CalibrationSettings::default();
        let img = screenshot(&[(0, 1)], &settings);
        let recognizer = FakeRecognizer::new();
        let flag = AtomicBool::new(true);

        let report = Extractor::new(&recognizer)
            .with_cancel_flag(&flag)
            .extract(&img, &settings)
            .unwrap();
        assert!(report.cancelled);
        assert!(report.records.is_empty());
        assert_eq!(*recognizer.calls.borrow(), 0);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut settings = CalibrationSettings::default();
        settings.layout.start_x = 0.5;
        let img = ImageBuffer::from_pixel(100, 100, BACKGROUND);
        let recognizer = FakeRecognizer::new();
        assert!(Extractor::new(&recognizer).extract(&img, &settings).is_err());
    }
}
