use anyhow::{anyhow, Context, Result};
use image::{ImageBuffer, Luma, RgbaImage};
use std::path::PathBuf;
use std::process::Command;
use tempfile::NamedTempFile;

use super::preprocess::{crop_box, threshold_bright_pixels, upscale_for_ocr};
use super::setup::TesseractPaths;
use crate::grid::BoundingBox;

/// Text read from one region.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub text: String,
    /// 0.0 to 1.0
    pub confidence: f32,
}

/// Reads the text inside a region of a screenshot.
pub trait TextRecognizer {
    fn recognize(&self, img: &RgbaImage, region: &BoundingBox) -> Result<Recognition>;
}

/// Represents a line of OCR text with confidence score
#[derive(Debug, Clone)]
pub struct OcrLine {
    pub text: String,
    pub words: Vec<OcrWord>,
    pub confidence: f32,
}

/// Represents a single word from OCR with confidence score
#[derive(Debug, Clone)]
pub struct OcrWord {
    pub text: String,
    pub confidence: f32,
}

/// Tesseract command-line recognizer.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    executable: PathBuf,
    tessdata: Option<PathBuf>,
    lang: String,
    /// Brightness cut for binarisation before OCR
    threshold: u8,
    upscale: u32,
}

impl TesseractRecognizer {
    pub fn new(paths: TesseractPaths, lang: impl Into<String>, threshold: u8) -> Self {
        Self {
            executable: paths.executable,
            tessdata: paths.tessdata,
            lang: lang.into(),
            threshold,
            upscale: 2,
        }
    }

    /// Runs Tesseract in single-line mode on a preprocessed grayscale image.
    fn run(&self, img: &ImageBuffer<Luma<u8>, Vec<u8>>) -> Result<Vec<OcrLine>> {
        let temp_input = NamedTempFile::with_suffix(".png")?;
        img.save(temp_input.path())?;

        // Tesseract appends .tsv to the output base
        let temp_output = NamedTempFile::new()?;
        let output_base = temp_output.path().to_string_lossy().to_string();

        let mut command = Command::new(&self.executable);
        command.arg(temp_input.path()).arg(&output_base);
        if let Some(dir) = &self.tessdata {
            command.arg("--tessdata-dir").arg(dir);
        }
        let output = command
            .arg("-l")
            .arg(&self.lang)
            .arg("--psm")
            .arg("7") // Single text line
            .arg("tsv")
            .output()
            .context("Failed to start Tesseract")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Tesseract failed: {}", stderr));
        }

        let tsv_path = format!("{}.tsv", output_base);
        let tsv_content = std::fs::read_to_string(&tsv_path)
            .map_err(|e| anyhow!("Failed to read Tesseract output: {}", e))?;
        let _ = std::fs::remove_file(&tsv_path);

        parse_tsv_output(&tsv_content)
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize(&self, img: &RgbaImage, region: &BoundingBox) -> Result<Recognition> {
        let cropped = crop_box(img, region)
            .ok_or_else(|| anyhow!("Text region {:?} lies outside the screenshot", region))?;
        let binary = threshold_bright_pixels(&cropped, self.threshold);
        let lines = self.run(&upscale_for_ocr(&binary, self.upscale))?;
        Ok(summarize_lines(&lines))
    }
}

/// Joins recognised lines into one string with a word-averaged confidence in 0..1.
pub fn summarize_lines(lines: &[OcrLine]) -> Recognition {
    let text = lines
        .iter()
        .map(|l| l.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    let confidences: Vec<f32> = lines
        .iter()
        .flat_map(|l| l.words.iter().map(|w| w.confidence))
        .collect();
    let confidence = if confidences.is_empty() {
        0.0
    } else {
        (confidences.iter().sum::<f32>() / confidences.len() as f32 / 100.0).clamp(0.0, 1.0)
    };

    Recognition { text, confidence }
}

/// Parses Tesseract TSV output into structured OcrLine data
pub fn parse_tsv_output(tsv: &str) -> Result<Vec<OcrLine>> {
    let mut lines: Vec<OcrLine> = Vec::new();
    let mut current_key: Option<(i32, i32, i32)> = None;
    let mut current_words: Vec<OcrWord> = Vec::new();

    // Skip header
    for line in tsv.lines().skip(1) {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }

        // TSV fields: level, page_num, block_num, par_num, line_num, word_num,
        //             left, top, width, height, conf, text
        let level: i32 = fields[0].parse().unwrap_or(-1);
        let block: i32 = fields[2].parse().unwrap_or(-1);
        let par: i32 = fields[3].parse().unwrap_or(-1);
        let line_num: i32 = fields[4].parse().unwrap_or(-1);
        let conf: f32 = fields[10].parse().unwrap_or(-1.0);
        let text = fields[11].trim();

        // Level 5 = word
        if level != 5 || text.is_empty() {
            continue;
        }

        let key = (block, par, line_num);
        if current_key.is_some() && current_key != Some(key) {
            flush_line(&mut lines, &mut current_words);
        }
        current_key = Some(key);

        if conf >= 0.0 {
            current_words.push(OcrWord {
                text: text.to_string(),
                confidence: conf,
            });
        }
    }

    flush_line(&mut lines, &mut current_words);
    Ok(lines)
}

fn flush_line(lines: &mut Vec<OcrLine>, words: &mut Vec<OcrWord>) {
    if words.is_empty() {
        return;
    }
    let words = std::mem::take(words);
    let confidence = words.iter().map(|w| w.confidence).sum::<f32>() / words.len() as f32;
    let text = words
        .iter()
        .map(|w| w.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    lines.push(OcrLine {
        text,
        words,
        confidence,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn word(block: i32, line: i32, conf: f32, text: &str) -> String {
        format!("5\t1\t{}\t1\t{}\t1\t0\t0\t10\t10\t{}\t{}", block, line, conf, text)
    }

    #[test]
    fn test_parse_tsv_groups_words_into_lines() {
        let tsv = [
            HEADER.to_string(),
            "1\t1\t0\t0\t0\t0\t0\t0\t100\t20\t-1\t".to_string(),
            word(1, 1, 90.0, "Fire"),
            word(1, 1, 80.0, "Drake"),
            word(1, 2, 70.0, "Lv3"),
        ]
        .join("\n");

        let lines = parse_tsv_output(&tsv).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "Fire Drake");
        assert!((lines[0].confidence - 85.0).abs() < 1e-4);
        assert_eq!(lines[1].text, "Lv3");
    }

    #[test]
    fn test_parse_tsv_skips_negative_confidence_and_blank_words() {
        let tsv = [
            HEADER.to_string(),
            word(1, 1, -1.0, "ghost"),
            word(1, 1, 95.0, "Knight"),
            word(1, 1, 50.0, " "),
        ]
        .join("\n");

        let lines = parse_tsv_output(&tsv).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "Knight");
    }

    #[test]
    fn test_summarize_lines_scales_confidence() {
        let tsv = [HEADER.to_string(), word(1, 1, 90.0, "Frost"), word(1, 1, 70.0, "Giant")].join("\n");
        let summary = summarize_lines(&parse_tsv_output(&tsv).unwrap());
        assert_eq!(summary.text, "Frost Giant");
        assert!((summary.confidence - 0.8).abs() < 1e-6);

        let empty = summarize_lines(&[]);
        assert_eq!(empty, Recognition { text: String::new(), confidence: 0.0 });
    }
}
