//! Item name cleanup and correction.
//!
//! Raw OCR output is first normalised locally (stray punctuation, doubled
//! whitespace, common glyph confusions), then optionally sent as one batch to a
//! correction service that maps it onto real item names.

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;

/// A corrected name with the service's confidence (0.0 to 1.0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub text: String,
    pub confidence: f32,
}

/// Corrects a batch of raw names. Output order matches input order.
pub trait NameCorrector {
    fn correct(&self, raw: &[String]) -> Result<Vec<Correction>>;
}

/// Characters OCR commonly leaves at label edges: bars, quotes, bullets.
const EDGE_NOISE_PATTERN: &str = r#"^[\s|\\/_~`'".,:;*•·\-]+|[\s|\\/_~`'".,:;*•·\-]+$"#;

fn edge_noise_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(EDGE_NOISE_PATTERN).expect("edge noise pattern is valid"))
}

fn whitespace_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("whitespace pattern is valid"))
}

/// Local cleanup applied before any correction service.
///
/// Trims edge noise, collapses whitespace and fixes digit/letter confusions
/// inside otherwise alphabetic words ("Dra9on" -> "Dragon").
pub fn normalize_name(raw: &str) -> String {
    let collapsed = whitespace_regex().replace_all(raw, " ");
    let trimmed = edge_noise_regex().replace_all(&collapsed, "");

    trimmed
        .split(' ')
        .map(fix_glyph_confusions)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Digits inside words that are otherwise letters are almost always misreads.
fn fix_glyph_confusions(word: &str) -> String {
    let letters = word.chars().filter(|c| c.is_alphabetic()).count();
    let digits = word.chars().filter(|c| c.is_ascii_digit()).count();
    if letters < 2 || digits == 0 || digits * 2 >= letters {
        return word.to_string();
    }
    word.chars()
        .map(|c| match c {
            '0' => 'o',
            '1' => 'l',
            '5' => 's',
            '8' => 'B',
            '9' => 'g',
            other => other,
        })
        .collect()
}

/// Returns corrections from `corrector`, or the normalised input at zero
/// confidence when the service fails or answers with the wrong batch size.
pub fn correct_or_passthrough(corrector: Option<&dyn NameCorrector>, raw: &[String]) -> Vec<Correction> {
    let normalized: Vec<String> = raw.iter().map(|r| normalize_name(r)).collect();
    let passthrough = || {
        normalized
            .iter()
            .map(|text| Correction {
                text: text.clone(),
                confidence: 0.0,
            })
            .collect::<Vec<_>>()
    };

    let Some(corrector) = corrector else {
        return passthrough();
    };
    if normalized.is_empty() {
        return Vec::new();
    }

    match corrector.correct(&normalized) {
        Ok(corrections) if corrections.len() == normalized.len() => corrections,
        Ok(corrections) => {
            crate::log(&format!(
                "Name correction returned {} results for {} names, keeping raw text",
                corrections.len(),
                normalized.len()
            ));
            passthrough()
        }
        Err(e) => {
            crate::log(&format!("Name correction failed: {:#}. Keeping raw text.", e));
            passthrough()
        }
    }
}

#[derive(Serialize)]
struct CorrectionRequest<'a> {
    texts: &'a [String],
}

#[derive(Deserialize)]
struct CorrectionResponse {
    results: Vec<Correction>,
}

/// Correction service reached over HTTP.
///
/// POSTs `{"texts": [...]}` and expects `{"results": [{"text", "confidence"}]}`.
pub struct HttpNameCorrector {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpNameCorrector {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }
}

impl NameCorrector for HttpNameCorrector {
    fn correct(&self, raw: &[String]) -> Result<Vec<Correction>> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header("User-Agent", "collection-scanner")
            .json(&CorrectionRequest { texts: raw });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().context("Correction request failed")?;
        if !response.status().is_success() {
            return Err(anyhow!("Correction service returned HTTP {}", response.status()));
        }

        let body: CorrectionResponse = response.json().context("Invalid correction response")?;
        Ok(body
            .results
            .into_iter()
            .map(|c| Correction {
                confidence: c.confidence.clamp(0.0, 1.0),
                ..c
            })
            .collect())
    }
}
