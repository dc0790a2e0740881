//! Reference database lookup for recognised item names.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Canonical metadata for a known item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub id: String,
    pub name: String,
    /// Free-form attributes from the database (rarity, set, ...).
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Finds the canonical entry for a candidate name.
pub trait ReferenceLookup {
    /// `Ok(None)` means the name is not in the database.
    fn find(&self, name: &str) -> Result<Option<ReferenceEntry>>;
}

/// Case-, whitespace- and punctuation-insensitive key.
pub fn lookup_key(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// In-memory catalogue, typically loaded from a JSON array of entries.
#[derive(Debug, Default, Clone)]
pub struct CatalogLookup {
    entries: HashMap<String, ReferenceEntry>,
}

impl CatalogLookup {
    pub fn new(entries: impl IntoIterator<Item = ReferenceEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|e| (lookup_key(&e.name), e))
            .collect();
        Self { entries }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog {}", path.display()))?;
        let entries: Vec<ReferenceEntry> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse catalog {}", path.display()))?;
        crate::log(&format!("Loaded {} catalog entries from {}", entries.len(), path.display()));
        Ok(Self::new(entries))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ReferenceLookup for CatalogLookup {
    fn find(&self, name: &str) -> Result<Option<ReferenceEntry>> {
        Ok(self.entries.get(&lookup_key(name)).cloned())
    }
}

/// Lookup service reached over HTTP: `GET <endpoint>?name=<name>`, 404 = not found.
pub struct HttpReferenceLookup {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpReferenceLookup {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

impl ReferenceLookup for HttpReferenceLookup {
    fn find(&self, name: &str) -> Result<Option<ReferenceEntry>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("name", name)])
            .header("User-Agent", "collection-scanner")
            .send()
            .context("Lookup request failed")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(anyhow!("Lookup service returned HTTP {}", response.status()));
        }

        let entry = response.json().context("Invalid lookup response")?;
        Ok(Some(entry))
    }
}
