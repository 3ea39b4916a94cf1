//! Site name resolution
//!
//! Assessments carry only a site id. Names are joined in explicitly through a
//! resolver passed to each analysis, never looked up from ambient state.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Resolve a display name for a site id
pub trait SiteNameResolver {
    fn site_name(&self, site_id: &str) -> Option<String>;

    /// Name for display, falling back to the id itself
    fn display_name(&self, site_id: &str) -> String {
        self.site_name(site_id)
            .unwrap_or_else(|| site_id.to_string())
    }
}

impl<F> SiteNameResolver for F
where
    F: Fn(&str) -> Option<String>,
{
    fn site_name(&self, site_id: &str) -> Option<String> {
        self(site_id)
    }
}

/// Static `{site_id -> site_name}` mapping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteDirectory {
    names: BTreeMap<String, String>,
}

impl SiteDirectory {
    pub fn new() -> Self {
        SiteDirectory::default()
    }

    pub fn insert(&mut self, site_id: impl Into<String>, name: impl Into<String>) {
        self.names.insert(site_id.into(), name.into());
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Load a JSON object of `{"site_id": "Site Name"}` pairs
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read sites file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse sites file: {}", path.display()))
    }
}

impl SiteNameResolver for SiteDirectory {
    fn site_name(&self, site_id: &str) -> Option<String> {
        self.names.get(site_id).cloned()
    }
}

impl<K, V> FromIterator<(K, V)> for SiteDirectory
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        SiteDirectory {
            names: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
