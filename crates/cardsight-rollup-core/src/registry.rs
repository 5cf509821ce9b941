use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::warn;

use crate::keys::normalize_fi_key;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FiRegistryEntry {
    pub fi_name: String,
    pub fi_lookup_key: String,
    pub instance: String,
    pub integration_type: String,
    pub partner: String,
}

pub type FiRegistry = BTreeMap<String, FiRegistryEntry>;

/// Loads the FI registry. The registry is advisory: a missing or corrupt
/// file degrades to an empty registry (keys pass through raw-derived), never
/// an error.
pub fn load_registry(path: &Path) -> FiRegistry {
    match read_registry(path) {
        Ok(registry) => registry,
        Err(exc) => {
            if path.exists() {
                warn!(
                    "fi registry {} unreadable; resolving keys without it: {exc:#}",
                    path.display()
                );
            } else {
                warn!(
                    "fi registry {} missing; resolving keys without it",
                    path.display()
                );
            }
            FiRegistry::new()
        }
    }
}

fn read_registry(path: &Path) -> Result<FiRegistry> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read fi registry {}", path.display()))?;
    serde_json::from_str(&content).context("failed to parse fi registry JSON")
}

/// Case-insensitive indexes over the registry, precomputed once per range
/// invocation so record-level resolution stays O(1).
#[derive(Debug, Default)]
pub struct RegistryIndex {
    by_lookup: HashMap<String, String>,
    by_name: HashMap<String, String>,
    name_by_lookup: HashMap<String, String>,
}

pub fn build_registry_index(registry: &FiRegistry) -> RegistryIndex {
    let mut index = RegistryIndex::default();
    for entry in registry.values() {
        let lookup = normalize_fi_key(&entry.fi_lookup_key);
        if lookup.is_empty() {
            continue;
        }

        index
            .by_lookup
            .entry(lookup.clone())
            .or_insert_with(|| lookup.clone());

        let name = normalize_fi_key(&entry.fi_name);
        if !name.is_empty() {
            index.by_name.entry(name).or_insert_with(|| lookup.clone());
        }

        let display_name = entry.fi_name.trim();
        if !display_name.is_empty() {
            index
                .name_by_lookup
                .entry(lookup)
                .or_insert_with(|| display_name.to_string());
        }
    }
    index
}

impl RegistryIndex {
    /// Resolution order is a hard invariant: an explicit key wins even when
    /// the registry has never heard of it; name lookup only runs when no key
    /// was given; a total miss is the caller's problem (`unknown_fi`).
    pub fn resolve_fi_key(&self, preferred_key: &str, fallback_name: &str) -> Option<String> {
        let preferred = normalize_fi_key(preferred_key);
        if !preferred.is_empty() {
            return Some(self.by_lookup.get(&preferred).cloned().unwrap_or(preferred));
        }

        let name = normalize_fi_key(fallback_name);
        if name.is_empty() {
            return None;
        }
        self.by_name.get(&name).cloned()
    }

    pub fn fi_name(&self, fi_key: &str) -> Option<&str> {
        self.name_by_lookup
            .get(&normalize_fi_key(fi_key))
            .map(String::as_str)
    }
}
