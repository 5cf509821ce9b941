use std::collections::{HashMap, HashSet};

pub const UNKNOWN_FI: &str = "unknown_fi";
pub const UNKNOWN_INSTANCE: &str = "unknown";

const HOST_SUFFIX: &str = ".cardupdatr.app";
const LEGACY_PROD_ALIAS: &str = "advancial-prod";

/// Static lookup tables built once at startup and passed into the
/// aggregators: display aliasing for known instance-name collisions, and the
/// allowlist of test instances (matched on canonical form).
#[derive(Debug, Clone)]
pub struct KeyTables {
    display_overrides: HashMap<String, String>,
    test_instances: HashSet<String>,
}

impl Default for KeyTables {
    fn default() -> Self {
        let display_overrides = [
            ("prod-cluster-1", "production"),
            ("preprod-cluster-1", "preprod"),
        ]
        .into_iter()
        .map(|(raw, display)| (raw.to_string(), display.to_string()))
        .collect();

        let test_instances = ["test", "qa", "staging", "demo", "smoketest"]
            .into_iter()
            .map(str::to_string)
            .collect();

        Self {
            display_overrides,
            test_instances,
        }
    }
}

impl KeyTables {
    pub fn display_override(&self, formatted: &str) -> Option<&str> {
        self.display_overrides.get(formatted).map(String::as_str)
    }

    pub fn is_test_instance(&self, canonical: &str) -> bool {
        self.test_instances.contains(canonical)
    }
}

pub fn normalize_fi_key(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

/// Comparison form of an instance name: lowercase alphanumerics only.
/// Pure and total; anything that canonicalizes to nothing is "unknown".
pub fn canonical_instance(value: &str) -> String {
    let out: String = value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if out.is_empty() {
        UNKNOWN_INSTANCE.to_string()
    } else {
        out
    }
}

/// Display form of an instance name: lowercase with whitespace/underscore
/// runs collapsed to a single hyphen, then the override table applied.
pub fn format_instance_display(value: &str, tables: &KeyTables) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return UNKNOWN_INSTANCE.to_string();
    }

    let mut out = String::with_capacity(trimmed.len());
    let mut in_separator_run = false;
    for c in trimmed.chars() {
        if c.is_whitespace() || c == '_' {
            if !in_separator_run {
                out.push('-');
                in_separator_run = true;
            }
        } else {
            out.push(c.to_ascii_lowercase());
            in_separator_run = false;
        }
    }

    match tables.display_override(&out) {
        Some(display) => display.to_string(),
        None => out,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFi {
    pub fi_key: String,
    pub instance: String,
}

/// Infers (fi, instance) from a dashboard hostname. Single label maps to
/// itself for both; two or more labels map to (first, second). Hosts outside
/// the product domain resolve to nothing.
pub fn resolve_fi_from_host(host: &str) -> Option<HostFi> {
    let host = host.trim().to_ascii_lowercase();
    let label = host.strip_suffix(HOST_SUFFIX)?;
    if label.is_empty() {
        return None;
    }

    let mut parts = label.split('.');
    let first = parts.next()?.to_string();
    if first.is_empty() {
        return None;
    }

    match parts.next() {
        None => Some(HostFi {
            fi_key: first.clone(),
            instance: first,
        }),
        Some(second) => {
            // Legacy onboarding quirk: the shared "default" FI fronting the
            // advancial production instance is really the advancial FI.
            let fi_key = if first == "default" && second == LEGACY_PROD_ALIAS {
                "advancial".to_string()
            } else {
                first
            };
            Some(HostFi {
                fi_key,
                instance: second.to_string(),
            })
        }
    }
}

/// One direction of the default/advancial-prod collapse: records keyed to the
/// "default" FI but carrying the advancial production instance belong to
/// advancial.
pub fn adjust_fi_for_instance(fi_key: &str, instance: &str) -> String {
    let fi_key = normalize_fi_key(fi_key);
    if fi_key == "default" && canonical_instance(instance) == "advancialprod" {
        return "advancial".to_string();
    }
    fi_key
}

/// The other direction: advancial records with a missing or "default"
/// instance ran on the advancial production instance. Trigger conditions
/// intentionally differ from `adjust_fi_for_instance`.
pub fn adjust_instance_for_fi(fi_key: &str, instance: &str) -> String {
    if normalize_fi_key(fi_key) == "advancial"
        && (instance.trim().is_empty() || canonical_instance(instance) == "default")
    {
        return LEGACY_PROD_ALIAS.to_string();
    }
    instance.to_string()
}

/// The only sanctioned way to build a per-instance key. Equivalent but
/// differently-cased/spelled inputs always land on the same key.
pub fn fi_instance_key(fi_key: &str, instance: &str) -> String {
    format!(
        "{}__{}",
        normalize_fi_key(fi_key),
        canonical_instance(instance)
    )
}

/// Splits a composite key back into (fi, instance-canonical). The instance
/// half never contains underscores, so the rightmost "__" is unambiguous.
pub fn split_fi_instance_key(key: &str) -> (&str, &str) {
    key.rsplit_once("__").unwrap_or((key, UNKNOWN_INSTANCE))
}
