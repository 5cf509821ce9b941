use serde_json::Value;

/// Returns the first non-null value among the candidate field names.
/// Raw records spell the same logical field differently across sources, so
/// callers pass the accepted spellings in priority order.
pub fn first_value<'a>(record: &'a Value, candidates: &[&str]) -> Option<&'a Value> {
    candidates.iter().find_map(|key| match record.get(*key) {
        None | Some(Value::Null) => None,
        Some(value) => Some(value),
    })
}

pub fn to_str(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string(),
    }
}

pub fn first_str(record: &Value, candidates: &[&str]) -> String {
    to_str(first_value(record, candidates))
}

/// Numeric coercion for counters: numbers and numeric strings pass through,
/// everything else (missing, non-finite, negative) counts as zero.
pub fn to_count(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => {
            if let Some(u) = n.as_u64() {
                u
            } else {
                n.as_f64()
                    .filter(|f| f.is_finite() && *f > 0.0)
                    .map(|f| f as u64)
                    .unwrap_or(0)
            }
        }
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite() && *f > 0.0)
            .map(|f| f as u64)
            .unwrap_or(0),
        _ => 0,
    }
}

pub fn first_count(record: &Value, candidates: &[&str]) -> u64 {
    to_count(first_value(record, candidates))
}

pub fn to_bool(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(v)) => *v,
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        Some(Value::String(s)) => {
            let lower = s.to_ascii_lowercase();
            lower == "true" || lower == "1"
        }
        _ => false,
    }
}
