use serde_json::Value;
use std::collections::BTreeMap;

use crate::fields::{first_count, first_str, to_bool};
use crate::keys::{
    adjust_fi_for_instance, adjust_instance_for_fi, canonical_instance, fi_instance_key,
    format_instance_display, normalize_fi_key, resolve_fi_from_host, KeyTables, UNKNOWN_FI,
};
use crate::model::{Absorb, GaTotals, PlacementTotals, SessionTotals, SourceAggregate};
use crate::registry::RegistryIndex;

const GA_PAGE_SELECT_MERCHANTS: &str = "/select-merchants";
const GA_PAGE_USER_DATA: &str = "/user-data-collection";
const GA_PAGE_CREDENTIAL_ENTRY: &str = "/credential-entry";

const SUCCESS_TERMINATIONS: [&str; 2] = ["BILLABLE", "SUCCESSFUL"];
const UNKNOWN_TERMINATION: &str = "UNKNOWN";

/// Extracts the day's record array, treating an absent payload or one
/// flagged with a non-empty `error` as "source unavailable" (zero records,
/// never a failure).
fn payload_records<'a>(payload: Option<&'a Value>, records_field: &str) -> Option<&'a Vec<Value>> {
    let payload = payload?;
    let errored = match payload.get("error") {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    };
    if errored {
        return None;
    }
    payload.get(records_field)?.as_array()
}

struct FieldCandidates<'a> {
    fi_key: &'a [&'a str],
    instance: &'a [&'a str],
    fi_name: &'a [&'a str],
    use_host: bool,
}

/// Derives the canonical (fi, instance-display) pair for one record.
/// Priority is a hard invariant: explicit key, then host inference (GA),
/// then registry name lookup, then `unknown_fi`; the registry never
/// overrides an explicit key. The legacy default/advancial collapse is
/// applied last, FI direction first.
fn derive_key(
    record: &Value,
    candidates: &FieldCandidates<'_>,
    index: &RegistryIndex,
    tables: &KeyTables,
) -> (String, String) {
    let host_fi = if candidates.use_host {
        resolve_fi_from_host(&first_str(record, &["host"]))
    } else {
        None
    };

    let explicit_key = first_str(record, candidates.fi_key);
    let fi_key = if !explicit_key.is_empty() {
        index
            .resolve_fi_key(&explicit_key, "")
            .unwrap_or_else(|| normalize_fi_key(&explicit_key))
    } else if let Some(host) = &host_fi {
        host.fi_key.clone()
    } else if let Some(resolved) =
        index.resolve_fi_key("", &first_str(record, candidates.fi_name))
    {
        resolved
    } else {
        UNKNOWN_FI.to_string()
    };

    let mut instance = first_str(record, candidates.instance);
    if instance.is_empty() {
        if let Some(host) = &host_fi {
            instance = host.instance.clone();
        }
    }

    let fi_key = adjust_fi_for_instance(&fi_key, &instance);
    let instance = adjust_instance_for_fi(&fi_key, &instance);
    (fi_key, format_instance_display(&instance, tables))
}

/// Derives `by_fi` as the additive fold of `by_instance`, the only way the
/// FI-level map is ever produced, so the cross-map totals invariant holds by
/// construction.
fn fold_by_fi<T: Absorb + Default>(
    by_instance: &BTreeMap<String, T>,
    fi_of_instance: &BTreeMap<String, String>,
) -> BTreeMap<String, T> {
    let mut by_fi = BTreeMap::<String, T>::new();
    for (key, bucket) in by_instance {
        let fi_key = fi_of_instance
            .get(key)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_FI.to_string());
        by_fi.entry(fi_key).or_default().absorb(bucket);
    }
    by_fi
}

pub fn aggregate_ga(
    payload: Option<&Value>,
    index: &RegistryIndex,
    tables: &KeyTables,
) -> SourceAggregate<GaTotals> {
    let candidates = FieldCandidates {
        fi_key: &["fi_key"],
        instance: &["instance"],
        fi_name: &[],
        use_host: true,
    };

    let Some(rows) = payload_records(payload, "rows") else {
        return SourceAggregate::default();
    };

    let mut by_instance = BTreeMap::<String, GaTotals>::new();
    let mut fi_of_instance = BTreeMap::<String, String>::new();

    for row in rows {
        let (fi_key, instance) = derive_key(row, &candidates, index, tables);
        let key = fi_instance_key(&fi_key, &instance);

        let bucket = by_instance.entry(key.clone()).or_insert_with(|| GaTotals {
            instance: instance.clone(),
            ..GaTotals::default()
        });
        bucket.is_test |=
            tables.is_test_instance(&canonical_instance(&instance)) || to_bool(row.get("is_test"));

        let count = first_count(row, &["active_users", "views"]);
        let page = first_str(row, &["page", "pagePath"]);
        if page.starts_with(GA_PAGE_SELECT_MERCHANTS) {
            bucket.select_merchants += count;
        } else if page.starts_with(GA_PAGE_USER_DATA) {
            bucket.user_data_collection += count;
        } else if page.starts_with(GA_PAGE_CREDENTIAL_ENTRY) {
            bucket.credential_entry += count;
        }

        fi_of_instance.insert(key, fi_key);
    }

    SourceAggregate {
        by_fi: fold_by_fi(&by_instance, &fi_of_instance),
        by_instance,
    }
}

pub fn aggregate_sessions(
    payload: Option<&Value>,
    index: &RegistryIndex,
    tables: &KeyTables,
) -> SourceAggregate<SessionTotals> {
    let candidates = FieldCandidates {
        fi_key: &["fi_lookup_key", "fi_key"],
        instance: &["_instance", "instance"],
        fi_name: &["fi_name"],
        use_host: false,
    };

    let Some(sessions) = payload_records(payload, "sessions") else {
        return SourceAggregate::default();
    };

    let mut by_instance = BTreeMap::<String, SessionTotals>::new();
    let mut fi_of_instance = BTreeMap::<String, String>::new();

    for session in sessions {
        let (fi_key, instance) = derive_key(session, &candidates, index, tables);
        let key = fi_instance_key(&fi_key, &instance);

        let bucket = by_instance
            .entry(key.clone())
            .or_insert_with(|| SessionTotals {
                instance: instance.clone(),
                ..SessionTotals::default()
            });
        bucket.is_test |= tables.is_test_instance(&canonical_instance(&instance));

        let total_jobs = first_count(session, &["total_jobs"]);
        let successful_jobs = first_count(session, &["successful_jobs"]);

        bucket.total_sessions += 1;
        if total_jobs > 0 {
            bucket.sessions_with_jobs += 1;
        }
        if successful_jobs > 0 {
            bucket.sessions_with_success += 1;
        }
        bucket.total_jobs_sum += total_jobs;
        bucket.successful_jobs_sum += successful_jobs;

        fi_of_instance.insert(key, fi_key);
    }

    SourceAggregate {
        by_fi: fold_by_fi(&by_instance, &fi_of_instance),
        by_instance,
    }
}

pub fn aggregate_placements(
    payload: Option<&Value>,
    index: &RegistryIndex,
    tables: &KeyTables,
) -> SourceAggregate<PlacementTotals> {
    let candidates = FieldCandidates {
        fi_key: &["fi_lookup_key", "fi_key"],
        instance: &["instance", "_instance"],
        fi_name: &["fi_name"],
        use_host: false,
    };

    let Some(placements) = payload_records(payload, "placements") else {
        return SourceAggregate::default();
    };

    let mut by_instance = BTreeMap::<String, PlacementTotals>::new();
    let mut fi_of_instance = BTreeMap::<String, String>::new();

    for placement in placements {
        let (fi_key, instance) = derive_key(placement, &candidates, index, tables);
        let key = fi_instance_key(&fi_key, &instance);

        let bucket = by_instance
            .entry(key.clone())
            .or_insert_with(|| PlacementTotals {
                instance: instance.clone(),
                ..PlacementTotals::default()
            });
        bucket.is_test |= tables.is_test_instance(&canonical_instance(&instance));

        let mut termination =
            first_str(placement, &["termination_type", "status"]).to_ascii_uppercase();
        if termination.is_empty() {
            termination = UNKNOWN_TERMINATION.to_string();
        }

        bucket.total_placements += 1;
        if SUCCESS_TERMINATIONS.contains(&termination.as_str()) {
            bucket.successful_placements += 1;
        }
        *bucket.by_termination.entry(termination).or_insert(0) += 1;

        fi_of_instance.insert(key, fi_key);
    }

    SourceAggregate {
        by_fi: fold_by_fi(&by_instance, &fi_of_instance),
        by_instance,
    }
}
