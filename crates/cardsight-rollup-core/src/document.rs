use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

use crate::keys::split_fi_instance_key;
use crate::model::{
    DailyDocument, FiDay, FiInstanceDay, GaDoc, GaTotals, PlacementTotals, PlacementsDoc,
    SessionTotals, SessionsDoc, SourceAggregate, SourcesPresent,
};
use crate::registry::RegistryIndex;

fn ga_doc(totals: Option<&GaTotals>) -> GaDoc {
    let totals = totals.cloned().unwrap_or_default();
    GaDoc {
        select_merchants: totals.select_merchants,
        user_data_collection: totals.user_data_collection,
        credential_entry: totals.credential_entry,
    }
}

fn sessions_doc(totals: Option<&SessionTotals>) -> SessionsDoc {
    let totals = totals.cloned().unwrap_or_default();
    SessionsDoc {
        total: totals.total_sessions,
        with_jobs: totals.sessions_with_jobs,
        with_success: totals.sessions_with_success,
        without_jobs: totals.total_sessions.saturating_sub(totals.sessions_with_jobs),
        total_jobs: totals.total_jobs_sum,
        successful_jobs: totals.successful_jobs_sum,
    }
}

fn placements_doc(totals: Option<&PlacementTotals>) -> PlacementsDoc {
    let totals = totals.cloned().unwrap_or_default();
    PlacementsDoc {
        total: totals.total_placements,
        successful: totals.successful_placements,
        by_termination: totals.by_termination,
    }
}

/// GA instance display names per FI. Dedup on canonical form is structural:
/// equivalent spellings share one composite key, and the bucket keeps the
/// first-seen display form. Sorted map iteration keeps the list order
/// deterministic across runs.
fn ga_instances_by_fi(ga: &SourceAggregate<GaTotals>) -> BTreeMap<String, Vec<String>> {
    let mut by_fi = BTreeMap::<String, Vec<String>>::new();
    for (key, bucket) in &ga.by_instance {
        if bucket.instance.is_empty() {
            continue;
        }
        let (fi_key, _) = split_fi_instance_key(key);
        by_fi
            .entry(fi_key.to_string())
            .or_default()
            .push(bucket.instance.clone());
    }
    by_fi
}

/// Merges the three per-source aggregates into the day's document. FI and
/// FI-instance entries are the unions of the per-source key sets, with
/// missing sources zero-filled.
pub fn build_daily_document(
    date: NaiveDate,
    ga: &SourceAggregate<GaTotals>,
    sessions: &SourceAggregate<SessionTotals>,
    placements: &SourceAggregate<PlacementTotals>,
    index: &RegistryIndex,
) -> DailyDocument {
    let sources = SourcesPresent {
        ga: !ga.is_empty(),
        sis_sessions: !sessions.is_empty(),
        sis_placements: !placements.is_empty(),
    };

    let ga_instances = ga_instances_by_fi(ga);

    let mut fi_keys = BTreeSet::<&String>::new();
    fi_keys.extend(ga.by_fi.keys());
    fi_keys.extend(sessions.by_fi.keys());
    fi_keys.extend(placements.by_fi.keys());

    let mut fi = BTreeMap::<String, FiDay>::new();
    for fi_key in fi_keys {
        fi.insert(
            fi_key.clone(),
            FiDay {
                fi_lookup_key: fi_key.clone(),
                fi_name: index
                    .fi_name(fi_key)
                    .unwrap_or(fi_key.as_str())
                    .to_string(),
                ga: ga_doc(ga.by_fi.get(fi_key)),
                sessions: sessions_doc(sessions.by_fi.get(fi_key)),
                placements: placements_doc(placements.by_fi.get(fi_key)),
                ga_instances: ga_instances.get(fi_key).cloned().unwrap_or_default(),
            },
        );
    }

    let mut instance_keys = BTreeSet::<&String>::new();
    instance_keys.extend(ga.by_instance.keys());
    instance_keys.extend(sessions.by_instance.keys());
    instance_keys.extend(placements.by_instance.keys());

    let mut fi_instances = BTreeMap::<String, FiInstanceDay>::new();
    for key in instance_keys {
        let ga_bucket = ga.by_instance.get(key);
        let session_bucket = sessions.by_instance.get(key);
        let placement_bucket = placements.by_instance.get(key);

        let (fi_key, canonical) = split_fi_instance_key(key);
        let instance = [
            ga_bucket.map(|b| b.instance.as_str()),
            session_bucket.map(|b| b.instance.as_str()),
            placement_bucket.map(|b| b.instance.as_str()),
        ]
        .into_iter()
        .flatten()
        .find(|display| !display.is_empty())
        .unwrap_or(canonical)
        .to_string();

        let is_test = ga_bucket.map_or(false, |b| b.is_test)
            || session_bucket.map_or(false, |b| b.is_test)
            || placement_bucket.map_or(false, |b| b.is_test);

        fi_instances.insert(
            key.clone(),
            FiInstanceDay {
                fi_lookup_key: fi_key.to_string(),
                instance,
                is_test,
                ga: ga_doc(ga_bucket),
                sessions: sessions_doc(session_bucket),
                placements: placements_doc(placement_bucket),
            },
        );
    }

    DailyDocument {
        date,
        sources,
        fi,
        fi_instances,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{aggregate_ga, aggregate_placements, aggregate_sessions};
    use crate::keys::KeyTables;
    use crate::registry::{build_registry_index, FiRegistry, FiRegistryEntry};
    use serde_json::json;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).expect("valid date")
    }

    fn empty_index() -> RegistryIndex {
        build_registry_index(&FiRegistry::new())
    }

    fn build_from_payloads(
        ga: Option<serde_json::Value>,
        sessions: Option<serde_json::Value>,
        placements: Option<serde_json::Value>,
        index: &RegistryIndex,
    ) -> DailyDocument {
        let tables = KeyTables::default();
        let ga = aggregate_ga(ga.as_ref(), index, &tables);
        let sessions = aggregate_sessions(sessions.as_ref(), index, &tables);
        let placements = aggregate_placements(placements.as_ref(), index, &tables);
        build_daily_document(date(), &ga, &sessions, &placements, index)
    }

    #[test]
    fn merges_sources_under_one_fi() {
        let doc = build_from_payloads(
            Some(json!({"rows": [
                {"host": "acme.instance1.cardupdatr.app", "page": "/select-merchants", "active_users": 5},
                {"host": "acme.instance1.cardupdatr.app", "page": "/credential-entry", "active_users": 2}
            ]})),
            Some(json!({"sessions": [
                {"total_jobs": 3, "successful_jobs": 1, "fi_lookup_key": "acme", "_instance": "Instance1"}
            ]})),
            None,
            &empty_index(),
        );

        assert!(doc.sources.ga);
        assert!(doc.sources.sis_sessions);
        assert!(!doc.sources.sis_placements);

        let acme = doc.fi.get("acme").expect("acme fi entry");
        assert_eq!(
            acme.ga,
            GaDoc {
                select_merchants: 5,
                user_data_collection: 0,
                credential_entry: 2,
            }
        );
        assert_eq!(acme.placements, PlacementsDoc::default());
        assert_eq!(acme.ga_instances, vec!["instance1".to_string()]);

        let instance = doc
            .fi_instances
            .get("acme__instance1")
            .expect("acme instance entry");
        assert_eq!(
            instance.sessions,
            SessionsDoc {
                total: 1,
                with_jobs: 1,
                with_success: 1,
                without_jobs: 0,
                total_jobs: 3,
                successful_jobs: 1,
            }
        );
        assert_eq!(instance.fi_lookup_key, "acme");
        assert_eq!(instance.instance, "instance1");
    }

    #[test]
    fn fi_entries_sum_their_instances() {
        let doc = build_from_payloads(
            None,
            Some(json!({"sessions": [
                {"total_jobs": 3, "successful_jobs": 1, "fi_lookup_key": "acme", "_instance": "instance1"},
                {"total_jobs": 0, "successful_jobs": 0, "fi_lookup_key": "acme", "_instance": "instance2"}
            ]})),
            None,
            &empty_index(),
        );

        let fi = doc.fi.get("acme").expect("acme");
        let summed: u64 = doc
            .fi_instances
            .values()
            .filter(|entry| entry.fi_lookup_key == "acme")
            .map(|entry| entry.sessions.total)
            .sum();
        assert_eq!(fi.sessions.total, summed);
        assert_eq!(fi.sessions.without_jobs, 1);
    }

    #[test]
    fn without_jobs_never_goes_negative() {
        let totals = SessionTotals {
            total_sessions: 1,
            sessions_with_jobs: 3,
            ..SessionTotals::default()
        };
        assert_eq!(sessions_doc(Some(&totals)).without_jobs, 0);
    }

    #[test]
    fn ga_instances_dedup_on_canonical_form_first_display_wins() {
        let mut ga = SourceAggregate::<GaTotals>::default();
        ga.by_instance.insert(
            "acme__instance1".to_string(),
            GaTotals {
                instance: "instance-1".to_string(),
                ..GaTotals::default()
            },
        );
        ga.by_instance.insert(
            "acme__instance2".to_string(),
            GaTotals {
                instance: "instance2".to_string(),
                ..GaTotals::default()
            },
        );
        ga.by_fi.insert("acme".to_string(), GaTotals::default());

        let doc = build_daily_document(
            date(),
            &ga,
            &SourceAggregate::default(),
            &SourceAggregate::default(),
            &empty_index(),
        );

        assert_eq!(
            doc.fi.get("acme").expect("acme").ga_instances,
            vec!["instance-1".to_string(), "instance2".to_string()]
        );
    }

    #[test]
    fn instance_is_test_ors_across_sources() {
        let mut sessions = SourceAggregate::<SessionTotals>::default();
        sessions.by_instance.insert(
            "acme__qa".to_string(),
            SessionTotals {
                total_sessions: 1,
                is_test: true,
                instance: "qa".to_string(),
                ..SessionTotals::default()
            },
        );
        sessions.by_fi.insert(
            "acme".to_string(),
            SessionTotals {
                total_sessions: 1,
                is_test: true,
                ..SessionTotals::default()
            },
        );

        let mut placements = SourceAggregate::<PlacementTotals>::default();
        placements.by_instance.insert(
            "acme__qa".to_string(),
            PlacementTotals {
                total_placements: 1,
                instance: "qa".to_string(),
                ..PlacementTotals::default()
            },
        );
        placements.by_fi.insert(
            "acme".to_string(),
            PlacementTotals {
                total_placements: 1,
                ..PlacementTotals::default()
            },
        );

        let doc = build_daily_document(
            date(),
            &SourceAggregate::default(),
            &sessions,
            &placements,
            &empty_index(),
        );

        assert!(doc.fi_instances.get("acme__qa").expect("qa entry").is_test);
    }

    #[test]
    fn fi_name_comes_from_registry_when_known() {
        let mut registry = FiRegistry::new();
        registry.insert(
            "acme-fcu".to_string(),
            FiRegistryEntry {
                fi_name: "Acme Federal Credit Union".to_string(),
                fi_lookup_key: "acme".to_string(),
                ..FiRegistryEntry::default()
            },
        );
        let index = build_registry_index(&registry);

        let doc = build_from_payloads(
            None,
            Some(json!({"sessions": [
                {"total_jobs": 1, "successful_jobs": 0, "fi_lookup_key": "acme"},
                {"total_jobs": 1, "successful_jobs": 0, "fi_lookup_key": "zenith"}
            ]})),
            None,
            &index,
        );

        assert_eq!(
            doc.fi.get("acme").expect("acme").fi_name,
            "Acme Federal Credit Union"
        );
        assert_eq!(doc.fi.get("zenith").expect("zenith").fi_name, "zenith");
    }

    #[test]
    fn unknown_fi_shows_up_in_both_maps() {
        let doc = build_from_payloads(
            None,
            None,
            Some(json!({"placements": [{"termination_type": "BILLABLE"}]})),
            &empty_index(),
        );

        assert!(doc.fi.contains_key("unknown_fi"));
        assert!(doc.fi_instances.contains_key("unknown_fi__unknown"));
        assert_eq!(
            doc.fi.get("unknown_fi").expect("unknown").placements.total,
            1
        );
    }
}
