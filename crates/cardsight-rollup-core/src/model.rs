use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Additive fold of per-instance buckets into their per-FI bucket. Counters
/// add, `is_test` ORs, the instance display string is never folded up.
pub trait Absorb {
    fn absorb(&mut self, other: &Self);
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GaTotals {
    pub select_merchants: u64,
    pub user_data_collection: u64,
    pub credential_entry: u64,
    pub is_test: bool,
    pub instance: String,
}

impl Absorb for GaTotals {
    fn absorb(&mut self, other: &Self) {
        self.select_merchants += other.select_merchants;
        self.user_data_collection += other.user_data_collection;
        self.credential_entry += other.credential_entry;
        self.is_test |= other.is_test;
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionTotals {
    pub total_sessions: u64,
    pub sessions_with_jobs: u64,
    pub sessions_with_success: u64,
    pub total_jobs_sum: u64,
    pub successful_jobs_sum: u64,
    pub is_test: bool,
    pub instance: String,
}

impl Absorb for SessionTotals {
    fn absorb(&mut self, other: &Self) {
        self.total_sessions += other.total_sessions;
        self.sessions_with_jobs += other.sessions_with_jobs;
        self.sessions_with_success += other.sessions_with_success;
        self.total_jobs_sum += other.total_jobs_sum;
        self.successful_jobs_sum += other.successful_jobs_sum;
        self.is_test |= other.is_test;
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlacementTotals {
    pub total_placements: u64,
    pub successful_placements: u64,
    pub by_termination: BTreeMap<String, u64>,
    pub is_test: bool,
    pub instance: String,
}

impl Absorb for PlacementTotals {
    fn absorb(&mut self, other: &Self) {
        self.total_placements += other.total_placements;
        self.successful_placements += other.successful_placements;
        for (reason, count) in &other.by_termination {
            *self.by_termination.entry(reason.clone()).or_insert(0) += count;
        }
        self.is_test |= other.is_test;
    }
}

/// One source's view of a day: totals keyed by FI, and by composite
/// `fi__instance` key. `by_fi` is always the fold of `by_instance`.
#[derive(Debug, Clone, Default)]
pub struct SourceAggregate<T> {
    pub by_fi: BTreeMap<String, T>,
    pub by_instance: BTreeMap<String, T>,
}

impl<T> SourceAggregate<T> {
    pub fn is_empty(&self) -> bool {
        self.by_fi.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GaDoc {
    pub select_merchants: u64,
    pub user_data_collection: u64,
    pub credential_entry: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionsDoc {
    pub total: u64,
    pub with_jobs: u64,
    pub with_success: u64,
    pub without_jobs: u64,
    pub total_jobs: u64,
    pub successful_jobs: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlacementsDoc {
    pub total: u64,
    pub successful: u64,
    pub by_termination: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourcesPresent {
    pub ga: bool,
    pub sis_sessions: bool,
    pub sis_placements: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiDay {
    pub fi_lookup_key: String,
    pub fi_name: String,
    pub ga: GaDoc,
    pub sessions: SessionsDoc,
    pub placements: PlacementsDoc,
    pub ga_instances: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiInstanceDay {
    pub fi_lookup_key: String,
    pub instance: String,
    pub is_test: bool,
    pub ga: GaDoc,
    pub sessions: SessionsDoc,
    pub placements: PlacementsDoc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyDocument {
    pub date: NaiveDate,
    pub sources: SourcesPresent,
    pub fi: BTreeMap<String, FiDay>,
    pub fi_instances: BTreeMap<String, FiInstanceDay>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeSummary {
    pub days_written: u64,
    pub days_skipped: u64,
}
