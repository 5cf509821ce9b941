use anyhow::{Context, Result};
use cardsight_config::RollupConfig;
use chrono::NaiveDate;
use glob::glob;
use regex::Regex;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::aggregate::{aggregate_ga, aggregate_placements, aggregate_sessions};
use crate::document::build_daily_document;
use crate::keys::KeyTables;
use crate::model::{DailyDocument, RangeSummary};
use crate::registry::{build_registry_index, load_registry};

fn day_file_re() -> &'static Regex {
    static DAY_FILE_RE: OnceLock<Regex> = OnceLock::new();
    DAY_FILE_RE.get_or_init(|| {
        Regex::new(r"^(\d{4}-\d{2}-\d{2})\.json$").expect("valid day file regex")
    })
}

/// Reads one source's raw payload for a date. A missing file is a normal
/// condition (source never queried); an unparseable one is logged and
/// treated the same way.
async fn read_raw_day(dir: &str, date: NaiveDate) -> Option<Value> {
    let path = Path::new(dir).join(format!("{date}.json"));
    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(_) => return None,
    };

    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(exc) => {
            warn!(
                "raw day file {} unparseable; treating source as unavailable: {exc}",
                path.display()
            );
            None
        }
    }
}

/// Writes the document to a temporary sibling and renames it into place, so
/// readers never observe a partially-written rollup.
async fn write_document(dir: &str, document: &DailyDocument) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create rollup dir {dir}"))?;

    let target = Path::new(dir).join(format!("{}.json", document.date));
    let tmp = Path::new(dir).join(format!("{}.json.tmp", document.date));

    let encoded = serde_json::to_vec(document).context("failed to encode daily document")?;
    tokio::fs::write(&tmp, &encoded)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, &target)
        .await
        .with_context(|| format!("failed to move {} into place", tmp.display()))?;

    Ok(target)
}

/// Rolls up every date in the inclusive range. The registry is read once per
/// invocation; each day builds fresh maps and is fully written before the
/// next begins. Only filesystem write failures are fatal.
pub async fn build_rollup_range(
    config: &RollupConfig,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<RangeSummary> {
    if start > end {
        anyhow::bail!("start date {start} is after end date {end}");
    }

    let registry = load_registry(Path::new(&config.registry_path));
    let index = build_registry_index(&registry);
    let tables = KeyTables::default();

    let mut summary = RangeSummary::default();
    let mut date = start;
    loop {
        let ga_raw = read_raw_day(&config.ga_dir, date).await;
        let sessions_raw = read_raw_day(&config.sessions_dir, date).await;
        let placements_raw = read_raw_day(&config.placements_dir, date).await;

        if ga_raw.is_none() && sessions_raw.is_none() && placements_raw.is_none() {
            warn!("no raw data for {date}; skipping");
            summary.days_skipped += 1;
        } else {
            let ga = aggregate_ga(ga_raw.as_ref(), &index, &tables);
            let sessions = aggregate_sessions(sessions_raw.as_ref(), &index, &tables);
            let placements = aggregate_placements(placements_raw.as_ref(), &index, &tables);

            if ga.is_empty() && sessions.is_empty() && placements.is_empty() {
                warn!("raw data for {date} contains no records; skipping");
                summary.days_skipped += 1;
            } else {
                let document = build_daily_document(date, &ga, &sessions, &placements, &index);
                let path = write_document(&config.rollup_dir, &document).await?;
                info!(
                    "wrote rollup for {date} ({} fis, {} instances) to {}",
                    document.fi.len(),
                    document.fi_instances.len(),
                    path.display()
                );
                summary.days_written += 1;
            }
        }

        if date == end {
            break;
        }
        date = date.succ_opt().context("date range overflow")?;
    }

    Ok(summary)
}

/// Enumerates the dates for which a directory holds a raw day file.
pub fn available_dates(dir: &str) -> Result<Vec<NaiveDate>> {
    let pattern = format!("{}/*.json", dir.trim_end_matches('/'));
    let mut dates = Vec::<NaiveDate>::new();

    for entry in glob(&pattern).with_context(|| format!("invalid glob: {pattern}"))? {
        let path = match entry {
            Ok(path) => path,
            Err(exc) => {
                warn!("glob iteration error: {exc}");
                continue;
            }
        };

        let name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        if let Some(cap) = day_file_re().captures(name) {
            if let Ok(date) = NaiveDate::parse_from_str(&cap[1], "%Y-%m-%d") {
                dates.push(date);
            }
        }
    }

    dates.sort();
    dates.dedup();
    Ok(dates)
}

/// Union of dates covered by any of the three raw sources, for range
/// discovery when the caller does not name one.
pub fn available_raw_dates(config: &RollupConfig) -> Result<Vec<NaiveDate>> {
    let mut dates = available_dates(&config.ga_dir)?;
    dates.extend(available_dates(&config.sessions_dir)?);
    dates.extend(available_dates(&config.placements_dir)?);
    dates.sort();
    dates.dedup();
    Ok(dates)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(label: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "cardsight-range-{label}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("system time after unix epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&path).expect("create temp dir");
        path
    }

    #[test]
    fn available_dates_extracts_and_sorts_day_files() {
        let dir = temp_dir("dates");
        for name in [
            "2026-03-02.json",
            "2026-03-01.json",
            "notes.txt",
            "summary.json",
            "2026-13-99.json",
        ] {
            std::fs::write(dir.join(name), "{}").expect("write fixture");
        }

        let dates = available_dates(&dir.to_string_lossy()).expect("enumerate");
        std::fs::remove_dir_all(&dir).ok();

        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2026, 3, 1).expect("valid date"),
                NaiveDate::from_ymd_opt(2026, 3, 2).expect("valid date"),
            ]
        );
    }

    #[test]
    fn available_dates_tolerates_missing_dir() {
        let missing = std::env::temp_dir().join("cardsight-no-such-dir");
        let dates = available_dates(&missing.to_string_lossy()).expect("enumerate");
        assert!(dates.is_empty());
    }

    #[tokio::test]
    async fn read_raw_day_returns_none_for_missing_and_corrupt_files() {
        let dir = temp_dir("read");
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).expect("valid date");

        assert!(read_raw_day(&dir.to_string_lossy(), date).await.is_none());

        std::fs::write(dir.join("2026-03-01.json"), "{ not json").expect("write fixture");
        assert!(read_raw_day(&dir.to_string_lossy(), date).await.is_none());

        std::fs::write(dir.join("2026-03-01.json"), r#"{"rows": []}"#).expect("write fixture");
        assert!(read_raw_day(&dir.to_string_lossy(), date).await.is_some());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn write_document_leaves_no_tmp_file_behind() {
        let dir = temp_dir("write");
        let document = DailyDocument {
            date: NaiveDate::from_ymd_opt(2026, 3, 1).expect("valid date"),
            sources: Default::default(),
            fi: Default::default(),
            fi_instances: Default::default(),
        };

        let target = write_document(&dir.to_string_lossy(), &document)
            .await
            .expect("write document");

        assert!(target.exists());
        assert!(!dir.join("2026-03-01.json.tmp").exists());
        std::fs::remove_dir_all(&dir).ok();
    }
}
