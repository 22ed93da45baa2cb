//! Ranked report of accumulated run time.
//!
//! Records are ranked by total seconds, highest first. Ties keep the store's key
//! order, so the ranking is deterministic.

use crate::model::{ElapsedRecord, RankedRecord};
use crate::storage::ElapsedStore;
use crate::timefmt::{seconds_to_time_string, Hms};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::debug;

/// Read every record from the store at `store_path` and rank it.
pub(crate) fn list_runs(store_path: &Path) -> Result<Vec<RankedRecord>> {
    let Some(store) = ElapsedStore::open_read_only(store_path)
        .with_context(|| format!("failed to open store {}", store_path.display()))?
    else {
        debug!(path = %store_path.display(), "store does not exist yet");
        return Ok(Vec::new());
    };
    let records = store.list_all().context("failed to list tracked runs")?;
    store.close().context("failed to close store")?;
    Ok(rank(records))
}

/// Stable sort by seconds, descending, with 1-based ranks.
pub(crate) fn rank(mut records: Vec<ElapsedRecord>) -> Vec<RankedRecord> {
    records.sort_by(|a, b| b.seconds.cmp(&a.seconds));
    records
        .into_iter()
        .enumerate()
        .map(|(idx, r)| {
            let hms = Hms::from_seconds(r.seconds);
            RankedRecord {
                rank: idx + 1,
                name: r.key,
                seconds: r.seconds,
                hours: hms.hours,
                minutes: hms.minutes,
                secs: hms.seconds,
            }
        })
        .collect()
}

/// One `rank. name: H hours, M minutes, S seconds` line per record.
pub(crate) fn build_report_lines(ranked: &[RankedRecord]) -> Vec<String> {
    ranked
        .iter()
        .map(|r| {
            format!(
                "{}. {}: {}",
                r.rank,
                r.name,
                seconds_to_time_string(r.seconds)
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str, seconds: u64) -> ElapsedRecord {
        ElapsedRecord {
            key: key.into(),
            seconds,
        }
    }

    #[test]
    fn ties_keep_key_order() {
        let ranked = rank(vec![record("a", 50), record("b", 200), record("c", 50)]);
        let names: Vec<&str> = ranked.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert_eq!(
            ranked.iter().map(|r| r.rank).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn lines_use_rank_name_and_time_string() {
        let lines = build_report_lines(&rank(vec![record("vim", 3725), record("top", 61)]));
        assert_eq!(
            lines,
            vec![
                "1. vim: 1 hours, 2 minutes, 5 seconds",
                "2. top: 0 hours, 1 minutes, 1 seconds",
            ]
        );
    }

    #[test]
    fn ranked_records_carry_components() {
        let ranked = rank(vec![record("vim", 3725)]);
        assert_eq!((ranked[0].hours, ranked[0].minutes, ranked[0].secs), (1, 2, 5));
    }

    #[test]
    fn missing_store_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let ranked = list_runs(&dir.path().join("nope.db")).unwrap();
        assert!(ranked.is_empty());
    }

    #[test]
    fn empty_store_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.db");
        ElapsedStore::open(&path).unwrap().close().unwrap();
        assert!(list_runs(&path).unwrap().is_empty());
    }

    #[test]
    fn lists_store_contents_ranked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.db");
        let mut store = ElapsedStore::open(&path).unwrap();
        let tx = store.begin_write().unwrap();
        tx.put_seconds("c", 50).unwrap();
        tx.put_seconds("b", 200).unwrap();
        tx.put_seconds("a", 50).unwrap();
        tx.commit().unwrap();
        store.close().unwrap();

        let names: Vec<String> = list_runs(&path).unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }
}
