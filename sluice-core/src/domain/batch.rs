//! Batch domain types
//!
//! A batch is not stored: it is the set of jobs sharing a batch identifier,
//! summarised by the status counts of its members.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::job::JobStatus;

/// Status counts of one batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_id: String,
    pub counts: BTreeMap<JobStatus, i64>,
}

impl BatchSummary {
    pub fn total(&self) -> i64 {
        self.counts.values().sum()
    }

    /// True when every member has reached a terminal status
    pub fn is_archivable(&self) -> bool {
        is_fully_terminal(self.counts.keys().copied())
    }
}

/// True when all statuses are terminal
pub fn is_fully_terminal(statuses: impl IntoIterator<Item = JobStatus>) -> bool {
    statuses.into_iter().all(JobStatus::is_terminal)
}

/// Folds `(batch, status, count)` rows into one summary per batch
///
/// Batches come out ordered by identifier.
pub fn summarize(rows: impl IntoIterator<Item = (String, JobStatus, i64)>) -> Vec<BatchSummary> {
    let mut batches: BTreeMap<String, BTreeMap<JobStatus, i64>> = BTreeMap::new();

    for (batch_id, status, count) in rows {
        *batches
            .entry(batch_id)
            .or_default()
            .entry(status)
            .or_default() += count;
    }

    batches
        .into_iter()
        .map(|(batch_id, counts)| BatchSummary { batch_id, counts })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_groups_by_batch() {
        let summaries = summarize(vec![
            ("b".to_string(), JobStatus::Finished, 2),
            ("a".to_string(), JobStatus::Running, 1),
            ("b".to_string(), JobStatus::Failed, 1),
            ("a".to_string(), JobStatus::Finished, 4),
        ]);

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].batch_id, "a");
        assert_eq!(summaries[0].total(), 5);
        assert!(!summaries[0].is_archivable());
        assert_eq!(summaries[1].batch_id, "b");
        assert_eq!(summaries[1].counts[&JobStatus::Finished], 2);
        assert!(summaries[1].is_archivable());
    }

    #[test]
    fn test_any_active_member_blocks_archiving() {
        for active in [JobStatus::New, JobStatus::Submitted, JobStatus::Running] {
            assert!(!is_fully_terminal([
                JobStatus::Finished,
                JobStatus::Cancelled,
                active
            ]));
        }
        assert!(is_fully_terminal([
            JobStatus::Finished,
            JobStatus::Failed,
            JobStatus::Cancelled
        ]));
    }

    #[test]
    fn test_summary_serializes_status_keys() {
        let summary = summarize(vec![("a".to_string(), JobStatus::Failed, 3)]).remove(0);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["counts"]["failed"], 3);
    }
}
