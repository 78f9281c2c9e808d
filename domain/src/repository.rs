use crate::model::job::{JobRecord, JobUpdate};

/// Persisted, insertion-ordered mapping from job id to record.
///
/// Writers are serialized against each other and against readers; every
/// batch operation commits atomically or leaves the store untouched.
#[mockall::automock]
#[async_trait::async_trait]
pub trait HistoryRepository {
    /// Insert all records in one transaction. An existing id is replaced
    /// (resubmission under the same id).
    async fn put_many(&self, records: Vec<JobRecord>) -> anyhow::Result<()>;

    async fn get(&self, id: &str) -> anyhow::Result<Option<JobRecord>>;

    /// Merge one partial result; returns `false` when the id is no longer
    /// present (e.g. deleted while the query was in flight).
    async fn merge(&self, id: &str, update: JobUpdate) -> anyhow::Result<bool>;

    /// Merge a whole query batch in one transaction. Absent ids are
    /// skipped, not errors.
    async fn merge_many(&self, updates: Vec<(String, JobUpdate)>) -> anyhow::Result<()>;

    async fn delete(&self, ids: &[String]) -> anyhow::Result<()>;

    async fn size(&self) -> anyhow::Result<usize>;

    /// All ids, most recently inserted first.
    async fn ids_reverse_chronological(&self) -> anyhow::Result<Vec<String>>;
}
