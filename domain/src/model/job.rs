use serde::{Deserialize, Serialize};

/// Display key under which a backend reports the job name.
pub const JOB_NAME_KEY: &str = "Job Name";
/// Display key for the submission timestamp.
pub const SUBMISSION_TIME_KEY: &str = "Submission Time";
/// Display key for the partition / queue / resource group.
pub const PARTITION_KEY: &str = "Partition";
/// Display key for the canonical status.
pub const STATUS_KEY: &str = "status";

/// Canonical status every backend vocabulary is folded into.
///
/// `Completed` is terminal: a record that reached it is frozen and never
/// queried again. `Unknown` marks a backend code the adapter does not
/// recognize; it stays eligible for re-query so such a job never freezes
/// silently.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum JobStatus {
    #[serde(rename = "QUEUED")]
    Queued,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[default]
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed)
    }

    pub fn display(&self) -> &'static str {
        match self {
            JobStatus::Queued => "Queued",
            JobStatus::Running => "Running",
            JobStatus::Completed => "Completed",
            JobStatus::Unknown => "Unknown",
        }
    }
}

/// Status filter for history views.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub enum StatusFilter {
    #[default]
    All,
    Queued,
    Running,
    Completed,
}

impl StatusFilter {
    pub fn matches(&self, status: JobStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Queued => status == JobStatus::Queued,
            StatusFilter::Running => status == JobStatus::Running,
            StatusFilter::Completed => status == JobStatus::Completed,
        }
    }
}

/// One history entry per submitted job (or per expanded array subjob).
///
/// The id may carry an array suffix (`1234_7`, `1234[7]`). Script fields are
/// set once at submission. `extra` holds backend-specific key/value pairs in
/// reported order; `known_keys` is the key list of the last merge and travels
/// with the record so unknown fields round-trip without schema changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub submission_time: Option<String>,
    #[serde(default)]
    pub partition: Option<String>,
    #[serde(default)]
    pub script_location: Option<String>,
    #[serde(default)]
    pub script_name: Option<String>,
    #[serde(default)]
    pub script_content: Option<String>,
    #[serde(default)]
    pub extra: Vec<(String, Option<String>)>,
    #[serde(default)]
    pub known_keys: Vec<String>,
}

impl JobRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Queued,
            name: None,
            submission_time: None,
            partition: None,
            script_location: None,
            script_name: None,
            script_content: None,
            extra: Vec::new(),
            known_keys: Vec::new(),
        }
    }

    pub fn extra_value(&self, key: &str) -> Option<&str> {
        self.extra
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_deref())
    }

    /// Fold a partial query result into this record.
    ///
    /// Non-terminal records take every supplied field and adopt the update's
    /// key list. A `Completed` record is frozen: only fields still unset may
    /// be filled, nothing already present changes.
    pub fn apply(&mut self, update: &JobUpdate) {
        if self.status.is_terminal() {
            self.fill_missing(update);
            return;
        }

        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(name) = &update.name {
            self.name = Some(name.clone());
        }
        if let Some(time) = &update.submission_time {
            self.submission_time = Some(time.clone());
        }
        if let Some(partition) = &update.partition {
            self.partition = Some(partition.clone());
        }
        for (key, value) in &update.extra {
            match self.extra.iter_mut().find(|(k, _)| k == key) {
                Some((_, v)) => *v = value.clone(),
                None => self.extra.push((key.clone(), value.clone())),
            }
        }
        self.known_keys = update.known_keys();
    }

    fn fill_missing(&mut self, update: &JobUpdate) {
        if self.name.is_none() {
            self.name = update.name.clone();
        }
        if self.submission_time.is_none() {
            self.submission_time = update.submission_time.clone();
        }
        if self.partition.is_none() {
            self.partition = update.partition.clone();
        }
        for (key, value) in &update.extra {
            match self.extra.iter_mut().find(|(k, _)| k == key) {
                Some((_, v)) => {
                    if v.is_none() {
                        *v = value.clone();
                    }
                }
                None => {
                    self.extra.push((key.clone(), value.clone()));
                    self.known_keys.push(key.clone());
                }
            }
        }
        if self.known_keys.is_empty() {
            self.known_keys = update.known_keys();
        }
    }
}

/// Partial record a backend reports for one job id. Absent fields were not
/// reported and must not disturb the stored record.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub name: Option<String>,
    pub submission_time: Option<String>,
    pub partition: Option<String>,
    pub extra: Vec<(String, Option<String>)>,
}

impl JobUpdate {
    pub fn extra_value(&self, key: &str) -> Option<&str> {
        self.extra
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_deref())
    }

    /// Keys this update reports, in display order. Extra keys count as
    /// reported even when their value is empty.
    pub fn known_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        if self.name.is_some() {
            keys.push(JOB_NAME_KEY.to_owned());
        }
        if self.submission_time.is_some() {
            keys.push(SUBMISSION_TIME_KEY.to_owned());
        }
        if self.partition.is_some() {
            keys.push(PARTITION_KEY.to_owned());
        }
        if self.status.is_some() {
            keys.push(STATUS_KEY.to_owned());
        }
        keys.extend(self.extra.iter().map(|(k, _)| k.clone()));
        keys
    }
}
