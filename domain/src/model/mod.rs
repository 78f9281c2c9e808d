pub mod job;

pub use self::job::{JobRecord, JobStatus, JobUpdate, StatusFilter};
