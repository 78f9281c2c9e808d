mod job_scheduler;

pub use self::job_scheduler::{JobScheduler, MockJobScheduler};
