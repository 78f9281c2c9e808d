pub mod error;
pub mod model;
pub mod repository;
pub mod service;

#[rustfmt::skip]
pub use self::{
    error::SchedulerError,
    model::job::{JobRecord, JobStatus, JobUpdate, StatusFilter},
    repository::{HistoryRepository, MockHistoryRepository},
    service::{JobScheduler, MockJobScheduler},
};
