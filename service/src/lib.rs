mod error;
mod history;
mod submit;

#[rustfmt::skip]
pub use self::{
    error::HistoryError,
    history::HistoryService,
    submit::{SubmitRequest, SubmitService},
};
