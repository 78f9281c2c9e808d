pub mod command;
pub mod database;
pub mod scheduler;
