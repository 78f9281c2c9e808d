mod history_db;

pub use self::history_db::HistoryDb;
