//! SQLite persistence for workflows and execution logs.

mod store;

pub use store::SqliteStore;
