pub mod database;
pub mod models;
pub mod snapshot_repository;

pub use database::Database;
pub use models::{CachedEntry, CachedSnapshot};
pub use snapshot_repository::SnapshotRepository;
