pub mod config;
pub mod error;
pub mod events;
pub mod hypersync;
pub mod ledger;
pub mod merkle;
pub mod query;
pub mod reconstruct;
pub mod repository;
pub mod scanner;
pub mod server;
pub mod snapshot;

#[cfg(test)]
mod testing;

pub use error::SnapshotError;
pub use snapshot::{Snapshot, SnapshotRequest, SnapshotService};
