//! Local persistence for mirrored records

mod connection;
mod memory;
mod migrations;
mod repository;

pub use connection::Database;
pub use memory::MemoryRecordStore;
pub use repository::{LibSqlRecordStore, RecordStore};
