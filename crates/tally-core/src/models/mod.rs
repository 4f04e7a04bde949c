//! Data models for Tally

mod pending_change;
mod record;
mod table;

pub use pending_change::{ChangeOperation, PendingChange, PendingChangeId};
pub use record::{LocalRecord, RecordDecodeError, RecordId, RemoteRecord};
pub use table::{SyncTable, UnknownTable};
