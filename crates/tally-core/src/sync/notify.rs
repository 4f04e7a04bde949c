//! "Local data changed" notifications for UI layers.

use tokio::sync::broadcast;

use crate::models::SyncTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSource {
    /// Backend confirmed queued changes
    Push,
    /// A full or incremental pull
    Pull,
    /// A realtime delta
    Realtime,
}

/// Local mirrors of `tables` changed; listeners should reload them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataChanged {
    pub tables: Vec<SyncTable>,
    pub source: ChangeSource,
}

#[derive(Debug)]
pub(crate) struct ChangeNotifier {
    tx: broadcast::Sender<DataChanged>,
}

impl ChangeNotifier {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<DataChanged> {
        self.tx.subscribe()
    }

    pub(crate) fn notify(&self, tables: Vec<SyncTable>, source: ChangeSource) {
        if tables.is_empty() {
            return;
        }
        // No receivers is fine
        if self.tx.send(DataChanged { tables, source }).is_err() {
            tracing::trace!(?source, "No data-change listeners");
        }
    }
}
