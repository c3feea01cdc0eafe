use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::entry::FilterEntry;

/// An immutable-after-publish view of the filter namespace.
///
/// Versions are contiguous and strictly increasing from the genesis
/// snapshot at 0. The name map is never mutated after publish; mutators
/// clone it, edit the clone, and install a successor. The two mutable
/// slots are `deleted` (filled on the superseded head when a removal
/// retires an entry) and `prev` (severed by the vacuum when the chain is
/// shortened).
pub(crate) struct Snapshot {
    version: u64,
    filters: BTreeMap<String, Arc<FilterEntry>>,
    deleted: Mutex<Option<Arc<FilterEntry>>>,
    prev: Mutex<Option<Arc<Snapshot>>>,
}

impl Snapshot {
    pub(crate) fn genesis(filters: BTreeMap<String, Arc<FilterEntry>>) -> Arc<Self> {
        Arc::new(Self {
            version: 0,
            filters,
            deleted: Mutex::new(None),
            prev: Mutex::new(None),
        })
    }

    /// Builds the snapshot that replaces `self`, carrying the edited map.
    pub(crate) fn successor(
        self: &Arc<Self>,
        filters: BTreeMap<String, Arc<FilterEntry>>,
    ) -> Arc<Snapshot> {
        Arc::new(Snapshot {
            version: self.version + 1,
            filters,
            deleted: Mutex::new(None),
            prev: Mutex::new(Some(Arc::clone(self))),
        })
    }

    pub(crate) fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn filters(&self) -> &BTreeMap<String, Arc<FilterEntry>> {
        &self.filters
    }

    /// Point lookup that hides entries already retired by a concurrent
    /// mutator.
    pub(crate) fn lookup_active(&self, name: &str) -> Option<Arc<FilterEntry>> {
        self.filters
            .get(name)
            .filter(|entry| entry.is_active())
            .cloned()
    }

    /// Stores the entry a removal just retired. Called on the snapshot
    /// being superseded, under the manager write lock.
    pub(crate) fn retire_entry(&self, entry: Arc<FilterEntry>) {
        *self.deleted.lock() = Some(entry);
    }

    pub(crate) fn retired(&self) -> Option<Arc<FilterEntry>> {
        self.deleted.lock().clone()
    }

    pub(crate) fn take_retired(&self) -> Option<Arc<FilterEntry>> {
        self.deleted.lock().take()
    }

    pub(crate) fn predecessor(&self) -> Option<Arc<Snapshot>> {
        self.prev.lock().clone()
    }

    /// Severs the back-pointer, returning the detached older chain.
    pub(crate) fn unlink_predecessor(&self) -> Option<Arc<Snapshot>> {
        self.prev.lock().take()
    }
}
