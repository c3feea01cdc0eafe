use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Result;
use crate::filter::Filter;

/// A filter plus the lifecycle flags the manager needs around it.
///
/// Entries are shared between namespace snapshots as `Arc<FilterEntry>`;
/// the flags live outside the filter's own lock so lookups and the cold
/// scan never contend with probe traffic.
pub(crate) struct FilterEntry {
    filter: Filter,
    /// Once cleared this never goes back to `true`; lookups treat the
    /// entry as absent from then on.
    active: AtomicBool,
    /// Recency hint set by any read or write, cleared by the cold scan.
    hot: AtomicBool,
    /// Chooses between erasing and closing the payload at reclaim time.
    delete_backing: AtomicBool,
}

impl FilterEntry {
    pub(crate) fn new(filter: Filter, hot: bool) -> Self {
        Self {
            filter,
            active: AtomicBool::new(true),
            hot: AtomicBool::new(hot),
            delete_backing: AtomicBool::new(false),
        }
    }

    pub(crate) fn filter(&self) -> &Filter {
        &self.filter
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Deactivates the entry and records how its payload is disposed of.
    /// Called under the manager write lock before the entry moves to a
    /// retired snapshot slot.
    pub(crate) fn retire(&self, delete_backing: bool) {
        self.delete_backing.store(delete_backing, Ordering::Relaxed);
        self.active.store(false, Ordering::Release);
    }

    pub(crate) fn touch(&self) {
        self.hot.store(true, Ordering::Relaxed);
    }

    /// Clears the hotness hint, returning its previous value.
    pub(crate) fn take_hot(&self) -> bool {
        self.hot.swap(false, Ordering::Relaxed)
    }

    /// Final payload disposal: delete erases the persistent backing,
    /// close keeps it.
    pub(crate) fn dispose(&self) -> Result<()> {
        if self.delete_backing.load(Ordering::Relaxed) {
            self.filter.delete()
        } else {
            self.filter.close()
        }
    }
}
