//! The filter manager: a concurrent registry of named bloom filters.
//!
//! Lookups resolve against an immutable head snapshot and never block
//! namespace mutators; mutators serialize on a single write lock, publish
//! a successor snapshot, and leave removed entries on the superseded
//! snapshot for the vacuum to reclaim once every registered client has
//! checkpointed past it.

use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::config::{Config, FilterConfig};
use crate::error::{FilterError, Result};
use crate::filter::Filter;

mod clients;
mod discovery;
mod entry;
mod snapshot;
mod vacuum;

use clients::ClientRegistry;
use entry::FilterEntry;
use snapshot::Snapshot;
use vacuum::VacuumWorker;

/// Longest accepted filter name, in bytes.
pub const MAX_FILTER_NAME_LEN: usize = 200;

pub(crate) struct ManagerInner {
    config: Config,
    head: RwLock<Arc<Snapshot>>,
    /// Serializes namespace mutators (`create`, `drop_filter`, `clear`).
    write_lock: Mutex<()>,
    /// Keeps retired `deleted` slots alive while `create` scans them.
    /// Taken only while already holding `write_lock`, or alone.
    vacuum_lock: Mutex<()>,
    pub(crate) clients: ClientRegistry,
    pub(crate) shutdown: AtomicBool,
}

impl ManagerInner {
    pub(crate) fn head(&self) -> Arc<Snapshot> {
        Arc::clone(&self.head.read())
    }

    /// Installs a new head. Callers hold `write_lock`.
    fn publish(&self, snapshot: Arc<Snapshot>) {
        *self.head.write() = snapshot;
    }

    fn lookup_active(&self, name: &str) -> Result<Arc<FilterEntry>> {
        self.head()
            .lookup_active(name)
            .ok_or_else(|| FilterError::NotFound(name.to_string()))
    }

    /// End-of-life disposal: close every live filter, dispose retired
    /// entries along the chain, forget all clients. Errors are logged.
    fn teardown(&self) {
        let head = self.head();
        for (name, entry) in head.filters() {
            if let Err(err) = entry.filter().close() {
                warn!(filter = name.as_str(), error = %err, "manager.teardown.close_failed");
            }
        }
        let mut cursor = Some(head);
        while let Some(snapshot) = cursor {
            if let Some(entry) = snapshot.take_retired() {
                if let Err(err) = entry.dispose() {
                    warn!(
                        filter = entry.filter().name(),
                        error = %err,
                        "manager.teardown.dispose_failed"
                    );
                }
            }
            cursor = snapshot.unlink_predecessor();
        }
        self.clients.clear();
        info!("manager.teardown.completed");
    }
}

/// Public handle over the manager state and its vacuum worker.
pub struct FilterManager {
    inner: Arc<ManagerInner>,
    worker: Mutex<Option<VacuumWorker>>,
}

impl FilterManager {
    /// Discovers existing filters under `config.data_dir`, builds the
    /// genesis snapshot, and starts the vacuum worker.
    pub fn open(config: Config) -> Result<FilterManager> {
        let filters = discovery::discover(&config)?;
        let genesis = Snapshot::genesis(filters);
        let interval = config.vacuum_interval;
        let inner = Arc::new(ManagerInner {
            config,
            head: RwLock::new(genesis),
            write_lock: Mutex::new(()),
            vacuum_lock: Mutex::new(()),
            clients: ClientRegistry::default(),
            shutdown: AtomicBool::new(false),
        });
        let worker = VacuumWorker::spawn(Arc::clone(&inner), interval)?;
        Ok(FilterManager {
            inner,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Registers the calling thread (if new) and records the head version
    /// it has observed. Idempotent.
    pub fn checkpoint(&self) {
        let version = self.inner.head().version();
        self.inner
            .clients
            .checkpoint(thread::current().id(), version);
    }

    /// Removes the calling thread's registry record. Idempotent.
    pub fn leave(&self) {
        self.inner.clients.leave(thread::current().id());
    }

    /// Current head snapshot version.
    pub fn version(&self) -> u64 {
        self.inner.head().version()
    }

    /// Probes `keys` against the named filter, writing presence into
    /// `results` (zip-bounded: extra slots in either slice are ignored).
    /// Results before a failing index are retained.
    pub fn check_keys(&self, name: &str, keys: &[&[u8]], results: &mut [bool]) -> Result<()> {
        let entry = self.inner.lookup_active(name)?;
        entry.touch();
        entry.filter().contains_many(keys, results)
    }

    /// Inserts `keys` into the named filter; `results` gets `true` for
    /// keys that were newly added.
    pub fn set_keys(&self, name: &str, keys: &[&[u8]], results: &mut [bool]) -> Result<()> {
        let entry = self.inner.lookup_active(name)?;
        entry.touch();
        entry.filter().add_many(keys, results)
    }

    /// Persists the named filter. Takes no manager-level lock; the
    /// payload flush is safe alongside concurrent probes.
    pub fn flush(&self, name: &str) -> Result<()> {
        let entry = self.inner.lookup_active(name)?;
        entry.filter().flush()
    }

    /// Creates a new filter. Refused while the name exists on the head
    /// (active or not) or while a retired snapshot still carries a
    /// deletion for it.
    pub fn create(&self, name: &str, custom_config: Option<FilterConfig>) -> Result<()> {
        validate_name(name)?;
        let inner = &*self.inner;
        let _write = inner.write_lock.lock();
        let head = inner.head();
        if head.filters().contains_key(name) {
            return Err(FilterError::AlreadyExists(name.to_string()));
        }
        {
            // Lock order is fixed: write lock first, vacuum lock second.
            let _vacuum = inner.vacuum_lock.lock();
            let mut cursor = Some(Arc::clone(&head));
            while let Some(snapshot) = cursor {
                if let Some(entry) = snapshot.retired() {
                    if entry.filter().name() == name {
                        return Err(FilterError::PendingDelete(name.to_string()));
                    }
                }
                cursor = snapshot.predecessor();
            }
        }
        let config = custom_config.unwrap_or_else(|| inner.config.filter.clone());
        let filter = Filter::open(config, name, Some(&inner.config.data_dir))?;
        let mut filters = head.filters().clone();
        filters.insert(name.to_string(), Arc::new(FilterEntry::new(filter, true)));
        inner.publish(head.successor(filters));
        info!(filter = name, "manager.create.published");
        Ok(())
    }

    /// Removes the named filter; its persistent backing is erased when the
    /// retired entry is reclaimed.
    pub fn drop_filter(&self, name: &str) -> Result<()> {
        self.remove(name, true, false)?;
        info!(filter = name, "manager.drop.published");
        Ok(())
    }

    /// Removes the named filter from the namespace but keeps its on-disk
    /// image. Only proxied filters can be cleared.
    pub fn clear(&self, name: &str) -> Result<()> {
        self.remove(name, false, true)?;
        info!(filter = name, "manager.clear.published");
        Ok(())
    }

    fn remove(&self, name: &str, delete_backing: bool, require_proxied: bool) -> Result<()> {
        let inner = &*self.inner;
        let _write = inner.write_lock.lock();
        let head = inner.head();
        let entry = head
            .lookup_active(name)
            .ok_or_else(|| FilterError::NotFound(name.to_string()))?;
        if require_proxied && !entry.filter().is_proxied() {
            return Err(FilterError::NotProxied(name.to_string()));
        }
        entry.retire(delete_backing);
        let mut filters = head.filters().clone();
        filters.remove(name);
        head.retire_entry(entry);
        inner.publish(head.successor(filters));
        Ok(())
    }

    /// Pages the named filter out of memory, keeping its on-disk image.
    /// No-op for in-memory-only filters.
    pub fn unmap(&self, name: &str) -> Result<()> {
        let entry = self.inner.lookup_active(name)?;
        if entry.filter().in_memory_only() {
            return Ok(());
        }
        entry.filter().close()
    }

    /// Names of active filters, optionally restricted to a prefix, in
    /// lexicographic order.
    pub fn list(&self, prefix: Option<&str>) -> Vec<String> {
        let head = self.inner.head();
        let filters = head.filters();
        match prefix {
            Some(prefix) => filters
                .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
                .take_while(|(name, _)| name.starts_with(prefix))
                .filter(|(_, entry)| entry.is_active())
                .map(|(name, _)| name.clone())
                .collect(),
            None => filters
                .iter()
                .filter(|(_, entry)| entry.is_active())
                .map(|(name, _)| name.clone())
                .collect(),
        }
    }

    /// Names of filters that saw no traffic since the previous cold scan
    /// and are not proxied. Clears the hotness hint of every hot entry it
    /// examines.
    pub fn list_cold(&self) -> Vec<String> {
        let head = self.inner.head();
        let mut cold = Vec::new();
        for (name, entry) in head.filters() {
            if entry.take_hot() {
                continue;
            }
            if entry.filter().is_proxied() {
                continue;
            }
            cold.push(name.clone());
        }
        cold
    }

    /// Runs `f` with the named filter's payload handle for out-of-band
    /// reads (stats, config). No per-filter lock is taken; `f` must not
    /// mutate filter state.
    pub fn inspect<R>(&self, name: &str, f: impl FnOnce(&str, &Filter) -> R) -> Result<R> {
        let entry = self.inner.lookup_active(name)?;
        Ok(f(name, entry.filter()))
    }

    /// Forces reclamation of every snapshot older than the current head,
    /// bypassing the checkpoint watermark. Only safe while no workers are
    /// navigating older snapshots.
    pub fn vacuum_now(&self) {
        self.inner.vacuum_pass(true);
    }

    /// Nudges the background worker to run a pass ahead of its cadence.
    pub fn trigger_vacuum(&self) {
        if let Some(worker) = self.worker.lock().as_ref() {
            worker.trigger();
        }
    }

    /// Stops the vacuum worker and disposes all filters and snapshots.
    /// Runs at most once; `Drop` calls it as well.
    pub fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(worker) = self.worker.lock().take() {
            worker.shutdown();
        }
        self.inner.teardown();
    }
}

impl Drop for FilterManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.len() > MAX_FILTER_NAME_LEN
        || name.bytes().any(|b| b == b'/' || b == b'\\' || b == 0)
    {
        return Err(FilterError::InvalidName(name.to_string()));
    }
    Ok(())
}
