use std::io;
use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use super::ManagerInner;

/// Snapshot backlog beyond which a pass logs a warning: some client has
/// stopped checkpointing and versions are piling up.
pub(crate) const VERSION_WARN_THRESHOLD: u64 = 32;

pub(crate) enum VacuumMessage {
    Trigger,
    Shutdown,
}

/// Background reclaimer. Wakes at the configured cadence (or on a
/// [`VacuumMessage::Trigger`] nudge), runs one pass, and exits when told
/// to shut down.
pub(crate) struct VacuumWorker {
    sender: Sender<VacuumMessage>,
    handle: Option<thread::JoinHandle<()>>,
}

impl VacuumWorker {
    pub(crate) fn spawn(inner: Arc<ManagerInner>, interval: Duration) -> io::Result<VacuumWorker> {
        let (sender, receiver) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("bloomd-vacuum".to_string())
            .spawn(move || Self::run(inner, receiver, interval))?;
        Ok(VacuumWorker {
            sender,
            handle: Some(handle),
        })
    }

    fn run(inner: Arc<ManagerInner>, receiver: Receiver<VacuumMessage>, interval: Duration) {
        loop {
            if inner.shutdown.load(Ordering::Acquire) {
                break;
            }
            match receiver.recv_timeout(interval) {
                Ok(VacuumMessage::Trigger) | Err(RecvTimeoutError::Timeout) => {
                    inner.vacuum_pass(false);
                }
                Ok(VacuumMessage::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                    break;
                }
            }
        }
        debug!("manager.vacuum.worker_stopped");
    }

    pub(crate) fn trigger(&self) {
        let _ = self.sender.send(VacuumMessage::Trigger);
    }

    /// Stops the worker and joins it; the current pass (if any) finishes
    /// first.
    pub(crate) fn shutdown(mut self) {
        let _ = self.sender.send(VacuumMessage::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl ManagerInner {
    /// One reclamation pass.
    ///
    /// Computes the watermark (head version for a forced pass, otherwise
    /// the minimum checkpointed version), then under the vacuum-exclusion
    /// lock detaches every snapshot strictly older than it and disposes
    /// the retired entries those snapshots carry. Disposal errors are
    /// logged and swallowed.
    pub(crate) fn vacuum_pass(&self, force: bool) {
        let head = self.head();
        if head.predecessor().is_none() {
            return;
        }
        let min_vsn = if force {
            head.version()
        } else {
            self.clients.min_seen(head.version())
        };
        if head.version().saturating_sub(min_vsn) > VERSION_WARN_THRESHOLD {
            warn!(
                head = head.version(),
                min_seen = min_vsn,
                clients = self.clients.len(),
                "manager.vacuum.version_backlog"
            );
        }

        let _guard = self.vacuum_lock.lock();
        let mut cursor = head;
        let detached = loop {
            let Some(next) = cursor.predecessor() else {
                return;
            };
            if next.version() < min_vsn {
                break cursor.unlink_predecessor();
            }
            cursor = next;
        };

        let mut reclaimed = 0u64;
        let mut disposed = 0u64;
        let mut snapshot = detached;
        while let Some(current) = snapshot {
            if let Some(entry) = current.take_retired() {
                disposed += 1;
                if let Err(err) = entry.dispose() {
                    warn!(
                        filter = entry.filter().name(),
                        error = %err,
                        "manager.vacuum.dispose_failed"
                    );
                }
            }
            reclaimed += 1;
            snapshot = current.unlink_predecessor();
        }
        if reclaimed > 0 {
            debug!(
                reclaimed,
                disposed, min_vsn, "manager.vacuum.pass_completed"
            );
        }
    }
}
