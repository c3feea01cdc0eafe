use std::thread::ThreadId;

use parking_lot::Mutex;

struct ClientRecord {
    id: ThreadId,
    last_seen: u64,
}

/// Registered workers and the newest snapshot version each has observed.
///
/// The set is small (one record per worker thread) and churn is low, so a
/// mutex over a plain vector is enough; parking_lot spins before parking.
#[derive(Default)]
pub(crate) struct ClientRegistry {
    records: Mutex<Vec<ClientRecord>>,
}

impl ClientRegistry {
    /// Records that `id` has observed `version`, registering it first if
    /// needed. Idempotent.
    pub(crate) fn checkpoint(&self, id: ThreadId, version: u64) {
        let mut records = self.records.lock();
        if let Some(record) = records.iter_mut().find(|record| record.id == id) {
            record.last_seen = version;
        } else {
            records.push(ClientRecord {
                id,
                last_seen: version,
            });
        }
    }

    /// Removes `id`'s record if present. Idempotent.
    pub(crate) fn leave(&self, id: ThreadId) {
        self.records.lock().retain(|record| record.id != id);
    }

    /// The reclamation watermark: the smallest version any registered
    /// client may still be observing, capped by `floor` (the head version).
    pub(crate) fn min_seen(&self, floor: u64) -> u64 {
        self.records
            .lock()
            .iter()
            .fold(floor, |min, record| min.min(record.last_seen))
    }

    pub(crate) fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub(crate) fn clear(&self) {
        self.records.lock().clear();
    }
}
