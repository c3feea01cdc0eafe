//! Persistent, proxyable bloom-filter payloads.
//!
//! A [`Filter`] owns a [`ScalableBloom`] behind a reader/writer lock. The
//! resident state may be dropped to disk ("proxied") and faulted back in on
//! the next probe, so a cold filter costs no memory beyond its handle.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::FilterConfig;
use crate::error::{FilterError, Result};

mod sbf;

use sbf::ScalableBloom;

/// Directory prefix for filter backing dirs inside the data directory.
pub(crate) const DATA_DIR_PREFIX: &str = "bloomd.";

const DATA_FILE: &str = "data.snap";
const CONFIG_FILE: &str = "config.json";
const SNAP_MAGIC: u32 = 0x424c_4d31; // "BLM1"

#[derive(Default)]
pub(crate) struct FilterCounters {
    checks: AtomicU64,
    check_hits: AtomicU64,
    sets: AtomicU64,
    set_hits: AtomicU64,
    page_ins: AtomicU64,
    page_outs: AtomicU64,
}

/// Point-in-time copy of a filter's operation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub checks: u64,
    pub check_hits: u64,
    pub sets: u64,
    pub set_hits: u64,
    pub page_ins: u64,
    pub page_outs: u64,
}

/// A named bloom filter with optional on-disk backing.
///
/// All probe and insert traffic serializes through the internal
/// reader/writer lock; everything else (name, config, stats, proxy state)
/// is readable without it.
pub struct Filter {
    name: String,
    dir: Option<PathBuf>,
    config: FilterConfig,
    proxied: AtomicBool,
    size: AtomicU64,
    capacity: AtomicU64,
    flush_seq: AtomicU64,
    counters: FilterCounters,
    core: RwLock<Option<ScalableBloom>>,
}

impl Filter {
    /// Opens (or creates) the filter named `name`.
    ///
    /// Backed filters live in `<data_dir>/bloomd.<name>`. Reopening an
    /// existing directory uses the `config.json` stored there and starts
    /// proxied when a data snapshot is present. In-memory configs ignore
    /// `data_dir` entirely.
    pub fn open(config: FilterConfig, name: &str, data_dir: Option<&Path>) -> Result<Filter> {
        let dir = if config.in_memory {
            None
        } else {
            data_dir.map(|base| base.join(format!("{DATA_DIR_PREFIX}{name}")))
        };

        let (effective, resident) = match &dir {
            Some(dir) if dir.is_dir() => {
                let stored = Self::read_or_seed_config(dir, &config)?;
                if dir.join(DATA_FILE).is_file() {
                    (stored, None)
                } else {
                    let core = ScalableBloom::new(&stored);
                    (stored, Some(core))
                }
            }
            Some(dir) => {
                fs::create_dir_all(dir)?;
                Self::write_config(dir, &config)?;
                let core = ScalableBloom::new(&config);
                (config, Some(core))
            }
            None => {
                let core = ScalableBloom::new(&config);
                (config, Some(core))
            }
        };

        let filter = Filter {
            name: name.to_string(),
            dir,
            proxied: AtomicBool::new(resident.is_none()),
            size: AtomicU64::new(0),
            capacity: AtomicU64::new(0),
            flush_seq: AtomicU64::new(0),
            counters: FilterCounters::default(),
            config: effective,
            core: RwLock::new(resident),
        };
        if let Some(core) = filter.core.read().as_ref() {
            filter.refresh_gauges(core);
        }
        Ok(filter)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// `true` when the filter's data currently lives only on disk.
    pub fn is_proxied(&self) -> bool {
        self.proxied.load(Ordering::Acquire)
    }

    /// `true` when the filter has no on-disk backing at all.
    pub fn in_memory_only(&self) -> bool {
        self.dir.is_none()
    }

    /// Number of keys stored, as of the last insert or fault-in.
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Relaxed)
    }

    /// Total key capacity across layers, as of the last insert or fault-in.
    pub fn capacity(&self) -> u64 {
        self.capacity.load(Ordering::Relaxed)
    }

    pub fn counters(&self) -> CounterSnapshot {
        CounterSnapshot {
            checks: self.counters.checks.load(Ordering::Relaxed),
            check_hits: self.counters.check_hits.load(Ordering::Relaxed),
            sets: self.counters.sets.load(Ordering::Relaxed),
            set_hits: self.counters.set_hits.load(Ordering::Relaxed),
            page_ins: self.counters.page_ins.load(Ordering::Relaxed),
            page_outs: self.counters.page_outs.load(Ordering::Relaxed),
        }
    }

    /// Probes every key, writing presence into `results` (zip-bounded).
    /// Holds the lock in shared mode for the whole batch, faulting the
    /// filter in first when proxied.
    pub fn contains_many(&self, keys: &[&[u8]], results: &mut [bool]) -> Result<()> {
        let core = self.read_resident()?;
        self.counters
            .checks
            .fetch_add(keys.len() as u64, Ordering::Relaxed);
        let mut hits = 0u64;
        for (key, slot) in keys.iter().zip(results.iter_mut()) {
            let hit = core.contains(key);
            hits += hit as u64;
            *slot = hit;
        }
        self.counters.check_hits.fetch_add(hits, Ordering::Relaxed);
        Ok(())
    }

    /// Inserts every key, writing `true` into `results` for keys that were
    /// newly added. Holds the lock exclusively for the whole batch.
    pub fn add_many(&self, keys: &[&[u8]], results: &mut [bool]) -> Result<()> {
        let mut guard = self.core.write();
        let core = self.resident_mut(&mut guard)?;
        self.counters
            .sets
            .fetch_add(keys.len() as u64, Ordering::Relaxed);
        let mut added = 0u64;
        for (key, slot) in keys.iter().zip(results.iter_mut()) {
            let newly = core.add(key);
            added += newly as u64;
            *slot = newly;
        }
        self.counters.set_hits.fetch_add(added, Ordering::Relaxed);
        let (size, capacity) = (core.size(), core.capacity());
        self.size.store(size, Ordering::Relaxed);
        self.capacity.store(capacity, Ordering::Relaxed);
        Ok(())
    }

    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        let mut out = [false];
        self.contains_many(&[key], &mut out)?;
        Ok(out[0])
    }

    pub fn add(&self, key: &[u8]) -> Result<bool> {
        let mut out = [false];
        self.add_many(&[key], &mut out)?;
        Ok(out[0])
    }

    /// Persists the resident state. Runs under shared access, so it is
    /// concurrent with probes and other flushes and excluded only from
    /// inserts. No-op for proxied or in-memory filters.
    pub fn flush(&self) -> Result<()> {
        let guard = self.core.read();
        let (Some(core), Some(dir)) = (guard.as_ref(), self.dir.as_ref()) else {
            return Ok(());
        };
        self.write_snapshot(dir, core)
    }

    /// Persists and drops the resident state, leaving the filter proxied.
    /// No-op when already proxied.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.core.write();
        let Some(core) = guard.take() else {
            return Ok(());
        };
        if let Some(dir) = &self.dir {
            if let Err(err) = self.write_snapshot(dir, &core) {
                *guard = Some(core);
                return Err(err);
            }
        }
        self.proxied.store(true, Ordering::Release);
        self.counters.page_outs.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Drops the resident state and erases the on-disk backing.
    pub fn delete(&self) -> Result<()> {
        let mut guard = self.core.write();
        *guard = None;
        self.proxied.store(true, Ordering::Release);
        if let Some(dir) = &self.dir {
            if dir.exists() {
                fs::remove_dir_all(dir)?;
            }
        }
        Ok(())
    }

    fn refresh_gauges(&self, core: &ScalableBloom) {
        self.size.store(core.size(), Ordering::Relaxed);
        self.capacity.store(core.capacity(), Ordering::Relaxed);
    }

    fn read_resident(&self) -> Result<MappedRwLockReadGuard<'_, ScalableBloom>> {
        let guard = self.core.read();
        let guard = if guard.is_some() {
            guard
        } else {
            drop(guard);
            let mut write = self.core.write();
            self.resident_mut(&mut write)?;
            RwLockWriteGuard::downgrade(write)
        };
        Ok(RwLockReadGuard::map(guard, |core| {
            core.as_ref().expect("resident under read guard")
        }))
    }

    fn resident_mut<'a>(
        &self,
        guard: &'a mut RwLockWriteGuard<'_, Option<ScalableBloom>>,
    ) -> Result<&'a mut ScalableBloom> {
        if guard.is_none() {
            let core = self.load_core()?;
            self.refresh_gauges(&core);
            **guard = Some(core);
            self.counters.page_ins.fetch_add(1, Ordering::Relaxed);
            self.proxied.store(false, Ordering::Release);
        }
        Ok(guard.as_mut().expect("resident after fault-in"))
    }

    fn load_core(&self) -> Result<ScalableBloom> {
        let Some(dir) = &self.dir else {
            return Ok(ScalableBloom::new(&self.config));
        };
        let path = dir.join(DATA_FILE);
        if !path.is_file() {
            return Ok(ScalableBloom::new(&self.config));
        }
        let bytes = fs::read(&path)?;
        if bytes.len() < 8 {
            return Err(FilterError::Corruption("filter snapshot truncated"));
        }
        let (magic, rest) = bytes.split_at(4);
        if magic != SNAP_MAGIC.to_be_bytes().as_slice() {
            return Err(FilterError::Corruption("filter snapshot magic mismatch"));
        }
        let (payload, crc_bytes) = rest.split_at(rest.len() - 4);
        let crc = u32::from_be_bytes(crc_bytes.try_into().unwrap());
        if crc32fast::hash(payload) != crc {
            return Err(FilterError::Corruption("filter snapshot checksum mismatch"));
        }
        ScalableBloom::decode(payload, &self.config)
    }

    fn write_snapshot(&self, dir: &Path, core: &ScalableBloom) -> Result<()> {
        let mut payload = Vec::with_capacity(core.byte_size() as usize + 64);
        core.encode_into(&mut payload);
        let seq = self.flush_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = dir.join(format!("{DATA_FILE}.{seq}.tmp"));
        let mut file = File::create(&tmp)?;
        file.write_all(&SNAP_MAGIC.to_be_bytes())?;
        file.write_all(&payload)?;
        file.write_all(&crc32fast::hash(&payload).to_be_bytes())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, dir.join(DATA_FILE))?;
        Ok(())
    }

    fn read_or_seed_config(dir: &Path, fallback: &FilterConfig) -> Result<FilterConfig> {
        let path = dir.join(CONFIG_FILE);
        if !path.is_file() {
            Self::write_config(dir, fallback)?;
            return Ok(fallback.clone());
        }
        let bytes = fs::read(&path)?;
        serde_json::from_slice(&bytes)
            .map_err(|err| FilterError::Internal(format!("filter config unreadable: {err}")))
    }

    fn write_config(dir: &Path, config: &FilterConfig) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(config)
            .map_err(|err| FilterError::Internal(format!("filter config unwritable: {err}")))?;
        fs::write(dir.join(CONFIG_FILE), bytes)?;
        Ok(())
    }
}
