#![allow(missing_docs)]

use std::time::Duration;

use bloomd::{Config, FilterConfig, FilterError, FilterManager, Result};
use tempfile::{tempdir, TempDir};

/// Long vacuum cadence so the background worker stays quiet; lifecycle
/// tests drive reclamation explicitly through `vacuum_now`.
fn test_config(dir: &TempDir) -> Config {
    Config {
        data_dir: dir.path().to_path_buf(),
        vacuum_interval: Duration::from_secs(60),
        filter: FilterConfig {
            initial_capacity: 1024,
            ..FilterConfig::default()
        },
    }
}

fn open_manager(dir: &TempDir) -> Result<FilterManager> {
    bloomd::logging::init("bloomd=warn");
    FilterManager::open(test_config(dir))
}

#[test]
fn startup_with_empty_data_dir() -> Result<()> {
    let dir = tempdir()?;
    let manager = open_manager(&dir)?;
    assert_eq!(manager.version(), 0);
    assert!(manager.list(None).is_empty());
    Ok(())
}

#[test]
fn create_set_check() -> Result<()> {
    let dir = tempdir()?;
    let manager = open_manager(&dir)?;
    manager.create("foo", None)?;

    let keys: [&[u8]; 3] = [b"a", b"b", b"a"];
    let mut results = [false; 3];
    manager.set_keys("foo", &keys, &mut results)?;
    assert_eq!(results, [true, true, false]);

    let probes: [&[u8]; 2] = [b"a", b"c"];
    let mut results = [false; 2];
    manager.check_keys("foo", &probes, &mut results)?;
    assert_eq!(results, [true, false]);
    Ok(())
}

#[test]
fn drop_then_create_waits_for_reclamation() -> Result<()> {
    let dir = tempdir()?;
    let manager = open_manager(&dir)?;
    manager.create("x", None)?;
    manager.drop_filter("x")?;

    assert!(matches!(
        manager.create("x", None),
        Err(FilterError::PendingDelete(_))
    ));

    manager.vacuum_now();
    assert!(
        !dir.path().join("bloomd.x").exists(),
        "dropped backing dir erased by reclamation"
    );
    manager.create("x", None)?;
    assert_eq!(manager.list(None), ["x"]);
    Ok(())
}

#[test]
fn list_honors_prefix() -> Result<()> {
    let dir = tempdir()?;
    let manager = open_manager(&dir)?;
    for name in ["ab", "ac", "bd"] {
        manager.create(name, None)?;
    }

    let mut prefixed = manager.list(Some("a"));
    prefixed.sort();
    assert_eq!(prefixed, ["ab", "ac"]);
    assert_eq!(manager.list(None).len(), 3);
    assert!(manager.list(Some("zz")).is_empty());
    Ok(())
}

#[test]
fn cold_scan_clears_hotness() -> Result<()> {
    let dir = tempdir()?;
    let manager = open_manager(&dir)?;
    manager.create("h", None)?;

    let probes: [&[u8]; 1] = [b"k"];
    let mut results = [false; 1];
    manager.check_keys("h", &probes, &mut results)?;

    // First scan sees the entry hot: it clears the flag and skips it.
    assert!(manager.list_cold().is_empty());
    // No traffic since, and the filter is resident, so now it is cold.
    assert_eq!(manager.list_cold(), ["h"]);
    Ok(())
}

#[test]
fn lookup_errors() -> Result<()> {
    let dir = tempdir()?;
    let manager = open_manager(&dir)?;
    let mut results = [false; 1];
    let probes: [&[u8]; 1] = [b"k"];

    assert!(matches!(
        manager.check_keys("ghost", &probes, &mut results),
        Err(FilterError::NotFound(_))
    ));
    assert!(matches!(
        manager.set_keys("ghost", &probes, &mut results),
        Err(FilterError::NotFound(_))
    ));
    assert!(matches!(
        manager.flush("ghost"),
        Err(FilterError::NotFound(_))
    ));
    assert!(matches!(
        manager.drop_filter("ghost"),
        Err(FilterError::NotFound(_))
    ));
    assert!(matches!(
        manager.unmap("ghost"),
        Err(FilterError::NotFound(_))
    ));
    assert!(matches!(
        manager.clear("ghost"),
        Err(FilterError::NotFound(_))
    ));

    manager.create("dup", None)?;
    assert!(matches!(
        manager.create("dup", None),
        Err(FilterError::AlreadyExists(_))
    ));
    assert!(matches!(
        manager.create("bad/name", None),
        Err(FilterError::InvalidName(_))
    ));
    Ok(())
}

#[test]
fn clear_requires_proxied_and_keeps_backing() -> Result<()> {
    let dir = tempdir()?;
    let manager = open_manager(&dir)?;
    manager.create("keep", None)?;
    let keys: [&[u8]; 1] = [b"payload"];
    let mut results = [false; 1];
    manager.set_keys("keep", &keys, &mut results)?;

    // Resident filters cannot be cleared.
    assert!(matches!(
        manager.clear("keep"),
        Err(FilterError::NotProxied(_))
    ));

    manager.unmap("keep")?;
    assert!(manager.inspect("keep", |_, filter| filter.is_proxied())?);
    manager.clear("keep")?;
    assert!(manager.list(None).is_empty());

    manager.vacuum_now();
    assert!(
        dir.path().join("bloomd.keep").is_dir(),
        "cleared filter keeps its on-disk image"
    );

    // Re-creating the name adopts the surviving image.
    manager.create("keep", None)?;
    manager.check_keys("keep", &keys, &mut results)?;
    assert_eq!(results, [true]);
    Ok(())
}

#[test]
fn unmap_is_a_noop_for_in_memory_filters() -> Result<()> {
    let dir = tempdir()?;
    let manager = open_manager(&dir)?;
    let config = FilterConfig {
        in_memory: true,
        initial_capacity: 64,
        ..FilterConfig::default()
    };
    manager.create("mem", Some(config))?;
    manager.unmap("mem")?;
    assert!(!manager.inspect("mem", |_, filter| filter.is_proxied())?);
    assert!(!dir.path().join("bloomd.mem").exists());
    Ok(())
}

#[test]
fn inspect_reads_stats_without_locking() -> Result<()> {
    let dir = tempdir()?;
    let manager = open_manager(&dir)?;
    let custom = FilterConfig {
        initial_capacity: 42,
        ..FilterConfig::default()
    };
    manager.create("stats", Some(custom))?;

    let keys: [&[u8]; 2] = [b"one", b"two"];
    let mut results = [false; 2];
    manager.set_keys("stats", &keys, &mut results)?;
    manager.check_keys("stats", &keys, &mut results)?;

    let (counters, capacity_hint) =
        manager.inspect("stats", |_, filter| (filter.counters(), filter.config().initial_capacity))?;
    assert_eq!(counters.sets, 2);
    assert_eq!(counters.set_hits, 2);
    assert_eq!(counters.checks, 2);
    assert_eq!(counters.check_hits, 2);
    assert_eq!(capacity_hint, 42);
    Ok(())
}

#[test]
fn filters_survive_restart() -> Result<()> {
    let dir = tempdir()?;
    let keys: [&[u8]; 2] = [b"alpha", b"gamma"];
    {
        let manager = open_manager(&dir)?;
        manager.create("kept", None)?;
        manager.create("doomed", None)?;
        let mut results = [false; 2];
        manager.set_keys("kept", &keys, &mut results)?;
        manager.drop_filter("doomed")?;
        manager.shutdown();
    }

    let manager = open_manager(&dir)?;
    assert_eq!(manager.version(), 0, "rediscovery starts a fresh chain");
    assert_eq!(manager.list(None), ["kept"]);

    let mut results = [false; 2];
    manager.check_keys("kept", &keys, &mut results)?;
    assert_eq!(results, [true, true]);
    Ok(())
}
