#![allow(missing_docs)]

use std::time::{Duration, Instant};

use bloomd::{Config, FilterConfig, FilterError, FilterManager, Result};
use tempfile::{tempdir, TempDir};

fn manager_with_interval(dir: &TempDir, vacuum_interval: Duration) -> Result<FilterManager> {
    bloomd::logging::init("bloomd=warn");
    FilterManager::open(Config {
        data_dir: dir.path().to_path_buf(),
        vacuum_interval,
        filter: FilterConfig {
            initial_capacity: 256,
            ..FilterConfig::default()
        },
    })
}

/// Polls `create(name)` until the vacuum has reclaimed the retired
/// deletion blocking it.
fn wait_for_recreate(manager: &FilterManager, name: &str, deadline: Duration) {
    let deadline = Instant::now() + deadline;
    loop {
        match manager.create(name, None) {
            Ok(()) => return,
            Err(FilterError::PendingDelete(_)) if Instant::now() < deadline => {
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(err) => panic!("create({name}) never unblocked: {err}"),
        }
    }
}

#[test]
fn timer_pass_reclaims_retired_snapshots() -> Result<()> {
    let dir = tempdir()?;
    let manager = manager_with_interval(&dir, Duration::from_millis(25))?;
    manager.create("x", None)?;
    manager.drop_filter("x")?;

    // No clients are registered, so the next timer pass reclaims the
    // retired snapshot and the backing directory with it.
    wait_for_recreate(&manager, "x", Duration::from_secs(5));
    assert_eq!(manager.list(None), ["x"]);
    Ok(())
}

#[test]
fn trigger_runs_a_pass_ahead_of_the_timer() -> Result<()> {
    let dir = tempdir()?;
    let manager = manager_with_interval(&dir, Duration::from_secs(60))?;
    manager.create("y", None)?;
    manager.drop_filter("y")?;
    assert!(matches!(
        manager.create("y", None),
        Err(FilterError::PendingDelete(_))
    ));

    manager.trigger_vacuum();
    wait_for_recreate(&manager, "y", Duration::from_secs(5));
    Ok(())
}

#[test]
fn forced_pass_runs_on_the_caller() -> Result<()> {
    let dir = tempdir()?;
    let manager = manager_with_interval(&dir, Duration::from_secs(60))?;
    for i in 0..3 {
        let name = format!("f{i}");
        manager.create(&name, None)?;
        manager.drop_filter(&name)?;
    }

    manager.vacuum_now();
    // Synchronous: no polling needed.
    for i in 0..3 {
        manager.create(&format!("f{i}"), None)?;
    }
    Ok(())
}

#[test]
fn shutdown_stops_the_worker_promptly() -> Result<()> {
    let dir = tempdir()?;
    let manager = manager_with_interval(&dir, Duration::from_secs(60))?;
    manager.create("z", None)?;

    // Join must not wait out the 60s cadence.
    let started = Instant::now();
    manager.shutdown();
    assert!(started.elapsed() < Duration::from_secs(5));
    Ok(())
}
