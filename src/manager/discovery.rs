use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::filter::{Filter, DATA_DIR_PREFIX};

use super::entry::FilterEntry;

/// One-shot startup scan of the data directory.
///
/// Subdirectories named `bloomd.<name>` are reopened with the manager
/// default config and enter the genesis map cold. A filter that fails to
/// open is logged and skipped; only a failing scan aborts startup. Runs
/// single-threaded, before the vacuum worker starts.
pub(crate) fn discover(config: &Config) -> Result<BTreeMap<String, Arc<FilterEntry>>> {
    fs::create_dir_all(&config.data_dir)?;
    let mut filters = BTreeMap::new();
    for dir_entry in fs::read_dir(&config.data_dir)? {
        let dir_entry = dir_entry?;
        if !dir_entry.file_type()?.is_dir() {
            continue;
        }
        let file_name = dir_entry.file_name();
        let Some(dir_name) = file_name.to_str() else {
            continue;
        };
        let Some(name) = dir_name.strip_prefix(DATA_DIR_PREFIX) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }
        match Filter::open(config.filter.clone(), name, Some(&config.data_dir)) {
            Ok(filter) => {
                debug!(filter = name, "manager.discovery.opened");
                filters.insert(
                    name.to_string(),
                    Arc::new(FilterEntry::new(filter, false)),
                );
            }
            Err(err) => {
                warn!(filter = name, error = %err, "manager.discovery.open_failed");
            }
        }
    }
    info!(count = filters.len(), "manager.discovery.completed");
    Ok(filters)
}
