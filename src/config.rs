use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning applied to a single filter. Filters created without a custom
/// config inherit the manager default; the effective config is persisted
/// next to the filter data so it survives restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Expected number of keys in the first filter layer.
    pub initial_capacity: u64,
    /// Target false-positive rate across the whole filter.
    pub false_positive_rate: f64,
    /// Capacity multiplier applied to each additional layer.
    pub scale_size: u32,
    /// False-positive tightening factor applied to each additional layer.
    pub probability_reduction: f64,
    /// When `true` the filter has no on-disk backing at all.
    pub in_memory: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 100_000,
            false_positive_rate: 1e-4,
            scale_size: 4,
            probability_reduction: 0.9,
            in_memory: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding one `bloomd.<name>` subdirectory per filter.
    pub data_dir: PathBuf,
    /// Cadence of the background vacuum pass.
    pub vacuum_interval: Duration,
    /// Default tuning for filters created without a custom config.
    pub filter: FilterConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/tmp/bloomd"),
            vacuum_interval: Duration::from_secs(1),
            filter: FilterConfig::default(),
        }
    }
}
