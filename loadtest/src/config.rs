//! The YAML configuration surface of the harness.

use std::time::Duration;

use serde::Deserialize;

use crate::keyspace::KeySpacePolicy;
use crate::thresholds::Threshold;

/// The complete configuration of a run.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Base URL of the counter service.
    ///
    /// Can be overridden with the `ABACUS_BASE_URL` environment variable.
    pub remote: String,

    /// Namespace prefix for all counters touched by this run.
    ///
    /// A random per-run suffix is appended, so repeated runs against a
    /// persistent service do not collide.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Wall-clock duration of the load phase.
    ///
    /// The deadline stops dispatching new iterations; in-flight iterations
    /// are allowed to complete.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,

    /// The scheduling policy.
    pub schedule: Schedule,

    /// How counters are allocated to iterations.
    #[serde(default)]
    pub keyspace: KeySpaceConfig,

    /// Pass/fail criteria evaluated against the aggregated metrics.
    #[serde(default)]
    pub thresholds: Vec<Threshold>,
}

/// How iterations are produced over time.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum Schedule {
    /// A fixed pool of lanes, each repeating iterations back-to-back.
    ClosedLoop {
        /// Number of concurrent lanes.
        lanes: usize,
        /// Optional pause between consecutive iterations on a lane.
        #[serde(default, with = "humantime_serde")]
        think_time: Option<Duration>,
    },
    /// Iterations are dispatched at a fixed rate, independent of how long
    /// prior iterations take. When all lanes are busy, the iteration is
    /// dropped and counted, never queued.
    OpenLoop {
        /// Target dispatch rate in iterations per second.
        rate: u32,
        /// Size of the lane pool executing dispatched iterations.
        max_lanes: usize,
    },
}

/// Key-space policy and size.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct KeySpaceConfig {
    /// The allocation policy.
    #[serde(default)]
    pub policy: KeySpacePolicy,
    /// Size of the shared key pool under the narrow policy.
    #[serde(default = "default_key_space_size")]
    pub size: usize,
}

impl Default for KeySpaceConfig {
    fn default() -> Self {
        Self {
            policy: KeySpacePolicy::default(),
            size: default_key_space_size(),
        }
    }
}

fn default_prefix() -> String {
    "loadtest".to_owned()
}

fn default_key_space_size() -> usize {
    10
}
