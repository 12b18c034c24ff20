//! Runtime-plane configuration: the in-scope subset of settings the plane
//! reads from the environment. File-based configuration loading is the
//! CLI's concern and out of scope here (§1); these structs only fix the
//! *shape* such a loader would populate, and how to read it from plain
//! environment variables in the meantime.

use std::path::PathBuf;
use std::time::Duration;

/// Settings governing the Runtime Adapter's engine connection and the
/// Supervisor's stop/teardown timing.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Explicit engine socket path, overriding auto-discovery.
    pub socket_override: Option<PathBuf>,
    /// Grace period between SIGTERM and SIGKILL on stop.
    pub stop_grace: Duration,
    /// Liveness monitor poll interval.
    pub monitor_interval: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            socket_override: std::env::var_os("DOCKER_HOST").map(|v| {
                PathBuf::from(v.to_string_lossy().trim_start_matches("unix://").to_string())
            }),
            stop_grace: Duration::from_secs(30),
            monitor_interval: Duration::from_secs(5),
        }
    }
}

/// Settings governing the Protocol Bridge's channel sizing.
#[derive(Debug, Clone, Copy)]
pub struct BridgeConfig {
    /// Bound on the inbound (client->container) and outbound channels.
    pub channel_capacity: usize,
    /// Bound on the pre-connection pending-message buffer; drop-oldest once full.
    pub pending_buffer_cap: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 100,
            pending_buffer_cap: 100,
        }
    }
}
