use std::time::Duration;

use serde::Deserialize;

/// Discovery engine configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    /// Broadcast and monitor sweep period in milliseconds
    /// Default: 3000 (3 seconds)
    #[serde(default = "default_scan_frequency_ms")]
    pub scan_frequency_ms: u64,
    /// Explicit age in milliseconds past which an Online console with no
    /// responses is marked Offline; overrides `timeout_attempts`
    #[serde(default)]
    pub disconnect_timeout_ms: Option<u64>,
    /// Missed sweeps tolerated before demotion when no explicit disconnect
    /// timeout is set
    /// Default: 2
    #[serde(default = "default_timeout_attempts")]
    pub timeout_attempts: u32,
    /// Evict Offline consoles on the sweep after their demotion
    /// Default: false
    #[serde(default)]
    pub remove_on_disconnect: bool,
    /// Begin scanning as part of `ConsoleScanner::launch`
    /// Default: false
    #[serde(default)]
    pub auto_start: bool,
    /// Additionally broadcast the XeDevkit probe alongside the jtag probe
    /// Default: false
    #[serde(default)]
    pub probe_devkit: bool,
    /// Always include the Internet-Connection-Sharing bridge subnet
    /// (192.168.137.0/24) among the broadcast targets
    /// Default: true
    #[serde(default = "default_true")]
    pub include_ics_bridge: bool,
    /// Poll period for network-topology re-enumeration in milliseconds
    /// Default: 10000 (10 seconds)
    #[serde(default = "default_topology_refresh_ms")]
    pub topology_refresh_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            scan_frequency_ms: default_scan_frequency_ms(),
            disconnect_timeout_ms: None,
            timeout_attempts: default_timeout_attempts(),
            remove_on_disconnect: false,
            auto_start: false,
            probe_devkit: false,
            include_ics_bridge: default_true(),
            topology_refresh_ms: default_topology_refresh_ms(),
        }
    }
}

impl ScanConfig {
    pub fn scan_frequency(&self) -> Duration {
        Duration::from_millis(self.scan_frequency_ms)
    }

    /// Resolved demotion age: the explicit value when set, otherwise
    /// `scan_frequency x timeout_attempts`.
    pub fn disconnect_timeout(&self) -> Duration {
        match self.disconnect_timeout_ms {
            Some(ms) => Duration::from_millis(ms),
            None => self.scan_frequency() * self.timeout_attempts,
        }
    }

    pub fn topology_refresh(&self) -> Duration {
        Duration::from_millis(self.topology_refresh_ms)
    }
}

fn default_scan_frequency_ms() -> u64 {
    3000
}

fn default_timeout_attempts() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

fn default_topology_refresh_ms() -> u64 {
    10000
}
