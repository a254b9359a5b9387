use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::time::Duration;

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Scan {
    /// Upper bound for a single listener query on one port. A tool that
    /// hangs past this is killed and the port is reported as timed out.
    /// **Measured in milliseconds**.
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub probe_timeout: Duration,

    /// Upper bound for every individual process-detail query (command line,
    /// owner, start time, working directory). **Measured in milliseconds**.
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub resolve_timeout: Duration,

    /// Wall-clock ceiling for the whole scan, independent of the per-probe
    /// limits. **Measured in milliseconds**.
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub scan_timeout: Duration,

    /// Number of ports probed concurrently.
    ///
    /// ## Note
    ///
    /// When unset, twice the available parallelism is used, capped at 20.
    pub max_workers: Option<usize>,
}

impl Default for Scan {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(5),
            resolve_timeout: Duration::from_secs(2),
            scan_timeout: Duration::from_secs(30),
            max_workers: None,
        }
    }
}
