use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::time::Duration;

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Termination {
    /// Base time a process (or its group) is given to exit after the
    /// graceful signal. Also the fixed window of the single-PID fallback.
    /// **Measured in milliseconds**.
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub grace_period: Duration,

    /// Extra grace added for every member of the process group.
    /// **Measured in milliseconds**.
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub grace_per_member: Duration,

    /// Upper bound of the adaptive grace window. **Measured in
    /// milliseconds**.
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub grace_cap: Duration,

    /// Interval between liveness polls. **Measured in milliseconds**.
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub poll_interval: Duration,

    /// How long to wait after the force signal before declaring failure.
    /// **Measured in milliseconds**.
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub force_wait: Duration,

    /// Delay before the PID is looked at again to catch supervisors that
    /// restart what was just stopped. **Measured in milliseconds**.
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub respawn_check_delay: Duration,

    /// Overall bound for re-verifying a process identity before signalling.
    /// **Measured in milliseconds**.
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub verify_timeout: Duration,
}

impl Default for Termination {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(3),
            grace_per_member: Duration::from_millis(10),
            grace_cap: Duration::from_secs(30),
            poll_interval: Duration::from_millis(100),
            force_wait: Duration::from_millis(200),
            respawn_check_delay: Duration::from_millis(500),
            verify_timeout: Duration::from_secs(5),
        }
    }
}
