use std::time::Duration;

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// How long a draining replica may keep serving in-flight requests
    /// before it is stopped anyway.
    pub drain_grace: Duration,

    /// Start attempts per replica before giving up until the next health tick.
    pub start_retry_max: u32,

    /// Delay after the first failed start; doubles per attempt.
    pub start_backoff: Duration,

    /// Time a freshly started instance has to pass its first health check.
    pub ready_timeout: Duration,

    pub health_interval: Duration,

    /// Consecutive failed probes before a replica is marked unhealthy.
    pub unhealthy_threshold: u32,

    /// Consecutive failed probes before a replica is replaced.
    pub replace_threshold: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            drain_grace: Duration::from_secs(30),
            start_retry_max: 3,
            start_backoff: Duration::from_millis(500),
            ready_timeout: Duration::from_secs(60),
            health_interval: Duration::from_secs(5),
            unhealthy_threshold: 3,
            replace_threshold: 5,
        }
    }
}
