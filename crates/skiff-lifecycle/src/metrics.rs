use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct LifecycleMetrics {
    /// Replicas that passed their first health check.
    pub replicas_started: AtomicU64,
    pub replicas_stopped: AtomicU64,
    /// Replica starts that failed after all retries.
    pub start_failures: AtomicU64,
    pub health_check_failures: AtomicU64,
}

impl LifecycleMetrics {
    /// Append the counters in Prometheus text exposition format.
    pub fn render(&self, out: &mut String) {
        for (name, help, value) in [
            (
                "skiff_replicas_started_total",
                "Replicas started and ready.",
                &self.replicas_started,
            ),
            (
                "skiff_replicas_stopped_total",
                "Replicas stopped.",
                &self.replicas_stopped,
            ),
            (
                "skiff_replica_start_failures_total",
                "Replica starts that failed after all retries.",
                &self.start_failures,
            ),
            (
                "skiff_health_check_failures_total",
                "Failed replica health probes.",
                &self.health_check_failures,
            ),
        ] {
            let _ = write!(
                out,
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {}\n",
                value.load(Ordering::Relaxed)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let m = LifecycleMetrics::default();
        m.replicas_started.fetch_add(2, Ordering::Relaxed);
        let mut out = String::new();
        m.render(&mut out);
        assert!(out.contains("skiff_replicas_started_total 2\n"));
        assert!(out.contains("# TYPE skiff_health_check_failures_total counter\n"));
    }
}
