use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct RouterMetrics {
    pub predictions_total: AtomicU64,
    /// Responses that carried the application's default output.
    pub defaults_total: AtomicU64,
    pub invalid_input_total: AtomicU64,
    /// Replica calls retried on another replica.
    pub retries_total: AtomicU64,
    routing_errors: DashMap<&'static str, u64>,
}

impl RouterMetrics {
    pub fn record_routing_error(&self, cause: &'static str) {
        *self.routing_errors.entry(cause).or_insert(0) += 1;
    }

    pub fn routing_errors(&self, cause: &str) -> u64 {
        self.routing_errors.get(cause).map(|v| *v).unwrap_or(0)
    }

    pub fn render(&self, out: &mut String) {
        for (name, help, value) in [
            (
                "skiff_predictions_total",
                "Prediction queries handled.",
                &self.predictions_total,
            ),
            (
                "skiff_default_responses_total",
                "Queries answered with the default output.",
                &self.defaults_total,
            ),
            (
                "skiff_invalid_input_total",
                "Queries rejected for invalid input.",
                &self.invalid_input_total,
            ),
            (
                "skiff_replica_retries_total",
                "Replica calls retried on another replica.",
                &self.retries_total,
            ),
        ] {
            let _ = write!(
                out,
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {}\n",
                value.load(Ordering::Relaxed)
            );
        }

        let mut causes: Vec<(&'static str, u64)> = self
            .routing_errors
            .iter()
            .map(|e| (*e.key(), *e.value()))
            .collect();
        causes.sort();
        out.push_str(
            "# HELP skiff_routing_errors_total Routing errors masked by the default output.\n\
             # TYPE skiff_routing_errors_total counter\n",
        );
        for (cause, n) in causes {
            let _ = writeln!(out, "skiff_routing_errors_total{{cause=\"{cause}\"}} {n}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_errors_by_cause() {
        let m = RouterMetrics::default();
        m.record_routing_error("no_link");
        m.record_routing_error("no_link");
        m.record_routing_error("slo_exceeded");
        assert_eq!(m.routing_errors("no_link"), 2);
        assert_eq!(m.routing_errors("upstream"), 0);

        let mut out = String::new();
        m.render(&mut out);
        assert!(out.contains("skiff_routing_errors_total{cause=\"no_link\"} 2\n"));
        assert!(out.contains("skiff_routing_errors_total{cause=\"slo_exceeded\"} 1\n"));
    }
}
