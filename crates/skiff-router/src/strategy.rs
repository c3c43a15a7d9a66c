use std::sync::atomic::{AtomicUsize, Ordering};

/// A routable replica as seen by a selection strategy.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub replica_id: u32,
    pub inflight: u64,
}

/// Picks one replica among the `Ready` replicas of the active version.
/// The router filters (status, retry exclusions), the strategy only chooses.
pub trait SelectionStrategy: Send + Sync {
    /// Returns an index into `candidates`.
    fn select(&self, candidates: &[Candidate]) -> Option<usize>;

    fn name(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// LeastInflight: fewest requests currently in flight; ties go to the
// lowest replica id (default)
// ---------------------------------------------------------------------------

pub struct LeastInflight;

impl SelectionStrategy for LeastInflight {
    fn select(&self, candidates: &[Candidate]) -> Option<usize> {
        let mut best_idx: Option<usize> = None;
        let mut best_inflight = u64::MAX;

        for (i, c) in candidates.iter().enumerate() {
            if c.inflight < best_inflight {
                best_inflight = c.inflight;
                best_idx = Some(i);
            }
        }

        best_idx
    }

    fn name(&self) -> &'static str {
        "least_inflight"
    }
}

// ---------------------------------------------------------------------------
// RoundRobin: rotate through candidates regardless of load
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RoundRobin {
    next: AtomicUsize,
}

impl SelectionStrategy for RoundRobin {
    fn select(&self, candidates: &[Candidate]) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        Some(self.next.fetch_add(1, Ordering::Relaxed) % candidates.len())
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}

/// Parse a strategy name string into a boxed strategy.
pub fn parse_strategy(name: &str) -> Result<Box<dyn SelectionStrategy>, String> {
    match name {
        "least_inflight" => Ok(Box::new(LeastInflight)),
        "round_robin" => Ok(Box::new(RoundRobin::default())),
        other => Err(format!(
            "unknown selection strategy '{}', available: least_inflight, round_robin",
            other
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(replica_id: u32, inflight: u64) -> Candidate {
        Candidate {
            replica_id,
            inflight,
        }
    }

    #[test]
    fn test_least_inflight() {
        let candidates = vec![c(0, 4), c(1, 1), c(2, 3)];
        assert_eq!(LeastInflight.select(&candidates), Some(1));
    }

    #[test]
    fn test_least_inflight_tie_prefers_first() {
        let candidates = vec![c(0, 2), c(1, 2)];
        assert_eq!(LeastInflight.select(&candidates), Some(0));
        assert_eq!(LeastInflight.select(&[]), None);
    }

    #[test]
    fn test_round_robin_rotates() {
        let rr = RoundRobin::default();
        let candidates = vec![c(0, 9), c(1, 0), c(2, 0)];
        let picks: Vec<_> = (0..6).filter_map(|_| rr.select(&candidates)).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2]);
        assert_eq!(rr.select(&[]), None);
    }

    #[test]
    fn test_parse_strategy() {
        assert_eq!(parse_strategy("least_inflight").unwrap().name(), "least_inflight");
        assert_eq!(parse_strategy("round_robin").unwrap().name(), "round_robin");
        assert!(parse_strategy("random").is_err());
    }
}
