use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use skiff_common::{now_ms, ReplicaInfo, ReplicaStatus};

use crate::host::InstanceHandle;

const STARTING: u8 = 0;
const READY: u8 = 1;
const UNHEALTHY: u8 = 2;
const DRAINING: u8 = 3;

fn decode(raw: u8) -> ReplicaStatus {
    match raw {
        STARTING => ReplicaStatus::Starting,
        READY => ReplicaStatus::Ready,
        UNHEALTHY => ReplicaStatus::Unhealthy,
        _ => ReplicaStatus::Draining,
    }
}

/// One running serving instance of a model version.
///
/// Routing admission and draining coordinate through `status` and
/// `inflight`, both accessed with `SeqCst`: the router increments
/// `inflight` and then re-checks `status`, the drainer stores `Draining`
/// and then reads `inflight`. Either the request sees `Draining` and backs
/// out, or the drainer sees the request and waits for it.
#[derive(Debug)]
pub struct Replica {
    pub model: String,
    pub version: String,
    pub id: u32,
    pub handle: InstanceHandle,
    /// Artifact generation of the pool this replica was started from.
    pub(crate) generation: u64,
    status: AtomicU8,
    inflight: AtomicU64,
    failed_probes: AtomicU32,
    started_at_ms: u64,
}

impl Replica {
    pub(crate) fn starting(
        model: &str,
        version: &str,
        id: u32,
        generation: u64,
        handle: InstanceHandle,
    ) -> Self {
        Self {
            model: model.to_string(),
            version: version.to_string(),
            id,
            handle,
            generation,
            status: AtomicU8::new(STARTING),
            inflight: AtomicU64::new(0),
            failed_probes: AtomicU32::new(0),
            started_at_ms: now_ms(),
        }
    }

    pub fn status(&self) -> ReplicaStatus {
        decode(self.status.load(Ordering::SeqCst))
    }

    pub fn inflight(&self) -> u64 {
        self.inflight.load(Ordering::SeqCst)
    }

    pub fn endpoint(&self) -> &str {
        &self.handle.endpoint
    }

    /// Admit one request. Returns `None` unless the replica is `Ready`.
    pub fn try_acquire(self: &Arc<Self>) -> Option<InflightGuard> {
        self.inflight.fetch_add(1, Ordering::SeqCst);
        if self.status.load(Ordering::SeqCst) == READY {
            Some(InflightGuard {
                replica: Arc::clone(self),
            })
        } else {
            self.inflight.fetch_sub(1, Ordering::SeqCst);
            None
        }
    }

    pub(crate) fn mark_ready(&self) -> bool {
        self.transition(STARTING, READY)
    }

    pub(crate) fn mark_unhealthy(&self) -> bool {
        self.transition(READY, UNHEALTHY)
    }

    pub(crate) fn mark_recovered(&self) -> bool {
        self.transition(UNHEALTHY, READY)
    }

    /// Stop admitting requests. Returns false if the replica was already
    /// draining.
    pub(crate) fn begin_drain(&self) -> bool {
        self.status.swap(DRAINING, Ordering::SeqCst) != DRAINING
    }

    /// Record a probe result and return the consecutive failure count.
    pub(crate) fn record_probe(&self, healthy: bool) -> u32 {
        if healthy {
            self.failed_probes.store(0, Ordering::Relaxed);
            0
        } else {
            self.failed_probes.fetch_add(1, Ordering::Relaxed) + 1
        }
    }

    fn transition(&self, from: u8, to: u8) -> bool {
        self.status
            .compare_exchange(from, to, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn info(&self) -> ReplicaInfo {
        ReplicaInfo {
            model: self.model.clone(),
            version: self.version.clone(),
            replica_id: self.id,
            instance_id: self.handle.instance_id.clone(),
            endpoint: self.handle.endpoint.clone(),
            status: self.status(),
            inflight: self.inflight(),
            started_at_ms: self.started_at_ms,
        }
    }
}

/// Held for the duration of one forwarded request.
#[derive(Debug)]
pub struct InflightGuard {
    replica: Arc<Replica>,
}

impl InflightGuard {
    pub fn replica(&self) -> &Arc<Replica> {
        &self.replica
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.replica.inflight.fetch_sub(1, Ordering::SeqCst);
    }
}
