//! Link counters.
//!
//! Owned by the link task and shared with handles through an `Arc`, so a
//! snapshot never waits behind an in-flight write.
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Counters {
    commands_sent: AtomicU64,
    commands_failed: AtomicU64,
    retries: AtomicU64,
    connect_attempts: AtomicU64,
    connects: AtomicU64,
    handshake_failures: AtomicU64,
    bytes_out: AtomicU64,
    bytes_in: AtomicU64,
}

#[derive(Debug, Clone, Default)]
pub struct LinkMetrics {
    inner: Arc<Counters>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub commands_sent: u64,
    pub commands_failed: u64,
    pub retries: u64,
    pub connect_attempts: u64,
    pub connects: u64,
    pub handshake_failures: u64,
    pub bytes_out: u64,
    pub bytes_in: u64,
}

impl LinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_commands_sent(&self) {
        self.inner.commands_sent.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_commands_failed(&self) {
        self.inner.commands_failed.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_retries(&self) {
        self.inner.retries.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_connect_attempts(&self) {
        self.inner.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_connects(&self) {
        self.inner.connects.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_handshake_failures(&self) {
        self.inner.handshake_failures.fetch_add(1, Ordering::Relaxed);
    }
    pub fn add_bytes_out(&self, n: usize) {
        self.inner.bytes_out.fetch_add(n as u64, Ordering::Relaxed);
    }
    pub fn add_bytes_in(&self, n: usize) {
        self.inner.bytes_in.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let c = &self.inner;
        MetricsSnapshot {
            commands_sent: c.commands_sent.load(Ordering::Relaxed),
            commands_failed: c.commands_failed.load(Ordering::Relaxed),
            retries: c.retries.load(Ordering::Relaxed),
            connect_attempts: c.connect_attempts.load(Ordering::Relaxed),
            connects: c.connects.load(Ordering::Relaxed),
            handshake_failures: c.handshake_failures.load(Ordering::Relaxed),
            bytes_out: c.bytes_out.load(Ordering::Relaxed),
            bytes_in: c.bytes_in.load(Ordering::Relaxed),
        }
    }
}
