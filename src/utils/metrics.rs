//! Observability and Metrics
//!
//! Counters for link lifecycles, handshakes and request traffic.
//!
//! Uses atomic counters for thread-safe metrics collection. One instance is
//! shared by every link created from the same [`LinkContext`](crate::link::LinkContext).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug)]
pub struct Metrics {
    /// Total links attached to a channel
    pub links_total: AtomicU64,
    /// Links not yet closed
    pub links_active: AtomicU64,
    /// Handshake headers received
    pub handshakes_total: AtomicU64,
    /// Handshakes that resolved a service
    pub handshakes_success: AtomicU64,
    /// Handshakes refused with a header error
    pub handshakes_failed: AtomicU64,
    /// Probe connections answered
    pub probes: AtomicU64,
    /// Request bodies handed to services
    pub requests_received: AtomicU64,
    /// Success envelopes written
    pub responses_ok: AtomicU64,
    /// Failure envelopes written
    pub responses_failed: AtomicU64,
    /// Request bytes received
    pub bytes_received: AtomicU64,
    /// Envelope bytes written
    pub bytes_sent: AtomicU64,
    /// Links dropped for an oversized length prefix
    pub frames_rejected: AtomicU64,
    /// Connections refused or failed at the transport
    pub connection_errors: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            links_total: AtomicU64::new(0),
            links_active: AtomicU64::new(0),
            handshakes_total: AtomicU64::new(0),
            handshakes_success: AtomicU64::new(0),
            handshakes_failed: AtomicU64::new(0),
            probes: AtomicU64::new(0),
            requests_received: AtomicU64::new(0),
            responses_ok: AtomicU64::new(0),
            responses_failed: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            frames_rejected: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn link_attached(&self) {
        self.links_total.fetch_add(1, Ordering::Relaxed);
        self.links_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn link_closed(&self) {
        self.links_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn handshake_attempt(&self) {
        self.handshakes_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handshake_success(&self) {
        self.handshakes_success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handshake_failed(&self) {
        self.handshakes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn probe(&self) {
        self.probes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_received(&self, byte_count: u64) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn response_sent(&self, ok: bool, byte_count: u64) {
        if ok {
            self.responses_ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.responses_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn frame_rejected(&self) {
        self.frames_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            links_total: self.links_total.load(Ordering::Relaxed),
            links_active: self.links_active.load(Ordering::Relaxed),
            handshakes_total: self.handshakes_total.load(Ordering::Relaxed),
            handshakes_success: self.handshakes_success.load(Ordering::Relaxed),
            handshakes_failed: self.handshakes_failed.load(Ordering::Relaxed),
            probes: self.probes.load(Ordering::Relaxed),
            requests_received: self.requests_received.load(Ordering::Relaxed),
            responses_ok: self.responses_ok.load(Ordering::Relaxed),
            responses_failed: self.responses_failed.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            links_total = snapshot.links_total,
            links_active = snapshot.links_active,
            handshakes_total = snapshot.handshakes_total,
            handshakes_success = snapshot.handshakes_success,
            handshakes_failed = snapshot.handshakes_failed,
            probes = snapshot.probes,
            requests_received = snapshot.requests_received,
            responses_ok = snapshot.responses_ok,
            responses_failed = snapshot.responses_failed,
            bytes_received = snapshot.bytes_received,
            bytes_sent = snapshot.bytes_sent,
            frames_rejected = snapshot.frames_rejected,
            connection_errors = snapshot.connection_errors,
            uptime_seconds = snapshot.uptime_seconds,
            "Service link metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub links_total: u64,
    pub links_active: u64,
    pub handshakes_total: u64,
    pub handshakes_success: u64,
    pub handshakes_failed: u64,
    pub probes: u64,
    pub requests_received: u64,
    pub responses_ok: u64,
    pub responses_failed: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub frames_rejected: u64,
    pub connection_errors: u64,
    pub uptime_seconds: u64,
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_us = duration.as_micros() as u64,
            "Operation completed"
        );
    }
}
