// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Link counters.
//!
//! Updated lock-free by the workers and the reconnect controller; read with
//! [`LinkStats::snapshot`].
//!
//! ```
//! use hdds_udplink::LinkStats;
//!
//! let stats = LinkStats::new();
//! stats.record_sent(64);
//! assert_eq!(stats.snapshot().datagrams_sent, 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by every worker generation of one link.
#[derive(Debug, Default)]
pub struct LinkStats {
    // Traffic
    datagrams_sent: AtomicU64,
    datagrams_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,

    // Codec
    encode_failures: AtomicU64,
    decode_failures: AtomicU64,

    // Transport
    send_faults: AtomicU64,
    recv_faults: AtomicU64,

    // Overwrite-on-full events
    outbound_resets: AtomicU64,
    inbound_resets: AtomicU64,

    // Reconnect controller
    reconnect_attempts: AtomicU64,
    reconnect_failures: AtomicU64,
}

impl LinkStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&self, bytes: usize) {
        self.datagrams_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_received(&self, bytes: usize) {
        self.datagrams_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_encode_failure(&self) {
        self.encode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send_fault(&self) {
        self.send_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_recv_fault(&self) {
        self.recv_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outbound_reset(&self) {
        self.outbound_resets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inbound_reset(&self) {
        self.inbound_resets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect_attempt(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect_failure(&self) {
        self.reconnect_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> LinkStatsSnapshot {
        LinkStatsSnapshot {
            datagrams_sent: self.datagrams_sent.load(Ordering::Relaxed),
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            send_faults: self.send_faults.load(Ordering::Relaxed),
            recv_faults: self.recv_faults.load(Ordering::Relaxed),
            outbound_resets: self.outbound_resets.load(Ordering::Relaxed),
            inbound_resets: self.inbound_resets.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            reconnect_failures: self.reconnect_failures.load(Ordering::Relaxed),
        }
    }
}

/// Copy of [`LinkStats`] at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStatsSnapshot {
    pub datagrams_sent: u64,
    pub datagrams_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub encode_failures: u64,
    pub decode_failures: u64,
    pub send_faults: u64,
    pub recv_faults: u64,
    pub outbound_resets: u64,
    pub inbound_resets: u64,
    pub reconnect_attempts: u64,
    pub reconnect_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_records() {
        let stats = LinkStats::new();
        stats.record_sent(10);
        stats.record_sent(20);
        stats.record_received(5);
        stats.record_decode_failure();
        stats.record_inbound_reset();
        stats.record_reconnect_attempt();

        let snap = stats.snapshot();
        assert_eq!(snap.datagrams_sent, 2);
        assert_eq!(snap.bytes_sent, 30);
        assert_eq!(snap.datagrams_received, 1);
        assert_eq!(snap.bytes_received, 5);
        assert_eq!(snap.decode_failures, 1);
        assert_eq!(snap.inbound_resets, 1);
        assert_eq!(snap.reconnect_attempts, 1);
        assert_eq!(snap.send_faults, 0);
    }
}
