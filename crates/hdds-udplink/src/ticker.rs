// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Background liveness driver.
//!
//! Hosts without a frame loop can hand the periodic [`UdpLink::tick`] to a
//! [`LinkTicker`]. The ticker only holds a weak reference, so it never keeps
//! a dropped link alive; it exits on its own once the link is gone.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, RecvTimeoutError, Sender};

use crate::codec::MessageCodec;
use crate::error::LinkError;
use crate::link::UdpLink;

/// Default tick period (the liveness check must run at least once per second).
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(250);

/// Thread calling `tick()` on a link every `period`.
///
/// Stopped by [`LinkTicker::stop`] or on drop.
pub struct LinkTicker {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    period: Duration,
}

impl LinkTicker {
    pub fn spawn<C: MessageCodec>(link: &UdpLink<C>, period: Duration) -> Result<Self, LinkError> {
        if period.is_zero() {
            return Err(LinkError::Config("tick period must be > 0".into()));
        }

        let weak = Arc::downgrade(&link.shared);
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("hdds-udplink-ticker".into())
            .spawn(move || {
                log::debug!("[LINK] ticker started, period={:?}", period);
                loop {
                    match stop_rx.recv_timeout(period) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    let Some(shared) = weak.upgrade() else {
                        break;
                    };
                    shared.tick_at(Instant::now());
                }
                log::debug!("[LINK] ticker stopped");
            })
            .map_err(|e| LinkError::Spawn(e.to_string()))?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
            period,
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Stop the thread and wait for it. Idempotent.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("[LINK] ticker thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for LinkTicker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FramedCodec;
    use crate::config::LinkConfig;

    #[test]
    fn test_zero_period_rejected() {
        let link = UdpLink::new(LinkConfig::default(), FramedCodec).unwrap();
        assert!(LinkTicker::spawn(&link, Duration::ZERO).is_err());
    }

    #[test]
    fn test_ticker_exits_when_link_dropped() {
        let link = UdpLink::new(LinkConfig::default(), FramedCodec).unwrap();
        let ticker = LinkTicker::spawn(&link, Duration::from_millis(5)).unwrap();
        assert!(ticker.is_running());
        assert_eq!(ticker.period(), Duration::from_millis(5));

        drop(link);
        let deadline = Instant::now() + Duration::from_secs(2);
        while ticker.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!ticker.is_running());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let link = UdpLink::new(LinkConfig::default(), FramedCodec).unwrap();
        let mut ticker = LinkTicker::spawn(&link, Duration::from_millis(5)).unwrap();
        ticker.stop();
        ticker.stop();
        assert!(!ticker.is_running());
    }
}
