// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP link: exchange queues, worker lifecycle and reconnect controller.
//!
//! ## State machine
//!
//! ```text
//!            connect()                 liveness timeout, retries left
//!   Idle ───────────────▶ Active ─────────────────────────────▶ Reconnecting
//!     ▲                    ▲  │                                      │
//!     │                    │  │ timeout, budget exhausted            │
//!     │                    │  ▼                                      │
//!     │ connect()  ◀──── Closed ◀──────────── close() ───────────────┤
//!     └───────────────────────                                       │
//!                          └──────── workers drained, socket reopened┘
//! ```
//!
//! `close()` is reachable from every state and is idempotent. `Closed` only
//! leaves through an explicit `connect()`.
//!
//! ## Reconnect sequence
//!
//! A liveness timeout bumps the retry counter and hands the current worker
//! generation to a short-lived reconnect thread, so the caller (usually the
//! host's tick) never waits on the teardown. That thread raises the old
//! generation's terminate flag, polls until both workers have returned,
//! opens a fresh socket and starts a new worker pair. At most one sequence is
//! pending: starting another one cancels the previous sequence and waits for
//! it to wind down, so two worker generations never overlap.
//!
//! A successful `receive()` resets the retry counter and the liveness clock.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::Mutex;

use crate::codec::MessageCodec;
use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::queue::ExchangeQueue;
use crate::stats::{LinkStats, LinkStatsSnapshot};
use crate::transport::LinkSocket;
use crate::worker::{WorkerContext, WorkerSet};

/// Link lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Constructed, never connected.
    Idle,
    /// Normal operation: a worker generation owns the socket (unless the last
    /// reopen failed, see [`UdpLink::reconnect`]).
    Active,
    /// Old generation draining, new one not started yet.
    Reconnecting,
    /// Terminal until the next `connect()`.
    Closed,
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Pending reconnect sequence.
struct ReconnectTask {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Mutable link state. Every flag lives here, behind one lock.
struct Control {
    state: LinkState,
    alive: bool,
    retry_count: u32,
    last_receive: Instant,
    target: SocketAddr,
    generation: u64,
    workers: Option<WorkerSet>,
    reconnect: Option<ReconnectTask>,
}

pub(crate) struct LinkShared<C: MessageCodec> {
    config: LinkConfig,
    ctx: WorkerContext<C>,
    control: Mutex<Control>,
}

/// Client-side UDP link with bounded exchange queues and automatic,
/// retry-budgeted reconnection.
///
/// Dropping the link closes it.
pub struct UdpLink<C: MessageCodec> {
    pub(crate) shared: Arc<LinkShared<C>>,
}

impl<C: MessageCodec> UdpLink<C> {
    /// Create an idle link. Nothing is opened until [`UdpLink::connect`] or
    /// [`UdpLink::open`].
    pub fn new(config: LinkConfig, codec: C) -> Result<Self, LinkError> {
        config.validate()?;
        let ctx = WorkerContext {
            codec: Arc::new(codec),
            outbound: Arc::new(ExchangeQueue::new(config.queue_capacity)),
            inbound: Arc::new(ExchangeQueue::new(config.queue_capacity)),
            stats: Arc::new(LinkStats::new()),
            poll_interval: config.poll_interval,
            send_buffer_size: config.send_buffer_size,
            recv_buffer_size: config.recv_buffer_size,
        };
        let control = Control {
            state: LinkState::Idle,
            alive: false,
            retry_count: 0,
            last_receive: Instant::now(),
            target: config.target(),
            generation: 0,
            workers: None,
            reconnect: None,
        };
        Ok(Self {
            shared: Arc::new(LinkShared {
                config,
                ctx,
                control: Mutex::new(control),
            }),
        })
    }

    /// Connect to the address from the configuration.
    pub fn open(&self) -> Result<(), LinkError> {
        self.shared.connect(self.shared.config.target())
    }

    /// Open a socket to `ip:port` and start both workers.
    ///
    /// Fails with [`LinkError::AlreadyConnected`] unless the link is idle or
    /// closed.
    pub fn connect(&self, ip: IpAddr, port: u16) -> Result<(), LinkError> {
        self.shared.connect(SocketAddr::new(ip, port))
    }

    /// Queue `msg` for transmission. Never blocks.
    ///
    /// A full outbound queue is cleared before `msg` is inserted. On a closed
    /// link the message is dropped and [`LinkError::Closed`] returned.
    pub fn send(&self, msg: C::Outbound) -> Result<(), LinkError> {
        self.shared.send(msg)
    }

    /// Take the oldest received message, if any. Never blocks.
    ///
    /// A delivered message proves the peer is reachable: it marks the link
    /// alive, resets the retry counter and restarts the liveness window.
    pub fn receive(&self) -> Option<C::Inbound> {
        self.shared.receive()
    }

    /// Liveness check against the wall clock. See [`UdpLink::tick_at`].
    pub fn tick(&self) -> bool {
        self.shared.tick_at(Instant::now())
    }

    /// Liveness check; call at least once per second.
    ///
    /// If the link is active and nothing was received for
    /// `liveness_timeout`, restarts the window and enters the reconnect
    /// controller. Returns `true` if a reconnect (or the final close) was
    /// triggered.
    pub fn tick_at(&self, now: Instant) -> bool {
        self.shared.tick_at(now)
    }

    /// Enter the reconnect controller.
    ///
    /// Consumes one retry. While retries remain, the current workers are
    /// drained and a fresh socket is opened in the background. Once the
    /// budget is spent the link closes. If reopening the socket fails, the
    /// link stays active with no workers and the next liveness timeout
    /// consumes another retry. No-op on an idle or closed link.
    pub fn reconnect(&self) {
        self.shared.reconnect();
    }

    /// Stop both workers, release the socket and enter `Closed`.
    ///
    /// Cancels a pending reconnect, resets the retry counter and discards
    /// both unsent and undelivered messages. Idempotent.
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_alive(&self) -> bool {
        self.shared.control.lock().alive
    }

    pub fn is_closed(&self) -> bool {
        self.shared.control.lock().state == LinkState::Closed
    }

    pub fn state(&self) -> LinkState {
        self.shared.state()
    }

    /// Reconnect attempts since the last delivered message.
    pub fn retry_count(&self) -> u32 {
        self.shared.control.lock().retry_count
    }

    /// Number of sockets opened so far (initial connect included).
    pub fn generation(&self) -> u64 {
        self.shared.control.lock().generation
    }

    /// Current (or last) peer address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.shared.control.lock().target
    }

    /// Local address of the current socket, if one is open.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        let ctl = self.shared.control.lock();
        ctl.workers
            .as_ref()
            .and_then(|w| w.socket().local_addr().ok())
    }

    pub fn config(&self) -> &LinkConfig {
        &self.shared.config
    }

    pub fn stats(&self) -> LinkStatsSnapshot {
        self.shared.ctx.stats.snapshot()
    }

    /// Messages waiting in the outbound queue.
    pub fn pending_outbound(&self) -> usize {
        self.shared.ctx.outbound.len()
    }

    /// Messages waiting in the inbound queue.
    pub fn pending_inbound(&self) -> usize {
        self.shared.ctx.inbound.len()
    }
}

impl<C: MessageCodec> Drop for UdpLink<C> {
    fn drop(&mut self) {
        self.shared.close();
    }
}

impl<C: MessageCodec> LinkShared<C> {
    fn connect(&self, target: SocketAddr) -> Result<(), LinkError> {
        let mut ctl = self.control.lock();
        if matches!(ctl.state, LinkState::Active | LinkState::Reconnecting) {
            return Err(LinkError::AlreadyConnected);
        }

        // Nothing queued before this point belongs to the new session.
        self.ctx.outbound.clear();
        self.ctx.inbound.clear();

        let socket = LinkSocket::open(&self.config, target)?;
        let generation = ctl.generation + 1;
        let workers = WorkerSet::spawn(generation, socket, &self.ctx)?;

        ctl.generation = generation;
        ctl.workers = Some(workers);
        ctl.target = target;
        ctl.state = LinkState::Active;
        ctl.alive = true;
        ctl.last_receive = Instant::now();

        log::info!("[LINK] connected to {} (generation {})", target, generation);
        Ok(())
    }

    fn send(&self, msg: C::Outbound) -> Result<(), LinkError> {
        if self.control.lock().state == LinkState::Closed {
            log::trace!("[LINK] send on closed link, message dropped");
            return Err(LinkError::Closed);
        }
        if self.ctx.outbound.enqueue_or_reset(msg) {
            self.ctx.stats.record_outbound_reset();
            log::debug!("[LINK] outbound queue full, backlog discarded");
        }
        Ok(())
    }

    fn receive(&self) -> Option<C::Inbound> {
        let msg = self.ctx.inbound.dequeue()?;

        let mut ctl = self.control.lock();
        ctl.last_receive = Instant::now();
        ctl.retry_count = 0;
        if ctl.state != LinkState::Closed {
            ctl.alive = true;
        }
        Some(msg)
    }

    pub(crate) fn tick_at(self: &Arc<Self>, now: Instant) -> bool {
        {
            let mut ctl = self.control.lock();
            if ctl.state != LinkState::Active {
                return false;
            }
            if now.saturating_duration_since(ctl.last_receive) < self.config.liveness_timeout {
                return false;
            }
            ctl.last_receive = now;
        }

        log::debug!(
            "[LINK] nothing received for {:?}, entering reconnect",
            self.config.liveness_timeout
        );
        self.reconnect();
        true
    }

    pub(crate) fn reconnect(self: &Arc<Self>) {
        let mut ctl = self.control.lock();
        if matches!(ctl.state, LinkState::Idle | LinkState::Closed) {
            log::debug!("[LINK] reconnect ignored in state {}", ctl.state);
            return;
        }

        ctl.retry_count += 1;
        if ctl.retry_count > self.config.retry_budget {
            let attempts = ctl.retry_count - 1;
            let target = ctl.target;
            drop(ctl);
            log::error!(
                "[LINK] peer {} unreachable after {} reconnect attempts, link closed",
                target,
                attempts
            );
            self.close();
            return;
        }

        log::warn!(
            "[LINK] reconnect attempt {}/{} to {}",
            ctl.retry_count,
            self.config.retry_budget,
            ctl.target
        );
        self.ctx.stats.record_reconnect_attempt();

        let previous = ctl.reconnect.take();
        if let Some(prev) = &previous {
            prev.cancel.store(true, Ordering::Release);
        }
        let retiring = ctl.workers.take();
        ctl.state = LinkState::Reconnecting;
        ctl.alive = false;

        let cancel = Arc::new(AtomicBool::new(false));
        let task_cancel = Arc::clone(&cancel);
        let shared = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("hdds-udplink-reconnect".into())
            .spawn(move || shared.run_reconnect(previous, retiring, &task_cancel));

        match spawned {
            Ok(handle) => ctl.reconnect = Some(ReconnectTask { cancel, handle }),
            Err(e) => {
                // The closure (and the retiring workers it owned) was dropped
                // and joined by WorkerSet's Drop.
                log::error!("[LINK] failed to spawn reconnect thread: {}", e);
                self.ctx.stats.record_reconnect_failure();
                ctl.state = LinkState::Active;
                ctl.last_receive = Instant::now();
            }
        }
    }

    /// Body of the reconnect thread.
    fn run_reconnect(
        &self,
        previous: Option<ReconnectTask>,
        retiring: Option<WorkerSet>,
        cancel: &AtomicBool,
    ) {
        let poll = self.config.poll_interval;

        // A preempted sequence may still own a draining generation.
        if let Some(prev) = previous {
            while !prev.handle.is_finished() {
                thread::sleep(poll);
            }
            let _ = prev.handle.join();
        }

        if let Some(workers) = retiring {
            let generation = workers.generation();
            if !workers.stop_polling(poll, cancel) {
                log::debug!("[LINK] reconnect cancelled while draining generation {}", generation);
                return;
            }
        }

        let mut ctl = self.control.lock();
        if cancel.load(Ordering::Acquire) || ctl.state != LinkState::Reconnecting {
            log::debug!("[LINK] reconnect superseded");
            return;
        }

        let generation = ctl.generation + 1;
        let target = ctl.target;
        let opened = LinkSocket::open(&self.config, target)
            .map_err(LinkError::from)
            .and_then(|socket| WorkerSet::spawn(generation, socket, &self.ctx));
        match opened {
            Ok(workers) => {
                ctl.generation = generation;
                ctl.workers = Some(workers);
                log::info!("[LINK] reconnected to {} (generation {})", target, generation);
            }
            Err(e) => {
                self.ctx.stats.record_reconnect_failure();
                log::error!(
                    "[LINK] reopening socket to {} failed: {} (retry {}/{})",
                    target,
                    e,
                    ctl.retry_count,
                    self.config.retry_budget
                );
            }
        }
        ctl.last_receive = Instant::now();
        ctl.state = LinkState::Active;
    }

    pub(crate) fn close(&self) {
        let (workers, task, was) = {
            let mut ctl = self.control.lock();
            let was = ctl.state;
            ctl.state = LinkState::Closed;
            ctl.alive = false;
            ctl.retry_count = 0;
            let task = ctl.reconnect.take();
            if let Some(t) = &task {
                t.cancel.store(true, Ordering::Release);
            }
            (ctl.workers.take(), task, was)
        };

        self.ctx.outbound.clear();

        if let Some(workers) = workers {
            workers.stop();
        }
        if let Some(task) = task {
            let _ = task.handle.join();
        }

        // Only after the receive worker is gone, so nothing from this session
        // can land behind the clear.
        self.ctx.inbound.clear();

        if was != LinkState::Closed {
            log::info!("[LINK] closed (was {})", was);
        }
    }

    pub(crate) fn state(&self) -> LinkState {
        self.control.lock().state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FramedCodec;
    use std::net::UdpSocket;
    use std::time::Duration;

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_state_display() {
        assert_eq!(LinkState::Reconnecting.to_string(), "reconnecting");
        assert_eq!(LinkState::Closed.to_string(), "closed");
    }

    #[test]
    fn test_reopen_failure_counts_toward_budget() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let window = Duration::from_secs(10);
        let config = LinkConfig::default()
            .with_target(peer.local_addr().unwrap())
            .with_bind_addr("127.0.0.1:0".parse().unwrap())
            .with_liveness_timeout(window)
            .with_retry_budget(2);
        let link = UdpLink::new(config, FramedCodec).unwrap();
        link.open().unwrap();

        // An IPv6 peer cannot be reached from the pinned IPv4 bind address,
        // so every reopen fails.
        link.shared.control.lock().target = "[::1]:9".parse().unwrap();

        let base = Instant::now();
        assert!(link.tick_at(base + window));
        assert!(wait_for(|| link.stats().reconnect_failures == 1));
        assert!(wait_for(|| link.state() == LinkState::Active));
        assert_eq!(link.retry_count(), 1);
        assert!(!link.is_alive());
        assert!(link.local_addr().is_none());
        assert_eq!(link.generation(), 1);

        assert!(link.tick_at(base + window * 2));
        assert!(wait_for(|| link.stats().reconnect_failures == 2));
        assert!(wait_for(|| link.state() == LinkState::Active));
        assert_eq!(link.retry_count(), 2);

        assert!(link.tick_at(base + window * 3));
        assert!(link.is_closed());
        assert_eq!(link.stats().reconnect_attempts, 2);
    }

    #[test]
    fn test_budget_exhaustion_keeps_connected_peer() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = peer.local_addr().unwrap();
        let window = Duration::from_secs(10);
        // Configured target differs from the one passed to connect().
        let config = LinkConfig::default()
            .with_liveness_timeout(window)
            .with_retry_budget(0);
        let link = UdpLink::new(config, FramedCodec).unwrap();
        link.connect(addr.ip(), addr.port()).unwrap();

        assert!(link.tick_at(Instant::now() + window));
        assert!(link.is_closed());
        assert_eq!(link.peer_addr(), addr);
        assert_eq!(link.stats().reconnect_attempts, 0);
    }

    #[test]
    fn test_drop_closes_link() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let link = UdpLink::new(
            LinkConfig::default().with_target(peer.local_addr().unwrap()),
            FramedCodec,
        )
        .unwrap();
        link.open().unwrap();
        let shared = Arc::clone(&link.shared);

        drop(link);
        assert_eq!(shared.state(), LinkState::Closed);
        assert!(shared.control.lock().workers.is_none());
    }
}
