// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Send and receive workers.
//!
//! Each connection generation runs exactly one send worker and one receive
//! worker, both on dedicated threads sharing the generation's socket:
//!
//! ```text
//! send()  --> [outbound queue] --> send worker --encode--> socket --> peer
//! receive() <-- [inbound queue] <-- recv worker <--decode-- socket <-- peer
//! ```
//!
//! Workers stop only through the generation's `terminate` flag, checked at the
//! top of every iteration. Every iteration ends with a `poll_interval` sleep,
//! so a worker observes `terminate` within one interval. Codec and socket
//! faults are logged and the loop carries on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::codec::{CodecError, MessageCodec};
use crate::error::LinkError;
use crate::queue::ExchangeQueue;
use crate::stats::LinkStats;
use crate::transport::LinkSocket;

/// Everything a worker pair needs; cloned into both threads.
pub(crate) struct WorkerContext<C: MessageCodec> {
    pub codec: Arc<C>,
    pub outbound: Arc<ExchangeQueue<C::Outbound>>,
    pub inbound: Arc<ExchangeQueue<C::Inbound>>,
    pub stats: Arc<LinkStats>,
    pub poll_interval: Duration,
    pub send_buffer_size: usize,
    pub recv_buffer_size: usize,
}

impl<C: MessageCodec> Clone for WorkerContext<C> {
    fn clone(&self) -> Self {
        Self {
            codec: Arc::clone(&self.codec),
            outbound: Arc::clone(&self.outbound),
            inbound: Arc::clone(&self.inbound),
            stats: Arc::clone(&self.stats),
            poll_interval: self.poll_interval,
            send_buffer_size: self.send_buffer_size,
            recv_buffer_size: self.recv_buffer_size,
        }
    }
}

/// One generation of workers bound to one socket.
pub(crate) struct WorkerSet {
    generation: u64,
    terminate: Arc<AtomicBool>,
    socket: Arc<LinkSocket>,
    send: Option<JoinHandle<()>>,
    recv: Option<JoinHandle<()>>,
}

impl WorkerSet {
    /// Spawn the send and receive workers for `socket`.
    pub fn spawn<C: MessageCodec>(
        generation: u64,
        socket: LinkSocket,
        ctx: &WorkerContext<C>,
    ) -> Result<Self, LinkError> {
        let socket = Arc::new(socket);
        let terminate = Arc::new(AtomicBool::new(false));

        let send = {
            let ctx = ctx.clone();
            let socket = Arc::clone(&socket);
            let terminate = Arc::clone(&terminate);
            thread::Builder::new()
                .name(format!("hdds-udplink-send-{}", generation))
                .spawn(move || send_loop(&ctx, &socket, &terminate))
                .map_err(|e| LinkError::Spawn(e.to_string()))?
        };

        let recv = {
            let ctx = ctx.clone();
            let socket = Arc::clone(&socket);
            let terminate = Arc::clone(&terminate);
            thread::Builder::new()
                .name(format!("hdds-udplink-recv-{}", generation))
                .spawn(move || recv_loop(&ctx, &socket, &terminate))
        };
        let recv = match recv {
            Ok(handle) => handle,
            Err(e) => {
                // Don't leak the send worker of a half-built generation.
                terminate.store(true, Ordering::Release);
                let _ = send.join();
                return Err(LinkError::Spawn(e.to_string()));
            }
        };

        log::debug!(
            "[LINK] workers started generation={} peer={}",
            generation,
            socket.peer_addr()
        );
        Ok(Self {
            generation,
            terminate,
            socket,
            send: Some(send),
            recv: Some(recv),
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn socket(&self) -> &Arc<LinkSocket> {
        &self.socket
    }

    /// Raise the cooperative stop signal. Does not wait.
    pub fn signal_terminate(&self) {
        self.terminate.store(true, Ordering::Release);
    }

    /// Whether both workers have returned.
    pub fn is_finished(&self) -> bool {
        self.send.as_ref().is_none_or(JoinHandle::is_finished)
            && self.recv.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Signal terminate and wait for both workers.
    ///
    /// Bounded by roughly one poll interval plus one codec call. The socket
    /// is released once the last worker drops its handle.
    pub fn stop(mut self) {
        self.signal_terminate();
        self.join_all();
    }

    /// Signal terminate and wait, re-checking `cancelled` between polls.
    ///
    /// Returns once both workers exited, or early with `false` if `cancelled`
    /// became true (the workers are still joined in that case since they
    /// already saw terminate).
    pub fn stop_polling(mut self, poll: Duration, cancelled: &AtomicBool) -> bool {
        self.signal_terminate();
        let started = Instant::now();
        while !self.is_finished() {
            if cancelled.load(Ordering::Acquire) {
                break;
            }
            thread::sleep(poll);
        }
        self.join_all();
        log::trace!(
            "[LINK] generation {} drained in {:?}",
            self.generation,
            started.elapsed()
        );
        !cancelled.load(Ordering::Acquire)
    }

    fn join_all(&mut self) {
        if let Some(handle) = self.send.take() {
            if handle.join().is_err() {
                log::error!("[LINK] send worker of generation {} panicked", self.generation);
            }
        }
        if let Some(handle) = self.recv.take() {
            if handle.join().is_err() {
                log::error!("[LINK] recv worker of generation {} panicked", self.generation);
            }
        }
    }
}

impl Drop for WorkerSet {
    fn drop(&mut self) {
        self.signal_terminate();
        self.join_all();
    }
}

fn send_loop<C: MessageCodec>(ctx: &WorkerContext<C>, socket: &LinkSocket, terminate: &AtomicBool) {
    let mut buf = vec![0u8; ctx.send_buffer_size];

    while !terminate.load(Ordering::Acquire) {
        if let Some(msg) = ctx.outbound.dequeue() {
            let encoded = ctx.codec.encode(&msg, &mut buf).and_then(|n| {
                // A codec may not claim more bytes than it was handed.
                if n > buf.len() {
                    Err(CodecError::BufferTooSmall {
                        needed: n,
                        available: buf.len(),
                    })
                } else {
                    Ok(n)
                }
            });
            match encoded {
                Ok(n) => match socket.send(&buf[..n]) {
                    Ok(sent) => {
                        ctx.stats.record_sent(sent);
                        log::trace!("[LINK-SEND] {} bytes to {}", sent, socket.peer_addr());
                    }
                    Err(e) => {
                        ctx.stats.record_send_fault();
                        log::warn!("[LINK-SEND] send to {} failed: {}", socket.peer_addr(), e);
                    }
                },
                Err(e) => {
                    ctx.stats.record_encode_failure();
                    log::error!("[LINK-SEND] encode failed, message dropped: {}", e);
                }
            }
        }

        thread::sleep(ctx.poll_interval);
    }
}

fn recv_loop<C: MessageCodec>(ctx: &WorkerContext<C>, socket: &LinkSocket, terminate: &AtomicBool) {
    let mut buf = vec![0u8; ctx.recv_buffer_size];

    while !terminate.load(Ordering::Acquire) {
        match socket.try_recv(&mut buf) {
            Ok(Some(n)) => {
                ctx.stats.record_received(n);
                let decoded = ctx.codec.decode(&buf[..n]).and_then(|(msg, used)| {
                    if used > n {
                        Err(CodecError::Truncated {
                            needed: used,
                            available: n,
                        })
                    } else {
                        Ok((msg, used))
                    }
                });
                match decoded {
                    Ok((msg, used)) => {
                        if used < n {
                            log::trace!("[LINK-RECV] ignoring {} trailing bytes", n - used);
                        }
                        if ctx.inbound.enqueue_or_reset(msg) {
                            ctx.stats.record_inbound_reset();
                            log::debug!("[LINK-RECV] inbound queue full, backlog discarded");
                        }
                    }
                    Err(e) => {
                        ctx.stats.record_decode_failure();
                        log::error!("[LINK-RECV] decode failed, {} bytes dropped: {}", n, e);
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                ctx.stats.record_recv_fault();
                log::warn!("[LINK-RECV] recv from {} failed: {}", socket.peer_addr(), e);
            }
        }

        thread::sleep(ctx.poll_interval);
    }
}
