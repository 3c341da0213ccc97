// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Self-healing UDP client link.
//!
//! Decouples an application's single-threaded update loop from network I/O:
//! the application pushes messages into a bounded outbound queue and drains a
//! bounded inbound queue, never blocking, while a dedicated send worker and
//! receive worker move datagrams between the queues and a connected UDP
//! socket.
//!
//! # Architecture
//!
//! ```text
//! Application thread               Link workers                  Peer
//!        |                               |                          |
//!        |-- send(msg) --> [outbound] -->|-- encode + send -------->|
//!        |<-- receive() -- [inbound] <---|<-- recv + decode --------|
//!        |-- tick() ---> liveness check  |                          |
//!        |                 |             |                          |
//!        |        silence > timeout?     |                          |
//!        |                 +--> reconnect: drain workers,           |
//!        |                      reopen socket, restart workers      |
//! ```
//!
//! # Key Features
//!
//! - **Overwrite-on-full queues**: a full queue is cleared before the new
//!   message goes in, so the freshest data always wins
//! - **Liveness monitor**: no delivered message for `liveness_timeout`
//!   triggers a reconnect
//! - **Retry budget**: consecutive failed reconnects close the link for good;
//!   any delivered message resets the budget
//! - **Cooperative shutdown**: workers stop on a per-generation flag, never by
//!   being killed
//! - **Pluggable codec**: the link never interprets message bytes
//!   ([`MessageCodec`])
//!
//! # Example
//!
//! ```no_run
//! use hdds_udplink::{FramedCodec, LinkConfig, OutboundFrame, UdpLink};
//!
//! let link = UdpLink::new(LinkConfig::default(), FramedCodec)?;
//! link.open()?;
//! link.send(OutboundFrame::new(b"hello".to_vec()))?;
//!
//! loop {
//!     while let Some(frame) = link.receive() {
//!         println!("{} bytes", frame.payload().len());
//!     }
//!     link.tick();
//!     if link.is_closed() {
//!         break;
//!     }
//!     # break;
//! }
//! # Ok::<(), hdds_udplink::LinkError>(())
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod link;
pub mod queue;
pub mod stats;
pub mod ticker;
pub mod transport;
mod worker;

pub use codec::{
    CodecError, FramedCodec, InboundDatagram, InboundFrame, MessageCodec, OutboundDatagram,
    OutboundFrame, RawCodec, FRAME_HEADER_SIZE, FRAME_MAGIC,
};
pub use config::LinkConfig;
pub use error::LinkError;
pub use link::{LinkState, UdpLink};
pub use queue::ExchangeQueue;
pub use stats::{LinkStats, LinkStatsSnapshot};
pub use ticker::{LinkTicker, DEFAULT_TICK_PERIOD};
pub use transport::LinkSocket;
