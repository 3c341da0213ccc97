// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Link error types.
//!
//! Only operations invoked by the application (`connect`, config validation,
//! ticker spawn) surface these. Faults inside the workers and the reconnect
//! controller are logged and absorbed; the application observes them through
//! [`crate::UdpLink::is_alive`] / [`crate::UdpLink::is_closed`] only.

use std::fmt;

/// Errors returned by the link's public API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// Socket-level failure (message only, not the original error).
    Io(String),
    /// Configuration validation error.
    Config(String),
    /// `connect()` was called while the link is active or reconnecting.
    AlreadyConnected,
    /// The link has been dropped or closed and cannot serve the request.
    Closed,
    /// A background thread could not be spawned.
    Spawn(String),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
            Self::Config(msg) => write!(f, "config error: {}", msg),
            Self::AlreadyConnected => write!(f, "link already connected (close it first)"),
            Self::Closed => write!(f, "link closed"),
            Self::Spawn(msg) => write!(f, "failed to spawn thread: {}", msg),
        }
    }
}

impl std::error::Error for LinkError {}

impl From<std::io::Error> for LinkError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
