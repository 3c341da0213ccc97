// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Link configuration.
//!
//! # Example
//!
//! ```
//! use hdds_udplink::LinkConfig;
//! use std::time::Duration;
//!
//! let config = LinkConfig::default()
//!     .with_port(7000)
//!     .with_liveness_timeout(Duration::from_secs(5));
//! assert!(config.validate().is_ok());
//! ```

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::error::LinkError;

/// Default remote port.
pub const DEFAULT_PORT: u16 = 6630;

/// Default capacity of each exchange queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default liveness window.
pub const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_secs(3);

/// Default number of reconnect attempts before the link closes for good.
pub const DEFAULT_RETRY_BUDGET: u32 = 3;

/// Default sleep between worker loop iterations.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Smallest accepted transmit/receive buffer.
const MIN_BUFFER_SIZE: usize = 16;

/// Largest UDP payload over IPv4.
const MAX_SEND_BUFFER_SIZE: usize = 65_535;

const MAX_RECV_BUFFER_SIZE: usize = 65_536;

/// Configuration for a [`crate::UdpLink`].
#[derive(Clone, Debug)]
pub struct LinkConfig {
    // === Peer ===
    /// Remote IP address (default: loopback)
    pub ip: IpAddr,

    /// Remote UDP port (default: 6630)
    pub port: u16,

    /// Local bind address (None = ephemeral port on the wildcard address of
    /// the peer's family)
    pub bind_addr: Option<SocketAddr>,

    // === Exchange ===
    /// Capacity of the outbound and of the inbound queue
    pub queue_capacity: usize,

    /// Silence on the inbound side after which a reconnect is attempted
    pub liveness_timeout: Duration,

    /// Consecutive reconnect attempts allowed before permanent close
    pub retry_budget: u32,

    /// Sleep between worker loop iterations; also bounds how long a worker
    /// takes to observe the terminate signal
    pub poll_interval: Duration,

    // === Buffers ===
    /// Reusable transmit buffer handed to the codec
    pub send_buffer_size: usize,

    /// Datagram receive buffer
    pub recv_buffer_size: usize,

    /// SO_SNDBUF socket option (0 = OS default)
    pub socket_send_buffer: usize,

    /// SO_RCVBUF socket option (0 = OS default)
    pub socket_recv_buffer: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            bind_addr: None,

            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            liveness_timeout: DEFAULT_LIVENESS_TIMEOUT,
            retry_budget: DEFAULT_RETRY_BUDGET,
            poll_interval: DEFAULT_POLL_INTERVAL,

            send_buffer_size: 4096,
            recv_buffer_size: MAX_RECV_BUFFER_SIZE,
            socket_send_buffer: 0,
            socket_recv_buffer: 0,
        }
    }
}

impl LinkConfig {
    /// Create a config targeting `ip:port` with default tuning.
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self {
            ip,
            port,
            ..Default::default()
        }
    }

    /// Builder: set remote address
    pub fn with_target(mut self, addr: SocketAddr) -> Self {
        self.ip = addr.ip();
        self.port = addr.port();
        self
    }

    /// Builder: set remote port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builder: set local bind address
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = Some(addr);
        self
    }

    /// Builder: set queue capacity
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Builder: set liveness window
    pub fn with_liveness_timeout(mut self, timeout: Duration) -> Self {
        self.liveness_timeout = timeout;
        self
    }

    /// Builder: set retry budget
    pub fn with_retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = budget;
        self
    }

    /// Builder: set worker poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Remote socket address.
    pub fn target(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    /// Address the socket binds to before connecting.
    pub fn local_bind_addr(&self) -> SocketAddr {
        self.bind_addr.unwrap_or_else(|| wildcard_addr(self.ip))
    }

    /// Apply `HDDS_UDPLINK_*` environment overrides on top of the defaults.
    pub fn from_env() -> Self {
        Self::default().apply_env()
    }

    /// Apply `HDDS_UDPLINK_*` environment overrides on top of `self`.
    ///
    /// Values that fail to parse are ignored.
    pub fn apply_env(mut self) -> Self {
        if let Some(ip) = env_parse::<IpAddr>("HDDS_UDPLINK_IP") {
            self.ip = ip;
        }
        if let Some(port) = env_parse::<u16>("HDDS_UDPLINK_PORT") {
            self.port = port;
        }
        if let Some(capacity) = env_parse::<usize>("HDDS_UDPLINK_QUEUE_CAPACITY") {
            self.queue_capacity = capacity;
        }
        if let Some(ms) = env_parse::<u64>("HDDS_UDPLINK_LIVENESS_MS") {
            self.liveness_timeout = Duration::from_millis(ms);
        }
        if let Some(budget) = env_parse::<u32>("HDDS_UDPLINK_RETRY_BUDGET") {
            self.retry_budget = budget;
        }
        if let Some(us) = env_parse::<u64>("HDDS_UDPLINK_POLL_US") {
            self.poll_interval = Duration::from_micros(us);
        }
        self
    }

    /// Validate configuration. Returns Ok(()) if valid.
    pub fn validate(&self) -> Result<(), LinkError> {
        if self.queue_capacity == 0 {
            return Err(LinkError::Config("queue_capacity must be > 0".into()));
        }
        if self.liveness_timeout.is_zero() {
            return Err(LinkError::Config("liveness_timeout must be > 0".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(LinkError::Config("poll_interval must be > 0".into()));
        }
        // A worker must be able to observe terminate well inside one window.
        if self.poll_interval >= self.liveness_timeout {
            return Err(LinkError::Config(
                "poll_interval must be shorter than liveness_timeout".into(),
            ));
        }
        if !(MIN_BUFFER_SIZE..=MAX_SEND_BUFFER_SIZE).contains(&self.send_buffer_size) {
            return Err(LinkError::Config(format!(
                "send_buffer_size must be within {}..={}",
                MIN_BUFFER_SIZE, MAX_SEND_BUFFER_SIZE
            )));
        }
        if !(MIN_BUFFER_SIZE..=MAX_RECV_BUFFER_SIZE).contains(&self.recv_buffer_size) {
            return Err(LinkError::Config(format!(
                "recv_buffer_size must be within {}..={}",
                MIN_BUFFER_SIZE, MAX_RECV_BUFFER_SIZE
            )));
        }
        if let Some(bind) = self.bind_addr {
            if bind.is_ipv4() != self.ip.is_ipv4() {
                return Err(LinkError::Config(
                    "bind_addr and ip must be the same address family".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Ephemeral-port wildcard address of `ip`'s family.
pub(crate) fn wildcard_addr(ip: IpAddr) -> SocketAddr {
    match ip {
        IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("[LINK] ignoring unparsable {}={:?}", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LinkConfig::default();
        assert_eq!(config.target(), "127.0.0.1:6630".parse().unwrap());
        assert_eq!(config.queue_capacity, 1024);
        assert_eq!(config.liveness_timeout, Duration::from_secs(3));
        assert_eq!(config.retry_budget, 3);
        assert_eq!(config.poll_interval, Duration::from_millis(1));
        assert_eq!(config.send_buffer_size, 4096);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = LinkConfig::default()
            .with_target("10.0.0.7:9000".parse().unwrap())
            .with_queue_capacity(8)
            .with_retry_budget(5)
            .with_poll_interval(Duration::from_micros(500));
        assert_eq!(config.ip, "10.0.0.7".parse::<IpAddr>().unwrap());
        assert_eq!(config.port, 9000);
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.retry_budget, 5);
        assert_eq!(config.poll_interval, Duration::from_micros(500));
    }

    #[test]
    fn test_local_bind_addr_follows_family() {
        let v4 = LinkConfig::default();
        assert_eq!(v4.local_bind_addr(), "0.0.0.0:0".parse().unwrap());

        let v6 = LinkConfig::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 1234);
        assert_eq!(v6.local_bind_addr(), "[::]:0".parse().unwrap());

        let pinned = LinkConfig::default().with_bind_addr("127.0.0.1:4000".parse().unwrap());
        assert_eq!(pinned.local_bind_addr(), "127.0.0.1:4000".parse().unwrap());
    }

    #[test]
    fn test_env_overrides() {
        const VARS: [(&str, &str); 6] = [
            ("HDDS_UDPLINK_IP", "10.1.2.3"),
            ("HDDS_UDPLINK_PORT", "7001"),
            ("HDDS_UDPLINK_QUEUE_CAPACITY", "64"),
            ("HDDS_UDPLINK_LIVENESS_MS", "1500"),
            ("HDDS_UDPLINK_RETRY_BUDGET", "not-a-number"),
            ("HDDS_UDPLINK_POLL_US", "250"),
        ];
        let saved: Vec<_> = VARS.iter().map(|(k, _)| (*k, std::env::var(k).ok())).collect();
        for (k, v) in VARS {
            std::env::set_var(k, v);
        }

        let config = LinkConfig::from_env();

        for (k, v) in saved {
            match v {
                Some(v) => std::env::set_var(k, v),
                None => std::env::remove_var(k),
            }
        }

        assert_eq!(config.target(), "10.1.2.3:7001".parse().unwrap());
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.liveness_timeout, Duration::from_millis(1500));
        assert_eq!(config.poll_interval, Duration::from_micros(250));
        // Unparsable value leaves the default in place.
        assert_eq!(config.retry_budget, DEFAULT_RETRY_BUDGET);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(LinkConfig::default().with_queue_capacity(0).validate().is_err());
        assert!(LinkConfig::default()
            .with_liveness_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(LinkConfig::default()
            .with_poll_interval(Duration::ZERO)
            .validate()
            .is_err());
        assert!(LinkConfig::default()
            .with_poll_interval(Duration::from_secs(5))
            .validate()
            .is_err());

        let tiny = LinkConfig {
            send_buffer_size: 4,
            ..Default::default()
        };
        assert!(tiny.validate().is_err());

        let huge = LinkConfig {
            recv_buffer_size: 1 << 20,
            ..Default::default()
        };
        assert!(huge.validate().is_err());

        let mixed = LinkConfig::default().with_bind_addr("[::]:0".parse().unwrap());
        assert!(mixed.validate().is_err());
    }
}
