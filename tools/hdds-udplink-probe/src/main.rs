// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! hdds-udplink-probe - exercise a UDP link against an echo peer
//!
//! `echo` runs a plain UDP echo peer; `ping` drives an `hdds-udplink` link
//! at it, reports round-trip times and every link state change. Stop the echo
//! peer mid-run to watch the liveness monitor reconnect and, once the retry
//! budget is spent, close the link.

use clap::{Parser, Subcommand};
use colored::*;
use hdds_udplink::{
    FramedCodec, LinkConfig, LinkState, LinkStatsSnapshot, LinkTicker, OutboundFrame, UdpLink,
};
use std::collections::HashMap;
use std::io::{self, Write};
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sequence number (8 bytes, LE) heads every ping payload.
const SEQ_LEN: usize = 8;

/// How long to wait for stragglers once all pings are sent.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// UDP link probe
#[derive(Parser, Debug)]
#[command(name = "hdds-udplink-probe")]
#[command(version = "0.1.0")]
#[command(about = "Exercise an hdds-udplink link against a UDP echo peer")]
struct Args {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Echo every datagram back to its sender (run on the remote host)
    Echo {
        /// Local port
        #[arg(short, long, default_value = "6630")]
        port: u16,

        /// Local address
        #[arg(short, long, default_value = "0.0.0.0")]
        bind: IpAddr,

        /// Quiet mode
        #[arg(long)]
        quiet: bool,
    },
    /// Send sequence-numbered frames through a link and measure RTT
    Ping {
        /// Echo peer address
        #[arg(long, default_value = "127.0.0.1")]
        ip: IpAddr,

        /// Echo peer port
        #[arg(short, long, default_value = "6630")]
        port: u16,

        /// Interval between pings in milliseconds
        #[arg(short, long, default_value = "100")]
        interval_ms: u64,

        /// Number of pings (0 = until the link closes)
        #[arg(short = 'n', long, default_value = "100")]
        count: u64,

        /// Payload size in bytes (at least 8)
        #[arg(short = 's', long, default_value = "64")]
        payload_size: usize,

        /// Liveness timeout in milliseconds
        #[arg(long, default_value = "3000")]
        liveness_ms: u64,

        /// Reconnect attempts before the link closes
        #[arg(long, default_value = "3")]
        retry_budget: u32,
    },
}

fn main() {
    // Initialize logger for RUST_LOG-based debug output
    env_logger::init();

    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    match &args.mode {
        Mode::Echo { port, bind, quiet } => run_echo(SocketAddr::new(*bind, *port), *quiet, running),
        Mode::Ping {
            ip,
            port,
            interval_ms,
            count,
            payload_size,
            liveness_ms,
            retry_budget,
        } => {
            let config = LinkConfig::from_env()
                .with_target(SocketAddr::new(*ip, *port))
                .with_liveness_timeout(Duration::from_millis(*liveness_ms))
                .with_retry_budget(*retry_budget);
            run_ping(
                config,
                Duration::from_millis(*interval_ms),
                *count,
                (*payload_size).max(SEQ_LEN),
                running,
            )
        }
    }
}

fn run_echo(
    addr: SocketAddr,
    quiet: bool,
    running: Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error>> {
    let socket = UdpSocket::bind(addr)?;
    socket.set_read_timeout(Some(Duration::from_millis(100)))?;

    if !quiet {
        eprintln!("{} UDP link probe (echo mode)", ">>>".green().bold());
        eprintln!("    listening on {}", socket.local_addr()?);
        eprintln!("{}", "    Press Ctrl+C to stop".dimmed());
        eprintln!();
    }

    let mut buf = vec![0u8; 65_536];
    let mut echoed = 0u64;

    while running.load(Ordering::SeqCst) {
        let (n, from) = match socket.recv_from(&mut buf) {
            Ok(v) => v,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                continue;
            }
            Err(e) => {
                if !quiet {
                    eprintln!("{}: {}", "Warning".yellow(), e);
                }
                continue;
            }
        };

        if let Err(e) = socket.send_to(&buf[..n], from) {
            if !quiet {
                eprintln!("{}: {}", "Warning".yellow(), e);
            }
            continue;
        }

        echoed += 1;
        if !quiet && echoed.is_multiple_of(100) {
            eprint!("\r    Echoed: {} datagrams", echoed);
            let _ = io::stderr().flush();
        }
    }

    if !quiet {
        eprintln!("\n\n{} Echoed {} total datagrams", "---".dimmed(), echoed);
    }
    Ok(())
}

fn run_ping(
    config: LinkConfig,
    interval: Duration,
    count: u64,
    payload_size: usize,
    running: Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("{} UDP link probe (ping mode)", ">>>".green().bold());
    eprintln!(
        "    peer={}, size={} bytes, count={}, liveness={:?}, retry_budget={}",
        config.target(),
        payload_size,
        count,
        config.liveness_timeout,
        config.retry_budget
    );

    let link = UdpLink::new(config, FramedCodec)?;
    link.open()?;
    let _ticker = LinkTicker::spawn(&link, Duration::from_millis(100))?;

    let mut in_flight: HashMap<u64, Instant> = HashMap::new();
    let mut rtts_us: Vec<f64> = Vec::new();
    let mut last_state = link.state();
    let mut next_seq = 0u64;
    let mut next_send = Instant::now();
    let mut done_sending_at: Option<Instant> = None;
    let mut payload = vec![0u8; payload_size];

    print_state(last_state, &link);

    while running.load(Ordering::SeqCst) {
        let now = Instant::now();

        if done_sending_at.is_none() && now >= next_send {
            payload[..SEQ_LEN].copy_from_slice(&next_seq.to_le_bytes());
            if link.send(OutboundFrame::new(payload.clone())).is_ok() {
                in_flight.insert(next_seq, now);
            }
            next_seq += 1;
            next_send = now + interval;
            if count > 0 && next_seq >= count {
                done_sending_at = Some(now);
            }
        }

        while let Some(frame) = link.receive() {
            let Some(seq_bytes) = frame.payload().get(..SEQ_LEN) else {
                continue;
            };
            let mut seq = [0u8; SEQ_LEN];
            seq.copy_from_slice(seq_bytes);
            if let Some(sent_at) = in_flight.remove(&u64::from_le_bytes(seq)) {
                rtts_us.push(sent_at.elapsed().as_secs_f64() * 1_000_000.0);
            }
        }

        let state = link.state();
        if state != last_state {
            print_state(state, &link);
            last_state = state;
        }
        if state == LinkState::Closed {
            break;
        }
        if let Some(t) = done_sending_at {
            if in_flight.is_empty() || t.elapsed() >= DRAIN_GRACE {
                break;
            }
        }

        std::thread::sleep(Duration::from_millis(1));
    }

    print_results(&rtts_us, next_seq, &link.stats());
    link.close();
    Ok(())
}

fn print_state(state: LinkState, link: &UdpLink<FramedCodec>) {
    let label = match state {
        LinkState::Idle => "IDLE".normal(),
        LinkState::Active => "ACTIVE".green().bold(),
        LinkState::Reconnecting => "RECONNECTING".yellow().bold(),
        LinkState::Closed => "CLOSED".red().bold(),
    };
    eprintln!(
        "    [{}] generation={} retry={} local={}",
        label,
        link.generation(),
        link.retry_count(),
        link.local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "-".into())
    );
}

fn print_results(rtts_us: &[f64], sent: u64, stats: &LinkStatsSnapshot) {
    let received = rtts_us.len() as u64;
    let lost = sent.saturating_sub(received);
    let loss_pct = if sent > 0 {
        lost as f64 / sent as f64 * 100.0
    } else {
        0.0
    };

    println!();
    println!("{}", "=== UDP Link Probe Results ===".cyan().bold());
    println!("  Pings:      {} sent, {} echoed, {} lost ({:.1}%)", sent, received, lost, loss_pct);

    if !rtts_us.is_empty() {
        let min = rtts_us.iter().copied().fold(f64::INFINITY, f64::min);
        let max = rtts_us.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = rtts_us.iter().sum::<f64>() / rtts_us.len() as f64;
        println!("  RTT (us):   min={:.1} avg={:.1} max={:.1}", min, mean, max);
    }

    println!("{}", "--- link counters ---".dimmed());
    println!(
        "  Datagrams:  {} sent / {} received ({} / {} bytes)",
        stats.datagrams_sent, stats.datagrams_received, stats.bytes_sent, stats.bytes_received
    );
    println!(
        "  Faults:     encode={} decode={} send={} recv={}",
        stats.encode_failures, stats.decode_failures, stats.send_faults, stats.recv_faults
    );
    println!(
        "  Overflow:   outbound={} inbound={}",
        stats.outbound_resets, stats.inbound_resets
    );
    let reconnects = format!(
        "  Reconnects: {} attempted, {} failed",
        stats.reconnect_attempts, stats.reconnect_failures
    );
    if stats.reconnect_attempts > 0 {
        println!("{}", reconnects.yellow());
    } else {
        println!("{}", reconnects);
    }
}
