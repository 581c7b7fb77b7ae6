// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! maapd - MAAP address reservation daemon
//!
//! Binds one network interface, runs the MAAP protocol engine, and
//! serves a line-oriented control protocol on loopback TCP. The engine
//! loop sleeps until the earlier of the next protocol timer, a received
//! frame, or a control command, then dispatches and drains
//! notifications back to the requesting connection.

mod control;
mod netio;

use clap::Parser;
use control::{Command, ControlServer, Input};
use crossbeam_channel::RecvTimeoutError;
use maap::config::{MAAP_DYNAMIC_POOL_BASE, MAAP_DYNAMIC_POOL_SIZE};
use maap::{MaapClient, SenderId, SystemClock, SystemEntropy};
use netio::{RawSock, RawTransport};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Largest receive buffer a frame can need (standard MTU plus headers).
const RX_BUF_SIZE: usize = 1518;

/// Upper bound on one loop iteration's sleep, so control traffic and
/// shutdown are never starved by an idle timer queue.
const MAX_WAIT: Duration = Duration::from_secs(60);

/// MAAP address reservation daemon (IEEE 1722-2016 Annex B)
#[derive(Parser, Debug)]
#[command(name = "maapd")]
#[command(version)]
#[command(about = "Reserve multicast MAC ranges from the MAAP dynamic pool")]
struct Args {
    /// Network interface to bind (e.g. eth0)
    #[arg(short, long)]
    interface: String,

    /// TCP port for the loopback control channel
    #[arg(short, long, default_value = "15364")]
    port: u16,

    /// Override the pool base address used by `init` (hex)
    #[arg(long)]
    pool_base: Option<String>,

    /// Override the pool size used by `init`
    #[arg(long)]
    pool_size: Option<u32>,
}

fn main() {
    // RUST_LOG-based output for daemon diagnostics.
    env_logger::init();

    let args = Args::parse();
    if let Err(err) = run(&args) {
        eprintln!("maapd: {err}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let default_base = match &args.pool_base {
        Some(word) => u64::from_str_radix(word.trim_start_matches("0x"), 16)?,
        None => MAAP_DYNAMIC_POOL_BASE,
    };
    let default_size = args.pool_size.unwrap_or(MAAP_DYNAMIC_POOL_SIZE);

    let sock = Arc::new(RawSock::open(&args.interface)?);
    let (tx, rx) = crossbeam_channel::unbounded::<Input>();

    // Network reader: blocking recv, frames funneled into the engine loop.
    {
        let sock = Arc::clone(&sock);
        let tx = tx.clone();
        thread::spawn(move || {
            let mut buf = [0u8; RX_BUF_SIZE];
            loop {
                match sock.recv(&mut buf) {
                    Ok(n) => {
                        if tx.send(Input::Frame(buf[..n].to_vec())).is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        log::warn!("[maapd] frame receive failed: {}", err);
                        return;
                    }
                }
            }
        });
    }

    let server = ControlServer::bind(args.port, tx)?;
    log::info!(
        "[maapd] {} (mac {:#014x}), control on 127.0.0.1:{}",
        args.interface,
        sock.mac(),
        args.port
    );

    let mut mc = MaapClient::new(
        RawTransport(Arc::clone(&sock)),
        SystemClock::new(),
        SystemEntropy::new(),
        sock.mac(),
    );

    loop {
        let timeout = mc.delay_to_next_timer().min(MAX_WAIT);
        match rx.recv_timeout(timeout) {
            Ok(Input::Frame(frame)) => match mc.handle_packet(&frame) {
                Ok(()) => {}
                Err(err) if err.is_not_maap() => {}
                Err(err) => log::debug!("[maapd] dropped malformed frame: {}", err),
            },
            Ok(Input::Command { conn, line }) => {
                dispatch(&mut mc, &server, conn, &line, default_base, default_size);
            }
            Ok(Input::Disconnected(conn)) => server.disconnect(conn),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        mc.handle_timer();
        while let Some((sender, note)) = mc.next_notification() {
            server.send_line(sender.0, &note.to_string());
        }
    }

    log::info!("[maapd] exiting");
    Ok(())
}

fn dispatch(
    mc: &mut MaapClient<RawTransport, SystemClock, SystemEntropy>,
    server: &ControlServer,
    conn: u64,
    line: &str,
    default_base: u64,
    default_size: u32,
) {
    let sender = SenderId(conn);
    match control::parse_command(line) {
        Ok(Command::Init {
            pool_base,
            pool_size,
        }) => {
            mc.init(
                sender,
                pool_base.unwrap_or(default_base),
                pool_size.unwrap_or(default_size),
            );
        }
        Ok(Command::Reserve { length }) => {
            mc.reserve_range(sender, length);
        }
        Ok(Command::Release { id }) => mc.release_range(sender, id),
        Ok(Command::Status { id }) => mc.range_status(sender, id),
        // Closes only this connection; the engine and every other
        // client's reservations keep running.
        Ok(Command::Exit) => {
            server.send_line(conn, "bye");
            server.disconnect(conn);
        }
        Err(msg) => server.send_line(conn, &format!("error: {msg}")),
    }
}
