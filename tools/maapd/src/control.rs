// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Local control channel.
//!
//! Accepts TCP connections on loopback, parses line-oriented text
//! commands, and writes notification lines back to the connection that
//! issued the originating command. Each connection's id doubles as its
//! engine sender token.
//!
//! Protocol:
//!
//! ```text
//! init [pool_base_hex pool_size]     configure the engine
//! reserve <count>                    start reserving <count> addresses
//! release <id>                       release a reservation
//! status <id>                        query a reservation
//! exit                               close this control connection
//! ```
//!
//! Closing a connection never touches the engine: reservations made
//! through it stay probed and defended until released.

use crossbeam_channel::Sender;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

/// Event funneled into the daemon's single engine loop.
pub enum Input {
    /// A raw Ethernet frame from the network reader.
    Frame(Vec<u8>),
    /// One command line from a control connection.
    Command {
        /// Connection id (also the sender token).
        conn: u64,
        /// The trimmed command line.
        line: String,
    },
    /// A control connection went away.
    Disconnected(u64),
}

/// A parsed control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Configure the engine, optionally overriding the pool.
    Init {
        /// Pool base address, if given.
        pool_base: Option<u64>,
        /// Pool size, if given.
        pool_size: Option<u32>,
    },
    /// Start a reservation of `length` addresses.
    Reserve {
        /// Number of addresses.
        length: u32,
    },
    /// Release reservation `id`.
    Release {
        /// Reservation id.
        id: u32,
    },
    /// Query reservation `id`.
    Status {
        /// Reservation id.
        id: u32,
    },
    /// Close this control connection.
    Exit,
}

/// Parse one command line.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let verb = words.next().ok_or("empty command")?;
    let command = match verb {
        "init" => {
            let pool_base = words.next().map(parse_hex).transpose()?;
            let pool_size = words
                .next()
                .map(|w| w.parse::<u32>().map_err(|e| format!("bad pool size: {e}")))
                .transpose()?;
            Command::Init {
                pool_base,
                pool_size,
            }
        }
        "reserve" => Command::Reserve {
            length: parse_u32(words.next(), "count")?,
        },
        "release" => Command::Release {
            id: parse_u32(words.next(), "id")?,
        },
        "status" => Command::Status {
            id: parse_u32(words.next(), "id")?,
        },
        "exit" => Command::Exit,
        other => return Err(format!("unknown command '{other}'")),
    };
    if words.next().is_some() {
        return Err(format!("trailing arguments after '{verb}'"));
    }
    Ok(command)
}

fn parse_hex(word: &str) -> Result<u64, String> {
    u64::from_str_radix(word.trim_start_matches("0x"), 16)
        .map_err(|e| format!("bad hex address: {e}"))
}

fn parse_u32(word: Option<&str>, what: &str) -> Result<u32, String> {
    word.ok_or(format!("missing {what}"))?
        .parse::<u32>()
        .map_err(|e| format!("bad {what}: {e}"))
}

/// Control server: one accept thread, one reader thread per connection.
pub struct ControlServer {
    conns: Arc<Mutex<HashMap<u64, TcpStream>>>,
}

impl ControlServer {
    /// Bind the loopback listener and start accepting.
    pub fn bind(port: u16, tx: Sender<Input>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port))?;
        let conns: Arc<Mutex<HashMap<u64, TcpStream>>> = Arc::new(Mutex::new(HashMap::new()));

        let accept_conns = Arc::clone(&conns);
        thread::spawn(move || {
            static NEXT_CONN: AtomicU64 = AtomicU64::new(1);
            for stream in listener.incoming() {
                let stream = match stream {
                    Ok(s) => s,
                    Err(err) => {
                        log::warn!("[control] accept failed: {}", err);
                        continue;
                    }
                };
                let conn = NEXT_CONN.fetch_add(1, Ordering::Relaxed);
                let writer = match stream.try_clone() {
                    Ok(w) => w,
                    Err(err) => {
                        log::warn!("[control] clone of connection {} failed: {}", conn, err);
                        continue;
                    }
                };
                lock_conns(&accept_conns).insert(conn, writer);
                log::debug!("[control] connection {} opened", conn);

                let tx = tx.clone();
                thread::spawn(move || read_commands(conn, stream, &tx));
            }
        });

        Ok(ControlServer { conns })
    }

    /// Write one line to connection `conn`; drops the connection on error.
    pub fn send_line(&self, conn: u64, line: &str) {
        let mut conns = lock_conns(&self.conns);
        let failed = match conns.get_mut(&conn) {
            Some(stream) => writeln!(stream, "{line}").is_err(),
            None => false,
        };
        if failed {
            log::debug!("[control] dropping unwritable connection {}", conn);
            if let Some(stream) = conns.remove(&conn) {
                let _ = stream.shutdown(Shutdown::Both);
            }
        }
    }

    /// Close connection `conn` and forget it.
    ///
    /// The shutdown also ends the connection's reader thread, whose
    /// `Disconnected` event then finds nothing left to remove.
    pub fn disconnect(&self, conn: u64) {
        if let Some(stream) = lock_conns(&self.conns).remove(&conn) {
            let _ = stream.shutdown(Shutdown::Both);
            log::debug!("[control] connection {} closed", conn);
        }
    }
}

fn lock_conns(
    conns: &Arc<Mutex<HashMap<u64, TcpStream>>>,
) -> std::sync::MutexGuard<'_, HashMap<u64, TcpStream>> {
    match conns.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::debug!("[control] connection table lock poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

fn read_commands(conn: u64, stream: TcpStream, tx: &Sender<Input>) {
    let reader = BufReader::new(stream);
    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let sent = tx.send(Input::Command {
            conn,
            line: line.to_string(),
        });
        if sent.is_err() {
            return; // engine loop is gone
        }
    }
    let _ = tx.send(Input::Disconnected(conn));
}
