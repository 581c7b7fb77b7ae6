// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # MAAP - MAC Address Acquisition Protocol
//!
//! A pure Rust implementation of MAAP per IEEE 1722-2016 Annex B: nodes on
//! a shared layer-2 segment dynamically claim non-overlapping ranges of
//! multicast MAC addresses from the well-known dynamic pool, without
//! central coordination, using a probe/defend protocol.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use maap::{MaapClient, SenderId, SystemClock, SystemEntropy};
//! use maap::config::{MAAP_DYNAMIC_POOL_BASE, MAAP_DYNAMIC_POOL_SIZE};
//!
//! # struct MyTransport;
//! # impl maap::Transport for MyTransport {
//! #     fn send(&mut self, _frame: &[u8]) -> std::io::Result<()> { Ok(()) }
//! # }
//! # let transport = MyTransport;
//! let mut mc = MaapClient::new(transport, SystemClock::new(), SystemEntropy::new(), 0x0022_9700_4102);
//! mc.init(SenderId(0), MAAP_DYNAMIC_POOL_BASE, MAAP_DYNAMIC_POOL_SIZE);
//! let _id = mc.reserve_range(SenderId(0), 8);
//!
//! // Host loop: sleep until delay_to_next_timer, a frame, or a command,
//! // then dispatch and drain notifications.
//! loop {
//!     let _wakeup = mc.delay_to_next_timer();
//!     // ... sleep, then on expiry:
//!     mc.handle_timer();
//!     while let Some((sender, event)) = mc.next_notification() {
//!         println!("{:?}: {}", sender, event);
//!     }
//!     # break;
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                          Host Loop                           |
//! |   commands in -> notifications out, frame rx/tx, sleeping    |
//! +--------------------------------------------------------------+
//! |                       Protocol Engine                        |
//! |   reserve/release/status | packet arbitration | timer expiry |
//! +--------------------------------------------------------------+
//! |   Interval Map  |  Timer Queue  |  PDU Codec  |  Notify FIFO |
//! +--------------------------------------------------------------+
//! |          Platform Adapters (Transport/Clock/Entropy)         |
//! +--------------------------------------------------------------+
//! ```
//!
//! ## Modules Overview
//!
//! - [`engine`] - the protocol engine (start here)
//! - [`protocol`] - 42-byte MAAP PDU codec
//! - [`intervals`] - claimed-interval bookkeeping
//! - [`platform`] - adapter traits and system implementations
//! - [`config`] - IEEE 1722-2016 Annex B constants
//!
//! ## See Also
//!
//! - IEEE 1722-2016 Annex B (MAAP)
//! - RFC 5227 (the analogous IPv4 address conflict detection)

/// IEEE 1722-2016 Annex B protocol constants.
pub mod config;
/// The MAAP protocol engine (state machines, arbitration, notifications).
pub mod engine;
/// Ordered map of claimed address intervals.
pub mod intervals;
/// Platform adapter traits: transport, clock, entropy.
pub mod platform;
/// MAAP PDU encode/decode.
pub mod protocol;

pub use engine::{
    MaapClient, Notification, NotifyError, Range, RangeId, RangeInfo, RangeState, SenderId,
};
pub use platform::{Clock, Entropy, SystemClock, SystemEntropy, Timestamp, Transport};
pub use protocol::{EncodeError, MaapPdu, MessageType, ParseError};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
