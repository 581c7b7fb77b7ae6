// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared test harness: a MAAP engine wired to scripted adapters.
//!
//! The clock only moves when a test advances it, every transmitted frame
//! is captured for inspection (or hand-delivery to a peer engine), and
//! the entropy source returns a settable fixed value so jitter and
//! placement are deterministic.

use maap::config::{MAAP_DYNAMIC_POOL_BASE, MAAP_DYNAMIC_POOL_SIZE};
use maap::{Clock, Entropy, MaapClient, Notification, SenderId, Timestamp, Transport};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

/// Transport that appends every frame to a shared log.
pub struct CaptureTransport {
    frames: Rc<RefCell<Vec<Vec<u8>>>>,
}

impl Transport for CaptureTransport {
    fn send(&mut self, frame: &[u8]) -> std::io::Result<()> {
        self.frames.borrow_mut().push(frame.to_vec());
        Ok(())
    }
}

/// Clock that reads a shared, manually advanced timestamp.
pub struct ManualClock {
    now: Rc<Cell<Timestamp>>,
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.get()
    }
}

/// Entropy that returns a settable raw value, reduced modulo the bound.
pub struct FixedEntropy {
    value: Rc<Cell<u64>>,
}

impl Entropy for FixedEntropy {
    fn uniform(&mut self, bound: u64) -> u64 {
        self.value.get() % bound
    }
}

/// One engine under test plus handles to its scripted adapters.
pub struct TestNode {
    pub mc: MaapClient<CaptureTransport, ManualClock, FixedEntropy>,
    frames: Rc<RefCell<Vec<Vec<u8>>>>,
    now: Rc<Cell<Timestamp>>,
    entropy: Rc<Cell<u64>>,
}

impl TestNode {
    /// Engine bound to `src_mac`, clock at zero, entropy value zero.
    pub fn new(src_mac: u64) -> Self {
        let frames = Rc::new(RefCell::new(Vec::new()));
        let now = Rc::new(Cell::new(Timestamp::ZERO));
        let entropy = Rc::new(Cell::new(0u64));
        let mc = MaapClient::new(
            CaptureTransport {
                frames: Rc::clone(&frames),
            },
            ManualClock {
                now: Rc::clone(&now),
            },
            FixedEntropy {
                value: Rc::clone(&entropy),
            },
            src_mac,
        );
        TestNode {
            mc,
            frames,
            now,
            entropy,
        }
    }

    /// Engine already initialized with the default dynamic pool.
    pub fn started(src_mac: u64, sender: SenderId) -> Self {
        let mut node = Self::new(src_mac);
        node.mc
            .init(sender, MAAP_DYNAMIC_POOL_BASE, MAAP_DYNAMIC_POOL_SIZE);
        node.drain_notifications();
        node
    }

    /// Set the raw value the entropy adapter will keep returning.
    pub fn set_entropy(&self, value: u64) {
        self.entropy.set(value);
    }

    /// Move the clock forward and run expired timers.
    pub fn advance_ms(&mut self, ms: u64) {
        self.now.set(self.now.get() + Duration::from_millis(ms));
        self.mc.handle_timer();
    }

    /// Take every frame transmitted since the last call.
    pub fn take_frames(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.frames.borrow_mut())
    }

    /// Drain the notification queue in order.
    pub fn drain_notifications(&mut self) -> Vec<(SenderId, Notification)> {
        let mut out = Vec::new();
        while let Some(entry) = self.mc.next_notification() {
            out.push(entry);
        }
        out
    }
}

/// Deliver every pending frame from `from` to `to`.
pub fn deliver(from: &mut TestNode, to: &mut TestNode) {
    for frame in from.take_frames() {
        let _ = to.mc.handle_packet(&frame);
    }
}
