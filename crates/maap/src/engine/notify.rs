// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Notification queue: how command results and protocol events reach the host.
//!
//! Every command produces exactly one terminal notification for its sender,
//! optionally preceded by progress notifications; protocol events (lost
//! arbitration) produce unsolicited ones. The engine never fails a call,
//! it enqueues.

use crate::engine::range::{RangeId, RangeState};
use std::collections::VecDeque;

/// Opaque token identifying the entity that issued a command.
///
/// Round-trips through the engine unchanged; the host uses it to route
/// notifications back to the right requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SenderId(pub u64);

/// Why a command could not be honored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyError {
    /// The engine has not been initialized.
    NotInitialized,
    /// The engine is already initialized.
    AlreadyInitialized,
    /// No disjoint sub-range of the requested length was found.
    NoFreeRange,
    /// The id does not name a live reservation of this sender.
    UnknownId,
    /// A parameter was outside its allowed domain.
    InvalidArgument,
}

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifyError::NotInitialized => write!(f, "not initialized"),
            NotifyError::AlreadyInitialized => write!(f, "already initialized"),
            NotifyError::NoFreeRange => write!(f, "no free range of that length"),
            NotifyError::UnknownId => write!(f, "unknown range id"),
            NotifyError::InvalidArgument => write!(f, "invalid argument"),
        }
    }
}

/// Snapshot of one reservation, carried by STATUS notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeInfo {
    /// First address of the reservation.
    pub start: u64,
    /// Number of addresses.
    pub count: u16,
    /// Current state.
    pub state: RangeState,
}

/// Event delivered to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// Engine configured and ready.
    Initialized {
        /// First address of the managed pool.
        pool_base: u64,
        /// Number of addresses in the managed pool.
        pool_len: u32,
    },
    /// Initialization rejected.
    InitFailed {
        /// Rejection reason.
        error: NotifyError,
    },
    /// Probing started for a new reservation.
    Acquiring {
        /// Reservation id.
        id: RangeId,
        /// First address.
        start: u64,
        /// Number of addresses.
        count: u16,
    },
    /// Probing finished without conflict; the range is now defended.
    Acquired {
        /// Reservation id.
        id: RangeId,
        /// First address.
        start: u64,
        /// Number of addresses.
        count: u16,
    },
    /// Reservation could not be started.
    ReserveFailed {
        /// Rejection reason.
        error: NotifyError,
    },
    /// Reservation released on the owner's request.
    Released {
        /// Reservation id.
        id: RangeId,
        /// First address.
        start: u64,
        /// Number of addresses.
        count: u16,
    },
    /// Release rejected.
    ReleaseFailed {
        /// The id the release named.
        id: RangeId,
        /// Rejection reason.
        error: NotifyError,
    },
    /// Answer to a status query; `info` is `None` for unknown ids.
    Status {
        /// The id the query named.
        id: RangeId,
        /// Reservation snapshot, if the id is live.
        info: Option<RangeInfo>,
    },
    /// Arbitration lost: the reservation was surrendered to a peer.
    Yielded {
        /// Reservation id.
        id: RangeId,
        /// First address of the surrendered interval.
        start: u64,
        /// Number of addresses surrendered.
        count: u16,
        /// First address of the conflicting peer range.
        conflict_start: u64,
        /// Number of addresses in the conflicting peer range.
        conflict_count: u16,
    },
}

impl std::fmt::Display for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notification::Initialized {
                pool_base,
                pool_len,
            } => write!(
                f,
                "initialized: pool {:#014x} + {:#06x}",
                pool_base, pool_len
            ),
            Notification::InitFailed { error } => write!(f, "init failed: {}", error),
            Notification::Acquiring { id, start, count } => {
                write!(f, "acquiring id {}: {:#014x} + {}", id, start, count)
            }
            Notification::Acquired { id, start, count } => {
                write!(f, "acquired id {}: {:#014x} + {}", id, start, count)
            }
            Notification::ReserveFailed { error } => write!(f, "reserve failed: {}", error),
            Notification::Released { id, start, count } => {
                write!(f, "released id {}: {:#014x} + {}", id, start, count)
            }
            Notification::ReleaseFailed { id, error } => {
                write!(f, "release of id {} failed: {}", id, error)
            }
            Notification::Status { id, info: None } => write!(f, "status id {}: unknown", id),
            Notification::Status {
                id,
                info: Some(info),
            } => write!(
                f,
                "status id {}: {:#014x} + {} ({})",
                id, info.start, info.count, info.state
            ),
            Notification::Yielded {
                id,
                start,
                count,
                conflict_start,
                conflict_count,
            } => write!(
                f,
                "yielded id {}: {:#014x} + {} to peer claim {:#014x} + {}",
                id, start, count, conflict_start, conflict_count
            ),
        }
    }
}

/// FIFO of pending notifications with their originating sender tokens.
#[derive(Debug, Default)]
pub struct NotifyQueue {
    entries: VecDeque<(SenderId, Notification)>,
}

impl NotifyQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        NotifyQueue {
            entries: VecDeque::new(),
        }
    }

    /// Append a notification for `sender`.
    pub fn push(&mut self, sender: SenderId, notification: Notification) {
        self.entries.push_back((sender, notification));
    }

    /// Take the oldest pending notification.
    pub fn pop(&mut self) -> Option<(SenderId, Notification)> {
        self.entries.pop_front()
    }

    /// Number of pending notifications.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every pending notification.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
