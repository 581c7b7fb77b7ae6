// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ordered queue of pending range actions.
//!
//! Keyed by absolute `next_act_time`, ascending, with ties kept in
//! insertion order. The population is small (one entry per live
//! reservation), so a sorted vector with scan removal is the whole
//! implementation.

use crate::engine::range::RangeId;
use crate::platform::Timestamp;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
struct TimerEntry {
    at: Timestamp,
    range: RangeId,
}

/// Pending-action queue, earliest deadline first.
#[derive(Debug, Default)]
pub struct TimerQueue {
    entries: Vec<TimerEntry>,
}

impl TimerQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        TimerQueue {
            entries: Vec::new(),
        }
    }

    /// Number of queued entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Schedule `range` at absolute time `at`.
    ///
    /// Inserted after any entry with the same deadline, so equal
    /// deadlines fire in insertion order.
    pub fn push(&mut self, at: Timestamp, range: RangeId) {
        let idx = self.entries.partition_point(|e| e.at <= at);
        self.entries.insert(idx, TimerEntry { at, range });
    }

    /// Remove the entry for `range`, if scheduled.
    ///
    /// Returns true if an entry was removed.
    pub fn remove(&mut self, range: RangeId) -> bool {
        match self.entries.iter().position(|e| e.range == range) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// The earliest deadline and its range, without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<(Timestamp, RangeId)> {
        self.entries.first().map(|e| (e.at, e.range))
    }

    /// Pop the head entry if its deadline is at or before `now`.
    pub fn pop_expired(&mut self, now: Timestamp) -> Option<RangeId> {
        if self.entries.first().map_or(false, |e| e.at <= now) {
            Some(self.entries.remove(0).range)
        } else {
            None
        }
    }

    /// Time from `now` until the head deadline.
    ///
    /// Zero if the head has already expired; `Duration::MAX` if the
    /// queue is empty.
    #[must_use]
    pub fn delay_to_head(&self, now: Timestamp) -> Duration {
        match self.entries.first() {
            Some(e) => e.at.saturating_duration_since(now),
            None => Duration::MAX,
        }
    }
}
