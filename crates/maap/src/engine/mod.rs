// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # MAAP protocol engine
//!
//! Single-threaded cooperative core tying the interval map, timer queue,
//! PDU codec and notification queue together. Three entry points mutate
//! state (commands, [`MaapClient::handle_packet`],
//! [`MaapClient::handle_timer`]); one query
//! ([`MaapClient::delay_to_next_timer`]) tells the host how long it may
//! sleep. No entry point blocks.
//!
//! Per IEEE 1722-2016 Annex B, a reservation probes its chosen interval,
//! then defends it with periodic announcements; conflicts are arbitrated
//! by state and, between two defenders, by numeric stream-ID comparison
//! (lower wins).

pub mod notify;
pub mod range;
pub mod timer_queue;

pub use notify::{Notification, NotifyError, NotifyQueue, RangeInfo, SenderId};
pub use range::{Range, RangeId, RangeState};
pub use timer_queue::TimerQueue;

use crate::config::{
    MAAP_ANNOUNCE_INTERVAL_BASE_MS, MAAP_ANNOUNCE_INTERVAL_VARIATION_MS, MAAP_DEST_MAC,
    MAAP_PROBE_INTERVAL_BASE_MS, MAAP_PROBE_INTERVAL_VARIATION_MS, MAAP_PROBE_RETRANSMITS,
    MAC_ADDRESS_MAX,
};
use crate::intervals::IntervalMap;
use crate::platform::{Clock, Entropy, Timestamp, Transport};
use crate::protocol::{MaapPdu, MessageType, ParseError};
use std::collections::BTreeMap;
use std::time::Duration;

/// The MAAP engine for one network interface.
///
/// Generic over its three platform adapters so hosts plug in raw sockets
/// and monotonic clocks while tests plug in scripted mocks.
pub struct MaapClient<T: Transport, C: Clock, E: Entropy> {
    transport: T,
    clock: C,
    entropy: E,

    dest_mac: u64,
    src_mac: u64,
    pool_base: u64,
    pool_len: u32,
    initialized: bool,

    intervals: IntervalMap,
    timers: TimerQueue,
    ranges: BTreeMap<RangeId, Range>,
    next_id: RangeId,
    notifications: NotifyQueue,
}

impl<T: Transport, C: Clock, E: Entropy> MaapClient<T, C, E> {
    /// Create an engine bound to `src_mac`. No pool is managed until
    /// [`MaapClient::init`] succeeds.
    pub fn new(transport: T, clock: C, entropy: E, src_mac: u64) -> Self {
        MaapClient {
            transport,
            clock,
            entropy,
            dest_mac: MAAP_DEST_MAC,
            src_mac,
            pool_base: 0,
            pool_len: 0,
            initialized: false,
            intervals: IntervalMap::new(),
            timers: TimerQueue::new(),
            ranges: BTreeMap::new(),
            next_id: 1,
            notifications: NotifyQueue::new(),
        }
    }

    /// True once [`MaapClient::init`] has succeeded.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Configure the managed address pool.
    ///
    /// Emits INITIALIZED on success. Re-initialization without an
    /// intervening [`MaapClient::deinit`] fails with ALREADY_INITIALIZED.
    pub fn init(&mut self, sender: SenderId, pool_base: u64, pool_len: u32) {
        if self.initialized {
            self.notifications.push(
                sender,
                Notification::InitFailed {
                    error: NotifyError::AlreadyInitialized,
                },
            );
            return;
        }
        let last = pool_base.checked_add(u64::from(pool_len.saturating_sub(1)));
        let valid = pool_len >= 1 && last.is_some_and(|l| l <= MAC_ADDRESS_MAX);
        if !valid {
            self.notifications.push(
                sender,
                Notification::InitFailed {
                    error: NotifyError::InvalidArgument,
                },
            );
            return;
        }
        self.pool_base = pool_base;
        self.pool_len = pool_len;
        self.initialized = true;
        log::debug!(
            "[maap] initialized: pool {:#014x} + {:#06x}",
            pool_base,
            pool_len
        );
        self.notifications.push(
            sender,
            Notification::Initialized {
                pool_base,
                pool_len,
            },
        );
    }

    /// Tear the engine down: every reservation, timer and queued
    /// notification is dropped and a subsequent [`MaapClient::init`]
    /// succeeds again. Reservation ids are not reused.
    pub fn deinit(&mut self) {
        self.intervals.clear();
        self.timers.clear();
        self.ranges.clear();
        self.notifications.clear();
        self.initialized = false;
        log::debug!("[maap] deinitialized");
    }

    /// Start reserving `length` addresses from the managed pool.
    ///
    /// On success the new reservation enters Probing, an ACQUIRING
    /// progress notification is queued, and the id is returned; the
    /// terminal ACQUIRED (or YIELDED) follows asynchronously. On failure
    /// a RESERVE_FAILED notification is queued and `None` is returned.
    pub fn reserve_range(&mut self, sender: SenderId, length: u32) -> Option<RangeId> {
        if !self.initialized {
            self.notifications.push(
                sender,
                Notification::ReserveFailed {
                    error: NotifyError::NotInitialized,
                },
            );
            return None;
        }
        if length == 0 || length > 0xFFFF {
            self.notifications.push(
                sender,
                Notification::ReserveFailed {
                    error: NotifyError::InvalidArgument,
                },
            );
            return None;
        }

        let pool_high = self.pool_base + u64::from(self.pool_len - 1);
        let Some(low) =
            self.intervals
                .find_free(self.pool_base, pool_high, length, &mut self.entropy)
        else {
            log::debug!("[maap] reserve of {} addresses found no free range", length);
            self.notifications.push(
                sender,
                Notification::ReserveFailed {
                    error: NotifyError::NoFreeRange,
                },
            );
            return None;
        };
        let high = low + u64::from(length) - 1;

        let id = self.next_id;
        self.next_id += 1;
        if let Err(err) = self.intervals.insert(low, high, id) {
            // find_free just verified disjointness; treat as allocator failure.
            log::warn!("[maap] interval insert rejected after free fit: {}", err);
            self.notifications.push(
                sender,
                Notification::ReserveFailed {
                    error: NotifyError::NoFreeRange,
                },
            );
            return None;
        }

        let now = self.clock.now();
        let next = now + self.jitter(0, MAAP_PROBE_INTERVAL_VARIATION_MS);
        let range = Range {
            id,
            state: RangeState::Probing,
            counter: MAAP_PROBE_RETRANSMITS,
            next_act_time: next,
            low,
            high,
            sender,
        };
        let count = range.count();
        self.timers.push(next, id);
        self.ranges.insert(id, range);

        log::debug!(
            "[maap] probing id {}: {:#014x} + {} for sender {:?}",
            id,
            low,
            count,
            sender
        );
        self.notifications.push(
            sender,
            Notification::Acquiring {
                id,
                start: low,
                count,
            },
        );
        self.send_probe(low, count);
        Some(id)
    }

    /// Release the reservation `id` if it is live and owned by `sender`.
    ///
    /// Emits RELEASED on success, RELEASE_FAILED otherwise. Releasing
    /// during Probing suppresses the pending ACQUIRED.
    pub fn release_range(&mut self, sender: SenderId, id: RangeId) {
        let owned = self
            .ranges
            .get(&id)
            .is_some_and(|r| r.sender == sender && r.state != RangeState::Released);
        if !owned {
            self.notifications.push(
                sender,
                Notification::ReleaseFailed {
                    id,
                    error: NotifyError::UnknownId,
                },
            );
            return;
        }

        let Some(mut range) = self.ranges.remove(&id) else {
            return;
        };
        self.intervals.remove(range.low);
        self.timers.remove(id);
        range.state = RangeState::Released;
        log::debug!("[maap] released id {}: {:#014x} + {}", id, range.low, range.count());
        self.notifications.push(
            sender,
            Notification::Released {
                id,
                start: range.low,
                count: range.count(),
            },
        );
    }

    /// Queue a STATUS notification for `id`, whether known or not.
    pub fn range_status(&mut self, sender: SenderId, id: RangeId) {
        let info = self.ranges.get(&id).map(|r| RangeInfo {
            start: r.low,
            count: r.count(),
            state: r.state,
        });
        self.notifications.push(sender, Notification::Status { id, info });
    }

    /// Process one received Ethernet frame.
    ///
    /// Returns `Err(ParseError::NotMaap)` for foreign traffic so the
    /// host can dispatch it elsewhere; malformed MAAP frames also come
    /// back as errors and are simply dropped. A single frame may affect
    /// several local reservations; each is arbitrated independently.
    pub fn handle_packet(&mut self, frame: &[u8]) -> Result<(), ParseError> {
        let pdu = MaapPdu::parse(frame)?;
        if pdu.src_mac == self.src_mac {
            // Our own multicast looped back.
            return Ok(());
        }

        let (start, count) = pdu.match_range();
        if count == 0 {
            return Ok(());
        }
        let high = start + u64::from(count) - 1;

        let hits: Vec<RangeId> = self
            .intervals
            .overlapping(start, high)
            .map(|(_, _, id)| id)
            .collect();
        for id in hits {
            self.arbitrate(id, &pdu);
        }
        Ok(())
    }

    /// Pop and act on every expired timer, in deadline order.
    pub fn handle_timer(&mut self) {
        let now = self.clock.now();
        while let Some(id) = self.timers.pop_expired(now) {
            self.act_on_expiry(id, now);
        }
    }

    /// Time until the next scheduled action, `Duration::MAX` when no
    /// reservation is waiting. The host sleeps at most this long.
    #[must_use]
    pub fn delay_to_next_timer(&self) -> Duration {
        self.timers.delay_to_head(self.clock.now())
    }

    /// Take the oldest pending notification.
    pub fn next_notification(&mut self) -> Option<(SenderId, Notification)> {
        self.notifications.pop()
    }

    /// Snapshot of all live reservations, ascending by id.
    pub fn reserved_ranges(&self) -> impl Iterator<Item = (RangeId, RangeInfo)> + '_ {
        self.ranges.iter().map(|(&id, r)| {
            (
                id,
                RangeInfo {
                    start: r.low,
                    count: r.count(),
                    state: r.state,
                },
            )
        })
    }

    // ====================================================================
    // Incoming-packet arbitration
    // ====================================================================

    fn arbitrate(&mut self, id: RangeId, pdu: &MaapPdu) {
        let Some(range) = self.ranges.get(&id) else {
            return;
        };
        let (state, low, high) = (range.state, range.low, range.high);

        match (state, pdu.message_type) {
            // Probe against probe: numerically lower stream ID keeps
            // probing and defends; the higher one surrenders.
            (RangeState::Probing, MessageType::Probe) => {
                if self.src_mac == pdu.stream_id {
                    return;
                }
                if self.src_mac < pdu.stream_id {
                    self.send_defend(low, high, pdu);
                } else {
                    self.yield_range(id, pdu);
                }
            }
            // A probing claim loses to any established traffic.
            (RangeState::Probing, _) => {
                log::debug!(
                    "[maap] probe of id {} conflicts with {:?} from {:#014x}",
                    id,
                    pdu.message_type,
                    pdu.src_mac
                );
                self.yield_range(id, pdu);
            }
            // A defended claim answers probes with DEFEND.
            (RangeState::Defending, MessageType::Probe) => {
                self.send_defend(low, high, pdu);
            }
            // Announce against announce: numerically lower stream ID wins.
            (RangeState::Defending, MessageType::Announce) => {
                if self.src_mac == pdu.stream_id {
                    // Same identity as ours: nothing to arbitrate.
                    return;
                }
                if self.src_mac < pdu.stream_id {
                    self.send_defend(low, high, pdu);
                } else {
                    log::debug!(
                        "[maap] id {} lost announce arbitration to {:#018x}",
                        id,
                        pdu.stream_id
                    );
                    self.yield_range(id, pdu);
                }
            }
            // A peer defends this space: surrender it.
            (RangeState::Defending, MessageType::Defend) => {
                self.yield_range(id, pdu);
            }
            (RangeState::Released, _) => {}
        }
    }

    /// Surrender `id` to the peer claim described by `pdu`.
    fn yield_range(&mut self, id: RangeId, pdu: &MaapPdu) {
        let Some(mut range) = self.ranges.remove(&id) else {
            return;
        };
        self.intervals.remove(range.low);
        self.timers.remove(id);
        range.state = RangeState::Released;

        let (conflict_start, conflict_count) = pdu.match_range();
        self.notifications.push(
            range.sender,
            Notification::Yielded {
                id,
                start: range.low,
                count: range.count(),
                conflict_start,
                conflict_count,
            },
        );
    }

    // ====================================================================
    // Timer expiry
    // ====================================================================

    fn act_on_expiry(&mut self, id: RangeId, now: Timestamp) {
        let Some(range) = self.ranges.get(&id) else {
            return;
        };
        let (state, counter, low, count, sender) =
            (range.state, range.counter, range.low, range.count(), range.sender);

        match state {
            RangeState::Probing if counter > 0 => {
                self.send_probe(low, count);
                let next = now
                    + self.jitter(MAAP_PROBE_INTERVAL_BASE_MS, MAAP_PROBE_INTERVAL_VARIATION_MS);
                if let Some(r) = self.ranges.get_mut(&id) {
                    r.counter -= 1;
                    r.next_act_time = next;
                }
                self.timers.push(next, id);
            }
            RangeState::Probing => {
                // All probes went unanswered: the range is won.
                self.send_announce(low, count);
                let next = now
                    + self.jitter(
                        MAAP_ANNOUNCE_INTERVAL_BASE_MS,
                        MAAP_ANNOUNCE_INTERVAL_VARIATION_MS,
                    );
                if let Some(r) = self.ranges.get_mut(&id) {
                    r.state = RangeState::Defending;
                    r.counter = 0;
                    r.next_act_time = next;
                }
                self.timers.push(next, id);
                log::debug!("[maap] acquired id {}: {:#014x} + {}", id, low, count);
                self.notifications.push(
                    sender,
                    Notification::Acquired {
                        id,
                        start: low,
                        count,
                    },
                );
            }
            RangeState::Defending => {
                self.send_announce(low, count);
                let next = now
                    + self.jitter(
                        MAAP_ANNOUNCE_INTERVAL_BASE_MS,
                        MAAP_ANNOUNCE_INTERVAL_VARIATION_MS,
                    );
                if let Some(r) = self.ranges.get_mut(&id) {
                    r.next_act_time = next;
                }
                self.timers.push(next, id);
            }
            RangeState::Released => {}
        }
    }

    // ====================================================================
    // Outgoing PDUs
    // ====================================================================

    fn send_probe(&mut self, start: u64, count: u16) {
        let mut pdu = MaapPdu::new(MessageType::Probe, self.src_mac);
        pdu.dest_mac = self.dest_mac;
        pdu.request_start = start;
        pdu.request_count = count;
        self.transmit(&pdu);
    }

    fn send_announce(&mut self, start: u64, count: u16) {
        let mut pdu = MaapPdu::new(MessageType::Announce, self.src_mac);
        pdu.dest_mac = self.dest_mac;
        pdu.request_start = start;
        pdu.request_count = count;
        self.transmit(&pdu);
    }

    /// DEFEND echoes the peer's request and names the overlap with our
    /// interval `[low, high]` in the conflict fields.
    fn send_defend(&mut self, low: u64, high: u64, against: &MaapPdu) {
        let req_high = against.request_start + u64::from(against.request_count.max(1)) - 1;
        let conflict_low = low.max(against.request_start);
        let conflict_high = high.min(req_high);

        let mut pdu = MaapPdu::new(MessageType::Defend, self.src_mac);
        pdu.dest_mac = self.dest_mac;
        pdu.request_start = against.request_start;
        pdu.request_count = against.request_count;
        pdu.conflict_start = conflict_low;
        pdu.conflict_count = (conflict_high.saturating_sub(conflict_low) + 1) as u16;
        self.transmit(&pdu);
    }

    fn transmit(&mut self, pdu: &MaapPdu) {
        let frame = match pdu.encode() {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("[maap] dropping unencodable {:?}: {}", pdu.message_type, err);
                return;
            }
        };
        // A failed send is a lost transmission; the next scheduled
        // action retransmits.
        if let Err(err) = self.transport.send(&frame) {
            log::warn!("[maap] send of {:?} failed: {}", pdu.message_type, err);
        }
    }

    fn jitter(&mut self, base_ms: u64, variation_ms: u64) -> Duration {
        Duration::from_millis(base_ms + self.entropy.uniform(variation_ms))
    }
}
