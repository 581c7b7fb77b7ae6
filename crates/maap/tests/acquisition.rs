// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::unreadable_literal)] // MAC address constants
#![allow(clippy::similar_names)] // paired engines a/b

//! End-to-end acquisition scenarios.
//!
//! Engines run against scripted adapters: the clock moves only when a
//! test advances it, entropy is a fixed settable value, and frames are
//! hand-delivered between engines to emulate the shared segment.

mod common;

use common::{deliver, TestNode};
use maap::config::{MAAP_DYNAMIC_POOL_BASE, MAAP_DYNAMIC_POOL_SIZE};
use maap::{MaapPdu, MessageType, Notification, NotifyError, RangeState, SenderId};
use std::time::Duration;

const POOL_END: u64 = MAAP_DYNAMIC_POOL_BASE + MAAP_DYNAMIC_POOL_SIZE as u64 - 1;

fn parse_one(frames: &[Vec<u8>]) -> MaapPdu {
    assert_eq!(frames.len(), 1, "expected exactly one frame");
    MaapPdu::parse(&frames[0]).unwrap()
}

/// Drive a freshly reserved range through its probe sequence until the
/// ACQUIRED notification fires (entropy 0, so every interval is exact).
fn run_to_acquired(node: &mut TestNode) {
    node.advance_ms(0); // initial schedule has zero jitter
    node.advance_ms(500);
    node.advance_ms(500);
    node.advance_ms(500);
}

// ============================================================================
// S1: acquisition on a quiet network
// ============================================================================

#[test]
fn quiet_network_acquisition_timeline() {
    let sender = SenderId(7);
    let mut a = TestNode::started(0x0022_9700_0001, sender);

    let id = a.mc.reserve_range(sender, 8).unwrap();

    // Reservation sends the first PROBE immediately and reports progress.
    let probe = parse_one(&a.take_frames());
    assert_eq!(probe.message_type, MessageType::Probe);
    assert_eq!(probe.request_count, 8);
    assert!(probe.request_start >= MAAP_DYNAMIC_POOL_BASE);
    assert!(probe.request_start + 7 <= POOL_END);
    let notes = a.drain_notifications();
    assert!(
        matches!(notes[..], [(s, Notification::Acquiring { id: i, count: 8, .. })] if s == sender && i == id)
    );

    // Three counted retransmits at the probe cadence.
    a.advance_ms(0);
    assert_eq!(parse_one(&a.take_frames()).message_type, MessageType::Probe);
    a.advance_ms(500);
    assert_eq!(parse_one(&a.take_frames()).message_type, MessageType::Probe);
    a.advance_ms(500);
    assert_eq!(parse_one(&a.take_frames()).message_type, MessageType::Probe);
    assert!(a.drain_notifications().is_empty());

    // Unanswered probes win the range: ANNOUNCE plus ACQUIRED.
    a.advance_ms(500);
    let announce = parse_one(&a.take_frames());
    assert_eq!(announce.message_type, MessageType::Announce);
    assert_eq!(announce.request_start, probe.request_start);
    let notes = a.drain_notifications();
    assert!(
        matches!(notes[..], [(s, Notification::Acquired { id: i, count: 8, .. })] if s == sender && i == id)
    );

    // Defending re-announces on the announce cadence.
    assert_eq!(a.mc.delay_to_next_timer(), Duration::from_millis(30_000));
    a.advance_ms(30_000);
    assert_eq!(parse_one(&a.take_frames()).message_type, MessageType::Announce);
    a.advance_ms(30_000);
    assert_eq!(parse_one(&a.take_frames()).message_type, MessageType::Announce);
}

// ============================================================================
// S2: simultaneous probes for the same address
// ============================================================================

#[test]
fn simultaneous_probes_lower_stream_id_wins() {
    let mut a = TestNode::started(0x0022_9700_0001, SenderId(1)); // lower stream ID
    let mut b = TestNode::started(0x0022_9700_0002, SenderId(2)); // higher stream ID

    let ida = a.mc.reserve_range(SenderId(1), 1).unwrap();
    let idb = b.mc.reserve_range(SenderId(2), 1).unwrap();
    a.drain_notifications();
    b.drain_notifications();
    a.take_frames(); // initial probes crossed on the wire

    // A receives B's probe for the same address: A defends and stays.
    deliver(&mut b, &mut a);
    let defend = parse_one(&a.take_frames());
    assert_eq!(defend.message_type, MessageType::Defend);
    assert_eq!(defend.conflict_count, 1);
    assert!(a.drain_notifications().is_empty());

    // B receives the DEFEND: B surrenders and reports YIELDED.
    deliver(&mut a, &mut b);
    let notes = b.drain_notifications();
    assert!(
        matches!(notes[..], [(s, Notification::Yielded { id, count: 1, .. })] if s == SenderId(2) && id == idb)
    );
    assert_eq!(b.mc.reserved_ranges().count(), 0);
    assert_eq!(b.mc.delay_to_next_timer(), Duration::MAX);

    // A completes probing undisturbed.
    run_to_acquired(&mut a);
    let notes = a.drain_notifications();
    assert!(matches!(notes[..], [(_, Notification::Acquired { id, .. })] if id == ida));
}

// ============================================================================
// S3: announce against an established defender
// ============================================================================

#[test]
fn defender_arbitrates_announce_by_stream_id() {
    let sender = SenderId(3);
    let mut a = TestNode::started(0x0022_9700_0005, sender);
    let id = a.mc.reserve_range(sender, 4).unwrap();
    run_to_acquired(&mut a);
    a.take_frames();
    a.drain_notifications();
    let (_, info) = a.mc.reserved_ranges().next().unwrap();
    assert_eq!(info.state, RangeState::Defending);

    // Higher peer stream ID: A defends and keeps the range.
    let mut announce = MaapPdu::new(MessageType::Announce, 0x0022_9700_0009);
    announce.request_start = info.start;
    announce.request_count = 4;
    a.mc.handle_packet(&announce.encode().unwrap()).unwrap();

    let defend = parse_one(&a.take_frames());
    assert_eq!(defend.message_type, MessageType::Defend);
    assert_eq!(defend.conflict_start, info.start);
    assert_eq!(defend.conflict_count, 4);
    assert!(a.drain_notifications().is_empty());
    assert_eq!(a.mc.reserved_ranges().count(), 1);

    // Lower peer stream ID: A yields.
    let mut announce = MaapPdu::new(MessageType::Announce, 0x0022_9700_0001);
    announce.request_start = info.start;
    announce.request_count = 4;
    a.mc.handle_packet(&announce.encode().unwrap()).unwrap();

    assert!(a.take_frames().is_empty());
    let notes = a.drain_notifications();
    assert!(
        matches!(notes[..], [(s, Notification::Yielded { id: i, count: 4, .. })] if s == sender && i == id)
    );
    assert_eq!(a.mc.reserved_ranges().count(), 0);
}

#[test]
fn defender_yields_to_defend() {
    let sender = SenderId(4);
    let mut a = TestNode::started(0x0022_9700_0005, sender);
    a.mc.reserve_range(sender, 4).unwrap();
    run_to_acquired(&mut a);
    a.take_frames();
    a.drain_notifications();
    let (_, info) = a.mc.reserved_ranges().next().unwrap();

    let mut defend = MaapPdu::new(MessageType::Defend, 0x0022_9700_0009);
    defend.request_start = info.start;
    defend.request_count = 4;
    defend.conflict_start = info.start + 1;
    defend.conflict_count = 2;
    a.mc.handle_packet(&defend.encode().unwrap()).unwrap();

    let notes = a.drain_notifications();
    assert!(matches!(
        notes[..],
        [(
            _,
            Notification::Yielded {
                conflict_count: 2,
                ..
            }
        )]
    ));
    assert_eq!(a.mc.reserved_ranges().count(), 0);
}

#[test]
fn probing_range_yields_to_announce() {
    let sender = SenderId(5);
    let mut a = TestNode::started(0x0022_9700_0005, sender);
    let id = a.mc.reserve_range(sender, 8).unwrap();
    a.take_frames();
    a.drain_notifications();

    let (_, info) = a.mc.reserved_ranges().next().unwrap();
    let mut announce = MaapPdu::new(MessageType::Announce, 0x0022_9700_0009);
    announce.request_start = info.start + 2;
    announce.request_count = 1;
    a.mc.handle_packet(&announce.encode().unwrap()).unwrap();

    let notes = a.drain_notifications();
    assert!(matches!(notes[..], [(_, Notification::Yielded { id: i, .. })] if i == id));

    // No ACQUIRED may follow the surrendered probe sequence.
    run_to_acquired(&mut a);
    assert!(a.take_frames().is_empty());
    assert!(a.drain_notifications().is_empty());
}

// ============================================================================
// S4: release during probing
// ============================================================================

#[test]
fn release_during_probing_suppresses_acquired() {
    let sender = SenderId(9);
    let mut a = TestNode::started(0x0022_9700_0001, sender);
    let id = a.mc.reserve_range(sender, 100).unwrap();
    a.take_frames();
    a.drain_notifications();

    a.mc.release_range(sender, id);
    let notes = a.drain_notifications();
    assert!(
        matches!(notes[..], [(s, Notification::Released { id: i, count: 100, .. })] if s == sender && i == id)
    );

    // The probe schedule is gone with the range.
    run_to_acquired(&mut a);
    a.advance_ms(60_000);
    assert!(a.take_frames().is_empty());
    assert!(a.drain_notifications().is_empty());
}

#[test]
fn double_release_reports_unknown_id() {
    let sender = SenderId(9);
    let mut a = TestNode::started(0x0022_9700_0001, sender);
    let id = a.mc.reserve_range(sender, 4).unwrap();
    a.drain_notifications();

    a.mc.release_range(sender, id);
    a.mc.release_range(sender, id);
    let notes = a.drain_notifications();
    assert_eq!(notes.len(), 2);
    assert!(matches!(notes[0], (_, Notification::Released { id: i, .. }) if i == id));
    assert!(matches!(
        notes[1],
        (
            _,
            Notification::ReleaseFailed {
                error: NotifyError::UnknownId,
                ..
            }
        )
    ));
}

// ============================================================================
// S5: packets that must not mutate state
// ============================================================================

#[test]
fn foreign_and_disjoint_packets_mutate_nothing() {
    let sender = SenderId(2);
    let mut a = TestNode::started(0x0022_9700_0001, sender);
    a.mc.reserve_range(sender, 8).unwrap();
    a.take_frames();
    a.drain_notifications();
    let before: Vec<_> = a.mc.reserved_ranges().collect();

    // 42-byte frame with a foreign ethertype: rejected as non-MAAP.
    let mut peer = MaapPdu::new(MessageType::Probe, 0x0022_9700_0009);
    peer.request_start = before[0].1.start;
    peer.request_count = 8;
    let mut frame = peer.encode().unwrap();
    frame[12] = 0x08;
    frame[13] = 0x00;
    let err = a.mc.handle_packet(&frame).unwrap_err();
    assert!(err.is_not_maap());

    // MAAP probe for a disjoint range: accepted, but nothing changes.
    let mut far = MaapPdu::new(MessageType::Probe, 0x0022_9700_0009);
    far.request_start = before[0].1.start + 0x1000;
    far.request_count = 4;
    a.mc.handle_packet(&far.encode().unwrap()).unwrap();

    assert_eq!(a.mc.reserved_ranges().collect::<Vec<_>>(), before);
    assert!(a.take_frames().is_empty());
    assert!(a.drain_notifications().is_empty());
}

#[test]
fn own_looped_back_frames_are_ignored() {
    let sender = SenderId(2);
    let mut a = TestNode::started(0x0022_9700_0001, sender);
    a.mc.reserve_range(sender, 8).unwrap();
    let own = a.take_frames();
    a.drain_notifications();

    // Multicast loopback of our own probe must not trigger arbitration.
    a.mc.handle_packet(&own[0]).unwrap();
    assert_eq!(a.mc.reserved_ranges().count(), 1);
    assert!(a.drain_notifications().is_empty());
}

// ============================================================================
// S6: pool packing
// ============================================================================

#[test]
fn two_large_blocks_fill_the_pool() {
    let sender = SenderId(6);
    let mut a = TestNode::started(0x0022_9700_0001, sender);

    a.set_entropy(0);
    let id1 = a.mc.reserve_range(sender, 32_000).unwrap();
    a.set_entropy(32_000);
    let id2 = a.mc.reserve_range(sender, 32_000).unwrap();
    assert_ne!(id1, id2);

    let ranges: Vec<_> = a.mc.reserved_ranges().collect();
    assert_eq!(ranges.len(), 2);
    for (_, info) in &ranges {
        assert!(info.start >= MAAP_DYNAMIC_POOL_BASE);
        assert!(info.start + u64::from(info.count) - 1 <= POOL_END);
    }
    let (first, second) = (&ranges[0].1, &ranges[1].1);
    let disjoint = first.start + u64::from(first.count) <= second.start
        || second.start + u64::from(second.count) <= first.start;
    assert!(disjoint, "reserved ranges overlap");

    a.drain_notifications();
    assert_eq!(a.mc.reserve_range(sender, 32_000), None);
    let notes = a.drain_notifications();
    assert!(matches!(
        notes[..],
        [(
            _,
            Notification::ReserveFailed {
                error: NotifyError::NoFreeRange
            }
        )]
    ));
}

// ============================================================================
// Boundaries and status
// ============================================================================

#[test]
fn reserve_length_bounds() {
    let sender = SenderId(1);
    let mut a = TestNode::started(0x0022_9700_0001, sender);
    assert!(a.mc.reserve_range(sender, 1).is_some());

    // A pool of exactly 0xFFFF addresses admits the maximum reservation.
    let mut b = TestNode::new(0x0022_9700_0002);
    b.mc.init(sender, MAAP_DYNAMIC_POOL_BASE, 0xFFFF);
    b.drain_notifications();
    assert!(b.mc.reserve_range(sender, 0xFFFF).is_some());

    let mut c = TestNode::started(0x0022_9700_0003, sender);
    assert_eq!(c.mc.reserve_range(sender, 0x10000), None);
    assert_eq!(c.mc.reserve_range(sender, 0), None);
    let notes = c.drain_notifications();
    assert_eq!(notes.len(), 2);
    for (_, note) in notes {
        assert!(matches!(
            note,
            Notification::ReserveFailed {
                error: NotifyError::InvalidArgument
            }
        ));
    }
}

#[test]
fn status_reports_known_and_unknown_ids() {
    let sender = SenderId(8);
    let mut a = TestNode::started(0x0022_9700_0001, sender);
    let id = a.mc.reserve_range(sender, 16).unwrap();
    a.drain_notifications();

    a.mc.range_status(sender, id);
    a.mc.range_status(sender, id + 100);
    let notes = a.drain_notifications();
    assert!(matches!(
        notes[0],
        (_, Notification::Status { info: Some(info), .. })
            if info.count == 16 && info.state == RangeState::Probing
    ));
    assert!(matches!(notes[1], (_, Notification::Status { info: None, .. })));
}

#[test]
fn one_packet_can_affect_several_ranges() {
    let sender = SenderId(2);
    let mut a = TestNode::started(0x0022_9700_0001, sender);
    a.set_entropy(0);
    a.mc.reserve_range(sender, 4).unwrap(); // [base, base+3]
    a.set_entropy(4);
    a.mc.reserve_range(sender, 4).unwrap(); // [base+4, base+7]

    // Walk both probe sequences to completion.
    a.set_entropy(0);
    a.advance_ms(0);
    for _ in 0..6 {
        a.advance_ms(500);
    }
    a.take_frames();
    a.drain_notifications();
    assert!(a
        .mc
        .reserved_ranges()
        .all(|(_, info)| info.state == RangeState::Defending));

    // One probe spanning both defended ranges draws two DEFENDs.
    let mut probe = MaapPdu::new(MessageType::Probe, 0x0022_9700_0009);
    probe.request_start = MAAP_DYNAMIC_POOL_BASE + 2;
    probe.request_count = 4;
    a.mc.handle_packet(&probe.encode().unwrap()).unwrap();

    let frames = a.take_frames();
    assert_eq!(frames.len(), 2);
    for frame in &frames {
        assert_eq!(
            MaapPdu::parse(frame).unwrap().message_type,
            MessageType::Defend
        );
    }
}
