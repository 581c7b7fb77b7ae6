// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MAAP PDU decoder (IEEE 1722-2016 Annex B Figure B.1).
//!
//! Classification comes first: a frame whose ethertype is not the AVTP
//! ethertype is [`ParseError::NotMaap`] so the host can dispatch it
//! elsewhere. Everything after that point is a MAAP frame, and any
//! violation is a malformed-PDU error that the engine drops silently.

use super::{get_mac48, MaapPdu, MessageType};
use crate::config::{MAAP_AVTP_VERSION, MAAP_DATA_LENGTH, MAAP_ETHERTYPE, MAAP_PDU_SIZE, MAAP_SUBTYPE};

/// Decode failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Not a MAAP frame at all (ethertype mismatch or truncated L2 header).
    NotMaap,
    /// MAAP ethertype but fewer than 42 bytes.
    TooShort(usize),
    /// AVTP subtype is not the MAAP subtype.
    BadSubtype(u8),
    /// AVTP control header version is not supported.
    UnsupportedVersion(u8),
    /// `maap_data_length` disagrees with the fixed PDU body size.
    LengthMismatch(u16),
    /// The 4-bit message type is not PROBE, DEFEND or ANNOUNCE.
    BadMessageType(u8),
}

impl ParseError {
    /// True for frames that simply belong to another protocol.
    #[must_use]
    pub fn is_not_maap(&self) -> bool {
        matches!(self, ParseError::NotMaap)
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::NotMaap => write!(f, "not a MAAP frame"),
            ParseError::TooShort(len) => {
                write!(f, "MAAP frame truncated: {} of {} bytes", len, MAAP_PDU_SIZE)
            }
            ParseError::BadSubtype(s) => write!(f, "unexpected AVTP subtype {:#04x}", s),
            ParseError::UnsupportedVersion(v) => write!(f, "unsupported AVTP version {}", v),
            ParseError::LengthMismatch(l) => write!(f, "maap_data_length {} != 16", l),
            ParseError::BadMessageType(t) => write!(f, "unknown MAAP message type {}", t),
        }
    }
}

impl std::error::Error for ParseError {}

/// Decode a raw Ethernet frame into a [`MaapPdu`].
pub fn parse(frame: &[u8]) -> Result<MaapPdu, ParseError> {
    // Classification: reject foreign traffic before validating anything.
    if frame.len() < 14 {
        return Err(ParseError::NotMaap);
    }
    let ethertype = u16::from_be_bytes([frame[12], frame[13]]);
    if ethertype != MAAP_ETHERTYPE {
        return Err(ParseError::NotMaap);
    }

    if frame.len() < MAAP_PDU_SIZE {
        return Err(ParseError::TooShort(frame.len()));
    }

    let subtype = frame[14];
    if subtype != MAAP_SUBTYPE {
        return Err(ParseError::BadSubtype(subtype));
    }

    // sv(1) | version(3) | message_type(4); the sv bit is not validated.
    let version = (frame[15] >> 4) & 0x07;
    if version != MAAP_AVTP_VERSION {
        return Err(ParseError::UnsupportedVersion(version));
    }
    let raw_type = frame[15] & 0x0F;
    let message_type =
        MessageType::from_wire(raw_type).ok_or(ParseError::BadMessageType(raw_type))?;

    // maap_version(5) | maap_data_length(11)
    let word = u16::from_be_bytes([frame[16], frame[17]]);
    let maap_version = (word >> 11) as u8;
    let data_length = word & 0x07FF;
    if data_length != MAAP_DATA_LENGTH {
        return Err(ParseError::LengthMismatch(data_length));
    }

    let mut stream_id_bytes = [0u8; 8];
    stream_id_bytes.copy_from_slice(&frame[18..26]);

    Ok(MaapPdu {
        dest_mac: get_mac48(frame, 0),
        src_mac: get_mac48(frame, 6),
        message_type,
        maap_version,
        stream_id: u64::from_be_bytes(stream_id_bytes),
        request_start: get_mac48(frame, 26),
        request_count: u16::from_be_bytes([frame[32], frame[33]]),
        conflict_start: get_mac48(frame, 34),
        conflict_count: u16::from_be_bytes([frame[40], frame[41]]),
    })
}
