#![deny(unsafe_code)]
//! Codecs for the derived-image composition metadata carried by HEIF files.
//!
//! HEIF composes large pictures out of smaller coded tiles. The composition is
//! described by two item payloads: `grid` (tiles in a fixed row/column raster,
//! see ISO/IEC 23008-12:2017 § 6.6.2.3) and `iovl` (tiles placed at arbitrary
//! offsets on a filled canvas, § 6.6.2.4). Both payloads use a self-describing
//! encoding where a single flag bit selects 16- or 32-bit integer fields for
//! the remainder of the structure.
//!
//! This crate encodes and decodes those payloads, and ships the byte-level
//! helpers needed to feed the referenced HEVC tile bitstreams to a container
//! writer: Annex-B to length-prefixed reframing and VPS/SPS/PPS parameter set
//! extraction (see [`hevc`]).
//!
//! Box-tree parsing, item references and file I/O are out of scope here; for
//! those, pair this crate with a container reader/writer such as
//! `zenavif-parse`.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use fallible_collections::TryReserveError;
use log::warn;

use std::io::{Read, Write};

pub mod hevc;

#[doc(hidden)]
pub type TryVec<T> = fallible_collections::TryVec<T>;

// To ensure we don't use stdlib allocating types by accident
#[allow(dead_code)]
struct Vec;
#[allow(dead_code)]
struct Box;
#[allow(dead_code)]
struct HashMap;
#[allow(dead_code)]
struct String;

/// Describes codec failures.
///
/// This enum wraps the standard `io::Error` type, unified with
/// our own codec error states and those of crates we use.
#[derive(Debug)]
pub enum Error {
    /// Encode or decode error caused by corrupt or malformed data.
    InvalidData(&'static str),
    /// Error caused by limited codec support rather than invalid data.
    Unsupported(&'static str),
    /// Reflect `std::io::ErrorKind::UnexpectedEof` for short data.
    UnexpectedEOF,
    /// Propagate underlying errors from `std::io`.
    Io(std::io::Error),
    /// Out of memory
    OutOfMemory,
    /// A scanner reached a state its own bookkeeping rules out; indicates a
    /// defect in this crate rather than in the input.
    InvalidState(&'static str),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::InvalidData(s) | Self::Unsupported(s) | Self::InvalidState(s) => s,
            Self::UnexpectedEOF => "EOF",
            Self::Io(err) => return err.fmt(f),
            Self::OutOfMemory => "OOM",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for Error {}

impl From<bitreader::BitReaderError> for Error {
    #[cold]
    #[cfg_attr(debug_assertions, track_caller)]
    fn from(err: bitreader::BitReaderError) -> Self {
        log::warn!("bitreader: {err}");
        debug_assert!(!matches!(err, bitreader::BitReaderError::TooManyBitsForType { .. })); // bug
        Self::InvalidData("truncated bits")
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => Self::UnexpectedEOF,
            _ => Self::Io(err),
        }
    }
}

impl From<std::num::TryFromIntError> for Error {
    fn from(_: std::num::TryFromIntError) -> Self {
        Self::Unsupported("integer conversion failed")
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        let kind = match err {
            Error::InvalidData(_) => std::io::ErrorKind::InvalidData,
            Error::UnexpectedEOF => std::io::ErrorKind::UnexpectedEof,
            Error::Io(io_err) => return io_err,
            _ => std::io::ErrorKind::Other,
        };
        Self::new(kind, err)
    }
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Self::OutOfMemory
    }
}

/// Result shorthand using our Error enum.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Options for decoding descriptor payloads
#[derive(Debug, Clone, Copy)]
#[derive(Default)]
pub struct ParseOptions {
    /// Enable strict validation mode
    ///
    /// When true, nonzero reserved bits in a descriptor's flag byte are
    /// rejected instead of ignored. Existing writers are expected to emit
    /// zeroes there, but readers have historically not enforced it, so
    /// strictness is opt-in.
    ///
    /// Default: false (reserved bits ignored, with a log warning)
    pub strict: bool,
}

/// Flag byte bit 0: 32-bit dimension and offset fields instead of 16-bit.
const WIDE_FIELDS: u8 = 1;

/// An `ImageGrid` item payload: tiles in a fixed raster reconstructing one
/// large image.
///
/// Row and column counts are stored off by one; a `2×2` grid stores
/// `rows_minus_one == 1`. Output dimensions are the size of the reconstructed
/// image in pixels, which may be smaller than the sum of the tile sizes when
/// the right/bottom tiles are cropped.
///
/// See ISO/IEC 23008-12:2017 § 6.6.2.3
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageGrid {
    pub rows_minus_one: u8,
    pub columns_minus_one: u8,
    pub output_width: u32,
    pub output_height: u32,
}

impl ImageGrid {
    /// Actual row count.
    pub fn rows(&self) -> u16 {
        u16::from(self.rows_minus_one) + 1
    }

    /// Actual column count.
    pub fn columns(&self) -> u16 {
        u16::from(self.columns_minus_one) + 1
    }
}

/// One composited sub-image placement inside an [`ImageOverlay`].
///
/// Offsets are relative to the top-left corner of the canvas and may be
/// negative, placing part of the sub-image outside the visible area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayOffset {
    pub horizontal_offset: i32,
    pub vertical_offset: i32,
}

/// An `ImageOverlay` item payload: sub-images placed at arbitrary offsets on
/// a filled canvas.
///
/// `offsets` holds one entry per composited sub-image, in the same order the
/// sub-images are listed in the overlay item's `dimg` references. The wire
/// encoding carries no count for this list; see [`read_image_overlay`] for
/// the sizing contract that follows from that.
///
/// See ISO/IEC 23008-12:2017 § 6.6.2.4
#[derive(Debug, Default)]
pub struct ImageOverlay {
    /// Canvas fill color, as four 16-bit RGBA channel values. When the coded
    /// content uses fewer bits per channel, the fill value is stored here
    /// left-shifted into the full 16-bit range.
    pub canvas_fill_value_r: u16,
    pub canvas_fill_value_g: u16,
    pub canvas_fill_value_b: u16,
    pub canvas_fill_value_a: u16,
    pub output_width: u32,
    pub output_height: u32,
    pub offsets: TryVec<OverlayOffset>,
}

/// Serialize an [`ImageGrid`] payload.
///
/// 32-bit dimension fields are selected only when *both* dimensions overflow
/// 16 bits; a lone oversized dimension is truncated to its low 16 bits. The
/// selection is recorded in bit 0 of the flag byte so decoders never have to
/// re-derive it.
pub fn write_image_grid<T: Write>(grid: &ImageGrid, dst: &mut T) -> Result<()> {
    let wide = grid.output_width > u32::from(u16::MAX) && grid.output_height > u32::from(u16::MAX);

    dst.write_u8(0)?; // version
    dst.write_u8(if wide { WIDE_FIELDS } else { 0 })?;
    dst.write_u8(grid.rows_minus_one)?;
    dst.write_u8(grid.columns_minus_one)?;

    if wide {
        dst.write_u32::<BigEndian>(grid.output_width)?;
        dst.write_u32::<BigEndian>(grid.output_height)?;
    } else {
        dst.write_u16::<BigEndian>(grid.output_width as u16)?;
        dst.write_u16::<BigEndian>(grid.output_height as u16)?;
    }
    Ok(())
}

/// Parse an [`ImageGrid`] payload with default options.
pub fn read_image_grid<T: Read>(src: &mut T) -> Result<ImageGrid> {
    read_image_grid_with_options(src, &ParseOptions::default())
}

/// Parse an [`ImageGrid`] payload.
///
/// Field widths are taken from the flag byte actually present in the stream.
/// Fails with [`Error::UnexpectedEOF`] when the input is shorter than the
/// header plus the selected field widths.
pub fn read_image_grid_with_options<T: Read>(src: &mut T, options: &ParseOptions) -> Result<ImageGrid> {
    let flags = read_descriptor_header(src, options)?;

    let rows_minus_one = src.read_u8()?;
    let columns_minus_one = src.read_u8()?;

    let (output_width, output_height) = if flags & WIDE_FIELDS != 0 {
        (be_u32(src)?, be_u32(src)?)
    } else {
        (u32::from(be_u16(src)?), u32::from(be_u16(src)?))
    };

    Ok(ImageGrid {
        rows_minus_one,
        columns_minus_one,
        output_width,
        output_height,
    })
}

/// Serialize an [`ImageOverlay`] payload.
///
/// Unlike the grid encoding, *any* oversized value switches the whole
/// structure to 32-bit fields: a dimension above 65535, or any offset
/// component outside the signed 16-bit range. Canvas fill channels are always
/// 16-bit regardless of the flag.
pub fn write_image_overlay<T: Write>(iovl: &ImageOverlay, dst: &mut T) -> Result<()> {
    let wide = iovl.output_width > u32::from(u16::MAX)
        || iovl.output_height > u32::from(u16::MAX)
        || iovl.offsets.iter().any(|entry| {
            entry.horizontal_offset > i32::from(i16::MAX)
                || entry.horizontal_offset < i32::from(i16::MIN)
                || entry.vertical_offset > i32::from(i16::MAX)
                || entry.vertical_offset < i32::from(i16::MIN)
        });

    dst.write_u8(0)?; // version
    dst.write_u8(if wide { WIDE_FIELDS } else { 0 })?;

    dst.write_u16::<BigEndian>(iovl.canvas_fill_value_r)?;
    dst.write_u16::<BigEndian>(iovl.canvas_fill_value_g)?;
    dst.write_u16::<BigEndian>(iovl.canvas_fill_value_b)?;
    dst.write_u16::<BigEndian>(iovl.canvas_fill_value_a)?;

    if wide {
        dst.write_u32::<BigEndian>(iovl.output_width)?;
        dst.write_u32::<BigEndian>(iovl.output_height)?;
    } else {
        dst.write_u16::<BigEndian>(iovl.output_width as u16)?;
        dst.write_u16::<BigEndian>(iovl.output_height as u16)?;
    }

    for entry in &iovl.offsets {
        if wide {
            dst.write_i32::<BigEndian>(entry.horizontal_offset)?;
            dst.write_i32::<BigEndian>(entry.vertical_offset)?;
        } else {
            dst.write_i16::<BigEndian>(entry.horizontal_offset as i16)?;
            dst.write_i16::<BigEndian>(entry.vertical_offset as i16)?;
        }
    }
    Ok(())
}

/// Parse an [`ImageOverlay`] payload with default options.
pub fn read_image_overlay(data: &[u8]) -> Result<ImageOverlay> {
    read_image_overlay_with_options(data, &ParseOptions::default())
}

/// Parse an [`ImageOverlay`] payload.
///
/// The offset list carries no count on the wire: offset pairs are consumed
/// until `data` is exhausted, which is why this takes a slice rather than a
/// reader. The container knows the payload size; the payload itself doesn't.
/// Callers must pass exactly the item payload — an over-long slice decodes
/// garbage trailing pairs, and a slice cut mid-pair fails with
/// [`Error::UnexpectedEOF`].
pub fn read_image_overlay_with_options(data: &[u8], options: &ParseOptions) -> Result<ImageOverlay> {
    let mut src = data;
    let flags = read_descriptor_header(&mut src, options)?;
    let wide = flags & WIDE_FIELDS != 0;

    let canvas_fill_value_r = be_u16(&mut src)?;
    let canvas_fill_value_g = be_u16(&mut src)?;
    let canvas_fill_value_b = be_u16(&mut src)?;
    let canvas_fill_value_a = be_u16(&mut src)?;

    let (output_width, output_height) = if wide {
        (be_u32(&mut src)?, be_u32(&mut src)?)
    } else {
        (u32::from(be_u16(&mut src)?), u32::from(be_u16(&mut src)?))
    };

    // Read as many offsets as there are bytes left. This should match the
    // overlay's 'dimg' reference count, but that isn't knowable here.
    let mut offsets = TryVec::new();
    while !src.is_empty() {
        let (horizontal_offset, vertical_offset) = if wide {
            (be_i32(&mut src)?, be_i32(&mut src)?)
        } else {
            (i32::from(be_i16(&mut src)?), i32::from(be_i16(&mut src)?))
        };
        offsets.push(OverlayOffset {
            horizontal_offset,
            vertical_offset,
        })?;
    }

    Ok(ImageOverlay {
        canvas_fill_value_r,
        canvas_fill_value_g,
        canvas_fill_value_b,
        canvas_fill_value_a,
        output_width,
        output_height,
        offsets,
    })
}

// Common descriptor prefix: a version byte and a flag byte. Only version 0 is
// defined; the version is discarded rather than checked, matching deployed
// readers. Bits 1..7 of the flag byte are reserved.
fn read_descriptor_header<T: Read>(src: &mut T, options: &ParseOptions) -> Result<u8> {
    let _version = src.read_u8()?;
    let flags = src.read_u8()?;

    if flags & !WIDE_FIELDS != 0 {
        if options.strict {
            return Err(Error::Unsupported("reserved descriptor flag bits set"));
        }
        warn!("ignoring reserved descriptor flag bits {:#04x}", flags & !WIDE_FIELDS);
    }

    Ok(flags)
}

fn be_u16<T: ReadBytesExt>(src: &mut T) -> Result<u16> {
    src.read_u16::<BigEndian>().map_err(From::from)
}

fn be_u32<T: ReadBytesExt>(src: &mut T) -> Result<u32> {
    src.read_u32::<BigEndian>().map_err(From::from)
}

fn be_i16<T: ReadBytesExt>(src: &mut T) -> Result<i16> {
    src.read_i16::<BigEndian>().map_err(From::from)
}

fn be_i32<T: ReadBytesExt>(src: &mut T) -> Result<i32> {
    src.read_i32::<BigEndian>().map_err(From::from)
}

#[test]
fn descriptor_header_ignores_reserved_bits_by_default() {
    let mut src = &[0u8, 0x83][..];
    let flags = read_descriptor_header(&mut src, &ParseOptions::default()).unwrap();
    assert_eq!(flags & WIDE_FIELDS, 1);
}

#[test]
fn descriptor_header_strict_rejects_reserved_bits() {
    let mut src = &[0u8, 0x02][..];
    let opts = ParseOptions { strict: true };
    assert!(matches!(
        read_descriptor_header(&mut src, &opts),
        Err(Error::Unsupported(_))
    ));
}

#[test]
fn signed_readers_are_twos_complement() {
    let mut src = &[0xffu8, 0xfe][..];
    assert_eq!(be_i16(&mut src).unwrap(), -2);
    let mut src = &[0x80u8, 0x00, 0x00, 0x00][..];
    assert_eq!(be_i32(&mut src).unwrap(), i32::MIN);
}
