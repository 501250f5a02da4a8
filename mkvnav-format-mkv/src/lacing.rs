// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use mkvnav_core::errors::{decode_error, Result};
use mkvnav_core::io::{BufReader, ReadBytes};

use crate::ebml::{read_signed_vint, read_unsigned_vint};

enum Lacing {
    None,
    Xiph,
    FixedSize,
    Ebml,
}

fn parse_flags(flags: u8) -> Lacing {
    match (flags >> 1) & 0b11 {
        0b00 => Lacing::None,
        0b01 => Lacing::Xiph,
        0b10 => Lacing::FixedSize,
        _ => Lacing::Ebml,
    }
}

fn read_ebml_sizes<R: ReadBytes>(mut reader: R, frames: usize) -> Result<Vec<u64>> {
    let mut sizes: Vec<u64> = Vec::with_capacity(frames);
    for _ in 0..frames {
        if let Some(last_size) = sizes.last().copied() {
            let delta = read_signed_vint(&mut reader)?;
            let size = last_size as i64 + delta;
            if size < 0 {
                return decode_error("mkv: negative laced frame size");
            }
            sizes.push(size as u64)
        }
        else {
            let size = read_unsigned_vint(&mut reader)?;
            sizes.push(size);
        }
    }

    Ok(sizes)
}

fn read_xiph_sizes<R: ReadBytes>(mut reader: R, frames: usize) -> Result<Vec<u64>> {
    let mut prefixes = 0;
    let mut sizes = Vec::with_capacity(frames);
    while sizes.len() < frames {
        let byte = reader.read_byte()? as u64;
        if byte == 255 {
            prefixes += 1;
        }
        else {
            let size = prefixes * 255 + byte;
            prefixes = 0;
            sizes.push(size);
        }
    }

    Ok(sizes)
}

/// Reads the track number, relative timestamp and flags of a block without splitting it.
pub(crate) fn read_block_header(block: &[u8]) -> Result<(u64, i16, u8)> {
    let mut reader = BufReader::new(block);
    let track = read_unsigned_vint(&mut reader)?;
    let timecode = reader.read_be_u16()? as i16;
    let flags = reader.read_byte()?;
    Ok((track, timecode, flags))
}

/// Splits the payload of a Block or SimpleBlock into its frames.
pub(crate) fn extract_frames(block: &[u8]) -> Result<Vec<Box<[u8]>>> {
    let mut reader = BufReader::new(block);
    let _track = read_unsigned_vint(&mut reader)?;
    let _timecode = reader.read_be_u16()?;
    let flags = reader.read_byte()?;

    let mut frames = Vec::new();

    match parse_flags(flags) {
        Lacing::None => {
            let data = reader.read_boxed_slice_exact(block.len() - reader.pos() as usize)?;
            frames.push(data);
        }
        lacing @ (Lacing::Xiph | Lacing::Ebml) => {
            // The number of stored sizes is the number of frames minus one, the size of the
            // last frame is what remains of the block.
            let count = reader.read_byte()? as usize;
            let sizes = match lacing {
                Lacing::Xiph => read_xiph_sizes(&mut reader, count)?,
                _ => read_ebml_sizes(&mut reader, count)?,
            };

            for frame_size in sizes {
                if frame_size > (block.len() - reader.pos() as usize) as u64 {
                    return decode_error("mkv: laced frame exceeds block");
                }
                frames.push(reader.read_boxed_slice_exact(frame_size as usize)?);
            }

            let size = block.len() - reader.pos() as usize;
            frames.push(reader.read_boxed_slice_exact(size)?);
        }
        Lacing::FixedSize => {
            let count = reader.read_byte()? as usize + 1;
            let total_size = block.len() - reader.pos() as usize;
            if total_size % count != 0 {
                return decode_error("mkv: invalid block size");
            }

            let frame_size = total_size / count;
            for _ in 0..count {
                frames.push(reader.read_boxed_slice_exact(frame_size)?);
            }
        }
    }

    Ok(frames)
}
