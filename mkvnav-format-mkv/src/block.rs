// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::borrow::Cow;

use bitflags::bitflags;

use crate::track::Compression;

bitflags! {
    /// Properties of an emitted [`Block`].
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct BlockFlags: u32 {
        /// The frame can be decoded on its own.
        const KEYFRAME        = 1 << 0;
        /// The frame may be dropped without affecting other frames.
        const DISCARDABLE     = 1 << 1;
        /// The track is silenced by the cluster holding the frame.
        const SILENT          = 1 << 2;
        /// The frame only primes the decoder after a seek and must not be presented.
        const PREROLL         = 1 << 3;
        /// The frame is zlib compressed and must be inflated before decoding.
        const MUST_DECOMPRESS = 1 << 4;
    }
}

/// A frame read from a track. Times are in microseconds.
#[derive(Clone, Debug)]
pub struct Block {
    /// The number of the track the frame belongs to.
    pub track: u64,
    /// Presentation timestamp. Only the first frame of a laced block carries one.
    pub pts: Option<i64>,
    /// Decode timestamp.
    pub dts: Option<i64>,
    pub duration: Option<i64>,
    /// The frame as stored in the file.
    pub data: Box<[u8]>,
    /// The index of the frame within its laced block.
    pub frame: usize,
    pub flags: BlockFlags,
    /// The content compression of the track.
    pub compression: Compression,
}

impl Block {
    /// The frame with stripped header bytes restored. Zlib compressed frames are returned as
    /// stored, see [`BlockFlags::MUST_DECOMPRESS`].
    pub fn decompressed_data(&self) -> Cow<'_, [u8]> {
        restore_header(&self.compression, &self.data)
    }
}

/// Prepends the bytes a header stripping track removed from `data`.
pub(crate) fn restore_header<'a>(compression: &Compression, data: &'a [u8]) -> Cow<'a, [u8]> {
    match compression {
        Compression::HeaderStrip(prefix) if !prefix.is_empty() => {
            let mut restored = Vec::with_capacity(prefix.len() + data.len());
            restored.extend_from_slice(prefix);
            restored.extend_from_slice(data);
            Cow::Owned(restored)
        }
        _ => Cow::Borrowed(data),
    }
}

/// The DVD menu state a host needs to draw and drive buttons.
#[derive(Clone, Debug, Default)]
pub struct ButtonState {
    /// The highlighted button (system register 0x88).
    pub highlighted: u16,
    /// The uid of the current chapter.
    pub chapter_uid: Option<u64>,
    /// The last navigation packet of a button track, without the leading substream id.
    pub packet: Option<Box<[u8]>>,
    /// The time the packet was read at.
    pub pts: Option<i64>,
}

/// A block as found in a cluster, before it is timestamped and split into frames.
#[derive(Clone, Debug)]
pub(crate) struct RawBlock {
    pub(crate) data: Box<[u8]>,
    /// Read from a SimpleBlock rather than a BlockGroup.
    pub(crate) simple: bool,
    pub(crate) track: u64,
    /// The flags byte of the block header.
    pub(crate) flags: u8,
    /// Absolute block time in nanoseconds.
    pub(crate) time_ns: i64,
    /// The first and second ReferenceBlock, 0 when absent.
    pub(crate) ref1: i64,
    pub(crate) ref2: i64,
    /// BlockDuration in segment ticks.
    pub(crate) duration: Option<u64>,
    pub(crate) block_pos: u64,
    pub(crate) cluster_pos: u64,
}

impl RawBlock {
    pub(crate) fn is_keyframe(&self) -> bool {
        if self.simple {
            self.flags & 0x80 != 0
        }
        else {
            self.ref1 == 0 && self.ref2 == 0
        }
    }

    pub(crate) fn is_discardable(&self) -> bool {
        self.simple && self.flags & 0x01 != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(data: &[u8], compression: Compression) -> Block {
        Block {
            track: 1,
            pts: Some(0),
            dts: Some(0),
            duration: None,
            data: Box::from(data),
            frame: 0,
            flags: BlockFlags::KEYFRAME,
            compression,
        }
    }

    #[test]
    fn verify_header_strip_restored() {
        let b = block(&[3, 4], Compression::HeaderStrip(Box::new([1, 2])));
        assert_eq!(&*b.decompressed_data(), &[1, 2, 3, 4]);

        let b = block(&[3, 4], Compression::Zlib);
        assert_eq!(&*b.decompressed_data(), &[3, 4]);
        assert!(matches!(b.decompressed_data(), Cow::Borrowed(_)));
    }
}
