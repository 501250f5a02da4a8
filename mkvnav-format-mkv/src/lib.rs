// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]
// The following lints are allowed in all mkvnav crates. Please see the workspace Cargo.toml for
// their justification.
#![allow(clippy::comparison_chain)]
#![allow(clippy::identity_op)]
#![allow(clippy::manual_range_contains)]

//! A Matroska and WebM demuxer.
//!
//! [`MkvDemuxer`] reads the segments of a file, links them with the segments of sibling files
//! into titles, and produces timestamped frames. Ordered editions are played as one continuous
//! timeline, and the DVD and Matroska Script commands attached to chapters are run as playback
//! enters and leaves them.

mod block;
mod chapters;
mod codecs;
mod demuxer;
mod ebml;
mod element_ids;
mod elements;
mod index;
pub mod interpreter;
mod lacing;
mod linkage;
mod meta;
mod options;
mod parser;
mod segment;
mod track;

#[cfg(test)]
mod testutil;

pub use block::{Block, BlockFlags, ButtonState};
pub use chapters::{
    ChapterCodec, ChapterCodecKind, ChapterEntry, ChapterId, ChapterItem, ChapterTree, Edition,
    EditionInfo,
};
pub use codecs::{BitmapInfoHeader, FourCc, WaveFormatEx};
pub use demuxer::{MkvDemuxer, SeekTo, SeekedTo, Title};
pub use index::{Index, IndexEntry};
pub use meta::{Attachment, SimpleTag, Tag, TagValue, Target};
pub use options::MkvOptions;
pub use segment::SegmentInfo;
pub use track::{AudioParams, Compression, Track, TrackCategory, VideoParams};
