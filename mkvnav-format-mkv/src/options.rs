// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// `MkvOptions` is a common set of options that the demuxer uses.
#[derive(Copy, Clone, Debug)]
pub struct MkvOptions {
    /// Play ordered editions as one continuous timeline. When disabled, editions are treated as
    /// plain chapter markers.
    pub use_ordered_chapters: bool,
    /// Run the commands attached to chapters when they are entered or left.
    pub use_chapter_codecs: bool,
    /// Prefer byte positions over the time index for percent seeks.
    pub seek_percent: bool,
    /// Return elements with unknown ids instead of skipping them.
    pub accept_dummy_elements: bool,
    /// Preload segments of sibling files registered with `MkvDemuxer::add_sibling`.
    pub preload_local_dir: bool,
    /// The maximum nesting of elements below the segment.
    pub max_depth: usize,
    /// The maximum length of a chain of seek heads, each one reached through the previous one.
    pub max_seekhead_depth: usize,
}

impl Default for MkvOptions {
    fn default() -> Self {
        MkvOptions {
            use_ordered_chapters: true,
            use_chapter_codecs: true,
            seek_percent: false,
            accept_dummy_elements: false,
            preload_local_dir: true,
            max_depth: 10,
            max_seekhead_depth: 10,
        }
    }
}
