// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use smallvec::{smallvec, SmallVec};

use mkvnav_core::errors::{decode_error, limit_error, DiagnosticKind, Diagnostics, Error, Result};
use mkvnav_core::io::SeekableStream;

use crate::ebml::ElementHeader;
use crate::element_ids::ElementType;

/// A stateful cursor over the element tree of one segment.
///
/// The cursor tracks two levels. `level` is where the stream physically is, `user_level` is where
/// the caller believes it is. They only diverge after the stream left one or more elements behind
/// (end of a parent, or an element that belongs to an outer level). While they diverge, [`get`]
/// returns nothing and the caller must [`up`] until both agree again. An element found at an outer
/// level is buffered and returned by the first [`get`] at that level.
///
/// Level 0 holds the segment itself.
///
/// [`get`]: Parser::get
/// [`up`]: Parser::up
pub(crate) struct Parser {
    stack: SmallVec<[Option<ElementHeader>; 12]>,
    level: usize,
    user_level: usize,
    pending: Option<ElementHeader>,
    max_depth: usize,
    accept_dummy: bool,
}

impl Parser {
    pub(crate) fn new(segment: ElementHeader, max_depth: usize, accept_dummy: bool) -> Self {
        // Block parsing always needs three levels below the segment.
        let mut stack = smallvec![None; max_depth.max(3) + 1];
        stack[0] = Some(segment);

        Parser { stack, level: 1, user_level: 1, pending: None, max_depth, accept_dummy }
    }

    /// The level the caller is at.
    pub(crate) fn level(&self) -> usize {
        self.user_level
    }

    /// Returns true if an element of an outer level is waiting to be returned.
    pub(crate) fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Gets the next element at the current level, skipping whatever is left of the previous one.
    ///
    /// Returns `None` at the end of the parent, at the end of the stream, when an element of an
    /// outer level was found, or when the caller is not at the cursor level.
    pub(crate) fn get<R: SeekableStream>(
        &mut self,
        reader: &mut R,
        diag: &mut Diagnostics,
    ) -> Result<Option<ElementHeader>> {
        if self.user_level != self.level {
            return Ok(None);
        }

        if let Some(pending) = self.pending.take() {
            self.stack[self.level] = Some(pending);
            return Ok(Some(pending));
        }

        loop {
            if self.level == 0 {
                return Ok(None);
            }

            if let Some(end) = self.stack[self.level].and_then(|prev| prev.end()) {
                if reader.pos() < end {
                    reader.seek_to(end)?;
                }
            }

            let parent_end = self.stack[self.level - 1].and_then(|parent| parent.end());

            if let Some(end) = parent_end {
                if reader.pos() >= end {
                    self.leave_level();
                    return Ok(None);
                }
            }

            let header = match ElementHeader::read(reader) {
                Ok((header, _)) => header,
                Err(err) if err.is_end_of_stream() => {
                    self.level = 0;
                    return Ok(None);
                }
                Err(Error::DecodeError(msg)) => {
                    diag.report(DiagnosticKind::MalformedElement, reader.pos(), msg);
                    match parent_end {
                        Some(end) => {
                            reader.seek_to(end)?;
                            self.leave_level();
                            return Ok(None);
                        }
                        // Without a known end, resynchronize on the following bytes.
                        None => {
                            self.stack[self.level] = None;
                            continue;
                        }
                    }
                }
                Err(err) => return Err(err),
            };

            // An element of an outer level ends every element between it and that level.
            if let Some(depth) = header.etype.depth() {
                if depth < self.level {
                    self.escape(header, self.level - depth);
                    return Ok(None);
                }
            }

            if let Some(end) = parent_end {
                if header.pos + header.len > end {
                    diag.report(
                        DiagnosticKind::MalformedElement,
                        header.pos,
                        "element size exceeds its parent",
                    );
                    reader.seek_to(end)?;
                    self.leave_level();
                    return Ok(None);
                }
            }
            else if !header.unknown_size {
                // Inside an element of unknown size, the nearest known end still bounds the
                // element. There is nothing to skip to, so read on from its data.
                let bound = self.outer_end().or_else(|| reader.byte_len());
                let end = header.pos.checked_add(header.len);

                if let Some(bound) = bound {
                    if end.map_or(true, |end| end > bound) {
                        diag.report(
                            DiagnosticKind::MalformedElement,
                            header.pos,
                            "element size exceeds the enclosing data",
                        );
                        self.stack[self.level] = None;
                        continue;
                    }
                }
            }

            self.stack[self.level] = Some(header);

            match header.etype {
                ElementType::Void | ElementType::Crc32 => continue,
                ElementType::Unknown if !self.accept_dummy => {
                    log::debug!("mkv: skipping unknown element {:#x} at {}", header.tag, header.pos);
                    if header.unknown_size {
                        // Nothing to skip to, read on.
                        self.stack[self.level] = None;
                    }
                    continue;
                }
                _ => return Ok(Some(header)),
            }
        }
    }

    /// The end of the innermost enclosing element of known size.
    fn outer_end(&self) -> Option<u64> {
        self.stack[..self.level].iter().rev().flatten().find_map(|open| open.end())
    }

    /// Leaves the current level after its parent ended.
    fn leave_level(&mut self) {
        self.stack[self.level] = None;
        self.level -= 1;
    }

    /// Moves `count` levels up, buffering `header` as the next element of the new level.
    fn escape(&mut self, header: ElementHeader, count: usize) {
        for _ in 0..count {
            if self.level == 1 {
                self.level = 0;
                self.pending = None;
                return;
            }

            self.stack[self.level - 1] = Some(header);
            self.pending = Some(header);
            self.stack[self.level] = None;
            self.level -= 1;
        }
    }

    /// Enters the element last returned by [`Parser::get`]. The stream must be at the start of its
    /// data.
    pub(crate) fn down(&mut self) -> Result<()> {
        if self.level >= self.max_depth {
            return limit_error("mkv: maximum element depth exceeded");
        }

        self.level += 1;
        self.user_level += 1;
        self.stack[self.level] = None;
        Ok(())
    }

    /// Moves the caller one level up. Fails without touching any state if the caller is already
    /// at the cursor level.
    pub(crate) fn up(&mut self) -> Result<()> {
        if self.user_level == self.level {
            log::error!("mkv: cannot go up from the cursor level ({})", self.level);
            return decode_error("mkv: unbalanced parser up");
        }

        self.user_level -= 1;
        Ok(())
    }

    /// Repositions the cursor on a block that was already read.
    ///
    /// If `cluster_pos` is the cluster the cursor is in, the stream is moved to `block_pos` inside
    /// it and that cluster is returned. Otherwise the stream is moved to `cluster_pos` and the
    /// caller has to find the cluster again at level 1.
    pub(crate) fn unget<R: SeekableStream>(
        &mut self,
        reader: &mut R,
        block_pos: u64,
        cluster_pos: u64,
    ) -> Result<Option<ElementHeader>> {
        self.pending = None;

        if let Some(cluster) = self.stack[1].filter(|cluster| cluster.pos == cluster_pos) {
            reader.seek_to(block_pos)?;
            self.level = 2;
            self.user_level = 2;
            self.clear_from(2);
            return Ok(Some(cluster));
        }

        reader.seek_to(cluster_pos)?;
        self.level = 1;
        self.user_level = 1;
        self.clear_from(1);
        Ok(None)
    }

    /// Returns true if `element` is one of the elements the cursor is inside of.
    pub(crate) fn is_top_present(&self, element: &ElementHeader) -> bool {
        self.stack[..=self.level.min(self.stack.len() - 1)]
            .iter()
            .flatten()
            .any(|open| open.pos == element.pos)
    }

    /// Restarts the walk at level 1 from `pos`.
    pub(crate) fn reset_at<R: SeekableStream>(&mut self, reader: &mut R, pos: u64) -> Result<()> {
        self.level = 1;
        self.user_level = 1;
        self.pending = None;
        self.clear_from(1);
        reader.seek_to(pos)?;
        Ok(())
    }

    fn clear_from(&mut self, level: usize) {
        for open in self.stack[level..].iter_mut() {
            *open = None;
        }
    }
}
