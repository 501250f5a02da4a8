// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::VecDeque;

use mkvnav_core::abort::AbortHandle;
use mkvnav_core::errors::{decode_error, seek_error, unsupported_error};
use mkvnav_core::errors::{DiagnosticKind, Diagnostics, Error, Result, SeekErrorKind};
use mkvnav_core::io::{MediaSource, ReadBytes, SeekableStream, SourceStream, SourceStreamOptions};
use mkvnav_core::util::time::ticks_to_us;

use crate::block::{restore_header, Block, BlockFlags, ButtonState, RawBlock};
use crate::chapters::{ChapterId, ChapterTree, EditionInfo};
use crate::codecs::CODEC_ID_VOBSUB;
use crate::ebml::{Element, ElementHeader};
use crate::element_ids::ElementType;
use crate::elements::EbmlHeaderElement;
use crate::index::Index;
use crate::interpreter::dvd::{self, DvdRegisters};
use crate::interpreter::{self, ChapterHost, ChapterRef};
use crate::lacing::extract_frames;
use crate::linkage::{self, VirtualSegment};
use crate::meta::{Attachment, Tag};
use crate::options::MkvOptions;
use crate::segment::{Segment, SegmentInfo};
use crate::track::{Compression, Track, TrackCategory};

/// Byte distance from a percent seek estimate beyond which the index is not trusted.
const MAX_INDEX_DISTANCE: u64 = 2_000_000;

/// The system register holding the highlighted DVD button.
const SPRM_HIGHLIGHTED_BUTTON: usize = 0x88;

/// A seek target.
#[derive(Copy, Clone, Debug)]
pub enum SeekTo {
    /// A time in microseconds on the timeline of the current title.
    Time(i64),
    /// A fraction of the current title, from 0.0 to 1.0.
    Percent(f64),
}

/// The outcome of a seek.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SeekedTo {
    /// The time that was requested, in microseconds.
    pub required: i64,
    /// The time presentation resumes at, in microseconds. Video frames before it are flagged
    /// [`BlockFlags::PREROLL`].
    pub actual: i64,
}

/// A playable title: one group of linked segments.
#[derive(Clone, Debug)]
pub struct Title {
    pub name: String,
    /// Duration in microseconds.
    pub duration: i64,
    pub editions: Vec<EditionInfo>,
}

/// Reads the EBML header of a file and finds its segments.
fn read_segments(
    reader: &mut SourceStream,
    source: usize,
    options: &MkvOptions,
    diag: &mut Diagnostics,
) -> Result<Vec<Segment>> {
    let (header, _) = ElementHeader::read(reader)?;

    if header.etype != ElementType::Ebml {
        return unsupported_error("mkv: missing ebml header");
    }

    let ebml = EbmlHeaderElement::read(reader, header)?;

    if !matches!(ebml.doc_type.as_str(), "matroska" | "webm") {
        return unsupported_error("mkv: not a matroska / webm file");
    }

    if ebml.doc_type_read_version > 2 {
        return unsupported_error("mkv: unsupported document type version");
    }

    log::debug!("mkv: {} document version {}", ebml.doc_type, ebml.doc_type_version);

    let mut segments = Vec::new();

    loop {
        if let Some(len) = reader.byte_len() {
            if reader.pos() >= len {
                break;
            }
        }

        let header = match ElementHeader::read(reader) {
            Ok((header, _)) => header,
            Err(err) if err.is_end_of_stream() => break,
            Err(err) => return Err(err),
        };

        if header.etype == ElementType::Segment {
            log::debug!("mkv: segment at {}", header.pos);
            segments.push(Segment::discover(reader, source, header, options, diag)?);
        }
        else {
            log::debug!("mkv: skipping top-level {:?}", header.etype);
        }

        // Live streams hold a single segment that is read as it arrives.
        match header.end() {
            Some(end) if reader.is_seekable() => {
                reader.seek_to(end)?;
            }
            _ => break,
        }
    }

    Ok(segments)
}

/// Matroska demuxer.
///
/// The demuxer opens a main file and, optionally, sibling files whose segments link to it. Linked
/// segments are played as one title. Blocks are timestamped on the timeline of the title, which
/// follows the chapters of ordered editions.
pub struct MkvDemuxer {
    sources: Vec<SourceStream>,
    segments: Vec<Segment>,
    vsegments: Vec<VirtualSegment>,
    /// The playing title.
    current: usize,
    options: MkvOptions,
    registers: DvdRegisters,
    diagnostics: Diagnostics,
    abort: AbortHandle,
    /// Time of the last block read, in microseconds.
    pts: i64,
    /// Blocks before this time are not presented.
    start_pts: i64,
    /// Title time minus segment time of the current chapter.
    chapter_time: i64,
    duration: i64,
    button: ButtonState,
    pending: VecDeque<Block>,
    /// The chapter whose segment ran out of blocks.
    exhausted: Option<ChapterId>,
    /// Set whenever playback is repositioned.
    moved: bool,
}

impl MkvDemuxer {
    /// Opens a Matroska or WebM file.
    ///
    /// Every segment of the file is preloaded. Opening fails if the first segment has no usable
    /// track or no cluster.
    pub fn try_new(source: Box<dyn MediaSource>, options: MkvOptions) -> Result<Self> {
        Self::try_new_with_abort(source, options, AbortHandle::new())
    }

    /// Opens a Matroska or WebM file like [`MkvDemuxer::try_new`], polling `abort` while the
    /// segments are preloaded. The same handle is returned by [`MkvDemuxer::abort_handle`].
    pub fn try_new_with_abort(
        source: Box<dyn MediaSource>,
        options: MkvOptions,
        abort: AbortHandle,
    ) -> Result<Self> {
        let mut reader = SourceStream::new(source, SourceStreamOptions::default());
        let mut diagnostics = Diagnostics::new();

        let mut segments = read_segments(&mut reader, 0, &options, &mut diagnostics)?;

        if segments.is_empty() {
            return decode_error("mkv: no segment found");
        }

        for (i, segment) in segments.iter_mut().enumerate() {
            let usable = match segment.preload(&mut reader, &options, &abort, &mut diagnostics) {
                Ok(usable) => usable,
                // Only the first segment is required to open the file.
                Err(Error::LimitError(msg)) if i > 0 => {
                    diagnostics.report(DiagnosticKind::DepthExceeded, segment.header().pos, msg);
                    false
                }
                Err(err) => return Err(err),
            };

            if i == 0 {
                if !usable {
                    return unsupported_error("mkv: no supported tracks");
                }

                if segment.start_pos.is_none() {
                    diagnostics.report(
                        DiagnosticKind::NoCluster,
                        segment.header().pos,
                        "segment has no cluster",
                    );
                    return decode_error("mkv: no cluster found");
                }
            }
            else if !usable {
                log::warn!("mkv: segment {} has no usable track", i);
            }
        }

        let mut demuxer = MkvDemuxer {
            sources: vec![reader],
            segments,
            vsegments: Vec::new(),
            current: 0,
            options,
            registers: DvdRegisters::new(),
            diagnostics,
            abort,
            pts: 0,
            start_pts: 0,
            chapter_time: 0,
            duration: 0,
            button: Default::default(),
            pending: VecDeque::new(),
            exhausted: None,
            moved: false,
        };

        demuxer.link_segments();
        demuxer.prepare_playback(0)?;

        Ok(demuxer)
    }

    /// Registers another file, typically found next to the main file. Its segments are preloaded
    /// if they belong to the family of, or are linked to, a segment already opened.
    ///
    /// Returns the number of segments preloaded.
    pub fn add_sibling(&mut self, source: Box<dyn MediaSource>) -> Result<usize> {
        if !self.options.preload_local_dir {
            log::debug!("mkv: sibling files are disabled");
            return Ok(0);
        }

        let index = self.sources.len();
        let mut reader = SourceStream::new(source, SourceStreamOptions::default());
        let found = read_segments(&mut reader, index, &self.options, &mut self.diagnostics)?;
        self.sources.push(reader);

        let first = self.segments.len();

        for segment in found {
            if let Some(uid) = &segment.info.uid {
                if self.segments.iter().any(|known| known.info.uid.as_ref() == Some(uid)) {
                    log::debug!("mkv: segment of sibling {} is already open", index);
                    continue;
                }
            }
            self.segments.push(segment);
        }

        let mut preloaded = 0;

        loop {
            let mut changed = false;

            for i in first..self.segments.len() {
                if self.segments[i].preloaded {
                    continue;
                }

                let related = self.segments.iter().filter(|s| s.preloaded).any(|s| {
                    s.family_match(&self.segments[i]) || linkage::hard_linked(s, &self.segments[i])
                });

                if !related {
                    continue;
                }

                let source = self.segments[i].source;
                let usable = self.segments[i].preload(
                    &mut self.sources[source],
                    &self.options,
                    &self.abort,
                    &mut self.diagnostics,
                )?;

                if usable {
                    preloaded += 1;
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }

        if preloaded > 0 {
            self.link_segments();
            self.duration = self.title_duration(self.current);
        }

        Ok(preloaded)
    }

    /// Groups the preloaded segments into titles, keeping the playing segment selected.
    fn link_segments(&mut self) {
        let playing = self.vsegments.get(self.current).map(VirtualSegment::segment);

        let mut vsegments: Vec<VirtualSegment> = Vec::new();

        for i in 0..self.segments.len() {
            if !self.segments[i].preloaded || vsegments.iter().any(|v| v.segments.contains(&i)) {
                continue;
            }

            let mut vseg = linkage::link(i, &self.segments);
            vseg.prepare_chapters(vsegments.len() + 1, &self.segments);

            log::debug!("mkv: title \"{}\" of {} segment(s)", vseg.title, vseg.segments.len());
            vsegments.push(vseg);
        }

        self.current = 0;

        if let Some(playing) = playing {
            if let Some(i) = vsegments.iter().position(|v| v.segments.contains(&playing)) {
                let vseg = &mut vsegments[i];
                vseg.current = vseg.segments.iter().position(|&s| s == playing).unwrap_or(0);
                self.current = i;
            }
        }

        self.vsegments = vsegments;
    }

    fn title_duration(&self, title: usize) -> i64 {
        let vseg = &self.vsegments[title];

        if vseg.is_ordered() {
            vseg.chapters.edition_duration(vseg.edition)
        }
        else {
            vseg.duration(&self.segments)
        }
    }

    /// The physical segment playing.
    fn playing(&self) -> usize {
        self.vsegments[self.current].segment()
    }

    /// Makes `title` the current title and restarts it.
    fn prepare_playback(&mut self, title: usize) -> Result<()> {
        let old = self.playing();
        self.segments[old].unselect();

        self.current = title;

        let vseg = &mut self.vsegments[title];
        vseg.current = 0;
        vseg.current_chapter = None;

        self.pts = 0;
        self.chapter_time = 0;

        let seg = self.playing();

        if !self.segments[seg].index.has_cues() {
            log::warn!("mkv: no cues found, seeking will not be precise");
        }

        self.duration = self.title_duration(title);
        self.select_segment(seg, 0)
    }

    fn select_segment(&mut self, seg: usize, start: i64) -> Result<()> {
        let source = self.segments[seg].source;
        self.segments[seg].select(&mut self.sources[source])?;

        self.start_pts = start;
        self.pending.clear();
        self.exhausted = None;
        Ok(())
    }

    /// Moves to the next segment of the title. Returns false after the last one.
    fn select_next_segment(&mut self) -> Result<bool> {
        let old = self.playing();

        if !self.vsegments[self.current].select_next() {
            return Ok(false);
        }

        self.segments[old].unselect();

        let seg = self.playing();
        log::debug!("mkv: switching to segment {}", seg);

        self.select_segment(seg, 0)?;
        Ok(true)
    }

    /// Reads the next block, or `None` at the end of the current title.
    pub fn next_block(&mut self) -> Result<Option<Block>> {
        loop {
            if let Some(block) = self.pending.pop_front() {
                return Ok(Some(block));
            }

            self.abort.check()?;

            if self.pts >= self.start_pts {
                self.update_current_to_chapter()?;
            }

            let ordered = self.vsegments[self.current].is_ordered();

            if ordered && self.vsegments[self.current].current_chapter.is_none() {
                // Nothing left to play in this edition.
                if !self.select_next_segment()? {
                    return Ok(None);
                }
                continue;
            }

            let seg = self.playing();
            let source = self.segments[seg].source;

            let raw = match self.segments[seg]
                .block_get(&mut self.sources[source], &mut self.diagnostics)
            {
                Ok(Some(raw)) => raw,
                Err(err) if err.is_end_of_stream() => {
                    log::warn!("mkv: segment {} is truncated", seg);
                    let pos = self.sources[source].pos();
                    self.diagnostics.report(
                        DiagnosticKind::EndOfStream,
                        pos,
                        "unexpected end of stream",
                    );
                    return Ok(None);
                }
                Err(err) => return Err(err),
                Ok(None) if ordered => {
                    let vseg = &mut self.vsegments[self.current];

                    if let Some(chapter) = vseg.current_chapter {
                        if self.exhausted == Some(chapter) {
                            vseg.current_chapter = None;
                        }
                        else {
                            // Move past the chapter so the next one gets looked up.
                            self.exhausted = Some(chapter);
                            self.pts = vseg.chapters.item(chapter).user_end;
                        }
                    }
                    continue;
                }
                Ok(None) => {
                    log::debug!("mkv: end of segment {}", seg);
                    if !self.select_next_segment()? {
                        return Ok(None);
                    }
                    continue;
                }
            };

            self.exhausted = None;

            let pts = self.chapter_time + raw.time_ns / 1000;
            self.pts = pts;

            if pts >= self.start_pts {
                self.moved = false;
                self.update_current_to_chapter()?;

                // The block belongs to the position playback left.
                if self.moved {
                    continue;
                }
            }

            if ordered && self.vsegments[self.current].current_chapter.is_none() {
                continue;
            }

            self.decode_block(seg, raw, pts)?;
        }
    }

    /// Splits a block into frames and timestamps them.
    fn decode_block(&mut self, seg: usize, raw: RawBlock, pts: i64) -> Result<()> {
        let start_pts = self.start_pts;
        let segment = &mut self.segments[seg];
        let scale = segment.info.timestamp_scale;

        let track = match segment.tracks.iter_mut().find(|track| track.number == raw.track) {
            Some(track) => track,
            None => return Ok(()),
        };

        let duration = raw.duration.map(|ticks| ticks_to_us(ticks as i64, scale));

        // Audio that ends before the seek target is never presented.
        if track.category == TrackCategory::Audio && pts + duration.unwrap_or(0) < start_pts {
            return Ok(());
        }

        let frames = match extract_frames(&raw.data) {
            Ok(frames) => frames,
            Err(err) => {
                log::warn!("mkv: dropping block of track {}: {}", raw.track, err);
                self.diagnostics.report(
                    DiagnosticKind::MalformedElement,
                    raw.block_pos,
                    "invalid block lacing",
                );
                return Ok(());
            }
        };

        if track.buttons {
            // A navigation packet: keep it for the host, without its substream id.
            if let Some(frame) = frames.first() {
                let packet = restore_header(&track.compression, frame);
                if packet.len() > 1 {
                    self.button.packet = Some(Box::from(&packet[1..]));
                    self.button.pts = Some(pts);
                }
            }
            return Ok(());
        }

        let mut flags = BlockFlags::empty();

        if raw.is_keyframe() {
            flags |= BlockFlags::KEYFRAME;
        }
        if raw.is_discardable() {
            flags |= BlockFlags::DISCARDABLE;
        }
        if track.silent || !track.enabled {
            flags |= BlockFlags::SILENT;
        }
        if track.category == TrackCategory::Video && pts < start_pts {
            flags |= BlockFlags::PREROLL;
        }
        if track.compression == Compression::Zlib {
            flags |= BlockFlags::MUST_DECOMPRESS;
        }

        // Decode order equals presentation order for these frames.
        let mandatory = raw.is_keyframe() || raw.is_discardable();
        let vfw = track.is_vfw();

        // Subpictures carry their own display duration.
        let duration = if track.codec_id == CODEC_ID_VOBSUB { None } else { duration };

        let mut frame_pts = Some(pts);

        for (frame, data) in frames.into_iter().enumerate() {
            let (block_pts, dts) = match frame_pts {
                None => (None, None),
                Some(pts) if track.category != TrackCategory::Video => (Some(pts), Some(pts)),
                Some(pts) if vfw => (None, Some(pts)),
                Some(pts) => {
                    let dts = match track.last_dts {
                        Some(last) if !mandatory => {
                            let step = track.default_duration.unwrap_or(0) >> 10;
                            pts.min(last + step as i64)
                        }
                        _ => pts,
                    };
                    (Some(pts), Some(dts))
                }
            };

            if dts.is_some() {
                track.last_dts = dts;
            }

            self.pending.push_back(Block {
                track: raw.track,
                pts: block_pts,
                dts,
                duration,
                data,
                frame,
                flags,
                compression: track.compression.clone(),
            });

            // Only the first frame of a laced block is timestamped.
            frame_pts = None;
        }

        Ok(())
    }

    /// Follows playback into the chapter at the current time. Returns true if the chapter
    /// changed.
    fn update_current_to_chapter(&mut self) -> Result<bool> {
        let title = self.current;

        let (found, current, ordered, root) = {
            let vseg = &self.vsegments[title];

            let edition = match vseg.chapters.edition(vseg.edition) {
                Some(edition) => edition,
                None => return Ok(false),
            };

            let found = vseg.chapters.find_by_user_time(vseg.edition, self.pts, vseg.current_chapter);
            (found, vseg.current_chapter, edition.ordered, edition.root)
        };

        let current_ref = current.map(|id| ChapterRef { vseg: title, id });

        match found {
            Some(found) if Some(found) != current => {
                let mut moved = false;

                if ordered {
                    let target = ChapterRef { vseg: title, id: found };
                    moved = interpreter::enter_and_leave(self, target, current_ref, true)?;

                    if !moved {
                        let tree = &self.vsegments[title].chapters;
                        let contiguous =
                            current.map_or(false, |c| tree.item(c).end == tree.item(found).start);

                        // Only move in the file when the chapters are not stored back to back.
                        if !contiguous {
                            self.seek_virtual(self.pts, 0, Some(found), None)?;
                        }
                    }
                }

                if !moved {
                    log::debug!("mkv: entering chapter {:?}", found);
                    self.vsegments[title].current_chapter = Some(found);
                }

                Ok(true)
            }
            None if ordered => {
                // Playback left the chapters of the edition.
                let mut chapter = current_ref;

                while let Some(r) = chapter {
                    if r.id == root {
                        break;
                    }

                    let item = self.vsegments[title].chapters.item(r.id);
                    let (parent, leaving) = (item.parent, item.is_leaving);

                    if !leaving && interpreter::leave(self, r, false)? {
                        return Ok(true);
                    }

                    chapter = parent.map(|id| ChapterRef { vseg: title, id });
                }

                self.vsegments[title].current_chapter = None;
                Ok(false)
            }
            _ => Ok(false),
        }
    }

    /// Repositions the current title at `date`. `offset` is the title time minus the segment
    /// time, replaced by that of `chapter` when one is given or found. With a `global` byte
    /// position the clusters are scanned instead of using the index.
    fn seek_virtual(
        &mut self,
        date: i64,
        offset: i64,
        chapter: Option<ChapterId>,
        global: Option<u64>,
    ) -> Result<()> {
        let title = self.current;
        let mut offset = offset;

        let chapter = match chapter {
            Some(id) => Some(id),
            None if self.vsegments[title].is_ordered() => {
                let vseg = &self.vsegments[title];
                vseg.chapters.find_by_user_time(vseg.edition, date, vseg.current_chapter)
            }
            None => None,
        };

        if let Some(id) = chapter {
            let vseg = &mut self.vsegments[title];
            let item = vseg.chapters.item(id);

            self.chapter_time = item.user_start - item.start;
            offset = self.chapter_time;
            vseg.current_chapter = Some(id);
        }

        let position = self.vsegments[title].segment_at(date, &self.segments);

        if position != self.vsegments[title].current {
            let old = self.playing();
            self.segments[old].unselect();
            self.vsegments[title].current = position;

            let seg = self.playing();
            self.select_segment(seg, date)?;
        }

        let seg = self.playing();
        let source = self.segments[seg].source;

        log::debug!("mkv: seeking segment {} to {} (offset {})", seg, date, offset);

        let outcome = self.segments[seg].seek(
            &mut self.sources[source],
            date,
            offset,
            self.chapter_time,
            global,
            &self.abort,
            &mut self.diagnostics,
        )?;

        self.start_pts = outcome.start_pts;
        self.pts = outcome.start_pts;
        self.pending.clear();
        self.exhausted = None;

        for raw in outcome.preroll {
            let pts = self.chapter_time + raw.time_ns / 1000;
            self.decode_block(seg, raw, pts)?;
        }

        self.moved = true;
        Ok(())
    }

    /// Seeks the current title.
    pub fn seek(&mut self, to: SeekTo) -> Result<SeekedTo> {
        let source = self.segments[self.playing()].source;

        if !self.sources[source].is_seekable() {
            return seek_error(SeekErrorKind::Unseekable);
        }

        let required = match to {
            SeekTo::Time(time) => {
                if time < 0 {
                    return seek_error(SeekErrorKind::OutOfRange);
                }
                self.seek_virtual(time, 0, None, None)?;
                time
            }
            SeekTo::Percent(percent) => {
                if !(0.0..=1.0).contains(&percent) {
                    return seek_error(SeekErrorKind::OutOfRange);
                }
                let (date, global) = self.percent_target(percent)?;
                self.seek_virtual(date, 0, None, global)?;
                date
            }
        };

        Ok(SeekedTo { required, actual: self.start_pts })
    }

    /// Maps a percent seek to a time, and to a byte position when the index cannot be trusted.
    fn percent_target(&self, percent: f64) -> Result<(i64, Option<u64>)> {
        let segment = &self.segments[self.playing()];
        let has_cues = segment.index.has_cues();

        if !self.options.seek_percent && has_cues && self.duration > 0 {
            return Ok(((percent * self.duration as f64) as i64, None));
        }

        let len = match self.sources[segment.source].byte_len() {
            Some(len) => len,
            None => return seek_error(SeekErrorKind::Unseekable),
        };

        let pos = (percent * len as f64) as u64;

        log::debug!("mkv: inaccurate seek to byte position {}", pos);

        match segment.index.find_by_position(pos) {
            Some(entry) => {
                let far = entry.position < pos || entry.position - pos > MAX_INDEX_DISTANCE;
                let global = if !has_cues && far { Some(pos) } else { None };
                Ok((entry.time.max(0), global))
            }
            None => Ok((0, Some(pos))),
        }
    }

    /// Plays another title from its start.
    pub fn select_title(&mut self, title: usize) -> Result<()> {
        if title >= self.vsegments.len() {
            return seek_error(SeekErrorKind::OutOfRange);
        }
        self.prepare_playback(title)
    }

    /// Plays the chapter with uid `uid`, searching the current title first.
    pub fn select_chapter(&mut self, uid: u64) -> Result<()> {
        let target = match self.vsegments[self.current].chapters.find_by_uid(uid) {
            Some(id) => Some(ChapterRef { vseg: self.current, id }),
            None => interpreter::find_by_uid(&*self, uid),
        };

        match target {
            Some(target) => self.seek_to_chapter(target),
            None => seek_error(SeekErrorKind::OutOfRange),
        }
    }

    /// Describes every title with its editions and chapters.
    pub fn titles(&mut self) -> Vec<Title> {
        let mut titles = Vec::with_capacity(self.vsegments.len());

        for i in 0..self.vsegments.len() {
            let duration = self.title_duration(i);
            let vseg = &mut self.vsegments[i];

            titles.push(Title {
                name: vseg.title.clone(),
                duration,
                editions: vseg.chapters.publish(),
            });
        }

        titles
    }

    /// The index of the playing title.
    pub fn current_title(&self) -> usize {
        self.current
    }

    /// The tracks of the playing segment.
    pub fn tracks(&self) -> &[Track] {
        &self.segments[self.playing()].tracks
    }

    pub fn segment_info(&self) -> &SegmentInfo {
        &self.segments[self.playing()].info
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.segments[self.playing()].attachments
    }

    pub fn tags(&self) -> &[Tag] {
        &self.segments[self.playing()].tags
    }

    /// The seek index of the playing segment.
    pub fn index(&self) -> &Index {
        &self.segments[self.playing()].index
    }

    /// Duration of the playing title in microseconds.
    pub fn duration(&self) -> i64 {
        self.duration
    }

    pub fn options(&self) -> &MkvOptions {
        &self.options
    }

    /// The problems found in the files so far.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// A handle to cancel preloading and seeking from another thread.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// A snapshot of the DVD menu state.
    pub fn current_button_state(&self) -> ButtonState {
        let mut state = self.button.clone();
        state.highlighted = self.registers.get_sprm(SPRM_HIGHLIGHTED_BUTTON);
        state.chapter_uid = self
            .current_chapter()
            .and_then(|r| self.vsegments[r.vseg].chapters.item(r.id).uid);
        state
    }

    /// Runs a DVD command on behalf of the host, typically when a button is activated.
    ///
    /// Returns true if the command moved playback.
    pub fn dispatch_command(&mut self, command: &[u8; 8]) -> Result<bool> {
        dvd::interpret(self, command)
    }
}

impl ChapterHost for MkvDemuxer {
    fn registers(&mut self) -> &mut DvdRegisters {
        &mut self.registers
    }

    fn chapters(&self, vseg: usize) -> Option<&ChapterTree> {
        self.vsegments.get(vseg).map(|v| &v.chapters)
    }

    fn chapters_mut(&mut self, vseg: usize) -> Option<&mut ChapterTree> {
        self.vsegments.get_mut(vseg).map(|v| &mut v.chapters)
    }

    fn virtual_segment_count(&self) -> usize {
        self.vsegments.len()
    }

    fn current_vseg(&self) -> usize {
        self.current
    }

    fn current_edition(&self, vseg: usize) -> usize {
        self.vsegments.get(vseg).map_or(0, |v| v.edition)
    }

    fn current_chapter(&self) -> Option<ChapterRef> {
        let id = self.vsegments.get(self.current)?.current_chapter?;
        Some(ChapterRef { vseg: self.current, id })
    }

    fn jump_to(&mut self, target: ChapterRef) -> Result<()> {
        if target.vseg >= self.vsegments.len() {
            return decode_error("mkv: invalid virtual segment");
        }

        if target.vseg != self.current {
            self.prepare_playback(target.vseg)?;
        }

        if !interpreter::enter(self, target, true)? {
            let user_start = self.vsegments[target.vseg].chapters.item(target.id).user_start;
            self.seek_virtual(user_start, -1, Some(target.id), None)?;
        }

        Ok(())
    }

    fn seek_to_chapter(&mut self, target: ChapterRef) -> Result<()> {
        if target.vseg >= self.vsegments.len() {
            return decode_error("mkv: invalid virtual segment");
        }

        if target.vseg != self.current {
            self.prepare_playback(target.vseg)?;
        }

        let user_start = self.vsegments[target.vseg].chapters.item(target.id).user_start;
        self.seek_virtual(user_start, 0, Some(target.id), None)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::testutil::*;

    const SEC: u64 = 1_000_000_000;

    fn open(data: Vec<u8>) -> Result<MkvDemuxer> {
        MkvDemuxer::try_new(Box::new(Cursor::new(data)), MkvOptions::default())
    }

    fn file(children: &[Vec<u8>]) -> Vec<u8> {
        let mut data = ebml_header("matroska");
        data.extend(segment(children));
        data
    }

    fn tracks(track_type: u64, codec_id: &str) -> Vec<u8> {
        master(0x1654AE6B, &[track_entry(1, track_type, codec_id)])
    }

    fn cue_point(time: u64, pos: u64) -> Vec<u8> {
        master(0xBB, &[uint(0xB3, time), master(0xB7, &[uint(0xF7, 1), element(0xF1, &pos.to_be_bytes())])])
    }

    fn payloads(demuxer: &mut MkvDemuxer) -> Vec<(Option<i64>, Vec<u8>)> {
        let mut out = Vec::new();
        loop {
            match demuxer.next_block().unwrap() {
                Some(block) => out.push((block.pts, block.data.to_vec())),
                None => break,
            }
        }
        out
    }

    #[test]
    fn verify_single_track_single_block() {
        let mut demuxer = open(file(&[
            info(None, None, None),
            tracks(1, "V_MPEG4/ISO/AVC"),
            cluster(0, &[simple_block(1, 0, 0x80, &[1, 2, 3])]),
        ]))
        .unwrap();

        assert_eq!(demuxer.tracks().len(), 1);
        assert_eq!(demuxer.tracks()[0].number, 1);

        let block = demuxer.next_block().unwrap().unwrap();
        assert_eq!(block.track, 1);
        assert_eq!(block.pts, Some(0));
        assert_eq!(block.dts, Some(0));
        assert!(block.flags.contains(BlockFlags::KEYFRAME));
        assert_eq!(&*block.data, &[1, 2, 3]);

        assert!(demuxer.next_block().unwrap().is_none());
    }

    #[test]
    fn verify_doc_type_is_checked() {
        let mut data = ebml_header("avi");
        data.extend(segment(&[info(None, None, None)]));
        assert!(matches!(open(data), Err(Error::Unsupported(_))));

        let data = segment(&[info(None, None, None)]);
        assert!(matches!(open(data), Err(Error::Unsupported(_))));
    }

    #[test]
    fn verify_webm_is_accepted() {
        let mut data = ebml_header("webm");
        data.extend(segment(&[
            info(None, None, None),
            tracks(2, "A_OPUS"),
            cluster(0, &[simple_block(1, 0, 0x80, &[7])]),
        ]));
        let mut demuxer = open(data).unwrap();
        assert_eq!(demuxer.next_block().unwrap().unwrap().pts, Some(0));
    }

    #[test]
    fn verify_segment_without_cluster_fails() {
        let result = open(file(&[info(None, None, None), tracks(1, "V_VP9")]));
        assert!(matches!(result, Err(Error::DecodeError(_))));
    }

    #[test]
    fn verify_seek_to_cue_time() {
        let head = [info(None, None, None), tracks(1, "V_VP9")];
        let c0 = cluster(0, &[simple_block(1, 0, 0x80, &[0])]);
        let c1 = cluster(1000, &[simple_block(1, 0, 0x80, &[1])]);

        let cues_len = master(0x1C53BB6B, &[cue_point(1000, 0)]).len();
        let c1_pos = head.iter().map(Vec::len).sum::<usize>() + cues_len + c0.len();
        let cues = master(0x1C53BB6B, &[cue_point(1000, c1_pos as u64)]);

        let mut demuxer =
            open(file(&[head[0].clone(), head[1].clone(), cues, c0, c1])).unwrap();

        let seeked = demuxer.seek(SeekTo::Time(1_000_000)).unwrap();
        assert_eq!(seeked, SeekedTo { required: 1_000_000, actual: 1_000_000 });

        let block = demuxer.next_block().unwrap().unwrap();
        assert_eq!(block.pts, Some(1_000_000));
        assert_eq!(&*block.data, &[1]);
    }

    #[test]
    fn verify_seek_bounds() {
        let mut demuxer = open(file(&[
            info(None, None, None),
            tracks(2, "A_AC3"),
            cluster(0, &[simple_block(1, 0, 0x80, &[0])]),
        ]))
        .unwrap();

        assert!(matches!(
            demuxer.seek(SeekTo::Percent(1.5)),
            Err(Error::SeekError(SeekErrorKind::OutOfRange))
        ));
        assert!(matches!(
            demuxer.seek(SeekTo::Time(-1)),
            Err(Error::SeekError(SeekErrorKind::OutOfRange))
        ));
    }

    #[test]
    fn verify_ordered_chapters_follow_edition_order() {
        // Chapter A plays the second second of the file first, then chapter B the first one.
        let mut demuxer = open(file(&[
            info(None, None, None),
            tracks(2, "A_AC3"),
            chapters(&[edition(
                1,
                true,
                &[
                    chapter_atom(10, SEC, Some(2 * SEC), "A", &[]),
                    chapter_atom(11, 0, Some(SEC), "B", &[]),
                ],
            )]),
            cluster(0, &[simple_block(1, 0, 0x80, &[0])]),
            cluster(1000, &[simple_block(1, 0, 0x80, &[1])]),
        ]))
        .unwrap();

        assert_eq!(demuxer.duration(), 2_000_000);

        let titles = demuxer.titles();
        assert_eq!(titles.len(), 1);
        assert_eq!(titles[0].name, "Segment 1");
        assert!(titles[0].editions[0].ordered);

        assert_eq!(
            payloads(&mut demuxer),
            vec![(Some(0), vec![1]), (Some(1_000_000), vec![0])]
        );
    }

    #[test]
    fn verify_linked_sibling_plays_after_main_file() {
        const A: [u8; 16] = [0xA; 16];
        const B: [u8; 16] = [0xB; 16];

        let mut demuxer = open(file(&[
            info(Some(A), None, Some(B)),
            tracks(2, "A_AC3"),
            cluster(0, &[simple_block(1, 0, 0x80, &[0xA])]),
        ]))
        .unwrap();

        let sibling = file(&[
            info(Some(B), Some(A), None),
            tracks(2, "A_AC3"),
            cluster(0, &[simple_block(1, 0, 0x80, &[0xB])]),
        ]);
        assert_eq!(demuxer.add_sibling(Box::new(Cursor::new(sibling))).unwrap(), 1);

        let unrelated = file(&[
            info(Some([0xC; 16]), None, None),
            tracks(2, "A_AC3"),
            cluster(0, &[simple_block(1, 0, 0x80, &[0xC])]),
        ]);
        assert_eq!(demuxer.add_sibling(Box::new(Cursor::new(unrelated))).unwrap(), 0);

        assert_eq!(demuxer.titles().len(), 1);
        assert_eq!(payloads(&mut demuxer), vec![(Some(0), vec![0xA]), (Some(0), vec![0xB])]);
    }

    #[test]
    fn verify_audio_before_start_is_dropped_and_video_flagged() {
        let mut demuxer = open(file(&[
            info(None, None, None),
            master(0x1654AE6B, &[track_entry(1, 1, "V_VP9"), track_entry(2, 2, "A_AC3")]),
            cluster(
                0,
                &[
                    simple_block(1, 0, 0x80, &[1]),
                    simple_block(2, 0, 0x80, &[2]),
                    simple_block(1, 100, 0x00, &[3]),
                    simple_block(2, 200, 0x80, &[4]),
                    simple_block(1, 300, 0x00, &[5]),
                ],
            ),
        ]))
        .unwrap();

        // No cues: the seek starts from the first cluster and primes video from its keyframe.
        demuxer.seek(SeekTo::Time(150_000)).unwrap();

        let mut blocks = Vec::new();
        while let Some(block) = demuxer.next_block().unwrap() {
            blocks.push(block);
        }

        let data: Vec<u8> = blocks.iter().map(|b| b.data[0]).collect();
        assert_eq!(data, vec![1, 3, 4, 5]);
        assert!(blocks[0].flags.contains(BlockFlags::PREROLL));
        assert!(blocks[1].flags.contains(BlockFlags::PREROLL));
        assert!(!blocks[2].flags.contains(BlockFlags::PREROLL));
        assert!(!blocks[3].flags.contains(BlockFlags::PREROLL));
    }

    #[test]
    fn verify_button_commands() {
        let mut demuxer = open(file(&[
            info(None, None, None),
            tracks(2, "A_AC3"),
            cluster(0, &[simple_block(1, 0, 0x80, &[0])]),
        ]))
        .unwrap();

        assert_eq!(demuxer.current_button_state().highlighted, 1);
        assert!(!demuxer.dispatch_command(&[0x56, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00]).unwrap());
        assert_eq!(demuxer.current_button_state().highlighted, 4);
    }

    #[test]
    fn verify_abort_cancels_reading() {
        let mut demuxer = open(file(&[
            info(None, None, None),
            tracks(2, "A_AC3"),
            cluster(0, &[simple_block(1, 0, 0x80, &[0])]),
        ]))
        .unwrap();

        demuxer.abort_handle().abort();
        assert!(matches!(demuxer.next_block(), Err(Error::Cancelled)));
    }

    #[test]
    fn verify_abort_before_open_cancels_preload() {
        let abort = AbortHandle::new();
        abort.abort();

        let data = file(&[
            info(None, None, None),
            tracks(2, "A_AC3"),
            cluster(0, &[simple_block(1, 0, 0x80, &[0])]),
        ]);
        let result = MkvDemuxer::try_new_with_abort(
            Box::new(Cursor::new(data.clone())),
            MkvOptions::default(),
            abort.clone(),
        );
        assert!(matches!(result, Err(Error::Cancelled)));

        // The handle keeps controlling the opened demuxer.
        abort.reset();
        let mut demuxer = MkvDemuxer::try_new_with_abort(
            Box::new(Cursor::new(data)),
            MkvOptions::default(),
            abort.clone(),
        )
        .unwrap();
        abort.abort();
        assert!(matches!(demuxer.next_block(), Err(Error::Cancelled)));
    }

    #[test]
    fn verify_too_deep_chapters_only_affect_their_segment() {
        let mut atom = chapter_atom(1, 0, None, "", &[]);
        for uid in 2..72 {
            atom = master(0xB6, &[uint(0x73C4, uid), atom]);
        }

        let mut data = file(&[
            info(None, None, None),
            tracks(2, "A_AC3"),
            cluster(0, &[simple_block(1, 0, 0x80, &[1])]),
        ]);
        data.extend(segment(&[
            tracks(2, "A_AC3"),
            chapters(&[edition(1, false, &[atom])]),
            cluster(0, &[simple_block(1, 0, 0x80, &[2])]),
        ]));

        let mut demuxer = open(data).unwrap();
        assert!(demuxer.diagnostics().contains(DiagnosticKind::DepthExceeded));
        assert_eq!(demuxer.next_block().unwrap().unwrap().data[0], 1);
    }

    fn three_clusters(duration: Option<f64>, with_cues: bool, second: &[u8]) -> Vec<u8> {
        let mut info = vec![uint(0x2AD7B1, 1_000_000)];
        if let Some(duration) = duration {
            info.push(float(0x4489, duration));
        }
        let info = master(0x1549A966, &info);
        let tracks = tracks(2, "A_AC3");
        let c0 = cluster(0, &[simple_block(1, 0, 0x80, &[0])]);
        let c1 = cluster(1000, &[simple_block(1, 0, 0x80, second)]);
        let c2 = cluster(2000, &[simple_block(1, 0, 0x80, &[2])]);

        if !with_cues {
            return file(&[info, tracks, c0, c1, c2]);
        }

        let cues_len =
            master(0x1C53BB6B, &[cue_point(0, 0), cue_point(1000, 0), cue_point(2000, 0)]).len();
        let c0_pos = (info.len() + tracks.len() + cues_len) as u64;
        let c1_pos = c0_pos + c0.len() as u64;
        let c2_pos = c1_pos + c1.len() as u64;
        let cues = master(
            0x1C53BB6B,
            &[cue_point(0, c0_pos), cue_point(1000, c1_pos), cue_point(2000, c2_pos)],
        );

        file(&[info, tracks, cues, c0, c1, c2])
    }

    /// The fraction of `data` landing `delta` bytes around the start of the second cluster built
    /// by `three_clusters`.
    fn fraction_near_second_cluster(data: &[u8], delta: f64) -> f64 {
        let last_len = cluster(2000, &[simple_block(1, 0, 0x80, &[2])]).len();
        let end = data.len() - last_len;
        let start = data[..end].windows(4).rposition(|w| w == [0x1F, 0x43, 0xB6, 0x75]).unwrap();
        (start as f64 + delta) / data.len() as f64
    }

    #[test]
    fn verify_percent_seek_uses_duration_with_cues() {
        let mut demuxer = open(three_clusters(Some(3000.0), true, &[1])).unwrap();
        assert_eq!(demuxer.duration(), 3_000_000);

        let seeked = demuxer.seek(SeekTo::Percent(0.5)).unwrap();
        assert_eq!(seeked, SeekedTo { required: 1_500_000, actual: 1_500_000 });

        // The audio of the cue before the target is not presented.
        assert_eq!(payloads(&mut demuxer), vec![(Some(2_000_000), vec![2])]);
    }

    #[test]
    fn verify_percent_seek_maps_byte_position_through_cues() {
        let data = three_clusters(None, true, &[1]);
        let fraction = fraction_near_second_cluster(&data, -0.5);

        let options = MkvOptions { seek_percent: true, ..Default::default() };
        let mut demuxer = MkvDemuxer::try_new(Box::new(Cursor::new(data)), options).unwrap();

        let seeked = demuxer.seek(SeekTo::Percent(fraction)).unwrap();
        assert_eq!(seeked.required, 1_000_000);
        assert_eq!(demuxer.next_block().unwrap().unwrap().data[0], 1);
    }

    #[test]
    fn verify_percent_seek_scans_clusters_without_index() {
        let data = three_clusters(None, false, &[1]);
        let fraction = fraction_near_second_cluster(&data, -0.5);
        let mut demuxer = open(data).unwrap();

        // Nothing was indexed yet, the clusters are scanned up to the byte position.
        let seeked = demuxer.seek(SeekTo::Percent(fraction)).unwrap();
        assert_eq!(seeked, SeekedTo { required: 0, actual: 0 });
        assert_eq!(
            payloads(&mut demuxer),
            vec![(Some(1_000_000), vec![1]), (Some(2_000_000), vec![2])]
        );

        // Clusters met while playing are indexed, a nearby entry is then trusted.
        let seeked = demuxer.seek(SeekTo::Percent(fraction)).unwrap();
        assert_eq!(seeked, SeekedTo { required: 1_000_000, actual: 1_000_000 });
        assert_eq!(demuxer.next_block().unwrap().unwrap().data[0], 1);
    }

    #[test]
    fn verify_percent_seek_scans_when_index_entry_is_far() {
        let big = vec![1u8; 2_100_000];
        let data = three_clusters(None, false, &big);
        let fraction = fraction_near_second_cluster(&data, 100.0);
        let mut demuxer = open(data).unwrap();

        assert_eq!(payloads(&mut demuxer).len(), 3);

        // The next indexed cluster is more than 2,000,000 bytes past the estimate.
        let seeked = demuxer.seek(SeekTo::Percent(fraction)).unwrap();
        assert_eq!(seeked, SeekedTo { required: 2_000_000, actual: 0 });
        assert_eq!(payloads(&mut demuxer), vec![(Some(2_000_000), vec![2])]);
    }
}
