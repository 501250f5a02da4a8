// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use mkvnav_core::abort::AbortHandle;
use mkvnav_core::errors::{seek_error, DiagnosticKind, Diagnostics, Error, Result, SeekErrorKind};
use mkvnav_core::io::SeekableStream;
use mkvnav_core::util::time::{float_ticks_to_us, ticks_to_us};

use crate::block::RawBlock;
use crate::chapters::ChapterTree;
use crate::ebml::{read_payload, read_signed, read_unsigned, Element, ElementHeader};
use crate::element_ids::ElementType;
use crate::elements::{
    AttachmentsElement, ChaptersElement, CuesElement, InfoElement, SeekHeadElement, TagsElement,
    TracksElement,
};
use crate::index::Index;
use crate::lacing::read_block_header;
use crate::meta::{Attachment, Tag};
use crate::options::MkvOptions;
use crate::parser::Parser;
use crate::track::{Track, TrackCategory};

/// Descriptive information about a segment.
#[derive(Clone, Debug)]
pub struct SegmentInfo {
    pub uid: Option<Box<[u8]>>,
    pub prev_uid: Option<Box<[u8]>>,
    pub next_uid: Option<Box<[u8]>>,
    pub families: Vec<Box<[u8]>>,
    pub title: Option<String>,
    pub muxing_app: Option<String>,
    pub writing_app: Option<String>,
    pub filename: Option<String>,
    /// Nanoseconds since 2001-01-01T00:00:00 UTC.
    pub date_utc: Option<i64>,
    /// Nanoseconds per timestamp tick.
    pub timestamp_scale: u64,
    /// Duration in microseconds.
    pub duration: Option<i64>,
}

impl Default for SegmentInfo {
    fn default() -> Self {
        SegmentInfo {
            uid: None,
            prev_uid: None,
            next_uid: None,
            families: Vec::new(),
            title: None,
            muxing_app: None,
            writing_app: None,
            filename: None,
            date_utc: None,
            timestamp_scale: 1_000_000,
            duration: None,
        }
    }
}

/// Where a seek left the segment.
pub(crate) struct SeekOutcome {
    /// Blocks before `start_pts` are not presented.
    pub(crate) start_pts: i64,
    /// Video frames read while searching for the target that the decoder needs before it.
    pub(crate) preroll: Vec<RawBlock>,
}

/// Maps a SeekID to the element kinds a seek head may point at.
fn seek_target(id: u64) -> Option<ElementType> {
    match id {
        0x1C53BB6B => Some(ElementType::Cues),
        0x1549A966 => Some(ElementType::Info),
        0x1043A770 => Some(ElementType::Chapters),
        0x1254C367 => Some(ElementType::Tags),
        0x114D9B74 => Some(ElementType::SeekHead),
        0x1654AE6B => Some(ElementType::Tracks),
        0x1941A469 => Some(ElementType::Attachments),
        _ => None,
    }
}

/// A physical segment of a file.
pub(crate) struct Segment {
    /// The source stream the segment was found in.
    pub(crate) source: usize,
    header: ElementHeader,
    parser: Parser,
    pub(crate) info: SegmentInfo,
    pub(crate) tracks: Vec<Track>,
    pub(crate) index: Index,
    pub(crate) attachments: Vec<Attachment>,
    pub(crate) tags: Vec<Tag>,
    pub(crate) chapters: ChapterTree,
    /// Position of the first cluster.
    pub(crate) start_pos: Option<u64>,
    /// Time of the first cluster in microseconds.
    pub(crate) start_time: i64,
    pub(crate) preloaded: bool,
    info_pos: Option<u64>,
    tracks_pos: Option<u64>,
    cues_pos: Option<u64>,
    attachments_pos: Option<u64>,
    chapters_pos: Option<u64>,
    tags_pos: Option<u64>,
    seekheads: Vec<u64>,
    /// Seek heads being followed, each one reached through the previous one.
    seekhead_depth: usize,
    cluster: Option<ElementHeader>,
    cluster_pos: u64,
    cluster_ts: u64,
    block_pos: u64,
}

impl Segment {
    fn new(source: usize, header: ElementHeader, options: &MkvOptions) -> Self {
        Segment {
            source,
            header,
            // Blocks sit three levels below the segment.
            parser: Parser::new(header, options.max_depth.max(3), options.accept_dummy_elements),
            info: Default::default(),
            tracks: Vec::new(),
            index: Index::new(),
            attachments: Vec::new(),
            tags: Vec::new(),
            chapters: ChapterTree::new(),
            start_pos: None,
            start_time: 0,
            preloaded: false,
            info_pos: None,
            tracks_pos: None,
            cues_pos: None,
            attachments_pos: None,
            chapters_pos: None,
            tags_pos: None,
            seekheads: Vec::new(),
            seekhead_depth: 0,
            cluster: None,
            cluster_pos: 0,
            cluster_ts: 0,
            block_pos: 0,
        }
    }

    /// Creates a segment and reads its Info element, which identifies it for linking. The stream
    /// must be at the start of the segment data.
    pub(crate) fn discover<R: SeekableStream>(
        reader: &mut R,
        source: usize,
        header: ElementHeader,
        options: &MkvOptions,
        diag: &mut Diagnostics,
    ) -> Result<Segment> {
        let mut segment = Segment::new(source, header, options);

        // Unseekable streams are read once, by the preload.
        if !reader.is_seekable() {
            return Ok(segment);
        }

        while let Some(el) = segment.parser.get(reader, diag)? {
            match el.etype {
                ElementType::Info if !el.unknown_size => {
                    segment.load_element(reader, el, options, diag)?;
                    break;
                }
                ElementType::Cluster => break,
                _ if el.unknown_size => break,
                _ => (),
            }
        }

        Ok(segment)
    }

    /// The segment element itself.
    pub(crate) fn header(&self) -> &ElementHeader {
        &self.header
    }

    pub(crate) fn track(&self, number: u64) -> Option<&Track> {
        self.tracks.iter().find(|track| track.number == number)
    }

    pub(crate) fn track_mut(&mut self, number: u64) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|track| track.number == number)
    }

    /// Returns true if both segments share a family uid.
    pub(crate) fn family_match(&self, other: &Segment) -> bool {
        self.info.families.iter().any(|family| other.info.families.contains(family))
    }

    /// Reads the metadata of the segment up to its first cluster.
    ///
    /// Returns false if the segment has no usable track.
    pub(crate) fn preload<R: SeekableStream>(
        &mut self,
        reader: &mut R,
        options: &MkvOptions,
        abort: &AbortHandle,
        diag: &mut Diagnostics,
    ) -> Result<bool> {
        if self.preloaded {
            return Ok(true);
        }

        if reader.is_seekable() {
            self.parser.reset_at(reader, self.header.data_pos)?;
        }

        loop {
            abort.check()?;

            let el = match self.parser.get(reader, diag)? {
                Some(el) => el,
                None => break,
            };

            match el.etype {
                ElementType::Cluster => {
                    log::debug!("mkv: first cluster at {}", el.pos);
                    self.cluster = Some(el);
                    self.cluster_pos = el.pos;
                    self.start_pos = Some(el.pos);
                    self.read_start_time(reader, diag)?;
                    break;
                }
                ElementType::SeekHead
                | ElementType::Info
                | ElementType::Tracks
                | ElementType::Cues
                | ElementType::Attachments
                | ElementType::Chapters
                | ElementType::Tags => {
                    if el.unknown_size {
                        diag.report(
                            DiagnosticKind::MalformedElement,
                            el.pos,
                            "top-level element of unknown size",
                        );
                        break;
                    }
                    self.load_element(reader, el, options, diag)?;
                }
                other => {
                    log::debug!("mkv: preload ignoring {:?}", other);
                }
            }
        }

        if self.tracks.is_empty() {
            log::error!("mkv: no supported tracks");
            return Ok(false);
        }

        self.preloaded = true;
        Ok(true)
    }

    fn read_start_time<R: SeekableStream>(&mut self, reader: &mut R, diag: &mut Diagnostics) -> Result<()> {
        self.cluster_ts = 0;
        self.parser.down()?;

        while let Some(el) = self.parser.get(reader, diag)? {
            match el.etype {
                ElementType::Timestamp => {
                    self.cluster_ts = read_unsigned(reader, &el)?;
                    break;
                }
                ElementType::SimpleBlock | ElementType::BlockGroup => break,
                _ => (),
            }
        }

        self.start_time = ticks_to_us(self.cluster_ts as i64, self.info.timestamp_scale);
        Ok(())
    }

    /// Marks the element kind held in `slot` as loaded from `el`. Returns false if it already
    /// was.
    fn mark_loaded(slot: &mut Option<u64>, el: &ElementHeader, diag: &mut Diagnostics) -> bool {
        match *slot {
            None => {
                *slot = Some(el.pos);
                true
            }
            Some(pos) if pos == el.pos => false,
            Some(_) => {
                diag.report(
                    DiagnosticKind::DuplicateTopLevelElement,
                    el.pos,
                    "duplicate top-level element ignored",
                );
                false
            }
        }
    }

    fn is_loaded(&self, kind: ElementType, pos: u64) -> bool {
        match kind {
            ElementType::Info => self.info_pos.is_some(),
            ElementType::Tracks => self.tracks_pos.is_some(),
            ElementType::Cues => self.cues_pos.is_some(),
            ElementType::Attachments => self.attachments_pos.is_some(),
            ElementType::Chapters => self.chapters_pos.is_some(),
            ElementType::Tags => self.tags_pos.is_some(),
            ElementType::SeekHead => self.seekheads.contains(&pos),
            _ => false,
        }
    }

    /// Reads one top-level element. Malformed elements are reported and skipped.
    fn load_element<R: SeekableStream>(
        &mut self,
        reader: &mut R,
        el: ElementHeader,
        options: &MkvOptions,
        diag: &mut Diagnostics,
    ) -> Result<()> {
        let result = match el.etype {
            ElementType::SeekHead => self.parse_seek_head(reader, el, options, diag),
            ElementType::Info => {
                if Self::mark_loaded(&mut self.info_pos, &el, diag) {
                    InfoElement::read(reader, el).map(|info| self.set_info(info))
                }
                else {
                    Ok(())
                }
            }
            ElementType::Tracks => {
                if Self::mark_loaded(&mut self.tracks_pos, &el, diag) {
                    TracksElement::read(reader, el).map(|tracks| {
                        for track in tracks.tracks.into_vec() {
                            if let Some(track) = Track::from_element(track, diag, el.pos) {
                                log::debug!(
                                    "mkv: track {} ({:?}, {})",
                                    track.number,
                                    track.category,
                                    track.codec_id
                                );
                                self.tracks.push(track);
                            }
                        }
                    })
                }
                else {
                    Ok(())
                }
            }
            ElementType::Cues => {
                if Self::mark_loaded(&mut self.cues_pos, &el, diag) {
                    CuesElement::read(reader, el).map(|cues| {
                        self.index.load_cues(&cues, self.header.data_pos, self.info.timestamp_scale);
                    })
                }
                else {
                    Ok(())
                }
            }
            ElementType::Attachments => {
                if Self::mark_loaded(&mut self.attachments_pos, &el, diag) {
                    AttachmentsElement::read(reader, el).map(|attachments| {
                        self.attachments.extend(
                            attachments.files.into_vec().into_iter().map(Attachment::from_element),
                        );
                    })
                }
                else {
                    Ok(())
                }
            }
            ElementType::Chapters => {
                if Self::mark_loaded(&mut self.chapters_pos, &el, diag) {
                    ChaptersElement::read(reader, el).map(|chapters| {
                        self.chapters.load(
                            &chapters,
                            options.use_ordered_chapters,
                            options.use_chapter_codecs,
                        );
                    })
                }
                else {
                    Ok(())
                }
            }
            ElementType::Tags => {
                if Self::mark_loaded(&mut self.tags_pos, &el, diag) {
                    TagsElement::read(reader, el).map(|tags| {
                        self.tags.extend(tags.tags.into_vec().into_iter().map(Tag::from_element));
                    })
                }
                else {
                    Ok(())
                }
            }
            other => {
                log::debug!("mkv: not loading {:?}", other);
                Ok(())
            }
        };

        match result {
            Err(Error::DecodeError(msg)) => {
                diag.report(DiagnosticKind::MalformedElement, el.pos, msg);
                Ok(())
            }
            Err(err) if err.is_end_of_stream() => {
                diag.report(DiagnosticKind::MalformedElement, el.pos, "truncated element");
                Ok(())
            }
            Err(Error::LimitError(msg)) => {
                diag.report(DiagnosticKind::DepthExceeded, el.pos, msg);
                Ok(())
            }
            result => result,
        }
    }

    fn set_info(&mut self, info: InfoElement) {
        let scale = info.timestamp_scale;

        self.info = SegmentInfo {
            uid: info.uid,
            prev_uid: info.prev_uid,
            next_uid: info.next_uid,
            families: info.families,
            title: info.title,
            muxing_app: info.muxing_app,
            writing_app: info.writing_app,
            filename: info.filename,
            date_utc: info.date_utc,
            timestamp_scale: scale,
            duration: info.duration.map(|duration| float_ticks_to_us(duration, scale)),
        };
    }

    fn parse_seek_head<R: SeekableStream>(
        &mut self,
        reader: &mut R,
        el: ElementHeader,
        options: &MkvOptions,
        diag: &mut Diagnostics,
    ) -> Result<()> {
        if self.seekheads.contains(&el.pos) {
            return Ok(());
        }

        if self.seekhead_depth >= options.max_seekhead_depth {
            diag.report(DiagnosticKind::DepthExceeded, el.pos, "seek heads chained too deep");
            return Ok(());
        }

        self.seekheads.push(el.pos);

        self.seekhead_depth += 1;
        let result = self.follow_seek_head(reader, el, options, diag);
        self.seekhead_depth -= 1;
        result
    }

    fn follow_seek_head<R: SeekableStream>(
        &mut self,
        reader: &mut R,
        el: ElementHeader,
        options: &MkvOptions,
        diag: &mut Diagnostics,
    ) -> Result<()> {
        let seek_head = SeekHeadElement::read(reader, el)?;

        if !reader.is_seekable() {
            log::debug!("mkv: ignoring seek head of an unseekable stream");
            return Ok(());
        }

        for seek in seek_head.seeks.iter() {
            let kind = match seek_target(seek.id) {
                Some(kind) => kind,
                None => {
                    log::debug!("mkv: ignoring seek head entry {:#x}", seek.id);
                    continue;
                }
            };

            let pos = match self.header.data_pos.checked_add(seek.position) {
                Some(pos) => pos,
                None => {
                    diag.report(
                        DiagnosticKind::BrokenSeekHead,
                        el.pos,
                        "seek head entry points past the end of the stream",
                    );
                    continue;
                }
            };

            if !self.is_loaded(kind, pos) {
                self.load_seek_head_item(reader, kind, pos, options, diag)?;
            }
        }

        Ok(())
    }

    /// Loads the element of kind `kind` at `pos`, then returns to where the stream was.
    fn load_seek_head_item<R: SeekableStream>(
        &mut self,
        reader: &mut R,
        kind: ElementType,
        pos: u64,
        options: &MkvOptions,
        diag: &mut Diagnostics,
    ) -> Result<bool> {
        let saved = reader.pos();

        reader.seek_to(pos)?;

        let header = match ElementHeader::read(reader) {
            Ok((header, _)) if header.etype == kind && !header.unknown_size => Some(header),
            Ok(_) | Err(Error::DecodeError(_)) => None,
            Err(err) if err.is_end_of_stream() => None,
            Err(err) => return Err(err),
        };

        let loaded = match header {
            Some(header) => {
                log::debug!("mkv: loading {:?} from seek head", kind);
                self.load_element(reader, header, options, diag)?;
                true
            }
            None => {
                diag.report(
                    DiagnosticKind::BrokenSeekHead,
                    pos,
                    "seek head entry does not point at the expected element",
                );
                false
            }
        };

        reader.seek_to(saved)?;
        Ok(loaded)
    }

    /// Prepares playback from the first cluster.
    pub(crate) fn select<R: SeekableStream>(&mut self, reader: &mut R) -> Result<()> {
        let pos = self.start_pos.unwrap_or(self.header.data_pos);
        self.parser.reset_at(reader, pos)?;
        self.cluster = None;

        for track in self.tracks.iter_mut() {
            track.last_dts = None;
            track.silent = false;
            track.search_keyframe = false;
        }

        Ok(())
    }

    pub(crate) fn unselect(&mut self) {
        self.cluster = None;
    }

    /// Reads the next block of a known track, or `None` at the end of the segment.
    pub(crate) fn block_get<R: SeekableStream>(
        &mut self,
        reader: &mut R,
        diag: &mut Diagnostics,
    ) -> Result<Option<RawBlock>> {
        let mut data: Option<Box<[u8]>> = None;
        let mut simple = false;
        let mut ref1 = 0;
        let mut ref2 = 0;
        let mut duration = None;

        loop {
            // A SimpleBlock is complete as soon as it is read, a Block when its group ends.
            let el = if simple && data.is_some() { None } else { self.parser.get(reader, diag)? };

            if el.is_none() {
                if let Some(data) = data.take() {
                    if let Some(block) = self.finish_block(data, simple, ref1, ref2, duration, diag) {
                        return Ok(Some(block));
                    }
                    simple = false;
                    ref1 = 0;
                    ref2 = 0;
                    duration = None;
                    continue;
                }
            }

            let level = self.parser.level();

            let el = match el {
                Some(el) => el,
                None if level > 1 => {
                    self.parser.up()?;
                    continue;
                }
                None => {
                    log::debug!("mkv: end of segment");
                    return Ok(None);
                }
            };

            if level > 1 {
                if let Some(cluster) = self.cluster {
                    if !self.parser.is_top_present(&cluster) && !self.parser.has_pending() {
                        log::warn!("mkv: unexpected escape from current cluster");
                        diag.report(DiagnosticKind::LostCluster, el.pos, "element outside of its cluster");
                        self.cluster = None;
                    }
                }
                if self.cluster.is_none() {
                    continue;
                }
            }

            match (level, el.etype) {
                (1, ElementType::Cluster) => {
                    self.cluster = Some(el);
                    self.cluster_pos = el.pos;
                    self.cluster_ts = 0;
                    self.index.append(el.pos);

                    for track in self.tracks.iter_mut() {
                        track.silent = false;
                    }

                    self.parser.down()?;
                }
                (1, ElementType::Cues) => {
                    log::debug!("mkv: reached cues at {}", el.pos);
                    return Ok(None);
                }
                (2, ElementType::Timestamp) => {
                    self.cluster_ts = read_unsigned(reader, &el)?;
                }
                (2, ElementType::SilentTracks) => {
                    self.parser.down()?;
                }
                (2, ElementType::BlockGroup) => {
                    self.block_pos = el.pos;
                    self.parser.down()?;
                }
                (2, ElementType::SimpleBlock) => {
                    self.block_pos = el.pos;
                    data = Some(read_payload(reader, el.data_len)?);
                    simple = true;
                }
                (3, ElementType::Block) => {
                    data = Some(read_payload(reader, el.data_len)?);
                    simple = false;
                }
                (3, ElementType::BlockDuration) => {
                    duration = Some(read_unsigned(reader, &el)?);
                }
                (3, ElementType::ReferenceBlock) => {
                    let reference = read_signed(reader, &el)?;
                    if ref1 == 0 {
                        ref1 = reference;
                    }
                    else {
                        ref2 = reference;
                    }
                }
                (3, ElementType::SilentTrackNumber) => {
                    let number = read_unsigned(reader, &el)?;
                    if let Some(track) = self.track_mut(number) {
                        track.silent = true;
                    }
                }
                (level, other) => {
                    log::debug!("mkv: skipping {:?} at level {}", other, level);
                }
            }
        }
    }

    fn finish_block(
        &mut self,
        data: Box<[u8]>,
        simple: bool,
        ref1: i64,
        ref2: i64,
        duration: Option<u64>,
        diag: &mut Diagnostics,
    ) -> Option<RawBlock> {
        let (track, timecode, flags) = match read_block_header(&data) {
            Ok(header) => header,
            Err(_) => {
                diag.report(DiagnosticKind::MalformedElement, self.block_pos, "invalid block header");
                return None;
            }
        };

        if self.track(track).is_none() {
            log::debug!("mkv: dropping block of unknown track {}", track);
            return None;
        }

        let ticks = (self.cluster_ts as i64).saturating_add(i64::from(timecode));

        let block = RawBlock {
            data,
            simple,
            track,
            flags,
            time_ns: ticks.saturating_mul(self.info.timestamp_scale as i64),
            ref1,
            ref2,
            duration,
            block_pos: self.block_pos,
            cluster_pos: self.cluster_pos,
        };

        // The first block of a newly found cluster dates its index entry.
        if let Some(last) = self.index.last_mut() {
            if last.time == -1 && last.position == self.cluster_pos {
                last.time = block.time_ns / 1000;
                last.key = block.is_keyframe();
            }
        }

        Some(block)
    }

    /// Positions the segment for playback from `date` (µs on the chapter timeline, `offset`
    /// being the chapter timeline minus the segment timeline).
    ///
    /// With a `global` byte position, the clusters are scanned from the start of the segment up
    /// to that position instead, for files without an index.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn seek<R: SeekableStream>(
        &mut self,
        reader: &mut R,
        date: i64,
        offset: i64,
        chapter_time: i64,
        global: Option<u64>,
        abort: &AbortHandle,
        diag: &mut Diagnostics,
    ) -> Result<SeekOutcome> {
        let first = self.start_pos.unwrap_or(self.header.data_pos);

        for track in self.tracks.iter_mut() {
            track.last_dts = None;
        }

        if let Some(global) = global {
            self.parser.reset_at(reader, first)?;
            self.cluster = None;

            while let Some(el) = self.parser.get(reader, diag)? {
                abort.check()?;

                if el.etype != ElementType::Cluster {
                    continue;
                }

                self.index.append(el.pos);

                if el.pos >= global {
                    log::debug!("mkv: found a cluster at {} near {}", el.pos, global);
                    self.cluster = Some(el);
                    self.cluster_pos = el.pos;
                    self.cluster_ts = 0;
                    self.parser.down()?;
                    return Ok(SeekOutcome { start_pts: 0, preroll: Vec::new() });
                }
            }

            log::error!("mkv: unable to reach position {} by scanning clusters", global);
            return seek_error(SeekErrorKind::OutOfRange);
        }

        let (pos, time) = match self.index.find(date, offset) {
            Some(entry) => (entry.position, entry.time),
            None => (first, self.start_time),
        };

        log::debug!("mkv: seek to {} got cluster at {} ({})", date, pos, time);

        self.parser.reset_at(reader, pos)?;
        self.cluster = None;

        let mut start_pts = date;

        let mut skipping = 0;
        for track in self.tracks.iter_mut() {
            track.search_keyframe = track.category == TrackCategory::Video;
            if track.search_keyframe {
                skipping += 1;
            }
        }

        let mut preroll = Vec::new();
        let mut pts = None;

        while skipping > 0 {
            abort.check()?;

            let block = match self.block_get(reader, diag)? {
                Some(block) => block,
                None => {
                    log::warn!("mkv: cannot get block, end of segment?");
                    return Ok(SeekOutcome { start_pts, preroll });
                }
            };

            let block_pts = chapter_time + block.time_ns / 1000;
            pts = Some(block_pts);

            if block_pts >= start_pts {
                self.cluster = self.parser.unget(reader, block.block_pos, block.cluster_pos)?;
                break;
            }

            let keyframe = block.is_keyframe();

            if let Some(track) = self.track_mut(block.track) {
                if track.category == TrackCategory::Video {
                    if keyframe && track.search_keyframe {
                        track.search_keyframe = false;
                        skipping -= 1;
                    }
                    if !track.search_keyframe {
                        preroll.push(block);
                    }
                }
            }
        }

        // Rather start early than hide a long stretch of frames.
        if let Some(pts) = pts {
            if pts + 500_000 < start_pts {
                start_pts = pts;
            }
        }

        Ok(SeekOutcome { start_pts, preroll })
    }
}

#[cfg(test)]
mod tests {
    use mkvnav_core::io::BufReader;

    use super::*;
    use crate::testutil::*;

    fn tracks(entries: &[Vec<u8>]) -> Vec<u8> {
        master(0x1654AE6B, entries)
    }

    fn seek_entry(id: u32, pos: u64) -> Vec<u8> {
        master(0x4DBB, &[uint(0x53AB, u64::from(id)), element(0x53AC, &pos.to_be_bytes())])
    }

    fn cue_point(time: u64, pos: u64) -> Vec<u8> {
        master(0xBB, &[uint(0xB3, time), master(0xB7, &[uint(0xF7, 1), element(0xF1, &pos.to_be_bytes())])])
    }

    fn open(data: &[u8]) -> (BufReader<'_>, Segment, Diagnostics, bool) {
        open_with(data, MkvOptions::default())
    }

    fn open_with(data: &[u8], options: MkvOptions) -> (BufReader<'_>, Segment, Diagnostics, bool) {
        let mut reader = BufReader::new(data);
        let (header, _) = ElementHeader::read(&mut reader).unwrap();
        let mut diag = Diagnostics::new();
        let mut segment = Segment::discover(&mut reader, 0, header, &options, &mut diag).unwrap();
        let ok = segment.preload(&mut reader, &options, &AbortHandle::new(), &mut diag).unwrap();
        (reader, segment, diag, ok)
    }

    fn blocks(reader: &mut BufReader<'_>, segment: &mut Segment) -> Vec<RawBlock> {
        let mut diag = Diagnostics::new();
        let mut out = Vec::new();
        while let Some(block) = segment.block_get(reader, &mut diag).unwrap() {
            out.push(block);
        }
        out
    }

    #[test]
    fn verify_preload_and_block_walk() {
        let data = segment(&[
            info(Some([1; 16]), None, None),
            tracks(&[track_entry(1, 1, "V_MPEG4/ISO/AVC"), track_entry(2, 2, "A_AAC")]),
            cluster(40, &[simple_block(1, 0, 0x80, &[1]), simple_block(2, 5, 0x80, &[2])]),
            cluster(
                100,
                &[
                    block_group(1, 0, Some(-60), Some(20), &[3]),
                    simple_block(9, 0, 0x80, &[4]),
                    simple_block(2, -3, 0x00, &[5]),
                ],
            ),
        ]);

        let (mut reader, mut segment, diag, ok) = open(&data);
        assert!(ok);
        assert!(diag.is_empty());
        assert_eq!(segment.tracks.len(), 2);
        assert_eq!(segment.info.uid.as_deref(), Some(&[1u8; 16][..]));
        assert_eq!(segment.start_time, 40_000);

        segment.select(&mut reader).unwrap();
        let blocks = blocks(&mut reader, &mut segment);

        // The block of the unknown track 9 is dropped.
        let times: Vec<(u64, i64)> = blocks.iter().map(|b| (b.track, b.time_ns)).collect();
        assert_eq!(
            times,
            vec![(1, 40_000_000), (2, 45_000_000), (1, 100_000_000), (2, 97_000_000)]
        );

        assert!(blocks[0].simple && blocks[0].is_keyframe());
        assert!(!blocks[2].simple);
        assert!(!blocks[2].is_keyframe());
        assert_eq!(blocks[2].ref1, -60);
        assert_eq!(blocks[2].duration, Some(20));
        assert_eq!(&blocks[2].data[4..], &[3]);
        assert!(!blocks[3].is_keyframe());

        // Both clusters were indexed and dated by their first block.
        let index: Vec<i64> = segment.index.entries().iter().map(|e| e.time).collect();
        assert_eq!(index, vec![40_000, 100_000]);
        assert_eq!(segment.index.entries()[1].position, blocks[2].cluster_pos);
    }

    #[test]
    fn verify_segment_without_tracks_is_rejected() {
        let data = segment(&[info(None, None, None), cluster(0, &[simple_block(1, 0, 0x80, &[1])])]);
        let (_, segment, _, ok) = open(&data);
        assert!(!ok);
        assert!(!segment.preloaded);
    }

    #[test]
    fn verify_seek_head_loads_trailing_elements() {
        let head_len = master(0x114D9B74, &[seek_entry(0x1C53BB6B, 0), seek_entry(0x1254C367, 0)]).len();
        let info = info(None, None, None);
        let tracks = tracks(&[track_entry(1, 2, "A_OPUS")]);
        let c0 = cluster(0, &[simple_block(1, 0, 0x80, &[0])]);
        let c1 = cluster(1000, &[simple_block(1, 0, 0x80, &[1])]);

        let c0_pos = (head_len + info.len() + tracks.len()) as u64;
        let c1_pos = c0_pos + c0.len() as u64;
        let cues_pos = c1_pos + c1.len() as u64;
        let cues = master(0x1C53BB6B, &[cue_point(0, c0_pos), cue_point(1000, c1_pos)]);

        // The tags entry points into the middle of a cluster.
        let head = master(0x114D9B74, &[seek_entry(0x1C53BB6B, cues_pos), seek_entry(0x1254C367, c0_pos + 3)]);
        assert_eq!(head.len(), head_len);

        let data = segment(&[head, info, tracks, c0, c1, cues]);
        let (_, segment, diag, ok) = open(&data);

        assert!(ok);
        assert!(segment.index.has_cues());
        assert_eq!(segment.index.len(), 2);
        assert_eq!(segment.index.entries()[1].time, 1_000_000);
        assert_eq!(segment.index.entries()[1].position, segment.header().data_pos + c1_pos);
        assert!(diag.contains(DiagnosticKind::BrokenSeekHead));
    }

    #[test]
    fn verify_duplicate_cues_are_ignored() {
        let tracks = tracks(&[track_entry(1, 2, "A_OPUS")]);
        let data = segment(&[
            tracks,
            master(0x1C53BB6B, &[cue_point(0, 0)]),
            master(0x1C53BB6B, &[cue_point(0, 0), cue_point(5, 0)]),
            cluster(0, &[simple_block(1, 0, 0x80, &[0])]),
        ]);

        let (_, segment, diag, ok) = open(&data);
        assert!(ok);
        assert_eq!(segment.index.len(), 1);
        assert!(diag.contains(DiagnosticKind::DuplicateTopLevelElement));
    }

    #[test]
    fn verify_cue_seek_lands_on_cue_position() {
        let info = info(None, None, None);
        let tracks = tracks(&[track_entry(1, 1, "V_VP9")]);
        let c0 = cluster(0, &[simple_block(1, 0, 0x80, &[0]), simple_block(1, 500, 0x00, &[1])]);
        let c1 = cluster(1000, &[simple_block(1, 0, 0x80, &[2])]);
        let c2 = cluster(2000, &[simple_block(1, 0, 0x80, &[3])]);

        let cues_len = master(0x1C53BB6B, &[cue_point(0, 0), cue_point(1000, 0), cue_point(2000, 0)]).len();
        let c0_pos = (info.len() + tracks.len() + cues_len) as u64;
        let c1_pos = c0_pos + c0.len() as u64;
        let c2_pos = c1_pos + c1.len() as u64;
        let cues = master(
            0x1C53BB6B,
            &[cue_point(0, c0_pos), cue_point(1000, c1_pos), cue_point(2000, c2_pos)],
        );

        let data = segment(&[info, tracks, cues, c0, c1, c2]);
        let (mut reader, mut segment, _, ok) = open(&data);
        assert!(ok);

        segment.select(&mut reader).unwrap();

        let mut diag = Diagnostics::new();
        let outcome = segment
            .seek(&mut reader, 1_000_000, 0, 0, None, &AbortHandle::new(), &mut diag)
            .unwrap();
        assert_eq!(outcome.start_pts, 1_000_000);
        assert!(outcome.preroll.is_empty());

        let block = segment.block_get(&mut reader, &mut diag).unwrap().unwrap();
        assert_eq!(block.cluster_pos, segment.header().data_pos + c1_pos);
        assert_eq!(block.time_ns, 1_000_000_000);
        assert_eq!(&block.data[4..], &[2]);
    }

    #[test]
    fn verify_seek_collects_preroll_after_keyframe() {
        let data = segment(&[
            info(None, None, None),
            tracks(&[track_entry(1, 1, "V_VP9")]),
            cluster(
                0,
                &[
                    simple_block(1, 0, 0x80, &[0]),
                    simple_block(1, 100, 0x00, &[1]),
                    simple_block(1, 200, 0x00, &[2]),
                ],
            ),
        ]);

        let (mut reader, mut segment, _, _) = open(&data);
        segment.select(&mut reader).unwrap();

        let mut diag = Diagnostics::new();
        let outcome = segment
            .seek(&mut reader, 150_000, 0, 0, None, &AbortHandle::new(), &mut diag)
            .unwrap();

        // The search stops at the first keyframe, the frames up to the target are left to the
        // caller.
        assert_eq!(outcome.preroll.len(), 1);
        assert!(outcome.preroll[0].is_keyframe());
        assert_eq!(outcome.start_pts, 150_000);

        let block = segment.block_get(&mut reader, &mut diag).unwrap().unwrap();
        assert_eq!(block.time_ns, 100_000_000);
    }

    #[test]
    fn verify_linear_scan_seek() {
        let data = segment(&[
            info(None, None, None),
            tracks(&[track_entry(1, 2, "A_OPUS")]),
            cluster(0, &[simple_block(1, 0, 0x80, &[0])]),
            cluster(1000, &[simple_block(1, 0, 0x80, &[1])]),
            cluster(2000, &[simple_block(1, 0, 0x80, &[2])]),
        ]);

        let (mut reader, mut segment, _, _) = open(&data);
        let first = segment.start_pos.unwrap();

        let mut diag = Diagnostics::new();
        let abort = AbortHandle::new();
        segment.seek(&mut reader, 0, 0, 0, Some(first + 1), &abort, &mut diag).unwrap();

        let block = segment.block_get(&mut reader, &mut diag).unwrap().unwrap();
        assert_eq!(block.time_ns, 1_000_000_000);
        assert_eq!(segment.index.len(), 2);

        let err = segment.seek(&mut reader, 0, 0, 0, Some(data.len() as u64), &abort, &mut diag);
        assert!(matches!(err, Err(Error::SeekError(SeekErrorKind::OutOfRange))));
        assert_eq!(segment.index.len(), 3);
    }

    #[test]
    fn verify_silent_tracks_are_flagged_per_cluster() {
        let data = segment(&[
            tracks(&[track_entry(1, 2, "A_OPUS"), track_entry(2, 2, "A_OPUS")]),
            master(
                0x1F43B675,
                &[
                    uint(0xE7, 0),
                    master(0x5854, &[uint(0x58D7, 2)]),
                    simple_block(2, 0, 0x80, &[0]),
                ],
            ),
            cluster(10, &[simple_block(2, 0, 0x80, &[1])]),
        ]);

        let (mut reader, mut segment, _, _) = open(&data);
        segment.select(&mut reader).unwrap();

        let mut diag = Diagnostics::new();
        segment.block_get(&mut reader, &mut diag).unwrap().unwrap();
        assert!(segment.track(2).unwrap().silent);

        segment.block_get(&mut reader, &mut diag).unwrap().unwrap();
        assert!(!segment.track(2).unwrap().silent);
    }

    #[test]
    fn verify_seek_position_past_end_of_stream_is_skipped() {
        let data = segment(&[
            master(0x114D9B74, &[seek_entry(0x1C53BB6B, u64::MAX)]),
            tracks(&[track_entry(1, 2, "A_OPUS")]),
            cluster(0, &[simple_block(1, 0, 0x80, &[0])]),
        ]);

        let (_, segment, diag, ok) = open(&data);
        assert!(ok);
        assert!(!segment.index.has_cues());
        assert!(diag.contains(DiagnosticKind::BrokenSeekHead));
    }

    #[test]
    fn verify_seek_head_chain_is_bounded() {
        let sh1_len = master(0x114D9B74, &[seek_entry(0x114D9B74, 0)]).len();
        let tracks = tracks(&[track_entry(1, 2, "A_OPUS")]);
        let c0 = cluster(0, &[simple_block(1, 0, 0x80, &[0])]);
        let tags = master(
            0x1254C367,
            &[master(0x7373, &[master(0x67C8, &[string(0x45A3, "TITLE"), string(0x4487, "x")])])],
        );

        // Each seek head points at the next one, the last one at the tags.
        let sh2_pos = (sh1_len + tracks.len() + c0.len()) as u64;
        let sh2 = master(0x114D9B74, &[seek_entry(0x114D9B74, 0)]);
        let sh3_pos = sh2_pos + sh2.len() as u64;
        let sh3 = master(0x114D9B74, &[seek_entry(0x1254C367, 0)]);
        let tags_pos = sh3_pos + sh3.len() as u64;

        let data = segment(&[
            master(0x114D9B74, &[seek_entry(0x114D9B74, sh2_pos)]),
            tracks,
            c0,
            master(0x114D9B74, &[seek_entry(0x114D9B74, sh3_pos)]),
            master(0x114D9B74, &[seek_entry(0x1254C367, tags_pos)]),
            tags,
        ]);

        let (_, segment, diag, ok) = open(&data);
        assert!(ok);
        assert_eq!(segment.tags.len(), 1);
        assert!(!diag.contains(DiagnosticKind::DepthExceeded));

        let options = MkvOptions { max_seekhead_depth: 2, ..Default::default() };
        let (_, segment, diag, ok) = open_with(&data, options);
        assert!(ok);
        assert!(segment.tags.is_empty());
        assert!(diag.contains(DiagnosticKind::DepthExceeded));
    }

    #[test]
    fn verify_too_deep_chapters_are_dropped() {
        let mut atom = chapter_atom(1, 0, None, "", &[]);
        for uid in 2..72 {
            atom = master(0xB6, &[uint(0x73C4, uid), atom]);
        }

        let data = segment(&[
            tracks(&[track_entry(1, 2, "A_OPUS")]),
            chapters(&[edition(1, false, &[atom])]),
            cluster(0, &[simple_block(1, 0, 0x80, &[0])]),
        ]);

        let (_, segment, diag, ok) = open(&data);
        assert!(ok);
        assert!(segment.chapters.is_empty());
        assert!(segment.start_pos.is_some());
        assert!(diag.contains(DiagnosticKind::DepthExceeded));
    }

    #[test]
    fn verify_oversized_block_in_unknown_size_cluster() {
        // A SimpleBlock claiming 2^40 bytes at the end of a live stream.
        let data = segment(&[
            tracks(&[track_entry(1, 2, "A_OPUS")]),
            master_unknown(
                0x1F43B675,
                &[
                    uint(0xE7, 0),
                    simple_block(1, 0, 0x80, &[1]),
                    vec![0xA3, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x02],
                ],
            ),
        ]);

        let (mut reader, mut segment, _, ok) = open(&data);
        assert!(ok);
        segment.select(&mut reader).unwrap();

        let mut diag = Diagnostics::new();
        let block = segment.block_get(&mut reader, &mut diag).unwrap().unwrap();
        assert_eq!(&block.data[4..], &[1]);

        assert!(segment.block_get(&mut reader, &mut diag).unwrap().is_none());
        assert!(diag.contains(DiagnosticKind::MalformedElement));
    }

    #[test]
    fn verify_lost_cluster_resumes_at_next_cluster() {
        let data = segment(&[
            tracks(&[track_entry(1, 2, "A_OPUS")]),
            cluster(0, &[simple_block(1, 0, 0x80, &[0]), simple_block(1, 10, 0x80, &[1])]),
            cluster(1000, &[simple_block(1, 0, 0x80, &[2])]),
        ]);

        let (mut reader, mut segment, _, _) = open(&data);
        segment.select(&mut reader).unwrap();

        let mut diag = Diagnostics::new();
        segment.block_get(&mut reader, &mut diag).unwrap().unwrap();

        // A stale cluster pointer, as left behind by a bad seek.
        let current = segment.cluster.unwrap();
        segment.cluster = Some(ElementHeader { pos: current.pos + 1, ..current });

        let block = segment.block_get(&mut reader, &mut diag).unwrap().unwrap();
        assert!(diag.contains(DiagnosticKind::LostCluster));
        assert_eq!(block.time_ns, 1_000_000_000);
        assert_eq!(&block.data[4..], &[2]);
    }
}
