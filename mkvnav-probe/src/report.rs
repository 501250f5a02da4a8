// mkvnav Probe Tool
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use mkvnav_core::errors::Diagnostics;
use mkvnav_format_mkv::{Block, BlockFlags, ChapterEntry, Compression, MkvDemuxer, SeekedTo};
use mkvnav_format_mkv::{SimpleTag, Tag, TagValue, Track, TrackCategory};

use serde::Serialize;

/// The minimum padding for keys.
const MIN_PAD: usize = 20;

#[derive(Serialize, Debug)]
pub struct Report {
    segment: SegmentReport,
    current_title: usize,
    titles: Vec<TitleReport>,
    tracks: Vec<TrackReport>,
    attachments: Vec<AttachmentReport>,
    tags: Vec<TagReport>,
    cues: usize,
    highlighted_button: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    seek: Option<SeekReport>,
    blocks: Vec<BlockReport>,
    diagnostics: Vec<DiagnosticReport>,
}

#[derive(Serialize, Debug)]
struct SegmentReport {
    uid: Option<String>,
    prev_uid: Option<String>,
    next_uid: Option<String>,
    families: Vec<String>,
    title: Option<String>,
    muxing_app: Option<String>,
    writing_app: Option<String>,
    timestamp_scale: u64,
    duration_us: Option<i64>,
}

#[derive(Serialize, Debug)]
struct TitleReport {
    name: String,
    duration_us: i64,
    editions: Vec<EditionReport>,
}

#[derive(Serialize, Debug)]
struct EditionReport {
    uid: Option<u64>,
    name: String,
    ordered: bool,
    default: bool,
    hidden: bool,
    duration_us: i64,
    chapters: Vec<ChapterReport>,
}

#[derive(Serialize, Debug)]
struct ChapterReport {
    uid: Option<u64>,
    name: String,
    start_us: i64,
    end_us: i64,
    hidden: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<ChapterReport>,
}

impl ChapterReport {
    fn new(entry: &ChapterEntry) -> Self {
        ChapterReport {
            uid: entry.uid,
            name: entry.name.trim_start_matches('+').trim().to_string(),
            start_us: entry.user_start,
            end_us: entry.user_end,
            hidden: entry.hidden,
            children: entry.children.iter().map(ChapterReport::new).collect(),
        }
    }
}

#[derive(Serialize, Debug)]
struct TrackReport {
    number: u64,
    uid: Option<u64>,
    category: &'static str,
    buttons: bool,
    codec_id: String,
    codec: String,
    name: Option<String>,
    language: String,
    enabled: bool,
    default: bool,
    forced: bool,
    default_duration_ns: Option<u64>,
    compression: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<(u32, u32)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sample_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    channels: Option<u64>,
}

impl TrackReport {
    fn new(track: &Track) -> Self {
        let category = match track.category {
            TrackCategory::Video => "video",
            TrackCategory::Audio => "audio",
            TrackCategory::Subtitle => "subtitle",
            TrackCategory::Unknown => "unknown",
        };

        let compression = match &track.compression {
            Compression::None => "none".to_string(),
            Compression::Zlib => "zlib".to_string(),
            Compression::HeaderStrip(prefix) => format!("header stripping ({} bytes)", prefix.len()),
        };

        TrackReport {
            number: track.number,
            uid: track.uid,
            category,
            buttons: track.buttons,
            codec_id: track.codec_id.clone(),
            codec: track.codec.to_string(),
            name: track.name.clone(),
            language: track.language.clone(),
            enabled: track.enabled,
            default: track.default,
            forced: track.forced,
            default_duration_ns: track.default_duration,
            compression,
            dimensions: track.video.as_ref().map(|v| (v.pixel_width, v.pixel_height)),
            sample_rate: track.audio.as_ref().map(|a| a.sampling_frequency),
            channels: track.audio.as_ref().map(|a| a.channels),
        }
    }
}

#[derive(Serialize, Debug)]
struct AttachmentReport {
    name: String,
    mime_type: String,
    description: Option<String>,
    len: usize,
}

#[derive(Serialize, Debug)]
struct TagReport {
    type_value: Option<u64>,
    track_uids: Vec<u64>,
    edition_uids: Vec<u64>,
    chapter_uids: Vec<u64>,
    simple_tags: Vec<SimpleTagReport>,
}

impl TagReport {
    fn new(tag: &Tag) -> Self {
        TagReport {
            type_value: tag.target.type_value,
            track_uids: tag.target.track_uids.clone(),
            edition_uids: tag.target.edition_uids.clone(),
            chapter_uids: tag.target.chapter_uids.clone(),
            simple_tags: tag.simple_tags.iter().map(SimpleTagReport::new).collect(),
        }
    }
}

#[derive(Serialize, Debug)]
struct SimpleTagReport {
    name: String,
    language: String,
    value: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<SimpleTagReport>,
}

impl SimpleTagReport {
    fn new(tag: &SimpleTag) -> Self {
        let value = tag.value.as_ref().map(|value| match value {
            TagValue::String(s) => s.clone(),
            TagValue::Binary(b) => format!("<{} bytes>", b.len()),
        });

        SimpleTagReport {
            name: tag.name.clone(),
            language: tag.language.clone(),
            value,
            children: tag.children.iter().map(SimpleTagReport::new).collect(),
        }
    }
}

#[derive(Serialize, Debug)]
struct SeekReport {
    required_us: i64,
    actual_us: i64,
}

#[derive(Serialize, Debug)]
struct BlockReport {
    track: u64,
    pts: Option<i64>,
    dts: Option<i64>,
    duration: Option<i64>,
    frame: usize,
    len: usize,
    flags: Vec<&'static str>,
}

#[derive(Serialize, Debug)]
struct DiagnosticReport {
    kind: String,
    offset: u64,
    message: &'static str,
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

impl Report {
    pub fn new(demuxer: &mut MkvDemuxer) -> Self {
        let info = demuxer.segment_info();

        let segment = SegmentReport {
            uid: info.uid.as_deref().map(hex),
            prev_uid: info.prev_uid.as_deref().map(hex),
            next_uid: info.next_uid.as_deref().map(hex),
            families: info.families.iter().map(|f| hex(f)).collect(),
            title: info.title.clone(),
            muxing_app: info.muxing_app.clone(),
            writing_app: info.writing_app.clone(),
            timestamp_scale: info.timestamp_scale,
            duration_us: info.duration,
        };

        let tracks = demuxer.tracks().iter().map(TrackReport::new).collect();

        let attachments = demuxer
            .attachments()
            .iter()
            .map(|a| AttachmentReport {
                name: a.name.clone(),
                mime_type: a.mime_type.clone(),
                description: a.description.clone(),
                len: a.len,
            })
            .collect();

        let tags = demuxer.tags().iter().map(TagReport::new).collect();
        let cues = demuxer.index().len();
        let current_title = demuxer.current_title();
        let highlighted_button = demuxer.current_button_state().highlighted;

        let titles = demuxer
            .titles()
            .into_iter()
            .map(|title| TitleReport {
                name: title.name,
                duration_us: title.duration,
                editions: title
                    .editions
                    .iter()
                    .map(|edition| EditionReport {
                        uid: edition.uid,
                        name: edition.name.clone(),
                        ordered: edition.ordered,
                        default: edition.default,
                        hidden: edition.hidden,
                        duration_us: edition.duration,
                        chapters: edition.chapters.iter().map(ChapterReport::new).collect(),
                    })
                    .collect(),
            })
            .collect();

        Report {
            segment,
            current_title,
            titles,
            tracks,
            attachments,
            tags,
            cues,
            highlighted_button,
            seek: None,
            blocks: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn set_seek(&mut self, seeked: SeekedTo) {
        self.seek = Some(SeekReport { required_us: seeked.required, actual_us: seeked.actual });
    }

    pub fn push_block(&mut self, block: &Block) {
        let names = [
            (BlockFlags::KEYFRAME, "keyframe"),
            (BlockFlags::DISCARDABLE, "discardable"),
            (BlockFlags::SILENT, "silent"),
            (BlockFlags::PREROLL, "preroll"),
            (BlockFlags::MUST_DECOMPRESS, "must_decompress"),
        ];

        self.blocks.push(BlockReport {
            track: block.track,
            pts: block.pts,
            dts: block.dts,
            duration: block.duration,
            frame: block.frame,
            len: block.data.len(),
            flags: names
                .iter()
                .filter(|(flag, _)| block.flags.contains(*flag))
                .map(|(_, name)| *name)
                .collect(),
        });
    }

    pub fn set_diagnostics(&mut self, diagnostics: &Diagnostics) {
        self.diagnostics = diagnostics
            .reports()
            .iter()
            .map(|d| DiagnosticReport {
                kind: format!("{:?}", d.kind),
                offset: d.offset,
                message: d.message,
            })
            .collect();
    }

    pub fn print(&self, path: &Path) {
        println!("+ {}", path.display());

        print_blank();
        print_header("Segment");
        if let Some(uid) = &self.segment.uid {
            print_pair("UID:", uid, Bullet::None, 1);
        }
        if let Some(prev) = &self.segment.prev_uid {
            print_pair("Previous UID:", prev, Bullet::None, 1);
        }
        if let Some(next) = &self.segment.next_uid {
            print_pair("Next UID:", next, Bullet::None, 1);
        }
        if let Some(title) = &self.segment.title {
            print_pair("Title:", title, Bullet::None, 1);
        }
        if let Some(app) = &self.segment.muxing_app {
            print_pair("Muxing App:", app, Bullet::None, 1);
        }
        if let Some(app) = &self.segment.writing_app {
            print_pair("Writing App:", app, Bullet::None, 1);
        }
        print_pair("Timestamp Scale:", &self.segment.timestamp_scale, Bullet::None, 1);
        if let Some(duration) = self.segment.duration_us {
            print_pair("Duration:", &fmt_time(duration), Bullet::None, 1);
        }
        print_pair("Cue Points:", &self.cues, Bullet::None, 1);

        if !self.tracks.is_empty() {
            print_blank();
            print_header("Tracks");

            for (i, track) in self.tracks.iter().enumerate() {
                print_pair("Track Number:", &track.number, Bullet::Num(i + 1), 1);
                print_pair("Type:", &track.category, Bullet::None, 1);
                print_pair("Codec ID:", &track.codec_id, Bullet::None, 1);
                print_pair("Codec:", &track.codec, Bullet::None, 1);
                print_pair("Language:", &track.language, Bullet::None, 1);
                if let Some(name) = &track.name {
                    print_pair("Name:", name, Bullet::None, 1);
                }
                if let Some((width, height)) = track.dimensions {
                    print_pair("Dimensions:", &format!("{}x{}", width, height), Bullet::None, 1);
                }
                if let Some(rate) = track.sample_rate {
                    print_pair("Sample Rate:", &rate, Bullet::None, 1);
                }
                if let Some(channels) = track.channels {
                    print_pair("Channels:", &channels, Bullet::None, 1);
                }
                print_pair("Compression:", &track.compression, Bullet::None, 1);
                if track.buttons {
                    print_pair("Buttons:", &"yes", Bullet::None, 1);
                }
            }
        }

        print_blank();
        print_header("Titles");

        for (i, title) in self.titles.iter().enumerate() {
            let bullet = if i == self.current_title { Bullet::Char('>') } else { Bullet::Num(i + 1) };
            print_pair("Title:", &title.name, bullet, 1);
            print_pair("Duration:", &fmt_time(title.duration_us), Bullet::None, 1);

            for (j, edition) in title.editions.iter().enumerate() {
                let mut kind = String::from(if edition.ordered { "ordered" } else { "plain" });
                if edition.default {
                    kind.push_str(", default");
                }
                if edition.hidden {
                    kind.push_str(", hidden");
                }

                print_pair("Edition:", &kind, Bullet::Num(j + 1), 2);
                print_pair("Duration:", &fmt_time(edition.duration_us), Bullet::None, 2);

                for (k, chapter) in edition.chapters.iter().enumerate() {
                    print_chapter(chapter, k + 1, 3);
                }
            }
        }

        if !self.attachments.is_empty() {
            print_blank();
            print_header("Attachments");

            for (i, attachment) in self.attachments.iter().enumerate() {
                print_pair("Name:", &attachment.name, Bullet::Num(i + 1), 1);
                print_pair("Media Type:", &attachment.mime_type, Bullet::None, 1);
                print_pair("Size:", &format!("{} bytes", attachment.len), Bullet::None, 1);
            }
        }

        if !self.tags.is_empty() {
            print_blank();
            print_header("Tags");

            for (i, tag) in self.tags.iter().enumerate() {
                let target = match tag.type_value {
                    Some(value) => value.to_string(),
                    None => "50".to_string(),
                };
                print_pair("Target Type:", &target, Bullet::Num(i + 1), 1);

                for simple in tag.simple_tags.iter() {
                    print_simple_tag(simple, 2);
                }
            }
        }

        if let Some(seek) = &self.seek {
            print_blank();
            print_header("Seek");
            print_pair("Required:", &fmt_time(seek.required_us), Bullet::None, 1);
            print_pair("Actual:", &fmt_time(seek.actual_us), Bullet::None, 1);
        }

        if !self.blocks.is_empty() {
            print_blank();
            print_header("Blocks");

            for block in self.blocks.iter() {
                let pts = block.pts.map_or_else(|| "-".to_string(), fmt_time);
                println!(
                    "|     track {:>3}  pts {:>15}  frame {:>2}  {:>8} bytes  {}",
                    block.track,
                    pts,
                    block.frame,
                    block.len,
                    block.flags.join(",")
                );
            }
        }

        if !self.diagnostics.is_empty() {
            print_blank();
            print_header("Diagnostics");

            for (i, d) in self.diagnostics.iter().enumerate() {
                print_pair(&d.kind, &format!("{:#x}: {}", d.offset, d.message), Bullet::Num(i + 1), 1);
            }
        }

        print_blank();
    }
}

fn print_chapter(chapter: &ChapterReport, idx: usize, depth: usize) {
    let name = if chapter.name.is_empty() { "(unnamed)" } else { chapter.name.as_str() };
    print_pair("Chapter:", &name, Bullet::Num(idx), depth);
    print_pair(
        "Time:",
        &format!("{} - {}", fmt_time(chapter.start_us), fmt_time(chapter.end_us)),
        Bullet::None,
        depth,
    );
    if chapter.hidden {
        print_pair("Hidden:", &"yes", Bullet::None, depth);
    }

    for (i, child) in chapter.children.iter().enumerate() {
        print_chapter(child, i + 1, depth + 1);
    }
}

fn print_simple_tag(tag: &SimpleTagReport, depth: usize) {
    let value = tag.value.as_deref().unwrap_or("");
    print_pair(&tag.name, &value, Bullet::Char('-'), depth);

    for child in tag.children.iter() {
        print_simple_tag(child, depth + 1);
    }
}

enum Bullet {
    /// No bullet.
    None,
    /// A numbered bullet.
    Num(usize),
    /// A custom character.
    Char(char),
}

impl std::fmt::Display for Bullet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The bullet must occupy 4 characters.
        match self {
            Bullet::None => write!(f, "    "),
            Bullet::Num(num) => write!(f, "[{:0>2}]", num),
            Bullet::Char(ch) => write!(f, "   {}", ch),
        }
    }
}

/// Print a key-value pair as a plain, numbered, or bulleted list item in a hierarchical list.
fn print_pair<T>(key: &str, value: &T, bullet: Bullet, depth: usize)
where
    T: std::fmt::Display + ?Sized,
{
    let indent = 5 * depth;
    // The format is: "|<INDENT><BULLET> <KEY> <VALUE>"
    println!("|{:indent$}{} {:<pad$} {}", "", bullet, key, value, pad = MIN_PAD);
}

/// Print a list header.
fn print_header(title: &str) {
    println!("| // {} //", title)
}

/// Print a blank list line.
fn print_blank() {
    println!("|")
}

/// Formats a time in microseconds, -1 being unknown.
fn fmt_time(us: i64) -> String {
    if us < 0 {
        return "?".to_string();
    }

    let seconds = us / 1_000_000;
    let hours = seconds / (60 * 60);
    let mins = (seconds % (60 * 60)) / 60;
    let secs = (seconds % 60) as f64 + (us % 1_000_000) as f64 / 1_000_000.0;

    format!("{}:{:0>2}:{:0>6.3}", hours, mins, secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_fmt_time() {
        assert_eq!(fmt_time(0), "0:00:00.000");
        assert_eq!(fmt_time(3_723_500_000), "1:02:03.500");
        assert_eq!(fmt_time(-1), "?");
    }

    #[test]
    fn verify_hex() {
        assert_eq!(hex(&[0x0a, 0xff, 0x10]), "0aff10");
    }
}
