// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use mkvnav_core::errors::{DiagnosticKind, Diagnostics};

use crate::codecs::{self, BitmapInfoHeader, FourCc, WaveFormatEx};
use crate::elements::TrackElement;

/// The kind of content a track carries.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TrackCategory {
    Video,
    Audio,
    Subtitle,
    Unknown,
}

/// How the frames of a track are compressed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Compression {
    None,
    /// The host must inflate every frame.
    Zlib,
    /// The given bytes were stripped from the start of every frame.
    HeaderStrip(Box<[u8]>),
}

#[derive(Clone, Debug)]
pub struct VideoParams {
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub display_width: Option<u32>,
    pub display_height: Option<u32>,
    pub frame_rate: Option<f64>,
    pub interlaced: bool,
}

#[derive(Clone, Debug)]
pub struct AudioParams {
    pub sampling_frequency: f64,
    pub output_sampling_frequency: Option<f64>,
    pub channels: u64,
    pub bit_depth: Option<u64>,
}

/// A track of a segment.
#[derive(Clone, Debug)]
pub struct Track {
    /// The number blocks refer to the track by.
    pub number: u64,
    pub uid: Option<u64>,
    pub category: TrackCategory,
    /// The track carries DVD menu buttons rather than subtitles.
    pub buttons: bool,
    /// The Matroska codec id.
    pub codec_id: String,
    pub codec: FourCc,
    /// Opaque codec initialization data.
    pub codec_private: Option<Box<[u8]>>,
    pub codec_name: Option<String>,
    pub name: Option<String>,
    pub language: String,
    pub enabled: bool,
    pub default: bool,
    pub forced: bool,
    /// Default frame duration in nanoseconds.
    pub default_duration: Option<u64>,
    pub timecode_scale: f64,
    pub compression: Compression,
    pub video: Option<VideoParams>,
    pub audio: Option<AudioParams>,
    pub bitmap_info: Option<BitmapInfoHeader>,
    pub wave_format: Option<WaveFormatEx>,
    /// The last decode timestamp emitted, in microseconds.
    pub(crate) last_dts: Option<i64>,
    /// Silenced by the current cluster.
    pub(crate) silent: bool,
    /// Waiting for a keyframe after a seek.
    pub(crate) search_keyframe: bool,
}

impl Track {
    /// Builds a track. Returns `None` when the track uses an unsupported content encoding.
    pub(crate) fn from_element(el: TrackElement, diag: &mut Diagnostics, pos: u64) -> Option<Track> {
        let compression = match &el.encodings {
            Some(encodings) if encodings.encodings.len() > 1 => {
                diag.report(
                    DiagnosticKind::UnsupportedCompression,
                    pos,
                    "multiple content encodings are not supported",
                );
                return None;
            }
            Some(encodings) => match encodings.encodings.first() {
                Some(encoding) => {
                    if encoding.encrypted {
                        log::warn!("mkv: track {} is encrypted", el.number);
                    }

                    match &encoding.compression {
                        Some(compression) => match compression.algo {
                            0 => Compression::Zlib,
                            3 => Compression::HeaderStrip(
                                compression.settings.clone().unwrap_or_default(),
                            ),
                            _ => {
                                diag.report(
                                    DiagnosticKind::UnsupportedCompression,
                                    pos,
                                    "unsupported compression method",
                                );
                                return None;
                            }
                        },
                        None => Compression::None,
                    }
                }
                None => Compression::None,
            },
            None => Compression::None,
        };

        let buttons = el.track_type == 0x12 || el.codec_id == codecs::CODEC_ID_BUTTONS;

        let category = match el.track_type {
            1 => TrackCategory::Video,
            2 => TrackCategory::Audio,
            0x11 | 0x12 => TrackCategory::Subtitle,
            _ if buttons => TrackCategory::Subtitle,
            _ => TrackCategory::Unknown,
        };

        let info = codecs::identify(&el.codec_id, el.codec_private.as_deref());

        if info.fourcc.is_undefined() {
            diag.report(DiagnosticKind::UnsupportedCodec, pos, "unknown codec id");
        }

        let video = el.video.map(|v| VideoParams {
            pixel_width: v.pixel_width,
            pixel_height: v.pixel_height,
            display_width: v.display_width,
            display_height: v.display_height,
            frame_rate: v.frame_rate,
            interlaced: v.interlaced,
        });

        let audio = el.audio.map(|a| AudioParams {
            sampling_frequency: a.sampling_frequency,
            output_sampling_frequency: a.output_sampling_frequency,
            channels: a.channels,
            bit_depth: a.bit_depth,
        });

        log::debug!(
            "mkv: track {} category={:?} codec={} ({})",
            el.number,
            category,
            el.codec_id,
            info.fourcc
        );

        Some(Track {
            number: el.number,
            uid: el.uid,
            category,
            buttons,
            codec_id: el.codec_id,
            codec: info.fourcc,
            codec_private: info.extra,
            codec_name: el.codec_name,
            name: el.name,
            language: el.language.unwrap_or_else(|| "eng".to_string()),
            enabled: el.enabled,
            default: el.default,
            forced: el.forced,
            default_duration: el.default_duration,
            timecode_scale: el.timestamp_scale,
            compression,
            video,
            audio,
            bitmap_info: info.bitmap,
            wave_format: info.wave,
            last_dts: None,
            silent: false,
            search_keyframe: false,
        })
    }

    /// Tracks in Video for Windows compatibility mode carry decode order timestamps only.
    pub(crate) fn is_vfw(&self) -> bool {
        self.codec_id == codecs::CODEC_ID_VFW
    }
}

#[cfg(test)]
mod tests {
    use mkvnav_core::io::BufReader;

    use super::*;
    use crate::ebml::{Element, ElementHeader};
    use crate::testutil::{bytes, master, string, uint};

    fn track(children: &[Vec<u8>]) -> (Option<Track>, Diagnostics) {
        let data = master(0xAE, children);
        let mut reader = BufReader::new(&data);
        let (header, _) = ElementHeader::read(&mut reader).unwrap();
        let el = TrackElement::read(&mut reader, header).unwrap();

        let mut diag = Diagnostics::new();
        (Track::from_element(el, &mut diag, 0), diag)
    }

    fn encoding(algo: u64, settings: &[u8]) -> Vec<u8> {
        master(
            0x6D80,
            &[master(0x6240, &[master(0x5034, &[uint(0x4254, algo), bytes(0x4255, settings)])])],
        )
    }

    #[test]
    fn verify_track_defaults() {
        let (track, diag) = track(&[uint(0xD7, 1), uint(0x83, 1), string(0x86, "V_MPEG4/ISO/AVC")]);
        let track = track.unwrap();

        assert_eq!(track.category, TrackCategory::Video);
        assert_eq!(track.codec, FourCc(*b"avc1"));
        assert_eq!(track.language, "eng");
        assert!(track.enabled && track.default);
        assert_eq!(track.compression, Compression::None);
        assert!(diag.is_empty());
    }

    #[test]
    fn verify_unknown_codec_keeps_track() {
        let (track, diag) = track(&[uint(0xD7, 2), uint(0x83, 2), string(0x86, "A_NEW")]);
        let track = track.unwrap();

        assert_eq!(track.category, TrackCategory::Audio);
        assert!(track.codec.is_undefined());
        assert!(diag.contains(DiagnosticKind::UnsupportedCodec));
    }

    #[test]
    fn verify_compression() {
        let (zlib, _) = track(&[uint(0xD7, 1), string(0x86, "S_VOBSUB"), encoding(0, &[])]);
        assert_eq!(zlib.unwrap().compression, Compression::Zlib);

        let (strip, _) =
            track(&[uint(0xD7, 1), string(0x86, "A_AC3"), encoding(3, &[0x0B, 0x77])]);
        assert_eq!(strip.unwrap().compression, Compression::HeaderStrip(Box::new([0x0B, 0x77])));

        let (lzo, diag) = track(&[uint(0xD7, 1), string(0x86, "A_AC3"), encoding(2, &[])]);
        assert!(lzo.is_none());
        assert!(diag.contains(DiagnosticKind::UnsupportedCompression));
    }

    #[test]
    fn verify_button_track() {
        let (track, _) = track(&[uint(0xD7, 3), uint(0x83, 0x12), string(0x86, "B_VOBBTN")]);
        let track = track.unwrap();
        assert_eq!(track.category, TrackCategory::Subtitle);
        assert!(track.buttons);
    }
}
