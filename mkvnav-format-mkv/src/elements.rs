// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use mkvnav_core::errors::{limit_error, Error, Result};
use mkvnav_core::io::ReadBytes;

use crate::ebml::{Element, ElementData, ElementHeader};
use crate::element_ids::ElementType;

/// Bound on the nesting of recursive elements (chapter atoms, simple tags).
const MAX_NESTING: usize = 64;

#[allow(dead_code)]
#[derive(Debug)]
pub(crate) struct EbmlHeaderElement {
    pub(crate) version: u64,
    pub(crate) read_version: u64,
    pub(crate) max_id_length: u64,
    pub(crate) max_size_length: u64,
    pub(crate) doc_type: String,
    pub(crate) doc_type_version: u64,
    pub(crate) doc_type_read_version: u64,
}

impl Element for EbmlHeaderElement {
    const ID: ElementType = ElementType::Ebml;

    fn read<B: ReadBytes>(reader: &mut B, header: ElementHeader) -> Result<Self> {
        let mut version = None;
        let mut read_version = None;
        let mut max_id_length = None;
        let mut max_size_length = None;
        let mut doc_type = None;
        let mut doc_type_version = None;
        let mut doc_type_read_version = None;

        let mut it = header.children(reader);
        while let Some(header) = it.read_header()? {
            match header.etype {
                ElementType::EbmlVersion => {
                    version = Some(it.read_u64()?);
                }
                ElementType::EbmlReadVersion => {
                    read_version = Some(it.read_u64()?);
                }
                ElementType::EbmlMaxIdLength => {
                    max_id_length = Some(it.read_u64()?);
                }
                ElementType::EbmlMaxSizeLength => {
                    max_size_length = Some(it.read_u64()?);
                }
                ElementType::DocType => {
                    doc_type = Some(it.read_string()?);
                }
                ElementType::DocTypeVersion => {
                    doc_type_version = Some(it.read_u64()?);
                }
                ElementType::DocTypeReadVersion => {
                    doc_type_read_version = Some(it.read_u64()?);
                }
                other => {
                    log::debug!("ignored element {:?}", other);
                }
            }
        }

        Ok(Self {
            version: version.unwrap_or(1),
            read_version: read_version.unwrap_or(1),
            max_id_length: max_id_length.unwrap_or(4),
            max_size_length: max_size_length.unwrap_or(8),
            doc_type: doc_type.ok_or(Error::Unsupported("mkv: invalid ebml file"))?,
            doc_type_version: doc_type_version.unwrap_or(1),
            doc_type_read_version: doc_type_read_version.unwrap_or(1),
        })
    }
}

#[derive(Debug)]
pub(crate) struct SeekHeadElement {
    pub(crate) seeks: Box<[SeekElement]>,
}

impl Element for SeekHeadElement {
    const ID: ElementType = ElementType::SeekHead;

    fn read<B: ReadBytes>(reader: &mut B, header: ElementHeader) -> Result<Self> {
        let mut seeks = Vec::new();

        let mut it = header.children(reader);
        while let Some(header) = it.read_header()? {
            match header.etype {
                ElementType::Seek => {
                    // A broken entry does not invalidate the others.
                    match it.read_element_data::<SeekElement>() {
                        Ok(seek) => seeks.push(seek),
                        Err(Error::DecodeError(msg)) => {
                            log::warn!("mkv: skipping seek entry: {}", msg);
                            it.ignore_data()?;
                        }
                        Err(err) => return Err(err),
                    }
                }
                other => {
                    log::debug!("ignored element {:?}", other);
                }
            }
        }

        Ok(Self { seeks: seeks.into_boxed_slice() })
    }
}

#[derive(Debug)]
pub(crate) struct SeekElement {
    pub(crate) id: u64,
    pub(crate) position: u64,
}

impl Element for SeekElement {
    const ID: ElementType = ElementType::Seek;

    fn read<B: ReadBytes>(reader: &mut B, header: ElementHeader) -> Result<Self> {
        let mut seek_id = None;
        let mut seek_position = None;

        let mut it = header.children(reader);
        while let Some(header) = it.read_header()? {
            match header.etype {
                ElementType::SeekId => {
                    seek_id = Some(it.read_u64()?);
                }
                ElementType::SeekPosition => {
                    seek_position = Some(it.read_u64()?);
                }
                other => {
                    log::debug!("ignored element {:?}", other);
                }
            }
        }

        Ok(Self {
            id: seek_id.ok_or(Error::DecodeError("mkv: missing seek id"))?,
            position: seek_position.ok_or(Error::DecodeError("mkv: missing seek position"))?,
        })
    }
}

#[derive(Debug, Default)]
pub(crate) struct ChapterTranslateElement {
    pub(crate) edition_uids: Vec<u64>,
    pub(crate) codec: u64,
    pub(crate) id: Option<Box<[u8]>>,
}

impl Element for ChapterTranslateElement {
    const ID: ElementType = ElementType::ChapterTranslate;

    fn read<B: ReadBytes>(reader: &mut B, header: ElementHeader) -> Result<Self> {
        let mut translate = ChapterTranslateElement::default();

        let mut it = header.children(reader);
        while let Some(header) = it.read_header()? {
            match header.etype {
                ElementType::ChapterTranslateEditionUid => {
                    translate.edition_uids.push(it.read_u64()?);
                }
                ElementType::ChapterTranslateCodec => {
                    translate.codec = it.read_u64()?;
                }
                ElementType::ChapterTranslateId => {
                    translate.id = Some(it.read_boxed_slice()?);
                }
                other => {
                    log::debug!("ignored element {:?}", other);
                }
            }
        }

        Ok(translate)
    }
}

#[derive(Debug)]
pub(crate) struct InfoElement {
    pub(crate) timestamp_scale: u64,
    pub(crate) duration: Option<f64>,
    pub(crate) date_utc: Option<i64>,
    pub(crate) title: Option<String>,
    pub(crate) muxing_app: Option<String>,
    pub(crate) writing_app: Option<String>,
    pub(crate) filename: Option<String>,
    pub(crate) prev_filename: Option<String>,
    pub(crate) next_filename: Option<String>,
    pub(crate) uid: Option<Box<[u8]>>,
    pub(crate) prev_uid: Option<Box<[u8]>>,
    pub(crate) next_uid: Option<Box<[u8]>>,
    pub(crate) families: Vec<Box<[u8]>>,
    pub(crate) translates: Vec<ChapterTranslateElement>,
}

impl Element for InfoElement {
    const ID: ElementType = ElementType::Info;

    fn read<B: ReadBytes>(reader: &mut B, header: ElementHeader) -> Result<Self> {
        let mut timestamp_scale = None;
        let mut duration = None;
        let mut date_utc = None;
        let mut title = None;
        let mut muxing_app = None;
        let mut writing_app = None;
        let mut filename = None;
        let mut prev_filename = None;
        let mut next_filename = None;
        let mut uid = None;
        let mut prev_uid = None;
        let mut next_uid = None;
        let mut families = Vec::new();
        let mut translates = Vec::new();

        let mut it = header.children(reader);
        while let Some(header) = it.read_header()? {
            match header.etype {
                ElementType::TimestampScale => {
                    timestamp_scale = Some(it.read_u64()?);
                }
                ElementType::Duration => {
                    duration = Some(it.read_f64()?);
                }
                ElementType::DateUtc => {
                    date_utc = Some(it.read_i64()?);
                }
                ElementType::Title => {
                    title = Some(it.read_string()?);
                }
                ElementType::MuxingApp => {
                    muxing_app = Some(it.read_string()?);
                }
                ElementType::WritingApp => {
                    writing_app = Some(it.read_string()?);
                }
                ElementType::SegmentFilename => {
                    filename = Some(it.read_string()?);
                }
                ElementType::PrevFilename => {
                    prev_filename = Some(it.read_string()?);
                }
                ElementType::NextFilename => {
                    next_filename = Some(it.read_string()?);
                }
                // The first occurence of a UID wins.
                ElementType::SegmentUid if uid.is_none() => {
                    uid = Some(it.read_boxed_slice()?);
                }
                ElementType::PrevUid if prev_uid.is_none() => {
                    prev_uid = Some(it.read_boxed_slice()?);
                }
                ElementType::NextUid if next_uid.is_none() => {
                    next_uid = Some(it.read_boxed_slice()?);
                }
                ElementType::SegmentFamily => {
                    families.push(it.read_boxed_slice()?);
                }
                ElementType::ChapterTranslate => {
                    translates.push(it.read_element_data()?);
                }
                other => {
                    log::debug!("ignored element {:?}", other);
                }
            }
        }

        Ok(Self {
            timestamp_scale: match timestamp_scale {
                Some(0) | None => 1_000_000,
                Some(scale) => scale,
            },
            duration,
            date_utc,
            title,
            muxing_app,
            writing_app,
            filename,
            prev_filename,
            next_filename,
            uid,
            prev_uid,
            next_uid,
            families,
            translates,
        })
    }
}

#[derive(Debug)]
pub(crate) struct TracksElement {
    pub(crate) tracks: Box<[TrackElement]>,
}

impl Element for TracksElement {
    const ID: ElementType = ElementType::Tracks;

    fn read<B: ReadBytes>(reader: &mut B, header: ElementHeader) -> Result<Self> {
        let mut it = header.children(reader);
        Ok(Self { tracks: it.read_elements()? })
    }
}

#[derive(Debug)]
pub(crate) struct TrackElement {
    pub(crate) number: u64,
    pub(crate) uid: Option<u64>,
    pub(crate) track_type: u64,
    pub(crate) enabled: bool,
    pub(crate) default: bool,
    pub(crate) forced: bool,
    pub(crate) lacing: bool,
    pub(crate) min_cache: u64,
    pub(crate) max_cache: Option<u64>,
    pub(crate) default_duration: Option<u64>,
    pub(crate) timestamp_scale: f64,
    pub(crate) name: Option<String>,
    pub(crate) language: Option<String>,
    pub(crate) codec_id: String,
    pub(crate) codec_private: Option<Box<[u8]>>,
    pub(crate) codec_name: Option<String>,
    pub(crate) codec_delay: Option<u64>,
    pub(crate) seek_pre_roll: Option<u64>,
    pub(crate) audio: Option<AudioElement>,
    pub(crate) video: Option<VideoElement>,
    pub(crate) encodings: Option<ContentEncodingsElement>,
}

impl Element for TrackElement {
    const ID: ElementType = ElementType::TrackEntry;

    fn read<B: ReadBytes>(reader: &mut B, header: ElementHeader) -> Result<Self> {
        let mut number = None;
        let mut uid = None;
        let mut track_type = None;
        let mut enabled = true;
        let mut default = true;
        let mut forced = false;
        let mut lacing = true;
        let mut min_cache = 0;
        let mut max_cache = None;
        let mut default_duration = None;
        let mut timestamp_scale = None;
        let mut name = None;
        let mut language = None;
        let mut codec_id = None;
        let mut codec_private = None;
        let mut codec_name = None;
        let mut codec_delay = None;
        let mut seek_pre_roll = None;
        let mut audio = None;
        let mut video = None;
        let mut encodings = None;

        let mut it = header.children(reader);
        while let Some(header) = it.read_header()? {
            match header.etype {
                ElementType::TrackNumber => {
                    number = Some(it.read_u64()?);
                }
                ElementType::TrackUid => {
                    uid = Some(it.read_u64()?);
                }
                ElementType::TrackType => {
                    track_type = Some(it.read_u64()?);
                }
                ElementType::FlagEnabled => {
                    enabled = it.read_flag()?;
                }
                ElementType::FlagDefault => {
                    default = it.read_flag()?;
                }
                ElementType::FlagForced => {
                    forced = it.read_flag()?;
                }
                ElementType::FlagLacing => {
                    lacing = it.read_flag()?;
                }
                ElementType::MinCache => {
                    min_cache = it.read_u64()?;
                }
                ElementType::MaxCache => {
                    max_cache = Some(it.read_u64()?);
                }
                ElementType::DefaultDuration => {
                    default_duration = Some(it.read_u64()?);
                }
                ElementType::TrackTimestampScale => {
                    timestamp_scale = Some(it.read_f64()?);
                }
                ElementType::Name => {
                    name = Some(it.read_string()?);
                }
                ElementType::Language => {
                    language = Some(it.read_string()?);
                }
                ElementType::CodecId => {
                    codec_id = Some(it.read_string()?);
                }
                ElementType::CodecPrivate => {
                    codec_private = Some(it.read_boxed_slice()?);
                }
                ElementType::CodecName => {
                    codec_name = Some(it.read_string()?);
                }
                ElementType::CodecDelay => {
                    codec_delay = Some(it.read_u64()?);
                }
                ElementType::SeekPreRoll => {
                    seek_pre_roll = Some(it.read_u64()?);
                }
                ElementType::Audio => {
                    audio = Some(it.read_element_data()?);
                }
                ElementType::Video => {
                    video = Some(it.read_element_data()?);
                }
                ElementType::ContentEncodings => {
                    encodings = Some(it.read_element_data()?);
                }
                other => {
                    log::debug!("ignored element {:?}", other);
                }
            }
        }

        Ok(Self {
            number: number.ok_or(Error::DecodeError("mkv: missing track number"))?,
            uid,
            track_type: track_type.unwrap_or(0),
            enabled,
            default,
            forced,
            lacing,
            min_cache,
            max_cache,
            default_duration,
            timestamp_scale: timestamp_scale.unwrap_or(1.0),
            name,
            language,
            codec_id: codec_id.unwrap_or_default(),
            codec_private,
            codec_name,
            codec_delay,
            seek_pre_roll,
            audio,
            video,
            encodings,
        })
    }
}

#[derive(Debug)]
pub(crate) struct AudioElement {
    pub(crate) sampling_frequency: f64,
    pub(crate) output_sampling_frequency: Option<f64>,
    pub(crate) channels: u64,
    pub(crate) bit_depth: Option<u64>,
}

impl Element for AudioElement {
    const ID: ElementType = ElementType::Audio;

    fn read<B: ReadBytes>(reader: &mut B, header: ElementHeader) -> Result<Self> {
        let mut sampling_frequency = None;
        let mut output_sampling_frequency = None;
        let mut channels = None;
        let mut bit_depth = None;

        let mut it = header.children(reader);
        while let Some(header) = it.read_header()? {
            match header.etype {
                ElementType::SamplingFrequency => {
                    sampling_frequency = Some(it.read_f64()?);
                }
                ElementType::OutputSamplingFrequency => {
                    output_sampling_frequency = Some(it.read_f64()?);
                }
                ElementType::Channels => {
                    channels = Some(it.read_u64()?);
                }
                ElementType::BitDepth => {
                    bit_depth = Some(it.read_u64()?);
                }
                other => {
                    log::debug!("ignored element {:?}", other);
                }
            }
        }

        Ok(Self {
            sampling_frequency: sampling_frequency.unwrap_or(8000.0),
            output_sampling_frequency,
            channels: channels.unwrap_or(1),
            bit_depth,
        })
    }
}

#[derive(Debug)]
pub(crate) struct VideoElement {
    pub(crate) pixel_width: u32,
    pub(crate) pixel_height: u32,
    pub(crate) display_width: Option<u32>,
    pub(crate) display_height: Option<u32>,
    pub(crate) display_unit: u64,
    pub(crate) interlaced: bool,
    pub(crate) frame_rate: Option<f64>,
}

impl Element for VideoElement {
    const ID: ElementType = ElementType::Video;

    fn read<B: ReadBytes>(reader: &mut B, header: ElementHeader) -> Result<Self> {
        let mut pixel_width = None;
        let mut pixel_height = None;
        let mut display_width = None;
        let mut display_height = None;
        let mut display_unit = 0;
        let mut interlaced = false;
        let mut frame_rate = None;

        let mut it = header.children(reader);
        while let Some(header) = it.read_header()? {
            match header.etype {
                ElementType::PixelWidth => {
                    pixel_width = Some(it.read_u64()? as u32);
                }
                ElementType::PixelHeight => {
                    pixel_height = Some(it.read_u64()? as u32);
                }
                ElementType::DisplayWidth => {
                    display_width = Some(it.read_u64()? as u32);
                }
                ElementType::DisplayHeight => {
                    display_height = Some(it.read_u64()? as u32);
                }
                ElementType::DisplayUnit => {
                    display_unit = it.read_u64()?;
                }
                ElementType::FlagInterlaced => {
                    interlaced = it.read_flag()?;
                }
                ElementType::FrameRate => {
                    frame_rate = Some(it.read_f64()?);
                }
                other => {
                    log::debug!("ignored element {:?}", other);
                }
            }
        }

        Ok(Self {
            pixel_width: pixel_width.unwrap_or(0),
            pixel_height: pixel_height.unwrap_or(0),
            display_width,
            display_height,
            display_unit,
            interlaced,
            frame_rate,
        })
    }
}

#[derive(Debug)]
pub(crate) struct ContentEncodingsElement {
    pub(crate) encodings: Box<[ContentEncodingElement]>,
}

impl Element for ContentEncodingsElement {
    const ID: ElementType = ElementType::ContentEncodings;

    fn read<B: ReadBytes>(reader: &mut B, header: ElementHeader) -> Result<Self> {
        let mut it = header.children(reader);
        Ok(Self { encodings: it.read_elements()? })
    }
}

#[derive(Debug)]
pub(crate) struct ContentEncodingElement {
    pub(crate) order: u64,
    pub(crate) scope: u64,
    pub(crate) encoding_type: u64,
    pub(crate) compression: Option<ContentCompressionElement>,
    pub(crate) encrypted: bool,
}

impl Element for ContentEncodingElement {
    const ID: ElementType = ElementType::ContentEncoding;

    fn read<B: ReadBytes>(reader: &mut B, header: ElementHeader) -> Result<Self> {
        let mut order = 0;
        let mut scope = 1;
        let mut encoding_type = 0;
        let mut compression = None;
        let mut encrypted = false;

        let mut it = header.children(reader);
        while let Some(header) = it.read_header()? {
            match header.etype {
                ElementType::ContentEncodingOrder => {
                    order = it.read_u64()?;
                }
                ElementType::ContentEncodingScope => {
                    scope = it.read_u64()?;
                }
                ElementType::ContentEncodingType => {
                    encoding_type = it.read_u64()?;
                }
                ElementType::ContentCompression => {
                    compression = Some(it.read_element_data()?);
                }
                ElementType::ContentEncryption => {
                    encrypted = true;
                }
                other => {
                    log::debug!("ignored element {:?}", other);
                }
            }
        }

        Ok(Self { order, scope, encoding_type, compression, encrypted })
    }
}

#[derive(Debug)]
pub(crate) struct ContentCompressionElement {
    pub(crate) algo: u64,
    pub(crate) settings: Option<Box<[u8]>>,
}

impl Element for ContentCompressionElement {
    const ID: ElementType = ElementType::ContentCompression;

    fn read<B: ReadBytes>(reader: &mut B, header: ElementHeader) -> Result<Self> {
        let mut algo = 0;
        let mut settings = None;

        let mut it = header.children(reader);
        while let Some(header) = it.read_header()? {
            match header.etype {
                ElementType::ContentCompAlgo => {
                    algo = it.read_u64()?;
                }
                ElementType::ContentCompSettings => {
                    settings = Some(it.read_boxed_slice()?);
                }
                other => {
                    log::debug!("ignored element {:?}", other);
                }
            }
        }

        Ok(Self { algo, settings })
    }
}

#[derive(Debug)]
pub(crate) struct CuesElement {
    pub(crate) points: Box<[CuePointElement]>,
}

impl Element for CuesElement {
    const ID: ElementType = ElementType::Cues;

    fn read<B: ReadBytes>(reader: &mut B, header: ElementHeader) -> Result<Self> {
        let mut it = header.children(reader);
        Ok(Self { points: it.read_elements()? })
    }
}

#[derive(Debug)]
pub(crate) struct CuePointElement {
    pub(crate) time: u64,
    pub(crate) positions: Option<CueTrackPositionsElement>,
}

impl Element for CuePointElement {
    const ID: ElementType = ElementType::CuePoint;

    fn read<B: ReadBytes>(reader: &mut B, header: ElementHeader) -> Result<Self> {
        let mut it = header.children(reader);

        let mut time = None;
        let mut positions = None;
        while let Some(header) = it.read_header()? {
            match header.etype {
                ElementType::CueTime => time = Some(it.read_u64()?),
                // When a point lists several tracks, the last one describes the entry.
                ElementType::CueTrackPositions => {
                    positions = Some(it.read_element_data()?);
                }
                other => {
                    log::debug!("ignored element {:?}", other);
                }
            }
        }

        Ok(Self { time: time.unwrap_or(0), positions })
    }
}

#[derive(Debug)]
pub(crate) struct CueTrackPositionsElement {
    pub(crate) track: Option<u64>,
    pub(crate) cluster_position: Option<u64>,
    pub(crate) block_number: Option<u64>,
}

impl Element for CueTrackPositionsElement {
    const ID: ElementType = ElementType::CueTrackPositions;

    fn read<B: ReadBytes>(reader: &mut B, header: ElementHeader) -> Result<Self> {
        let mut it = header.children(reader);

        let mut track = None;
        let mut cluster_position = None;
        let mut block_number = None;
        while let Some(header) = it.read_header()? {
            match header.etype {
                ElementType::CueTrack => {
                    track = Some(it.read_u64()?);
                }
                ElementType::CueClusterPosition => {
                    cluster_position = Some(it.read_u64()?);
                }
                ElementType::CueBlockNumber => {
                    block_number = Some(it.read_u64()?);
                }
                other => {
                    log::debug!("ignored element {:?}", other);
                }
            }
        }

        Ok(Self { track, cluster_position, block_number })
    }
}

#[derive(Debug)]
pub(crate) struct AttachmentsElement {
    pub(crate) files: Box<[AttachedFileElement]>,
}

impl Element for AttachmentsElement {
    const ID: ElementType = ElementType::Attachments;

    fn read<B: ReadBytes>(reader: &mut B, header: ElementHeader) -> Result<Self> {
        let mut it = header.children(reader);
        Ok(Self { files: it.read_elements()? })
    }
}

#[derive(Debug)]
pub(crate) struct AttachedFileElement {
    pub(crate) uid: Option<u64>,
    pub(crate) name: String,
    pub(crate) mime_type: String,
    pub(crate) description: Option<String>,
    pub(crate) data: Box<[u8]>,
}

impl Element for AttachedFileElement {
    const ID: ElementType = ElementType::AttachedFile;

    fn read<B: ReadBytes>(reader: &mut B, header: ElementHeader) -> Result<Self> {
        let mut uid = None;
        let mut name = None;
        let mut mime_type = None;
        let mut description = None;
        let mut data = None;

        let mut it = header.children(reader);
        while let Some(header) = it.read_header()? {
            match header.etype {
                ElementType::FileUid => {
                    uid = Some(it.read_u64()?);
                }
                ElementType::FileName => {
                    name = Some(it.read_string()?);
                }
                ElementType::FileMimeType => {
                    mime_type = Some(it.read_string()?);
                }
                ElementType::FileDescription => {
                    description = Some(it.read_string()?);
                }
                ElementType::FileData => {
                    data = Some(it.read_boxed_slice()?);
                }
                other => {
                    log::debug!("ignored element {:?}", other);
                }
            }
        }

        Ok(Self {
            uid,
            name: name.unwrap_or_default(),
            mime_type: mime_type.unwrap_or_default(),
            description,
            data: data.unwrap_or_default(),
        })
    }
}

#[derive(Debug)]
pub(crate) struct ChaptersElement {
    pub(crate) editions: Box<[EditionEntryElement]>,
}

impl Element for ChaptersElement {
    const ID: ElementType = ElementType::Chapters;

    fn read<B: ReadBytes>(reader: &mut B, header: ElementHeader) -> Result<Self> {
        let mut it = header.children(reader);
        Ok(Self { editions: it.read_elements()? })
    }
}

#[derive(Debug)]
pub(crate) struct EditionEntryElement {
    pub(crate) uid: Option<u64>,
    pub(crate) hidden: bool,
    pub(crate) default: bool,
    pub(crate) ordered: bool,
    pub(crate) atoms: Vec<ChapterAtomElement>,
}

impl Element for EditionEntryElement {
    const ID: ElementType = ElementType::EditionEntry;

    fn read<B: ReadBytes>(reader: &mut B, header: ElementHeader) -> Result<Self> {
        let mut uid = None;
        let mut hidden = false;
        let mut default = false;
        let mut ordered = false;
        let mut atoms = Vec::new();

        let mut it = header.children(reader);
        while let Some(header) = it.read_header()? {
            match header.etype {
                ElementType::EditionUid => {
                    uid = Some(it.read_u64()?);
                }
                ElementType::EditionFlagHidden => {
                    hidden = it.read_flag()?;
                }
                ElementType::EditionFlagDefault => {
                    default = it.read_flag()?;
                }
                ElementType::EditionFlagOrdered => {
                    ordered = it.read_flag()?;
                }
                ElementType::ChapterAtom => {
                    atoms.push(it.read_element_with(|r, h| read_chapter_atom(&mut **r, h, 0))?);
                }
                other => {
                    log::debug!("ignored element {:?}", other);
                }
            }
        }

        Ok(Self { uid, hidden, default, ordered, atoms })
    }
}

#[derive(Debug, Default)]
pub(crate) struct ChapterAtomElement {
    pub(crate) uid: Option<u64>,
    pub(crate) string_uid: Option<String>,
    pub(crate) time_start: u64,
    pub(crate) time_end: Option<u64>,
    pub(crate) hidden: bool,
    pub(crate) enabled: bool,
    pub(crate) segment_uid: Option<Box<[u8]>>,
    pub(crate) segment_edition_uid: Option<u64>,
    pub(crate) displays: Vec<ChapterDisplayElement>,
    pub(crate) processes: Vec<ChapProcessElement>,
    pub(crate) atoms: Vec<ChapterAtomElement>,
}

/// Reads a chapter atom and its nested atoms.
fn read_chapter_atom<B: ReadBytes>(
    reader: &mut B,
    header: ElementHeader,
    depth: usize,
) -> Result<ChapterAtomElement> {
    if depth >= MAX_NESTING {
        return limit_error("mkv: chapter atoms nested too deep");
    }

    let mut atom = ChapterAtomElement { enabled: true, ..Default::default() };

    let mut it = header.children(reader);
    while let Some(header) = it.read_header()? {
        match header.etype {
            ElementType::ChapterUid => {
                atom.uid = Some(it.read_u64()?);
            }
            ElementType::ChapterStringUid => {
                atom.string_uid = Some(it.read_string()?);
            }
            ElementType::ChapterTimeStart => {
                atom.time_start = it.read_u64()?;
            }
            ElementType::ChapterTimeEnd => {
                atom.time_end = Some(it.read_u64()?);
            }
            ElementType::ChapterFlagHidden => {
                atom.hidden = it.read_flag()?;
            }
            ElementType::ChapterFlagEnabled => {
                atom.enabled = it.read_flag()?;
            }
            ElementType::ChapterSegmentUid => {
                atom.segment_uid = Some(it.read_boxed_slice()?);
            }
            ElementType::ChapterSegmentEditionUid => {
                atom.segment_edition_uid = Some(it.read_u64()?);
            }
            ElementType::ChapterDisplay => {
                atom.displays.push(it.read_element_data()?);
            }
            ElementType::ChapProcess => {
                atom.processes.push(it.read_element_data()?);
            }
            ElementType::ChapterAtom => {
                let child = it.read_element_with(|r, h| read_chapter_atom(&mut **r, h, depth + 1))?;
                atom.atoms.push(child);
            }
            other => {
                log::debug!("ignored element {:?}", other);
            }
        }
    }

    Ok(atom)
}

impl Element for ChapterAtomElement {
    const ID: ElementType = ElementType::ChapterAtom;

    fn read<B: ReadBytes>(reader: &mut B, header: ElementHeader) -> Result<Self> {
        read_chapter_atom(reader, header, 0)
    }
}

#[derive(Debug, Default)]
pub(crate) struct ChapterDisplayElement {
    pub(crate) string: String,
    pub(crate) languages: Vec<String>,
    pub(crate) countries: Vec<String>,
}

impl Element for ChapterDisplayElement {
    const ID: ElementType = ElementType::ChapterDisplay;

    fn read<B: ReadBytes>(reader: &mut B, header: ElementHeader) -> Result<Self> {
        let mut display = ChapterDisplayElement::default();

        let mut it = header.children(reader);
        while let Some(header) = it.read_header()? {
            match header.etype {
                // Several strings in one display are concatenated.
                ElementType::ChapString => {
                    display.string.push_str(&it.read_string()?);
                }
                ElementType::ChapLanguage => {
                    display.languages.push(it.read_string()?);
                }
                ElementType::ChapCountry => {
                    display.countries.push(it.read_string()?);
                }
                other => {
                    log::debug!("ignored element {:?}", other);
                }
            }
        }

        Ok(display)
    }
}

#[derive(Debug, Default)]
pub(crate) struct ChapProcessElement {
    pub(crate) codec_id: u64,
    pub(crate) private: Option<Box<[u8]>>,
    pub(crate) commands: Vec<ChapProcessCommandElement>,
}

impl Element for ChapProcessElement {
    const ID: ElementType = ElementType::ChapProcess;

    fn read<B: ReadBytes>(reader: &mut B, header: ElementHeader) -> Result<Self> {
        let mut process = ChapProcessElement::default();

        let mut it = header.children(reader);
        while let Some(header) = it.read_header()? {
            match header.etype {
                ElementType::ChapProcessCodecId => {
                    process.codec_id = it.read_u64()?;
                }
                ElementType::ChapProcessPrivate => {
                    process.private = Some(it.read_boxed_slice()?);
                }
                ElementType::ChapProcessCommand => {
                    process.commands.push(it.read_element_data()?);
                }
                other => {
                    log::debug!("ignored element {:?}", other);
                }
            }
        }

        Ok(process)
    }
}

#[derive(Debug, Default)]
pub(crate) struct ChapProcessCommandElement {
    /// 0 during, 1 on enter, 2 on leave.
    pub(crate) time: Option<u64>,
    pub(crate) data: Vec<Box<[u8]>>,
}

impl Element for ChapProcessCommandElement {
    const ID: ElementType = ElementType::ChapProcessCommand;

    fn read<B: ReadBytes>(reader: &mut B, header: ElementHeader) -> Result<Self> {
        let mut command = ChapProcessCommandElement::default();

        let mut it = header.children(reader);
        while let Some(header) = it.read_header()? {
            match header.etype {
                ElementType::ChapProcessTime if command.time.is_none() => {
                    command.time = Some(it.read_u64()?);
                }
                ElementType::ChapProcessData => {
                    command.data.push(it.read_boxed_slice()?);
                }
                other => {
                    log::debug!("ignored element {:?}", other);
                }
            }
        }

        Ok(command)
    }
}

#[derive(Debug)]
pub(crate) struct TagsElement {
    pub(crate) tags: Box<[TagElement]>,
}

impl Element for TagsElement {
    const ID: ElementType = ElementType::Tags;

    fn read<B: ReadBytes>(reader: &mut B, header: ElementHeader) -> Result<Self> {
        let mut it = header.children(reader);
        Ok(Self { tags: it.read_elements()? })
    }
}

#[derive(Debug)]
pub(crate) struct TagElement {
    pub(crate) targets: Option<TargetsElement>,
    pub(crate) simple_tags: Vec<SimpleTagElement>,
}

impl Element for TagElement {
    const ID: ElementType = ElementType::Tag;

    fn read<B: ReadBytes>(reader: &mut B, header: ElementHeader) -> Result<Self> {
        let mut targets = None;
        let mut simple_tags = Vec::new();

        let mut it = header.children(reader);
        while let Some(header) = it.read_header()? {
            match header.etype {
                ElementType::Targets => {
                    targets = Some(it.read_element_data()?);
                }
                ElementType::SimpleTag => {
                    let simple_tag = it.read_element_with(|r, h| read_simple_tag(&mut **r, h, 0))?;
                    simple_tags.push(simple_tag);
                }
                other => {
                    log::debug!("ignored element {:?}", other);
                }
            }
        }

        Ok(Self { targets, simple_tags })
    }
}

#[derive(Debug, Default)]
pub(crate) struct TargetsElement {
    pub(crate) type_value: Option<u64>,
    pub(crate) target_type: Option<String>,
    pub(crate) track_uids: Vec<u64>,
    pub(crate) edition_uids: Vec<u64>,
    pub(crate) chapter_uids: Vec<u64>,
    pub(crate) attachment_uids: Vec<u64>,
}

impl Element for TargetsElement {
    const ID: ElementType = ElementType::Targets;

    fn read<B: ReadBytes>(reader: &mut B, header: ElementHeader) -> Result<Self> {
        let mut targets = TargetsElement::default();

        let mut it = header.children(reader);
        while let Some(header) = it.read_header()? {
            match header.etype {
                ElementType::TargetTypeValue => {
                    targets.type_value = Some(it.read_u64()?);
                }
                ElementType::TargetType => {
                    targets.target_type = Some(it.read_string()?);
                }
                ElementType::TagTrackUid => {
                    targets.track_uids.push(it.read_u64()?);
                }
                ElementType::TagEditionUid => {
                    targets.edition_uids.push(it.read_u64()?);
                }
                ElementType::TagChapterUid => {
                    targets.chapter_uids.push(it.read_u64()?);
                }
                ElementType::TagAttachmentUid => {
                    targets.attachment_uids.push(it.read_u64()?);
                }
                other => {
                    log::debug!("ignored element {:?}", other);
                }
            }
        }

        Ok(targets)
    }
}

#[derive(Debug)]
pub(crate) struct SimpleTagElement {
    pub(crate) name: String,
    pub(crate) language: String,
    pub(crate) default: bool,
    pub(crate) value: Option<ElementData>,
    pub(crate) children: Vec<SimpleTagElement>,
}

/// Reads a simple tag and its nested simple tags.
fn read_simple_tag<B: ReadBytes>(
    reader: &mut B,
    header: ElementHeader,
    depth: usize,
) -> Result<SimpleTagElement> {
    if depth >= MAX_NESTING {
        return limit_error("mkv: simple tags nested too deep");
    }

    let mut name = None;
    let mut language = None;
    let mut default = true;
    let mut value = None;
    let mut children = Vec::new();

    let mut it = header.children(reader);
    while let Some(header) = it.read_header()? {
        match header.etype {
            ElementType::TagName => {
                name = Some(it.read_string()?);
            }
            ElementType::TagLanguage => {
                language = Some(it.read_string()?);
            }
            ElementType::TagDefault => {
                default = it.read_flag()?;
            }
            ElementType::TagString | ElementType::TagBinary => {
                value = Some(it.read_data()?);
            }
            ElementType::SimpleTag => {
                let child = it.read_element_with(|r, h| read_simple_tag(&mut **r, h, depth + 1))?;
                children.push(child);
            }
            other => {
                log::debug!("ignored element {:?}", other);
            }
        }
    }

    Ok(SimpleTagElement {
        name: name.unwrap_or_default(),
        language: language.unwrap_or_else(|| "und".to_string()),
        default,
        value,
        children,
    })
}

impl Element for SimpleTagElement {
    const ID: ElementType = ElementType::SimpleTag;

    fn read<B: ReadBytes>(reader: &mut B, header: ElementHeader) -> Result<Self> {
        read_simple_tag(reader, header, 0)
    }
}

#[cfg(test)]
mod tests {
    use mkvnav_core::io::BufReader;

    use super::*;
    use crate::testutil::{bytes, float, master, string, uint};

    fn read_element<E: Element>(data: &[u8]) -> Result<E> {
        let mut reader = BufReader::new(data);
        let (header, _) = ElementHeader::read(&mut reader)?;
        E::read(&mut reader, header)
    }

    #[test]
    fn verify_info_defaults_and_first_uid_wins() {
        let info = master(
            0x1549A966,
            &[
                bytes(0x73A4, &[1; 16]),
                bytes(0x73A4, &[2; 16]),
                bytes(0x4444, &[7; 16]),
                bytes(0x4444, &[8; 16]),
                float(0x4489, 2500.0),
                string(0x7BA9, "A title"),
            ],
        );

        let info: InfoElement = read_element(&info).unwrap();
        assert_eq!(info.timestamp_scale, 1_000_000);
        assert_eq!(info.uid.as_deref(), Some(&[1u8; 16][..]));
        assert_eq!(info.families.len(), 2);
        assert_eq!(info.duration, Some(2500.0));
        assert_eq!(info.title.as_deref(), Some("A title"));
    }

    #[test]
    fn verify_track_defaults() {
        let track = master(0xAE, &[uint(0xD7, 3), uint(0x83, 2), string(0x86, "A_VORBIS")]);

        let track: TrackElement = read_element(&track).unwrap();
        assert_eq!(track.number, 3);
        assert_eq!(track.track_type, 2);
        assert!(track.enabled);
        assert!(track.default);
        assert_eq!(track.timestamp_scale, 1.0);
        assert!(track.language.is_none());
        assert!(track.encodings.is_none());
    }

    #[test]
    fn verify_cue_point_last_positions_win() {
        let point = master(
            0xBB,
            &[
                uint(0xB3, 40),
                master(0xB7, &[uint(0xF7, 1), uint(0xF1, 100)]),
                master(0xB7, &[uint(0xF7, 2), uint(0xF1, 200), uint(0x5378, 3)]),
            ],
        );

        let point: CuePointElement = read_element(&point).unwrap();
        assert_eq!(point.time, 40);
        let positions = point.positions.unwrap();
        assert_eq!(positions.track, Some(2));
        assert_eq!(positions.cluster_position, Some(200));
        assert_eq!(positions.block_number, Some(3));
    }

    #[test]
    fn verify_nested_chapter_atoms() {
        let edition = master(
            0x45B9,
            &[
                uint(0x45DD, 1),
                master(
                    0xB6,
                    &[
                        uint(0x73C4, 10),
                        uint(0x91, 0),
                        master(0x80, &[string(0x85, "Intro"), string(0x437C, "eng")]),
                        master(0xB6, &[uint(0x73C4, 11), uint(0x91, 5), uint(0x98, 1)]),
                    ],
                ),
            ],
        );

        let edition: EditionEntryElement = read_element(&edition).unwrap();
        assert!(edition.ordered);
        assert_eq!(edition.atoms.len(), 1);

        let atom = &edition.atoms[0];
        assert_eq!(atom.uid, Some(10));
        assert!(atom.enabled);
        assert_eq!(atom.displays[0].string, "Intro");
        assert_eq!(atom.atoms.len(), 1);
        assert_eq!(atom.atoms[0].uid, Some(11));
        assert!(atom.atoms[0].hidden);
    }

    #[test]
    fn verify_chapter_nesting_is_bounded() {
        let mut atom = master(0xB6, &[uint(0x73C4, 1)]);
        for _ in 0..MAX_NESTING + 1 {
            atom = master(0xB6, &[atom]);
        }

        let res: Result<ChapterAtomElement> = read_element(&atom);
        assert!(matches!(res, Err(Error::LimitError(_))));
    }

    #[test]
    fn verify_chap_process_commands() {
        let process = master(
            0x6944,
            &[
                uint(0x6955, 1),
                bytes(0x450D, &[0x30, 0x80, 0x00, 0x01]),
                master(0x6911, &[uint(0x6922, 1), bytes(0x6933, &[9; 9])]),
            ],
        );

        let process: ChapProcessElement = read_element(&process).unwrap();
        assert_eq!(process.codec_id, 1);
        assert_eq!(process.private.as_deref(), Some(&[0x30, 0x80, 0x00, 0x01][..]));
        assert_eq!(process.commands[0].time, Some(1));
        assert_eq!(process.commands[0].data[0].len(), 9);
    }

    #[test]
    fn verify_simple_tags() {
        let tag = master(
            0x7373,
            &[
                master(0x63C0, &[uint(0x68CA, 30), uint(0x63C5, 77)]),
                master(
                    0x67C8,
                    &[
                        string(0x45A3, "ARTIST"),
                        string(0x4487, "Someone"),
                        master(0x67C8, &[string(0x45A3, "SORT_WITH"), string(0x4487, "One")]),
                    ],
                ),
            ],
        );

        let tag: TagElement = read_element(&tag).unwrap();
        let targets = tag.targets.unwrap();
        assert_eq!(targets.type_value, Some(30));
        assert_eq!(targets.track_uids, vec![77]);

        let simple = &tag.simple_tags[0];
        assert_eq!(simple.name, "ARTIST");
        assert_eq!(simple.language, "und");
        assert!(matches!(&simple.value, Some(ElementData::String(s)) if s == "Someone"));
        assert_eq!(simple.children[0].name, "SORT_WITH");
    }
}
