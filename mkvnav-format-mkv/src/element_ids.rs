// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;

use once_cell::sync::Lazy;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Type {
    Master,
    Unsigned,
    Signed,
    Binary,
    String,
    Float,
    Date,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ElementType {
    Ebml,
    EbmlVersion,
    EbmlReadVersion,
    EbmlMaxIdLength,
    EbmlMaxSizeLength,
    DocType,
    DocTypeVersion,
    DocTypeReadVersion,
    Crc32,
    Void,
    Segment,
    SeekHead,
    Seek,
    SeekId,
    SeekPosition,
    Info,
    SegmentUid,
    SegmentFilename,
    PrevUid,
    PrevFilename,
    NextUid,
    NextFilename,
    SegmentFamily,
    ChapterTranslate,
    ChapterTranslateEditionUid,
    ChapterTranslateCodec,
    ChapterTranslateId,
    TimestampScale,
    Duration,
    DateUtc,
    Title,
    MuxingApp,
    WritingApp,
    Cluster,
    Timestamp,
    SilentTracks,
    SilentTrackNumber,
    Position,
    PrevSize,
    SimpleBlock,
    BlockGroup,
    Block,
    BlockVirtual,
    BlockAdditions,
    BlockDuration,
    ReferencePriority,
    ReferenceBlock,
    DiscardPadding,
    EncryptedBlock,
    Tracks,
    TrackEntry,
    TrackNumber,
    TrackUid,
    TrackType,
    FlagEnabled,
    FlagDefault,
    FlagForced,
    FlagLacing,
    MinCache,
    MaxCache,
    DefaultDuration,
    TrackTimestampScale,
    MaxBlockAdditionId,
    Name,
    Language,
    CodecId,
    CodecPrivate,
    CodecName,
    AttachmentLink,
    CodecDecodeAll,
    CodecDelay,
    SeekPreRoll,
    Video,
    FlagInterlaced,
    StereoMode,
    PixelWidth,
    PixelHeight,
    PixelCropBottom,
    PixelCropTop,
    PixelCropLeft,
    PixelCropRight,
    DisplayWidth,
    DisplayHeight,
    DisplayUnit,
    AspectRatioType,
    ColourSpace,
    FrameRate,
    Audio,
    SamplingFrequency,
    OutputSamplingFrequency,
    Channels,
    BitDepth,
    ContentEncodings,
    ContentEncoding,
    ContentEncodingOrder,
    ContentEncodingScope,
    ContentEncodingType,
    ContentCompression,
    ContentCompAlgo,
    ContentCompSettings,
    ContentEncryption,
    ContentEncAlgo,
    ContentEncKeyId,
    Cues,
    CuePoint,
    CueTime,
    CueTrackPositions,
    CueTrack,
    CueClusterPosition,
    CueRelativePosition,
    CueDuration,
    CueBlockNumber,
    CueCodecState,
    CueReference,
    CueRefTime,
    Attachments,
    AttachedFile,
    FileDescription,
    FileName,
    FileMimeType,
    FileData,
    FileUid,
    Chapters,
    EditionEntry,
    EditionUid,
    EditionFlagHidden,
    EditionFlagDefault,
    EditionFlagOrdered,
    ChapterAtom,
    ChapterUid,
    ChapterStringUid,
    ChapterTimeStart,
    ChapterTimeEnd,
    ChapterFlagHidden,
    ChapterFlagEnabled,
    ChapterSegmentUid,
    ChapterSegmentEditionUid,
    ChapterPhysicalEquiv,
    ChapterTrack,
    ChapterTrackNumber,
    ChapterDisplay,
    ChapString,
    ChapLanguage,
    ChapLanguageIetf,
    ChapCountry,
    ChapProcess,
    ChapProcessCodecId,
    ChapProcessPrivate,
    ChapProcessCommand,
    ChapProcessTime,
    ChapProcessData,
    Tags,
    Tag,
    Targets,
    TargetTypeValue,
    TargetType,
    TagTrackUid,
    TagEditionUid,
    TagChapterUid,
    TagAttachmentUid,
    SimpleTag,
    TagName,
    TagLanguage,
    TagDefault,
    TagString,
    TagBinary,
    /// Special type for unknown tags.
    Unknown,
}

impl ElementType {
    /// Returns `true` for the segment children a broken stream can be resynchronized on.
    pub(crate) fn is_top_level(&self) -> bool {
        matches!(
            self,
            ElementType::Cluster
                | ElementType::Cues
                | ElementType::Info
                | ElementType::SeekHead
                | ElementType::Tags
                | ElementType::Tracks
                | ElementType::Chapters
                | ElementType::Attachments
        )
    }

    /// The nesting level an element is expected at, counted from the segment (level 0).
    ///
    /// Only the elements the tree walker meets while scanning clusters have a fixed level. Global
    /// elements (`Void`, `CRC-32`) and elements of other master elements return `None` and are
    /// accepted at whatever level they are found.
    pub(crate) fn depth(&self) -> Option<usize> {
        use ElementType::*;

        match self {
            Ebml | Segment => Some(0),
            SeekHead | Info | Tracks | Cues | Chapters | Tags | Attachments | Cluster => Some(1),
            Timestamp | SilentTracks | Position | PrevSize | SimpleBlock | BlockGroup
            | EncryptedBlock => Some(2),
            Block | BlockVirtual | BlockAdditions | BlockDuration | ReferencePriority
            | ReferenceBlock | DiscardPadding | SilentTrackNumber => Some(3),
            _ => None,
        }
    }
}

pub(crate) static ELEMENTS: Lazy<HashMap<u32, (Type, ElementType)>> = Lazy::new(|| {
    let mut elems = HashMap::new();
    elems.insert(0x1A45DFA3, (Type::Master, ElementType::Ebml));
    elems.insert(0x4286, (Type::Unsigned, ElementType::EbmlVersion));
    elems.insert(0x42F7, (Type::Unsigned, ElementType::EbmlReadVersion));
    elems.insert(0x42F2, (Type::Unsigned, ElementType::EbmlMaxIdLength));
    elems.insert(0x42F3, (Type::Unsigned, ElementType::EbmlMaxSizeLength));
    elems.insert(0x4282, (Type::String, ElementType::DocType));
    elems.insert(0x4287, (Type::Unsigned, ElementType::DocTypeVersion));
    elems.insert(0x4285, (Type::Unsigned, ElementType::DocTypeReadVersion));
    elems.insert(0xBF, (Type::Binary, ElementType::Crc32));
    elems.insert(0xEC, (Type::Binary, ElementType::Void));
    elems.insert(0x18538067, (Type::Master, ElementType::Segment));
    elems.insert(0x114D9B74, (Type::Master, ElementType::SeekHead));
    elems.insert(0x4DBB, (Type::Master, ElementType::Seek));
    elems.insert(0x53AB, (Type::Unsigned, ElementType::SeekId));
    elems.insert(0x53AC, (Type::Unsigned, ElementType::SeekPosition));
    elems.insert(0x1549A966, (Type::Master, ElementType::Info));
    elems.insert(0x73A4, (Type::Binary, ElementType::SegmentUid));
    elems.insert(0x7384, (Type::String, ElementType::SegmentFilename));
    elems.insert(0x3CB923, (Type::Binary, ElementType::PrevUid));
    elems.insert(0x3C83AB, (Type::String, ElementType::PrevFilename));
    elems.insert(0x3EB923, (Type::Binary, ElementType::NextUid));
    elems.insert(0x3E83BB, (Type::String, ElementType::NextFilename));
    elems.insert(0x4444, (Type::Binary, ElementType::SegmentFamily));
    elems.insert(0x6924, (Type::Master, ElementType::ChapterTranslate));
    elems.insert(0x69FC, (Type::Unsigned, ElementType::ChapterTranslateEditionUid));
    elems.insert(0x69BF, (Type::Unsigned, ElementType::ChapterTranslateCodec));
    elems.insert(0x69A5, (Type::Binary, ElementType::ChapterTranslateId));
    elems.insert(0x2AD7B1, (Type::Unsigned, ElementType::TimestampScale));
    elems.insert(0x4489, (Type::Float, ElementType::Duration));
    elems.insert(0x4461, (Type::Date, ElementType::DateUtc));
    elems.insert(0x7BA9, (Type::String, ElementType::Title));
    elems.insert(0x4D80, (Type::String, ElementType::MuxingApp));
    elems.insert(0x5741, (Type::String, ElementType::WritingApp));
    elems.insert(0x1F43B675, (Type::Master, ElementType::Cluster));
    elems.insert(0xE7, (Type::Unsigned, ElementType::Timestamp));
    elems.insert(0x5854, (Type::Master, ElementType::SilentTracks));
    elems.insert(0x58D7, (Type::Unsigned, ElementType::SilentTrackNumber));
    elems.insert(0xA7, (Type::Unsigned, ElementType::Position));
    elems.insert(0xAB, (Type::Unsigned, ElementType::PrevSize));
    elems.insert(0xA3, (Type::Binary, ElementType::SimpleBlock));
    elems.insert(0xA0, (Type::Master, ElementType::BlockGroup));
    elems.insert(0xA1, (Type::Binary, ElementType::Block));
    elems.insert(0xA2, (Type::Binary, ElementType::BlockVirtual));
    elems.insert(0x75A1, (Type::Master, ElementType::BlockAdditions));
    elems.insert(0x9B, (Type::Unsigned, ElementType::BlockDuration));
    elems.insert(0xFA, (Type::Unsigned, ElementType::ReferencePriority));
    elems.insert(0xFB, (Type::Signed, ElementType::ReferenceBlock));
    elems.insert(0x75A2, (Type::Signed, ElementType::DiscardPadding));
    elems.insert(0xAF, (Type::Binary, ElementType::EncryptedBlock));
    elems.insert(0x1654AE6B, (Type::Master, ElementType::Tracks));
    elems.insert(0xAE, (Type::Master, ElementType::TrackEntry));
    elems.insert(0xD7, (Type::Unsigned, ElementType::TrackNumber));
    elems.insert(0x73C5, (Type::Unsigned, ElementType::TrackUid));
    elems.insert(0x83, (Type::Unsigned, ElementType::TrackType));
    elems.insert(0xB9, (Type::Unsigned, ElementType::FlagEnabled));
    elems.insert(0x88, (Type::Unsigned, ElementType::FlagDefault));
    elems.insert(0x55AA, (Type::Unsigned, ElementType::FlagForced));
    elems.insert(0x9C, (Type::Unsigned, ElementType::FlagLacing));
    elems.insert(0x6DE7, (Type::Unsigned, ElementType::MinCache));
    elems.insert(0x6DF8, (Type::Unsigned, ElementType::MaxCache));
    elems.insert(0x23E383, (Type::Unsigned, ElementType::DefaultDuration));
    elems.insert(0x23314F, (Type::Float, ElementType::TrackTimestampScale));
    elems.insert(0x55EE, (Type::Unsigned, ElementType::MaxBlockAdditionId));
    elems.insert(0x536E, (Type::String, ElementType::Name));
    elems.insert(0x22B59C, (Type::String, ElementType::Language));
    elems.insert(0x86, (Type::String, ElementType::CodecId));
    elems.insert(0x63A2, (Type::Binary, ElementType::CodecPrivate));
    elems.insert(0x258688, (Type::String, ElementType::CodecName));
    elems.insert(0x7446, (Type::Unsigned, ElementType::AttachmentLink));
    elems.insert(0xAA, (Type::Unsigned, ElementType::CodecDecodeAll));
    elems.insert(0x56AA, (Type::Unsigned, ElementType::CodecDelay));
    elems.insert(0x56BB, (Type::Unsigned, ElementType::SeekPreRoll));
    elems.insert(0xE0, (Type::Master, ElementType::Video));
    elems.insert(0x9A, (Type::Unsigned, ElementType::FlagInterlaced));
    elems.insert(0x53B8, (Type::Unsigned, ElementType::StereoMode));
    elems.insert(0xB0, (Type::Unsigned, ElementType::PixelWidth));
    elems.insert(0xBA, (Type::Unsigned, ElementType::PixelHeight));
    elems.insert(0x54AA, (Type::Unsigned, ElementType::PixelCropBottom));
    elems.insert(0x54BB, (Type::Unsigned, ElementType::PixelCropTop));
    elems.insert(0x54CC, (Type::Unsigned, ElementType::PixelCropLeft));
    elems.insert(0x54DD, (Type::Unsigned, ElementType::PixelCropRight));
    elems.insert(0x54B0, (Type::Unsigned, ElementType::DisplayWidth));
    elems.insert(0x54BA, (Type::Unsigned, ElementType::DisplayHeight));
    elems.insert(0x54B2, (Type::Unsigned, ElementType::DisplayUnit));
    elems.insert(0x54B3, (Type::Unsigned, ElementType::AspectRatioType));
    elems.insert(0x2EB524, (Type::Binary, ElementType::ColourSpace));
    elems.insert(0x2383E3, (Type::Float, ElementType::FrameRate));
    elems.insert(0xE1, (Type::Master, ElementType::Audio));
    elems.insert(0xB5, (Type::Float, ElementType::SamplingFrequency));
    elems.insert(0x78B5, (Type::Float, ElementType::OutputSamplingFrequency));
    elems.insert(0x9F, (Type::Unsigned, ElementType::Channels));
    elems.insert(0x6264, (Type::Unsigned, ElementType::BitDepth));
    elems.insert(0x6D80, (Type::Master, ElementType::ContentEncodings));
    elems.insert(0x6240, (Type::Master, ElementType::ContentEncoding));
    elems.insert(0x5031, (Type::Unsigned, ElementType::ContentEncodingOrder));
    elems.insert(0x5032, (Type::Unsigned, ElementType::ContentEncodingScope));
    elems.insert(0x5033, (Type::Unsigned, ElementType::ContentEncodingType));
    elems.insert(0x5034, (Type::Master, ElementType::ContentCompression));
    elems.insert(0x4254, (Type::Unsigned, ElementType::ContentCompAlgo));
    elems.insert(0x4255, (Type::Binary, ElementType::ContentCompSettings));
    elems.insert(0x5035, (Type::Master, ElementType::ContentEncryption));
    elems.insert(0x47E1, (Type::Unsigned, ElementType::ContentEncAlgo));
    elems.insert(0x47E2, (Type::Binary, ElementType::ContentEncKeyId));
    elems.insert(0x1C53BB6B, (Type::Master, ElementType::Cues));
    elems.insert(0xBB, (Type::Master, ElementType::CuePoint));
    elems.insert(0xB3, (Type::Unsigned, ElementType::CueTime));
    elems.insert(0xB7, (Type::Master, ElementType::CueTrackPositions));
    elems.insert(0xF7, (Type::Unsigned, ElementType::CueTrack));
    elems.insert(0xF1, (Type::Unsigned, ElementType::CueClusterPosition));
    elems.insert(0xF0, (Type::Unsigned, ElementType::CueRelativePosition));
    elems.insert(0xB2, (Type::Unsigned, ElementType::CueDuration));
    elems.insert(0x5378, (Type::Unsigned, ElementType::CueBlockNumber));
    elems.insert(0xEA, (Type::Unsigned, ElementType::CueCodecState));
    elems.insert(0xDB, (Type::Master, ElementType::CueReference));
    elems.insert(0x96, (Type::Unsigned, ElementType::CueRefTime));
    elems.insert(0x1941A469, (Type::Master, ElementType::Attachments));
    elems.insert(0x61A7, (Type::Master, ElementType::AttachedFile));
    elems.insert(0x467E, (Type::String, ElementType::FileDescription));
    elems.insert(0x466E, (Type::String, ElementType::FileName));
    elems.insert(0x4660, (Type::String, ElementType::FileMimeType));
    elems.insert(0x465C, (Type::Binary, ElementType::FileData));
    elems.insert(0x46AE, (Type::Unsigned, ElementType::FileUid));
    elems.insert(0x1043A770, (Type::Master, ElementType::Chapters));
    elems.insert(0x45B9, (Type::Master, ElementType::EditionEntry));
    elems.insert(0x45BC, (Type::Unsigned, ElementType::EditionUid));
    elems.insert(0x45BD, (Type::Unsigned, ElementType::EditionFlagHidden));
    elems.insert(0x45DB, (Type::Unsigned, ElementType::EditionFlagDefault));
    elems.insert(0x45DD, (Type::Unsigned, ElementType::EditionFlagOrdered));
    elems.insert(0xB6, (Type::Master, ElementType::ChapterAtom));
    elems.insert(0x73C4, (Type::Unsigned, ElementType::ChapterUid));
    elems.insert(0x5654, (Type::String, ElementType::ChapterStringUid));
    elems.insert(0x91, (Type::Unsigned, ElementType::ChapterTimeStart));
    elems.insert(0x92, (Type::Unsigned, ElementType::ChapterTimeEnd));
    elems.insert(0x98, (Type::Unsigned, ElementType::ChapterFlagHidden));
    elems.insert(0x4598, (Type::Unsigned, ElementType::ChapterFlagEnabled));
    elems.insert(0x6E67, (Type::Binary, ElementType::ChapterSegmentUid));
    elems.insert(0x6EBC, (Type::Unsigned, ElementType::ChapterSegmentEditionUid));
    elems.insert(0x63C3, (Type::Unsigned, ElementType::ChapterPhysicalEquiv));
    elems.insert(0x8F, (Type::Master, ElementType::ChapterTrack));
    elems.insert(0x89, (Type::Unsigned, ElementType::ChapterTrackNumber));
    elems.insert(0x80, (Type::Master, ElementType::ChapterDisplay));
    elems.insert(0x85, (Type::String, ElementType::ChapString));
    elems.insert(0x437C, (Type::String, ElementType::ChapLanguage));
    elems.insert(0x437D, (Type::String, ElementType::ChapLanguageIetf));
    elems.insert(0x437E, (Type::String, ElementType::ChapCountry));
    elems.insert(0x6944, (Type::Master, ElementType::ChapProcess));
    elems.insert(0x6955, (Type::Unsigned, ElementType::ChapProcessCodecId));
    elems.insert(0x450D, (Type::Binary, ElementType::ChapProcessPrivate));
    elems.insert(0x6911, (Type::Master, ElementType::ChapProcessCommand));
    elems.insert(0x6922, (Type::Unsigned, ElementType::ChapProcessTime));
    elems.insert(0x6933, (Type::Binary, ElementType::ChapProcessData));
    elems.insert(0x1254C367, (Type::Master, ElementType::Tags));
    elems.insert(0x7373, (Type::Master, ElementType::Tag));
    elems.insert(0x63C0, (Type::Master, ElementType::Targets));
    elems.insert(0x68CA, (Type::Unsigned, ElementType::TargetTypeValue));
    elems.insert(0x63CA, (Type::String, ElementType::TargetType));
    elems.insert(0x63C5, (Type::Unsigned, ElementType::TagTrackUid));
    elems.insert(0x63C9, (Type::Unsigned, ElementType::TagEditionUid));
    elems.insert(0x63C4, (Type::Unsigned, ElementType::TagChapterUid));
    elems.insert(0x63C6, (Type::Unsigned, ElementType::TagAttachmentUid));
    elems.insert(0x67C8, (Type::Master, ElementType::SimpleTag));
    elems.insert(0x45A3, (Type::String, ElementType::TagName));
    elems.insert(0x447A, (Type::String, ElementType::TagLanguage));
    elems.insert(0x4484, (Type::Unsigned, ElementType::TagDefault));
    elems.insert(0x4487, (Type::String, ElementType::TagString));
    elems.insert(0x4485, (Type::Binary, ElementType::TagBinary));
    elems
});

#[cfg(test)]
mod tests {
    use super::{ElementType, Type, ELEMENTS};

    #[test]
    fn verify_element_lookup() {
        assert_eq!(ELEMENTS.get(&0x1F43B675), Some(&(Type::Master, ElementType::Cluster)));
        assert_eq!(ELEMENTS.get(&0x6911), Some(&(Type::Master, ElementType::ChapProcessCommand)));
        assert_eq!(ELEMENTS.get(&0xFB), Some(&(Type::Signed, ElementType::ReferenceBlock)));
        assert!(ELEMENTS.get(&0x12345678).is_none());
    }

    #[test]
    fn verify_depth_classes() {
        assert_eq!(ElementType::Segment.depth(), Some(0));
        assert_eq!(ElementType::Cluster.depth(), Some(1));
        assert_eq!(ElementType::SimpleBlock.depth(), Some(2));
        assert_eq!(ElementType::ReferenceBlock.depth(), Some(3));
        assert_eq!(ElementType::Void.depth(), None);
        assert_eq!(ElementType::TrackEntry.depth(), None);
    }
}
