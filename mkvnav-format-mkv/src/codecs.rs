// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

use log::{debug, error};

use mkvnav_core::errors::Result;
use mkvnav_core::io::{BufReader, ReadBytes};

/// A four character codec tag.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    pub const UNDEFINED: FourCc = FourCc(*b"undf");

    pub fn is_undefined(&self) -> bool {
        *self == FourCc::UNDEFINED
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            if byte.is_ascii_graphic() || byte == b' ' {
                write!(f, "{}", byte as char)?;
            }
            else {
                write!(f, "\\x{:02x}", byte)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc({})", self)
    }
}

/// Codec ids identified by an exact match.
static CODEC_TAGS: phf::Map<&'static str, &'static [u8; 4]> = phf::phf_map! {
    "V_MPEG1" => b"mpgv",
    "V_MPEG2" => b"mpgv",
    "V_REAL/RV10" => b"RV10",
    "V_REAL/RV20" => b"RV20",
    "V_REAL/RV30" => b"RV30",
    "V_REAL/RV40" => b"RV40",
    "V_DIRAC" => b"drac",
    "V_MPEG4/MS/V3" => b"DIV3",
    "V_MPEG4/ISO/AVC" => b"avc1",
    "V_MJPEG" => b"MJPG",
    "V_VP8" => b"VP80",
    "V_VP9" => b"VP90",
    "A_MPEG/L1" => b"mpga",
    "A_MPEG/L2" => b"mpga",
    "A_MPEG/L3" => b"mpga",
    "A_AC3" => b"a52 ",
    "A_EAC3" => b"eac3",
    "A_DTS" => b"dts ",
    "A_FLAC" => b"flac",
    "A_VORBIS" => b"vorb",
    "A_OPUS" => b"Opus",
    "A_AAC" => b"mp4a",
    "A_WAVPACK4" => b"WVPK",
    "A_TTA1" => b"TTA1",
    "A_PCM/INT/BIG" => b"twos",
    "A_PCM/INT/LIT" => b"araw",
    "A_PCM/FLOAT/IEEE" => b"araw",
    "S_KATE" => b"kate",
    "S_TEXT/UTF8" => b"subt",
    "S_TEXT/USF" => b"usf ",
    "S_TEXT/SSA" => b"ssa ",
    "S_TEXT/ASS" => b"ssa ",
    "S_SSA" => b"ssa ",
    "S_ASS" => b"ssa ",
    "S_VOBSUB" => b"spu ",
    "B_VOBBTN" => b"vbtn",
};

/// Codec ids identified by their prefix, tried in order.
const CODEC_PREFIXES: &[(&str, &[u8; 4])] = &[
    ("V_THEORA", b"theo"),
    ("V_MPEG4/ISO", b"mp4v"),
    ("A_AAC/MPEG2/", b"mp4a"),
    ("A_AAC/MPEG4/", b"mp4a"),
];

/// The codec id of tracks holding a Video for Windows bitmap header.
pub(crate) const CODEC_ID_VFW: &str = "V_MS/VFW/FOURCC";
/// The codec id of tracks holding an Audio Compression Manager wave format.
pub(crate) const CODEC_ID_ACM: &str = "A_MS/ACM";
/// The codec id of DVD menu button tracks.
pub(crate) const CODEC_ID_BUTTONS: &str = "B_VOBBTN";
/// The codec id of DVD subpictures, whose display time is carried in the packets.
pub(crate) const CODEC_ID_VOBSUB: &str = "S_VOBSUB";

/// A `BITMAPINFOHEADER` structure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitmapInfoHeader {
    pub width: i32,
    pub height: i32,
    pub planes: u16,
    pub bit_count: u16,
    pub compression: FourCc,
    pub size_image: u32,
}

impl BitmapInfoHeader {
    const SIZE: usize = 40;

    /// Reads the little-endian header, returning it and the bytes following it.
    fn read(data: &[u8]) -> Result<(Self, &[u8])> {
        let mut reader = BufReader::new(data);

        let size = reader.read_u32()? as usize;
        let width = reader.read_i32()?;
        let height = reader.read_i32()?;
        let planes = reader.read_u16()?;
        let bit_count = reader.read_u16()?;
        let compression = FourCc(reader.read_quad_bytes()?);
        let size_image = reader.read_u32()?;
        // Pixels per meter, colours used and important.
        reader.ignore_bytes(16)?;

        let extra_start = size.clamp(Self::SIZE, data.len());

        Ok((
            BitmapInfoHeader { width, height, planes, bit_count, compression, size_image },
            &data[extra_start..],
        ))
    }
}

/// A `WAVEFORMATEX` structure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WaveFormatEx {
    pub format_tag: u16,
    pub channels: u16,
    pub samples_per_sec: u32,
    pub avg_bytes_per_sec: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl WaveFormatEx {
    const SIZE: usize = 18;

    const FORMAT_EXTENSIBLE: u16 = 0xfffe;

    /// Reads the little-endian structure, returning it and its extra bytes.
    fn read(data: &[u8]) -> Result<(Self, &[u8])> {
        let mut reader = BufReader::new(data);

        let mut format = WaveFormatEx {
            format_tag: reader.read_u16()?,
            channels: reader.read_u16()?,
            samples_per_sec: reader.read_u32()?,
            avg_bytes_per_sec: reader.read_u32()?,
            block_align: reader.read_u16()?,
            bits_per_sample: reader.read_u16()?,
        };

        let extra_len = usize::from(reader.read_u16()?).min(data.len() - Self::SIZE);
        let extra = &data[Self::SIZE..Self::SIZE + extra_len];

        // The extensible format carries the real format tag in its sub-format GUID.
        if format.format_tag == Self::FORMAT_EXTENSIBLE && extra.len() >= 22 {
            format.format_tag = u16::from_le_bytes([extra[6], extra[7]]);
        }

        Ok((format, extra))
    }

    fn fourcc(&self) -> FourCc {
        let tag = match self.format_tag {
            0x0001 => b"araw",
            0x0003 => b"f32l",
            0x0050 | 0x0055 => b"mpga",
            0x00ff | 0x1610 => b"mp4a",
            0x0160 => b"wma1",
            0x0161 => b"wma2",
            0x0162 => b"wmap",
            0x0163 => b"wmal",
            0x2000 => b"a52 ",
            0x2001 => b"dts ",
            0xf1ac => b"flac",
            other => {
                let [hi, lo] = other.to_be_bytes();
                return FourCc([b'm', b's', hi, lo]);
            }
        };
        FourCc(*tag)
    }
}

/// The result of identifying a track's codec.
#[derive(Clone, Debug)]
pub(crate) struct CodecInfo {
    pub(crate) fourcc: FourCc,
    /// Initialization data handed to the host.
    pub(crate) extra: Option<Box<[u8]>>,
    pub(crate) bitmap: Option<BitmapInfoHeader>,
    pub(crate) wave: Option<WaveFormatEx>,
}

/// Identifies the codec of a track from its codec id and private data.
pub(crate) fn identify(codec_id: &str, private: Option<&[u8]>) -> CodecInfo {
    let mut info = CodecInfo {
        fourcc: FourCc::UNDEFINED,
        extra: private.map(Box::from),
        bitmap: None,
        wave: None,
    };

    if codec_id == CODEC_ID_VFW {
        match private.filter(|data| data.len() >= BitmapInfoHeader::SIZE) {
            Some(data) => {
                if let Ok((bitmap, extra)) = BitmapInfoHeader::read(data) {
                    info.fourcc = bitmap.compression;
                    info.extra = Some(Box::from(extra));
                    info.bitmap = Some(bitmap);
                }
            }
            None => error!("mkv: missing or truncated BITMAPINFOHEADER"),
        }
        return info;
    }

    if codec_id == CODEC_ID_ACM {
        match private.filter(|data| data.len() >= WaveFormatEx::SIZE) {
            Some(data) => {
                if let Ok((wave, extra)) = WaveFormatEx::read(data) {
                    info.fourcc = wave.fourcc();
                    info.extra = Some(Box::from(extra));
                    info.wave = Some(wave);
                }
            }
            None => error!("mkv: missing or truncated WAVEFORMATEX"),
        }
        return info;
    }

    if let Some(tag) = CODEC_TAGS.get(codec_id) {
        info.fourcc = FourCc(**tag);
    }
    else if let Some((_, tag)) =
        CODEC_PREFIXES.iter().find(|(prefix, _)| codec_id.starts_with(prefix))
    {
        info.fourcc = FourCc(**tag);
    }
    else {
        debug!("mkv: unknown codec id {}", codec_id);
    }

    info
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_exact_and_prefix_ids() {
        assert_eq!(identify("A_VORBIS", None).fourcc, FourCc(*b"vorb"));
        assert_eq!(identify("V_MPEG4/ISO/AVC", None).fourcc, FourCc(*b"avc1"));
        assert_eq!(identify("V_MPEG4/ISO/ASP", None).fourcc, FourCc(*b"mp4v"));
        assert_eq!(identify("A_AAC/MPEG4/LC/SBR", None).fourcc, FourCc(*b"mp4a"));
        assert_eq!(identify("S_TEXT/ASS", None).fourcc, FourCc(*b"ssa "));
        assert_eq!(identify("V_THEORA", None).fourcc, FourCc(*b"theo"));
        assert!(identify("X_SOMETHING", Some(&[1, 2])).fourcc.is_undefined());
        assert_eq!(identify("X_SOMETHING", Some(&[1, 2])).extra.as_deref(), Some(&[1u8, 2][..]));
    }

    #[test]
    fn verify_bitmap_info_header() {
        let mut data = Vec::new();
        data.extend_from_slice(&40u32.to_le_bytes());
        data.extend_from_slice(&640i32.to_le_bytes());
        data.extend_from_slice(&480i32.to_le_bytes());
        data.extend_from_slice(&1u16.to_le_bytes());
        data.extend_from_slice(&24u16.to_le_bytes());
        data.extend_from_slice(b"XVID");
        data.extend_from_slice(&[0; 20]);
        data.extend_from_slice(&[0xAA, 0xBB]);

        let info = identify(CODEC_ID_VFW, Some(&data));
        assert_eq!(info.fourcc, FourCc(*b"XVID"));
        let bitmap = info.bitmap.unwrap();
        assert_eq!((bitmap.width, bitmap.height), (640, 480));
        assert_eq!(info.extra.as_deref(), Some(&[0xAA, 0xBB][..]));

        assert!(identify(CODEC_ID_VFW, Some(&data[..39])).fourcc.is_undefined());
    }

    #[test]
    fn verify_wave_format_ex() {
        let mut data = Vec::new();
        data.extend_from_slice(&0x0161u16.to_le_bytes());
        data.extend_from_slice(&2u16.to_le_bytes());
        data.extend_from_slice(&44100u32.to_le_bytes());
        data.extend_from_slice(&16000u32.to_le_bytes());
        data.extend_from_slice(&2230u16.to_le_bytes());
        data.extend_from_slice(&16u16.to_le_bytes());
        data.extend_from_slice(&3u16.to_le_bytes());
        data.extend_from_slice(&[1, 2, 3]);

        let info = identify(CODEC_ID_ACM, Some(&data));
        assert_eq!(info.fourcc, FourCc(*b"wma2"));
        let wave = info.wave.unwrap();
        assert_eq!(wave.channels, 2);
        assert_eq!(wave.samples_per_sec, 44100);
        assert_eq!(info.extra.as_deref(), Some(&[1u8, 2, 3][..]));

        assert!(identify(CODEC_ID_ACM, Some(&data[..10])).fourcc.is_undefined());
    }

    #[test]
    fn verify_unknown_wave_format_tag() {
        let mut data = vec![0u8; 18];
        data[0..2].copy_from_slice(&0x1234u16.to_le_bytes());
        assert_eq!(identify(CODEC_ID_ACM, Some(&data)).fourcc, FourCc([b'm', b's', 0x12, 0x34]));
    }
}
