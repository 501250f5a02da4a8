// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Helpers assembling synthetic EBML buffers for tests.

fn push_id(out: &mut Vec<u8>, id: u32) {
    let bytes = id.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    out.extend_from_slice(&bytes[skip..]);
}

fn push_size(out: &mut Vec<u8>, size: usize) {
    if size < 0x7F {
        out.push(0x80 | size as u8);
    }
    else {
        out.push(0x01);
        out.extend_from_slice(&(size as u64).to_be_bytes()[1..]);
    }
}

/// An element with the given payload.
pub(crate) fn element(id: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    push_id(&mut out, id);
    push_size(&mut out, payload.len());
    out.extend_from_slice(payload);
    out
}

/// A master element holding the given children.
pub(crate) fn master(id: u32, children: &[Vec<u8>]) -> Vec<u8> {
    element(id, &children.concat())
}

/// A master element written with the reserved unknown size.
pub(crate) fn master_unknown(id: u32, children: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    push_id(&mut out, id);
    out.push(0xFF);
    out.extend_from_slice(&children.concat());
    out
}

pub(crate) fn uint(id: u32, value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count().min(7);
    element(id, &bytes[skip..])
}

pub(crate) fn sint(id: u32, value: i64) -> Vec<u8> {
    element(id, &value.to_be_bytes())
}

pub(crate) fn float(id: u32, value: f64) -> Vec<u8> {
    element(id, &value.to_be_bytes())
}

pub(crate) fn string(id: u32, value: &str) -> Vec<u8> {
    element(id, value.as_bytes())
}

pub(crate) fn bytes(id: u32, value: &[u8]) -> Vec<u8> {
    element(id, value)
}

/// The EBML header of a Matroska file.
pub(crate) fn ebml_header(doc_type: &str) -> Vec<u8> {
    master(0x1A45DFA3, &[uint(0x4286, 1), string(0x4282, doc_type), uint(0x4285, 2)])
}

/// An unlaced SimpleBlock payload for a track numbered below 127.
pub(crate) fn simple_block(track: u8, timecode: i16, flags: u8, payload: &[u8]) -> Vec<u8> {
    let mut data = vec![0x80 | track];
    data.extend_from_slice(&timecode.to_be_bytes());
    data.push(flags);
    data.extend_from_slice(payload);
    bytes(0xA3, &data)
}

/// A BlockGroup holding an unlaced block and optional reference and duration.
pub(crate) fn block_group(
    track: u8,
    timecode: i16,
    reference: Option<i64>,
    duration: Option<u64>,
    payload: &[u8],
) -> Vec<u8> {
    let mut data = vec![0x80 | track];
    data.extend_from_slice(&timecode.to_be_bytes());
    data.push(0);
    data.extend_from_slice(payload);

    let mut children = vec![bytes(0xA1, &data)];
    if let Some(reference) = reference {
        children.push(sint(0xFB, reference));
    }
    if let Some(duration) = duration {
        children.push(uint(0x9B, duration));
    }
    master(0xA0, &children)
}

pub(crate) fn cluster(timecode: u64, blocks: &[Vec<u8>]) -> Vec<u8> {
    let mut children = vec![uint(0xE7, timecode)];
    children.extend_from_slice(blocks);
    master(0x1F43B675, &children)
}

pub(crate) fn track_entry(number: u64, track_type: u64, codec_id: &str) -> Vec<u8> {
    master(0xAE, &[uint(0xD7, number), uint(0x73C5, number), uint(0x83, track_type), string(0x86, codec_id)])
}

pub(crate) fn info(uid: Option<[u8; 16]>, prev: Option<[u8; 16]>, next: Option<[u8; 16]>) -> Vec<u8> {
    let mut children = vec![uint(0x2AD7B1, 1_000_000)];
    if let Some(uid) = uid {
        children.push(bytes(0x73A4, &uid));
    }
    if let Some(prev) = prev {
        children.push(bytes(0x3CB923, &prev));
    }
    if let Some(next) = next {
        children.push(bytes(0x3EB923, &next));
    }
    master(0x1549A966, &children)
}

pub(crate) fn segment(children: &[Vec<u8>]) -> Vec<u8> {
    master(0x18538067, children)
}

/// A chapter atom with a start time, an optional end time (both in nanoseconds) and a name.
pub(crate) fn chapter_atom(uid: u64, start: u64, end: Option<u64>, name: &str, extra: &[Vec<u8>]) -> Vec<u8> {
    let mut children = vec![uint(0x73C4, uid), uint(0x91, start)];
    if let Some(end) = end {
        children.push(uint(0x92, end));
    }
    if !name.is_empty() {
        children.push(master(0x80, &[string(0x85, name)]));
    }
    children.extend_from_slice(extra);
    master(0xB6, &children)
}

/// An edition entry holding the given chapter atoms.
pub(crate) fn edition(uid: u64, ordered: bool, atoms: &[Vec<u8>]) -> Vec<u8> {
    let mut children = vec![uint(0x45BC, uid), uint(0x45DD, u64::from(ordered))];
    children.extend_from_slice(atoms);
    master(0x45B9, &children)
}

pub(crate) fn chapters(editions: &[Vec<u8>]) -> Vec<u8> {
    master(0x1043A770, editions)
}

/// A ChapProcess element with the given codec, private data and `(time, data)` commands.
pub(crate) fn chap_process(codec_id: u64, private: &[u8], commands: &[(u64, Vec<u8>)]) -> Vec<u8> {
    let mut children = vec![uint(0x6955, codec_id), bytes(0x450D, private)];
    for (time, data) in commands {
        children.push(master(0x6911, &[uint(0x6922, *time), bytes(0x6933, data)]));
    }
    master(0x6944, &children)
}

/// Loads the given editions into a chapter tree with ordered chapters and codecs enabled.
pub(crate) fn chapter_tree(editions: &[Vec<u8>]) -> crate::chapters::ChapterTree {
    use crate::ebml::{Element, ElementHeader};

    let data = chapters(editions);
    let mut reader = mkvnav_core::io::BufReader::new(&data);
    let (header, _) = ElementHeader::read(&mut reader).unwrap();
    let el = crate::elements::ChaptersElement::read(&mut reader, header).unwrap();

    let mut tree = crate::chapters::ChapterTree::new();
    tree.load(&el, true, true);
    tree
}
