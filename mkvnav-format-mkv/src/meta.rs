// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::ebml::ElementData;
use crate::elements::{AttachedFileElement, SimpleTagElement, TagElement, TargetsElement};

/// A file attached to a segment, such as a font or cover art.
#[derive(Clone, Debug)]
pub struct Attachment {
    pub uid: Option<u64>,
    pub name: String,
    pub mime_type: String,
    pub description: Option<String>,
    /// The length of the attached data in bytes.
    pub len: usize,
    pub data: Box<[u8]>,
}

impl Attachment {
    pub(crate) fn from_element(el: AttachedFileElement) -> Self {
        Attachment {
            uid: el.uid,
            name: el.name,
            mime_type: el.mime_type,
            description: el.description,
            len: el.data.len(),
            data: el.data,
        }
    }
}

/// What a tag applies to. Empty uid lists mean the whole segment.
#[derive(Clone, Debug, Default)]
pub struct Target {
    pub type_value: Option<u64>,
    pub target_type: Option<String>,
    pub track_uids: Vec<u64>,
    pub edition_uids: Vec<u64>,
    pub chapter_uids: Vec<u64>,
    pub attachment_uids: Vec<u64>,
}

impl Target {
    pub(crate) fn from_element(el: TargetsElement) -> Self {
        Target {
            type_value: el.type_value,
            target_type: el.target_type,
            track_uids: el.track_uids,
            edition_uids: el.edition_uids,
            chapter_uids: el.chapter_uids,
            attachment_uids: el.attachment_uids,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TagValue {
    String(String),
    Binary(Box<[u8]>),
}

#[derive(Clone, Debug)]
pub struct SimpleTag {
    pub name: String,
    pub language: String,
    pub default: bool,
    pub value: Option<TagValue>,
    pub children: Vec<SimpleTag>,
}

impl SimpleTag {
    pub(crate) fn from_element(el: SimpleTagElement) -> Self {
        let value = match el.value {
            Some(ElementData::String(s)) => Some(TagValue::String(s)),
            Some(ElementData::Binary(b)) => Some(TagValue::Binary(b)),
            Some(other) => {
                log::debug!("mkv: unexpected simple tag value {:?}", other);
                None
            }
            None => None,
        };

        SimpleTag {
            name: el.name,
            language: el.language,
            default: el.default,
            value,
            children: el.children.into_iter().map(SimpleTag::from_element).collect(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Tag {
    pub target: Target,
    pub simple_tags: Vec<SimpleTag>,
}

impl Tag {
    pub(crate) fn from_element(el: TagElement) -> Self {
        Tag {
            target: el.targets.map(Target::from_element).unwrap_or_default(),
            simple_tags: el.simple_tags.into_iter().map(SimpleTag::from_element).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use mkvnav_core::io::BufReader;

    use super::*;
    use crate::ebml::{Element, ElementHeader};
    use crate::testutil::{bytes, master, string, uint};

    #[test]
    fn verify_tag_conversion() {
        let data = master(
            0x7373,
            &[
                master(0x63C0, &[uint(0x68CA, 50), uint(0x63C5, 9)]),
                master(
                    0x67C8,
                    &[
                        string(0x45A3, "TITLE"),
                        string(0x4487, "Main"),
                        master(0x67C8, &[string(0x45A3, "COVER"), bytes(0x4485, &[1, 2])]),
                    ],
                ),
            ],
        );

        let mut reader = BufReader::new(&data);
        let (header, _) = ElementHeader::read(&mut reader).unwrap();
        let tag = Tag::from_element(TagElement::read(&mut reader, header).unwrap());

        assert_eq!(tag.target.type_value, Some(50));
        assert_eq!(tag.target.track_uids, vec![9]);
        assert_eq!(tag.simple_tags[0].name, "TITLE");
        assert_eq!(tag.simple_tags[0].value, Some(TagValue::String("Main".into())));
        assert_eq!(tag.simple_tags[0].language, "und");
        assert_eq!(tag.simple_tags[0].children[0].value, Some(TagValue::Binary(Box::new([1, 2]))));
    }
}
