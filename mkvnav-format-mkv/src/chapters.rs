// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Chapters and editions.
//!
//! All chapters of a segment live in one arena, a [`ChapterTree`]. Every edition owns a root item
//! whose children are the top-level chapters of the edition. Children are referenced by
//! [`ChapterId`], and the parent link is only used to answer ancestry questions.

use crate::elements::{ChapterAtomElement, ChaptersElement};
use crate::interpreter::dvd::{DvdMatch, DVD_LEVEL_LU, DVD_LEVEL_SS};

/// Identifies a chapter item within its [`ChapterTree`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChapterId(pub(crate) usize);

/// The interpreter that runs the commands of a chapter codec.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChapterCodecKind {
    /// Matroska script (`GotoAndPlay`).
    Script,
    /// DVD virtual machine commands.
    Dvd,
    /// A codec no interpreter exists for. Its commands are never run.
    Unknown(u64),
}

impl ChapterCodecKind {
    fn from_id(id: u64) -> Self {
        match id {
            0 => ChapterCodecKind::Script,
            1 => ChapterCodecKind::Dvd,
            other => ChapterCodecKind::Unknown(other),
        }
    }
}

/// The commands a chapter runs, by trigger.
#[derive(Clone, Debug)]
pub struct ChapterCodec {
    pub kind: ChapterCodecKind,
    /// Identity of the chapter for the codec. For DVD commands this addresses program chains,
    /// cells, titles and so on.
    pub private: Box<[u8]>,
    pub enter: Vec<Box<[u8]>>,
    pub during: Vec<Box<[u8]>>,
    pub leave: Vec<Box<[u8]>>,
}

impl ChapterCodec {
    /// A descriptive name derived from the codec private data.
    pub fn name(&self, for_title: bool) -> String {
        if self.kind != ChapterCodecKind::Dvd || self.private.len() < 3 {
            return String::new();
        }

        let p = &self.private;

        if p[0] == DVD_LEVEL_LU {
            format!("---  DVD Menu ({}{})  ---", p[1] as char, p[2] as char)
        }
        else if p[0] == DVD_LEVEL_SS && for_title {
            match p[1] {
                0x00 => "First Played".to_string(),
                0xC0 => "Video Manager".to_string(),
                0x80 if p.len() >= 4 => {
                    let title = (u16::from(p[2]) << 8) + u16::from(p[3]);
                    format!("----- Title {} -----", title)
                }
                _ => String::new(),
            }
        }
        else {
            String::new()
        }
    }

    /// The DVD title number this codec describes, or -1.
    pub fn title_number(&self) -> i32 {
        if self.kind == ChapterCodecKind::Dvd
            && self.private.len() >= 4
            && self.private[0] == DVD_LEVEL_SS
        {
            return (i32::from(self.private[2]) << 8) + i32::from(self.private[3]);
        }
        -1
    }
}

/// A chapter. Times are in microseconds, -1 when unknown.
#[derive(Clone, Debug)]
pub struct ChapterItem {
    pub uid: Option<u64>,
    pub start: i64,
    pub end: i64,
    /// Start on the playback timeline, after ordered chapters are laid end to end.
    pub user_start: i64,
    pub user_end: i64,
    /// Shown to the user.
    pub display: bool,
    /// The chapter has a name of its own.
    pub user_display: bool,
    pub name: String,
    /// Nesting level, 0 for edition roots.
    pub level: usize,
    pub segment_uid: Option<Box<[u8]>>,
    pub children: Vec<ChapterId>,
    pub parent: Option<ChapterId>,
    pub codecs: Vec<ChapterCodec>,
    pub(crate) is_leaving: bool,
}

impl ChapterItem {
    fn new(level: usize, parent: Option<ChapterId>) -> Self {
        ChapterItem {
            uid: None,
            start: 0,
            end: -1,
            user_start: 0,
            user_end: -1,
            display: true,
            user_display: false,
            name: String::new(),
            level,
            segment_uid: None,
            children: Vec::new(),
            parent,
            codecs: Vec::new(),
            is_leaving: false,
        }
    }
}

/// An edition: one way of playing the chapters of a segment.
#[derive(Clone, Debug)]
pub struct Edition {
    pub root: ChapterId,
    pub uid: Option<u64>,
    pub ordered: bool,
    pub default: bool,
    pub hidden: bool,
}

/// A chapter as published to hosts.
#[derive(Clone, Debug, PartialEq)]
pub struct ChapterEntry {
    pub uid: Option<u64>,
    pub name: String,
    pub user_start: i64,
    pub user_end: i64,
    pub hidden: bool,
    pub children: Vec<ChapterEntry>,
}

/// An edition as published to hosts.
#[derive(Clone, Debug, PartialEq)]
pub struct EditionInfo {
    pub uid: Option<u64>,
    pub ordered: bool,
    pub default: bool,
    pub hidden: bool,
    pub name: String,
    /// Duration in microseconds.
    pub duration: i64,
    pub chapters: Vec<ChapterEntry>,
}

/// The chapters and editions of a segment, or of a group of linked segments.
#[derive(Clone, Debug, Default)]
pub struct ChapterTree {
    items: Vec<ChapterItem>,
    editions: Vec<Edition>,
    default_edition: usize,
}

impl ChapterTree {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn editions(&self) -> &[Edition] {
        &self.editions
    }

    pub fn edition(&self, index: usize) -> Option<&Edition> {
        self.editions.get(index)
    }

    /// The index of the default edition.
    pub fn default_edition(&self) -> usize {
        self.default_edition
    }

    pub fn item(&self, id: ChapterId) -> &ChapterItem {
        &self.items[id.0]
    }

    pub(crate) fn item_mut(&mut self, id: ChapterId) -> &mut ChapterItem {
        &mut self.items[id.0]
    }

    pub fn is_empty(&self) -> bool {
        self.editions.is_empty()
    }

    fn push(&mut self, item: ChapterItem) -> ChapterId {
        self.items.push(item);
        ChapterId(self.items.len() - 1)
    }

    /// Adds the editions of a Chapters element.
    pub(crate) fn load(&mut self, el: &ChaptersElement, use_ordered: bool, use_codecs: bool) {
        for entry in el.editions.iter() {
            let mut root = ChapterItem::new(0, None);
            root.uid = entry.uid;
            root.display = false;
            let root = self.push(root);

            for atom in entry.atoms.iter() {
                let child = self.add_atom(atom, root, 0, use_codecs);
                self.items[root.0].children.push(child);
            }

            if entry.default {
                self.default_edition = self.editions.len();
            }

            self.editions.push(Edition {
                root,
                uid: entry.uid,
                ordered: use_ordered && entry.ordered,
                default: entry.default,
                hidden: entry.hidden,
            });
        }

        self.refresh();

        log::debug!("mkv: loaded {} editions", self.editions.len());
    }

    fn add_atom(
        &mut self,
        atom: &ChapterAtomElement,
        parent: ChapterId,
        level: usize,
        use_codecs: bool,
    ) -> ChapterId {
        let mut item = ChapterItem::new(level, Some(parent));

        item.uid = atom.uid;
        item.start = (atom.time_start / 1000) as i64;
        item.end = atom.time_end.map_or(-1, |end| (end / 1000) as i64);
        item.display = !atom.hidden;
        item.segment_uid = atom.segment_uid.clone();

        for display in atom.displays.iter() {
            item.name.extend(std::iter::repeat('+').take(level));
            item.name.push(' ');
            item.name.push_str(&display.string);
            item.user_display = true;
        }

        if use_codecs {
            for process in atom.processes.iter() {
                let mut codec = ChapterCodec {
                    kind: ChapterCodecKind::from_id(process.codec_id),
                    private: process.private.clone().unwrap_or_default(),
                    enter: Vec::new(),
                    during: Vec::new(),
                    leave: Vec::new(),
                };

                for command in process.commands.iter() {
                    let list = match command.time {
                        Some(0) => &mut codec.during,
                        Some(1) => &mut codec.enter,
                        Some(2) => &mut codec.leave,
                        _ => {
                            log::debug!("mkv: dropping chapter command with unknown time");
                            continue;
                        }
                    };
                    list.extend(command.data.iter().cloned());
                }

                item.codecs.push(codec);
            }
        }

        let id = self.push(item);

        for child in atom.atoms.iter() {
            let child = self.add_atom(child, id, level + 1, use_codecs);
            self.items[id.0].children.push(child);
        }

        id
    }

    /// Recomputes the user times of every edition.
    pub fn refresh(&mut self) {
        for i in 0..self.editions.len() {
            let Edition { root, ordered, .. } = self.editions[i];
            self.refresh_item(root, ordered, -1);
            self.items[root.0].display = false;
        }
    }

    fn refresh_item(&mut self, id: ChapterId, ordered: bool, prev_user_time: i64) -> i64 {
        let mut user_time = prev_user_time;
        let mut prev_user_time = prev_user_time;

        // Siblings of unordered editions do not depend on each other.
        let children = self.items[id.0].children.clone();
        for &child in children.iter() {
            if ordered {
                user_time = self.refresh_item(child, true, user_time);
            }
            else {
                user_time = user_time.max(self.refresh_item(child, false, -1));
            }
        }

        if ordered {
            // Ordered chapters always start at zero.
            if prev_user_time == -1 {
                if user_time == -1 {
                    user_time = 0;
                }
                prev_user_time = 0;
            }

            let item = &mut self.items[id.0];
            item.user_start = prev_user_time;
            item.user_end = if item.end != -1 && user_time == prev_user_time {
                item.user_start - item.start + item.end
            }
            else {
                user_time
            };
        }
        else {
            let mut children = children;
            children.sort_by_key(|c| (self.items[c.0].user_start, self.items[c.0].user_end));

            let item = &mut self.items[id.0];
            item.children = children;
            item.user_start = item.start;
            item.user_end = if item.end != -1 {
                item.end
            }
            else if user_time != -1 {
                user_time
            }
            else {
                item.user_start
            };
        }

        self.items[id.0].user_end
    }

    /// Finds the deepest chapter of an edition playing at user time `time`.
    ///
    /// In ordered editions the search prefers to continue past `current`, so that adjacent
    /// zero-length chapters are not returned over and over.
    pub fn find_by_user_time(
        &self,
        edition: usize,
        time: i64,
        current: Option<ChapterId>,
    ) -> Option<ChapterId> {
        let edition = self.editions.get(edition)?;
        let current = if edition.ordered { current } else { None };
        let mut found = false;
        self.find_item(edition.root, time, current, &mut found)
    }

    fn find_item(
        &self,
        id: ChapterId,
        time: i64,
        current: Option<ChapterId>,
        found: &mut bool,
    ) -> Option<ChapterId> {
        let item = &self.items[id.0];

        if current == Some(id) {
            *found = true;
        }

        let inside = time >= item.user_start
            && (time < item.user_end || (item.user_start == item.user_end && time == item.user_end));

        if !inside {
            return None;
        }

        let mut result = None;
        for &child in item.children.iter() {
            let keep_looking = match current {
                None => result.is_none(),
                Some(_) => !*found || result.is_none(),
            };
            if !keep_looking {
                break;
            }
            result = self.find_item(child, time, current, found);
        }

        result.or(Some(id))
    }

    /// Returns true if `a` is `b` or contains it.
    pub fn is_ancestor_of(&self, a: ChapterId, b: ChapterId) -> bool {
        let mut cur = Some(b);
        while let Some(id) = cur {
            if id == a {
                return true;
            }
            cur = self.items[id.0].parent;
        }
        false
    }

    /// Finds a chapter by uid in every edition.
    pub fn find_by_uid(&self, uid: u64) -> Option<ChapterId> {
        self.editions.iter().find_map(|edition| self.find_in_subtree(edition.root, Some(uid)))
    }

    fn find_in_subtree(&self, root: ChapterId, uid: Option<u64>) -> Option<ChapterId> {
        let uid = uid?;
        let item = &self.items[root.0];
        if item.uid == Some(uid) {
            return Some(root);
        }
        item.children.iter().find_map(|&child| self.find_in_subtree(child, Some(uid)))
    }

    /// Finds the first chapter, in pre-order from `from`, with a DVD codec matching `m`.
    pub(crate) fn browse(&self, from: ChapterId, m: DvdMatch) -> Option<ChapterId> {
        let item = &self.items[from.0];

        let matched = item
            .codecs
            .iter()
            .any(|codec| codec.kind == ChapterCodecKind::Dvd && m.matches(&codec.private));

        if matched {
            return Some(from);
        }

        item.children.iter().find_map(|&child| self.browse(child, m))
    }

    /// Like [`ChapterTree::browse`] over a whole edition.
    pub(crate) fn browse_edition(&self, edition: usize, m: DvdMatch) -> Option<ChapterId> {
        self.editions.get(edition).and_then(|edition| self.browse(edition.root, m))
    }

    /// Extends the editions of this tree with the editions of `other`, by position. Chapters of
    /// `other` already present (by uid) are merged, the others are appended.
    pub(crate) fn merge(&mut self, other: &ChapterTree) {
        let count = self.editions.len().min(other.editions.len());
        for i in 0..count {
            let into = self.editions[i].root;
            self.merge_item(into, other, other.editions[i].root);
        }
        self.refresh();
    }

    fn merge_item(&mut self, into: ChapterId, other: &ChapterTree, from: ChapterId) {
        for &child in other.items[from.0].children.iter() {
            match self.find_in_subtree(into, other.items[child.0].uid) {
                Some(existing) => self.merge_item(existing, other, child),
                None => {
                    let copy = self.copy_subtree(other, child, into);
                    self.items[into.0].children.push(copy);
                }
            }
        }

        let from = &other.items[from.0];
        let item = &mut self.items[into.0];
        item.user_start = item.user_start.min(from.user_start);
        item.user_end = item.user_end.max(from.user_end);
    }

    fn copy_subtree(&mut self, other: &ChapterTree, from: ChapterId, parent: ChapterId) -> ChapterId {
        let mut item = other.items[from.0].clone();
        item.parent = Some(parent);
        item.children.clear();
        let id = self.push(item);

        for &child in other.items[from.0].children.iter() {
            let copy = self.copy_subtree(other, child, id);
            self.items[id.0].children.push(copy);
        }
        id
    }

    /// The first non-empty codec name of a chapter.
    pub fn codec_name(&self, id: ChapterId, for_title: bool) -> String {
        self.items[id.0]
            .codecs
            .iter()
            .map(|codec| codec.name(for_title))
            .find(|name| !name.is_empty())
            .unwrap_or_default()
    }

    /// The first DVD title number of a chapter, or -1.
    pub fn title_number(&self, id: ChapterId) -> i32 {
        self.items[id.0]
            .codecs
            .iter()
            .map(|codec| codec.title_number())
            .find(|number| *number >= 0)
            .unwrap_or(-1)
    }

    /// The title-level name of an edition, from its first chapter.
    pub fn main_name(&self, edition: usize) -> String {
        self.editions
            .get(edition)
            .and_then(|edition| self.items[edition.root.0].children.first())
            .map(|&first| self.codec_name(first, true))
            .unwrap_or_default()
    }

    /// The playback duration of an edition in microseconds.
    pub fn edition_duration(&self, edition: usize) -> i64 {
        self.editions
            .get(edition)
            .and_then(|edition| self.items[edition.root.0].children.last())
            .map_or(0, |&last| self.items[last.0].user_end)
    }

    /// Describes every edition for hosts. Chapters without a name take their codec name.
    pub fn publish(&mut self) -> Vec<EditionInfo> {
        let mut infos = Vec::with_capacity(self.editions.len());

        for i in 0..self.editions.len() {
            let edition = self.editions[i].clone();
            let children = self.items[edition.root.0].children.clone();
            let chapters = children.into_iter().map(|child| self.publish_item(child)).collect();

            infos.push(EditionInfo {
                uid: edition.uid,
                ordered: edition.ordered,
                default: i == self.default_edition,
                hidden: edition.hidden,
                name: self.main_name(i),
                duration: self.edition_duration(i),
                chapters,
            });
        }

        infos
    }

    fn publish_item(&mut self, id: ChapterId) -> ChapterEntry {
        if !self.items[id.0].display || self.items[id.0].name.is_empty() {
            let name = self.codec_name(id, false);
            let item = &mut self.items[id.0];
            if !name.is_empty() {
                item.display = true;
            }
            item.name = name;
        }

        let children = self.items[id.0].children.clone();
        let children = children.into_iter().map(|child| self.publish_item(child)).collect();

        let item = &self.items[id.0];
        ChapterEntry {
            uid: item.uid,
            name: item.name.clone(),
            user_start: item.user_start,
            user_end: item.user_end,
            hidden: !item.display,
            children,
        }
    }
}
