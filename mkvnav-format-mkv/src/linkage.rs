// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Grouping of physical segments, possibly from several files, into playable timelines.

use crate::chapters::{ChapterId, ChapterTree};
use crate::segment::Segment;

/// Returns true if `a` plays before `b`.
pub(crate) fn compare_segment_uids(a: &Segment, b: &Segment) -> bool {
    if let (Some(uid), Some(prev)) = (&a.info.uid, &b.info.prev_uid) {
        if uid == prev {
            return true;
        }
    }

    match &a.info.next_uid {
        Some(next) => {
            b.info.uid.as_ref() == Some(next) || b.info.prev_uid.as_ref() == Some(next)
        }
        None => false,
    }
}

/// Returns true if either segment names the other as its previous or next segment.
pub(crate) fn hard_linked(a: &Segment, b: &Segment) -> bool {
    let names = |x: &Segment, y: &Segment| match &x.info.uid {
        Some(uid) => y.info.prev_uid.as_ref() == Some(uid) || y.info.next_uid.as_ref() == Some(uid),
        None => false,
    };
    names(a, b) || names(b, a)
}

/// Linked segments played as one timeline.
#[derive(Clone, Debug)]
pub(crate) struct VirtualSegment {
    /// Indices of the member segments, in playback order.
    pub(crate) segments: Vec<usize>,
    linked_uids: Vec<Box<[u8]>>,
    /// Position of the playing segment in `segments`.
    pub(crate) current: usize,
    pub(crate) edition: usize,
    /// The chapters of all members merged.
    pub(crate) chapters: ChapterTree,
    pub(crate) current_chapter: Option<ChapterId>,
    pub(crate) title: String,
}

impl VirtualSegment {
    pub(crate) fn new(first: usize, segments: &[Segment]) -> Self {
        let mut vseg = VirtualSegment {
            segments: vec![first],
            linked_uids: Vec::new(),
            current: 0,
            edition: 0,
            chapters: ChapterTree::new(),
            current_chapter: None,
            title: String::new(),
        };

        vseg.append_uids(&segments[first]);
        vseg
    }

    fn append_uid(&mut self, uid: &Option<Box<[u8]>>) {
        if let Some(uid) = uid {
            if !uid.is_empty() && !self.linked_uids.contains(uid) {
                self.linked_uids.push(uid.clone());
            }
        }
    }

    fn append_uids(&mut self, segment: &Segment) {
        self.append_uid(&segment.info.uid);
        self.append_uid(&segment.info.prev_uid);
        self.append_uid(&segment.info.next_uid);
    }

    /// Adds segment `index` if it is linked to one of the members. Returns true if it was added.
    pub(crate) fn add_segment(&mut self, index: usize, segments: &[Segment]) -> bool {
        let candidate = &segments[index];

        if !candidate.preloaded || self.segments.contains(&index) {
            return false;
        }

        if let Some(uid) = &candidate.info.uid {
            if self.segments.iter().any(|&i| segments[i].info.uid.as_ref() == Some(uid)) {
                return false;
            }
        }

        let linked = [&candidate.info.uid, &candidate.info.prev_uid, &candidate.info.next_uid]
            .iter()
            .any(|uid| uid.as_ref().map_or(false, |uid| self.linked_uids.contains(uid)));

        if linked {
            self.segments.push(index);
            self.append_uids(candidate);
        }

        linked
    }

    /// Orders the members by their uid chain, keeping the playing segment selected.
    pub(crate) fn sort(&mut self, segments: &[Segment]) {
        let current = self.segments[self.current];

        let mut sorted: Vec<usize> = Vec::with_capacity(self.segments.len());
        for &index in self.segments.iter() {
            let at = sorted
                .iter()
                .position(|&other| compare_segment_uids(&segments[index], &segments[other]))
                .unwrap_or(sorted.len());
            sorted.insert(at, index);
        }

        self.segments = sorted;
        self.current = self.segments.iter().position(|&i| i == current).unwrap_or(0);
    }

    /// Returns true if a member has the uid `uid`.
    pub(crate) fn contains_uid(&self, uid: &[u8], segments: &[Segment]) -> bool {
        self.segments.iter().any(|&i| segments[i].info.uid.as_deref() == Some(uid))
    }

    /// Merges the chapters of the members, names the timeline after its editions and selects the
    /// default edition.
    pub(crate) fn prepare_chapters(&mut self, number: usize, segments: &[Segment]) {
        let mut members = self.segments.iter();

        self.chapters = match members.next() {
            Some(&first) => segments[first].chapters.clone(),
            None => ChapterTree::new(),
        };

        for &member in members {
            self.chapters.merge(&segments[member].chapters);
        }

        self.edition = self.chapters.default_edition();
        self.current_chapter = None;

        self.title = (0..self.chapters.editions().len())
            .map(|edition| self.chapters.main_name(edition))
            .find(|name| !name.is_empty())
            .unwrap_or_else(|| format!("Segment {}", number));
    }

    /// The playing segment.
    pub(crate) fn segment(&self) -> usize {
        self.segments[self.current]
    }

    /// Moves to the next member. Returns false after the last one.
    pub(crate) fn select_next(&mut self) -> bool {
        if self.current + 1 < self.segments.len() {
            self.current += 1;
            true
        }
        else {
            false
        }
    }

    /// The member playing at `date`.
    pub(crate) fn segment_at(&self, date: i64, segments: &[Segment]) -> usize {
        let next = self
            .segments
            .iter()
            .position(|&i| date < segments[i].start_time)
            .unwrap_or(self.segments.len());

        next.saturating_sub(1)
    }

    /// Returns true if the current edition lays chapters end to end.
    pub(crate) fn is_ordered(&self) -> bool {
        self.chapters.edition(self.edition).map_or(false, |edition| edition.ordered)
    }

    /// Duration in microseconds: where the last member ends.
    pub(crate) fn duration(&self, segments: &[Segment]) -> i64 {
        match self.segments.last() {
            Some(&last) => {
                let last = &segments[last];
                last.start_time + last.info.duration.unwrap_or(0)
            }
            None => 0,
        }
    }
}

/// Groups `first` with every segment linked to it, directly or through other members.
pub(crate) fn link(first: usize, segments: &[Segment]) -> VirtualSegment {
    let mut vseg = VirtualSegment::new(first, segments);

    // Members may link each other in any order.
    loop {
        let mut added = false;
        for index in 0..segments.len() {
            added |= vseg.add_segment(index, segments);
        }
        if !added {
            break;
        }
    }

    vseg.sort(segments);
    vseg
}
