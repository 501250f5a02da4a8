// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::elements::CuesElement;

/// One position to time mapping of a segment.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    /// The track the entry was recorded for, if known.
    pub track: Option<u64>,
    /// The block number within the cluster, if known.
    pub block: Option<u64>,
    /// Absolute byte position of the cluster.
    pub position: u64,
    /// Time in microseconds, or -1 while the first block of the cluster was not seen.
    pub time: i64,
    pub key: bool,
}

/// A growable position to time index. Entries are kept in position order.
#[derive(Clone, Debug, Default)]
pub struct Index {
    entries: Vec<IndexEntry>,
    cues_loaded: bool,
}

impl Index {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if the index was built from a Cues element.
    pub fn has_cues(&self) -> bool {
        self.cues_loaded
    }

    pub(crate) fn last_mut(&mut self) -> Option<&mut IndexEntry> {
        self.entries.last_mut()
    }

    /// Appends a cluster position with an unknown time. Only positions beyond the last entry
    /// extend the index.
    pub(crate) fn append(&mut self, position: u64) -> bool {
        match self.entries.last() {
            Some(last) if last.position >= position => false,
            _ => {
                self.entries.push(IndexEntry {
                    track: None,
                    block: None,
                    position,
                    time: -1,
                    key: true,
                });
                true
            }
        }
    }

    /// Fills the entries of a Cues element. `data_pos` is the start of the segment payload the
    /// cue positions are relative to and `scale` the segment timestamp scale.
    ///
    /// Returns false, leaving the index untouched, if cues were already loaded.
    pub(crate) fn load_cues(&mut self, cues: &CuesElement, data_pos: u64, scale: u64) -> bool {
        if self.cues_loaded {
            return false;
        }

        // Cues replace whatever clusters were discovered before them.
        self.entries.clear();

        for point in cues.points.iter() {
            let positions = match &point.positions {
                Some(positions) => positions,
                None => continue,
            };

            let position = match positions.cluster_position {
                Some(position) => match data_pos.checked_add(position) {
                    Some(position) => position,
                    None => {
                        log::warn!("mkv: skipping cue point past the end of the stream");
                        continue;
                    }
                },
                None => continue,
            };

            self.entries.push(IndexEntry {
                track: positions.track,
                block: positions.block_number,
                position,
                time: (point.time as i64).saturating_mul(scale as i64) / 1000,
                key: true,
            });
        }

        self.cues_loaded = true;

        log::debug!("mkv: loaded {} cue points", self.entries.len());
        true
    }

    /// Finds the entry to start reading from to reach `time` (µs), given a chapter `offset`.
    ///
    /// This is the entry before the first entry whose time plus offset is past `time`, or the
    /// first entry.
    pub fn find(&self, time: i64, offset: i64) -> Option<&IndexEntry> {
        if self.entries.is_empty() {
            return None;
        }

        let next = self
            .entries
            .iter()
            .position(|entry| entry.time != -1 && entry.time + offset > time)
            .unwrap_or(self.entries.len());

        Some(&self.entries[next.saturating_sub(1)])
    }

    /// Maps a byte position to the index: the first entry at or beyond `pos` with a known
    /// positive time, or the last entry.
    pub fn find_by_position(&self, pos: u64) -> Option<&IndexEntry> {
        self.entries
            .iter()
            .find(|entry| entry.position >= pos && entry.time > 0)
            .or_else(|| self.entries.last())
    }
}

#[cfg(test)]
mod tests {
    use mkvnav_core::io::BufReader;

    use super::*;
    use crate::ebml::{Element, ElementHeader};
    use crate::testutil::{master, uint};

    fn cues(points: &[(u64, u64)]) -> CuesElement {
        let points: Vec<Vec<u8>> = points
            .iter()
            .map(|(time, pos)| {
                master(0xBB, &[uint(0xB3, *time), master(0xB7, &[uint(0xF7, 1), uint(0xF1, *pos)])])
            })
            .collect();
        let data = master(0x1C53BB6B, &points);

        let mut reader = BufReader::new(&data);
        let (header, _) = ElementHeader::read(&mut reader).unwrap();
        CuesElement::read(&mut reader, header).unwrap()
    }

    #[test]
    fn verify_append_only_extends() {
        let mut index = Index::new();
        assert!(index.append(100));
        assert!(index.append(200));
        assert!(!index.append(150));
        assert!(!index.append(200));
        assert_eq!(index.len(), 2);
        assert_eq!(index.entries()[1].time, -1);
    }

    #[test]
    fn verify_cues_load_once() {
        let mut index = Index::new();
        index.append(5);

        assert!(index.load_cues(&cues(&[(0, 10), (2000, 500)]), 40, 1_000_000));
        assert!(index.has_cues());
        assert_eq!(index.len(), 2);
        assert_eq!(index.entries()[1].position, 540);
        assert_eq!(index.entries()[1].time, 2_000_000);

        assert!(!index.load_cues(&cues(&[(0, 1)]), 40, 1_000_000));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn verify_overflowing_cue_position_is_skipped() {
        let mut index = Index::new();

        assert!(index.load_cues(&cues(&[(0, 10), (1000, u64::MAX), (2000, 500)]), 40, 1_000_000));
        let positions: Vec<u64> = index.entries().iter().map(|e| e.position).collect();
        assert_eq!(positions, vec![50, 540]);
    }

    #[test]
    fn verify_find_exact_cue() {
        let mut index = Index::new();
        index.load_cues(&cues(&[(0, 0), (1000, 300), (2000, 900)]), 0, 1_000_000);

        assert_eq!(index.find(1_000_000, 0).map(|e| e.position), Some(300));
        assert_eq!(index.find(1_500_000, 0).map(|e| e.position), Some(300));
        assert_eq!(index.find(-10, 0).map(|e| e.position), Some(0));
        assert_eq!(index.find(9_000_000, 0).map(|e| e.position), Some(900));
    }

    #[test]
    fn verify_find_is_monotonic() {
        let mut index = Index::new();
        index.load_cues(
            &cues(&[(0, 0), (400, 100), (800, 250), (1200, 400), (1600, 800)]),
            0,
            1_000_000,
        );

        let mut last = 0;
        for t in (-100_000..2_000_000).step_by(25_000) {
            let pos = index.find(t, 0).unwrap().position;
            assert!(pos >= last);
            last = pos;
        }
    }

    #[test]
    fn verify_find_by_position() {
        let mut index = Index::new();
        index.load_cues(&cues(&[(0, 0), (1000, 300), (2000, 900)]), 0, 1_000_000);

        assert_eq!(index.find_by_position(200).map(|e| e.position), Some(300));
        assert_eq!(index.find_by_position(0).map(|e| e.position), Some(300));
        assert_eq!(index.find_by_position(5000).map(|e| e.position), Some(900));
    }
}
