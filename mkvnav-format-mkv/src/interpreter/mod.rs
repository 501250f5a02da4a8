// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Chapter command interpreters.
//!
//! Chapters may carry commands that run when playback enters or leaves them. The commands act on
//! the demuxer through the [`ChapterHost`] trait: they read and write the DVD registers, search
//! chapters and request jumps.

pub mod dvd;
pub mod script;

use mkvnav_core::errors::{decode_error, Result};

use crate::chapters::{ChapterCodecKind, ChapterId, ChapterItem, ChapterTree};

use dvd::{DvdMatch, DvdRegisters};

/// A chapter of a virtual segment.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChapterRef {
    pub vseg: usize,
    pub id: ChapterId,
}

/// The demuxer state chapter commands operate on.
pub trait ChapterHost {
    fn registers(&mut self) -> &mut DvdRegisters;

    /// The merged chapters of a virtual segment.
    fn chapters(&self, vseg: usize) -> Option<&ChapterTree>;

    fn chapters_mut(&mut self, vseg: usize) -> Option<&mut ChapterTree>;

    fn virtual_segment_count(&self) -> usize;

    fn current_vseg(&self) -> usize;

    /// The edition in use by a virtual segment.
    fn current_edition(&self, vseg: usize) -> usize;

    fn current_chapter(&self) -> Option<ChapterRef>;

    /// Makes `target` the current chapter, switching virtual segments if needed.
    fn jump_to(&mut self, target: ChapterRef) -> Result<()>;

    /// Seeks to the start of `target` without running its commands.
    fn seek_to_chapter(&mut self, target: ChapterRef) -> Result<()>;
}

#[derive(Copy, Clone)]
enum Trigger {
    Enter,
    Leave,
}

fn tree<H: ChapterHost + ?Sized>(host: &H, vseg: usize) -> Result<&ChapterTree> {
    match host.chapters(vseg) {
        Some(tree) => Ok(tree),
        None => decode_error("mkv: invalid virtual segment"),
    }
}

fn item<H: ChapterHost + ?Sized>(host: &H, r: ChapterRef) -> Result<&ChapterItem> {
    Ok(tree(&*host, r.vseg)?.item(r.id))
}

/// Returns true if `a` is `b` or one of its ancestors. Chapters of different virtual segments
/// are never related.
fn is_ancestor<H: ChapterHost + ?Sized>(host: &H, a: ChapterRef, b: ChapterRef) -> Result<bool> {
    if a.vseg != b.vseg {
        return Ok(false);
    }
    Ok(tree(&*host, a.vseg)?.is_ancestor_of(a.id, b.id))
}

fn run_codecs<H: ChapterHost + ?Sized>(host: &mut H, r: ChapterRef, trigger: Trigger) -> Result<bool> {
    // The commands may change the chapters, so run a copy.
    let codecs = item(&*host, r)?.codecs.clone();

    let mut result = false;

    for codec in codecs.iter() {
        let commands = match trigger {
            Trigger::Enter => &codec.enter,
            Trigger::Leave => &codec.leave,
        };

        match codec.kind {
            ChapterCodecKind::Dvd => {
                for blob in commands.iter() {
                    if blob.is_empty() {
                        continue;
                    }
                    // The first byte counts the 8 byte commands that follow.
                    let count = usize::from(blob[0]).min((blob.len() - 1) >> 3);
                    for command in blob[1..].chunks_exact(8).take(count) {
                        result |= dvd::interpret(host, command)?;
                    }
                }
            }
            ChapterCodecKind::Script => {
                for command in commands.iter().filter(|c| !c.is_empty()) {
                    result |= script::interpret(host, command)?;
                }
            }
            ChapterCodecKind::Unknown(id) => {
                log::debug!("mkv: ignoring commands of unknown chapter codec {}", id);
            }
        }
    }

    Ok(result)
}

/// Runs the enter commands of a chapter, and of all its sub-chapters if `with_subs` is set.
///
/// Returns true if a command moved playback.
pub fn enter<H: ChapterHost + ?Sized>(host: &mut H, r: ChapterRef, with_subs: bool) -> Result<bool> {
    let mut result = run_codecs(host, r, Trigger::Enter)?;

    if with_subs {
        let children = item(&*host, r)?.children.clone();
        for id in children {
            result |= enter(host, ChapterRef { vseg: r.vseg, id }, true)?;
        }
    }

    Ok(result)
}

/// Runs the leave commands of a chapter, and of all its sub-chapters if `with_subs` is set.
///
/// Returns true if a command moved playback.
pub fn leave<H: ChapterHost + ?Sized>(host: &mut H, r: ChapterRef, with_subs: bool) -> Result<bool> {
    set_leaving(host, r, true);
    let result = leave_inner(host, r, with_subs);
    set_leaving(host, r, false);
    result
}

fn leave_inner<H: ChapterHost + ?Sized>(host: &mut H, r: ChapterRef, with_subs: bool) -> Result<bool> {
    let mut result = run_codecs(host, r, Trigger::Leave)?;

    if with_subs {
        let children = item(&*host, r)?.children.clone();
        for id in children {
            result |= leave(host, ChapterRef { vseg: r.vseg, id }, true)?;
        }
    }

    Ok(result)
}

fn set_leaving<H: ChapterHost + ?Sized>(host: &mut H, r: ChapterRef, leaving: bool) {
    if let Some(tree) = host.chapters_mut(r.vseg) {
        tree.item_mut(r.id).is_leaving = leaving;
    }
}

/// Moves from `current` to `target`: leaves chapters up to their common ancestor, then enters
/// the chapters down to `target`.
///
/// Returns true if a command moved playback, in which case the caller must not seek.
pub fn enter_and_leave<H: ChapterHost + ?Sized>(
    host: &mut H,
    target: ChapterRef,
    current: Option<ChapterRef>,
    final_enter: bool,
) -> Result<bool> {
    let mut common = current;

    while let Some(c) = common {
        if is_ancestor(&*host, c, target)? {
            break;
        }
        if !item(&*host, c)?.is_leaving && leave(host, c, false)? {
            return Ok(true);
        }
        common = item(&*host, c)?.parent.map(|id| ChapterRef { vseg: c.vseg, id });
    }

    if let Some(mut c) = common {
        loop {
            if c == target {
                return enter(host, target, true);
            }

            let children = item(&*host, c)?.children.clone();
            let mut next = None;
            for id in children {
                let child = ChapterRef { vseg: c.vseg, id };
                if is_ancestor(&*host, child, target)? {
                    next = Some(child);
                    break;
                }
            }

            match next {
                Some(child) => {
                    c = child;
                    if c != target && enter(host, c, false)? {
                        return Ok(true);
                    }
                }
                None => break,
            }
        }
    }

    if final_enter {
        enter(host, target, true)
    }
    else {
        Ok(false)
    }
}

/// Searches the current edition of every virtual segment for a DVD chapter matching `m`.
pub(crate) fn browse_all<H: ChapterHost + ?Sized>(host: &H, m: DvdMatch) -> Option<ChapterRef> {
    (0..host.virtual_segment_count()).find_map(|vseg| browse_vseg(&*host, vseg, m))
}

/// Searches the current edition of one virtual segment for a DVD chapter matching `m`.
pub(crate) fn browse_vseg<H: ChapterHost + ?Sized>(host: &H, vseg: usize, m: DvdMatch) -> Option<ChapterRef> {
    let tree = host.chapters(vseg)?;
    tree.browse_edition(host.current_edition(vseg), m).map(|id| ChapterRef { vseg, id })
}

/// Searches a chapter and its sub-chapters for a DVD chapter matching `m`.
pub(crate) fn browse_from<H: ChapterHost + ?Sized>(host: &H, from: ChapterRef, m: DvdMatch) -> Option<ChapterRef> {
    let tree = host.chapters(from.vseg)?;
    tree.browse(from.id, m).map(|id| ChapterRef { vseg: from.vseg, id })
}

/// Finds a chapter by uid in every virtual segment.
pub(crate) fn find_by_uid<H: ChapterHost + ?Sized>(host: &H, uid: u64) -> Option<ChapterRef> {
    (0..host.virtual_segment_count()).find_map(|vseg| {
        host.chapters(vseg)?.find_by_uid(uid).map(|id| ChapterRef { vseg, id })
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::testutil::*;

    /// A host recording the jumps and seeks commands request.
    pub(crate) struct MockHost {
        pub(crate) trees: Vec<ChapterTree>,
        pub(crate) registers: DvdRegisters,
        pub(crate) current: Option<ChapterRef>,
        pub(crate) vseg: usize,
        pub(crate) jumps: Vec<ChapterRef>,
        pub(crate) seeks: Vec<ChapterRef>,
    }

    impl MockHost {
        pub(crate) fn new(trees: Vec<ChapterTree>) -> Self {
            MockHost {
                trees,
                registers: Default::default(),
                current: None,
                vseg: 0,
                jumps: Vec::new(),
                seeks: Vec::new(),
            }
        }

        pub(crate) fn find(&self, uid: u64) -> ChapterRef {
            find_by_uid(self, uid).unwrap()
        }
    }

    impl ChapterHost for MockHost {
        fn registers(&mut self) -> &mut DvdRegisters {
            &mut self.registers
        }

        fn chapters(&self, vseg: usize) -> Option<&ChapterTree> {
            self.trees.get(vseg)
        }

        fn chapters_mut(&mut self, vseg: usize) -> Option<&mut ChapterTree> {
            self.trees.get_mut(vseg)
        }

        fn virtual_segment_count(&self) -> usize {
            self.trees.len()
        }

        fn current_vseg(&self) -> usize {
            self.vseg
        }

        fn current_edition(&self, vseg: usize) -> usize {
            self.trees[vseg].default_edition()
        }

        fn current_chapter(&self) -> Option<ChapterRef> {
            self.current
        }

        fn jump_to(&mut self, target: ChapterRef) -> Result<()> {
            self.jumps.push(target);
            self.vseg = target.vseg;
            self.current = Some(target);
            Ok(())
        }

        fn seek_to_chapter(&mut self, target: ChapterRef) -> Result<()> {
            self.seeks.push(target);
            self.vseg = target.vseg;
            self.current = Some(target);
            Ok(())
        }
    }

    /// A DVD command blob holding the given 8 byte commands.
    pub(crate) fn dvd_blob(commands: &[[u8; 8]]) -> Vec<u8> {
        let mut blob = vec![commands.len() as u8];
        for command in commands {
            blob.extend_from_slice(command);
        }
        blob
    }

    const SEC: u64 = 1_000_000_000;

    fn set_gprm(index: u8, value: u16) -> [u8; 8] {
        let v = value.to_be_bytes();
        [0x53, 0x00, v[0], v[1], 0x00, index, 0x00, 0x00]
    }

    #[test]
    fn verify_enter_and_leave_order() {
        // Leaving A writes GPRM 1, entering B writes GPRM 2, entering B1 writes GPRM 3.
        let dvd = |time: u64, command: [u8; 8]| chap_process(1, &[], &[(time, dvd_blob(&[command]))]);

        let tree = chapter_tree(&[edition(
            1,
            false,
            &[
                chapter_atom(10, 0, Some(SEC), "A", &[dvd(2, set_gprm(1, 1))]),
                chapter_atom(
                    11,
                    SEC,
                    Some(3 * SEC),
                    "B",
                    &[
                        dvd(1, set_gprm(2, 1)),
                        chapter_atom(20, SEC, Some(2 * SEC), "B1", &[dvd(1, set_gprm(3, 1))]),
                    ],
                ),
            ],
        )]);

        let mut host = MockHost::new(vec![tree]);
        let a = host.find(10);
        let b1 = host.find(20);

        assert!(!enter_and_leave(&mut host, b1, Some(a), false).unwrap());
        assert_eq!(host.registers.get_gprm(1), 1);
        assert_eq!(host.registers.get_gprm(2), 1);
        assert_eq!(host.registers.get_gprm(3), 1);
        assert!(!item(&host, a).unwrap().is_leaving);
    }

    #[test]
    fn verify_leaving_chapter_is_not_left_again() {
        let tree = chapter_tree(&[edition(
            1,
            false,
            &[chapter_atom(10, 0, Some(SEC), "A", &[]), chapter_atom(11, SEC, Some(2 * SEC), "B", &[])],
        )]);

        let mut host = MockHost::new(vec![tree]);
        let a = host.find(10);
        let b = host.find(11);

        host.trees[0].item_mut(a.id).is_leaving = true;
        assert!(!enter_and_leave(&mut host, b, Some(a), true).unwrap());
        assert!(host.jumps.is_empty());
    }

    #[test]
    fn verify_dvd_blob_count_is_clamped() {
        let mut blob = dvd_blob(&[set_gprm(4, 9)]);
        // Claim more commands than the blob holds.
        blob[0] = 5;

        let tree = chapter_tree(&[edition(
            1,
            false,
            &[chapter_atom(10, 0, Some(SEC), "A", &[chap_process(1, &[], &[(1, blob)])])],
        )]);

        let mut host = MockHost::new(vec![tree]);
        let a = host.find(10);
        assert!(!enter(&mut host, a, false).unwrap());
        assert_eq!(host.registers.get_gprm(4), 9);
    }
}
