// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A subset of the DVD virtual machine, as found in the chapter codecs of DVD remuxes.
//!
//! Commands are 8 bytes long. The first two bytes form the opcode, optionally combined with a
//! register test that must pass for the command to run. See http://dvd.sourceforge.net/dvdinfo/vmi.html.

use mkvnav_core::errors::Result;

use super::{browse_all, browse_from, browse_vseg, enter, ChapterHost, ChapterRef};

pub const DVD_LEVEL_SS: u8 = 0x30;
pub const DVD_LEVEL_LU: u8 = 0x2A;
pub const DVD_LEVEL_TT: u8 = 0x28;
pub const DVD_LEVEL_PGC: u8 = 0x20;
pub const DVD_LEVEL_PG: u8 = 0x18;
pub const DVD_LEVEL_PTT: u8 = 0x10;
pub const DVD_LEVEL_CN: u8 = 0x08;

const CMD_TEST_VALUE: u16 = 0x80;

const CMD_IF_AND: u16 = 1 << 4;
const CMD_IF_EQUAL: u16 = 2 << 4;
const CMD_IF_NOT_EQUAL: u16 = 3 << 4;
const CMD_IF_SUP_EQUAL: u16 = 4 << 4;
const CMD_IF_SUP: u16 = 5 << 4;
const CMD_IF_INF_EQUAL: u16 = 6 << 4;
const CMD_IF_INF: u16 = 7 << 4;

const CMD_NOP: u16 = 0x0000;
const CMD_GOTO_LINE: u16 = 0x0001;
const CMD_BREAK: u16 = 0x0002;
const CMD_NOP2: u16 = 0x2001;
const CMD_LINK_PGCN: u16 = 0x2004;
const CMD_LINK_CN: u16 = 0x2007;
const CMD_JUMP_TT: u16 = 0x3002;
const CMD_JUMP_VTS_PTT: u16 = 0x3005;
const CMD_JUMP_SS: u16 = 0x3006;
const CMD_CALL_SS_VTSM1: u16 = 0x3008;
const CMD_SET_GPRMMD: u16 = 0x5300;
const CMD_SET_HL_BTNN1: u16 = 0x5600;

/// The general (0..16) and system (0x80..0x95) parameter registers.
#[derive(Clone, Debug)]
pub struct DvdRegisters {
    prm: [u16; 256],
}

impl Default for DvdRegisters {
    fn default() -> Self {
        let mut prm = [0; 256];

        // Power-on values of the system registers.
        prm[0x81] = 15; // channel 15
        prm[0x82] = 62; // channel 62
        prm[0x83] = 1;
        prm[0x84] = 1;
        prm[0x87] = 1;
        prm[0x88] = 1;
        prm[0x90] = 0xFFFF;
        prm[0x92] = 0xFFFF;

        DvdRegisters { prm }
    }
}

impl DvdRegisters {
    pub fn new() -> Self {
        Default::default()
    }

    /// Reads any register. Out of range indices read 0.
    pub fn get_prm(&self, index: usize) -> u16 {
        self.prm.get(index).copied().unwrap_or(0)
    }

    pub fn get_gprm(&self, index: usize) -> u16 {
        if index < 16 {
            self.prm[index]
        }
        else {
            0
        }
    }

    pub fn get_sprm(&self, index: usize) -> u16 {
        if (0x80..0x95).contains(&index) {
            self.prm[index]
        }
        else {
            0
        }
    }

    /// Writes a general register. Returns false if `index` is not one.
    pub fn set_gprm(&mut self, index: usize, value: u16) -> bool {
        if index < 16 {
            self.prm[index] = value;
            true
        }
        else {
            false
        }
    }

    /// Writes one of the writable system registers. Returns false otherwise.
    pub fn set_sprm(&mut self, index: usize, value: u16) -> bool {
        if index > 0x80 && index <= 0x8D && index != 0x8C {
            self.prm[index] = value;
            true
        }
        else {
            false
        }
    }
}

/// A search criterion over the private data of DVD chapter codecs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DvdMatch {
    /// Any DVD domain (first play, video manager, title set).
    IsDomain,
    /// The video manager domain.
    IsVmg,
    /// A video title set.
    VtsNumber(u16),
    /// The menus of a video title set.
    VtsmNumber(u8),
    TitleNumber(u8),
    PgcType(u8),
    PgcNumber(u16),
    ChapterNumber(u8),
    CellNumber(u8),
}

impl DvdMatch {
    pub fn matches(&self, p: &[u8]) -> bool {
        match *self {
            DvdMatch::IsDomain => p.first() == Some(&DVD_LEVEL_SS),
            DvdMatch::IsVmg => p.len() >= 2 && p[0] == DVD_LEVEL_SS && p[1] == 0xC0,
            DvdMatch::VtsNumber(n) => {
                p.len() >= 4 && p[0] == DVD_LEVEL_SS && p[1] == 0x80 && be_u16(p[2], p[3]) == n
            }
            DvdMatch::VtsmNumber(n) => {
                p.len() >= 4 && p[0] == DVD_LEVEL_SS && p[1] == 0x40 && p[3] == n
            }
            DvdMatch::TitleNumber(n) => {
                p.len() >= 4 && p[0] == DVD_LEVEL_TT && be_u16(p[1], p[2]) == u16::from(n)
            }
            DvdMatch::PgcType(n) => p.len() >= 8 && p[0] == DVD_LEVEL_PGC && p[3] & 0x0F == n,
            DvdMatch::PgcNumber(n) => p.len() >= 8 && p[0] == DVD_LEVEL_PGC && be_u16(p[1], p[2]) == n,
            DvdMatch::ChapterNumber(n) => p.len() >= 2 && p[0] == DVD_LEVEL_PTT && p[1] == n,
            DvdMatch::CellNumber(n) => p.len() >= 5 && p[0] == DVD_LEVEL_CN && p[3] == n,
        }
    }
}

#[inline(always)]
fn be_u16(hi: u8, lo: u8) -> u16 {
    (u16::from(hi) << 8) + u16::from(lo)
}

/// Evaluates the register test of a command. Commands without a test always pass.
fn test_registers(regs: &DvdRegisters, cmd: u16, c: &[u8]) -> bool {
    if cmd & 0xF0 == 0 {
        return true;
    }

    let mut test_value = cmd & CMD_TEST_VALUE != 0;

    let (cr1, cr2) = match cmd >> 12 {
        3 | 4 | 5 => {
            test_value = false;
            (c[6], u16::from(c[7]))
        }
        6 | 7 => (c[2], be_u16(c[6], c[7])),
        _ => (c[3], be_u16(c[4], c[5])),
    };

    let value = if test_value { cr2 } else { regs.get_prm(usize::from(cr2)) };
    let reg = regs.get_prm(usize::from(cr1));

    log::trace!("mkv: dvd test {:#x} on register {} against {}", cmd & 0x70, cr1, value);

    match cmd & 0x70 {
        CMD_IF_AND => reg & value != 0,
        CMD_IF_EQUAL => reg == value,
        CMD_IF_NOT_EQUAL => reg != value,
        CMD_IF_SUP_EQUAL => reg >= value,
        CMD_IF_SUP => reg > value,
        CMD_IF_INF_EQUAL => reg <= value,
        CMD_IF_INF => reg < value,
        _ => true,
    }
}

/// Runs the entered chapter unless its own commands moved playback, in which case only the
/// seek is skipped.
fn link<H: ChapterHost + ?Sized>(host: &mut H, target: ChapterRef) -> Result<()> {
    if !enter(host, target, true)? {
        host.seek_to_chapter(target)?;
    }
    Ok(())
}

/// Interprets one 8 byte DVD command. Returns true if the command moved playback.
pub(crate) fn interpret<H: ChapterHost + ?Sized>(host: &mut H, c: &[u8]) -> Result<bool> {
    if c.len() != 8 {
        return Ok(false);
    }

    let cmd = be_u16(c[0], c[1]);

    if !test_registers(host.registers(), cmd, c) {
        return Ok(false);
    }

    // The test is evaluated, strip it.
    let cmd = cmd & 0xFF0F;

    match cmd {
        CMD_NOP | CMD_NOP2 => {
            log::trace!("mkv: dvd nop");
        }
        CMD_BREAK => {
            log::debug!("mkv: dvd break");
        }
        CMD_JUMP_TT => {
            let title = c[5];
            log::debug!("mkv: dvd JumpTT {}", title);

            if let Some(target) = browse_all(&*host, DvdMatch::TitleNumber(title)) {
                host.jump_to(target)?;
                return Ok(true);
            }
        }
        CMD_CALL_SS_VTSM1 => {
            if (c[6] & 0xC0) >> 6 == 0 {
                let pgc_type = c[5] & 0x0F;
                log::debug!("mkv: dvd CallSS pgc type {} (rsm_cell {:#x})", pgc_type, c[4]);

                if let Some(target) = browse_all(&*host, DvdMatch::PgcType(pgc_type)) {
                    host.jump_to(target)?;
                    return Ok(true);
                }
            }
            else {
                log::debug!("mkv: dvd CallSS to unsupported domain {}", (c[6] & 0xC0) >> 6);
            }
        }
        CMD_JUMP_SS => {
            let pgc_type = c[5] & 0x0F;

            match (c[5] & 0xC0) >> 6 {
                1 => {
                    log::debug!("mkv: dvd JumpSS VMGM pgc type {}", pgc_type);

                    if let Some(vmg) = browse_all(&*host, DvdMatch::IsVmg) {
                        if let Some(target) = browse_vseg(&*host, vmg.vseg, DvdMatch::PgcType(pgc_type)) {
                            host.jump_to(target)?;
                            return Ok(true);
                        }
                    }
                }
                2 => {
                    log::debug!("mkv: dvd JumpSS VTSM (vts {}, ttn {}) pgc type {}", c[4], c[3], pgc_type);

                    match browse_all(&*host, DvdMatch::VtsmNumber(c[4])) {
                        Some(vtsm) => {
                            if browse_from(&*host, vtsm, DvdMatch::TitleNumber(c[3])).is_some() {
                                let menu = browse_vseg(&*host, vtsm.vseg, DvdMatch::PgcType(pgc_type));
                                if let Some(target) = menu {
                                    host.jump_to(target)?;
                                    return Ok(true);
                                }
                            }
                            else {
                                log::debug!("mkv: dvd title {} does not exist in this vts", c[3]);
                            }
                        }
                        None => log::debug!("mkv: dvd domain vts {} not found", c[4]),
                    }
                }
                domain => log::debug!("mkv: dvd JumpSS to unsupported domain {}", domain),
            }
        }
        CMD_JUMP_VTS_PTT => {
            let title = c[5];
            let ptt = c[3];
            log::debug!("mkv: dvd JumpVTS title {} ptt {}", title, ptt);

            let vseg = host.current_vseg();

            let domain = match browse_vseg(&*host, vseg, DvdMatch::IsDomain) {
                Some(domain) => domain,
                None => {
                    log::debug!("mkv: dvd JumpVTS_PTT outside of a dvd domain");
                    return Ok(false);
                }
            };

            let current_title = host.chapters(vseg).map_or(-1, |tree| tree.title_number(domain.id));
            if current_title <= 0 {
                log::debug!("mkv: dvd JumpVTS_PTT outside of a vts");
                return Ok(false);
            }

            let vts = match browse_all(&*host, DvdMatch::VtsNumber(current_title as u16)) {
                Some(vts) => vts,
                None => {
                    log::debug!("mkv: dvd domain vts {} not found", current_title);
                    return Ok(false);
                }
            };

            let target = browse_from(&*host, vts, DvdMatch::TitleNumber(title))
                .and_then(|tt| browse_from(&*host, tt, DvdMatch::ChapterNumber(ptt)));

            if let Some(target) = target {
                host.jump_to(target)?;
                return Ok(true);
            }
        }
        CMD_SET_GPRMMD => {
            let index = usize::from(be_u16(c[4], c[5]));
            let value = be_u16(c[2], c[3]);
            log::debug!("mkv: dvd set GPRMMD [{}]={}", index, value);

            if !host.registers().set_gprm(index, value) {
                log::debug!("mkv: dvd set GPRMMD failed");
            }
        }
        CMD_LINK_PGCN => {
            let pgcn = be_u16(c[6], c[7]);
            log::debug!("mkv: dvd LinkPGCN {}", pgcn);

            let vseg = host.current_vseg();
            if let Some(target) = browse_vseg(&*host, vseg, DvdMatch::PgcNumber(pgcn)) {
                link(host, target)?;
                return Ok(true);
            }
        }
        CMD_LINK_CN => {
            let cn = c[7];
            log::debug!("mkv: dvd LinkCN {}", cn);

            let target = host
                .current_chapter()
                .and_then(|current| browse_from(&*host, current, DvdMatch::CellNumber(cn)));

            if let Some(target) = target {
                link(host, target)?;
                return Ok(true);
            }
        }
        CMD_GOTO_LINE => {
            log::debug!("mkv: dvd GotoLine {}", be_u16(c[6], c[7]));
        }
        CMD_SET_HL_BTNN1 => {
            log::debug!("mkv: dvd SetHL_BTN {}", c[4]);
            host.registers().set_sprm(0x88, u16::from(c[4]));
        }
        _ => {
            log::debug!("mkv: unsupported dvd command {:02x?}", c);
        }
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::tests::MockHost;
    use crate::testutil::*;

    const SEC: u64 = 1_000_000_000;

    #[test]
    fn verify_power_on_registers() {
        let regs = DvdRegisters::new();
        assert_eq!(regs.get_sprm(0x81), 15);
        assert_eq!(regs.get_sprm(0x82), 62);
        assert_eq!(regs.get_sprm(0x90), 0xFFFF);
        assert_eq!(regs.get_sprm(0x95), 0);
        assert_eq!(regs.get_gprm(0), 0);
    }

    #[test]
    fn verify_general_registers() {
        let mut regs = DvdRegisters::new();

        assert!(regs.set_gprm(5, 100));
        assert_eq!(regs.get_gprm(5), 100);
        assert_eq!(regs.get_prm(5), 100);

        for index in 16..128 {
            assert!(!regs.set_gprm(index, 1));
            assert_eq!(regs.get_prm(index), 0);
        }
    }

    #[test]
    fn verify_system_registers() {
        let mut regs = DvdRegisters::new();

        assert!(regs.set_sprm(0x88, 3));
        assert_eq!(regs.get_sprm(0x88), 3);
        assert!(!regs.set_sprm(0x80, 1));
        assert!(!regs.set_sprm(0x8C, 1));
        assert!(!regs.set_sprm(0x8E, 1));
        assert_eq!(regs.get_gprm(0x88), 0);
    }

    #[test]
    fn verify_matches() {
        assert!(DvdMatch::IsDomain.matches(&[0x30]));
        assert!(!DvdMatch::IsDomain.matches(&[]));
        assert!(DvdMatch::IsVmg.matches(&[0x30, 0xC0]));
        assert!(DvdMatch::VtsNumber(0x0102).matches(&[0x30, 0x80, 0x01, 0x02]));
        assert!(DvdMatch::VtsmNumber(4).matches(&[0x30, 0x40, 0x00, 0x04]));
        assert!(DvdMatch::TitleNumber(3).matches(&[0x28, 0x00, 0x03, 0x00]));
        assert!(DvdMatch::PgcType(2).matches(&[0x20, 0, 0, 0x82, 0, 0, 0, 0]));
        assert!(!DvdMatch::PgcType(2).matches(&[0x20, 0, 0, 0x82]));
        assert!(DvdMatch::PgcNumber(7).matches(&[0x20, 0, 7, 0, 0, 0, 0, 0]));
        assert!(DvdMatch::ChapterNumber(9).matches(&[0x10, 9]));
        assert!(DvdMatch::CellNumber(2).matches(&[0x08, 0, 0, 2, 0]));
    }

    fn empty_host() -> MockHost {
        MockHost::new(vec![chapter_tree(&[edition(1, false, &[chapter_atom(1, 0, Some(SEC), "A", &[])])])])
    }

    #[test]
    fn verify_set_gprm_command() {
        let mut host = empty_host();

        assert!(!interpret(&mut host, &[0x53, 0x00, 0x01, 0x2C, 0x00, 0x03, 0x00, 0x00]).unwrap());
        assert_eq!(host.registers.get_gprm(3), 300);

        // Out of range writes are refused.
        interpret(&mut host, &[0x53, 0x00, 0x00, 0x01, 0x00, 0x20, 0x00, 0x00]).unwrap();
        assert_eq!(host.registers.get_prm(0x20), 0);
    }

    #[test]
    fn verify_register_test() {
        let mut host = empty_host();
        host.registers.set_gprm(2, 7);
        host.registers.set_gprm(3, 7);

        // Set commands take the tested registers from bytes 6 and 7: if GPRM2 == GPRM3.
        interpret(&mut host, &[0x53, 0x20, 0x00, 0x01, 0x00, 0x01, 0x02, 0x03]).unwrap();
        assert_eq!(host.registers.get_gprm(1), 1);

        // If GPRM2 != GPRM3.
        interpret(&mut host, &[0x53, 0x30, 0x00, 0x05, 0x00, 0x04, 0x02, 0x03]).unwrap();
        assert_eq!(host.registers.get_gprm(4), 0);

        // The immediate flag is ignored for set commands: GPRM2 < GPRM3 fails.
        interpret(&mut host, &[0x53, 0xF0, 0x00, 0x05, 0x00, 0x04, 0x02, 0x03]).unwrap();
        assert_eq!(host.registers.get_gprm(4), 0);
    }

    #[test]
    fn verify_highlight_button() {
        let mut host = empty_host();
        interpret(&mut host, &[0x56, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00]).unwrap();
        assert_eq!(host.registers.get_sprm(0x88), 4);
    }

    #[test]
    fn verify_jump_title() {
        let tt = chap_process(1, &[0x28, 0x00, 0x02, 0x00], &[]);
        let tree = chapter_tree(&[edition(
            1,
            false,
            &[chapter_atom(1, 0, Some(SEC), "A", &[]), chapter_atom(2, SEC, Some(2 * SEC), "T2", &[tt])],
        )]);

        let mut host = MockHost::new(vec![empty_host().trees.remove(0), tree]);

        assert!(interpret(&mut host, &[0x30, 0x02, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00]).unwrap());
        assert_eq!(host.jumps.len(), 1);
        assert_eq!(host.jumps[0].vseg, 1);
        assert_eq!(host.trees[1].item(host.jumps[0].id).uid, Some(2));

        // Unknown titles do nothing.
        assert!(!interpret(&mut host, &[0x30, 0x02, 0x00, 0x00, 0x00, 0x05, 0x00, 0x00]).unwrap());
        assert_eq!(host.jumps.len(), 1);
    }

    #[test]
    fn verify_link_cell_seeks() {
        let cell = chap_process(1, &[0x08, 0x00, 0x00, 0x03, 0x00], &[]);
        let tree = chapter_tree(&[edition(
            1,
            false,
            &[chapter_atom(1, 0, Some(4 * SEC), "P", &[chapter_atom(2, 2 * SEC, Some(4 * SEC), "C", &[cell])])],
        )]);

        let mut host = MockHost::new(vec![tree]);
        host.current = Some(host.find(1));

        assert!(interpret(&mut host, &[0x20, 0x07, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03]).unwrap());
        assert!(host.jumps.is_empty());
        assert_eq!(host.seeks, vec![host.find(2)]);
    }
}
