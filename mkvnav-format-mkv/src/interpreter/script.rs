// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Matroska script chapter codec. The only command is `GotoAndPlay(uid)`.

use mkvnav_core::errors::Result;

use super::{enter_and_leave, find_by_uid, ChapterHost};

const GOTO_AND_PLAY: &str = "GotoAndPlay";

/// Parses a leading decimal integer: optional whitespace and sign, then
/// digits up to the first non-digit. Anything else yields 0.
fn parse_leading_int(s: &str) -> i64 {
    let s = s.trim_start();

    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let value = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, d| acc.wrapping_mul(10).wrapping_add(i64::from(d - b'0')));

    if negative {
        -value
    }
    else {
        value
    }
}

/// Extracts the argument of a `GotoAndPlay` command.
fn goto_and_play_arg(command: &str) -> Option<&str> {
    let rest = command.strip_prefix(GOTO_AND_PLAY)?;

    let arg = match rest.find('(') {
        Some(open) => &rest[open + 1..],
        None => "",
    };

    Some(match arg.find(')') {
        Some(close) => &arg[..close],
        None => arg,
    })
}

/// Interprets one script command. Returns true if the command moved playback.
pub(crate) fn interpret<H: ChapterHost + ?Sized>(host: &mut H, command: &[u8]) -> Result<bool> {
    let command = match command.iter().position(|b| *b == 0) {
        Some(nul) => &command[..nul],
        None => command,
    };

    let command = String::from_utf8_lossy(command);

    log::debug!("mkv: script command: {}", command);

    let arg = match goto_and_play_arg(&command) {
        Some(arg) => arg,
        None => {
            log::debug!("mkv: unsupported script command");
            return Ok(false);
        }
    };

    let uid = parse_leading_int(arg) as u64;

    let target = match find_by_uid(&*host, uid) {
        Some(target) => target,
        None => {
            log::debug!("mkv: chapter {} not found", uid);
            return Ok(false);
        }
    };

    let current = host.current_chapter();
    if !enter_and_leave(host, target, current, true)? {
        host.seek_to_chapter(target)?;
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::tests::MockHost;
    use crate::testutil::*;

    const SEC: u64 = 1_000_000_000;

    fn host() -> MockHost {
        MockHost::new(vec![chapter_tree(&[edition(
            1,
            true,
            &[
                chapter_atom(7, 0, Some(SEC), "A", &[]),
                chapter_atom(42, 0, Some(2 * SEC), "B", &[]),
            ],
        )])])
    }

    #[test]
    fn verify_leading_int_parsing() {
        assert_eq!(parse_leading_int("42"), 42);
        assert_eq!(parse_leading_int(" 12abc"), 12);
        assert_eq!(parse_leading_int("-3"), -3);
        assert_eq!(parse_leading_int("abc"), 0);
        assert_eq!(parse_leading_int(""), 0);
    }

    #[test]
    fn verify_argument_extraction() {
        assert_eq!(goto_and_play_arg("GotoAndPlay(42)"), Some("42"));
        assert_eq!(goto_and_play_arg("GotoAndPlay( 42 )"), Some(" 42 "));
        assert_eq!(goto_and_play_arg("GotoAndPlay(42"), Some("42"));
        assert_eq!(goto_and_play_arg("Play(42)"), None);
    }

    #[test]
    fn verify_goto_and_play_seeks() {
        let mut host = host();

        assert!(interpret(&mut host, b"GotoAndPlay(42)\0junk").unwrap());
        assert_eq!(host.seeks.len(), 1);
        assert_eq!(host.trees[0].item(host.seeks[0].id).uid, Some(42));
    }

    #[test]
    fn verify_missing_chapter_is_ignored() {
        let mut host = MockHost::new(vec![chapter_tree(&[edition(
            1,
            false,
            &[chapter_atom(7, 0, Some(SEC), "A", &[])],
        )])]);

        assert!(!interpret(&mut host, b"GotoAndPlay(42)").unwrap());
        assert!(host.seeks.is_empty());
        assert!(host.jumps.is_empty());
        assert!(host.current.is_none());
        assert_eq!(host.registers.get_gprm(0), 0);
    }

    #[test]
    fn verify_other_commands_are_ignored() {
        let mut host = host();
        assert!(!interpret(&mut host, b"Stop()").unwrap());
        assert!(host.seeks.is_empty());
    }
}
