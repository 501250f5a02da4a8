// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `util` module provides a repository of commonly used utility functions sorted into distinct
//! categories.

pub mod bits {
    //! Utilities for bit manipulation.

    /// Sign extends an arbitrary, 64-bit or less, signed two's complement integer stored within an
    /// u64 to a full width i64.
    #[inline(always)]
    pub fn sign_extend_leq64_to_i64(value: u64, width: u32) -> i64 {
        // Rust uses an arithmetic shift right (the original sign bit is repeatedly shifted on) for
        // signed integer types. Therefore, shift the value to the right-hand side of the integer,
        // then shift it back to extend the sign bit.
        (value.wrapping_shl(64 - width) as i64).wrapping_shr(64 - width)
    }
}

pub mod time {
    //! Utilities for converting between the time units found in a Matroska file.
    //!
    //! Matroska stores times as integer ticks of a per-segment scale expressed in nanoseconds.
    //! Everything user facing is expressed in microseconds.

    /// Converts `ticks` of `scale` nanoseconds each into microseconds.
    #[inline]
    pub fn ticks_to_us(ticks: i64, scale: u64) -> i64 {
        ((ticks as i128 * scale as i128) / 1000) as i64
    }

    /// Converts nanoseconds to microseconds.
    #[inline]
    pub fn ns_to_us(ns: i64) -> i64 {
        ns / 1000
    }

    /// Converts a floating-point duration in ticks of `scale` nanoseconds into microseconds.
    #[inline]
    pub fn float_ticks_to_us(ticks: f64, scale: u64) -> i64 {
        (ticks * scale as f64 / 1000.0) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::bits::sign_extend_leq64_to_i64;
    use super::time::*;

    #[test]
    fn verify_sign_extend() {
        assert_eq!(sign_extend_leq64_to_i64(0xff, 8), -1);
        assert_eq!(sign_extend_leq64_to_i64(0x7f, 8), 127);
        assert_eq!(sign_extend_leq64_to_i64(0xfffe, 16), -2);
        assert_eq!(sign_extend_leq64_to_i64(0x1234, 64), 0x1234);
    }

    #[test]
    fn verify_time_conversions() {
        assert_eq!(ticks_to_us(1500, 1_000_000), 1_500_000);
        assert_eq!(ns_to_us(2_000_999), 2000);
        assert_eq!(float_ticks_to_us(2.5, 1_000_000), 2500);
    }
}
