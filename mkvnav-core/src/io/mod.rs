// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The byte-level cursors the Matroska engine reads through.
//!
//! Files and live inputs are opened as a [`MediaSource`] and read through a buffered
//! [`SourceStream`]. Block payloads and codec private data already in memory are read with a
//! [`BufReader`]. Both implement [`ReadBytes`] and [`SeekableStream`].

use std::io;

mod buf_reader;
mod source_stream;

pub use buf_reader::BufReader;
pub use source_stream::{SourceStream, SourceStreamOptions};

/// The input a demuxer is opened on: a file, an in-memory buffer, or a live stream.
///
/// Every source implements [`std::io::Seek`], but only those reporting [`is_seekable`] are ever
/// moved backwards. The others are read once, front to back.
///
/// [`is_seekable`]: MediaSource::is_seekable
pub trait MediaSource: io::Read + io::Seek + Send + Sync {
    /// Returns true if the source can be repositioned freely. Called once per opened stream.
    fn is_seekable(&self) -> bool;

    /// The total size of the source, used to bound element sizes and to map percent seeks to a
    /// byte position. `None` for live sources.
    fn byte_len(&self) -> Option<u64>;
}

impl MediaSource for std::fs::File {
    /// Regular files are seekable, pipes and character devices are not.
    fn is_seekable(&self) -> bool {
        // metadata() follows symlinks.
        match self.metadata() {
            Ok(metadata) => metadata.is_file(),
            _ => false,
        }
    }

    /// The file size from its metadata.
    fn byte_len(&self) -> Option<u64> {
        match self.metadata() {
            Ok(metadata) => Some(metadata.len()),
            _ => None,
        }
    }
}

impl<T: std::convert::AsRef<[u8]> + Send + Sync> MediaSource for io::Cursor<T> {
    /// In-memory buffers are always seekable.
    fn is_seekable(&self) -> bool {
        true
    }

    /// The length of the buffer.
    fn byte_len(&self) -> Option<u64> {
        Some(self.get_ref().as_ref().len() as u64)
    }
}

/// Turns any [`std::io::Read`]er, such as standard input or a socket, into an unseekable
/// [`MediaSource`]. Live sources are opened this way; index building then degrades to
/// append-only and percent seeking is unavailable.
pub struct ReadOnlySource<R: io::Read> {
    inner: R,
}

impl<R: io::Read + Send> ReadOnlySource<R> {
    /// Wraps `inner`.
    pub fn new(inner: R) -> Self {
        ReadOnlySource { inner }
    }

    /// Gives the wrapped reader back.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: io::Read + Send + Sync> MediaSource for ReadOnlySource<R> {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

impl<R: io::Read> io::Read for ReadOnlySource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: io::Read> io::Seek for ReadOnlySource<R> {
    fn seek(&mut self, _: io::SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(io::ErrorKind::Other, "source does not support seeking"))
    }
}

/// Forward-only reading of raw bytes and fixed-width numbers.
///
/// EBML payloads are big-endian. The little-endian readers serve the legacy bitmap and waveform
/// headers stored in codec private data.
pub trait ReadBytes {
    fn read_byte(&mut self) -> io::Result<u8>;

    /// Reads two bytes, in stream order.
    fn read_double_bytes(&mut self) -> io::Result<[u8; 2]>;

    /// Reads four bytes, in stream order.
    fn read_quad_bytes(&mut self) -> io::Result<[u8; 4]>;

    /// Reads at most `buf.len()` bytes. Returns how many were read.
    fn read_buf(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Fills `buf` completely. Running out of data is an `UnexpectedEof` error.
    fn read_buf_exact(&mut self, buf: &mut [u8]) -> io::Result<()>;

    #[inline(always)]
    fn read_u8(&mut self) -> io::Result<u8> {
        self.read_byte()
    }

    /// A little-endian `u16`.
    #[inline(always)]
    fn read_u16(&mut self) -> io::Result<u16> {
        Ok(u16::from_le_bytes(self.read_double_bytes()?))
    }

    /// A big-endian `u16`.
    #[inline(always)]
    fn read_be_u16(&mut self) -> io::Result<u16> {
        Ok(u16::from_be_bytes(self.read_double_bytes()?))
    }

    /// A big-endian `i16`, as in block timestamps.
    #[inline(always)]
    fn read_be_i16(&mut self) -> io::Result<i16> {
        Ok(i16::from_be_bytes(self.read_double_bytes()?))
    }

    /// A little-endian `u32`.
    #[inline(always)]
    fn read_u32(&mut self) -> io::Result<u32> {
        Ok(u32::from_le_bytes(self.read_quad_bytes()?))
    }

    /// A little-endian `i32`.
    #[inline(always)]
    fn read_i32(&mut self) -> io::Result<i32> {
        Ok(i32::from_le_bytes(self.read_quad_bytes()?))
    }

    /// A big-endian `f32`, the short form of EBML floats.
    #[inline(always)]
    fn read_be_f32(&mut self) -> io::Result<f32> {
        Ok(f32::from_be_bytes(self.read_quad_bytes()?))
    }

    /// A big-endian `f64`.
    #[inline(always)]
    fn read_be_f64(&mut self) -> io::Result<f64> {
        let mut buf = [0u8; 8];
        self.read_buf_exact(&mut buf)?;
        Ok(f64::from_be_bytes(buf))
    }

    /// Reads `len` bytes into a new buffer. Only for lengths already checked against the data at
    /// hand, element payloads of untrusted size are read in chunks instead.
    fn read_boxed_slice_exact(&mut self, len: usize) -> io::Result<Box<[u8]>> {
        let mut buf = vec![0u8; len];
        self.read_buf_exact(&mut buf)?;
        Ok(buf.into_boxed_slice())
    }

    /// Skips `count` bytes.
    fn ignore_bytes(&mut self, count: u64) -> io::Result<()>;

    /// The absolute byte offset of the next read.
    fn pos(&self) -> u64;
}

impl<R: ReadBytes> ReadBytes for &mut R {
    #[inline(always)]
    fn read_byte(&mut self) -> io::Result<u8> {
        (*self).read_byte()
    }

    #[inline(always)]
    fn read_double_bytes(&mut self) -> io::Result<[u8; 2]> {
        (*self).read_double_bytes()
    }

    #[inline(always)]
    fn read_quad_bytes(&mut self) -> io::Result<[u8; 4]> {
        (*self).read_quad_bytes()
    }

    #[inline(always)]
    fn read_buf(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (*self).read_buf(buf)
    }

    #[inline(always)]
    fn read_buf_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        (*self).read_buf_exact(buf)
    }

    #[inline(always)]
    fn ignore_bytes(&mut self, count: u64) -> io::Result<()> {
        (*self).ignore_bytes(count)
    }

    #[inline(always)]
    fn pos(&self) -> u64 {
        (**self).pos()
    }
}

/// A `SeekableStream` is a [`ReadBytes`] stream that can also be repositioned and that may know
/// its total length. This is the cursor the tree walker and the seek machinery operate on.
pub trait SeekableStream: ReadBytes {
    /// Repositions the stream at the absolute byte offset `pos`. Forward moves on unseekable
    /// streams are served by reading and discarding.
    fn seek_to(&mut self, pos: u64) -> io::Result<u64>;

    /// Returns if the stream can move backwards.
    fn is_seekable(&self) -> bool;

    /// Returns the total length of the stream, if known.
    fn byte_len(&self) -> Option<u64>;
}

impl<S: SeekableStream> SeekableStream for &mut S {
    fn seek_to(&mut self, pos: u64) -> io::Result<u64> {
        (*self).seek_to(pos)
    }

    fn is_seekable(&self) -> bool {
        (**self).is_seekable()
    }

    fn byte_len(&self) -> Option<u64> {
        (**self).byte_len()
    }
}
