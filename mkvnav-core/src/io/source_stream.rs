// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::cmp;
use std::io;
use std::io::{Read, Seek};

use super::{MediaSource, ReadBytes, SeekableStream};

const END_OF_STREAM_ERROR_STR: &str = "end of stream";

/// `SourceStreamOptions` specifies the buffering behaviour of a `SourceStream`.
pub struct SourceStreamOptions {
    /// The maximum buffer size. Must be >= 32kB.
    pub buffer_len: usize,
}

impl Default for SourceStreamOptions {
    fn default() -> Self {
        SourceStreamOptions { buffer_len: 64 * 1024 }
    }
}

/// A `SourceStream` is the byte cursor every Matroska segment reads through. It wraps a boxed
/// [`MediaSource`] and hides it behind a read-ahead buffer.
///
/// The read-ahead length starts at 1kB and doubles with every sequential refill until it reaches
/// 32kB. Growing the read-ahead length over time reduces the excess data buffered when the tree
/// walker jumps around the file, which it does a lot while preloading a segment.
///
/// Backward seeks on an unseekable source fail. Forward seeks on an unseekable source are served by
/// reading and discarding.
pub struct SourceStream {
    /// The source reader.
    inner: Box<dyn MediaSource>,
    /// The read-ahead buffer.
    buf: Box<[u8]>,
    /// The read position within the buffer.
    read_pos: usize,
    /// The end of the valid data within the buffer.
    end_pos: usize,
    /// The current block size for a new read.
    read_block_len: usize,
    /// Absolute position of the inner stream.
    abs_pos: u64,
    /// Cached seekability of the inner stream.
    seekable: bool,
}

impl SourceStream {
    const MIN_BLOCK_LEN: usize = 1 * 1024;
    const MAX_BLOCK_LEN: usize = 32 * 1024;

    pub fn new(source: Box<dyn MediaSource>, options: SourceStreamOptions) -> Self {
        let buffer_len = cmp::max(options.buffer_len, Self::MAX_BLOCK_LEN);
        let seekable = source.is_seekable();

        SourceStream {
            inner: source,
            buf: vec![0; buffer_len].into_boxed_slice(),
            read_pos: 0,
            end_pos: 0,
            read_block_len: Self::MIN_BLOCK_LEN,
            abs_pos: 0,
            seekable,
        }
    }

    /// Gets the number of bytes buffered but not yet read.
    pub fn unread_buffer_len(&self) -> usize {
        self.end_pos - self.read_pos
    }

    #[inline(always)]
    fn is_buffer_exhausted(&self) -> bool {
        self.read_pos == self.end_pos
    }

    /// If the buffer has been exhausted, fetch a new block of data to replenish it.
    fn fetch(&mut self) -> io::Result<()> {
        if self.is_buffer_exhausted() {
            let len = cmp::min(self.read_block_len, self.buf.len());

            let actual_read_len = loop {
                match self.inner.read(&mut self.buf[..len]) {
                    Ok(count) => break count,
                    Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => return Err(e),
                }
            };

            self.read_pos = 0;
            self.end_pos = actual_read_len;
            self.abs_pos += actual_read_len as u64;

            self.read_block_len = cmp::min(self.read_block_len << 1, Self::MAX_BLOCK_LEN);
        }

        Ok(())
    }

    /// Like `fetch`, but returns an end-of-stream error if no more data could be fetched.
    fn fetch_or_eof(&mut self) -> io::Result<()> {
        self.fetch()?;

        if self.is_buffer_exhausted() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, END_OF_STREAM_ERROR_STR));
        }

        Ok(())
    }

    /// Resets the read-ahead buffer, and sets the absolute stream position to `pos`.
    fn reset(&mut self, pos: u64) {
        self.read_pos = 0;
        self.end_pos = 0;
        self.read_block_len = Self::MIN_BLOCK_LEN;
        self.abs_pos = pos;
    }
}

impl io::Read for SourceStream {
    fn read(&mut self, mut buf: &mut [u8]) -> io::Result<usize> {
        let read_len = buf.len();

        while !buf.is_empty() {
            self.fetch()?;

            let available = &self.buf[self.read_pos..self.end_pos];
            if available.is_empty() {
                break;
            }

            let count = cmp::min(available.len(), buf.len());
            buf[..count].copy_from_slice(&available[..count]);
            buf = &mut buf[count..];
            self.read_pos += count;
        }

        Ok(read_len - buf.len())
    }
}

impl io::Seek for SourceStream {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        // The inner reader is ahead of this stream by however many bytes are still buffered.
        let pos = match pos {
            io::SeekFrom::Current(0) => return Ok(self.pos()),
            io::SeekFrom::Current(delta_pos) => {
                let delta = delta_pos - self.unread_buffer_len() as i64;
                self.inner.seek(io::SeekFrom::Current(delta))
            }
            _ => self.inner.seek(pos),
        }?;

        self.reset(pos);

        Ok(pos)
    }
}

impl ReadBytes for SourceStream {
    #[inline(always)]
    fn read_byte(&mut self) -> io::Result<u8> {
        if self.is_buffer_exhausted() {
            self.fetch_or_eof()?;
        }

        let value = self.buf[self.read_pos];
        self.read_pos += 1;

        Ok(value)
    }

    fn read_double_bytes(&mut self) -> io::Result<[u8; 2]> {
        let mut bytes = [0; 2];
        for byte in bytes.iter_mut() {
            *byte = self.read_byte()?;
        }
        Ok(bytes)
    }

    fn read_quad_bytes(&mut self) -> io::Result<[u8; 4]> {
        let mut bytes = [0; 4];

        if self.unread_buffer_len() >= 4 {
            bytes.copy_from_slice(&self.buf[self.read_pos..self.read_pos + 4]);
            self.read_pos += 4;
        }
        else {
            for byte in bytes.iter_mut() {
                *byte = self.read_byte()?;
            }
        }

        Ok(bytes)
    }

    fn read_buf(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.read(buf)?;

        // Unlike io::Read, a non-empty read that returns nothing is an end-of-stream error.
        if !buf.is_empty() && read == 0 {
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, END_OF_STREAM_ERROR_STR))
        }
        else {
            Ok(read)
        }
    }

    fn read_buf_exact(&mut self, mut buf: &mut [u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.read(buf) {
                Ok(0) => break,
                Ok(count) => {
                    buf = &mut buf[count..];
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }

        if !buf.is_empty() {
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, END_OF_STREAM_ERROR_STR))
        }
        else {
            Ok(())
        }
    }

    fn ignore_bytes(&mut self, mut count: u64) -> io::Result<()> {
        // Large skips on a seekable source are a seek, not a read.
        if self.seekable && count > self.unread_buffer_len() as u64 + Self::MAX_BLOCK_LEN as u64 {
            let target = self.pos() + count;
            self.seek(io::SeekFrom::Start(target))?;
            return Ok(());
        }

        while count > 0 {
            self.fetch_or_eof()?;
            let discard_count = cmp::min(self.unread_buffer_len() as u64, count);
            self.read_pos += discard_count as usize;
            count -= discard_count;
        }

        Ok(())
    }

    fn pos(&self) -> u64 {
        self.abs_pos - self.unread_buffer_len() as u64
    }
}

impl SeekableStream for SourceStream {
    fn seek_to(&mut self, pos: u64) -> io::Result<u64> {
        let cur = self.pos();

        if pos == cur {
            return Ok(cur);
        }

        // Stay within the buffer whenever the target is already buffered.
        let buffered_start = self.abs_pos - self.end_pos as u64;
        if pos >= buffered_start && pos <= self.abs_pos {
            self.read_pos = (pos - buffered_start) as usize;
            return Ok(pos);
        }

        if self.seekable {
            self.seek(io::SeekFrom::Start(pos))
        }
        else if pos > cur {
            self.ignore_bytes(pos - cur)?;
            Ok(self.pos())
        }
        else {
            Err(io::Error::new(io::ErrorKind::Other, "source does not support backward seeking"))
        }
    }

    fn is_seekable(&self) -> bool {
        self.seekable
    }

    fn byte_len(&self) -> Option<u64> {
        self.inner.byte_len()
    }
}
