// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `errors` module defines the common error type and the diagnostics collector.

use std::error;
use std::fmt;
use std::io;
use std::result;

/// `SeekErrorKind` is a list of generic reasons why a seek may fail.
#[derive(Debug)]
pub enum SeekErrorKind {
    /// The stream is not seekable at all.
    Unseekable,
    /// The stream can only be seeked forward.
    ForwardOnly,
    /// The timestamp or position to seek to is out of range.
    OutOfRange,
    /// There is no segment to seek in.
    NoSegment,
}

impl SeekErrorKind {
    fn as_str(&self) -> &'static str {
        match *self {
            SeekErrorKind::Unseekable => "stream is not seekable",
            SeekErrorKind::ForwardOnly => "stream can only be seeked forward",
            SeekErrorKind::OutOfRange => "requested seek target is out-of-range for stream",
            SeekErrorKind::NoSegment => "no segment is selected",
        }
    }
}

/// `Error` provides an enumeration of all possible errors reported by mkvnav.
#[derive(Debug)]
pub enum Error {
    /// An IO error occured while reading or seeking the stream.
    IoError(std::io::Error),
    /// The stream contained a malformed element and could not be demuxed.
    DecodeError(&'static str),
    /// The stream could not be seeked.
    SeekError(SeekErrorKind),
    /// An unsupported container or codec feature was encounted.
    Unsupported(&'static str),
    /// A default or user-defined limit was reached while demuxing the stream. Limits are used to
    /// bound element nesting and seek head redirections in malicious streams.
    LimitError(&'static str),
    /// The operation was aborted through an [`AbortHandle`](crate::abort::AbortHandle).
    Cancelled,
}

impl Error {
    /// Returns `true` if the error signals the normal end of the stream.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Error::IoError(err) if err.kind() == io::ErrorKind::UnexpectedEof)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::IoError(ref err) => err.fmt(f),
            Error::DecodeError(msg) => {
                write!(f, "malformed stream: {}", msg)
            }
            Error::SeekError(ref kind) => {
                write!(f, "seek error: {}", kind.as_str())
            }
            Error::Unsupported(feature) => {
                write!(f, "unsupported feature: {}", feature)
            }
            Error::LimitError(constraint) => {
                write!(f, "limit reached: {}", constraint)
            }
            Error::Cancelled => {
                write!(f, "operation cancelled")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::IoError(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Convenience function to create a decode error.
pub fn decode_error<T>(desc: &'static str) -> Result<T> {
    Err(Error::DecodeError(desc))
}

/// Convenience function to create a seek error.
pub fn seek_error<T>(kind: SeekErrorKind) -> Result<T> {
    Err(Error::SeekError(kind))
}

/// Convenience function to create an unsupport feature error.
pub fn unsupported_error<T>(feature: &'static str) -> Result<T> {
    Err(Error::Unsupported(feature))
}

/// Convenience function to create a limit error.
pub fn limit_error<T>(constraint: &'static str) -> Result<T> {
    Err(Error::LimitError(constraint))
}

/// Convenience function to create a cancellation error.
pub fn cancelled_error<T>() -> Result<T> {
    Err(Error::Cancelled)
}

/// Convenience function to create an end-of-stream error.
pub fn end_of_stream_error<T>() -> Result<T> {
    Err(Error::IoError(io::Error::new(io::ErrorKind::UnexpectedEof, "end of stream")))
}

/// The kind of a recoverable (or segment-fatal) problem found while demuxing.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// A truncated variable size integer, or an element whose size exceeds its container.
    MalformedElement,
    /// A track with a codec that cannot be described.
    UnsupportedCodec,
    /// A track using a compression method that is not supported. The track was dropped.
    UnsupportedCompression,
    /// A second occurence of a top-level element that may only be loaded once.
    DuplicateTopLevelElement,
    /// The element nesting bound, or the seek head redirection bound, was exceeded.
    DepthExceeded,
    /// No cluster could be found in a segment.
    NoCluster,
    /// The end of a segment was reached.
    EndOfStream,
    /// A seek head entry did not point at a valid element.
    BrokenSeekHead,
    /// A block was found outside of the cluster it was expected in.
    LostCluster,
}

/// A structured report of a format problem and where it occured.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    /// What went wrong.
    pub kind: DiagnosticKind,
    /// Absolute byte offset of the offending element, or the stream position at the time.
    pub offset: u64,
    /// A short description.
    pub message: &'static str,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} at {:#x}: {}", self.kind, self.offset, self.message)
    }
}

/// Collects [`Diagnostic`]s. Every report is also logged.
#[derive(Clone, Debug, Default)]
pub struct Diagnostics {
    reports: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics { reports: Vec::new() }
    }

    /// Record a diagnostic.
    pub fn report(&mut self, kind: DiagnosticKind, offset: u64, message: &'static str) {
        match kind {
            DiagnosticKind::EndOfStream => log::debug!("mkv: {} (offset {:#x})", message, offset),
            DiagnosticKind::DepthExceeded | DiagnosticKind::NoCluster => {
                log::error!("mkv: {} (offset {:#x})", message, offset)
            }
            _ => log::warn!("mkv: {} (offset {:#x})", message, offset),
        }
        self.reports.push(Diagnostic { kind, offset, message });
    }

    /// Moves all the reports of `other` into this collector.
    pub fn append(&mut self, other: &mut Diagnostics) {
        self.reports.append(&mut other.reports);
    }

    /// Gets all recorded reports in the order they were made.
    pub fn reports(&self) -> &[Diagnostic] {
        &self.reports
    }

    /// Returns `true` if a report of the given kind was made.
    pub fn contains(&self, kind: DiagnosticKind) -> bool {
        self.reports.iter().any(|d| d.kind == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn clear(&mut self) {
        self.reports.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_end_of_stream_detection() {
        let err = end_of_stream_error::<()>().unwrap_err();
        assert!(err.is_end_of_stream());
        assert!(!Error::DecodeError("x").is_end_of_stream());
        assert!(!Error::IoError(io::Error::new(io::ErrorKind::Other, "x")).is_end_of_stream());
    }

    #[test]
    fn verify_diagnostics_collect_in_order() {
        let mut diag = Diagnostics::new();
        diag.report(DiagnosticKind::BrokenSeekHead, 0x40, "broken seek head");
        diag.report(DiagnosticKind::LostCluster, 0x80, "lost cluster");

        assert_eq!(diag.reports().len(), 2);
        assert_eq!(diag.reports()[0].offset, 0x40);
        assert!(diag.contains(DiagnosticKind::LostCluster));
        assert!(!diag.contains(DiagnosticKind::NoCluster));

        let mut other = Diagnostics::new();
        other.report(DiagnosticKind::NoCluster, 0, "no cluster");
        diag.append(&mut other);
        assert!(other.is_empty());
        assert_eq!(diag.reports()[2].kind, DiagnosticKind::NoCluster);
    }
}
