// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use mkvnav_core::errors::{decode_error, Error, Result};
use mkvnav_core::io::ReadBytes;
use mkvnav_core::util::bits::sign_extend_leq64_to_i64;

use crate::element_ids::{ElementType, Type, ELEMENTS};
use crate::elements::EbmlHeaderElement;

/// Reads a single EBML element ID (as in RFC8794) from the stream
/// and returns its value, length in bytes (1-4 bytes)
/// and a flag indicating whether any data was ignored, or an error.
#[allow(clippy::never_loop)]
pub(crate) fn read_tag<R: ReadBytes>(mut reader: R) -> Result<(u32, u32, bool)> {
    // Try to read a tag at current reader position.
    loop {
        let byte = reader.read_byte()?;
        let remaining_octets = byte.leading_zeros();
        if remaining_octets > 3 {
            // First byte should be ignored since we know it could not start a tag.
            // We immediately proceed to seek a first valid tag.
            break;
        }

        // Read remaining octets
        let mut vint = u32::from(byte);
        for _ in 0..remaining_octets {
            let byte = reader.read_byte()?;
            vint = (vint << 8) | u32::from(byte);
        }

        return Ok((vint, remaining_octets + 1, false));
    }

    // Seek to next supported tag of a top level element (`Cluster`, `Info`, etc.)
    let mut tag = 0u32;
    loop {
        let ty = ELEMENTS.get(&tag).map(|(_, ty)| ty).filter(|ty| ty.is_top_level());

        if let Some(ty) = ty {
            log::info!("mkv: found next supported tag {:08X} ({:?})", tag, ty);
            return Ok((tag, 4, true));
        }
        tag = (tag << 8) | u32::from(reader.read_u8()?);
    }
}

/// Reads an element size. Returns `None` for the reserved "unknown size" value (all value bits
/// set), which live streams use for segments and clusters.
pub(crate) fn read_size<R: ReadBytes>(reader: R) -> Result<Option<u64>> {
    let (size, len) = read_vint(reader)?;
    if size == (1u64 << (7 * len)) - 1 {
        return Ok(None);
    }
    Ok(Some(size))
}

/// Reads a single unsigned variable size integer (as in RFC8794) from the stream
/// and returns it or an error.
pub(crate) fn read_unsigned_vint<R: ReadBytes>(reader: R) -> Result<u64> {
    Ok(read_vint(reader)?.0)
}

/// Reads a single signed variable size integer (as in RFC8794) from the stream
/// and returns it or an error.
pub(crate) fn read_signed_vint<R: ReadBytes>(mut reader: R) -> Result<i64> {
    let (value, len) = read_vint(&mut reader)?;
    // Convert to a signed integer by range shifting.
    let half_range = i64::pow(2, (len * 7) - 1) - 1;
    Ok(value as i64 - half_range)
}

/// Reads a single unsigned variable size integer (as in RFC8794) from the stream
/// and returns both its value and length in octects, or an error.
fn read_vint<R: ReadBytes>(mut reader: R) -> Result<(u64, u32)> {
    let byte = reader.read_byte()?;

    // A zero first octet would announce a length over 8 octets.
    if byte == 0 {
        return decode_error("mkv: invalid variable size integer");
    }

    let vint_width = byte.leading_zeros();
    let mut vint = u64::from(byte);
    // Clear VINT_MARKER bit
    vint ^= 1 << (7 - vint_width);

    // Read remaining octets
    for _ in 0..vint_width {
        let byte = reader.read_byte()?;
        vint = (vint << 8) | u64::from(byte);
    }

    Ok((vint, vint_width + 1))
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ElementHeader {
    /// The element tag.
    pub tag: u32,
    /// The element type.
    pub etype: ElementType,
    /// The element's offset in the stream.
    pub pos: u64,
    /// The total size of the element including the header. For elements of unknown size this is
    /// the size of the header only.
    pub len: u64,
    /// The element's data offset in the stream.
    pub data_pos: u64,
    /// The size of the payload data, 0 if unknown.
    pub data_len: u64,
    /// The element was written with the reserved "unknown size".
    pub unknown_size: bool,
}

impl ElementHeader {
    /// Reads a single EBML element header from the stream.
    pub(crate) fn read<R: ReadBytes>(mut reader: &mut R) -> Result<(ElementHeader, bool)> {
        let (tag, tag_len, reset) = read_tag(&mut reader)?;
        let header_start = reader.pos() - u64::from(tag_len);

        let size = read_size(&mut reader)?;
        let data_len = size.unwrap_or(0);

        Ok((
            ElementHeader {
                tag,
                etype: ELEMENTS.get(&tag).map_or(ElementType::Unknown, |(_, etype)| *etype),
                pos: header_start,
                len: reader.pos() - header_start + data_len,
                data_pos: reader.pos(),
                data_len,
                unknown_size: size.is_none(),
            },
            reset,
        ))
    }

    /// Returns an iterator over child elements of the current element.
    pub(crate) fn children<R: ReadBytes>(&self, reader: R) -> ElementIterator<R> {
        debug_assert_eq!(reader.pos(), self.data_pos, "unexpected position");
        ElementIterator::new_of(reader, *self)
    }

    /// Gets the position immediately past the last byte of the element, if its size is known.
    pub(crate) fn end(&self) -> Option<u64> {
        if self.unknown_size {
            None
        }
        else {
            Some(self.data_pos + self.data_len)
        }
    }
}

pub trait Element: Sized {
    const ID: ElementType;
    fn read<B: ReadBytes>(reader: &mut B, header: ElementHeader) -> Result<Self>;
}

#[derive(Debug)]
pub(crate) struct EbmlElement {
    pub(crate) header: EbmlHeaderElement,
}

impl Element for EbmlElement {
    const ID: ElementType = ElementType::Ebml;

    fn read<B: ReadBytes>(reader: &mut B, header: ElementHeader) -> Result<Self> {
        Ok(Self { header: EbmlHeaderElement::read(reader, header)? })
    }
}

/// Reads the primitive data of the element described by `header`. The stream must be positioned
/// at the start of the element's data. Returns `None` for master and unknown elements, leaving the
/// stream untouched.
pub(crate) fn read_data<R: ReadBytes>(
    reader: &mut R,
    header: &ElementHeader,
) -> Result<Option<ElementData>> {
    let ty = match ELEMENTS.get(&header.tag) {
        Some((ty, _)) => *ty,
        None => return Ok(None),
    };

    let data = match ty {
        Type::Master => return Ok(None),
        Type::Unsigned => {
            if header.data_len > 8 {
                reader.ignore_bytes(header.data_len)?;
                return decode_error("mkv: invalid unsigned integer length");
            }

            let mut buff = [0u8; 8];
            let offset = 8 - header.data_len as usize;
            reader.read_buf_exact(&mut buff[offset..])?;
            ElementData::UnsignedInt(u64::from_be_bytes(buff))
        }
        Type::Signed | Type::Date => {
            if header.data_len > 8 {
                reader.ignore_bytes(header.data_len)?;
                return decode_error("mkv: invalid signed integer length");
            }

            let len = header.data_len as usize;
            let mut buff = [0u8; 8];
            reader.read_buf_exact(&mut buff[8 - len..])?;
            let value = match len {
                0 => 0,
                _ => sign_extend_leq64_to_i64(u64::from_be_bytes(buff), (len as u32) * 8),
            };

            if ty == Type::Date {
                ElementData::Date(value)
            }
            else {
                ElementData::SignedInt(value)
            }
        }
        Type::Float => {
            let value = match header.data_len {
                0 => 0.0,
                4 => reader.read_be_f32()? as f64,
                8 => reader.read_be_f64()?,
                _ => {
                    reader.ignore_bytes(header.data_len)?;
                    return decode_error("mkv: invalid float length");
                }
            };
            ElementData::Float(value)
        }
        Type::String => {
            let data = read_payload(reader, header.data_len)?;
            let bytes = data.split(|b| *b == 0).next().unwrap_or(&data);
            ElementData::String(String::from_utf8_lossy(bytes).into_owned())
        }
        Type::Binary => {
            ElementData::Binary(read_payload(reader, header.data_len)?)
        }
    };

    Ok(Some(data))
}

/// Largest buffer committed before the bytes backing it were actually read.
const PAYLOAD_CHUNK_LEN: usize = 64 * 1024;

/// Reads `len` bytes of element payload. The buffer grows as data arrives, so a bogus size
/// ends in an end-of-stream error instead of a huge allocation.
pub(crate) fn read_payload<R: ReadBytes>(reader: &mut R, len: u64) -> Result<Box<[u8]>> {
    let mut buf = Vec::with_capacity(len.min(PAYLOAD_CHUNK_LEN as u64) as usize);

    while (buf.len() as u64) < len {
        let start = buf.len();
        let chunk = (len - start as u64).min(PAYLOAD_CHUNK_LEN as u64) as usize;
        buf.resize(start + chunk, 0);
        reader.read_buf_exact(&mut buf[start..])?;
    }

    Ok(buf.into_boxed_slice())
}

/// Reads the element described by `header` as an unsigned integer.
pub(crate) fn read_unsigned<R: ReadBytes>(reader: &mut R, header: &ElementHeader) -> Result<u64> {
    match read_data(reader, header)? {
        Some(ElementData::UnsignedInt(value)) => Ok(value),
        _ => decode_error("mkv: expected an unsigned int"),
    }
}

/// Reads the element described by `header` as a signed integer.
pub(crate) fn read_signed<R: ReadBytes>(reader: &mut R, header: &ElementHeader) -> Result<i64> {
    match read_data(reader, header)? {
        Some(ElementData::SignedInt(value)) => Ok(value),
        _ => decode_error("mkv: expected a signed int"),
    }
}

pub(crate) struct ElementIterator<R: ReadBytes> {
    /// Reader of the stream containing this element.
    reader: R,
    /// Store current element header (for sanity check purposes).
    current: Option<ElementHeader>,
    /// Position of the next element header that would be read.
    next_pos: u64,
    /// Position immediately past last byte of this element.
    end: Option<u64>,
}

impl<R: ReadBytes> ElementIterator<R> {
    /// Creates a new iterator over elements starting from the current stream position.
    pub(crate) fn new(reader: R, end: Option<u64>) -> Self {
        let pos = reader.pos();
        Self { reader, current: None, next_pos: pos, end }
    }

    /// Creates a new iterator over children of the given parent element.
    fn new_of(reader: R, parent: ElementHeader) -> Self {
        Self { reader, current: Some(parent), next_pos: parent.data_pos, end: parent.end() }
    }

    /// Consumes this iterator and return the original stream.
    pub(crate) fn into_inner(self) -> R {
        self.reader
    }

    /// Reads a single element header and moves to its next sibling by ignoring all the children.
    pub(crate) fn read_header(&mut self) -> Result<Option<ElementHeader>> {
        let header = self.read_header_no_consume()?;
        if let Some(header) = &header {
            // Move to next sibling.
            self.next_pos = header.pos + header.len;
        }
        Ok(header)
    }

    /// Reads element header at the current stream position
    /// without moving to the end of the parent element.
    /// Returns [None] if the current element has no more children or reached end of the stream.
    fn read_header_no_consume(&mut self) -> Result<Option<ElementHeader>> {
        let pos = self.reader.pos();
        if pos < self.next_pos {
            // Ignore bytes that were not read
            self.reader.ignore_bytes(self.next_pos - pos)?;
        }

        if self.reader.pos() < self.end.unwrap_or(u64::MAX) {
            let (header, reset) = ElementHeader::read(&mut self.reader)?;
            if reset {
                // After finding a new top-level element in a broken stream
                // it is necessary to update `next_pos` so it refers to a position
                // of a child header.
                self.next_pos = self.reader.pos();
            }

            if let Some(end) = self.end {
                if header.pos + header.len > end {
                    log::debug!("element {:?} overruns its parent ending at {}", header, end);
                    return decode_error("mkv: element size exceeds its parent");
                }
            }

            self.current = Some(header);
            return Ok(Some(header));
        }

        Ok(None)
    }

    /// Reads data of current element. Must be used after [Self::read_header].
    pub(crate) fn read_element_data<E: Element>(&mut self) -> Result<E> {
        let header = self.current.ok_or(Error::DecodeError("mkv: not in an element"))?;

        // Ensure the EBML element header has the same element type as the one being read.
        if header.etype != E::ID {
            return decode_error("mkv: unexpected EBML element");
        }

        let element = E::read(&mut self.reader, header)?;
        // Update position to match the position element reader finished at
        self.next_pos = self.reader.pos();
        Ok(element)
    }

    /// Reads the current element with the provided function instead of an [`Element`]
    /// implementation. Recursive elements (chapter atoms, simple tags) use this to carry their
    /// nesting depth along.
    pub(crate) fn read_element_with<T, F>(&mut self, read: F) -> Result<T>
    where
        F: FnOnce(&mut R, ElementHeader) -> Result<T>,
    {
        let header = self.current.ok_or(Error::DecodeError("mkv: not in an element"))?;
        let value = read(&mut self.reader, header)?;
        self.next_pos = self.reader.pos();
        Ok(value)
    }

    /// Reads a collection of element with the given type.
    pub(crate) fn read_elements<E: Element>(&mut self) -> Result<Box<[E]>> {
        let mut elements = vec![];
        while let Some(header) = self.read_header()? {
            if header.etype == ElementType::Crc32 || header.etype == ElementType::Void {
                continue;
            }

            if header.etype != E::ID {
                log::warn!("found element with invalid type {:?}", header);
                self.ignore_data()?;
                continue;
            }

            elements.push(E::read(&mut self.reader, header)?);
        }
        Ok(elements.into_boxed_slice())
    }

    /// Reads any primitive data inside of the current element.
    pub(crate) fn read_data(&mut self) -> Result<ElementData> {
        let hdr = self.current.ok_or(Error::DecodeError("mkv: not in an element"))?;
        let value = read_data(&mut self.reader, &hdr)?
            .ok_or(Error::DecodeError("mkv: element has no primitive data"))?;
        Ok(value)
    }

    /// Reads data of the current element as an unsigned integer.
    pub(crate) fn read_u64(&mut self) -> Result<u64> {
        match self.read_data()? {
            ElementData::UnsignedInt(s) => Ok(s),
            _ => Err(Error::DecodeError("mkv: expected an unsigned int")),
        }
    }

    /// Reads data of the current element as a signed integer or date.
    pub(crate) fn read_i64(&mut self) -> Result<i64> {
        match self.read_data()? {
            ElementData::SignedInt(s) | ElementData::Date(s) => Ok(s),
            _ => Err(Error::DecodeError("mkv: expected a signed int")),
        }
    }

    /// Reads data of the current element as a floating-point number.
    pub(crate) fn read_f64(&mut self) -> Result<f64> {
        match self.read_data()? {
            ElementData::Float(s) => Ok(s),
            _ => Err(Error::DecodeError("mkv: expected a float")),
        }
    }

    /// Reads data of the current element as a string.
    pub(crate) fn read_string(&mut self) -> Result<String> {
        match self.read_data()? {
            ElementData::String(s) => Ok(s),
            _ => Err(Error::DecodeError("mkv: expected a string")),
        }
    }

    /// Reads binary data of the current element as boxed slice.
    pub(crate) fn read_boxed_slice(&mut self) -> Result<Box<[u8]>> {
        match self.read_data()? {
            ElementData::Binary(b) => Ok(b),
            _ => Err(Error::DecodeError("mkv: expected binary data")),
        }
    }

    /// Reads a flag stored as an unsigned integer.
    pub(crate) fn read_flag(&mut self) -> Result<bool> {
        Ok(self.read_u64()? != 0)
    }

    /// Ignores content of the current element.
    pub(crate) fn ignore_data(&mut self) -> Result<()> {
        if let Some(header) = self.current {
            log::debug!("ignoring data of {:?} element", header.etype);
            let pos = self.reader.pos();
            if let Some(end) = header.end() {
                if end > pos {
                    self.reader.ignore_bytes(end - pos)?;
                }
                self.next_pos = end;
            }
        }
        Ok(())
    }

    /// Gets the position of the underlying stream.
    pub(crate) fn pos(&self) -> u64 {
        self.reader.pos()
    }
}

/// An EBML element data.
#[derive(Clone, Debug)]
pub(crate) enum ElementData {
    /// A binary buffer.
    Binary(Box<[u8]>),
    /// A floating point number.
    Float(f64),
    /// A signed integer.
    SignedInt(i64),
    /// A string.
    String(String),
    /// An unsigned integer.
    UnsignedInt(u64),
    /// A point in time referenced in nanoseconds from the precise beginning
    /// of the third millennium of the Gregorian Calendar in Coordinated Universal Time
    /// (also known as 2001-01-01T00:00:00.000000000 UTC).
    Date(i64),
}

#[cfg(test)]
mod tests {
    use mkvnav_core::io::BufReader;

    use super::{
        read_data, read_payload, read_signed_vint, read_size, read_tag, read_unsigned_vint,
        ElementHeader,
    };
    use crate::element_ids::ElementType;

    #[test]
    fn element_tag_parsing() {
        assert_eq!(read_tag(BufReader::new(&[0x82])).unwrap(), (0x82, 1, false));
        assert_eq!(read_tag(BufReader::new(&[0x40, 0x02])).unwrap(), (0x4002, 2, false));
        assert_eq!(read_tag(BufReader::new(&[0x20, 0x00, 0x02])).unwrap(), (0x200002, 3, false));
        assert_eq!(
            read_tag(BufReader::new(&[0x10, 0x00, 0x00, 0x02])).unwrap(),
            (0x10000002, 4, false)
        );
    }

    #[test]
    fn element_tag_resync_on_garbage() {
        // A byte that cannot start a tag, followed by junk and then a Cluster id.
        let data = [0x00, 0x11, 0x1F, 0x43, 0xB6, 0x75];
        assert_eq!(read_tag(BufReader::new(&data)).unwrap(), (0x1F43B675, 4, true));
    }

    #[test]
    fn variable_unsigned_integer_parsing() {
        assert_eq!(read_unsigned_vint(BufReader::new(&[0x82])).unwrap(), 2);
        assert_eq!(read_unsigned_vint(BufReader::new(&[0x40, 0x02])).unwrap(), 2);
        assert_eq!(read_unsigned_vint(BufReader::new(&[0x20, 0x00, 0x02])).unwrap(), 2);
        assert_eq!(read_unsigned_vint(BufReader::new(&[0x10, 0x00, 0x00, 0x02])).unwrap(), 2);
        assert_eq!(
            read_unsigned_vint(BufReader::new(&[0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02]))
                .unwrap(),
            2
        );
    }

    #[test]
    fn variable_signed_integer_parsing() {
        assert_eq!(read_signed_vint(BufReader::new(&[0x80])).unwrap(), -63);
        assert_eq!(read_signed_vint(BufReader::new(&[0x40, 0x00])).unwrap(), -8191);
    }

    #[test]
    fn malformed_and_unknown_sizes() {
        assert!(read_size(BufReader::new(&[0x00, 0x01])).is_err());
        assert!(read_size(BufReader::new(&[0x40])).is_err());
        assert_eq!(read_size(BufReader::new(&[0xFF])).unwrap(), None);
        assert_eq!(read_size(BufReader::new(&[0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF])).unwrap(), None);
        assert_eq!(read_size(BufReader::new(&[0x81])).unwrap(), Some(1));
    }

    #[test]
    fn header_of_unknown_size_element() {
        let data = [0x1F, 0x43, 0xB6, 0x75, 0xFF, 0xE7, 0x81, 0x00];
        let mut reader = BufReader::new(&data);
        let (header, reset) = ElementHeader::read(&mut reader).unwrap();

        assert!(!reset);
        assert_eq!(header.etype, ElementType::Cluster);
        assert!(header.unknown_size);
        assert_eq!(header.data_pos, 5);
        assert_eq!(header.end(), None);
    }

    #[test]
    fn payload_is_read_in_chunks() {
        let data: Vec<u8> = (0..200_000u32).map(|i| i as u8).collect();
        let payload = read_payload(&mut BufReader::new(&data), 150_000).unwrap();
        assert_eq!(payload.len(), 150_000);
        assert_eq!(payload[149_999], 149_999u32 as u8);
    }

    #[test]
    fn oversized_payload_fails_without_allocating() {
        // CodecPrivate claiming 2^40 bytes of data.
        let data = [0x63, 0xA2, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0xAA, 0xBB];
        let mut reader = BufReader::new(&data);
        let (header, _) = ElementHeader::read(&mut reader).unwrap();
        assert_eq!(header.data_len, 1 << 40);

        let err = read_data(&mut reader, &header).unwrap_err();
        assert!(err.is_end_of_stream());
    }
}
