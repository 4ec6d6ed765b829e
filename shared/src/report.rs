//! Packed hook report.
//!
//! ```text
//! Header:   modified_count:u32  entry_count:u32  entry_offset:u32  entry_size:u32
//! Entry[i]: record_size:u32  table_index:u32  baseline_address:usize
//!           current_address:usize  name_offset:u32  name_length:u32
//!           name_bytes[name_length]
//! ```
//!
//! Fields are native-endian with no padding. Entries are packed back to back
//! starting at `entry_offset`; `record_size` covers the fixed fields plus the
//! name bytes, and `name_offset` is relative to the start of its record.

use std::mem::size_of;
use thiserror::Error;

const U32: usize = size_of::<u32>();
const PTR: usize = size_of::<usize>();

/// Size of [`ReportHeader`] on the wire.
pub const REPORT_HEADER_SIZE: usize = 4 * U32;

/// Size of the fixed part of a report entry (everything but the name).
pub const REPORT_ENTRY_SIZE: usize = 4 * U32 + 2 * PTR;

/// Ways a buffer handed back by the device can fail to decode.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReportError {
    #[error("buffer of {0} bytes cannot hold a report header")]
    TooShort(usize),

    #[error("entry offset {0} points outside the report")]
    BadEntryOffset(u32),

    #[error("entry size {found} does not match expected {expected}")]
    BadEntrySize { found: u32, expected: u32 },

    #[error("entry #{index} overruns the report buffer")]
    EntryOverrun { index: usize },

    #[error("name of entry #{index} lies outside its record")]
    NameOutOfRange { index: usize },
}

/// Small cursor over a byte slice; every read is bounds-checked by the caller.
struct Fields<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Fields<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn u32(&mut self) -> u32 {
        let mut raw = [0u8; U32];
        raw.copy_from_slice(&self.buf[self.pos..self.pos + U32]);
        self.pos += U32;
        u32::from_ne_bytes(raw)
    }

    fn usize(&mut self) -> usize {
        let mut raw = [0u8; PTR];
        raw.copy_from_slice(&self.buf[self.pos..self.pos + PTR]);
        self.pos += PTR;
        usize::from_ne_bytes(raw)
    }
}

struct FieldsMut<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> FieldsMut<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn put(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }
}

/// Leading block of every report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportHeader {
    /// Total hooks found, including those that did not fit.
    pub modified_count: u32,
    /// Entries actually packed into the buffer.
    pub entry_count: u32,
    pub entry_offset: u32,
    pub entry_size: u32,
}

impl ReportHeader {
    /// Header of an empty report.
    pub const fn empty() -> Self {
        Self {
            modified_count: 0,
            entry_count: 0,
            entry_offset: REPORT_HEADER_SIZE as u32,
            entry_size: REPORT_ENTRY_SIZE as u32,
        }
    }

    /// Serialize into the first [`REPORT_HEADER_SIZE`] bytes of `out`.
    ///
    /// # Panics
    /// If `out` is shorter than the header.
    pub fn write_to(&self, out: &mut [u8]) {
        let mut w = FieldsMut::new(&mut out[..REPORT_HEADER_SIZE]);
        w.put(&self.modified_count.to_ne_bytes());
        w.put(&self.entry_count.to_ne_bytes());
        w.put(&self.entry_offset.to_ne_bytes());
        w.put(&self.entry_size.to_ne_bytes());
    }

    pub fn read_from(buf: &[u8]) -> Result<Self, ReportError> {
        if buf.len() < REPORT_HEADER_SIZE {
            return Err(ReportError::TooShort(buf.len()));
        }
        let mut r = Fields::new(buf);
        Ok(Self {
            modified_count: r.u32(),
            entry_count: r.u32(),
            entry_offset: r.u32(),
            entry_size: r.u32(),
        })
    }
}

/// Fixed part of one packed entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryHeader {
    pub record_size: u32,
    pub table_index: u32,
    pub baseline_address: usize,
    pub current_address: usize,
    pub name_offset: u32,
    pub name_length: u32,
}

impl EntryHeader {
    /// Header for an entry carrying `name_length` name bytes right after
    /// the fixed fields.
    pub fn new(table_index: u32, baseline_address: usize, current_address: usize, name_length: u32) -> Self {
        Self {
            record_size: REPORT_ENTRY_SIZE as u32 + name_length,
            table_index,
            baseline_address,
            current_address,
            name_offset: REPORT_ENTRY_SIZE as u32,
            name_length,
        }
    }

    /// # Panics
    /// If `out` is shorter than [`REPORT_ENTRY_SIZE`].
    pub fn write_to(&self, out: &mut [u8]) {
        let mut w = FieldsMut::new(&mut out[..REPORT_ENTRY_SIZE]);
        w.put(&self.record_size.to_ne_bytes());
        w.put(&self.table_index.to_ne_bytes());
        w.put(&self.baseline_address.to_ne_bytes());
        w.put(&self.current_address.to_ne_bytes());
        w.put(&self.name_offset.to_ne_bytes());
        w.put(&self.name_length.to_ne_bytes());
    }

    /// Returns `None` when `buf` cannot hold the fixed fields.
    pub fn read_from(buf: &[u8]) -> Option<Self> {
        if buf.len() < REPORT_ENTRY_SIZE {
            return None;
        }
        let mut r = Fields::new(buf);
        Some(Self {
            record_size: r.u32(),
            table_index: r.u32(),
            baseline_address: r.usize(),
            current_address: r.usize(),
            name_offset: r.u32(),
            name_length: r.u32(),
        })
    }
}

/// One decoded finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub table_index: u32,
    pub baseline_address: usize,
    pub current_address: usize,
    /// Owning module of `current_address`, or the device's placeholder.
    pub module_name: String,
}

/// Fully decoded report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub header: ReportHeader,
    pub entries: Vec<ReportEntry>,
}

impl Report {
    /// Decode the bytes the device returned (exactly the reported output length).
    pub fn parse(buf: &[u8]) -> Result<Self, ReportError> {
        let header = ReportHeader::read_from(buf)?;

        if header.entry_size != REPORT_ENTRY_SIZE as u32 {
            return Err(ReportError::BadEntrySize {
                found: header.entry_size,
                expected: REPORT_ENTRY_SIZE as u32,
            });
        }
        let mut cursor = header.entry_offset as usize;
        if cursor < REPORT_HEADER_SIZE || cursor > buf.len() {
            return Err(ReportError::BadEntryOffset(header.entry_offset));
        }

        // The count is untrusted; never reserve more records than the bytes can hold.
        let room = (buf.len() - cursor) / REPORT_ENTRY_SIZE;
        let mut entries = Vec::with_capacity(room.min(header.entry_count as usize));
        for index in 0..header.entry_count as usize {
            let fixed = EntryHeader::read_from(&buf[cursor..])
                .ok_or(ReportError::EntryOverrun { index })?;

            let record_size = fixed.record_size as usize;
            if record_size < REPORT_ENTRY_SIZE || cursor + record_size > buf.len() {
                return Err(ReportError::EntryOverrun { index });
            }
            let record = &buf[cursor..cursor + record_size];

            let name_start = fixed.name_offset as usize;
            let name_end = name_start + fixed.name_length as usize;
            if name_start < REPORT_ENTRY_SIZE || name_end > record.len() {
                return Err(ReportError::NameOutOfRange { index });
            }

            entries.push(ReportEntry {
                table_index: fixed.table_index,
                baseline_address: fixed.baseline_address,
                current_address: fixed.current_address,
                module_name: String::from_utf8_lossy(&record[name_start..name_end]).into_owned(),
            });
            cursor += record_size;
        }

        Ok(Self { header, entries })
    }

    /// Hooks were found that did not fit in the caller's buffer.
    pub fn is_truncated(&self) -> bool {
        self.header.entry_count < self.header.modified_count
    }

    pub fn is_clean(&self) -> bool {
        self.header.modified_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_size_is_four_words() {
        assert_eq!(REPORT_HEADER_SIZE, 16);
        assert_eq!(REPORT_ENTRY_SIZE, 16 + 2 * size_of::<usize>());
    }

    #[test]
    fn empty_header_points_past_itself() {
        let h = ReportHeader::empty();
        assert_eq!(h.entry_offset as usize, REPORT_HEADER_SIZE);
        assert_eq!(h.entry_size as usize, REPORT_ENTRY_SIZE);
    }

    #[test]
    fn short_buffer_is_rejected() {
        assert_eq!(Report::parse(&[0u8; 7]), Err(ReportError::TooShort(7)));
    }

    #[test]
    fn entry_count_beyond_buffer_is_an_overrun() {
        let mut buf = vec![0u8; REPORT_HEADER_SIZE];
        ReportHeader { modified_count: 1, entry_count: 1, ..ReportHeader::empty() }.write_to(&mut buf);
        assert_eq!(Report::parse(&buf), Err(ReportError::EntryOverrun { index: 0 }));
    }
}
