//! Bounds-checked writer for the packed hook report.
//!
//! The packer owns a buffer of exactly the caller's output capacity. Records
//! that do not fit are dropped without error; `modified_count` keeps the true
//! number of hooks, so a reader spots truncation by comparing it with
//! `entry_count`.

use log::Level;
use shared::report::{EntryHeader, ReportHeader, REPORT_ENTRY_SIZE, REPORT_HEADER_SIZE};

use crate::drv_log;
use crate::error::{DrvError, DrvResult};
use crate::table::Address;

pub struct ReportPacker {
    buf: Vec<u8>,
    header: ReportHeader,
    cursor: usize,
}

impl ReportPacker {
    /// Packer over a zeroed buffer of `capacity` bytes.
    pub fn new(capacity: usize) -> DrvResult<Self> {
        if capacity < REPORT_HEADER_SIZE {
            return Err(DrvError::BufferTooSmall { needed: REPORT_HEADER_SIZE, available: capacity });
        }
        let mut buf = Vec::new();
        buf.try_reserve_exact(capacity)
            .map_err(|_| DrvError::AllocationFailure)?;
        buf.resize(capacity, 0);

        let header = ReportHeader::empty();
        header.write_to(&mut buf);
        Ok(Self { buf, header, cursor: header.entry_offset as usize })
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Count one more hook, whether or not its record gets packed.
    pub fn count_modified(&mut self) {
        self.header.modified_count += 1;
        self.header.write_to(&mut self.buf);
    }

    /// Append one record if it fits. Returns whether it was packed.
    pub fn append(&mut self, index: usize, baseline: Address, current: Address, name: &[u8]) -> bool {
        let (Ok(table_index), Ok(name_length)) = (u32::try_from(index), u32::try_from(name.len())) else {
            return false;
        };
        let record_size = REPORT_ENTRY_SIZE + name.len();
        if record_size > self.buf.len() - self.cursor {
            drv_log!(
                Level::Debug,
                "report",
                "no room for slot {} ({} bytes, {} left)",
                index,
                record_size,
                self.buf.len() - self.cursor
            );
            return false;
        }

        let record = &mut self.buf[self.cursor..self.cursor + record_size];
        EntryHeader::new(table_index, baseline, current, name_length).write_to(record);
        record[REPORT_ENTRY_SIZE..].copy_from_slice(name);

        self.cursor += record_size;
        self.header.entry_count += 1;
        self.header.write_to(&mut self.buf);
        true
    }

    pub fn header(&self) -> ReportHeader {
        self.header
    }

    /// Bytes written so far, header included.
    pub fn packed_size(&self) -> usize {
        self.cursor
    }

    pub fn packed(&self) -> &[u8] {
        &self.buf[..self.cursor]
    }
}
