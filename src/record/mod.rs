//! Fixed-width USPS record decoding.
//!
//! Each record layout is an immutable [`Schema`]: a record length, the
//! leading byte that marks a detail row, and a table of [`Field`]s with
//! `[start, end)` byte offsets. Fields are sliced verbatim; only name
//! fields are trimmed, so codes and numbers keep their leading zeros. A
//! field that is not valid UTF-8 is rejected rather than repaired.

pub mod city_state;
mod reader;
pub mod zip4;

pub use city_state::{CityStateDetail, CopyrightDetailCode};
pub use reader::RecordReader;
pub use zip4::{Zip4Detail, Zip4Number};

use crate::error::{Error, Result};

/// One named byte range of a fixed-width record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub start: usize,
    pub end: usize,
    /// Strip surrounding whitespace (name fields only).
    pub trim: bool,
}

impl Field {
    pub const fn raw(name: &'static str, start: usize, end: usize) -> Self {
        Self {
            name,
            start,
            end,
            trim: false,
        }
    }

    pub const fn trimmed(name: &'static str, start: usize, end: usize) -> Self {
        Self {
            name,
            start,
            end,
            trim: true,
        }
    }

    /// Slice this field out of a record buffer that has already been
    /// length-checked against its schema.
    pub fn slice(&self, record: &[u8]) -> Result<String> {
        let bytes = &record[self.start..self.end];
        let text = std::str::from_utf8(bytes).map_err(|e| Error::InvalidText {
            field: self.name,
            offset: self.start + e.valid_up_to(),
        })?;
        let text = if self.trim { text.trim() } else { text };
        Ok(text.to_string())
    }
}

/// Layout of one fixed-width record type.
#[derive(Debug)]
pub struct Schema {
    pub name: &'static str,
    pub record_len: usize,
    /// First byte of a data-bearing row; every other row is skipped.
    pub detail_code: u8,
    pub fields: &'static [Field],
}

impl Schema {
    pub fn is_detail(&self, record: &[u8]) -> bool {
        record.first() == Some(&self.detail_code)
    }

    pub fn check_len(&self, record: &[u8]) -> Result<()> {
        if record.len() != self.record_len {
            return Err(Error::MalformedRecord {
                schema: self.name,
                expected: self.record_len,
                actual: record.len(),
            });
        }
        Ok(())
    }

    /// Slice every field of the schema, in table order.
    pub fn decode_fields(&self, record: &[u8]) -> Result<Vec<(&'static str, String)>> {
        self.check_len(record)?;
        self.fields
            .iter()
            .map(|field| field.slice(record).map(|text| (field.name, text)))
            .collect()
    }
}

/// A record type decoded from one fixed-width row.
pub trait Record: Sized {
    const SCHEMA: &'static Schema;

    /// Decode a detail row. Fails with `MalformedRecord` when the buffer
    /// is not exactly `SCHEMA.record_len` bytes or a field is not UTF-8.
    fn decode(record: &[u8]) -> Result<Self>;
}
