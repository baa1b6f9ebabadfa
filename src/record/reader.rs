use std::io::{self, Read};
use std::marker::PhantomData;

use super::Record;
use crate::error::{Error, Result};

/// Lazy, single-pass sequence of detail records read from a byte stream.
///
/// The stream is consumed in chunks of exactly the schema's record length.
/// Non-detail rows (copyright banners and the like) are skipped without
/// decoding. End of input on a record boundary ends the sequence; a partial
/// trailing record yields `TruncatedStream`. The first error ends the
/// sequence for good.
pub struct RecordReader<T, R> {
    source: R,
    buf: Vec<u8>,
    offset: u64,
    rows: u64,
    details: u64,
    done: bool,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record, R: Read> RecordReader<T, R> {
    pub fn new(source: R) -> Self {
        Self {
            source,
            buf: vec![0u8; T::SCHEMA.record_len],
            offset: 0,
            rows: 0,
            details: 0,
            done: false,
            _record: PhantomData,
        }
    }

    /// Rows read so far, detail or not.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Detail records yielded so far.
    pub fn details(&self) -> u64 {
        self.details
    }

    /// Fill the record buffer; returns how many bytes were read before EOF.
    fn fill(&mut self) -> io::Result<usize> {
        let mut filled = 0;
        while filled < self.buf.len() {
            match self.source.read(&mut self.buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    fn next_record(&mut self) -> Result<Option<T>> {
        loop {
            let filled = self.fill().map_err(Error::from_io)?;
            if filled == 0 {
                return Ok(None);
            }
            if filled < self.buf.len() {
                return Err(Error::TruncatedStream {
                    offset: self.offset,
                    record_len: self.buf.len(),
                    trailing: filled,
                });
            }
            self.offset += filled as u64;
            self.rows += 1;

            if !T::SCHEMA.is_detail(&self.buf) {
                continue;
            }
            let record = T::decode(&self.buf)?;
            self.details += 1;
            return Ok(Some(record));
        }
    }
}

impl<T: Record, R: Read> Iterator for RecordReader<T, R> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<T: Record, R: Read> std::iter::FusedIterator for RecordReader<T, R> {}
