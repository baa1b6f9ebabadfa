use std::io::{self, Read};

use crate::error::Error;

/// Decompressed byte stream of one ZIP member.
///
/// Bytes are handed out as they are inflated. When the underlying stream
/// ends, the produced length and CRC-32 are checked against the central
/// directory; a mismatch surfaces as an error from the final `read` call,
/// so a consumer never mistakes a damaged member for a complete one.
pub struct MemberReader {
    inner: Box<dyn Read>,
    name: String,
    encrypted: bool,
    expected_crc: Option<u32>,
    expected_size: u64,
    produced: u64,
    hasher: crc32fast::Hasher,
    finished: bool,
}

impl MemberReader {
    pub(crate) fn new(
        inner: Box<dyn Read>,
        name: &str,
        encrypted: bool,
        expected_crc: Option<u32>,
        expected_size: u64,
    ) -> Self {
        Self {
            inner,
            name: name.to_string(),
            encrypted,
            expected_crc,
            expected_size,
            produced: 0,
            hasher: crc32fast::Hasher::new(),
            finished: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decompressed bytes produced so far.
    pub fn produced(&self) -> u64 {
        self.produced
    }

    /// A damaged encrypted member most likely means the password slipped
    /// past the check byte, so report it as a decryption failure.
    fn damaged(&self, reason: String) -> io::Error {
        let err = if self.encrypted {
            Error::DecryptionFailed {
                name: self.name.clone(),
                reason,
            }
        } else {
            Error::ArchiveCorrupt(format!("{:?}: {reason}", self.name))
        };
        err.into_io()
    }

    fn classify(&self, err: io::Error) -> io::Error {
        let carries_typed = err.get_ref().is_some_and(|inner| inner.is::<Error>());
        if carries_typed {
            return err;
        }
        match err.kind() {
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => {
                self.damaged(format!("decompression failed: {err}"))
            }
            io::ErrorKind::UnexpectedEof => {
                Error::ArchiveCorrupt(format!("{:?}: member data is truncated", self.name))
                    .into_io()
            }
            _ => err,
        }
    }

    fn finish(&mut self) -> io::Result<()> {
        self.finished = true;
        if self.produced != self.expected_size {
            return Err(self.damaged(format!(
                "size mismatch: expected {} bytes, got {}",
                self.expected_size, self.produced
            )));
        }
        if let Some(expected) = self.expected_crc {
            let actual = self.hasher.clone().finalize();
            if actual != expected {
                return Err(self.damaged(format!(
                    "CRC mismatch: expected {expected:#010x}, got {actual:#010x}"
                )));
            }
        }
        Ok(())
    }
}

impl Read for MemberReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.finished || buf.is_empty() {
            return Ok(0);
        }
        let n = match self.inner.read(buf) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Err(e),
            Err(e) => {
                self.finished = true;
                return Err(self.classify(e));
            }
        };
        if n == 0 {
            self.finish()?;
            return Ok(0);
        }

        self.produced += n as u64;
        if self.produced > self.expected_size {
            self.finished = true;
            return Err(self.damaged(format!(
                "member inflates past its declared {} bytes",
                self.expected_size
            )));
        }
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

impl std::fmt::Debug for MemberReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemberReader")
            .field("name", &self.name)
            .field("encrypted", &self.encrypted)
            .field("produced", &self.produced)
            .field("expected_size", &self.expected_size)
            .finish()
    }
}
