use std::io::Read;
use std::sync::Arc;

use flate2::read::DeflateDecoder;
use log::debug;

use crate::error::{Error, Result};
use crate::io::{ReadAt, ReadAtCursor};

use super::crypto::{AesReader, ZipCryptoReader};
use super::member::MemberReader;
use super::parser::ZipParser;
use super::structures::{CompressionMethod, ZipFileEntry};

/// Upper bound on buffer space reserved from a member's declared size.
const MAX_PREALLOC: u64 = 64 * 1024 * 1024;

/// ZIP file extractor
///
/// Reads the central directory once on construction; members are then
/// opened lazily as decrypting, decompressing streams.
pub struct ZipExtractor<R: ReadAt> {
    parser: ZipParser<R>,
    entries: Vec<ZipFileEntry>,
}

impl<R: ReadAt + 'static> ZipExtractor<R> {
    pub fn new(reader: Arc<R>) -> Result<Self> {
        let parser = ZipParser::new(reader);
        let entries = parser.list_files()?;
        Ok(Self { parser, entries })
    }

    /// All entries, in central directory order
    pub fn entries(&self) -> &[ZipFileEntry] {
        &self.entries
    }

    /// Look up an entry by exact name
    pub fn find(&self, name: &str) -> Result<&ZipFileEntry> {
        self.entries
            .iter()
            .find(|e| e.file_name == name)
            .ok_or_else(|| Error::MemberNotFound(name.to_string()))
    }

    /// Open a member as a stream of its decompressed bytes.
    ///
    /// `password` is only consulted when the member is encrypted. The
    /// returned reader verifies size and CRC when it reaches the end.
    pub fn open_member(&self, entry: &ZipFileEntry, password: Option<&str>) -> Result<MemberReader> {
        let name = entry.file_name.as_str();
        if entry.is_directory {
            return Err(Error::ArchiveCorrupt(format!("{name:?} is a directory")));
        }

        let method = entry.effective_method();
        if !matches!(method, CompressionMethod::Stored | CompressionMethod::Deflate) {
            return Err(Error::ArchiveCorrupt(format!(
                "Unsupported compression method {} for {name:?} (only STORED and DEFLATE are supported)",
                method.as_u16()
            )));
        }

        let data_offset = self.parser.get_data_offset(entry)?;
        let raw = ReadAtCursor::new(
            Arc::clone(self.parser.reader()),
            data_offset,
            entry.compressed_size,
        );

        let mut expected_crc = Some(entry.crc32);
        let decrypted: Box<dyn Read> = if entry.is_encrypted() {
            if entry.uses_strong_encryption() {
                return Err(Error::DecryptionFailed {
                    name: name.to_string(),
                    reason: "unsupported protection scheme (PKWARE strong encryption)".into(),
                });
            }
            let password = password.ok_or_else(|| Error::DecryptionFailed {
                name: name.to_string(),
                reason: "member is encrypted but no password was supplied".into(),
            })?;

            match (entry.compression_method, entry.aes) {
                (CompressionMethod::Aes, Some(aes)) => {
                    debug!("decrypting {name:?} with AES ({:?}, AE-{})", aes.strength, aes.vendor_version);
                    if aes.vendor_version == 2 {
                        expected_crc = None;
                    }
                    Box::new(AesReader::new(
                        raw,
                        password.as_bytes(),
                        aes.strength,
                        entry.compressed_size,
                        name,
                    )?)
                }
                (CompressionMethod::Aes, None) => {
                    return Err(Error::ArchiveCorrupt(format!(
                        "{name:?} uses AES without an AES extra field"
                    )));
                }
                _ => {
                    debug!("decrypting {name:?} with traditional PKWARE encryption");
                    let check_byte = if entry.has_data_descriptor() {
                        (entry.last_mod_time >> 8) as u8
                    } else {
                        (entry.crc32 >> 24) as u8
                    };
                    Box::new(ZipCryptoReader::new(
                        raw,
                        password.as_bytes(),
                        check_byte,
                        name,
                    )?)
                }
            }
        } else {
            Box::new(raw)
        };

        let decompressed: Box<dyn Read> = match method {
            CompressionMethod::Deflate => Box::new(DeflateDecoder::new(decrypted)),
            _ => decrypted,
        };

        Ok(MemberReader::new(
            decompressed,
            name,
            entry.is_encrypted(),
            expected_crc,
            entry.uncompressed_size,
        ))
    }

    /// Extract file data to memory
    pub fn extract_to_memory(&self, entry: &ZipFileEntry, password: Option<&str>) -> Result<Vec<u8>> {
        let mut reader = self.open_member(entry, password)?;
        // The declared size is untrusted until the reader verifies it.
        let capacity = usize::try_from(entry.uncompressed_size.min(MAX_PREALLOC)).unwrap_or(0);
        let mut buf = Vec::with_capacity(capacity);
        reader.read_to_end(&mut buf).map_err(Error::from_io)?;
        Ok(buf)
    }

    /// Extract a member by name to memory
    pub fn extract(&self, name: &str, password: Option<&str>) -> Result<Vec<u8>> {
        let entry = self.find(name)?;
        self.extract_to_memory(entry, password)
    }
}
