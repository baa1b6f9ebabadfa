//! Low-level ZIP archive parser.
//!
//! This module handles the binary parsing of ZIP file structures,
//! reading from any source that implements the [`ReadAt`] trait.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. If ZIP64, read the ZIP64 EOCD for large file support
//! 3. Read the Central Directory to get metadata for all files
//! 4. For extraction, read each file's Local File Header and data
//!
//! Only the central directory and the members actually opened are read,
//! so an archive embedded in a larger container is never loaded whole.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Cursor, Read};
use std::sync::Arc;

use log::trace;

use crate::error::{Error, Result};
use crate::io::ReadAt;

use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Map a short read to `ArchiveCorrupt`; other I/O failures pass through.
fn truncated(what: &str) -> impl FnOnce(io::Error) -> Error + '_ {
    move |e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::ArchiveCorrupt(format!("{what} is truncated"))
        } else {
            Error::Io(e)
        }
    }
}

/// Low-level ZIP file parser.
///
/// This struct handles reading and parsing ZIP structures from
/// a data source. It's generic over the reader type so the same code
/// parses an archive windowed out of the tar container and a decrypted
/// archive held in memory.
///
/// Typically used through [`ZipExtractor`](super::ZipExtractor)
/// rather than directly.
pub struct ZipParser<R: ReadAt> {
    /// The underlying data source
    reader: Arc<R>,
    /// Total size of the archive in bytes
    size: u64,
}

impl<R: ReadAt> ZipParser<R> {
    /// Create a new parser for the given reader.
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    fn check_bounds(&self, offset: u64, len: u64, what: &str) -> Result<()> {
        let in_bounds = offset.checked_add(len).is_some_and(|end| end <= self.size);
        if !in_bounds {
            return Err(Error::ArchiveCorrupt(format!(
                "{what} at offset {offset} extends past end of archive ({} bytes)",
                self.size
            )));
        }
        Ok(())
    }

    fn read_exact(&self, offset: u64, buf: &mut [u8], what: &str) -> Result<()> {
        self.check_bounds(offset, buf.len() as u64, what)?;
        self.reader
            .read_exact_at(offset, buf)
            .map_err(truncated(what))
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// The EOCD is located at the end of the ZIP file. This method
    /// handles both the simple case (no comment) and archives with
    /// comments by searching backwards for the signature.
    ///
    /// # Returns
    ///
    /// A tuple of (EOCD record, offset of EOCD in file).
    pub fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        if self.size < EndOfCentralDirectory::SIZE as u64 {
            return Err(Error::ArchiveCorrupt(format!(
                "Not a valid ZIP file ({} bytes)",
                self.size
            )));
        }

        // Simple case first: no archive comment.
        let offset = self.size - EndOfCentralDirectory::SIZE as u64;
        let mut buf = vec![0u8; EndOfCentralDirectory::SIZE];
        self.read_exact(offset, &mut buf, "End of Central Directory")?;
        if &buf[0..4] == EndOfCentralDirectory::SIGNATURE && &buf[20..22] == b"\x00\x00" {
            let eocd = EndOfCentralDirectory::from_bytes(&buf)?;
            return Ok((eocd, offset));
        }

        // EOCD not at expected location - search backwards past a comment.
        let search_size = (MAX_COMMENT_SIZE + EndOfCentralDirectory::SIZE as u64).min(self.size);
        let search_start = self.size - search_size;

        let mut buf = vec![0u8; search_size as usize];
        self.read_exact(search_start, &mut buf, "End of Central Directory")?;

        for i in (0..=buf.len() - EndOfCentralDirectory::SIZE).rev() {
            if &buf[i..i + 4] == EndOfCentralDirectory::SIGNATURE {
                // The comment length field must account for every trailing byte.
                let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;

                if comment_len == buf.len() - i - EndOfCentralDirectory::SIZE {
                    let eocd = EndOfCentralDirectory::from_bytes(
                        &buf[i..i + EndOfCentralDirectory::SIZE],
                    )?;
                    return Ok((eocd, search_start + i as u64));
                }
            }
        }

        Err(Error::ArchiveCorrupt("Not a valid ZIP file".into()))
    }

    /// Read the ZIP64 End of Central Directory record.
    ///
    /// Called when the regular EOCD indicates ZIP64 extensions are needed
    /// (fields set to 0xFFFF or 0xFFFFFFFF).
    pub fn read_zip64_eocd(&self, eocd_offset: u64) -> Result<Zip64EOCD> {
        // The ZIP64 EOCD Locator is located immediately before the regular EOCD
        let locator_offset = eocd_offset
            .checked_sub(Zip64EOCDLocator::SIZE as u64)
            .ok_or_else(|| Error::ArchiveCorrupt("Missing ZIP64 locator".into()))?;
        let mut locator_buf = vec![0u8; Zip64EOCDLocator::SIZE];
        self.read_exact(locator_offset, &mut locator_buf, "ZIP64 locator")?;

        let locator = Zip64EOCDLocator::from_bytes(&locator_buf)?;

        let mut eocd64_buf = vec![0u8; Zip64EOCD::MIN_SIZE];
        self.read_exact(
            locator.eocd64_offset,
            &mut eocd64_buf,
            "ZIP64 End of Central Directory",
        )?;

        Zip64EOCD::from_bytes(&eocd64_buf)
    }

    /// List all files in the ZIP archive, in central directory order.
    pub fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        let (eocd, eocd_offset) = self.find_eocd()?;
        if eocd.is_multi_disk() {
            return Err(Error::ArchiveCorrupt(
                "Multi-disk archives are not supported".into(),
            ));
        }

        // Get Central Directory info, using ZIP64 if needed
        let (cd_offset, cd_size, total_entries) = if eocd.is_zip64() {
            let eocd64 = self.read_zip64_eocd(eocd_offset)?;
            (eocd64.cd_offset, eocd64.cd_size, eocd64.total_entries)
        } else {
            (
                eocd.cd_offset as u64,
                eocd.cd_size as u64,
                eocd.total_entries as u64,
            )
        };

        // Bounds first: the directory size is only allocated once it is known to fit.
        self.check_bounds(cd_offset, cd_size, "Central Directory")?;
        let cd_len = usize::try_from(cd_size).map_err(|_| {
            Error::ArchiveCorrupt(format!("Central Directory too large: {cd_size} bytes"))
        })?;
        let mut cd_data = vec![0u8; cd_len];
        self.read_exact(cd_offset, &mut cd_data, "Central Directory")?;

        // Every header takes at least CDFH_MIN_SIZE bytes; reject counts that cannot fit.
        if total_entries > (cd_len / CDFH_MIN_SIZE) as u64 {
            return Err(Error::ArchiveCorrupt(format!(
                "Central Directory claims {total_entries} entries in {cd_len} bytes"
            )));
        }

        let mut entries = Vec::with_capacity(total_entries as usize);
        let mut cursor = Cursor::new(cd_data.as_slice());

        for _ in 0..total_entries {
            let entry = self
                .parse_cdfh(&mut cursor)
                .map_err(|e| match e {
                    Error::Io(io) => truncated("Central Directory")(io),
                    other => other,
                })?;
            trace!(
                "zip entry {} ({} -> {} bytes, flags {:#06x})",
                entry.file_name, entry.compressed_size, entry.uncompressed_size, entry.flags
            );
            entries.push(entry);
        }

        Ok(entries)
    }

    /// Parse a Central Directory File Header from a cursor.
    ///
    /// The CDFH contains metadata about a file in the archive, including
    /// its name, sizes, flags, and location of the actual file data.
    fn parse_cdfh(&self, cursor: &mut Cursor<&[u8]>) -> Result<ZipFileEntry> {
        let mut sig = [0u8; 4];
        cursor.read_exact(&mut sig)?;
        if sig != CDFH_SIGNATURE {
            return Err(Error::ArchiveCorrupt(
                "Invalid Central Directory File Header".into(),
            ));
        }

        let _version_made_by = cursor.read_u16::<LittleEndian>()?;
        let _version_needed = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;
        let compression_method = cursor.read_u16::<LittleEndian>()?;
        let last_mod_time = cursor.read_u16::<LittleEndian>()?;
        let last_mod_date = cursor.read_u16::<LittleEndian>()?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let mut uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let file_name_length = cursor.read_u16::<LittleEndian>()?;
        let extra_field_length = cursor.read_u16::<LittleEndian>()?;
        let file_comment_length = cursor.read_u16::<LittleEndian>()?;
        let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
        let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
        let _external_attrs = cursor.read_u32::<LittleEndian>()?;
        let mut lfh_offset = cursor.read_u32::<LittleEndian>()? as u64;

        let mut file_name_bytes = vec![0u8; file_name_length as usize];
        cursor.read_exact(&mut file_name_bytes)?;
        // Lossy conversion keeps non-UTF8 names comparable instead of failing
        let file_name = String::from_utf8_lossy(&file_name_bytes).to_string();

        let is_directory = file_name.ends_with('/');

        let mut extra = vec![0u8; extra_field_length as usize];
        cursor.read_exact(&mut extra)?;
        let mut aes = None;
        let mut extra_cursor = Cursor::new(extra.as_slice());

        while extra_cursor.position() + 4 <= extra.len() as u64 {
            let header_id = extra_cursor.read_u16::<LittleEndian>()?;
            let field_size = extra_cursor.read_u16::<LittleEndian>()? as u64;
            let field_end = extra_cursor.position() + field_size;
            if field_end > extra.len() as u64 {
                return Err(Error::ArchiveCorrupt(format!(
                    "Extra field {header_id:#06x} of {file_name:?} overruns its header"
                )));
            }

            match header_id {
                ZIP64_EXTRA_ID => {
                    // Fields are present only if the header field is saturated
                    if uncompressed_size == 0xFFFFFFFF && extra_cursor.position() + 8 <= field_end {
                        uncompressed_size = extra_cursor.read_u64::<LittleEndian>()?;
                    }
                    if compressed_size == 0xFFFFFFFF && extra_cursor.position() + 8 <= field_end {
                        compressed_size = extra_cursor.read_u64::<LittleEndian>()?;
                    }
                    if lfh_offset == 0xFFFFFFFF && extra_cursor.position() + 8 <= field_end {
                        lfh_offset = extra_cursor.read_u64::<LittleEndian>()?;
                    }
                }
                AES_EXTRA_ID => {
                    let start = extra_cursor.position() as usize;
                    aes = Some(AesExtra::from_bytes(&extra[start..field_end as usize])?);
                }
                _ => {}
            }
            extra_cursor.set_position(field_end);
        }

        // Skip over the file comment (we don't use it)
        cursor.set_position(cursor.position() + file_comment_length as u64);

        Ok(ZipFileEntry {
            file_name,
            flags,
            compression_method: CompressionMethod::from_u16(compression_method),
            compressed_size,
            uncompressed_size,
            crc32,
            lfh_offset,
            last_mod_time,
            last_mod_date,
            is_directory,
            aes,
        })
    }

    /// Get the actual data offset for a file entry.
    ///
    /// The Local File Header (LFH) has variable-length fields (filename,
    /// extra field) that may differ from the Central Directory entry.
    /// This method reads the LFH to calculate where the actual file
    /// data begins, and checks that the data lies inside the archive.
    pub fn get_data_offset(&self, entry: &ZipFileEntry) -> Result<u64> {
        let mut lfh_buf = vec![0u8; LFH_SIZE];
        self.read_exact(entry.lfh_offset, &mut lfh_buf, "Local File Header")?;

        if &lfh_buf[0..4] != LFH_SIGNATURE {
            return Err(Error::ArchiveCorrupt(format!(
                "Invalid Local File Header for {:?}",
                entry.file_name
            )));
        }

        // Read the variable field lengths from fixed positions in LFH
        let mut cursor = Cursor::new(&lfh_buf);
        cursor.set_position(26); // Offset to filename length field

        let file_name_length = cursor.read_u16::<LittleEndian>()? as u64;
        let extra_field_length = cursor.read_u16::<LittleEndian>()? as u64;

        // Data starts after: LFH (30 bytes) + filename + extra field
        let data_offset =
            entry.lfh_offset + LFH_SIZE as u64 + file_name_length + extra_field_length;

        let fits = data_offset
            .checked_add(entry.compressed_size)
            .is_some_and(|end| end <= self.size);
        if !fits {
            return Err(Error::ArchiveCorrupt(format!(
                "Data of {:?} extends past end of archive",
                entry.file_name
            )));
        }

        Ok(data_offset)
    }

    /// Get a reference to the underlying reader.
    ///
    /// Useful for reading file data after getting the offset
    /// from [`get_data_offset()`](Self::get_data_offset).
    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::fixtures::{Method, Protection, ZipBuilder};

    #[test]
    fn lists_entries_in_directory_order() {
        let zip = ZipBuilder::new()
            .add("b.txt", b"bee", Method::Stored, Protection::None)
            .add("a.txt", b"ay", Method::Deflate, Protection::None)
            .finish();
        let parser = ZipParser::new(Arc::new(zip));

        let entries = parser.list_files().unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.file_name.as_str()).collect();
        assert_eq!(names, vec!["b.txt", "a.txt"]);
        assert_eq!(entries[1].compression_method, CompressionMethod::Deflate);
        assert_eq!(entries[1].uncompressed_size, 2);
        assert!(!entries[0].is_encrypted());
    }

    #[test]
    fn finds_eocd_behind_comment() {
        let zip = ZipBuilder::new()
            .add("a.txt", b"ay", Method::Stored, Protection::None)
            .comment(b"USPS EPF")
            .finish();
        let parser = ZipParser::new(Arc::new(zip));
        assert_eq!(parser.list_files().unwrap().len(), 1);
    }

    #[test]
    fn parses_aes_extra_field() {
        let zip = ZipBuilder::new()
            .add("a.txt", b"secret", Method::Deflate, Protection::Aes("pw", 2))
            .finish();
        let parser = ZipParser::new(Arc::new(zip));
        let entries = parser.list_files().unwrap();

        let aes = entries[0].aes.expect("aes extra field");
        assert_eq!(aes.vendor_version, 2);
        assert_eq!(entries[0].effective_method(), CompressionMethod::Deflate);
        assert!(entries[0].is_encrypted());
    }

    #[test]
    fn garbage_is_archive_corrupt() {
        let parser = ZipParser::new(Arc::new(vec![0x42u8; 100]));
        assert_eq!(
            parser.list_files().unwrap_err().kind(),
            ErrorKind::ArchiveCorrupt
        );
    }

    #[test]
    fn tiny_input_is_archive_corrupt() {
        let parser = ZipParser::new(Arc::new(b"PK".to_vec()));
        assert_eq!(
            parser.list_files().unwrap_err().kind(),
            ErrorKind::ArchiveCorrupt
        );
    }

    #[test]
    fn oversized_central_directory_is_archive_corrupt() {
        let mut zip = ZipBuilder::new()
            .add("a.txt", b"ay", Method::Stored, Protection::None)
            .finish();
        // EOCD central directory size field sits 12 bytes into the 22-byte record.
        let at = zip.len() - EndOfCentralDirectory::SIZE + 12;
        zip[at..at + 4].copy_from_slice(&0xFFFF_FFF0u32.to_le_bytes());
        let parser = ZipParser::new(Arc::new(zip));

        let err = parser.list_files().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArchiveCorrupt);
        assert!(err.to_string().contains("Central Directory"));
    }

    #[test]
    fn truncated_archive_is_archive_corrupt() {
        let zip = ZipBuilder::new()
            .add("a.txt", b"some content here", Method::Stored, Protection::None)
            .finish();
        // Drop the head of the archive; the directory now points past the data.
        let cut = zip[10..].to_vec();
        let parser = ZipParser::new(Arc::new(cut));
        assert_eq!(
            parser.list_files().unwrap_err().kind(),
            ErrorKind::ArchiveCorrupt
        );
    }
}
