//! Uncompressed tar container reader.
//!
//! The USPS distribution is a plain ustar archive. Entries are located by
//! walking 512-byte header blocks with positional reads; payloads are never
//! read here, callers receive the byte window of an entry and open it
//! through [`LocalFileReader::window`](crate::io::LocalFileReader::window)
//! or any other [`ReadAt`].
//!
//! Supported header forms: ustar `prefix`/`name`, GNU long names (`L`) and
//! PAX extended headers (`x`, `path=` only). Sizes may be octal or GNU
//! base-256.

use log::trace;

use crate::error::{Error, Result};
use crate::io::ReadAt;

pub const TAR_BLOCK_LEN: u64 = 512;

const NAME: (usize, usize) = (0, 100);
const SIZE: (usize, usize) = (124, 136);
const CHECKSUM: (usize, usize) = (148, 156);
const TYPEFLAG: usize = 156;
const MAGIC: (usize, usize) = (257, 263);
const PREFIX: (usize, usize) = (345, 500);

/// A regular file entry inside a tar container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarEntry {
    pub name: String,
    /// Offset of the first payload byte within the container.
    pub offset: u64,
    pub size: u64,
    pub typeflag: u8,
}

impl TarEntry {
    pub fn is_regular(&self) -> bool {
        self.typeflag == 0 || self.typeflag == b'0'
    }
}

/// Tar container over any random-access source.
pub struct TarReader<R: ReadAt> {
    reader: R,
}

impl<R: ReadAt> TarReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Iterate over the file entries, in archive order.
    pub fn entries(&self) -> TarEntries<'_, R> {
        TarEntries {
            reader: &self.reader,
            pos: 0,
            long_name: None,
            done: false,
        }
    }

    /// Locate the regular file entry with exactly this name.
    pub fn find(&self, name: &str) -> Result<TarEntry> {
        for entry in self.entries() {
            let entry = entry?;
            if entry.name == name && entry.is_regular() {
                return Ok(entry);
            }
        }
        Err(Error::MemberNotFound(name.to_string()))
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }
}

pub struct TarEntries<'a, R: ReadAt> {
    reader: &'a R,
    pos: u64,
    long_name: Option<String>,
    done: bool,
}

impl<R: ReadAt> TarEntries<'_, R> {
    fn read_header(&self) -> Result<Option<[u8; TAR_BLOCK_LEN as usize]>> {
        if self.pos.saturating_add(TAR_BLOCK_LEN) > self.reader.size() {
            if self.pos == self.reader.size() {
                // Some writers omit the trailing zero blocks.
                return Ok(None);
            }
            return Err(Error::ArchiveCorrupt(format!(
                "tar header at offset {} extends past end of container",
                self.pos
            )));
        }
        let mut block = [0u8; TAR_BLOCK_LEN as usize];
        self.reader.read_exact_at(self.pos, &mut block)?;
        if block.iter().all(|&b| b == 0) {
            return Ok(None);
        }
        verify_checksum(&block, self.pos)?;
        Ok(Some(block))
    }

    fn read_payload(&self, offset: u64, size: u64) -> Result<Vec<u8>> {
        let len = usize::try_from(size)
            .map_err(|_| Error::ArchiveCorrupt(format!("tar metadata entry too large: {size}")))?;
        let mut buf = vec![0u8; len];
        self.reader.read_exact_at(offset, &mut buf).map_err(|_| {
            Error::ArchiveCorrupt(format!(
                "tar metadata at offset {offset} extends past end of container"
            ))
        })?;
        Ok(buf)
    }

    fn next_entry(&mut self) -> Result<Option<TarEntry>> {
        loop {
            let Some(block) = self.read_header()? else {
                return Ok(None);
            };
            let header_pos = self.pos;
            let size = parse_size(&block[SIZE.0..SIZE.1], header_pos)?;
            let offset = header_pos + TAR_BLOCK_LEN;
            let fits = offset
                .checked_add(size)
                .is_some_and(|end| end <= self.reader.size());
            if !fits {
                return Err(Error::ArchiveCorrupt(format!(
                    "tar entry at offset {header_pos} ({size} bytes) extends past end of container"
                )));
            }
            let padded = size.div_ceil(TAR_BLOCK_LEN) * TAR_BLOCK_LEN;
            self.pos = offset.checked_add(padded).ok_or_else(|| {
                Error::ArchiveCorrupt(format!("tar entry size overflows at {header_pos}"))
            })?;

            let typeflag = block[TYPEFLAG];
            match typeflag {
                b'L' => {
                    let raw = self.read_payload(offset, size)?;
                    self.long_name = Some(c_string(&raw));
                }
                b'x' => {
                    let raw = self.read_payload(offset, size)?;
                    if let Some(path) = pax_path(&raw) {
                        self.long_name = Some(path);
                    }
                }
                b'g' => {}
                _ => {
                    let name = match self.long_name.take() {
                        Some(name) => name,
                        None => header_name(&block),
                    };
                    trace!("tar entry {name} ({size} bytes at {offset})");
                    return Ok(Some(TarEntry {
                        name,
                        offset,
                        size,
                        typeflag,
                    }));
                }
            }
        }
    }
}

impl<R: ReadAt> Iterator for TarEntries<'_, R> {
    type Item = Result<TarEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
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

fn header_name(block: &[u8]) -> String {
    let name = c_string(&block[NAME.0..NAME.1]);
    let is_ustar = &block[MAGIC.0..MAGIC.0 + 5] == b"ustar";
    if !is_ustar {
        return name;
    }
    let prefix = c_string(&block[PREFIX.0..PREFIX.1]);
    if prefix.is_empty() {
        name
    } else {
        format!("{prefix}/{name}")
    }
}

fn c_string(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

fn parse_size(field: &[u8], header_pos: u64) -> Result<u64> {
    // GNU base-256: high bit of the first byte set, remaining bytes big-endian.
    if field[0] & 0x80 != 0 {
        let mut value: u64 = u64::from(field[0] & 0x7f);
        for &b in &field[1..] {
            value = value
                .checked_mul(256)
                .and_then(|v| v.checked_add(u64::from(b)))
                .ok_or_else(|| {
                    Error::ArchiveCorrupt(format!("tar size overflows at {header_pos}"))
                })?;
        }
        return Ok(value);
    }
    parse_octal(field).ok_or_else(|| {
        Error::ArchiveCorrupt(format!("invalid tar size field at offset {header_pos}"))
    })
}

fn parse_octal(field: &[u8]) -> Option<u64> {
    let text = std::str::from_utf8(field).ok()?;
    let digits = text.trim_matches(|c: char| c == '\0' || c == ' ');
    if digits.is_empty() {
        return Some(0);
    }
    u64::from_str_radix(digits, 8).ok()
}

fn verify_checksum(block: &[u8], header_pos: u64) -> Result<()> {
    let stored = parse_octal(&block[CHECKSUM.0..CHECKSUM.1]).ok_or_else(|| {
        Error::ArchiveCorrupt(format!("invalid tar checksum field at offset {header_pos}"))
    })?;
    let computed: u64 = block
        .iter()
        .enumerate()
        .map(|(i, &b)| {
            if (CHECKSUM.0..CHECKSUM.1).contains(&i) {
                u64::from(b' ')
            } else {
                u64::from(b)
            }
        })
        .sum();
    if stored != computed {
        return Err(Error::ArchiveCorrupt(format!(
            "tar header checksum mismatch at offset {header_pos}: stored {stored}, computed {computed}"
        )));
    }
    Ok(())
}

/// Extract `path` from a PAX extended header body (`"<len> key=value\n"` records).
fn pax_path(raw: &[u8]) -> Option<String> {
    let mut rest = raw;
    let mut path = None;
    while !rest.is_empty() {
        let space = rest.iter().position(|&b| b == b' ')?;
        let len: usize = std::str::from_utf8(&rest[..space]).ok()?.parse().ok()?;
        if len <= space || len > rest.len() {
            return path;
        }
        let record = &rest[space + 1..len];
        let record = record.strip_suffix(b"\n").unwrap_or(record);
        if let Some(value) = record.strip_prefix(b"path=") {
            path = Some(String::from_utf8_lossy(value).into_owned());
        }
        rest = &rest[len..];
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::fixtures;

    #[test]
    fn finds_entry_and_reports_payload_window() {
        let tar = fixtures::tar_archive(&[
            ("epf-zip4natl/readme.txt", b"hello".as_slice()),
            ("epf-zip4natl/zip4/zip4.zip", b"zip-bytes".as_slice()),
        ]);
        let reader = TarReader::new(tar.clone());

        let entry = reader.find("epf-zip4natl/zip4/zip4.zip").unwrap();
        assert_eq!(entry.size, 9);
        let start = entry.offset as usize;
        assert_eq!(&tar[start..start + 9], b"zip-bytes");
    }

    #[test]
    fn lists_entries_in_order() {
        let tar = fixtures::tar_archive(&[("a", b"1".as_slice()), ("b/c", b"22".as_slice())]);
        let reader = TarReader::new(tar);
        let names: Vec<_> = reader
            .entries()
            .map(|e| e.unwrap().name)
            .collect();
        assert_eq!(names, vec!["a", "b/c"]);
    }

    #[test]
    fn long_names_use_gnu_extension() {
        let long = format!("epf-zip4natl/{}/zip4.zip", "x".repeat(120));
        let tar = fixtures::tar_archive(&[(long.as_str(), b"data".as_slice())]);
        let reader = TarReader::new(tar);
        let entry = reader.find(&long).unwrap();
        assert_eq!(entry.size, 4);
    }

    #[test]
    fn missing_entry_is_member_not_found() {
        let tar = fixtures::tar_archive(&[("a", b"1".as_slice())]);
        let err = TarReader::new(tar).find("b").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MemberNotFound);
    }

    #[test]
    fn corrupted_header_is_archive_corrupt() {
        let mut tar = fixtures::tar_archive(&[("a", b"1".as_slice())]);
        tar[0] ^= 0xff;
        let err = TarReader::new(tar).find("a").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArchiveCorrupt);
    }

    #[test]
    fn truncated_container_is_archive_corrupt() {
        let tar = fixtures::tar_archive(&[("a", b"1".as_slice())]);
        let err = TarReader::new(tar[..300].to_vec()).find("a").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArchiveCorrupt);
    }

    #[test]
    fn entry_past_end_of_container_is_archive_corrupt() {
        let tar = fixtures::tar_archive(&[("a", [7u8; 127].as_slice())]);
        let err = TarReader::new(tar[..522].to_vec()).find("a").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArchiveCorrupt);
        assert!(err.to_string().contains("past end of container"));
    }

    fn restamp_checksum(block: &mut [u8]) {
        block[CHECKSUM.0..CHECKSUM.1].fill(b' ');
        let sum: u32 = block[..TAR_BLOCK_LEN as usize].iter().map(|&b| u32::from(b)).sum();
        block[CHECKSUM.0..CHECKSUM.1].copy_from_slice(format!("{sum:06o}\0 ").as_bytes());
    }

    #[test]
    fn huge_base256_long_name_size_is_archive_corrupt() {
        let long = "n".repeat(150);
        let mut tar = fixtures::tar_archive(&[(long.as_str(), b"data".as_slice())]);
        assert_eq!(tar[TYPEFLAG], b'L');

        let field = &mut tar[SIZE.0..SIZE.1];
        field.fill(0);
        field[0] = 0x80;
        field[4..].copy_from_slice(&(u64::MAX - 1000).to_be_bytes());
        restamp_checksum(&mut tar);

        let err = TarReader::new(tar).find(&long).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArchiveCorrupt);
    }

    #[test]
    fn pax_path_record_is_parsed() {
        let body = b"30 mtime=1700000000.123456789\n21 path=dir/file.zip\n";
        assert_eq!(pax_path(body).as_deref(), Some("dir/file.zip"));
    }

    #[test]
    fn base256_size_is_decoded() {
        let mut field = [0u8; 12];
        field[0] = 0x80;
        field[10] = 0x01;
        field[11] = 0x02;
        assert_eq!(parse_size(&field, 0).unwrap(), 0x0102);
    }
}
