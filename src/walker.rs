//! Nested archive walker.
//!
//! A USPS national container is an uncompressed tar holding two ZIP
//! archives at fixed paths:
//!
//! ```text
//! epf-zip4natl/zip4/zip4.zip
//!     zip4mst001.zip            (encrypted)
//!         zip4mst001.txt        182-byte ZIP+4 rows
//!         <second member>
//!     zip4mst002.zip
//!     ...
//! epf-zip4natl/ctystate/ctystate.zip
//!     ctystate.txt              (encrypted) 129-byte city/state rows
//!     <second member>
//! ```
//!
//! The walker validates the expected shape at every level and exposes the
//! decoded detail rows as pull-based iterators. Partition archives are
//! decompressed one at a time; the tar and `zip4.zip` are read in place
//! through windows of the container file.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use log::{debug, info};
use regex::Regex;

use crate::error::{Error, Level, Result};
use crate::io::{LocalFileReader, ReadAt};
use crate::record::{CityStateDetail, RecordReader, Zip4Detail};
use crate::tar::{TarEntry, TarReader};
use crate::zip::{MemberReader, ZipExtractor, ZipFileEntry};

pub const ZIP4_ARCHIVE_PATH: &str = "epf-zip4natl/zip4/zip4.zip";
pub const CITY_STATE_ARCHIVE_PATH: &str = "epf-zip4natl/ctystate/ctystate.zip";
pub const CITY_STATE_TEXT: &str = "ctystate.txt";

/// Members every inner archive must contain.
const INNER_MEMBER_COUNT: usize = 2;

static PARTITION_ARCHIVE: OnceLock<Regex> = OnceLock::new();
static PARTITION_TEXT: OnceLock<Regex> = OnceLock::new();

fn partition_archive_pattern() -> &'static Regex {
    PARTITION_ARCHIVE
        .get_or_init(|| Regex::new(r"^zip4mst[0-9]+\.zip$").expect("Invalid partition archive pattern"))
}

fn partition_text_pattern() -> &'static Regex {
    PARTITION_TEXT
        .get_or_init(|| Regex::new(r"^zip4mst[0-9]+\.txt$").expect("Invalid partition text pattern"))
}

/// Paths of the two archives inside a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub zip4_archive: String,
    pub city_state_archive: String,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            zip4_archive: ZIP4_ARCHIVE_PATH.to_string(),
            city_state_archive: CITY_STATE_ARCHIVE_PATH.to_string(),
        }
    }
}

/// An opened top-level container file.
///
/// The file handle is shared by every reader derived from it and is closed
/// once the container and all record iterators created from it are dropped.
pub struct Container {
    path: PathBuf,
    tar: TarReader<LocalFileReader>,
    layout: Layout,
}

impl Container {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = LocalFileReader::new(path)
            .map_err(|e| Error::from(e).within(Level::Container, path.display().to_string()))?;
        debug!("opened container {} ({} bytes)", path.display(), reader.size());
        Ok(Self {
            path: path.to_path_buf(),
            tar: TarReader::new(reader),
            layout: Layout::default(),
        })
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every entry of the tar container, in archive order.
    pub fn entries(&self) -> Result<Vec<TarEntry>> {
        self.tar
            .entries()
            .collect::<Result<Vec<_>>>()
            .map_err(|e| self.container_error(e))
    }

    fn container_error(&self, err: Error) -> Error {
        err.within(Level::Container, self.path.display().to_string())
    }

    /// Open a ZIP archive stored as a container entry, without copying it.
    pub fn open_archive(&self, name: &str) -> Result<ZipExtractor<LocalFileReader>> {
        let entry = self.tar.find(name).map_err(|e| self.container_error(e))?;
        let window = self
            .tar
            .reader()
            .window(entry.offset, entry.size)
            .map_err(|e| {
                self.container_error(Error::ArchiveCorrupt(format!(
                    "tar entry {name} extends past end of container: {e}"
                )))
            })?;
        let archive = ZipExtractor::new(Arc::new(window)).map_err(|e| e.within(Level::OuterArchive, name))?;
        debug!("opened {name} ({} members)", archive.entries().len());
        Ok(archive)
    }

    /// Stream every ZIP+4 detail record across all partitions.
    ///
    /// Every member name of the outer archive is validated before any
    /// partition is opened, so a layout change is reported before a single
    /// record is yielded.
    pub fn zip4_records(&self, password: &str) -> Result<Zip4Records> {
        let outer_name = self.layout.zip4_archive.clone();
        let outer = self.open_archive(&outer_name)?;

        let partitions: Vec<ZipFileEntry> = outer.entries().to_vec();
        for entry in &partitions {
            if !partition_archive_pattern().is_match(&entry.file_name) {
                return Err(Error::UnexpectedMember {
                    name: entry.file_name.clone(),
                    expected: "zip4mst<digits>.zip".into(),
                }
                .within(Level::OuterArchive, outer_name));
            }
        }
        info!("{outer_name}: {} partition archives", partitions.len());

        Ok(Zip4Records {
            outer,
            outer_name,
            partitions: partitions.into_iter(),
            password: password.to_string(),
            current: None,
            done: false,
        })
    }

    /// Stream every city/state detail record.
    pub fn city_state_records(&self, password: &str) -> Result<CityStateRecords> {
        let outer_name = self.layout.city_state_archive.clone();
        let outer = self.open_archive(&outer_name)?;

        let text = expect_text_member(outer.entries(), |name| name == CITY_STATE_TEXT, CITY_STATE_TEXT)
            .map_err(|e| e.within(Level::OuterArchive, outer_name.as_str()))?;
        let member = outer.open_member(&text, Some(password)).map_err(|e| {
            e.within(Level::TextMember, text.file_name.as_str())
                .within(Level::OuterArchive, outer_name.as_str())
        })?;

        Ok(CityStateRecords {
            outer_name,
            text: text.file_name,
            records: RecordReader::new(member),
        })
    }
}

/// Check an inner archive's shape and return its text member.
fn expect_text_member(
    entries: &[ZipFileEntry],
    matches: impl Fn(&str) -> bool,
    expected: &str,
) -> Result<ZipFileEntry> {
    if entries.len() != INNER_MEMBER_COUNT {
        return Err(Error::UnexpectedMemberCount {
            expected: INNER_MEMBER_COUNT,
            found: entries.len(),
        });
    }
    let first = &entries[0];
    if !matches(&first.file_name) {
        return Err(Error::UnexpectedMember {
            name: first.file_name.clone(),
            expected: expected.to_string(),
        });
    }
    Ok(first.clone())
}

struct Partition {
    name: String,
    text: String,
    records: RecordReader<Zip4Detail, MemberReader>,
}

/// ZIP+4 detail records from every partition, in archive order.
///
/// The first error ends the sequence. Records yielded before it are not
/// retracted.
pub struct Zip4Records {
    outer: ZipExtractor<LocalFileReader>,
    outer_name: String,
    partitions: std::vec::IntoIter<ZipFileEntry>,
    password: String,
    current: Option<Partition>,
    done: bool,
}

impl Zip4Records {
    /// Name of the partition archive currently being read.
    pub fn partition(&self) -> Option<&str> {
        self.current.as_ref().map(|p| p.name.as_str())
    }

    fn open_partition(&self, entry: &ZipFileEntry) -> Result<Partition> {
        let name = entry.file_name.as_str();
        let bytes = self.outer.extract_to_memory(entry, Some(&self.password))?;
        let archive = ZipExtractor::new(Arc::new(bytes))?;

        let text = expect_text_member(
            archive.entries(),
            |n| partition_text_pattern().is_match(n),
            "zip4mst<digits>.txt",
        )?;
        let member = archive
            .open_member(&text, Some(&self.password))
            .map_err(|e| e.within(Level::TextMember, text.file_name.as_str()))?;
        debug!("{name}: reading {}", text.file_name);

        Ok(Partition {
            name: name.to_string(),
            text: text.file_name,
            records: RecordReader::new(member),
        })
    }
}

impl Iterator for Zip4Records {
    type Item = Result<Zip4Detail>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }

            if let Some(part) = &mut self.current {
                match part.records.next() {
                    Some(Ok(record)) => return Some(Ok(record)),
                    Some(Err(e)) => {
                        let err = e
                            .within(Level::TextMember, part.text.as_str())
                            .within(Level::PartitionArchive, part.name.as_str())
                            .within(Level::OuterArchive, self.outer_name.as_str());
                        self.done = true;
                        self.current = None;
                        return Some(Err(err));
                    }
                    None => {
                        info!(
                            "{}: {} records ({} rows)",
                            part.name,
                            part.records.details(),
                            part.records.rows()
                        );
                        self.current = None;
                    }
                }
            }

            let Some(entry) = self.partitions.next() else {
                self.done = true;
                return None;
            };
            match self.open_partition(&entry) {
                Ok(part) => self.current = Some(part),
                Err(e) => {
                    self.done = true;
                    let err = e
                        .within(Level::PartitionArchive, entry.file_name)
                        .within(Level::OuterArchive, self.outer_name.as_str());
                    return Some(Err(err));
                }
            }
        }
    }
}

impl std::iter::FusedIterator for Zip4Records {}

/// City/state detail records from `ctystate.txt`.
pub struct CityStateRecords {
    outer_name: String,
    text: String,
    records: RecordReader<CityStateDetail, MemberReader>,
}

impl Iterator for CityStateRecords {
    type Item = Result<CityStateDetail>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.records.next()?;
        Some(item.map_err(|e| {
            e.within(Level::TextMember, self.text.as_str())
                .within(Level::OuterArchive, self.outer_name.as_str())
        }))
    }
}

impl std::iter::FusedIterator for CityStateRecords {}
