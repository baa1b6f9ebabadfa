//! # zip4county
//!
//! Reader for the USPS ZIP+4 national data distribution and a ZIP code to
//! county index built from it.
//!
//! The distribution is an uncompressed tar container holding ZIP archives
//! nested three levels deep, the innermost encrypted, around fixed-width text
//! files. This crate walks that structure with positional reads, decrypts and
//! inflates one member at a time, and decodes the rows into typed records
//! without ever holding the whole dataset in memory.
//!
//! ## Features
//!
//! - Uncompressed ustar containers (GNU long names, PAX paths)
//! - ZIP and ZIP64 archives, STORED and DEFLATE members
//! - Traditional PKWARE and WinZip AES (AE-1/AE-2) encryption
//! - ZIP+4 (182-byte) and city/state (129-byte) record layouts
//! - Deduplicated ZIP code to county index with CSV export
//! - Client for the USPS EPF download service
//!
//! ## Example
//!
//! ```no_run
//! use zip4county::{Container, CountyIndex};
//!
//! fn main() -> zip4county::Result<()> {
//!     let container = Container::open("epf-zip4natl.tar")?;
//!     let index = CountyIndex::from_container(&container, "password")?;
//!
//!     if let Some(counties) = index.get("02134") {
//!         println!("02134: {}", counties.join(","));
//!     }
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod epf;
pub mod error;
pub mod index;
pub mod io;
pub mod record;
pub mod tar;
pub mod walker;
pub mod zip;

#[cfg(test)]
mod fixtures;

pub use cli::Cli;
pub use error::{Error, ErrorKind, Level, Result};
pub use index::{CountyIndex, write_csv_row};
pub use io::{LocalFileReader, ReadAt};
pub use record::{CityStateDetail, CopyrightDetailCode, Record, RecordReader, Zip4Detail, Zip4Number};
pub use walker::{CityStateRecords, Container, Layout, Zip4Records};
pub use zip::{ZipExtractor, ZipFileEntry};
