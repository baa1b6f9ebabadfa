//! ZIP archive parsing and extraction.
//!
//! This module provides functionality for reading and extracting ZIP archives,
//! supporting both standard ZIP format and ZIP64 extensions for large archives.
//!
//! ## Architecture
//!
//! - [`structures`]: Data structures representing ZIP format elements (EOCD, file headers, etc.)
//! - [`parser`]: Low-level parsing of ZIP structures from raw bytes
//! - [`crypto`]: Traditional PKWARE and WinZip AES decryption
//! - [`extractor`]: Member lookup and streaming extraction
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! This implementation reads the EOCD first (from the end of the file),
//! then the Central Directory, and only touches member data when a member
//! is opened.
//!
//! ## Supported Features
//!
//! - Standard ZIP format (PKZIP APPNOTE 6.3.x compatible)
//! - ZIP64 extensions for files > 4GB
//! - STORED (no compression) and DEFLATE compression methods
//! - Traditional PKWARE encryption and WinZip AES (AE-1, AE-2)
//!
//! ## Limitations
//!
//! - No PKWARE strong encryption
//! - No multi-disk archive support
//! - No BZIP2, LZMA, or other compression methods

pub mod crypto;
mod extractor;
mod member;
mod parser;
mod structures;

pub use extractor::ZipExtractor;
pub use member::MemberReader;
pub use parser::ZipParser;
pub use structures::*;
