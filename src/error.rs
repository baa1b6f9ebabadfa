//! Error types for archive traversal and record decoding.
//!
//! Every failure aborts the current extraction run. Structural failures
//! carry the member name or byte offset that triggered them, and the walker
//! wraps them in [`Error::Within`] so the message also names the nesting
//! level that was being processed.

use std::fmt;
use std::io;

use thiserror::Error;

/// Nesting level inside a USPS container file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// The top-level uncompressed tar container.
    Container,
    /// `zip4.zip` or `ctystate.zip` inside the container.
    OuterArchive,
    /// A per-partition `zip4mstNNN.zip` inside `zip4.zip`.
    PartitionArchive,
    /// A fixed-width text member.
    TextMember,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Container => "container",
            Level::OuterArchive => "outer archive",
            Level::PartitionArchive => "partition archive",
            Level::TextMember => "text member",
        };
        f.write_str(name)
    }
}

/// Flat classification of an [`Error`], with context wrappers removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ArchiveCorrupt,
    MemberNotFound,
    UnexpectedMember,
    UnexpectedMemberCount,
    DecryptionFailed,
    TruncatedStream,
    MalformedRecord,
    Io,
}

#[derive(Debug, Error)]
pub enum Error {
    /// The bytes cannot be parsed as the expected container format.
    #[error("archive is corrupt: {0}")]
    ArchiveCorrupt(String),

    /// A required member is absent.
    #[error("member not found: {0}")]
    MemberNotFound(String),

    /// A member name does not match what the layout requires.
    #[error("unexpected member {name:?} (expected {expected})")]
    UnexpectedMember { name: String, expected: String },

    /// The archive holds a different number of members than required.
    #[error("expected {expected} members (found {found})")]
    UnexpectedMemberCount { expected: usize, found: usize },

    /// Wrong password, missing password or unsupported protection scheme.
    #[error("failed to decrypt {name:?}: {reason}")]
    DecryptionFailed { name: String, reason: String },

    /// The stream length is not a whole number of records.
    #[error(
        "truncated stream: {trailing} trailing bytes at offset {offset} (record length {record_len})"
    )]
    TruncatedStream {
        offset: u64,
        record_len: usize,
        trailing: usize,
    },

    /// A record buffer has the wrong length for its schema.
    #[error("malformed {schema} record: expected {expected} bytes, got {actual}")]
    MalformedRecord {
        schema: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A field holds bytes that are not valid text.
    #[error("malformed record: field {field} is not valid UTF-8 at byte {offset}")]
    InvalidText { field: &'static str, offset: usize },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Context added while walking nested archives.
    #[error("{level} {member:?}: {source}")]
    Within {
        level: Level,
        member: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap this error with the nesting level and member being processed.
    pub fn within(self, level: Level, member: impl Into<String>) -> Self {
        Error::Within {
            level,
            member: member.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, with all [`Error::Within`] wrappers removed.
    pub fn root(&self) -> &Error {
        let mut err = self;
        while let Error::Within { source, .. } = err {
            err = source;
        }
        err
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ArchiveCorrupt(_) => ErrorKind::ArchiveCorrupt,
            Error::MemberNotFound(_) => ErrorKind::MemberNotFound,
            Error::UnexpectedMember { .. } => ErrorKind::UnexpectedMember,
            Error::UnexpectedMemberCount { .. } => ErrorKind::UnexpectedMemberCount,
            Error::DecryptionFailed { .. } => ErrorKind::DecryptionFailed,
            Error::TruncatedStream { .. } => ErrorKind::TruncatedStream,
            Error::MalformedRecord { .. } | Error::InvalidText { .. } => ErrorKind::MalformedRecord,
            Error::Io(_) => ErrorKind::Io,
            Error::Within { source, .. } => source.kind(),
        }
    }

    /// Levels this error passed through, outermost first.
    pub fn levels(&self) -> Vec<Level> {
        let mut levels = Vec::new();
        let mut err = self;
        while let Error::Within { level, source, .. } = err {
            levels.push(*level);
            err = source;
        }
        levels
    }

    /// Recover a typed error carried inside an `io::Error`.
    ///
    /// Member streams are plain `Read` implementations, so decryption and
    /// integrity failures travel through `io::Error` until the record reader
    /// unpacks them here.
    pub fn from_io(err: io::Error) -> Self {
        if !err.get_ref().is_some_and(|inner| inner.is::<Error>()) {
            return Error::Io(err);
        }
        let kind = err.kind();
        match err.into_inner().map(|inner| inner.downcast::<Error>()) {
            Some(Ok(typed)) => *typed,
            Some(Err(other)) => Error::Io(io::Error::new(kind, other)),
            None => Error::Io(io::Error::from(kind)),
        }
    }

    pub(crate) fn into_io(self) -> io::Error {
        match self {
            Error::Io(err) => err,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_peels_context_wrappers() {
        let err = Error::MemberNotFound("zip4.zip".into())
            .within(Level::OuterArchive, "zip4.zip")
            .within(Level::Container, "epf.tar");

        assert_eq!(err.kind(), ErrorKind::MemberNotFound);
        assert_eq!(err.levels(), vec![Level::Container, Level::OuterArchive]);
        assert!(matches!(err.root(), Error::MemberNotFound(name) if name == "zip4.zip"));
    }

    #[test]
    fn message_names_level_and_member() {
        let err = Error::UnexpectedMemberCount {
            expected: 2,
            found: 3,
        }
        .within(Level::PartitionArchive, "zip4mst01.zip");

        let msg = err.to_string();
        assert!(msg.contains("partition archive"));
        assert!(msg.contains("zip4mst01.zip"));
        assert!(msg.contains("expected 2 members (found 3)"));
    }

    #[test]
    fn typed_error_survives_io_round_trip() {
        let io_err = Error::DecryptionFailed {
            name: "a.txt".into(),
            reason: "bad password".into(),
        }
        .into_io();

        let back = Error::from_io(io_err);
        assert_eq!(back.kind(), ErrorKind::DecryptionFailed);
    }

    #[test]
    fn plain_io_error_stays_io() {
        let err = Error::from_io(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
