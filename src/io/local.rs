use super::ReadAt;
use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;

/// Local file reader with random access support.
///
/// A reader may cover the whole file or a window of it, which is how tar
/// entries are handed to the ZIP parser without copying them out of the
/// container. Windows share the underlying file handle; it is closed when
/// the last reader referring to it is dropped.
#[derive(Clone)]
pub struct LocalFileReader {
    file: Arc<File>,
    base: u64,
    size: u64,
}

impl LocalFileReader {
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            file: Arc::new(file),
            base: 0,
            size,
        })
    }

    /// A reader over `len` bytes starting at `offset` within this reader.
    pub fn window(&self, offset: u64, len: u64) -> io::Result<Self> {
        let in_bounds = offset
            .checked_add(len)
            .is_some_and(|end| end <= self.size);
        if !in_bounds {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "window {offset}+{len} exceeds reader size {}",
                    self.size
                ),
            ));
        }
        Ok(Self {
            file: Arc::clone(&self.file),
            base: self.base + offset,
            size: len,
        })
    }
}

impl ReadAt for LocalFileReader {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset >= self.size {
            return Ok(0);
        }
        let want = buf
            .len()
            .min(usize::try_from(self.size - offset).unwrap_or(usize::MAX));
        let buf = &mut buf[..want];
        let pos = self.base + offset;

        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            self.file.read_at(buf, pos)
        }

        #[cfg(windows)]
        {
            use std::os::windows::fs::FileExt;
            self.file.seek_read(buf, pos)
        }

        #[cfg(not(any(unix, windows)))]
        {
            let _ = (buf, pos);
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "positional reads are not supported on this platform",
            ))
        }
    }

    fn size(&self) -> u64 {
        self.size
    }
}
