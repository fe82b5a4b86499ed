//! Byte-order and bounded I/O primitives.
//!
//! These mirror the `ReadUtil`/`WriteUtil`/`SeekUtil` extension traits the
//! atom layer uses for tag parsing, but distinguish a short read (a
//! malformed container) from a genuine I/O failure, which the tag parser
//! doesn't need to care about but the flattener does.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::error::{Error, ErrorKind};

/// Reads exactly `len` bytes, distinguishing a short read from a system
/// error. A short (but nonzero) read means the container is truncated or
/// malformed, not that I/O failed, so it's reported as [`ErrorKind::NotMovie`]
/// rather than [`ErrorKind::ReadError`].
pub fn read_exact_checked(reader: &mut impl Read, len: usize) -> crate::Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    read_into_checked(reader, &mut buf)?;
    Ok(buf)
}

/// Like [`read_exact_checked`] but fills a caller-provided buffer.
pub fn read_into_checked(reader: &mut impl Read, buf: &mut [u8]) -> crate::Result<()> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            Err(Error::new(ErrorKind::NotMovie, "Unexpected end of file while reading atom data"))
        }
        Err(e) => Err(Error::new(ErrorKind::ReadError(e), "Error reading from file")),
    }
}

/// Writes all of `buf`, mapping any I/O failure to [`ErrorKind::WriteError`].
pub fn write_all_checked(writer: &mut impl Write, buf: &[u8]) -> crate::Result<()> {
    writer
        .write_all(buf)
        .map_err(|e| Error::new(ErrorKind::WriteError(e), "Error writing to file"))
}

/// Returns the total length of `file`, restoring its current position.
pub fn file_size(file: &mut File) -> crate::Result<u64> {
    let current = file
        .stream_position()
        .map_err(|e| Error::new(ErrorKind::ReadError(e), "Error querying file position"))?;
    let size = file
        .seek(SeekFrom::End(0))
        .map_err(|e| Error::new(ErrorKind::ReadError(e), "Error querying file size"))?;
    file.seek(SeekFrom::Start(current))
        .map_err(|e| Error::new(ErrorKind::ReadError(e), "Error restoring file position"))?;
    Ok(size)
}

pub trait ReadBeExt: Read {
    fn read_be_u32(&mut self) -> crate::Result<u32> {
        let mut buf = [0u8; 4];
        read_into_checked(self, &mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    fn read_be_u64(&mut self) -> crate::Result<u64> {
        let mut buf = [0u8; 8];
        read_into_checked(self, &mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }
}

impl<T: Read> ReadBeExt for T {}

pub trait WriteBeExt: Write {
    fn write_be_u32(&mut self, val: u32) -> crate::Result<()> {
        write_all_checked(self, &val.to_be_bytes())
    }

    fn write_be_u64(&mut self, val: u64) -> crate::Result<()> {
        write_all_checked(self, &val.to_be_bytes())
    }
}

impl<T: Write> WriteBeExt for T {}

pub trait SeekUtil: Seek {
    fn skip(&mut self, offset: i64) -> crate::Result<()> {
        self.seek(SeekFrom::Current(offset))
            .map_err(|e| Error::new(ErrorKind::ReadError(e), "Error seeking"))?;
        Ok(())
    }
}

impl<T: Seek> SeekUtil for T {}
