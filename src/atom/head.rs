use std::fs::File;
use std::io::{self, Read};

use crate::error::{Error, ErrorKind};
use crate::ioutil::{file_size, ReadBeExt};

use super::ident::Fourcc;

/// The size of an atom, tracking whether the 16-byte extended header form
/// was used.
///
/// `len` always includes the header itself, mirroring the on-disk 32/64 bit
/// size field semantics described in the container's atom preamble.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Size {
    ext: bool,
    len: u64,
}

impl Size {
    /// Builds a `Size` from its extended-header flag and full atom length.
    pub const fn new(ext: bool, len: u64) -> Self {
        Self { ext, len }
    }

    /// Whether this atom used the 16-byte extended-size header.
    pub const fn ext(&self) -> bool {
        self.ext
    }

    /// The full atom length, header included.
    pub const fn len(&self) -> u64 {
        self.len
    }

    /// The length of just the header (8 or 16 bytes).
    pub const fn head_len(&self) -> u64 {
        match self.ext {
            true => 16,
            false => 8,
        }
    }

    /// The length of the atom body, header excluded.
    pub const fn content_len(&self) -> u64 {
        self.len - self.head_len()
    }
}

/// An atom's 8- or 16-byte preamble: its [`Size`] and [`Fourcc`] type code.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Head {
    size: Size,
    fourcc: Fourcc,
}

impl Head {
    /// Pairs a `Size` with the atom's type code.
    pub const fn new(size: Size, fourcc: Fourcc) -> Self {
        Self { size, fourcc }
    }

    /// This atom's `Size`.
    pub const fn size(&self) -> Size {
        self.size
    }

    /// This atom's four-character-code type.
    pub const fn fourcc(&self) -> Fourcc {
        self.fourcc
    }

    /// The full atom length, header included.
    pub const fn len(&self) -> u64 {
        self.size.len()
    }

    /// The length of just the header (8 or 16 bytes).
    pub const fn head_len(&self) -> u64 {
        self.size.head_len()
    }

    /// The length of the atom body, header excluded.
    pub const fn content_len(&self) -> u64 {
        self.size.content_len()
    }
}

/// Reads an atom's header at the reader's current position.
///
/// Returns `Ok(None)` on a clean end-of-stream (zero bytes read), which the
/// driver treats as a loop terminator rather than an error. A short but
/// nonzero read is a malformed container (`ErrorKind::NotMovie`), never a
/// system error.
///
/// `size == 1` triggers the 8-byte extended-size form (16-byte header
/// total). `size == 0` means the atom runs to end-of-file and `file_size`
/// is consulted to compute its effective length.
pub fn parse_head(file: &mut File) -> crate::Result<Option<Head>> {
    let mut buf = [0u8; 8];
    let n = read_prefix(file, &mut buf)?;
    if n == 0 {
        return Ok(None);
    }
    if n < 8 {
        return Err(Error::new(ErrorKind::NotMovie, "Truncated atom header"));
    }

    let size32 = u32::from_be_bytes(buf[0..4].try_into().unwrap());
    let fourcc = Fourcc(buf[4..8].try_into().unwrap());

    let size = if size32 == 1 {
        let ext_len = file.read_be_u64()?;
        Size::new(true, ext_len)
    } else if size32 == 0 {
        let current = file
            .stream_position()
            .map_err(|e| Error::new(ErrorKind::ReadError(e), "Error querying file position"))?;
        let total = file_size(file)?;
        Size::new(false, total - current + 8)
    } else {
        Size::new(false, size32 as u64)
    };

    if size.len() < size.head_len() {
        return Err(Error::new(ErrorKind::NotMovie, "Atom size smaller than its own header"));
    }

    Ok(Some(Head::new(size, fourcc)))
}

/// Reads up to `buf.len()` bytes, returning the number of bytes actually
/// read. `0` means clean EOF before any byte was read, which callers treat
/// as a loop terminator; any other short read is `NotMovie`.
fn read_prefix(file: &mut File, buf: &mut [u8]) -> crate::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match file.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::new(ErrorKind::ReadError(e), "Error reading atom header")),
        }
    }
    Ok(total)
}

/// Writes an atom's header in the matching (standard or extended) form.
pub fn write_head(writer: &mut impl io::Write, head: Head) -> crate::Result<()> {
    use crate::ioutil::write_all_checked;

    if head.size.ext {
        write_all_checked(writer, &1u32.to_be_bytes())?;
        write_all_checked(writer, &*head.fourcc)?;
        write_all_checked(writer, &head.len().to_be_bytes())?;
    } else {
        write_all_checked(writer, &(head.len() as u32).to_be_bytes())?;
        write_all_checked(writer, &*head.fourcc)?;
    }
    Ok(())
}
