//! The four-character-code identifier type, and the type codes the
//! flattener recognizes.

use std::fmt::{self, Write};
use std::ops::{Deref, DerefMut};
use std::str::FromStr;

use std::array::TryFromSliceError;

/// A 4 byte atom identifier (four character code).
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Fourcc(pub [u8; 4]);

impl Deref for Fourcc {
    type Target = [u8; 4];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Fourcc {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<u32> for Fourcc {
    fn from(val: u32) -> Self {
        Fourcc(val.to_be_bytes())
    }
}

impl From<Fourcc> for u32 {
    fn from(val: Fourcc) -> Self {
        u32::from_be_bytes(val.0)
    }
}

impl FromStr for Fourcc {
    type Err = TryFromSliceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Fourcc(s.as_bytes().try_into()?))
    }
}

impl fmt::Debug for Fourcc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Fourcc(")?;
        for c in self.0.iter().map(|b| char::from(*b)) {
            f.write_char(c)?;
        }
        f.write_str(")")?;
        Ok(())
    }
}

impl fmt::Display for Fourcc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.0.iter().map(|b| char::from(*b)) {
            f.write_char(c)?;
        }
        Ok(())
    }
}

/// (`ftyp`) File type compatibility atom.
pub const FILETYPE: Fourcc = Fourcc(*b"ftyp");
/// (`moov`) Movie metadata atom.
pub const MOVIE: Fourcc = Fourcc(*b"moov");
/// (`mdat`) Media data atom.
pub const MEDIA_DATA: Fourcc = Fourcc(*b"mdat");
/// (`free`) Free space atom.
pub const FREE: Fourcc = Fourcc(*b"free");
/// (`skip`) Free space atom, semantically identical to `free`.
pub const SKIP: Fourcc = Fourcc(*b"skip");
/// (`wide`) Placeholder reserved by some encoders ahead of `mdat`.
pub const WIDE: Fourcc = Fourcc(*b"wide");
/// (`trak`) Single track container.
pub const TRACK: Fourcc = Fourcc(*b"trak");
/// (`mdia`) Track media container.
pub const MEDIA: Fourcc = Fourcc(*b"mdia");
/// (`minf`) Media information container.
pub const MEDIA_INFORMATION: Fourcc = Fourcc(*b"minf");
/// (`stbl`) Sample table container.
pub const SAMPLE_TABLE: Fourcc = Fourcc(*b"stbl");
/// (`stco`) 32 bit chunk offset table.
pub const CHUNK_OFFSET_32: Fourcc = Fourcc(*b"stco");
/// (`co64`) 64 bit chunk offset table.
pub const CHUNK_OFFSET_64: Fourcc = Fourcc(*b"co64");
/// (`cmov`) Compressed movie atom, wraps `dcom`/`cmvd`.
pub const COMPRESSED_MOVIE: Fourcc = Fourcc(*b"cmov");
/// (`dcom`) Compression id atom inside `cmov`.
pub const COMPRESSION_ID: Fourcc = Fourcc(*b"dcom");
/// (`cmvd`) Compressed movie data atom inside `cmov`.
pub const COMPRESSED_MOVIE_DATA: Fourcc = Fourcc(*b"cmvd");
/// (`zlib`) The only compression id this implementation understands.
pub const ZLIB: Fourcc = Fourcc(*b"zlib");
/// (`qt  `) The QuickTime compatibility brand `ftyp` must advertise.
pub const QUICKTIME_BRAND: Fourcc = Fourcc(*b"qt  ");

/// Atom types whose body is itself a sequence of child atoms, per the
/// offset rewriter's descend set.
pub const DESCEND_SET: [Fourcc; 5] = [MOVIE, TRACK, MEDIA, MEDIA_INFORMATION, SAMPLE_TABLE];

/// Whether `apply_offsets` should recurse into this atom's body rather
/// than skip over it.
pub fn should_descend(fourcc: Fourcc) -> bool {
    DESCEND_SET.contains(&fourcc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_ascii() {
        assert_eq!(MOVIE.to_string(), "moov");
        assert_eq!(QUICKTIME_BRAND.to_string(), "qt  ");
    }

    #[test]
    fn descend_set_matches_spec() {
        assert!(should_descend(MOVIE));
        assert!(should_descend(TRACK));
        assert!(should_descend(MEDIA));
        assert!(should_descend(MEDIA_INFORMATION));
        assert!(should_descend(SAMPLE_TABLE));
        assert!(!should_descend(FREE));
        assert!(!should_descend(CHUNK_OFFSET_32));
    }
}
