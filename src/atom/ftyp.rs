//! Validation of the file-type compatibility atom (`ftyp`).

use crate::error::{Error, ErrorKind};

use super::ident::QUICKTIME_BRAND;

/// Checks that `atom`, the full `ftyp` atom bytes (8-byte header included),
/// meets the format's two requirements: a minimum length of 20 bytes (one
/// compatible brand beyond the mandatory major brand + minor version), and
/// at least one brand — major or compatible — equal to `qt  `.
pub fn validate_ftyp(atom: &[u8]) -> crate::Result<()> {
    if atom.len() < 20 {
        return Err(Error::new(ErrorKind::NotMovie, "ftyp atom is shorter than the minimum 20 bytes"));
    }

    let body = &atom[8..];
    let major = &body[0..4];
    if major == &*QUICKTIME_BRAND {
        return Ok(());
    }
    for compatible in body[8..].chunks_exact(4) {
        if compatible == &*QUICKTIME_BRAND {
            return Ok(());
        }
    }

    Err(Error::new(ErrorKind::NotMovie, "ftyp does not advertise the 'qt  ' compatible brand"))
}
