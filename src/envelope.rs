//! The Compressed-Moov envelope: the `moov/cmov/{dcom,cmvd}` nesting that
//! wraps a deflated plain `moov`, and its codec.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::atom::ident::{Fourcc, COMPRESSED_MOVIE, COMPRESSED_MOVIE_DATA, COMPRESSION_ID, MOVIE, ZLIB};
use crate::error::{Error, ErrorKind};

/// Encodes `moov_body` (a decompressed plain `moov` atom, header included)
/// as the 40-byte envelope plus its deflate stream, per the external
/// interface's Compressed-Movie envelope layout:
///
/// ```text
/// 0x00  u32  outer moov size  = 40 + deflate_length
/// 0x04  4cc  'moov'
/// 0x08  u32  cmov size        = 32 + deflate_length
/// 0x0C  4cc  'cmov'
/// 0x10  u32  dcom size        = 12
/// 0x14  4cc  'dcom'
/// 0x18  4cc  'zlib'
/// 0x1C  u32  cmvd size        = 12 + deflate_length
/// 0x20  4cc  'cmvd'
/// 0x24  u32  decompressed size of inner moov
/// 0x28  ...  deflate stream
/// ```
///
/// `moov_body` passed in here is the *content* of the plain moov (header
/// excluded by the caller is not required — callers pass the full atom
/// including its own 8-byte header, matching `decompressed_len`).
pub fn encode(moov_atom: &[u8], level: Compression) -> crate::Result<Vec<u8>> {
    let deflated = deflate(moov_atom, level)?;
    let deflate_len = deflated.len() as u64;

    let mut out = Vec::with_capacity(40 + deflated.len());
    out.extend_from_slice(&(40 + deflate_len).to_be_bytes());
    out.extend_from_slice(&*MOVIE);
    out.extend_from_slice(&(32 + deflate_len).to_be_bytes());
    out.extend_from_slice(&*COMPRESSED_MOVIE);
    out.extend_from_slice(&12u32.to_be_bytes());
    out.extend_from_slice(&*COMPRESSION_ID);
    out.extend_from_slice(&*ZLIB);
    out.extend_from_slice(&(12 + deflate_len).to_be_bytes());
    out.extend_from_slice(&*COMPRESSED_MOVIE_DATA);
    out.extend_from_slice(&(moov_atom.len() as u32).to_be_bytes());
    out.extend_from_slice(&deflated);
    Ok(out)
}

fn deflate(data: &[u8], level: Compression) -> crate::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), level);
    encoder
        .write_all(data)
        .map_err(|e| Error::new(ErrorKind::MemoryError, format!("zlib compression failed: {e}")))?;
    encoder
        .finish()
        .map_err(|e| Error::new(ErrorKind::MemoryError, format!("zlib compression failed: {e}")))
}

/// If `moov_atom`'s first child is `cmov`, decodes the wrapped `dcom`/`cmvd`
/// pair and inflates the deflate stream into a fresh plain `moov` buffer of
/// exactly the declared decompressed length. Returns `Ok(None)` if the
/// first child is not `cmov` (the movie is already uncompressed).
///
/// `dcom` advertising any codec other than `zlib` is `ErrorKind::FileTooComplex`.
/// A decompressed length mismatch is `ErrorKind::NotMovie`.
pub fn decode(moov_atom: &[u8]) -> crate::Result<Option<Vec<u8>>> {
    if moov_atom.len() < 8 {
        return Err(Error::new(ErrorKind::NotMovie, "moov atom too small to contain a header"));
    }
    let body = &moov_atom[8..];
    let Some((cmov_fourcc, cmov_body)) = first_child(body)? else {
        return Ok(None);
    };
    if cmov_fourcc != COMPRESSED_MOVIE {
        return Ok(None);
    }

    let mut codec = None;
    let mut cmvd = None;
    let mut pos = 0;
    while pos < cmov_body.len() {
        let (fourcc, child_body, consumed) = next_child(cmov_body, pos)?;
        if fourcc == COMPRESSION_ID {
            if child_body.len() < 4 {
                return Err(Error::new(ErrorKind::NotMovie, "dcom atom too small"));
            }
            codec = Some(Fourcc(child_body[0..4].try_into().unwrap()));
        } else if fourcc == COMPRESSED_MOVIE_DATA {
            cmvd = Some(child_body);
        }
        pos += consumed;
    }

    let codec = codec.ok_or_else(|| Error::new(ErrorKind::NotMovie, "cmov is missing its dcom child"))?;
    if codec != ZLIB {
        return Err(Error::new(
            ErrorKind::FileTooComplex,
            format!("Unsupported moov compression codec '{codec}'"),
        ));
    }
    let cmvd = cmvd.ok_or_else(|| Error::new(ErrorKind::NotMovie, "cmov is missing its cmvd child"))?;
    if cmvd.len() < 4 {
        return Err(Error::new(ErrorKind::NotMovie, "cmvd atom too small to hold a decompressed length"));
    }
    let decompressed_len = u32::from_be_bytes(cmvd[0..4].try_into().unwrap()) as usize;
    let deflated = &cmvd[4..];

    let mut decoder = ZlibDecoder::new(deflated);
    let mut out = Vec::with_capacity(decompressed_len);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::new(ErrorKind::NotMovie, format!("Failed to inflate compressed moov: {e}")))?;

    if out.len() != decompressed_len {
        return Err(Error::new(
            ErrorKind::NotMovie,
            "Inflated moov length doesn't match the declared decompressed size",
        ));
    }

    Ok(Some(out))
}

fn first_child(body: &[u8]) -> crate::Result<Option<(Fourcc, &[u8])>> {
    if body.is_empty() {
        return Ok(None);
    }
    let (fourcc, child_body, _) = next_child(body, 0)?;
    Ok(Some((fourcc, child_body)))
}

/// Parses one atom at `pos` within `body`, returning its type, its body
/// slice, and the number of bytes consumed (its full declared length).
fn next_child(body: &[u8], pos: usize) -> crate::Result<(Fourcc, &[u8], usize)> {
    if body.len() - pos < 8 {
        return Err(Error::new(ErrorKind::NotMovie, "Truncated atom header inside cmov"));
    }
    let size32 = u32::from_be_bytes(body[pos..pos + 4].try_into().unwrap());
    let fourcc = Fourcc(body[pos + 4..pos + 8].try_into().unwrap());
    let (len, header_len) = if size32 == 1 {
        if body.len() - pos < 16 {
            return Err(Error::new(ErrorKind::NotMovie, "Truncated extended atom header inside cmov"));
        }
        (u64::from_be_bytes(body[pos + 8..pos + 16].try_into().unwrap()), 16usize)
    } else {
        (size32 as u64, 8usize)
    };
    if len < header_len as u64 || pos as u64 + len > body.len() as u64 {
        return Err(Error::new(ErrorKind::NotMovie, "Atom inside cmov exceeds remaining bytes"));
    }
    let body_start = pos + header_len;
    let body_end = pos + len as usize;
    Ok((fourcc, &body[body_start..body_end], len as usize))
}
