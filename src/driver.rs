//! The flattening driver: `flatten_to_new_file` and `flatten_in_place`,
//! orchestrating the atom scan, the offset rewriter, and the compressed-moov
//! fixpoint loop.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::Path;

use flate2::Compression;

use crate::atom::head::{parse_head, write_head, Head};
use crate::atom::ident;
use crate::editlist::EditList;
use crate::envelope;
use crate::error::{Error, ErrorKind};
use crate::ioutil::{file_size, read_into_checked, write_all_checked};
use crate::offsets::apply_offsets;

const BOUNCE_BUFFER_SIZE: usize = 10 * 1024;

/// Rewrites `src` into a fresh file at `dst` so its `moov` precedes `mdat`.
///
/// `dst` is created with exclusive-create semantics (it must not already
/// exist); see [`crate::error::ErrorKind::WriteError`] if it does. When
/// `allow_compressed_moov` is set, the relocated `moov` is zlib-compressed
/// if doing so doesn't outgrow its own uncompressed size, via the
/// size-estimation fixpoint described in the crate's design notes.
pub fn flatten_to_new_file(src: &Path, dst: &Path, allow_compressed_moov: bool) -> crate::Result<()> {
    let mut src_file = open_read(src)?;
    let mut scanned = scan(&mut src_file)?;

    let ftyp_size = scanned.ftyp.as_ref().map_or(0, |f| f.len() as u64);
    let moov_size = scanned.moov.len() as u64;

    let metadata = if allow_compressed_moov {
        match compress_moov_fixpoint(&mut scanned.moov, &mut scanned.edits, ftyp_size, moov_size)? {
            Some(compressed) => compressed,
            // `compress_moov_fixpoint` already walked `moov` with the final
            // (uncompressed) cumulative shift before giving up; re-running
            // `apply_offsets` here would shift every entry a second time.
            None => scanned.moov,
        }
    } else {
        scanned.edits.add(ftyp_size, moov_size as i64);
        apply_offsets(&mut scanned.moov, &scanned.edits)?;
        scanned.moov
    };

    let mut dst_file = OpenOptions::new().write(true).create_new(true).open(dst).map_err(|e| {
        Error::new(ErrorKind::WriteError(e), format!("Error creating destination file {}", dst.display()))
    })?;

    if let Some(ftyp) = &scanned.ftyp {
        write_all_checked(&mut dst_file, ftyp)?;
    }
    write_all_checked(&mut dst_file, &metadata)?;

    seek_to(&mut src_file, ftyp_size)?;
    copy_remaining_atoms(&mut src_file, &mut dst_file)?;

    Ok(())
}

/// Rewrites `path` in place by reusing a pre-reserved `free` atom ahead of
/// `moov`. Media bytes are never touched or moved; only the head free
/// region (and, if the old `moov` site isn't reclaimed by truncation, its
/// type field) changes.
///
/// Fails with [`ErrorKind::NoFreeSpace`] if no usable free region precedes
/// `moov`, or if `moov` (optionally compressed) doesn't fit within it; the
/// file is left unchanged in that case.
pub fn flatten_in_place(path: &Path, allow_compressed_moov: bool) -> crate::Result<()> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| Error::new(ErrorKind::ReadError(e), format!("Error opening {}", path.display())))?;

    let (free_offset, free_size, moov_offset, moov_size) = scan_in_place(&mut file)?;

    if !(free_offset < moov_offset && free_size > 8 && moov_size > 8) {
        return Err(Error::new(ErrorKind::NoFreeSpace, "No usable free region precedes moov"));
    }

    seek_to(&mut file, moov_offset)?;
    let moov = read_into_checked_vec(&mut file, moov_size as usize)?;

    let mut candidate = moov.clone();
    if allow_compressed_moov
        && free_size < moov_size + 8
        && free_size != moov_size
        && free_size >= 40
    {
        for level in [Compression::fast(), Compression::default(), Compression::best()] {
            let attempt = envelope::encode(&moov, level)?;
            let len = attempt.len() as u64;
            if len == free_size || len <= free_size.saturating_sub(8) {
                candidate = attempt;
                break;
            }
        }
    }

    let content_len = candidate.len() as u64;
    let fits = content_len == free_size || free_size >= content_len + 8;
    if !fits {
        return Err(Error::new(ErrorKind::NoFreeSpace, "moov (even compressed) doesn't fit the free region"));
    }

    seek_to(&mut file, free_offset)?;
    write_all_checked(&mut file, &candidate)?;
    if free_size > content_len {
        let pad = free_size - content_len;
        write_all_checked(&mut file, &(pad as u32).to_be_bytes())?;
        write_all_checked(&mut file, &*ident::FREE)?;
    }

    let total_len = file_size(&mut file)?;
    if moov_offset + moov_size == total_len {
        file.set_len(moov_offset).map_err(|e| Error::new(ErrorKind::WriteError(e), "Error truncating file"))?;
    } else {
        seek_to(&mut file, moov_offset + 4)?;
        write_all_checked(&mut file, &*ident::FREE)?;
    }

    Ok(())
}

struct Scanned {
    ftyp: Option<Vec<u8>>,
    moov: Vec<u8>,
    edits: EditList,
}

fn scan(file: &mut File) -> crate::Result<Scanned> {
    let mut edits = EditList::new();
    let mut ftyp = None;
    let mut moov = None;
    let mut seen_ftyp = false;
    let mut seen_moov = false;
    let mut has_mdat = false;

    loop {
        let atom_start =
            file.stream_position().map_err(|e| Error::new(ErrorKind::ReadError(e), "Error reading file position"))?;
        let Some(head) = parse_head(file)? else { break };
        let atom_len = head.len();

        match head.fourcc() {
            ident::FILETYPE => {
                if atom_start != 0 || seen_ftyp {
                    return Err(Error::new(ErrorKind::NotMovie, "ftyp must be the sole, first top-level atom"));
                }
                if atom_len < 20 {
                    return Err(Error::new(ErrorKind::NotMovie, "ftyp atom shorter than the minimum 20 bytes"));
                }
                seen_ftyp = true;
                let bytes = read_full_atom(file, head)?;
                crate::atom::ftyp::validate_ftyp(&bytes)?;
                ftyp = Some(bytes);
            }
            ident::MOVIE if !seen_moov => {
                seen_moov = true;
                edits.add(atom_start, -(atom_len as i64));
                let bytes = read_full_atom(file, head)?;
                moov = Some(match envelope::decode(&bytes)? {
                    Some(decompressed) => decompressed,
                    None => bytes,
                });
            }
            ident::MOVIE => {
                seek_to(file, atom_start + atom_len)?;
            }
            ident::FREE | ident::SKIP | ident::WIDE => {
                edits.add(atom_start, -(atom_len as i64));
                seek_to(file, atom_start + atom_len)?;
            }
            ident::MEDIA_DATA => {
                has_mdat = true;
                seek_to(file, atom_start + atom_len)?;
            }
            _ => {
                seek_to(file, atom_start + atom_len)?;
            }
        }
    }

    if !has_mdat {
        return Err(Error::new(ErrorKind::FileTooComplex, "No mdat atom present"));
    }
    let moov = moov.ok_or_else(|| Error::new(ErrorKind::FileTooComplex, "No moov atom present"))?;

    Ok(Scanned { ftyp, moov, edits })
}

/// Scans for the first `free` atom (absorbing an immediately following
/// `wide` into its region) and the first `moov`, stopping once both are
/// found. Returns `(free_offset, free_size, moov_offset, moov_size)`.
fn scan_in_place(file: &mut File) -> crate::Result<(u64, u64, u64, u64)> {
    let mut free: Option<(u64, u64)> = None;
    let mut moov: Option<(u64, u64)> = None;

    loop {
        if free.is_some() && moov.is_some() {
            break;
        }
        let atom_start =
            file.stream_position().map_err(|e| Error::new(ErrorKind::ReadError(e), "Error reading file position"))?;
        let Some(head) = parse_head(file)? else { break };
        let atom_len = head.len();

        match head.fourcc() {
            ident::FREE if free.is_none() => {
                free = Some((atom_start, atom_len));
            }
            ident::WIDE => {
                if let Some((fo, fs)) = free {
                    if atom_start == fo + fs {
                        free = Some((fo, fs + atom_len));
                    }
                }
            }
            ident::MOVIE if moov.is_none() => {
                moov = Some((atom_start, atom_len));
            }
            _ => {}
        }

        seek_to(file, atom_start + atom_len)?;
    }

    let (free_offset, free_size) =
        free.ok_or_else(|| Error::new(ErrorKind::NoFreeSpace, "No free atom found ahead of moov"))?;
    let (moov_offset, moov_size) =
        moov.ok_or_else(|| Error::new(ErrorKind::NoFreeSpace, "No moov atom found"))?;

    Ok((free_offset, free_size, moov_offset, moov_size))
}

/// The compressed-moov size-estimation fixpoint (distilled spec §4.5 Phase
/// 3). Mutates `moov`'s chunk offsets in place and grows `edits` as the
/// estimate grows. Returns the final bytes to emit in place of a plain
/// `moov` (compressed envelope plus any trailing `free` padding), or `None`
/// if compression was abandoned — in which case `edits`/`moov` have already
/// been adjusted back to the plain uncompressed layout and the caller
/// should emit `moov` unmodified.
fn compress_moov_fixpoint(
    moov: &mut Vec<u8>,
    edits: &mut EditList,
    ftyp_size: u64,
    moov_size: u64,
) -> crate::Result<Option<Vec<u8>>> {
    let increment = round_up_16(moov_size / 16).max(16);
    let mut est = 3 * increment;

    edits.add(ftyp_size, est as i64);
    apply_offsets(moov, edits)?;

    let ceiling = moov_size.div_ceil(increment) + 4;
    let mut est_so_far = est;

    for _ in 0..ceiling {
        let envelope = envelope::encode(moov, Compression::default())?;
        let compressed = if envelope.len() as u64 <= moov_size { envelope.len() as u64 } else { 0 };

        if compressed == 0 {
            return Ok(abandon_compression(moov, edits, ftyp_size, moov_size, est_so_far)?);
        }
        if compressed == est || compressed <= est.saturating_sub(8) {
            return Ok(Some(finish_with_padding(envelope, compressed, est)?));
        }

        est += increment;
        est_so_far = est;
        edits.add(ftyp_size, increment as i64);
        apply_offsets(moov, &single_edit(ftyp_size, increment as i64))?;
    }

    abandon_compression(moov, edits, ftyp_size, moov_size, est_so_far)
}

fn finish_with_padding(envelope: Vec<u8>, compressed: u64, est: u64) -> crate::Result<Vec<u8>> {
    let mut out = envelope;
    if compressed < est {
        let pad = est - compressed;
        if pad < 8 {
            return Err(Error::new(
                ErrorKind::MemoryError,
                "Trailing free padding smaller than the minimal atom size",
            ));
        }
        out.extend_from_slice(&(pad as u32).to_be_bytes());
        out.extend_from_slice(&*ident::FREE);
        out.resize(out.len() + (pad as usize - 8), 0);
    }
    Ok(out)
}

fn abandon_compression(
    moov: &mut Vec<u8>,
    edits: &mut EditList,
    ftyp_size: u64,
    moov_size: u64,
    est_so_far: u64,
) -> crate::Result<Option<Vec<u8>>> {
    let delta = moov_size as i64 - est_so_far as i64;
    edits.add(ftyp_size, delta);
    apply_offsets(moov, &single_edit(ftyp_size, delta))?;
    Ok(None)
}

fn single_edit(offset: u64, delta: i64) -> EditList {
    let mut list = EditList::new();
    list.add(offset, delta);
    list
}

fn round_up_16(v: u64) -> u64 {
    (v + 15) / 16 * 16
}

fn read_full_atom(file: &mut File, head: Head) -> crate::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(head.len() as usize);
    write_head(&mut out, head)?;
    let content_len = head.content_len() as usize;
    let start = out.len();
    out.resize(start + content_len, 0);
    read_into_checked(file, &mut out[start..])?;
    Ok(out)
}

fn read_into_checked_vec(file: &mut File, len: usize) -> crate::Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    read_into_checked(file, &mut buf)?;
    Ok(buf)
}

fn copy_remaining_atoms(src: &mut File, dst: &mut File) -> crate::Result<()> {
    let mut buf = vec![0u8; BOUNCE_BUFFER_SIZE];

    loop {
        let atom_start =
            src.stream_position().map_err(|e| Error::new(ErrorKind::ReadError(e), "Error reading file position"))?;
        let Some(head) = parse_head(src)? else { break };
        let atom_len = head.len();

        match head.fourcc() {
            ident::MOVIE | ident::FREE | ident::SKIP | ident::WIDE => {
                seek_to(src, atom_start + atom_len)?;
            }
            _ => {
                seek_to(src, atom_start)?;
                let mut remaining = atom_len;
                while remaining > 0 {
                    let n = remaining.min(buf.len() as u64) as usize;
                    read_into_checked(src, &mut buf[..n])?;
                    write_all_checked(dst, &buf[..n])?;
                    remaining -= n as u64;
                }
            }
        }
    }

    Ok(())
}

fn seek_to(file: &mut File, pos: u64) -> crate::Result<()> {
    file.seek(SeekFrom::Start(pos))
        .map_err(|e| Error::new(ErrorKind::ReadError(e), "Error seeking within file"))?;
    Ok(())
}

fn open_read(path: &Path) -> crate::Result<File> {
    File::open(path).map_err(|e| Error::new(ErrorKind::ReadError(e), format!("Error opening {}", path.display())))
}
