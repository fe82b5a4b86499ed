//! `apply_offsets`: the focused walk over a `moov` subtree that rewrites
//! every chunk-offset table (`stco`, `co64`) it finds.

use crate::atom::ident::{self, Fourcc};
use crate::editlist::EditList;
use crate::error::{Error, ErrorKind};

/// Reads a `moov`-subtree atom header directly out of an in-memory buffer.
///
/// Unlike [`crate::atom::head::parse_head`] this never consults a file size
/// for the `size == 0` convention — every atom nested inside an in-memory
/// `moov` carries an explicit length, so a `size == 0` here is treated as a
/// malformed container rather than "runs to end of buffer".
fn read_head(buf: &[u8], pos: usize, end: usize) -> crate::Result<(Fourcc, u64, usize)> {
    if end - pos < 8 {
        return Err(Error::new(ErrorKind::NotMovie, "Atom header exceeds remaining bytes"));
    }
    let size32 = u32::from_be_bytes(buf[pos..pos + 4].try_into().unwrap());
    let fourcc = Fourcc(buf[pos + 4..pos + 8].try_into().unwrap());

    let (len, header_len) = if size32 == 1 {
        if end - pos < 16 {
            return Err(Error::new(ErrorKind::NotMovie, "Extended atom header exceeds remaining bytes"));
        }
        let ext_len = u64::from_be_bytes(buf[pos + 8..pos + 16].try_into().unwrap());
        (ext_len, 16)
    } else if size32 == 0 {
        return Err(Error::new(ErrorKind::NotMovie, "Unsupported to-end-of-file size inside moov"));
    } else {
        (size32 as u64, 8)
    };

    if len < header_len as u64 || pos as u64 + len > end as u64 {
        return Err(Error::new(ErrorKind::NotMovie, "Atom size exceeds remaining parent bytes"));
    }

    Ok((fourcc, len, header_len))
}

/// Rewrites every `stco`/`co64` entry in `moov` (including its own 8-byte
/// header at `moov[0..]`) by adding `edits.shift_at(original_offset)` to
/// each stored chunk offset, in place.
///
/// Traversal rule: the cursor descends into a parent's body only when its
/// type is in [`ident::should_descend`]'s set (`moov`, `trak`, `mdia`,
/// `minf`, `stbl`); any other atom is skipped by its declared size. An
/// atom whose declared size exceeds the remaining parent bytes is
/// `NotMovie`.
pub fn apply_offsets(moov: &mut [u8], edits: &EditList) -> crate::Result<()> {
    let len = moov.len();
    walk(moov, 0, len, edits)
}

fn walk(buf: &mut [u8], start: usize, end: usize, edits: &EditList) -> crate::Result<()> {
    let mut pos = start;
    while pos < end {
        let (fourcc, atom_len, header_len) = read_head(buf, pos, end)?;
        let body_start = pos + header_len;
        let body_end = pos + atom_len as usize;

        if fourcc == ident::CHUNK_OFFSET_32 {
            rewrite_stco(buf, body_start, body_end, edits)?;
        } else if fourcc == ident::CHUNK_OFFSET_64 {
            rewrite_co64(buf, body_start, body_end, edits)?;
        } else if ident::should_descend(fourcc) {
            walk(buf, body_start, body_end, edits)?;
        }

        pos = body_end;
    }
    Ok(())
}

fn rewrite_stco(buf: &mut [u8], body_start: usize, body_end: usize, edits: &EditList) -> crate::Result<()> {
    let payload_size = (body_end - body_start) as u64;
    if body_end - body_start < 8 {
        return Err(Error::new(ErrorKind::NotMovie, "stco atom too small for its own header"));
    }
    let count_pos = body_start + 4;
    let entries = u32::from_be_bytes(buf[count_pos..count_pos + 4].try_into().unwrap()) as u64;
    if 8 + 4 * entries > payload_size {
        return Err(Error::new(ErrorKind::NotMovie, "stco entry count exceeds atom size"));
    }

    let table_start = count_pos + 4;
    for i in 0..entries as usize {
        let entry_pos = table_start + i * 4;
        let offset = u32::from_be_bytes(buf[entry_pos..entry_pos + 4].try_into().unwrap());
        let shift = edits.shift_at(offset as u64);
        let new_offset = checked_shift_u32(offset, shift)?;
        buf[entry_pos..entry_pos + 4].copy_from_slice(&new_offset.to_be_bytes());
    }
    Ok(())
}

fn rewrite_co64(buf: &mut [u8], body_start: usize, body_end: usize, edits: &EditList) -> crate::Result<()> {
    let payload_size = (body_end - body_start) as u64;
    if body_end - body_start < 8 {
        return Err(Error::new(ErrorKind::NotMovie, "co64 atom too small for its own header"));
    }
    let count_pos = body_start + 4;
    let entries = u32::from_be_bytes(buf[count_pos..count_pos + 4].try_into().unwrap()) as u64;
    if 8 + 8 * entries > payload_size {
        return Err(Error::new(ErrorKind::NotMovie, "co64 entry count exceeds atom size"));
    }

    let table_start = count_pos + 4;
    for i in 0..entries as usize {
        let entry_pos = table_start + i * 8;
        let offset = u64::from_be_bytes(buf[entry_pos..entry_pos + 8].try_into().unwrap());
        let shift = edits.shift_at(offset);
        let new_offset = checked_shift_u64(offset, shift)?;
        buf[entry_pos..entry_pos + 8].copy_from_slice(&new_offset.to_be_bytes());
    }
    Ok(())
}

fn checked_shift_u32(offset: u32, shift: i64) -> crate::Result<u32> {
    let shifted = offset as i64 + shift;
    u32::try_from(shifted).map_err(|_| {
        Error::new(ErrorKind::NotMovie, "Chunk offset shift overflowed a 32 bit offset")
    })
}

fn checked_shift_u64(offset: u64, shift: i64) -> crate::Result<u64> {
    offset
        .checked_add_signed(shift)
        .ok_or_else(|| Error::new(ErrorKind::NotMovie, "Chunk offset shift overflowed a 64 bit offset"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(fourcc: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&((body.len() + 8) as u32).to_be_bytes());
        out.extend_from_slice(fourcc);
        out.extend_from_slice(body);
        out
    }

    fn stco_body(offsets: &[u32]) -> Vec<u8> {
        let mut body = vec![0u8; 4];
        body.extend_from_slice(&(offsets.len() as u32).to_be_bytes());
        for o in offsets {
            body.extend_from_slice(&o.to_be_bytes());
        }
        body
    }

    fn co64_body(offsets: &[u64]) -> Vec<u8> {
        let mut body = vec![0u8; 4];
        body.extend_from_slice(&(offsets.len() as u32).to_be_bytes());
        for o in offsets {
            body.extend_from_slice(&o.to_be_bytes());
        }
        body
    }

    #[test]
    fn rewrites_stco_through_descend_set() {
        let stco = atom(b"stco", &stco_body(&[28, 1000]));
        let stbl = atom(b"stbl", &stco);
        let minf = atom(b"minf", &stbl);
        let mdia = atom(b"mdia", &minf);
        let trak = atom(b"trak", &mdia);
        let mut moov = atom(b"moov", &trak);

        let mut edits = EditList::new();
        edits.add(0, 500);

        apply_offsets(&mut moov, &edits).unwrap();

        // stco entries sit at the tail of the buffer in this fixture.
        let entry1 = u32::from_be_bytes(moov[moov.len() - 8..moov.len() - 4].try_into().unwrap());
        let entry0 = u32::from_be_bytes(moov[moov.len() - 12..moov.len() - 8].try_into().unwrap());
        assert_eq!(entry0, 528);
        assert_eq!(entry1, 1500);
    }

    #[test]
    fn rewrites_co64_with_64_bit_arithmetic() {
        let co64 = atom(b"co64", &co64_body(&[0x0000_0001_0000_0000]));
        let stbl = atom(b"stbl", &co64);
        let mut moov = atom(b"moov", &stbl);

        let mut edits = EditList::new();
        edits.add(0, 100);

        apply_offsets(&mut moov, &edits).unwrap();

        let entry = u64::from_be_bytes(moov[moov.len() - 8..].try_into().unwrap());
        assert_eq!(entry, 0x0000_0001_0000_0000 + 100);
    }

    #[test]
    fn non_descend_atoms_are_left_untouched() {
        let udta = atom(b"udta", &[1, 2, 3, 4]);
        let mut moov = atom(b"moov", &udta);
        let before = moov.clone();

        let mut edits = EditList::new();
        edits.add(0, 999);
        apply_offsets(&mut moov, &edits).unwrap();

        assert_eq!(moov, before);
    }

    #[test]
    fn oversized_child_atom_is_not_movie() {
        let mut stbl_body = atom(b"stco", &stco_body(&[1]));
        // Corrupt the child's declared size to exceed the parent.
        let bad_len = (stbl_body.len() + 100) as u32;
        stbl_body[0..4].copy_from_slice(&bad_len.to_be_bytes());
        let stbl = atom(b"stbl", &stbl_body);
        let mut moov = atom(b"moov", &stbl);

        let err = apply_offsets(&mut moov, &EditList::new()).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::NotMovie));
    }

    #[test]
    fn overflow_on_negative_shift_is_not_movie() {
        let stco = atom(b"stco", &stco_body(&[10]));
        let stbl = atom(b"stbl", &stco);
        let mut moov = atom(b"moov", &stbl);

        let mut edits = EditList::new();
        edits.add(0, -50);

        let err = apply_offsets(&mut moov, &edits).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::NotMovie));
    }
}
