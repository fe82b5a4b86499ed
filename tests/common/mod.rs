//! Byte-level builders for synthetic QuickTime movies, shared by the
//! integration tests. Nothing here exercises the crate under test directly;
//! it only assembles the raw atom bytes each scenario needs.

/// Wraps `body` in an atom header with the given four-character code.
pub fn atom(fourcc: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + body.len());
    out.extend_from_slice(&((body.len() + 8) as u32).to_be_bytes());
    out.extend_from_slice(fourcc);
    out.extend_from_slice(body);
    out
}

/// A minimal 20 byte `ftyp` atom advertising the `qt  ` compatible brand.
pub fn ftyp() -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(b"qt  "); // major brand
    body.extend_from_slice(&0u32.to_be_bytes()); // minor version
    body.extend_from_slice(b"isom"); // one compatible brand
    atom(b"ftyp", &body)
}

/// An `mdat` atom of exactly `total_len` bytes (header included), filled
/// with a recognizable repeating byte pattern so tests can assert the
/// payload survives relocation unmodified.
pub fn mdat(total_len: usize) -> Vec<u8> {
    let content_len = total_len - 8;
    let content: Vec<u8> = (0..content_len).map(|i| (i % 256) as u8).collect();
    atom(b"mdat", &content)
}

/// A `free`/`skip`/`wide`-shaped placeholder atom of exactly `total_len`
/// bytes (header included).
pub fn filler(fourcc: &[u8; 4], total_len: usize) -> Vec<u8> {
    atom(fourcc, &vec![0u8; total_len - 8])
}

/// A 32 bit chunk offset table (`stco`) with the given entries.
pub fn stco(offsets: &[u32]) -> Vec<u8> {
    let mut body = vec![0u8; 4]; // version + flags
    body.extend_from_slice(&(offsets.len() as u32).to_be_bytes());
    for o in offsets {
        body.extend_from_slice(&o.to_be_bytes());
    }
    atom(b"stco", &body)
}

/// A 64 bit chunk offset table (`co64`) with the given entries.
pub fn co64(offsets: &[u64]) -> Vec<u8> {
    let mut body = vec![0u8; 4]; // version + flags
    body.extend_from_slice(&(offsets.len() as u32).to_be_bytes());
    for o in offsets {
        body.extend_from_slice(&o.to_be_bytes());
    }
    atom(b"co64", &body)
}

/// Wraps a chunk-offset table atom (`stco`/`co64`) in the
/// `trak/mdia/minf/stbl` descend chain `apply_offsets` walks through, then
/// in the outer `moov` header.
pub fn moov_with_table(table: Vec<u8>) -> Vec<u8> {
    let stbl = atom(b"stbl", &table);
    let minf = atom(b"minf", &stbl);
    let mdia = atom(b"mdia", &minf);
    let trak = atom(b"trak", &mdia);
    atom(b"moov", &trak)
}

/// Same as [`moov_with_table`], but pads the `moov` body with a sibling
/// `free` atom so the whole atom is exactly `total_len` bytes. Used by
/// scenarios that pin an exact `moov` size (e.g. the in-place fixtures).
pub fn moov_with_table_padded(table: Vec<u8>, total_len: usize) -> Vec<u8> {
    let stbl = atom(b"stbl", &table);
    let minf = atom(b"minf", &stbl);
    let mdia = atom(b"mdia", &minf);
    let trak = atom(b"trak", &mdia);

    let unpadded = atom(b"moov", &trak);
    assert!(unpadded.len() <= total_len, "requested moov size too small to fit the table");
    let pad_len = total_len - unpadded.len();
    if pad_len == 0 {
        return unpadded;
    }
    assert!(pad_len >= 8, "padding gap smaller than the minimal atom size");

    let pad = filler(b"free", pad_len);
    let mut body = trak;
    body.extend_from_slice(&pad);
    atom(b"moov", &body)
}

/// Reads the sole `stco` entry out of a flattened `moov` atom's tail; test
/// fixtures in this module only ever nest one table with one entry, at a
/// fixed, easy-to-locate offset from the end of the buffer.
pub fn last_stco_entry_u32(moov: &[u8]) -> u32 {
    u32::from_be_bytes(moov[moov.len() - 4..].try_into().unwrap())
}

pub fn last_co64_entry_u64(moov: &[u8]) -> u64 {
    u64::from_be_bytes(moov[moov.len() - 8..].try_into().unwrap())
}

/// Manually undoes the `moov/cmov/dcom/cmvd` envelope, returning the plain
/// `moov` bytes it wraps. Used by tests that need to inspect a relocated
/// `moov`'s offsets without depending on the crate's own (private)
/// `envelope` module. Returns `moov_atom` unchanged if its first child isn't
/// `cmov`.
pub fn decode_if_compressed(moov_atom: &[u8]) -> Vec<u8> {
    use flate2::read::ZlibDecoder;
    use std::io::Read;

    if &moov_atom[12..16] != b"cmov" {
        return moov_atom.to_vec();
    }

    let mut pos = 16; // inside cmov's body, past the moov+cmov headers
    let cmov_end = 8 + u32::from_be_bytes(moov_atom[8..12].try_into().unwrap()) as usize;
    let mut deflated = None;
    let mut decompressed_len = None;
    while pos < cmov_end {
        let size = u32::from_be_bytes(moov_atom[pos..pos + 4].try_into().unwrap()) as usize;
        let fourcc = &moov_atom[pos + 4..pos + 8];
        if fourcc == b"cmvd" {
            decompressed_len = Some(u32::from_be_bytes(moov_atom[pos + 8..pos + 12].try_into().unwrap()) as usize);
            deflated = Some(&moov_atom[pos + 12..pos + size]);
        }
        pos += size;
    }

    let decompressed_len = decompressed_len.expect("cmvd present");
    let deflated = deflated.expect("cmvd present");
    let mut decoder = ZlibDecoder::new(deflated);
    let mut out = Vec::with_capacity(decompressed_len);
    decoder.read_to_end(&mut out).unwrap();
    assert_eq!(out.len(), decompressed_len);
    out
}

/// Wraps a plain `moov` atom (header included) in the `cmov`/`dcom`/`cmvd`
/// compressed-movie envelope, deflating it with `flate2` directly so the
/// fixture doesn't depend on the crate's own `envelope` module.
pub fn compressed_moov_atom(moov_atom: &[u8]) -> Vec<u8> {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(moov_atom).unwrap();
    let deflated = encoder.finish().unwrap();

    let mut cmvd_body = Vec::new();
    cmvd_body.extend_from_slice(&(moov_atom.len() as u32).to_be_bytes());
    cmvd_body.extend_from_slice(&deflated);
    let cmvd = atom(b"cmvd", &cmvd_body);

    let mut dcom_body = Vec::new();
    dcom_body.extend_from_slice(b"zlib");
    let dcom = atom(b"dcom", &dcom_body);

    let mut cmov_body = Vec::new();
    cmov_body.extend_from_slice(&dcom);
    cmov_body.extend_from_slice(&cmvd);
    let cmov = atom(b"cmov", &cmov_body);

    atom(b"moov", &cmov)
}
