//! Minimal ISO 9660 image generator for cloud-init seed disks.
//!
//! # Background
//!
//! ISO 9660 (ECMA-119) is the CD-ROM filesystem.  Cloud-init's NoCloud
//! datasource boots a VM from configuration it finds on an attached volume
//! labeled `CIDATA`, so provisioning a machine means handing libvirt a tiny
//! ISO with the right label and two files in its root directory.  Rather than
//! shelling out to `genisoimage`, we assemble that image directly in memory.
//!
//! # Scope
//!
//! Flat images only: every file lives in the root directory, and the whole
//! image is materialized as one byte buffer.  No Rock Ridge or Joliet
//! extensions, no path tables, no boot catalog.  File names are stored
//! uppercase without the `;1` version suffix that strict Level 1 conformance
//! would require; the Linux isofs driver normalizes names leniently and reads
//! these images fine, and the simplification keeps the on-disc layout stable.
//! Not a general-purpose ISO authoring library.
//!
//! # References
//!
//! - ECMA-119 (ISO 9660): <https://ecma-international.org/publications-and-standards/standards/ecma-119/>

use crate::error::SeedError;

/// Each sector (a "logical block") in an ISO 9660 image is 2048 bytes, the
/// native CD-ROM sector size hardcoded by the standard.
pub const SECTOR_SIZE: usize = 2048;

/// Recording date stamped into every directory record, in the standard's
/// 7-byte form: years since 1900, month, day, hour, minute, second, GMT
/// offset in 15-minute units.  Fixed at 2026-02-21 00:00:00 GMT so that
/// building the same inputs twice yields byte-identical images.
const RECORDING_DATE: [u8; 7] = [126, 2, 21, 0, 0, 0, 0];

/// A file to include in the root directory of the image.
pub struct IsoFile<'a> {
    /// The filename as handed to us (e.g. `"meta-data"`).  Stored on disc
    /// uppercased (`META-DATA`), which is how the entry reads back out.
    pub name: &'a str,
    /// The file contents (arbitrary bytes).
    pub data: &'a [u8],
}

/// Build a flat ISO 9660 image as a byte vector.
///
/// `volume_id` is the volume label (e.g. `"CIDATA"`); it must be ASCII and
/// at most 32 characters to fit its space-padded PVD field.  Files are
/// placed in the root directory in lexicographic order of their uppercased
/// names.  Extents and directory records both follow that order, never the
/// order of the `files` slice.
///
/// All directory records must fit in the single root directory sector; with
/// short names that allows around 45 files.  Overflow is reported as
/// [`SeedError::RootDirectoryFull`], never silently truncated.
///
/// # Panics
///
/// Panics if a file name exceeds 221 bytes (a directory record's total
/// length has to fit its single length byte).
pub fn build_iso(volume_id: &str, files: &[IsoFile<'_>]) -> Result<Vec<u8>, SeedError> {
    if volume_id.len() > 32 || !volume_id.is_ascii() {
        return Err(SeedError::VolumeId {
            id: volume_id.to_string(),
        });
    }

    // ┌──────────┬───────────────────────────────────────────────────┐
    // │ Sectors  │ Contents                                          │
    // ├──────────┼───────────────────────────────────────────────────┤
    // │  0 – 15  │ System Area (all zeros, reserved for boot use)    │
    // │    16    │ Primary Volume Descriptor (PVD)                   │
    // │    17    │ Volume Descriptor Set Terminator                  │
    // │    18    │ Root Directory (., .., and file entries)          │
    // │  19+     │ File data, one fresh sector boundary per file     │
    // └──────────┴───────────────────────────────────────────────────┘

    let root_dir_sector = 18u32;
    let first_file_sector = 19usize;

    let mut sorted: Vec<(String, &[u8])> = files
        .iter()
        .map(|f| (f.name.to_ascii_uppercase(), f.data))
        .collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    // The root directory is exactly one sector; dot and dotdot take 34 bytes
    // each and the file records pack behind them with no gaps.
    let record_bytes =
        68 + sorted.iter().map(|(n, _)| record_len(n.len())).sum::<usize>();
    if record_bytes > SECTOR_SIZE {
        return Err(SeedError::RootDirectoryFull {
            needed: record_bytes,
            capacity: SECTOR_SIZE,
        });
    }

    // Pre-calculate each file's starting sector.  Extents run back-to-back
    // from sector 19, and an empty file still occupies one sector.
    let mut extents: Vec<usize> = Vec::with_capacity(sorted.len());
    let mut next_sector = first_file_sector;
    for (_, data) in &sorted {
        extents.push(next_sector);
        next_sector += sectors_for(data.len());
    }
    let total_sectors = next_sector;

    // Allocate the entire image zeroed upfront; unused tails of file sectors
    // and the system area stay zero.
    let mut iso = vec![0u8; total_sectors * SECTOR_SIZE];

    write_pvd(&mut iso, volume_id, total_sectors as u32, root_dir_sector);
    write_vdst(&mut iso);
    write_root_directory(&mut iso, root_dir_sector, &sorted, &extents);

    for (k, (_, data)) in sorted.iter().enumerate() {
        let offset = extents[k] * SECTOR_SIZE;
        iso[offset..offset + data.len()].copy_from_slice(data);
    }

    tracing::debug!(
        sectors = total_sectors,
        files = files.len(),
        "assembled iso image"
    );

    Ok(iso)
}

/// Write the Primary Volume Descriptor at sector 16.
///
/// The PVD is the volume's main metadata block, always the first sector
/// after the system area and exactly one sector long.  Fields we fill, by
/// byte offset within the sector:
///
/// | Offset | Size | Field                                              |
/// |--------|------|----------------------------------------------------|
/// |   0    |   1  | Type (1 = PVD)                                     |
/// |   1    |   5  | Standard Identifier (`"CD001"`)                    |
/// |   6    |   1  | Version (1)                                        |
/// |   8    |  32  | System Identifier (space-padded)                   |
/// |  40    |  32  | Volume Identifier (space-padded): the label        |
/// |  80    |   8  | Volume Space Size (both-endian u32): total sectors |
/// | 120    |   4  | Volume Set Size (both-endian u16, 1)               |
/// | 124    |   4  | Volume Sequence Number (both-endian u16, 1)        |
/// | 128    |   4  | Logical Block Size (both-endian u16, 2048)         |
/// | 132    |   8  | Path Table Size (both-endian u32, 0: none)         |
/// | 156    |  34  | Root Directory Record, embedded inline             |
/// | 190    | 624  | Identifier strings (space-padded)                  |
/// | 881    |   1  | File Structure Version (1)                         |
///
/// "Both-endian" fields store the value twice, little-endian immediately
/// followed by big-endian, so readers on either architecture can use it
/// without byte-swapping.
fn write_pvd(iso: &mut [u8], volume_id: &str, total_sectors: u32, root_dir_sector: u32) {
    let pvd = &mut iso[16 * SECTOR_SIZE..17 * SECTOR_SIZE];
    pvd[0] = 1;
    pvd[1..6].copy_from_slice(b"CD001");
    pvd[6] = 1;

    pvd[8..40].fill(b' ');
    pvd[40..72].fill(b' ');
    let vid = volume_id.as_bytes();
    pvd[40..40 + vid.len()].copy_from_slice(vid);

    put_u32_both(&mut pvd[80..88], total_sectors);
    put_u16_both(&mut pvd[120..124], 1);
    put_u16_both(&mut pvd[124..128], 1);
    put_u16_both(&mut pvd[128..132], SECTOR_SIZE as u16);
    // No path tables in this layout: size 0, locations left zero.  isofs
    // walks the root directory from the record below and never consults them.
    put_u32_both(&mut pvd[132..140], 0);

    // The root directory describes itself with a directory record embedded
    // right in the PVD.  Its identifier is the single byte 0x00 ("self").
    let root = dir_record(root_dir_sector, SECTOR_SIZE as u32, b"\x00", true);
    pvd[156..156 + root.len()].copy_from_slice(&root);

    // Volume set, publisher, preparer and application identifiers plus the
    // copyright/abstract/bibliographic file fields, all space-padded.
    pvd[190..814].fill(b' ');
    pvd[881] = 1; // file structure version
}

/// Write the Volume Descriptor Set Terminator at sector 17.
///
/// Readers scan descriptors from sector 16 onward until they hit type 255.
/// The PVD is our only descriptor, so the terminator follows immediately.
fn write_vdst(iso: &mut [u8]) {
    let vdst = &mut iso[17 * SECTOR_SIZE..18 * SECTOR_SIZE];
    vdst[0] = 255;
    vdst[1..6].copy_from_slice(b"CD001");
    vdst[6] = 1;
}

/// Write the root directory extent: a `.` record, a `..` record (the root
/// is its own parent), then one record per file in sorted order, packed
/// back-to-back.  Each record's first byte is its own total length, so a
/// reader walks the sector without any external index.
fn write_root_directory(
    iso: &mut [u8],
    root_sector: u32,
    files: &[(String, &[u8])],
    extents: &[usize],
) {
    let mut pos = root_sector as usize * SECTOR_SIZE;
    let root_size = SECTOR_SIZE as u32;

    for ident in [b"\x00", b"\x01"] {
        let rec = dir_record(root_sector, root_size, ident, true);
        iso[pos..pos + rec.len()].copy_from_slice(&rec);
        pos += rec.len();
    }

    for (k, (name, data)) in files.iter().enumerate() {
        let rec = dir_record(extents[k] as u32, data.len() as u32, name.as_bytes(), false);
        iso[pos..pos + rec.len()].copy_from_slice(&rec);
        pos += rec.len();
    }
}

/// Build one directory record as a new Vec.
///
/// Layout, by byte offset:
///
/// | Offset | Size | Field                                              |
/// |--------|------|----------------------------------------------------|
/// |  0     |   1  | Record Length (total, including this byte)         |
/// |  1     |   1  | Extended Attribute Record Length (0)               |
/// |  2     |   8  | Extent Location (both-endian u32): starting sector |
/// | 10     |   8  | Data Length (both-endian u32): exact byte count    |
/// | 18     |   7  | Recording Date/Time ([`RECORDING_DATE`])           |
/// | 25     |   1  | File Flags (bit 1 = directory)                     |
/// | 28     |   4  | Volume Sequence Number (both-endian u16, 1)        |
/// | 32     |   1  | File Identifier Length                             |
/// | 33     |   N  | File Identifier                                    |
/// | 33+N   | 0/1  | Pad byte when N is even (records stay even-sized)  |
fn dir_record(extent: u32, size: u32, name: &[u8], is_dir: bool) -> Vec<u8> {
    let total = record_len(name.len());
    assert!(total <= 255, "file identifier too long for a directory record");
    let mut buf = vec![0u8; total];
    buf[0] = total as u8;
    put_u32_both(&mut buf[2..10], extent);
    put_u32_both(&mut buf[10..18], size);
    buf[18..25].copy_from_slice(&RECORDING_DATE);
    buf[25] = if is_dir { 0x02 } else { 0x00 };
    put_u16_both(&mut buf[28..32], 1);
    buf[32] = name.len() as u8;
    buf[33..33 + name.len()].copy_from_slice(name);
    buf
}

/// Total length of a directory record for an identifier of `name_len`
/// bytes: 33 fixed bytes, the name, and a pad byte when the name length is
/// even.
fn record_len(name_len: usize) -> usize {
    33 + name_len + if name_len.is_multiple_of(2) { 1 } else { 0 }
}

/// How many sectors `bytes` of data occupy.  Empty files still take one.
fn sectors_for(bytes: usize) -> usize {
    if bytes == 0 {
        1
    } else {
        bytes.div_ceil(SECTOR_SIZE)
    }
}

/// Write a u32 twice: little-endian into `buf[0..4]`, big-endian into
/// `buf[4..8]`.  Every multi-byte number in the format goes through this or
/// its u16 sibling so the two copies can't drift apart.
fn put_u32_both(buf: &mut [u8], val: u32) {
    buf[0..4].copy_from_slice(&val.to_le_bytes());
    buf[4..8].copy_from_slice(&val.to_be_bytes());
}

/// Write a u16 in both-endian form: 2 bytes LE followed by 2 bytes BE.
fn put_u16_both(buf: &mut [u8], val: u16) {
    buf[0..2].copy_from_slice(&val.to_le_bytes());
    buf[2..4].copy_from_slice(&val.to_be_bytes());
}
