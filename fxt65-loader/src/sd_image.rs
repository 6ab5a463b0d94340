// This file is part of the fxt65-loader crate.
// Copyright (c) 2024 FxT-65 emulator contributors. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! SD card image probing and mounting (spec.md §4.2): flat raw images,
//! fixed-size VHDs, and dynamic (sparse) VHDs. All multi-byte VHD header
//! fields are big-endian, read with `byteorder` the same way the
//! reference loader's cartridge header parser reads its big-endian CRT
//! header fields.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info, warn};

use fxt65_emu::sd::SdImage;

const SECTOR_SIZE: usize = 512;
const FOOTER_SIZE: usize = 512;
const VHD_COOKIE: &[u8; 8] = b"conectix";
const SPARSE_COOKIE: &[u8; 8] = b"cxsparse";
const DISK_TYPE_FIXED: u32 = 2;
const DISK_TYPE_DYNAMIC: u32 = 3;
const UNALLOCATED_BLOCK: u32 = 0xFFFF_FFFF;

/// Probes `path` and returns the matching `SdImage` backend: a dynamic
/// VHD if the trailing footer names disk type 3, a fixed VHD for type 2,
/// otherwise a flat raw image. A footer carrying the `conectix` cookie but
/// naming any other disk type is a recognized-but-unsupported VHD and
/// fails the mount outright (spec.md §4.2 "Unknown types fail the mount",
/// §7 "unsupported VHD type: fatal at startup") rather than silently
/// falling back to FLAT.
pub fn mount_sd_image<P: AsRef<Path>>(path: P) -> Result<Box<dyn SdImage>> {
    let path = path.as_ref();
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .with_context(|| format!("opening SD image {}", path.display()))?;
    let file_len = file
        .metadata()
        .with_context(|| format!("statting SD image {}", path.display()))?
        .len();

    if file_len >= FOOTER_SIZE as u64 {
        if let Some(footer) = read_footer(&mut file, file_len)? {
            return match footer.disk_type {
                DISK_TYPE_FIXED => {
                    info!("mounting {} as fixed VHD ({} bytes)", path.display(), file_len);
                    Ok(Box::new(FixedVhdImage::new(file, file_len)))
                }
                DISK_TYPE_DYNAMIC => {
                    info!("mounting {} as dynamic VHD", path.display());
                    Ok(Box::new(DynamicVhdImage::open(
                        file,
                        footer.data_offset,
                        footer.raw,
                    )?))
                }
                other => {
                    warn!("{}: unrecognized VHD disk type {}", path.display(), other);
                    Err(anyhow!(
                        "{}: VHD footer names unsupported disk type {} (only fixed=2 and dynamic=3 are recognized)",
                        path.display(),
                        other
                    ))
                }
            };
        }
    }

    info!("mounting {} as flat image ({} bytes)", path.display(), file_len);
    Ok(Box::new(FlatImage::new(file, file_len)))
}

struct Footer {
    disk_type: u32,
    data_offset: u64,
    raw: [u8; FOOTER_SIZE],
}

fn read_footer(file: &mut File, file_len: u64) -> Result<Option<Footer>> {
    file.seek(SeekFrom::Start(file_len - FOOTER_SIZE as u64))?;
    let mut buf = [0u8; FOOTER_SIZE];
    file.read_exact(&mut buf)?;
    if &buf[0..8] != VHD_COOKIE {
        return Ok(None);
    }
    let mut cursor = &buf[16..];
    let data_offset = cursor.read_u64::<BigEndian>()?;
    let disk_type = (&buf[60..64]).read_u32::<BigEndian>()?;
    Ok(Some(Footer { disk_type, data_offset, raw: buf }))
}

/// A raw, headerless image: sector `n` lives at byte offset `n * 512`.
struct FlatImage {
    file: File,
    total_sectors: u32,
}

impl FlatImage {
    fn new(file: File, file_len: u64) -> Self {
        Self {
            file,
            total_sectors: (file_len / SECTOR_SIZE as u64) as u32,
        }
    }
}

impl SdImage for FlatImage {
    fn total_sectors(&self) -> u32 {
        self.total_sectors
    }

    fn read_sector(&mut self, lba: u32, buf: &mut [u8; 512]) {
        if lba >= self.total_sectors {
            buf.iter_mut().for_each(|b| *b = 0);
            return;
        }
        let _ = self.file.seek(SeekFrom::Start(lba as u64 * SECTOR_SIZE as u64));
        if self.file.read_exact(buf).is_err() {
            buf.iter_mut().for_each(|b| *b = 0);
        }
    }

    fn write_sector(&mut self, lba: u32, buf: &[u8; 512]) {
        if lba >= self.total_sectors {
            return;
        }
        if self
            .file
            .seek(SeekFrom::Start(lba as u64 * SECTOR_SIZE as u64))
            .is_ok()
        {
            let _ = self.file.write_all(buf);
        }
    }
}

/// A fixed-size VHD: identical sector layout to `FlatImage`, just with a
/// 512-byte footer trailing the data that this backend leaves untouched.
struct FixedVhdImage {
    file: File,
    total_sectors: u32,
}

impl FixedVhdImage {
    fn new(file: File, file_len: u64) -> Self {
        Self {
            file,
            total_sectors: ((file_len - FOOTER_SIZE as u64) / SECTOR_SIZE as u64) as u32,
        }
    }
}

impl SdImage for FixedVhdImage {
    fn total_sectors(&self) -> u32 {
        self.total_sectors
    }

    fn read_sector(&mut self, lba: u32, buf: &mut [u8; 512]) {
        if lba >= self.total_sectors {
            buf.iter_mut().for_each(|b| *b = 0);
            return;
        }
        let _ = self.file.seek(SeekFrom::Start(lba as u64 * SECTOR_SIZE as u64));
        if self.file.read_exact(buf).is_err() {
            buf.iter_mut().for_each(|b| *b = 0);
        }
    }

    fn write_sector(&mut self, lba: u32, buf: &[u8; 512]) {
        if lba >= self.total_sectors {
            return;
        }
        if self
            .file
            .seek(SeekFrom::Start(lba as u64 * SECTOR_SIZE as u64))
            .is_ok()
        {
            let _ = self.file.write_all(buf);
        }
    }
}

/// A dynamic (sparse) VHD: sectors are grouped into blocks, and the Block
/// Allocation Table maps each block to either `UNALLOCATED_BLOCK` or a
/// sector offset into the file where that block's bitmap + data live.
struct DynamicVhdImage {
    file: File,
    bat: Vec<u32>,
    table_offset: u64,
    sectors_per_block: u32,
    bitmap_sectors: u32,
    total_sectors: u32,
    footer: [u8; FOOTER_SIZE],
}

impl DynamicVhdImage {
    fn open(mut file: File, header_offset: u64, footer: [u8; FOOTER_SIZE]) -> Result<Self> {
        file.seek(SeekFrom::Start(header_offset))?;
        let mut header = [0u8; 1024];
        file.read_exact(&mut header)
            .context("reading VHD dynamic disk header")?;
        if &header[0..8] != SPARSE_COOKIE {
            return Err(anyhow!("VHD dynamic disk header missing cxsparse cookie"));
        }
        let table_offset = (&header[16..24]).read_u64::<BigEndian>()?;
        let max_table_entries = (&header[28..32]).read_u32::<BigEndian>()?;
        let block_size = (&header[32..36]).read_u32::<BigEndian>()?;
        let sectors_per_block = block_size / SECTOR_SIZE as u32;
        let bitmap_sectors = ((sectors_per_block + 8 * SECTOR_SIZE as u32 - 1) / (8 * SECTOR_SIZE as u32)).max(1);

        file.seek(SeekFrom::Start(table_offset))?;
        let mut bat = Vec::with_capacity(max_table_entries as usize);
        for _ in 0..max_table_entries {
            bat.push(file.read_u32::<BigEndian>()?);
        }

        debug!(
            "dynamic vhd: {} entries, {} sectors/block, {} bitmap sectors",
            max_table_entries, sectors_per_block, bitmap_sectors
        );

        Ok(Self {
            file,
            total_sectors: max_table_entries * sectors_per_block,
            bat,
            table_offset,
            sectors_per_block,
            bitmap_sectors,
            footer,
        })
    }

    fn data_sector_offset(&self, lba: u32) -> Option<u64> {
        let block_idx = (lba / self.sectors_per_block) as usize;
        let sector_in_block = lba % self.sectors_per_block;
        let entry = *self.bat.get(block_idx)?;
        if entry == UNALLOCATED_BLOCK {
            return None;
        }
        Some(entry as u64 + self.bitmap_sectors as u64 + sector_in_block as u64)
    }

    /// Allocates a fresh block for `block_idx` at the current end of file,
    /// displacing the trailing footer (spec.md §4.2 "On first write to an
    /// unallocated block"): write an all-ones occupancy bitmap, a
    /// `sectors_per_block`-sector run of zeroed sectors, then re-append the
    /// footer. Updates the BAT in memory and on disk. Returns the new
    /// entry's sector number, or `None` if `block_idx` is past the end of
    /// the table (a no-op per spec.md §7).
    fn allocate_block(&mut self, block_idx: usize) -> Option<u32> {
        if block_idx >= self.bat.len() {
            return None;
        }
        let file_len = self.file.metadata().ok()?.len();
        let footer_byte_offset = file_len.checked_sub(FOOTER_SIZE as u64)?;
        let new_block_sector = (footer_byte_offset / SECTOR_SIZE as u64) as u32;

        self.file.seek(SeekFrom::Start(footer_byte_offset)).ok()?;
        let bitmap = vec![0xFFu8; self.bitmap_sectors as usize * SECTOR_SIZE];
        self.file.write_all(&bitmap).ok()?;
        let zero_block = vec![0u8; self.sectors_per_block as usize * SECTOR_SIZE];
        self.file.write_all(&zero_block).ok()?;
        self.file.write_all(&self.footer).ok()?;

        self.bat[block_idx] = new_block_sector;
        self.file
            .seek(SeekFrom::Start(self.table_offset + block_idx as u64 * 4))
            .ok()?;
        self.file.write_u32::<BigEndian>(new_block_sector).ok()?;

        info!(
            "dynamic vhd: allocated block {} at sector {}",
            block_idx, new_block_sector
        );
        Some(new_block_sector)
    }
}

impl SdImage for DynamicVhdImage {
    fn total_sectors(&self) -> u32 {
        self.total_sectors
    }

    fn read_sector(&mut self, lba: u32, buf: &mut [u8; 512]) {
        match self.data_sector_offset(lba) {
            Some(sector) => {
                let _ = self.file.seek(SeekFrom::Start(sector * SECTOR_SIZE as u64));
                if self.file.read_exact(buf).is_err() {
                    buf.iter_mut().for_each(|b| *b = 0);
                }
            }
            None => buf.iter_mut().for_each(|b| *b = 0),
        }
    }

    fn write_sector(&mut self, lba: u32, buf: &[u8; 512]) {
        let block_idx = (lba / self.sectors_per_block) as usize;
        let sector_in_block = lba % self.sectors_per_block;
        if block_idx >= self.bat.len() {
            // A BAT index past max_entries is a no-op (spec.md §7).
            return;
        }
        let sector = match self.data_sector_offset(lba) {
            Some(sector) => sector,
            None => match self.allocate_block(block_idx) {
                Some(block_sector) => {
                    block_sector as u64 + self.bitmap_sectors as u64 + sector_in_block as u64
                }
                None => {
                    warn!("dynamic vhd: failed to allocate block {}", block_idx);
                    return;
                }
            },
        };
        if self
            .file
            .seek(SeekFrom::Start(sector * SECTOR_SIZE as u64))
            .is_ok()
        {
            let _ = self.file.write_all(buf);
        }
    }
}
