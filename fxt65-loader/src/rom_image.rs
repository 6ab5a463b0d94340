// This file is part of the fxt65-loader crate.
// Copyright (c) 2024 FxT-65 emulator contributors. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! ROM image loading (spec.md §4.1, §6): FxT-65 ROM images are 8192-byte
//! files; only the upper 4096 bytes are actually mapped (spec.md §4.1,
//! `0xF000..=0xFFFF`), mirroring how real EPROM sockets on the board are
//! twice the addressable ROM window and the low half goes unused.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};

const ROM_FILE_SIZE: usize = 8192;
const ROM_MAPPED_SIZE: usize = 4096;

/// Reads a ROM image file and returns the 4096 bytes that get mapped at
/// `0xF000`.
pub fn load_rom<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let data = fs::read(path).with_context(|| format!("reading ROM image {}", path.display()))?;
    if data.len() != ROM_FILE_SIZE {
        return Err(anyhow!(
            "ROM image {} is {} bytes, expected exactly {}",
            path.display(),
            data.len(),
            ROM_FILE_SIZE
        ));
    }
    Ok(data[ROM_FILE_SIZE - ROM_MAPPED_SIZE..].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn rejects_short_files() {
        let mut file = tempfile().unwrap();
        file.write_all(&[0u8; 100]).unwrap();
        assert!(load_rom(file.path()).is_err());
    }

    #[test]
    fn keeps_upper_half() {
        let mut file = tempfile().unwrap();
        let mut data = vec![0u8; ROM_FILE_SIZE];
        data[ROM_FILE_SIZE - 1] = 0x42;
        file.write_all(&data).unwrap();
        let rom = load_rom(file.path()).unwrap();
        assert_eq!(ROM_MAPPED_SIZE, rom.len());
        assert_eq!(0x42, rom[ROM_MAPPED_SIZE - 1]);
    }

    struct NamedTemp {
        path: std::path::PathBuf,
        file: fs::File,
    }

    impl NamedTemp {
        fn path(&self) -> &std::path::Path {
            &self.path
        }
    }

    impl Write for NamedTemp {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.file.write(buf)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            self.file.flush()
        }
    }

    impl Drop for NamedTemp {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.path);
        }
    }

    fn tempfile() -> std::io::Result<NamedTemp> {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let unique = COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut path = std::env::temp_dir();
        path.push(format!("fxt65-rom-test-{}-{}.bin", std::process::id(), unique));
        let file = fs::File::create(&path)?;
        Ok(NamedTemp { path, file })
    }
}
