// This file is part of the fxt65 crate.
// Copyright (c) 2024 FxT-65 emulator contributors. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

// A minimal PPM-dumping VideoSink, standing in for a real GPU backend
// (out of scope per spec.md §1) so the core is exercisable headlessly.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fxt65_core::VideoSink;

pub struct PpmVideoSink {
    out_dir: PathBuf,
    frame_no: u32,
}

impl PpmVideoSink {
    pub fn new(out_dir: impl AsRef<Path>) -> Self {
        Self {
            out_dir: out_dir.as_ref().to_path_buf(),
            frame_no: 0,
        }
    }

    fn write_ppm(&self, rgba: &[u8], width: usize, height: usize) -> io::Result<()> {
        let path = self.out_dir.join(format!("frame-{:05}.ppm", self.frame_no));
        let mut file = File::create(path)?;
        write!(file, "P6\n{} {}\n255\n", width, height)?;
        let mut rgb = Vec::with_capacity(width * height * 3);
        for pixel in rgba.chunks_exact(4) {
            rgb.extend_from_slice(&pixel[0..3]);
        }
        file.write_all(&rgb)
    }
}

impl VideoSink for PpmVideoSink {
    fn get_dimensions(&self) -> (usize, usize) {
        (fxt65_emu::chdz::FB_WIDTH, fxt65_emu::chdz::FB_HEIGHT)
    }

    fn write_frame(&mut self, rgba: &[u8]) {
        let (width, height) = self.get_dimensions();
        if let Err(err) = self.write_ppm(rgba, width, height) {
            log::error!("failed to write frame {}: {}", self.frame_no, err);
        }
        self.frame_no += 1;
    }
}

/// An audio sink that discards samples; the real host audio backend is
/// out of scope (spec.md §1).
pub struct NullAudioSink;

impl fxt65_core::AudioSink for NullAudioSink {
    fn write_sample(&mut self, _sample: f32) {}
}
