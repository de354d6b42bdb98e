//! Still-image directory source.
//!
//! Reads a directory of JPEG/PNG frames in lexical order and decodes them to
//! RGB8. Exhausting the directory is a capture failure, which ends the
//! sampling window early.

#![cfg(feature = "ingest-image")]

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

/// Frame source over a directory of still images.
pub struct ImageDirSource {
    dir: PathBuf,
    entries: Vec<PathBuf>,
    next_index: usize,
    frame_count: u64,
    last_error: Option<String>,
}

impl ImageDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(anyhow!("{} is not a directory", dir.display()));
        }
        Ok(Self {
            dir,
            entries: Vec::new(),
            next_index: 0,
            frame_count: 0,
            last_error: None,
        })
    }

    fn is_supported(path: &PathBuf) -> bool {
        matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("jpg") | Some("jpeg") | Some("png")
        )
    }
}

impl FrameSource for ImageDirSource {
    fn connect(&mut self) -> Result<()> {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(&self.dir)
            .with_context(|| format!("read image directory {}", self.dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(Self::is_supported)
            .collect();
        entries.sort();

        if entries.is_empty() {
            return Err(anyhow!(
                "image directory {} contains no .jpg/.jpeg/.png frames",
                self.dir.display()
            ));
        }

        log::info!(
            "ImageDirSource: connected to {} ({} frames)",
            self.dir.display(),
            entries.len()
        );
        self.entries = entries;
        self.next_index = 0;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        let Some(path) = self.entries.get(self.next_index) else {
            return Err(anyhow!(
                "image directory {} exhausted after {} frames",
                self.dir.display(),
                self.frame_count
            ));
        };
        self.next_index += 1;

        let decoded = image::open(path)
            .with_context(|| format!("decode image {}", path.display()))
            .map_err(|err| {
                self.last_error = Some(err.to_string());
                err
            })?
            .to_rgb8();

        let (width, height) = decoded.dimensions();
        self.frame_count += 1;
        Frame::new(decoded.into_raw(), width, height, self.frame_count)
    }

    fn is_healthy(&self) -> bool {
        self.last_error.is_none() && self.next_index < self.entries.len()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            origin: self.dir.display().to_string(),
        }
    }
}
