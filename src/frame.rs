//! Captured frames.
//!
//! A `Frame` is one RGB8 image handed from an ingest source to the detector.
//! Frames are in-memory only; sources never persist them.

use anyhow::{anyhow, Result};
use sha2::{Digest, Sha256};
use std::time::Instant;

/// One captured RGB8 frame.
pub struct Frame {
    data: Vec<u8>,

    pub width: u32,
    pub height: u32,

    /// Monotonically increasing capture sequence number, per source.
    pub seq: u64,

    captured_at: Instant,
}

impl Frame {
    /// Create a frame from tightly packed RGB8 bytes.
    pub fn new(data: Vec<u8>, width: u32, height: u32, seq: u64) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "frame length mismatch: expected {} RGB bytes for {}x{}, got {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            seq,
            captured_at: Instant::now(),
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Age since capture, for source health accounting.
    pub fn age_secs(&self) -> u64 {
        self.captured_at.elapsed().as_secs()
    }

    /// Content digest. Two consecutive identical digests indicate a stalled
    /// source re-delivering the same buffer.
    pub fn digest(&self) -> [u8; 32] {
        Sha256::digest(&self.data).into()
    }
}
