//! Stub frame source.
//!
//! Generates synthetic scenes so the full sampling pipeline runs without
//! hardware. The generator is deterministic per scene name and sequence
//! number; optional sensor noise breaks that determinism for CLI use and
//! stays off in tests.

use anyhow::Result;
use rand::Rng;
use sha2::{Digest, Sha256};

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

/// Configuration for a stub source.
#[derive(Clone, Debug)]
pub struct StubConfig {
    /// Scene name; seeds the generated content.
    pub scene: String,
    pub width: u32,
    pub height: u32,
    /// Inject per-frame sensor noise. Defaults off so tests are reproducible.
    pub sensor_noise: bool,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            scene: "lobby".to_string(),
            width: 640,
            height: 480,
            sensor_noise: false,
        }
    }
}

/// Synthetic frame source.
pub struct StubSource {
    config: StubConfig,
    seed: [u8; 32],
    frame_count: u64,
    /// Scene state advances periodically to simulate people moving through.
    scene_state: u8,
}

impl StubSource {
    pub fn new(config: StubConfig) -> Self {
        let seed: [u8; 32] = Sha256::digest(config.scene.as_bytes()).into();
        Self {
            config,
            seed,
            frame_count: 0,
            scene_state: 0,
        }
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        let pixel_count = (self.config.width as usize) * (self.config.height as usize) * 3;

        if self.frame_count % 5 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }

        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            // Mix seed, frame count, scene state, and position for variation.
            let mixed =
                ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
            *pixel = self.seed[i % 32] ^ mixed;
        }

        if self.config.sensor_noise {
            let mut rng = rand::thread_rng();
            for pixel in pixels.iter_mut().step_by(97) {
                *pixel = pixel.wrapping_add(rng.gen_range(0..4));
            }
        }

        pixels
    }
}

impl FrameSource for StubSource {
    fn connect(&mut self) -> Result<()> {
        log::info!("StubSource: connected to stub://{}", self.config.scene);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            self.frame_count,
        )
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            origin: format!("stub://{}", self.config.scene),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_config() -> StubConfig {
        StubConfig {
            scene: "test".to_string(),
            width: 64,
            height: 48,
            sensor_noise: false,
        }
    }

    #[test]
    fn stub_source_produces_frames() -> Result<()> {
        let mut source = StubSource::new(quiet_config());
        source.connect()?;

        let frame = source.next_frame()?;
        assert_eq!(frame.width, 64);
        assert_eq!(frame.height, 48);
        assert_eq!(frame.seq, 1);
        assert_eq!(frame.pixels().len(), 64 * 48 * 3);

        Ok(())
    }

    #[test]
    fn stub_frames_vary_across_the_window() -> Result<()> {
        let mut source = StubSource::new(quiet_config());
        source.connect()?;

        let a = source.next_frame()?;
        let b = source.next_frame()?;
        assert_ne!(a.digest(), b.digest());

        Ok(())
    }

    #[test]
    fn noiseless_scenes_are_reproducible() -> Result<()> {
        let mut first = StubSource::new(quiet_config());
        let mut second = StubSource::new(quiet_config());
        first.connect()?;
        second.connect()?;

        for _ in 0..3 {
            assert_eq!(first.next_frame()?.digest(), second.next_frame()?.digest());
        }

        Ok(())
    }

    #[test]
    fn distinct_scenes_differ() -> Result<()> {
        let mut lobby = StubSource::new(StubConfig {
            scene: "lobby".to_string(),
            ..quiet_config()
        });
        let mut gate = StubSource::new(StubConfig {
            scene: "gate".to_string(),
            ..quiet_config()
        });
        lobby.connect()?;
        gate.connect()?;

        assert_ne!(lobby.next_frame()?.digest(), gate.next_frame()?.digest());

        Ok(())
    }
}
