//! Resource limits for a single request.

use crate::sample::{SamplePolicy, SampleSize};

/// Memory and tiling bounds applied by [`resize`](crate::plan::resize).
///
/// # Example
///
/// ```
/// use tilescale::{Limits, SamplePolicy};
///
/// let limits = Limits::default()
///     .block_limit(512)
///     .memory_envelope(8 << 20)
///     .sample_policy(SamplePolicy::Balanced);
/// assert_eq!(limits.block_limit, 512);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Limits {
    /// Largest tile edge, in source pixels.
    pub block_limit: u32,
    /// Bytes a single-pass decode may occupy before tiling kicks in.
    pub memory_envelope: u64,
    /// Upper bound on the decode sample size.
    pub max_sample_size: Option<SampleSize>,
    /// Compute the sample size against both orientations of the target
    /// and keep the finer one.
    pub favor_rotation: bool,
    pub sample_policy: SamplePolicy,
    /// Largest output canvas, in pixels.
    pub max_canvas_pixels: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            block_limit: 1024,
            memory_envelope: 16 << 20,
            max_sample_size: None,
            favor_rotation: false,
            sample_policy: SamplePolicy::Conservative,
            max_canvas_pixels: 100_000_000,
        }
    }
}

impl Limits {
    pub fn block_limit(mut self, pixels: u32) -> Self {
        self.block_limit = pixels;
        self
    }

    pub fn memory_envelope(mut self, bytes: u64) -> Self {
        self.memory_envelope = bytes;
        self
    }

    /// Cap the sample size. Non-powers of two round down.
    pub fn max_sample_size(mut self, max: u32) -> Self {
        self.max_sample_size = Some(SampleSize::floor(max));
        self
    }

    pub fn favor_rotation(mut self, favor: bool) -> Self {
        self.favor_rotation = favor;
        self
    }

    pub fn sample_policy(mut self, policy: SamplePolicy) -> Self {
        self.sample_policy = policy;
        self
    }

    pub fn max_canvas_pixels(mut self, pixels: u64) -> Self {
        self.max_canvas_pixels = pixels;
        self
    }

    /// Canvas byte limit for RGBA8 output.
    pub fn max_canvas_bytes(&self) -> u64 {
        self.max_canvas_pixels.saturating_mul(4)
    }
}
