//! Power-of-two decode downsampling.
//!
//! A [`SampleSize`] of `n` asks the decoder to return one pixel per `n×n`
//! source block, bounding peak memory before the fine scale to the exact
//! target size.

use crate::scale::Size;

/// Power-of-two decode divisor, ≥ 1.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SampleSize(u32);

impl SampleSize {
    /// Full-resolution decode.
    pub const ONE: Self = Self(1);

    /// Create from a power of two. Returns `None` for zero or any
    /// other non-power-of-two value.
    pub const fn new(value: u32) -> Option<Self> {
        if value.is_power_of_two() {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Largest power of two ≤ `value` (1 for zero).
    pub const fn floor(value: u32) -> Self {
        if value <= 1 {
            Self::ONE
        } else {
            Self(1 << (31 - value.leading_zeros()))
        }
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    /// Dimensions of `extent` decoded at this sample size (rounded up).
    pub const fn reduce(self, extent: Size) -> Size {
        Size::new(extent.width.div_ceil(self.0), extent.height.div_ceil(self.0))
    }

    const fn doubled(self) -> Option<Self> {
        match self.0.checked_mul(2) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl Default for SampleSize {
    fn default() -> Self {
        Self::ONE
    }
}

/// Rule for when to keep doubling the sample size.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum SamplePolicy {
    /// Double while either halved axis still exceeds the requirement.
    /// Errs toward a coarser, more memory-safe decode for axis-dominant
    /// images.
    #[default]
    Conservative,

    /// Double only while both halved axes exceed the requirement, keeping
    /// every decoded axis at least as large as required.
    Balanced,
}

/// Sample size for decoding `source` so that it still serves `required`.
///
/// With `favor_rotation` set, a second candidate is computed against the
/// transposed requirement (so a device rotation does not starve detail) and
/// the finer of the two wins. The result is clamped to `max`.
pub fn calculate_sample_size(
    source: Size,
    required: Size,
    max: Option<SampleSize>,
    favor_rotation: bool,
    policy: SamplePolicy,
) -> SampleSize {
    let mut sample = candidate(source, required, policy);
    if favor_rotation {
        sample = sample.min(candidate(source, required.transposed(), policy));
    }
    match max {
        Some(max) => sample.min(max),
        None => sample,
    }
}

fn candidate(source: Size, required: Size, policy: SamplePolicy) -> SampleSize {
    let mut sample = SampleSize::ONE;
    if source.width <= required.width && source.height <= required.height {
        return sample;
    }

    let half_w = source.width / 2;
    let half_h = source.height / 2;
    loop {
        let s = sample.get();
        let wider = half_w / s > required.width;
        let taller = half_h / s > required.height;
        let keep_going = match policy {
            SamplePolicy::Conservative => wider || taller,
            SamplePolicy::Balanced => wider && taller,
        };
        if !keep_going {
            return sample;
        }
        match sample.doubled() {
            Some(next) => sample = next,
            None => return sample,
        }
    }
}
