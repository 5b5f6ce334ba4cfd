//! Scale-factor resolution for resize requests.
//!
//! Maps source dimensions and a [`ResizeRequest`] to a per-axis
//! [`ScaleFactor`]. Pure arithmetic: no pixel access, no allocation.
//!
//! # Example
//!
//! ```
//! use tilescale::{ResizeMode, ResizeRequest, Size, resolve_scale};
//!
//! let request = ResizeRequest::new(800.0, 600.0, ResizeMode::FitToDimensions);
//! let factor = resolve_scale(Size::new(4000, 2000), &request).unwrap();
//!
//! // Width constrains: 800 / 4000 on both axes.
//! assert_eq!(factor.apply(Size::new(4000, 2000)).unwrap(), Size::new(800, 400));
//! ```

use whereat::{At, ErrorAtExt};

use crate::encode::OutputFormat;
use crate::error::ResizeError;

/// Width × height dimensions in pixels.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Size {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Size {
    /// Create a new size.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total pixel count.
    pub const fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Whether either axis is zero.
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Same dimensions with the axes exchanged.
    pub const fn transposed(self) -> Self {
        Self::new(self.height, self.width)
    }

    /// Bytes of an RGBA8 buffer this size. `None` if that overflows `u64`.
    pub const fn rgba_bytes(self) -> Option<u64> {
        self.area().checked_mul(4)
    }
}

/// Axis-aligned rectangle in pixel coordinates.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    /// Create a new rect.
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rect at the origin covering `size`.
    pub const fn from_size(size: Size) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    /// Exclusive right edge.
    pub const fn right(&self) -> u64 {
        self.x as u64 + self.width as u64
    }

    /// Exclusive bottom edge.
    pub const fn bottom(&self) -> u64 {
        self.y as u64 + self.height as u64
    }

    pub const fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub const fn area(&self) -> u64 {
        self.size().area()
    }

    pub const fn is_empty(&self) -> bool {
        self.size().is_empty()
    }

    /// Whether this rect lies entirely within `(0, 0, bounds)`.
    pub const fn fits_within(&self, bounds: Size) -> bool {
        self.right() <= bounds.width as u64 && self.bottom() <= bounds.height as u64
    }
}

/// How desired dimensions are reconciled with the source.
#[non_exhaustive]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ResizeMode {
    /// Scale to fit within the desired box, preserving aspect ratio.
    /// Never upscales: factors are capped at 1.0.
    #[default]
    FitToDimensions,

    /// Scale so the image covers at least the desired box, preserving
    /// aspect ratio. Images already inside the box stay unscaled.
    MinimumPixelBound,

    /// Like [`FitToDimensions`](Self::FitToDimensions), but without the
    /// 1.0 cap. Upscales when the desired box is larger than the source.
    MaximumPixelBound,

    /// Desired width/height are the factors themselves.
    Factor,
}

/// Parameters of a single resize request.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ResizeRequest {
    /// Desired width in pixels (or a factor in [`ResizeMode::Factor`]).
    /// `0.0` leaves the axis unconstrained.
    pub width: f64,
    /// Desired height in pixels (or a factor in [`ResizeMode::Factor`]).
    pub height: f64,
    pub mode: ResizeMode,
    /// Device pixel density, ≥ 1.0.
    pub density: f64,
    /// Encoder quality, 0-100.
    pub quality: u8,
    pub format: OutputFormat,
}

impl ResizeRequest {
    /// Encoder quality used when none is given.
    pub const DEFAULT_QUALITY: u8 = 70;

    /// Create a request at density 1.0, default quality, JPEG output.
    pub fn new(width: f64, height: f64, mode: ResizeMode) -> Self {
        Self {
            width,
            height,
            mode,
            density: 1.0,
            quality: Self::DEFAULT_QUALITY,
            format: OutputFormat::Jpeg,
        }
    }

    /// Set the device pixel density.
    pub fn density(mut self, density: f64) -> Self {
        self.density = density;
        self
    }

    /// Set encoder quality. Values above 100 are clamped.
    pub fn quality(mut self, quality: u8) -> Self {
        self.quality = quality.min(100);
        self
    }

    /// Set output format.
    pub fn format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    fn validate(&self) -> Result<(), At<ResizeError>> {
        if !self.width.is_finite() || !self.height.is_finite() {
            return Err(ResizeError::InvalidRequest("desired dimensions must be finite").start_at());
        }
        if self.width < 0.0 || self.height < 0.0 {
            return Err(ResizeError::InvalidRequest("desired dimensions must not be negative").start_at());
        }
        if !self.density.is_finite() || self.density < 1.0 {
            return Err(ResizeError::InvalidRequest("pixel density must be at least 1.0").start_at());
        }
        match self.mode {
            ResizeMode::Factor if self.width == 0.0 || self.height == 0.0 => {
                Err(ResizeError::InvalidRequest("scale factors must be positive").start_at())
            }
            ResizeMode::FitToDimensions | ResizeMode::MaximumPixelBound
                if self.width == 0.0 && self.height == 0.0 =>
            {
                Err(ResizeError::InvalidRequest("fit requires a desired width or height").start_at())
            }
            _ => Ok(()),
        }
    }
}

/// Per-axis scale factors. Both are finite and > 0.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ScaleFactor {
    pub width: f64,
    pub height: f64,
}

impl ScaleFactor {
    /// No scaling.
    pub const IDENTITY: Self = Self {
        width: 1.0,
        height: 1.0,
    };

    /// Same factor on both axes.
    pub const fn uniform(factor: f64) -> Self {
        Self {
            width: factor,
            height: factor,
        }
    }

    /// Whether both axes are unscaled.
    pub fn is_identity(&self) -> bool {
        self.width == 1.0 && self.height == 1.0
    }

    /// Target dimensions for `source`: `round(source × factor)`, at least 1.
    pub fn apply(&self, source: Size) -> Result<Size, At<ResizeError>> {
        let width = scale_axis(source.width, self.width)?;
        let height = scale_axis(source.height, self.height)?;
        Ok(Size::new(width, height))
    }
}

fn scale_axis(extent: u32, factor: f64) -> Result<u32, At<ResizeError>> {
    let scaled = (extent as f64 * factor).round();
    num_traits::cast::<f64, u32>(scaled)
        .map(|v| v.max(1))
        .ok_or_else(|| ResizeError::InvalidRequest("scaled dimension out of range").start_at())
}

/// Compute the scale factors for `source` under `request`.
pub fn resolve_scale(
    source: Size,
    request: &ResizeRequest,
) -> Result<ScaleFactor, At<ResizeError>> {
    if source.is_empty() {
        return Err(ResizeError::InvalidSourceDimensions {
            width: source.width,
            height: source.height,
        }
        .start_at());
    }
    request.validate()?;

    let width_factor = request.width / source.width as f64;
    let height_factor = request.height / source.height as f64;

    let factor = match request.mode {
        ResizeMode::FitToDimensions => {
            ScaleFactor::uniform(fit_within(width_factor, height_factor).min(1.0))
        }
        ResizeMode::MaximumPixelBound => {
            ScaleFactor::uniform(fit_within(width_factor, height_factor))
        }
        ResizeMode::MinimumPixelBound => cover_at_least(width_factor, height_factor),
        ResizeMode::Factor => ScaleFactor {
            width: request.width,
            height: request.height,
        },
    };

    Ok(apply_density(factor, request.density))
}

/// Uniform factor that fits inside the box. A zero factor means the axis
/// is unconstrained and adopts the other axis's factor.
fn fit_within(width_factor: f64, height_factor: f64) -> f64 {
    if width_factor == 0.0 {
        height_factor
    } else if height_factor == 0.0 {
        width_factor
    } else {
        width_factor.min(height_factor)
    }
}

/// Uniform factor that covers the box when shrinking; unscaled otherwise.
fn cover_at_least(width_factor: f64, height_factor: f64) -> ScaleFactor {
    let (w, h) = match (width_factor == 0.0, height_factor == 0.0) {
        (true, true) => return ScaleFactor::IDENTITY,
        (true, false) => (height_factor, height_factor),
        (false, true) => (width_factor, width_factor),
        (false, false) => (width_factor, height_factor),
    };
    let larger = w.max(h);
    if larger <= 1.0 {
        ScaleFactor::uniform(larger)
    } else {
        ScaleFactor::IDENTITY
    }
}

/// Multiply by density while the result stays below 1.0.
///
/// A density-adjusted factor that would reach or pass 1.0 is clamped to
/// 1.0. Factors already ≥ 1.0 (explicit upscales) are left untouched.
fn apply_density(factor: ScaleFactor, density: f64) -> ScaleFactor {
    if density == 1.0 {
        return factor;
    }
    let adjust = |f: f64| {
        let scaled = f * density;
        if scaled < 1.0 {
            scaled
        } else if f >= 1.0 {
            f
        } else {
            1.0
        }
    };
    ScaleFactor {
        width: adjust(factor.width),
        height: adjust(factor.height),
    }
}
