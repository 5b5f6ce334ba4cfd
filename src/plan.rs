//! Request pipeline: plan the decode, then execute it.
//!
//! Planning is pure: [`plan`] turns source dimensions, a request, and limits
//! into a [`ResizePlan`] (factors, target size, sample size, single-pass or
//! tiled). Execution ([`resize`]) decodes and composes that plan, normalizes
//! orientation, and resets the stored orientation to normal. The reset EXIF
//! block travels with the result into encoded JPEG output.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::RgbaImage;
use whereat::{At, ErrorAtExt};

use crate::compose::Composer;
use crate::encode::{OutputFormat, encode_to, encode_with_exif};
use crate::error::ResizeError;
use crate::limits::Limits;
use crate::metadata::{OrientationMetadata, read_orientation_or_normal, reset_orientation_or_log};
use crate::orientation::{Orientation, normalize_orientation};
use crate::sample::{SampleSize, calculate_sample_size};
use crate::scale::{ResizeRequest, ScaleFactor, Size, resolve_scale};
use crate::source::SourceProvider;
use crate::tile::{TilePlan, plan_tiles};

/// How the source will be decoded.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DecodeStrategy {
    /// Whole source at the sample size in one decode call.
    SinglePass,
    /// Block-bounded regions, one at a time.
    Tiled,
}

/// Decisions for one request, computed before any pixel is decoded.
#[derive(Clone, Debug, PartialEq)]
pub struct ResizePlan {
    pub source: Size,
    pub factor: ScaleFactor,
    /// Output canvas size (before orientation).
    pub target: Size,
    pub sample: SampleSize,
    pub strategy: DecodeStrategy,
    /// Regions to decode and where they go.
    pub tiles: TilePlan,
}

impl ResizePlan {
    /// Bytes of a single-pass decode at the planned sample size. `None` if
    /// that does not fit in a `u64`.
    pub fn single_pass_bytes(&self) -> Option<u64> {
        self.sample.reduce(self.source).rgba_bytes()
    }
}

/// Plan a resize of a `source`-sized image.
pub fn plan(
    source: Size,
    request: &ResizeRequest,
    limits: &Limits,
) -> Result<ResizePlan, At<ResizeError>> {
    let factor = resolve_scale(source, request)?;
    let target = factor.apply(source)?;
    if target.area() > limits.max_canvas_pixels {
        return Err(ResizeError::OutOfMemory {
            bytes: target.area().saturating_mul(4),
        }
        .start_at());
    }

    let sample = calculate_sample_size(
        source,
        target,
        limits.max_sample_size,
        limits.favor_rotation,
        limits.sample_policy,
    );
    let single_pass_bytes = sample
        .reduce(source)
        .rgba_bytes()
        .ok_or_else(|| ResizeError::OutOfMemory { bytes: u64::MAX }.start_at())?;
    let (strategy, tiles) = if single_pass_bytes <= limits.memory_envelope {
        (DecodeStrategy::SinglePass, TilePlan::single(source, target))
    } else {
        (DecodeStrategy::Tiled, plan_tiles(source, target, limits.block_limit)?)
    };

    log::debug!(
        "plan {}x{} -> {}x{}: factor {:.4}x{:.4}, sample {}, {:?} ({} tiles)",
        source.width,
        source.height,
        target.width,
        target.height,
        factor.width,
        factor.height,
        sample.get(),
        strategy,
        tiles.len()
    );

    Ok(ResizePlan {
        source,
        factor,
        target,
        sample,
        strategy,
        tiles,
    })
}

/// A finished, upright, resized image.
#[derive(Clone, Debug, PartialEq)]
pub struct Resized {
    image: RgbaImage,
    plan: ResizePlan,
    orientation: Orientation,
    format: OutputFormat,
    quality: u8,
    exif: Option<Vec<u8>>,
}

impl Resized {
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Final dimensions, after orientation.
    pub fn size(&self) -> Size {
        Size::new(self.image.width(), self.image.height())
    }

    pub fn plan(&self) -> &ResizePlan {
        &self.plan
    }

    /// Orientation that was applied to reach upright pixels.
    pub fn orientation_applied(&self) -> Orientation {
        self.orientation
    }

    /// EXIF block carried into encoded output, orientation already reset.
    pub fn exif(&self) -> Option<&[u8]> {
        self.exif.as_deref()
    }

    /// Encode with the request's format and quality, carrying the EXIF block.
    pub fn encode(&self) -> Result<Vec<u8>, At<ResizeError>> {
        encode_with_exif(&self.image, self.format, self.quality, self.exif())
    }
}

/// Resize the image behind `source`.
///
/// Orientation metadata is read from `metadata` (unreadable means normal),
/// applied to the pixels, then reset to normal in `metadata`. Metadata
/// failures are logged and never fail the request. The EXIF block is kept
/// for output only when the reset succeeded, so a stale orientation is never
/// written next to upright pixels.
pub fn resize<S, M>(
    source: &mut S,
    metadata: &mut M,
    request: &ResizeRequest,
    limits: &Limits,
) -> Result<Resized, At<ResizeError>>
where
    S: SourceProvider,
    M: OrientationMetadata + ?Sized,
{
    let plan = plan(measure(source)?, request, limits)?;

    let canvas = Composer::new()
        .max_canvas_bytes(limits.max_canvas_bytes())
        .decode_and_compose(source, &plan.tiles, plan.sample)?;

    let tag = read_orientation_or_normal(metadata);
    let normalized = normalize_orientation(canvas, tag);
    let exif = if reset_orientation_or_log(metadata) {
        metadata.exif_block()
    } else {
        None
    };

    Ok(Resized {
        image: normalized.image,
        plan,
        orientation: normalized.applied,
        format: request.format,
        quality: request.quality,
        exif,
    })
}

/// Source dimensions without decoding pixels.
pub fn measure<S: SourceProvider>(source: &mut S) -> Result<Size, At<ResizeError>> {
    let size = source.dimensions().map_err(ResizeError::from_source)?;
    if size.is_empty() {
        return Err(ResizeError::InvalidSourceDimensions {
            width: size.width,
            height: size.height,
        }
        .start_at());
    }
    Ok(size)
}

/// Where a stored image was written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stored {
    pub path: PathBuf,
    pub size: Size,
}

/// Decode `source` at full size and write it to `path` re-encoded.
pub fn store<S: SourceProvider>(
    source: &mut S,
    format: OutputFormat,
    quality: u8,
    path: impl AsRef<Path>,
) -> Result<Stored, At<ResizeError>> {
    let size = measure(source)?;
    let image = Composer::new().decode_and_compose(
        source,
        &TilePlan::single(size, size),
        SampleSize::ONE,
    )?;

    let path = path.as_ref();
    let file = File::create(path).map_err(|e| ResizeError::Io(e).start_at())?;
    encode_to(&image, format, quality, BufWriter::new(file))?;
    log::debug!("stored {}x{} {:?} to {}", size.width, size.height, format, path.display());
    Ok(Stored {
        path: path.to_path_buf(),
        size,
    })
}
