//! Memory-bounded image resizing with tiled region decode.
//!
//! A request is resolved into per-axis scale factors, a power-of-two decode
//! sample size, and (for large sources) a grid of block-bounded tiles that are
//! decoded one at a time and composed onto the output canvas. EXIF orientation
//! is applied to the result and reset to normal afterwards; the reset EXIF
//! block is carried into JPEG output.
//!
//! # Modules
//!
//! - [`scale`] - Resize modes, requests, and scale-factor resolution
//! - [`sample`] - Power-of-two decode sample sizes
//! - [`tile`] - Tile grid planning
//! - [`compose`] - Region decode and canvas composition
//! - [`orientation`] - EXIF orientation, D4 dihedral group, pixel transforms
//! - [`source`] - Region-decoding sources
//! - [`metadata`] - Orientation metadata read and reset
//! - [`encode`] - JPEG/PNG output
//! - [`plan`] - Two-phase pipeline: plan, then decode and compose
//!
//! # Example
//!
//! ```no_run
//! use tilescale::{ExifMetadata, ImageSource, Limits, ResizeMode, ResizeRequest, resize};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut source = ImageSource::from_path("photo.jpg");
//! let mut metadata = ExifMetadata::open("photo.jpg")?;
//! let request = ResizeRequest::new(800.0, 600.0, ResizeMode::FitToDimensions).quality(85);
//! let resized = resize(&mut source, &mut metadata, &request, &Limits::default())
//!     .map_err(|e| e.error().to_string())?;
//! std::fs::write("photo-800.jpg", resized.encode().map_err(|e| e.error().to_string())?)?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod compose;
pub mod encode;
pub mod error;
pub mod limits;
pub mod metadata;
pub mod orientation;
pub mod plan;
pub mod sample;
pub mod scale;
pub mod source;
pub mod tile;

pub use compose::{Composer, decode_and_compose};
pub use encode::{OutputFormat, embed_exif, encode, encode_to, encode_with_exif};
pub use error::{MetadataError, ResizeError, Result, SourceError};
pub use limits::Limits;
pub use metadata::{
    ExifMetadata, NoMetadata, OrientationMetadata, read_orientation_or_normal,
    reset_orientation_or_log,
};
pub use orientation::{Normalized, Orientation, OrientationTag, normalize_orientation};
pub use plan::{DecodeStrategy, ResizePlan, Resized, Stored, measure, plan, resize, store};
pub use sample::{SamplePolicy, SampleSize, calculate_sample_size};
pub use scale::{Rect, ResizeMode, ResizeRequest, ScaleFactor, Size, resolve_scale};
pub use source::{ImageSource, RegionPixels, SourceProvider, SourceRef};
pub use tile::{Tile, TilePlan, plan_tiles};
pub use whereat::At;
