//! Error taxonomy for scale resolution, tiled decode, and encoding.
//!
//! Public fallible operations return `Result<T, At<ResizeError>>`, so every
//! error carries the file and line where it was raised (via [`whereat`]).
//! Source providers report [`SourceError`]; the compose engine wraps region
//! failures into [`ResizeError::TileDecodeFailure`] with the offending rect.

use std::io;

use whereat::{At, ErrorAtExt};

use crate::scale::{Rect, Size};

/// Convenience alias for results carrying a located [`ResizeError`].
pub type Result<T, E = At<ResizeError>> = core::result::Result<T, E>;

/// Failure of a resize, measure, or store request.
///
/// Every variant aborts the current request. No partial output is ever
/// returned alongside an error.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ResizeError {
    /// Source has zero width or height.
    #[error("invalid source dimensions {width}x{height}")]
    InvalidSourceDimensions { width: u32, height: u32 },

    /// Conflicting or malformed resize parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),

    /// A planned region could not be decoded.
    #[error("failed to decode tile at ({}, {}) {}x{}: {source}", rect.x, rect.y, rect.width, rect.height)]
    TileDecodeFailure {
        /// Source rectangle of the failing tile.
        rect: Rect,
        #[source]
        source: SourceError,
    },

    /// The decoder cannot interpret the asset.
    #[error("unsupported source format: {0}")]
    UnsupportedSourceFormat(String),

    /// An allocation the request needs could not be satisfied.
    #[error("out of memory allocating {bytes} bytes")]
    OutOfMemory { bytes: u64 },

    /// Scaling a decoded region failed.
    #[error("scale failed: {0}")]
    Scale(String),

    /// The encoder rejected the finished buffer.
    #[error("encode failed: {0}")]
    Encode(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ResizeError {
    /// Map a provider failure that happened outside of tile decode
    /// (dimension probing, full decode for store).
    pub(crate) fn from_source(err: SourceError) -> At<Self> {
        match err {
            SourceError::Unsupported(msg) | SourceError::Decode(msg) => {
                Self::UnsupportedSourceFormat(msg).start_at()
            }
            SourceError::Io(e) => Self::Io(e).start_at(),
            SourceError::OutOfMemory { bytes } => Self::OutOfMemory { bytes }.start_at(),
            SourceError::OutOfBounds { .. } => {
                Self::InvalidRequest("region outside source bounds").start_at()
            }
        }
    }
}

/// Failure reported by a source provider.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SourceError {
    /// The asset's format is not recognized or not compiled in.
    #[error("unsupported format: {0}")]
    Unsupported(String),

    /// The asset is recognized but its data is corrupt.
    #[error("decode error: {0}")]
    Decode(String),

    /// Requested rectangle does not lie within the source.
    #[error("region {rect:?} outside source {bounds:?}")]
    OutOfBounds { rect: Rect, bounds: Size },

    #[error("out of memory allocating {bytes} bytes")]
    OutOfMemory { bytes: u64 },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<image::ImageError> for SourceError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Unsupported(e) => Self::Unsupported(e.to_string()),
            image::ImageError::IoError(e) => Self::Io(e),
            other => Self::Decode(other.to_string()),
        }
    }
}

impl From<jpeg_decoder::Error> for SourceError {
    fn from(err: jpeg_decoder::Error) -> Self {
        match err {
            jpeg_decoder::Error::Unsupported(feature) => Self::Unsupported(format!("{feature:?}")),
            jpeg_decoder::Error::Io(e) => Self::Io(e),
            other => Self::Decode(other.to_string()),
        }
    }
}

/// Failure to read or rewrite orientation metadata.
///
/// Never surfaced by the pipeline: it degrades to the identity orientation.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum MetadataError {
    #[error("exif: {0}")]
    Exif(#[from] exif::Error),

    #[error("malformed exif: {0}")]
    Malformed(&'static str),

    #[error(transparent)]
    Io(#[from] io::Error),
}
