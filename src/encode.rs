//! Encoding finished buffers to JPEG or PNG.

use std::io::Write;

use image::buffer::ConvertBuffer;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage, RgbaImage};
use whereat::{At, ErrorAtExt};

use crate::error::ResizeError;

/// Encoded output format.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
}

impl OutputFormat {
    /// Conventional file extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    /// Parse a format name as accepted by callers (`"jpg"`, `"jpeg"`, `"png"`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }
}

/// Encode `image` into `writer`.
///
/// JPEG drops the alpha channel and uses `quality` (clamped to 1-100).
/// PNG is lossless; `quality` has no effect on it.
pub fn encode_to<W: Write>(
    image: &RgbaImage,
    format: OutputFormat,
    quality: u8,
    writer: W,
) -> Result<(), At<ResizeError>> {
    let (width, height) = image.dimensions();
    let result = match format {
        OutputFormat::Jpeg => {
            let rgb: RgbImage = image.convert();
            JpegEncoder::new_with_quality(writer, quality.clamp(1, 100)).write_image(
                rgb.as_raw(),
                width,
                height,
                ExtendedColorType::Rgb8,
            )
        }
        OutputFormat::Png => PngEncoder::new(writer).write_image(
            image.as_raw(),
            width,
            height,
            ExtendedColorType::Rgba8,
        ),
    };
    result.map_err(|e| match e {
        image::ImageError::IoError(io) => ResizeError::Io(io).start_at(),
        other => ResizeError::Encode(other.to_string()).start_at(),
    })
}

/// Encode `image` into a new byte vector.
pub fn encode(
    image: &RgbaImage,
    format: OutputFormat,
    quality: u8,
) -> Result<Vec<u8>, At<ResizeError>> {
    let mut out = Vec::new();
    encode_to(image, format, quality, &mut out)?;
    Ok(out)
}

/// Encode `image`, carrying `exif` (a TIFF-structured EXIF block) into
/// JPEG output. PNG output is written without it.
pub fn encode_with_exif(
    image: &RgbaImage,
    format: OutputFormat,
    quality: u8,
    exif: Option<&[u8]>,
) -> Result<Vec<u8>, At<ResizeError>> {
    let encoded = encode(image, format, quality)?;
    let Some(tiff) = exif else {
        return Ok(encoded);
    };
    if format != OutputFormat::Jpeg {
        log::debug!("EXIF block not carried into {format:?} output");
        return Ok(encoded);
    }
    match embed_exif(&encoded, tiff) {
        Some(out) => Ok(out),
        None => {
            log::warn!("EXIF block of {} bytes does not fit one APP1 segment", tiff.len());
            Ok(encoded)
        }
    }
}

const EXIF_HEADER: &[u8] = b"Exif\0\0";

/// Insert an APP1 `Exif` segment holding `tiff` into an encoded JPEG, after
/// SOI and a leading JFIF APP0 segment.
///
/// `None` when `jpeg` does not start with SOI or the block exceeds the
/// 64 KiB segment limit.
pub fn embed_exif(jpeg: &[u8], tiff: &[u8]) -> Option<Vec<u8>> {
    if !jpeg.starts_with(&[0xFF, 0xD8]) {
        return None;
    }
    let length = u16::try_from(2 + EXIF_HEADER.len() + tiff.len()).ok()?;

    let mut at = 2;
    if jpeg.get(2..4) == Some(&[0xFF, 0xE0][..]) {
        let app0 = u16::from_be_bytes([*jpeg.get(4)?, *jpeg.get(5)?]) as usize;
        at = (4 + app0).min(jpeg.len());
    }

    let mut out = Vec::with_capacity(jpeg.len() + 2 + length as usize);
    out.extend_from_slice(&jpeg[..at]);
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(EXIF_HEADER);
    out.extend_from_slice(tiff);
    out.extend_from_slice(&jpeg[at..]);
    Some(out)
}
