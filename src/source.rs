//! Source providers: dimension probing and region-bounded decode.

use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read, Seek};
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageFormat, ImageReader, RgbImage, RgbaImage};
use jpeg_decoder::PixelFormat;

use crate::error::SourceError;
use crate::sample::SampleSize;
use crate::scale::{Rect, Size};

/// Decoded RGBA8 pixels of one region.
pub trait RegionPixels {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// Tightly packed RGBA8 rows, `width * height * 4` bytes.
    fn rgba(&self) -> &[u8];
}

impl RegionPixels for RgbaImage {
    fn width(&self) -> u32 {
        RgbaImage::width(self)
    }

    fn height(&self) -> u32 {
        RgbaImage::height(self)
    }

    fn rgba(&self) -> &[u8] {
        self.as_raw()
    }
}

/// Something that can report its dimensions and decode arbitrary regions.
pub trait SourceProvider {
    /// Decoded region type. Dropping it releases the region's memory.
    type Region: RegionPixels;

    /// Source dimensions, without decoding pixels where possible.
    fn dimensions(&mut self) -> Result<Size, SourceError>;

    /// Decode `rect` (source coordinates), downsampled by `sample`.
    ///
    /// The returned region is nominally `sample.reduce(rect.size())`, but any
    /// non-empty size is accepted: the engine scales it to its destination.
    fn decode_region(&mut self, rect: Rect, sample: SampleSize)
    -> Result<Self::Region, SourceError>;
}

/// Opaque reference to an encoded image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceRef {
    Path(PathBuf),
    Blob(Vec<u8>),
}

/// Source pixels decoded at one sample size, kept between region requests.
#[derive(Debug)]
struct Reduced {
    sample: SampleSize,
    pixels: RgbaImage,
}

/// [`SourceProvider`] over an encoded file or in-memory blob.
///
/// The `image` crate has no region decoder, so the asset is decoded once per
/// sample size and only the sample-reduced pixels are kept for later crops.
/// JPEG is reduced inside the decoder (DCT scaling), so its full resolution
/// is never materialised; other formats are decoded in full, reduced, and
/// the full buffer is dropped at once. A request covering the whole source
/// hands the reduced pixels over without copying and keeps nothing.
#[derive(Debug)]
pub struct ImageSource {
    reference: SourceRef,
    size: Option<Size>,
    reduced: Option<Reduced>,
}

impl ImageSource {
    pub fn new(reference: SourceRef) -> Self {
        Self {
            reference,
            size: None,
            reduced: None,
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self::new(SourceRef::Path(path.as_ref().to_path_buf()))
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(SourceRef::Blob(bytes.into()))
    }

    pub fn reference(&self) -> &SourceRef {
        &self.reference
    }

    /// Dimensions of the pixels held between region requests, if any.
    pub fn retained(&self) -> Option<Size> {
        self.reduced
            .as_ref()
            .map(|r| Size::new(r.pixels.width(), r.pixels.height()))
    }

    fn decode_reduced(&self, size: Size, sample: SampleSize) -> Result<RgbaImage, SourceError> {
        let target = sample.reduce(size);
        let image = match &self.reference {
            SourceRef::Path(path) => decode_at(BufReader::new(File::open(path)?), target, sample)?,
            SourceRef::Blob(bytes) => decode_at(Cursor::new(bytes.as_slice()), target, sample)?,
        };
        log::debug!(
            "decoded source {}x{} at 1/{} -> {}x{}",
            size.width,
            size.height,
            sample.get(),
            image.width(),
            image.height()
        );
        Ok(image)
    }
}

impl SourceProvider for ImageSource {
    type Region = RgbaImage;

    fn dimensions(&mut self) -> Result<Size, SourceError> {
        if let Some(size) = self.size {
            return Ok(size);
        }
        let (width, height) = match &self.reference {
            SourceRef::Path(path) => ImageReader::open(path)?
                .with_guessed_format()?
                .into_dimensions()?,
            SourceRef::Blob(bytes) => ImageReader::new(Cursor::new(bytes.as_slice()))
                .with_guessed_format()?
                .into_dimensions()?,
        };
        let size = Size::new(width, height);
        self.size = Some(size);
        Ok(size)
    }

    fn decode_region(&mut self, rect: Rect, sample: SampleSize) -> Result<RgbaImage, SourceError> {
        let bounds = self.dimensions()?;
        if rect.is_empty() || !rect.fits_within(bounds) {
            return Err(SourceError::OutOfBounds { rect, bounds });
        }

        if self.reduced.as_ref().is_some_and(|r| r.sample != sample) {
            self.reduced = None;
        }
        let pixels = match self.reduced.take() {
            Some(kept) => kept.pixels,
            None => self.decode_reduced(bounds, sample)?,
        };
        if rect == Rect::from_size(bounds) {
            return Ok(pixels);
        }

        let within = Size::new(pixels.width(), pixels.height());
        let r = reduced_rect(rect, sample, within);
        let region = imageops::crop_imm(&pixels, r.x, r.y, r.width, r.height).to_image();
        self.reduced = Some(Reduced { sample, pixels });
        Ok(region)
    }
}

/// `rect` in source coordinates mapped onto pixels reduced by `sample`,
/// widened to whole reduced pixels and kept non-empty.
fn reduced_rect(rect: Rect, sample: SampleSize, within: Size) -> Rect {
    let s = sample.get();
    let x = (rect.x / s).min(within.width - 1);
    let y = (rect.y / s).min(within.height - 1);
    let right = (rect.right().div_ceil(s as u64) as u32).clamp(x + 1, within.width);
    let bottom = (rect.bottom().div_ceil(s as u64) as u32).clamp(y + 1, within.height);
    Rect::new(x, y, right - x, bottom - y)
}

/// Decode the stream behind `reader` to exactly `target` pixels.
fn decode_at<R: BufRead + Seek>(
    reader: R,
    target: Size,
    sample: SampleSize,
) -> Result<RgbaImage, SourceError> {
    let reader = ImageReader::new(reader).with_guessed_format()?;
    if sample == SampleSize::ONE {
        return Ok(reader.decode()?.into_rgba8());
    }

    let image = if reader.format() == Some(ImageFormat::Jpeg) {
        let mut inner = reader.into_inner();
        match decode_jpeg_scaled(&mut inner, target)? {
            Some(image) => image,
            None => {
                inner.rewind()?;
                ImageReader::new(inner)
                    .with_guessed_format()?
                    .decode()?
                    .into_rgba8()
            }
        }
    } else {
        reader.decode()?.into_rgba8()
    };

    if (image.width(), image.height()) == (target.width, target.height) {
        Ok(image)
    } else if image.width() >= target.width && image.height() >= target.height {
        Ok(imageops::thumbnail(&image, target.width, target.height))
    } else {
        Ok(imageops::resize(&image, target.width, target.height, FilterType::Triangle))
    }
}

/// Decode a JPEG at the smallest DCT scale (1/8 to 1/1) covering `target`.
/// `None` for colour models left to the generic decoder.
fn decode_jpeg_scaled<R: Read>(reader: R, target: Size) -> Result<Option<RgbaImage>, SourceError> {
    let mut decoder = jpeg_decoder::Decoder::new(reader);
    decoder.read_info()?;
    let clamp = |v: u32| u16::try_from(v).unwrap_or(u16::MAX);
    let (width, height) = decoder.scale(clamp(target.width), clamp(target.height))?;
    let pixels = decoder.decode()?;
    let Some(info) = decoder.info() else {
        return Err(SourceError::Decode("JPEG header missing".into()));
    };

    let (w, h) = (u32::from(width), u32::from(height));
    let image = match info.pixel_format {
        PixelFormat::RGB24 => RgbImage::from_raw(w, h, pixels).map(DynamicImage::ImageRgb8),
        PixelFormat::L8 => GrayImage::from_raw(w, h, pixels).map(DynamicImage::ImageLuma8),
        // big-endian samples: keep the high byte
        PixelFormat::L16 => {
            let high = pixels.chunks_exact(2).map(|p| p[0]).collect();
            GrayImage::from_raw(w, h, high).map(DynamicImage::ImageLuma8)
        }
        _ => return Ok(None),
    };
    match image {
        Some(image) => Ok(Some(image.into_rgba8())),
        None => Err(SourceError::Decode(format!(
            "JPEG buffer does not match {w}x{h}"
        ))),
    }
}
