//! Region decode-and-compose engine.
//!
//! Decodes each planned tile from the source, scales it to its destination
//! footprint, and copies it into a canvas allocated once up front. Tiles are
//! processed strictly one at a time: a tile's decoded and scaled buffers are
//! dropped before the next tile is requested, so peak memory is the canvas
//! plus one tile.
//!
//! Destination rects come from [`plan_tiles`](crate::tile::plan_tiles), whose
//! rects are pairwise disjoint and cover the canvas, so each canvas byte is
//! written exactly once.

use fast_image_resize as fir;
use fir::images::{Image, ImageRef};
use fir::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::RgbaImage;
use whereat::{At, ErrorAtExt};

use crate::error::{ResizeError, SourceError};
use crate::sample::SampleSize;
use crate::scale::{Rect, Size};
use crate::source::{RegionPixels, SourceProvider};
use crate::tile::{Tile, TilePlan};

const BYTES_PER_PIXEL: usize = 4;

/// Decode-and-compose engine. Holds the resampler state reused across tiles.
pub struct Composer {
    resizer: Resizer,
    filter: FilterType,
    max_canvas_bytes: u64,
}

impl Default for Composer {
    fn default() -> Self {
        Self::new()
    }
}

impl Composer {
    /// Bilinear resampling, canvas bounded only by addressable memory.
    pub fn new() -> Self {
        Self {
            resizer: Resizer::new(),
            filter: FilterType::Bilinear,
            max_canvas_bytes: u64::MAX,
        }
    }

    /// Set the resampling filter used to scale tiles to their footprint.
    pub fn filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    /// Refuse canvases larger than `bytes`.
    pub fn max_canvas_bytes(mut self, bytes: u64) -> Self {
        self.max_canvas_bytes = bytes;
        self
    }

    /// Decode every tile of `plan` from `source` at `sample` and compose the
    /// result onto a `plan.target()`-sized canvas.
    ///
    /// Fails fast: the first tile that cannot be decoded aborts the whole
    /// operation with [`ResizeError::TileDecodeFailure`] and the partial
    /// canvas is dropped.
    pub fn decode_and_compose<S: SourceProvider>(
        &mut self,
        source: &mut S,
        plan: &TilePlan,
        sample: SampleSize,
    ) -> Result<RgbaImage, At<ResizeError>> {
        let size = plan.target();
        let mut canvas = allocate_canvas(size, self.max_canvas_bytes)?;

        for (index, tile) in plan.iter().enumerate() {
            if tile.dest.is_empty() {
                log::trace!("tile {index} collapses to nothing on the canvas, skipped");
                continue;
            }
            log::trace!(
                "tile {index}: source {:?} -> dest {:?} at sample {}",
                tile.source,
                tile.dest,
                sample.get()
            );
            let region = source
                .decode_region(tile.source, sample)
                .map_err(|e| tile_failure(tile, e))?;
            self.compose_tile(&region, tile, &mut canvas, size)?;
            // region is dropped here, before the next decode
        }

        RgbaImage::from_raw(size.width, size.height, canvas)
            .ok_or_else(|| ResizeError::Scale("canvas size mismatch".into()).start_at())
    }

    fn compose_tile<R: RegionPixels>(
        &mut self,
        region: &R,
        tile: &Tile,
        canvas: &mut [u8],
        canvas_size: Size,
    ) -> Result<(), At<ResizeError>> {
        if !tile.dest.fits_within(canvas_size) {
            return Err(ResizeError::InvalidRequest("tile destination outside the canvas").start_at());
        }
        let (rw, rh) = (region.width(), region.height());
        let expected = rw as usize * rh as usize * BYTES_PER_PIXEL;
        if rw == 0 || rh == 0 || region.rgba().len() != expected {
            return Err(tile_failure(
                tile,
                SourceError::Decode(format!(
                    "region buffer is {} bytes for {rw}x{rh}",
                    region.rgba().len()
                )),
            ));
        }

        if (rw, rh) == (tile.dest.width, tile.dest.height) {
            blit(region.rgba(), tile.dest, canvas, canvas_size.width);
            return Ok(());
        }

        let src = ImageRef::new(rw, rh, region.rgba(), PixelType::U8x4)
            .map_err(|e| ResizeError::Scale(e.to_string()).start_at())?;
        let mut scaled = Image::new(tile.dest.width, tile.dest.height, PixelType::U8x4);
        let options = ResizeOptions::new()
            .resize_alg(ResizeAlg::Convolution(self.filter))
            .use_alpha(false);
        self.resizer
            .resize(&src, &mut scaled, &options)
            .map_err(|e| ResizeError::Scale(e.to_string()).start_at())?;
        blit(scaled.buffer(), tile.dest, canvas, canvas_size.width);
        Ok(())
    }
}

/// Decode and compose with a default [`Composer`].
pub fn decode_and_compose<S: SourceProvider>(
    source: &mut S,
    plan: &TilePlan,
    sample: SampleSize,
) -> Result<RgbaImage, At<ResizeError>> {
    Composer::new().decode_and_compose(source, plan, sample)
}

fn tile_failure(tile: &Tile, source: SourceError) -> At<ResizeError> {
    ResizeError::TileDecodeFailure {
        rect: tile.source,
        source,
    }
    .start_at()
}

/// Zeroed RGBA8 canvas. Allocation failure is reported, not aborted on.
fn allocate_canvas(size: Size, max_bytes: u64) -> Result<Vec<u8>, At<ResizeError>> {
    let bytes = size
        .rgba_bytes()
        .ok_or_else(|| ResizeError::OutOfMemory { bytes: u64::MAX }.start_at())?;
    if bytes > max_bytes {
        return Err(ResizeError::OutOfMemory { bytes }.start_at());
    }
    let len = usize::try_from(bytes).map_err(|_| ResizeError::OutOfMemory { bytes }.start_at())?;
    let mut canvas = Vec::new();
    canvas
        .try_reserve_exact(len)
        .map_err(|_| ResizeError::OutOfMemory { bytes }.start_at())?;
    canvas.resize(len, 0);
    Ok(canvas)
}

/// Copy tightly packed `pixels` (dest-sized) into `canvas` at `dest`.
fn blit(pixels: &[u8], dest: Rect, canvas: &mut [u8], canvas_width: u32) {
    let row_bytes = dest.width as usize * BYTES_PER_PIXEL;
    let stride = canvas_width as usize * BYTES_PER_PIXEL;
    let left = dest.x as usize * BYTES_PER_PIXEL;
    for (row, src) in pixels.chunks_exact(row_bytes).enumerate() {
        let start = (dest.y as usize + row) * stride + left;
        canvas[start..start + row_bytes].copy_from_slice(src);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::plan_tiles;
    use image::Rgba;

    /// Solid-colour source: each region is filled with a colour derived from
    /// its origin, so placement errors show up in the canvas.
    struct Solid {
        size: Size,
        fail_at: Option<(u32, u32)>,
        requests: Vec<Rect>,
    }

    impl Solid {
        fn new(w: u32, h: u32) -> Self {
            Self {
                size: Size::new(w, h),
                fail_at: None,
                requests: Vec::new(),
            }
        }
    }

    fn colour(rect: Rect) -> Rgba<u8> {
        Rgba([rect.x as u8, rect.y as u8, 200, 255])
    }

    /// Resampling a flat colour may round by one step.
    fn assert_close(got: Rgba<u8>, expected: Rgba<u8>, at: (u32, u32)) {
        for c in 0..4 {
            assert!(
                got[c].abs_diff(expected[c]) <= 1,
                "{at:?}: got {got:?}, expected {expected:?}"
            );
        }
    }

    impl SourceProvider for Solid {
        type Region = RgbaImage;

        fn dimensions(&mut self) -> Result<Size, SourceError> {
            Ok(self.size)
        }

        fn decode_region(
            &mut self,
            rect: Rect,
            sample: SampleSize,
        ) -> Result<RgbaImage, SourceError> {
            self.requests.push(rect);
            if self.fail_at == Some((rect.x, rect.y)) {
                return Err(SourceError::Decode("corrupt block".into()));
            }
            let r = sample.reduce(rect.size());
            Ok(RgbaImage::from_pixel(r.width, r.height, colour(rect)))
        }
    }

    #[test]
    fn tiles_land_at_their_offsets() {
        let mut source = Solid::new(40, 30);
        let plan = plan_tiles(source.size, Size::new(40, 30), 10).unwrap();
        let canvas = decode_and_compose(&mut source, &plan, SampleSize::ONE).unwrap();
        assert_eq!((canvas.width(), canvas.height()), (40, 30));
        for tile in &plan {
            let d = tile.dest;
            for y in d.y..d.y + d.height {
                for x in d.x..d.x + d.width {
                    assert_eq!(*canvas.get_pixel(x, y), colour(tile.source), "({x},{y})");
                }
            }
        }
    }

    #[test]
    fn scaled_tiles_land_at_their_offsets() {
        let mut source = Solid::new(40, 30);
        let plan = plan_tiles(source.size, Size::new(20, 15), 10).unwrap();
        let canvas = decode_and_compose(&mut source, &plan, SampleSize::ONE).unwrap();
        assert_eq!((canvas.width(), canvas.height()), (20, 15));
        for tile in &plan {
            let d = tile.dest;
            for y in d.y..d.y + d.height {
                for x in d.x..d.x + d.width {
                    assert_close(*canvas.get_pixel(x, y), colour(tile.source), (x, y));
                }
            }
        }
    }

    #[test]
    fn every_tile_requested_once_in_order() {
        let mut source = Solid::new(25, 25);
        let plan = plan_tiles(source.size, Size::new(25, 25), 8).unwrap();
        decode_and_compose(&mut source, &plan, SampleSize::ONE).unwrap();
        let planned: Vec<Rect> = plan.iter().map(|t| t.source).collect();
        assert_eq!(source.requests, planned);
    }

    #[test]
    fn failing_tile_aborts_with_its_rect() {
        let mut source = Solid::new(40, 40);
        let plan = plan_tiles(source.size, Size::new(10, 10), 10).unwrap();
        let bad = plan.tiles()[5].source;
        source.fail_at = Some((bad.x, bad.y));
        let err = decode_and_compose(&mut source, &plan, SampleSize::ONE).unwrap_err();
        match err.error() {
            ResizeError::TileDecodeFailure { rect, .. } => assert_eq!(*rect, bad),
            other => panic!("unexpected error {other:?}"),
        }
        // Nothing after the failing tile was requested.
        assert_eq!(source.requests.len(), 6);
    }

    #[test]
    fn single_pass_with_sample() {
        let mut source = Solid::new(64, 32);
        let plan = TilePlan::single(source.size, Size::new(10, 5));
        let sample = SampleSize::new(4).unwrap();
        let canvas = decode_and_compose(&mut source, &plan, sample).unwrap();
        assert_eq!((canvas.width(), canvas.height()), (10, 5));
        assert_close(*canvas.get_pixel(9, 4), colour(Rect::new(0, 0, 64, 32)), (9, 4));
    }

    #[test]
    fn upscaled_tiles() {
        let mut source = Solid::new(6, 4);
        let plan = plan_tiles(source.size, Size::new(60, 40), 3).unwrap();
        let canvas = decode_and_compose(&mut source, &plan, SampleSize::ONE).unwrap();
        assert_eq!((canvas.width(), canvas.height()), (60, 40));
        let last = plan.tiles()[plan.len() - 1].source;
        assert_close(*canvas.get_pixel(59, 39), colour(last), (59, 39));
    }

    #[test]
    fn canvas_limit_reports_out_of_memory() {
        let mut source = Solid::new(100, 100);
        let plan = TilePlan::single(source.size, Size::new(100, 100));
        let err = Composer::new()
            .max_canvas_bytes(1000)
            .decode_and_compose(&mut source, &plan, SampleSize::ONE)
            .unwrap_err();
        assert!(matches!(err.error(), ResizeError::OutOfMemory { bytes: 40_000 }));
        assert!(source.requests.is_empty());
    }

    #[test]
    fn overflowing_canvas_reports_out_of_memory() {
        let mut source = Solid::new(1, 1);
        let plan = TilePlan::single(source.size, Size::new(1 << 31, 1 << 31));
        let err = decode_and_compose(&mut source, &plan, SampleSize::ONE).unwrap_err();
        assert!(matches!(err.error(), ResizeError::OutOfMemory { bytes: u64::MAX }));
        assert!(source.requests.is_empty());
    }

    #[test]
    fn dest_outside_canvas_is_rejected() {
        let region = RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255]));
        let tile = Tile {
            source: Rect::new(0, 0, 4, 4),
            dest: Rect::new(8, 8, 4, 4),
        };
        let mut canvas = vec![0u8; 10 * 10 * 4];
        let err = Composer::new()
            .compose_tile(&region, &tile, &mut canvas, Size::new(10, 10))
            .unwrap_err();
        assert!(matches!(err.error(), ResizeError::InvalidRequest(_)));
        assert!(canvas.iter().all(|&b| b == 0));
    }

    /// Region whose buffer is shorter than its claimed size.
    struct Truncated;

    impl RegionPixels for Truncated {
        fn width(&self) -> u32 {
            4
        }
        fn height(&self) -> u32 {
            4
        }
        fn rgba(&self) -> &[u8] {
            &[0; 8]
        }
    }

    struct TruncatedSource;

    impl SourceProvider for TruncatedSource {
        type Region = Truncated;

        fn dimensions(&mut self) -> Result<Size, SourceError> {
            Ok(Size::new(4, 4))
        }

        fn decode_region(&mut self, _: Rect, _: SampleSize) -> Result<Truncated, SourceError> {
            Ok(Truncated)
        }
    }

    #[test]
    fn malformed_region_is_tile_failure() {
        let plan = TilePlan::single(Size::new(4, 4), Size::new(4, 4));
        let err = decode_and_compose(&mut TruncatedSource, &plan, SampleSize::ONE).unwrap_err();
        assert!(matches!(err.error(), ResizeError::TileDecodeFailure { .. }));
    }

    #[test]
    fn blit_writes_only_dest() {
        let mut canvas = vec![0u8; 4 * 4 * 4];
        blit(&[9u8; 2 * 2 * 4], Rect::new(1, 2, 2, 2), &mut canvas, 4);
        let img = RgbaImage::from_raw(4, 4, canvas).unwrap();
        for y in 0..4 {
            for x in 0..4 {
                let inside = (1..3).contains(&x) && (2..4).contains(&y);
                let expected = if inside { 9 } else { 0 };
                assert_eq!(img.get_pixel(x, y)[0], expected, "({x},{y})");
            }
        }
    }
}
