//! Orientation (D4 dihedral group), EXIF mapping, and pixel normalization.

use image::{RgbaImage, imageops};

use crate::scale::Size;

/// One of the eight ways a stored image can sit relative to upright.
///
/// Stored as quarter turns clockwise followed by an optional horizontal
/// mirror. Only the low two bits of `rotation` are significant.
///
/// ```text
///     EXIF  quarter turns  mirror      EXIF  quarter turns  mirror
///      1         0           no         5         1           yes
///      2         0           yes        6         1           no
///      3         2           no         7         3           yes
///      4         2           yes        8         3           no
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Orientation {
    /// Clockwise quarter turns, 0-3.
    pub rotation: u8,
    /// Mirror left-right after the rotation.
    pub flip: bool,
}

/// EXIF values indexed by quarter turns, without and with the mirror.
const EXIF_PLAIN: [u8; 4] = [1, 6, 3, 8];
const EXIF_MIRRORED: [u8; 4] = [2, 5, 4, 7];

impl Orientation {
    const fn new(rotation: u8, flip: bool) -> Self {
        Self { rotation, flip }
    }

    /// EXIF 1, stored upright.
    pub const IDENTITY: Self = Self::new(0, false);
    /// EXIF 2.
    pub const FLIP_H: Self = Self::new(0, true);
    /// EXIF 3.
    pub const ROTATE_180: Self = Self::new(2, false);
    /// EXIF 4.
    pub const FLIP_V: Self = Self::new(2, true);
    /// EXIF 5, mirrored across the main diagonal.
    pub const TRANSPOSE: Self = Self::new(1, true);
    /// EXIF 6, needs a quarter turn clockwise.
    pub const ROTATE_90: Self = Self::new(1, false);
    /// EXIF 7, mirrored across the anti-diagonal.
    pub const TRANSVERSE: Self = Self::new(3, true);
    /// EXIF 8, needs a quarter turn counter-clockwise.
    pub const ROTATE_270: Self = Self::new(3, false);

    /// Every orientation, in EXIF order (1 through 8).
    pub const ALL: [Self; 8] = [
        Self::IDENTITY,
        Self::FLIP_H,
        Self::ROTATE_180,
        Self::FLIP_V,
        Self::TRANSPOSE,
        Self::ROTATE_90,
        Self::TRANSVERSE,
        Self::ROTATE_270,
    ];

    /// Orientation for an EXIF tag value. `None` outside 1-8.
    pub fn from_exif(value: u32) -> Option<Self> {
        let index = usize::try_from(value.checked_sub(1)?).ok()?;
        Self::ALL.get(index).copied()
    }

    /// EXIF tag value (1-8).
    pub fn to_exif(self) -> u8 {
        let turns = (self.rotation & 3) as usize;
        if self.flip {
            EXIF_MIRRORED[turns]
        } else {
            EXIF_PLAIN[turns]
        }
    }

    pub fn is_identity(self) -> bool {
        self.rotation & 3 == 0 && !self.flip
    }

    /// Whether displaying upright exchanges width and height.
    pub fn swaps_axes(self) -> bool {
        self.rotation & 1 == 1
    }

    /// Transform source dimensions to display dimensions.
    pub fn transform_dimensions(self, size: Size) -> Size {
        if self.swaps_axes() {
            size.transposed()
        } else {
            size
        }
    }

    /// The same transform expressed as a mirror applied first, then a
    /// clockwise rotation in quarter turns.
    ///
    /// Flipping first reverses the rotation direction, so mirrored
    /// orientations rotate by the complementary angle.
    pub fn mirror_then_rotate(self) -> (bool, u8) {
        let rotation = self.rotation & 3;
        if self.flip {
            (true, (4 - rotation) & 3)
        } else {
            (false, rotation)
        }
    }

    /// Clockwise rotation of [`mirror_then_rotate`](Self::mirror_then_rotate)
    /// in degrees.
    pub fn rotation_degrees(self) -> u16 {
        self.mirror_then_rotate().1 as u16 * 90
    }

    /// Apply this orientation to a pixel buffer, consuming it.
    pub fn apply(self, image: RgbaImage) -> RgbaImage {
        let (mirror, quarter_turns) = self.mirror_then_rotate();
        let image = if mirror {
            imageops::flip_horizontal(&image)
        } else {
            image
        };
        match quarter_turns {
            1 => imageops::rotate90(&image),
            2 => imageops::rotate180(&image),
            3 => imageops::rotate270(&image),
            _ => image,
        }
    }
}

/// Orientation as read from metadata: known, or absent/unreadable.
///
/// `Unknown` collapses to the identity orientation. Metadata is missing or
/// malformed often enough that this is a policy, not a failure.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum OrientationTag {
    Known(Orientation),
    #[default]
    Unknown,
}

impl OrientationTag {
    /// Interpret a raw EXIF orientation value.
    pub fn from_exif(value: u32) -> Self {
        match Orientation::from_exif(value) {
            Some(o) => Self::Known(o),
            None => Self::Unknown,
        }
    }

    /// The orientation to apply: `Unknown` is identity.
    pub fn or_normal(self) -> Orientation {
        match self {
            Self::Known(o) => o,
            Self::Unknown => Orientation::IDENTITY,
        }
    }
}

impl From<Orientation> for OrientationTag {
    fn from(o: Orientation) -> Self {
        Self::Known(o)
    }
}

/// Pixel buffer displayed upright, plus the orientation to persist.
#[derive(Clone, Debug, PartialEq)]
pub struct Normalized {
    pub image: RgbaImage,
    /// Orientation that was applied to the pixels.
    pub applied: Orientation,
    /// Orientation to write back to metadata. Always identity.
    pub persist: Orientation,
}

/// Rotate/flip `image` upright according to `tag`.
pub fn normalize_orientation(image: RgbaImage, tag: OrientationTag) -> Normalized {
    let applied = tag.or_normal();
    if !applied.is_identity() {
        log::debug!(
            "normalizing orientation exif={} (mirror={}, rotate={}°)",
            applied.to_exif(),
            applied.flip,
            applied.rotation_degrees()
        );
    }
    Normalized {
        image: applied.apply(image),
        applied,
        persist: Orientation::IDENTITY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn exif_values() {
        for (&o, v) in Orientation::ALL.iter().zip(1u32..) {
            assert_eq!(Orientation::from_exif(v), Some(o));
            assert_eq!(o.to_exif() as u32, v, "EXIF {v}");
        }
        assert_eq!(Orientation::from_exif(3), Some(Orientation::ROTATE_180));
        assert_eq!(Orientation::from_exif(5), Some(Orientation::TRANSPOSE));
        assert_eq!(Orientation::from_exif(6), Some(Orientation::ROTATE_90));
        assert_eq!(Orientation::from_exif(8), Some(Orientation::ROTATE_270));
        for bad in [0, 9, 65535, u32::MAX] {
            assert_eq!(Orientation::from_exif(bad), None);
        }
    }

    #[test]
    fn turns_wrap_modulo_four() {
        // only the low two bits of the turn count matter
        let wrapped = Orientation { rotation: 5, flip: true };
        assert_eq!(wrapped.to_exif(), Orientation::TRANSPOSE.to_exif());
        assert!(!Orientation { rotation: 4, flip: false }.swaps_axes());
    }

    #[test]
    fn swaps_axes() {
        assert!(!Orientation::IDENTITY.swaps_axes());
        assert!(!Orientation::FLIP_H.swaps_axes());
        assert!(!Orientation::ROTATE_180.swaps_axes());
        assert!(!Orientation::FLIP_V.swaps_axes());
        assert!(Orientation::TRANSPOSE.swaps_axes());
        assert!(Orientation::ROTATE_90.swaps_axes());
        assert!(Orientation::TRANSVERSE.swaps_axes());
        assert!(Orientation::ROTATE_270.swaps_axes());
    }

    #[test]
    fn mirror_then_rotate_decomposition() {
        assert_eq!(Orientation::IDENTITY.mirror_then_rotate(), (false, 0));
        assert_eq!(Orientation::ROTATE_90.mirror_then_rotate(), (false, 1));
        assert_eq!(Orientation::ROTATE_180.mirror_then_rotate(), (false, 2));
        assert_eq!(Orientation::ROTATE_270.mirror_then_rotate(), (false, 3));
        assert_eq!(Orientation::FLIP_H.mirror_then_rotate(), (true, 0));
        assert_eq!(Orientation::FLIP_V.mirror_then_rotate(), (true, 2));
        assert_eq!(Orientation::TRANSPOSE.mirror_then_rotate(), (true, 3));
        assert_eq!(Orientation::TRANSVERSE.mirror_then_rotate(), (true, 1));
    }

    #[test]
    fn unknown_is_normal() {
        assert_eq!(OrientationTag::Unknown.or_normal(), Orientation::IDENTITY);
        assert_eq!(OrientationTag::from_exif(0), OrientationTag::Unknown);
        assert_eq!(OrientationTag::from_exif(42).or_normal(), Orientation::IDENTITY);
        assert_eq!(
            OrientationTag::from_exif(6).or_normal(),
            Orientation::ROTATE_90
        );
    }

    /// Image whose pixel at (x, y) encodes its own coordinates.
    fn coordinate_image(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| Rgba([x as u8, y as u8, 0, 255]))
    }

    /// Forward-map a source pixel to display coordinates.
    fn forward_map_point(o: Orientation, x: u32, y: u32, w: u32, h: u32) -> (u32, u32) {
        match (o.rotation, o.flip) {
            (0, false) => (x, y),                 // Identity
            (0, true) => (w - 1 - x, y),          // FlipH
            (1, false) => (h - 1 - y, x),         // Rotate90
            (1, true) => (y, x),                  // Transpose
            (2, false) => (w - 1 - x, h - 1 - y), // Rotate180
            (2, true) => (x, h - 1 - y),          // FlipV
            (3, false) => (y, w - 1 - x),         // Rotate270
            (3, true) => (h - 1 - y, w - 1 - x),  // Transverse
            _ => unreachable!(),
        }
    }

    #[test]
    fn apply_brute_force_4x3() {
        let (sw, sh) = (4u32, 3u32);
        for &o in &Orientation::ALL {
            let out = o.apply(coordinate_image(sw, sh));
            let d = o.transform_dimensions(Size::new(sw, sh));
            assert_eq!((out.width(), out.height()), (d.width, d.height), "{o:?}");
            for sx in 0..sw {
                for sy in 0..sh {
                    let (dx, dy) = forward_map_point(o, sx, sy, sw, sh);
                    let p = out.get_pixel(dx, dy);
                    assert_eq!(
                        (p[0] as u32, p[1] as u32),
                        (sx, sy),
                        "pixel ({sx},{sy}) via {o:?} expected at ({dx},{dy})"
                    );
                }
            }
        }
    }

    #[test]
    fn normalize_reports_identity_to_persist() {
        for &o in &Orientation::ALL {
            let n = normalize_orientation(coordinate_image(5, 2), o.into());
            assert_eq!(n.applied, o);
            assert_eq!(n.persist, Orientation::IDENTITY);
        }
    }

    #[test]
    fn normalize_twice_after_reset_is_stable() {
        let first = normalize_orientation(coordinate_image(5, 2), Orientation::ROTATE_90.into());
        let again = normalize_orientation(first.image.clone(), first.persist.into());
        assert_eq!(again.image, first.image);
        assert!(again.applied.is_identity());
    }

    #[test]
    fn normalize_unknown_leaves_pixels() {
        let img = coordinate_image(3, 3);
        let n = normalize_orientation(img.clone(), OrientationTag::Unknown);
        assert_eq!(n.image, img);
    }
}
