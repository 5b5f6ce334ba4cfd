//! Orientation metadata: reading the EXIF tag and resetting it to normal.
//!
//! Failures here never abort a request. [`read_orientation_or_normal`] and
//! [`reset_orientation_or_log`] log and fall back instead.

use std::io::Cursor;
use std::ops::Range;
use std::path::Path;

use crate::error::MetadataError;
use crate::orientation::{Orientation, OrientationTag};

/// EXIF tag number of the orientation field.
const ORIENTATION_TAG: u16 = 0x0112;
/// TIFF field type SHORT.
const TYPE_SHORT: u16 = 3;

/// Reads and rewrites the orientation field of an image's metadata.
pub trait OrientationMetadata {
    /// Raw orientation as stored. `Ok(Unknown)` when the field is absent.
    fn read_orientation(&self) -> Result<OrientationTag, MetadataError>;

    /// Overwrite the stored orientation. Absent fields are left absent.
    fn write_orientation(&mut self, orientation: Orientation) -> Result<(), MetadataError>;

    /// TIFF-structured EXIF block to carry into encoded output, as currently
    /// stored (after any orientation rewrite).
    fn exif_block(&self) -> Option<Vec<u8>> {
        None
    }
}

/// Metadata for sources that carry none.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoMetadata;

impl OrientationMetadata for NoMetadata {
    fn read_orientation(&self) -> Result<OrientationTag, MetadataError> {
        Ok(OrientationTag::Unknown)
    }

    fn write_orientation(&mut self, _: Orientation) -> Result<(), MetadataError> {
        Ok(())
    }
}

/// Read the orientation, treating any failure as "normal".
pub fn read_orientation_or_normal<M: OrientationMetadata + ?Sized>(metadata: &M) -> OrientationTag {
    match metadata.read_orientation() {
        Ok(tag) => tag,
        Err(e) => {
            log::warn!("unreadable orientation metadata, assuming normal: {e}");
            OrientationTag::Unknown
        }
    }
}

/// Reset the stored orientation to identity, logging any failure.
/// Returns whether the reset took.
pub fn reset_orientation_or_log<M: OrientationMetadata + ?Sized>(metadata: &mut M) -> bool {
    match metadata.write_orientation(Orientation::IDENTITY) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("could not reset orientation metadata: {e}");
            false
        }
    }
}

/// EXIF metadata held inside an encoded JPEG or TIFF byte buffer.
///
/// Reads go through `kamadak-exif`. Writes patch the orientation entry of
/// IFD0 in place, so the rest of the file is untouched byte for byte.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExifMetadata {
    bytes: Vec<u8>,
}

impl ExifMetadata {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, MetadataError> {
        Ok(Self::new(std::fs::read(path)?))
    }

    /// Write the (possibly patched) container back out.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), MetadataError> {
        std::fs::write(path, &self.bytes)?;
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl OrientationMetadata for ExifMetadata {
    fn read_orientation(&self) -> Result<OrientationTag, MetadataError> {
        let exif = match exif::Reader::new().read_from_container(&mut Cursor::new(&self.bytes)) {
            Ok(exif) => exif,
            Err(exif::Error::NotFound(_)) => return Ok(OrientationTag::Unknown),
            Err(e) => return Err(e.into()),
        };
        let value = exif
            .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
            .and_then(|field| field.value.get_uint(0));
        Ok(value.map_or(OrientationTag::Unknown, OrientationTag::from_exif))
    }

    fn write_orientation(&mut self, orientation: Orientation) -> Result<(), MetadataError> {
        let Some(tiff) = locate_tiff(&self.bytes)? else {
            return Ok(());
        };
        patch_orientation(&mut self.bytes[tiff], orientation.to_exif() as u16)
    }

    /// The JPEG APP1 payload. Bare TIFF files carry their EXIF inside the
    /// image structure itself, so there is nothing separable to carry.
    fn exif_block(&self) -> Option<Vec<u8>> {
        match jpeg_exif_payload(&self.bytes) {
            Ok(range) => range.map(|r| self.bytes[r].to_vec()),
            Err(e) => {
                log::warn!("EXIF block not carried over: {e}");
                None
            }
        }
    }
}

/// Byte range of the TIFF structure holding IFD0: the whole file for TIFF,
/// the APP1 `Exif\0\0` payload for JPEG. `None` when there is no EXIF block.
fn locate_tiff(bytes: &[u8]) -> Result<Option<Range<usize>>, MetadataError> {
    if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
        return Ok(Some(0..bytes.len()));
    }
    jpeg_exif_payload(bytes)
}

/// Range of the TIFF payload of a JPEG's APP1 `Exif` segment.
fn jpeg_exif_payload(bytes: &[u8]) -> Result<Option<Range<usize>>, MetadataError> {
    if !bytes.starts_with(&[0xFF, 0xD8]) {
        return Ok(None);
    }

    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            return Err(MetadataError::Malformed("expected JPEG marker"));
        }
        let marker = bytes[pos + 1];
        // start of scan or end of image: no EXIF before entropy data
        if marker == 0xDA || marker == 0xD9 {
            return Ok(None);
        }
        let len = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        if len < 2 || pos + 2 + len > bytes.len() {
            return Err(MetadataError::Malformed("truncated JPEG segment"));
        }
        let payload = pos + 4;
        let end = pos + 2 + len;
        if marker == 0xE1 && bytes[payload..end].starts_with(b"Exif\0\0") {
            return Ok(Some(payload + 6..end));
        }
        pos += 2 + len;
    }
    Ok(None)
}

/// Overwrite the IFD0 orientation entry of the TIFF structure at `tiff[0..]`.
fn patch_orientation(tiff: &mut [u8], value: u16) -> Result<(), MetadataError> {
    let big_endian = match tiff.get(0..2) {
        Some(b"MM") => true,
        Some(b"II") => false,
        _ => return Err(MetadataError::Malformed("bad TIFF byte order")),
    };
    let read_u16 = |buf: &[u8], at: usize| -> Result<u16, MetadataError> {
        let b: [u8; 2] = buf
            .get(at..at + 2)
            .and_then(|s| s.try_into().ok())
            .ok_or(MetadataError::Malformed("IFD out of bounds"))?;
        Ok(if big_endian {
            u16::from_be_bytes(b)
        } else {
            u16::from_le_bytes(b)
        })
    };
    let ifd_offset = {
        let b: [u8; 4] = tiff
            .get(4..8)
            .and_then(|s| s.try_into().ok())
            .ok_or(MetadataError::Malformed("truncated TIFF header"))?;
        if big_endian {
            u32::from_be_bytes(b)
        } else {
            u32::from_le_bytes(b)
        }
    } as usize;

    let count = read_u16(tiff, ifd_offset)? as usize;
    for i in 0..count {
        let entry = ifd_offset + 2 + i * 12;
        if read_u16(tiff, entry)? != ORIENTATION_TAG {
            continue;
        }
        if read_u16(tiff, entry + 2)? != TYPE_SHORT {
            return Err(MetadataError::Malformed("orientation is not a SHORT"));
        }
        let encoded = if big_endian {
            value.to_be_bytes()
        } else {
            value.to_le_bytes()
        };
        let slot = tiff
            .get_mut(entry + 8..entry + 10)
            .ok_or(MetadataError::Malformed("IFD out of bounds"))?;
        slot.copy_from_slice(&encoded);
        return Ok(());
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal TIFF IFD0 with a single orientation entry.
    pub(crate) fn tiff_with_orientation(value: u16, big_endian: bool) -> Vec<u8> {
        let u16b = |v: u16| if big_endian { v.to_be_bytes() } else { v.to_le_bytes() };
        let u32b = |v: u32| if big_endian { v.to_be_bytes() } else { v.to_le_bytes() };
        let mut t = Vec::new();
        t.extend_from_slice(if big_endian { b"MM" } else { b"II" });
        t.extend_from_slice(&u16b(42));
        t.extend_from_slice(&u32b(8));
        t.extend_from_slice(&u16b(1));
        t.extend_from_slice(&u16b(ORIENTATION_TAG));
        t.extend_from_slice(&u16b(TYPE_SHORT));
        t.extend_from_slice(&u32b(1));
        t.extend_from_slice(&u16b(value));
        t.extend_from_slice(&[0, 0]);
        t.extend_from_slice(&u32b(0));
        t
    }

    /// Wrap a TIFF block into a JPEG APP1 segment (no image data follows).
    pub(crate) fn jpeg_with_exif(tiff: &[u8]) -> Vec<u8> {
        let mut j = vec![0xFF, 0xD8, 0xFF, 0xE1];
        let len = (2 + 6 + tiff.len()) as u16;
        j.extend_from_slice(&len.to_be_bytes());
        j.extend_from_slice(b"Exif\0\0");
        j.extend_from_slice(tiff);
        j.extend_from_slice(&[0xFF, 0xD9]);
        j
    }

    #[test]
    fn reads_orientation_from_jpeg() {
        for v in 1..=8u16 {
            let meta = ExifMetadata::new(jpeg_with_exif(&tiff_with_orientation(v, false)));
            assert_eq!(
                meta.read_orientation().unwrap(),
                OrientationTag::Known(Orientation::from_exif(v as u32).unwrap())
            );
        }
    }

    #[test]
    fn reset_then_read_is_normal() {
        for big_endian in [false, true] {
            let mut meta = ExifMetadata::new(jpeg_with_exif(&tiff_with_orientation(6, big_endian)));
            assert_eq!(
                meta.read_orientation().unwrap().or_normal(),
                Orientation::ROTATE_90
            );
            meta.write_orientation(Orientation::IDENTITY).unwrap();
            assert_eq!(
                meta.read_orientation().unwrap(),
                OrientationTag::Known(Orientation::IDENTITY)
            );
        }
    }

    #[test]
    fn patches_bare_tiff() {
        let mut meta = ExifMetadata::new(tiff_with_orientation(3, true));
        meta.write_orientation(Orientation::IDENTITY).unwrap();
        let tiff = meta.into_bytes();
        assert_eq!(&tiff[18..20], &1u16.to_be_bytes());
    }

    #[test]
    fn write_without_exif_is_noop() {
        let bytes = vec![0x89, b'P', b'N', b'G', 0, 0];
        let mut meta = ExifMetadata::new(bytes.clone());
        meta.write_orientation(Orientation::IDENTITY).unwrap();
        assert_eq!(meta.as_bytes(), bytes.as_slice());
    }

    #[test]
    fn missing_exif_reads_unknown() {
        let meta = ExifMetadata::new(vec![0xFF, 0xD8, 0xFF, 0xD9]);
        assert_eq!(read_orientation_or_normal(&meta), OrientationTag::Unknown);
    }

    #[test]
    fn garbage_reads_unknown() {
        let meta = ExifMetadata::new(b"not an image at all".to_vec());
        assert_eq!(read_orientation_or_normal(&meta).or_normal(), Orientation::IDENTITY);
    }

    #[test]
    fn truncated_segment_is_malformed() {
        let mut meta = ExifMetadata::new(vec![0xFF, 0xD8, 0xFF, 0xE1, 0x40, 0x00, b'E']);
        assert!(matches!(
            meta.write_orientation(Orientation::IDENTITY),
            Err(MetadataError::Malformed(_))
        ));
        // the swallowing wrapper must not panic
        assert!(!reset_orientation_or_log(&mut meta));
    }

    #[test]
    fn exif_block_follows_reset() {
        let tiff = tiff_with_orientation(8, false);
        let mut meta = ExifMetadata::new(jpeg_with_exif(&tiff));
        assert_eq!(meta.exif_block(), Some(tiff));

        assert!(reset_orientation_or_log(&mut meta));
        let block = meta.exif_block().unwrap();
        assert_eq!(block, tiff_with_orientation(1, false));

        // bare TIFF and non-EXIF inputs have nothing separable
        assert_eq!(ExifMetadata::new(tiff_with_orientation(3, true)).exif_block(), None);
        assert_eq!(ExifMetadata::new(vec![0xFF, 0xD8, 0xFF, 0xD9]).exif_block(), None);
        assert_eq!(NoMetadata.exif_block(), None);
    }

    #[test]
    fn out_of_range_value_reads_unknown() {
        let meta = ExifMetadata::new(jpeg_with_exif(&tiff_with_orientation(9, false)));
        assert_eq!(meta.read_orientation().unwrap(), OrientationTag::Unknown);
    }
}
