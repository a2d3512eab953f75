//! Inbound image inspection
//!
//! Derives everything the conversation needs from raw image bytes: the
//! SHA-256 content hash, a 64-bit difference hash, and EXIF location and
//! capture time.

use chrono::{DateTime, NaiveDate, Utc};
use exif::{In, Reader, Tag, Value};
use image::imageops::FilterType;
use sha2::{Digest, Sha256};
use std::io::Cursor;

/// Facts extracted from one image
#[derive(Debug, Clone, PartialEq)]
pub struct MediaFacts {
    pub content_hash: String,
    /// `None` when the bytes cannot be decoded as an image
    pub perceptual_hash: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub captured_at: Option<DateTime<Utc>>,
}

impl MediaFacts {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }
}

/// Inspect raw image bytes
///
/// Never fails: missing or unreadable metadata just leaves fields empty.
pub fn inspect(bytes: &[u8]) -> MediaFacts {
    let exif = read_exif(bytes);
    let (latitude, longitude) = exif
        .as_ref()
        .and_then(gps_coordinates)
        .map_or((None, None), |(lat, lon)| (Some(lat), Some(lon)));
    let captured_at = exif.as_ref().and_then(capture_time);

    let facts = MediaFacts {
        content_hash: content_hash(bytes),
        perceptual_hash: perceptual_hash(bytes),
        latitude,
        longitude,
        captured_at,
    };

    tracing::debug!(
        hash = %facts.content_hash,
        has_gps = facts.coordinates().is_some(),
        captured_at = ?facts.captured_at,
        "Inspected image"
    );
    facts
}

/// Hex SHA-256 of the raw bytes
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// 64-bit difference hash as 16 hex digits
///
/// The image is shrunk to 9x8 grayscale and each bit records whether a pixel
/// is brighter than its right neighbour.
pub fn perceptual_hash(bytes: &[u8]) -> Option<String> {
    let decoded = match image::load_from_memory(bytes) {
        Ok(img) => img,
        Err(e) => {
            tracing::debug!(error = %e, "Image not decodable, skipping perceptual hash");
            return None;
        }
    };
    let resized = decoded.resize_exact(9, 8, FilterType::Triangle).to_luma8();

    let mut value = 0u64;
    for y in 0..8u32 {
        for x in 0..8u32 {
            let left = resized.get_pixel(x, y)[0];
            let right = resized.get_pixel(x + 1, y)[0];
            value = (value << 1) | u64::from(left > right);
        }
    }
    Some(format!("{:016x}", value))
}

fn read_exif(bytes: &[u8]) -> Option<exif::Exif> {
    match Reader::new().read_from_container(&mut Cursor::new(bytes)) {
        Ok(exif) => Some(exif),
        Err(e) => {
            tracing::debug!(error = %e, "No readable EXIF data");
            None
        }
    }
}

/// Degrees/minutes/seconds rational triple to decimal degrees
fn dms_to_degrees(value: &Value) -> Option<f64> {
    match value {
        Value::Rational(parts) if parts.len() >= 3 => {
            let degrees = parts[0].to_f64();
            let minutes = parts[1].to_f64();
            let seconds = parts[2].to_f64();
            let decimal = degrees + minutes / 60.0 + seconds / 3600.0;
            decimal.is_finite().then_some(decimal)
        }
        _ => None,
    }
}

fn reference_letter(exif: &exif::Exif, tag: Tag) -> Option<u8> {
    match &exif.get_field(tag, In::PRIMARY)?.value {
        Value::Ascii(parts) => parts.first()?.first().copied(),
        _ => None,
    }
}

fn gps_coordinates(exif: &exif::Exif) -> Option<(f64, f64)> {
    let mut lat = dms_to_degrees(&exif.get_field(Tag::GPSLatitude, In::PRIMARY)?.value)?;
    let mut lon = dms_to_degrees(&exif.get_field(Tag::GPSLongitude, In::PRIMARY)?.value)?;

    if reference_letter(exif, Tag::GPSLatitudeRef) == Some(b'S') {
        lat = -lat;
    }
    if reference_letter(exif, Tag::GPSLongitudeRef) == Some(b'W') {
        lon = -lon;
    }
    Some((lat, lon))
}

/// DateTimeOriginal, falling back to DateTime
///
/// EXIF times carry no zone; they are taken as UTC.
fn capture_time(exif: &exif::Exif) -> Option<DateTime<Utc>> {
    [Tag::DateTimeOriginal, Tag::DateTime]
        .into_iter()
        .find_map(|tag| match &exif.get_field(tag, In::PRIMARY)?.value {
            Value::Ascii(parts) => parse_exif_datetime(parts.first()?),
            _ => None,
        })
}

fn parse_exif_datetime(raw: &[u8]) -> Option<DateTime<Utc>> {
    let dt = exif::DateTime::from_ascii(raw).ok()?;
    let naive = NaiveDate::from_ymd_opt(i32::from(dt.year), u32::from(dt.month), u32::from(dt.day))?
        .and_hms_opt(u32::from(dt.hour), u32::from(dt.minute), u32::from(dt.second))?;
    Some(naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn gradient_png(reverse: bool) -> Vec<u8> {
        let img = GrayImage::from_fn(90, 80, |x, _| {
            let v = (x * 255 / 89) as u8;
            Luma([if reverse { 255 - v } else { v }])
        });
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_content_hash_is_sha256_hex() {
        assert_eq!(
            content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_perceptual_hash_reflects_gradient_direction() {
        // Brightness falling left to right sets every bit
        assert_eq!(perceptual_hash(&gradient_png(true)).as_deref(), Some("ffffffffffffffff"));
        assert_eq!(perceptual_hash(&gradient_png(false)).as_deref(), Some("0000000000000000"));
    }

    #[test]
    fn test_undecodable_bytes_still_inspected() {
        let facts = inspect(b"not an image");
        assert_eq!(facts.content_hash.len(), 64);
        assert!(facts.perceptual_hash.is_none());
        assert!(facts.coordinates().is_none());
        assert!(facts.captured_at.is_none());
    }

    #[test]
    fn test_exif_datetime_parsed_as_utc() {
        let parsed = parse_exif_datetime(b"2025:06:01 14:30:05").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2025-06-01T14:30:05+00:00");
        assert!(parse_exif_datetime(b"garbage").is_none());
    }
}
