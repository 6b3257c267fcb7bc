//! Image downscaling for previews and thumbnails
//!
//! The decoded image is first shrunk by a power-of-two factor with a cheap
//! filter, then scaled to the exact target height or width (aspect ratio
//! preserved) and re-encoded as JPEG.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;

use crate::mime;

/// Result of the power-of-two factor calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Downsample {
    /// The relevant dimension already fits the target
    Skip,
    Factor(u32),
}

/// Power-of-two downsample factor for a `width` x `height` image.
///
/// Starting from 1, the factor doubles while half of each constrained
/// dimension divided by the factor still exceeds its target. With both
/// targets given both axes must exceed; with one, only that axis counts.
pub fn compute_downsample_factor(
    width: u32,
    height: u32,
    target_width: Option<u32>,
    target_height: Option<u32>,
) -> Downsample {
    let fits = match (target_width, target_height) {
        (Some(tw), Some(th)) => width <= tw && height <= th,
        (Some(tw), None) => width <= tw,
        (None, Some(th)) => height <= th,
        (None, None) => true,
    };
    if fits {
        return Downsample::Skip;
    }

    let half_width = width / 2;
    let half_height = height / 2;
    let exceeds = |factor: u32| {
        let wide = target_width.map_or(true, |tw| half_width / factor > tw);
        let tall = target_height.map_or(true, |th| half_height / factor > th);
        wide && tall
    };

    let mut factor = 1u32;
    while exceeds(factor) {
        factor *= 2;
    }
    Downsample::Factor(factor)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResizeOutcome {
    /// Already within the target; keep the original bytes
    Skipped,
    Resized(Vec<u8>),
    /// Decoding or encoding failed; keep the original bytes
    NoResult,
}

impl ResizeOutcome {
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            ResizeOutcome::Resized(bytes) => Some(bytes),
            ResizeOutcome::Skipped | ResizeOutcome::NoResult => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Target {
    Width(u32),
    Height(u32),
}

#[derive(Debug, Clone, Copy)]
pub struct ImageResizer {
    quality: u8,
}

impl Default for ImageResizer {
    fn default() -> Self {
        Self { quality: 80 }
    }
}

impl ImageResizer {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Scale `data` down to `target_height`, re-encoded as JPEG.
    pub fn resize_to_height(&self, data: &[u8], target_height: u32) -> ResizeOutcome {
        self.resize(data, Target::Height(target_height))
    }

    /// Scale `data` down to `target_width`; the height follows the same
    /// factor.
    pub fn resize_to_width(&self, data: &[u8], target_width: u32) -> ResizeOutcome {
        self.resize(data, Target::Width(target_width))
    }

    fn resize(&self, data: &[u8], target: Target) -> ResizeOutcome {
        if !mime::is_resizable(data) {
            return ResizeOutcome::NoResult;
        }
        let img = match image::load_from_memory(data) {
            Ok(img) => img,
            Err(e) => {
                tracing::warn!(error = %e, "image decode failed, keeping full size");
                return ResizeOutcome::NoResult;
            }
        };

        let (width, height) = (img.width(), img.height());
        let (factor, target_width, target_height) = match target {
            Target::Height(th) => (
                compute_downsample_factor(width, height, None, Some(th)),
                proportional(width, height, th),
                th,
            ),
            Target::Width(tw) => (
                compute_downsample_factor(width, height, Some(tw), None),
                tw,
                proportional(height, width, tw),
            ),
        };
        let factor = match factor {
            Downsample::Skip => return ResizeOutcome::Skipped,
            Downsample::Factor(factor) => factor,
        };

        let img = prescale(img, factor);
        let resized = img.resize_exact(target_width, target_height, FilterType::Triangle);

        match self.encode_jpeg(&resized) {
            Ok(bytes) => {
                tracing::debug!(
                    width,
                    height,
                    target_width,
                    target_height,
                    factor,
                    bytes = bytes.len(),
                    "resized image"
                );
                ResizeOutcome::Resized(bytes)
            }
            Err(e) => {
                tracing::warn!(error = %e, "JPEG encode failed, keeping full size");
                ResizeOutcome::NoResult
            }
        }
    }

    fn encode_jpeg(&self, img: &DynamicImage) -> image::ImageResult<Vec<u8>> {
        let rgb = img.to_rgb8();
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, self.quality).encode_image(&rgb)?;
        Ok(out)
    }
}

fn prescale(img: DynamicImage, factor: u32) -> DynamicImage {
    if factor <= 1 {
        return img;
    }
    let width = (img.width() / factor).max(1);
    let height = (img.height() / factor).max(1);
    img.resize_exact(width, height, FilterType::Nearest)
}

/// `side` scaled by `target / reference`.
fn proportional(side: u32, reference: u32, target: u32) -> u32 {
    let scaled = u64::from(side) * u64::from(target) / u64::from(reference.max(1));
    u32::try_from(scaled).unwrap_or(u32::MAX).max(1)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    pub(crate) fn encoded_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, format)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_factor_skip_when_fits() {
        assert_eq!(
            compute_downsample_factor(800, 600, None, Some(1000)),
            Downsample::Skip
        );
        assert_eq!(
            compute_downsample_factor(800, 1000, None, Some(1000)),
            Downsample::Skip
        );
        assert_eq!(
            compute_downsample_factor(100, 100, Some(100), Some(100)),
            Downsample::Skip
        );
        assert_eq!(compute_downsample_factor(5000, 5000, None, None), Downsample::Skip);
        assert_eq!(
            compute_downsample_factor(800, 600, Some(800), None),
            Downsample::Skip
        );
        assert_eq!(
            compute_downsample_factor(800, 6000, Some(1000), None),
            Downsample::Skip
        );
    }

    #[test]
    fn test_factor_height_only() {
        // half = 2000: 2000 > 200, 1000 > 200, 500 > 200, 250 > 200, 125 stops
        assert_eq!(
            compute_downsample_factor(3000, 4000, None, Some(200)),
            Downsample::Factor(16)
        );
        // just over the target: half never exceeds it
        assert_eq!(
            compute_downsample_factor(1200, 1200, None, Some(1000)),
            Downsample::Factor(1)
        );
    }

    #[test]
    fn test_factor_both_axes() {
        // width stops doubling first
        assert_eq!(
            compute_downsample_factor(1000, 8000, Some(100), Some(100)),
            Downsample::Factor(8)
        );
        assert_eq!(
            compute_downsample_factor(400, 8000, Some(300), Some(100)),
            Downsample::Factor(1)
        );
    }

    #[test]
    fn test_factor_width_only() {
        assert_eq!(
            compute_downsample_factor(4096, 10, Some(512), None),
            Downsample::Factor(4)
        );
    }

    #[test]
    fn test_resize_to_height() {
        let data = encoded_image(300, 400, ImageFormat::Png);
        let resizer = ImageResizer::default();

        let ResizeOutcome::Resized(bytes) = resizer.resize_to_height(&data, 100) else {
            panic!("expected a resized image");
        };
        assert_eq!(mime::sniff(&bytes), mime::MimeType::Jpeg);
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.height(), 100);
        assert_eq!(decoded.width(), 75);
    }

    #[test]
    fn test_resize_to_width() {
        let data = encoded_image(400, 300, ImageFormat::Png);
        let resizer = ImageResizer::default();

        let ResizeOutcome::Resized(bytes) = resizer.resize_to_width(&data, 100) else {
            panic!("expected a resized image");
        };
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.width(), 100);
        assert_eq!(decoded.height(), 75);

        // only the width counts: a tall narrow image is left alone
        let tall = encoded_image(80, 900, ImageFormat::Png);
        assert_eq!(resizer.resize_to_width(&tall, 100), ResizeOutcome::Skipped);
    }

    #[test]
    fn test_resize_skips_small_image() {
        let data = encoded_image(40, 50, ImageFormat::Png);
        assert_eq!(
            ImageResizer::default().resize_to_height(&data, 200),
            ResizeOutcome::Skipped
        );
    }

    #[test]
    fn test_resize_non_image_has_no_result() {
        assert_eq!(
            ImageResizer::default().resize_to_height(b"%PDF-1.4 ...", 200),
            ResizeOutcome::NoResult
        );
    }

    #[test]
    fn test_resize_corrupt_image_has_no_result() {
        let mut data = encoded_image(300, 400, ImageFormat::Png);
        data.truncate(40);
        assert_eq!(
            ImageResizer::default().resize_to_height(&data, 100),
            ResizeOutcome::NoResult
        );
    }

    mod proptest_suite {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn factor_is_smallest_stopping_power_of_two(
                width in 1u32..20_000,
                height in 1u32..20_000,
                target in 1u32..2_000,
            ) {
                match compute_downsample_factor(width, height, None, Some(target)) {
                    Downsample::Skip => prop_assert!(height <= target),
                    Downsample::Factor(f) => {
                        prop_assert!(f.is_power_of_two());
                        prop_assert!((height / 2) / f <= target);
                        if f > 1 {
                            prop_assert!((height / 2) / (f / 2) > target);
                        }
                    }
                }
            }
        }
    }
}
