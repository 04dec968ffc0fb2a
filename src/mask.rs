//! Binary watermark masks.
//!
//! A mask is a single-channel raster the size of the frame it applies to:
//! `255` marks a watermark pixel that must be filled, `0` marks a pixel to keep.
//! Masks come either from a template image (alpha channel, or brightness when
//! the template is opaque) or from a target colour with a per-channel tolerance.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma, RgbImage};

use crate::error::{Error, Result};

/// Mask value for pixels that must be filled.
pub const MASK_ON: u8 = 255;

/// Mask value for pixels that are kept as-is.
pub const MASK_OFF: u8 = 0;

/// Alpha values strictly above this mark a template pixel as watermark.
pub const ALPHA_THRESHOLD: u8 = 1;

/// Grayscale values strictly above this mark an opaque template pixel as watermark.
pub const GRAY_THRESHOLD: u8 = 127;

/// How a mask whose size differs from the frame is reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaskFit {
    /// Resample the mask to the frame size with nearest-neighbour sampling.
    #[default]
    Resize,
    /// Fail with [`Error::MaskSizeMismatch`].
    Reject,
}

/// Target colour plus tolerance for the colour-band mask strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorSpec {
    /// Target colour as `[r, g, b]`.
    pub rgb: [u8; 3],
    /// Per-channel tolerance in pixel units.
    pub tolerance: u8,
}

impl ColorSpec {
    /// Create a colour spec.
    #[must_use]
    pub fn new(rgb: [u8; 3], tolerance: u8) -> Self {
        Self { rgb, tolerance }
    }

    /// Inclusive per-channel `(lower, upper)` bounds, clamped to `[0, 255]`.
    #[must_use]
    pub fn bounds(&self) -> ([u8; 3], [u8; 3]) {
        let lower = self.rgb.map(|c| c.saturating_sub(self.tolerance));
        let upper = self.rgb.map(|c| c.saturating_add(self.tolerance));
        (lower, upper)
    }

    /// Whether a pixel lies inside the band on every channel.
    #[must_use]
    pub fn matches(&self, px: [u8; 3]) -> bool {
        let (lower, upper) = self.bounds();
        (0..3).all(|ch| (lower[ch]..=upper[ch]).contains(&px[ch]))
    }
}

/// Parse a `#rrggbb` (or bare `rrggbb`) colour. Tolerance starts at zero.
impl FromStr for ColorSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(Error::InvalidColor(s.to_string()));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|_| Error::InvalidColor(s.to_string()))
        };
        Ok(Self::new([channel(0..2)?, channel(2..4)?, channel(4..6)?], 0))
    }
}

/// Where a mask comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaskSource {
    /// A template image; its alpha (or brightness) marks the watermark.
    Template(PathBuf),
    /// A colour band evaluated against the frame being processed.
    Color(ColorSpec),
}

/// A binary watermark mask.
///
/// Immutable once derived; shared by reference across every frame of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatermarkMask {
    raster: GrayImage,
}

impl WatermarkMask {
    /// Wrap a raster, forcing every value to [`MASK_ON`] or [`MASK_OFF`].
    #[must_use]
    pub fn from_raster(mut raster: GrayImage) -> Self {
        for px in raster.pixels_mut() {
            px[0] = if px[0] > 0 { MASK_ON } else { MASK_OFF };
        }
        Self { raster }
    }

    /// Load a template from disk and threshold it into a mask.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MaskLoad`] if the template cannot be decoded.
    pub fn from_template(path: &Path) -> Result<Self> {
        let template = image::open(path).map_err(|source| Error::MaskLoad {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_template_image(&template))
    }

    /// Threshold an already decoded template.
    ///
    /// Templates with an alpha channel use `alpha > 1`; opaque templates use
    /// `luma > 127`. The template keeps its own size.
    #[must_use]
    pub fn from_template_image(template: &DynamicImage) -> Self {
        let raster = if template.color().has_alpha() {
            let rgba = template.to_rgba8();
            GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
                binary(rgba.get_pixel(x, y)[3] > ALPHA_THRESHOLD)
            })
        } else {
            let mut gray = template.to_luma8();
            for px in gray.pixels_mut() {
                *px = binary(px[0] > GRAY_THRESHOLD);
            }
            gray
        };
        Self { raster }
    }

    /// Build a mask marking every pixel of `image` inside the colour band.
    #[must_use]
    pub fn from_color(image: &RgbImage, spec: &ColorSpec) -> Self {
        let raster = GrayImage::from_fn(image.width(), image.height(), |x, y| {
            binary(spec.matches(image.get_pixel(x, y).0))
        });
        Self { raster }
    }

    /// Derive a mask from `source`, probing `frame` for the colour strategy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MaskLoad`] if a template cannot be decoded.
    pub fn derive(source: &MaskSource, frame: &RgbImage) -> Result<Self> {
        match source {
            MaskSource::Template(path) => Self::from_template(path),
            MaskSource::Color(spec) => Ok(Self::from_color(frame, spec)),
        }
    }

    /// Mask width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    /// Mask height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.raster.height()
    }

    /// `(width, height)` of the mask.
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.raster.dimensions()
    }

    /// Whether the pixel at `(x, y)` must be filled.
    #[must_use]
    pub fn is_masked(&self, x: u32, y: u32) -> bool {
        self.raster.get_pixel(x, y)[0] == MASK_ON
    }

    /// Number of pixels marked for filling.
    #[must_use]
    pub fn masked_count(&self) -> usize {
        self.raster.pixels().filter(|px| px[0] == MASK_ON).count()
    }

    /// The underlying raster.
    #[must_use]
    pub fn as_raster(&self) -> &GrayImage {
        &self.raster
    }

    /// Return a mask matching `(width, height)` according to `fit`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MaskSizeMismatch`] when sizes differ and `fit` is
    /// [`MaskFit::Reject`].
    pub fn fitted(&self, width: u32, height: u32, fit: MaskFit) -> Result<Self> {
        if self.dimensions() == (width, height) {
            return Ok(self.clone());
        }
        match fit {
            MaskFit::Resize => {
                let raster = imageops::resize(&self.raster, width, height, FilterType::Nearest);
                Ok(Self::from_raster(raster))
            }
            MaskFit::Reject => Err(self.mismatch(width, height)),
        }
    }

    /// Error describing a mismatch against a `width x height` frame.
    pub(crate) fn mismatch(&self, width: u32, height: u32) -> Error {
        Error::MaskSizeMismatch {
            mask_width: self.width(),
            mask_height: self.height(),
            frame_width: width,
            frame_height: height,
        }
    }
}

fn binary(on: bool) -> Luma<u8> {
    Luma([if on { MASK_ON } else { MASK_OFF }])
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgba, RgbaImage};

    #[test]
    fn alpha_template_thresholds_alpha_channel() {
        let mut template = RgbaImage::new(4, 1);
        template.put_pixel(0, 0, Rgba([255, 255, 255, 0]));
        template.put_pixel(1, 0, Rgba([0, 0, 0, 1]));
        template.put_pixel(2, 0, Rgba([0, 0, 0, 2]));
        template.put_pixel(3, 0, Rgba([10, 10, 10, 255]));

        let mask = WatermarkMask::from_template_image(&DynamicImage::ImageRgba8(template));
        assert!(!mask.is_masked(0, 0));
        assert!(!mask.is_masked(1, 0));
        assert!(mask.is_masked(2, 0));
        assert!(mask.is_masked(3, 0));
    }

    #[test]
    fn opaque_template_thresholds_brightness() {
        let template = GrayImage::from_raw(3, 1, vec![127, 128, 0]).unwrap();
        let mask = WatermarkMask::from_template_image(&DynamicImage::ImageLuma8(template));
        assert!(!mask.is_masked(0, 0));
        assert!(mask.is_masked(1, 0));
        assert!(!mask.is_masked(2, 0));
        assert_eq!(mask.masked_count(), 1);
    }

    #[test]
    fn color_band_clamps_at_channel_limits() {
        let spec = ColorSpec::new([250, 5, 128], 10);
        let (lower, upper) = spec.bounds();
        assert_eq!(lower, [240, 0, 118]);
        assert_eq!(upper, [255, 15, 138]);
        assert!(spec.matches([255, 0, 138]));
        assert!(!spec.matches([255, 0, 139]));
    }

    #[test]
    fn zero_tolerance_matches_exact_colour_only() {
        let mut img = RgbImage::new(2, 2);
        img.put_pixel(0, 0, Rgb([200, 100, 50]));
        img.put_pixel(1, 0, Rgb([200, 100, 51]));
        let mask = WatermarkMask::from_color(&img, &ColorSpec::new([200, 100, 50], 0));
        assert!(mask.is_masked(0, 0));
        assert!(!mask.is_masked(1, 0));
        assert_eq!(mask.masked_count(), 1);
    }

    #[test]
    fn parses_hex_colours() {
        let spec: ColorSpec = "#ff8000".parse().unwrap();
        assert_eq!(spec.rgb, [255, 128, 0]);
        let bare: ColorSpec = "00ff10".parse().unwrap();
        assert_eq!(bare.rgb, [0, 255, 16]);
        assert!("#fff".parse::<ColorSpec>().is_err());
        assert!("#gg0000".parse::<ColorSpec>().is_err());
    }

    #[test]
    fn fitted_resizes_and_stays_binary() {
        let raster = GrayImage::from_fn(4, 4, |x, _| Luma([if x < 2 { 255 } else { 0 }]));
        let mask = WatermarkMask::from_raster(raster);
        let big = mask.fitted(8, 8, MaskFit::Resize).unwrap();
        assert_eq!(big.dimensions(), (8, 8));
        assert!(big.is_masked(0, 7));
        assert!(!big.is_masked(7, 0));
        assert!(big.as_raster().pixels().all(|p| p[0] == MASK_ON || p[0] == MASK_OFF));
    }

    #[test]
    fn fitted_rejects_mismatch_when_strict() {
        let mask = WatermarkMask::from_raster(GrayImage::new(4, 4));
        assert!(matches!(
            mask.fitted(5, 4, MaskFit::Reject),
            Err(Error::MaskSizeMismatch { frame_width: 5, .. })
        ));
        assert!(mask.fitted(4, 4, MaskFit::Reject).is_ok());
    }

    #[test]
    fn missing_template_is_a_mask_load_error() {
        let err = WatermarkMask::from_template(Path::new("/definitely/not/here.png")).unwrap_err();
        assert!(matches!(err, Error::MaskLoad { .. }));
    }
}
