//! Job configuration.
//!
//! [`JobConfig`] holds the positional inputs of the worker contract under
//! named fields; [`ProcessOptions`] holds the tunables that have defaults.

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::inpaint::DEFAULT_RADIUS;
use crate::mask::{ColorSpec, MaskFit, MaskSource};

/// Default four-character code of the output video stream.
pub const DEFAULT_CODEC_TAG: &str = "mp4v";

/// What the video pipeline writes when a frame cannot be masked or inpainted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnMaskFailure {
    /// Write nothing for that frame.
    SkipFrame,
    /// Write the original, unmodified frame to the output video.
    #[default]
    PassthroughOriginal,
}

/// External tool locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    /// Decoder/encoder used for the frame pipeline.
    pub ffmpeg: PathBuf,
    /// Prober used for stream metadata.
    pub ffprobe: PathBuf,
    /// Multiplexer used by the audio stage.
    pub muxer: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            muxer: PathBuf::from("ffmpeg"),
        }
    }
}

/// Options controlling processing behavior.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// Inpainting neighbourhood radius in pixels.
    pub radius: u32,
    /// Fallback policy for frames that fail masking or inpainting.
    pub on_mask_failure: OnMaskFailure,
    /// How a mask of the wrong size is reconciled with the frame.
    pub mask_fit: MaskFit,
    /// Four-character code tagged on the output video stream.
    pub codec_tag: String,
    /// External tools.
    pub tools: ToolPaths,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            radius: DEFAULT_RADIUS,
            on_mask_failure: OnMaskFailure::default(),
            mask_fit: MaskFit::default(),
            codec_tag: DEFAULT_CODEC_TAG.to_string(),
            tools: ToolPaths::default(),
        }
    }
}

/// The worker's positional inputs, parsed once at entry.
///
/// The applied-mask, steps, colour and tolerance slots are accepted for
/// argument-count compatibility; only colour and tolerance have an effect,
/// and only with the colour mask strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobConfig {
    /// Watermark template; `None` when the slot was empty.
    pub template: Option<PathBuf>,
    /// Legacy applied-mask slot, ignored.
    pub legacy_applied_mask: Option<String>,
    /// Image or video to process.
    pub media: PathBuf,
    /// Legacy steps slot, ignored.
    pub legacy_steps: Option<String>,
    /// Legacy `#rrggbb` colour slot.
    pub color: Option<String>,
    /// Legacy tolerance slot.
    pub tolerance: Option<String>,
    /// Derive the mask from colour and tolerance instead of the template.
    pub use_color_mask: bool,
}

impl JobConfig {
    /// Build a config from the positional slots.
    ///
    /// Blank slots become `None`; every other value, the media path included,
    /// is kept verbatim.
    #[must_use]
    pub fn from_slots(
        template: &str,
        applied_mask: &str,
        media: &str,
        steps: &str,
        color: Option<&str>,
        tolerance: Option<&str>,
    ) -> Self {
        let slot = |s: &str| (!s.trim().is_empty()).then(|| s.to_string());
        Self {
            template: slot(template).map(PathBuf::from),
            legacy_applied_mask: slot(applied_mask),
            media: PathBuf::from(media),
            legacy_steps: slot(steps),
            color: color.and_then(slot),
            tolerance: tolerance.and_then(slot),
            use_color_mask: false,
        }
    }

    /// The colour band from the colour and tolerance slots.
    ///
    /// A missing tolerance means an exact match; tolerances above 255 saturate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidColor`] if the colour is missing or malformed,
    /// or the tolerance is not a non-negative integer.
    pub fn color_spec(&self) -> Result<ColorSpec> {
        let raw = self
            .color
            .as_deref()
            .ok_or_else(|| Error::InvalidColor(String::new()))?;
        let mut spec: ColorSpec = raw.parse()?;
        if let Some(tol) = self.tolerance.as_deref() {
            let value: u32 = tol
                .trim()
                .parse()
                .map_err(|_| Error::InvalidColor(format!("{raw} (tolerance '{tol}')")))?;
            spec.tolerance = u8::try_from(value).unwrap_or(u8::MAX);
        }
        Ok(spec)
    }

    /// Where the watermark mask comes from.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PathNotFound`] if no template was given (or it does not
    /// exist) with the template strategy, and the errors of
    /// [`color_spec`](Self::color_spec) with the colour strategy.
    pub fn mask_source(&self) -> Result<MaskSource> {
        if self.use_color_mask {
            return self.color_spec().map(MaskSource::Color);
        }
        match &self.template {
            Some(path) if path.exists() => Ok(MaskSource::Template(path.clone())),
            Some(path) => Err(Error::PathNotFound(path.clone())),
            None => Err(Error::PathNotFound(PathBuf::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_slots_become_none() {
        let cfg = JobConfig::from_slots("wm.png", "", "clip.mp4", "10", Some("#ffffff"), Some(" "));
        assert_eq!(cfg.template, Some(PathBuf::from("wm.png")));
        assert_eq!(cfg.legacy_applied_mask, None);
        assert_eq!(cfg.media, PathBuf::from("clip.mp4"));
        assert_eq!(cfg.legacy_steps.as_deref(), Some("10"));
        assert_eq!(cfg.color.as_deref(), Some("#ffffff"));
        assert_eq!(cfg.tolerance, None);
    }

    #[test]
    fn paths_with_surrounding_whitespace_are_kept() {
        let cfg = JobConfig::from_slots(" wm.png", "  ", " clip .mp4 ", "", None, None);
        assert_eq!(cfg.media, PathBuf::from(" clip .mp4 "));
        assert_eq!(cfg.template, Some(PathBuf::from(" wm.png")));
        assert_eq!(cfg.legacy_applied_mask, None);

        let padded = JobConfig::from_slots("", "", "a.png", "", Some(" #102030 "), Some(" 7 "));
        assert_eq!(padded.color_spec().unwrap(), ColorSpec::new([16, 32, 48], 7));
    }

    #[test]
    fn color_spec_reads_colour_and_tolerance() {
        let cfg = JobConfig::from_slots("", "", "a.png", "", Some("#102030"), Some("80"));
        assert_eq!(cfg.color_spec().unwrap(), ColorSpec::new([16, 32, 48], 80));

        let wide = JobConfig::from_slots("", "", "a.png", "", Some("#102030"), Some("900"));
        assert_eq!(wide.color_spec().unwrap().tolerance, 255);

        let bad = JobConfig::from_slots("", "", "a.png", "", Some("#102030"), Some("-3"));
        assert!(matches!(bad.color_spec(), Err(Error::InvalidColor(_))));
    }

    #[test]
    fn mask_source_prefers_template_unless_colour_requested() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("wm.png");
        std::fs::write(&template, b"placeholder").unwrap();

        let mut cfg = JobConfig::from_slots(
            template.to_str().unwrap(),
            "",
            "a.png",
            "",
            Some("#ffffff"),
            Some("5"),
        );
        assert_eq!(cfg.mask_source().unwrap(), MaskSource::Template(template));

        cfg.use_color_mask = true;
        assert_eq!(
            cfg.mask_source().unwrap(),
            MaskSource::Color(ColorSpec::new([255, 255, 255], 5))
        );
    }

    #[test]
    fn missing_template_is_path_not_found() {
        let cfg = JobConfig::from_slots("/nope/wm.png", "", "a.png", "", None, None);
        assert!(matches!(cfg.mask_source(), Err(Error::PathNotFound(_))));
    }

    #[test]
    fn defaults_match_worker_contract() {
        let opts = ProcessOptions::default();
        assert_eq!(opts.radius, 3);
        assert_eq!(opts.on_mask_failure, OnMaskFailure::PassthroughOriginal);
        assert_eq!(opts.mask_fit, MaskFit::Resize);
        assert_eq!(opts.codec_tag, "mp4v");
    }
}
