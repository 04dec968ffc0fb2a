//! Job dispatch: image and video paths.

use std::io::Write;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat, RgbImage};
use tracing::{debug, info};

use crate::audio::{AudioMuxer, MuxOutcome};
use crate::config::{JobConfig, ProcessOptions};
use crate::error::{Error, Result};
use crate::inpaint::inpaint_telea;
use crate::mask::{MaskSource, WatermarkMask};
use crate::media::{default_output_path, FrameDumpDirs, MediaInput, MediaKind};
use crate::report::Reporter;
use crate::video::ffmpeg::{self, FfmpegDecoder, FfmpegEncoder};
use crate::video::{FramePipeline, MaskPlan, PipelineSummary, VideoJob};

/// Outcome of a successful job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutput {
    /// A processed still image.
    Image {
        /// Where the result was written.
        path: PathBuf,
    },
    /// A processed video.
    Video {
        /// Where the result was written.
        path: PathBuf,
        /// Frame counts.
        summary: PipelineSummary,
        /// Whether the audio track made it onto the output.
        audio: MuxOutcome,
    },
}

impl JobOutput {
    /// Where the result was written.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Image { path } | Self::Video { path, .. } => path,
        }
    }
}

/// Removes a watermark from one image or video per call.
///
/// Create once with the job's [`ProcessOptions`]; holds no per-job state.
#[derive(Debug, Clone, Default)]
pub struct WatermarkRemover {
    options: ProcessOptions,
}

impl WatermarkRemover {
    /// Create a remover with the given options.
    #[must_use]
    pub fn new(options: ProcessOptions) -> Self {
        Self { options }
    }

    /// The remover's options.
    #[must_use]
    pub fn options(&self) -> &ProcessOptions {
        &self.options
    }

    /// Validate the job's inputs and dispatch to the image or video path.
    ///
    /// # Errors
    ///
    /// Returns the first validation or processing error. Audio mux failures
    /// are not errors; they show up as [`MuxOutcome::SilentFallback`].
    pub fn run<W: Write>(&self, job: &JobConfig, reporter: &mut Reporter<W>) -> Result<JobOutput> {
        reporter.stage("Starting processing...")?;
        let media = MediaInput::classify(&job.media)?;
        let source = job.mask_source()?;
        debug!(media = %media.path().display(), kind = ?media.kind(), ?source, "job validated");

        match media.kind() {
            MediaKind::Image => {
                let output = default_output_path(media.path());
                self.process_image(media.path(), &source, &output, reporter)?;
                Ok(JobOutput::Image { path: output })
            }
            MediaKind::Video => {
                let job = self.prepare_video(media.path())?;
                let (summary, audio) = self.process_video(&job, &source, reporter)?;
                Ok(JobOutput::Video {
                    path: job.output,
                    summary,
                    audio,
                })
            }
        }
    }

    /// Load an image, inpaint the watermark and save the result to `output`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MaskLoad`] for an undecodable template,
    /// [`Error::Inpaint`] for an undecodable image, and
    /// [`Error::MaskSizeMismatch`] when the mask cannot be fitted.
    pub fn process_image<W: Write>(
        &self,
        input: &Path,
        source: &MaskSource,
        output: &Path,
        reporter: &mut Reporter<W>,
    ) -> Result<()> {
        let image = image::open(input)
            .map_err(|e| {
                Error::Inpaint(format!("could not load image {}: {e}", input.display()))
            })?
            .to_rgb8();

        reporter.stage("Deriving mask...")?;
        let mask = WatermarkMask::derive(source, &image)?.fitted(
            image.width(),
            image.height(),
            self.options.mask_fit,
        )?;
        debug!(masked = mask.masked_count(), "mask ready");

        reporter.stage("Inpainting image...")?;
        let result = self.remove(&image, &mask)?;

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        save_image(&result, output)?;

        reporter.message(format!("Unmasked image saved to: {}", output.display()))?;
        reporter.finish()?;
        info!(output = %output.display(), "image processed");
        Ok(())
    }

    /// Inpaint the masked region of `image`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MaskSizeMismatch`] if `mask` does not match `image`.
    pub fn remove(&self, image: &RgbImage, mask: &WatermarkMask) -> Result<RgbImage> {
        inpaint_telea(image, mask, self.options.radius)
    }

    /// Probe `source` and lay out the job's output paths.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VideoOpen`] if the source cannot be probed.
    pub fn prepare_video(&self, source: &Path) -> Result<VideoJob> {
        let info = ffmpeg::probe(&self.options.tools.ffprobe, source)?;
        debug!(
            width = info.width,
            height = info.height,
            fps = info.fps,
            total_frames = info.total_frames,
            "video probed"
        );
        Ok(VideoJob {
            source: source.to_path_buf(),
            output: default_output_path(source),
            info,
            dumps: FrameDumpDirs::for_video(source),
        })
    }

    /// Run the frame pipeline for `job`, then restore its audio track.
    ///
    /// The mask is derived before any output is created, so an undecodable
    /// template leaves nothing behind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MaskLoad`], [`Error::MaskSizeMismatch`],
    /// [`Error::VideoOpen`], [`Error::Encode`] or [`Error::Io`].
    pub fn process_video<W: Write>(
        &self,
        job: &VideoJob,
        source: &MaskSource,
        reporter: &mut Reporter<W>,
    ) -> Result<(PipelineSummary, MuxOutcome)> {
        reporter.stage("Deriving mask...")?;
        let plan = match source {
            MaskSource::Template(path) => {
                let mask = WatermarkMask::from_template(path)?;
                MaskPlan::Shared(mask.fitted(
                    job.info.width,
                    job.info.height,
                    self.options.mask_fit,
                )?)
            }
            MaskSource::Color(spec) => MaskPlan::PerFrame(*spec),
        };

        let tools = &self.options.tools;
        let decoder = FfmpegDecoder::spawn(&tools.ffmpeg, &job.source, &job.info)?;
        let encoder = FfmpegEncoder::spawn(
            &tools.ffmpeg,
            &job.output,
            &job.info,
            &self.options.codec_tag,
        )?;

        reporter.message(format!(
            "Original frames will be saved to: {}",
            job.dumps.original.display()
        ))?;
        reporter.message(format!(
            "Unmasked frames will be saved to: {}",
            job.dumps.processed.display()
        ))?;
        reporter.stage("Processing frames...")?;

        let summary = FramePipeline::open(
            decoder,
            encoder,
            &plan,
            &self.options,
            job.dumps.clone(),
            job.info.total_frames,
        )?
        .run(reporter)?;

        reporter.stage("Restoring audio track...")?;
        let audio = AudioMuxer::new(&tools.muxer).restore_audio(
            &job.source,
            &job.output,
            &job.dumps.root,
        );
        if let MuxOutcome::SilentFallback { reason } = &audio {
            reporter.message(format!(
                "Could not merge audio. Using video without audio. Reason: {reason}"
            ))?;
        }

        reporter.message(format!("Unmasked video saved to: {}", job.output.display()))?;
        info!(output = %job.output.display(), "video processed");
        Ok((summary, audio))
    }
}

/// Save an RGB image with format-specific quality settings.
///
/// # Errors
///
/// Returns an error if the format is unsupported or writing fails.
pub fn save_image(img: &RgbImage, path: &Path) -> Result<()> {
    let format = ImageFormat::from_path(path)
        .map_err(|e| Error::Inpaint(format!("unsupported output format: {e}")))?;

    match format {
        ImageFormat::Jpeg => save_jpeg(img, path, 100)?,
        ImageFormat::Png | ImageFormat::Bmp | ImageFormat::Gif => {
            DynamicImage::ImageRgb8(img.clone()).save(path)?;
        }
        _ => {
            return Err(Error::Inpaint(format!("unsupported output format: {format:?}")));
        }
    }

    Ok(())
}

/// Write `img` as a JPEG at `quality`.
pub(crate) fn save_jpeg(img: &RgbImage, path: &Path, quality: u8) -> Result<()> {
    let file = std::io::BufWriter::new(std::fs::File::create(path)?);
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(file, quality);
    encoder.encode_image(img)?;
    Ok(())
}
