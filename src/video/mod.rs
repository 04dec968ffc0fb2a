//! Frame-by-frame video pipeline.
//!
//! The pipeline reads frames sequentially from a [`FrameSource`], dumps each
//! one verbatim, inpaints it with the job's mask and writes the result to a
//! [`FrameSink`]. It moves linearly through
//! `Opened -> Streaming -> Draining -> Closed`; output frame `i` always
//! corresponds to input frame `i`.

pub mod ffmpeg;

use std::borrow::Cow;
use std::io::Write;
use std::path::PathBuf;

use image::RgbImage;
use tracing::{debug, info, warn};

use crate::config::{OnMaskFailure, ProcessOptions};
use crate::engine::save_jpeg;
use crate::error::Result;
use crate::inpaint::inpaint_telea;
use crate::mask::{ColorSpec, MaskFit, WatermarkMask};
use crate::media::FrameDumpDirs;
use crate::report::{percent_of, Reporter};

/// JPEG quality of dumped frames.
pub const DUMP_JPEG_QUALITY: u8 = 95;

/// Stream parameters of a source video.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frames per second.
    pub fps: f64,
    /// Frame count reported by the container; `0` when unknown.
    pub total_frames: u64,
}

/// Everything needed to process one video.
#[derive(Debug, Clone)]
pub struct VideoJob {
    /// Source video.
    pub source: PathBuf,
    /// Destination of the processed video.
    pub output: PathBuf,
    /// Probed stream parameters.
    pub info: VideoInfo,
    /// Frame dump layout.
    pub dumps: FrameDumpDirs,
}

/// A decoded frame and its position in the stream.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Zero-based frame index.
    pub index: u64,
    /// Decoded pixels.
    pub image: RgbImage,
}

/// Sequential frame reader.
pub trait FrameSource {
    /// Next frame, or `None` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be read at all.
    fn read_frame(&mut self) -> Result<Option<RgbImage>>;
}

/// Sequential frame writer.
pub trait FrameSink {
    /// Append one frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be written.
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;

    /// Flush and close the destination.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination cannot be finalized.
    fn finish(&mut self) -> Result<()>;
}

/// Mask supply for a video job.
#[derive(Debug, Clone)]
pub enum MaskPlan {
    /// One mask derived before streaming and shared by every frame.
    Shared(WatermarkMask),
    /// A colour band evaluated against each frame.
    PerFrame(ColorSpec),
}

impl MaskPlan {
    /// The mask to apply to `frame`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MaskSizeMismatch`](crate::Error::MaskSizeMismatch) when
    /// a shared mask does not fit and `fit` is [`MaskFit::Reject`].
    pub fn mask_for(&self, frame: &RgbImage, fit: MaskFit) -> Result<Cow<'_, WatermarkMask>> {
        match self {
            Self::Shared(mask) if mask.dimensions() == frame.dimensions() => Ok(Cow::Borrowed(mask)),
            Self::Shared(mask) => mask
                .fitted(frame.width(), frame.height(), fit)
                .map(Cow::Owned),
            Self::PerFrame(spec) => Ok(Cow::Owned(WatermarkMask::from_color(frame, spec))),
        }
    }
}

/// Lifecycle of a [`FramePipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Source and sink are open, dump directories exist.
    Opened,
    /// Frames are being processed.
    Streaming,
    /// End of stream reached; handles are being released.
    Draining,
    /// Terminal.
    Closed,
}

/// Frame counts for a finished job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    /// Frames decoded from the source.
    pub frames_read: u64,
    /// Frames inpainted and written.
    pub frames_inpainted: u64,
    /// Frames written unmodified after a failure.
    pub frames_passed_through: u64,
    /// Frames dropped after a failure.
    pub frames_skipped: u64,
}

impl PipelineSummary {
    /// Frames written to the sink.
    #[must_use]
    pub fn frames_written(&self) -> u64 {
        self.frames_inpainted + self.frames_passed_through
    }
}

/// Drives decode, mask, inpaint and encode for one video.
pub struct FramePipeline<'a, S, K> {
    source: S,
    sink: K,
    mask: &'a MaskPlan,
    options: &'a ProcessOptions,
    dumps: FrameDumpDirs,
    total_frames: u64,
    state: PipelineState,
}

impl<'a, S: FrameSource, K: FrameSink> FramePipeline<'a, S, K> {
    /// Take ownership of an open source and sink and create the dump directories.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if a dump directory cannot be created.
    pub fn open(
        source: S,
        sink: K,
        mask: &'a MaskPlan,
        options: &'a ProcessOptions,
        dumps: FrameDumpDirs,
        total_frames: u64,
    ) -> Result<Self> {
        dumps.create()?;
        debug!(
            original = %dumps.original.display(),
            processed = %dumps.processed.display(),
            "frame dump directories ready"
        );
        Ok(Self {
            source,
            sink,
            mask,
            options,
            dumps,
            total_frames,
            state: PipelineState::Opened,
        })
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Process every frame, close the sink and emit the terminal `PROGRESS:100`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source fails outright, a dump or sink write
    /// fails, or the reporter cannot write.
    pub fn run<W: Write>(mut self, reporter: &mut Reporter<W>) -> Result<PipelineSummary> {
        self.transition(PipelineState::Streaming);
        let mut summary = PipelineSummary::default();

        while let Some(image) = self.source.read_frame()? {
            let frame = Frame {
                index: summary.frames_read,
                image,
            };
            self.process_frame(&frame, &mut summary)?;
            summary.frames_read += 1;

            if let Some(pct) = percent_of(summary.frames_read, self.total_frames) {
                reporter.progress(pct)?;
            }
        }

        self.transition(PipelineState::Draining);
        self.sink.finish()?;

        self.transition(PipelineState::Closed);
        reporter.finish()?;
        info!(
            read = summary.frames_read,
            inpainted = summary.frames_inpainted,
            passed_through = summary.frames_passed_through,
            skipped = summary.frames_skipped,
            "video frames processed"
        );
        Ok(summary)
    }

    fn process_frame(&mut self, frame: &Frame, summary: &mut PipelineSummary) -> Result<()> {
        save_jpeg(
            &frame.image,
            &FrameDumpDirs::frame_file(&self.dumps.original, frame.index),
            DUMP_JPEG_QUALITY,
        )?;

        let inpainted = self
            .mask
            .mask_for(&frame.image, self.options.mask_fit)
            .and_then(|mask| inpaint_telea(&frame.image, &mask, self.options.radius));

        match inpainted {
            Ok(result) => {
                self.sink.write_frame(&result)?;
                save_jpeg(
                    &result,
                    &FrameDumpDirs::frame_file(&self.dumps.processed, frame.index),
                    DUMP_JPEG_QUALITY,
                )?;
                summary.frames_inpainted += 1;
            }
            Err(e) => match self.options.on_mask_failure {
                OnMaskFailure::PassthroughOriginal => {
                    warn!(index = frame.index, error = %e, "writing original frame");
                    self.sink.write_frame(&frame.image)?;
                    summary.frames_passed_through += 1;
                }
                OnMaskFailure::SkipFrame => {
                    warn!(index = frame.index, error = %e, "skipping frame");
                    summary.frames_skipped += 1;
                }
            },
        }
        Ok(())
    }

    fn transition(&mut self, next: PipelineState) {
        debug!(from = ?self.state, to = ?next, "pipeline state");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb};
    use std::collections::VecDeque;

    struct VecSource(VecDeque<RgbImage>);

    impl FrameSource for VecSource {
        fn read_frame(&mut self) -> Result<Option<RgbImage>> {
            Ok(self.0.pop_front())
        }
    }

    #[derive(Default)]
    struct VecSink {
        frames: Vec<RgbImage>,
        finished: bool,
    }

    impl FrameSink for &mut VecSink {
        fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
            self.frames.push(frame.clone());
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            self.finished = true;
            Ok(())
        }
    }

    fn frames(count: usize, width: u32, height: u32) -> VecDeque<RgbImage> {
        (0..count)
            .map(|i| {
                #[allow(clippy::cast_possible_truncation)]
                let shade = (i * 4) as u8;
                let mut img = RgbImage::from_pixel(width, height, Rgb([shade, 90, 160]));
                img.put_pixel(2, 2, Rgb([255, 255, 255]));
                img
            })
            .collect()
    }

    fn corner_mask(width: u32, height: u32) -> WatermarkMask {
        WatermarkMask::from_raster(GrayImage::from_fn(width, height, |x, y| {
            Luma([if (1..4).contains(&x) && (1..4).contains(&y) { 255 } else { 0 }])
        }))
    }

    fn protocol(out: Vec<u8>) -> Vec<String> {
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn dump_count(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn processes_every_frame_and_reports_to_100() {
        let tmp = tempfile::tempdir().unwrap();
        let dumps = FrameDumpDirs::for_video(&tmp.path().join("clip.mp4"));
        let plan = MaskPlan::Shared(corner_mask(12, 10));
        let options = ProcessOptions::default();
        let mut sink = VecSink::default();
        let mut reporter = Reporter::new(Vec::new());

        let pipeline = FramePipeline::open(
            VecSource(frames(50, 12, 10)),
            &mut sink,
            &plan,
            &options,
            dumps.clone(),
            50,
        )
        .unwrap();
        assert_eq!(pipeline.state(), PipelineState::Opened);
        let summary = pipeline.run(&mut reporter).unwrap();

        assert_eq!(summary.frames_read, 50);
        assert_eq!(summary.frames_inpainted, 50);
        assert_eq!(sink.frames.len(), 50);
        assert!(sink.finished);
        assert_eq!(dump_count(&dumps.original), 50);
        assert_eq!(dump_count(&dumps.processed), 50);
        assert!(dumps.original.join("frame_00049.jpg").exists());
        assert_ne!(sink.frames[0].get_pixel(2, 2), &Rgb([255, 255, 255]));

        let lines = protocol(reporter.into_inner());
        let values: Vec<u8> = lines
            .iter()
            .filter_map(|l| l.strip_prefix("PROGRESS:"))
            .map(|v| v.parse().unwrap())
            .collect();
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(values.last(), Some(&100));
        assert_eq!(values.iter().filter(|&&v| v == 100).count(), 1);
        assert_eq!(values.first(), Some(&2));
    }

    #[test]
    fn unknown_frame_count_only_reports_completion() {
        let tmp = tempfile::tempdir().unwrap();
        let dumps = FrameDumpDirs::for_video(&tmp.path().join("clip.mkv"));
        let plan = MaskPlan::Shared(corner_mask(8, 8));
        let options = ProcessOptions::default();
        let mut sink = VecSink::default();
        let mut reporter = Reporter::new(Vec::new());

        FramePipeline::open(VecSource(frames(5, 8, 8)), &mut sink, &plan, &options, dumps, 0)
            .unwrap()
            .run(&mut reporter)
            .unwrap();

        assert_eq!(protocol(reporter.into_inner()), vec!["PROGRESS:100"]);
    }

    #[test]
    fn empty_stream_still_closes_with_100() {
        let tmp = tempfile::tempdir().unwrap();
        let dumps = FrameDumpDirs::for_video(&tmp.path().join("empty.mp4"));
        let plan = MaskPlan::Shared(corner_mask(8, 8));
        let options = ProcessOptions::default();
        let mut sink = VecSink::default();
        let mut reporter = Reporter::new(Vec::new());

        let summary = FramePipeline::open(
            VecSource(VecDeque::new()),
            &mut sink,
            &plan,
            &options,
            dumps.clone(),
            30,
        )
        .unwrap()
        .run(&mut reporter)
        .unwrap();

        assert_eq!(summary, PipelineSummary::default());
        assert!(dumps.original.is_dir());
        assert!(dumps.processed.is_dir());
        assert_eq!(protocol(reporter.into_inner()), vec!["PROGRESS:100"]);
    }

    #[test]
    fn failed_frames_follow_fallback_policy() {
        let mut source = frames(3, 8, 8);
        source.insert(1, RgbImage::new(6, 6));

        for (policy, written, dumped) in [
            (OnMaskFailure::PassthroughOriginal, 4, 3),
            (OnMaskFailure::SkipFrame, 3, 3),
        ] {
            let tmp = tempfile::tempdir().unwrap();
            let dumps = FrameDumpDirs::for_video(&tmp.path().join("clip.mp4"));
            let plan = MaskPlan::Shared(corner_mask(8, 8));
            let options = ProcessOptions {
                mask_fit: MaskFit::Reject,
                on_mask_failure: policy,
                ..ProcessOptions::default()
            };
            let mut sink = VecSink::default();
            let mut reporter = Reporter::new(Vec::new());

            let summary = FramePipeline::open(
                VecSource(source.clone()),
                &mut sink,
                &plan,
                &options,
                dumps.clone(),
                4,
            )
            .unwrap()
            .run(&mut reporter)
            .unwrap();

            assert_eq!(summary.frames_read, 4);
            assert_eq!(summary.frames_written(), written);
            assert_eq!(sink.frames.len(), written as usize);
            assert_eq!(dump_count(&dumps.original), 4);
            assert_eq!(dump_count(&dumps.processed), dumped);
            if policy == OnMaskFailure::PassthroughOriginal {
                assert_eq!(sink.frames[1], RgbImage::new(6, 6));
            }
        }
    }

    #[test]
    fn per_frame_colour_mask_tracks_frame_content() {
        let plan = MaskPlan::PerFrame(ColorSpec::new([255, 255, 255], 0));
        let frame = frames(1, 6, 6).pop_front().unwrap();
        let mask = plan.mask_for(&frame, MaskFit::Reject).unwrap();
        assert_eq!(mask.masked_count(), 1);
        assert!(mask.is_masked(2, 2));
    }
}
