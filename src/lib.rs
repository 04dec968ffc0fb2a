//! Remove static watermarks from images and videos via mask-guided inpainting.
//!
//! A binary mask marks the watermark's pixels. The mask comes from a template
//! image (its alpha channel, or its bright pixels when opaque) or from a
//! target colour with a tolerance. Masked pixels are then reconstructed from
//! their surroundings with Telea's fast marching inpainting.
//!
//! Videos are processed frame by frame through `ffmpeg`, with every source
//! and processed frame dumped as JPEG for inspection, and the source's audio
//! track muxed back onto the result when possible.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use watermark_inpaint::{inpaint_telea, WatermarkMask, DEFAULT_RADIUS};
//!
//! let img = image::open("photo.jpg").unwrap().to_rgb8();
//! let mask = WatermarkMask::from_template(Path::new("logo.png")).unwrap();
//! let cleaned = inpaint_telea(&img, &mask, DEFAULT_RADIUS).unwrap();
//! cleaned.save("photo_unmasked.jpg").unwrap();
//! ```
//!
//! # Jobs
//!
//! [`WatermarkRemover::run`] classifies the input, derives the mask and takes
//! the image or video path, streaming `PROGRESS:`/`STAGE:` lines through a
//! [`Reporter`].
//!
//! ```no_run
//! use watermark_inpaint::{JobConfig, ProcessOptions, Reporter, WatermarkRemover};
//!
//! let job = JobConfig::from_slots("logo.png", "", "clip.mp4", "", None, None);
//! let mut reporter = Reporter::stdout();
//! let output = WatermarkRemover::new(ProcessOptions::default())
//!     .run(&job, &mut reporter)
//!     .unwrap();
//! println!("saved to {}", output.path().display());
//! ```

#![deny(missing_docs)]

pub mod audio;
pub mod config;
mod engine;
pub mod error;
pub mod inpaint;
pub mod mask;
pub mod media;
pub mod report;
pub mod video;

pub use audio::{AudioMuxer, MuxOutcome};
pub use config::{JobConfig, OnMaskFailure, ProcessOptions, ToolPaths};
pub use engine::{save_image, JobOutput, WatermarkRemover};
pub use error::{Error, Result};
pub use inpaint::{inpaint_telea, DEFAULT_RADIUS};
pub use mask::{ColorSpec, MaskFit, MaskSource, WatermarkMask};
pub use media::{default_output_path, MediaInput, MediaKind};
pub use report::{ProgressEvent, Reporter};
