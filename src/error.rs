//! Error types for the watermark-inpaint crate.

use std::path::PathBuf;

/// Errors that can occur while deriving masks, inpainting, or driving a video job.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The input path does not exist.
    #[error("path does not exist: {}", .0.display())]
    PathNotFound(PathBuf),

    /// The input path has neither a supported image nor a supported video extension.
    #[error("neither a valid image nor a valid video file: {}", .0.display())]
    Classification(PathBuf),

    /// The watermark template could not be decoded.
    #[error("could not load mask from {}: {source}", path.display())]
    MaskLoad {
        /// Template path.
        path: PathBuf,
        /// Underlying decode error.
        source: image::ImageError,
    },

    /// The mask and the frame it is applied to have different dimensions.
    #[error("mask is {mask_width}x{mask_height} but frame is {frame_width}x{frame_height}")]
    MaskSizeMismatch {
        /// Mask width in pixels.
        mask_width: u32,
        /// Mask height in pixels.
        mask_height: u32,
        /// Frame width in pixels.
        frame_width: u32,
        /// Frame height in pixels.
        frame_height: u32,
    },

    /// A frame or still image could not be loaded or inpainted.
    #[error("inpainting failed: {0}")]
    Inpaint(String),

    /// The source video container could not be opened or probed.
    #[error("could not open video file at {}: {reason}", path.display())]
    VideoOpen {
        /// Source video path.
        path: PathBuf,
        /// Why probing or decoding could not start.
        reason: String,
    },

    /// The destination video writer failed.
    #[error("video encoding failed: {0}")]
    Encode(String),

    /// The external multiplexer failed or is missing.
    #[error("audio mux failed: {0}")]
    Mux(String),

    /// A legacy colour argument could not be parsed.
    #[error("invalid colour '{0}', expected #rrggbb")]
    InvalidColor(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error occurred while encoding or decoding an image.
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Probe output from the media tool could not be parsed.
    #[error("could not parse probe output: {0}")]
    Probe(#[from] serde_json::Error),
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
