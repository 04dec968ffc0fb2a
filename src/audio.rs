//! Audio track preservation.
//!
//! The processed video is written without sound. Afterwards the source's
//! audio is stream-copied out and muxed back onto the silent video. Any
//! failure leaves the silent video in place as the final result.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::media::sibling_with_suffix;

/// File name of the extracted audio inside the frame dump root.
pub const EXTRACTED_AUDIO_FILE: &str = "extracted_audio.mka";

/// Codec the audio is re-encoded to when muxing.
pub const MUX_AUDIO_CODEC: &str = "aac";

/// Result of the audio stage. Failures are never surfaced as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuxOutcome {
    /// Audio was muxed and the output now carries the source's audio track.
    Muxed,
    /// Muxing failed; the silent video was kept.
    SilentFallback {
        /// Why muxing failed.
        reason: String,
    },
}

/// Extracts and re-muxes the source audio with an external multiplexer.
#[derive(Debug, Clone)]
pub struct AudioMuxer {
    tool: PathBuf,
}

impl AudioMuxer {
    /// Use `tool` (an `ffmpeg`-compatible binary) for both steps.
    pub fn new(tool: impl Into<PathBuf>) -> Self {
        Self { tool: tool.into() }
    }

    /// Put the audio of `source` onto the silent video at `output`.
    ///
    /// `scratch_dir` holds the extracted audio. On success the silent video
    /// is replaced in place; on failure temporaries are removed and the
    /// silent video is left untouched.
    pub fn restore_audio(&self, source: &Path, output: &Path, scratch_dir: &Path) -> MuxOutcome {
        let audio = scratch_dir.join(EXTRACTED_AUDIO_FILE);
        let combined = combined_output_path(output);

        match self.try_restore(source, output, &audio, &combined) {
            Ok(()) => {
                info!(output = %output.display(), "audio merged");
                MuxOutcome::Muxed
            }
            Err(e) => {
                warn!(error = %e, "could not merge audio, keeping silent video");
                remove_if_exists(&combined);
                remove_if_exists(&audio);
                MuxOutcome::SilentFallback {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn try_restore(&self, source: &Path, output: &Path, audio: &Path, combined: &Path) -> Result<()> {
        debug!(audio = %audio.display(), "extracting audio");
        self.run(&[
            OsStr::new("-y"),
            OsStr::new("-i"),
            source.as_os_str(),
            OsStr::new("-vn"),
            OsStr::new("-acodec"),
            OsStr::new("copy"),
            audio.as_os_str(),
        ])?;

        debug!(combined = %combined.display(), "combining video and audio");
        self.run(&[
            OsStr::new("-y"),
            OsStr::new("-i"),
            output.as_os_str(),
            OsStr::new("-i"),
            audio.as_os_str(),
            OsStr::new("-map"),
            OsStr::new("0:v:0"),
            OsStr::new("-map"),
            OsStr::new("1:a:0"),
            OsStr::new("-c:v"),
            OsStr::new("copy"),
            OsStr::new("-c:a"),
            OsStr::new(MUX_AUDIO_CODEC),
            combined.as_os_str(),
        ])?;

        // The silent video stays in place until the rename replaces it.
        fs::rename(combined, output)?;
        remove_if_exists(audio);
        Ok(())
    }

    fn run(&self, args: &[&OsStr]) -> Result<()> {
        let out = Command::new(&self.tool)
            .arg("-hide_banner")
            .args(["-loglevel", "error"])
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::Mux(format!("could not run {}: {e}", self.tool.display())))?;
        if out.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&out.stderr);
        Err(Error::Mux(format!(
            "{} exited with {}: {}",
            self.tool.display(),
            out.status,
            stderr.trim()
        )))
    }
}

/// `<dir>/<stem>_with_audio.<ext>` next to the silent output.
#[must_use]
pub fn combined_output_path(output: &Path) -> PathBuf {
    sibling_with_suffix(output, "_with_audio")
}

fn remove_if_exists(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "could not remove temporary file");
        }
    }
}
