//! `ffmpeg`/`ffprobe` backed probing, decoding and encoding.
//!
//! Frames travel as packed `rgb24` rawvideo over the child's stdin/stdout.

use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use image::RgbImage;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{FrameSink, FrameSource, VideoInfo};
use crate::error::{Error, Result};

/// Frame rate used when the container does not report one.
pub const FALLBACK_FPS: f64 = 25.0;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

/// Read width, height, frame rate and frame count of the first video stream.
///
/// # Errors
///
/// Returns [`Error::VideoOpen`] if the prober cannot run, rejects the file,
/// or finds no video stream.
pub fn probe(ffprobe: &Path, source: &Path) -> Result<VideoInfo> {
    let output = Command::new(ffprobe)
        .args(["-v", "error", "-select_streams", "v:0", "-show_entries"])
        .arg("stream=width,height,r_frame_rate,avg_frame_rate,nb_frames,duration:format=duration")
        .args(["-of", "json"])
        .arg(source)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| open_error(source, format!("could not run {}: {e}", ffprobe.display())))?;

    if !output.status.success() {
        return Err(open_error(source, stderr_tail(&output.stderr)));
    }
    parse_probe(source, &output.stdout)
}

fn parse_probe(source: &Path, json: &[u8]) -> Result<VideoInfo> {
    let parsed: ProbeOutput = serde_json::from_slice(json)?;
    let container_duration = parsed.format.and_then(|f| f.duration);
    let stream = parsed
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| open_error(source, "no video stream".to_string()))?;

    let (Some(width), Some(height)) = (stream.width, stream.height) else {
        return Err(open_error(source, "video stream has no dimensions".to_string()));
    };
    if width == 0 || height == 0 {
        return Err(open_error(source, format!("invalid frame size {width}x{height}")));
    }

    let fps = [stream.r_frame_rate, stream.avg_frame_rate]
        .iter()
        .flatten()
        .find_map(|rate| parse_rate(rate))
        .unwrap_or(FALLBACK_FPS);
    // Matroska and some other containers carry no frame count; estimate it
    // from the duration. Progress is capped below 100 anyway.
    let total_frames = stream
        .nb_frames
        .and_then(|n| n.trim().parse::<u64>().ok())
        .filter(|&n| n > 0)
        .or_else(|| {
            [stream.duration, container_duration]
                .iter()
                .flatten()
                .find_map(|d| estimate_frames(d, fps))
        })
        .unwrap_or(0);

    Ok(VideoInfo {
        width,
        height,
        fps,
        total_frames,
    })
}

/// Parse `"30000/1001"` or `"25"`; `None` for zero, malformed or `N/A` rates.
#[must_use]
pub fn parse_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Frame count implied by a duration in seconds at `fps`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn estimate_frames(duration: &str, fps: f64) -> Option<u64> {
    let seconds: f64 = duration.trim().parse().ok()?;
    let frames = (seconds * fps).round();
    (frames.is_finite() && frames >= 1.0).then_some(frames as u64)
}

/// Encoder matching a four-character code.
#[must_use]
pub fn encoder_for_tag(tag: &str) -> &'static str {
    match tag.to_ascii_lowercase().as_str() {
        "avc1" | "h264" | "x264" => "libx264",
        "hvc1" | "hev1" => "libx265",
        "mjpg" => "mjpeg",
        "vp80" => "libvpx",
        "vp09" => "libvpx-vp9",
        _ => "mpeg4",
    }
}

fn open_error(source: &Path, reason: String) -> Error {
    Error::VideoOpen {
        path: source.to_path_buf(),
        reason,
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return "<no ffmpeg stderr>".to_string();
    }
    lines[lines.len().saturating_sub(3)..].join(" | ")
}

/// Fill `buf` completely, or return how many bytes were read before EOF.
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Decodes a video into `rgb24` frames through an `ffmpeg` child process.
pub struct FfmpegDecoder {
    source: PathBuf,
    child: Option<Child>,
    stdout: Option<BufReader<ChildStdout>>,
    width: u32,
    height: u32,
    frames_read: u64,
}

impl FfmpegDecoder {
    /// Spawn the decoder for `source` at the probed frame size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VideoOpen`] if `ffmpeg` cannot be started.
    pub fn spawn(ffmpeg: &Path, source: &Path, info: &VideoInfo) -> Result<Self> {
        let mut child = Command::new(ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-i"])
            .arg(source)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-s"])
            .arg(format!("{}x{}", info.width, info.height))
            .arg("pipe:1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| open_error(source, format!("could not run {}: {e}", ffmpeg.display())))?;

        let stdout = child
            .stdout
            .take()
            .map(|out| BufReader::with_capacity(frame_len(info), out))
            .ok_or_else(|| open_error(source, "ffmpeg stdout missing".to_string()))?;

        debug!(source = %source.display(), width = info.width, height = info.height, "decoder started");
        Ok(Self {
            source: source.to_path_buf(),
            child: Some(child),
            stdout: Some(stdout),
            width: info.width,
            height: info.height,
            frames_read: 0,
        })
    }

    fn close(&mut self) -> Result<()> {
        self.stdout = None;
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child.wait()?;
        if status.success() {
            return Ok(());
        }
        if self.frames_read == 0 {
            return Err(open_error(&self.source, format!("ffmpeg decode exited with {status}")));
        }
        warn!(
            source = %self.source.display(),
            frames = self.frames_read,
            %status,
            "decoder exited abnormally, treating as end of stream"
        );
        Ok(())
    }
}

impl FrameSource for FfmpegDecoder {
    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };
        let mut buf = vec![0u8; self.width as usize * self.height as usize * 3];
        let n = read_exact_or_eof(stdout, &mut buf)?;

        if n < buf.len() {
            if n > 0 {
                warn!(bytes = n, expected = buf.len(), "truncated trailing frame dropped");
            }
            self.close()?;
            return Ok(None);
        }

        self.frames_read += 1;
        Ok(RgbImage::from_raw(self.width, self.height, buf))
    }
}

impl Drop for FfmpegDecoder {
    fn drop(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Encodes `rgb24` frames into a video file through an `ffmpeg` child process.
pub struct FfmpegEncoder {
    output: PathBuf,
    child: Option<Child>,
    stdin: Option<BufWriter<ChildStdin>>,
    width: u32,
    height: u32,
}

impl FfmpegEncoder {
    /// Spawn the encoder writing `output` with the source's size and rate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encode`] if `ffmpeg` cannot be started.
    pub fn spawn(ffmpeg: &Path, output: &Path, info: &VideoInfo, codec_tag: &str) -> Result<Self> {
        let mut cmd = Command::new(ffmpeg);
        cmd.args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-s"])
            .arg(format!("{}x{}", info.width, info.height))
            .arg("-r")
            .arg(info.fps.to_string())
            .args(["-i", "pipe:0", "-an", "-c:v"])
            .arg(encoder_for_tag(codec_tag))
            .args(["-q:v", "2", "-pix_fmt", "yuv420p"]);
        // Matroska identifies codecs by name and has no fourcc slot.
        if !is_matroska(output) {
            cmd.arg("-vtag").arg(codec_tag);
        }
        let mut child = cmd
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| Error::Encode(format!("could not run {}: {e}", ffmpeg.display())))?;

        let stdin = child
            .stdin
            .take()
            .map(|input| BufWriter::with_capacity(frame_len(info), input))
            .ok_or_else(|| Error::Encode("ffmpeg stdin missing".to_string()))?;

        debug!(output = %output.display(), codec_tag, fps = info.fps, "encoder started");
        Ok(Self {
            output: output.to_path_buf(),
            child: Some(child),
            stdin: Some(stdin),
            width: info.width,
            height: info.height,
        })
    }
}

impl FrameSink for FfmpegEncoder {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(Error::Encode(format!(
                "frame is {}x{} but output is {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Error::Encode("encoder already finished".to_string()))?;
        stdin
            .write_all(frame.as_raw())
            .map_err(|e| Error::Encode(format!("ffmpeg stopped accepting frames: {e}")))
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin
                .flush()
                .map_err(|e| Error::Encode(format!("could not flush frames: {e}")))?;
        }
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child.wait()?;
        if !status.success() {
            return Err(Error::Encode(format!(
                "ffmpeg exited with {status} while writing {}",
                self.output.display()
            )));
        }
        Ok(())
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        self.stdin = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn is_matroska(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("mkv"))
}

fn frame_len(info: &VideoInfo) -> usize {
    info.width as usize * info.height as usize * 3
}
