//! Media classification and output path conventions.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Video extensions, lowercase, without the dot.
pub const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "avi", "mov", "mkv"];

/// Still image extensions, lowercase, without the dot.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "gif"];

/// Suffix appended to the stem of processed outputs.
pub const OUTPUT_SUFFIX: &str = "_unmasked";

/// Name of the directory holding verbatim source frames.
pub const ORIGINAL_FRAMES_DIR: &str = "original_frames";

/// Name of the directory holding inpainted frames.
pub const PROCESSED_FRAMES_DIR: &str = "unmasked_frames";

/// Whether a path names a still image or a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// A still image.
    Image,
    /// A video container.
    Video,
}

/// A classified input path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaInput {
    path: PathBuf,
    kind: MediaKind,
}

impl MediaInput {
    /// Check that `path` exists and classify it by extension.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PathNotFound`] if the path does not exist and
    /// [`Error::Classification`] if its extension is neither image nor video.
    pub fn classify(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::PathNotFound(path.to_path_buf()));
        }
        let kind = kind_of(path).ok_or_else(|| Error::Classification(path.to_path_buf()))?;
        Ok(Self {
            path: path.to_path_buf(),
            kind,
        })
    }

    /// The input path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The classified kind.
    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.kind
    }
}

/// Classify by extension only (case-insensitive); no content sniffing.
#[must_use]
pub fn kind_of(path: &Path) -> Option<MediaKind> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Video)
    } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Image)
    } else {
        None
    }
}

/// Check if a file has a supported image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    kind_of(path) == Some(MediaKind::Image)
}

/// Check if a file has a supported video extension.
#[must_use]
pub fn is_supported_video(path: &Path) -> bool {
    kind_of(path) == Some(MediaKind::Video)
}

/// Generate the processed output path for an input.
///
/// Example: `"clip.mp4"` becomes `"clip_unmasked.mp4"`.
#[must_use]
pub fn default_output_path(input: &Path) -> PathBuf {
    sibling_with_suffix(input, OUTPUT_SUFFIX)
}

/// `<dir>/<stem><suffix>.<ext>` next to `input`.
#[must_use]
pub fn sibling_with_suffix(input: &Path, suffix: &str) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let parent = input.parent().unwrap_or(Path::new("."));
    match input.extension() {
        Some(ext) => parent.join(format!("{stem}{suffix}.{}", ext.to_string_lossy())),
        None => parent.join(format!("{stem}{suffix}")),
    }
}

/// On-disk layout of the frame dumps for one video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameDumpDirs {
    /// `<dir>/<stem>_frames`.
    pub root: PathBuf,
    /// Verbatim decoded frames.
    pub original: PathBuf,
    /// Successfully inpainted frames.
    pub processed: PathBuf,
}

impl FrameDumpDirs {
    /// Layout for `video`, without touching the file system.
    #[must_use]
    pub fn for_video(video: &Path) -> Self {
        let stem = video.file_stem().unwrap_or_default().to_string_lossy();
        let parent = video.parent().unwrap_or(Path::new("."));
        let root = parent.join(format!("{stem}_frames"));
        Self {
            original: root.join(ORIGINAL_FRAMES_DIR),
            processed: root.join(PROCESSED_FRAMES_DIR),
            root,
        }
    }

    /// Create both dump directories.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if a directory cannot be created.
    pub fn create(&self) -> Result<()> {
        std::fs::create_dir_all(&self.original)?;
        std::fs::create_dir_all(&self.processed)?;
        Ok(())
    }

    /// `frame_{index:05}.jpg` inside `dir`.
    #[must_use]
    pub fn frame_file(dir: &Path, index: u64) -> PathBuf {
        dir.join(format!("frame_{index:05}.jpg"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_of_is_case_insensitive() {
        assert_eq!(kind_of(Path::new("clip.MP4")), Some(MediaKind::Video));
        assert_eq!(kind_of(Path::new("clip.mkv")), Some(MediaKind::Video));
        assert_eq!(kind_of(Path::new("photo.JPeG")), Some(MediaKind::Image));
        assert_eq!(kind_of(Path::new("anim.gif")), Some(MediaKind::Image));
        assert_eq!(kind_of(Path::new("notes.txt")), None);
        assert_eq!(kind_of(Path::new("noext")), None);
        assert!(is_supported_image(Path::new("a.bmp")));
        assert!(is_supported_video(Path::new("a.mov")));
        assert!(!is_supported_video(Path::new("a.webm")));
    }

    #[test]
    fn classify_requires_existing_path() {
        let err = MediaInput::classify(Path::new("/no/such/clip.mp4")).unwrap_err();
        assert!(matches!(err, Error::PathNotFound(_)));
    }

    #[test]
    fn classify_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readme.txt");
        std::fs::write(&path, b"hi").unwrap();
        assert!(matches!(
            MediaInput::classify(&path),
            Err(Error::Classification(_))
        ));

        let clip = dir.path().join("clip.AVI");
        std::fs::write(&clip, b"not really a video").unwrap();
        let input = MediaInput::classify(&clip).unwrap();
        assert_eq!(input.kind(), MediaKind::Video);
    }

    #[test]
    fn default_output_path_appends_unmasked_suffix() {
        let p = default_output_path(Path::new("/tmp/my.photos/photo.jpg"));
        assert_eq!(p, PathBuf::from("/tmp/my.photos/photo_unmasked.jpg"));

        let p = default_output_path(Path::new("clip.mp4"));
        assert_eq!(p.file_name().unwrap().to_str().unwrap(), "clip_unmasked.mp4");
    }

    #[test]
    fn frame_dump_layout() {
        let dirs = FrameDumpDirs::for_video(Path::new("/videos/intro.mp4"));
        assert_eq!(dirs.root, PathBuf::from("/videos/intro_frames"));
        assert_eq!(
            dirs.original,
            PathBuf::from("/videos/intro_frames/original_frames")
        );
        assert_eq!(
            dirs.processed,
            PathBuf::from("/videos/intro_frames/unmasked_frames")
        );
        assert_eq!(
            FrameDumpDirs::frame_file(&dirs.original, 7),
            PathBuf::from("/videos/intro_frames/original_frames/frame_00007.jpg")
        );
    }
}
