//! Media extractor
//!
//! Converts a video container into the mono 16 kHz wav the transcription
//! backend expects, via an ffmpeg subprocess. The extracted artifact lives in
//! a temp file that is removed when the guard drops, on every exit path.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tempfile::TempPath;

use crate::error::AudioExtractionError;

/// Container formats the pipeline accepts
pub const SUPPORTED_VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "avi", "mov", "mkv", "wmv"];

/// Whether a path carries one of the supported video extensions
pub fn is_supported_format(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            SUPPORTED_VIDEO_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// Scoped handle to an extracted audio file
///
/// The underlying temp file is deleted when this drops.
#[derive(Debug)]
pub struct ExtractedAudio {
    path: TempPath,
}

impl ExtractedAudio {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn from_temp_path(path: TempPath) -> Self {
        Self { path }
    }
}

/// Extraction seam used by the pipeline
pub trait AudioExtractor: Send + Sync {
    fn extract(&self, video_path: &Path) -> Result<ExtractedAudio, AudioExtractionError>;
}

/// Production extractor shelling out to ffmpeg
pub struct FfmpegExtractor;

impl AudioExtractor for FfmpegExtractor {
    fn extract(&self, video_path: &Path) -> Result<ExtractedAudio, AudioExtractionError> {
        extract_audio(video_path)
    }
}

/// Extract the audio track of a video file to a temporary wav file
///
/// Unsupported extensions are rejected before ffmpeg is even looked up.
pub fn extract_audio(video_path: &Path) -> Result<ExtractedAudio, AudioExtractionError> {
    if !is_supported_format(video_path) {
        return Err(AudioExtractionError::UnsupportedFormat(
            video_path.to_path_buf(),
        ));
    }

    if !video_path.exists() {
        return Err(AudioExtractionError::SourceMissing(video_path.to_path_buf()));
    }

    let ffmpeg_path =
        which::which("ffmpeg").map_err(|_| AudioExtractionError::FfmpegMissing)?;

    let temp = tempfile::Builder::new()
        .prefix("vidscribe-audio-")
        .suffix(".wav")
        .tempfile()
        .map_err(|e| AudioExtractionError::TempFile(e.to_string()))?;
    let audio_path = temp.into_temp_path();

    log::debug!(
        "Extracting audio from {} with ffmpeg at {:?}",
        video_path.display(),
        ffmpeg_path
    );

    // 16 kHz mono s16le wav, no video stream
    let output = Command::new(&ffmpeg_path)
        .arg("-i")
        .arg(video_path)
        .args(["-vn", "-ac", "1", "-ar", "16000", "-acodec", "pcm_s16le", "-y"])
        .arg(&audio_path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| AudioExtractionError::FfmpegFailed {
            path: video_path.to_path_buf(),
            detail: e.to_string(),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        // Last stderr line is usually the actual cause
        let detail = stderr
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("ffmpeg exited with an error")
            .to_string();
        return Err(AudioExtractionError::FfmpegFailed {
            path: video_path.to_path_buf(),
            detail,
        });
    }

    // A wav with no samples is just a 44-byte header
    let len = std::fs::metadata(&audio_path).map(|m| m.len()).unwrap_or(0);
    if len <= 44 {
        return Err(AudioExtractionError::EmptyOutput(video_path.to_path_buf()));
    }

    log::info!(
        "Extracted {} bytes of audio from {}",
        len,
        video_path.display()
    );

    Ok(ExtractedAudio { path: audio_path })
}

/// Expand one input to the batch files it contributes
///
/// A directory yields its immediate supported-extension children sorted by
/// name; non-video entries are skipped without error. A plain file passes
/// through untouched, supported or not, so the pipeline can report it.
pub fn expand_input(input: &Path) -> std::io::Result<Vec<PathBuf>> {
    if !input.is_dir() {
        return Ok(vec![input.to_path_buf()]);
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(input)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && is_supported_format(p))
        .collect();

    // Deterministic ordering, not filesystem-iteration order
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_supported_formats() {
        for name in ["a.mp4", "b.AVI", "c.mov", "d.mkv", "e.wmv"] {
            assert!(is_supported_format(Path::new(name)), "{}", name);
        }
        for name in ["notes.txt", "a.mp3", "b.wav", "noext", "c.mp4.bak"] {
            assert!(!is_supported_format(Path::new(name)), "{}", name);
        }
    }

    #[test]
    fn test_unsupported_rejected_before_ffmpeg() {
        // Does not exist either, but the extension check must win
        let err = extract_audio(Path::new("/nonexistent/talk.txt")).unwrap_err();
        assert!(matches!(err, AudioExtractionError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_missing_source() {
        let err = extract_audio(Path::new("/nonexistent/talk.mp4")).unwrap_err();
        assert!(matches!(err, AudioExtractionError::SourceMissing(_)));
    }

    #[test]
    fn test_expand_directory_filters_and_sorts() {
        let dir = tempdir().unwrap();
        for name in ["interview2.mov", "notes.txt", "interview1.mp4"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        // Nested directories are not recursed into
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/deep.mp4"), b"x").unwrap();

        let files = expand_input(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["interview1.mp4", "interview2.mov"]);
    }

    #[test]
    fn test_expand_plain_file_passes_through() {
        let files = expand_input(Path::new("talk.mp4")).unwrap();
        assert_eq!(files, vec![PathBuf::from("talk.mp4")]);
    }
}
