use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::process::Command;

use crate::PipelineError;

/// Audio track extracted from a source video, owned by a single pipeline run
#[derive(Debug, Clone)]
pub struct AudioArtifact {
    /// Path to the extracted audio file
    pub path: PathBuf,

    /// Audio container format
    pub format: AudioFormat,

    /// Duration in seconds if the probe reported one
    pub duration: Option<f64>,
}

/// Audio formats accepted by the transcription service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    M4a,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
        }
    }

    /// Get MIME type for the format
    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::M4a => "audio/mp4",
        }
    }

    /// Media format identifier used by the transcription service
    pub fn media_format(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "mp4",
        }
    }
}

/// Trait for pulling the audio track out of a source video.
///
/// One blocking operation per run; no concurrency. Fails with
/// [`PipelineError::Extraction`] if the source is unreadable or contains no
/// audio stream.
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Extract the audio track of `video` into `work_dir`
    async fn extract(&self, video: &Path, work_dir: &Path) -> Result<AudioArtifact>;
}

/// ffprobe/ffmpeg-backed extractor
pub struct FfmpegExtractor;

impl FfmpegExtractor {
    pub fn new() -> Self {
        Self
    }

    async fn try_extract(&self, video: &Path, work_dir: &Path) -> Result<AudioArtifact> {
        self.validate_file(video).await?;

        let duration = self.probe_audio(video).await?;

        // Pure audio inputs in accepted formats are passed through unchanged;
        // everything else has its audio track extracted to MP3.
        let source_format = Self::format_from_extension(video);
        let artifact = match source_format {
            Some(format) => {
                let target = work_dir.join(format!("audio.{}", format.as_str()));
                fs::copy(video, &target).await?;
                AudioArtifact {
                    path: target,
                    format,
                    duration,
                }
            }
            None => {
                let target = work_dir.join("audio.mp3");
                self.convert_to_mp3(video, &target).await?;
                AudioArtifact {
                    path: target,
                    format: AudioFormat::Mp3,
                    duration,
                }
            }
        };

        tracing::info!(
            "Extracted audio track to {} ({})",
            artifact.path.display(),
            artifact.format.as_str()
        );

        Ok(artifact)
    }

    /// Check if the file exists and is accessible
    async fn validate_file(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            anyhow::bail!("File does not exist: {}", path.display());
        }

        if !path.is_file() {
            anyhow::bail!("Path is not a file: {}", path.display());
        }

        match fs::metadata(path).await {
            Ok(metadata) => {
                if metadata.len() == 0 {
                    anyhow::bail!("File is empty: {}", path.display());
                }
            }
            Err(e) => {
                anyhow::bail!("Cannot access file {}: {}", path.display(), e);
            }
        }

        Ok(())
    }

    /// Probe the file with ffprobe, confirming an audio stream and reading duration
    async fn probe_audio(&self, path: &Path) -> Result<Option<f64>> {
        let output = Command::new("ffprobe")
            .args([
                "-v", "quiet",
                "-print_format", "json",
                "-show_format",
                "-show_streams",
                &path.to_string_lossy(),
            ])
            .output()
            .await?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Failed to analyze file with ffprobe: {}", error);
        }

        let info: serde_json::Value = serde_json::from_slice(&output.stdout)?;

        let duration = info["format"]["duration"]
            .as_str()
            .and_then(|d| d.parse::<f64>().ok());

        let empty_vec = vec![];
        let streams = info["streams"].as_array().unwrap_or(&empty_vec);
        let has_audio = streams
            .iter()
            .any(|stream| stream["codec_type"].as_str() == Some("audio"));

        if !has_audio {
            anyhow::bail!("File does not contain any audio streams: {}", path.display());
        }

        Ok(duration)
    }

    /// Extract the audio track to MP3 using ffmpeg
    async fn convert_to_mp3(&self, source_path: &Path, target_path: &Path) -> Result<()> {
        tracing::debug!("Extracting audio: {} -> {}", source_path.display(), target_path.display());

        let output = Command::new("ffmpeg")
            .args([
                "-i", &source_path.to_string_lossy(),
                "-vn", // No video
                "-acodec", "mp3",
                "-ab", "128k", // Good quality for transcription
                "-ar", "44100", // Standard sample rate
                "-y", // Overwrite output file
                &target_path.to_string_lossy(),
            ])
            .output()
            .await?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Failed to extract audio with ffmpeg: {}", error);
        }

        Ok(())
    }

    /// Pass-through format for inputs that are already acceptable audio files
    fn format_from_extension(path: &Path) -> Option<AudioFormat> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) => match ext.to_lowercase().as_str() {
                "mp3" => Some(AudioFormat::Mp3),
                "m4a" | "aac" => Some(AudioFormat::M4a),
                _ => None,
            },
            None => None,
        }
    }
}

#[async_trait]
impl MediaExtractor for FfmpegExtractor {
    async fn extract(&self, video: &Path, work_dir: &Path) -> Result<AudioArtifact> {
        self.try_extract(video, work_dir)
            .await
            .map_err(|e| PipelineError::Extraction(e.to_string()).into())
    }
}

impl Default for FfmpegExtractor {
    fn default() -> Self {
        Self::new()
    }
}
