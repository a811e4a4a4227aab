use anyhow::{Context, Result};
use aws_config::Region;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::backoff::BackoffPolicy;

/// Immutable run configuration, read once at startup and passed to each
/// component; never accessed as ambient state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// AWS configuration
    pub aws: AwsConfig,

    /// Transcript revision stage settings
    pub transcript_revisor: RevisorConfig,

    /// Application settings
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    /// AWS region
    pub region: String,

    /// S3 bucket for temporary audio storage
    pub s3_bucket: String,

    /// Optional S3 key prefix
    pub s3_key_prefix: Option<String>,

    /// Transcription job settings
    pub transcription: TranscriptionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Default language code (auto-detect if not specified)
    pub default_language: Option<String>,

    /// Overall ceiling for waiting on a transcription job, in seconds
    pub timeout_secs: u64,

    /// Polling backoff between job status checks
    pub poll: BackoffPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisorConfig {
    /// Settings for the revise/translate stage
    pub revise: ReviseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviseConfig {
    /// Worker-pool size bounding concurrent model calls
    pub max_workers: usize,

    /// Remote model identifier for segment revision
    pub model_id: String,

    /// Maximum tokens the model may generate per segment
    pub max_tokens: u32,

    /// Retry backoff for transient per-segment failures
    pub retry: BackoffPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Temporary directory for intermediate audio files
    pub temp_dir: Option<PathBuf>,

    /// Keep the extracted audio file after the run
    pub keep_audio: bool,

    /// Default output format
    pub default_output_format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            aws: AwsConfig {
                region: "us-east-1".to_string(),
                s3_bucket: "".to_string(),
                s3_key_prefix: Some("videodoc/".to_string()),
                transcription: TranscriptionConfig {
                    default_language: None,
                    timeout_secs: 1800,
                    poll: BackoffPolicy {
                        max_attempts: u32::MAX,
                        base_delay_ms: 5_000,
                        multiplier: 1.5,
                        max_delay_ms: 30_000,
                    },
                },
            },
            transcript_revisor: RevisorConfig {
                revise: ReviseConfig {
                    max_workers: 4,
                    model_id: "us.anthropic.claude-3-7-sonnet-20250219-v1:0".to_string(),
                    max_tokens: 4000,
                    retry: BackoffPolicy::default(),
                },
            },
            app: AppConfig {
                temp_dir: None,
                keep_audio: false,
                default_output_format: "pdf".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            let config: Config = serde_yaml::from_str(&content)
                .context("Failed to parse config file")?;

            config.validate()?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save().await?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(&config_path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("videodoc").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.aws.s3_bucket.is_empty() {
            anyhow::bail!("AWS S3 bucket must be configured");
        }

        if self.transcript_revisor.revise.max_workers == 0 {
            anyhow::bail!("transcript_revisor.revise.max_workers must be at least 1");
        }

        if self.transcript_revisor.revise.model_id.is_empty() {
            anyhow::bail!("transcript_revisor.revise.model_id must be configured");
        }

        Region::new(self.aws.region.clone());

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  AWS Region: {}", self.aws.region);
        println!("  S3 Bucket: {}", self.aws.s3_bucket);
        if let Some(prefix) = &self.aws.s3_key_prefix {
            println!("  S3 Prefix: {}", prefix);
        }
        println!("  Transcription Timeout: {}s", self.aws.transcription.timeout_secs);
        println!("  Revision Workers: {}", self.transcript_revisor.revise.max_workers);
        println!("  Revision Model: {}", self.transcript_revisor.revise.model_id);
        println!("  Keep Audio: {}", self.app.keep_audio);
        println!("  Default Format: {}", self.app.default_output_format);
    }

    /// Get AWS region
    pub fn aws_region(&self) -> Region {
        Region::new(self.aws.region.clone())
    }
}
