use anyhow::{Context, Result};
use aws_sdk_bedrockruntime::Client as BedrockClient;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_transcribe::Client as TranscribeClient;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use crate::assemble::{Document, DocumentAssembler, DocumentMetadata};
use crate::config::Config;
use crate::extractor::{FfmpegExtractor, MediaExtractor};
use crate::revise::{BedrockModel, RevisionModel, SegmentRevisionPipeline};
use crate::storage::{ObjectStore, S3ObjectStore, StorageLifecycleManager};
use crate::transcribe::{AwsTranscribeBackend, TranscriptionBackend, TranscriptionJobClient};
use crate::utils;

/// Immutable description of the input video, owned by the caller
#[derive(Debug, Clone)]
pub struct SourceVideo {
    /// Path to the video file
    pub path: PathBuf,

    /// Document title
    pub title: String,

    /// Target language code for the document
    pub target_language: String,

    /// Optional source language hint for transcription
    pub language_hint: Option<String>,
}

/// Main document pipeline: extract → stage → transcribe → revise → assemble.
///
/// All derived entities (audio artifact, staged object, transcription job,
/// segments, document) are owned by a single run and never shared across
/// concurrent runs.
pub struct DocumentPipeline {
    config: Config,
    extractor: Arc<dyn MediaExtractor>,
    store: Arc<dyn ObjectStore>,
    transcriber: Arc<dyn TranscriptionBackend>,
    model: Arc<dyn RevisionModel>,
    temp_dir: TempDir,
}

impl DocumentPipeline {
    /// Create a pipeline wired to the AWS implementations
    pub async fn new(config: Config) -> Result<Self> {
        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(config.aws_region())
            .load()
            .await;

        let s3_client = S3Client::new(&aws_config);
        let transcribe_client = TranscribeClient::new(&aws_config);
        let bedrock_client = BedrockClient::new(&aws_config);

        let store = Arc::new(S3ObjectStore::new(s3_client, config.aws.s3_bucket.clone()));
        let transcriber = Arc::new(AwsTranscribeBackend::new(transcribe_client));
        let model = Arc::new(BedrockModel::new(
            bedrock_client,
            config.transcript_revisor.revise.max_tokens,
        ));

        Self::with_components(config, Arc::new(FfmpegExtractor::new()), store, transcriber, model)
    }

    /// Create a pipeline from explicit component implementations
    pub fn with_components(
        config: Config,
        extractor: Arc<dyn MediaExtractor>,
        store: Arc<dyn ObjectStore>,
        transcriber: Arc<dyn TranscriptionBackend>,
        model: Arc<dyn RevisionModel>,
    ) -> Result<Self> {
        let temp_dir = match &config.app.temp_dir {
            Some(dir) => {
                fs_err::create_dir_all(dir)?;
                TempDir::new_in(dir)
            }
            None => TempDir::new(),
        }
        .context("Failed to create temporary directory")?;

        Ok(Self {
            config,
            extractor,
            store,
            transcriber,
            model,
            temp_dir,
        })
    }

    /// Run the full pipeline for one video, producing the document model.
    ///
    /// The staged audio object is released on every exit path of the
    /// transcription phase, success or failure.
    pub async fn run(&self, source: &SourceVideo) -> Result<Document> {
        let start_time = std::time::Instant::now();
        tracing::info!(
            "Starting document generation for {} (target language: {})",
            source.path.display(),
            source.target_language
        );

        let artifact = self.extractor.extract(&source.path, self.temp_dir.path()).await?;

        if self.config.app.keep_audio {
            self.preserve_audio(&artifact.path, &source.title)?;
        }

        let storage = StorageLifecycleManager::new(
            self.store.clone(),
            self.config.aws.s3_bucket.clone(),
            self.config.aws.s3_key_prefix.clone(),
        );

        let client = TranscriptionJobClient::new(
            self.transcriber.clone(),
            self.config.aws.transcription.poll.clone(),
            Duration::from_secs(self.config.aws.transcription.timeout_secs),
        );

        let language_hint = source
            .language_hint
            .as_deref()
            .or(self.config.aws.transcription.default_language.as_deref())
            .map(utils::normalize_language_code);

        let staged = storage.stage(&artifact).await?;
        let transcript_result = async {
            let job = client.submit(&staged, language_hint.as_deref()).await?;
            client.await_completion(&job).await
        }
        .await;
        // The staging/release pair is one transactional unit: the delete is
        // attempted whether transcription succeeded, failed, or timed out.
        storage.release(staged).await;
        let transcript = transcript_result?;

        let source_language = transcript.language_code.clone().or(language_hint);

        let revision = SegmentRevisionPipeline::new(
            self.model.clone(),
            self.config.transcript_revisor.revise.model_id.clone(),
            self.config.transcript_revisor.revise.max_workers,
            self.config.transcript_revisor.revise.retry.clone(),
        );
        let revised = revision
            .revise_all(
                &transcript.segments,
                source_language.as_deref(),
                &source.target_language,
            )
            .await;

        let metadata = DocumentMetadata {
            title: source.title.clone(),
            source: source.path.display().to_string(),
            source_language,
            target_language: source.target_language.clone(),
            generated_at: chrono::Utc::now(),
        };
        let document = DocumentAssembler::assemble(metadata, revised)?;

        if document.failed_segment_count() > 0 {
            tracing::warn!(
                "Document contains {} unavailable segment(s)",
                document.failed_segment_count()
            );
        }

        tracing::info!(
            "Document generation completed in {}",
            utils::format_duration(start_time.elapsed().as_secs_f64())
        );

        Ok(document)
    }

    /// Copy the extracted audio next to the working directory for the user
    fn preserve_audio(&self, audio_path: &std::path::Path, title: &str) -> Result<()> {
        let filename = format!(
            "{}.{}",
            utils::sanitize_filename(title),
            audio_path.extension().and_then(|e| e.to_str()).unwrap_or("mp3")
        );
        let target = std::env::current_dir()?.join(filename);
        fs_err::copy(audio_path, &target)?;
        tracing::info!("Extracted audio kept at {}", target.display());
        Ok(())
    }
}
