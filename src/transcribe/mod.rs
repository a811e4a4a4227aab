use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_transcribe::types::{Media, MediaFormat, TranscriptionJobStatus};
use aws_sdk_transcribe::Client as TranscribeClient;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

use crate::backoff::BackoffPolicy;
use crate::storage::StagedAudio;
use crate::PipelineError;

/// One time-bounded unit of transcript text, the atomic unit of concurrent
/// revision. Immutable once produced; `index` defines canonical order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub index: usize,

    /// Start time in seconds
    pub start_time: f64,

    /// End time in seconds
    pub end_time: f64,

    /// Source-language text
    pub text: String,
}

/// Parsed transcription output
#[derive(Debug, Clone)]
pub struct Transcript {
    /// Segments in temporal order with sequential indices
    pub segments: Vec<TranscriptSegment>,

    /// Language code reported by the service (detected or as hinted)
    pub language_code: Option<String>,
}

/// Handle to a submitted remote transcription job
#[derive(Debug, Clone)]
pub struct TranscriptionJob {
    pub name: String,
}

/// Job state as reported by the transcription service. `Completed` and
/// `Failed` are terminal; the client never infers success without one.
#[derive(Debug, Clone)]
pub enum JobState {
    InProgress,
    Completed {
        transcript_uri: String,
        language_code: Option<String>,
    },
    Failed {
        reason: String,
    },
}

/// Job-based transcription service API
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    async fn start_job(
        &self,
        job_name: &str,
        media_uri: &str,
        media_format: &str,
        language: Option<&str>,
    ) -> Result<()>;

    async fn job_status(&self, job_name: &str) -> Result<JobState>;

    async fn fetch_transcript(&self, uri: &str) -> Result<String>;
}

/// AWS Transcribe implementation of the transcription backend
pub struct AwsTranscribeBackend {
    client: TranscribeClient,
}

impl AwsTranscribeBackend {
    pub fn new(client: TranscribeClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TranscriptionBackend for AwsTranscribeBackend {
    async fn start_job(
        &self,
        job_name: &str,
        media_uri: &str,
        media_format: &str,
        language: Option<&str>,
    ) -> Result<()> {
        let media = Media::builder().media_file_uri(media_uri).build();

        let mut job_builder = self
            .client
            .start_transcription_job()
            .transcription_job_name(job_name)
            .media_format(media_format.parse::<MediaFormat>()?)
            .media(media);

        if let Some(lang) = language {
            tracing::info!("Using specified language: {}", lang);
            job_builder = job_builder.language_code(lang.parse()?);
        } else {
            tracing::info!("Using automatic language detection");
            job_builder = job_builder.identify_language(true);
        }

        job_builder
            .send()
            .await
            .context("Failed to start transcription job")?;

        Ok(())
    }

    async fn job_status(&self, job_name: &str) -> Result<JobState> {
        let response = self
            .client
            .get_transcription_job()
            .transcription_job_name(job_name)
            .send()
            .await
            .context("Failed to get transcription job status")?;

        let job = response
            .transcription_job()
            .ok_or_else(|| anyhow::anyhow!("Transcription job not found"))?;

        let state = match job.transcription_job_status() {
            Some(TranscriptionJobStatus::Completed) => {
                let transcript_uri = job
                    .transcript()
                    .and_then(|t| t.transcript_file_uri())
                    .ok_or_else(|| anyhow::anyhow!("No transcript URI found"))?
                    .to_string();
                let language_code = job.language_code().map(|lc| lc.as_str().to_string());
                JobState::Completed {
                    transcript_uri,
                    language_code,
                }
            }
            Some(TranscriptionJobStatus::Failed) => JobState::Failed {
                reason: job.failure_reason().unwrap_or("Unknown error").to_string(),
            },
            _ => JobState::InProgress,
        };

        Ok(state)
    }

    async fn fetch_transcript(&self, uri: &str) -> Result<String> {
        let response = reqwest::get(uri).await.context("Failed to download transcript")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to download transcript: HTTP {}", response.status());
        }

        let content = response
            .text()
            .await
            .context("Failed to read transcript content")?;

        Ok(content)
    }
}

/// Transcript payload format produced by the transcription service.
///
/// Segment boundaries come from the service's own `audio_segments` utterance
/// structure; the client never re-segments.
#[derive(Debug, Deserialize)]
struct RawTranscript {
    results: RawResults,
}

#[derive(Debug, Deserialize)]
struct RawResults {
    #[serde(default)]
    audio_segments: Vec<RawAudioSegment>,
}

#[derive(Debug, Deserialize)]
struct RawAudioSegment {
    transcript: String,
    start_time: String,
    end_time: String,
}

/// Drives the lifecycle of one remote transcription job: submit, poll with
/// backoff until a terminal status, fetch and parse the transcript.
pub struct TranscriptionJobClient {
    backend: Arc<dyn TranscriptionBackend>,
    poll: BackoffPolicy,
    timeout: Duration,
}

impl TranscriptionJobClient {
    pub fn new(backend: Arc<dyn TranscriptionBackend>, poll: BackoffPolicy, timeout: Duration) -> Self {
        Self {
            backend,
            poll,
            timeout,
        }
    }

    /// Create the remote job referencing the staged audio object
    pub async fn submit(
        &self,
        staged: &StagedAudio,
        language_hint: Option<&str>,
    ) -> Result<TranscriptionJob> {
        let job_name = format!("videodoc_{}", Uuid::new_v4());

        tracing::info!("Starting transcription job: {}", job_name);

        self.backend
            .start_job(&job_name, &staged.uri, staged.media_format, language_hint)
            .await
            .map_err(|e| PipelineError::TranscriptionFailed(e.to_string()))?;

        Ok(TranscriptionJob { name: job_name })
    }

    /// Poll until the job reaches a terminal status, then fetch and parse the
    /// transcript into ordered segments.
    ///
    /// Yields [`PipelineError::TranscriptionTimeout`] when the configured
    /// deadline passes without a terminal status, and
    /// [`PipelineError::TranscriptionFailed`] when the service reports failure.
    pub async fn await_completion(&self, job: &TranscriptionJob) -> Result<Transcript> {
        let progress = ProgressBar::new_spinner();
        progress.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap(),
        );
        progress.set_message("Waiting for transcription job...");

        let start_time = std::time::Instant::now();
        let mut check_count: u32 = 0;

        let (transcript_uri, language_code) = loop {
            check_count += 1;

            let state = self
                .backend
                .job_status(&job.name)
                .await
                .map_err(|e| PipelineError::TranscriptionFailed(e.to_string()))?;

            match state {
                JobState::InProgress => {
                    if start_time.elapsed() >= self.timeout {
                        progress.finish_with_message("Transcription timed out");
                        return Err(PipelineError::TranscriptionTimeout(self.timeout.as_secs()).into());
                    }

                    progress.set_message(format!(
                        "Transcribing... ({}s elapsed, check #{})",
                        start_time.elapsed().as_secs(),
                        check_count
                    ));

                    sleep(self.poll.delay_for(check_count)).await;
                }
                JobState::Completed {
                    transcript_uri,
                    language_code,
                } => {
                    progress.finish_with_message("Transcription completed");
                    break (transcript_uri, language_code);
                }
                JobState::Failed { reason } => {
                    progress.finish_with_message("Transcription failed");
                    return Err(PipelineError::TranscriptionFailed(reason).into());
                }
            }
        };

        let payload = self
            .backend
            .fetch_transcript(&transcript_uri)
            .await
            .map_err(|e| PipelineError::TranscriptionFailed(e.to_string()))?;

        let segments = parse_transcript(&payload)
            .map_err(|e| PipelineError::TranscriptionFailed(e.to_string()))?;

        tracing::info!(
            "Transcription produced {} segments in {}",
            segments.len(),
            crate::utils::format_duration(start_time.elapsed().as_secs_f64())
        );

        Ok(Transcript {
            segments,
            language_code,
        })
    }
}

/// Parse the service's transcript payload into ordered segments, assigning
/// sequential indices in temporal order.
fn parse_transcript(payload: &str) -> Result<Vec<TranscriptSegment>> {
    let raw: RawTranscript =
        serde_json::from_str(payload).context("Failed to parse transcript JSON")?;

    let mut utterances: Vec<(f64, f64, String)> = raw
        .results
        .audio_segments
        .into_iter()
        .map(|seg| {
            let start = seg
                .start_time
                .parse::<f64>()
                .with_context(|| format!("Bad segment start time: {}", seg.start_time))?;
            let end = seg
                .end_time
                .parse::<f64>()
                .with_context(|| format!("Bad segment end time: {}", seg.end_time))?;
            Ok((start, end, seg.transcript))
        })
        .collect::<Result<_>>()?;

    utterances.sort_by(|a, b| a.0.total_cmp(&b.0));

    Ok(utterances
        .into_iter()
        .enumerate()
        .map(|(index, (start_time, end_time, text))| TranscriptSegment {
            index,
            start_time,
            end_time,
            text,
        })
        .collect())
}
