//! Videodoc - turns recorded presentation videos into translated, readable documents
//!
//! This library extracts the audio track from a video, transcribes it with AWS
//! Transcribe, revises and translates the transcript segment-by-segment with a
//! Bedrock model under bounded parallelism, and assembles the results into a
//! paginated document.

pub mod assemble;
pub mod backoff;
pub mod cli;
pub mod config;
pub mod extractor;
pub mod pipeline;
pub mod render;
pub mod revise;
pub mod storage;
pub mod transcribe;
pub mod utils;

pub use assemble::{Document, DocumentAssembler, DocumentMetadata};
pub use backoff::BackoffPolicy;
pub use cli::{Cli, Commands, OutputFormat};
pub use config::Config;
pub use extractor::{AudioArtifact, FfmpegExtractor, MediaExtractor};
pub use pipeline::{DocumentPipeline, SourceVideo};
pub use revise::{RevisedSegment, RevisionStatus, SegmentRevisionPipeline};
pub use transcribe::{TranscriptSegment, TranscriptionJobClient};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Fatal stage errors; each aborts the run and names the stage that failed.
///
/// Per-segment revision failures and staged-object delete failures are
/// recovered locally and never surface through this enum.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("Audio extraction failed: {0}")]
    Extraction(String),

    #[error("Staging upload failed: {0}")]
    Staging(String),

    #[error("Transcription job did not reach a terminal status within {0} seconds")]
    TranscriptionTimeout(u64),

    #[error("Transcription job failed: {0}")]
    TranscriptionFailed(String),

    #[error("Document rendering failed: {0}")]
    Render(String),
}
