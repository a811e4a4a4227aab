use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::sleep;

use crate::backoff::BackoffPolicy;
use crate::transcribe::TranscriptSegment;

pub mod bedrock;
pub mod prompt;

pub use bedrock::BedrockModel;

/// Error from one remote model invocation.
///
/// Transient failures (rate limiting, timeouts, transient service errors) are
/// retried with backoff; permanent failures (malformed input, content policy
/// rejection) are not.
#[derive(thiserror::Error, Debug, Clone)]
pub enum RevisionCallError {
    #[error("transient model failure: {0}")]
    Transient(String),

    #[error("permanent model failure: {0}")]
    Permanent(String),
}

/// Request/response seam to the generative-language service
#[async_trait]
pub trait RevisionModel: Send + Sync {
    async fn invoke(&self, model_id: &str, prompt: &str) -> Result<String, RevisionCallError>;
}

/// Outcome of revising one segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RevisionStatus {
    Ok,
    Failed { error: String },
}

/// A transcript segment after revision/translation, tagged with the index of
/// its source segment. Produced exactly once per source segment, in any
/// completion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisedSegment {
    pub index: usize,

    /// Start time of the source segment in seconds
    pub start_time: f64,

    /// End time of the source segment in seconds
    pub end_time: f64,

    /// Source-language text as transcribed
    pub source_text: String,

    /// Target-language text; empty when revision failed
    pub text: String,

    pub status: RevisionStatus,
}

impl RevisedSegment {
    pub fn is_ok(&self) -> bool {
        self.status == RevisionStatus::Ok
    }

    fn ok(segment: &TranscriptSegment, text: String) -> Self {
        Self {
            index: segment.index,
            start_time: segment.start_time,
            end_time: segment.end_time,
            source_text: segment.text.clone(),
            text,
            status: RevisionStatus::Ok,
        }
    }

    fn failed(segment: &TranscriptSegment, error: String) -> Self {
        Self {
            index: segment.index,
            start_time: segment.start_time,
            end_time: segment.end_time,
            source_text: segment.text.clone(),
            text: String::new(),
            status: RevisionStatus::Failed { error },
        }
    }
}

/// Distributes transcript segments across a bounded worker pool, revising each
/// one with a remote model call while preserving the original segment order.
///
/// Work items are independent; index tagging exists purely so the results can
/// be reassembled after non-deterministic completion. One segment's permanent
/// failure never aborts the run.
pub struct SegmentRevisionPipeline {
    model: Arc<dyn RevisionModel>,
    model_id: String,
    max_workers: usize,
    retry: BackoffPolicy,
}

impl SegmentRevisionPipeline {
    pub fn new(
        model: Arc<dyn RevisionModel>,
        model_id: impl Into<String>,
        max_workers: usize,
        retry: BackoffPolicy,
    ) -> Self {
        Self {
            model,
            model_id: model_id.into(),
            max_workers: max_workers.max(1),
            retry,
        }
    }

    /// Revise every segment, returning exactly one result per input index,
    /// sorted by index. Never fails as a whole; failed segments carry
    /// [`RevisionStatus::Failed`].
    pub async fn revise_all(
        &self,
        segments: &[TranscriptSegment],
        source_language: Option<&str>,
        target_language: &str,
    ) -> Vec<RevisedSegment> {
        if segments.is_empty() {
            return Vec::new();
        }

        let total = segments.len();
        tracing::info!(
            "Processing {} segments with {} parallel workers",
            total,
            self.max_workers
        );

        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let progress = ProgressBar::new(total as u64);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} segments")
                .unwrap(),
        );

        let mut results: Vec<RevisedSegment> = stream::iter(segments.iter().cloned())
            .map(|segment| {
                let semaphore = semaphore.clone();
                let progress = progress.clone();
                let model = self.model.clone();
                let model_id = self.model_id.clone();
                let retry = self.retry.clone();
                let source_language = source_language.map(str::to_string);
                let target_language = target_language.to_string();

                async move {
                    let _permit = semaphore.acquire().await.unwrap();

                    let revised = revise_one(
                        model,
                        &model_id,
                        &retry,
                        &segment,
                        source_language.as_deref(),
                        &target_language,
                    )
                    .await;

                    progress.inc(1);
                    revised
                }
            })
            .buffer_unordered(self.max_workers)
            .collect()
            .await;

        progress.finish_and_clear();

        // Completion order is non-deterministic under concurrency; canonical
        // order is restored here, never assumed upstream.
        results.sort_by_key(|revised| revised.index);
        results
    }
}

/// Revise a single segment, retrying transient failures with backoff scoped to
/// this item only. Returns a terminal result in every case.
async fn revise_one(
    model: Arc<dyn RevisionModel>,
    model_id: &str,
    retry: &BackoffPolicy,
    segment: &TranscriptSegment,
    source_language: Option<&str>,
    target_language: &str,
) -> RevisedSegment {
    // Nothing to revise; skip the remote call
    if segment.text.trim().is_empty() {
        return RevisedSegment::ok(segment, String::new());
    }

    let prompt = prompt::build_revision_prompt(&segment.text, source_language, target_language);

    let mut attempt: u32 = 0;
    loop {
        attempt += 1;

        let error = match model.invoke(model_id, &prompt).await {
            Ok(response) => match prompt::extract_result(&response) {
                Ok(text) => {
                    tracing::debug!("Segment {}: revision completed", segment.index);
                    return RevisedSegment::ok(segment, text);
                }
                // A malformed response may come right on retry
                Err(e) => RevisionCallError::Transient(e.to_string()),
            },
            Err(e) => e,
        };

        match error {
            RevisionCallError::Permanent(message) => {
                tracing::error!("Segment {}: permanent revision failure: {}", segment.index, message);
                return RevisedSegment::failed(segment, message);
            }
            RevisionCallError::Transient(message) => {
                if retry.should_retry(attempt) {
                    tracing::warn!(
                        "Segment {}: revision attempt {}/{} failed, retrying: {}",
                        segment.index,
                        attempt,
                        retry.max_attempts,
                        message
                    );
                    sleep(retry.delay_for(attempt)).await;
                } else {
                    tracing::error!(
                        "Segment {}: all {} revision attempts failed: {}",
                        segment.index,
                        retry.max_attempts,
                        message
                    );
                    return RevisedSegment::failed(segment, message);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Behavior of the scripted model, per invocation
    #[derive(Clone, Copy)]
    enum MockBehavior {
        /// Always succeeds, sleeping so higher indices finish first
        WorkingReversed,
        /// Fails transiently until a call sees `succeed_after` prior failures
        FlakyPerSegment { succeed_after: u32 },
        /// Permanently rejects segments whose text contains the marker
        RejectMarked,
        /// Always fails transiently
        AlwaysTransient,
    }

    struct MockModel {
        behavior: MockBehavior,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        failures_per_prompt: std::sync::Mutex<std::collections::HashMap<String, u32>>,
    }

    impl MockModel {
        fn new(behavior: MockBehavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                failures_per_prompt: std::sync::Mutex::new(std::collections::HashMap::new()),
            })
        }

        fn segment_text(prompt: &str) -> String {
            // The prompt embeds the segment between transcript tags. The prose
            // preamble also mentions `<transcript>`, so anchor on the closing
            // tag (which appears only around the real block) and take the text
            // after the last opening tag before it.
            prompt
                .split("</transcript>")
                .next()
                .and_then(|head| head.rsplit("<transcript>").next())
                .unwrap_or("")
                .trim()
                .to_string()
        }
    }

    #[async_trait]
    impl RevisionModel for MockModel {
        async fn invoke(&self, _model_id: &str, prompt: &str) -> Result<String, RevisionCallError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);

            let text = Self::segment_text(prompt);
            let result = match self.behavior {
                MockBehavior::WorkingReversed => {
                    // Later indices sleep less, inverting completion order
                    let index: u64 = text
                        .chars()
                        .filter(|c| c.is_ascii_digit())
                        .collect::<String>()
                        .parse()
                        .unwrap_or(0);
                    sleep(Duration::from_millis(40u64.saturating_sub(index * 5))).await;
                    Ok(format!("<result>[fr] {}</result>", text))
                }
                MockBehavior::FlakyPerSegment { succeed_after } => {
                    let mut failures = self.failures_per_prompt.lock().unwrap();
                    let count = failures.entry(text.clone()).or_insert(0);
                    if *count < succeed_after {
                        *count += 1;
                        Err(RevisionCallError::Transient("rate limited".to_string()))
                    } else {
                        Ok(format!("<result>[fr] {}</result>", text))
                    }
                }
                MockBehavior::RejectMarked => {
                    if text.contains("REJECT") {
                        Err(RevisionCallError::Permanent("content policy rejection".to_string()))
                    } else {
                        Ok(format!("<result>[fr] {}</result>", text))
                    }
                }
                MockBehavior::AlwaysTransient => {
                    Err(RevisionCallError::Transient("service unavailable".to_string()))
                }
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    fn segments(texts: &[&str]) -> Vec<TranscriptSegment> {
        texts
            .iter()
            .enumerate()
            .map(|(index, text)| TranscriptSegment {
                index,
                start_time: index as f64 * 2.0,
                end_time: index as f64 * 2.0 + 1.5,
                text: text.to_string(),
            })
            .collect()
    }

    fn fast_retry(max_attempts: u32) -> BackoffPolicy {
        BackoffPolicy {
            max_attempts,
            base_delay_ms: 1,
            multiplier: 1.0,
            max_delay_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_results_keep_canonical_order_despite_completion_order() {
        let model = MockModel::new(MockBehavior::WorkingReversed);
        let pipeline = SegmentRevisionPipeline::new(model.clone(), "test-model", 3, fast_retry(1));

        let input = segments(&[
            "segment 0", "segment 1", "segment 2", "segment 3", "segment 4", "segment 5",
        ]);
        let revised = pipeline.revise_all(&input, Some("en"), "fr").await;

        assert_eq!(revised.len(), 6);
        for (i, seg) in revised.iter().enumerate() {
            assert_eq!(seg.index, i);
            assert_eq!(seg.text, format!("[fr] segment {}", i));
            assert!(seg.is_ok());
        }
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_max_workers() {
        let model = MockModel::new(MockBehavior::WorkingReversed);
        let pipeline = SegmentRevisionPipeline::new(model.clone(), "test-model", 4, fast_retry(1));

        let texts: Vec<String> = (0..20).map(|i| format!("segment {}", i)).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let revised = pipeline.revise_all(&segments(&refs), Some("en"), "fr").await;

        assert_eq!(revised.len(), 20);
        assert!(model.max_in_flight.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried_to_success() {
        let model = MockModel::new(MockBehavior::FlakyPerSegment { succeed_after: 2 });
        let pipeline = SegmentRevisionPipeline::new(model.clone(), "test-model", 2, fast_retry(3));

        let input = segments(&["segment 0", "segment 1"]);
        let revised = pipeline.revise_all(&input, Some("en"), "fr").await;

        assert!(revised.iter().all(RevisedSegment::is_ok));
        // Two failures then one success, per segment
        assert_eq!(model.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_contained_to_one_segment() {
        let model = MockModel::new(MockBehavior::RejectMarked);
        let pipeline = SegmentRevisionPipeline::new(model.clone(), "test-model", 2, fast_retry(3));

        let input = segments(&["segment 0", "REJECT segment 1", "segment 2"]);
        let revised = pipeline.revise_all(&input, Some("en"), "fr").await;

        assert_eq!(revised.len(), 3);
        assert!(revised[0].is_ok());
        assert!(revised[2].is_ok());
        match &revised[1].status {
            RevisionStatus::Failed { error } => assert!(error.contains("content policy")),
            other => panic!("expected failure, got {:?}", other),
        }
        // No retries for a permanent rejection
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_mark_segment_failed() {
        let model = MockModel::new(MockBehavior::AlwaysTransient);
        let pipeline = SegmentRevisionPipeline::new(model.clone(), "test-model", 1, fast_retry(3));

        let input = segments(&["segment 0"]);
        let revised = pipeline.revise_all(&input, Some("en"), "fr").await;

        assert_eq!(revised.len(), 1);
        assert!(!revised[0].is_ok());
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_segment_skips_the_remote_call() {
        let model = MockModel::new(MockBehavior::AlwaysTransient);
        let pipeline = SegmentRevisionPipeline::new(model.clone(), "test-model", 1, fast_retry(3));

        let input = segments(&["   "]);
        let revised = pipeline.revise_all(&input, Some("en"), "fr").await;

        assert!(revised[0].is_ok());
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_transcript_yields_empty_result() {
        let model = MockModel::new(MockBehavior::WorkingReversed);
        let pipeline = SegmentRevisionPipeline::new(model, "test-model", 4, fast_retry(1));

        let revised = pipeline.revise_all(&[], Some("en"), "fr").await;
        assert!(revised.is_empty());
    }
}
