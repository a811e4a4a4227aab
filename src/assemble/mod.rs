use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::revise::RevisedSegment;

/// Marker paragraph emitted in place of a segment whose revision permanently
/// failed. Failed segments are never silently dropped.
pub const UNAVAILABLE_MARKER: &str = "[segment unavailable]";

/// Document-level metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Document title
    pub title: String,

    /// Source video the document was generated from
    pub source: String,

    /// Detected or hinted source language
    pub source_language: Option<String>,

    /// Target language of the document body
    pub target_language: String,

    /// Generation timestamp
    pub generated_at: DateTime<Utc>,
}

/// Ordered document model produced from the revised transcript.
///
/// The segment list keeps per-segment timestamps and statuses so downstream
/// consumers can correlate paragraphs back to the source timeline; `body`
/// holds the merged paragraphs in reading order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub metadata: DocumentMetadata,
    pub segments: Vec<RevisedSegment>,
    pub body: Vec<String>,
}

impl Document {
    /// Number of segments that permanently failed revision
    pub fn failed_segment_count(&self) -> usize {
        self.segments.iter().filter(|s| !s.is_ok()).count()
    }
}

/// Merges revised segments into a single ordered document model
pub struct DocumentAssembler;

impl DocumentAssembler {
    /// Assemble the document, applying the deterministic merge rule:
    /// consecutive successful segments concatenate in index order; a failed
    /// segment becomes the explicit unavailable marker.
    ///
    /// The segment index set must be exactly `0..N` with no gaps or
    /// duplicates; anything else means a pipeline invariant was broken.
    pub fn assemble(metadata: DocumentMetadata, revised: Vec<RevisedSegment>) -> Result<Document> {
        let mut segments = revised;
        segments.sort_by_key(|segment| segment.index);

        for (expected, segment) in segments.iter().enumerate() {
            if segment.index != expected {
                anyhow::bail!(
                    "Revised segments do not form a contiguous index set: expected {}, found {}",
                    expected,
                    segment.index
                );
            }
        }

        let mut body = Vec::new();
        let mut run = String::new();

        for segment in &segments {
            if segment.is_ok() {
                let text = segment.text.trim();
                if text.is_empty() {
                    continue;
                }
                if !run.is_empty() {
                    run.push(' ');
                }
                run.push_str(text);
            } else {
                flush_run(&mut body, &mut run);
                body.push(UNAVAILABLE_MARKER.to_string());
            }
        }
        flush_run(&mut body, &mut run);

        Ok(Document {
            metadata,
            segments,
            body,
        })
    }
}

/// Split an accumulated run of successful text into paragraphs, honoring any
/// paragraph breaks the model produced.
fn flush_run(body: &mut Vec<String>, run: &mut String) {
    if run.is_empty() {
        return;
    }
    body.extend(
        run.split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string),
    );
    run.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::revise::RevisionStatus;
    use chrono::TimeZone;

    fn metadata() -> DocumentMetadata {
        DocumentMetadata {
            title: "Quarterly Review".to_string(),
            source: "talk.mp4".to_string(),
            source_language: Some("en-US".to_string()),
            target_language: "fr".to_string(),
            generated_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    fn ok_segment(index: usize, text: &str) -> RevisedSegment {
        RevisedSegment {
            index,
            start_time: index as f64,
            end_time: index as f64 + 1.0,
            source_text: format!("source {}", index),
            text: text.to_string(),
            status: RevisionStatus::Ok,
        }
    }

    fn failed_segment(index: usize) -> RevisedSegment {
        RevisedSegment {
            index,
            start_time: index as f64,
            end_time: index as f64 + 1.0,
            source_text: format!("source {}", index),
            text: String::new(),
            status: RevisionStatus::Failed {
                error: "rejected".to_string(),
            },
        }
    }

    #[test]
    fn test_assemble_keeps_every_index_in_order() {
        let revised = vec![
            ok_segment(2, "Troisième."),
            ok_segment(0, "Première."),
            ok_segment(1, "Deuxième."),
        ];

        let document = DocumentAssembler::assemble(metadata(), revised).unwrap();

        assert_eq!(document.segments.len(), 3);
        assert_eq!(
            document.segments.iter().map(|s| s.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(document.body, vec!["Première. Deuxième. Troisième."]);
    }

    #[test]
    fn test_failed_segment_becomes_explicit_marker() {
        let revised = vec![ok_segment(0, "Bonjour."), failed_segment(1), ok_segment(2, "Merci.")];

        let document = DocumentAssembler::assemble(metadata(), revised).unwrap();

        assert_eq!(document.segments.len(), 3);
        assert_eq!(document.failed_segment_count(), 1);
        assert_eq!(
            document.body,
            vec!["Bonjour.", UNAVAILABLE_MARKER, "Merci."]
        );
    }

    #[test]
    fn test_assemble_is_idempotent() {
        let revised = vec![ok_segment(0, "Bonjour."), failed_segment(1), ok_segment(2, "Merci.")];

        let a = DocumentAssembler::assemble(metadata(), revised.clone()).unwrap();
        let b = DocumentAssembler::assemble(metadata(), revised).unwrap();

        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_assemble_rejects_index_gap() {
        let revised = vec![ok_segment(0, "A."), ok_segment(2, "C.")];
        assert!(DocumentAssembler::assemble(metadata(), revised).is_err());
    }

    #[test]
    fn test_assemble_rejects_duplicate_index() {
        let revised = vec![ok_segment(0, "A."), ok_segment(0, "A again."), ok_segment(1, "B.")];
        assert!(DocumentAssembler::assemble(metadata(), revised).is_err());
    }

    #[test]
    fn test_model_paragraph_breaks_are_preserved() {
        let revised = vec![ok_segment(0, "Premier paragraphe.\n\nDeuxième paragraphe.")];
        let document = DocumentAssembler::assemble(metadata(), revised).unwrap();
        assert_eq!(document.body, vec!["Premier paragraphe.", "Deuxième paragraphe."]);
    }

    #[test]
    fn test_empty_revision_set_is_valid() {
        let document = DocumentAssembler::assemble(metadata(), Vec::new()).unwrap();
        assert!(document.segments.is_empty());
        assert!(document.body.is_empty());
    }
}
