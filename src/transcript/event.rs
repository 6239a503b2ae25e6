use serde::{Deserialize, Serialize};

/// Whether a hypothesis is still revisable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptEventKind {
    /// Tentative hypothesis for an in-progress window; may be superseded
    Partial,
    /// Immutable result for a completed window
    Final,
}

/// One backend-reported hypothesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub kind: TranscriptEventKind,
    pub text: String,
    /// Start of the covered window, ms since session audio start
    pub start_ms: u64,
    /// End of the covered window, ms since session audio start
    pub end_ms: u64,
    /// Revision index; a higher revision supersedes overlapping lower ones
    pub revision: u64,
}

impl TranscriptEvent {
    pub fn partial(text: impl Into<String>, start_ms: u64, end_ms: u64, revision: u64) -> Self {
        Self {
            kind: TranscriptEventKind::Partial,
            text: text.into(),
            start_ms,
            end_ms,
            revision,
        }
    }

    pub fn final_(text: impl Into<String>, start_ms: u64, end_ms: u64, revision: u64) -> Self {
        Self {
            kind: TranscriptEventKind::Final,
            text: text.into(),
            start_ms,
            end_ms,
            revision,
        }
    }

    /// Whether two events cover overlapping time windows.
    pub fn overlaps(&self, other: &TranscriptSegment) -> bool {
        self.start_ms < other.end_ms && self.end_ms > other.start_ms
    }
}

/// One settled (or pending) stretch of transcript text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub revision: u64,
}

impl From<TranscriptEvent> for TranscriptSegment {
    fn from(event: TranscriptEvent) -> Self {
        Self {
            text: event.text,
            start_ms: event.start_ms,
            end_ms: event.end_ms,
            revision: event.revision,
        }
    }
}

/// The session's accumulated transcript view.
///
/// Finalized segments never change once appended; the pending partial is
/// replaced wholesale, never merged field by field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedTranscript {
    pub segments: Vec<TranscriptSegment>,
    pub pending: Option<TranscriptSegment>,
}

impl AggregatedTranscript {
    /// Finalized text joined in order, pending partial excluded.
    pub fn full_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty() && self.pending.is_none()
    }
}
