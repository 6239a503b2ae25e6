//! Transcript event model and aggregation
//!
//! The backend reports a stream of hypotheses: revisable partials for the
//! window still being spoken, and immutable finals for completed windows.
//! The aggregator folds that stream into a stable ordered transcript,
//! tolerating duplicated and out-of-order delivery.

mod aggregator;
mod event;

pub use aggregator::TranscriptAggregator;
pub use event::{AggregatedTranscript, TranscriptEvent, TranscriptEventKind, TranscriptSegment};
