use tracing::debug;

use super::event::{
    AggregatedTranscript, TranscriptEvent, TranscriptEventKind, TranscriptSegment,
};
use crate::error::SessionError;

/// Folds the backend's hypothesis stream into a stable ordered transcript.
///
/// All visible mutation goes through `apply`, which returns the updated
/// snapshot; the caller decides whether to broadcast it. The only events
/// dropped on the floor are stale partials and duplicate finals, both of
/// which are designed idempotence behavior, not error suppression.
#[derive(Debug, Default)]
pub struct TranscriptAggregator {
    state: AggregatedTranscript,
}

impl TranscriptAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event and return the resulting snapshot.
    ///
    /// An out-of-order final (starting before the last finalized segment
    /// ends) means the backend violated its own ordering contract; it is
    /// reported, never silently patched.
    pub fn apply(
        &mut self,
        event: TranscriptEvent,
    ) -> Result<AggregatedTranscript, SessionError> {
        match event.kind {
            TranscriptEventKind::Final => self.apply_final(event)?,
            TranscriptEventKind::Partial => self.apply_partial(event),
        }
        Ok(self.state.clone())
    }

    /// Current snapshot without applying anything.
    pub fn snapshot(&self) -> AggregatedTranscript {
        self.state.clone()
    }

    fn apply_final(&mut self, event: TranscriptEvent) -> Result<(), SessionError> {
        // Retried delivery dedupe: same revision and time range as an
        // already finalized segment leaves the transcript unchanged.
        let duplicate = self.state.segments.iter().any(|s| {
            s.revision == event.revision
                && s.start_ms == event.start_ms
                && s.end_ms == event.end_ms
        });
        if duplicate {
            debug!(
                "Ignoring duplicate final (rev={}, {}..{}ms)",
                event.revision, event.start_ms, event.end_ms
            );
            return Ok(());
        }

        if let Some(last) = self.state.segments.last() {
            if event.start_ms < last.end_ms {
                return Err(SessionError::ProtocolViolation(format!(
                    "final segment starts at {}ms before previous final ended at {}ms",
                    event.start_ms, last.end_ms
                )));
            }
        }

        // A finalized window settles any pending partial that overlaps it
        if let Some(pending) = &self.state.pending {
            if event.overlaps(pending) {
                self.state.pending = None;
            }
        }

        self.state.segments.push(TranscriptSegment::from(event));
        Ok(())
    }

    fn apply_partial(&mut self, event: TranscriptEvent) {
        match &self.state.pending {
            // The backend may emit revisions out of wire order under load:
            // an overlapping partial with a lower revision is stale.
            Some(pending) if event.overlaps(pending) && event.revision < pending.revision => {
                debug!(
                    "Discarding stale partial (rev={} < stored rev={})",
                    event.revision, pending.revision
                );
            }
            _ => {
                self.state.pending = Some(TranscriptSegment::from(event));
            }
        }
    }
}
