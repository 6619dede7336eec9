//! Best-effort, per-segment illustration side channel.
//!
//! Illustrations are independent of narrative progress: requests may race
//! with later turns, and completions join on segment identity rather than
//! request order. A failure never blocks or rolls back the story; it only
//! marks its own segment.

use crate::generator::StoryGenerator;
use crate::state::{IllustrationState, SegmentId};
use crate::store::SharedSession;
use std::sync::Arc;
use tracing::{debug, warn};

/// Coordinates illustration generation for story segments.
#[derive(Clone)]
pub struct IllustrationCoordinator {
    generator: Arc<dyn StoryGenerator>,
}

impl IllustrationCoordinator {
    pub fn new(generator: Arc<dyn StoryGenerator>) -> Self {
        Self { generator }
    }

    /// Request an illustration for `segment_id`.
    ///
    /// An empty prompt marks the segment as having no illustration and sets
    /// no error. Otherwise the segment goes `Pending` and becomes the
    /// tracked in-flight id (single slot, indicator only: a second request
    /// supersedes the tracked id without cancelling the earlier call). On
    /// completion the outcome lands on the segment it was requested for; a
    /// completion for a segment that no longer exists is discarded.
    pub async fn request(&self, session: &SharedSession, segment_id: SegmentId, prompt: &str) {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            let mut s = session.lock().await;
            if let Some(segment) = s.segment_mut(segment_id) {
                segment.illustration = IllustrationState::Absent;
            }
            return;
        }

        {
            let mut s = session.lock().await;
            let Some(segment) = s.segment_mut(segment_id) else {
                return;
            };
            segment.illustration = IllustrationState::Pending;
            segment.illustration_prompt = Some(prompt.to_string());
            s.pending_illustration = Some(segment_id);
        }

        debug!(%segment_id, "requesting illustration");
        let outcome = self.generator.generate_illustration(prompt).await;

        let mut s = session.lock().await;
        if s.pending_illustration == Some(segment_id) {
            s.pending_illustration = None;
        }
        match s.segment_mut(segment_id) {
            None => debug!(%segment_id, "discarding illustration for a vanished segment"),
            Some(segment) => match outcome {
                Ok(image) => segment.illustration = IllustrationState::Ready { image },
                Err(err) => {
                    warn!(%segment_id, %err, "illustration generation failed");
                    segment.illustration = IllustrationState::Failed;
                }
            },
        }
    }
}
