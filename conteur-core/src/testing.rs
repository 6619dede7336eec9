//! Testing utilities.
//!
//! This module provides tools for integration testing:
//! - `MockGenerator` for deterministic runs without API calls
//! - `TestHarness` for scripted game scenarios
//! - Assertion helpers for verifying session state

use crate::generator::{GeneratorError, StoryGenerator};
use crate::prompt::NarrativeRequest;
use crate::session::{SessionConfig, SessionError, StorySession};
use crate::store::{GameView, SessionState};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;

/// A scripted generation backend.
///
/// Narrative and image outcomes are queued in order; running out of script
/// behaves like a transport failure. Every narrative request and image
/// prompt is recorded for assertions.
#[derive(Default)]
pub struct MockGenerator {
    narratives: Mutex<VecDeque<Result<Value, String>>>,
    images: Mutex<VecDeque<ImageScript>>,
    requests: Mutex<Vec<NarrativeRequest>>,
    image_prompts: Mutex<Vec<String>>,
}

struct ImageScript {
    /// When present, the completion blocks until the sender side fires (or
    /// is dropped), letting tests interleave completions across turns.
    gate: Option<oneshot::Receiver<()>>,
    result: Result<String, String>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw reply value (use for shape-violation scripts).
    pub fn queue_value(&self, value: Value) {
        lock(&self.narratives).push_back(Ok(value));
    }

    /// Queue a well-formed continuation reply.
    pub fn queue_reply(&self, text: &str, choices: &[&str], state_text: &str) {
        self.queue_value(json!({
            "text": text,
            "choices": choices,
            "updatedGameState": state_text,
        }));
    }

    /// Queue a well-formed continuation reply carrying an illustration prompt.
    pub fn queue_illustrated_reply(
        &self,
        text: &str,
        choices: &[&str],
        state_text: &str,
        illustration_prompt: &str,
    ) {
        self.queue_value(json!({
            "text": text,
            "choices": choices,
            "updatedGameState": state_text,
            "illustrationPrompt": illustration_prompt,
        }));
    }

    /// Queue a well-formed opening reply.
    pub fn queue_opening(&self, text: &str, choices: &[&str], location: &str) {
        self.queue_value(json!({
            "text": text,
            "choices": choices,
            "location": location,
        }));
    }

    /// Queue a transport failure.
    pub fn queue_failure(&self, message: &str) {
        lock(&self.narratives).push_back(Err(message.to_string()));
    }

    /// Queue a successful image completion.
    pub fn queue_image(&self, image: &str) {
        lock(&self.images).push_back(ImageScript {
            gate: None,
            result: Ok(image.to_string()),
        });
    }

    /// Queue a failing image completion.
    pub fn queue_image_failure(&self, message: &str) {
        lock(&self.images).push_back(ImageScript {
            gate: None,
            result: Err(message.to_string()),
        });
    }

    /// Queue an image completion that resolves only once the returned sender
    /// fires (or is dropped).
    pub fn queue_gated_image(&self, image: &str) -> oneshot::Sender<()> {
        let (sender, receiver) = oneshot::channel();
        lock(&self.images).push_back(ImageScript {
            gate: Some(receiver),
            result: Ok(image.to_string()),
        });
        sender
    }

    /// Every narrative request seen so far.
    pub fn requests(&self) -> Vec<NarrativeRequest> {
        lock(&self.requests).clone()
    }

    /// Every illustration prompt seen so far.
    pub fn image_prompts(&self) -> Vec<String> {
        lock(&self.image_prompts).clone()
    }
}

#[async_trait]
impl StoryGenerator for MockGenerator {
    async fn generate_narrative(
        &self,
        request: &NarrativeRequest,
    ) -> Result<Value, GeneratorError> {
        lock(&self.requests).push(request.clone());
        match lock(&self.narratives).pop_front() {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(GeneratorError::RequestFailed(message)),
            None => Err(GeneratorError::RequestFailed(
                "no scripted narrative reply".to_string(),
            )),
        }
    }

    async fn generate_illustration(&self, prompt: &str) -> Result<String, GeneratorError> {
        lock(&self.image_prompts).push(prompt.to_string());
        let script = lock(&self.images).pop_front();
        match script {
            Some(script) => {
                if let Some(gate) = script.gate {
                    let _ = gate.await;
                }
                script.result.map_err(GeneratorError::RequestFailed)
            }
            None => Err(GeneratorError::RequestFailed(
                "no scripted image reply".to_string(),
            )),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Test harness for running scripted game scenarios.
///
/// Events are disabled and the RNG seeded so runs stay deterministic unless
/// a test opts back in through [`SessionConfig`].
pub struct TestHarness {
    pub generator: Arc<MockGenerator>,
    pub session: StorySession,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(
            SessionConfig::new()
                .with_rng_seed(42)
                .with_event_probability(0.0),
        )
    }

    pub fn with_config(config: SessionConfig) -> Self {
        let generator = Arc::new(MockGenerator::new());
        let session = StorySession::with_config(
            Arc::clone(&generator) as Arc<dyn StoryGenerator>,
            config,
        );
        Self { generator, session }
    }

    /// Drive the menu flow to name entry with stock identity fields.
    pub async fn setup_identity(&self) -> Result<(), SessionError> {
        self.session.open_theme_selection().await?;
        self.session.choose_theme("Forêt Enchantée").await?;
        self.session
            .choose_sub_theme(Some("Retrouver la flûte perdue des lutins"))
            .await?;
        self.session.choose_hero("Exploratrice").await?;
        Ok(())
    }

    /// Queue a stock opening reply and start the adventure as "Léa".
    pub async fn start(&self) -> Result<crate::engine::TurnOutcome, SessionError> {
        self.generator.queue_opening(
            "La forêt s'ouvre devant toi, pleine de lumières dansantes.",
            &["Suivre les lumières", "Appeler les lutins"],
            "La Clairière aux Lucioles",
        );
        self.setup_identity().await?;
        self.session.begin("Léa").await
    }

    /// Send a player action through the engine.
    pub async fn play(&self, action: &str) -> Result<crate::engine::TurnOutcome, SessionError> {
        self.session.act(action).await
    }

    /// Inspect the session state under the lock.
    pub async fn with_session<R>(&self, inspect: impl FnOnce(&SessionState) -> R) -> R {
        let s = self.session.handle();
        let guard = s.lock().await;
        inspect(&guard)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert the session is in the given view.
#[track_caller]
pub fn assert_view(session: &SessionState, view: GameView) {
    assert_eq!(
        session.view, view,
        "expected view {view:?}, got {:?}",
        session.view
    );
}

/// Assert the turn counter value.
#[track_caller]
pub fn assert_turn(session: &SessionState, turn: u32) {
    assert_eq!(
        session.current_turn, turn,
        "expected turn {turn}, got {}",
        session.current_turn
    );
}

/// Assert the story log length.
#[track_caller]
pub fn assert_story_len(session: &SessionState, len: usize) {
    assert_eq!(
        session.story.len(),
        len,
        "expected {len} story segments, got {}",
        session.story.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Speaker;

    #[tokio::test]
    async fn test_harness_basic_flow() {
        let harness = TestHarness::new();
        let opening = harness.start().await.expect("opening");
        assert!(opening.narrative.contains("forêt"));
        assert_eq!(opening.choices.len(), 2);

        harness.with_session(|s| {
            assert_view(s, GameView::GameActive);
            assert_turn(s, 1);
            assert_story_len(s, 1);
            assert_eq!(s.game_state.location, "La Clairière aux Lucioles");
        })
        .await;
    }

    #[tokio::test]
    async fn test_mock_records_requests() {
        let harness = TestHarness::new();
        harness.start().await.expect("opening");
        harness.generator.queue_reply(
            "Tu suis les lumières.",
            &["Continuer"],
            r#"{"playerName": "Léa"}"#,
        );
        harness.play("Suivre les lumières").await.expect("turn");

        let requests = harness.generator.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].prompt.contains("Suivre les lumières"));
    }

    #[tokio::test]
    async fn test_exhausted_script_is_a_transport_failure() {
        let harness = TestHarness::new();
        harness.start().await.expect("opening");

        let result = harness.play("Avancer").await;
        assert!(result.is_err());
        harness.with_session(|s| {
            // The failed turn rolled back.
            assert_turn(s, 1);
            assert!(s.error.is_some());
            assert_eq!(s.story.last().map(|seg| seg.speaker), Some(Speaker::Narrator));
        })
        .await;
    }
}
