//! `StorySession` - the primary public API.
//!
//! Wraps the turn engine, the illustration coordinator and the shared
//! session store into the single interface a UI layer drives: menu flow,
//! turns with their opportunistic illustration trigger, manual illustration
//! requests, and save-slot wiring.

use crate::engine::{TurnEngine, TurnError, TurnOutcome};
use crate::generator::{GeminiGenerator, StoryGenerator};
use crate::illustration::IllustrationCoordinator;
use crate::persist::{PersistError, SaveStore};
use crate::prompt;
use crate::state::SegmentId;
use crate::store::{SessionState, SharedSession, DEFAULT_MAX_TURNS};
use std::sync::Arc;
use thiserror::Error;

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("turn error: {0}")]
    Turn(#[from] TurnError),

    #[error("persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("no API key configured - set GEMINI_API_KEY environment variable")]
    NoApiKey,
}

/// Configuration for a new story session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Number of turns before the story concludes.
    pub max_turns: u32,

    /// Seed for the random-event RNG; `None` draws from entropy.
    pub rng_seed: Option<u64>,

    /// Probability of injecting a random event per continuation turn.
    pub event_probability: f64,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            rng_seed: None,
            event_probability: prompt::EVENT_PROBABILITY,
        }
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn with_event_probability(mut self, probability: f64) -> Self {
        self.event_probability = probability;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// One continuous or resumed playthrough.
pub struct StorySession {
    state: SharedSession,
    engine: TurnEngine,
    illustrations: IllustrationCoordinator,
}

impl StorySession {
    /// Create a session over any generation backend.
    pub fn new(generator: Arc<dyn StoryGenerator>) -> Self {
        Self::with_config(generator, SessionConfig::default())
    }

    pub fn with_config(generator: Arc<dyn StoryGenerator>, config: SessionConfig) -> Self {
        let mut session = SessionState::new();
        session.max_turns = config.max_turns;

        let mut engine = TurnEngine::new(Arc::clone(&generator))
            .with_event_probability(config.event_probability);
        if let Some(seed) = config.rng_seed {
            engine = engine.with_rng_seed(seed);
        }

        Self {
            state: session.into_shared(),
            engine,
            illustrations: IllustrationCoordinator::new(generator),
        }
    }

    /// Create a session backed by the Gemini API.
    ///
    /// Requires the `GEMINI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self, SessionError> {
        let generator = GeminiGenerator::from_env().map_err(|_| SessionError::NoApiKey)?;
        Ok(Self::new(Arc::new(generator)))
    }

    /// The shared session handle, for read access and for wiring external
    /// collaborators.
    pub fn handle(&self) -> SharedSession {
        Arc::clone(&self.state)
    }

    // ========================================================================
    // Menu flow
    // ========================================================================

    pub async fn open_theme_selection(&self) -> Result<(), SessionError> {
        Ok(self.engine.open_theme_selection(&self.state).await?)
    }

    pub async fn choose_theme(&self, theme: &str) -> Result<(), SessionError> {
        Ok(self.engine.choose_theme(&self.state, theme).await?)
    }

    pub async fn choose_sub_theme(&self, sub_theme: Option<&str>) -> Result<(), SessionError> {
        Ok(self.engine.choose_sub_theme(&self.state, sub_theme).await?)
    }

    pub async fn choose_hero(&self, hero: &str) -> Result<(), SessionError> {
        Ok(self.engine.choose_hero(&self.state, hero).await?)
    }

    pub async fn return_to_menu(&self) {
        self.engine.return_to_menu(&self.state).await;
    }

    // ========================================================================
    // Turns
    // ========================================================================

    /// Start the adventure with the player's name: generates the opening
    /// segment and triggers its illustration opportunistically.
    pub async fn begin(&self, player_name: &str) -> Result<TurnOutcome, SessionError> {
        let outcome = self.engine.start_adventure(&self.state, player_name).await?;
        self.spawn_illustration(&outcome);
        Ok(outcome)
    }

    /// React to a player action: one full turn, plus the opportunistic
    /// illustration trigger for the new narrator segment.
    pub async fn act(&self, action: &str) -> Result<TurnOutcome, SessionError> {
        let outcome = self.engine.handle_action(&self.state, action).await?;
        self.spawn_illustration(&outcome);
        Ok(outcome)
    }

    fn spawn_illustration(&self, outcome: &TurnOutcome) {
        let Some(prompt) = outcome.illustration_prompt.clone() else {
            return;
        };
        let coordinator = self.illustrations.clone();
        let session = Arc::clone(&self.state);
        let segment_id = outcome.segment_id;
        tokio::spawn(async move {
            coordinator.request(&session, segment_id, &prompt).await;
        });
    }

    // ========================================================================
    // Illustrations
    // ========================================================================

    /// User-initiated "generate now" / retry for a segment, with a freshly
    /// synthesized prompt. Awaits the completion.
    pub async fn illustrate_segment(&self, segment_id: SegmentId) {
        let prompt = {
            let s = self.state.lock().await;
            let Some(segment) = s.segment(segment_id) else {
                return;
            };
            let theme = s.theme.as_deref().unwrap_or("aventure");
            prompt::illustration_prompt_for(theme, &segment.text)
        };
        self.illustrations
            .request(&self.state, segment_id, &prompt)
            .await;
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Save the session into a named slot.
    pub async fn save(&self, store: &SaveStore, name: &str) -> Result<(), SessionError> {
        let s = self.state.lock().await;
        Ok(store.save(name, &s).await?)
    }

    /// Load a named slot, replacing the session wholesale.
    pub async fn load(&self, store: &SaveStore, name: &str) -> Result<(), SessionError> {
        self.engine.begin_loading(&self.state).await?;
        match store.load(name).await {
            Ok(loaded) => {
                self.engine.resume_loaded(&self.state, loaded).await;
                Ok(())
            }
            Err(err) => {
                self.engine
                    .abort_loading(&self.state, "Impossible de charger cette partie.")
                    .await;
                Err(err.into())
            }
        }
    }
}
