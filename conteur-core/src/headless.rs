//! Headless adventure interface for programmatic use.
//!
//! A thin wrapper over [`StorySession`] for:
//! - Automated QA with real generator responses
//! - Script-driven playthroughs
//!
//! # Example
//!
//! ```ignore
//! use conteur_core::headless::{HeadlessAdventure, HeadlessConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HeadlessConfig::quick_start("Léa");
//!     let mut game = HeadlessAdventure::from_env(config).await?;
//!
//!     let response = game.send("Suivre le sentier").await?;
//!     println!("{}", response.narrative);
//!     Ok(())
//! }
//! ```

use crate::engine::TurnOutcome;
use crate::generator::{GeminiGenerator, StoryGenerator};
use crate::persist::SaveStore;
use crate::session::{SessionConfig, SessionError, StorySession};
use crate::store::{GameView, DEFAULT_MAX_TURNS};
use std::sync::Arc;

/// Configuration for a headless adventure.
#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    pub theme: String,
    pub sub_theme: Option<String>,
    pub hero: String,
    pub player_name: String,
    pub max_turns: u32,
}

impl HeadlessConfig {
    /// Create a quick-start configuration with stock theme and hero.
    pub fn quick_start(player_name: impl Into<String>) -> Self {
        Self {
            theme: "Forêt Enchantée".to_string(),
            sub_theme: None,
            hero: "Exploratrice".to_string(),
            player_name: player_name.into(),
            max_turns: DEFAULT_MAX_TURNS,
        }
    }

    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = theme.into();
        self
    }

    pub fn with_sub_theme(mut self, sub_theme: impl Into<String>) -> Self {
        self.sub_theme = Some(sub_theme.into());
        self
    }

    pub fn with_hero(mut self, hero: impl Into<String>) -> Self {
        self.hero = hero.into();
        self
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }
}

/// A simplified response from the adventure.
#[derive(Debug, Clone)]
pub struct HeadlessResponse {
    pub narrative: String,
    pub choices: Vec<String>,
    pub is_last_turn: bool,
    pub turn: u32,
}

/// An entry in the adventure transcript.
#[derive(Debug, Clone)]
pub struct TranscriptEntry {
    /// Player input; empty for the opening segment.
    pub player_input: String,
    pub narrative: String,
    pub turn: u32,
}

/// A headless adventure that can be driven programmatically.
pub struct HeadlessAdventure {
    session: StorySession,
    transcript: Vec<TranscriptEntry>,
}

impl HeadlessAdventure {
    /// Start a new adventure over any generation backend.
    pub async fn new(
        generator: Arc<dyn StoryGenerator>,
        config: HeadlessConfig,
    ) -> Result<Self, SessionError> {
        let session = StorySession::with_config(
            generator,
            SessionConfig::new().with_max_turns(config.max_turns),
        );

        session.open_theme_selection().await?;
        session.choose_theme(&config.theme).await?;
        session.choose_sub_theme(config.sub_theme.as_deref()).await?;
        session.choose_hero(&config.hero).await?;
        let opening = session.begin(&config.player_name).await?;

        let transcript = vec![TranscriptEntry {
            player_input: String::new(),
            narrative: opening.narrative,
            turn: 1,
        }];

        Ok(Self {
            session,
            transcript,
        })
    }

    /// Start a new adventure backed by the Gemini API.
    ///
    /// Requires the `GEMINI_API_KEY` environment variable.
    pub async fn from_env(config: HeadlessConfig) -> Result<Self, SessionError> {
        let generator = GeminiGenerator::from_env().map_err(|_| SessionError::NoApiKey)?;
        Self::new(Arc::new(generator), config).await
    }

    /// Send a player action and get the narrator's response.
    pub async fn send(&mut self, action: &str) -> Result<HeadlessResponse, SessionError> {
        let outcome = self.session.act(action).await?;
        let turn = self.current_turn().await;

        self.transcript.push(TranscriptEntry {
            player_input: action.to_string(),
            narrative: outcome.narrative.clone(),
            turn,
        });

        Ok(response_from(outcome, turn))
    }

    /// The transcript of all exchanges so far.
    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    /// The choices currently offered to the player.
    pub async fn choices(&self) -> Vec<String> {
        let handle = self.session.handle();
        let s = handle.lock().await;
        s.choices.clone()
    }

    pub async fn current_location(&self) -> String {
        let handle = self.session.handle();
        let s = handle.lock().await;
        s.game_state.location.clone()
    }

    pub async fn current_turn(&self) -> u32 {
        let handle = self.session.handle();
        let s = handle.lock().await;
        s.current_turn
    }

    pub async fn is_ended(&self) -> bool {
        let handle = self.session.handle();
        let s = handle.lock().await;
        s.view == GameView::GameEnded
    }

    /// Save the adventure into a named slot.
    pub async fn save(&self, store: &SaveStore, name: &str) -> Result<(), SessionError> {
        self.session.save(store, name).await
    }

    /// The underlying session, for advanced use.
    pub fn session(&self) -> &StorySession {
        &self.session
    }
}

fn response_from(outcome: TurnOutcome, turn: u32) -> HeadlessResponse {
    HeadlessResponse {
        narrative: outcome.narrative,
        choices: outcome.choices,
        is_last_turn: outcome.is_last_turn,
        turn,
    }
}
