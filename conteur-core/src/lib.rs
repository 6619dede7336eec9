//! AI-narrated, choice-driven text-adventure engine.
//!
//! This crate provides:
//! - A turn engine reconciling free-form generator output into a structured,
//!   self-healing game state
//! - A total state codec that repairs malformed generator JSON field by field
//! - Prompt assembly with a curated random-event injector
//! - An identity-keyed, best-effort illustration side channel
//! - Save-slot persistence
//!
//! # Quick Start
//!
//! ```ignore
//! use conteur_core::{StorySession, SessionError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), SessionError> {
//!     let session = StorySession::from_env()?;
//!     session.open_theme_selection().await?;
//!     session.choose_theme("Forêt Enchantée").await?;
//!     session.choose_sub_theme(None).await?;
//!     session.choose_hero("Exploratrice").await?;
//!
//!     let opening = session.begin("Léa").await?;
//!     println!("{}", opening.narrative);
//!
//!     let turn = session.act(&opening.choices[0]).await?;
//!     println!("{}", turn.narrative);
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod engine;
pub mod generator;
pub mod headless;
pub mod illustration;
pub mod persist;
pub mod prompt;
pub mod session;
pub mod state;
pub mod store;
pub mod testing;

// Primary public API
pub use engine::{TurnEngine, TurnError, TurnOutcome};
pub use generator::{GeminiGenerator, GeneratorError, StoryGenerator};
pub use headless::{HeadlessAdventure, HeadlessConfig, HeadlessResponse};
pub use illustration::IllustrationCoordinator;
pub use persist::{PersistError, SaveMetadata, SaveStore, SessionSnapshot};
pub use session::{SessionConfig, SessionError, StorySession};
pub use state::{
    GameState, IllustrationState, InventoryItem, SegmentId, Speaker, StorySegment,
    UNKNOWN_LOCATION,
};
pub use store::{GameView, SessionState, SharedSession, DEFAULT_MAX_TURNS};
pub use testing::{MockGenerator, TestHarness};
