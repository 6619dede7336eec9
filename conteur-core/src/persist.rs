//! Save-slot persistence for story sessions.
//!
//! One JSON file per named slot inside a directory. The snapshot round-trips
//! the full session - including the codec-encoded game state text and the
//! story log - minus transient illustration payloads, which are intentionally
//! not persisted. Slot metadata can be peeked without deserializing the full
//! snapshot.

use crate::codec;
use crate::state::{IllustrationState, StorySegment};
use crate::store::{GameView, SessionState};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs;
use tracing::debug;

/// Current save file version.
const SAVE_VERSION: u32 = 1;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("save slot '{0}' not found")]
    NotFound(String),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Quick-access description of a save slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveMetadata {
    /// Slot name as given by the player.
    pub name: String,

    /// When the save was created (RFC 3339).
    pub saved_at: String,

    pub player_name: String,
    pub theme: String,
    pub sub_theme: Option<String>,
    pub hero: String,
    pub turn: u32,
    pub max_turn: u32,
}

/// A saved session with all state needed to resume play.
#[derive(Debug, Serialize, Deserialize)]
struct SavedSession {
    /// Save format version for compatibility checking.
    version: u32,
    metadata: SaveMetadata,
    snapshot: SessionSnapshot,
}

/// Serializable form of [`SessionState`]. The game state travels as the
/// codec's encoded text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub view: GameView,
    pub theme: Option<String>,
    pub sub_theme: Option<String>,
    pub hero: Option<String>,
    pub player_name: Option<String>,
    pub story: Vec<StorySegment>,
    pub choices: Vec<String>,
    pub history: Vec<String>,
    pub game_state_text: String,
    pub current_turn: u32,
    pub max_turns: u32,
    pub next_segment_id: u64,
}

impl SessionSnapshot {
    /// Capture a session, stripping illustration payloads: every non-absent
    /// illustration collapses to `Absent`, prompts are kept so a loaded game
    /// can regenerate on demand.
    pub fn capture(session: &SessionState) -> Self {
        let story = session
            .story
            .iter()
            .map(|segment| StorySegment {
                illustration: IllustrationState::Absent,
                ..segment.clone()
            })
            .collect();

        Self {
            view: session.view,
            theme: session.theme.clone(),
            sub_theme: session.sub_theme.clone(),
            hero: session.hero.clone(),
            player_name: session.player_name.clone(),
            story,
            choices: session.choices.clone(),
            history: session.history.clone(),
            game_state_text: codec::encode(&session.game_state),
            current_turn: session.current_turn,
            max_turns: session.max_turns,
            next_segment_id: session.next_segment_id,
        }
    }

    /// Rebuild a session from the snapshot. The game state text goes back
    /// through the codec, so even a hand-edited save file yields a valid
    /// state.
    pub fn restore(self) -> SessionState {
        let fallback_name = self.player_name.clone().unwrap_or_default();
        let mut session = SessionState::new();
        session.view = self.view;
        session.theme = self.theme;
        session.sub_theme = self.sub_theme;
        session.hero = self.hero;
        session.player_name = self.player_name;
        session.story = self.story;
        session.choices = self.choices;
        session.history = self.history;
        session.game_state = codec::decode(&self.game_state_text, &fallback_name);
        session.current_turn = self.current_turn;
        session.max_turns = self.max_turns;
        session.next_segment_id = self.next_segment_id;
        session
    }
}

/// Directory-backed save slots.
pub struct SaveStore {
    dir: PathBuf,
}

impl SaveStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// List the metadata of every save slot, most recent first.
    pub async fn list(&self) -> Result<Vec<SaveMetadata>, PersistError> {
        let mut saves = Vec::new();

        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).await?;
            return Ok(saves);
        }

        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                if let Ok(metadata) = peek_metadata(&path).await {
                    saves.push(metadata);
                }
            }
        }

        saves.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(saves)
    }

    /// Save a session into a named slot, overwriting any previous content.
    pub async fn save(&self, name: &str, session: &SessionState) -> Result<(), PersistError> {
        let saved = SavedSession {
            version: SAVE_VERSION,
            metadata: SaveMetadata {
                name: name.to_string(),
                saved_at: chrono::Utc::now().to_rfc3339(),
                player_name: session.player_name.clone().unwrap_or_default(),
                theme: session.theme.clone().unwrap_or_default(),
                sub_theme: session.sub_theme.clone(),
                hero: session.hero.clone().unwrap_or_default(),
                turn: session.current_turn,
                max_turn: session.max_turns,
            },
            snapshot: SessionSnapshot::capture(session),
        };

        fs::create_dir_all(&self.dir).await?;
        let content = serde_json::to_string_pretty(&saved)?;
        let path = self.slot_path(name);
        debug!(?path, "writing save slot");
        fs::write(path, content).await?;
        Ok(())
    }

    /// Load a named slot.
    pub async fn load(&self, name: &str) -> Result<SessionState, PersistError> {
        let path = self.slot_path(name);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(PersistError::NotFound(name.to_string()));
            }
            Err(err) => return Err(err.into()),
        };

        let saved: SavedSession = serde_json::from_str(&content)?;
        if saved.version != SAVE_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SAVE_VERSION,
                found: saved.version,
            });
        }

        Ok(saved.snapshot.restore())
    }

    /// Delete a named slot.
    pub async fn delete(&self, name: &str) -> Result<(), PersistError> {
        let path = self.slot_path(name);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(PersistError::NotFound(name.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn slot_path(&self, name: &str) -> PathBuf {
        let sanitized = name
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect::<String>();
        self.dir.join(format!("{sanitized}.json"))
    }
}

/// Read a slot's metadata without deserializing the full snapshot.
async fn peek_metadata(path: &std::path::Path) -> Result<SaveMetadata, PersistError> {
    let content = fs::read_to_string(path).await?;

    #[derive(Deserialize)]
    struct Partial {
        version: u32,
        metadata: SaveMetadata,
    }

    let partial: Partial = serde_json::from_str(&content)?;
    if partial.version != SAVE_VERSION {
        return Err(PersistError::VersionMismatch {
            expected: SAVE_VERSION,
            found: partial.version,
        });
    }

    Ok(partial.metadata)
}
