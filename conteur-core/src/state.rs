//! Core data model for a narrated adventure.
//!
//! Contains the story log types and the authoritative game-state snapshot
//! exchanged with the generator. The JSON wire form of [`GameState`] is
//! owned entirely by the codec module; these types carry no serde mapping
//! for it on purpose.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Location used whenever the generator never named one.
pub const UNKNOWN_LOCATION: &str = "Lieu Inconnu";

/// Player name used when no usable name is available at all.
pub const DEFAULT_PLAYER_NAME: &str = "Aventurier";

// ============================================================================
// Story log
// ============================================================================

/// Identifier for story segments, monotonically increasing in creation order
/// within one session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SegmentId(pub u64);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who authored a story segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Player,
    Narrator,
}

/// Illustration sub-state of a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IllustrationState {
    /// No illustration exists or will be made without a user request.
    Absent,
    /// A generation request is in flight.
    Pending,
    /// The illustration resolved to an image reference (data URL).
    Ready { image: String },
    /// The last generation attempt failed; retry is user-initiated.
    Failed,
}

impl IllustrationState {
    pub fn is_pending(&self) -> bool {
        matches!(self, IllustrationState::Pending)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, IllustrationState::Ready { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, IllustrationState::Failed)
    }
}

/// One narrative unit in the story log.
///
/// Immutable once created, except for the illustration sub-state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorySegment {
    pub id: SegmentId,
    pub speaker: Speaker,
    pub text: String,
    pub illustration: IllustrationState,
    /// The prompt used (or to be used) for this segment's illustration.
    pub illustration_prompt: Option<String>,
}

impl StorySegment {
    pub fn new(id: SegmentId, speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            id,
            speaker,
            text: text.into(),
            illustration: IllustrationState::Absent,
            illustration_prompt: None,
        }
    }
}

// ============================================================================
// Game state
// ============================================================================

/// An inventory entry. Extra generator-invented fields ride along untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryItem {
    pub name: String,
    pub quantity: u64,
    pub extra: Map<String, Value>,
}

impl InventoryItem {
    pub fn new(name: impl Into<String>, quantity: u64) -> Self {
        Self {
            name: name.into(),
            quantity,
            extra: Map::new(),
        }
    }
}

/// The authoritative narrative-world snapshot.
///
/// Replaced wholesale each turn, derived from the previous instance. The
/// mandatory fields are always present and correctly typed after any codec
/// pass; `extra` preserves unknown fields the generator invented so they
/// survive the round trip back into its context.
#[derive(Debug, Clone, PartialEq)]
pub struct GameState {
    pub player_name: String,
    pub location: String,
    pub inventory: Vec<InventoryItem>,
    pub relationships: HashMap<String, String>,
    pub emotions: Vec<String>,
    pub events: Vec<String>,
    pub extra: Map<String, Value>,
}

impl GameState {
    /// Create an empty state for the given player, at the sentinel location.
    pub fn new(player_name: impl Into<String>) -> Self {
        Self {
            player_name: player_name.into(),
            location: UNKNOWN_LOCATION.to_string(),
            inventory: Vec::new(),
            relationships: HashMap::new(),
            emotions: Vec::new(),
            events: Vec::new(),
            extra: Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_defaults() {
        let state = GameState::new("Alex");
        assert_eq!(state.player_name, "Alex");
        assert_eq!(state.location, UNKNOWN_LOCATION);
        assert!(state.inventory.is_empty());
        assert!(state.relationships.is_empty());
        assert!(state.emotions.is_empty());
        assert!(state.events.is_empty());
    }

    #[test]
    fn test_segment_ids_order() {
        assert!(SegmentId(1) < SegmentId(2));
        assert_eq!(SegmentId(3).to_string(), "3");
    }

    #[test]
    fn test_illustration_state_predicates() {
        assert!(IllustrationState::Pending.is_pending());
        assert!(IllustrationState::Ready {
            image: "data:image/png;base64,x".into()
        }
        .is_ready());
        assert!(IllustrationState::Failed.is_failed());
        assert!(!IllustrationState::Absent.is_pending());
    }
}
