//! The mutable session store.
//!
//! [`SessionState`] is the aggregate root owning the story log, the current
//! choice set, the game state, the turn counters and the view. It is shared
//! behind [`SharedSession`] and mutated only through the turn engine and the
//! illustration coordinator; in the cooperative single-session model every
//! mutation is a whole replace/append under the lock.

use crate::state::{GameState, SegmentId, Speaker, StorySegment};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Default number of turns before the story concludes.
pub const DEFAULT_MAX_TURNS: u32 = 15;

/// Handle through which the engine and the illustration coordinator share
/// the single mutable session.
pub type SharedSession = Arc<Mutex<SessionState>>;

/// The finite set of UI views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameView {
    Menu,
    ThemeSelection,
    SubThemeSelection,
    HeroSelection,
    NameInput,
    LoadingGame,
    GameActive,
    GameEnded,
}

impl GameView {
    /// Whether the view state machine accepts a direct transition to `next`.
    ///
    /// Every state can fall back to the menu; `GameEnded` is otherwise
    /// terminal.
    pub fn allows(self, next: GameView) -> bool {
        use GameView::*;
        match (self, next) {
            (from, Menu) => from != Menu,
            (Menu, ThemeSelection) => true,
            (Menu, LoadingGame) => true,
            (ThemeSelection, SubThemeSelection) => true,
            (SubThemeSelection, HeroSelection) => true,
            (HeroSelection, NameInput) => true,
            (NameInput, GameActive) => true,
            (LoadingGame, GameActive) | (LoadingGame, GameEnded) => true,
            (GameActive, GameActive) => true,
            (GameActive, GameEnded) => true,
            _ => false,
        }
    }
}

/// The in-memory session: one continuous or resumed playthrough.
#[derive(Debug)]
pub struct SessionState {
    pub view: GameView,
    pub theme: Option<String>,
    pub sub_theme: Option<String>,
    pub hero: Option<String>,
    pub player_name: Option<String>,
    /// Append-only story log.
    pub story: Vec<StorySegment>,
    /// Choices currently offered to the player.
    pub choices: Vec<String>,
    /// Chronological choice history; the last element is the most recent
    /// action.
    pub history: Vec<String>,
    pub game_state: GameState,
    pub current_turn: u32,
    pub max_turns: u32,
    pub is_loading: bool,
    /// User-visible error message, set only for validation and transport
    /// failures.
    pub error: Option<String>,
    /// Segment currently tracked as awaiting illustration (single slot,
    /// indicator only).
    pub pending_illustration: Option<SegmentId>,
    pub(crate) next_segment_id: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            view: GameView::Menu,
            theme: None,
            sub_theme: None,
            hero: None,
            player_name: None,
            story: Vec::new(),
            choices: Vec::new(),
            history: Vec::new(),
            game_state: GameState::new(""),
            current_turn: 0,
            max_turns: DEFAULT_MAX_TURNS,
            is_loading: false,
            error: None,
            pending_illustration: None,
            next_segment_id: 0,
        }
    }

    /// Wrap the session in the shared handle used across the engine and the
    /// illustration coordinator.
    pub fn into_shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    /// Append a new segment to the story log and return its id.
    pub fn push_segment(&mut self, speaker: Speaker, text: impl Into<String>) -> SegmentId {
        let id = SegmentId(self.next_segment_id);
        self.next_segment_id += 1;
        self.story.push(StorySegment::new(id, speaker, text));
        id
    }

    /// Remove a segment by id. Only used to compensate an optimistic append.
    pub fn pop_segment(&mut self, id: SegmentId) {
        self.story.retain(|segment| segment.id != id);
    }

    pub fn segment(&self, id: SegmentId) -> Option<&StorySegment> {
        self.story.iter().find(|segment| segment.id == id)
    }

    pub fn segment_mut(&mut self, id: SegmentId) -> Option<&mut StorySegment> {
        self.story.iter_mut().find(|segment| segment.id == id)
    }

    pub fn last_segment(&self) -> Option<&StorySegment> {
        self.story.last()
    }

    pub fn is_last_turn(&self) -> bool {
        self.current_turn > self.max_turns
    }

    /// Reset every transient field, keeping only the configured turn limit.
    pub fn reset_to_menu(&mut self) {
        let max_turns = self.max_turns;
        *self = SessionState::new();
        self.max_turns = max_turns;
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
