//! Turn orchestration.
//!
//! Drives one request/response cycle against the generation backend and
//! reconciles the result into the session: optimistic apply, transport
//! rollback, shape-violation self-healing, last-turn enforcement and the
//! state decode with its in-character disclosure. Also the only place that
//! moves the view state machine.

use crate::codec;
use crate::generator::{GeneratorError, StoryGenerator};
use crate::prompt::{self, TurnContext, EVENT_PROBABILITY};
use crate::state::{GameState, SegmentId, Speaker, UNKNOWN_LOCATION};
use crate::store::{GameView, SessionState, SharedSession};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, warn};

/// User-visible message for transport failures.
const TRANSPORT_ERROR: &str =
    "Le conteur est injoignable pour le moment. Réessaie dans un instant !";

/// In-character narration substituted on a shape violation.
const FALLBACK_NARRATIVE: &str =
    "Pardonne-moi, j'ai perdu le fil de mon histoire un court instant... \
     Reprenons ensemble là où nous en étions !";

/// In-character opening substituted when the very first reply is unusable.
const FALLBACK_OPENING: &str =
    "Il était une fois une aventure qui commençait à peine. Une brume douce \
     se dissipe autour de toi, et le monde attend tes premiers pas.";

/// Generic choices offered when the generator left the player stranded.
const FALLBACK_CHOICES: [&str; 2] = ["Continuer l'aventure", "Observer les alentours"];

/// Filler appended when fallback choices had to be substituted.
const FILLER_SENTENCE: &str = " Que souhaites-tu faire maintenant ?";

/// Disclosure appended when the inventory had to be restored.
const INVENTORY_CAUTION: &str =
    " (J'ai bien failli mélanger ton sac en route... heureusement, tout est encore là !)";

/// Errors from turn-engine operations.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("action text is empty")]
    EmptyAction,

    #[error("missing identity field: {0}")]
    MissingIdentity(&'static str),

    #[error("the story has already ended")]
    StoryEnded,

    #[error("view transition {from:?} -> {to:?} is not allowed")]
    InvalidTransition { from: GameView, to: GameView },

    #[error("generation failed: {0}")]
    Generation(#[from] GeneratorError),
}

/// Result of a successfully committed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Id of the narrator segment appended by this turn.
    pub segment_id: SegmentId,
    pub narrative: String,
    pub choices: Vec<String>,
    /// Illustration prompt returned by the generator, if any.
    pub illustration_prompt: Option<String>,
    pub is_last_turn: bool,
    /// Random event injected into this turn's prompt, if any.
    pub injected_event: Option<&'static str>,
}

/// The turn engine.
pub struct TurnEngine {
    generator: Arc<dyn StoryGenerator>,
    rng: Mutex<StdRng>,
    event_probability: f64,
}

impl TurnEngine {
    pub fn new(generator: Arc<dyn StoryGenerator>) -> Self {
        Self {
            generator,
            rng: Mutex::new(StdRng::from_entropy()),
            event_probability: EVENT_PROBABILITY,
        }
    }

    /// Seed the event RNG for deterministic runs.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Override the random-event probability (tests use 0.0 or 1.0).
    pub fn with_event_probability(mut self, probability: f64) -> Self {
        self.event_probability = probability;
        self
    }

    // ========================================================================
    // View state machine
    // ========================================================================

    /// Begin a new game from the menu (or directly after a finished story).
    pub async fn open_theme_selection(&self, session: &SharedSession) -> Result<(), TurnError> {
        let mut s = session.lock().await;
        if s.view == GameView::GameEnded {
            s.reset_to_menu();
        }
        transition(&mut s, GameView::ThemeSelection)
    }

    pub async fn choose_theme(
        &self,
        session: &SharedSession,
        theme: &str,
    ) -> Result<(), TurnError> {
        let mut s = session.lock().await;
        transition(&mut s, GameView::SubThemeSelection)?;
        s.theme = Some(theme.trim().to_string());
        Ok(())
    }

    /// Pick a sub-theme scenario seed, or `None` for a generic one.
    pub async fn choose_sub_theme(
        &self,
        session: &SharedSession,
        sub_theme: Option<&str>,
    ) -> Result<(), TurnError> {
        let mut s = session.lock().await;
        transition(&mut s, GameView::HeroSelection)?;
        s.sub_theme = sub_theme.map(|t| t.trim().to_string());
        Ok(())
    }

    pub async fn choose_hero(&self, session: &SharedSession, hero: &str) -> Result<(), TurnError> {
        let mut s = session.lock().await;
        transition(&mut s, GameView::NameInput)?;
        s.hero = Some(hero.trim().to_string());
        Ok(())
    }

    /// Abandon whatever is in progress and reset to the menu.
    pub async fn return_to_menu(&self, session: &SharedSession) {
        let mut s = session.lock().await;
        s.reset_to_menu();
    }

    /// Enter the loading view prior to installing a loaded session.
    pub async fn begin_loading(&self, session: &SharedSession) -> Result<(), TurnError> {
        let mut s = session.lock().await;
        transition(&mut s, GameView::LoadingGame)
    }

    /// Install a loaded session wholesale, entering the appropriate view.
    pub async fn resume_loaded(&self, session: &SharedSession, mut loaded: SessionState) {
        loaded.view = if loaded.is_last_turn() {
            GameView::GameEnded
        } else {
            GameView::GameActive
        };
        loaded.is_loading = false;
        loaded.error = None;
        loaded.pending_illustration = None;
        *session.lock().await = loaded;
    }

    /// Leave the loading view after a failed load.
    pub async fn abort_loading(&self, session: &SharedSession, message: impl Into<String>) {
        let mut s = session.lock().await;
        s.reset_to_menu();
        s.error = Some(message.into());
    }

    // ========================================================================
    // Turns
    // ========================================================================

    /// Generate the opening segment and enter the game.
    pub async fn start_adventure(
        &self,
        session: &SharedSession,
        player_name: &str,
    ) -> Result<TurnOutcome, TurnError> {
        let player_name = player_name.trim().to_string();

        let (request, previous_name) = {
            let mut s = session.lock().await;
            if player_name.is_empty() {
                return Err(TurnError::MissingIdentity("player name"));
            }
            let theme = s.theme.clone().ok_or(TurnError::MissingIdentity("theme"))?;
            let hero = s.hero.clone().ok_or(TurnError::MissingIdentity("hero"))?;
            if !s.view.allows(GameView::GameActive) {
                return Err(TurnError::InvalidTransition {
                    from: s.view,
                    to: GameView::GameActive,
                });
            }

            let previous_name = s.player_name.replace(player_name.clone());
            s.is_loading = true;
            s.error = None;

            let opening_state = GameState::new(&player_name);
            let request = prompt::opening_request(&TurnContext {
                theme: &theme,
                scenario: s.sub_theme.as_deref(),
                hero: &hero,
                player_name: &player_name,
                current_turn: 1,
                max_turns: s.max_turns,
                state: &opening_state,
                history: &[],
                last_segment: None,
            });
            (request, previous_name)
        };

        debug!("generating opening segment");
        match self.generator.generate_narrative(&request).await {
            Err(err) => {
                let mut s = session.lock().await;
                s.player_name = previous_name;
                s.is_loading = false;
                s.error = Some(TRANSPORT_ERROR.to_string());
                Err(err.into())
            }
            Ok(reply) => {
                let mut s = session.lock().await;
                let (mut narrative, mut choices, location, illustration_prompt) =
                    match opening_shape(&reply) {
                        Some(parts) => parts,
                        None => {
                            warn!("opening reply violated the declared shape, substituting");
                            (
                                FALLBACK_OPENING.to_string(),
                                FALLBACK_CHOICES.map(String::from).to_vec(),
                                None,
                                None,
                            )
                        }
                    };

                s.current_turn = 1;
                let is_last = s.is_last_turn();
                enforce_choice_contract(&mut narrative, &mut choices, is_last);

                let mut state = GameState::new(&player_name);
                state.location = location.unwrap_or_else(|| UNKNOWN_LOCATION.to_string());

                s.view = if is_last {
                    GameView::GameEnded
                } else {
                    GameView::GameActive
                };
                let segment_id = s.push_segment(Speaker::Narrator, narrative.clone());
                if let Some(segment) = s.segment_mut(segment_id) {
                    segment.illustration_prompt = illustration_prompt.clone();
                }
                s.choices = choices.clone();
                s.game_state = state;
                s.is_loading = false;

                Ok(TurnOutcome {
                    segment_id,
                    narrative,
                    choices,
                    illustration_prompt,
                    is_last_turn: is_last,
                    injected_event: None,
                })
            }
        }
    }

    /// Drive one continuation turn for a player action.
    pub async fn handle_action(
        &self,
        session: &SharedSession,
        action: &str,
    ) -> Result<TurnOutcome, TurnError> {
        let action = action.trim().to_string();

        let (request, injected_event, rollback, player_segment, is_last, player_name) = {
            let mut s = session.lock().await;
            if action.is_empty() {
                return Err(TurnError::EmptyAction);
            }
            let theme = s.theme.clone().ok_or(TurnError::MissingIdentity("theme"))?;
            let hero = s.hero.clone().ok_or(TurnError::MissingIdentity("hero"))?;
            let player_name = s
                .player_name
                .clone()
                .ok_or(TurnError::MissingIdentity("player name"))?;
            if s.view == GameView::GameEnded {
                return Err(TurnError::StoryEnded);
            }
            if s.view != GameView::GameActive {
                return Err(TurnError::InvalidTransition {
                    from: s.view,
                    to: GameView::GameActive,
                });
            }

            let rollback = Rollback {
                choices: s.choices.clone(),
                game_state: s.game_state.clone(),
            };
            let last_segment = s
                .story
                .iter()
                .rev()
                .find(|segment| segment.speaker == Speaker::Narrator)
                .map(|segment| segment.text.clone());

            // Optimistic apply, compensated on transport failure.
            let player_segment = s.push_segment(Speaker::Player, &action);
            s.history.push(action.clone());
            s.current_turn += 1;
            s.choices.clear();
            s.is_loading = true;
            s.error = None;
            let is_last = s.is_last_turn();

            // Prompt from the previous game state and the updated history.
            let (request, injected_event) = {
                let mut rng = lock_rng(&self.rng);
                prompt::continuation_request(
                    &TurnContext {
                        theme: &theme,
                        scenario: s.sub_theme.as_deref(),
                        hero: &hero,
                        player_name: &player_name,
                        current_turn: s.current_turn,
                        max_turns: s.max_turns,
                        state: &rollback.game_state,
                        history: &s.history,
                        last_segment: last_segment.as_deref(),
                    },
                    &mut *rng,
                    self.event_probability,
                )
            };

            // Record the injected event before the generator sees it.
            if let Some(event) = injected_event {
                s.game_state.events.push(event.to_string());
            }

            (
                request,
                injected_event,
                rollback,
                player_segment,
                is_last,
                player_name,
            )
        };

        debug!(event = ?injected_event, "generating narrative turn");
        match self.generator.generate_narrative(&request).await {
            Err(err) => {
                warn!(%err, "generation transport failure, rolling back turn");
                let mut s = session.lock().await;
                s.pop_segment(player_segment);
                s.history.pop();
                s.current_turn -= 1;
                s.choices = rollback.choices;
                s.game_state = rollback.game_state;
                s.is_loading = false;
                s.error = Some(TRANSPORT_ERROR.to_string());
                Err(err.into())
            }
            Ok(reply) => {
                let mut s = session.lock().await;
                Ok(commit_turn(
                    &mut s,
                    reply,
                    is_last,
                    &player_name,
                    injected_event,
                ))
            }
        }
    }
}

struct Rollback {
    choices: Vec<String>,
    game_state: GameState,
}

/// Reconcile a generator reply into the session. Never fails: shape and
/// decode problems self-heal here instead of aborting the turn.
fn commit_turn(
    s: &mut SessionState,
    reply: Value,
    is_last: bool,
    player_name: &str,
    injected_event: Option<&'static str>,
) -> TurnOutcome {
    let (mut narrative, mut choices, state_text, illustration_prompt) =
        match continuation_shape(&reply) {
            Some(parts) => parts,
            None => {
                warn!("generator reply violated the declared shape, substituting fallback");
                (
                    FALLBACK_NARRATIVE.to_string(),
                    if is_last {
                        Vec::new()
                    } else {
                        FALLBACK_CHOICES.map(String::from).to_vec()
                    },
                    // Last known-valid state, including any injected event.
                    codec::encode(&s.game_state),
                    None,
                )
            }
        };

    enforce_choice_contract(&mut narrative, &mut choices, is_last);

    let (mut next_state, report) = codec::decode_with_report(&state_text, player_name);
    if report.inventory_lost() && !s.game_state.inventory.is_empty() {
        debug!("restoring previous inventory after decode repair");
        next_state.inventory = s.game_state.inventory.clone();
        narrative.push_str(INVENTORY_CAUTION);
    }

    let segment_id = s.push_segment(Speaker::Narrator, narrative.clone());
    if let Some(segment) = s.segment_mut(segment_id) {
        segment.illustration_prompt = illustration_prompt.clone();
    }
    s.choices = choices.clone();
    s.game_state = next_state;
    s.is_loading = false;
    if is_last {
        s.view = GameView::GameEnded;
    }

    TurnOutcome {
        segment_id,
        narrative,
        choices,
        illustration_prompt,
        is_last_turn: is_last,
        injected_event,
    }
}

/// Last-turn and stranded-player contracts (step 7).
fn enforce_choice_contract(narrative: &mut String, choices: &mut Vec<String>, is_last: bool) {
    if is_last {
        choices.clear();
    } else if choices.is_empty() && !narrative.trim().is_empty() {
        *choices = FALLBACK_CHOICES.map(String::from).to_vec();
        narrative.push_str(FILLER_SENTENCE);
    }
}

/// Validate the declared continuation shape: `text` string, `choices` array,
/// `updatedGameState` string.
fn continuation_shape(reply: &Value) -> Option<(String, Vec<String>, String, Option<String>)> {
    let object = reply.as_object()?;
    let text = non_empty_string(object.get("text")?)?;
    let choices = choice_list(object.get("choices")?)?;
    let state_text = object.get("updatedGameState")?.as_str()?.to_string();
    Some((text, choices, state_text, illustration_field(object)))
}

/// Validate the declared opening shape: `text` string, `choices` array,
/// `location` optional string.
fn opening_shape(reply: &Value) -> Option<(String, Vec<String>, Option<String>, Option<String>)> {
    let object = reply.as_object()?;
    let text = non_empty_string(object.get("text")?)?;
    let choices = choice_list(object.get("choices")?)?;
    let location = object
        .get("location")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from);
    Some((text, choices, location, illustration_field(object)))
}

fn non_empty_string(value: &Value) -> Option<String> {
    let text = value.as_str()?;
    if text.trim().is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// The list itself must be an array; non-string entries are dropped.
fn choice_list(value: &Value) -> Option<Vec<String>> {
    Some(
        value
            .as_array()?
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect(),
    )
}

fn illustration_field(object: &serde_json::Map<String, Value>) -> Option<String> {
    object
        .get("illustrationPrompt")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
}

fn transition(s: &mut SessionState, to: GameView) -> Result<(), TurnError> {
    if s.view.allows(to) {
        s.view = to;
        Ok(())
    } else {
        Err(TurnError::InvalidTransition { from: s.view, to })
    }
}

fn lock_rng(rng: &Mutex<StdRng>) -> std::sync::MutexGuard<'_, StdRng> {
    rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
