//! Prompt assembly for the narrator model.
//!
//! Builds the exact instruction payloads sent to the generation backend for
//! the opening segment and for each subsequent turn. Assembly performs no
//! I/O and never mutates the session; the random-event injector draws from a
//! caller-supplied [`rand::Rng`] so tests stay deterministic, and an injected
//! event is returned to the caller for recording.

use crate::codec;
use crate::state::GameState;
use chrono::Local;
use rand::Rng;

/// Probability that a random event is injected into a continuation turn.
pub const EVENT_PROBABILITY: f64 = 0.10;

/// Curated events the injector may weave into the story.
pub const RANDOM_EVENTS: &[&str] = &[
    "Une pluie d'étoiles filantes illumine soudain le ciel",
    "Un marchand ambulant apparaît au détour du chemin",
    "Une musique mystérieuse résonne au loin",
    "Un petit animal curieux se met à suivre le héros",
    "Un arc-en-ciel apparaît alors qu'il n'a pas plu",
    "Une lettre cachetée attend, posée bien en évidence",
];

/// One assembled request payload for the generation backend.
#[derive(Debug, Clone, PartialEq)]
pub struct NarrativeRequest {
    pub system: String,
    pub prompt: String,
}

/// Everything the assembler needs for one turn.
#[derive(Debug, Clone)]
pub struct TurnContext<'a> {
    pub theme: &'a str,
    /// Sub-theme scenario seed; `None` synthesizes a generic instruction.
    pub scenario: Option<&'a str>,
    pub hero: &'a str,
    pub player_name: &'a str,
    pub current_turn: u32,
    pub max_turns: u32,
    /// The game state as of *before* the turn being prompted for.
    pub state: &'a GameState,
    /// Chronological choice history; the last element is the action to
    /// react to.
    pub history: &'a [String],
    /// Text of the most recent narrator segment, if any.
    pub last_segment: Option<&'a str>,
}

impl TurnContext<'_> {
    pub fn is_last_turn(&self) -> bool {
        self.current_turn > self.max_turns
    }
}

/// Assemble the self-contained opening-turn request.
pub fn opening_request(ctx: &TurnContext<'_>) -> NarrativeRequest {
    let mut prompt = String::new();
    prompt.push_str(include_str!("prompts/opening.txt"));
    push_adventure_section(&mut prompt, ctx);

    NarrativeRequest {
        system: include_str!("prompts/narrator_base.txt").to_string(),
        prompt,
    }
}

/// Assemble a continuation-turn request.
///
/// With probability `event_probability`, one curated random event is picked,
/// appended to the `events` of the prompted state, and returned so the
/// caller can record it; the model is instructed to open its narration with
/// it. Otherwise the model is told not to invent one.
pub fn continuation_request(
    ctx: &TurnContext<'_>,
    rng: &mut impl Rng,
    event_probability: f64,
) -> (NarrativeRequest, Option<&'static str>) {
    let event = if rng.gen_bool(event_probability.clamp(0.0, 1.0)) {
        Some(RANDOM_EVENTS[rng.gen_range(0..RANDOM_EVENTS.len())])
    } else {
        None
    };

    let state_text = match event {
        Some(event) => {
            let mut state = ctx.state.clone();
            state.events.push(event.to_string());
            codec::encode(&state)
        }
        None => codec::encode(ctx.state),
    };

    let mut prompt = String::new();
    prompt.push_str(include_str!("prompts/continuation.txt"));
    if ctx.is_last_turn() {
        prompt.push('\n');
        prompt.push_str(include_str!("prompts/final_turn.txt"));
    }
    push_adventure_section(&mut prompt, ctx);

    prompt.push_str("\n## État du jeu (JSON)\n");
    prompt.push_str(&state_text);
    prompt.push('\n');

    if let Some(last_segment) = ctx.last_segment {
        prompt.push_str("\n## Dernier passage du récit\n");
        prompt.push_str(last_segment);
        prompt.push('\n');
    }

    if !ctx.history.is_empty() {
        prompt.push_str("\n## Historique des choix du joueur\n");
        for (index, choice) in ctx.history.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", index + 1, choice));
        }
    }

    if let Some(action) = ctx.history.last() {
        prompt.push_str("\n## Dernière action du joueur\n");
        prompt.push_str(action);
        prompt.push('\n');
    }

    prompt.push_str("\n## Événement imprévu\n");
    match event {
        Some(event) => prompt.push_str(&format!(
            "Un événement imprévu vient de se produire : « {event} ». Commence ta narration en le racontant.\n"
        )),
        None => prompt.push_str(
            "Aucun événement imprévu ce tour-ci : n'en invente pas et n'en mentionne pas.\n",
        ),
    }

    (
        NarrativeRequest {
            system: include_str!("prompts/narrator_base.txt").to_string(),
            prompt,
        },
        event,
    )
}

/// Synthesize a fresh illustration prompt for a story segment, used by the
/// manual "generate now" and retry paths.
pub fn illustration_prompt_for(theme: &str, segment_text: &str) -> String {
    let excerpt: String = segment_text.chars().take(240).collect();
    format!(
        "Children's storybook illustration, soft watercolors, warm and friendly, \
         no text. Theme: {theme}. Scene: {excerpt}"
    )
}

fn push_adventure_section(prompt: &mut String, ctx: &TurnContext<'_>) {
    prompt.push_str("\n## Aventure\n");
    prompt.push_str(&format!("Thème : {}\n", ctx.theme));
    match ctx.scenario {
        Some(scenario) => prompt.push_str(&format!("Scénario : {scenario}\n")),
        None => prompt.push_str("Scénario : invente un scénario original sur ce thème.\n"),
    }
    prompt.push_str(&format!("Héros : {}\n", ctx.hero));
    prompt.push_str(&format!("Prénom du joueur : {}\n", ctx.player_name));
    prompt.push_str(&format!(
        "Tour : {} sur {}\n",
        ctx.current_turn.min(ctx.max_turns),
        ctx.max_turns
    ));
    prompt.push_str(&format!("Date du jour : {}\n", french_date()));
}

fn french_date() -> String {
    Local::now().format("%d/%m/%Y").to_string()
}
