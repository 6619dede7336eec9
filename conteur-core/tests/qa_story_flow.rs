//! QA tests for the basic story flow.
//!
//! These tests drive full sessions against the scripted mock backend:
//! - Menu flow and view transitions
//! - Opening turn and continuation turns
//! - Prompt content (state, history, last action)
//! - Random-event injection

use conteur_core::session::SessionConfig;
use conteur_core::testing::{assert_story_len, assert_turn, assert_view, TestHarness};
use conteur_core::{GameView, Speaker, TurnError, UNKNOWN_LOCATION};
use serde_json::json;

#[tokio::test]
async fn test_full_story_flow() {
    let harness = TestHarness::new();
    let opening = harness.start().await.expect("opening");

    assert_eq!(opening.choices.len(), 2);
    assert!(!opening.is_last_turn);
    harness
        .with_session(|s| {
            assert_view(s, GameView::GameActive);
            assert_turn(s, 1);
            assert_story_len(s, 1);
            assert_eq!(s.story[0].speaker, Speaker::Narrator);
            assert_eq!(s.game_state.location, "La Clairière aux Lucioles");
            assert!(s.history.is_empty());
        })
        .await;

    harness.generator.queue_reply(
        "Les lumières te guident vers un vieux chêne.",
        &["Frapper à la porte du chêne", "Faire le tour de l'arbre"],
        r#"{"playerName": "Léa", "location": "Le Vieux Chêne", "inventory": [], "relationships": {}, "emotions": ["émerveillée"], "events": ["a suivi les lucioles"]}"#,
    );
    let turn = harness.play("Suivre les lumières").await.expect("turn 2");

    assert_eq!(turn.choices.len(), 2);
    harness
        .with_session(|s| {
            assert_turn(s, 2);
            assert_story_len(s, 3);
            assert_eq!(s.story[1].speaker, Speaker::Player);
            assert_eq!(s.story[1].text, "Suivre les lumières");
            assert_eq!(s.game_state.location, "Le Vieux Chêne");
            assert_eq!(s.game_state.emotions, vec!["émerveillée"]);
            assert_eq!(s.history, vec!["Suivre les lumières"]);
            assert!(!s.is_loading);
            assert!(s.error.is_none());
        })
        .await;
}

#[tokio::test]
async fn test_continuation_prompt_carries_context() {
    let harness = TestHarness::new();
    harness.start().await.expect("opening");

    harness.generator.queue_reply(
        "Tu avances.",
        &["Continuer"],
        r#"{"playerName": "Léa", "location": "Le Sentier"}"#,
    );
    harness.play("Suivre les lumières").await.expect("turn 2");

    harness.generator.queue_reply(
        "Tu continues.",
        &["Encore"],
        r#"{"playerName": "Léa", "location": "Le Sentier"}"#,
    );
    harness.play("Continuer").await.expect("turn 3");

    let requests = harness.generator.requests();
    assert_eq!(requests.len(), 3);

    // The third request reacts to the second action, with full history and
    // the state produced by the previous turn.
    let prompt = &requests[2].prompt;
    assert!(prompt.contains("1. Suivre les lumières"));
    assert!(prompt.contains("2. Continuer"));
    assert!(prompt.contains("## Dernière action du joueur\nContinuer"));
    assert!(prompt.contains("## Dernier passage du récit\nTu avances."));
    assert!(prompt.contains("Le Sentier"));
    assert!(requests[2].system.contains("conteur"));
}

#[tokio::test]
async fn test_menu_flow_rejects_shortcuts() {
    let harness = TestHarness::new();

    // Straight to hero selection from the menu is not a legal transition.
    let err = harness.session.choose_hero("Exploratrice").await;
    assert!(err.is_err());

    // Acting before the game started fails on identity validation.
    let err = harness.session.act("Avancer").await;
    assert!(matches!(
        err,
        Err(conteur_core::SessionError::Turn(TurnError::MissingIdentity(_)))
    ));

    harness
        .with_session(|s| {
            assert_view(s, GameView::Menu);
            assert_story_len(s, 0);
        })
        .await;
}

#[tokio::test]
async fn test_return_to_menu_resets_everything() {
    let harness = TestHarness::new();
    harness.start().await.expect("opening");

    harness.session.return_to_menu().await;
    harness
        .with_session(|s| {
            assert_view(s, GameView::Menu);
            assert_turn(s, 0);
            assert_story_len(s, 0);
            assert!(s.theme.is_none());
            assert!(s.player_name.is_none());
            assert!(s.choices.is_empty());
        })
        .await;

    // A fresh game can start again afterwards.
    harness.start().await.expect("second opening");
    harness
        .with_session(|s| assert_view(s, GameView::GameActive))
        .await;
}

#[tokio::test]
async fn test_event_injection_recorded_and_prompted() {
    let harness = TestHarness::with_config(
        SessionConfig::new()
            .with_rng_seed(7)
            .with_event_probability(1.0),
    );
    harness.start().await.expect("opening");

    harness.generator.queue_reply(
        "Quelle surprise !",
        &["Continuer"],
        r#"{"playerName": "Léa"}"#,
    );
    let turn = harness.play("Avancer").await.expect("turn");

    let event = turn.injected_event.expect("event should be injected");
    assert!(conteur_core::prompt::RANDOM_EVENTS.contains(&event));

    let requests = harness.generator.requests();
    let prompt = &requests[1].prompt;
    assert!(prompt.contains(event));
    assert!(prompt.contains("Commence ta narration"));
}

#[tokio::test]
async fn test_opening_shape_violation_self_heals() {
    let harness = TestHarness::new();
    harness.generator.queue_value(json!({"story": "pas le bon champ"}));
    harness.setup_identity().await.expect("identity");

    let opening = harness.session.begin("Léa").await.expect("opening");
    assert!(!opening.narrative.is_empty());
    assert_eq!(opening.choices.len(), 2);

    harness
        .with_session(|s| {
            assert_view(s, GameView::GameActive);
            assert_turn(s, 1);
            assert_eq!(s.game_state.location, UNKNOWN_LOCATION);
            assert_eq!(s.game_state.player_name, "Léa");
            assert!(s.error.is_none());
        })
        .await;
}

#[tokio::test]
async fn test_opening_transport_failure_reverts_to_name_input() {
    let harness = TestHarness::new();
    harness.generator.queue_failure("réseau coupé");
    harness.setup_identity().await.expect("identity");

    let result = harness.session.begin("Léa").await;
    assert!(result.is_err());
    harness
        .with_session(|s| {
            assert_view(s, GameView::NameInput);
            assert_turn(s, 0);
            assert_story_len(s, 0);
            assert!(s.error.is_some());
        })
        .await;

    // Retrying from the same view works.
    harness
        .generator
        .queue_opening("Le départ, enfin !", &["Partir"], "Le Quai");
    harness.session.begin("Léa").await.expect("retry opening");
    harness
        .with_session(|s| assert_view(s, GameView::GameActive))
        .await;
}

#[tokio::test]
async fn test_empty_player_name_is_rejected() {
    let harness = TestHarness::new();
    harness.setup_identity().await.expect("identity");

    let result = harness.session.begin("   ").await;
    assert!(matches!(
        result,
        Err(conteur_core::SessionError::Turn(TurnError::MissingIdentity(_)))
    ));
    harness
        .with_session(|s| assert_view(s, GameView::NameInput))
        .await;
}
