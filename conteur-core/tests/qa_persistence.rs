//! QA tests for save-slot persistence.
//!
//! A saved session must round-trip the full state - story log, counters,
//! encoded game state - and a loaded session must be playable.

use conteur_core::testing::{assert_story_len, assert_turn, assert_view, TestHarness};
use conteur_core::{GameView, PersistError, SaveStore, SessionError};
use tempfile::TempDir;

async fn played_harness() -> TestHarness {
    let harness = TestHarness::new();
    harness.start().await.expect("opening");

    harness.generator.queue_reply(
        "Tu trouves une clé d'argent sous une pierre.",
        &["Garder la clé", "La remettre en place"],
        r#"{"playerName": "Léa", "location": "Le Vieux Chêne", "inventory": [{"name": "clé d'argent", "quantity": 1}], "relationships": {"Lutin des bois": "curieux"}, "emotions": ["intriguée"], "events": ["a trouvé la clé d'argent"]}"#,
    );
    harness.play("Chercher sous la pierre").await.expect("turn 2");
    harness
}

#[tokio::test]
async fn test_save_load_round_trip() {
    let dir = TempDir::new().expect("temp dir");
    let store = SaveStore::new(dir.path());

    let harness = played_harness().await;
    harness
        .session
        .save(&store, "Partie de Léa")
        .await
        .expect("save");

    let saves = store.list().await.expect("list");
    assert_eq!(saves.len(), 1);
    assert_eq!(saves[0].name, "Partie de Léa");
    assert_eq!(saves[0].player_name, "Léa");
    assert_eq!(saves[0].theme, "Forêt Enchantée");
    assert_eq!(saves[0].hero, "Exploratrice");
    assert_eq!(saves[0].turn, 2);
    assert_eq!(saves[0].max_turn, 15);

    // Load into a brand-new session.
    let fresh = TestHarness::new();
    fresh
        .session
        .load(&store, "Partie de Léa")
        .await
        .expect("load");

    fresh
        .with_session(|s| {
            assert_view(s, GameView::GameActive);
            assert_turn(s, 2);
            assert_story_len(s, 3);
            assert_eq!(s.player_name.as_deref(), Some("Léa"));
            assert_eq!(s.game_state.location, "Le Vieux Chêne");
            assert_eq!(s.game_state.inventory[0].name, "clé d'argent");
            assert_eq!(s.game_state.relationships["Lutin des bois"], "curieux");
            assert_eq!(s.history, vec!["Chercher sous la pierre"]);
            assert_eq!(
                s.choices,
                vec!["Garder la clé", "La remettre en place"]
            );
        })
        .await;

    // The loaded session keeps playing normally.
    fresh.generator.queue_reply(
        "La clé ouvre une petite porte dans le tronc.",
        &["Entrer"],
        r#"{"playerName": "Léa", "location": "Dans le tronc"}"#,
    );
    fresh.play("Garder la clé").await.expect("turn after load");
    fresh
        .with_session(|s| {
            assert_turn(s, 3);
            assert_story_len(s, 5);
        })
        .await;
}

#[tokio::test]
async fn test_load_missing_slot_reports_and_resets() {
    let dir = TempDir::new().expect("temp dir");
    let store = SaveStore::new(dir.path());

    let harness = TestHarness::new();
    let result = harness.session.load(&store, "Inexistante").await;

    assert!(matches!(
        result,
        Err(SessionError::Persist(PersistError::NotFound(_)))
    ));
    harness
        .with_session(|s| {
            assert_view(s, GameView::Menu);
            assert!(s.error.is_some());
        })
        .await;
}

#[tokio::test]
async fn test_finished_game_loads_as_ended() {
    let dir = TempDir::new().expect("temp dir");
    let store = SaveStore::new(dir.path());

    let harness = TestHarness::with_config(
        conteur_core::SessionConfig::new()
            .with_max_turns(1)
            .with_rng_seed(42)
            .with_event_probability(0.0),
    );
    harness.start().await.expect("opening");
    harness.generator.queue_reply(
        "Fin de l'histoire, bonne nuit !",
        &[],
        r#"{"playerName": "Léa"}"#,
    );
    harness.play("Terminer").await.expect("final turn");
    harness.session.save(&store, "Finie").await.expect("save");

    let fresh = TestHarness::new();
    fresh.session.load(&store, "Finie").await.expect("load");
    fresh
        .with_session(|s| {
            assert_view(s, GameView::GameEnded);
            assert!(s.choices.is_empty());
        })
        .await;
}

#[tokio::test]
async fn test_delete_then_list_is_empty() {
    let dir = TempDir::new().expect("temp dir");
    let store = SaveStore::new(dir.path());

    let harness = played_harness().await;
    harness.session.save(&store, "Éphémère").await.expect("save");
    assert_eq!(store.list().await.expect("list").len(), 1);

    store.delete("Éphémère").await.expect("delete");
    assert!(store.list().await.expect("list").is_empty());

    assert!(matches!(
        store.delete("Éphémère").await,
        Err(PersistError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_most_recent_save_listed_first() {
    let dir = TempDir::new().expect("temp dir");
    let store = SaveStore::new(dir.path());

    let harness = played_harness().await;
    harness.session.save(&store, "Première").await.expect("save");
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    harness.session.save(&store, "Seconde").await.expect("save");

    let saves = store.list().await.expect("list");
    assert_eq!(saves.len(), 2);
    assert_eq!(saves[0].name, "Seconde");
    assert_eq!(saves[1].name, "Première");
}
