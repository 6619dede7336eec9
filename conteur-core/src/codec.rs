//! Textual codec for the game state exchanged with the generator.
//!
//! The generator is an untrusted producer: its "updated game state" text may
//! be empty, truncated, fenced, or structurally wrong in any single field.
//! [`decode`] therefore never fails, and every field is validated on its own
//! so one corrupt field never invalidates its siblings. [`encode`] always
//! yields valid JSON text, falling back to a minimal document carrying an
//! `"encode_error"` event if serialization itself goes wrong.

use crate::state::{GameState, InventoryItem, DEFAULT_PLAYER_NAME, UNKNOWN_LOCATION};
use serde_json::{Map, Value};
use tracing::warn;

/// Event recorded in the fallback document when encoding fails.
pub const ENCODE_ERROR_EVENT: &str = "encode_error";

/// What the decoder had to repair or default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeReport {
    /// The input was empty, unparsable, or not a JSON object.
    pub unparsable: bool,
    /// The inventory was missing or malformed, or items were dropped.
    pub inventory_repaired: bool,
    /// Other essential fields that were missing or carried the wrong type.
    pub defaulted: Vec<&'static str>,
}

impl DecodeReport {
    /// True when the decode needed no repair at all.
    pub fn clean(&self) -> bool {
        !self.unparsable && !self.inventory_repaired && self.defaulted.is_empty()
    }

    /// True when decoded inventory content cannot be trusted: the caller
    /// should fall back to the last known-good inventory.
    pub fn inventory_lost(&self) -> bool {
        self.unparsable || self.inventory_repaired
    }
}

/// Decode generator text into a valid [`GameState`]. Never fails.
pub fn decode(text: &str, player_name_fallback: &str) -> GameState {
    decode_with_report(text, player_name_fallback).0
}

/// Decode generator text, reporting which fields had to be repaired.
pub fn decode_with_report(text: &str, player_name_fallback: &str) -> (GameState, DecodeReport) {
    let mut report = DecodeReport::default();
    let fallback_name = usable_name(player_name_fallback);

    let root = match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => map,
        other => {
            if other.is_ok() || !text.trim().is_empty() {
                warn!("game state text is not a JSON object, using defaults");
            }
            report.unparsable = true;
            report.inventory_repaired = true;
            return (GameState::new(fallback_name), report);
        }
    };

    let mut state = GameState::new(fallback_name);

    match root.get("playerName") {
        Some(Value::String(name)) if !name.trim().is_empty() => {
            state.player_name = name.clone();
        }
        _ => report.defaulted.push("playerName"),
    }

    match root.get("location") {
        Some(Value::String(location)) if !location.trim().is_empty() => {
            state.location = location.clone();
        }
        _ => report.defaulted.push("location"),
    }

    match root.get("inventory") {
        Some(Value::Array(items)) => {
            let mut dropped = false;
            for item in items {
                match decode_item(item) {
                    Some(item) => state.inventory.push(item),
                    None => dropped = true,
                }
            }
            if dropped {
                warn!("dropped malformed inventory items");
                report.inventory_repaired = true;
            }
        }
        _ => report.inventory_repaired = true,
    }

    match root.get("relationships") {
        Some(Value::Object(entries)) => {
            for (npc, label) in entries {
                if let Value::String(label) = label {
                    state.relationships.insert(npc.clone(), label.clone());
                }
            }
        }
        _ => report.defaulted.push("relationships"),
    }

    match decode_string_list(root.get("emotions")) {
        Some(emotions) => state.emotions = emotions,
        None => report.defaulted.push("emotions"),
    }

    match decode_string_list(root.get("events")) {
        Some(events) => state.events = events,
        None => report.defaulted.push("events"),
    }

    for (key, value) in &root {
        if !is_essential_key(key) {
            state.extra.insert(key.clone(), value.clone());
        }
    }

    (state, report)
}

/// Encode a [`GameState`] as JSON text. Always yields valid JSON.
pub fn encode(state: &GameState) -> String {
    let mut root = Map::new();

    // Passthrough first so the canonical fields below always win.
    for (key, value) in &state.extra {
        root.insert(key.clone(), value.clone());
    }

    root.insert(
        "playerName".to_string(),
        Value::String(usable_name(&state.player_name)),
    );
    root.insert(
        "location".to_string(),
        Value::String(if state.location.trim().is_empty() {
            UNKNOWN_LOCATION.to_string()
        } else {
            state.location.clone()
        }),
    );
    root.insert(
        "inventory".to_string(),
        Value::Array(
            state
                .inventory
                .iter()
                .filter(|item| !item.name.trim().is_empty())
                .map(encode_item)
                .collect(),
        ),
    );
    root.insert(
        "relationships".to_string(),
        Value::Object(
            state
                .relationships
                .iter()
                .map(|(npc, label)| (npc.clone(), Value::String(label.clone())))
                .collect(),
        ),
    );
    root.insert("emotions".to_string(), string_list(&state.emotions));
    root.insert("events".to_string(), string_list(&state.events));

    match serde_json::to_string(&Value::Object(root)) {
        Ok(text) => text,
        Err(err) => {
            warn!(%err, "game state serialization failed, emitting fallback document");
            fallback_document(state)
        }
    }
}

fn decode_item(value: &Value) -> Option<InventoryItem> {
    let object = value.as_object()?;

    let name = match object.get("name") {
        Some(Value::String(name)) if !name.trim().is_empty() => name.clone(),
        _ => return None,
    };

    // A missing quantity means "one of"; a present but non-numeric, negative
    // or fractional quantity disqualifies the item.
    let quantity = match object.get("quantity") {
        None => 1,
        Some(value) => value.as_u64()?,
    };

    let extra = object
        .iter()
        .filter(|(key, _)| key.as_str() != "name" && key.as_str() != "quantity")
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Some(InventoryItem {
        name,
        quantity,
        extra,
    })
}

fn encode_item(item: &InventoryItem) -> Value {
    let mut object = Map::new();
    for (key, value) in &item.extra {
        object.insert(key.clone(), value.clone());
    }
    object.insert("name".to_string(), Value::String(item.name.clone()));
    object.insert("quantity".to_string(), Value::from(item.quantity));
    Value::Object(object)
}

fn decode_string_list(value: Option<&Value>) -> Option<Vec<String>> {
    match value {
        Some(Value::Array(entries)) => Some(
            entries
                .iter()
                .filter_map(|entry| entry.as_str())
                .map(String::from)
                .collect(),
        ),
        _ => None,
    }
}

fn string_list(entries: &[String]) -> Value {
    Value::Array(entries.iter().cloned().map(Value::String).collect())
}

fn is_essential_key(key: &str) -> bool {
    matches!(
        key,
        "playerName" | "location" | "inventory" | "relationships" | "emotions" | "events"
    )
}

fn usable_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        DEFAULT_PLAYER_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

fn fallback_document(state: &GameState) -> String {
    // Value's Display is infallible, so this path cannot fail again.
    let name = Value::String(usable_name(&state.player_name)).to_string();
    let location = Value::String(state.location.clone()).to_string();
    format!(
        r#"{{"playerName":{name},"location":{location},"inventory":[],"relationships":{{}},"emotions":[],"events":["{ENCODE_ERROR_EVENT}"]}}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_empty_string() {
        let state = decode("", "Alex");
        assert_eq!(state.player_name, "Alex");
        assert_eq!(state.location, UNKNOWN_LOCATION);
        assert!(state.inventory.is_empty());
        assert!(state.relationships.is_empty());
        assert!(state.emotions.is_empty());
        assert!(state.events.is_empty());
    }

    #[test]
    fn test_decode_totality() {
        let garbled = [
            "",
            "   ",
            "pas du json",
            "{invalid json",
            "[1, 2, 3]",
            "42",
            "null",
            r#""just a string""#,
            r#"{"playerName": 12, "inventory": "épée", "relationships": [], "emotions": 3, "events": {"a": 1}}"#,
        ];

        for text in garbled {
            let state = decode(text, "Alex");
            assert_eq!(state.player_name, "Alex", "input: {text:?}");
            assert!(!state.location.is_empty());
            assert!(state.inventory.is_empty());
            assert!(state.relationships.is_empty());
            assert!(state.emotions.is_empty());
            assert!(state.events.is_empty());
        }
    }

    #[test]
    fn test_decode_empty_fallback_name() {
        let state = decode("{}", "   ");
        assert_eq!(state.player_name, DEFAULT_PLAYER_NAME);
    }

    #[test]
    fn test_decode_well_formed() {
        let text = r#"{
            "playerName": "Léa",
            "location": "La Forêt des Lucioles",
            "inventory": [
                {"name": "lanterne", "quantity": 1},
                {"name": "baies", "quantity": 3, "couleur": "rouge"}
            ],
            "relationships": {"Pixel le renard": "ami fidèle"},
            "emotions": ["curieuse", "joyeuse"],
            "events": ["a trouvé la lanterne"]
        }"#;

        let (state, report) = decode_with_report(text, "Alex");
        assert!(report.clean());
        assert_eq!(state.player_name, "Léa");
        assert_eq!(state.location, "La Forêt des Lucioles");
        assert_eq!(state.inventory.len(), 2);
        assert_eq!(state.inventory[1].quantity, 3);
        assert_eq!(state.inventory[1].extra["couleur"], "rouge");
        assert_eq!(state.relationships["Pixel le renard"], "ami fidèle");
        assert_eq!(state.emotions, vec!["curieuse", "joyeuse"]);
        assert_eq!(state.events, vec!["a trouvé la lanterne"]);
    }

    #[test]
    fn test_one_corrupt_field_spares_the_others() {
        let text = r#"{
            "playerName": "Léa",
            "location": "Le Château",
            "inventory": "une épée",
            "relationships": {"Roi": "bienveillant"},
            "emotions": ["fière"],
            "events": ["est entrée au château"]
        }"#;

        let (state, report) = decode_with_report(text, "Alex");
        assert!(report.inventory_repaired);
        assert!(report.inventory_lost());
        assert!(state.inventory.is_empty());
        // Siblings survive untouched.
        assert_eq!(state.player_name, "Léa");
        assert_eq!(state.location, "Le Château");
        assert_eq!(state.relationships["Roi"], "bienveillant");
        assert_eq!(state.emotions, vec!["fière"]);
        assert_eq!(state.events, vec!["est entrée au château"]);
    }

    #[test]
    fn test_malformed_items_dropped_valid_kept() {
        let text = r#"{
            "playerName": "Léa",
            "inventory": [
                {"name": "clé", "quantity": 1},
                {"quantity": 2},
                {"name": "potion", "quantity": "beaucoup"},
                {"name": "sablier", "quantity": -1},
                {"name": "plume"},
                "une corde"
            ]
        }"#;

        let (state, report) = decode_with_report(text, "Alex");
        assert!(report.inventory_repaired);
        let names: Vec<_> = state.inventory.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["clé", "plume"]);
        assert_eq!(state.inventory[1].quantity, 1);
    }

    #[test]
    fn test_unknown_fields_pass_through() {
        let text = r#"{"playerName": "Léa", "weather": "orage", "mana": 7}"#;
        let state = decode(text, "Alex");
        assert_eq!(state.extra["weather"], "orage");
        assert_eq!(state.extra["mana"], 7);

        let encoded = encode(&state);
        let value: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["weather"], "orage");
        assert_eq!(value["mana"], 7);
    }

    #[test]
    fn test_encode_always_valid_json() {
        let mut state = GameState::new("");
        state.location = String::new();
        state.inventory.push(InventoryItem::new("", 1));
        state.inventory.push(InventoryItem::new("clé \"dorée\"", 2));
        state.emotions.push("ému\nencore".to_string());

        let encoded = encode(&state);
        let value: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["playerName"], DEFAULT_PLAYER_NAME);
        assert_eq!(value["location"], UNKNOWN_LOCATION);
        // The unnamed item was defaulted away.
        assert_eq!(value["inventory"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_round_trip_idempotence() {
        let inputs = [
            "",
            "n'importe quoi",
            r#"{"playerName": "Léa", "location": "Le Port", "inventory": [{"name": "carte", "quantity": 1, "état": "froissée"}], "relationships": {"Capitaine": "méfiant"}, "emotions": ["intriguée"], "events": ["a vu un navire"], "météo": "brume"}"#,
            r#"{"inventory": "cassé", "events": ["seul champ valide"]}"#,
        ];

        for input in inputs {
            let first = decode(input, "Alex");
            let second = decode(&encode(&first), "Alex");
            assert_eq!(first, second, "input: {input:?}");
        }
    }

    #[test]
    fn test_fallback_document_is_valid() {
        let state = GameState::new("Léa \"la vaillante\"");
        let text = fallback_document(&state);
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["playerName"], "Léa \"la vaillante\"");
        assert_eq!(value["events"][0], ENCODE_ERROR_EVENT);
    }
}
