//! Integration tests for the file-backed persistence adapter.
//!
//! Each test works in its own directory under the system temp dir so the
//! tests can run in parallel.

use std::collections::HashMap;
use std::path::PathBuf;

use playclock_model::{CurrencyId, UserId, UserState};
use playclock_store::{JsonFileStore, Persistence, PlayerStore, StoreError};

// =========================================================================
// Helpers
// =========================================================================

fn scratch_file() -> PathBuf {
    std::env::temp_dir()
        .join(format!("playclock-test-{}", uuid::Uuid::new_v4()))
        .join("playerdata.json")
}

fn uid(n: u128) -> UserId {
    UserId(uuid::Uuid::from_u128(n))
}

fn sample_state() -> UserState {
    let mut state = UserState::new();
    state.total_active_secs = 3_600;
    state.period_active_secs = 1_200;
    state.reward_checkpoints.insert(CurrencyId::from("gold"), 3_540);
    state.reward_checkpoints.insert(CurrencyId::from("gems"), 1_800);
    state
}

// =========================================================================
// Open
// =========================================================================

#[tokio::test]
async fn test_open_missing_file_starts_empty() {
    let store = JsonFileStore::open(scratch_file()).await.unwrap();
    assert!(store.load_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_open_corrupt_file_is_refused() {
    let path = scratch_file();
    tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
    tokio::fs::write(&path, b"{ players: nope").await.unwrap();

    let result = JsonFileStore::open(&path).await;

    assert!(matches!(result, Err(StoreError::Model(_))));
}

// =========================================================================
// Round trip
// =========================================================================

#[tokio::test]
async fn test_save_then_reopen_restores_identical_state() {
    let path = scratch_file();
    let state = sample_state();

    {
        let store = JsonFileStore::open(&path).await.unwrap();
        store
            .save_all(&HashMap::from([(uid(1), state.clone())]))
            .await
            .unwrap();
    }

    let reopened = JsonFileStore::open(&path).await.unwrap();
    assert_eq!(reopened.load(uid(1)).await.unwrap(), Some(state));
}

#[tokio::test]
async fn test_written_document_uses_documented_keys() {
    let path = scratch_file();
    let store = JsonFileStore::open(&path).await.unwrap();
    store
        .save_all(&HashMap::from([(uid(1), sample_state())]))
        .await
        .unwrap();

    let text = tokio::fs::read_to_string(&path).await.unwrap();
    let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
    let player = &doc["players"][uid(1).to_string()];
    assert_eq!(player["totalTime"], 3_600);
    assert_eq!(player["periodTime"], 1_200);
    assert_eq!(player["lastRewardTimes"]["gold"], 3_540);
}

#[tokio::test]
async fn test_save_all_is_an_upsert() {
    let path = scratch_file();
    let store = JsonFileStore::open(&path).await.unwrap();
    store
        .save_all(&HashMap::from([(uid(1), sample_state())]))
        .await
        .unwrap();
    store
        .save_all(&HashMap::from([(uid(2), UserState::new())]))
        .await
        .unwrap();

    let reopened = JsonFileStore::open(&path).await.unwrap();
    assert_eq!(reopened.load_all().await.unwrap().len(), 2);
}

// =========================================================================
// Malformed entries
// =========================================================================

#[tokio::test]
async fn test_load_all_skips_malformed_user_keys() {
    let path = scratch_file();
    tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
    let doc = format!(
        r#"{{ "players": {{
            "{}": {{ "totalTime": 10, "periodTime": 4 }},
            "Notch": {{ "totalTime": 99 }}
        }} }}"#,
        uid(1)
    );
    tokio::fs::write(&path, doc).await.unwrap();

    let store = JsonFileStore::open(&path).await.unwrap();
    let users = store.load_all().await.unwrap();

    assert_eq!(users.len(), 1);
    assert_eq!(users[0].0, uid(1));
    assert_eq!(users[0].1.total_active_secs, 10);
    assert!(users[0].1.reward_checkpoints.is_empty());
}

#[tokio::test]
async fn test_malformed_keys_survive_a_save() {
    let path = scratch_file();
    tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
    tokio::fs::write(&path, r#"{ "players": { "Notch": { "totalTime": 99 } } }"#)
        .await
        .unwrap();

    let store = JsonFileStore::open(&path).await.unwrap();
    store
        .save_all(&HashMap::from([(uid(1), UserState::new())]))
        .await
        .unwrap();

    let text = tokio::fs::read_to_string(&path).await.unwrap();
    assert!(text.contains("Notch"));
}

// =========================================================================
// Period reset and the player store on top of the file
// =========================================================================

#[tokio::test]
async fn test_reset_all_period_zeroes_every_stored_user() {
    let path = scratch_file();
    let store = JsonFileStore::open(&path).await.unwrap();
    store
        .save_all(&HashMap::from([(uid(1), sample_state()), (uid(2), sample_state())]))
        .await
        .unwrap();

    store.reset_all_period().await.unwrap();

    for (_, state) in store.load_all().await.unwrap() {
        assert_eq!(state.period_active_secs, 0);
        assert_eq!(state.total_active_secs, 3_600);
    }
}

#[tokio::test]
async fn test_player_store_survives_restart() {
    let path = scratch_file();

    {
        let players = PlayerStore::open(JsonFileStore::open(&path).await.unwrap())
            .await
            .unwrap();
        players.add_active_time(uid(5), 125).await;
        players
            .update(uid(5), |s| s.mark_checkpoint(&CurrencyId::from("gold")))
            .await;
        players.save_all().await.unwrap();
    }

    let players = PlayerStore::open(JsonFileStore::open(&path).await.unwrap())
        .await
        .unwrap();
    let state = players.get(uid(5)).await.expect("loaded eagerly");
    assert_eq!(state.total_active_secs, 125);
    assert_eq!(state.checkpoint("gold"), Some(125));
}
