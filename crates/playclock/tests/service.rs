//! End-to-end tests for `PlayclockService`.
//!
//! Playtime is driven by a `ManualClock`; background ticks (where used) by
//! Tokio's paused clock. Persistence is a `MemoryStore`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use playclock::prelude::*;
use playclock::RewardTickReport;
use playclock_session::ManualClock;

// =========================================================================
// Test doubles
// =========================================================================

/// An in-memory game server.
#[derive(Default)]
struct TestHost {
    online: Mutex<HashSet<UserId>>,
    names: Mutex<HashMap<UserId, String>>,
    messages: Mutex<Vec<(UserId, String)>>,
    broadcasts: Mutex<Vec<String>>,
}

impl TestHost {
    fn join(&self, user: UserId, name: &str) {
        self.online.lock().unwrap().insert(user);
        self.names.lock().unwrap().insert(user, name.to_string());
    }

    fn leave(&self, user: UserId) {
        self.online.lock().unwrap().remove(&user);
    }

    fn messages_for(&self, user: UserId) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| *u == user)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl SessionHost for TestHost {
    fn connected_users(&self) -> Vec<UserId> {
        let mut users: Vec<_> = self.online.lock().unwrap().iter().copied().collect();
        users.sort();
        users
    }

    fn display_name(&self, user: UserId) -> Option<String> {
        self.names.lock().unwrap().get(&user).cloned()
    }

    fn send_message(&self, user: UserId, text: &str) {
        self.messages.lock().unwrap().push((user, text.to_string()));
    }

    fn broadcast(&self, text: &str) {
        self.broadcasts.lock().unwrap().push(text.to_string());
    }
}

/// A ledger that records credits and can fail or hang per user.
#[derive(Default)]
struct TestLedger {
    credits: Mutex<Vec<(UserId, CurrencyId, f64)>>,
    failing: Mutex<HashSet<UserId>>,
    hanging: Mutex<HashSet<UserId>>,
}

impl TestLedger {
    fn total_for(&self, user: UserId, currency: &str) -> f64 {
        self.credits
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, c, _)| *u == user && c.as_str() == currency)
            .map(|(_, _, a)| a)
            .sum()
    }

    fn grants(&self) -> usize {
        self.credits.lock().unwrap().len()
    }
}

impl CurrencyLedger for TestLedger {
    fn resolve_symbol(&self, currency: &CurrencyId) -> Option<String> {
        (currency.as_str() == "gold").then(|| "Gold".to_string())
    }

    async fn credit(&self, user: UserId, currency: &CurrencyId, amount: f64) -> Result<(), LedgerError> {
        if self.hanging.lock().unwrap().contains(&user) {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
        }
        if self.failing.lock().unwrap().contains(&user) {
            return Err(LedgerError::Unavailable("economy offline".into()));
        }
        self.credits
            .lock()
            .unwrap()
            .push((user, currency.clone(), amount));
        Ok(())
    }
}

/// Idle status the test flips directly.
#[derive(Default)]
struct TestIdle(Mutex<HashSet<UserId>>);

impl IdleProvider for TestIdle {
    fn is_idle(&self, user: UserId) -> bool {
        self.0.lock().unwrap().contains(&user)
    }
}

struct Harness {
    service: PlayclockService<MemoryStore, TestLedger>,
    host: Arc<TestHost>,
    ledger: Arc<TestLedger>,
    idle: Arc<TestIdle>,
    clock: Arc<ManualClock>,
}

fn uid(n: u128) -> UserId {
    UserId(uuid::Uuid::from_u128(n))
}

fn gold_settings() -> Settings {
    Settings::from_toml_str(
        r#"
        reward_message = "+{amount} {currency}"
        credit_timeout_ms = 1000

        [currencies.gold]
        reward_interval_minutes = 1
        reward_default = 5.0
        "#,
    )
    .unwrap()
}

async fn harness_with(persistence: MemoryStore, settings: Settings) -> Harness {
    let host = Arc::new(TestHost::default());
    let ledger = Arc::new(TestLedger::default());
    let idle = Arc::new(TestIdle::default());
    let clock = Arc::new(ManualClock::new(0));

    let service = PlayclockService::builder(persistence, Arc::clone(&ledger), host.clone())
        .settings(settings)
        .idle(idle.clone())
        .clock(clock.clone())
        .build()
        .await
        .unwrap();

    Harness {
        service,
        host,
        ledger,
        idle,
        clock,
    }
}

async fn harness() -> Harness {
    harness_with(MemoryStore::new(), gold_settings()).await
}

impl Harness {
    async fn connect(&self, user: UserId, name: &str) {
        self.host.join(user, name);
        self.service.on_connected(user).await;
    }

    async fn total(&self, user: UserId) -> u64 {
        self.service.store().get(user).await.unwrap().total_active_secs
    }
}

// =========================================================================
// Reward tick
// =========================================================================

#[tokio::test]
async fn test_first_interval_grants_once_and_notifies() {
    // Connect at t=0. The tick at t=0 initializes the checkpoint; the tick
    // at t=60 grants 5 gold and moves the checkpoint to 60.
    let h = harness().await;
    h.connect(uid(1), "alex").await;

    let first = h.service.run_reward_tick().await;
    assert_eq!(first.initialized, 1);
    assert_eq!(first.granted, 0);

    h.clock.set(60);
    let second = h.service.run_reward_tick().await;

    assert_eq!(second.granted, 1);
    assert_eq!(h.ledger.total_for(uid(1), "gold"), 5.0);
    let state = h.service.store().get(uid(1)).await.unwrap();
    assert_eq!(state.checkpoint("gold"), Some(60));
    assert_eq!(h.host.messages_for(uid(1)), vec!["+5 Gold".to_string()]);
}

#[tokio::test]
async fn test_long_gap_grants_only_once() {
    let h = harness().await;
    h.connect(uid(1), "alex").await;
    h.service.run_reward_tick().await;

    h.clock.set(500);
    h.service.run_reward_tick().await;
    h.service.run_reward_tick().await;

    assert_eq!(h.ledger.grants(), 1);
    let state = h.service.store().get(uid(1)).await.unwrap();
    assert_eq!(state.checkpoint("gold"), Some(500));
}

#[tokio::test]
async fn test_idle_user_is_skipped_and_accrues_nothing() {
    let h = harness().await;
    h.connect(uid(1), "alex").await;
    h.service.run_reward_tick().await;

    h.idle.0.lock().unwrap().insert(uid(1));
    h.service.on_idle_changed(uid(1), true).await;
    h.clock.set(600);
    let report = h.service.run_reward_tick().await;

    assert_eq!(report.skipped_idle, 1);
    assert_eq!(h.ledger.grants(), 0);
    assert_eq!(h.total(uid(1)).await, 0);
}

#[tokio::test]
async fn test_idle_user_is_evaluated_when_policy_disabled() {
    let settings = Settings {
        idle_disqualifies_reward: false,
        ..gold_settings()
    };
    let h = harness_with(MemoryStore::new(), settings).await;
    h.connect(uid(1), "alex").await;
    h.clock.set(60);
    h.service.run_reward_tick().await;

    h.idle.0.lock().unwrap().insert(uid(1));
    h.service.on_idle_changed(uid(1), true).await;
    h.clock.set(600);
    let report = h.service.run_reward_tick().await;

    // Idle time did not accrue, so nothing is due, but the user was looked at.
    assert_eq!(report.evaluated, 1);
    assert_eq!(report.skipped_idle, 0);
    assert_eq!(h.total(uid(1)).await, 60);
}

#[tokio::test]
async fn test_idle_gap_is_excluded_from_totals() {
    let h = harness().await;
    h.connect(uid(1), "alex").await;

    h.clock.set(30);
    h.service.on_idle_changed(uid(1), true).await;
    h.clock.set(45);
    h.service.on_idle_changed(uid(1), false).await;
    h.clock.set(100);
    h.service.run_reward_tick().await;

    assert_eq!(h.total(uid(1)).await, 85);
}

#[tokio::test]
async fn test_failed_credit_is_retried_next_tick() {
    let h = harness().await;
    h.connect(uid(1), "alex").await;
    h.service.run_reward_tick().await;

    h.ledger.failing.lock().unwrap().insert(uid(1));
    h.clock.set(60);
    let failed = h.service.run_reward_tick().await;
    assert_eq!(failed.failed, 1);
    assert_eq!(
        h.service.store().get(uid(1)).await.unwrap().checkpoint("gold"),
        Some(0)
    );
    assert!(h.host.messages_for(uid(1)).is_empty());

    h.ledger.failing.lock().unwrap().clear();
    let retried = h.service.run_reward_tick().await;
    assert_eq!(retried.granted, 1);
    assert_eq!(h.ledger.total_for(uid(1), "gold"), 5.0);
}

#[tokio::test(start_paused = true)]
async fn test_hung_credit_does_not_block_other_users() {
    let h = harness().await;
    h.connect(uid(1), "slow").await;
    h.connect(uid(2), "fast").await;
    h.service.run_reward_tick().await;

    h.ledger.hanging.lock().unwrap().insert(uid(1));
    h.clock.set(60);
    let report = h.service.run_reward_tick().await;

    assert_eq!(report.granted, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(h.ledger.total_for(uid(2), "gold"), 5.0);
    assert_eq!(h.ledger.total_for(uid(1), "gold"), 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_hung_credit_does_not_stall_persist_or_session_events() {
    let Harness {
        service,
        host,
        ledger,
        clock,
        ..
    } = harness().await;
    let service = Arc::new(service);
    host.join(uid(1), "slow");
    service.on_connected(uid(1)).await;
    service.run_reward_tick().await;

    ledger.hanging.lock().unwrap().insert(uid(1));
    clock.set(60);
    let reward = tokio::spawn({
        let service = Arc::clone(&service);
        async move { service.run_reward_tick().await }
    });
    // The reward tick is now waiting on the ledger for uid(1).
    tokio::task::yield_now().await;

    let before = tokio::time::Instant::now();
    let persist = tokio::spawn({
        let service = Arc::clone(&service);
        async move { service.run_persist_tick().await }
    });
    tokio::task::yield_now().await;

    host.join(uid(3), "bystander");
    service.on_connected(uid(3)).await;
    clock.set(70);
    service.on_disconnected(uid(1)).await;
    assert_eq!(before.elapsed(), Duration::ZERO);

    assert!(persist.await.unwrap().is_ok());
    assert_eq!(before.elapsed(), Duration::ZERO);
    let stored = service.store().persistence().stored(uid(1)).await.unwrap();
    assert_eq!(stored.total_active_secs, 70);

    // The hung credit times out after credit_timeout_ms.
    let report = reward.await.unwrap();
    assert_eq!(report.failed, 1);
    let state = service.store().get_or_create(uid(1)).await;
    assert_eq!(state.checkpoint("gold"), Some(0));
    assert_eq!(state.total_active_secs, 70);
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_reward_ticks_credit_once() {
    let Harness {
        service,
        host,
        ledger,
        clock,
        ..
    } = harness().await;
    let service = Arc::new(service);
    host.join(uid(1), "slow");
    service.on_connected(uid(1)).await;
    service.run_reward_tick().await;

    ledger.hanging.lock().unwrap().insert(uid(1));
    clock.set(60);
    let first = tokio::spawn({
        let service = Arc::clone(&service);
        async move { service.run_reward_tick().await }
    });
    tokio::task::yield_now().await;

    let second = service.run_reward_tick().await;
    assert_eq!(second.skipped_busy, 1);
    assert_eq!(second.evaluated, 0);

    let first = first.await.unwrap();
    assert_eq!(first.failed, 1);
    assert_eq!(ledger.grants(), 0);

    // The claim is released once the first evaluation commits.
    ledger.hanging.lock().unwrap().clear();
    let third = service.run_reward_tick().await;
    assert_eq!(third.granted, 1);
    assert_eq!(ledger.total_for(uid(1), "gold"), 5.0);
}

#[tokio::test]
async fn test_permission_override_raises_amount() {
    struct Vip;
    impl Authorization for Vip {
        fn effective_permissions(&self, _user: UserId) -> Vec<String> {
            vec!["timereward.gold.20".into(), "timereward.gold.oops".into()]
        }
    }

    let host = Arc::new(TestHost::default());
    let ledger = Arc::new(TestLedger::default());
    let clock = Arc::new(ManualClock::new(0));
    let service = PlayclockService::builder(MemoryStore::new(), Arc::clone(&ledger), host.clone())
        .settings(gold_settings())
        .authorization(Arc::new(Vip))
        .clock(clock.clone())
        .build()
        .await
        .unwrap();

    host.join(uid(1), "vip");
    service.on_connected(uid(1)).await;
    service.run_reward_tick().await;
    clock.set(60);
    service.run_reward_tick().await;

    assert_eq!(ledger.total_for(uid(1), "gold"), 20.0);
}

#[tokio::test]
async fn test_broadcast_on_reward() {
    let settings = Settings {
        broadcast_on_reward: true,
        broadcast_message: "{player} got {amount} {currency}".into(),
        ..gold_settings()
    };
    let h = harness_with(MemoryStore::new(), settings).await;
    h.connect(uid(1), "alex").await;
    h.service.run_reward_tick().await;
    h.clock.set(60);
    h.service.run_reward_tick().await;

    assert_eq!(
        *h.host.broadcasts.lock().unwrap(),
        vec!["alex got 5 Gold".to_string()]
    );
}

#[tokio::test]
async fn test_host_user_that_never_connected_is_skipped() {
    let h = harness().await;
    h.host.join(uid(9), "ghost");

    let report = h.service.run_reward_tick().await;

    assert_eq!(
        report,
        RewardTickReport {
            skipped_unknown: 1,
            ..RewardTickReport::default()
        }
    );
}

// =========================================================================
// Persistence
// =========================================================================

#[tokio::test]
async fn test_disconnect_saves_user() {
    let h = harness().await;
    h.connect(uid(1), "alex").await;
    h.clock.set(42);

    h.host.leave(uid(1));
    h.service.on_disconnected(uid(1)).await;

    let stored = h.service.store().persistence().stored(uid(1)).await.unwrap();
    assert_eq!(stored.total_active_secs, 42);
}

#[tokio::test]
async fn test_persist_tick_flushes_connected_users() {
    let h = harness().await;
    h.connect(uid(1), "alex").await;
    h.clock.set(75);

    let saved = h.service.run_persist_tick().await.unwrap();

    assert_eq!(saved, 1);
    let stored = h.service.store().persistence().stored(uid(1)).await.unwrap();
    assert_eq!(stored.total_active_secs, 75);
}

#[tokio::test]
async fn test_persist_tick_failure_keeps_memory() {
    let h = harness().await;
    h.connect(uid(1), "alex").await;
    h.clock.set(10);
    h.service.store().persistence().set_fail_saves(true);

    assert!(h.service.run_persist_tick().await.is_err());
    assert_eq!(h.total(uid(1)).await, 10);

    h.service.store().persistence().set_fail_saves(false);
    assert_eq!(h.service.save_now().await.unwrap(), 1);
}

#[tokio::test]
async fn test_restored_state_continues_from_snapshot() {
    let mut previous = UserState::new();
    previous.total_active_secs = 1_000;
    previous.reward_checkpoints.insert(CurrencyId::from("gold"), 990);
    let h = harness_with(MemoryStore::with_users([(uid(1), previous)]), gold_settings()).await;

    h.connect(uid(1), "alex").await;
    h.clock.set(50);
    let report = h.service.run_reward_tick().await;

    assert_eq!(report.granted, 1);
    assert_eq!(h.total(uid(1)).await, 1_050);
}

// =========================================================================
// Admin operations
// =========================================================================

#[tokio::test]
async fn test_reset_period_time_keeps_total() {
    let h = harness().await;
    h.connect(uid(1), "alex").await;
    h.clock.set(100);

    h.service.reset_period_time().await.unwrap();
    h.clock.set(130);
    h.service.run_reward_tick().await;

    let state = h.service.store().get(uid(1)).await.unwrap();
    assert_eq!(state.total_active_secs, 130);
    assert_eq!(state.period_active_secs, 30);
}

#[tokio::test]
async fn test_reset_period_time_reaches_offline_users() {
    let mut offline = UserState::new();
    offline.total_active_secs = 500;
    offline.period_active_secs = 500;
    let h = harness_with(MemoryStore::with_users([(uid(2), offline)]), gold_settings()).await;
    h.service.evict(uid(2)).await.unwrap();

    h.service.reset_period_time().await.unwrap();

    let stored = h.service.store().persistence().stored(uid(2)).await.unwrap();
    assert_eq!(stored.period_active_secs, 0);
    assert_eq!(stored.total_active_secs, 500);
}

#[tokio::test]
async fn test_stats_reports_progress_and_formatting() {
    let h = harness().await;
    h.connect(uid(1), "alex").await;
    h.service.run_reward_tick().await;
    h.clock.set(3_725);

    let stats = h.service.stats(uid(1)).await.unwrap().unwrap();

    assert!(stats.connected);
    assert_eq!(stats.display_name.as_deref(), Some("alex"));
    assert_eq!(stats.formatted_total(), "1h 2m 5s");
    assert_eq!(stats.currencies[0].symbol, "Gold");
    assert_eq!(stats.currencies[0].secs_until_next, Some(0));
}

#[tokio::test]
async fn test_stats_unknown_user_is_none() {
    let h = harness().await;
    assert!(h.service.stats(uid(404)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_stats_for_evicted_user_reads_persistence() {
    let h = harness().await;
    h.connect(uid(1), "alex").await;
    h.clock.set(20);
    h.host.leave(uid(1));
    h.service.on_disconnected(uid(1)).await;
    assert!(h.service.evict(uid(1)).await.unwrap());

    let stats = h.service.stats(uid(1)).await.unwrap().unwrap();

    assert!(!stats.connected);
    assert_eq!(stats.total_active_secs, 20);
    assert!(!h.service.store().contains(uid(1)).await);
}

#[tokio::test]
async fn test_total_and_period_times_are_ranked() {
    let mut offline = UserState::new();
    offline.total_active_secs = 50;
    offline.period_active_secs = 5;
    let h = harness_with(MemoryStore::with_users([(uid(3), offline)]), gold_settings()).await;
    h.connect(uid(1), "alex").await;
    h.connect(uid(2), "sam").await;
    h.clock.set(30);
    h.service.on_idle_changed(uid(2), true).await;
    h.clock.set(100);

    let totals = h.service.total_times().await.unwrap();
    let periods = h.service.period_times().await.unwrap();

    assert_eq!(totals, vec![(uid(1), 100), (uid(3), 50), (uid(2), 30)]);
    assert_eq!(periods, vec![(uid(1), 100), (uid(2), 30), (uid(3), 5)]);
}

#[tokio::test]
async fn test_evict_connected_user_reloads_on_next_fold() {
    let h = harness().await;
    h.connect(uid(1), "alex").await;
    h.clock.set(40);

    assert!(h.service.evict(uid(1)).await.unwrap());
    h.clock.set(70);
    h.service.run_reward_tick().await;

    assert_eq!(h.total(uid(1)).await, 70);
}

#[tokio::test]
async fn test_reload_settings_swaps_currencies() {
    let h = harness().await;
    h.connect(uid(1), "alex").await;
    h.service.run_reward_tick().await;

    let gems_only = Settings::from_toml_str(
        r#"
        [currencies.gems]
        reward_interval_minutes = 1
        reward_default = 2.0
        "#,
    )
    .unwrap();
    h.service.reload_settings(gems_only).await;

    let currencies = h.service.currencies().await;
    assert_eq!(currencies.len(), 1);
    assert_eq!(currencies[0].symbol, "gems");

    h.service.run_reward_tick().await;
    h.clock.set(60);
    h.service.run_reward_tick().await;

    assert_eq!(h.ledger.total_for(uid(1), "gems"), 2.0);
    assert_eq!(h.ledger.total_for(uid(1), "gold"), 0.0);
}

// =========================================================================
// Lifecycle
// =========================================================================

#[tokio::test]
async fn test_start_registers_users_already_online() {
    let h = harness().await;
    h.host.join(uid(1), "early");

    let running = h.service.start().await;
    h.clock.set(25);
    running.service().run_persist_tick().await.unwrap();

    let stored = running.service().store().persistence().stored(uid(1)).await;
    assert_eq!(stored.unwrap().total_active_secs, 25);
    running.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_paused_rewards_do_not_tick_until_resumed() {
    let settings = Settings {
        persist_tick_secs: 0,
        ..gold_settings()
    };
    let Harness {
        service,
        host,
        ledger,
        clock,
        ..
    } = harness_with(MemoryStore::new(), settings).await;
    host.join(uid(1), "alex");

    let running = service.start().await;
    running.pause_rewards();
    assert!(running.rewards_paused());
    clock.set(300);
    tokio::time::sleep(Duration::from_secs(300)).await;

    assert_eq!(running.tick_runs(), (0, 0));
    assert_eq!(ledger.grants(), 0);
    // Play time still accrues while rewards are paused.
    running.service().run_persist_tick().await.unwrap();
    let stored = running.service().store().persistence().stored(uid(1)).await;
    assert_eq!(stored.unwrap().total_active_secs, 300);

    running.resume_rewards();
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(running.tick_runs(), (1, 0));
    running.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_background_ticks_grant_and_shutdown_saves() {
    let settings = Settings {
        persist_tick_secs: 0,
        ..gold_settings()
    };
    let Harness {
        service,
        host,
        ledger,
        clock,
        ..
    } = harness_with(MemoryStore::new(), settings).await;
    host.join(uid(1), "alex");

    let running = service.start().await;
    // First reward tick (after 60s + jitter) initializes the checkpoint.
    tokio::time::sleep(Duration::from_secs(61)).await;
    clock.set(60);
    // Second tick grants.
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(ledger.total_for(uid(1), "gold"), 5.0);
    assert_eq!(running.tick_runs(), (2, 0));

    clock.set(90);
    let service = Arc::clone(running.service());
    let saved = running.shutdown().await.unwrap();

    assert_eq!(saved, 1);
    let stored = service.store().persistence().stored(uid(1)).await.unwrap();
    assert_eq!(stored.total_active_secs, 90);
    assert_eq!(stored.checkpoint("gold"), Some(60));
}
