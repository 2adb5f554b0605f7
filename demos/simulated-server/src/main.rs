//! A fake game server driving Playclock.
//!
//! Simulated players join, leave and go idle at random. Rewards land in an
//! in-memory wallet and state is written to a JSON data file.
//!
//! ```text
//! cargo run -p simulated-server -- [settings.toml] [playerdata.json]
//! RUST_LOG=debug cargo run -p simulated-server
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use playclock::prelude::*;
use rand::Rng;
use tracing_subscriber::EnvFilter;

const DEFAULT_SETTINGS: &str = r#"
reward_tick_secs = 5
persist_tick_secs = 30
reward_message = "You received {amount} {currency} for playing!"
broadcast_on_reward = true

[currencies.coins]
reward_interval_minutes = 1
reward_default = 10.0

[currencies.gems]
reward_interval_minutes = 3
reward_default = 1.0
"#;

const NAMES: &[&str] = &["ada", "brook", "cyd", "dune", "echo", "fern"];

// ---------------------------------------------------------------------------
// Host side
// ---------------------------------------------------------------------------

#[derive(Default)]
struct World {
    online: Mutex<HashSet<UserId>>,
    idle: Mutex<HashSet<UserId>>,
    names: HashMap<UserId, &'static str>,
}

impl World {
    fn new() -> Self {
        let names = NAMES
            .iter()
            .enumerate()
            .map(|(i, name)| (UserId(uuid_for(i)), *name))
            .collect();
        Self {
            names,
            ..Self::default()
        }
    }
}

fn uuid_for(i: usize) -> uuid::Uuid {
    uuid::Uuid::from_u128(0x5EED_0000 + i as u128)
}

impl SessionHost for World {
    fn connected_users(&self) -> Vec<UserId> {
        self.online.lock().map(|o| o.iter().copied().collect()).unwrap_or_default()
    }

    fn display_name(&self, user: UserId) -> Option<String> {
        self.names.get(&user).map(|n| n.to_string())
    }

    fn send_message(&self, user: UserId, text: &str) {
        let name = self.names.get(&user).copied().unwrap_or("?");
        tracing::info!(to = name, "[chat] {text}");
    }

    fn broadcast(&self, text: &str) {
        tracing::info!("[broadcast] {text}");
    }
}

impl IdleProvider for World {
    fn is_idle(&self, user: UserId) -> bool {
        self.idle.lock().map(|i| i.contains(&user)).unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Ledger side
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Wallets(Mutex<HashMap<(UserId, CurrencyId), f64>>);

impl CurrencyLedger for Wallets {
    fn resolve_symbol(&self, currency: &CurrencyId) -> Option<String> {
        match currency.as_str() {
            "coins" => Some("🪙".to_string()),
            _ => None,
        }
    }

    async fn credit(&self, user: UserId, currency: &CurrencyId, amount: f64) -> Result<(), LedgerError> {
        // Occasionally pretend the economy is down so retries are visible.
        if rand::rng().random_bool(0.05) {
            return Err(LedgerError::Unavailable("economy restarting".into()));
        }
        let mut wallets = self
            .0
            .lock()
            .map_err(|_| LedgerError::Unavailable("wallets poisoned".into()))?;
        *wallets.entry((user, currency.clone())).or_default() += amount;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

enum Event {
    Join(UserId),
    Leave(UserId),
    Idle(UserId, bool),
}

fn next_event(world: &World) -> Option<Event> {
    let mut rng = rand::rng();
    let users: Vec<UserId> = world.names.keys().copied().collect();
    let user = users[rng.random_range(0..users.len())];

    let online = world.online.lock().ok()?.contains(&user);
    let idle = world.idle.lock().ok()?.contains(&user);
    Some(match (online, rng.random_range(0..10)) {
        (false, _) => Event::Join(user),
        (true, 0..=1) => Event::Leave(user),
        (true, 2..=4) => Event::Idle(user, !idle),
        (true, _) => return None,
    })
}

async fn simulate<P: Persistence, L: CurrencyLedger>(world: &World, service: &PlayclockService<P, L>) {
    let Some(event) = next_event(world) else {
        return;
    };
    match event {
        Event::Join(user) => {
            if let Ok(mut online) = world.online.lock() {
                online.insert(user);
            }
            service.on_connected(user).await;
        }
        Event::Leave(user) => {
            if let Ok(mut online) = world.online.lock() {
                online.remove(&user);
            }
            if let Ok(mut idle) = world.idle.lock() {
                idle.remove(&user);
            }
            service.on_disconnected(user).await;
        }
        Event::Idle(user, now_idle) => {
            if let Ok(mut idle) = world.idle.lock() {
                if now_idle {
                    idle.insert(user);
                } else {
                    idle.remove(&user);
                }
            }
            service.on_idle_changed(user, now_idle).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let settings = match args.next() {
        Some(path) => Settings::load(path).await?,
        None => Settings::from_toml_str(DEFAULT_SETTINGS)?,
    };
    let data_path = args.next().unwrap_or_else(|| "playerdata.json".to_string());

    let world = Arc::new(World::new());
    let wallets = Arc::new(Wallets::default());
    let service = PlayclockService::builder(JsonFileStore::open(&data_path).await?, Arc::clone(&wallets), world.clone())
        .settings(settings)
        .idle(world.clone())
        .build()
        .await?;

    let running = service.start().await;
    tracing::info!(data = %data_path, "simulation running, ctrl-c to stop");

    let mut events = tokio::time::interval(Duration::from_secs(2));
    let mut report = tokio::time::interval(Duration::from_secs(60));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = events.tick() => simulate(&world, running.service()).await,
            _ = report.tick() => {
                for (user, secs) in running.service().total_times().await? {
                    let name = world.display_name(user).unwrap_or_else(|| user.to_string());
                    tracing::info!(player = %name, total = %format_duration(secs), "leaderboard");
                }
            }
        }
    }

    let saved = running.shutdown().await?;
    tracing::info!(saved, "simulation stopped");
    Ok(())
}
