//! Process-wide combat counters.
//! Cheap atomics bumped from the hot path; read with [`snapshot`].
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::Duration;

static ATTACKS: AtomicU64 = AtomicU64::new(0);
static HITS: AtomicU64 = AtomicU64::new(0);
static MISSES: AtomicU64 = AtomicU64::new(0);
static FUMBLES: AtomicU64 = AtomicU64::new(0);
static CRITICALS: AtomicU64 = AtomicU64::new(0);
static DOUBLES: AtomicU64 = AtomicU64::new(0);
static CREATURE_KILLS: AtomicU64 = AtomicU64::new(0);
static CHARACTER_DEATHS: AtomicU64 = AtomicU64::new(0);
static FLIGHTS: AtomicU64 = AtomicU64::new(0);
static SAVE_FAILURES: AtomicU64 = AtomicU64::new(0);
static TICKS: AtomicU64 = AtomicU64::new(0);
static TICK_TIME_SUM_US: AtomicU64 = AtomicU64::new(0);
static TICK_TIME_MAX_US: AtomicU64 = AtomicU64::new(0);

static ROOM_ROUNDS: OnceLock<Mutex<HashMap<String, u64>>> = OnceLock::new();

pub fn inc_attacks() {
    ATTACKS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_hits() {
    HITS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_misses() {
    MISSES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_fumbles() {
    FUMBLES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_criticals() {
    CRITICALS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_doubles() {
    DOUBLES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_creature_kills() {
    CREATURE_KILLS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_character_deaths() {
    CHARACTER_DEATHS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_flights() {
    FLIGHTS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_save_failures() {
    SAVE_FAILURES.fetch_add(1, Ordering::Relaxed);
}

pub fn observe_tick(elapsed: Duration) {
    let us = elapsed.as_micros().min(u128::from(u64::MAX)) as u64;
    TICKS.fetch_add(1, Ordering::Relaxed);
    TICK_TIME_SUM_US.fetch_add(us, Ordering::Relaxed);
    TICK_TIME_MAX_US.fetch_max(us, Ordering::Relaxed);
}

fn room_rounds_lock() -> &'static Mutex<HashMap<String, u64>> {
    ROOM_ROUNDS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Count one resolved combat round in `room_id`.
pub fn record_room_round(room_id: &str) -> u64 {
    let mut guard = room_rounds_lock()
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    let counter = guard.entry(room_id.to_string()).or_default();
    *counter = counter.saturating_add(1);
    *counter
}

pub fn room_rounds_snapshot() -> HashMap<String, u64> {
    room_rounds_lock()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

#[derive(Debug, Default, Clone)]
pub struct Snapshot {
    pub attacks: u64,
    pub hits: u64,
    pub misses: u64,
    pub fumbles: u64,
    pub criticals: u64,
    pub doubles: u64,
    pub creature_kills: u64,
    pub character_deaths: u64,
    pub flights: u64,
    pub save_failures: u64,
    pub ticks: u64,
    pub tick_avg_us: Option<u64>,
    pub tick_max_us: u64,
}

pub fn snapshot() -> Snapshot {
    let ticks = TICKS.load(Ordering::Relaxed);
    let sum = TICK_TIME_SUM_US.load(Ordering::Relaxed);
    Snapshot {
        attacks: ATTACKS.load(Ordering::Relaxed),
        hits: HITS.load(Ordering::Relaxed),
        misses: MISSES.load(Ordering::Relaxed),
        fumbles: FUMBLES.load(Ordering::Relaxed),
        criticals: CRITICALS.load(Ordering::Relaxed),
        doubles: DOUBLES.load(Ordering::Relaxed),
        creature_kills: CREATURE_KILLS.load(Ordering::Relaxed),
        character_deaths: CHARACTER_DEATHS.load(Ordering::Relaxed),
        flights: FLIGHTS.load(Ordering::Relaxed),
        save_failures: SAVE_FAILURES.load(Ordering::Relaxed),
        ticks,
        tick_avg_us: if ticks > 0 { Some(sum / ticks) } else { None },
        tick_max_us: TICK_TIME_MAX_US.load(Ordering::Relaxed),
    }
}
