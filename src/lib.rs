//! # mudcore - combat and world-tick engine for a text MUD
//!
//! Characters and creatures share rooms, trade blows under a small set of
//! attack profiles, and die, level down, loot, flee and respawn. A background
//! world tick lets creatures pick fights and keep swinging while players are
//! connected over a plain line-oriented TCP shell.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Instant;
//! use mudcore::mud::{GameContext, MessageLog, MudStore, RandRoller, World};
//!
//! fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(MudStore::open("./data/world")?);
//!     let world = Arc::new(World::from_store(&store, Instant::now())?);
//!     let ctx = GameContext::new(
//!         world,
//!         store,
//!         Arc::new(MessageLog::new()),
//!         Box::new(RandRoller::from_entropy()),
//!         Default::default(),
//!     );
//!     let report = mudcore::mud::run_world_tick(&ctx, Instant::now());
//!     println!("{:?}", report);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`mud`] - combatants, rules, engagement, death, rooms, the tick, storage
//! - [`server`] - TCP sessions and the message hub
//! - [`config`] - TOML configuration
//! - [`metrics`] - process-wide combat counters
//! - [`logutil`] - single-line log escaping for player input

pub mod config;
pub mod logutil;
pub mod metrics;
pub mod mud;
pub mod server;
