//! Combat and world-tick core.
//!
//! Rooms own their combatants; everything that reads engagement state, decides
//! an outcome and writes it back runs under that room's lock. The pure rules
//! live in [`combat`], the state machine in [`engagement`], lethal outcomes in
//! [`death`], and [`game::GameContext`] ties them to the world, the dice, the
//! store and the message sink.

pub mod combat;
pub mod death;
pub mod dice;
pub mod engagement;
pub mod errors;
pub mod game;
pub mod messaging;
pub mod profile;
pub mod room;
pub mod seed;
pub mod stats;
pub mod storage;
pub mod tick;
pub mod types;

pub use combat::{AttackMode, DamageRoll, Multiplier, Strike};
pub use death::{allocate_exp, classify_kill, DeathReport, KillCategory};
pub use dice::{RandRoller, Roller, ScriptedRolls};
pub use errors::{CombatRefusal, MudError};
pub use game::{GameContext, RoundReport};
pub use messaging::{MessageLog, Messenger};
pub use profile::AttackProfile;
pub use room::{Room, World};
pub use seed::{canonical_creatures, canonical_rooms, START_ROOM_ID};
pub use stats::{Combatant, CombatantId, Condition};
pub use storage::{MudStore, MudStoreBuilder, Persistence};
pub use tick::{run_tick_loop, run_world_tick, TickReport};
pub use types::*;
