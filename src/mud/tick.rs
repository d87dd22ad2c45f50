//! The world tick: creatures act on their own.
//!
//! Each pass visits every room with at least one character in it. Engaged
//! creatures swing at their target; idle hostile creatures look for someone to
//! fight. A panic inside one room is caught and logged so the other rooms still
//! get their turn.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info};
use tokio::sync::watch;

use crate::metrics;
use crate::mud::combat::AttackMode;
use crate::mud::engagement;
use crate::mud::game::{Aftermath, GameContext};
use crate::mud::profile;
use crate::mud::room::{lock_room, Room};

/// Totals for one pass, mostly for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub rooms_visited: usize,
    pub engagements: usize,
    pub attacks: usize,
    pub kills: usize,
    pub flights: usize,
    pub spawned: usize,
    pub failed_rooms: usize,
}

impl TickReport {
    fn absorb(&mut self, other: &TickReport) {
        self.rooms_visited += other.rooms_visited;
        self.engagements += other.engagements;
        self.attacks += other.attacks;
        self.kills += other.kills;
        self.flights += other.flights;
    }
}

/// One pass over the world.
pub fn run_world_tick(ctx: &GameContext, now: Instant) -> TickReport {
    let started = Instant::now();
    let mut report = TickReport::default();

    for handle in ctx.world().rooms() {
        // Outside the unwind boundary: work finished before a panic still settles.
        let mut room_report = TickReport::default();
        let mut aftermath = Aftermath::default();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut room = lock_room(&handle);
            if room.has_characters() {
                drive_room(ctx, &mut room, now, &mut room_report, &mut aftermath);
            }
        }));
        report.absorb(&room_report);
        ctx.settle(aftermath);
        if outcome.is_err() {
            report.failed_rooms += 1;
            let room_id = lock_room(&handle).id.clone();
            error!("World tick failed in room {}; continuing", room_id);
            let recovered = ctx.recover_missing(&room_id);
            if recovered > 0 {
                info!("Recovered {} character(s) from {}", recovered, room_id);
            }
        }
    }

    if ctx.settings().respawn_creatures {
        report.spawned = ctx.world().fill_spawns(now);
        if report.spawned > 0 {
            info!("Respawned {} creature(s)", report.spawned);
        }
    }

    metrics::observe_tick(started.elapsed());
    report
}

fn drive_room(
    ctx: &GameContext,
    room: &mut Room,
    now: Instant,
    report: &mut TickReport,
    aftermath: &mut Aftermath,
) {
    report.rooms_visited += 1;

    for creature in room.creature_ids() {
        let Some(me) = room.get(&creature) else {
            continue; // killed or fled earlier in this pass
        };
        if me.attacking.is_some() {
            let target = match engagement::validate_target(room, &creature) {
                Ok(target) => target,
                Err(refusal) => {
                    debug!("{} drops its fight: {}", creature, refusal);
                    continue;
                }
            };
            match ctx.strike_in_room(room, &creature, &target, &profile::ATTACK, AttackMode::Weapon, now, aftermath) {
                Ok(round) => {
                    report.attacks += 1;
                    if round.death.is_some() {
                        report.kills += 1;
                    }
                    if round.fled {
                        report.flights += 1;
                    }
                }
                Err(refusal) if refusal.is_cooldown() => {}
                Err(refusal) => debug!("{} could not attack: {}", creature, refusal),
            }
        } else if !room.is_safe() {
            let mut dice = ctx.dice();
            let picked = engagement::creature_initiates(
                room,
                &creature,
                &mut **dice,
                ctx.messenger(),
                ctx.settings().notice_delay(),
                now,
            );
            if picked.is_some() {
                report.engagements += 1;
            }
        }
    }
}

/// Drive [`run_world_tick`] on the configured interval until `shutdown` flips to
/// true. Each pass runs on the blocking pool since it takes std mutexes and
/// writes to sled.
pub async fn run_tick_loop(ctx: Arc<GameContext>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(ctx.settings().tick_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!("World tick running every {:?}", ctx.settings().tick_interval());

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let pass = ctx.clone();
                match tokio::task::spawn_blocking(move || run_world_tick(&pass, Instant::now())).await {
                    Ok(report) if report.attacks > 0 || report.engagements > 0 => {
                        debug!("Tick: {:?}", report);
                    }
                    Ok(_) => {}
                    Err(e) => error!("World tick task failed: {}", e),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("World tick stopping");
                    break;
                }
            }
        }
    }
}
