//! Lethal outcomes, rewards, and creature panic.
//!
//! Everything here runs under the victim's room lock. The victim is removed from
//! the roster before returning, so a second attacker that was queued behind the
//! lock finds nothing to kill and no reward is paid twice.

use log::{debug, info};

use crate::mud::dice::Roller;
use crate::mud::engagement::{attackers_of, capitalize, sweep_target};
use crate::mud::messaging::{notify, Messenger};
use crate::mud::room::Room;
use crate::mud::stats::{Combatant, CombatantId, CombatantKind};
use crate::mud::types::{Item, WeaponKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillCategory {
    Weak,
    Matched,
    Valiant,
    Epic,
    Player,
}

/// Bucket a kill by how the victim's level compares to the killer's.
pub fn classify_kill(killer_level: i32, victim_level: i32, victim_is_character: bool) -> KillCategory {
    if victim_is_character {
        return KillCategory::Player;
    }
    let gap = victim_level - killer_level;
    if gap <= -3 {
        KillCategory::Weak
    } else if gap <= 2 {
        KillCategory::Matched
    } else if gap <= 5 {
        KillCategory::Valiant
    } else {
        KillCategory::Epic
    }
}

/// Split a creature's experience among the characters fighting it.
///
/// A lone killer takes everything. Otherwise the killer takes half outright and
/// the other half is shared by every attacker, killer included, in proportion to
/// level. Shares round down, so the total never exceeds `experience`.
pub fn allocate_exp(
    killer: &CombatantId,
    killer_level: i32,
    attackers: &[(CombatantId, i32)],
    experience: u64,
) -> Vec<(CombatantId, u64)> {
    let mut everyone: Vec<(CombatantId, i32)> = vec![(killer.clone(), killer_level)];
    for (id, level) in attackers {
        if !everyone.iter().any(|(seen, _)| seen == id) {
            everyone.push((id.clone(), *level));
        }
    }
    if everyone.len() == 1 {
        return vec![(killer.clone(), experience)];
    }

    let base = experience / 2;
    let pool = experience - base;
    let total_level: u64 = everyone.iter().map(|(_, level)| (*level).max(1) as u64).sum();

    everyone
        .into_iter()
        .map(|(id, level)| {
            let share = pool * (level.max(1) as u64) / total_level;
            let amount = if &id == killer { base + share } else { share };
            (id, amount)
        })
        .collect()
}

/// Tunables the death rules read from configuration.
#[derive(Debug, Clone)]
pub struct DeathRules {
    pub skill_improve_chance: i32,
    pub respawn_room: String,
}

/// A defeated character on the way back to a safe room.
#[derive(Debug, Clone)]
pub struct Respawn {
    pub character: Combatant,
    pub room_id: String,
    pub levels_lost: i32,
}

#[derive(Debug, Clone, Default)]
pub struct DeathReport {
    pub victim_name: String,
    pub exp_awarded: Vec<(CombatantId, u64)>,
    pub dropped: Vec<String>,
    pub rolled_away: Vec<String>,
    pub skill_improved: Option<(WeaponKind, i32)>,
    pub kill: Option<KillCategory>,
    /// Characters still in the room whose durable fields changed.
    pub touched: Vec<CombatantId>,
    pub respawn: Option<Respawn>,
}

/// Resolve a kill. Returns `None` if the victim is no longer in the room.
pub fn resolve_death(
    room: &mut Room,
    killer: &CombatantId,
    victim: &CombatantId,
    weapon_kind: WeaponKind,
    rules: &DeathRules,
    dice: &mut dyn Roller,
    messenger: &dyn Messenger,
) -> Option<DeathReport> {
    let attackers: Vec<(CombatantId, i32)> = attackers_of(room, victim)
        .into_iter()
        .filter_map(|id| room.get(&id).map(|c| (id, c.level)))
        .collect();
    let mut corpse = room.remove(victim)?;
    corpse.vitals.hp = corpse.vitals.hp.min(0);
    sweep_target(room, victim);

    let killer_name = room
        .get(killer)
        .map(|k| k.name.clone())
        .unwrap_or_else(|| "Something".to_string());
    let mut report = DeathReport {
        victim_name: corpse.name.clone(),
        ..DeathReport::default()
    };

    if let Some(key) = killer.is_character().then(|| room.get(killer)).flatten() {
        notify(messenger, key, &format!("You killed {}.", corpse.name));
    }
    notify(messenger, &corpse, &format!("You have been killed by {}!", killer_name));
    let killer_key = match killer {
        CombatantId::Character(name) => Some(name.as_str()),
        CombatantId::Creature(_) => None,
    };
    messenger.send_to_room(
        room,
        &format!("{} kills {}.", capitalize(&killer_name), corpse.name),
        killer_key,
    );
    info!("{} killed {} in {}", killer, victim, room.id);

    let (bounty, keeps_belongings) = match &corpse.kind {
        CombatantKind::Creature(state) => (Some(state.experience), false),
        CombatantKind::Character(state) => (None, state.is_dm),
    };
    if !keeps_belongings {
        drop_belongings(room, &mut corpse, messenger, &mut report);
    }

    match bounty {
        Some(experience) => {
            if killer.is_character() {
                reward_killers(
                    room,
                    killer,
                    &attackers,
                    &corpse,
                    experience,
                    weapon_kind,
                    rules,
                    dice,
                    messenger,
                    &mut report,
                );
            }
            debug!("{} removed from {}", corpse.id, room.id);
        }
        None => {
            if killer.is_character() {
                credit_kill(room, killer, &corpse, &mut report);
            }
            report.respawn = restore_character(corpse, rules, dice);
        }
    }
    Some(report)
}

fn drop_belongings(room: &mut Room, corpse: &mut Combatant, messenger: &dyn Messenger, report: &mut DeathReport) {
    let mut belongings: Vec<Item> = std::mem::take(&mut corpse.inventory);
    belongings.extend(corpse.equipment.take_all());
    for item in belongings {
        let name = item.name.clone();
        match room.add_item(item) {
            Ok(()) => report.dropped.push(name),
            Err(_) => {
                messenger.send_to_room(room, &format!("{} falls and rolls away.", capitalize(&name)), None);
                report.rolled_away.push(name);
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn reward_killers(
    room: &mut Room,
    killer: &CombatantId,
    attackers: &[(CombatantId, i32)],
    corpse: &Combatant,
    experience: u64,
    weapon_kind: WeaponKind,
    rules: &DeathRules,
    dice: &mut dyn Roller,
    messenger: &dyn Messenger,
    report: &mut DeathReport,
) {
    let Some(killer_level) = room.get(killer).map(|k| k.level) else {
        return;
    };
    report.exp_awarded = allocate_exp(killer, killer_level, attackers, experience);
    for (id, amount) in &report.exp_awarded {
        let Some(fighter) = room.get_mut(id) else {
            continue;
        };
        if let Some(state) = fighter.as_character_mut() {
            state.experience += amount;
        }
        let fighter = &*fighter;
        notify(messenger, fighter, &format!("You gain {} experience.", amount));
        if !report.touched.contains(id) {
            report.touched.push(id.clone());
        }
    }

    if killer_level >= corpse.level && dice.chance(rules.skill_improve_chance) {
        if let Some(state) = room.get_mut(killer).and_then(Combatant::as_character_mut) {
            let value = state.skills.improve(weapon_kind);
            report.skill_improved = Some((weapon_kind, value));
        }
        if let Some(k) = room.get(killer) {
            notify(messenger, k, "Your skill improves!");
        }
    }

    credit_kill(room, killer, corpse, report);
}

fn credit_kill(room: &mut Room, killer: &CombatantId, corpse: &Combatant, report: &mut DeathReport) {
    let Some(fighter) = room.get_mut(killer) else {
        return;
    };
    let category = classify_kill(fighter.level, corpse.level, corpse.is_character());
    if let Some(state) = fighter.as_character_mut() {
        match category {
            KillCategory::Weak => state.kills.weak += 1,
            KillCategory::Matched => state.kills.matched += 1,
            KillCategory::Valiant => state.kills.valiant += 1,
            KillCategory::Epic => state.kills.epic += 1,
            KillCategory::Player => state.kills.players += 1,
        }
    }
    report.kill = Some(category);
    if !report.touched.contains(killer) {
        report.touched.push(killer.clone());
    }
}

/// Chance (percent) that a death costs two levels instead of one.
pub fn double_level_loss_chance(corpse: &Combatant) -> i32 {
    let protection = corpse
        .as_character()
        .map_or(0, |state| state.class.death_protection());
    let piety = corpse.attributes.piety - 12;
    let luck = corpse.attributes.luck - 12;
    (25 - 2 * piety - 2 * luck - protection).clamp(0, 100)
}

fn restore_character(mut corpse: Combatant, rules: &DeathRules, dice: &mut dyn Roller) -> Option<Respawn> {
    let (is_dm, class, home) = match &corpse.kind {
        CombatantKind::Character(state) => (state.is_dm, state.class, state.home_room.clone()),
        CombatantKind::Creature(_) => return None,
    };
    let levels_lost = if is_dm || corpse.level <= 1 {
        0
    } else if dice.chance(double_level_loss_chance(&corpse)) {
        2
    } else {
        1
    };
    corpse.level = (corpse.level - levels_lost).max(1);
    corpse.vitals.max_hp = class.max_hit_points(corpse.level, corpse.attributes.constitution);
    corpse.vitals.hp = corpse.vitals.max_hp;
    corpse.attacking = None;
    corpse.stance_dodge = 0;
    corpse.status.vulnerable = false;
    corpse.status.hidden = false;
    if let Some(state) = corpse.as_character_mut() {
        state.kills.deaths += 1;
    }
    let room_id = home.unwrap_or_else(|| rules.respawn_room.clone());
    info!("{} respawns in {} after losing {} level(s)", corpse.id, room_id, levels_lost);
    Some(Respawn {
        character: corpse,
        room_id,
        levels_lost,
    })
}

/// After surviving a hit, a creature below its panic threshold may bolt. A fled
/// creature leaves the world with no reward paid. Opponents keep their pointers
/// and find the creature gone on their next swing.
pub fn check_flight(
    room: &mut Room,
    creature: &CombatantId,
    flee_chance: i32,
    dice: &mut dyn Roller,
    messenger: &dyn Messenger,
) -> bool {
    let Some(me) = room.get(creature) else {
        return false;
    };
    let Some(threshold) = me.as_creature().and_then(|s| s.flees_below) else {
        return false;
    };
    if !me.is_alive() || me.hit_point_percent() >= threshold {
        return false;
    }
    if !dice.chance(flee_chance) {
        return false;
    }
    let Some(gone) = room.remove(creature) else {
        return false;
    };
    messenger.send_to_room(room, &format!("{} panics and flees!", capitalize(&gone.name)), None);
    info!("{} fled {}", creature, room.id);
    true
}
