//! Who is fighting whom.
//!
//! Engagement is a one-way pointer (`Combatant::attacking`) resolved through the
//! room roster. There is no back-reference, so clearing stale pointers is always a
//! sweep over the room. All functions here expect the caller to hold the room lock.

use std::time::{Duration, Instant};

use log::debug;

use crate::mud::dice::Roller;
use crate::mud::errors::CombatRefusal;
use crate::mud::messaging::Messenger;
use crate::mud::room::Room;
use crate::mud::stats::{Combatant, CombatantId, CombatantKind};

/// Push back `combatant`'s next permitted attack. Characters wait their class
/// interval; creatures draw a fresh delay from their cooldown band.
pub fn start_cooldown(combatant: &mut Combatant, dice: &mut dyn Roller, now: Instant) {
    let secs = match &combatant.kind {
        CombatantKind::Character(state) => state.class.attack_interval_secs(),
        CombatantKind::Creature(state) => {
            let (low, high) = state.cooldown_secs;
            dice.roll(low as i32, high as i32).max(0) as u64
        }
    };
    combatant.next_attack_at = now + Duration::from_secs(secs);
}

/// Point `attacker` at `target`. Announces the fight to the room only when the
/// target changes; re-issuing against the current target is silent.
///
/// Returns true when this was a new engagement.
pub fn engage(
    room: &mut Room,
    attacker: &CombatantId,
    target: &CombatantId,
    messenger: &dyn Messenger,
) -> Result<bool, CombatRefusal> {
    if attacker == target {
        return Err(CombatRefusal::SelfTarget);
    }
    let target_name = room
        .get(target)
        .map(|t| t.name.clone())
        .ok_or(CombatRefusal::TargetGone)?;
    let me = room.get_mut(attacker).ok_or(CombatRefusal::AttackerNotPresent)?;
    if me.attacking.as_ref() == Some(target) {
        return Ok(false);
    }
    me.attacking = Some(target.clone());
    let my_name = me.name.clone();
    let my_key = me.character_key().map(str::to_string);

    debug!("{} engages {}", attacker, target);
    if let Some(key) = my_key.as_deref() {
        messenger.send_to_one(key, &format!("You attack {}!", target_name));
    }
    messenger.send_to_room(
        room,
        &format!("{} attacks {}!", capitalize(&my_name), target_name),
        my_key.as_deref(),
    );
    Ok(true)
}

/// A struck creature that fights back turns on its attacker. Silent; the strike
/// itself is narrated.
pub fn retaliate(
    room: &mut Room,
    defender: &CombatantId,
    attacker: &CombatantId,
    dice: &mut dyn Roller,
    now: Instant,
) -> bool {
    let Some(creature) = room.get_mut(defender) else {
        return false;
    };
    let fights_back = creature
        .as_creature()
        .map_or(false, |state| state.attacks_back);
    if !fights_back || !creature.is_alive() || creature.attacking.as_ref() == Some(attacker) {
        return false;
    }
    creature.attacking = Some(attacker.clone());
    start_cooldown(creature, dice, now);
    debug!("{} turns on {}", defender, attacker);
    true
}

/// Check that `attacker`'s current target is still present and alive. A stale
/// pointer is cleared and reported as [`CombatRefusal::TargetGone`].
pub fn validate_target(room: &mut Room, attacker: &CombatantId) -> Result<CombatantId, CombatRefusal> {
    let me = room.get(attacker).ok_or(CombatRefusal::AttackerNotPresent)?;
    let target = me.attacking.clone().ok_or(CombatRefusal::NoTarget)?;
    if room.is_live(&target) {
        return Ok(target);
    }
    if let Some(me) = room.get_mut(attacker) {
        me.attacking = None;
    }
    Err(CombatRefusal::TargetGone)
}

/// Clear every pointer at `target` in the room. Used when `target` dies.
pub fn sweep_target(room: &mut Room, target: &CombatantId) -> usize {
    let mut cleared = 0;
    for combatant in room.combatants.iter_mut() {
        if combatant.attacking.as_ref() == Some(target) {
            combatant.attacking = None;
            cleared += 1;
        }
    }
    cleared
}

/// Clear creature pointers at a character who is walking out of the room.
pub fn sweep_creatures_targeting(room: &mut Room, character: &CombatantId) -> usize {
    let mut cleared = 0;
    for combatant in room.combatants.iter_mut().filter(|c| !c.is_character()) {
        if combatant.attacking.as_ref() == Some(character) {
            combatant.attacking = None;
            cleared += 1;
        }
    }
    cleared
}

/// Characters in the room currently pointed at `target`.
pub fn attackers_of(room: &Room, target: &CombatantId) -> Vec<CombatantId> {
    room.characters()
        .filter(|c| c.attacking.as_ref() == Some(target))
        .map(|c| c.id.clone())
        .collect()
}

/// Let an idle hostile creature pick a fight. Characters are considered in a
/// random order and the first one the creature notices is engaged.
///
/// A creature notices nobody until it has been in the room for `notice_delay`,
/// and never notices hidden or invisible characters.
pub fn creature_initiates(
    room: &mut Room,
    creature: &CombatantId,
    dice: &mut dyn Roller,
    messenger: &dyn Messenger,
    notice_delay: Duration,
    now: Instant,
) -> Option<CombatantId> {
    let me = room.get(creature)?;
    let state = me.as_creature()?;
    if !state.hostile || me.attacking.is_some() || !me.is_alive() {
        return None;
    }
    if now < state.arrived_at + notice_delay {
        return None;
    }

    let candidates: Vec<&Combatant> = room.characters().collect();
    let order = dice.shuffled_indices(candidates.len());
    let target = order
        .into_iter()
        .map(|i| candidates[i])
        .find(|c| c.is_alive() && !c.is_concealed())
        .map(|c| c.id.clone())?;

    engage(room, creature, &target, messenger).ok()?;
    if let Some(me) = room.get_mut(creature) {
        start_cooldown(me, dice, now);
    }
    Some(target)
}

/// Stop fighting. The opponent's pointer is left alone.
pub fn disengage(room: &mut Room, combatant: &CombatantId) -> Option<CombatantId> {
    room.get_mut(combatant)?.attacking.take()
}

pub(crate) fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mud::dice::ScriptedRolls;
    use crate::mud::messaging::MessageLog;
    use crate::mud::types::{
        CharacterClass, CharacterRecord, CreatureTemplate, RoomRecord, WeaponKind, WeaponStats,
    };

    fn setup(now: Instant) -> (Room, CombatantId, CombatantId, CombatantId) {
        let mut room = Room::from_record(RoomRecord::new("den", "Den"));
        let ada = Combatant::from_record(CharacterRecord::new("Ada", CharacterClass::Fighter, "den"), now);
        let bram = Combatant::from_record(CharacterRecord::new("Bram", CharacterClass::Thief, "den"), now);
        let wolf = CreatureTemplate::new("wolf", "a wolf", 3, 20, WeaponStats::new(1, 4, WeaponKind::Claw))
            .hostile()
            .with_cooldown(2, 4);
        let wolf = Combatant::from_template(&wolf, 7, now);
        let ids = (ada.id.clone(), bram.id.clone(), wolf.id.clone());
        room.insert(ada);
        room.insert(bram);
        room.insert(wolf);
        (room, ids.0, ids.1, ids.2)
    }

    #[test]
    fn engage_announces_only_on_change() {
        let now = Instant::now();
        let (mut room, ada, _bram, wolf) = setup(now);
        let log = MessageLog::new();
        assert_eq!(engage(&mut room, &ada, &wolf, &log), Ok(true));
        assert_eq!(engage(&mut room, &ada, &wolf, &log), Ok(false));
        assert_eq!(log.received_by("bram"), vec!["Ada attacks a wolf!"]);
        assert_eq!(log.received_by("ada"), vec!["You attack a wolf!"]);
    }

    #[test]
    fn cannot_engage_self() {
        let now = Instant::now();
        let (mut room, ada, _, _) = setup(now);
        let log = MessageLog::new();
        assert_eq!(engage(&mut room, &ada, &ada, &log), Err(CombatRefusal::SelfTarget));
    }

    #[test]
    fn retaliation_switches_once_and_sets_cooldown() {
        let now = Instant::now();
        let (mut room, ada, bram, wolf) = setup(now);
        let mut dice = ScriptedRolls::new([3, 3]);
        assert!(retaliate(&mut room, &wolf, &ada, &mut dice, now));
        assert!(!retaliate(&mut room, &wolf, &ada, &mut dice, now));
        let w = room.get(&wolf).unwrap();
        assert_eq!(w.attacking, Some(ada.clone()));
        assert_eq!(w.next_attack_at, now + Duration::from_secs(3));
        // characters never retaliate automatically
        assert!(!retaliate(&mut room, &bram, &wolf, &mut dice, now));
    }

    #[test]
    fn stale_targets_are_cleared_on_validation() {
        let now = Instant::now();
        let (mut room, ada, _, wolf) = setup(now);
        let log = MessageLog::new();
        engage(&mut room, &ada, &wolf, &log).unwrap();
        assert_eq!(validate_target(&mut room, &ada), Ok(wolf.clone()));
        room.remove(&wolf);
        assert_eq!(validate_target(&mut room, &ada), Err(CombatRefusal::TargetGone));
        assert!(room.get(&ada).unwrap().attacking.is_none());
    }

    #[test]
    fn sweeps_clear_every_pointer() {
        let now = Instant::now();
        let (mut room, ada, bram, wolf) = setup(now);
        let log = MessageLog::new();
        engage(&mut room, &wolf, &ada, &log).unwrap();
        engage(&mut room, &bram, &ada, &log).unwrap();
        assert_eq!(sweep_creatures_targeting(&mut room, &ada), 1);
        assert_eq!(room.get(&bram).unwrap().attacking, Some(ada.clone()));
        assert_eq!(sweep_target(&mut room, &ada), 1);
        assert!(room.combatants.iter().all(|c| c.attacking.is_none()));
    }

    #[test]
    fn hostile_creature_waits_out_notice_delay() {
        let now = Instant::now();
        let (mut room, _, _, wolf) = setup(now);
        let log = MessageLog::new();
        let mut dice = ScriptedRolls::new([]);
        let delay = Duration::from_secs(5);
        assert!(creature_initiates(&mut room, &wolf, &mut dice, &log, delay, now).is_none());
        let later = now + delay;
        let picked = creature_initiates(&mut room, &wolf, &mut dice, &log, delay, later);
        assert!(picked.is_some());
        assert_eq!(room.get(&wolf).unwrap().attacking, picked);
        // already engaged: no second pick
        assert!(creature_initiates(&mut room, &wolf, &mut dice, &log, delay, later).is_none());
    }

    #[test]
    fn concealed_characters_go_unnoticed() {
        let now = Instant::now();
        let (mut room, ada, bram, wolf) = setup(now);
        room.get_mut(&ada).unwrap().status.hidden = true;
        room.get_mut(&bram).unwrap().status.invisible = true;
        let log = MessageLog::new();
        let mut dice = ScriptedRolls::new([]);
        let later = now + Duration::from_secs(60);
        assert!(creature_initiates(&mut room, &wolf, &mut dice, &log, Duration::from_secs(5), later).is_none());
        room.get_mut(&bram).unwrap().status.invisible = false;
        assert_eq!(
            creature_initiates(&mut room, &wolf, &mut dice, &log, Duration::from_secs(5), later),
            Some(bram)
        );
    }

    #[test]
    fn capitalize_handles_articles() {
        assert_eq!(capitalize("a wolf"), "A wolf");
        assert_eq!(capitalize(""), "");
    }
}
