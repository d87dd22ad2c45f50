//! The application context.
//!
//! One [`GameContext`] is built at startup and shared by every session task and
//! the world tick. It owns no global state: tests build as many isolated
//! contexts as they like.
//!
//! Lock discipline: a caller holds at most one room lock at a time. The dice
//! mutex and the location index may be taken while a room is locked, never the
//! other way round.
//! Persistence runs only after the room lock has been released.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use log::{debug, info, warn};

use crate::config::GameConfig;
use crate::logutil::escape_log;
use crate::metrics;
use crate::mud::combat::{self, effective_profile, AttackMode, Multiplier, Strike};
use crate::mud::death::{self, DeathReport, DeathRules, Respawn};
use crate::mud::dice::Roller;
use crate::mud::engagement::{self, capitalize};
use crate::mud::errors::{CombatRefusal, MudError};
use crate::mud::messaging::{notify, Messenger};
use crate::mud::profile::{self, AttackProfile};
use crate::mud::room::{lock_room, Room, World};
use crate::mud::stats::{Combatant, CombatantId, Condition};
use crate::mud::storage::Persistence;
use crate::mud::types::{CharacterClass, CharacterRecord};

/// What one resolved swing did.
#[derive(Debug, Clone)]
pub struct RoundReport {
    pub attacker: CombatantId,
    pub target: CombatantId,
    pub strike: Strike,
    /// The swing moved the attacker onto a new target.
    pub new_engagement: bool,
    /// Target's condition after the swing; `Dead` when it was killed.
    pub target_condition: Condition,
    pub death: Option<DeathReport>,
    pub fled: bool,
}

/// Work deferred until the room lock is released.
#[derive(Debug, Default)]
pub(crate) struct Aftermath {
    saves: Vec<(Combatant, String)>,
    respawns: Vec<Respawn>,
}

struct Sides<'a> {
    attacker: &'a str,
    attacker_key: Option<&'a str>,
    target_key: Option<&'a str>,
}

pub struct GameContext {
    world: Arc<World>,
    persistence: Arc<dyn Persistence>,
    messenger: Arc<dyn Messenger>,
    dice: Mutex<Box<dyn Roller>>,
    settings: GameConfig,
}

impl GameContext {
    pub fn new(
        world: Arc<World>,
        persistence: Arc<dyn Persistence>,
        messenger: Arc<dyn Messenger>,
        dice: Box<dyn Roller>,
        settings: GameConfig,
    ) -> Self {
        Self {
            world,
            persistence,
            messenger,
            dice: Mutex::new(dice),
            settings,
        }
    }

    pub fn world(&self) -> &Arc<World> {
        &self.world
    }

    pub fn settings(&self) -> &GameConfig {
        &self.settings
    }

    pub fn messenger(&self) -> &dyn Messenger {
        self.messenger.as_ref()
    }

    pub(crate) fn dice(&self) -> MutexGuard<'_, Box<dyn Roller>> {
        self.dice.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn death_rules(&self) -> DeathRules {
        DeathRules {
            skill_improve_chance: self.settings.skill_improve_chance,
            respawn_room: self.settings.start_room.clone(),
        }
    }

    /// Bring a character into the world, creating it on first login.
    /// Returns the id of the room the character appears in.
    pub fn login(&self, display_name: &str, class: CharacterClass, now: Instant) -> Result<String, MudError> {
        if let Some(room_id) = self.world.location_of(display_name) {
            return Ok(room_id);
        }
        let record = match self.persistence.load_character(display_name) {
            Ok(record) => record,
            Err(MudError::NotFound(_)) => {
                let record = CharacterRecord::new(display_name, class, &self.settings.start_room);
                self.persistence.save_character(&record)?;
                info!("Created character {}", escape_log(display_name));
                record
            }
            Err(e) => return Err(e),
        };
        let room_id = if self.world.room(&record.current_room).is_some() {
            record.current_room.clone()
        } else {
            self.settings.start_room.clone()
        };
        self.place(Combatant::from_record(record, now), &room_id)?;
        info!("{} entered {}", escape_log(display_name), room_id);
        Ok(room_id)
    }

    /// Take a character out of the world and save it.
    pub fn logout(&self, name: &str) -> Result<(), MudError> {
        let (combatant, room_id) = self
            .leave_room(name)
            .ok_or_else(|| MudError::NotFound(format!("online character: {}", name)))?;
        self.persist(&combatant, &room_id)?;
        info!("{} left the game", escape_log(name));
        Ok(())
    }

    /// Remove a character from its room. Creatures that were fighting it stop.
    pub fn leave_room(&self, name: &str) -> Option<(Combatant, String)> {
        let room_id = self.world.location_of(name)?;
        let handle = self.world.room(&room_id)?;
        let id = CombatantId::character(name);
        let mut combatant = {
            let mut room = lock_room(&handle);
            let combatant = room.remove(&id)?;
            let cleared = engagement::sweep_creatures_targeting(&mut room, &id);
            if cleared > 0 {
                debug!("{} creature(s) lost track of {}", cleared, id);
            }
            self.messenger
                .send_to_room(&room, &format!("{} leaves.", combatant.name), None);
            self.world.clear_location(name);
            combatant
        };
        combatant.attacking = None;
        Some((combatant, room_id))
    }

    /// Walk a character into another room and save the new location.
    pub fn move_character(&self, name: &str, to_room: &str) -> Result<(), MudError> {
        if self.world.room(to_room).is_none() {
            return Err(MudError::UnknownRoom(to_room.to_string()));
        }
        let (combatant, _) = self
            .leave_room(name)
            .ok_or_else(|| MudError::NotFound(format!("online character: {}", name)))?;
        let snapshot = combatant.clone();
        self.place(combatant, to_room)?;
        self.save_or_warn(&snapshot, to_room);
        Ok(())
    }

    fn place(&self, combatant: Combatant, room_id: &str) -> Result<(), MudError> {
        let handle = self
            .world
            .room(room_id)
            .ok_or_else(|| MudError::UnknownRoom(room_id.to_string()))?;
        let key = combatant.character_key().map(str::to_string);
        let mut room = lock_room(&handle);
        self.messenger
            .send_to_room(&room, &format!("{} arrives.", combatant.name), None);
        room.insert(combatant);
        if let Some(key) = key {
            self.world.set_location(&key, room_id);
        }
        Ok(())
    }

    /// Put a fresh creature from `template_id` into `room_id`.
    pub fn spawn_creature(&self, room_id: &str, template_id: &str, now: Instant) -> Result<CombatantId, MudError> {
        let template = self
            .world
            .template(template_id)
            .ok_or_else(|| MudError::NotFound(format!("creature: {}", template_id)))?;
        let handle = self
            .world
            .room(room_id)
            .ok_or_else(|| MudError::UnknownRoom(room_id.to_string()))?;
        let mut room = lock_room(&handle);
        let id = self.world.spawn_into(&mut room, &template, now);
        self.messenger
            .send_to_room(&room, &format!("{} appears.", capitalize(&template.name)), None);
        Ok(id)
    }

    /// A player's attack command. With no target text the character keeps
    /// swinging at whoever it is already fighting.
    pub fn attack(
        &self,
        name: &str,
        target: Option<&str>,
        profile_name: &str,
        mode: AttackMode,
        now: Instant,
    ) -> Result<RoundReport, CombatRefusal> {
        let me = CombatantId::character(name);
        let room_id = self.world.location_of(name).ok_or(CombatRefusal::UnknownPlayer)?;
        let handle = self.world.room(&room_id).ok_or(CombatRefusal::UnknownPlayer)?;
        let mut chosen = profile::lookup(profile_name);

        let mut aftermath = Aftermath::default();
        let report = {
            let mut room = lock_room(&handle);
            if room.is_safe() {
                return Err(CombatRefusal::SafeRoom);
            }
            let is_dm = room
                .get(&me)
                .and_then(Combatant::as_character)
                .map_or(false, |state| state.is_dm);
            if chosen.is_slay() && !is_dm {
                chosen = &profile::ATTACK;
            }
            let target = match target {
                Some(text) => room
                    .find_by_name(text)
                    .map(|found| found.id.clone())
                    .ok_or_else(|| CombatRefusal::TargetNotPresent(text.trim().to_string()))?,
                None => engagement::validate_target(&mut room, &me)?,
            };
            self.strike_in_room(&mut room, &me, &target, chosen, mode, now, &mut aftermath)?
        };

        self.settle(aftermath);
        Ok(report)
    }

    /// Resolve one swing under the room lock. Shared by player commands and the
    /// world tick. A refusal leaves the room untouched. Deferred work is pushed
    /// onto `aftermath` as soon as it exists.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn strike_in_room(
        &self,
        room: &mut Room,
        attacker: &CombatantId,
        target: &CombatantId,
        profile: &AttackProfile,
        mode: AttackMode,
        now: Instant,
        aftermath: &mut Aftermath,
    ) -> Result<RoundReport, CombatRefusal> {
        if room.is_safe() {
            return Err(CombatRefusal::SafeRoom);
        }
        if attacker == target {
            return Err(CombatRefusal::SelfTarget);
        }
        let me = room.get(attacker).ok_or(CombatRefusal::AttackerNotPresent)?;
        if !me.is_alive() {
            return Err(CombatRefusal::AttackerDead);
        }
        let foe = room.get(target).ok_or(CombatRefusal::TargetGone)?;
        if !foe.is_alive() {
            return Err(CombatRefusal::TargetDead(foe.name.clone()));
        }
        if let Some(remaining) = me.cooldown_remaining(now) {
            return Err(CombatRefusal::Cooldown { remaining });
        }

        let messenger = self.messenger.as_ref();
        let new_engagement = engagement::engage(room, attacker, target, messenger)?;
        let mut guard = self.dice();
        let dice: &mut dyn Roller = &mut **guard;
        if attacker.is_character() {
            engagement::retaliate(room, target, attacker, dice, now);
        }

        let profile = effective_profile(profile, mode);
        let (outcome, weapon_kind, attacker_name, target_name) = {
            let me = room.get(attacker).ok_or(CombatRefusal::AttackerNotPresent)?;
            let foe = room.get(target).ok_or(CombatRefusal::TargetGone)?;
            let kind = match mode {
                AttackMode::Weapon => me.weapon().kind,
                AttackMode::Spell(stats) => stats.kind,
            };
            let outcome = combat::strike(me, foe, profile, mode, self.settings.fumble_chance, dice);
            (outcome, kind, me.name.clone(), foe.name.clone())
        };

        metrics::inc_attacks();
        metrics::record_room_round(&room.id);
        if let Some(me) = room.get_mut(attacker) {
            me.stance_dodge = profile.dodge;
            if profile.always_vulnerable || (profile.vulnerable_on_miss && outcome == Strike::Miss) {
                me.status.vulnerable = true;
            }
            engagement::start_cooldown(me, dice, now);
        }

        let sides = Sides {
            attacker: &attacker_name,
            attacker_key: match attacker {
                CombatantId::Character(key) => Some(key.as_str()),
                CombatantId::Creature(_) => None,
            },
            target_key: match target {
                CombatantId::Character(key) => Some(key.as_str()),
                CombatantId::Creature(_) => None,
            },
        };
        let others_target = capitalize(&target_name);
        let mut report = RoundReport {
            attacker: attacker.clone(),
            target: target.clone(),
            strike: outcome,
            new_engagement,
            target_condition: Condition::Fresh,
            death: None,
            fled: false,
        };

        match outcome {
            Strike::Fumble => {
                metrics::inc_fumbles();
                self.narrate(
                    room,
                    &sides,
                    "You stumble and fail to attack!",
                    &format!("{} stumbles.", capitalize(sides.attacker)),
                    Some(&format!("{} stumbles.", capitalize(sides.attacker))),
                );
            }
            Strike::Miss => {
                metrics::inc_misses();
                self.narrate(
                    room,
                    &sides,
                    &format!("You miss {}.", target_name),
                    &format!("{} misses you.", capitalize(sides.attacker)),
                    Some(&format!("{} misses {}.", capitalize(sides.attacker), target_name)),
                );
            }
            Strike::Hit(roll) => {
                metrics::inc_hits();
                match roll.multiplier {
                    Multiplier::Critical => {
                        metrics::inc_criticals();
                        self.narrate(room, &sides, "Critical Damage!", "Critical Damage!", None);
                    }
                    Multiplier::Double => {
                        metrics::inc_doubles();
                        self.narrate(room, &sides, "Double Damage!", "Double Damage!", None);
                    }
                    Multiplier::Normal => {}
                }

                let foe = room.get_mut(target).ok_or(CombatRefusal::TargetGone)?;
                if roll.consumed_vulnerable {
                    foe.status.vulnerable = false;
                }
                let lethal = foe.damage_is_lethal(roll.damage);
                foe.vitals.hp -= roll.damage;
                report.target_condition = foe.condition();

                self.narrate(
                    room,
                    &sides,
                    &format!("You hit {} for {} damage.", target_name, roll.damage),
                    &format!("{} hits you for {} damage.", capitalize(sides.attacker), roll.damage),
                    Some(&format!("{} hits {}.", capitalize(sides.attacker), target_name)),
                );

                if lethal {
                    let death = death::resolve_death(
                        room,
                        attacker,
                        target,
                        weapon_kind,
                        &self.death_rules(),
                        dice,
                        messenger,
                    );
                    if let Some(death) = death {
                        if target.is_character() {
                            metrics::inc_character_deaths();
                        } else {
                            metrics::inc_creature_kills();
                        }
                        for id in &death.touched {
                            if let Some(c) = room.get(id) {
                                aftermath.saves.push((c.clone(), room.id.clone()));
                            }
                        }
                        if let Some(respawn) = death.respawn.clone() {
                            if let Some(key) = respawn.character.character_key() {
                                self.world.clear_location(key);
                            }
                            aftermath.respawns.push(respawn);
                        }
                        report.death = Some(death);
                    }
                } else {
                    if let Some(key) = sides.attacker_key {
                        messenger.send_to_one(
                            key,
                            &format!("{} is {}.", others_target, report.target_condition),
                        );
                    }
                    if let Some(key) = sides.target_key {
                        messenger.send_to_one(key, &format!("You are {}.", report.target_condition));
                    }
                    if !target.is_character()
                        && death::check_flight(room, target, self.settings.creature_flee_chance, dice, messenger)
                    {
                        metrics::inc_flights();
                        report.fled = true;
                    }
                }
            }
        }

        for id in [attacker, target] {
            if !id.is_character() || aftermath.saves.iter().any(|(c, _)| &c.id == id) {
                continue;
            }
            if let Some(c) = room.get(id) {
                aftermath.saves.push((c.clone(), room.id.clone()));
            }
        }
        debug!(
            "{} -> {} in {}: {:?}",
            attacker, target, room.id, report.strike
        );
        Ok(report)
    }

    /// One line to the attacker, one to the target, and optionally one to
    /// everyone else in the room.
    fn narrate(&self, room: &Room, sides: &Sides<'_>, to_attacker: &str, to_target: &str, to_others: Option<&str>) {
        for character in room.characters() {
            let Some(key) = character.character_key() else {
                continue;
            };
            if Some(key) == sides.attacker_key {
                self.messenger.send_to_one(key, to_attacker);
            } else if Some(key) == sides.target_key {
                self.messenger.send_to_one(key, to_target);
            } else if let Some(text) = to_others {
                self.messenger.send_to_one(key, text);
            }
        }
    }

    /// Run deferred relocations and saves. Call with no room lock held.
    pub(crate) fn settle(&self, aftermath: Aftermath) {
        for respawn in aftermath.respawns {
            self.relocate_after_death(respawn);
        }
        for (combatant, room_id) in aftermath.saves {
            self.save_or_warn(&combatant, &room_id);
        }
    }

    /// Bring back characters the location index places in `room_id` that the
    /// room no longer holds. They return from their last save, healed, in the
    /// start room. Used after a tick pass failed partway through that room.
    pub(crate) fn recover_missing(&self, room_id: &str) -> usize {
        let Some(handle) = self.world.room(room_id) else {
            return 0;
        };
        let missing: Vec<String> = {
            let room = lock_room(&handle);
            let lost: Vec<String> = self
                .world
                .online_characters()
                .into_iter()
                .filter(|name| self.world.location_of(name).as_deref() == Some(room_id))
                .filter(|name| room.get(&CombatantId::character(name)).is_none())
                .collect();
            for name in &lost {
                self.world.clear_location(name);
            }
            lost
        };

        let mut recovered = 0;
        for name in missing {
            let mut record = match self.persistence.load_character(&name) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Could not recover {} from {}: {}", name, room_id, e);
                    continue;
                }
            };
            record.vitals.hp = record.vitals.max_hp;
            let start = self.settings.start_room.clone();
            match self.place(Combatant::from_record(record, Instant::now()), &start) {
                Ok(()) => {
                    warn!("Recovered {} from {} into {}", name, room_id, start);
                    self.messenger.send_to_one(&name, "You are pulled back to safety.");
                    recovered += 1;
                }
                Err(e) => warn!("Could not recover {} from {}: {}", name, room_id, e),
            }
        }
        recovered
    }

    fn relocate_after_death(&self, respawn: Respawn) {
        let Respawn {
            character,
            room_id,
            levels_lost,
        } = respawn;
        let Some(key) = character.character_key().map(str::to_string) else {
            return;
        };
        self.world.clear_location(&key);
        let destination = if self.world.room(&room_id).is_some() {
            room_id
        } else {
            warn!("Respawn room {} missing; using {}", room_id, self.settings.start_room);
            self.settings.start_room.clone()
        };
        let snapshot = character.clone();
        if let Err(e) = self.place(character, &destination) {
            warn!("Could not return {} to the world: {}", key, e);
        } else {
            let room_name = self
                .world
                .room(&destination)
                .map(|handle| lock_room(&handle).name.clone())
                .unwrap_or_else(|| destination.clone());
            self.messenger
                .send_to_one(&key, &format!("You awaken in {}.", room_name));
            if levels_lost > 0 {
                self.messenger
                    .send_to_one(&key, &format!("You have lost {} level(s).", levels_lost));
            }
        }
        self.save_or_warn(&snapshot, &destination);
    }

    fn persist(&self, combatant: &Combatant, room_id: &str) -> Result<(), MudError> {
        let Some(key) = combatant.character_key() else {
            return Ok(());
        };
        let mut record = match self.persistence.load_character(key) {
            Ok(record) => record,
            Err(MudError::NotFound(_)) => {
                let class = combatant
                    .as_character()
                    .map_or(CharacterClass::Fighter, |state| state.class);
                CharacterRecord::new(&combatant.name, class, room_id)
            }
            Err(e) => return Err(e),
        };
        combatant.write_back(&mut record);
        record.current_room = room_id.to_string();
        self.persistence.save_character(&record)
    }

    /// Save, and on failure tell the player instead of failing the caller.
    fn save_or_warn(&self, combatant: &Combatant, room_id: &str) {
        if let Err(e) = self.persist(combatant, room_id) {
            metrics::inc_save_failures();
            warn!("Failed to save {}: {}", combatant.id, e);
            notify(self.messenger.as_ref(), combatant, "Could not save your character.");
        }
    }

    /// Save every online character. Returns how many saved cleanly.
    pub fn save_all(&self) -> usize {
        let mut saved = 0;
        for name in self.world.online_characters() {
            let Some(room_id) = self.world.location_of(&name) else {
                continue;
            };
            let Some(handle) = self.world.room(&room_id) else {
                continue;
            };
            let snapshot = lock_room(&handle).get(&CombatantId::character(&name)).cloned();
            if let Some(combatant) = snapshot {
                match self.persist(&combatant, &room_id) {
                    Ok(()) => saved += 1,
                    Err(e) => {
                        metrics::inc_save_failures();
                        warn!("Failed to save {}: {}", name, e);
                    }
                }
            }
        }
        saved
    }

    /// Stop attacking. Opponents keep their pointers; the character still
    /// waits out a cooldown before its next swing.
    pub fn disengage(&self, name: &str, now: Instant) -> Result<Option<CombatantId>, CombatRefusal> {
        let me = CombatantId::character(name);
        let room_id = self.world.location_of(name).ok_or(CombatRefusal::UnknownPlayer)?;
        let handle = self.world.room(&room_id).ok_or(CombatRefusal::UnknownPlayer)?;
        let mut room = lock_room(&handle);
        if room.get(&me).is_none() {
            return Err(CombatRefusal::AttackerNotPresent);
        }
        let previous = engagement::disengage(&mut room, &me);
        match &previous {
            Some(_) => {
                if let Some(combatant) = room.get_mut(&me) {
                    engagement::start_cooldown(combatant, &mut **self.dice(), now);
                }
                self.messenger.send_to_one(name, "You stop fighting.");
            }
            None => self.messenger.send_to_one(name, "You are not fighting anyone."),
        }
        Ok(previous)
    }

    /// Level, hit points, experience and kill record.
    pub fn score(&self, name: &str) -> Result<String, CombatRefusal> {
        let me = CombatantId::character(name);
        let room_id = self.world.location_of(name).ok_or(CombatRefusal::UnknownPlayer)?;
        let handle = self.world.room(&room_id).ok_or(CombatRefusal::UnknownPlayer)?;
        let room = lock_room(&handle);
        let combatant = room.get(&me).ok_or(CombatRefusal::AttackerNotPresent)?;
        let state = combatant.as_character().ok_or(CombatRefusal::UnknownPlayer)?;
        let kills = state.kills;
        Ok(format!(
            "{}, level {} {:?}\nHP {}/{} ({})\nExperience {}\nKills: {} weak, {} matched, {} valiant, {} epic, {} players\nDeaths: {}",
            combatant.name,
            combatant.level,
            state.class,
            combatant.vitals.hp,
            combatant.vitals.max_hp,
            combatant.condition(),
            state.experience,
            kills.weak,
            kills.matched,
            kills.valiant,
            kills.epic,
            kills.players,
            kills.deaths,
        ))
    }

    /// Describe the character's room: who is here, how they look, and what
    /// lies on the floor.
    pub fn look(&self, name: &str) -> Result<String, CombatRefusal> {
        let me = CombatantId::character(name);
        let room_id = self.world.location_of(name).ok_or(CombatRefusal::UnknownPlayer)?;
        let handle = self.world.room(&room_id).ok_or(CombatRefusal::UnknownPlayer)?;
        let room = lock_room(&handle);
        let mut lines = vec![room.name.clone()];
        if room.is_safe() {
            lines.push("This is a place of peace.".to_string());
        }
        for other in room.combatants.iter().filter(|c| c.id != me) {
            if other.is_character() && other.status.invisible {
                continue;
            }
            let mut line = format!("{} ({})", capitalize(&other.name), other.condition());
            if let Some(target) = other.attacking.as_ref().and_then(|t| room.get(t)) {
                let whom = if target.id == me { "you".to_string() } else { target.name.clone() };
                line.push_str(&format!(", fighting {}", whom));
            }
            lines.push(line);
        }
        if !room.items.is_empty() {
            let items: Vec<&str> = room.items.iter().map(|i| i.name.as_str()).collect();
            lines.push(format!("On the ground: {}.", items.join(", ")));
        }
        Ok(lines.join("\n"))
    }
}
