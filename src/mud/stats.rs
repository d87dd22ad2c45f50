//! Live combatant model shared by characters and creatures.
//!
//! A [`Combatant`] is the in-room, runtime form of either a persisted
//! [`CharacterRecord`] or an instantiated [`CreatureTemplate`]. The shared
//! attribute set lives on the struct; player-only and creature-only data live on
//! the [`CombatantKind`] variants so the rules engine can branch on the tag rather
//! than probing types.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::mud::types::{
    Alignment, Attributes, CharacterClass, CharacterRecord, CreatureTemplate, Disposition,
    Equipment, Item, KillStats, Skills, StatusFlags, Vitals, WeaponStats,
};

/// Handle used for engagement pointers. Always resolved through the room roster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CombatantId {
    Character(String),
    Creature(u64),
}

impl CombatantId {
    pub fn character(name: &str) -> Self {
        CombatantId::Character(name.to_ascii_lowercase())
    }

    pub fn is_character(&self) -> bool {
        matches!(self, CombatantId::Character(_))
    }
}

impl fmt::Display for CombatantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CombatantId::Character(name) => write!(f, "character:{}", name),
            CombatantId::Creature(serial) => write!(f, "creature:{}", serial),
        }
    }
}

/// Coarse health bucket shown to players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Condition {
    Dead,
    Desperate,
    Injured,
    Drained,
    Fatigued,
    Healthy,
    Fresh,
}

impl Condition {
    pub fn label(&self) -> &'static str {
        match self {
            Condition::Dead => "dead",
            Condition::Desperate => "desperate",
            Condition::Injured => "injured",
            Condition::Drained => "drained",
            Condition::Fatigued => "fatigued",
            Condition::Healthy => "healthy",
            Condition::Fresh => "fresh",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CharacterState {
    pub class: CharacterClass,
    pub alignment: Alignment,
    pub experience: u64,
    pub skills: Skills,
    pub kills: KillStats,
    pub is_dm: bool,
    pub home_room: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatureState {
    pub template_id: String,
    pub disposition: Disposition,
    pub natural_attack: WeaponStats,
    pub natural_armor: i32,
    pub natural_dodge: i32,
    pub hostile: bool,
    pub attacks_back: bool,
    pub experience: u64,
    pub cooldown_secs: (u64, u64),
    pub flees_below: Option<i32>,
    /// When the creature entered its current room; gates initiative.
    pub arrived_at: Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CombatantKind {
    Character(CharacterState),
    Creature(CreatureState),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Combatant {
    pub id: CombatantId,
    pub name: String,
    pub level: i32,
    pub vitals: Vitals,
    pub attributes: Attributes,
    pub status: StatusFlags,
    pub equipment: Equipment,
    pub inventory: Vec<Item>,
    /// Who this combatant is currently fighting. Never owning; re-validate before use.
    pub attacking: Option<CombatantId>,
    /// Earliest instant the next attack may be attempted.
    pub next_attack_at: Instant,
    /// Dodge granted by the profile of this combatant's most recent swing.
    pub stance_dodge: i32,
    pub kind: CombatantKind,
}

impl Combatant {
    pub fn from_record(record: CharacterRecord, now: Instant) -> Self {
        Self {
            id: CombatantId::character(&record.name),
            name: record.display_name,
            level: record.level.max(1),
            vitals: record.vitals,
            attributes: record.attributes,
            status: record.status,
            equipment: record.equipment,
            inventory: record.inventory,
            attacking: None,
            next_attack_at: now,
            stance_dodge: 0,
            kind: CombatantKind::Character(CharacterState {
                class: record.class,
                alignment: record.alignment,
                experience: record.experience,
                skills: record.skills,
                kills: record.kills,
                is_dm: record.is_dm,
                home_room: record.home_room,
            }),
        }
    }

    pub fn from_template(template: &CreatureTemplate, serial: u64, now: Instant) -> Self {
        Self {
            id: CombatantId::Creature(serial),
            name: template.name.clone(),
            level: template.level.max(1),
            vitals: Vitals::full(template.max_hp, 0),
            attributes: template.attributes,
            status: StatusFlags::default(),
            equipment: Equipment::default(),
            inventory: template.loot.clone(),
            attacking: None,
            next_attack_at: now,
            stance_dodge: 0,
            kind: CombatantKind::Creature(CreatureState {
                template_id: template.id.clone(),
                disposition: template.disposition,
                natural_attack: template.natural_attack,
                natural_armor: template.armor_class,
                natural_dodge: template.dodge,
                hostile: template.hostile,
                attacks_back: template.attacks_back,
                experience: template.experience,
                cooldown_secs: template.cooldown_secs,
                flees_below: template.flees_below,
                arrived_at: now,
            }),
        }
    }

    /// Fold the durable fields back into `record` for persistence.
    pub fn write_back(&self, record: &mut CharacterRecord) {
        record.display_name = self.name.clone();
        record.level = self.level;
        record.vitals = self.vitals;
        record.attributes = self.attributes;
        record.status = self.status;
        record.equipment = self.equipment.clone();
        record.inventory = self.inventory.clone();
        if let CombatantKind::Character(state) = &self.kind {
            record.class = state.class;
            record.alignment = state.alignment;
            record.experience = state.experience;
            record.skills = state.skills.clone();
            record.kills = state.kills;
            record.is_dm = state.is_dm;
            record.home_room = state.home_room.clone();
        }
    }

    pub fn is_character(&self) -> bool {
        matches!(self.kind, CombatantKind::Character(_))
    }

    pub fn as_character(&self) -> Option<&CharacterState> {
        match &self.kind {
            CombatantKind::Character(state) => Some(state),
            CombatantKind::Creature(_) => None,
        }
    }

    pub fn as_character_mut(&mut self) -> Option<&mut CharacterState> {
        match &mut self.kind {
            CombatantKind::Character(state) => Some(state),
            CombatantKind::Creature(_) => None,
        }
    }

    pub fn as_creature(&self) -> Option<&CreatureState> {
        match &self.kind {
            CombatantKind::Creature(state) => Some(state),
            CombatantKind::Character(_) => None,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.vitals.hp > 0
    }

    /// Character name key, if this is a player.
    pub fn character_key(&self) -> Option<&str> {
        match &self.id {
            CombatantId::Character(name) => Some(name.as_str()),
            CombatantId::Creature(_) => None,
        }
    }

    /// Sum of AC from every equipped item plus any natural armor.
    pub fn armor_class(&self) -> i32 {
        let natural = self.as_creature().map_or(0, |c| c.natural_armor);
        natural + self.equipment.iter().map(|item| item.armor_class).sum::<i32>()
    }

    /// Equipped dodge bonuses plus the stance from the last attack profile used.
    pub fn cumulative_dodge(&self) -> i32 {
        let natural = self.as_creature().map_or(0, |c| c.natural_dodge);
        natural + self.stance_dodge + self.equipment.iter().map(|item| item.dodge).sum::<i32>()
    }

    /// Weapon in hand, falling back to a creature's natural attack or bare fists.
    pub fn weapon(&self) -> WeaponStats {
        if let Some(stats) = self.equipment.weapon.as_ref().and_then(|w| w.weapon) {
            return stats;
        }
        match &self.kind {
            CombatantKind::Creature(state) => state.natural_attack,
            CombatantKind::Character(_) => WeaponStats::BARE_HANDS,
        }
    }

    pub fn hit_point_percent(&self) -> i32 {
        if self.vitals.max_hp <= 0 {
            return 0;
        }
        (100 * i64::from(self.vitals.hp) / i64::from(self.vitals.max_hp)) as i32
    }

    pub fn condition(&self) -> Condition {
        if self.vitals.hp <= 0 || self.vitals.max_hp <= 0 {
            return Condition::Dead;
        }
        condition_for_percent(self.hit_point_percent())
    }

    /// Whether `damage` would bring this combatant to zero or below.
    pub fn damage_is_lethal(&self, damage: i32) -> bool {
        self.vitals.hp - damage <= 0
    }

    pub fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        if now >= self.next_attack_at {
            None
        } else {
            Some(self.next_attack_at - now)
        }
    }

    pub fn is_concealed(&self) -> bool {
        self.status.hidden || self.status.invisible
    }
}

/// The fixed stair-step from HP percentage to condition. Each threshold is exclusive,
/// so a value sitting exactly on a boundary lands in the healthier bucket.
pub fn condition_for_percent(percent: i32) -> Condition {
    if percent <= 0 {
        Condition::Dead
    } else if percent < 10 {
        Condition::Desperate
    } else if percent < 25 {
        Condition::Injured
    } else if percent < 50 {
        Condition::Drained
    } else if percent < 75 {
        Condition::Fatigued
    } else if percent < 100 {
        Condition::Healthy
    } else {
        Condition::Fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mud::types::{Item, ItemSlot, WeaponKind};

    fn fighter(hp: i32, max_hp: i32) -> Combatant {
        let mut record = CharacterRecord::new("Tess", CharacterClass::Fighter, "square");
        record.vitals.hp = hp;
        record.vitals.max_hp = max_hp;
        Combatant::from_record(record, Instant::now())
    }

    #[test]
    fn condition_stair_steps() {
        assert_eq!(fighter(100, 100).condition(), Condition::Fresh);
        assert_eq!(fighter(99, 100).condition(), Condition::Healthy);
        assert_eq!(fighter(75, 100).condition(), Condition::Healthy);
        assert_eq!(fighter(74, 100).condition(), Condition::Fatigued);
        assert_eq!(fighter(70, 100).condition(), Condition::Fatigued);
        assert_eq!(fighter(50, 100).condition(), Condition::Fatigued);
        assert_eq!(fighter(49, 100).condition(), Condition::Drained);
        assert_eq!(fighter(25, 100).condition(), Condition::Drained);
        assert_eq!(fighter(24, 100).condition(), Condition::Injured);
        assert_eq!(fighter(10, 100).condition(), Condition::Injured);
        assert_eq!(fighter(9, 100).condition(), Condition::Desperate);
        assert_eq!(fighter(1, 100).condition(), Condition::Desperate);
        assert_eq!(fighter(0, 100).condition(), Condition::Dead);
        assert_eq!(fighter(-5, 100).condition(), Condition::Dead);
    }

    #[test]
    fn zero_max_hp_is_dead_not_a_panic() {
        let c = fighter(10, 0);
        assert_eq!(c.hit_point_percent(), 0);
        assert_eq!(c.condition(), Condition::Dead);
    }

    #[test]
    fn condition_is_monotonic_in_percent() {
        let mut last = Condition::Dead;
        for pct in 0..=100 {
            let c = condition_for_percent(pct);
            assert!(c >= last, "condition dropped at {}%", pct);
            last = c;
        }
    }

    #[test]
    fn armor_and_dodge_sum_equipped_items() {
        let mut c = fighter(20, 20);
        assert_eq!(c.armor_class(), 0);
        assert_eq!(c.cumulative_dodge(), 0);
        c.equipment.equip(Item::wearable("mail", "chain mail", ItemSlot::Armor, 4, -2));
        c.equipment.equip(Item::wearable("buckler", "a buckler", ItemSlot::Shield, 1, 5));
        c.equipment.equip(Item::wearable("band", "a copper band", ItemSlot::Ring, 0, 3));
        c.stance_dodge = 10;
        assert_eq!(c.armor_class(), 5);
        assert_eq!(c.cumulative_dodge(), 16);
    }

    #[test]
    fn bare_hands_when_nothing_wielded() {
        let mut c = fighter(20, 20);
        assert_eq!(c.weapon(), WeaponStats::BARE_HANDS);
        let sword = WeaponStats::new(2, 8, WeaponKind::Blade);
        c.equipment.equip(Item::weapon("sword", "a sword", sword));
        assert_eq!(c.weapon(), sword);
    }

    #[test]
    fn write_back_round_trips_durable_fields() {
        let record = CharacterRecord::new("Tess", CharacterClass::Thief, "square");
        let mut c = Combatant::from_record(record.clone(), Instant::now());
        c.level = 4;
        c.vitals.hp = 3;
        if let Some(state) = c.as_character_mut() {
            state.experience = 1200;
            state.kills.weak = 2;
        }
        let mut saved = record;
        c.write_back(&mut saved);
        assert_eq!(saved.level, 4);
        assert_eq!(saved.vitals.hp, 3);
        assert_eq!(saved.experience, 1200);
        assert_eq!(saved.kills.weak, 2);
    }
}
