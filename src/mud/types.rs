use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const CHARACTER_SCHEMA_VERSION: u8 = 1;
pub const ROOM_SCHEMA_VERSION: u8 = 1;
pub const CREATURE_SCHEMA_VERSION: u8 = 1;

/// Character ethos. Only characters carry one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    Lawful,
    #[default]
    Neutral,
    Chaotic,
}

/// Creature moral tag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Good,
    #[default]
    Neutral,
    Evil,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum CharacterClass {
    #[default]
    Fighter,
    Thief,
    Mage,
    Cleric,
    Paladin,
    Ranger,
    DungeonMaster,
}

impl CharacterClass {
    pub fn base_hit_points(&self) -> i32 {
        match self {
            CharacterClass::Fighter | CharacterClass::Paladin => 20,
            CharacterClass::Ranger | CharacterClass::Cleric => 16,
            CharacterClass::Thief => 14,
            CharacterClass::Mage => 10,
            CharacterClass::DungeonMaster => 100,
        }
    }

    pub fn hit_points_per_level(&self) -> i32 {
        match self {
            CharacterClass::Fighter | CharacterClass::Paladin => 10,
            CharacterClass::Ranger | CharacterClass::Cleric => 8,
            CharacterClass::Thief => 7,
            CharacterClass::Mage => 5,
            CharacterClass::DungeonMaster => 50,
        }
    }

    /// Fixed delay between two attack commands.
    pub fn attack_interval_secs(&self) -> u64 {
        match self {
            CharacterClass::Fighter | CharacterClass::Paladin | CharacterClass::Ranger => 3,
            CharacterClass::Thief => 2,
            CharacterClass::Cleric => 4,
            CharacterClass::Mage => 5,
            CharacterClass::DungeonMaster => 0,
        }
    }

    /// Percentage points shaved off the chance of losing a second level on death.
    pub fn death_protection(&self) -> i32 {
        match self {
            CharacterClass::Cleric | CharacterClass::Paladin => 10,
            CharacterClass::DungeonMaster => 100,
            _ => 0,
        }
    }

    /// Maximum hit points for a given level and constitution.
    pub fn max_hit_points(&self, level: i32, constitution: i32) -> i32 {
        let level = level.max(1);
        let con_bonus = (constitution - 12).max(0) / 2;
        self.base_hit_points() + (level - 1) * (self.hit_points_per_level() + con_bonus)
    }
}

/// Weapon families. Profiles and skills key off these.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WeaponKind {
    Blade,
    Blunt,
    Pierce,
    Missile,
    Claw,
    Unarmed,
    Magic,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WeaponStats {
    pub min_damage: i32,
    pub max_damage: i32,
    /// Added to the attacker's hit threshold.
    #[serde(default)]
    pub to_hit: i32,
    pub kind: WeaponKind,
}

impl WeaponStats {
    pub const BARE_HANDS: WeaponStats = WeaponStats {
        min_damage: 1,
        max_damage: 2,
        to_hit: 0,
        kind: WeaponKind::Unarmed,
    };

    pub fn new(min_damage: i32, max_damage: i32, kind: WeaponKind) -> Self {
        Self {
            min_damage,
            max_damage,
            to_hit: 0,
            kind,
        }
    }

    pub fn with_to_hit(mut self, to_hit: i32) -> Self {
        self.to_hit = to_hit;
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemSlot {
    Weapon,
    Armor,
    Shield,
    Ring,
    Necklace,
    Carried,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub slot: ItemSlot,
    #[serde(default)]
    pub armor_class: i32,
    #[serde(default)]
    pub dodge: i32,
    #[serde(default)]
    pub weapon: Option<WeaponStats>,
}

impl Item {
    pub fn carried(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            slot: ItemSlot::Carried,
            armor_class: 0,
            dodge: 0,
            weapon: None,
        }
    }

    pub fn weapon(id: &str, name: &str, stats: WeaponStats) -> Self {
        Self {
            slot: ItemSlot::Weapon,
            weapon: Some(stats),
            ..Self::carried(id, name)
        }
    }

    pub fn wearable(id: &str, name: &str, slot: ItemSlot, armor_class: i32, dodge: i32) -> Self {
        Self {
            slot,
            armor_class,
            dodge,
            ..Self::carried(id, name)
        }
    }
}

/// Worn and wielded items. Each slot contributes AC and dodge independently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Equipment {
    pub weapon: Option<Item>,
    pub armor: Option<Item>,
    pub shield: Option<Item>,
    pub ring: Option<Item>,
    pub necklace: Option<Item>,
}

impl Equipment {
    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        [
            &self.weapon,
            &self.armor,
            &self.shield,
            &self.ring,
            &self.necklace,
        ]
        .into_iter()
        .flatten()
    }

    /// Put `item` in its slot, handing back whatever it displaced.
    pub fn equip(&mut self, item: Item) -> Option<Item> {
        let slot = match item.slot {
            ItemSlot::Weapon => &mut self.weapon,
            ItemSlot::Armor => &mut self.armor,
            ItemSlot::Shield => &mut self.shield,
            ItemSlot::Ring => &mut self.ring,
            ItemSlot::Necklace => &mut self.necklace,
            ItemSlot::Carried => return Some(item),
        };
        slot.replace(item)
    }

    pub fn take_all(&mut self) -> Vec<Item> {
        [
            self.weapon.take(),
            self.armor.take(),
            self.shield.take(),
            self.ring.take(),
            self.necklace.take(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attributes {
    pub strength: i32,
    pub dexterity: i32,
    pub intelligence: i32,
    pub piety: i32,
    pub charisma: i32,
    pub constitution: i32,
    pub luck: i32,
}

impl Default for Attributes {
    fn default() -> Self {
        Self {
            strength: 12,
            dexterity: 12,
            intelligence: 12,
            piety: 12,
            charisma: 12,
            constitution: 12,
            luck: 12,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Vitals {
    pub hp: i32,
    pub max_hp: i32,
    pub mp: i32,
    pub max_mp: i32,
}

impl Vitals {
    pub fn full(max_hp: i32, max_mp: i32) -> Self {
        Self {
            hp: max_hp,
            max_hp,
            mp: max_mp,
            max_mp,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StatusFlags {
    pub hidden: bool,
    pub invisible: bool,
    pub poisoned: bool,
    pub plagued: bool,
    /// Next double-damage check against this combatant succeeds, then clears.
    pub vulnerable: bool,
}

/// Weapon and spell proficiency percentages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Skills {
    #[serde(default)]
    pub weapons: HashMap<WeaponKind, i32>,
    #[serde(default)]
    pub magic: i32,
}

impl Skills {
    pub fn weapon(&self, kind: WeaponKind) -> i32 {
        if kind == WeaponKind::Magic {
            return self.magic;
        }
        self.weapons.get(&kind).copied().unwrap_or(0)
    }

    /// Raise a proficiency by one point, capped at 100. Returns the new value.
    pub fn improve(&mut self, kind: WeaponKind) -> i32 {
        let slot = if kind == WeaponKind::Magic {
            &mut self.magic
        } else {
            self.weapons.entry(kind).or_insert(0)
        };
        *slot = (*slot + 1).min(100);
        *slot
    }
}

/// Kill tallies bucketed by the victim's level relative to the killer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct KillStats {
    pub weak: u32,
    pub matched: u32,
    pub valiant: u32,
    pub epic: u32,
    pub players: u32,
    pub deaths: u32,
}

impl KillStats {
    pub fn total(&self) -> u32 {
        self.weak + self.matched + self.valiant + self.epic + self.players
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CharacterRecord {
    /// Lowercase lookup key.
    pub name: String,
    pub display_name: String,
    pub class: CharacterClass,
    pub alignment: Alignment,
    pub level: i32,
    pub experience: u64,
    pub vitals: Vitals,
    pub attributes: Attributes,
    #[serde(default)]
    pub status: StatusFlags,
    #[serde(default)]
    pub equipment: Equipment,
    #[serde(default)]
    pub inventory: Vec<Item>,
    #[serde(default)]
    pub skills: Skills,
    #[serde(default)]
    pub kills: KillStats,
    #[serde(default)]
    pub is_dm: bool,
    /// Guild hall to return to on death; the configured start room otherwise.
    #[serde(default)]
    pub home_room: Option<String>,
    pub current_room: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl CharacterRecord {
    pub fn new(display_name: &str, class: CharacterClass, starting_room: &str) -> Self {
        let now = Utc::now();
        let attributes = Attributes::default();
        let max_hp = class.max_hit_points(1, attributes.constitution);
        Self {
            name: display_name.to_ascii_lowercase(),
            display_name: display_name.to_string(),
            class,
            alignment: Alignment::Neutral,
            level: 1,
            experience: 0,
            vitals: Vitals::full(max_hp, 10),
            attributes,
            status: StatusFlags::default(),
            equipment: Equipment::default(),
            inventory: Vec::new(),
            skills: Skills::default(),
            kills: KillStats::default(),
            is_dm: class == CharacterClass::DungeonMaster,
            home_room: None,
            current_room: starting_room.to_string(),
            created_at: now,
            updated_at: now,
            schema_version: CHARACTER_SCHEMA_VERSION,
        }
    }

    /// Set the level and refill hit points to the class maximum for it.
    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level.max(1);
        let max_hp = self
            .class
            .max_hit_points(self.level, self.attributes.constitution);
        self.vitals.max_hp = max_hp;
        self.vitals.hp = max_hp;
        self
    }

    pub fn with_alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_equipped(mut self, item: Item) -> Self {
        if let Some(displaced) = self.equipment.equip(item) {
            self.inventory.push(displaced);
        }
        self
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreatureTemplate {
    pub id: String,
    pub name: String,
    pub level: i32,
    #[serde(default)]
    pub disposition: Disposition,
    pub max_hp: i32,
    #[serde(default)]
    pub attributes: Attributes,
    pub natural_attack: WeaponStats,
    #[serde(default)]
    pub armor_class: i32,
    #[serde(default)]
    pub dodge: i32,
    /// Initiates fights with characters it notices.
    #[serde(default)]
    pub hostile: bool,
    /// Turns on whoever strikes it.
    #[serde(default = "default_attacks_back")]
    pub attacks_back: bool,
    pub experience: u64,
    /// Inclusive band the attack cooldown is drawn from on every swing.
    pub cooldown_secs: (u64, u64),
    /// HP percentage below which the creature may panic and flee.
    #[serde(default)]
    pub flees_below: Option<i32>,
    #[serde(default)]
    pub loot: Vec<Item>,
    #[serde(default = "default_creature_schema")]
    pub schema_version: u8,
}

fn default_attacks_back() -> bool {
    true
}

fn default_creature_schema() -> u8 {
    CREATURE_SCHEMA_VERSION
}

impl CreatureTemplate {
    pub fn new(id: &str, name: &str, level: i32, max_hp: i32, natural_attack: WeaponStats) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            level,
            disposition: Disposition::Neutral,
            max_hp,
            attributes: Attributes::default(),
            natural_attack,
            armor_class: 0,
            dodge: 0,
            hostile: false,
            attacks_back: true,
            experience: 0,
            cooldown_secs: (3, 6),
            flees_below: None,
            loot: Vec::new(),
            schema_version: CREATURE_SCHEMA_VERSION,
        }
    }

    pub fn hostile(mut self) -> Self {
        self.hostile = true;
        self
    }

    pub fn passive(mut self) -> Self {
        self.attacks_back = false;
        self
    }

    pub fn with_disposition(mut self, disposition: Disposition) -> Self {
        self.disposition = disposition;
        self
    }

    pub fn with_experience(mut self, experience: u64) -> Self {
        self.experience = experience;
        self
    }

    pub fn with_armor(mut self, armor_class: i32, dodge: i32) -> Self {
        self.armor_class = armor_class;
        self.dodge = dodge;
        self
    }

    pub fn with_cooldown(mut self, min_secs: u64, max_secs: u64) -> Self {
        self.cooldown_secs = (min_secs.min(max_secs), max_secs.max(min_secs));
        self
    }

    pub fn with_flee_threshold(mut self, percent: i32) -> Self {
        self.flees_below = Some(percent);
        self
    }

    pub fn with_loot(mut self, item: Item) -> Self {
        self.loot.push(item);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatureSpawn {
    pub template_id: String,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomRecord {
    pub id: String,
    pub name: String,
    /// Combat disabled.
    #[serde(default)]
    pub safe: bool,
    pub max_items: usize,
    #[serde(default)]
    pub spawns: Vec<CreatureSpawn>,
    pub schema_version: u8,
}

impl RoomRecord {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            safe: false,
            max_items: 20,
            spawns: Vec::new(),
            schema_version: ROOM_SCHEMA_VERSION,
        }
    }

    pub fn safe(mut self) -> Self {
        self.safe = true;
        self
    }

    pub fn with_item_capacity(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    pub fn with_spawn(mut self, template_id: &str, count: u32) -> Self {
        self.spawns.push(CreatureSpawn {
            template_id: template_id.to_string(),
            count,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_hit_points_grow_with_level_and_constitution() {
        let fighter = CharacterClass::Fighter;
        assert_eq!(fighter.max_hit_points(1, 12), 20);
        assert_eq!(fighter.max_hit_points(3, 12), 40);
        assert_eq!(fighter.max_hit_points(3, 16), 44);
        assert_eq!(fighter.max_hit_points(0, 12), 20);
    }

    #[test]
    fn equipping_returns_displaced_item() {
        let mut gear = Equipment::default();
        let dagger = Item::weapon("dagger", "a dagger", WeaponStats::new(1, 4, WeaponKind::Pierce));
        let sword = Item::weapon("sword", "a sword", WeaponStats::new(2, 8, WeaponKind::Blade));
        assert!(gear.equip(dagger.clone()).is_none());
        assert_eq!(gear.equip(sword), Some(dagger));
        assert_eq!(gear.iter().count(), 1);
        assert_eq!(gear.take_all().len(), 1);
        assert!(gear.weapon.is_none());
    }

    #[test]
    fn skill_improvement_caps_at_one_hundred() {
        let mut skills = Skills::default();
        skills.weapons.insert(WeaponKind::Blade, 99);
        assert_eq!(skills.improve(WeaponKind::Blade), 100);
        assert_eq!(skills.improve(WeaponKind::Blade), 100);
        assert_eq!(skills.improve(WeaponKind::Magic), 1);
        assert_eq!(skills.weapon(WeaponKind::Magic), 1);
    }
}
