//! Live rooms and the world that owns them.
//!
//! Each room sits behind its own mutex. Every read-decide-write sequence in
//! combat runs while holding exactly one room lock; code never holds two room
//! locks at once, so there is no lock ordering to get wrong.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;

use log::{debug, warn};

use crate::mud::errors::MudError;
use crate::mud::stats::{Combatant, CombatantId};
use crate::mud::storage::MudStore;
use crate::mud::types::{CreatureTemplate, Item, RoomRecord};

#[derive(Debug)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub safe: bool,
    pub max_items: usize,
    pub items: Vec<Item>,
    pub combatants: Vec<Combatant>,
    pub record: RoomRecord,
}

impl Room {
    pub fn from_record(record: RoomRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            safe: record.safe,
            max_items: record.max_items,
            items: Vec::new(),
            combatants: Vec::new(),
            record,
        }
    }

    pub fn is_safe(&self) -> bool {
        self.safe
    }

    pub fn characters(&self) -> impl Iterator<Item = &Combatant> {
        self.combatants.iter().filter(|c| c.is_character())
    }

    pub fn creatures(&self) -> impl Iterator<Item = &Combatant> {
        self.combatants.iter().filter(|c| !c.is_character())
    }

    pub fn has_characters(&self) -> bool {
        self.characters().next().is_some()
    }

    pub fn creature_ids(&self) -> Vec<CombatantId> {
        self.creatures().map(|c| c.id.clone()).collect()
    }

    pub fn index_of(&self, id: &CombatantId) -> Option<usize> {
        self.combatants.iter().position(|c| &c.id == id)
    }

    pub fn get(&self, id: &CombatantId) -> Option<&Combatant> {
        self.combatants.iter().find(|c| &c.id == id)
    }

    pub fn get_mut(&mut self, id: &CombatantId) -> Option<&mut Combatant> {
        self.combatants.iter_mut().find(|c| &c.id == id)
    }

    /// Present and above zero hit points.
    pub fn is_live(&self, id: &CombatantId) -> bool {
        self.get(id).map_or(false, Combatant::is_alive)
    }

    /// Resolve a typed target name: exact character name first, then the first
    /// creature whose name contains the text.
    pub fn find_by_name(&self, name: &str) -> Option<&Combatant> {
        let wanted = name.trim().to_ascii_lowercase();
        if wanted.is_empty() {
            return None;
        }
        self.characters()
            .find(|c| c.character_key() == Some(wanted.as_str()))
            .or_else(|| {
                self.creatures()
                    .find(|c| c.name.to_ascii_lowercase().contains(&wanted))
            })
    }

    pub fn insert(&mut self, combatant: Combatant) {
        if let Some(existing) = self.index_of(&combatant.id) {
            self.combatants[existing] = combatant;
        } else {
            self.combatants.push(combatant);
        }
    }

    pub fn remove(&mut self, id: &CombatantId) -> Option<Combatant> {
        let idx = self.index_of(id)?;
        Some(self.combatants.remove(idx))
    }

    /// Drop an item on the floor. Hands the item back when the room is full.
    pub fn add_item(&mut self, item: Item) -> Result<(), Item> {
        if self.items.len() >= self.max_items {
            return Err(item);
        }
        self.items.push(item);
        Ok(())
    }

    pub fn remove_item(&mut self, item_id: &str) -> Option<Item> {
        let idx = self.items.iter().position(|i| i.id == item_id)?;
        Some(self.items.remove(idx))
    }

    /// Number of live creatures spawned from `template_id`.
    pub fn count_template(&self, template_id: &str) -> usize {
        self.creatures()
            .filter_map(|c| c.as_creature())
            .filter(|c| c.template_id == template_id)
            .count()
    }
}

/// Lock a room, recovering the guard if a previous holder panicked.
pub fn lock_room(room: &Mutex<Room>) -> MutexGuard<'_, Room> {
    room.lock().unwrap_or_else(|poisoned| {
        warn!("Room mutex poisoned; recovering");
        poisoned.into_inner()
    })
}

/// Every live room plus the character-to-room index.
pub struct World {
    rooms: RwLock<HashMap<String, Arc<Mutex<Room>>>>,
    locations: Mutex<HashMap<String, String>>, // character key -> room id
    templates: RwLock<HashMap<String, CreatureTemplate>>,
    next_serial: AtomicU64,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            locations: Mutex::new(HashMap::new()),
            templates: RwLock::new(HashMap::new()),
            next_serial: AtomicU64::new(1),
        }
    }

    /// Build the live world from stored rooms and templates, spawning each room's
    /// creatures.
    pub fn from_store(store: &MudStore, now: Instant) -> Result<Self, MudError> {
        let world = Self::new();
        for template in store.list_creature_templates()? {
            world.add_template(template);
        }
        for record in store.list_rooms()? {
            world.add_room(record);
        }
        let spawned = world.fill_spawns(now);
        debug!("World built with {} room(s), {} creature(s)", world.room_ids().len(), spawned);
        Ok(world)
    }

    pub fn add_room(&self, record: RoomRecord) -> Arc<Mutex<Room>> {
        let id = record.id.clone();
        let room = Arc::new(Mutex::new(Room::from_record(record)));
        self.rooms
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, room.clone());
        room
    }

    pub fn room(&self, room_id: &str) -> Option<Arc<Mutex<Room>>> {
        self.rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(room_id)
            .cloned()
    }

    pub fn room_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Snapshot of room handles, taken so callers can lock them one at a time.
    pub fn rooms(&self) -> Vec<Arc<Mutex<Room>>> {
        self.room_ids()
            .iter()
            .filter_map(|id| self.room(id))
            .collect()
    }

    pub fn add_template(&self, template: CreatureTemplate) {
        self.templates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(template.id.clone(), template);
    }

    pub fn template(&self, template_id: &str) -> Option<CreatureTemplate> {
        self.templates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(template_id)
            .cloned()
    }

    pub fn next_serial(&self) -> u64 {
        self.next_serial.fetch_add(1, Ordering::Relaxed)
    }

    /// Place a fresh creature from `template` into `room`.
    pub fn spawn_into(&self, room: &mut Room, template: &CreatureTemplate, now: Instant) -> CombatantId {
        let creature = Combatant::from_template(template, self.next_serial(), now);
        let id = creature.id.clone();
        debug!("Spawned {} ({}) in {}", creature.name, id, room.id);
        room.insert(creature);
        id
    }

    /// Top up every room to its configured spawn counts. Returns how many creatures appeared.
    pub fn fill_spawns(&self, now: Instant) -> usize {
        let mut spawned = 0;
        for handle in self.rooms() {
            let mut room = lock_room(&handle);
            let spawns = room.record.spawns.clone();
            for spawn in spawns {
                let Some(template) = self.template(&spawn.template_id) else {
                    warn!("Room {} references unknown creature template {}", room.id, spawn.template_id);
                    continue;
                };
                let present = room.count_template(&spawn.template_id);
                for _ in present..spawn.count as usize {
                    self.spawn_into(&mut room, &template, now);
                    spawned += 1;
                }
            }
        }
        spawned
    }

    pub fn location_of(&self, character: &str) -> Option<String> {
        self.locations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&character.to_ascii_lowercase())
            .cloned()
    }

    pub fn set_location(&self, character: &str, room_id: &str) {
        self.locations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(character.to_ascii_lowercase(), room_id.to_string());
    }

    pub fn clear_location(&self, character: &str) -> Option<String> {
        self.locations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&character.to_ascii_lowercase())
    }

    pub fn online_characters(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .locations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mud::types::{CharacterClass, CharacterRecord, WeaponKind, WeaponStats};

    fn rat() -> CreatureTemplate {
        CreatureTemplate::new("rat", "a sewer rat", 1, 6, WeaponStats::new(1, 2, WeaponKind::Claw))
    }

    #[test]
    fn full_room_rejects_items() {
        let mut room = Room::from_record(RoomRecord::new("cellar", "Cellar").with_item_capacity(1));
        assert!(room.add_item(Item::carried("coin", "a coin")).is_ok());
        let rejected = room.add_item(Item::carried("gem", "a gem"));
        assert_eq!(rejected.map_err(|i| i.id), Err("gem".to_string()));
        assert!(room.remove_item("coin").is_some());
        assert!(room.items.is_empty());
    }

    #[test]
    fn find_by_name_prefers_characters_then_creature_substring() {
        let world = World::new();
        world.add_template(rat());
        let handle = world.add_room(RoomRecord::new("cellar", "Cellar"));
        let mut room = lock_room(&handle);
        let now = Instant::now();
        world.spawn_into(&mut room, &rat(), now);
        let hero = CharacterRecord::new("Rat", CharacterClass::Fighter, "cellar");
        room.insert(Combatant::from_record(hero, now));

        assert!(room.find_by_name("rat").map_or(false, |c| c.is_character()));
        assert!(room.find_by_name("sewer").map_or(false, |c| !c.is_character()));
        assert!(room.find_by_name("  ").is_none());
        assert!(room.find_by_name("dragon").is_none());
    }

    #[test]
    fn fill_spawns_tops_up_to_quota() {
        let world = World::new();
        world.add_template(rat());
        world.add_room(RoomRecord::new("cellar", "Cellar").with_spawn("rat", 3).with_spawn("ghost", 1));
        let now = Instant::now();
        assert_eq!(world.fill_spawns(now), 3);
        assert_eq!(world.fill_spawns(now), 0);

        let handle = world.room("cellar").expect("room");
        let victim = lock_room(&handle).creature_ids()[0].clone();
        lock_room(&handle).remove(&victim);
        assert_eq!(world.fill_spawns(now), 1);
    }

    #[test]
    fn location_index_is_case_insensitive() {
        let world = World::new();
        world.set_location("Ada", "square");
        assert_eq!(world.location_of("ADA").as_deref(), Some("square"));
        assert_eq!(world.online_characters(), vec!["ada".to_string()]);
        assert_eq!(world.clear_location("ada").as_deref(), Some("square"));
        assert!(world.location_of("ada").is_none());
    }
}
