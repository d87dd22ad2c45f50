//! Sample world content and JSON seed loading.
//!
//! The shipped rooms are set dressing for a fresh install; only
//! [`START_ROOM_ID`] is relied on by default configuration.

use std::fs;
use std::path::Path;

use log::info;

use crate::mud::errors::MudError;
use crate::mud::storage::MudStore;
use crate::mud::types::{
    CreatureTemplate, Disposition, Item, ItemSlot, RoomRecord, WeaponKind, WeaponStats,
};

/// Safe landing room where new and defeated characters appear.
pub const START_ROOM_ID: &str = "town_square";

pub fn canonical_rooms() -> Vec<RoomRecord> {
    vec![
        RoomRecord::new(START_ROOM_ID, "Town Square").safe(),
        RoomRecord::new("warriors_guild", "Warriors' Guild").safe(),
        RoomRecord::new("old_road", "The Old Road")
            .with_spawn("field_rat", 2)
            .with_spawn("stray_dog", 1),
        RoomRecord::new("darkwood", "Darkwood Edge")
            .with_spawn("grey_wolf", 2)
            .with_item_capacity(10),
        RoomRecord::new("goblin_den", "Goblin Den")
            .with_spawn("goblin_scout", 2)
            .with_spawn("goblin_chief", 1)
            .with_item_capacity(6),
    ]
}

pub fn canonical_creatures() -> Vec<CreatureTemplate> {
    vec![
        CreatureTemplate::new("field_rat", "a field rat", 1, 6, WeaponStats::new(1, 2, WeaponKind::Claw))
            .passive()
            .with_experience(10)
            .with_cooldown(3, 5)
            .with_flee_threshold(30),
        CreatureTemplate::new("stray_dog", "a stray dog", 2, 14, WeaponStats::new(1, 4, WeaponKind::Claw))
            .with_experience(25)
            .with_cooldown(3, 6),
        CreatureTemplate::new("grey_wolf", "a grey wolf", 4, 30, WeaponStats::new(2, 6, WeaponKind::Claw))
            .hostile()
            .with_armor(1, 10)
            .with_experience(80)
            .with_cooldown(2, 5)
            .with_flee_threshold(15),
        CreatureTemplate::new(
            "goblin_scout",
            "a goblin scout",
            5,
            40,
            WeaponStats::new(2, 7, WeaponKind::Blade).with_to_hit(-5),
        )
        .hostile()
        .with_disposition(Disposition::Evil)
        .with_armor(2, 5)
        .with_experience(150)
        .with_cooldown(3, 6)
        .with_loot(Item::weapon(
            "rusty_shortsword",
            "a rusty shortsword",
            WeaponStats::new(2, 6, WeaponKind::Blade),
        )),
        CreatureTemplate::new(
            "goblin_chief",
            "the goblin chief",
            8,
            90,
            WeaponStats::new(4, 12, WeaponKind::Blunt).with_to_hit(-10),
        )
        .hostile()
        .with_disposition(Disposition::Evil)
        .with_armor(4, 10)
        .with_experience(600)
        .with_cooldown(4, 7)
        .with_loot(Item::wearable("chief_torc", "a bone torc", ItemSlot::Necklace, 1, 5))
        .with_loot(Item::carried("goblin_coins", "a pouch of goblin coins")),
    ]
}

/// Load creature templates from a JSON array file.
pub fn load_creatures_from_json<P: AsRef<Path>>(path: P) -> Result<Vec<CreatureTemplate>, MudError> {
    let contents = fs::read_to_string(path.as_ref())?;
    let templates: Vec<CreatureTemplate> = serde_json::from_str(&contents)?;
    Ok(templates)
}

/// Import templates from `path` into `store`, replacing any with the same id.
pub fn import_creatures<P: AsRef<Path>>(store: &MudStore, path: P) -> Result<usize, MudError> {
    let templates = load_creatures_from_json(&path)?;
    let count = templates.len();
    for template in templates {
        store.put_creature_template(template)?;
    }
    info!("Imported {} creature template(s) from {}", count, path.as_ref().display());
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_spawn_references_a_template() {
        let creatures = canonical_creatures();
        for room in canonical_rooms() {
            for spawn in &room.spawns {
                assert!(
                    creatures.iter().any(|c| c.id == spawn.template_id),
                    "{} spawns unknown {}",
                    room.id,
                    spawn.template_id
                );
            }
        }
    }

    #[test]
    fn start_room_is_safe() {
        let rooms = canonical_rooms();
        let start = rooms.iter().find(|r| r.id == START_ROOM_ID).expect("start room");
        assert!(start.safe);
    }

    #[test]
    fn json_templates_use_field_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("creatures.json");
        std::fs::write(
            &path,
            r#"[{"id":"bat","name":"a bat","level":1,"max_hp":4,
                "natural_attack":{"min_damage":1,"max_damage":1,"kind":"claw"},
                "experience":5,"cooldown_secs":[2,3]}]"#,
        )
        .expect("write");
        let templates = load_creatures_from_json(&path).expect("parse");
        assert_eq!(templates.len(), 1);
        assert!(templates[0].attacks_back);
        assert!(!templates[0].hostile);
        assert_eq!(templates[0].natural_attack.to_hit, 0);
    }
}
