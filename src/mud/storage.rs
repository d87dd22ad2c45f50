use std::path::{Path, PathBuf};

use sled::IVec;

use crate::mud::errors::MudError;
use crate::mud::seed::{canonical_creatures, canonical_rooms};
use crate::mud::types::{
    CharacterRecord, CreatureTemplate, RoomRecord, CHARACTER_SCHEMA_VERSION,
    CREATURE_SCHEMA_VERSION, ROOM_SCHEMA_VERSION,
};

const TREE_PRIMARY: &str = "mudcore";
const TREE_TEMPLATES: &str = "mudcore_templates";

/// What the combat core needs from persistence: durable save and load of a
/// character's attributes.
pub trait Persistence: Send + Sync {
    fn save_character(&self, record: &CharacterRecord) -> Result<(), MudError>;

    fn load_character(&self, name: &str) -> Result<CharacterRecord, MudError>;
}

/// Helper builder so tests can easily create throwaway stores with custom paths.
pub struct MudStoreBuilder {
    path: PathBuf,
    ensure_world_seed: bool,
}

impl MudStoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ensure_world_seed: true,
        }
    }

    /// Opt out of seeding the canonical world during initialization (useful for targeted tests).
    pub fn without_world_seed(mut self) -> Self {
        self.ensure_world_seed = false;
        self
    }

    pub fn open(self) -> Result<MudStore, MudError> {
        MudStore::open_with_options(self.path, self.ensure_world_seed)
    }
}

/// Sled-backed persistence for characters, rooms and creature templates.
pub struct MudStore {
    _db: sled::Db,
    primary: sled::Tree,
    templates: sled::Tree,
}

impl MudStore {
    /// Open (or create) the store rooted at `path`, seeding the sample world if it has no rooms.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, MudError> {
        Self::open_with_options(path, true)
    }

    fn open_with_options<P: AsRef<Path>>(path: P, seed_world: bool) -> Result<Self, MudError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        let primary = db.open_tree(TREE_PRIMARY)?;
        let templates = db.open_tree(TREE_TEMPLATES)?;
        let store = Self {
            _db: db,
            primary,
            templates,
        };

        if seed_world {
            store.seed_world_if_needed()?;
        }

        Ok(store)
    }

    fn character_key(name: &str) -> Vec<u8> {
        format!("characters:{}", name.to_ascii_lowercase()).into_bytes()
    }

    fn room_key(room_id: &str) -> Vec<u8> {
        format!("rooms:{}", room_id).into_bytes()
    }

    fn template_key(template_id: &str) -> Vec<u8> {
        format!("creatures:{}", template_id).into_bytes()
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, MudError> {
        Ok(bincode::serialize(value)?)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(bytes: IVec) -> Result<T, MudError> {
        Ok(bincode::deserialize::<T>(&bytes)?)
    }

    /// Insert or update a character record.
    pub fn put_character(&self, mut record: CharacterRecord) -> Result<(), MudError> {
        record.schema_version = CHARACTER_SCHEMA_VERSION;
        record.touch();
        let bytes = Self::serialize(&record)?;
        self.primary.insert(Self::character_key(&record.name), bytes)?;
        self.primary.flush()?;
        Ok(())
    }

    /// Fetch a character record by name.
    pub fn get_character(&self, name: &str) -> Result<CharacterRecord, MudError> {
        let Some(bytes) = self.primary.get(Self::character_key(name))? else {
            return Err(MudError::NotFound(format!("character: {}", name)));
        };
        let record: CharacterRecord = Self::deserialize(bytes)?;
        if record.schema_version != CHARACTER_SCHEMA_VERSION {
            return Err(MudError::SchemaMismatch {
                entity: "character",
                expected: CHARACTER_SCHEMA_VERSION,
                found: record.schema_version,
            });
        }
        Ok(record)
    }

    pub fn character_exists(&self, name: &str) -> Result<bool, MudError> {
        Ok(self.primary.contains_key(Self::character_key(name))?)
    }

    /// List all character names currently stored.
    pub fn list_character_names(&self) -> Result<Vec<String>, MudError> {
        let mut names = Vec::new();
        for entry in self.primary.scan_prefix(b"characters:") {
            let (key, _) = entry?;
            let text = String::from_utf8_lossy(&key);
            if let Some(name) = text.strip_prefix("characters:") {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    /// Insert or update a room record.
    pub fn put_room(&self, mut room: RoomRecord) -> Result<(), MudError> {
        room.schema_version = ROOM_SCHEMA_VERSION;
        let bytes = Self::serialize(&room)?;
        self.primary.insert(Self::room_key(&room.id), bytes)?;
        self.primary.flush()?;
        Ok(())
    }

    pub fn get_room(&self, room_id: &str) -> Result<RoomRecord, MudError> {
        let Some(bytes) = self.primary.get(Self::room_key(room_id))? else {
            return Err(MudError::NotFound(format!("room: {}", room_id)));
        };
        let record: RoomRecord = Self::deserialize(bytes)?;
        if record.schema_version != ROOM_SCHEMA_VERSION {
            return Err(MudError::SchemaMismatch {
                entity: "room",
                expected: ROOM_SCHEMA_VERSION,
                found: record.schema_version,
            });
        }
        Ok(record)
    }

    pub fn list_rooms(&self) -> Result<Vec<RoomRecord>, MudError> {
        let mut rooms = Vec::new();
        for entry in self.primary.scan_prefix(b"rooms:") {
            let (_, bytes) = entry?;
            rooms.push(Self::deserialize::<RoomRecord>(bytes)?);
        }
        Ok(rooms)
    }

    pub fn put_creature_template(&self, mut template: CreatureTemplate) -> Result<(), MudError> {
        template.schema_version = CREATURE_SCHEMA_VERSION;
        let bytes = Self::serialize(&template)?;
        self.templates.insert(Self::template_key(&template.id), bytes)?;
        self.templates.flush()?;
        Ok(())
    }

    pub fn get_creature_template(&self, template_id: &str) -> Result<CreatureTemplate, MudError> {
        let Some(bytes) = self.templates.get(Self::template_key(template_id))? else {
            return Err(MudError::NotFound(format!("creature: {}", template_id)));
        };
        let template: CreatureTemplate = Self::deserialize(bytes)?;
        if template.schema_version != CREATURE_SCHEMA_VERSION {
            return Err(MudError::SchemaMismatch {
                entity: "creature",
                expected: CREATURE_SCHEMA_VERSION,
                found: template.schema_version,
            });
        }
        Ok(template)
    }

    pub fn list_creature_templates(&self) -> Result<Vec<CreatureTemplate>, MudError> {
        let mut templates = Vec::new();
        for entry in self.templates.scan_prefix(b"creatures:") {
            let (_, bytes) = entry?;
            templates.push(Self::deserialize::<CreatureTemplate>(bytes)?);
        }
        Ok(templates)
    }

    /// Install the sample rooms and creatures when the store has no rooms yet.
    pub fn seed_world_if_needed(&self) -> Result<usize, MudError> {
        if self.primary.scan_prefix(b"rooms:").next().is_some() {
            return Ok(0);
        }
        for template in canonical_creatures() {
            self.put_creature_template(template)?;
        }
        let mut inserted = 0usize;
        for room in canonical_rooms() {
            self.put_room(room)?;
            inserted += 1;
        }
        Ok(inserted)
    }
}

impl Persistence for MudStore {
    fn save_character(&self, record: &CharacterRecord) -> Result<(), MudError> {
        self.put_character(record.clone())
    }

    fn load_character(&self, name: &str) -> Result<CharacterRecord, MudError> {
        self.get_character(name)
    }
}
