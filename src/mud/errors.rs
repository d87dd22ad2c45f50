use std::time::Duration;

use thiserror::Error;

/// Errors that can arise while interacting with the world store or loading content.
#[derive(Debug, Error)]
pub enum MudError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Wrapper around JSON seed parsing errors.
    #[error("seed parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wrapper around IO errors (directory creation, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Returned when fetching a record that is not present.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Returned when deserializing a record with an unexpected schema version.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },

    /// A room referenced by a record or command does not exist in the live world.
    #[error("unknown room: {0}")]
    UnknownRoom(String),

    /// Internal error (unexpected conditions)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Recoverable reasons an attack attempt was refused.
///
/// None of these change world state. The `Display` text is what the acting
/// player sees.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CombatRefusal {
    #[error("You are not standing anywhere.")]
    AttackerNotPresent,

    #[error("You can't fight while you're dead.")]
    AttackerDead,

    #[error("No fighting is allowed here.")]
    SafeRoom,

    #[error("Attack whom?")]
    NoTarget,

    #[error("You don't see {0} here.")]
    TargetNotPresent(String),

    #[error("{0} is already dead.")]
    TargetDead(String),

    #[error("Your target is no longer here.")]
    TargetGone,

    #[error("You can't attack yourself.")]
    SelfTarget,

    #[error("Please wait {} more second(s).", remaining.as_secs().max(1))]
    Cooldown { remaining: Duration },

    #[error("You are not in the game.")]
    UnknownPlayer,
}

impl CombatRefusal {
    /// True when the refusal came from the cooldown gate rather than bad input.
    pub fn is_cooldown(&self) -> bool {
        matches!(self, CombatRefusal::Cooldown { .. })
    }
}
