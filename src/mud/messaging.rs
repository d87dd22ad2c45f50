//! Message delivery seam.
//!
//! The core only ever addresses characters by name. Delivery is fire-and-forget:
//! a recipient without a live session is silently skipped.

use std::sync::{Mutex, PoisonError};

use crate::mud::room::Room;
use crate::mud::stats::Combatant;

pub trait Messenger: Send + Sync {
    fn send_to_one(&self, character: &str, text: &str);

    fn send_to_all(&self, text: &str);

    /// Deliver to every character in `room`, optionally skipping one name.
    fn send_to_room(&self, room: &Room, text: &str, excluding: Option<&str>) {
        for character in room.characters() {
            let Some(key) = character.character_key() else {
                continue;
            };
            if excluding.map_or(false, |skip| skip.eq_ignore_ascii_case(key)) {
                continue;
            }
            self.send_to_one(key, text);
        }
    }
}

/// Send to `combatant` if it is a character; creatures have nobody to read it.
pub fn notify(messenger: &dyn Messenger, combatant: &Combatant, text: &str) {
    if let Some(key) = combatant.character_key() {
        messenger.send_to_one(key, text);
    }
}

/// A delivered message, as captured by [`MessageLog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// `None` for world-wide broadcasts.
    pub recipient: Option<String>,
    pub text: String,
}

/// Messenger that records every delivery. Used headless and in tests.
#[derive(Debug, Default)]
pub struct MessageLog {
    deliveries: Mutex<Vec<Delivery>>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Texts delivered to `character`, in order.
    pub fn received_by(&self, character: &str) -> Vec<String> {
        self.deliveries()
            .into_iter()
            .filter(|d| {
                d.recipient
                    .as_deref()
                    .map_or(false, |r| r.eq_ignore_ascii_case(character))
            })
            .map(|d| d.text)
            .collect()
    }

    /// How many deliveries contained `needle`.
    pub fn count_containing(&self, needle: &str) -> usize {
        self.deliveries()
            .iter()
            .filter(|d| d.text.contains(needle))
            .count()
    }

    pub fn clear(&self) {
        self.deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Messenger for MessageLog {
    fn send_to_one(&self, character: &str, text: &str) {
        self.deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Delivery {
                recipient: Some(character.to_ascii_lowercase()),
                text: text.to_string(),
            });
    }

    fn send_to_all(&self, text: &str) {
        self.deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Delivery {
                recipient: None,
                text: text.to_string(),
            });
    }
}
