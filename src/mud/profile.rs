//! Catalog of attack profiles.
//!
//! A profile is the bundle of modifiers one swing is resolved with. Names are
//! matched case-insensitively; anything unknown resolves to the plain `attack`.
//!
//! `to_hit` is added to the hit threshold the d100 roll has to meet, so a negative
//! value makes the strike land more often.

use crate::mud::types::WeaponKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttackProfile {
    pub name: &'static str,
    pub damage_percent: i32,
    pub to_hit: i32,
    /// Becomes the attacker's stance dodge until its next swing.
    pub dodge: i32,
    /// Extra damage percent when the wielded weapon is of the given kind.
    pub weapon_adjustments: &'static [(WeaponKind, i32)],
    /// The attacker is left open after every use.
    pub always_vulnerable: bool,
    /// The attacker is left open only when the swing misses.
    pub vulnerable_on_miss: bool,
}

impl AttackProfile {
    const fn plain(name: &'static str, damage_percent: i32, to_hit: i32, dodge: i32) -> Self {
        Self {
            name,
            damage_percent,
            to_hit,
            dodge,
            weapon_adjustments: &[],
            always_vulnerable: false,
            vulnerable_on_miss: false,
        }
    }

    pub fn weapon_adjustment(&self, kind: WeaponKind) -> i32 {
        self.weapon_adjustments
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, bonus)| *bonus)
            .sum()
    }

    pub fn is_backstab(&self) -> bool {
        self.name == "backstab"
    }

    /// The DM-only profile that skips the miss and fumble checks.
    pub fn is_slay(&self) -> bool {
        self.name == "slay"
    }
}

pub const ATTACK: AttackProfile = AttackProfile::plain("attack", 0, 0, 0);

pub const SPELL: AttackProfile = AttackProfile::plain("spell", 0, 0, 0);

pub const SLAY: AttackProfile = AttackProfile::plain("slay", 99_999, -99_999, 0);

pub const PROFILES: &[AttackProfile] = &[
    ATTACK,
    AttackProfile {
        vulnerable_on_miss: true,
        ..AttackProfile::plain("backstab", 100, -10, 0)
    },
    AttackProfile::plain("block", -50, 10, 20),
    AttackProfile::plain("circle", 20, 5, 5),
    AttackProfile {
        vulnerable_on_miss: true,
        ..AttackProfile::plain("feint", -30, -20, 10)
    },
    AttackProfile::plain("hit", 0, -5, -5),
    AttackProfile {
        always_vulnerable: true,
        ..AttackProfile::plain("kill", 25, 10, -10)
    },
    AttackProfile {
        always_vulnerable: true,
        weapon_adjustments: &[(WeaponKind::Blade, 10)],
        ..AttackProfile::plain("lunge", 30, 5, -15)
    },
    AttackProfile::plain("parry", -40, 5, 25),
    SLAY,
    AttackProfile {
        weapon_adjustments: &[(WeaponKind::Blunt, 10)],
        ..AttackProfile::plain("strike", 10, 0, 0)
    },
    AttackProfile {
        weapon_adjustments: &[(WeaponKind::Pierce, 15), (WeaponKind::Blade, 5)],
        ..AttackProfile::plain("thrust", 15, 0, -5)
    },
    SPELL,
];

/// Look up a profile by name, falling back to `attack`.
pub fn lookup(name: &str) -> &'static AttackProfile {
    let wanted = name.trim();
    PROFILES
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(wanted))
        .unwrap_or(&PROFILES[0])
}

/// True when `verb` names a catalogued profile (used by the command shell).
pub fn is_profile_verb(verb: &str) -> bool {
    PROFILES.iter().any(|p| p.name.eq_ignore_ascii_case(verb))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_names_fall_back_to_attack() {
        assert_eq!(lookup("wiggle").name, "attack");
        assert_eq!(lookup("").name, "attack");
        assert_eq!(lookup("LUNGE").name, "lunge");
        assert_eq!(lookup(" parry ").name, "parry");
    }

    #[test]
    fn catalog_has_every_verb_once() {
        let names = [
            "attack", "backstab", "block", "circle", "feint", "hit", "kill", "lunge", "parry",
            "slay", "strike", "thrust", "spell",
        ];
        assert_eq!(PROFILES.len(), names.len());
        for name in names {
            assert_eq!(PROFILES.iter().filter(|p| p.name == name).count(), 1, "{}", name);
        }
    }

    #[test]
    fn weapon_adjustments_only_match_their_kind() {
        let thrust = lookup("thrust");
        assert_eq!(thrust.weapon_adjustment(WeaponKind::Pierce), 15);
        assert_eq!(thrust.weapon_adjustment(WeaponKind::Blade), 5);
        assert_eq!(thrust.weapon_adjustment(WeaponKind::Blunt), 0);
        assert!(lookup("slay").is_slay());
        assert!(lookup("backstab").is_backstab());
    }
}
