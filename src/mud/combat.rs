//! Rules engine for a single swing.
//!
//! Everything here is a function of the two combatants, the chosen profile and the
//! dice. Nothing touches a room, a store or a session; the game context applies
//! the returned [`Strike`] to world state.
//!
//! Roll order for one swing, which scripted tests depend on:
//!
//! 1. fumble d100 (characters using a weapon only)
//! 2. d4 unconditional-hit floor
//! 3. d100 against the hit threshold (skipped when the floor hit)
//! 4. weapon damage roll
//! 5. d100 critical check
//! 6. d100 double-damage check (skipped when the critical fired or the defender
//!    was vulnerable)
//!
//! `slay` skips steps 1 through 3.

use crate::mud::dice::Roller;
use crate::mud::profile::{AttackProfile, SPELL};
use crate::mud::stats::{Combatant, CombatantKind};
use crate::mud::types::{Alignment, Disposition, WeaponStats};

/// Face of the d4 that lands a hit regardless of every other modifier.
pub const FLOOR_HIT_FACE: i32 = 1;
pub const BASE_HIT_PERCENT: i32 = 50;
pub const CRITICAL_CHANCE: i32 = 2;
pub const DOUBLE_DAMAGE_CHANCE: i32 = 6;
/// Damage reduction per point of armor class, in percent.
pub const ARMOR_REDUCTION_PER_AC: f64 = 0.05;

/// What the attacker is swinging with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackMode {
    Weapon,
    /// A damaging spell; the stats describe its damage range and kind.
    Spell(WeaponStats),
}

impl AttackMode {
    pub fn is_spell(&self) -> bool {
        matches!(self, AttackMode::Spell(_))
    }

    fn stats(&self, attacker: &Combatant) -> WeaponStats {
        match self {
            AttackMode::Weapon => attacker.weapon(),
            AttackMode::Spell(stats) => *stats,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplier {
    Normal,
    Critical,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageRoll {
    pub damage: i32,
    pub multiplier: Multiplier,
    /// The defender's vulnerable flag was spent on this roll.
    pub consumed_vulnerable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strike {
    Fumble,
    Miss,
    Hit(DamageRoll),
}

impl Strike {
    pub fn damage(&self) -> i32 {
        match self {
            Strike::Hit(roll) => roll.damage,
            Strike::Fumble | Strike::Miss => 0,
        }
    }
}

pub fn effective_profile<'a>(profile: &'a AttackProfile, mode: AttackMode) -> &'a AttackProfile {
    if mode.is_spell() {
        &SPELL
    } else {
        profile
    }
}

/// Threshold the d100 has to meet or beat. Not clamped: it may fall below 1 or
/// climb past 100.
pub fn hit_percentage(
    attacker: &Combatant,
    defender: &Combatant,
    profile: &AttackProfile,
    mode: AttackMode,
) -> i32 {
    let profile = effective_profile(profile, mode);
    let mut percent = BASE_HIT_PERCENT;
    percent += 5 * (attacker.level - defender.level);
    if attacker.is_character() {
        percent += 3 * (attacker.attributes.dexterity - 12);
    }
    if attacker.status.hidden {
        percent += 10;
    }
    percent += profile.to_hit;
    percent += match mode {
        AttackMode::Spell(_) => attacker.as_character().map_or(0, |c| c.skills.magic),
        AttackMode::Weapon => attacker.weapon().to_hit,
    };
    percent -= defender.cumulative_dodge();
    percent
}

/// Decide whether a swing connects.
pub fn attack_hits(
    attacker: &Combatant,
    defender: &Combatant,
    profile: &AttackProfile,
    mode: AttackMode,
    dice: &mut dyn Roller,
) -> bool {
    if dice.roll(1, 4) == FLOOR_HIT_FACE {
        return true;
    }
    let threshold = hit_percentage(attacker, defender, profile, mode);
    dice.roll(1, 100) >= threshold
}

/// Percentage of base weapon damage this swing deals. May be negative.
pub fn damage_percent(
    attacker: &Combatant,
    defender: &Combatant,
    profile: &AttackProfile,
    mode: AttackMode,
) -> i32 {
    let profile = effective_profile(profile, mode);
    let weapon = mode.stats(attacker);
    let mut percent = 100;

    if let CombatantKind::Character(me) = &attacker.kind {
        percent += me.skills.weapon(weapon.kind);
        if let CombatantKind::Creature(them) = &defender.kind {
            let righteous = matches!(
                (me.alignment, them.disposition),
                (Alignment::Chaotic, Disposition::Good) | (Alignment::Lawful, Disposition::Evil)
            );
            if righteous {
                percent += 10;
            }
        }
    }

    percent += 10 * (attacker.attributes.strength - 12).div_euclid(3);

    if defender.is_concealed() {
        percent -= 40;
    }

    if profile.is_backstab() && !attacker.status.hidden {
        percent -= profile.damage_percent;
    } else {
        percent += profile.damage_percent;
    }
    percent += profile.weapon_adjustment(weapon.kind);
    percent
}

/// Independent clumsiness check. Creatures, spells and `slay` never fumble.
pub fn fumbled(
    attacker: &Combatant,
    profile: &AttackProfile,
    mode: AttackMode,
    fumble_chance: i32,
    dice: &mut dyn Roller,
) -> bool {
    if !attacker.is_character() || mode.is_spell() || profile.is_slay() {
        return false;
    }
    dice.chance(fumble_chance)
}

/// Scale, armor-reduce and multiply a connected swing.
pub fn resolve_attack_damage(
    attacker: &Combatant,
    defender: &Combatant,
    profile: &AttackProfile,
    mode: AttackMode,
    dice: &mut dyn Roller,
) -> DamageRoll {
    let weapon = mode.stats(attacker);
    let base = dice.roll(weapon.min_damage, weapon.max_damage).max(0);
    let percent = damage_percent(attacker, defender, profile, mode);

    let mut damage = f64::from(base) * (f64::from(percent) / 100.0);
    let armor_factor = 1.0 - ARMOR_REDUCTION_PER_AC * f64::from(defender.armor_class());
    damage = (damage * armor_factor).max(0.0);

    let mut multiplier = Multiplier::Normal;
    let mut consumed_vulnerable = false;
    if dice.chance(CRITICAL_CHANCE) {
        damage = damage.max(1.0) * 3.0;
        multiplier = Multiplier::Critical;
    } else {
        let doubled = if defender.status.vulnerable {
            consumed_vulnerable = true;
            true
        } else {
            dice.chance(DOUBLE_DAMAGE_CHANCE)
        };
        if doubled {
            damage = damage.max(1.0) * 2.0;
            multiplier = Multiplier::Double;
        }
    }

    DamageRoll {
        damage: damage.floor().min(f64::from(i32::MAX)) as i32,
        multiplier,
        consumed_vulnerable,
    }
}

/// Resolve one swing end to end: fumble, miss, or damage.
pub fn strike(
    attacker: &Combatant,
    defender: &Combatant,
    profile: &AttackProfile,
    mode: AttackMode,
    fumble_chance: i32,
    dice: &mut dyn Roller,
) -> Strike {
    let profile = effective_profile(profile, mode);
    if !profile.is_slay() {
        if fumbled(attacker, profile, mode, fumble_chance, dice) {
            return Strike::Fumble;
        }
        if !attack_hits(attacker, defender, profile, mode, dice) {
            return Strike::Miss;
        }
    }
    Strike::Hit(resolve_attack_damage(attacker, defender, profile, mode, dice))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mud::dice::ScriptedRolls;
    use crate::mud::profile::lookup;
    use crate::mud::types::{
        CharacterClass, CharacterRecord, CreatureTemplate, Item, ItemSlot, WeaponKind,
    };
    use std::time::Instant;

    fn character(level: i32) -> Combatant {
        let record = CharacterRecord::new("Ada", CharacterClass::Fighter, "square").with_level(level);
        Combatant::from_record(record, Instant::now())
    }

    fn creature(level: i32) -> Combatant {
        let template = CreatureTemplate::new(
            "rat",
            "a rat",
            level,
            100,
            WeaponStats::new(1, 3, WeaponKind::Claw),
        );
        Combatant::from_template(&template, 1, Instant::now())
    }

    #[test]
    fn hit_percentage_scenario_level_gap() {
        let attacker = character(5);
        let defender = creature(1);
        assert_eq!(
            hit_percentage(&attacker, &defender, lookup("attack"), AttackMode::Weapon),
            70
        );
    }

    #[test]
    fn hit_percentage_sums_every_modifier() {
        let mut attacker = character(3);
        attacker.attributes.dexterity = 15;
        attacker.status.hidden = true;
        attacker.equipment.equip(Item::weapon(
            "spear",
            "a spear",
            WeaponStats::new(1, 6, WeaponKind::Pierce).with_to_hit(4),
        ));
        let mut defender = creature(4);
        defender
            .equipment
            .equip(Item::wearable("hide", "thick hide", ItemSlot::Armor, 0, 7));
        // 50 - 5 + 9 + 10 + 5 (circle) + 4 - 7
        assert_eq!(
            hit_percentage(&attacker, &defender, lookup("circle"), AttackMode::Weapon),
            66
        );
    }

    #[test]
    fn creatures_get_no_dexterity_adjustment() {
        let mut attacker = creature(2);
        attacker.attributes.dexterity = 18;
        let defender = character(2);
        assert_eq!(
            hit_percentage(&attacker, &defender, lookup("attack"), AttackMode::Weapon),
            50
        );
    }

    #[test]
    fn spells_use_magic_skill_and_spell_profile() {
        let mut attacker = character(1);
        if let Some(state) = attacker.as_character_mut() {
            state.skills.magic = 12;
        }
        let defender = creature(1);
        let bolt = AttackMode::Spell(WeaponStats::new(2, 4, WeaponKind::Magic));
        assert_eq!(hit_percentage(&attacker, &defender, lookup("lunge"), bolt), 62);
    }

    #[test]
    fn floor_roll_hits_without_consulting_threshold() {
        let attacker = character(1);
        let mut defender = creature(1);
        defender.level = 500;
        let mut dice = ScriptedRolls::new([FLOOR_HIT_FACE]);
        assert!(attack_hits(&attacker, &defender, lookup("attack"), AttackMode::Weapon, &mut dice));
        assert_eq!(dice.consumed(), 1);
    }

    #[test]
    fn roll_must_meet_threshold() {
        let attacker = character(5);
        let defender = creature(1);
        let profile = lookup("attack");
        let mut dice = ScriptedRolls::new([2, 69]);
        assert!(!attack_hits(&attacker, &defender, profile, AttackMode::Weapon, &mut dice));
        let mut dice = ScriptedRolls::new([2, 70]);
        assert!(attack_hits(&attacker, &defender, profile, AttackMode::Weapon, &mut dice));
    }

    #[test]
    fn damage_percent_alignment_strength_and_concealment() {
        let record = CharacterRecord::new("Ada", CharacterClass::Paladin, "square")
            .with_alignment(Alignment::Lawful);
        let mut attacker = Combatant::from_record(record, Instant::now());
        attacker.attributes.strength = 18;
        if let Some(state) = attacker.as_character_mut() {
            state.skills.weapons.insert(WeaponKind::Unarmed, 7);
        }
        let template = CreatureTemplate::new("imp", "an imp", 1, 10, WeaponStats::BARE_HANDS)
            .with_disposition(Disposition::Evil);
        let mut defender = Combatant::from_template(&template, 9, Instant::now());
        let profile = lookup("attack");
        assert_eq!(damage_percent(&attacker, &defender, profile, AttackMode::Weapon), 137);
        defender.status.invisible = true;
        assert_eq!(damage_percent(&attacker, &defender, profile, AttackMode::Weapon), 97);
    }

    #[test]
    fn weapon_skill_counts_against_other_characters() {
        let mut attacker = character(1);
        if let Some(state) = attacker.as_character_mut() {
            state.skills.weapons.insert(WeaponKind::Unarmed, 20);
        }
        let defender = character(1);
        assert_eq!(damage_percent(&attacker, &defender, lookup("attack"), AttackMode::Weapon), 120);
    }

    #[test]
    fn weak_strength_floors_downward() {
        let mut attacker = creature(1);
        attacker.attributes.strength = 10;
        let defender = character(1);
        assert_eq!(damage_percent(&attacker, &defender, lookup("attack"), AttackMode::Weapon), 90);
    }

    #[test]
    fn seen_backstab_is_penalised() {
        let mut attacker = character(1);
        let defender = creature(1);
        let backstab = lookup("backstab");
        assert_eq!(damage_percent(&attacker, &defender, backstab, AttackMode::Weapon), 0);
        attacker.status.hidden = true;
        assert_eq!(damage_percent(&attacker, &defender, backstab, AttackMode::Weapon), 200);
    }

    #[test]
    fn armor_reduces_linearly_and_never_below_zero() {
        let mut attacker = character(1);
        attacker.equipment.equip(Item::weapon(
            "club",
            "a club",
            WeaponStats::new(20, 20, WeaponKind::Blunt),
        ));
        let mut defender = creature(1);
        defender
            .equipment
            .equip(Item::wearable("plate", "plate", ItemSlot::Armor, 4, 0));
        // crit 100 (no), double 100 (no)
        let mut dice = ScriptedRolls::new([100, 100]);
        let roll = resolve_attack_damage(&attacker, &defender, lookup("attack"), AttackMode::Weapon, &mut dice);
        assert_eq!(roll.damage, 16);
        assert_eq!(roll.multiplier, Multiplier::Normal);

        defender
            .equipment
            .equip(Item::wearable("tower", "a tower shield", ItemSlot::Shield, 30, 0));
        let mut dice = ScriptedRolls::new([100, 100]);
        let roll = resolve_attack_damage(&attacker, &defender, lookup("attack"), AttackMode::Weapon, &mut dice);
        assert_eq!(roll.damage, 0);
    }

    #[test]
    fn critical_triples_and_skips_double_check() {
        let attacker = character(1);
        let defender = creature(1);
        // weapon roll 2, crit roll 1
        let mut dice = ScriptedRolls::new([2, 1]);
        let roll = resolve_attack_damage(&attacker, &defender, lookup("attack"), AttackMode::Weapon, &mut dice);
        assert_eq!(roll.multiplier, Multiplier::Critical);
        assert_eq!(roll.damage, 6);
        assert_eq!(dice.consumed(), 2);
    }

    #[test]
    fn vulnerable_defender_forces_double_without_rolling() {
        let attacker = character(1);
        let mut defender = creature(1);
        defender.status.vulnerable = true;
        let mut dice = ScriptedRolls::new([1, 50]);
        let roll = resolve_attack_damage(&attacker, &defender, lookup("attack"), AttackMode::Weapon, &mut dice);
        assert_eq!(roll.multiplier, Multiplier::Double);
        assert!(roll.consumed_vulnerable);
        assert_eq!(roll.damage, 2);
        assert_eq!(dice.consumed(), 2);
    }

    #[test]
    fn zero_damage_is_bumped_to_one_before_multiplying() {
        let attacker = character(1);
        let mut defender = creature(1);
        defender.status.hidden = true;
        // base 1 at 60% = 0.6, double-damage roll 3
        let mut dice = ScriptedRolls::new([1, 100, 3]);
        let roll = resolve_attack_damage(&attacker, &defender, lookup("attack"), AttackMode::Weapon, &mut dice);
        assert_eq!(roll.multiplier, Multiplier::Double);
        assert_eq!(roll.damage, 2);
    }

    #[test]
    fn negative_percent_clamps_to_zero() {
        let attacker = character(1);
        let defender = creature(1);
        let mut dice = ScriptedRolls::new([2, 100, 100]);
        let roll = resolve_attack_damage(&attacker, &defender, lookup("backstab"), AttackMode::Weapon, &mut dice);
        assert_eq!(roll.damage, 0);
    }

    #[test]
    fn miss_and_fumble_deal_nothing_and_skip_damage_rolls() {
        let attacker = character(5);
        let defender = creature(1);
        let profile = lookup("attack");
        // fumble roll 50 (no), floor 2, hit roll 10 (< 70 miss)
        let mut dice = ScriptedRolls::new([50, 2, 10]);
        let result = strike(&attacker, &defender, profile, AttackMode::Weapon, 2, &mut dice);
        assert_eq!(result, Strike::Miss);
        assert_eq!(result.damage(), 0);
        assert_eq!(dice.consumed(), 3);

        let mut dice = ScriptedRolls::new([1]);
        let result = strike(&attacker, &defender, profile, AttackMode::Weapon, 2, &mut dice);
        assert_eq!(result, Strike::Fumble);
        assert_eq!(dice.consumed(), 1);
    }

    #[test]
    fn slay_skips_checks_and_flattens() {
        let attacker = character(1);
        let mut defender = creature(1);
        defender.level = 99;
        // weapon roll 2, crit 100, double 100
        let mut dice = ScriptedRolls::new([2, 100, 100]);
        let result = strike(&attacker, &defender, lookup("slay"), AttackMode::Weapon, 100, &mut dice);
        match result {
            Strike::Hit(roll) => assert!(roll.damage >= 1000),
            other => panic!("slay should always land, got {:?}", other),
        }
    }

    #[test]
    fn creatures_never_fumble() {
        let attacker = creature(1);
        let mut dice = ScriptedRolls::new([1]);
        assert!(!fumbled(&attacker, lookup("attack"), AttackMode::Weapon, 100, &mut dice));
        assert_eq!(dice.consumed(), 0);
    }
}
