use super::config::BonusConfig;
use super::temper::{weapon_temper_bonus, Weapon};

/// Skills from one-handed through enchanting. Anything outside this range has no damage scaling.
const FIRST_SKILL: u32 = 6;
const LAST_SKILL_OFFSET: u32 = 17;

const MAX_SKILL: f32 = 100.0;

/// Added to a rounded result when rounding would otherwise hide the temper bonus
pub const COLLISION_NUDGE: f32 = 0.55;

/// Game settings the damage formula reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameSetting {
    DamageWeaponMult,
    DamagePcSkillMin,
    DamagePcSkillMax,
    DamageSkillMin,
    DamageSkillMax,
}

impl GameSetting {
    pub const ALL: [Self; 5] = [
        Self::DamageWeaponMult,
        Self::DamagePcSkillMin,
        Self::DamagePcSkillMax,
        Self::DamageSkillMin,
        Self::DamageSkillMax,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::DamageWeaponMult => "fDamageWeaponMult",
            Self::DamagePcSkillMin => "fDamagePCSkillMin",
            Self::DamagePcSkillMax => "fDamagePCSkillMax",
            Self::DamageSkillMin => "fDamageSkillMin",
            Self::DamageSkillMax => "fDamageSkillMax",
        }
    }
}

/// Game state the damage formula calls back into, bound to the attacking actor
pub trait DamageHost {
    fn is_player(&self) -> bool;
    /// The actor's value for `skill`, clamped the way the game clamps it
    fn clamped_skill(&self, skill: u32) -> f32;
    /// Flat melee damage attribute. Only meaningful for melee weapons.
    fn melee_damage(&self) -> f32;
    /// Damage of the ammo the player currently has equipped
    fn equipped_ammo_damage(&self) -> Option<f32>;
    fn game_setting(&self, setting: GameSetting) -> f32;
    fn seconds_since_last_frame(&self) -> f32;
    /// Whether a kill cam or VATS-style targeting mode is active
    fn in_targeting_mode(&self) -> bool;
    /// The game's own per-tier temper bonus
    fn base_temper_bonus(&self, temper_tier: f32) -> f32;
}

/// Arguments the game passes to its damage routine besides the actor and weapon
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DamageRequest {
    /// Damage of the ammo the game passed in, if any
    pub ammo_damage: Option<f32>,
    pub temper_tier: f32,
    pub skill_multiplier: f32,
    /// Look up the player's equipped ammo when no ammo was passed
    pub use_equipped_ammo: bool,
}

/// Replacement for the game's weapon damage routine.
///
/// `host` is `None` when the game called without an actor. `original` runs the game's own routine
/// with the original arguments and is used for every input the formula doesn't cover.
pub fn weapon_damage<H: DamageHost>(
    config: &BonusConfig,
    host: Option<&H>,
    weapon: Option<&Weapon>,
    request: &DamageRequest,
    original: impl FnOnce() -> f32,
) -> f32 {
    let (Some(host), Some(weapon)) = (host, weapon) else {
        return original();
    };
    if !weapon.weapon_type.is_tempered() {
        return original();
    }

    let is_player = host.is_player();
    let ammo_damage = match request.ammo_damage {
        Some(damage) => damage,
        None if request.use_equipped_ammo && is_player => {
            host.equipped_ammo_damage().unwrap_or(0.0)
        }
        None => 0.0,
    };
    let damage =
        (ammo_damage + weapon.attack_damage) * host.game_setting(GameSetting::DamageWeaponMult);

    let temper = weapon_temper_bonus(config, weapon, request.temper_tier, |tier| {
        host.base_temper_bonus(tier)
    });

    let melee = if weapon.weapon_type.is_melee() {
        host.melee_damage()
    } else {
        0.0
    };

    let scale = skill_scale(host, weapon.skill, is_player) * request.skill_multiplier;

    let time = if weapon.weapon_type.scales_with_frame_time() && host.in_targeting_mode() {
        host.seconds_since_last_frame()
    } else {
        1.0
    };

    let result = ((damage + temper) * scale + melee) * time;
    let untempered = (damage * scale + melee) * time;
    avoid_rounding_collision(result, untempered, temper)
}

fn skill_scale<H: DamageHost>(host: &H, skill: u32, is_player: bool) -> f32 {
    if skill.wrapping_sub(FIRST_SKILL) > LAST_SKILL_OFFSET {
        return 1.0;
    }

    let skill_value = host.clamped_skill(skill);
    let (min, max) = if is_player {
        (GameSetting::DamagePcSkillMin, GameSetting::DamagePcSkillMax)
    } else {
        (GameSetting::DamageSkillMin, GameSetting::DamageSkillMax)
    };
    let min = host.game_setting(min);
    let max = host.game_setting(max);
    (max - min) * skill_value / MAX_SKILL + min
}

/// Other code in the game compares rounded damage against the untempered value to decide whether an
/// item shows as improved. When rounding swallows the bonus, push the result past the next rounding
/// boundary so the two still differ.
fn avoid_rounding_collision(result: f32, untempered: f32, temper: f32) -> f32 {
    if temper != 0.0 && result.round() == untempered.round() {
        result.round() + COLLISION_NUDGE
    } else {
        result
    }
}
