//! Item snapshots and the temper bonus term shared by the armor, weapon and preview formulas

use super::config::{BonusConfig, TemperMode};

/// The tier of an item that hasn't been improved at a grindstone or workbench
pub const UNTEMPERED: f32 = 1.0;

/// Weapon animation types, numbered the way the game numbers them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WeaponType {
    HandToHandMelee = 0,
    OneHandSword = 1,
    OneHandDagger = 2,
    OneHandAxe = 3,
    OneHandMace = 4,
    TwoHandSword = 5,
    TwoHandAxe = 6,
    Bow = 7,
    Staff = 8,
    Crossbow = 9,
}

impl WeaponType {
    pub const fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => Self::HandToHandMelee,
            1 => Self::OneHandSword,
            2 => Self::OneHandDagger,
            3 => Self::OneHandAxe,
            4 => Self::OneHandMace,
            5 => Self::TwoHandSword,
            6 => Self::TwoHandAxe,
            7 => Self::Bow,
            8 => Self::Staff,
            9 => Self::Crossbow,
            _ => return None,
        })
    }

    /// Swords, daggers, axes, maces and greatswords; fists don't count
    pub const fn is_melee(self) -> bool {
        matches!(self as u8, 1..=6)
    }

    /// Whether the game's damage formula covers this type at all
    pub const fn is_tempered(self) -> bool {
        !matches!(self, Self::HandToHandMelee | Self::Staff)
    }

    /// Anything below bows has its damage scaled by frame time during kill cams
    pub const fn scales_with_frame_time(self) -> bool {
        (self as u8) < Self::Bow as u8
    }

    /// The VanillaPlus multiplier for this type
    pub fn vanilla_plus_bonus(self, config: &BonusConfig) -> f32 {
        match self {
            Self::OneHandSword | Self::OneHandDagger | Self::OneHandAxe | Self::OneHandMace => {
                config.one_handed_bonus
            }
            Self::TwoHandSword | Self::TwoHandAxe => config.two_handed_bonus,
            Self::Bow => config.bow_bonus,
            Self::Crossbow => config.crossbow_bonus,
            Self::HandToHandMelee | Self::Staff => 0.0,
        }
    }
}

/// Weapon stats as read from the game's weapon form
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weapon {
    pub attack_damage: f32,
    pub weapon_type: WeaponType,
    /// Actor value id of the skill that governs this weapon
    pub skill: u32,
}

/// Form id of the `ArmorCuirass` keyword in Skyrim.esm
pub const ARMOR_CUIRASS_KEYWORD: u32 = 0x0006_C0EC;

/// Weight class of an armor form, numbered the way the game numbers them
pub const ARMOR_TYPE_LIGHT: u32 = 0;
pub const ARMOR_TYPE_HEAVY: u32 = 1;
pub const ARMOR_TYPE_CLOTHING: u32 = 2;

/// Armor stats as read from the game's armor form
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Armor {
    pub rating: f32,
    /// Heavy armor type. Light armor and clothing both count as light.
    pub is_heavy: bool,
    /// Carries the `ArmorCuirass` keyword, whatever slot it occupies. Cuirasses carry most of a
    /// set's base rating.
    pub is_chest: bool,
}

impl Armor {
    /// Builds the snapshot from the form's raw fields. `rating` is stored in hundredths.
    pub fn from_raw(rating: u32, armor_type: u32, keywords: impl IntoIterator<Item = u32>) -> Self {
        Self {
            rating: rating as f32 / 100.0,
            // clothing has no multiplier of its own and takes the light armor ones
            is_heavy: armor_type == ARMOR_TYPE_HEAVY,
            is_chest: keywords.into_iter().any(|id| id == ARMOR_CUIRASS_KEYWORD),
        }
    }
}

/// `rating * (tier - 1) * percent / 10`
pub fn percent_bonus(rating: f32, temper_tier: f32, percent_per_tier: f32) -> f32 {
    rating * (temper_tier - UNTEMPERED) * percent_per_tier * 0.1
}

/// The temper term added to a weapon's base damage.
///
/// `base_bonus` is the game's own per-tier bonus routine; it is only called when the mode needs it.
pub fn weapon_temper_bonus(
    config: &BonusConfig,
    weapon: &Weapon,
    temper_tier: f32,
    base_bonus: impl FnOnce(f32) -> f32,
) -> f32 {
    if temper_tier <= UNTEMPERED {
        return 0.0;
    }

    let percent =
        || percent_bonus(weapon.attack_damage, temper_tier, config.percent_per_tier_weapon);
    let vanilla_plus = || base_bonus(temper_tier) * weapon.weapon_type.vanilla_plus_bonus(config);
    match config.mode() {
        TemperMode::Percent => percent(),
        TemperMode::VanillaPlus => vanilla_plus(),
        TemperMode::Fallback => vanilla_plus().max(percent()),
    }
}
