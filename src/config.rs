use std::path::Path;

use anyhow::{anyhow, Result};
use configparser::ini::Ini;

pub const CONFIG_PATH: &str = r"Data\SKSE\Plugins\SensibleTempering.ini";

const GENERAL: &str = "General";
const VANILLA_PLUS: &str = "VanillaPlusMode";
const PERCENT: &str = "PercentMode";

/// Which bonus scheme the temper formulas use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperMode {
    /// Continuous bonus proportional to the item's base rating
    Percent,
    /// The game's own per-tier bonus scaled by a per-category multiplier
    VanillaPlus,
    /// Whichever of the two schemes is larger
    Fallback,
}

/// User settings for the temper formulas. Loaded once when game data finishes loading.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BonusConfig {
    pub vanilla_plus_mode: bool,
    pub vanilla_plus_fallback: bool,

    pub heavy_armor_bonus: f32,
    pub heavy_armor_chest_bonus: f32,
    pub light_armor_bonus: f32,
    pub light_armor_chest_bonus: f32,
    pub one_handed_bonus: f32,
    pub two_handed_bonus: f32,
    pub bow_bonus: f32,
    pub crossbow_bonus: f32,

    pub percent_per_tier_armor: f32,
    pub percent_per_tier_weapon: f32,
}

impl BonusConfig {
    pub fn mode(&self) -> TemperMode {
        if self.vanilla_plus_fallback {
            TemperMode::Fallback
        } else if self.vanilla_plus_mode {
            TemperMode::VanillaPlus
        } else {
            TemperMode::Percent
        }
    }

    /// Reads the config file at `path`. Keys that are missing keep their default value.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut ini = Ini::new();
        ini.load(path.as_ref())
            .map_err(|e| anyhow!("Could not read {}: {}", path.as_ref().display(), e))?;
        Ok(Self::from_ini(&ini))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut ini = Ini::new();
        ini.read(String::from(text))
            .map_err(|e| anyhow!("Could not parse config: {}", e))?;
        Ok(Self::from_ini(&ini))
    }

    /// Loads the config, falling back to the defaults if the file can't be read
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        log::info!("Loading config");
        match Self::load(path) {
            Ok(config) => {
                log::info!("Loaded config: {:?}", config);
                config
            }
            Err(e) => {
                log::error!("Failed to load config file, using defaults: {:#}", e);
                Self::default()
            }
        }
    }

    fn from_ini(ini: &Ini) -> Self {
        Self {
            vanilla_plus_mode: get_bool(ini, GENERAL, "vanillaPlusMode"),
            vanilla_plus_fallback: get_bool(ini, PERCENT, "vanillaPlusFallback"),

            heavy_armor_bonus: get_float(ini, VANILLA_PLUS, "heavyArmorBonus"),
            heavy_armor_chest_bonus: get_float(ini, VANILLA_PLUS, "heavyArmorChestBonus"),
            light_armor_bonus: get_float(ini, VANILLA_PLUS, "lightArmorBonus"),
            light_armor_chest_bonus: get_float(ini, VANILLA_PLUS, "lightArmorChestBonus"),
            one_handed_bonus: get_float(ini, VANILLA_PLUS, "oneHandedBonus"),
            two_handed_bonus: get_float(ini, VANILLA_PLUS, "twoHandedBonus"),
            bow_bonus: get_float(ini, VANILLA_PLUS, "bowBonus"),
            crossbow_bonus: get_float(ini, VANILLA_PLUS, "crossbowBonus"),

            percent_per_tier_armor: get_float(ini, PERCENT, "percentPerTierArmor"),
            percent_per_tier_weapon: get_float(ini, PERCENT, "percentPerTierWeapon"),
        }
    }
}

fn get_bool(ini: &Ini, section: &str, key: &str) -> bool {
    match ini.getboolcoerce(section, key) {
        Ok(value) => value.unwrap_or_default(),
        Err(e) => {
            log::warn!("Ignoring [{}] {}: {}", section, key, e);
            false
        }
    }
}

fn get_float(ini: &Ini, section: &str, key: &str) -> f32 {
    match ini.getfloat(section, key) {
        Ok(value) => value.unwrap_or_default() as f32,
        Err(e) => {
            log::warn!("Ignoring [{}] {}: {}", section, key, e);
            0.0
        }
    }
}
