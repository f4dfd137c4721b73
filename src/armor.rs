use super::config::{BonusConfig, TemperMode};
use super::temper::{percent_bonus, Armor, UNTEMPERED};

/// Replacement for the game's armor temper bonus.
///
/// `original` runs the game's own routine with the arguments it was called with. It is used as-is
/// when there is no armor, and as the base value for VanillaPlus mode.
pub fn armor_bonus(
    config: &BonusConfig,
    temper_tier: f32,
    armor: Option<&Armor>,
    original: impl FnOnce() -> f32,
) -> f32 {
    let Some(armor) = armor else {
        return original();
    };

    if temper_tier <= UNTEMPERED {
        return 0.0;
    }

    let percent = || percent_bonus(armor.rating, temper_tier, config.percent_per_tier_armor);
    let vanilla_plus = || vanilla_plus_bonus(config, armor, original());
    match config.mode() {
        TemperMode::Percent => percent(),
        TemperMode::VanillaPlus => vanilla_plus(),
        TemperMode::Fallback => vanilla_plus().max(percent()),
    }
}

fn vanilla_plus_bonus(config: &BonusConfig, armor: &Armor, base: f32) -> f32 {
    match (armor.is_heavy, armor.is_chest) {
        // the chest piece has a much larger base rating than the rest of the set, so it gets half
        // the vanilla bonus times its own multiplier
        (true, true) => base * 0.5 * config.heavy_armor_chest_bonus,
        (false, true) => base * 0.5 * config.light_armor_chest_bonus,
        (true, false) => base * config.heavy_armor_bonus,
        (false, false) => base * config.light_armor_bonus,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARMOR: Armor = Armor {
        rating: 40.0,
        is_heavy: true,
        is_chest: false,
    };

    fn all_modes(base: BonusConfig) -> Vec<BonusConfig> {
        [(false, false), (true, false), (false, true), (true, true)]
            .into_iter()
            .map(|(vanilla_plus_mode, vanilla_plus_fallback)| BonusConfig {
                vanilla_plus_mode,
                vanilla_plus_fallback,
                ..base.clone()
            })
            .collect()
    }

    fn coefficients() -> BonusConfig {
        BonusConfig {
            heavy_armor_bonus: 2.0,
            heavy_armor_chest_bonus: 2.0,
            light_armor_bonus: 3.0,
            light_armor_chest_bonus: 4.0,
            percent_per_tier_armor: 5.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_no_armor_delegates() {
        for config in all_modes(coefficients()) {
            assert_eq!(armor_bonus(&config, 1.4, None, || 12.5), 12.5);
            // even an untempered call with no armor goes to the game
            assert_eq!(armor_bonus(&config, 1.0, None, || -3.0), -3.0);
        }
    }

    #[test]
    fn test_untempered_is_zero() {
        for config in all_modes(coefficients()) {
            for armor in [
                ARMOR,
                Armor { is_chest: true, ..ARMOR },
                Armor { is_heavy: false, ..ARMOR },
            ] {
                assert_eq!(armor_bonus(&config, UNTEMPERED, Some(&armor), || 6.0), 0.0);
            }
        }
    }

    #[test]
    fn test_percent_mode() {
        let config = coefficients();
        // 40 * 0.5 * 5 / 10
        let bonus = armor_bonus(&config, 1.5, Some(&ARMOR), || panic!("not needed"));
        assert!((bonus - 10.0).abs() < 1e-5);
    }

    #[test]
    fn test_vanilla_plus_heavy_chest() {
        let config = BonusConfig {
            vanilla_plus_mode: true,
            ..coefficients()
        };
        let chest = Armor { is_chest: true, ..ARMOR };
        let bonus = armor_bonus(&config, 3.0, Some(&chest), || 4.0);
        assert!((bonus - 4.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_vanilla_plus_categories() {
        let config = BonusConfig {
            vanilla_plus_mode: true,
            ..coefficients()
        };
        let light = Armor { is_heavy: false, ..ARMOR };
        let light_chest = Armor { is_chest: true, ..light };
        assert_eq!(armor_bonus(&config, 1.2, Some(&ARMOR), || 2.0), 4.0);
        assert_eq!(armor_bonus(&config, 1.2, Some(&light), || 2.0), 6.0);
        assert_eq!(armor_bonus(&config, 1.2, Some(&light_chest), || 2.0), 4.0);
    }

    #[test]
    fn test_fallback_is_at_least_both_schemes() {
        let base = BonusConfig {
            vanilla_plus_fallback: true,
            ..coefficients()
        };
        let vanilla_plus = BonusConfig {
            vanilla_plus_fallback: false,
            vanilla_plus_mode: true,
            ..base.clone()
        };
        let percent = BonusConfig {
            vanilla_plus_fallback: false,
            ..base.clone()
        };

        for rating in [0.0, 5.0, 17.0, 40.0, 120.0] {
            for tier in [1.0, 1.1, 1.3, 1.6, 2.0, 3.5] {
                for original in [0.0, 1.0, 4.0, 11.0] {
                    let armor = Armor { rating, ..ARMOR };
                    let blended = armor_bonus(&base, tier, Some(&armor), || original);
                    assert!(blended >= armor_bonus(&vanilla_plus, tier, Some(&armor), || original));
                    assert!(blended >= armor_bonus(&percent, tier, Some(&armor), || original));
                }
            }
        }
    }

    #[test]
    fn test_repeatable() {
        let config = BonusConfig {
            vanilla_plus_fallback: true,
            ..coefficients()
        };
        let first = armor_bonus(&config, 1.7, Some(&ARMOR), || 3.3);
        let second = armor_bonus(&config, 1.7, Some(&ARMOR), || 3.3);
        assert_eq!(first.to_bits(), second.to_bits());
    }
}
