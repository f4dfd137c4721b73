//! Entry points the game's patched calls land in

use std::ffi::c_void;
use std::sync::OnceLock;

use anyhow::{anyhow, Context, Result};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;

use super::address::{self, LogicalOperation, RuntimeVersion};
use super::armor::armor_bonus;
use super::config::{BonusConfig, CONFIG_PATH};
use super::game::{self, Combatant, Game};
use super::install::{install_all, Patch};
use super::patch::{OriginalRoutine, ProcessCode};
use super::preview::refresh_preview;
use super::versiondb::{self, VersionDb};
use super::weapon::{weapon_damage, DamageRequest};

type ArmorBonusFn = unsafe extern "C" fn(f32, *mut c_void) -> f32;
type WeaponDamageFn =
    unsafe extern "C" fn(*mut c_void, *mut c_void, *mut c_void, f32, f32, u8) -> f32;
type PreviewRefreshFn = unsafe extern "C" fn(*mut c_void);

static CONFIG: OnceLock<BonusConfig> = OnceLock::new();
static GAME: OnceLock<Game> = OnceLock::new();

static ARMOR_BONUS: OriginalRoutine = OriginalRoutine::new();
static WEAPON_DAMAGE: OriginalRoutine = OriginalRoutine::new();
static PREVIEW_REFRESH: OriginalRoutine = OriginalRoutine::new();

unsafe extern "C" fn armor_bonus_hook(temper_tier: f32, armor: *mut c_void) -> f32 {
    let original = || match ARMOR_BONUS.get::<ArmorBonusFn>() {
        Some(f) => f(temper_tier, armor),
        None => 0.0,
    };
    let Some(config) = CONFIG.get() else {
        return original();
    };

    armor_bonus(config, temper_tier, game::armor(armor).as_ref(), original)
}

unsafe extern "C" fn weapon_damage_hook(
    owner: *mut c_void,
    weapon: *mut c_void,
    ammo: *mut c_void,
    temper_tier: f32,
    skill_multiplier: f32,
    use_equipped_ammo: u8,
) -> f32 {
    let original = || match WEAPON_DAMAGE.get::<WeaponDamageFn>() {
        Some(f) => f(owner, weapon, ammo, temper_tier, skill_multiplier, use_equipped_ammo),
        None => 0.0,
    };
    let (Some(config), Some(game)) = (CONFIG.get(), GAME.get()) else {
        return original();
    };

    let request = DamageRequest {
        ammo_damage: game::ammo_damage(ammo),
        temper_tier,
        skill_multiplier,
        use_equipped_ammo: use_equipped_ammo != 0,
    };
    weapon_damage(
        config,
        Combatant::new(game, owner).as_ref(),
        game::weapon(weapon).as_ref(),
        &request,
        original,
    )
}

unsafe extern "C" fn preview_refresh_hook(list: *mut c_void) {
    if let Some(f) = PREVIEW_REFRESH.get::<PreviewRefreshFn>() {
        f(list);
    }
    let (Some(config), Some(game)) = (CONFIG.get(), GAME.get()) else {
        return;
    };
    let Some(mut preview) = game.preview_list(list) else {
        return;
    };

    if let Err(e) = refresh_preview(config, &mut preview) {
        log::warn!("Could not update the smithing preview: {:#}", e);
    }
}

/// Loads settings and redirects the game's bonus calculations. Runs once, after game data has
/// loaded.
pub fn load(runtime: RuntimeVersion) -> Result<()> {
    let variant = runtime.variant()?;
    log::info!("Game version {} ({:?})", runtime, variant);
    address::validate(variant)?;

    CONFIG
        .set(BonusConfig::load_or_default(CONFIG_PATH))
        .map_err(|_| anyhow!("Already loaded"))?;

    let db_path = versiondb::file_name(runtime)?;
    let db = VersionDb::load(&db_path)?;
    if !db.matches(runtime) {
        log::warn!(
            "{} is for version {:?}, not {}",
            db_path.display(),
            db.version(),
            runtime
        );
    }
    log::info!("Loaded {} addresses from {}", db.len(), db_path.display());

    let module_base = unsafe { GetModuleHandleW(None) }
        .context("Could not find the game executable")?
        .0 as usize;

    let game = unsafe { Game::new(variant, &db, module_base) }?;
    GAME.set(game).map_err(|_| anyhow!("Already loaded"))?;

    let patches = [
        Patch {
            operation: LogicalOperation::ArmorBonus,
            replacement: armor_bonus_hook as usize,
            original: &ARMOR_BONUS,
        },
        Patch {
            operation: LogicalOperation::WeaponDamage,
            replacement: weapon_damage_hook as usize,
            original: &WEAPON_DAMAGE,
        },
        Patch {
            operation: LogicalOperation::PreviewDamageRefresh,
            replacement: preview_refresh_hook as usize,
            original: &PREVIEW_REFRESH,
        },
    ];
    let mut code = unsafe { ProcessCode::new(module_base) }?;
    let hooks = install_all(&mut code, variant, &db, module_base, &patches)?;
    log::info!("Redirected {} call sites", hooks.len());

    Ok(())
}
