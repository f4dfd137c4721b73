use std::ffi::{c_char, c_void, CStr};
use std::io::Cursor;

use anyhow::{anyhow, Context, Result};

use super::address::{resolve_symbol, BuildVariant, HostSymbol};
use super::preview::{PreviewEntry, PreviewList, ENTRY_SIZE};
use super::temper::{Armor, Weapon, WeaponType};
use super::versiondb::VersionDb;
use super::weapon::{DamageHost, GameSetting};

/// Field offsets in game objects. The same in SE and AE.
mod layout {
    // TESForm
    pub const FORM_TYPE: usize = 0x1A;
    pub const FORM_TYPE_ARMOR: u8 = 26;
    pub const FORM_TYPE_WEAPON: u8 = 41;
    pub const FORM_TYPE_AMMO: u8 = 42;

    pub const FORM_ID: usize = 0x14;

    // TESObjectARMO
    pub const ARMOR_TYPE: usize = 0x1C4;
    pub const ARMOR_KEYWORDS: usize = 0x1D8;
    pub const ARMOR_RATING: usize = 0x200;

    // BGSKeywordForm
    pub const KEYWORD_ARRAY: usize = 0x08;
    pub const KEYWORD_COUNT: usize = 0x10;

    // TESObjectWEAP
    pub const WEAPON_ATTACK_DAMAGE: usize = 0xC8;
    pub const WEAPON_SKILL: usize = 0x194;
    pub const WEAPON_TYPE: usize = 0x1A1;

    // TESAmmo
    pub const AMMO_DAMAGE: usize = 0x11C;

    // Actor -> AIProcess -> MiddleHighProcessData -> InventoryEntryData
    pub const ACTOR_PROCESS: usize = 0xF0;
    pub const PROCESS_MIDDLE_HIGH: usize = 0x08;
    pub const MIDDLE_HIGH_AMMO: usize = 0x260;
    pub const ENTRY_OBJECT: usize = 0x00;

    // ActorValueOwner vtable
    pub const GET_IS_PLAYER_OWNER: usize = 8;

    // GameSettingCollection -> BSTScatterTable<const char*, Setting*>
    pub const SETTINGS_MAP: usize = 0x118;
    pub const MAP_CAPACITY: usize = 0x0C;
    pub const MAP_ENTRIES: usize = 0x28;
    pub const MAP_ENTRY_SIZE: usize = 0x18;
    pub const MAP_ENTRY_KEY: usize = 0x00;
    pub const MAP_ENTRY_VALUE: usize = 0x08;
    pub const MAP_ENTRY_NEXT: usize = 0x10;
    pub const SETTING_VALUE: usize = 0x08;

    // VATS
    pub const VATS_MODE: usize = 0x04;

    // BSTArray
    pub const ARRAY_DATA: usize = 0x00;
    pub const ARRAY_SIZE: usize = 0x10;
}

/// Actor value the game passes when asking for the melee damage attribute
const MELEE_DAMAGE_VALUE: u32 = 34;

unsafe fn read<T: Copy>(base: *const c_void, offset: usize) -> T {
    (base as *const u8).add(offset).cast::<T>().read_unaligned()
}

unsafe fn form_type(form: *const c_void) -> u8 {
    read(form, layout::FORM_TYPE)
}

/// Reads the armor stats from a `TESObjectARMO*`
pub unsafe fn armor(form: *const c_void) -> Option<Armor> {
    if form.is_null() || form_type(form) != layout::FORM_TYPE_ARMOR {
        return None;
    }

    Some(Armor::from_raw(
        read(form, layout::ARMOR_RATING),
        read(form, layout::ARMOR_TYPE),
        keyword_ids((form as *const u8).add(layout::ARMOR_KEYWORDS) as *const c_void),
    ))
}

/// Form ids of the keywords on a `BGSKeywordForm`
unsafe fn keyword_ids(keyword_form: *const c_void) -> Vec<u32> {
    let keywords: *const *const c_void = read(keyword_form, layout::KEYWORD_ARRAY);
    let count: u32 = read(keyword_form, layout::KEYWORD_COUNT);
    if keywords.is_null() {
        return Vec::new();
    }

    std::slice::from_raw_parts(keywords, count as usize)
        .iter()
        .filter(|keyword| !keyword.is_null())
        .map(|&keyword| read(keyword, layout::FORM_ID))
        .collect()
}

/// Reads the weapon stats from a `TESObjectWEAP*`
pub unsafe fn weapon(form: *const c_void) -> Option<Weapon> {
    if form.is_null() || form_type(form) != layout::FORM_TYPE_WEAPON {
        return None;
    }

    let attack_damage: u16 = read(form, layout::WEAPON_ATTACK_DAMAGE);
    Some(Weapon {
        attack_damage: attack_damage as f32,
        weapon_type: WeaponType::from_raw(read(form, layout::WEAPON_TYPE))?,
        skill: read(form, layout::WEAPON_SKILL),
    })
}

/// Damage of a `TESAmmo*`
pub unsafe fn ammo_damage(form: *const c_void) -> Option<f32> {
    if form.is_null() || form_type(form) != layout::FORM_TYPE_AMMO {
        return None;
    }

    Some(read(form, layout::AMMO_DAMAGE))
}

/// Game API resolved for the running build
#[derive(Debug)]
pub struct Game {
    temper_damage_bonus: unsafe extern "C" fn(f32) -> f32,
    melee_damage: unsafe extern "C" fn(*mut c_void, u32) -> f32,
    clamped_actor_value: unsafe extern "C" fn(*mut c_void, u32) -> f32,
    settings: [usize; GameSetting::ALL.len()],
    player: usize,
    vats: usize,
    seconds_since_last_frame: usize,
    preview_sort: Option<unsafe extern "C" fn(*mut c_void)>,
    preview_refresh: Option<unsafe extern "C" fn(*mut c_void)>,
}

impl Game {
    /// # Safety
    /// `db` must belong to the running executable, which must be loaded at `module_base`. Game
    /// data must have finished loading so the settings collection is populated.
    pub unsafe fn new(variant: BuildVariant, db: &VersionDb, module_base: usize) -> Result<Self> {
        let required = |symbol: HostSymbol| -> Result<usize> {
            resolve_symbol(symbol, variant, db, module_base)?
                .ok_or_else(|| anyhow!("{:?} is not known for {:?} builds", symbol, variant))
        };
        let optional = |symbol: HostSymbol| -> Result<Option<unsafe extern "C" fn(*mut c_void)>> {
            Ok(resolve_symbol(symbol, variant, db, module_base)?
                .map(|addr| std::mem::transmute::<usize, unsafe extern "C" fn(*mut c_void)>(addr)))
        };

        let collection = *(required(HostSymbol::GameSettings)? as *const *const c_void);
        if collection.is_null() {
            return Err(anyhow!("Game settings have not been created yet"));
        }
        let mut settings = [0usize; GameSetting::ALL.len()];
        for (slot, setting) in settings.iter_mut().zip(GameSetting::ALL) {
            *slot = find_setting(collection, setting.name())
                .with_context(|| format!("Could not find game setting {}", setting.name()))?;
        }

        Ok(Self {
            temper_damage_bonus: std::mem::transmute::<usize, unsafe extern "C" fn(f32) -> f32>(
                required(HostSymbol::TemperDamageBonus)?,
            ),
            melee_damage: std::mem::transmute::<
                usize,
                unsafe extern "C" fn(*mut c_void, u32) -> f32,
            >(required(HostSymbol::MeleeDamage)?),
            clamped_actor_value: std::mem::transmute::<
                usize,
                unsafe extern "C" fn(*mut c_void, u32) -> f32,
            >(required(HostSymbol::ClampedActorValue)?),
            settings,
            player: required(HostSymbol::Player)?,
            vats: required(HostSymbol::Vats)?,
            seconds_since_last_frame: required(HostSymbol::SecondsSinceLastFrame)?,
            preview_sort: optional(HostSymbol::PreviewSort)?,
            preview_refresh: optional(HostSymbol::PreviewRefresh)?,
        })
    }

    pub unsafe fn game_setting(&self, setting: GameSetting) -> f32 {
        read(self.settings[setting as usize] as *const c_void, layout::SETTING_VALUE)
    }

    pub unsafe fn temper_damage_bonus(&self, temper_tier: f32) -> f32 {
        (self.temper_damage_bonus)(temper_tier)
    }

    pub unsafe fn seconds_since_last_frame(&self) -> f32 {
        *(self.seconds_since_last_frame as *const f32)
    }

    pub unsafe fn in_targeting_mode(&self) -> bool {
        let vats = *(self.vats as *const *const c_void);
        !vats.is_null() && read::<u32>(vats, layout::VATS_MODE) != 0
    }

    /// Damage of the ammo the player has equipped
    pub unsafe fn player_ammo_damage(&self) -> Option<f32> {
        let player = *(self.player as *const *const c_void);
        if player.is_null() {
            return None;
        }
        let process: *const c_void = read(player, layout::ACTOR_PROCESS);
        if process.is_null() {
            return None;
        }
        let middle_high: *const c_void = read(process, layout::PROCESS_MIDDLE_HIGH);
        if middle_high.is_null() {
            return None;
        }
        let entry: *const c_void = read(middle_high, layout::MIDDLE_HIGH_AMMO);
        if entry.is_null() {
            return None;
        }
        ammo_damage(read(entry, layout::ENTRY_OBJECT))
    }

    /// The crafting preview list at `list`, if this build knows how to sort and refresh it.
    /// No shipped build does yet.
    pub fn preview_list(&self, list: *mut c_void) -> Option<GamePreviewList<'_>> {
        if list.is_null() {
            return None;
        }
        Some(GamePreviewList {
            game: self,
            list,
            sort: self.preview_sort?,
            refresh: self.preview_refresh?,
        })
    }
}

/// Finds a setting by name. The map is only walked once per setting at load, so a linear scan over
/// the buckets is fine.
unsafe fn find_setting(collection: *const c_void, name: &str) -> Result<usize> {
    let map = (collection as *const u8).add(layout::SETTINGS_MAP) as *const c_void;
    let capacity: u32 = read(map, layout::MAP_CAPACITY);
    let entries: *const c_void = read(map, layout::MAP_ENTRIES);
    if entries.is_null() {
        return Err(anyhow!("Settings map is empty"));
    }

    for i in 0..capacity as usize {
        let entry = (entries as *const u8).add(i * layout::MAP_ENTRY_SIZE) as *const c_void;
        // unused buckets have no next pointer
        if read::<*const c_void>(entry, layout::MAP_ENTRY_NEXT).is_null() {
            continue;
        }
        let key: *const c_char = read(entry, layout::MAP_ENTRY_KEY);
        if key.is_null() {
            continue;
        }
        if CStr::from_ptr(key).to_bytes().eq_ignore_ascii_case(name.as_bytes()) {
            let setting: usize = read(entry, layout::MAP_ENTRY_VALUE);
            if setting != 0 {
                return Ok(setting);
            }
        }
    }

    Err(anyhow!("Setting {} does not exist", name))
}

/// The attacking actor, seen through its `ActorValueOwner` interface
pub struct Combatant<'a> {
    game: &'a Game,
    owner: *mut c_void,
}

impl<'a> Combatant<'a> {
    pub fn new(game: &'a Game, owner: *mut c_void) -> Option<Self> {
        (!owner.is_null()).then_some(Self { game, owner })
    }
}

impl DamageHost for Combatant<'_> {
    fn is_player(&self) -> bool {
        unsafe {
            let vtable = *(self.owner as *const *const usize);
            let get_is_player_owner: unsafe extern "C" fn(*mut c_void) -> bool =
                std::mem::transmute(*vtable.add(layout::GET_IS_PLAYER_OWNER));
            get_is_player_owner(self.owner)
        }
    }

    fn clamped_skill(&self, skill: u32) -> f32 {
        unsafe { (self.game.clamped_actor_value)(self.owner, skill) }
    }

    fn melee_damage(&self) -> f32 {
        unsafe { (self.game.melee_damage)(self.owner, MELEE_DAMAGE_VALUE) }
    }

    fn equipped_ammo_damage(&self) -> Option<f32> {
        unsafe { self.game.player_ammo_damage() }
    }

    fn game_setting(&self, setting: GameSetting) -> f32 {
        unsafe { self.game.game_setting(setting) }
    }

    fn seconds_since_last_frame(&self) -> f32 {
        unsafe { self.game.seconds_since_last_frame() }
    }

    fn in_targeting_mode(&self) -> bool {
        unsafe { self.game.in_targeting_mode() }
    }

    fn base_temper_bonus(&self, temper_tier: f32) -> f32 {
        unsafe { self.game.temper_damage_bonus(temper_tier) }
    }
}

/// The smithing menu's `BSTArray` of preview entries
pub struct GamePreviewList<'a> {
    game: &'a Game,
    list: *mut c_void,
    sort: unsafe extern "C" fn(*mut c_void),
    refresh: unsafe extern "C" fn(*mut c_void),
}

impl GamePreviewList<'_> {
    unsafe fn entry_ptr(&self, index: usize) -> Result<*mut u8> {
        if index >= self.len() {
            return Err(anyhow!("Preview entry {} is out of range", index));
        }
        let data: *mut u8 = read(self.list, layout::ARRAY_DATA);
        if data.is_null() {
            return Err(anyhow!("Preview list has no storage"));
        }
        Ok(data.add(index * ENTRY_SIZE))
    }
}

impl PreviewList for GamePreviewList<'_> {
    fn len(&self) -> usize {
        unsafe { read::<u32>(self.list, layout::ARRAY_SIZE) as usize }
    }

    fn entry(&self, index: usize) -> Result<PreviewEntry> {
        let bytes = unsafe { std::slice::from_raw_parts(self.entry_ptr(index)?, ENTRY_SIZE) };
        PreviewEntry::read_from(&mut Cursor::new(bytes))
    }

    fn set_entry(&mut self, index: usize, entry: &PreviewEntry) -> Result<()> {
        let mut writer = Cursor::new(Vec::with_capacity(ENTRY_SIZE));
        entry.write_to(&mut writer)?;
        let bytes = writer.into_inner();
        unsafe {
            self.entry_ptr(index)?.copy_from(bytes.as_ptr(), ENTRY_SIZE.min(bytes.len()));
        }
        Ok(())
    }

    fn weapon(&self, entry: &PreviewEntry) -> Option<Weapon> {
        unsafe { weapon(entry.form as usize as *const c_void) }
    }

    fn base_temper_bonus(&self, temper_tier: f32) -> f32 {
        unsafe { self.game.temper_damage_bonus(temper_tier) }
    }

    fn sort(&mut self) {
        unsafe { (self.sort)(self.list) }
    }

    fn refresh(&mut self) {
        unsafe { (self.refresh)(self.list) }
    }
}
