//! Crafting menu previews.
//!
//! The smithing menu shows each weapon's current and potential damage next to the list entry. The
//! menu works those numbers out on its own, so without this they'd show the vanilla bonus even
//! though combat uses ours.

use std::io::{Read, Seek, Write};

use anyhow::Result;
use binrw::{binrw, BinReaderExt, BinWrite};

use super::config::BonusConfig;
use super::temper::{weapon_temper_bonus, Weapon};

pub const ENTRY_SIZE: usize = 0x30;

/// One row of the preview list, version 1 of the layout.
///
/// Only the tier and bonus fields are understood. The `unk` fields and padding are kept exactly as
/// the game wrote them.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewEntry {
    /// `InventoryEntryData*`
    pub item: u64,
    /// `TESForm*` of the item's base object
    pub form: u64,
    pub temper_tier: f32,
    /// Tier the item would reach if improved now
    pub next_tier: f32,
    pub unk18: u32,
    pub unk1c: u32,
    pub current_bonus: f32,
    pub potential_bonus: f32,
    pub unk28: u8,
    pub unk29: u8,
    pub unk2a: u8,
    pub pad2b: [u8; 5],
}

impl PreviewEntry {
    pub fn read_from<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        Ok(reader.read_le()?)
    }

    pub fn write_to<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        self.write_le(writer)?;
        Ok(())
    }
}

/// The game's preview list
pub trait PreviewList {
    fn len(&self) -> usize;
    fn entry(&self, index: usize) -> Result<PreviewEntry>;
    fn set_entry(&mut self, index: usize, entry: &PreviewEntry) -> Result<()>;
    /// The weapon this entry shows, or `None` for anything that isn't a weapon
    fn weapon(&self, entry: &PreviewEntry) -> Option<Weapon>;
    /// The game's own per-tier temper bonus
    fn base_temper_bonus(&self, temper_tier: f32) -> f32;
    fn sort(&mut self);
    fn refresh(&mut self);
}

/// Recomputes the damage bonus shown for every weapon in the list. Returns how many entries
/// changed.
pub fn refresh_preview(config: &BonusConfig, list: &mut impl PreviewList) -> Result<usize> {
    let mut updated = 0;
    for index in 0..list.len() {
        let mut entry = list.entry(index)?;
        let Some(weapon) = list.weapon(&entry) else {
            continue;
        };

        let base_bonus = |tier| list.base_temper_bonus(tier);
        entry.current_bonus = weapon_temper_bonus(config, &weapon, entry.temper_tier, base_bonus);
        entry.potential_bonus = weapon_temper_bonus(config, &weapon, entry.next_tier, base_bonus);
        list.set_entry(index, &entry)?;
        updated += 1;
    }

    if list.len() > 1 {
        list.sort();
        list.refresh();
    }

    Ok(updated)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use crate::temper::WeaponType;
    use super::*;

    fn entry_bytes() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0x1234_5678_9ABC_DEF0u64.to_le_bytes());
        buf.extend_from_slice(&0x0000_0200_0000_1000u64.to_le_bytes());
        buf.extend_from_slice(&1.2f32.to_le_bytes());
        buf.extend_from_slice(&1.3f32.to_le_bytes());
        buf.extend_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        buf.extend_from_slice(&7u32.to_le_bytes());
        buf.extend_from_slice(&2.0f32.to_le_bytes());
        buf.extend_from_slice(&3.0f32.to_le_bytes());
        buf.extend_from_slice(&[1, 2, 3]);
        buf.extend_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD, 0xEE]);
        buf
    }

    #[test]
    fn test_layout() {
        let bytes = entry_bytes();
        assert_eq!(bytes.len(), ENTRY_SIZE);
        let entry = PreviewEntry::read_from(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(entry.item, 0x1234_5678_9ABC_DEF0);
        assert_eq!(entry.form, 0x0000_0200_0000_1000);
        assert_eq!(entry.temper_tier, 1.2);
        assert_eq!(entry.next_tier, 1.3);
        assert_eq!(entry.unk18, 0xDEAD_BEEF);
        assert_eq!(entry.unk1c, 7);
        assert_eq!(entry.current_bonus, 2.0);
        assert_eq!(entry.potential_bonus, 3.0);
        assert_eq!((entry.unk28, entry.unk29, entry.unk2a), (1, 2, 3));
    }

    #[test]
    fn test_write_keeps_unknown_fields() {
        let bytes = entry_bytes();
        let mut entry = PreviewEntry::read_from(&mut Cursor::new(&bytes)).unwrap();
        entry.current_bonus = 9.5;

        let mut out = Cursor::new(Vec::new());
        entry.write_to(&mut out).unwrap();
        let out = out.into_inner();
        assert_eq!(out.len(), ENTRY_SIZE);
        assert_eq!(&out[..0x20], &bytes[..0x20]);
        assert_eq!(&out[0x20..0x24], &9.5f32.to_le_bytes());
        assert_eq!(&out[0x24..], &bytes[0x24..]);
    }

    struct MockList {
        entries: Vec<PreviewEntry>,
        weapons: Vec<Option<Weapon>>,
        sorted: u32,
        refreshed: u32,
    }

    impl MockList {
        fn new(weapons: Vec<Option<Weapon>>) -> Self {
            let template = PreviewEntry::read_from(&mut Cursor::new(entry_bytes())).unwrap();
            let entries = (0..weapons.len())
                .map(|i| PreviewEntry {
                    form: i as u64,
                    ..template.clone()
                })
                .collect();
            Self {
                entries,
                weapons,
                sorted: 0,
                refreshed: 0,
            }
        }
    }

    impl PreviewList for MockList {
        fn len(&self) -> usize {
            self.entries.len()
        }

        fn entry(&self, index: usize) -> Result<PreviewEntry> {
            Ok(self.entries[index].clone())
        }

        fn set_entry(&mut self, index: usize, entry: &PreviewEntry) -> Result<()> {
            self.entries[index] = entry.clone();
            Ok(())
        }

        fn weapon(&self, entry: &PreviewEntry) -> Option<Weapon> {
            self.weapons[entry.form as usize]
        }

        fn base_temper_bonus(&self, temper_tier: f32) -> f32 {
            (temper_tier - 1.0) * 10.0
        }

        fn sort(&mut self) {
            self.sorted += 1;
        }

        fn refresh(&mut self) {
            self.refreshed += 1;
        }
    }

    const GREATSWORD: Weapon = Weapon {
        attack_damage: 20.0,
        weapon_type: WeaponType::TwoHandSword,
        skill: 7,
    };

    #[test]
    fn test_refresh_recomputes_weapons() {
        let config = BonusConfig {
            percent_per_tier_weapon: 10.0,
            ..Default::default()
        };
        let mut list = MockList::new(vec![Some(GREATSWORD), None, Some(GREATSWORD)]);
        assert_eq!(refresh_preview(&config, &mut list).unwrap(), 2);

        // 20 * 0.2 * 10 / 10 and 20 * 0.3 * 10 / 10
        for index in [0, 2] {
            assert!((list.entries[index].current_bonus - 4.0).abs() < 1e-4);
            assert!((list.entries[index].potential_bonus - 6.0).abs() < 1e-4);
            assert_eq!(list.entries[index].unk18, 0xDEAD_BEEF);
        }
        // armor rows are left alone
        assert_eq!(list.entries[1].current_bonus, 2.0);
        assert_eq!(list.entries[1].potential_bonus, 3.0);
        assert_eq!((list.sorted, list.refreshed), (1, 1));
    }

    #[test]
    fn test_refresh_vanilla_plus() {
        let config = BonusConfig {
            vanilla_plus_mode: true,
            two_handed_bonus: 2.0,
            ..Default::default()
        };
        let mut list = MockList::new(vec![Some(GREATSWORD)]);
        assert_eq!(refresh_preview(&config, &mut list).unwrap(), 1);
        assert!((list.entries[0].current_bonus - 4.0).abs() < 1e-4);
        assert!((list.entries[0].potential_bonus - 6.0).abs() < 1e-4);
    }

    #[test]
    fn test_single_entry_is_not_resorted() {
        let mut list = MockList::new(vec![Some(GREATSWORD)]);
        refresh_preview(&BonusConfig::default(), &mut list).unwrap();
        assert_eq!((list.sorted, list.refreshed), (0, 0));

        let mut empty = MockList::new(vec![]);
        assert_eq!(refresh_preview(&BonusConfig::default(), &mut empty).unwrap(), 0);
        assert_eq!((empty.sorted, empty.refreshed), (0, 0));
    }
}
