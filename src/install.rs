//! Puts every replacement in place for the running build

use anyhow::{Context, Result};

use super::address::{self, BuildVariant, LogicalOperation};
use super::patch::{self, CallInterceptor, InstalledHook, OriginalRoutine};
use super::versiondb::VersionDb;

/// A replacement for one logical operation
pub struct Patch<'a> {
    pub operation: LogicalOperation,
    pub replacement: usize,
    pub original: &'a OriginalRoutine,
}

/// Installs `patches`. Either every required operation ends up redirected or every call site is
/// left calling what it called before.
///
/// Optional operations this build has no call sites for are skipped.
pub fn install_all(
    interceptor: &mut impl CallInterceptor,
    variant: BuildVariant,
    db: &VersionDb,
    module_base: usize,
    patches: &[Patch],
) -> Result<Vec<InstalledHook>> {
    address::validate(variant)?;

    let mut planned = Vec::with_capacity(patches.len());
    for patch in patches {
        match address::resolve(patch.operation, variant, db, module_base) {
            Ok(sites) => planned.push((patch, sites)),
            Err(e) if !patch.operation.required() => {
                log::info!("Skipping {:?}: {:#}", patch.operation, e);
            }
            Err(e) => return Err(e),
        }
    }

    // every site has to hold a call before anything is written
    for (patch, sites) in &planned {
        for &site in sites {
            interceptor.call_target(site).with_context(|| {
                format!("{:?} call site is not what we expected", patch.operation)
            })?;
        }
    }

    let mut hooks = Vec::new();
    for (patch, sites) in planned {
        let installed = match patch::install(interceptor, &sites, patch.replacement, patch.original)
        {
            Ok(installed) => installed,
            Err(e) => {
                patch::restore(interceptor, &hooks);
                return Err(e.context(format!("Failed to redirect {:?}", patch.operation)));
            }
        };
        for hook in &installed {
            log::info!(
                "{:?}: call at {:#X} now goes to {:#X} instead of {:#X}",
                patch.operation,
                hook.site,
                hook.replacement,
                hook.original
            );
        }
        hooks.extend(installed);
    }

    Ok(hooks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::tests::db_with;
    use crate::address::BuildVariant::*;
    use crate::patch::testing::CodeImage;

    const BASE: usize = 0x1_4000_0000;
    const ARMOR_ORIGINAL: usize = BASE + 0x100;
    const WEAPON_ORIGINAL: usize = BASE + 0x200;
    const ARMOR_REPLACEMENT: usize = BASE + 0x300;
    const WEAPON_REPLACEMENT: usize = BASE + 0x400;

    const SE_IDS: [u64; 6] = [50531, 15779, 25846, 25848, 39215, 42920];

    fn sites(operation: LogicalOperation, db: &VersionDb) -> Vec<usize> {
        address::resolve(operation, SpecialEdition, db, BASE).unwrap()
    }

    fn image_for(db: &VersionDb) -> CodeImage {
        let mut image = CodeImage::new(BASE, 0x10_0000);
        for (operation, original) in [
            (LogicalOperation::ArmorBonus, ARMOR_ORIGINAL),
            (LogicalOperation::WeaponDamage, WEAPON_ORIGINAL),
        ] {
            for site in sites(operation, db) {
                image.put_call(site, original);
            }
        }
        image
    }

    #[test]
    fn test_installs_every_operation() {
        let db = db_with(&SE_IDS);
        let mut image = image_for(&db);
        let armor = OriginalRoutine::new();
        let weapon = OriginalRoutine::new();
        let preview = OriginalRoutine::new();
        let patches = [
            Patch {
                operation: LogicalOperation::ArmorBonus,
                replacement: ARMOR_REPLACEMENT,
                original: &armor,
            },
            Patch {
                operation: LogicalOperation::WeaponDamage,
                replacement: WEAPON_REPLACEMENT,
                original: &weapon,
            },
            Patch {
                operation: LogicalOperation::PreviewDamageRefresh,
                replacement: BASE + 0x500,
                original: &preview,
            },
        ];

        let hooks = install_all(&mut image, SpecialEdition, &db, BASE, &patches).unwrap();
        assert_eq!(hooks.len(), 7);
        assert_eq!(image.writes.len(), 7);

        // by the time a patched site can run, its original is known
        assert_eq!(armor.address(), Some(ARMOR_ORIGINAL));
        assert_eq!(weapon.address(), Some(WEAPON_ORIGINAL));
        assert!(!preview.is_set());
        for site in sites(LogicalOperation::ArmorBonus, &db) {
            assert_eq!(image.call_target(site).unwrap(), ARMOR_REPLACEMENT);
        }
        for site in sites(LogicalOperation::WeaponDamage, &db) {
            assert_eq!(image.call_target(site).unwrap(), WEAPON_REPLACEMENT);
        }
    }

    #[test]
    fn test_missing_site_writes_nothing() {
        let full = db_with(&SE_IDS);
        let mut image = image_for(&full);
        // the last weapon site can't be placed in this database
        let db = db_with(&SE_IDS[..5]);
        let armor = OriginalRoutine::new();
        let weapon = OriginalRoutine::new();
        let patches = [
            Patch {
                operation: LogicalOperation::ArmorBonus,
                replacement: ARMOR_REPLACEMENT,
                original: &armor,
            },
            Patch {
                operation: LogicalOperation::WeaponDamage,
                replacement: WEAPON_REPLACEMENT,
                original: &weapon,
            },
        ];

        assert!(install_all(&mut image, SpecialEdition, &db, BASE, &patches).is_err());
        assert!(image.writes.is_empty());
        assert!(!armor.is_set());
        assert!(!weapon.is_set());
    }

    #[test]
    fn test_unexpected_code_writes_nothing() {
        let db = db_with(&SE_IDS);
        let mut image = image_for(&db);
        let weapon_sites = sites(LogicalOperation::WeaponDamage, &db);
        // some other mod got to this call first and left a jmp behind
        image.bytes[weapon_sites[3] - BASE] = 0xE9;

        let armor = OriginalRoutine::new();
        let weapon = OriginalRoutine::new();
        let patches = [
            Patch {
                operation: LogicalOperation::ArmorBonus,
                replacement: ARMOR_REPLACEMENT,
                original: &armor,
            },
            Patch {
                operation: LogicalOperation::WeaponDamage,
                replacement: WEAPON_REPLACEMENT,
                original: &weapon,
            },
        ];

        assert!(install_all(&mut image, SpecialEdition, &db, BASE, &patches).is_err());
        assert!(image.writes.is_empty());
        assert!(!armor.is_set());
    }

    #[test]
    fn test_failed_write_restores_every_operation() {
        let db = db_with(&SE_IDS);
        let mut image = image_for(&db);
        let before = image.bytes.clone();
        // the three armor sites go through, then the first weapon site fails
        image.fail_at = Some(3);

        let armor = OriginalRoutine::new();
        let weapon = OriginalRoutine::new();
        let patches = [
            Patch {
                operation: LogicalOperation::ArmorBonus,
                replacement: ARMOR_REPLACEMENT,
                original: &armor,
            },
            Patch {
                operation: LogicalOperation::WeaponDamage,
                replacement: WEAPON_REPLACEMENT,
                original: &weapon,
            },
        ];

        assert!(install_all(&mut image, SpecialEdition, &db, BASE, &patches).is_err());
        assert_eq!(image.bytes, before);
        for site in sites(LogicalOperation::ArmorBonus, &db) {
            assert_eq!(image.call_target(site).unwrap(), ARMOR_ORIGINAL);
        }
        for site in sites(LogicalOperation::WeaponDamage, &db) {
            assert_eq!(image.call_target(site).unwrap(), WEAPON_ORIGINAL);
        }
    }

    #[test]
    fn test_unsupported_build() {
        let db = db_with(&SE_IDS);
        let mut image = image_for(&db);
        let armor = OriginalRoutine::new();
        let patches = [Patch {
            operation: LogicalOperation::ArmorBonus,
            replacement: ARMOR_REPLACEMENT,
            original: &armor,
        }];

        assert!(install_all(&mut image, VirtualReality, &db, BASE, &patches).is_err());
        assert!(image.writes.is_empty());
    }
}
