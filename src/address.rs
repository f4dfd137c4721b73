//! Where things live in each supported build of the game.
//!
//! Call sites and host routines are described by Address Library id plus a byte displacement into
//! the function with that id. Each build lineage has its own ids, so every entry is tagged with the
//! variant it belongs to.

use std::fmt;

use anyhow::{bail, Context, Result};

use super::versiondb::VersionDb;

/// Packed runtime version as reported by SKSE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeVersion(pub u32);

impl RuntimeVersion {
    pub const fn new(major: u32, minor: u32, build: u32, sub: u32) -> Self {
        Self(((major & 0xFF) << 24) | ((minor & 0xFF) << 16) | ((build & 0xFFF) << 4) | (sub & 0xF))
    }

    pub const fn major(self) -> u32 {
        self.0 >> 24
    }

    pub const fn minor(self) -> u32 {
        (self.0 >> 16) & 0xFF
    }

    pub const fn build(self) -> u32 {
        (self.0 >> 4) & 0xFFF
    }

    pub const fn sub(self) -> u32 {
        self.0 & 0xF
    }

    pub fn variant(self) -> Result<BuildVariant> {
        Ok(match (self.major(), self.minor()) {
            (1, 4) => BuildVariant::VirtualReality,
            (1, 5) => BuildVariant::SpecialEdition,
            (1, 6) => BuildVariant::AnniversaryEdition,
            _ => bail!("Unsupported game version {}", self),
        })
    }
}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.major(), self.minor(), self.build(), self.sub())
    }
}

/// Known release lineages of the game executable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildVariant {
    /// 1.5.x
    SpecialEdition,
    /// 1.6.x
    AnniversaryEdition,
    /// 1.4.x
    VirtualReality,
}

/// Game computations that get replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperation {
    ArmorBonus,
    WeaponDamage,
    PreviewDamageRefresh,
}

impl LogicalOperation {
    pub const ALL: [Self; 3] = [Self::ArmorBonus, Self::WeaponDamage, Self::PreviewDamageRefresh];

    /// Whether loading has to stop when the running build has no call sites for this operation
    ///
    /// `PreviewDamageRefresh` has no call sites or `PreviewSort`/`PreviewRefresh` symbols in any
    /// shipped build. Its hook is never installed, so `refresh_preview` only runs under tests
    /// until those addresses are added.
    pub const fn required(self) -> bool {
        !matches!(self, Self::PreviewDamageRefresh)
    }
}

/// Game routines and globals the formulas read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSymbol {
    /// `float(float temperTier)`
    TemperDamageBonus,
    /// `float(ActorValueOwner*, uint32_t)`
    MeleeDamage,
    /// `float(ActorValueOwner*, ActorValue)`
    ClampedActorValue,
    GameSettings,
    Player,
    Vats,
    SecondsSinceLastFrame,
    PreviewSort,
    PreviewRefresh,
}

/// One location: the function with Address Library `id`, plus `displacement` bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressEntry {
    pub variant: BuildVariant,
    pub id: u64,
    pub displacement: usize,
}

impl AddressEntry {
    pub const fn new(variant: BuildVariant, id: u64, displacement: usize) -> Self {
        Self {
            variant,
            id,
            displacement,
        }
    }

    pub fn resolve(&self, db: &VersionDb, module_base: usize) -> Result<usize> {
        Ok(module_base + db.offset(self.id)? + self.displacement)
    }
}

use BuildVariant::*;

const ARMOR_BONUS_SITES: &[AddressEntry] = &[
    AddressEntry::new(SpecialEdition, 50531, 0x60),
    AddressEntry::new(SpecialEdition, 50531, 0x72),
    AddressEntry::new(SpecialEdition, 15779, 0x2F),
    AddressEntry::new(AnniversaryEdition, 51360, 0x471),
    AddressEntry::new(AnniversaryEdition, 51360, 0x45D),
    AddressEntry::new(AnniversaryEdition, 16017, 0x2F),
];

const WEAPON_DAMAGE_SITES: &[AddressEntry] = &[
    AddressEntry::new(SpecialEdition, 25846, 0x19),
    AddressEntry::new(SpecialEdition, 25848, 0x2A),
    AddressEntry::new(SpecialEdition, 39215, 0x2F),
    AddressEntry::new(SpecialEdition, 42920, 0x2F4),
    AddressEntry::new(AnniversaryEdition, 26409, 0x19),
    AddressEntry::new(AnniversaryEdition, 26411, 0x2A),
    AddressEntry::new(AnniversaryEdition, 40291, 0x37),
    AddressEntry::new(AnniversaryEdition, 44100, 0x2F8),
];

// the crafting preview has not been located in any shipped build yet
const PREVIEW_DAMAGE_REFRESH_SITES: &[AddressEntry] = &[];

const HOST_SYMBOLS: &[(HostSymbol, AddressEntry)] = &[
    (HostSymbol::TemperDamageBonus, AddressEntry::new(SpecialEdition, 25915, 0)),
    (HostSymbol::TemperDamageBonus, AddressEntry::new(AnniversaryEdition, 26498, 0)),
    (HostSymbol::MeleeDamage, AddressEntry::new(SpecialEdition, 37517, 0)),
    (HostSymbol::MeleeDamage, AddressEntry::new(AnniversaryEdition, 38462, 0)),
    (HostSymbol::ClampedActorValue, AddressEntry::new(SpecialEdition, 26616, 0)),
    (HostSymbol::ClampedActorValue, AddressEntry::new(AnniversaryEdition, 27284, 0)),
    (HostSymbol::GameSettings, AddressEntry::new(SpecialEdition, 514622, 0)),
    (HostSymbol::GameSettings, AddressEntry::new(AnniversaryEdition, 400782, 0)),
    (HostSymbol::Player, AddressEntry::new(SpecialEdition, 517014, 0)),
    (HostSymbol::Player, AddressEntry::new(AnniversaryEdition, 403521, 0)),
    (HostSymbol::Vats, AddressEntry::new(SpecialEdition, 514725, 0)),
    (HostSymbol::Vats, AddressEntry::new(AnniversaryEdition, 400883, 0)),
    (HostSymbol::SecondsSinceLastFrame, AddressEntry::new(SpecialEdition, 523660, 0)),
    (HostSymbol::SecondsSinceLastFrame, AddressEntry::new(AnniversaryEdition, 410199, 0)),
];

fn table(operation: LogicalOperation) -> &'static [AddressEntry] {
    match operation {
        LogicalOperation::ArmorBonus => ARMOR_BONUS_SITES,
        LogicalOperation::WeaponDamage => WEAPON_DAMAGE_SITES,
        LogicalOperation::PreviewDamageRefresh => PREVIEW_DAMAGE_REFRESH_SITES,
    }
}

/// Every call site of `operation` in builds of `variant`
pub fn call_sites(
    operation: LogicalOperation,
    variant: BuildVariant,
) -> impl Iterator<Item = &'static AddressEntry> {
    table(operation).iter().filter(move |e| e.variant == variant)
}

pub fn host_symbol(symbol: HostSymbol, variant: BuildVariant) -> Option<&'static AddressEntry> {
    HOST_SYMBOLS
        .iter()
        .find(|(s, e)| *s == symbol && e.variant == variant)
        .map(|(_, e)| e)
}

/// Fails if the table can't place every required operation in this build. Nothing should be
/// patched in that case.
pub fn validate(variant: BuildVariant) -> Result<()> {
    let missing: Vec<_> = LogicalOperation::ALL
        .into_iter()
        .filter(|op| op.required() && call_sites(*op, variant).next().is_none())
        .collect();
    if !missing.is_empty() {
        bail!("No call sites known for {:?} in {:?} builds", missing, variant);
    }

    Ok(())
}

/// Absolute addresses of every call site of `operation`
pub fn resolve(
    operation: LogicalOperation,
    variant: BuildVariant,
    db: &VersionDb,
    module_base: usize,
) -> Result<Vec<usize>> {
    let sites = call_sites(operation, variant)
        .map(|e| {
            e.resolve(db, module_base)
                .with_context(|| format!("Could not place {:?} call site {:?}", operation, e))
        })
        .collect::<Result<Vec<_>>>()?;
    if sites.is_empty() {
        bail!("No call sites known for {:?} in {:?} builds", operation, variant);
    }

    Ok(sites)
}

/// Absolute address of a host routine or global, if this build has one
pub fn resolve_symbol(
    symbol: HostSymbol,
    variant: BuildVariant,
    db: &VersionDb,
    module_base: usize,
) -> Result<Option<usize>> {
    host_symbol(symbol, variant)
        .map(|e| {
            e.resolve(db, module_base)
                .with_context(|| format!("Could not place {:?}", symbol))
        })
        .transpose()
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Cursor;

    use super::*;

    /// Builds a database where id `n` lives at offset `n * 0x10`
    pub fn db_with(ids: &[u64]) -> VersionDb {
        let mut buf = Vec::new();
        buf.extend_from_slice(&2u32.to_le_bytes());
        for part in [1u32, 6, 1170, 0] {
            buf.extend_from_slice(&part.to_le_bytes());
        }
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&8u32.to_le_bytes());
        buf.extend_from_slice(&(ids.len() as u32).to_le_bytes());
        for id in ids {
            buf.push(0x00);
            buf.extend_from_slice(&id.to_le_bytes());
            buf.extend_from_slice(&(id * 0x10).to_le_bytes());
        }
        VersionDb::parse(&mut Cursor::new(buf)).unwrap()
    }

    #[test]
    fn test_runtime_version_fields() {
        let version = RuntimeVersion::new(1, 6, 1170, 0);
        assert_eq!(version.0, 0x0106_4920);
        assert_eq!(version.major(), 1);
        assert_eq!(version.minor(), 6);
        assert_eq!(version.build(), 1170);
        assert_eq!(version.sub(), 0);
        assert_eq!(version.to_string(), "1.6.1170.0");
    }

    #[test]
    fn test_variant_detection() {
        assert_eq!(RuntimeVersion::new(1, 5, 97, 0).variant().unwrap(), SpecialEdition);
        assert_eq!(RuntimeVersion::new(1, 6, 640, 0).variant().unwrap(), AnniversaryEdition);
        assert_eq!(RuntimeVersion::new(1, 4, 15, 0).variant().unwrap(), VirtualReality);
        assert!(RuntimeVersion::new(1, 7, 0, 0).variant().is_err());
        assert!(RuntimeVersion::new(2, 5, 97, 0).variant().is_err());
    }

    #[test]
    fn test_every_site_count() {
        for variant in [SpecialEdition, AnniversaryEdition] {
            assert_eq!(call_sites(LogicalOperation::ArmorBonus, variant).count(), 3);
            assert_eq!(call_sites(LogicalOperation::WeaponDamage, variant).count(), 4);
        }
    }

    #[test]
    fn test_preview_refresh_is_optional_and_unplaced() {
        assert!(LogicalOperation::ArmorBonus.required());
        assert!(LogicalOperation::WeaponDamage.required());
        assert!(!LogicalOperation::PreviewDamageRefresh.required());
        for variant in [SpecialEdition, AnniversaryEdition, VirtualReality] {
            assert_eq!(call_sites(LogicalOperation::PreviewDamageRefresh, variant).count(), 0);
            assert!(host_symbol(HostSymbol::PreviewSort, variant).is_none());
            assert!(host_symbol(HostSymbol::PreviewRefresh, variant).is_none());
        }
    }

    #[test]
    fn test_validate() {
        assert!(validate(SpecialEdition).is_ok());
        assert!(validate(AnniversaryEdition).is_ok());
        // nothing is known for VR, so it must refuse to patch
        assert!(validate(VirtualReality).is_err());
    }

    #[test]
    fn test_resolve_adds_base_and_displacement() {
        let db = db_with(&[50531, 15779]);
        let sites =
            resolve(LogicalOperation::ArmorBonus, SpecialEdition, &db, 0x1_4000_0000).unwrap();
        assert_eq!(
            sites,
            vec![
                0x1_4000_0000 + 50531 * 0x10 + 0x60,
                0x1_4000_0000 + 50531 * 0x10 + 0x72,
                0x1_4000_0000 + 15779 * 0x10 + 0x2F,
            ]
        );
    }

    #[test]
    fn test_resolve_missing_id() {
        let db = db_with(&[50531]);
        assert!(resolve(LogicalOperation::ArmorBonus, SpecialEdition, &db, 0).is_err());
    }

    #[test]
    fn test_resolve_unknown_operation() {
        let db = db_with(&[]);
        assert!(
            resolve(LogicalOperation::PreviewDamageRefresh, AnniversaryEdition, &db, 0).is_err()
        );
        assert!(resolve(LogicalOperation::WeaponDamage, VirtualReality, &db, 0).is_err());
    }

    #[test]
    fn test_resolve_symbols() {
        let db = db_with(&[26498]);
        assert_eq!(
            resolve_symbol(HostSymbol::TemperDamageBonus, AnniversaryEdition, &db, 0x1000).unwrap(),
            Some(0x1000 + 26498 * 0x10)
        );
        assert_eq!(
            resolve_symbol(HostSymbol::PreviewSort, AnniversaryEdition, &db, 0x1000).unwrap(),
            None
        );
        assert!(
            resolve_symbol(HostSymbol::TemperDamageBonus, SpecialEdition, &db, 0x1000).is_err()
        );
    }
}
