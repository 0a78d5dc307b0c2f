//! Station variants and the hardware each one is built from.

use std::fmt;

use serde::Deserialize;

use crate::devices::ModuleRating;

/// Hardware of one rack group inside a station.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RackGroupLayout {
    /// Number of battery racks.
    pub racks: usize,
    /// Power cabinet rating and module count; `None` for storage-only groups.
    pub cabinet: Option<(ModuleRating, usize)>,
    /// Number of external charge piles attached to this group.
    pub piles: usize,
}

/// A station variant with its fixed rack, module and pile counts.
///
/// In a scenario file a fixed variant is named by its key, e.g.
/// `profile = "GEN3_600"`, and a custom one is a table:
/// `profile = { User_Defined = { module = "UU40kW", module_count = 12 } }`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub enum StationProfile {
    /// Second generation, 13 racks on 13 × 40 kW modules.
    #[serde(rename = "GEN2_530")]
    Gen2Kw530,
    /// Third generation, one charging group plus one storage-only group.
    #[serde(rename = "GEN3_600")]
    Gen3Kw600,
    /// Third generation, two charging groups of 10 × 60 kW modules.
    #[default]
    #[serde(rename = "GEN3_1200")]
    Gen3Kw1200,
    #[serde(rename = "FY_TypeA")]
    FyTypeA,
    #[serde(rename = "FY_TypeB")]
    FyTypeB,
    #[serde(rename = "FY_TypeC")]
    FyTypeC,
    #[serde(rename = "FY_TypeD")]
    FyTypeD,
    /// Single group with `module_count` racks and modules of one rating.
    #[serde(rename = "User_Defined")]
    UserDefined {
        module: ModuleRating,
        module_count: usize,
    },
}

impl StationProfile {
    /// Rack groups for this variant with `piles` charge piles requested.
    ///
    /// Pile counts are clipped to [`StationProfile::max_piles`].
    pub fn rack_groups(&self, piles: usize) -> Vec<RackGroupLayout> {
        let piles = self.max_piles().map_or(piles, |max| piles.min(max));
        let single = |rating: ModuleRating, count: usize| {
            vec![RackGroupLayout {
                racks: count,
                cabinet: Some((rating, count)),
                piles,
            }]
        };
        match *self {
            StationProfile::Gen2Kw530 => single(ModuleRating::Uu40, 13),
            StationProfile::Gen3Kw600 => vec![
                RackGroupLayout {
                    racks: 10,
                    cabinet: Some((ModuleRating::Uu60, 10)),
                    piles,
                },
                RackGroupLayout {
                    racks: 10,
                    cabinet: None,
                    piles: 0,
                },
            ],
            StationProfile::Gen3Kw1200 => vec![
                RackGroupLayout {
                    racks: 10,
                    cabinet: Some((ModuleRating::Uu60, 10)),
                    piles: piles / 2,
                },
                RackGroupLayout {
                    racks: 10,
                    cabinet: Some((ModuleRating::Uu60, 10)),
                    piles: piles - piles / 2,
                },
            ],
            StationProfile::FyTypeA => single(ModuleRating::Uu40, 15),
            StationProfile::FyTypeB => single(ModuleRating::Uu30, 21),
            StationProfile::FyTypeC => single(ModuleRating::Uu40, 33),
            StationProfile::FyTypeD => single(ModuleRating::Uu60, 10),
            StationProfile::UserDefined {
                module,
                module_count,
            } => single(module, module_count),
        }
    }

    /// Total number of battery racks.
    pub fn battery_count(&self) -> usize {
        self.rack_groups(0).iter().map(|g| g.racks).sum()
    }

    /// Nameplate power of the station (kW).
    pub fn max_power_kw(&self) -> f64 {
        match *self {
            StationProfile::Gen2Kw530 => 520.0,
            StationProfile::Gen3Kw600 => 600.0,
            StationProfile::Gen3Kw1200 => 1200.0,
            StationProfile::FyTypeA => 600.0,
            StationProfile::FyTypeB => 630.0,
            StationProfile::FyTypeC => 1320.0,
            StationProfile::FyTypeD => 600.0,
            StationProfile::UserDefined {
                module,
                module_count,
            } => module.max_power_kw() * module_count as f64,
        }
    }

    /// Largest number of charge piles the variant supports; `None` if unbounded.
    pub fn max_piles(&self) -> Option<usize> {
        match self {
            StationProfile::Gen3Kw600 => Some(4),
            StationProfile::Gen3Kw1200 => Some(8),
            StationProfile::UserDefined { .. } => None,
            _ => Some(0),
        }
    }

    /// Default duration of one swap (minutes).
    pub fn default_swap_minutes(&self) -> f64 {
        match self {
            StationProfile::Gen2Kw530 => 6.5,
            StationProfile::Gen3Kw600 | StationProfile::Gen3Kw1200 => 4.5,
            _ => 3.0,
        }
    }
}

impl fmt::Display for StationProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StationProfile::Gen2Kw530 => f.write_str("GEN2_530"),
            StationProfile::Gen3Kw600 => f.write_str("GEN3_600"),
            StationProfile::Gen3Kw1200 => f.write_str("GEN3_1200"),
            StationProfile::FyTypeA => f.write_str("FY_TypeA"),
            StationProfile::FyTypeB => f.write_str("FY_TypeB"),
            StationProfile::FyTypeC => f.write_str("FY_TypeC"),
            StationProfile::FyTypeD => f.write_str("FY_TypeD"),
            StationProfile::UserDefined {
                module,
                module_count,
            } => write!(f, "User_Defined({module_count}x{module})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gen3_1200_splits_piles_between_groups() {
        let groups = StationProfile::Gen3Kw1200.rack_groups(5);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].piles, 2);
        assert_eq!(groups[1].piles, 3);
        assert_eq!(StationProfile::Gen3Kw1200.battery_count(), 20);
    }

    #[test]
    fn gen3_600_has_storage_only_group() {
        let groups = StationProfile::Gen3Kw600.rack_groups(4);
        assert_eq!(groups[0].cabinet, Some((ModuleRating::Uu60, 10)));
        assert_eq!(groups[0].piles, 4);
        assert_eq!(groups[1].cabinet, None);
        assert_eq!(groups[1].piles, 0);
    }

    #[test]
    fn piles_are_clipped_to_variant_limit() {
        let groups = StationProfile::Gen2Kw530.rack_groups(4);
        assert_eq!(groups[0].piles, 0);
        assert_eq!(StationProfile::Gen3Kw600.rack_groups(9)[0].piles, 4);
    }

    #[test]
    fn user_defined_scales_with_modules() {
        let profile = StationProfile::UserDefined {
            module: ModuleRating::Uu30,
            module_count: 12,
        };
        assert_eq!(profile.max_power_kw(), 360.0);
        assert_eq!(profile.battery_count(), 12);
        assert_eq!(profile.rack_groups(3)[0].piles, 3);
    }

    #[test]
    fn fy_variants_match_catalog() {
        let c = StationProfile::FyTypeC.rack_groups(0);
        assert_eq!(c[0].racks, 33);
        assert_eq!(c[0].cabinet, Some((ModuleRating::Uu40, 33)));
        assert_eq!(StationProfile::FyTypeB.max_power_kw(), 630.0);
        assert_eq!(StationProfile::FyTypeD.default_swap_minutes(), 3.0);
    }
}
