//! Scientific reference tables and tolerance checks.
//!
//! Formulas and coefficients used around calibration are cross-checked
//! against a fixed, read-only reference set. Lookups are exact by key;
//! numeric fields are compared with a per-field relative tolerance.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use serde::Serialize;

use crate::sensor::SoilProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Spring,
    Summer,
    Autumn,
    Winter,
}

impl Season {
    pub const ALL: [Season; 4] = [Season::Spring, Season::Summer, Season::Autumn, Season::Winter];
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Autumn => "autumn",
            Season::Winter => "winter",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GrowingEnvironment {
    Outdoor,
    Greenhouse,
    Indoor,
}

impl GrowingEnvironment {
    pub const ALL: [GrowingEnvironment; 3] = [
        GrowingEnvironment::Outdoor,
        GrowingEnvironment::Greenhouse,
        GrowingEnvironment::Indoor,
    ];
}

impl fmt::Display for GrowingEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GrowingEnvironment::Outdoor => "outdoor",
            GrowingEnvironment::Greenhouse => "greenhouse",
            GrowingEnvironment::Indoor => "indoor",
        })
    }
}

/// A published source and the formula taken from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScientificSource {
    pub title: &'static str,
    pub formula: &'static str,
    pub verified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SoilCoefficients {
    /// Fractional EC change per °C around 25 °C
    pub ec_temperature_coefficient: f32,
    /// cmol/kg per pH unit
    pub ph_buffer_capacity: f32,
    /// Volumetric fraction
    pub field_capacity: f32,
    /// g/cm³
    pub bulk_density: f32,
}

/// Target growing conditions for a crop. NPK in mg/kg, EC in µS/cm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CropParameters {
    pub nitrogen: f32,
    pub phosphorus: f32,
    pub potassium: f32,
    pub ph: f32,
    pub ec: f32,
    pub temperature: f32,
    pub humidity: f32,
}

/// Multipliers applied to nutrient targets by season.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeasonalAdjustment {
    pub nitrogen_factor: f32,
    pub phosphorus_factor: f32,
    pub potassium_factor: f32,
    pub ec_factor: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnvironmentAdjustment {
    /// °C added to the outdoor baseline
    pub temperature_offset: f32,
    /// Percentage points added to the outdoor baseline
    pub humidity_offset: f32,
    pub ec_factor: f32,
    pub npk_factor: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub total_sources: usize,
    pub verified_sources: usize,
    pub total_crops: usize,
    pub total_seasons: usize,
    pub total_environments: usize,
    /// Verified sources as a percentage of all sources
    pub compatibility_rate: f32,
}

struct ReferenceTables {
    sources: BTreeMap<&'static str, ScientificSource>,
    soils: BTreeMap<SoilProfile, SoilCoefficients>,
    crops: BTreeMap<&'static str, CropParameters>,
    seasons: BTreeMap<Season, SeasonalAdjustment>,
    environments: BTreeMap<GrowingEnvironment, EnvironmentAdjustment>,
}

const fn published(title: &'static str, formula: &'static str, verified: bool) -> ScientificSource {
    ScientificSource {
        title,
        formula,
        verified,
    }
}

const fn soil(ec: f32, buffer: f32, fc: f32, bd: f32) -> SoilCoefficients {
    SoilCoefficients {
        ec_temperature_coefficient: ec,
        ph_buffer_capacity: buffer,
        field_capacity: fc,
        bulk_density: bd,
    }
}

#[allow(clippy::too_many_arguments)]
const fn crop(n: f32, p: f32, k: f32, ph: f32, ec: f32, t: f32, h: f32) -> CropParameters {
    CropParameters {
        nitrogen: n,
        phosphorus: p,
        potassium: k,
        ph,
        ec,
        temperature: t,
        humidity: h,
    }
}

const fn season(n: f32, p: f32, k: f32, ec: f32) -> SeasonalAdjustment {
    SeasonalAdjustment {
        nitrogen_factor: n,
        phosphorus_factor: p,
        potassium_factor: k,
        ec_factor: ec,
    }
}

const fn environment(t: f32, h: f32, ec: f32, npk: f32) -> EnvironmentAdjustment {
    EnvironmentAdjustment {
        temperature_offset: t,
        humidity_offset: h,
        ec_factor: ec,
        npk_factor: npk,
    }
}

const SOURCES: [ScientificSource; 5] = [
    published(
        "Rhoades 1999, Soil salinity assessment",
        "EC25 = ECt / (1 + 0.021 * (T - 25))",
        true,
    ),
    published(
        "Topp 1980, Electromagnetic determination of soil water content",
        "theta = -0.053 + 0.0292*Ka - 0.00055*Ka^2 + 0.0000043*Ka^3",
        true,
    ),
    published(
        "Bates 1973, Determination of pH",
        "pH25 = pHt + 0.003 * (T - 25)",
        true,
    ),
    published(
        "USDA NRCS 2014, Soil survey field and laboratory methods",
        "BD = Ms / Vt",
        true,
    ),
    published(
        "RS485 NPK probe datasheet",
        "N = 0.1 * EC + offset",
        false,
    ),
];

const SOILS: [(SoilProfile, SoilCoefficients); 5] = [
    (SoilProfile::Sand, soil(0.021, 0.5, 0.10, 1.60)),
    (SoilProfile::Loam, soil(0.020, 1.5, 0.25, 1.40)),
    (SoilProfile::Clay, soil(0.019, 3.0, 0.40, 1.20)),
    (SoilProfile::Peat, soil(0.018, 5.0, 0.60, 0.30)),
    (SoilProfile::SandPeat, soil(0.020, 2.5, 0.35, 0.90)),
];

const CROPS: [(&str, CropParameters); 6] = [
    ("tomato", crop(150.0, 50.0, 200.0, 6.5, 2500.0, 24.0, 65.0)),
    ("cucumber", crop(140.0, 45.0, 190.0, 6.0, 2200.0, 25.0, 70.0)),
    ("lettuce", crop(100.0, 40.0, 150.0, 6.2, 1200.0, 18.0, 60.0)),
    ("strawberry", crop(80.0, 30.0, 120.0, 5.8, 1500.0, 20.0, 65.0)),
    ("potato", crop(120.0, 55.0, 180.0, 5.5, 1800.0, 18.0, 70.0)),
    ("wheat", crop(130.0, 40.0, 100.0, 6.5, 1600.0, 20.0, 55.0)),
];

const SEASONS: [(Season, SeasonalAdjustment); 4] = [
    (Season::Spring, season(1.2, 1.1, 1.0, 1.05)),
    (Season::Summer, season(1.0, 1.0, 1.2, 1.10)),
    (Season::Autumn, season(0.8, 1.1, 1.1, 0.95)),
    (Season::Winter, season(0.6, 0.8, 0.9, 0.90)),
];

const ENVIRONMENTS: [(GrowingEnvironment, EnvironmentAdjustment); 3] = [
    (GrowingEnvironment::Outdoor, environment(0.0, 0.0, 1.0, 1.0)),
    (GrowingEnvironment::Greenhouse, environment(3.0, 10.0, 1.1, 1.15)),
    (GrowingEnvironment::Indoor, environment(2.0, -5.0, 0.9, 0.95)),
];

fn tables() -> &'static ReferenceTables {
    static TABLES: OnceLock<ReferenceTables> = OnceLock::new();
    TABLES.get_or_init(|| ReferenceTables {
        sources: SOURCES.iter().map(|s| (s.title, s.clone())).collect(),
        soils: SOILS.into_iter().collect(),
        crops: CROPS.into_iter().collect(),
        seasons: SEASONS.into_iter().collect(),
        environments: ENVIRONMENTS.into_iter().collect(),
    })
}

/// `|value - reference| <= tolerance * |reference|`. A zero reference only
/// accepts an exact zero.
fn within(value: f32, reference: f32, tolerance: f32) -> bool {
    if !value.is_finite() {
        return false;
    }
    if reference == 0.0 {
        return value == 0.0;
    }
    (value - reference).abs() <= tolerance * reference.abs()
}

/// Exact match on both the source title and its formula text.
pub fn validate_compensation_formula(source_title: &str, formula: &str) -> bool {
    tables()
        .sources
        .get(source_title)
        .is_some_and(|s| s.formula == formula)
}

pub fn validate_soil_coefficients(soil: SoilProfile, c: &SoilCoefficients) -> bool {
    let Some(r) = tables().soils.get(&soil) else {
        return false;
    };
    within(c.ec_temperature_coefficient, r.ec_temperature_coefficient, 0.10)
        && within(c.ph_buffer_capacity, r.ph_buffer_capacity, 0.15)
        && within(c.field_capacity, r.field_capacity, 0.10)
        && within(c.bulk_density, r.bulk_density, 0.05)
}

pub fn validate_crop_parameters(name: &str, c: &CropParameters) -> bool {
    let Some(r) = tables().crops.get(name) else {
        tracing::debug!(crop = name, "no reference parameters for crop");
        return false;
    };
    within(c.nitrogen, r.nitrogen, 0.15)
        && within(c.phosphorus, r.phosphorus, 0.15)
        && within(c.potassium, r.potassium, 0.15)
        && within(c.ph, r.ph, 0.05)
        && within(c.ec, r.ec, 0.20)
        && within(c.temperature, r.temperature, 0.10)
        && within(c.humidity, r.humidity, 0.10)
}

pub fn validate_seasonal_adjustment(season: Season, a: &SeasonalAdjustment) -> bool {
    let Some(r) = tables().seasons.get(&season) else {
        return false;
    };
    within(a.nitrogen_factor, r.nitrogen_factor, 0.05)
        && within(a.phosphorus_factor, r.phosphorus_factor, 0.05)
        && within(a.potassium_factor, r.potassium_factor, 0.05)
        && within(a.ec_factor, r.ec_factor, 0.05)
}

pub fn validate_environment_adjustment(env: GrowingEnvironment, a: &EnvironmentAdjustment) -> bool {
    let Some(r) = tables().environments.get(&env) else {
        return false;
    };
    within(a.temperature_offset, r.temperature_offset, 0.10)
        && within(a.humidity_offset, r.humidity_offset, 0.10)
        && within(a.ec_factor, r.ec_factor, 0.20)
        && within(a.npk_factor, r.npk_factor, 0.20)
}

pub fn source(title: &str) -> Option<&'static ScientificSource> {
    tables().sources.get(title)
}

pub fn sources() -> impl Iterator<Item = &'static ScientificSource> {
    tables().sources.values()
}

pub fn soil_coefficients(soil: SoilProfile) -> Option<&'static SoilCoefficients> {
    tables().soils.get(&soil)
}

pub fn crop_parameters(name: &str) -> Option<&'static CropParameters> {
    tables().crops.get(name)
}

pub fn crop_names() -> impl Iterator<Item = &'static str> {
    tables().crops.keys().copied()
}

pub fn seasonal_adjustment(season: Season) -> Option<&'static SeasonalAdjustment> {
    tables().seasons.get(&season)
}

pub fn environment_adjustment(env: GrowingEnvironment) -> Option<&'static EnvironmentAdjustment> {
    tables().environments.get(&env)
}

#[allow(clippy::cast_precision_loss)]
pub fn validation_report() -> ValidationReport {
    let t = tables();
    let total_sources = t.sources.len();
    let verified_sources = t.sources.values().filter(|s| s.verified).count();
    let compatibility_rate = if total_sources == 0 {
        0.0
    } else {
        verified_sources as f32 / total_sources as f32 * 100.0
    };
    ValidationReport {
        total_sources,
        verified_sources,
        total_crops: t.crops.len(),
        total_seasons: t.seasons.len(),
        total_environments: t.environments.len(),
        compatibility_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerance_is_relative_to_reference() {
        assert!(within(1.09, 1.0, 0.10));
        assert!(within(0.91, 1.0, 0.10));
        assert!(!within(1.11, 1.0, 0.10));
        assert!(within(-4.6, -5.0, 0.10));
        assert!(!within(f32::NAN, 1.0, 0.5));
    }

    #[test]
    fn zero_reference_needs_exact_zero() {
        assert!(within(0.0, 0.0, 0.2));
        assert!(!within(0.001, 0.0, 0.2));
    }

    #[test]
    fn every_source_title_is_unique() {
        assert_eq!(tables().sources.len(), SOURCES.len());
    }
}
