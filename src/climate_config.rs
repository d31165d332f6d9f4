// Engine configuration
// Every conversion constant, tier table and threshold is a field here and is passed to
// each component at construction. Defaults reproduce the screening method's constants.
//
// Load with `EngineConfig::load()` which searches:
// 1. `$EMISSIONS_CONFIG`
// 2. `./emissions_config.toml`
// 3. Built-in defaults

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::climate_scenario_logic::FrequencyAssumption;
use crate::climate_spatial_index::DistanceMetric;
use crate::climate_state::{FacilityType, FuelType};

pub const CONFIG_ENV_VAR: &str = "EMISSIONS_CONFIG";
pub const CONFIG_FILE_NAME: &str = "emissions_config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {source}", .path.display())]
    Io { path: PathBuf, source: std::io::Error },

    #[error("Config parse error ({}): {source}", .path.display())]
    Parse { path: PathBuf, source: toml::de::Error },

    #[error("Config parse error: {0}")]
    ParseStr(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub matching: MatchingConfig,
    pub proxy: ProxyConfig,
    pub discrepancy: DiscrepancyConfig,
    pub detection: DetectionThresholds,
    pub batch: BatchConfig,
}

impl EngineConfig {
    /// Load using the standard search order, falling back to defaults on any failure.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded emissions config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded emissions config from ./{}", CONFIG_FILE_NAME);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", CONFIG_FILE_NAME);
                }
            }
        }

        info!("No emissions config found, using built-in defaults");
        Self::default()
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every section, reporting all violations at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        self.matching.check(&mut errors);
        self.proxy.check(&mut errors);
        self.discrepancy.check(&mut errors);
        self.detection.check(&mut errors);
        if self.batch.num_threads == 0 {
            errors.push("batch.num_threads must be at least 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

fn check_positive(value: f64, name: &str, errors: &mut Vec<String>) {
    if !value.is_finite() || value <= 0.0 {
        errors.push(format!("{} must be positive, got {}", name, value));
    }
}

fn check_unit_interval(value: f64, name: &str, errors: &mut Vec<String>) {
    if !(0.0..=1.0).contains(&value) {
        errors.push(format!("{} must be within [0, 1], got {}", name, value));
    }
}

// ============================================================================
// Facility matching
// ============================================================================

/// Confidence multiplier applied when the match distance is below `below_km`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceTier {
    pub below_km: f64,
    pub multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypeTiers {
    pub extraction: f64,
    pub thermal_generation: f64,
    pub refining: f64,
    pub processing: f64,
    pub terminal: f64,
    pub other: f64,
}

impl Default for TypeTiers {
    fn default() -> Self {
        Self {
            extraction: 1.0,
            thermal_generation: 1.0,
            refining: 0.9,
            processing: 0.9,
            terminal: 0.85,
            other: 0.7,
        }
    }
}

impl TypeTiers {
    pub fn multiplier(&self, facility_type: FacilityType) -> f64 {
        match facility_type {
            FacilityType::Extraction => self.extraction,
            FacilityType::ThermalGeneration => self.thermal_generation,
            FacilityType::Refining => self.refining,
            FacilityType::Processing => self.processing,
            FacilityType::Terminal => self.terminal,
            FacilityType::Other => self.other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub max_match_radius_km: f64,
    pub distance_metric: DistanceMetric,
    pub distance_floor: f64,
    /// Ascending `below_km` steps; distances past the last step get `distance_floor`
    pub distance_tiers: Vec<DistanceTier>,
    pub type_tiers: TypeTiers,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            max_match_radius_km: 5.0,
            distance_metric: DistanceMetric::Planar,
            distance_floor: 0.3,
            distance_tiers: vec![
                DistanceTier { below_km: 1.0, multiplier: 1.0 },
                DistanceTier { below_km: 3.0, multiplier: 0.8 },
                DistanceTier { below_km: 5.0, multiplier: 0.6 },
            ],
            type_tiers: TypeTiers::default(),
        }
    }
}

impl MatchingConfig {
    fn check(&self, errors: &mut Vec<String>) {
        check_positive(self.max_match_radius_km, "matching.max_match_radius_km", errors);
        check_unit_interval(self.distance_floor, "matching.distance_floor", errors);

        for (i, tier) in self.distance_tiers.iter().enumerate() {
            check_positive(tier.below_km, &format!("matching.distance_tiers[{}].below_km", i), errors);
            check_unit_interval(tier.multiplier, &format!("matching.distance_tiers[{}].multiplier", i), errors);
        }
        if self.distance_tiers.windows(2).any(|w| w[0].below_km >= w[1].below_km) {
            errors.push("matching.distance_tiers must be strictly increasing in below_km".to_string());
        }

        let t = &self.type_tiers;
        for (name, value) in [
            ("extraction", t.extraction),
            ("thermal_generation", t.thermal_generation),
            ("refining", t.refining),
            ("processing", t.processing),
            ("terminal", t.terminal),
            ("other", t.other),
        ] {
            check_unit_interval(value, &format!("matching.type_tiers.{}", name), errors);
        }
    }
}

// ============================================================================
// Proxy conversion
// ============================================================================

/// Side of the plant treated as downwind when building the fixed plume zone.
/// This is a fixed-zone approximation, not a wind-resolved one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownwindDirection {
    #[default]
    East,
    West,
    North,
    South,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub wind_speed_ms: f64,          // assumed constant transport wind
    pub molar_weight_kg_mol: f64,    // NO2
    pub no2_to_nox: f64,
    pub nox_to_co2_coal: f64,
    pub nox_to_co2_gas: f64,
    /// Used when a detection carries no fuel type
    pub fuel_type: FuelType,
    pub zone_buffer_km: f64,
    pub unit_normalization: f64,
    pub ppm_m_to_kg_per_km2: f64,    // CH4 at STP, approximate
    /// Plume area fallback when a detection has no measured extent
    pub plume_area_km2: f64,
    pub downwind: DownwindDirection,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            wind_speed_ms: 5.0,
            molar_weight_kg_mol: 0.046,
            no2_to_nox: 1.32,
            nox_to_co2_coal: 217.0,
            nox_to_co2_gas: 350.0,
            fuel_type: FuelType::Coal,
            zone_buffer_km: 30.0,
            unit_normalization: 1e6,
            ppm_m_to_kg_per_km2: 0.72,
            plume_area_km2: 1.0,
            downwind: DownwindDirection::East,
        }
    }
}

impl ProxyConfig {
    pub fn nox_to_co2(&self, fuel_type: FuelType) -> f64 {
        match fuel_type {
            FuelType::Coal => self.nox_to_co2_coal,
            FuelType::Gas => self.nox_to_co2_gas,
        }
    }

    fn check(&self, errors: &mut Vec<String>) {
        for (name, value) in [
            ("proxy.wind_speed_ms", self.wind_speed_ms),
            ("proxy.molar_weight_kg_mol", self.molar_weight_kg_mol),
            ("proxy.no2_to_nox", self.no2_to_nox),
            ("proxy.nox_to_co2_coal", self.nox_to_co2_coal),
            ("proxy.nox_to_co2_gas", self.nox_to_co2_gas),
            ("proxy.zone_buffer_km", self.zone_buffer_km),
            ("proxy.unit_normalization", self.unit_normalization),
            ("proxy.ppm_m_to_kg_per_km2", self.ppm_m_to_kg_per_km2),
            ("proxy.plume_area_km2", self.plume_area_km2),
        ] {
            check_positive(value, name, errors);
        }
    }
}

// ============================================================================
// Discrepancy analysis
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscrepancyConfig {
    pub frequency_assumption: FrequencyAssumption,
    /// Primary ratio at or above which a facility is flagged
    pub flag_ratio_threshold: f64,
}

impl Default for DiscrepancyConfig {
    fn default() -> Self {
        Self {
            frequency_assumption: FrequencyAssumption::Moderate,
            flag_ratio_threshold: 3.0,
        }
    }
}

impl DiscrepancyConfig {
    fn check(&self, errors: &mut Vec<String>) {
        check_positive(self.flag_ratio_threshold, "discrepancy.flag_ratio_threshold", errors);
    }
}

// ============================================================================
// Signal strength
// ============================================================================

/// Enhancement over background (percent) needed for each signal-strength grade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionThresholds {
    pub min_enhancement_pct: f64,
    pub medium_confidence_pct: f64,
    pub high_confidence_pct: f64,
}

impl Default for DetectionThresholds {
    fn default() -> Self {
        Self {
            min_enhancement_pct: 10.0,
            medium_confidence_pct: 15.0,
            high_confidence_pct: 30.0,
        }
    }
}

impl DetectionThresholds {
    fn check(&self, errors: &mut Vec<String>) {
        if !(self.min_enhancement_pct <= self.medium_confidence_pct
            && self.medium_confidence_pct <= self.high_confidence_pct)
        {
            errors.push(format!(
                "detection thresholds must be ordered: min ({}) <= medium ({}) <= high ({})",
                self.min_enhancement_pct, self.medium_confidence_pct, self.high_confidence_pct
            ));
        }
    }
}

// ============================================================================
// Batch execution
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub num_threads: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            num_threads: num_cpus::get(),
        }
    }
}
