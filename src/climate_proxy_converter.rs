// Proxy emission estimates from remote-sensing signals
// Fixed-zone proxy method: no inverse modelling, no wind-resolved transport

// ============================================================================
// METHOD
// ============================================================================
//
// COLUMN ENHANCEMENT -> RATE (NO2 columns over combustion sources):
//   1. Plume zone is a rectangle on the configured downwind side of the plant,
//      background zone the mirror rectangle upwind (buffer_km wide)
//   2. enhancement = plume column - background column (mol/m²)
//   3. NOx flux (kg/h) = enhancement × zone area × wind × M(NO2) × NO2→NOx × 3600
//                        / unit normalization
//   4. CO2 (kg/h) = NOx flux × NOx→CO2 ratio for the fuel burned
//   5. kg/day = kg/h × 24
//
// INTEGRATED COLUMN -> MASS (CH4 plumes in ppm·m):
//   mass (kg) = enhancement × 0.72 kg/km² per ppm·m × plume area (km²)
//   Plume area falls back to the configured default when not measured.
//
// UNCERTAINTY:
//   Single-snapshot estimates carry roughly an order of magnitude of uncertainty.
//   They are screening signals only.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::climate_config::{DetectionThresholds, DownwindDirection, ProxyConfig};
use crate::climate_failures::EmissionsFailure;
use crate::climate_spatial_index::{BoundingBox, KM_PER_DEGREE};
use crate::climate_state::{Detection, FuelType, GasSpecies, GeoPoint, Signal, SignalStrength};

const SECONDS_PER_HOUR: f64 = 3600.0;
const HOURS_PER_DAY: f64 = 24.0;

// ---
// Zones
// ---

/// Downwind plume rectangle and upwind background rectangle around a source
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ZoneGeometry {
    pub plume: BoundingBox,
    pub background: BoundingBox,
}

impl ZoneGeometry {
    pub fn around(center: GeoPoint, buffer_km: f64, downwind: DownwindDirection) -> Self {
        let d = buffer_km / KM_PER_DEGREE;
        let (lat, lon) = (center.lat(), center.lon());

        let across_lat = (lat - d / 2.0, lat + d / 2.0);
        let across_lon = (lon - d / 2.0, lon + d / 2.0);
        let rect = |lats: (f64, f64), lons: (f64, f64)| BoundingBox {
            min_lat: lats.0,
            max_lat: lats.1,
            min_lon: lons.0,
            max_lon: lons.1,
        };

        let (plume, background) = match downwind {
            DownwindDirection::East => (rect(across_lat, (lon, lon + d)), rect(across_lat, (lon - d, lon))),
            DownwindDirection::West => (rect(across_lat, (lon - d, lon)), rect(across_lat, (lon, lon + d))),
            DownwindDirection::North => (rect((lat, lat + d), across_lon), rect((lat - d, lat), across_lon)),
            DownwindDirection::South => (rect((lat - d, lat), across_lon), rect((lat, lat + d), across_lon)),
        };
        Self { plume, background }
    }
}

// ---
// Estimates
// ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EstimateQuantity {
    Rate { kg_per_hour: f64, kg_per_day: f64 },
    Mass { kg: f64 },
}

/// Constants that produced an estimate, kept for reproducibility
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ConversionFactors {
    ColumnFlux {
        zone_area_m2: f64,
        wind_speed_ms: f64,
        molar_weight_kg_mol: f64,
        no2_to_nox: f64,
        nox_to_co2: f64,
        fuel_type: FuelType,
        unit_normalization: f64,
    },
    PlumeMass {
        ppm_m_to_kg_per_km2: f64,
        plume_area_km2: f64,
        area_measured: bool,
    },
    /// Mass supplied directly by the acquisition collaborator
    Precomputed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProxyEstimate {
    detection_id: String,
    species: GasSpecies,
    quantity: EstimateQuantity,
    precursor_kg_per_hour: Option<f64>,  // NOx behind a CO2 rate
    factors: ConversionFactors,
    signal_strength: SignalStrength,
    enhancement_pct: Option<f64>,
    /// Midpoint of the detection's observation window
    observed_at: Option<DateTime<Utc>>,
}

impl ProxyEstimate {
    fn checked(
        detection_id: &str,
        species: GasSpecies,
        quantity: EstimateQuantity,
        factors: ConversionFactors,
    ) -> Result<Self, EmissionsFailure> {
        let valid = |v: f64| v.is_finite() && v >= 0.0;
        let ok = match quantity {
            EstimateQuantity::Rate { kg_per_hour, kg_per_day } => valid(kg_per_hour) && valid(kg_per_day),
            EstimateQuantity::Mass { kg } => valid(kg),
        };
        if !ok {
            return Err(EmissionsFailure::invalid_record(
                detection_id,
                format!("estimate must be finite and non-negative, got {:?}", quantity),
            ));
        }
        Ok(Self {
            detection_id: detection_id.to_string(),
            species,
            quantity,
            precursor_kg_per_hour: None,
            factors,
            signal_strength: SignalStrength::NotApplicable,
            enhancement_pct: None,
            observed_at: None,
        })
    }

    /// Wrap a mass estimated upstream (e.g. an archive's own plume mass)
    pub fn precomputed_mass(detection_id: &str, species: GasSpecies, kg: f64) -> Result<Self, EmissionsFailure> {
        Self::checked(detection_id, species, EstimateQuantity::Mass { kg }, ConversionFactors::Precomputed)
    }

    pub fn detection_id(&self) -> &str {
        &self.detection_id
    }

    pub fn species(&self) -> GasSpecies {
        self.species
    }

    pub fn quantity(&self) -> EstimateQuantity {
        self.quantity
    }

    pub fn precursor_kg_per_hour(&self) -> Option<f64> {
        self.precursor_kg_per_hour
    }

    pub fn factors(&self) -> &ConversionFactors {
        &self.factors
    }

    pub fn signal_strength(&self) -> SignalStrength {
        self.signal_strength
    }

    pub fn enhancement_pct(&self) -> Option<f64> {
        self.enhancement_pct
    }

    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        self.observed_at
    }

    /// Mass attributed to one occurrence of the detected event: the plume mass,
    /// or one day of emission at the estimated rate
    pub fn event_mass_kg(&self) -> f64 {
        match self.quantity {
            EstimateQuantity::Mass { kg } => kg,
            EstimateQuantity::Rate { kg_per_day, .. } => kg_per_day,
        }
    }
}

/// Intermediate fluxes of the column-enhancement method
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ColumnFlux {
    pub nox_kg_per_hour: f64,
    pub co2_kg_per_hour: f64,
    pub co2_kg_per_day: f64,
}

// ---
// Converter
// ---

#[derive(Debug, Clone)]
pub struct ProxyConverter {
    config: ProxyConfig,
    thresholds: DetectionThresholds,
}

impl ProxyConverter {
    pub fn new(config: ProxyConfig, thresholds: DetectionThresholds) -> Self {
        Self { config, thresholds }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Effective zone area (m²)
    pub fn zone_area_m2(&self) -> f64 {
        (self.config.zone_buffer_km * 1000.0).powi(2)
    }

    pub fn zones(&self, source: GeoPoint) -> ZoneGeometry {
        ZoneGeometry::around(source, self.config.zone_buffer_km, self.config.downwind)
    }

    /// NOx and CO2 flux for a column enhancement; negative enhancement gives zero flux
    pub fn column_flux(&self, enhancement_mol_m2: f64, fuel_type: FuelType) -> ColumnFlux {
        let c = &self.config;
        let nox = enhancement_mol_m2
            * self.zone_area_m2()
            * c.wind_speed_ms
            * c.molar_weight_kg_mol
            * c.no2_to_nox
            * SECONDS_PER_HOUR
            / c.unit_normalization;
        let co2 = nox * c.nox_to_co2(fuel_type);

        ColumnFlux {
            nox_kg_per_hour: nox.max(0.0),
            co2_kg_per_hour: co2.max(0.0),
            co2_kg_per_day: (co2 * HOURS_PER_DAY).max(0.0),
        }
    }

    /// Plume mass (kg) from an integrated column; negative enhancement gives zero mass
    pub fn plume_mass_kg(&self, enhancement_ppm_m: f64, plume_area_km2: f64) -> f64 {
        (enhancement_ppm_m * self.config.ppm_m_to_kg_per_km2 * plume_area_km2).max(0.0)
    }

    /// Grade a column enhancement by its percentage over background
    pub fn signal_strength(&self, plume_mol_m2: f64, background_mol_m2: f64) -> (SignalStrength, f64) {
        let enhancement = plume_mol_m2 - background_mol_m2;
        let pct = if background_mol_m2 > 0.0 {
            enhancement / background_mol_m2 * 100.0
        } else {
            0.0
        };

        let t = &self.thresholds;
        let strength = if pct >= t.high_confidence_pct {
            SignalStrength::High
        } else if pct >= t.medium_confidence_pct {
            SignalStrength::Medium
        } else if pct >= t.min_enhancement_pct {
            SignalStrength::Low
        } else {
            SignalStrength::None
        };
        (strength, pct)
    }

    /// Convert a detection's signal into an estimate.
    ///
    /// Absent or non-finite signal values give `EmissionsFailure::MissingSignal`,
    /// which callers treat as "no estimate", never as zero.
    pub fn convert(&self, detection: &Detection) -> Result<ProxyEstimate, EmissionsFailure> {
        let mut estimate = self.convert_signal(detection)?;
        estimate.observed_at = detection.window().midpoint();
        Ok(estimate)
    }

    fn convert_signal(&self, detection: &Detection) -> Result<ProxyEstimate, EmissionsFailure> {
        let present = |v: Option<f64>| v.filter(|x| x.is_finite());
        let id = detection.id();

        match detection.signal() {
            Signal::ColumnEnhancement { plume_mol_m2, background_mol_m2 } => {
                let plume = present(plume_mol_m2)
                    .ok_or_else(|| EmissionsFailure::missing_signal(id, "plume column"))?;
                let background = present(background_mol_m2)
                    .ok_or_else(|| EmissionsFailure::missing_signal(id, "background column"))?;

                let fuel_type = detection.fuel_type().unwrap_or(self.config.fuel_type);
                let flux = self.column_flux(plume - background, fuel_type);
                let (strength, pct) = self.signal_strength(plume, background);

                let c = &self.config;
                let mut estimate = ProxyEstimate::checked(
                    id,
                    GasSpecies::Co2,
                    EstimateQuantity::Rate {
                        kg_per_hour: flux.co2_kg_per_hour,
                        kg_per_day: flux.co2_kg_per_day,
                    },
                    ConversionFactors::ColumnFlux {
                        zone_area_m2: self.zone_area_m2(),
                        wind_speed_ms: c.wind_speed_ms,
                        molar_weight_kg_mol: c.molar_weight_kg_mol,
                        no2_to_nox: c.no2_to_nox,
                        nox_to_co2: c.nox_to_co2(fuel_type),
                        fuel_type,
                        unit_normalization: c.unit_normalization,
                    },
                )?;
                estimate.precursor_kg_per_hour = Some(flux.nox_kg_per_hour);
                estimate.signal_strength = strength;
                estimate.enhancement_pct = Some(pct);

                debug!(
                    detection = %id,
                    co2_kg_per_hour = flux.co2_kg_per_hour,
                    enhancement_pct = pct,
                    "column enhancement converted"
                );
                Ok(estimate)
            }
            Signal::IntegratedColumn { enhancement_ppm_m } => {
                let enhancement = present(enhancement_ppm_m)
                    .ok_or_else(|| EmissionsFailure::missing_signal(id, "plume enhancement"))?;

                let (area, measured) = match detection.area_km2() {
                    Some(a) => (a, true),
                    None => (self.config.plume_area_km2, false),
                };
                let kg = self.plume_mass_kg(enhancement, area);

                debug!(detection = %id, mass_kg = kg, area_km2 = area, "plume column converted");
                ProxyEstimate::checked(
                    id,
                    GasSpecies::Ch4,
                    EstimateQuantity::Mass { kg },
                    ConversionFactors::PlumeMass {
                        ppm_m_to_kg_per_km2: self.config.ppm_m_to_kg_per_km2,
                        plume_area_km2: area,
                        area_measured: measured,
                    },
                )
            }
        }
    }
}

impl Default for ProxyConverter {
    fn default() -> Self {
        Self::new(ProxyConfig::default(), DetectionThresholds::default())
    }
}
