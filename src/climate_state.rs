// Emissions inference records
// Typed values shared by every pipeline stage, plus the raw input records and the
// single place where their defaults are applied

// ============================================================================
// DATA SOURCE REQUIREMENTS - DETECTION & FACILITY RECORDS
// ============================================================================
//
// METHANE PLUME DETECTIONS:
// Source: NASA EMIT L2B CH4 plume complexes
// Instrument: EMIT imaging spectrometer (ISS)
// Spatiotemporal Resolution: ~60 m, opportunistic overpasses
// File Format: GeoTIFF rasters + GeoJSON plume outlines
// Variables: CH4 integrated enhancement (ppm·m), retrieval uncertainty
//
// NO2 COLUMN OBSERVATIONS:
// Source: Sentinel-5P TROPOMI OFFL L3 NO2
// Instrument: TROPOMI push-broom spectrometer
// Spatiotemporal Resolution: 5.5 km × 3.5 km, daily
// Variables: tropospheric_NO2_column_number_density (mol/m²)
//
// FACILITY CATALOG:
// Source: Climate TRACE asset inventory, manual facility registry
// Variables: facility id, name, operator, sector, coordinates,
//            reported annual emissions (tonnes/year), region
//
// The acquisition and catalog clients live outside this crate. They hand over
// `DetectionRecord` / `FacilityRecord` values, which are normalized here.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::climate_failures::{check_range, EmissionsFailure};

// ---
// Geography and time
// ---

/// A WGS84 position in decimal degrees. Deserialization goes through the same
/// bounds check as `new`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGeoPoint")]
pub struct GeoPoint {
    lat: f64,
    lon: f64,
}

#[derive(Deserialize)]
struct RawGeoPoint {
    lat: f64,
    lon: f64,
}

impl TryFrom<RawGeoPoint> for GeoPoint {
    type Error = EmissionsFailure;

    fn try_from(raw: RawGeoPoint) -> Result<Self, Self::Error> {
        Self::new(raw.lat, raw.lon)
    }
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Result<Self, EmissionsFailure> {
        check_range("lat", lat, -90.0, 90.0)?;
        check_range("lon", lon, -180.0, 180.0)?;
        Ok(Self { lat, lon })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4})", self.lat, self.lon)
    }
}

/// When a detection was observed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObservationWindow {
    Unknown,
    Instant { at: DateTime<Utc> },
    Range { start: DateTime<Utc>, end: DateTime<Utc> },
}

impl ObservationWindow {
    pub fn range(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, EmissionsFailure> {
        if end < start {
            return Err(EmissionsFailure::invalid_record(
                "observation window",
                format!("end {} precedes start {}", end, start),
            ));
        }
        Ok(Self::Range { start, end })
    }

    pub fn midpoint(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Unknown => None,
            Self::Instant { at } => Some(*at),
            Self::Range { start, end } => Some(*start + (*end - *start) / 2),
        }
    }
}

// ---
// Physical signal
// ---

/// Raw remote-sensing signal attached to a detection. Absent values stay `None`;
/// they are never replaced with zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Signal {
    /// Tropospheric NO2 column over the downwind zone and the upwind background (mol/m²)
    ColumnEnhancement {
        plume_mol_m2: Option<f64>,
        background_mol_m2: Option<f64>,
    },
    /// CH4 integrated plume column (ppm·m)
    IntegratedColumn { enhancement_ppm_m: Option<f64> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    ColumnEnhancement,
    IntegratedColumn,
}

impl FromStr for SignalType {
    type Err = EmissionsFailure;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "column_enhancement" | "no2_column" | "tropomi_no2" => Ok(Self::ColumnEnhancement),
            "integrated_column" | "ch4_ppm_m" | "emit_ch4" => Ok(Self::IntegratedColumn),
            other => Err(EmissionsFailure::invalid_record(
                "signal_type",
                format!("unknown signal type '{}'", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FuelType {
    #[default]
    Coal,
    Gas,
}

impl FromStr for FuelType {
    type Err = EmissionsFailure;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coal" | "lignite" => Ok(Self::Coal),
            "gas" | "natural gas" | "natural_gas" => Ok(Self::Gas),
            other => Err(EmissionsFailure::invalid_record(
                "fuel_type",
                format!("unknown fuel type '{}'", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GasSpecies {
    Ch4,
    Co2,
}

/// Qualitative strength of a column enhancement relative to its background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalStrength {
    High,
    Medium,
    Low,
    None,
    NotApplicable,
}

// ---
// Detection
// ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    id: String,
    location: GeoPoint,
    window: ObservationWindow,
    signal: Signal,
    area_km2: Option<f64>,      // measured plume extent
    uncertainty: Option<f64>,   // same units as the signal
    fuel_type: Option<FuelType>,
    source: Option<String>,
}

impl Detection {
    pub fn new(id: impl Into<String>, location: GeoPoint, signal: Signal) -> Self {
        Self {
            id: id.into(),
            location,
            window: ObservationWindow::Unknown,
            signal,
            area_km2: None,
            uncertainty: None,
            fuel_type: None,
            source: None,
        }
    }

    pub fn with_window(mut self, window: ObservationWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_area(mut self, area_km2: f64) -> Result<Self, EmissionsFailure> {
        if !area_km2.is_finite() || area_km2 <= 0.0 {
            return Err(EmissionsFailure::invalid_record(
                &self.id,
                format!("plume area must be positive, got {}", area_km2),
            ));
        }
        self.area_km2 = Some(area_km2);
        Ok(self)
    }

    pub fn with_uncertainty(mut self, uncertainty: f64) -> Result<Self, EmissionsFailure> {
        check_range("uncertainty", uncertainty, 0.0, f64::MAX)?;
        self.uncertainty = Some(uncertainty);
        Ok(self)
    }

    pub fn with_fuel_type(mut self, fuel_type: FuelType) -> Self {
        self.fuel_type = Some(fuel_type);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn location(&self) -> GeoPoint {
        self.location
    }

    pub fn window(&self) -> ObservationWindow {
        self.window
    }

    pub fn signal(&self) -> Signal {
        self.signal
    }

    pub fn area_km2(&self) -> Option<f64> {
        self.area_km2
    }

    pub fn uncertainty(&self) -> Option<f64> {
        self.uncertainty
    }

    pub fn fuel_type(&self) -> Option<FuelType> {
        self.fuel_type
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }
}

// ---
// Facility
// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FacilityId(pub u64);

impl fmt::Display for FacilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacilityType {
    Extraction,
    Refining,
    Processing,
    Terminal,
    ThermalGeneration,
    Other,
}

impl FacilityType {
    /// Classify a free-text catalog label by whole words. Specific secondary
    /// categories are checked before the broad oil/gas extraction keywords, so
    /// "Oil Refinery" is refining and "LNG Terminal" is a terminal. A key ending
    /// in `*` matches any word with that stem.
    pub fn from_label(label: &str) -> Self {
        let label = label.to_ascii_lowercase();
        let words: Vec<&str> = label
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let has = |keys: &[&str]| {
            keys.iter().any(|k| match k.strip_suffix('*') {
                Some(stem) => words.iter().any(|w| w.starts_with(stem)),
                None => words.contains(k),
            })
        };

        if has(&["thermal", "power", "stps", "electricity"]) {
            Self::ThermalGeneration
        } else if has(&["lng", "terminal*", "storage", "port", "ports"]) {
            Self::Terminal
        } else if has(&["refin*"]) {
            Self::Refining
        } else if has(&["processing", "petrochemical*", "fertili*"]) {
            Self::Processing
        } else if has(&["oil", "gas", "extraction", "pipeline*", "field*", "well*", "production", "mine*", "mining"]) {
            Self::Extraction
        } else {
            Self::Other
        }
    }
}

impl fmt::Display for FacilityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Extraction => "extraction",
            Self::Refining => "refining",
            Self::Processing => "processing",
            Self::Terminal => "terminal",
            Self::ThermalGeneration => "thermal-generation",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Facility {
    id: FacilityId,
    name: String,
    operator: String,
    facility_type: FacilityType,
    location: GeoPoint,
    reported_annual_tons: f64,  // self-reported, tonnes/year
    region: Option<String>,
}

impl Facility {
    pub fn new(
        id: u64,
        name: impl Into<String>,
        operator: impl Into<String>,
        facility_type: FacilityType,
        location: GeoPoint,
        reported_annual_tons: f64,
    ) -> Result<Self, EmissionsFailure> {
        check_range("reported_annual_tons", reported_annual_tons, 0.0, f64::MAX)?;
        Ok(Self {
            id: FacilityId(id),
            name: name.into(),
            operator: operator.into(),
            facility_type,
            location,
            reported_annual_tons,
            region: None,
        })
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn id(&self) -> FacilityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn operator(&self) -> &str {
        &self.operator
    }

    pub fn facility_type(&self) -> FacilityType {
        self.facility_type
    }

    pub fn location(&self) -> GeoPoint {
        self.location
    }

    pub fn reported_annual_tons(&self) -> f64 {
        self.reported_annual_tons
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }
}

// ---
// Raw input records (external collaborator boundary)
// ---

fn default_signal_type() -> String {
    "integrated_column".to_string()
}

/// One row handed over by the acquisition collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub lat: f64,
    pub lon: f64,
    /// Plume column (column enhancement) or ppm·m enhancement (integrated column)
    #[serde(default)]
    pub signal_value: Option<f64>,
    #[serde(default = "default_signal_type")]
    pub signal_type: String,
    /// Upwind background column, column-enhancement detections only
    #[serde(default)]
    pub background_value: Option<f64>,
    #[serde(default)]
    pub area_km2: Option<f64>,
    #[serde(default)]
    pub uncertainty: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub window_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fuel_type: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl DetectionRecord {
    /// Normalize into a typed detection. `index` names records that carry no id.
    pub fn into_detection(self, index: usize) -> Result<Detection, EmissionsFailure> {
        let id = self.id.clone().unwrap_or_else(|| format!("detection-{}", index));
        let location = GeoPoint::new(self.lat, self.lon)
            .map_err(|e| EmissionsFailure::invalid_record(&id, e.to_string()))?;

        let signal = match self.signal_type.parse::<SignalType>()? {
            SignalType::ColumnEnhancement => Signal::ColumnEnhancement {
                plume_mol_m2: self.signal_value,
                background_mol_m2: self.background_value,
            },
            SignalType::IntegratedColumn => Signal::IntegratedColumn {
                enhancement_ppm_m: self.signal_value,
            },
        };

        let window = match (self.timestamp, self.window_end) {
            (Some(start), Some(end)) => ObservationWindow::range(start, end)
                .map_err(|e| EmissionsFailure::invalid_record(&id, e.to_string()))?,
            (Some(at), None) | (None, Some(at)) => ObservationWindow::Instant { at },
            (None, None) => ObservationWindow::Unknown,
        };

        let mut detection = Detection::new(id, location, signal).with_window(window);
        if let Some(area) = self.area_km2 {
            detection = detection.with_area(area)?;
        }
        if let Some(uncertainty) = self.uncertainty {
            detection = detection.with_uncertainty(uncertainty)?;
        }
        if let Some(fuel) = self.fuel_type.as_deref() {
            detection = detection.with_fuel_type(fuel.parse()?);
        }
        if let Some(source) = self.source {
            detection = detection.with_source(source);
        }
        Ok(detection)
    }
}

/// One catalog row handed over by the facility-registry collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityRecord {
    pub facility_id: u64,
    pub facility_name: String,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub facility_type: Option<String>,
    pub lat: f64,
    pub lon: f64,
    #[serde(default, alias = "reported_emissions_tons")]
    pub reported_emissions_tons_year: Option<f64>,
    #[serde(default)]
    pub region: Option<String>,
}

impl TryFrom<FacilityRecord> for Facility {
    type Error = EmissionsFailure;

    fn try_from(record: FacilityRecord) -> Result<Self, Self::Error> {
        let label = format!("facility {}", record.facility_id);
        let location = GeoPoint::new(record.lat, record.lon)
            .map_err(|e| EmissionsFailure::invalid_record(&label, e.to_string()))?;
        let facility_type = record
            .facility_type
            .as_deref()
            .map(FacilityType::from_label)
            .unwrap_or(FacilityType::Other);

        // An absent figure is an unreported baseline, handled downstream
        let reported = record.reported_emissions_tons_year.unwrap_or(0.0);

        let facility = Facility::new(
            record.facility_id,
            record.facility_name,
            record.operator.unwrap_or_else(|| "Unknown".to_string()),
            facility_type,
            location,
            reported,
        )
        .map_err(|e| EmissionsFailure::invalid_record(&label, e.to_string()))?;

        Ok(match record.region {
            Some(region) => facility.with_region(region),
            None => facility,
        })
    }
}
