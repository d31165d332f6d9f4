// Discrepancy between satellite-inferred and self-reported emissions
//
// ratio(f) = event mass (kg) × f / reported annual mass (kg), f ∈ {1, 12, 52, 365}
//
// The primary ratio is chosen by the frequency assumption and drives both the
// interpretation band and the flag. Thresholds follow the screening bands used
// for methane super-emitter triage:
//   < 1.0       within reported range
//   [1.0, 1.5)  marginal, inside measurement uncertainty
//   [1.5, 3.0)  moderate
//   [3.0, 10)   severe
//   ≥ 10        critical
//
// A zero reported baseline is replaced by 1 kg, and ratios saturate at f64::MAX,
// so every ratio stays finite.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::climate_config::DiscrepancyConfig;
use crate::climate_facility_matcher::Match;
use crate::climate_failures::{check_range, EmissionsFailure};
use crate::climate_proxy_converter::ProxyEstimate;
use crate::climate_scenario_logic::{FrequencyAssumption, ScenarioRatios};
use crate::climate_state::{FacilityId, FacilityType, GasSpecies};

const KG_PER_TONNE: f64 = 1000.0;
const SUBSTITUTE_BASELINE_KG: f64 = 1.0;  // stands in for an unreported baseline

const MARGINAL_RATIO: f64 = 1.0;
const MODERATE_RATIO: f64 = 1.5;
const SEVERE_RATIO: f64 = 3.0;
const CRITICAL_RATIO: f64 = 10.0;

const MEDIUM_RISK_RATIO: f64 = 5.0;
const HIGH_RISK_RATIO: f64 = 10.0;

// ---
// Classification
// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpretationBand {
    WithinReported,
    Marginal,
    Moderate,
    Severe,
    Critical,
}

impl InterpretationBand {
    pub fn classify(ratio: f64) -> Self {
        if ratio < MARGINAL_RATIO {
            Self::WithinReported
        } else if ratio < MODERATE_RATIO {
            Self::Marginal
        } else if ratio < SEVERE_RATIO {
            Self::Moderate
        } else if ratio < CRITICAL_RATIO {
            Self::Severe
        } else {
            Self::Critical
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::WithinReported => "Detection within reported range - appears accurate",
            Self::Marginal => "Marginal discrepancy - likely within measurement uncertainty",
            Self::Moderate => "Moderate discrepancy - possible underreporting",
            Self::Severe => "Severe discrepancy - significant underreporting indicated",
            Self::Critical => "Critical discrepancy - major underreporting or data quality issue",
        }
    }
}

impl fmt::Display for InterpretationBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Risk level attached to a flagged result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio >= HIGH_RISK_RATIO {
            Self::High
        } else if ratio >= MEDIUM_RISK_RATIO {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

// ---
// Result
// ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscrepancyResult {
    detection_id: String,
    facility_id: FacilityId,
    facility_name: String,
    operator: String,
    facility_type: FacilityType,
    species: GasSpecies,
    /// Per-event mass the ratios are built from (kg)
    estimate_kg: f64,
    reported_annual_tons: f64,
    /// Baseline actually divided by, after substitution (kg)
    reported_annual_kg: f64,
    baseline_substituted: bool,
    assumption: FrequencyAssumption,
    ratios: ScenarioRatios,
    primary_ratio: f64,
    interpretation: InterpretationBand,
    distance_km: f64,
    confidence: f64,
    flag: Option<RiskLevel>,
    observed_at: Option<DateTime<Utc>>,
}

impl DiscrepancyResult {
    /// Checked constructor. Every scenario ratio must be finite and non-negative,
    /// the baseline positive and the match confidence within [0, 1]. The primary
    /// ratio, interpretation and flag are derived here.
    pub fn new(
        estimate: &ProxyEstimate,
        matched: &Match,
        baseline: (f64, bool),
        assumption: FrequencyAssumption,
        ratios: ScenarioRatios,
        flag_ratio_threshold: f64,
    ) -> Result<Self, EmissionsFailure> {
        let (baseline_kg, substituted) = baseline;
        for (scenario, ratio) in ratios.iter() {
            check_range(&format!("{} ratio", scenario), ratio, 0.0, f64::MAX)?;
        }
        check_range("reported_annual_kg", baseline_kg, f64::MIN_POSITIVE, f64::MAX)?;
        check_range("estimate_kg", estimate.event_mass_kg(), 0.0, f64::MAX)?;
        check_range("confidence", matched.confidence(), 0.0, 1.0)?;

        let primary_ratio = ratios.primary(assumption);
        let flag = (primary_ratio >= flag_ratio_threshold).then(|| RiskLevel::from_ratio(primary_ratio));

        Ok(Self {
            detection_id: estimate.detection_id().to_string(),
            facility_id: matched.facility_id(),
            facility_name: matched.facility_name().to_string(),
            operator: matched.operator().to_string(),
            facility_type: matched.facility_type(),
            species: estimate.species(),
            estimate_kg: estimate.event_mass_kg(),
            reported_annual_tons: matched.reported_annual_tons(),
            reported_annual_kg: baseline_kg,
            baseline_substituted: substituted,
            assumption,
            ratios,
            primary_ratio,
            interpretation: InterpretationBand::classify(primary_ratio),
            distance_km: matched.distance_km(),
            confidence: matched.confidence(),
            flag,
            observed_at: estimate.observed_at(),
        })
    }

    pub fn detection_id(&self) -> &str {
        &self.detection_id
    }

    pub fn facility_id(&self) -> FacilityId {
        self.facility_id
    }

    pub fn facility_name(&self) -> &str {
        &self.facility_name
    }

    pub fn operator(&self) -> &str {
        &self.operator
    }

    pub fn facility_type(&self) -> FacilityType {
        self.facility_type
    }

    pub fn species(&self) -> GasSpecies {
        self.species
    }

    pub fn estimate_kg(&self) -> f64 {
        self.estimate_kg
    }

    pub fn reported_annual_tons(&self) -> f64 {
        self.reported_annual_tons
    }

    pub fn reported_annual_kg(&self) -> f64 {
        self.reported_annual_kg
    }

    pub fn baseline_substituted(&self) -> bool {
        self.baseline_substituted
    }

    pub fn assumption(&self) -> FrequencyAssumption {
        self.assumption
    }

    pub fn ratios(&self) -> ScenarioRatios {
        self.ratios
    }

    pub fn primary_ratio(&self) -> f64 {
        self.primary_ratio
    }

    pub fn interpretation(&self) -> InterpretationBand {
        self.interpretation
    }

    pub fn distance_km(&self) -> f64 {
        self.distance_km
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn flag(&self) -> Option<RiskLevel> {
        self.flag
    }

    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        self.observed_at
    }

    pub fn is_flagged(&self) -> bool {
        self.flag.is_some()
    }
}

// ---
// Analyzer
// ---

#[derive(Debug, Clone, Default)]
pub struct DiscrepancyAnalyzer {
    config: DiscrepancyConfig,
}

impl DiscrepancyAnalyzer {
    pub fn new(config: DiscrepancyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DiscrepancyConfig {
        &self.config
    }

    /// Annual baseline in kg, substituting 1 kg for a zero report
    pub fn baseline_kg(reported_annual_tons: f64) -> (f64, bool) {
        let kg = reported_annual_tons * KG_PER_TONNE;
        if kg > 0.0 {
            (kg, false)
        } else {
            (SUBSTITUTE_BASELINE_KG, true)
        }
    }

    pub fn analyze(&self, estimate: &ProxyEstimate, matched: &Match) -> Result<DiscrepancyResult, EmissionsFailure> {
        self.analyze_with(estimate, matched, self.config.frequency_assumption)
    }

    /// Analyze under an explicit assumption instead of the configured one
    pub fn analyze_with(
        &self,
        estimate: &ProxyEstimate,
        matched: &Match,
        assumption: FrequencyAssumption,
    ) -> Result<DiscrepancyResult, EmissionsFailure> {
        let baseline = Self::baseline_kg(matched.reported_annual_tons());
        if baseline.1 {
            debug!(
                facility = %matched.facility_id(),
                "reported emissions are zero, substituting 1 kg baseline"
            );
        }

        let ratios = ScenarioRatios::compute(estimate.event_mass_kg(), baseline.0);
        DiscrepancyResult::new(estimate, matched, baseline, assumption, ratios, self.config.flag_ratio_threshold)
    }

    /// Flagged results only, highest primary ratio first
    pub fn flag_potential_violators(&self, results: &[DiscrepancyResult]) -> Vec<DiscrepancyResult> {
        let mut flagged: Vec<DiscrepancyResult> = results.iter().filter(|r| r.is_flagged()).cloned().collect();
        flagged.sort_by(|a, b| b.primary_ratio.partial_cmp(&a.primary_ratio).unwrap_or(Ordering::Equal));

        info!(
            flagged = flagged.len(),
            threshold = self.config.flag_ratio_threshold,
            "facilities flagged for potential underreporting"
        );
        flagged
    }
}
