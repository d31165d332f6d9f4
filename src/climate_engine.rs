// Satellite Emissions Inference & Attribution Engine
// Batch orchestrator: detections -> proxy estimates -> facility matches ->
// discrepancy ratios -> portfolio summary

// ============================================================================
// DATA SOURCE REQUIREMENTS - PIPELINE INPUTS
// ============================================================================
//
// DETECTION BATCH:
// Source: EMIT CH4 plume complexes, TROPOMI NO2 zonal column pairs
// Format: JSON array of `DetectionRecord`
// Variables: lat, lon, signal value (+ background for NO2), plume area,
//            uncertainty, observation time, fuel type
//
// FACILITY CATALOG:
// Source: Climate TRACE assets merged with a manual registry
// Format: JSON array of `FacilityRecord`
// Variables: facility id, name, operator, type label, lat, lon,
//            reported annual emissions (tonnes/year), region
//
// CONFIGURATION:
// Format: TOML (`EngineConfig`), every field defaulted
//
// LIMITATIONS:
// - Single-snapshot detections; recurrence is an analyst assumption
// - Fixed-zone flux proxy, no wind-resolved transport
// - Nearest-facility attribution only, no plume back-trajectory
// - Screening output for prioritization, not regulatory evidence

use std::path::Path;

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

pub mod climate_compliance;
pub mod climate_config;
pub mod climate_discrepancy;
pub mod climate_facility_matcher;
pub mod climate_failures;
pub mod climate_portfolio;
pub mod climate_proxy_converter;
pub mod climate_scenario_logic;
pub mod climate_spatial_index;
pub mod climate_state;

pub use climate_compliance::{ComplianceAssessment, ComplianceRisk, EsgGrade, NetZeroAlignment};
pub use climate_config::{ConfigError, EngineConfig};
pub use climate_discrepancy::{DiscrepancyAnalyzer, DiscrepancyResult, InterpretationBand, RiskLevel};
pub use climate_facility_matcher::{BatchMatchReport, FacilityMatcher, Match};
pub use climate_failures::{EmissionsFailure, RejectedRecord};
pub use climate_portfolio::{PortfolioAggregator, PortfolioRisk, PortfolioSummary, RatioStatistics};
pub use climate_proxy_converter::{EstimateQuantity, ProxyConverter, ProxyEstimate, ZoneGeometry};
pub use climate_scenario_logic::{FrequencyAssumption, FrequencyScenario, ScenarioRatios};
pub use climate_spatial_index::{BoundingBox, DistanceMetric};
pub use climate_state::{
    Detection, DetectionRecord, Facility, FacilityId, FacilityRecord, FacilityType, GeoPoint, Signal,
};

/// Everything a batch run produces. Every input detection is accounted for in
/// exactly one of `results`, `no_estimate`, `unattributed` or `rejected`, except
/// a detection with neither an estimate nor a match, which appears in both
/// `no_estimate` and `unattributed`.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub detections: usize,
    pub estimates: Vec<ProxyEstimate>,
    pub matches: Vec<Match>,
    pub matched_count: usize,
    pub distinct_facilities: usize,
    pub results: Vec<DiscrepancyResult>,
    pub flagged: Vec<DiscrepancyResult>,
    pub assessments: Vec<ComplianceAssessment>,
    pub summary: PortfolioSummary,
    pub rejected: Vec<RejectedRecord>,
    pub no_estimate: Vec<String>,
    pub unattributed: Vec<String>,
}

impl PipelineReport {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serializing pipeline report")
    }
}

pub struct EmissionsEngine {
    config: EngineConfig,
    converter: ProxyConverter,
    matcher: FacilityMatcher,
    analyzer: DiscrepancyAnalyzer,
    aggregator: PortfolioAggregator,
    pool: rayon::ThreadPool,
    catalog_rejected: Vec<RejectedRecord>,
}

impl EmissionsEngine {
    pub fn new(config: EngineConfig, facilities: Vec<Facility>) -> Result<Self> {
        config.validate().context("invalid engine configuration")?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.batch.num_threads)
            .build()
            .context("building worker pool")?;

        let matcher = FacilityMatcher::new(facilities, config.matching.clone());
        let catalog_rejected = matcher.rejected().to_vec();

        info!(
            facilities = matcher.len(),
            threads = config.batch.num_threads,
            assumption = %config.discrepancy.frequency_assumption,
            "emissions engine ready"
        );

        Ok(Self {
            converter: ProxyConverter::new(config.proxy.clone(), config.detection.clone()),
            analyzer: DiscrepancyAnalyzer::new(config.discrepancy.clone()),
            aggregator: PortfolioAggregator::new(),
            matcher,
            pool,
            catalog_rejected,
            config,
        })
    }

    /// Build from raw catalog rows; rows that fail normalization are kept as rejected
    pub fn from_records(config: EngineConfig, records: Vec<FacilityRecord>) -> Result<Self> {
        let mut facilities = Vec::with_capacity(records.len());
        let mut rejected = Vec::new();
        for record in records {
            let record_id = format!("facility {}", record.facility_id);
            match Facility::try_from(record) {
                Ok(f) => facilities.push(f),
                Err(failure) => {
                    warn!(record = %record_id, error = %failure, "facility record rejected");
                    rejected.push(RejectedRecord { record_id, failure });
                }
            }
        }

        let mut engine = Self::new(config, facilities)?;
        rejected.append(&mut engine.catalog_rejected);
        engine.catalog_rejected = rejected;
        Ok(engine)
    }

    /// Load a TOML config and a JSON facility catalog from disk
    pub fn from_files(config_path: &Path, catalog_path: &Path) -> Result<Self> {
        let config = EngineConfig::load_from_file(config_path)
            .with_context(|| format!("loading config {}", config_path.display()))?;
        let text = std::fs::read_to_string(catalog_path)
            .with_context(|| format!("reading facility catalog {}", catalog_path.display()))?;
        let records: Vec<FacilityRecord> = serde_json::from_str(&text)
            .with_context(|| format!("parsing facility catalog {}", catalog_path.display()))?;
        Self::from_records(config, records)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn converter(&self) -> &ProxyConverter {
        &self.converter
    }

    pub fn matcher(&self) -> &FacilityMatcher {
        &self.matcher
    }

    pub fn analyzer(&self) -> &DiscrepancyAnalyzer {
        &self.analyzer
    }

    /// Catalog rows dropped while building the engine
    pub fn catalog_rejected(&self) -> &[RejectedRecord] {
        &self.catalog_rejected
    }

    /// Normalize raw detection rows, then run the pipeline. Rows that fail
    /// normalization are reported as rejected.
    pub fn process_records(&self, records: Vec<DetectionRecord>) -> PipelineReport {
        let mut detections = Vec::with_capacity(records.len());
        let mut rejected = Vec::new();
        for (index, record) in records.into_iter().enumerate() {
            let record_id = record.id.clone().unwrap_or_else(|| format!("detection-{}", index));
            match record.into_detection(index) {
                Ok(d) => detections.push(d),
                Err(failure) => {
                    warn!(record = %record_id, error = %failure, "detection record rejected");
                    rejected.push(RejectedRecord { record_id, failure });
                }
            }
        }

        let mut report = self.process(&detections);
        report.detections += rejected.len();
        rejected.append(&mut report.rejected);
        report.rejected = rejected;
        report
    }

    pub fn process(&self, detections: &[Detection]) -> PipelineReport {
        info!(detections = detections.len(), "processing detection batch");

        let (converted, outcomes) = self.pool.install(|| {
            let converted: Vec<Result<ProxyEstimate, EmissionsFailure>> =
                detections.par_iter().map(|d| self.converter.convert(d)).collect();
            (converted, self.matcher.match_all(detections))
        });

        let mut estimates = Vec::new();
        let mut attributed = Vec::with_capacity(detections.len());
        let mut results = Vec::new();
        let mut rejected = Vec::new();
        let mut no_estimate = Vec::new();

        for ((detection, estimate), matched) in detections.iter().zip(converted).zip(outcomes) {
            let id = detection.id();
            let estimate = match estimate {
                Ok(e) => Some(e),
                Err(failure) if failure.is_missing_signal() => {
                    debug!(detection = %id, error = %failure, "no estimate");
                    no_estimate.push(id.to_string());
                    None
                }
                Err(failure) => {
                    warn!(detection = %id, error = %failure, "detection rejected");
                    rejected.push(RejectedRecord { record_id: id.to_string(), failure });
                    continue;
                }
            };

            if let (Some(e), Some(m)) = (&estimate, &matched) {
                match self.analyzer.analyze(e, m) {
                    Ok(result) => results.push(result),
                    Err(failure) => {
                        warn!(detection = %id, error = %failure, "discrepancy rejected");
                        rejected.push(RejectedRecord { record_id: id.to_string(), failure });
                    }
                }
            }
            estimates.extend(estimate);
            attributed.push((detection, matched));
        }

        let BatchMatchReport {
            matches,
            matched_count,
            distinct_facilities,
            unattributed,
        } = BatchMatchReport::collate(attributed);
        let flagged = self.analyzer.flag_potential_violators(&results);
        let assessments = results.iter().map(ComplianceAssessment::from_result).collect();
        let summary = self.aggregator.summarize(&results);

        info!(
            detections = detections.len(),
            estimated = estimates.len(),
            matched = matched_count,
            distinct_facilities,
            flagged = flagged.len(),
            no_estimate = no_estimate.len(),
            unattributed = unattributed.len(),
            "batch complete"
        );

        PipelineReport {
            detections: detections.len(),
            estimates,
            matches,
            matched_count,
            distinct_facilities,
            results,
            flagged,
            assessments,
            summary,
            rejected,
            no_estimate,
            unattributed,
        }
    }
}
