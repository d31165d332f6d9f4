// End-to-end runs of the emissions pipeline over small Gujarat / Barents-region batches

use std::io::Write;

use approx::assert_relative_eq;
use climate_emissions::climate_compliance::METHODOLOGY_CAVEATS;
use climate_emissions::climate_proxy_converter::ConversionFactors;
use climate_emissions::{
    ComplianceRisk, Detection, DetectionRecord, EmissionsEngine, EngineConfig, EsgGrade, FacilityRecord,
    FrequencyAssumption, GeoPoint, InterpretationBand, NetZeroAlignment, PortfolioRisk, RiskLevel, Signal,
};

fn config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.batch.num_threads = 2;
    config
}

fn catalog_records() -> Vec<FacilityRecord> {
    serde_json::from_str(
        r#"[
            {"facility_id": 101, "facility_name": "Mehsana Oil Field", "operator": "ONGC",
             "facility_type": "Oil Field", "lat": 22.3527, "lon": 69.87,
             "reported_emissions_tons_year": 8900},
            {"facility_id": 102, "facility_name": "Hazira LNG Terminal", "operator": "Shell",
             "facility_type": "LNG Terminal", "lat": 21.16, "lon": 72.66,
             "reported_emissions_tons_year": 0.05},
            {"facility_id": 103, "facility_name": "Koyali Refinery", "operator": "IOCL",
             "facility_type": "Refinery", "lat": 22.37, "lon": 73.12,
             "reported_emissions_tons_year": 0},
            {"facility_id": 104, "facility_name": "Vindhyachal STPS", "operator": "NTPC",
             "facility_type": "Thermal Power", "lat": 24.1, "lon": 82.67,
             "reported_emissions_tons_year": 95000000}
        ]"#,
    )
    .unwrap()
}

fn engine() -> EmissionsEngine {
    EmissionsEngine::from_records(config(), catalog_records()).unwrap()
}

fn plume(id: &str, lat: f64, lon: f64, ppm_m: f64) -> Detection {
    Detection::new(
        id,
        GeoPoint::new(lat, lon).unwrap(),
        Signal::IntegratedColumn { enhancement_ppm_m: Some(ppm_m) },
    )
}

#[test]
fn test_reference_plume_within_reported_range() {
    let report = engine().process(&[plume("emit-620", 22.35, 69.87, 620.0)]);

    assert_eq!(report.results.len(), 1);
    let result = &report.results[0];
    assert_eq!(result.facility_name(), "Mehsana Oil Field");
    assert_relative_eq!(result.estimate_kg(), 446.4, epsilon = 1e-9);
    assert_relative_eq!(result.distance_km(), 0.3, epsilon = 1e-3);
    assert_relative_eq!(result.confidence(), 1.0);
    assert_eq!(result.assumption(), FrequencyAssumption::Moderate);
    assert_relative_eq!(result.primary_ratio(), 0.0006, epsilon = 1e-4);
    assert_eq!(result.interpretation(), InterpretationBand::WithinReported);
    assert!(result.flag().is_none());
    assert!(report.flagged.is_empty());

    let assessment = &report.assessments[0];
    assert_eq!(assessment.grade, EsgGrade::A);
    assert_eq!(assessment.grade_level, "excellent");
    assert_eq!(assessment.net_zero, NetZeroAlignment::Aligned);
    assert_eq!(assessment.compliance_risk, ComplianceRisk::Low);
    assert_eq!(
        assessment.potential_actions,
        &["Continue current monitoring practices", "Consider third-party verification for ESG ratings"][..]
    );
    assert_eq!(assessment.caveats, &METHODOLOGY_CAVEATS[..]);
    assert!(assessment.caveats.contains(&"This is a screening tool, not regulatory evidence"));
}

#[test]
fn test_demo_batch() {
    let detections = vec![
        plume("plume-1", 25.95, 71.51, 450.0),
        plume("plume-2", 22.35, 69.87, 620.0),
        plume("plume-3", 21.16, 72.66, 380.0),
    ];
    let report = engine().process(&detections);

    assert_eq!(report.unattributed, vec!["plume-1".to_string()]);
    assert_eq!(report.results.len(), 2);
    assert_eq!(report.distinct_facilities, 2);

    // 273.6 kg × 12 against a 50 kg report
    let hazira = report.results.iter().find(|r| r.detection_id() == "plume-3").unwrap();
    assert_relative_eq!(hazira.primary_ratio(), 273.6 * 12.0 / 50.0, epsilon = 1e-9);
    assert_eq!(hazira.flag(), Some(RiskLevel::High));
    assert_eq!(report.flagged.len(), 1);

    assert_eq!(report.summary.count, 2);
    assert_eq!(report.summary.above_10x, 1);
    assert_eq!(report.summary.risk_level, PortfolioRisk::High);
}

#[test]
fn test_zero_baseline_gives_large_finite_ratio() {
    let report = engine().process(&[plume("koyali", 22.37, 73.12, 100.0)]);
    let result = &report.results[0];

    assert!(result.baseline_substituted());
    assert_eq!(result.reported_annual_kg(), 1.0);
    assert!(result.primary_ratio().is_finite());
    assert!(result.primary_ratio() > 100.0);
    assert_eq!(result.interpretation(), InterpretationBand::Critical);
}

#[test]
fn test_oversized_estimate_keeps_portfolio_finite() {
    let detections = vec![
        plume("koyali-huge", 22.37, 73.12, 1e306),
        plume("emit-620", 22.35, 69.87, 620.0),
    ];
    let report = engine().process(&detections);

    assert_eq!(report.results.len(), 2);
    let huge = report.results.iter().find(|r| r.detection_id() == "koyali-huge").unwrap();
    assert!(huge.ratios().iter().all(|(_, r)| r.is_finite()));

    let stats = report.summary.statistics.unwrap();
    assert!(stats.mean.is_finite());
    assert!(stats.std.is_finite());
    assert!(report.to_json().is_ok());
}

#[test]
fn test_column_enhancement_detection() {
    let records: Vec<DetectionRecord> = serde_json::from_str(
        r#"[
            {"id": "tropomi-vindhyachal", "lat": 24.1, "lon": 82.67,
             "signal_type": "tropomi_no2", "signal_value": 0.000150,
             "background_value": 0.000100, "fuel_type": "coal",
             "timestamp": "2024-11-02T08:30:00Z"},
            {"id": "tropomi-missing-bg", "lat": 24.1, "lon": 82.67,
             "signal_type": "no2_column", "signal_value": 0.000150}
        ]"#,
    )
    .unwrap();

    let report = engine().process_records(records);
    assert_eq!(report.no_estimate, vec!["tropomi-missing-bg".to_string()]);
    assert_eq!(report.results.len(), 1);

    let estimate = &report.estimates[0];
    assert!(matches!(
        estimate.factors(),
        ConversionFactors::ColumnFlux { nox_to_co2, .. } if *nox_to_co2 == 217.0
    ));
    assert_relative_eq!(estimate.enhancement_pct().unwrap(), 50.0, epsilon = 1e-9);

    // 0.00005 mol/m² over a 30 km zone: NOx kg/h, then coal CO2 for one day
    let co2_kg_per_day = 0.00005 * 9.0e8 * 5.0 * 0.046 * 1.32 * 3600.0 / 1e6 * 217.0 * 24.0;
    assert_relative_eq!(co2_kg_per_day, 256_146.1056, epsilon = 1e-6);
    assert_relative_eq!(estimate.event_mass_kg(), co2_kg_per_day, max_relative = 1e-9);

    let result = &report.results[0];
    assert_eq!(result.facility_name(), "Vindhyachal STPS");
    assert_relative_eq!(result.confidence(), 1.0);
    assert_eq!(result.reported_annual_kg(), 9.5e10);
    assert_relative_eq!(result.estimate_kg(), co2_kg_per_day, max_relative = 1e-9);
    assert_relative_eq!(result.primary_ratio(), co2_kg_per_day * 12.0 / 9.5e10, max_relative = 1e-9);
    assert_relative_eq!(result.ratios().daily, co2_kg_per_day * 365.0 / 9.5e10, max_relative = 1e-9);
    assert_eq!(result.interpretation(), InterpretationBand::WithinReported);
    assert!(result.observed_at().is_some());
}

#[test]
fn test_aggressive_assumption_from_toml() {
    let config = EngineConfig::from_toml_str(
        r#"
        [discrepancy]
        frequency_assumption = "aggressive"
        flag_ratio_threshold = 5.0

        [batch]
        num_threads = 1
        "#,
    )
    .unwrap();
    let engine = EmissionsEngine::from_records(config, catalog_records()).unwrap();

    let report = engine.process(&[plume("emit-620", 22.35, 69.87, 620.0)]);
    let result = &report.results[0];
    assert_eq!(result.assumption(), FrequencyAssumption::Aggressive);
    assert_relative_eq!(result.primary_ratio(), 446.4 * 52.0 / 8.9e6, epsilon = 1e-12);
}

#[test]
fn test_engine_from_files() {
    let mut config_file = tempfile::NamedTempFile::new().unwrap();
    writeln!(config_file, "[matching]\nmax_match_radius_km = 2.0\n\n[batch]\nnum_threads = 1").unwrap();

    let mut catalog_file = tempfile::NamedTempFile::new().unwrap();
    write!(catalog_file, "{}", serde_json::to_string(&catalog_records()).unwrap()).unwrap();

    let engine = EmissionsEngine::from_files(config_file.path(), catalog_file.path()).unwrap();
    assert_eq!(engine.config().matching.max_match_radius_km, 2.0);
    assert_eq!(engine.matcher().len(), 4);

    let missing = EmissionsEngine::from_files(config_file.path(), std::path::Path::new("/nonexistent/catalog.json"));
    let message = format!("{:#}", missing.err().unwrap());
    assert!(message.contains("reading facility catalog"));
}

#[test]
fn test_report_serializes() {
    let report = engine().process(&[plume("emit-620", 22.35, 69.87, 620.0)]);
    let json = report.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(value["results"][0]["interpretation"], "within_reported");
    assert_eq!(value["summary"]["risk_level"], "LOW");
    assert_eq!(value["estimates"][0]["quantity"]["kind"], "mass");
}
