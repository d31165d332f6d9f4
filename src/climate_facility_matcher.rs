// Facility attribution for detections
// Nearest catalogued facility within a fixed radius, with a tiered confidence score
//
// Confidence = distance tier × facility-type tier, capped at 1.0.
// Only the nearest facility is attributed; other facilities inside the radius are
// counted so downstream review can see contested attributions.

use std::collections::{BTreeSet, HashSet};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::climate_config::MatchingConfig;
use crate::climate_failures::{check_range, EmissionsFailure, RejectedRecord};
use crate::climate_spatial_index::{BoundingBox, SpatialIndex};
use crate::climate_state::{Detection, Facility, FacilityId, FacilityType, GeoPoint};

// ---
// Match
// ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    detection_id: String,
    facility_id: FacilityId,
    facility_name: String,
    operator: String,
    facility_type: FacilityType,
    facility_location: GeoPoint,
    distance_km: f64,
    confidence: f64,
    reported_annual_tons: f64,
    /// Other facilities inside the match radius
    competing_candidates: usize,
}

impl Match {
    pub fn new(
        detection_id: &str,
        facility: &Facility,
        distance_km: f64,
        confidence: f64,
    ) -> Result<Self, EmissionsFailure> {
        check_range("distance_km", distance_km, 0.0, f64::MAX)?;
        check_range("confidence", confidence, 0.0, 1.0)?;
        Ok(Self {
            detection_id: detection_id.to_string(),
            facility_id: facility.id(),
            facility_name: facility.name().to_string(),
            operator: facility.operator().to_string(),
            facility_type: facility.facility_type(),
            facility_location: facility.location(),
            distance_km,
            confidence,
            reported_annual_tons: facility.reported_annual_tons(),
            competing_candidates: 0,
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

    pub fn facility_location(&self) -> GeoPoint {
        self.facility_location
    }

    pub fn distance_km(&self) -> f64 {
        self.distance_km
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn reported_annual_tons(&self) -> f64 {
        self.reported_annual_tons
    }

    pub fn competing_candidates(&self) -> usize {
        self.competing_candidates
    }
}

/// Outcome of matching a batch of detections
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchMatchReport {
    pub matches: Vec<Match>,
    pub matched_count: usize,
    pub distinct_facilities: usize,
    pub unattributed: Vec<String>,
}

impl BatchMatchReport {
    /// Gather per-detection outcomes; order is preserved
    pub fn collate<'a, I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = (&'a Detection, Option<Match>)>,
    {
        let mut matches = Vec::new();
        let mut unattributed = Vec::new();
        for (detection, outcome) in outcomes {
            match outcome {
                Some(m) => matches.push(m),
                None => unattributed.push(detection.id().to_string()),
            }
        }

        let distinct_facilities = matches
            .iter()
            .map(|m| m.facility_id)
            .collect::<BTreeSet<_>>()
            .len();
        Self {
            matched_count: matches.len(),
            distinct_facilities,
            matches,
            unattributed,
        }
    }
}

// ---
// Matcher
// ---

pub struct FacilityMatcher {
    config: MatchingConfig,
    facilities: Vec<Facility>,
    index: SpatialIndex,
    rejected: Vec<RejectedRecord>,
}

impl FacilityMatcher {
    /// Build the catalog and its spatial index. A repeated facility id keeps the
    /// first occurrence; later ones are recorded in `rejected()`.
    pub fn new(facilities: Vec<Facility>, config: MatchingConfig) -> Self {
        let mut seen = HashSet::with_capacity(facilities.len());
        let mut catalog = Vec::with_capacity(facilities.len());
        let mut rejected = Vec::new();

        for facility in facilities {
            let id = facility.id();
            if seen.insert(id) {
                catalog.push(facility);
            } else {
                warn!(facility_id = %id, name = %facility.name(), "duplicate facility id ignored");
                rejected.push(RejectedRecord {
                    record_id: format!("facility {}", id),
                    failure: EmissionsFailure::DuplicateFacility { facility_id: id.0 },
                });
            }
        }

        let index = SpatialIndex::build(
            catalog.iter().map(|f| (f.id(), f.location())),
            config.distance_metric,
        );
        info!(
            facilities = catalog.len(),
            duplicates = rejected.len(),
            metric = ?config.distance_metric,
            "facility index built"
        );

        Self {
            config,
            facilities: catalog,
            index,
            rejected,
        }
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    pub fn facilities(&self) -> &[Facility] {
        &self.facilities
    }

    pub fn rejected(&self) -> &[RejectedRecord] {
        &self.rejected
    }

    pub fn len(&self) -> usize {
        self.facilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facilities.is_empty()
    }

    pub fn distance_multiplier(&self, distance_km: f64) -> f64 {
        self.config
            .distance_tiers
            .iter()
            .find(|tier| distance_km < tier.below_km)
            .map(|tier| tier.multiplier)
            .unwrap_or(self.config.distance_floor)
    }

    pub fn confidence(&self, distance_km: f64, facility_type: FacilityType) -> f64 {
        let score = self.distance_multiplier(distance_km) * self.config.type_tiers.multiplier(facility_type);
        score.clamp(0.0, 1.0)
    }

    /// Nearest facility within the match radius (boundary inclusive), or `None`
    pub fn match_detection(&self, detection: &Detection) -> Option<Match> {
        let nearest = self.index.nearest(detection.location())?;
        let radius = self.config.max_match_radius_km;
        if nearest.distance_km > radius {
            debug!(
                detection = %detection.id(),
                nearest_km = nearest.distance_km,
                "no facility within match radius"
            );
            return None;
        }

        let facility = &self.facilities[nearest.slot];
        let confidence = self.confidence(nearest.distance_km, facility.facility_type());
        let mut matched = match Match::new(detection.id(), facility, nearest.distance_km, confidence) {
            Ok(m) => m,
            Err(e) => {
                warn!(detection = %detection.id(), error = %e, "match rejected");
                return None;
            }
        };
        matched.competing_candidates = self
            .index
            .within_radius(detection.location(), radius)
            .len()
            .saturating_sub(1);
        Some(matched)
    }

    /// Match detections independently in parallel; one outcome per detection, in input order
    pub fn match_all(&self, detections: &[Detection]) -> Vec<Option<Match>> {
        detections.par_iter().map(|d| self.match_detection(d)).collect()
    }

    pub fn match_batch(&self, detections: &[Detection]) -> BatchMatchReport {
        let report = BatchMatchReport::collate(detections.iter().zip(self.match_all(detections)));
        info!(
            detections = detections.len(),
            matched = report.matched_count,
            distinct_facilities = report.distinct_facilities,
            unattributed = report.unattributed.len(),
            "batch matched"
        );
        report
    }

    /// Facilities whose location lies inside the box (inclusive), in catalog order
    pub fn facilities_in_region(&self, bbox: &BoundingBox) -> Vec<&Facility> {
        self.facilities.iter().filter(|f| bbox.contains(f.location())).collect()
    }

    pub fn facility(&self, id: FacilityId) -> Option<&Facility> {
        self.facilities.iter().find(|f| f.id() == id)
    }
}
