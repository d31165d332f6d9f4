// ESG and net-zero framing of a discrepancy ratio
// Indian regulatory context: MoEFCC / CPCB oversight, BRSR disclosure,
// Net Zero 2070, Global Methane Pledge (30% cut by 2030)
//
// Grades (ratio upper bounds, inclusive):  A 1.5 | B 2.0 | C 3.0 | D 5.0 | F above
// Score: 100 - (ratio - 1) × 20, clamped to [0, 100]

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::climate_discrepancy::DiscrepancyResult;
use crate::climate_state::FacilityId;

pub const METHODOLOGY_CAVEATS: [&str; 4] = [
    "Satellite detection represents snapshot, not continuous monitoring",
    "Frequency assumption affects ratio calculation significantly",
    "Attribution confidence depends on facility proximity and density",
    "This is a screening tool, not regulatory evidence",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EsgGrade {
    A,
    B,
    C,
    D,
    F,
}

impl EsgGrade {
    pub const ALL: [EsgGrade; 5] = [EsgGrade::A, EsgGrade::B, EsgGrade::C, EsgGrade::D, EsgGrade::F];

    pub fn from_ratio(ratio: f64) -> Self {
        if ratio <= 1.5 {
            Self::A
        } else if ratio <= 2.0 {
            Self::B
        } else if ratio <= 3.0 {
            Self::C
        } else if ratio <= 5.0 {
            Self::D
        } else {
            Self::F
        }
    }

    pub fn level(&self) -> &'static str {
        match self {
            Self::A => "excellent",
            Self::B => "good",
            Self::C => "moderate",
            Self::D => "poor",
            Self::F => "critical",
        }
    }
}

impl fmt::Display for EsgGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub fn esg_score(ratio: f64) -> f64 {
    (100.0 - (ratio - 1.0) * 20.0).clamp(0.0, 100.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NetZeroAlignment {
    Aligned,
    AtRisk,
    Misaligned,
}

impl NetZeroAlignment {
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio <= 1.5 {
            Self::Aligned
        } else if ratio <= 3.0 {
            Self::AtRisk
        } else {
            Self::Misaligned
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Aligned => "Emissions reporting appears consistent with satellite observations",
            Self::AtRisk => "Moderate discrepancy detected; monitoring and reporting accuracy need attention",
            Self::Misaligned => "Significant emissions discrepancy; reporting is not aligned with net-zero commitments",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ComplianceRisk {
    Low,
    Moderate,
    High,
}

impl ComplianceRisk {
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio > 3.0 {
            Self::High
        } else if ratio > 2.0 {
            Self::Moderate
        } else {
            Self::Low
        }
    }

    pub fn potential_actions(&self) -> &'static [&'static str] {
        match self {
            Self::High => &[
                "CPCB inspection may be warranted",
                "BRSR disclosure may require revision",
                "Investor ESG queries likely",
            ],
            Self::Moderate => &[
                "Enhanced monitoring recommended",
                "Voluntary disclosure improvement suggested",
            ],
            Self::Low => &[
                "Continue current monitoring practices",
                "Consider third-party verification for ESG ratings",
            ],
        }
    }
}

/// Operator follow-up steps for a discrepancy ratio
pub fn recommendations(ratio: f64) -> Vec<&'static str> {
    if ratio > 5.0 {
        vec![
            "Deploy continuous emissions monitoring system (CEMS)",
            "Conduct immediate leak detection and repair (LDAR) survey",
            "Engage third-party auditor for emissions verification",
            "Review and update emissions calculation methodology",
        ]
    } else if ratio > 3.0 {
        vec![
            "Implement quarterly aerial or drone methane surveys",
            "Review emission factors used in inventory calculations",
            "Consider joining Oil & Gas Methane Partnership 2.0 (OGMP)",
        ]
    } else if ratio > 1.5 {
        vec![
            "Enhance measurement accuracy at major emission points",
            "Document uncertainty ranges in emissions reporting",
        ]
    } else {
        vec![
            "Maintain current monitoring and reporting practices",
            "Consider publishing emissions data for transparency",
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplianceAssessment {
    pub detection_id: String,
    pub facility_id: FacilityId,
    pub facility_name: String,
    pub operator: String,
    pub ratio: f64,
    pub grade: EsgGrade,
    pub grade_level: &'static str,
    pub score: f64,
    pub net_zero: NetZeroAlignment,
    pub net_zero_description: &'static str,
    pub compliance_risk: ComplianceRisk,
    pub potential_actions: &'static [&'static str],
    pub recommendations: Vec<&'static str>,
    pub caveats: &'static [&'static str],
}

impl ComplianceAssessment {
    pub fn from_result(result: &DiscrepancyResult) -> Self {
        let ratio = result.primary_ratio();
        let grade = EsgGrade::from_ratio(ratio);
        let net_zero = NetZeroAlignment::from_ratio(ratio);
        let compliance_risk = ComplianceRisk::from_ratio(ratio);
        Self {
            detection_id: result.detection_id().to_string(),
            facility_id: result.facility_id(),
            facility_name: result.facility_name().to_string(),
            operator: result.operator().to_string(),
            ratio,
            grade,
            grade_level: grade.level(),
            score: esg_score(ratio),
            net_zero,
            net_zero_description: net_zero.description(),
            compliance_risk,
            potential_actions: compliance_risk.potential_actions(),
            recommendations: recommendations(ratio),
            caveats: &METHODOLOGY_CAVEATS,
        }
    }
}

/// Count of results per grade; every grade is present, possibly with zero
pub fn grade_distribution(ratios: &[f64]) -> BTreeMap<EsgGrade, usize> {
    let mut counts: BTreeMap<EsgGrade, usize> = EsgGrade::ALL.iter().map(|g| (*g, 0)).collect();
    for ratio in ratios {
        *counts.entry(EsgGrade::from_ratio(*ratio)).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_grade_boundaries() {
        assert_eq!(EsgGrade::from_ratio(0.2), EsgGrade::A);
        assert_eq!(EsgGrade::from_ratio(1.5), EsgGrade::A);
        assert_eq!(EsgGrade::from_ratio(1.51), EsgGrade::B);
        assert_eq!(EsgGrade::from_ratio(2.0), EsgGrade::B);
        assert_eq!(EsgGrade::from_ratio(3.0), EsgGrade::C);
        assert_eq!(EsgGrade::from_ratio(5.0), EsgGrade::D);
        assert_eq!(EsgGrade::from_ratio(5.01), EsgGrade::F);
        assert_eq!(EsgGrade::F.level(), "critical");
    }

    #[test]
    fn test_score_clamped() {
        assert_relative_eq!(esg_score(1.0), 100.0);
        assert_relative_eq!(esg_score(2.5), 70.0);
        assert_relative_eq!(esg_score(0.0), 100.0);
        assert_relative_eq!(esg_score(8.0), 0.0);
    }

    #[test]
    fn test_net_zero_and_compliance() {
        assert_eq!(NetZeroAlignment::from_ratio(1.5), NetZeroAlignment::Aligned);
        assert_eq!(NetZeroAlignment::from_ratio(3.0), NetZeroAlignment::AtRisk);
        assert_eq!(NetZeroAlignment::from_ratio(3.1), NetZeroAlignment::Misaligned);

        assert_eq!(ComplianceRisk::from_ratio(2.0), ComplianceRisk::Low);
        assert_eq!(ComplianceRisk::from_ratio(2.5), ComplianceRisk::Moderate);
        assert_eq!(ComplianceRisk::from_ratio(3.0), ComplianceRisk::Moderate);
        assert_eq!(ComplianceRisk::from_ratio(3.5), ComplianceRisk::High);
        assert_eq!(ComplianceRisk::High.potential_actions().len(), 3);
    }

    #[test]
    fn test_recommendation_tiers() {
        assert_eq!(recommendations(6.0).len(), 4);
        assert_eq!(recommendations(4.0).len(), 3);
        assert_eq!(recommendations(2.0).len(), 2);
        assert!(recommendations(1.0)[0].starts_with("Maintain"));
    }

    #[test]
    fn test_assessment_from_result() {
        use crate::climate_discrepancy::DiscrepancyAnalyzer;
        use crate::climate_facility_matcher::Match;
        use crate::climate_proxy_converter::ProxyEstimate;
        use crate::climate_state::{Facility, FacilityType, GasSpecies, GeoPoint};

        let facility = Facility::new(
            5,
            "Koyali Refinery",
            "IOCL",
            FacilityType::Refining,
            GeoPoint::new(22.37, 73.12).unwrap(),
            1.0,
        )
        .unwrap();
        let matched = Match::new("koyali-1", &facility, 0.2, 0.9).unwrap();
        // 500 kg × 12 / 1000 kg = 6.0
        let estimate = ProxyEstimate::precomputed_mass("koyali-1", GasSpecies::Ch4, 500.0).unwrap();
        let result = DiscrepancyAnalyzer::default().analyze(&estimate, &matched).unwrap();

        let assessment = ComplianceAssessment::from_result(&result);
        assert_relative_eq!(assessment.ratio, 6.0);
        assert_eq!(assessment.grade, EsgGrade::F);
        assert_eq!(assessment.grade_level, "critical");
        assert_relative_eq!(assessment.score, 0.0);
        assert_eq!(assessment.net_zero, NetZeroAlignment::Misaligned);
        assert_eq!(assessment.net_zero_description, NetZeroAlignment::Misaligned.description());
        assert_eq!(assessment.compliance_risk, ComplianceRisk::High);
        assert_eq!(assessment.potential_actions, ComplianceRisk::High.potential_actions());
        assert_eq!(assessment.recommendations.len(), 4);
        assert_eq!(assessment.caveats, &METHODOLOGY_CAVEATS[..]);
    }

    #[test]
    fn test_grade_distribution() {
        let counts = grade_distribution(&[0.5, 1.2, 2.5, 12.0]);
        assert_eq!(counts[&EsgGrade::A], 2);
        assert_eq!(counts[&EsgGrade::B], 0);
        assert_eq!(counts[&EsgGrade::C], 1);
        assert_eq!(counts[&EsgGrade::F], 1);
        assert_eq!(counts.values().sum::<usize>(), 4);
        assert!(grade_distribution(&[]).values().all(|c| *c == 0));
    }
}
