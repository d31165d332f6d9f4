// Recurrence scenarios for single-snapshot detections
// One satellite overpass cannot reveal how often an emission event repeats, so every
// discrepancy is evaluated under a fixed ladder of annual repetition counts

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::climate_failures::EmissionsFailure;

/// Annual recurrence of a detected event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyScenario {
    SingleEvent,  // once a year
    Monthly,      // 12 per year
    Weekly,       // 52 per year
    Daily,        // 365 per year
}

impl FrequencyScenario {
    /// All scenarios in increasing repetition order
    pub const ALL: [FrequencyScenario; 4] = [
        FrequencyScenario::SingleEvent,
        FrequencyScenario::Monthly,
        FrequencyScenario::Weekly,
        FrequencyScenario::Daily,
    ];

    pub fn events_per_year(&self) -> f64 {
        match self {
            Self::SingleEvent => 1.0,
            Self::Monthly => 12.0,
            Self::Weekly => 52.0,
            Self::Daily => 365.0,
        }
    }
}

impl fmt::Display for FrequencyScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SingleEvent => "single_event",
            Self::Monthly => "monthly",
            Self::Weekly => "weekly",
            Self::Daily => "daily",
        };
        f.write_str(name)
    }
}

/// Analyst stance on recurrence; selects the primary scenario.
/// The daily scenario is sensitivity-only and never primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyAssumption {
    Conservative,
    #[default]
    Moderate,
    Aggressive,
}

impl FrequencyAssumption {
    pub fn primary_scenario(&self) -> FrequencyScenario {
        match self {
            Self::Conservative => FrequencyScenario::SingleEvent,
            Self::Moderate => FrequencyScenario::Monthly,
            Self::Aggressive => FrequencyScenario::Weekly,
        }
    }
}

impl FromStr for FrequencyAssumption {
    type Err = EmissionsFailure;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conservative" => Ok(Self::Conservative),
            "moderate" => Ok(Self::Moderate),
            "aggressive" => Ok(Self::Aggressive),
            other => Err(EmissionsFailure::invalid_record(
                "frequency_assumption",
                format!("expected conservative, moderate or aggressive, got '{}'", other),
            )),
        }
    }
}

impl fmt::Display for FrequencyAssumption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Conservative => "conservative",
            Self::Moderate => "moderate",
            Self::Aggressive => "aggressive",
        };
        f.write_str(name)
    }
}

/// Underreporting ratio under every recurrence scenario
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRatios {
    pub single_event: f64,
    pub monthly: f64,
    pub weekly: f64,
    pub daily: f64,
}

impl ScenarioRatios {
    /// `event_mass_kg × f / baseline_kg` for each scenario, saturating at
    /// `f64::MAX` instead of overflowing. Callers guarantee a positive baseline.
    pub fn compute(event_mass_kg: f64, baseline_kg: f64) -> Self {
        let ratio = |s: FrequencyScenario| ((event_mass_kg * s.events_per_year()) / baseline_kg).min(f64::MAX);
        Self {
            single_event: ratio(FrequencyScenario::SingleEvent),
            monthly: ratio(FrequencyScenario::Monthly),
            weekly: ratio(FrequencyScenario::Weekly),
            daily: ratio(FrequencyScenario::Daily),
        }
    }

    pub fn get(&self, scenario: FrequencyScenario) -> f64 {
        match scenario {
            FrequencyScenario::SingleEvent => self.single_event,
            FrequencyScenario::Monthly => self.monthly,
            FrequencyScenario::Weekly => self.weekly,
            FrequencyScenario::Daily => self.daily,
        }
    }

    pub fn primary(&self, assumption: FrequencyAssumption) -> f64 {
        self.get(assumption.primary_scenario())
    }

    pub fn is_monotonic(&self) -> bool {
        self.single_event <= self.monthly && self.monthly <= self.weekly && self.weekly <= self.daily
    }

    pub fn iter(&self) -> impl Iterator<Item = (FrequencyScenario, f64)> + '_ {
        FrequencyScenario::ALL.iter().map(move |s| (*s, self.get(*s)))
    }
}
