use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Grade levels in administration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "PreK")]
    PreK,
    K,
    #[serde(rename = "1")]
    First,
    #[serde(rename = "2")]
    Second,
    #[serde(rename = "3")]
    Third,
    #[serde(rename = "4")]
    Fourth,
    #[serde(rename = "5")]
    Fifth,
    #[serde(rename = "6")]
    Sixth,
    #[serde(rename = "7")]
    Seventh,
    #[serde(rename = "8")]
    Eighth,
}

impl Grade {
    pub fn as_str(self) -> &'static str {
        match self {
            Grade::PreK => "PreK",
            Grade::K => "K",
            Grade::First => "1",
            Grade::Second => "2",
            Grade::Third => "3",
            Grade::Fourth => "4",
            Grade::Fifth => "5",
            Grade::Sixth => "6",
            Grade::Seventh => "7",
            Grade::Eighth => "8",
        }
    }
}

#[derive(Debug, Error)]
#[error("unrecognized grade `{0}` (expected PreK, K, or 1-8)")]
pub struct ParseGradeError(String);

impl FromStr for Grade {
    type Err = ParseGradeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PreK" => Ok(Grade::PreK),
            "K" => Ok(Grade::K),
            "1" => Ok(Grade::First),
            "2" => Ok(Grade::Second),
            "3" => Ok(Grade::Third),
            "4" => Ok(Grade::Fourth),
            "5" => Ok(Grade::Fifth),
            "6" => Ok(Grade::Sixth),
            "7" => Ok(Grade::Seventh),
            "8" => Ok(Grade::Eighth),
            other => Err(ParseGradeError(other.to_string())),
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Benchmark assessment windows, in within-year order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimeOfYear {
    #[serde(rename = "BOY")]
    Boy,
    #[serde(rename = "MOY")]
    Moy,
    #[serde(rename = "EOY")]
    Eoy,
}

impl TimeOfYear {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeOfYear::Boy => "BOY",
            TimeOfYear::Moy => "MOY",
            TimeOfYear::Eoy => "EOY",
        }
    }
}

#[derive(Debug, Error)]
#[error("unrecognized assessment window `{0}` (expected BOY, MOY, or EOY)")]
pub struct ParseTimeOfYearError(String);

impl FromStr for TimeOfYear {
    type Err = ParseTimeOfYearError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BOY" => Ok(TimeOfYear::Boy),
            "MOY" => Ok(TimeOfYear::Moy),
            "EOY" => Ok(TimeOfYear::Eoy),
            other => Err(ParseTimeOfYearError(other.to_string())),
        }
    }
}

impl fmt::Display for TimeOfYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Norm-referenced classification of a raw score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Advanced,
    Benchmark,
    Moderate,
    High,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Advanced => "advanced",
            RiskLevel::Benchmark => "benchmark",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
        }
    }

    /// MTSS support tier implied by this label.
    pub fn tier(self) -> Tier {
        match self {
            RiskLevel::Advanced | RiskLevel::Benchmark => Tier::Tier1,
            RiskLevel::Moderate => Tier::Tier2,
            RiskLevel::High => Tier::Tier3,
        }
    }
}

#[derive(Debug, Error)]
#[error("unrecognized risk level `{0}`")]
pub struct ParseRiskLevelError(String);

impl FromStr for RiskLevel {
    type Err = ParseRiskLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "advanced" => Ok(RiskLevel::Advanced),
            "benchmark" => Ok(RiskLevel::Benchmark),
            "moderate" => Ok(RiskLevel::Moderate),
            "high" => Ok(RiskLevel::High),
            other => Err(ParseRiskLevelError(other.to_string())),
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// MTSS support tier. Tier 1 asserts verified benchmark status, so it is
/// never used as a default for students with no classifiable scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    Tier1,
    Tier2,
    Tier3,
}

impl Tier {
    pub fn number(self) -> u8 {
        match self {
            Tier::Tier1 => 1,
            Tier::Tier2 => 2,
            Tier::Tier3 => 3,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

#[derive(Debug, Clone)]
pub struct StudentRecord {
    pub id: Uuid,
    pub full_name: String,
    pub grade: Grade,
    pub school: Option<String>,
}

/// One stored score row from a completed session, joined with its session
/// and student. Sub-target rows carry `sub_target` and never participate in
/// classification, tiering, or trajectory.
#[derive(Debug, Clone)]
pub struct ObservationRecord {
    pub student_id: Uuid,
    pub student_name: String,
    pub session_id: Uuid,
    pub subtest: String,
    pub target: String,
    pub sub_target: Option<String>,
    pub raw_score: Option<f64>,
    pub max_score: Option<f64>,
    pub academic_year: String,
    pub time_of_year: TimeOfYear,
    pub grade_at_test: Grade,
    pub risk_level: Option<RiskLevel>,
    pub completed_at: DateTime<Utc>,
}

impl ObservationRecord {
    pub fn is_target_level(&self) -> bool {
        self.sub_target.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryPoint {
    pub time_of_year: TimeOfYear,
    pub raw_score: Option<f64>,
    pub risk_level: Option<RiskLevel>,
}

/// Roll-up of the single most recent session, majority rule over its labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrentRisk {
    Benchmark,
    Moderate,
    High,
    Unknown,
}

impl fmt::Display for CurrentRisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CurrentRisk::Benchmark => "benchmark",
            CurrentRisk::Moderate => "moderate",
            CurrentRisk::High => "high",
            CurrentRisk::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Likelihood of further decline. Ordered so that an ascending sort puts
/// `high` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Probability {
    High,
    Medium,
    Low,
}

impl fmt::Display for Probability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Probability::High => "high",
            Probability::Medium => "medium",
            Probability::Low => "low",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone)]
pub struct LatestScore {
    pub key: String,
    pub raw_score: Option<f64>,
    pub risk_level: Option<RiskLevel>,
}

#[derive(Debug, Clone)]
pub struct DeclineAlert {
    pub student_id: Uuid,
    pub student_name: String,
    pub grade: Grade,
    pub school: Option<String>,
    pub probability: Probability,
    pub contributing_factors: Vec<String>,
    pub current_risk: CurrentRisk,
    pub latest_scores: Vec<LatestScore>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TierBand {
    pub count: usize,
    pub pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TierSummary {
    pub tier1: TierBand,
    pub tier2: TierBand,
    pub tier3: TierBand,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TierHistoryEntry {
    pub academic_year: String,
    pub time_of_year: TimeOfYear,
    pub tier: Tier,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubScore {
    pub score: u8,
    pub max: u8,
    pub label: &'static str,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubScores {
    #[serde(rename = "EC")]
    pub ec: SubScore,
    #[serde(rename = "SC")]
    pub sc: SubScore,
    #[serde(rename = "VC")]
    pub vc: SubScore,
    #[serde(rename = "NDC")]
    pub ndc: SubScore,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptAnalysis {
    pub word_count: usize,
    pub sentence_count: usize,
    pub unique_words: usize,
    pub type_token_ratio: f64,
    pub sub_scores: SubScores,
    pub total: u8,
    pub max: u8,
}
