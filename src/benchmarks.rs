use std::collections::HashMap;

use anyhow::{bail, Context};
use serde::Deserialize;

use crate::models::{Grade, RiskLevel, TimeOfYear};

static DEFAULT_DATASET: &str = include_str!("../data/benchmarks.json");

/// Ascending cut points for one (key, grade, window) cell. Any cut point may
/// be absent; an absent cut point is skipped during classification, never
/// treated as zero.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CutPoints {
    pub advanced: Option<f64>,
    pub benchmark: Option<f64>,
    pub moderate: Option<f64>,
}

impl CutPoints {
    /// Compare against cut points in descending order; the first cut point
    /// the score meets or exceeds wins, ties favor the better label. Below
    /// every listed cut point is high risk.
    pub fn classify(&self, raw_score: f64) -> RiskLevel {
        if let Some(cut) = self.advanced {
            if raw_score >= cut {
                return RiskLevel::Advanced;
            }
        }
        if let Some(cut) = self.benchmark {
            if raw_score >= cut {
                return RiskLevel::Benchmark;
            }
        }
        if let Some(cut) = self.moderate {
            if raw_score >= cut {
                return RiskLevel::Moderate;
            }
        }
        RiskLevel::High
    }

    fn is_ordered(&self) -> bool {
        let pairs = [
            (self.advanced, self.benchmark),
            (self.benchmark, self.moderate),
            (self.advanced, self.moderate),
        ];
        pairs
            .iter()
            .all(|(upper, lower)| match (upper, lower) {
                (Some(upper), Some(lower)) => upper >= lower,
                _ => true,
            })
    }
}

type GradeWindows = HashMap<Grade, HashMap<TimeOfYear, CutPoints>>;

/// Immutable normative reference table, loaded once and injected into
/// whatever needs to classify. Safe for concurrent reads.
#[derive(Debug, Clone)]
pub struct BenchmarkTable {
    entries: HashMap<String, GradeWindows>,
}

impl BenchmarkTable {
    /// Parse a reference dataset. Top-level keys starting with `_` hold
    /// dataset metadata and are not scorable entries.
    pub fn from_json(raw_json: &str) -> anyhow::Result<Self> {
        let raw: HashMap<String, serde_json::Value> =
            serde_json::from_str(raw_json).context("benchmark dataset is not valid JSON")?;

        let mut entries = HashMap::new();
        for (key, value) in raw {
            if key.starts_with('_') {
                continue;
            }
            let grades: GradeWindows = serde_json::from_value(value)
                .with_context(|| format!("invalid benchmark entry for `{key}`"))?;
            for (grade, windows) in &grades {
                for (window, cuts) in windows {
                    if !cuts.is_ordered() {
                        bail!("cut points out of order for `{key}` grade {grade} {window}");
                    }
                }
            }
            entries.insert(key, grades);
        }

        Ok(Self { entries })
    }

    /// The dataset shipped with the binary.
    pub fn builtin() -> anyhow::Result<Self> {
        Self::from_json(DEFAULT_DATASET).context("embedded benchmark dataset is invalid")
    }

    /// Classify a raw score. `None` when no norms exist for the
    /// (key, grade, window) triple; many combinations legitimately have none.
    pub fn classify(
        &self,
        key: &str,
        grade: Grade,
        window: TimeOfYear,
        raw_score: f64,
    ) -> Option<RiskLevel> {
        let cuts = self.entries.get(key)?.get(&grade)?.get(&window)?;
        Some(cuts.classify(raw_score))
    }
}

/// Dataset key for a (subtest, target) pair. Targets without a mapping are
/// never classified.
pub fn benchmark_key(subtest: &str, target: &str) -> Option<&'static str> {
    let key = match (subtest, target) {
        ("NLM_LISTENING", "NLM_RETELL") => "NLM_RETELL_LISTENING",
        ("NLM_LISTENING", "NLM_QUESTIONS") => "NLM_QUESTIONS_LISTENING",
        ("NLM_READING", "NLM_RETELL") => "NLM_RETELL_READING",
        ("NLM_READING", "NLM_QUESTIONS") => "NLM_QUESTIONS_READING",
        ("NLM_READING", "DECODING_FLUENCY") => "DECODING_FLUENCY",
        ("NLM_READING", "ACCURACY") => "ACCURACY",
        ("DDM_PA", "PHONEME_SEGMENTATION") => "DDM_PA_PHONEME_SEGMENTATION",
        ("DDM_PA", "PHONEME_BLENDING") => "DDM_PA_PHONEME_BLENDING",
        ("DDM_PA", "FIRST_SOUNDS") => "DDM_PA_FIRST_SOUNDS",
        ("DDM_PA", "CONTINUOUS_PHONEME_BLENDING") => "DDM_PA_CONTINUOUS_BLENDING",
        ("DDM_PM", "PHONEME_DELETION") => "DDM_PM_DELETION",
        ("DDM_PM", "PHONEME_ADDITION") => "DDM_PM_ADDITION",
        ("DDM_PM", "PHONEME_SUBSTITUTION") => "DDM_PM_SUBSTITUTION",
        ("DDM_OM", "IRREGULAR_WORDS") => "DDM_OM_IRREGULAR_WORDS",
        ("DDM_OM", "LETTER_SOUNDS") => "DDM_OM_LETTER_SOUNDS",
        ("DDM_DI", "CLOSED_SYLLABLES") => "DDM_DI_CLOSED_SYLLABLES",
        ("DDM_DI", "VCE") => "DDM_DI_VCE",
        ("DDM_DI", "BASIC_AFFIXES") => "DDM_DI_BASIC_AFFIXES",
        ("DDM_DI", "VOWEL_TEAMS") => "DDM_DI_VOWEL_TEAMS",
        ("DDM_DI", "VOWEL_R_CONTROLLED") => "DDM_DI_VOWEL_R",
        ("DDM_DI", "ADVANCED_AFFIXES") => "DDM_DI_ADVANCED_AFFIXES",
        ("DDM_DI", "COMPLEX_VOWELS") => "DDM_DI_COMPLEX_VOWELS",
        ("DDM_DI", "ADVANCED_WORD_FORMS") => "DDM_DI_ADVANCED_WORD_FORMS",
        ("DDM_DI", "WORDS_IN_CONTEXT") => "DDM_DI_WORDS_IN_CONTEXT",
        _ => return None,
    };
    Some(key)
}

pub struct SubtestInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub category: &'static str,
    pub grades: &'static [Grade],
    pub targets: &'static [&'static str],
}

/// Subtest instruments and the grades they are administered in.
pub const SUBTESTS: &[SubtestInfo] = &[
    SubtestInfo {
        id: "NLM_LISTENING",
        name: "NLM Listening",
        category: "NLM",
        grades: &[Grade::PreK, Grade::K, Grade::First, Grade::Second, Grade::Third],
        targets: &["NLM_RETELL", "NLM_QUESTIONS"],
    },
    SubtestInfo {
        id: "NLM_READING",
        name: "NLM Reading",
        category: "NLM",
        grades: &[
            Grade::First,
            Grade::Second,
            Grade::Third,
            Grade::Fourth,
            Grade::Fifth,
            Grade::Sixth,
            Grade::Seventh,
            Grade::Eighth,
        ],
        targets: &["NLM_RETELL", "NLM_QUESTIONS", "DECODING_FLUENCY"],
    },
    SubtestInfo {
        id: "DDM_PA",
        name: "DDM Phonemic Awareness",
        category: "DDM",
        grades: &[Grade::PreK, Grade::K, Grade::First, Grade::Second],
        targets: &[
            "PHONEME_SEGMENTATION",
            "PHONEME_BLENDING",
            "FIRST_SOUNDS",
            "CONTINUOUS_PHONEME_BLENDING",
        ],
    },
    SubtestInfo {
        id: "DDM_PM",
        name: "DDM Phoneme Manipulation",
        category: "DDM",
        grades: &[Grade::First, Grade::Second],
        targets: &["PHONEME_DELETION", "PHONEME_ADDITION", "PHONEME_SUBSTITUTION"],
    },
    SubtestInfo {
        id: "DDM_OM",
        name: "DDM Orthographic Mapping",
        category: "DDM",
        grades: &[Grade::PreK, Grade::K, Grade::First, Grade::Second],
        targets: &["IRREGULAR_WORDS", "LETTER_SOUNDS", "LETTER_NAMES"],
    },
    SubtestInfo {
        id: "DDM_DI",
        name: "DDM Decoding Inventory",
        category: "DDM",
        grades: &[Grade::K, Grade::First, Grade::Second, Grade::Third, Grade::Fourth],
        targets: &[
            "CLOSED_SYLLABLES",
            "VCE",
            "BASIC_AFFIXES",
            "VOWEL_TEAMS",
            "VOWEL_R_CONTROLLED",
            "ADVANCED_AFFIXES",
            "COMPLEX_VOWELS",
            "ADVANCED_WORD_FORMS",
        ],
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    fn rank(level: RiskLevel) -> u8 {
        match level {
            RiskLevel::High => 0,
            RiskLevel::Moderate => 1,
            RiskLevel::Benchmark => 2,
            RiskLevel::Advanced => 3,
        }
    }

    #[test]
    fn builtin_dataset_loads() {
        let table = BenchmarkTable::builtin().unwrap();
        assert!(table
            .classify("NLM_RETELL_LISTENING", Grade::K, TimeOfYear::Boy, 6.0)
            .is_some());
    }

    #[test]
    fn grade_three_midyear_fluency_bands() {
        let table = BenchmarkTable::builtin().unwrap();
        let classify = |score| {
            table
                .classify("DECODING_FLUENCY", Grade::Third, TimeOfYear::Moy, score)
                .unwrap()
        };
        assert_eq!(classify(85.0), RiskLevel::Benchmark);
        assert_eq!(classify(60.0), RiskLevel::Moderate);
        assert_eq!(classify(20.0), RiskLevel::High);
    }

    #[test]
    fn tie_meets_the_cut_point() {
        let table = BenchmarkTable::builtin().unwrap();
        assert_eq!(
            table.classify("DECODING_FLUENCY", Grade::Third, TimeOfYear::Moy, 80.0),
            Some(RiskLevel::Benchmark)
        );
        assert_eq!(
            table.classify("DECODING_FLUENCY", Grade::Third, TimeOfYear::Moy, 50.0),
            Some(RiskLevel::Moderate)
        );
    }

    #[test]
    fn missing_combinations_classify_to_none() {
        let table = BenchmarkTable::builtin().unwrap();
        assert_eq!(
            table.classify("NO_SUCH_KEY", Grade::Third, TimeOfYear::Moy, 10.0),
            None
        );
        // Grade gap: no sixth-through-eighth retell norms.
        assert_eq!(
            table.classify("NLM_RETELL_READING", Grade::Eighth, TimeOfYear::Moy, 10.0),
            None
        );
        // Window gap: reading is not normed at BOY of first grade.
        assert_eq!(
            table.classify("NLM_RETELL_READING", Grade::First, TimeOfYear::Boy, 10.0),
            None
        );
        assert_eq!(
            table.classify("_meta", Grade::First, TimeOfYear::Boy, 10.0),
            None
        );
    }

    #[test]
    fn classification_is_monotonic_in_score() {
        let table = BenchmarkTable::builtin().unwrap();
        let mut previous = 0u8;
        for score in 0..=35 {
            let level = table
                .classify(
                    "NLM_RETELL_LISTENING",
                    Grade::First,
                    TimeOfYear::Moy,
                    f64::from(score),
                )
                .unwrap();
            assert!(
                rank(level) >= previous,
                "label worsened as score rose to {score}"
            );
            previous = rank(level);
        }
    }

    #[test]
    fn absent_cut_points_are_skipped() {
        let cuts = CutPoints {
            advanced: None,
            benchmark: Some(10.0),
            moderate: None,
        };
        assert_eq!(cuts.classify(12.0), RiskLevel::Benchmark);
        // Below the only cut point: high, not moderate-by-zero.
        assert_eq!(cuts.classify(5.0), RiskLevel::High);

        let moderate_only = CutPoints {
            advanced: None,
            benchmark: None,
            moderate: Some(5.0),
        };
        assert_eq!(moderate_only.classify(7.0), RiskLevel::Moderate);
        assert_eq!(moderate_only.classify(2.0), RiskLevel::High);
    }

    #[test]
    fn metadata_keys_are_skipped_on_load() {
        let table = BenchmarkTable::from_json(
            r#"{
                "_meta": {"version": "x", "anything": [1, 2, 3]},
                "SOME_KEY": {"1": {"BOY": {"benchmark": 10, "moderate": 5}}}
            }"#,
        )
        .unwrap();
        assert_eq!(
            table.classify("_meta", Grade::First, TimeOfYear::Boy, 10.0),
            None
        );
        assert_eq!(
            table.classify("SOME_KEY", Grade::First, TimeOfYear::Boy, 10.0),
            Some(RiskLevel::Benchmark)
        );
    }

    #[test]
    fn out_of_order_cut_points_are_rejected() {
        let result = BenchmarkTable::from_json(
            r#"{"BAD": {"1": {"BOY": {"benchmark": 5, "moderate": 9}}}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn every_mapped_target_names_a_known_instrument() {
        for info in SUBTESTS {
            for target in info.targets {
                // A mapping is optional, but when present it must not be empty.
                if let Some(key) = benchmark_key(info.id, target) {
                    assert!(!key.is_empty());
                }
            }
        }
        assert_eq!(
            benchmark_key("NLM_READING", "DECODING_FLUENCY"),
            Some("DECODING_FLUENCY")
        );
        assert_eq!(benchmark_key("NLM_LISTENING", "DECODING_FLUENCY"), None);
        assert_eq!(benchmark_key("DDM_OM", "LETTER_NAMES"), None);
    }
}
