use std::collections::HashMap;

use thiserror::Error;

use crate::models::{
    ObservationRecord, RiskLevel, Tier, TierHistoryEntry, TierSummary, TimeOfYear,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TierError {
    /// Tier 1 means verified benchmark status, so absence of data is a
    /// caller-visible condition, never a default tier.
    #[error("no classifiable scores to aggregate")]
    NoClassifiableData,
}

/// Worst-case support tier across a student's risk labels. One high label
/// forces tier 3 no matter how many benchmark labels sit beside it.
pub fn aggregate_tier(labels: &[RiskLevel]) -> Result<Tier, TierError> {
    labels
        .iter()
        .map(|label| label.tier())
        .max()
        .ok_or(TierError::NoClassifiableData)
}

/// Most recent labeled, target-level observation per (subtest, target) pair,
/// so an older re-test never double counts. On equal timestamps the record
/// appearing later in the input wins. Sorted by (subtest, target).
pub fn latest_observations(observations: &[ObservationRecord]) -> Vec<&ObservationRecord> {
    let mut latest: HashMap<(&str, &str), &ObservationRecord> = HashMap::new();
    for obs in observations {
        if !obs.is_target_level() || obs.risk_level.is_none() {
            continue;
        }
        let key = (obs.subtest.as_str(), obs.target.as_str());
        match latest.get(&key) {
            Some(existing) if obs.completed_at < existing.completed_at => {}
            _ => {
                latest.insert(key, obs);
            }
        }
    }
    let mut kept: Vec<&ObservationRecord> = latest.into_values().collect();
    kept.sort_by(|a, b| (&a.subtest, &a.target).cmp(&(&b.subtest, &b.target)));
    kept
}

pub fn latest_labels(observations: &[ObservationRecord]) -> Vec<RiskLevel> {
    latest_observations(observations)
        .into_iter()
        .filter_map(|obs| obs.risk_level)
        .collect()
}

pub fn student_tier(observations: &[ObservationRecord]) -> Result<Tier, TierError> {
    aggregate_tier(&latest_labels(observations))
}

/// Per-tier counts and percentages for a roster of already-computed tiers.
pub fn tier_summary(tiers: &[Tier]) -> TierSummary {
    let mut summary = TierSummary::default();
    for tier in tiers {
        match tier {
            Tier::Tier1 => summary.tier1.count += 1,
            Tier::Tier2 => summary.tier2.count += 1,
            Tier::Tier3 => summary.tier3.count += 1,
        }
    }
    let total = tiers.len();
    summary.total = total;

    let pct = |count: usize| {
        if total == 0 {
            0.0
        } else {
            (count as f64 / total as f64 * 1000.0).round() / 10.0
        }
    };
    summary.tier1.pct = pct(summary.tier1.count);
    summary.tier2.pct = pct(summary.tier2.count);
    summary.tier3.pct = pct(summary.tier3.count);
    summary
}

/// One tier per assessment window, across all academic years present.
pub fn tier_history(observations: &[ObservationRecord]) -> Vec<TierHistoryEntry> {
    let mut windows: HashMap<(String, TimeOfYear), Vec<RiskLevel>> = HashMap::new();
    for obs in observations {
        if !obs.is_target_level() {
            continue;
        }
        let Some(label) = obs.risk_level else {
            continue;
        };
        windows
            .entry((obs.academic_year.clone(), obs.time_of_year))
            .or_default()
            .push(label);
    }

    let mut entries: Vec<TierHistoryEntry> = windows
        .into_iter()
        .filter_map(|((academic_year, time_of_year), labels)| {
            aggregate_tier(&labels).ok().map(|tier| TierHistoryEntry {
                academic_year,
                time_of_year,
                tier,
            })
        })
        .collect();
    entries.sort_by(|a, b| {
        (a.academic_year.as_str(), a.time_of_year).cmp(&(b.academic_year.as_str(), b.time_of_year))
    });
    entries
}
