use std::collections::{BTreeMap, HashMap};

use uuid::Uuid;

use crate::models::{
    CurrentRisk, DeclineAlert, LatestScore, ObservationRecord, Probability, RiskLevel,
    StudentRecord, TrajectoryPoint,
};

/// Fractional drop between the two most recent points that marks a target
/// declining.
pub const DECLINE_DROP_THRESHOLD: f64 = 0.20;

/// Per-target point series for the most recent academic year on record,
/// target-level observations only, ordered BOY -> MOY -> EOY (completion
/// time breaks ties within a window). Keyed by `"{subtest}_{target}"`; a
/// BTreeMap keeps downstream factor output deterministic.
pub fn build_trajectory(
    observations: &[ObservationRecord],
) -> BTreeMap<String, Vec<TrajectoryPoint>> {
    let Some(latest_year) = observations
        .iter()
        .map(|obs| obs.academic_year.as_str())
        .max()
    else {
        return BTreeMap::new();
    };
    let latest_year = latest_year.to_string();

    let mut year_observations: Vec<&ObservationRecord> = observations
        .iter()
        .filter(|obs| obs.academic_year == latest_year && obs.is_target_level())
        .collect();
    year_observations.sort_by_key(|obs| obs.completed_at);

    let mut trajectory: BTreeMap<String, Vec<TrajectoryPoint>> = BTreeMap::new();
    for obs in year_observations {
        trajectory
            .entry(format!("{}_{}", obs.subtest, obs.target))
            .or_default()
            .push(TrajectoryPoint {
                time_of_year: obs.time_of_year,
                raw_score: obs.raw_score,
                risk_level: obs.risk_level,
            });
    }
    // Stable sort: completion order is kept within a window.
    for points in trajectory.values_mut() {
        points.sort_by_key(|point| point.time_of_year);
    }
    trajectory
}

/// Decline check over a trajectory: a >= 20% drop between the latest two
/// scores, or a benchmark/moderate -> high escalation, marks the student
/// declining. A lone high-risk point is reported as a factor but never flags
/// a trend on its own. Null scores at either endpoint skip the comparison.
pub fn detect_decline(trajectory: &BTreeMap<String, Vec<TrajectoryPoint>>) -> (bool, Vec<String>) {
    let mut declining = false;
    let mut factors = Vec::new();

    for (key, points) in trajectory {
        let display = key.replace('_', " ");

        if points.len() < 2 {
            if let Some(last) = points.last() {
                if last.risk_level == Some(RiskLevel::High) {
                    factors.push(format!("High risk on {display}"));
                }
            }
            continue;
        }

        let recent = &points[points.len() - 1];
        let previous = &points[points.len() - 2];

        if let (Some(recent_score), Some(previous_score)) = (recent.raw_score, previous.raw_score)
        {
            if previous_score > 0.0 {
                let drop_pct = (previous_score - recent_score) / previous_score;
                if drop_pct >= DECLINE_DROP_THRESHOLD {
                    declining = true;
                    factors.push(format!("Declining {display} scores"));
                }
            }
        }

        let escalated = matches!(
            previous.risk_level,
            Some(RiskLevel::Benchmark | RiskLevel::Moderate)
        ) && recent.risk_level == Some(RiskLevel::High);
        if escalated {
            declining = true;
            factors.push(format!("Risk escalated to high on {display}"));
        }
    }

    (declining, factors)
}

/// Majority-style roll-up of the single most recent session: high if high
/// labels reach half, moderate if high and moderate together reach half,
/// otherwise benchmark. Unknown when the session has no labeled scores.
pub fn current_risk(observations: &[ObservationRecord]) -> CurrentRisk {
    let Some(session_id) = latest_session_id(observations) else {
        return CurrentRisk::Unknown;
    };

    let labels: Vec<RiskLevel> = observations
        .iter()
        .filter(|obs| obs.session_id == session_id && obs.is_target_level())
        .filter_map(|obs| obs.risk_level)
        .collect();
    if labels.is_empty() {
        return CurrentRisk::Unknown;
    }

    let high = labels
        .iter()
        .filter(|label| **label == RiskLevel::High)
        .count();
    let moderate = labels
        .iter()
        .filter(|label| **label == RiskLevel::Moderate)
        .count();

    if high * 2 >= labels.len() {
        CurrentRisk::High
    } else if (high + moderate) * 2 >= labels.len() {
        CurrentRisk::Moderate
    } else {
        CurrentRisk::Benchmark
    }
}

/// Target-level scores from the most recent session, for alert display.
pub fn latest_scores(observations: &[ObservationRecord]) -> Vec<LatestScore> {
    let Some(session_id) = latest_session_id(observations) else {
        return Vec::new();
    };

    let mut scores: Vec<LatestScore> = observations
        .iter()
        .filter(|obs| obs.session_id == session_id && obs.is_target_level())
        .map(|obs| LatestScore {
            key: format!("{}_{}", obs.subtest, obs.target),
            raw_score: obs.raw_score,
            risk_level: obs.risk_level,
        })
        .collect();
    scores.sort_by(|a, b| a.key.cmp(&b.key));
    scores
}

fn latest_session_id(observations: &[ObservationRecord]) -> Option<Uuid> {
    observations
        .iter()
        .max_by_key(|obs| obs.completed_at)
        .map(|obs| obs.session_id)
}

fn probability_of_decline(current: CurrentRisk) -> Probability {
    match current {
        CurrentRisk::Moderate | CurrentRisk::High => Probability::High,
        CurrentRisk::Benchmark => Probability::Medium,
        CurrentRisk::Unknown => Probability::Low,
    }
}

/// Early-warning assessment for one student. `None` means no alert: the
/// student is not declining. A student with no completed observations gets a
/// data-gap alert at medium probability rather than a computed trend.
pub fn assess_student(
    student: &StudentRecord,
    observations: &[ObservationRecord],
) -> Option<DeclineAlert> {
    if observations.is_empty() {
        return Some(DeclineAlert {
            student_id: student.id,
            student_name: student.full_name.clone(),
            grade: student.grade,
            school: student.school.clone(),
            probability: Probability::Medium,
            contributing_factors: vec!["No recent assessment".to_string()],
            current_risk: CurrentRisk::Unknown,
            latest_scores: Vec::new(),
        });
    }

    let trajectory = build_trajectory(observations);
    let (declining, factors) = detect_decline(&trajectory);
    if !declining {
        return None;
    }

    let current = current_risk(observations);
    Some(DeclineAlert {
        student_id: student.id,
        student_name: student.full_name.clone(),
        grade: student.grade,
        school: student.school.clone(),
        probability: probability_of_decline(current),
        contributing_factors: factors,
        current_risk: current,
        latest_scores: latest_scores(observations),
    })
}

/// Caseload-wide early-warning sweep, alerts sorted most urgent first.
/// Students are independent; order of the input roster does not matter.
pub fn at_risk_report(
    students: &[StudentRecord],
    observations_by_student: &HashMap<Uuid, Vec<ObservationRecord>>,
) -> Vec<DeclineAlert> {
    let empty: Vec<ObservationRecord> = Vec::new();
    let mut alerts: Vec<DeclineAlert> = students
        .iter()
        .filter_map(|student| {
            let observations = observations_by_student.get(&student.id).unwrap_or(&empty);
            assess_student(student, observations)
        })
        .collect();
    alerts.sort_by(|a, b| {
        (a.probability, a.student_name.as_str()).cmp(&(b.probability, b.student_name.as_str()))
    });
    alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Grade, TimeOfYear};
    use chrono::{Duration, TimeZone, Utc};

    fn student(name: &str) -> StudentRecord {
        StudentRecord {
            id: Uuid::new_v4(),
            full_name: name.to_string(),
            grade: Grade::Third,
            school: Some("Lakeside Elementary".to_string()),
        }
    }

    fn observation(
        session_id: Uuid,
        subtest: &str,
        target: &str,
        academic_year: &str,
        time_of_year: TimeOfYear,
        raw_score: Option<f64>,
        risk_level: Option<RiskLevel>,
        days_offset: i64,
    ) -> ObservationRecord {
        let base = Utc.with_ymd_and_hms(2025, 9, 15, 10, 0, 0).unwrap();
        ObservationRecord {
            student_id: Uuid::new_v4(),
            student_name: "Avery Nguyen".to_string(),
            session_id,
            subtest: subtest.to_string(),
            target: target.to_string(),
            sub_target: None,
            raw_score,
            max_score: None,
            academic_year: academic_year.to_string(),
            time_of_year,
            grade_at_test: Grade::Third,
            risk_level,
            completed_at: base + Duration::days(days_offset),
        }
    }

    fn two_window_history(
        boy_score: Option<f64>,
        boy_risk: Option<RiskLevel>,
        moy_score: Option<f64>,
        moy_risk: Option<RiskLevel>,
    ) -> Vec<ObservationRecord> {
        vec![
            observation(
                Uuid::new_v4(),
                "NLM_READING",
                "NLM_RETELL",
                "2025-2026",
                TimeOfYear::Boy,
                boy_score,
                boy_risk,
                0,
            ),
            observation(
                Uuid::new_v4(),
                "NLM_READING",
                "NLM_RETELL",
                "2025-2026",
                TimeOfYear::Moy,
                moy_score,
                moy_risk,
                120,
            ),
        ]
    }

    #[test]
    fn quarter_drop_flags_the_target() {
        let history = two_window_history(
            Some(20.0),
            Some(RiskLevel::Benchmark),
            Some(15.0),
            Some(RiskLevel::Benchmark),
        );
        let (declining, factors) = detect_decline(&build_trajectory(&history));
        assert!(declining);
        assert_eq!(factors, vec!["Declining NLM READING NLM RETELL scores"]);

        // Current risk benchmark while declining: medium probability.
        let alert = assess_student(&student("Maya Chen"), &history).unwrap();
        assert_eq!(alert.probability, Probability::Medium);
        assert_eq!(alert.current_risk, CurrentRisk::Benchmark);
    }

    #[test]
    fn threshold_is_inclusive_at_twenty_percent() {
        let exact = two_window_history(
            Some(20.0),
            Some(RiskLevel::Benchmark),
            Some(16.0),
            Some(RiskLevel::Benchmark),
        );
        let (declining, _) = detect_decline(&build_trajectory(&exact));
        assert!(declining);

        let shallow = two_window_history(
            Some(20.0),
            Some(RiskLevel::Benchmark),
            Some(18.0),
            Some(RiskLevel::Benchmark),
        );
        let (declining, factors) = detect_decline(&build_trajectory(&shallow));
        assert!(!declining);
        assert!(factors.is_empty());
    }

    #[test]
    fn escalation_flags_without_any_score_change() {
        let history = two_window_history(
            Some(10.0),
            Some(RiskLevel::Benchmark),
            Some(10.0),
            Some(RiskLevel::High),
        );
        let (declining, factors) = detect_decline(&build_trajectory(&history));
        assert!(declining);
        assert_eq!(
            factors,
            vec!["Risk escalated to high on NLM READING NLM RETELL"]
        );

        // Latest session is all high: high probability.
        let alert = assess_student(&student("Maya Chen"), &history).unwrap();
        assert_eq!(alert.probability, Probability::High);
        assert_eq!(alert.current_risk, CurrentRisk::High);
    }

    #[test]
    fn window_order_beats_input_and_entry_order() {
        // The BOY session was backfilled after the MOY session was recorded;
        // the trajectory must still read BOY -> MOY.
        let history = vec![
            observation(
                Uuid::new_v4(),
                "NLM_READING",
                "NLM_RETELL",
                "2025-2026",
                TimeOfYear::Moy,
                Some(12.0),
                Some(RiskLevel::Moderate),
                120,
            ),
            observation(
                Uuid::new_v4(),
                "NLM_READING",
                "NLM_RETELL",
                "2025-2026",
                TimeOfYear::Boy,
                Some(20.0),
                Some(RiskLevel::Benchmark),
                130,
            ),
        ];

        let trajectory = build_trajectory(&history);
        let points = &trajectory["NLM_READING_NLM_RETELL"];
        assert_eq!(points[0].time_of_year, TimeOfYear::Boy);
        assert_eq!(points[1].time_of_year, TimeOfYear::Moy);

        let (declining, _) = detect_decline(&trajectory);
        assert!(declining);
    }

    #[test]
    fn lone_high_point_reports_without_flagging() {
        let history = vec![observation(
            Uuid::new_v4(),
            "DDM_PA",
            "PHONEME_BLENDING",
            "2025-2026",
            TimeOfYear::Boy,
            Some(2.0),
            Some(RiskLevel::High),
            0,
        )];
        let (declining, factors) = detect_decline(&build_trajectory(&history));
        assert!(!declining);
        assert_eq!(factors, vec!["High risk on DDM PA PHONEME BLENDING"]);
        assert!(assess_student(&student("Maya Chen"), &history).is_none());
    }

    #[test]
    fn null_scores_skip_the_comparison() {
        let history = two_window_history(None, None, Some(8.0), None);
        let (declining, factors) = detect_decline(&build_trajectory(&history));
        assert!(!declining);
        assert!(factors.is_empty());

        // A zero previous score cannot produce a drop percentage either.
        let zero_previous = two_window_history(
            Some(0.0),
            Some(RiskLevel::High),
            Some(0.0),
            Some(RiskLevel::High),
        );
        let (declining, _) = detect_decline(&build_trajectory(&zero_previous));
        assert!(!declining);
    }

    #[test]
    fn only_the_latest_academic_year_counts() {
        let mut history = two_window_history(
            Some(20.0),
            Some(RiskLevel::Benchmark),
            Some(10.0),
            Some(RiskLevel::Moderate),
        );
        for obs in &mut history {
            obs.academic_year = "2024-2025".to_string();
        }
        history.push(observation(
            Uuid::new_v4(),
            "NLM_READING",
            "NLM_RETELL",
            "2025-2026",
            TimeOfYear::Boy,
            Some(21.0),
            Some(RiskLevel::Benchmark),
            365,
        ));

        let trajectory = build_trajectory(&history);
        assert_eq!(trajectory.len(), 1);
        assert_eq!(trajectory["NLM_READING_NLM_RETELL"].len(), 1);
        assert!(assess_student(&student("Maya Chen"), &history).is_none());
    }

    #[test]
    fn current_risk_majority_rules() {
        let session = Uuid::new_v4();
        let mut history = vec![
            observation(
                session,
                "NLM_READING",
                "NLM_RETELL",
                "2025-2026",
                TimeOfYear::Boy,
                Some(5.0),
                Some(RiskLevel::High),
                0,
            ),
            observation(
                session,
                "NLM_READING",
                "DECODING_FLUENCY",
                "2025-2026",
                TimeOfYear::Boy,
                Some(80.0),
                Some(RiskLevel::Benchmark),
                0,
            ),
        ];
        assert_eq!(current_risk(&history), CurrentRisk::High);

        history[0].risk_level = Some(RiskLevel::Moderate);
        assert_eq!(current_risk(&history), CurrentRisk::Moderate);

        history[0].risk_level = Some(RiskLevel::Benchmark);
        assert_eq!(current_risk(&history), CurrentRisk::Benchmark);

        history[0].risk_level = None;
        history[1].risk_level = None;
        assert_eq!(current_risk(&history), CurrentRisk::Unknown);
        assert_eq!(current_risk(&[]), CurrentRisk::Unknown);
    }

    #[test]
    fn unassessed_student_gets_a_data_gap_alert() {
        let alert = assess_student(&student("Rowan Ellis"), &[]).unwrap();
        assert_eq!(alert.probability, Probability::Medium);
        assert_eq!(alert.contributing_factors, vec!["No recent assessment"]);
        assert_eq!(alert.current_risk, CurrentRisk::Unknown);
        assert!(alert.latest_scores.is_empty());
    }

    #[test]
    fn report_sorts_by_urgency_then_name() {
        let escalating = student("Zoe Park");
        let gapped = student("Ben Ortiz");
        let steady = student("Ada Ruiz");

        let mut observations_by_student = HashMap::new();
        observations_by_student.insert(
            escalating.id,
            two_window_history(
                Some(10.0),
                Some(RiskLevel::Benchmark),
                Some(9.0),
                Some(RiskLevel::High),
            ),
        );
        observations_by_student.insert(
            steady.id,
            two_window_history(
                Some(10.0),
                Some(RiskLevel::Benchmark),
                Some(11.0),
                Some(RiskLevel::Benchmark),
            ),
        );

        let roster = vec![steady.clone(), escalating.clone(), gapped.clone()];
        let alerts = at_risk_report(&roster, &observations_by_student);

        let names: Vec<&str> = alerts
            .iter()
            .map(|alert| alert.student_name.as_str())
            .collect();
        assert_eq!(names, vec!["Zoe Park", "Ben Ortiz"]);
        assert_eq!(alerts[0].probability, Probability::High);
        assert_eq!(alerts[1].probability, Probability::Medium);
    }

    #[test]
    fn latest_scores_come_from_the_newest_session() {
        let old_session = Uuid::new_v4();
        let new_session = Uuid::new_v4();
        let history = vec![
            observation(
                old_session,
                "NLM_READING",
                "NLM_RETELL",
                "2025-2026",
                TimeOfYear::Boy,
                Some(18.0),
                Some(RiskLevel::Benchmark),
                0,
            ),
            observation(
                new_session,
                "NLM_READING",
                "NLM_RETELL",
                "2025-2026",
                TimeOfYear::Moy,
                Some(12.0),
                Some(RiskLevel::Moderate),
                120,
            ),
            observation(
                new_session,
                "NLM_READING",
                "DECODING_FLUENCY",
                "2025-2026",
                TimeOfYear::Moy,
                Some(62.0),
                Some(RiskLevel::Moderate),
                120,
            ),
        ];

        let scores = latest_scores(&history);
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].key, "NLM_READING_DECODING_FLUENCY");
        assert_eq!(scores[1].key, "NLM_READING_NLM_RETELL");
        assert_eq!(scores[1].raw_score, Some(12.0));
    }
}
