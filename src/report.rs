use std::collections::{HashMap, HashSet};
use std::fmt::Write;

use uuid::Uuid;

use crate::models::{ObservationRecord, StudentRecord, Tier};
use crate::recommend;
use crate::tier;
use crate::trend;

/// Markdown roster report: tier distribution, decline flags, intervention
/// recommendations, and the most recent scores.
pub fn build_report(
    scope: Option<&str>,
    students: &[StudentRecord],
    observations_by_student: &HashMap<Uuid, Vec<ObservationRecord>>,
    watchlist: &HashSet<Uuid>,
) -> String {
    let mut output = String::new();
    let scope_label = scope.unwrap_or("all students");

    let _ = writeln!(output, "# Literacy Screening Report");
    let _ = writeln!(
        output,
        "Generated for {} ({} students on roster)",
        scope_label,
        students.len()
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Support Tier Distribution");

    let tiers: Vec<Tier> = students
        .iter()
        .filter_map(|student| {
            observations_by_student
                .get(&student.id)
                .and_then(|observations| tier::student_tier(observations).ok())
        })
        .collect();
    let summary = tier::tier_summary(&tiers);

    if summary.total == 0 {
        let _ = writeln!(output, "No classifiable scores for this roster.");
    } else {
        let _ = writeln!(
            output,
            "- Tier 1 (general instruction): {} students ({:.1}%)",
            summary.tier1.count, summary.tier1.pct
        );
        let _ = writeln!(
            output,
            "- Tier 2 (targeted support): {} students ({:.1}%)",
            summary.tier2.count, summary.tier2.pct
        );
        let _ = writeln!(
            output,
            "- Tier 3 (intensive support): {} students ({:.1}%)",
            summary.tier3.count, summary.tier3.pct
        );
        let _ = writeln!(
            output,
            "{} of {} students have classifiable scores.",
            summary.total,
            students.len()
        );
    }

    let alerts = trend::at_risk_report(students, observations_by_student);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Students Flagged For Decline");

    if alerts.is_empty() {
        let _ = writeln!(output, "No students currently flagged.");
    } else {
        for alert in &alerts {
            let school = alert.school.as_deref().unwrap_or("no school on record");
            let marker = if watchlist.contains(&alert.student_id) {
                " [watchlisted]"
            } else {
                ""
            };
            let _ = writeln!(
                output,
                "- {} (grade {}, {}){} probability {} (current risk {}): {}",
                alert.student_name,
                alert.grade,
                school,
                marker,
                alert.probability,
                alert.current_risk,
                alert.contributing_factors.join("; ")
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Intervention Recommendations");

    let mut any_recommendation = false;
    for alert in &alerts {
        let Some(observations) = observations_by_student.get(&alert.student_id) else {
            continue;
        };
        for obs in tier::latest_observations(observations) {
            let Some(risk) = obs.risk_level else {
                continue;
            };
            if let Some(text) = recommend::recommendation(&obs.subtest, &obs.target, risk) {
                any_recommendation = true;
                let _ = writeln!(
                    output,
                    "- {}, {} {} ({} risk): {}",
                    alert.student_name, obs.subtest, obs.target, risk, text
                );
            }
        }
    }
    if !any_recommendation {
        let _ = writeln!(output, "No flagged targets need intervention planning.");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Most Recent Scores");

    let mut recent: Vec<&ObservationRecord> = students
        .iter()
        .filter_map(|student| observations_by_student.get(&student.id))
        .flatten()
        .filter(|obs| obs.is_target_level())
        .collect();
    recent.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));

    if recent.is_empty() {
        let _ = writeln!(output, "No completed assessments for this roster.");
    } else {
        for obs in recent.iter().take(8) {
            let raw = match (obs.raw_score, obs.max_score) {
                (Some(raw), Some(max)) => format!("{raw}/{max}"),
                (Some(raw), None) => raw.to_string(),
                (None, _) => "n/a".to_string(),
            };
            let risk = obs.risk_level.map(|r| r.as_str()).unwrap_or("unclassified");
            let _ = writeln!(
                output,
                "- {} (grade {}): {} {} {} {}: {} ({})",
                obs.student_name,
                obs.grade_at_test,
                obs.subtest,
                obs.target,
                obs.time_of_year,
                obs.academic_year,
                raw,
                risk
            );
        }
    }

    output
}
