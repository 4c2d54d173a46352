use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::benchmarks::{benchmark_key, BenchmarkTable};
use crate::models::{Grade, ObservationRecord, RiskLevel, StudentRecord, TimeOfYear};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Risk is attached to score rows at ingest, target-level rows only.
/// Sub-target rows are stored unclassified.
fn classify_at_ingest(
    table: &BenchmarkTable,
    subtest: &str,
    target: &str,
    sub_target: Option<&str>,
    grade_at_test: Grade,
    window: TimeOfYear,
    raw_score: Option<f64>,
) -> Option<RiskLevel> {
    if sub_target.is_some() {
        return None;
    }
    let key = benchmark_key(subtest, target)?;
    table.classify(key, grade_at_test, window, raw_score?)
}

async fn upsert_session(
    pool: &PgPool,
    student_id: Uuid,
    subtest: &str,
    grade_at_test: &str,
    academic_year: &str,
    time_of_year: &str,
    transcript: Option<&str>,
    completed_at: DateTime<Utc>,
) -> anyhow::Result<Uuid> {
    let session_id: Uuid = sqlx::query(
        r#"
        INSERT INTO literacy_screening.test_sessions AS ts
        (id, student_id, subtest, grade_at_test, academic_year, time_of_year,
         is_complete, transcript, completed_at)
        VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7, $8)
        ON CONFLICT (student_id, subtest, academic_year, time_of_year) DO UPDATE
        SET is_complete = TRUE,
            transcript = COALESCE(EXCLUDED.transcript, ts.transcript),
            completed_at = EXCLUDED.completed_at
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(student_id)
    .bind(subtest)
    .bind(grade_at_test)
    .bind(academic_year)
    .bind(time_of_year)
    .bind(transcript)
    .bind(completed_at)
    .fetch_one(pool)
    .await?
    .get("id");
    Ok(session_id)
}

async fn insert_score(
    pool: &PgPool,
    session_id: Uuid,
    target: &str,
    sub_target: Option<&str>,
    raw_score: Option<f64>,
    max_score: Option<f64>,
    risk_level: Option<RiskLevel>,
    source_key: &str,
) -> anyhow::Result<u64> {
    let result = sqlx::query(
        r#"
        INSERT INTO literacy_screening.scores
        (id, session_id, target, sub_target, raw_score, max_score, risk_level, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(session_id)
    .bind(target)
    .bind(sub_target)
    .bind(raw_score)
    .bind(max_score)
    .bind(risk_level.map(RiskLevel::as_str))
    .bind(source_key)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

struct SeedScore {
    source_key: &'static str,
    target: &'static str,
    sub_target: Option<&'static str>,
    raw_score: Option<f64>,
    max_score: Option<f64>,
}

struct SeedSession {
    external_id: &'static str,
    subtest: &'static str,
    grade_at_test: &'static str,
    academic_year: &'static str,
    time_of_year: &'static str,
    completed_on: (i32, u32, u32),
    transcript: Option<&'static str>,
    scores: Vec<SeedScore>,
}

pub async fn seed(pool: &PgPool, table: &BenchmarkTable) -> anyhow::Result<()> {
    let students = vec![
        (
            "8d9f1c5a-4b7e-4f2d-9a31-6c2e58d0b914",
            "LS-1001",
            "Maya Chen",
            "3",
            "Lincoln Elementary",
        ),
        (
            "2a6b83d7-91c4-4e0a-b5f2-d8047cf3a1e6",
            "LS-1002",
            "Theo Brooks",
            "1",
            "Lincoln Elementary",
        ),
        (
            "c4e19f02-7d38-45b6-8e4a-1f9b62a5d073",
            "LS-1003",
            "Ava Flores",
            "2",
            "Riverside Elementary",
        ),
        (
            "5b37ad84-c612-49f5-a0d8-3e75b19c46f2",
            "LS-1004",
            "Rowan Ellis",
            "K",
            "Riverside Elementary",
        ),
    ];

    for (id, external_id, full_name, grade, school) in students {
        sqlx::query(
            r#"
            INSERT INTO literacy_screening.students (id, external_id, full_name, grade, school)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (external_id) DO UPDATE
            SET full_name = EXCLUDED.full_name, grade = EXCLUDED.grade, school = EXCLUDED.school
            "#,
        )
        .bind(Uuid::parse_str(id)?)
        .bind(external_id)
        .bind(full_name)
        .bind(grade)
        .bind(school)
        .execute(pool)
        .await?;
    }

    // Maya declines across BOY -> MOY; Theo drops into high risk on phoneme
    // segmentation; Ava holds benchmark; Rowan has no sessions at all.
    let sessions = vec![
        SeedSession {
            external_id: "LS-1001",
            subtest: "NLM_READING",
            grade_at_test: "3",
            academic_year: "2025-2026",
            time_of_year: "BOY",
            completed_on: (2025, 9, 24),
            transcript: None,
            scores: vec![
                SeedScore {
                    source_key: "seed-001",
                    target: "NLM_RETELL",
                    sub_target: None,
                    raw_score: Some(14.0),
                    max_score: Some(33.0),
                },
                SeedScore {
                    source_key: "seed-002",
                    target: "NLM_QUESTIONS",
                    sub_target: None,
                    raw_score: Some(7.0),
                    max_score: Some(10.0),
                },
                SeedScore {
                    source_key: "seed-003",
                    target: "DECODING_FLUENCY",
                    sub_target: None,
                    raw_score: Some(72.0),
                    max_score: None,
                },
            ],
        },
        SeedSession {
            external_id: "LS-1001",
            subtest: "NLM_READING",
            grade_at_test: "3",
            academic_year: "2025-2026",
            time_of_year: "MOY",
            completed_on: (2026, 1, 21),
            transcript: Some(
                "There was a girl named Maya who lost her dog. She was very worried because \
                 he ran away. She looked everywhere around the neighborhood. She asked her \
                 friends to help search. Finally they found him in the park playing with \
                 other dogs. Maya was so happy and relieved that she hugged him tightly.",
            ),
            scores: vec![
                SeedScore {
                    source_key: "seed-004",
                    target: "NLM_RETELL",
                    sub_target: None,
                    raw_score: Some(10.0),
                    max_score: Some(33.0),
                },
                SeedScore {
                    source_key: "seed-005",
                    target: "NLM_QUESTIONS",
                    sub_target: None,
                    raw_score: Some(6.0),
                    max_score: Some(10.0),
                },
                SeedScore {
                    source_key: "seed-006",
                    target: "DECODING_FLUENCY",
                    sub_target: None,
                    raw_score: Some(56.0),
                    max_score: None,
                },
                SeedScore {
                    source_key: "seed-007",
                    target: "NLM_RETELL",
                    sub_target: Some("EC1"),
                    raw_score: Some(2.0),
                    max_score: Some(3.0),
                },
                SeedScore {
                    source_key: "seed-008",
                    target: "NLM_RETELL",
                    sub_target: Some("SC"),
                    raw_score: Some(1.0),
                    max_score: Some(3.0),
                },
                SeedScore {
                    source_key: "seed-009",
                    target: "NLM_RETELL",
                    sub_target: Some("NDC"),
                    raw_score: Some(1.0),
                    max_score: Some(3.0),
                },
            ],
        },
        SeedSession {
            external_id: "LS-1002",
            subtest: "DDM_PA",
            grade_at_test: "1",
            academic_year: "2025-2026",
            time_of_year: "BOY",
            completed_on: (2025, 9, 26),
            transcript: None,
            scores: vec![
                SeedScore {
                    source_key: "seed-010",
                    target: "PHONEME_SEGMENTATION",
                    sub_target: None,
                    raw_score: Some(15.0),
                    max_score: Some(32.0),
                },
                SeedScore {
                    source_key: "seed-011",
                    target: "PHONEME_BLENDING",
                    sub_target: None,
                    raw_score: Some(13.0),
                    max_score: Some(20.0),
                },
            ],
        },
        SeedSession {
            external_id: "LS-1002",
            subtest: "DDM_PA",
            grade_at_test: "1",
            academic_year: "2025-2026",
            time_of_year: "MOY",
            completed_on: (2026, 1, 23),
            transcript: None,
            scores: vec![
                SeedScore {
                    source_key: "seed-012",
                    target: "PHONEME_SEGMENTATION",
                    sub_target: None,
                    raw_score: Some(9.0),
                    max_score: Some(32.0),
                },
                SeedScore {
                    source_key: "seed-013",
                    target: "PHONEME_BLENDING",
                    sub_target: None,
                    raw_score: Some(12.0),
                    max_score: Some(20.0),
                },
            ],
        },
        SeedSession {
            external_id: "LS-1003",
            subtest: "NLM_LISTENING",
            grade_at_test: "2",
            academic_year: "2025-2026",
            time_of_year: "BOY",
            completed_on: (2025, 9, 25),
            transcript: None,
            scores: vec![
                SeedScore {
                    source_key: "seed-014",
                    target: "NLM_RETELL",
                    sub_target: None,
                    raw_score: Some(13.0),
                    max_score: Some(33.0),
                },
                SeedScore {
                    source_key: "seed-015",
                    target: "NLM_QUESTIONS",
                    sub_target: None,
                    raw_score: Some(7.0),
                    max_score: Some(10.0),
                },
            ],
        },
        SeedSession {
            external_id: "LS-1003",
            subtest: "NLM_LISTENING",
            grade_at_test: "2",
            academic_year: "2025-2026",
            time_of_year: "MOY",
            completed_on: (2026, 1, 22),
            transcript: Some(
                "The story is about two friends who wanted to build a treehouse. They \
                 collected wood from the forest but then it started raining. They were sad \
                 because they couldnt work. After the rain stopped they went back and \
                 finally built the treehouse. It was small but they were proud because they \
                 made it themselves.",
            ),
            scores: vec![
                SeedScore {
                    source_key: "seed-016",
                    target: "NLM_RETELL",
                    sub_target: None,
                    raw_score: Some(14.0),
                    max_score: Some(33.0),
                },
                SeedScore {
                    source_key: "seed-017",
                    target: "NLM_QUESTIONS",
                    sub_target: None,
                    raw_score: Some(7.0),
                    max_score: Some(10.0),
                },
            ],
        },
    ];

    for session in sessions {
        let student_id: Uuid = sqlx::query(
            "SELECT id FROM literacy_screening.students WHERE external_id = $1",
        )
        .bind(session.external_id)
        .fetch_one(pool)
        .await?
        .get("id");

        let grade_at_test: Grade = session
            .grade_at_test
            .parse()
            .context("seed session has an invalid grade")?;
        let window: TimeOfYear = session
            .time_of_year
            .parse()
            .context("seed session has an invalid window")?;
        let (year, month, day) = session.completed_on;
        let completed_at = NaiveDate::from_ymd_opt(year, month, day)
            .context("invalid date")?
            .and_hms_opt(14, 30, 0)
            .context("invalid time")?
            .and_utc();

        let session_id = upsert_session(
            pool,
            student_id,
            session.subtest,
            session.grade_at_test,
            session.academic_year,
            session.time_of_year,
            session.transcript,
            completed_at,
        )
        .await?;

        for score in session.scores {
            let risk = classify_at_ingest(
                table,
                session.subtest,
                score.target,
                score.sub_target,
                grade_at_test,
                window,
                score.raw_score,
            );
            insert_score(
                pool,
                session_id,
                score.target,
                score.sub_target,
                score.raw_score,
                score.max_score,
                risk,
                score.source_key,
            )
            .await?;
        }
    }

    Ok(())
}

pub async fn import_csv(
    pool: &PgPool,
    csv_path: &Path,
    table: &BenchmarkTable,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        external_id: String,
        full_name: String,
        grade: String,
        school: Option<String>,
        subtest: String,
        target: String,
        sub_target: Option<String>,
        raw_score: Option<f64>,
        max_score: Option<f64>,
        academic_year: String,
        time_of_year: String,
        grade_at_test: String,
        completed_on: NaiveDate,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let grade_at_test: Grade = row
            .grade_at_test
            .parse()
            .with_context(|| format!("row for {} has an invalid grade", row.external_id))?;
        let window: TimeOfYear = row
            .time_of_year
            .parse()
            .with_context(|| format!("row for {} has an invalid window", row.external_id))?;
        let completed_at = row
            .completed_on
            .and_hms_opt(12, 0, 0)
            .context("invalid completion date")?
            .and_utc();

        let student_id: Uuid = sqlx::query(
            r#"
            INSERT INTO literacy_screening.students (id, external_id, full_name, grade, school)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (external_id) DO UPDATE
            SET full_name = EXCLUDED.full_name, grade = EXCLUDED.grade, school = EXCLUDED.school
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&row.external_id)
        .bind(&row.full_name)
        .bind(&row.grade)
        .bind(&row.school)
        .fetch_one(pool)
        .await?
        .get("id");

        let session_id = upsert_session(
            pool,
            student_id,
            &row.subtest,
            &row.grade_at_test,
            &row.academic_year,
            &row.time_of_year,
            None,
            completed_at,
        )
        .await?;

        let risk = classify_at_ingest(
            table,
            &row.subtest,
            &row.target,
            row.sub_target.as_deref(),
            grade_at_test,
            window,
            row.raw_score,
        );
        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let affected = insert_score(
            pool,
            session_id,
            &row.target,
            row.sub_target.as_deref(),
            row.raw_score,
            row.max_score,
            risk,
            &source_key,
        )
        .await?;
        if affected > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}

pub async fn fetch_students(
    pool: &PgPool,
    grade: Option<&str>,
    school: Option<&str>,
) -> anyhow::Result<Vec<StudentRecord>> {
    let mut query = String::from(
        "SELECT id, full_name, grade, school FROM literacy_screening.students",
    );
    if grade.is_some() {
        query.push_str(" WHERE grade = $1");
    } else if school.is_some() {
        query.push_str(" WHERE school = $1");
    }
    query.push_str(" ORDER BY full_name");

    let mut rows = sqlx::query(&query);
    if let Some(value) = grade {
        rows = rows.bind(value);
    } else if let Some(value) = school {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    let mut students = Vec::new();
    for row in records {
        let grade_text: String = row.get("grade");
        students.push(StudentRecord {
            id: row.get("id"),
            full_name: row.get("full_name"),
            grade: grade_text
                .parse()
                .with_context(|| format!("student has an invalid stored grade `{grade_text}`"))?,
            school: row.get("school"),
        });
    }
    Ok(students)
}

/// Completed-session score rows joined with session and student, oldest
/// first. This is the read interface the screening core consumes.
pub async fn fetch_observations(
    pool: &PgPool,
    grade: Option<&str>,
    school: Option<&str>,
) -> anyhow::Result<Vec<ObservationRecord>> {
    let mut query = String::from(
        "SELECT st.id AS student_id, st.full_name, ts.id AS session_id, ts.subtest, \
         ts.academic_year, ts.time_of_year, ts.grade_at_test, ts.completed_at, \
         sc.target, sc.sub_target, sc.raw_score, sc.max_score, sc.risk_level \
         FROM literacy_screening.scores sc \
         JOIN literacy_screening.test_sessions ts ON ts.id = sc.session_id \
         JOIN literacy_screening.students st ON st.id = ts.student_id \
         WHERE ts.is_complete AND ts.completed_at IS NOT NULL",
    );
    if grade.is_some() {
        query.push_str(" AND st.grade = $1");
    } else if school.is_some() {
        query.push_str(" AND st.school = $1");
    }
    query.push_str(" ORDER BY ts.completed_at, sc.id");

    let mut rows = sqlx::query(&query);
    if let Some(value) = grade {
        rows = rows.bind(value);
    } else if let Some(value) = school {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    let mut observations = Vec::new();
    for row in records {
        let window_text: String = row.get("time_of_year");
        let grade_text: String = row.get("grade_at_test");
        let risk_text: Option<String> = row.get("risk_level");
        let risk_level = match risk_text {
            Some(text) => Some(
                text.parse::<RiskLevel>()
                    .with_context(|| format!("score has an invalid stored risk `{text}`"))?,
            ),
            None => None,
        };

        observations.push(ObservationRecord {
            student_id: row.get("student_id"),
            student_name: row.get("full_name"),
            session_id: row.get("session_id"),
            subtest: row.get("subtest"),
            target: row.get("target"),
            sub_target: row.get("sub_target"),
            raw_score: row.get("raw_score"),
            max_score: row.get("max_score"),
            academic_year: row.get("academic_year"),
            time_of_year: window_text
                .parse()
                .with_context(|| format!("session has an invalid stored window `{window_text}`"))?,
            grade_at_test: grade_text
                .parse()
                .with_context(|| format!("session has an invalid stored grade `{grade_text}`"))?,
            risk_level,
            completed_at: row.get("completed_at"),
        });
    }
    Ok(observations)
}

pub fn group_by_student(
    observations: Vec<ObservationRecord>,
) -> HashMap<Uuid, Vec<ObservationRecord>> {
    let mut grouped: HashMap<Uuid, Vec<ObservationRecord>> = HashMap::new();
    for obs in observations {
        grouped.entry(obs.student_id).or_default().push(obs);
    }
    grouped
}

pub async fn fetch_transcript(pool: &PgPool, session_id: Uuid) -> anyhow::Result<Option<String>> {
    let row = sqlx::query(
        "SELECT transcript FROM literacy_screening.test_sessions WHERE id = $1",
    )
    .bind(session_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.and_then(|row| row.get::<Option<String>, _>("transcript")))
}

/// Durable watchlist toggle. Returns whether the student is on the
/// watchlist after the call.
pub async fn toggle_watchlist(pool: &PgPool, student_id: Uuid) -> anyhow::Result<bool> {
    let removed = sqlx::query("DELETE FROM literacy_screening.watchlist WHERE student_id = $1")
        .bind(student_id)
        .execute(pool)
        .await?;
    if removed.rows_affected() > 0 {
        return Ok(false);
    }

    sqlx::query("INSERT INTO literacy_screening.watchlist (student_id) VALUES ($1)")
        .bind(student_id)
        .execute(pool)
        .await
        .context("failed to watchlist student (is the id known?)")?;
    Ok(true)
}

pub async fn watchlisted_students(pool: &PgPool) -> anyhow::Result<HashSet<Uuid>> {
    let rows = sqlx::query("SELECT student_id FROM literacy_screening.watchlist")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|row| row.get("student_id")).collect())
}
