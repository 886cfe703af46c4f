use anyhow::Context;
use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, info};

use crate::models::{ALevelMarkRow, Component, OLevelMarkRow, SubjectClass};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// One mark as submitted by a teacher, either from the seed set or a CSV.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct MarkSubmission {
    pub student_name: String,
    pub dob: Option<NaiveDate>,
    pub class_level: String,
    pub stream: String,
    pub subject: String,
    /// Left blank, an existing subject keeps its stored class and a new one
    /// starts as principal.
    #[serde(default)]
    pub subject_class: Option<SubjectClass>,
    pub teacher_name: Option<String>,
    pub component: Component,
    pub score: Option<f64>,
    pub term: String,
    pub year: i32,
}

async fn upsert_teacher(
    tx: &mut Transaction<'_, Postgres>,
    full_name: &str,
) -> anyhow::Result<i64> {
    let id = sqlx::query(
        r#"
        INSERT INTO term_report.teachers (full_name)
        VALUES ($1)
        ON CONFLICT (full_name) DO UPDATE SET full_name = EXCLUDED.full_name
        RETURNING id
        "#,
    )
    .bind(full_name)
    .fetch_one(&mut **tx)
    .await?
    .get("id");
    Ok(id)
}

async fn upsert_student(
    tx: &mut Transaction<'_, Postgres>,
    mark: &MarkSubmission,
) -> anyhow::Result<i64> {
    let id = sqlx::query(
        r#"
        INSERT INTO term_report.students (full_name, dob, class_level, stream)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (full_name, class_level, stream) DO UPDATE
        SET dob = COALESCE(EXCLUDED.dob, term_report.students.dob)
        RETURNING id
        "#,
    )
    .bind(&mark.student_name)
    .bind(mark.dob)
    .bind(&mark.class_level)
    .bind(&mark.stream)
    .fetch_one(&mut **tx)
    .await?
    .get("id");
    Ok(id)
}

async fn upsert_subject(
    tx: &mut Transaction<'_, Postgres>,
    name: &str,
    subject_class: Option<SubjectClass>,
) -> anyhow::Result<i64> {
    let id = sqlx::query(
        r#"
        INSERT INTO term_report.subjects (name, subject_class)
        VALUES ($1, COALESCE($2, 'principal'))
        ON CONFLICT (name) DO UPDATE
        SET subject_class = COALESCE($2, term_report.subjects.subject_class)
        RETURNING id
        "#,
    )
    .bind(name)
    .bind(subject_class.map(SubjectClass::as_str))
    .fetch_one(&mut **tx)
    .await?
    .get("id");
    Ok(id)
}

/// Writes one mark; a resubmission for the same key overwrites the score.
async fn upsert_mark(
    tx: &mut Transaction<'_, Postgres>,
    mark: &MarkSubmission,
) -> anyhow::Result<u64> {
    let student_id = upsert_student(tx, mark).await?;
    let subject_id = upsert_subject(tx, &mark.subject, mark.subject_class).await?;
    let teacher_id = match mark.teacher_name.as_deref() {
        Some(name) if !name.trim().is_empty() => Some(upsert_teacher(tx, name.trim()).await?),
        _ => None,
    };

    let result = sqlx::query(
        r#"
        INSERT INTO term_report.marks
        (student_id, subject_id, teacher_id, component, score, term, year)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (student_id, subject_id, component, term, year) DO UPDATE
        SET score = EXCLUDED.score,
            teacher_id = EXCLUDED.teacher_id,
            submitted_at = now()
        "#,
    )
    .bind(student_id)
    .bind(subject_id)
    .bind(teacher_id)
    .bind(mark.component.label())
    .bind(mark.score)
    .bind(&mark.term)
    .bind(mark.year)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected())
}

/// Applies a batch of submissions atomically and returns how many were written.
pub async fn submit_marks(pool: &PgPool, marks: &[MarkSubmission]) -> anyhow::Result<usize> {
    let mut tx = pool.begin().await?;
    let mut written = 0usize;

    for mark in marks {
        let affected = upsert_mark(&mut tx, mark).await.with_context(|| {
            format!(
                "failed to store {} mark for {}",
                mark.component, mark.student_name
            )
        })?;
        if affected > 0 {
            written += 1;
        }
    }

    tx.commit().await?;
    info!(written, "marks submitted");
    Ok(written)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<usize> {
    let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).context("invalid date");
    let births = [
        ("Jane Doe", date(2007, 3, 14)?),
        ("Peter Mugisha", date(2006, 11, 2)?),
        ("Ruth Achieng", date(2007, 1, 22)?),
    ];
    let teachers = [
        ("History", "Ms. Namata"),
        ("General Paper", "Mr. Okello"),
        ("Physics", "Mr. Ssempa"),
        ("Subsidiary ICT", "Mr. Ssempa"),
    ];
    let a_level = [
        ("Jane Doe", "Arts", "History", SubjectClass::Principal, 62.0, 71.0),
        ("Jane Doe", "Arts", "General Paper", SubjectClass::Subsidiary, 55.0, 48.0),
        ("Peter Mugisha", "Arts", "History", SubjectClass::Principal, 48.0, 57.0),
        ("Peter Mugisha", "Arts", "General Paper", SubjectClass::Subsidiary, 40.0, 46.0),
        ("Ruth Achieng", "Sciences", "Physics", SubjectClass::Principal, 78.0, 83.0),
        ("Ruth Achieng", "Sciences", "Subsidiary ICT", SubjectClass::Subsidiary, 66.0, 70.0),
    ];

    let mut marks = Vec::new();
    for (name, stream, subject, subject_class, mid, eot) in a_level {
        let dob = births
            .iter()
            .find(|(student, _)| *student == name)
            .map(|(_, dob)| *dob);
        let teacher = teachers
            .iter()
            .find(|(taught, _)| *taught == subject)
            .map(|(_, teacher)| teacher.to_string());
        for (component, score) in [(Component::Mid, mid), (Component::Eot, eot)] {
            marks.push(MarkSubmission {
                student_name: name.to_string(),
                dob,
                class_level: "S5".to_string(),
                stream: stream.to_string(),
                subject: subject.to_string(),
                subject_class: Some(subject_class),
                teacher_name: teacher.clone(),
                component,
                score: Some(score),
                term: "Term 1".to_string(),
                year: 2024,
            });
        }
    }

    let o_level = [
        ("Daniel Kato", "North", "Biology", [Some(1.0), None, Some(2.0)]),
        ("Grace Auma", "North", "Biology", [Some(2.8), Some(2.6), Some(3.0)]),
        ("Isaac Opio", "South", "Biology", [Some(1.1), Some(1.3), Some(0.9)]),
    ];
    for (name, stream, subject, scores) in o_level {
        for (component, score) in [Component::Aoi1, Component::Aoi2, Component::Aoi3]
            .into_iter()
            .zip(scores)
        {
            marks.push(MarkSubmission {
                student_name: name.to_string(),
                dob: None,
                class_level: "S2".to_string(),
                stream: stream.to_string(),
                subject: subject.to_string(),
                subject_class: Some(SubjectClass::Principal),
                teacher_name: Some("Mrs. Nakato".to_string()),
                component,
                score,
                term: "Term 1".to_string(),
                year: 2024,
            });
        }
    }

    submit_marks(pool, &marks).await
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut marks = Vec::new();

    for (line, result) in reader.deserialize::<MarkSubmission>().enumerate() {
        let mark = result.with_context(|| format!("invalid mark on data row {}", line + 1))?;
        marks.push(mark);
    }

    debug!(rows = marks.len(), path = %csv_path.display(), "parsed mark csv");
    submit_marks(pool, &marks).await
}

const ALEVEL_QUERY: &str = r#"
    SELECT st.id AS student_id, st.full_name AS student_name, st.dob,
           st.class_level, st.stream, sj.name AS subject, sj.subject_class,
           MAX(t.full_name) AS teacher_name,
           MAX(CASE WHEN m.component = 'MID' THEN m.score END) AS mid,
           MAX(CASE WHEN m.component = 'EOT' THEN m.score END) AS eot
    FROM term_report.marks m
    JOIN term_report.students st ON st.id = m.student_id
    JOIN term_report.subjects sj ON sj.id = m.subject_id
    LEFT JOIN term_report.teachers t ON t.id = m.teacher_id
    WHERE st.class_level = $1 AND m.term = $2 AND m.year = $3
      AND m.component IN ('MID', 'EOT')
    GROUP BY st.id, st.full_name, st.dob, st.class_level, st.stream, sj.name, sj.subject_class
    ORDER BY st.full_name, sj.name, st.id
"#;

const OLEVEL_QUERY: &str = r#"
    SELECT st.id AS student_id, st.full_name AS student_name, st.dob,
           st.class_level, st.stream, sj.name AS subject,
           MAX(t.full_name) AS teacher_name,
           MAX(CASE WHEN m.component = 'AOI1' THEN m.score END) AS aoi1,
           MAX(CASE WHEN m.component = 'AOI2' THEN m.score END) AS aoi2,
           MAX(CASE WHEN m.component = 'AOI3' THEN m.score END) AS aoi3
    FROM term_report.marks m
    JOIN term_report.students st ON st.id = m.student_id
    JOIN term_report.subjects sj ON sj.id = m.subject_id
    LEFT JOIN term_report.teachers t ON t.id = m.teacher_id
    WHERE st.class_level = $1 AND m.term = $2 AND m.year = $3
      AND m.component IN ('AOI1', 'AOI2', 'AOI3')
    GROUP BY st.id, st.full_name, st.dob, st.class_level, st.stream, sj.name
    ORDER BY st.full_name, sj.name, st.id
"#;

/// Every A-Level (student, subject) row of a class for one term.
pub async fn fetch_alevel_marks(
    pool: &PgPool,
    class_level: &str,
    term: &str,
    year: i32,
) -> Result<Vec<ALevelMarkRow>, sqlx::Error> {
    let records = sqlx::query(ALEVEL_QUERY)
        .bind(class_level)
        .bind(term)
        .bind(year)
        .fetch_all(pool)
        .await?;

    let mut rows = Vec::with_capacity(records.len());
    for row in records {
        let subject_class: String = row.get("subject_class");
        rows.push(ALevelMarkRow {
            student_id: row.get("student_id"),
            student_name: row.get("student_name"),
            dob: row.get("dob"),
            class_level: row.get("class_level"),
            stream: row.get("stream"),
            subject: row.get("subject"),
            subject_class: subject_class
                .parse()
                .map_err(|err: String| sqlx::Error::Decode(err.into()))?,
            teacher_name: row.get("teacher_name"),
            mid: row.get("mid"),
            eot: row.get("eot"),
        });
    }

    debug!(class_level, term, year, rows = rows.len(), "fetched a-level marks");
    Ok(rows)
}

/// Every O-Level (student, subject) row of a class for one term.
pub async fn fetch_olevel_marks(
    pool: &PgPool,
    class_level: &str,
    term: &str,
    year: i32,
) -> Result<Vec<OLevelMarkRow>, sqlx::Error> {
    let records = sqlx::query(OLEVEL_QUERY)
        .bind(class_level)
        .bind(term)
        .bind(year)
        .fetch_all(pool)
        .await?;

    let rows: Vec<OLevelMarkRow> = records
        .into_iter()
        .map(|row| OLevelMarkRow {
            student_id: row.get("student_id"),
            student_name: row.get("student_name"),
            dob: row.get("dob"),
            class_level: row.get("class_level"),
            stream: row.get("stream"),
            subject: row.get("subject"),
            teacher_name: row.get("teacher_name"),
            aoi1: row.get("aoi1"),
            aoi2: row.get("aoi2"),
            aoi3: row.get("aoi3"),
        })
        .collect();

    debug!(class_level, term, year, rows = rows.len(), "fetched o-level marks");
    Ok(rows)
}
