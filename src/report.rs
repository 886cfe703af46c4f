use std::collections::HashMap;
use std::fmt::Write;

use chrono::{Datelike, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::grading::{self, Remark};
use crate::models::{
    ALevelMarkRow, ALevelRankedRow, OLevelMarkRow, OLevelRankedRow, Standing, SubjectClass,
};
use crate::ranking::{self, StudentTotal, TieBreak};

/// Raw report parameters as they arrive from a query string or the CLI.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportParams {
    pub year: Option<i32>,
    pub term: Option<String>,
    pub class_level: Option<String>,
    pub stream: Option<String>,
    pub student_id: Option<i64>,
    pub tie_break: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("term is required")]
    MissingTerm,
    #[error("term must be 1, 2 or 3")]
    InvalidTerm,
    #[error("class_level is required")]
    MissingClassLevel,
    #[error("stream is required")]
    MissingStream,
    #[error("tie_break must be insertion, student-id or shared")]
    InvalidTieBreak,
    #[error("student_id is required")]
    MissingStudentId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportScope {
    Stream(String),
    Student(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRequest {
    pub year: i32,
    pub term: String,
    pub class_level: String,
    pub scope: ReportScope,
    pub tie_break: TieBreak,
}

fn required(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Accepts "1".."3" or "Term N" and returns the stored "Term N" label.
pub fn normalize_term(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let number = match trimmed.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("term") => trimmed[4..].trim(),
        _ => trimmed,
    };

    match number {
        "1" | "2" | "3" => Some(format!("Term {number}")),
        _ => None,
    }
}

impl ReportRequest {
    pub fn from_params(params: &ReportParams) -> Result<Self, RequestError> {
        let term = required(params.term.as_deref()).ok_or(RequestError::MissingTerm)?;
        let term = normalize_term(&term).ok_or(RequestError::InvalidTerm)?;
        let class_level =
            required(params.class_level.as_deref()).ok_or(RequestError::MissingClassLevel)?;

        let scope = match params.student_id {
            Some(student_id) => ReportScope::Student(student_id),
            None => ReportScope::Stream(
                required(params.stream.as_deref()).ok_or(RequestError::MissingStream)?,
            ),
        };

        let tie_break = match params.tie_break.as_deref() {
            Some(value) => value
                .parse::<TieBreak>()
                .map_err(|_| RequestError::InvalidTieBreak)?,
            None => TieBreak::default(),
        };

        Ok(Self {
            year: params.year.unwrap_or_else(|| Utc::now().year()),
            term,
            class_level,
            scope,
            tie_break,
        })
    }
}

impl ReportScope {
    fn admits(&self, student_id: i64, stream: &str) -> bool {
        match self {
            ReportScope::Student(wanted) => *wanted == student_id,
            ReportScope::Stream(wanted) => {
                ranking::stream_key(stream) == ranking::stream_key(wanted)
            }
        }
    }
}

/// Accumulates per-student totals in the order students are first seen.
#[derive(Default)]
struct TotalsBuilder {
    totals: Vec<StudentTotal>,
    index: HashMap<i64, usize>,
}

impl TotalsBuilder {
    fn add(&mut self, student_id: i64, stream: &str, contribution: Option<f64>) {
        let slot = *self.index.entry(student_id).or_insert_with(|| {
            self.totals.push(StudentTotal {
                student_id,
                stream: stream.to_string(),
                total: None,
            });
            self.totals.len() - 1
        });

        if let Some(value) = contribution {
            let total = &mut self.totals[slot].total;
            *total = Some(total.unwrap_or(0.0) + value);
        }
    }

    fn rank(&self, tie_break: TieBreak) -> HashMap<i64, Standing> {
        ranking::rank_students(&self.totals, tie_break)
    }
}

fn sat(score: Option<f64>) -> bool {
    score.is_some_and(f64::is_finite)
}

/// Grades, ranks and filters the pivoted A-Level rows of one class.
///
/// A subject only counts toward a student's points total when at least one
/// component was sat; a student with no sat components ranks below everyone.
pub fn assemble_alevel(
    rows: &[ALevelMarkRow],
    scope: &ReportScope,
    tie_break: TieBreak,
) -> Vec<ALevelRankedRow> {
    let mut totals = TotalsBuilder::default();
    let graded: Vec<_> = rows
        .iter()
        .map(|row| {
            let graded = grading::classify(row.subject_class, row.mid, row.eot);
            let counted = sat(row.mid) || sat(row.eot);
            totals.add(
                row.student_id,
                &row.stream,
                counted.then_some(graded.points as f64),
            );
            graded
        })
        .collect();

    let standings = totals.rank(tie_break);

    rows.iter()
        .zip(graded)
        .filter(|(row, _)| scope.admits(row.student_id, &row.stream))
        .filter_map(|(row, graded)| {
            let standing = *standings.get(&row.student_id)?;
            Some(ALevelRankedRow {
                student_id: row.student_id,
                student_name: row.student_name.clone(),
                dob: row.dob,
                class_level: row.class_level.clone(),
                stream: row.stream.clone(),
                subject: row.subject.clone(),
                subject_class: row.subject_class,
                teacher_name: row.teacher_name.clone(),
                mid: row.mid,
                eot: row.eot,
                average: graded.average,
                score: graded.score,
                grade: graded.grade,
                points: graded.points,
                standing,
            })
        })
        .collect()
}

/// Grades, ranks and filters the pivoted O-Level rows of one class.
///
/// O-Level subjects carry no points, so students are ranked on the sum of
/// their subject averages.
pub fn assemble_olevel(
    rows: &[OLevelMarkRow],
    scope: &ReportScope,
    tie_break: TieBreak,
) -> Vec<OLevelRankedRow> {
    let mut totals = TotalsBuilder::default();
    let averages: Vec<Option<f64>> = rows
        .iter()
        .map(|row| {
            let average = grading::olevel_average([row.aoi1, row.aoi2, row.aoi3]);
            totals.add(row.student_id, &row.stream, average);
            average
        })
        .collect();

    let standings = totals.rank(tie_break);

    rows.iter()
        .zip(averages)
        .filter(|(row, _)| scope.admits(row.student_id, &row.stream))
        .filter_map(|(row, average)| {
            let standing = *standings.get(&row.student_id)?;
            Some(OLevelRankedRow {
                student_id: row.student_id,
                student_name: row.student_name.clone(),
                dob: row.dob,
                class_level: row.class_level.clone(),
                stream: row.stream.clone(),
                subject: row.subject.clone(),
                teacher_name: row.teacher_name.clone(),
                aoi1: row.aoi1,
                aoi2: row.aoi2,
                aoi3: row.aoi3,
                average,
                remark: grading::remark_from_average(average),
                standing,
            })
        })
        .collect()
}

fn mark_cell(score: Option<f64>) -> String {
    match score {
        Some(value) => format!("{value:.1}"),
        None => "-".to_string(),
    }
}

/// Markdown report card for a single student's ranked A-Level rows.
pub fn build_report_card(term: &str, year: i32, rows: &[ALevelRankedRow]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# End of Term Report");
    let _ = writeln!(output, "{term}, {year}");
    let _ = writeln!(output);

    let Some(first) = rows.first() else {
        let _ = writeln!(output, "No marks recorded for this student.");
        return output;
    };

    let _ = writeln!(output, "## Student");
    let _ = writeln!(output, "- Name: {}", first.student_name);
    if let Some(dob) = first.dob {
        let _ = writeln!(output, "- Date of birth: {dob}");
    }
    let _ = writeln!(output, "- Class: {} {}", first.class_level, first.stream);
    let _ = writeln!(output);

    let _ = writeln!(output, "## Results");
    let _ = writeln!(
        output,
        "| Subject | MID | EOT | Average | Score | Grade | Points | Teacher |"
    );
    let _ = writeln!(output, "|---|---|---|---|---|---|---|---|");

    let mut principal_points = 0;
    let mut subsidiary_points = 0;
    for row in rows {
        match row.subject_class {
            SubjectClass::Principal => principal_points += row.points,
            SubjectClass::Subsidiary => subsidiary_points += row.points,
        }
        let _ = writeln!(
            output,
            "| {} | {} | {} | {:.1} | {} | {} | {} | {} |",
            row.subject,
            mark_cell(row.mid),
            mark_cell(row.eot),
            row.average,
            row.score.map(|letter| letter.as_str()).unwrap_or("-"),
            row.grade.as_str(),
            row.points,
            row.teacher_name.as_deref().unwrap_or("-"),
        );
    }

    let standing = first.standing;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");
    let _ = writeln!(output, "- Principal points: {principal_points}");
    let _ = writeln!(output, "- Subsidiary points: {subsidiary_points}");
    let _ = writeln!(
        output,
        "- Total points: {}",
        principal_points + subsidiary_points
    );
    let _ = writeln!(
        output,
        "- Class position: {} of {}",
        standing.class_position, standing.class_total
    );
    let _ = writeln!(
        output,
        "- Stream position: {} of {}",
        standing.stream_position, standing.stream_total
    );

    output
}

/// Short remark tally for an O-Level class, used by the CLI summary.
pub fn summarize_remarks(rows: &[OLevelRankedRow]) -> Vec<(Remark, usize)> {
    let order = [
        Remark::Outstanding,
        Remark::Moderate,
        Remark::Basic,
        Remark::Missed,
    ];
    order
        .into_iter()
        .map(|remark| {
            let count = rows.iter().filter(|row| row.remark == remark).count();
            (remark, count)
        })
        .filter(|(_, count)| *count > 0)
        .collect()
}
