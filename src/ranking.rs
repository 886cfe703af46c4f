use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;

use crate::models::Standing;

/// How students with equal totals are placed relative to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    /// Equal totals keep the order the students were first seen in.
    #[default]
    InsertionOrder,
    /// Equal totals are ordered by ascending student id.
    StudentId,
    /// Equal totals share a position; the next distinct total skips ahead.
    Shared,
}

impl FromStr for TieBreak {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "insertion" | "insertion-order" => Ok(TieBreak::InsertionOrder),
            "student-id" | "student_id" => Ok(TieBreak::StudentId),
            "shared" => Ok(TieBreak::Shared),
            other => Err(format!("unknown tie-break rule '{other}'")),
        }
    }
}

/// One student's ranking key. `total` is `None` when the student sat nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentTotal {
    pub student_id: i64,
    pub stream: String,
    pub total: Option<f64>,
}

pub fn stream_key(stream: &str) -> String {
    stream.trim().to_lowercase()
}

/// Descending by total, with a missing total below every real one.
fn compare_totals(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Positions for a cohort, keyed by student id.
fn rank_cohort(cohort: &[&StudentTotal], tie_break: TieBreak) -> HashMap<i64, usize> {
    let mut ordered: Vec<&StudentTotal> = cohort.to_vec();
    ordered.sort_by(|a, b| {
        let by_total = compare_totals(a.total, b.total);
        match tie_break {
            TieBreak::StudentId => by_total.then(a.student_id.cmp(&b.student_id)),
            TieBreak::InsertionOrder | TieBreak::Shared => by_total,
        }
    });

    let mut positions = HashMap::with_capacity(ordered.len());
    let mut previous: Option<(Option<f64>, usize)> = None;

    for (index, student) in ordered.iter().enumerate() {
        let mut position = index + 1;
        if tie_break == TieBreak::Shared {
            if let Some((total, shared)) = previous {
                if compare_totals(total, student.total) == Ordering::Equal {
                    position = shared;
                }
            }
            previous = Some((student.total, position));
        }
        positions.insert(student.student_id, position);
    }

    positions
}

/// Ranks every student across the whole class and within their own stream.
pub fn rank_students(students: &[StudentTotal], tie_break: TieBreak) -> HashMap<i64, Standing> {
    let everyone: Vec<&StudentTotal> = students.iter().collect();
    let class_positions = rank_cohort(&everyone, tie_break);
    let class_total = students.len();

    let mut streams: Vec<(String, Vec<&StudentTotal>)> = Vec::new();
    for student in students {
        let key = stream_key(&student.stream);
        match streams.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, members)) => members.push(student),
            None => streams.push((key, vec![student])),
        }
    }

    let mut standings = HashMap::with_capacity(students.len());
    for (_, members) in streams {
        let stream_positions = rank_cohort(&members, tie_break);
        let stream_total = members.len();
        for student in members {
            standings.insert(
                student.student_id,
                Standing {
                    class_position: class_positions[&student.student_id],
                    class_total,
                    stream_position: stream_positions[&student.student_id],
                    stream_total,
                },
            );
        }
    }

    standings
}
