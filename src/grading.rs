use serde::Serialize;

use crate::models::SubjectClass;

/// Half-up rounding to one decimal place: `floor(10x + 0.5) / 10`.
pub fn round_one_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

fn present(score: Option<f64>) -> Option<f64> {
    score.filter(|value| value.is_finite())
}

/// Mean of the MID and EOT marks, counting an unsat component as zero.
pub fn calc_average(mid: Option<f64>, eot: Option<f64>) -> f64 {
    let sum = present(mid).unwrap_or(0.0) + present(eot).unwrap_or(0.0);
    round_one_decimal(sum / 2.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Letter {
    D1,
    D2,
    C3,
    C4,
    C5,
    C6,
    P7,
    P8,
    F9,
}

impl Letter {
    pub fn as_str(self) -> &'static str {
        match self {
            Letter::D1 => "D1",
            Letter::D2 => "D2",
            Letter::C3 => "C3",
            Letter::C4 => "C4",
            Letter::C5 => "C5",
            Letter::C6 => "C6",
            Letter::P7 => "P7",
            Letter::P8 => "P8",
            Letter::F9 => "F9",
        }
    }

    pub fn grade(self) -> Grade {
        match self {
            Letter::D1 | Letter::D2 => Grade::A,
            Letter::C3 => Grade::B,
            Letter::C4 | Letter::C5 | Letter::C6 => Grade::C,
            Letter::P7 => Grade::D,
            Letter::P8 => Grade::E,
            Letter::F9 => Grade::F,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    E,
    /// Subsidiary pass; only reachable through the subsidiary rule.
    O,
    F,
}

impl Grade {
    pub fn as_str(self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::E => "E",
            Grade::O => "O",
            Grade::F => "F",
        }
    }

    pub fn points(self) -> u32 {
        match self {
            Grade::A => 6,
            Grade::B => 5,
            Grade::C => 4,
            Grade::D => 3,
            Grade::E => 2,
            Grade::O => 1,
            Grade::F => 0,
        }
    }
}

/// A-Level letter table. Anything that is not above a breakpoint, NaN
/// included, lands in F9.
pub fn score_from_average(average: f64) -> Letter {
    const TABLE: [(f64, Letter); 8] = [
        (34.0, Letter::F9),
        (44.0, Letter::P8),
        (49.0, Letter::P7),
        (54.0, Letter::C6),
        (59.0, Letter::C5),
        (64.0, Letter::C4),
        (74.0, Letter::C3),
        (79.0, Letter::D2),
    ];

    if average.is_nan() {
        return Letter::F9;
    }

    TABLE
        .iter()
        .find(|(upper, _)| average <= *upper)
        .map(|(_, letter)| *letter)
        .unwrap_or(Letter::D1)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubjectGrade {
    pub average: f64,
    pub score: Option<Letter>,
    pub grade: Grade,
    pub points: u32,
}

pub fn classify(subject_class: SubjectClass, mid: Option<f64>, eot: Option<f64>) -> SubjectGrade {
    let average = calc_average(mid, eot);
    classify_average(subject_class, average)
}

pub fn classify_average(subject_class: SubjectClass, average: f64) -> SubjectGrade {
    match subject_class {
        SubjectClass::Subsidiary => {
            let grade = if average >= 50.0 { Grade::O } else { Grade::F };
            SubjectGrade {
                average,
                score: None,
                grade,
                points: grade.points(),
            }
        }
        SubjectClass::Principal => {
            let letter = score_from_average(average);
            let grade = letter.grade();
            SubjectGrade {
                average,
                score: Some(letter),
                grade,
                points: grade.points(),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Remark {
    Basic,
    Moderate,
    Outstanding,
    Missed,
}

impl Remark {
    pub fn as_str(self) -> &'static str {
        match self {
            Remark::Basic => "BASIC",
            Remark::Moderate => "MODERATE",
            Remark::Outstanding => "OUTSTANDING",
            Remark::Missed => "MISSED",
        }
    }
}

/// O-Level average over the AOI components that were actually sat.
pub fn olevel_average(components: [Option<f64>; 3]) -> Option<f64> {
    let sat: Vec<f64> = components.iter().filter_map(|score| present(*score)).collect();
    if sat.is_empty() {
        return None;
    }
    Some(round_one_decimal(sat.iter().sum::<f64>() / sat.len() as f64))
}

pub fn remark_from_average(average: Option<f64>) -> Remark {
    match average {
        Some(avg) if avg >= 2.5 => Remark::Outstanding,
        Some(avg) if avg >= 1.5 => Remark::Moderate,
        Some(avg) if avg >= 0.9 => Remark::Basic,
        _ => Remark::Missed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LETTERS: [Letter; 9] = [
        Letter::D1,
        Letter::D2,
        Letter::C3,
        Letter::C4,
        Letter::C5,
        Letter::C6,
        Letter::P7,
        Letter::P8,
        Letter::F9,
    ];

    fn grade_from_score(label: &str) -> &'static str {
        LETTERS
            .iter()
            .find(|letter| letter.as_str() == label)
            .map(|letter| letter.grade().as_str())
            .unwrap_or("")
    }

    #[test]
    fn both_missing_average_is_zero() {
        assert_eq!(calc_average(None, None), 0.0);
    }

    #[test]
    fn average_ignores_component_order() {
        let pairs = [
            (Some(60.0), Some(71.0)),
            (None, Some(33.0)),
            (Some(49.9), None),
            (Some(12.25), Some(87.5)),
        ];
        for (a, b) in pairs {
            assert_eq!(calc_average(a, b), calc_average(b, a));
        }
    }

    #[test]
    fn average_rounds_half_up_to_one_decimal() {
        assert_eq!(calc_average(Some(60.0), Some(70.0)), 65.0);
        assert_eq!(calc_average(Some(60.0), Some(71.0)), 65.5);
        assert_eq!(calc_average(Some(50.0), Some(50.5)), 50.3);
        assert_eq!(calc_average(Some(49.0), None), 24.5);
    }

    #[test]
    fn non_finite_component_counts_as_missing() {
        assert_eq!(calc_average(Some(f64::NAN), Some(80.0)), 40.0);
    }

    #[test]
    fn letter_boundaries_are_exact() {
        assert_eq!(score_from_average(34.0), Letter::F9);
        assert_eq!(score_from_average(35.0), Letter::P8);
        assert_eq!(score_from_average(44.0), Letter::P8);
        assert_eq!(score_from_average(49.0), Letter::P7);
        assert_eq!(score_from_average(54.0), Letter::C6);
        assert_eq!(score_from_average(59.0), Letter::C5);
        assert_eq!(score_from_average(64.0), Letter::C4);
        assert_eq!(score_from_average(74.0), Letter::C3);
        assert_eq!(score_from_average(79.0), Letter::D2);
        assert_eq!(score_from_average(80.0), Letter::D1);
    }

    #[test]
    fn out_of_range_average_falls_to_f9() {
        assert_eq!(score_from_average(-5.0), Letter::F9);
        assert_eq!(score_from_average(f64::NAN), Letter::F9);
    }

    #[test]
    fn grade_lookup_by_label() {
        assert_eq!(grade_from_score("D1"), "A");
        assert_eq!(grade_from_score("D2"), "A");
        assert_eq!(grade_from_score("C3"), "B");
        assert_eq!(grade_from_score("C6"), "C");
        assert_eq!(grade_from_score("P7"), "D");
        assert_eq!(grade_from_score("P8"), "E");
        assert_eq!(grade_from_score("F9"), "F");
        assert_eq!(grade_from_score("unknown"), "");
    }

    #[test]
    fn subsidiary_pass_mark_is_fifty() {
        let pass = classify_average(SubjectClass::Subsidiary, 50.0);
        assert_eq!(pass.grade, Grade::O);
        assert_eq!(pass.points, 1);
        assert_eq!(pass.score, None);

        let fail = classify_average(SubjectClass::Subsidiary, 49.9);
        assert_eq!(fail.grade, Grade::F);
        assert_eq!(fail.points, 0);
    }

    #[test]
    fn principal_runs_through_letter_table() {
        let graded = classify(SubjectClass::Principal, Some(60.0), Some(70.0));
        assert_eq!(graded.average, 65.0);
        assert_eq!(graded.score, Some(Letter::C3));
        assert_eq!(graded.grade, Grade::B);
        assert_eq!(graded.points, 5);
    }

    #[test]
    fn olevel_average_skips_unsat_components() {
        let average = olevel_average([Some(1.0), None, Some(2.0)]);
        assert_eq!(average, Some(1.5));
        assert_eq!(remark_from_average(average), Remark::Moderate);
    }

    #[test]
    fn olevel_all_missing_is_missed() {
        let average = olevel_average([None, None, None]);
        assert_eq!(average, None);
        assert_eq!(remark_from_average(average), Remark::Missed);
    }

    #[test]
    fn olevel_remark_tiers() {
        assert_eq!(remark_from_average(Some(0.9)), Remark::Basic);
        assert_eq!(remark_from_average(Some(1.4)), Remark::Basic);
        assert_eq!(remark_from_average(Some(2.4)), Remark::Moderate);
        assert_eq!(remark_from_average(Some(2.5)), Remark::Outstanding);
        assert_eq!(remark_from_average(Some(3.0)), Remark::Outstanding);
        assert_eq!(remark_from_average(Some(0.5)), Remark::Missed);
    }

    #[test]
    fn olevel_average_rounds_up_into_next_band() {
        let average = olevel_average([Some(1.4), Some(1.5), Some(1.5)]);
        assert_eq!(average, Some(1.5));
        assert_eq!(remark_from_average(average), Remark::Moderate);

        let average = olevel_average([Some(2.4), Some(2.4), Some(2.6)]);
        assert_eq!(average, Some(2.5));
        assert_eq!(remark_from_average(average), Remark::Outstanding);
    }

    #[test]
    fn olevel_average_rounds_down_within_band() {
        let average = olevel_average([Some(1.4), Some(1.4), Some(1.5)]);
        assert_eq!(average, Some(1.4));
        assert_eq!(remark_from_average(average), Remark::Basic);
    }

    #[test]
    fn olevel_non_finite_component_is_not_sat() {
        let average = olevel_average([Some(f64::NAN), Some(2.0), Some(f64::INFINITY)]);
        assert_eq!(average, Some(2.0));
        assert_eq!(remark_from_average(average), Remark::Moderate);

        assert_eq!(olevel_average([Some(f64::NAN), None, None]), None);
    }
}
