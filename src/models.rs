use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::grading::{Grade, Letter, Remark};

/// Which points table a subject is graded against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectClass {
    #[default]
    Principal,
    Subsidiary,
}

impl SubjectClass {
    pub fn as_str(self) -> &'static str {
        match self {
            SubjectClass::Principal => "principal",
            SubjectClass::Subsidiary => "subsidiary",
        }
    }
}

impl FromStr for SubjectClass {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "principal" => Ok(SubjectClass::Principal),
            "subsidiary" => Ok(SubjectClass::Subsidiary),
            other => Err(format!("unknown subject class '{other}'")),
        }
    }
}

/// Examination sitting a mark belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Component {
    #[serde(rename = "MID")]
    Mid,
    #[serde(rename = "EOT")]
    Eot,
    #[serde(rename = "AOI1")]
    Aoi1,
    #[serde(rename = "AOI2")]
    Aoi2,
    #[serde(rename = "AOI3")]
    Aoi3,
}

impl Component {
    pub fn label(self) -> &'static str {
        match self {
            Component::Mid => "MID",
            Component::Eot => "EOT",
            Component::Aoi1 => "AOI1",
            Component::Aoi2 => "AOI2",
            Component::Aoi3 => "AOI3",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One pivoted (student, subject) row for the A-Level report.
#[derive(Debug, Clone)]
pub struct ALevelMarkRow {
    pub student_id: i64,
    pub student_name: String,
    pub dob: Option<NaiveDate>,
    pub class_level: String,
    pub stream: String,
    pub subject: String,
    pub subject_class: SubjectClass,
    pub teacher_name: Option<String>,
    pub mid: Option<f64>,
    pub eot: Option<f64>,
}

/// One pivoted (student, subject) row for the O-Level report.
#[derive(Debug, Clone)]
pub struct OLevelMarkRow {
    pub student_id: i64,
    pub student_name: String,
    pub dob: Option<NaiveDate>,
    pub class_level: String,
    pub stream: String,
    pub subject: String,
    pub teacher_name: Option<String>,
    pub aoi1: Option<f64>,
    pub aoi2: Option<f64>,
    pub aoi3: Option<f64>,
}

/// Class and stream placement shared by every row of one student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Standing {
    pub class_position: usize,
    pub class_total: usize,
    pub stream_position: usize,
    pub stream_total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ALevelRankedRow {
    pub student_id: i64,
    pub student_name: String,
    pub dob: Option<NaiveDate>,
    pub class_level: String,
    pub stream: String,
    pub subject: String,
    pub subject_class: SubjectClass,
    pub teacher_name: Option<String>,
    pub mid: Option<f64>,
    pub eot: Option<f64>,
    pub average: f64,
    /// Letter score; subsidiary subjects are not lettered.
    pub score: Option<Letter>,
    pub grade: Grade,
    pub points: u32,
    #[serde(flatten)]
    pub standing: Standing,
}

#[derive(Debug, Clone, Serialize)]
pub struct OLevelRankedRow {
    pub student_id: i64,
    pub student_name: String,
    pub dob: Option<NaiveDate>,
    pub class_level: String,
    pub stream: String,
    pub subject: String,
    pub teacher_name: Option<String>,
    pub aoi1: Option<f64>,
    pub aoi2: Option<f64>,
    pub aoi3: Option<f64>,
    pub average: Option<f64>,
    pub remark: Remark,
    #[serde(flatten)]
    pub standing: Standing,
}
