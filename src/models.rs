use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Student identifier. Ordering is plain string ordering, which is the
/// tie-break used by the priority ranking.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentId(String);

impl StudentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StudentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for StudentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One ingested row. Immutable for the lifetime of an analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub id: StudentId,
    pub name: String,
    pub department: Option<String>,
    pub semester: Option<String>,
    pub academic_year: Option<String>,
    /// Course or assignment name to grade on a 0-100 scale.
    pub grades: BTreeMap<String, f64>,
    /// Share of sessions attended, 0.0-1.0.
    pub attendance: Option<f64>,
    /// LMS logins in the reporting window.
    pub engagement: Option<u32>,
}

impl StudentRecord {
    pub fn new(id: impl Into<StudentId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            department: None,
            semester: None,
            academic_year: None,
            grades: BTreeMap::new(),
            attendance: None,
            engagement: None,
        }
    }

    pub fn with_grade(mut self, course: impl Into<String>, grade: f64) -> Self {
        self.grades.insert(course.into(), grade);
        self
    }

    pub fn with_attendance(mut self, ratio: f64) -> Self {
        self.attendance = Some(ratio);
        self
    }

    pub fn with_engagement(mut self, logins: u32) -> Self {
        self.engagement = Some(logins);
        self
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn with_semester(mut self, semester: impl Into<String>) -> Self {
        self.semester = Some(semester.into());
        self
    }

    pub fn with_academic_year(mut self, year: impl Into<String>) -> Self {
        self.academic_year = Some(year.into());
        self
    }

    pub fn period(&self) -> AcademicPeriod {
        AcademicPeriod {
            academic_year: self.academic_year.clone(),
            semester: self.semester.as_deref().and_then(|s| s.parse().ok()),
            semester_label: self.semester.clone(),
        }
    }
}

/// First record per id, in input order. Same rule the batch uses for
/// duplicate identifiers.
pub fn unique_records(records: &[StudentRecord]) -> Vec<&StudentRecord> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for record in records {
        if seen.insert(&record.id) {
            unique.push(record);
        }
    }
    unique
}

pub fn index_by_id(records: &[StudentRecord]) -> HashMap<&StudentId, &StudentRecord> {
    let mut index = HashMap::new();
    for record in records {
        index.entry(&record.id).or_insert(record);
    }
    index
}

/// Academic year plus semester. Orders chronologically when semesters are
/// numeric.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AcademicPeriod {
    pub academic_year: Option<String>,
    pub semester: Option<u32>,
    pub semester_label: Option<String>,
}

impl fmt::Display for AcademicPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.academic_year, &self.semester_label) {
            (Some(year), Some(semester)) => write!(f, "{year} - Sem {semester}"),
            (Some(year), None) => f.write_str(year),
            (None, Some(semester)) => write!(f, "Sem {semester}"),
            (None, None) => f.write_str("unspecified"),
        }
    }
}

/// The metrics the engine knows how to score. Declaration order is the
/// fixed priority used for flag ordering and score summation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Grades,
    Attendance,
    Engagement,
}

impl Metric {
    pub const PRIORITY: [Metric; 3] = [Metric::Grades, Metric::Attendance, Metric::Engagement];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Grades => "grades",
            Metric::Attendance => "attendance",
            Metric::Engagement => "engagement",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grades" => Ok(Metric::Grades),
            "attendance" => Ok(Metric::Attendance),
            "engagement" => Ok(Metric::Engagement),
            other => Err(format!("unknown metric '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricValue {
    /// Value as observed, after clamping to the metric's domain.
    pub raw: f64,
    /// Risk contribution in [0,1], 1.0 being the most at risk.
    pub risk: f64,
}

/// Per-student normalized metrics. Metrics with no data are simply absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedMetrics {
    pub student_id: StudentId,
    pub values: BTreeMap<Metric, MetricValue>,
}

impl NormalizedMetrics {
    pub fn get(&self, metric: Metric) -> Option<&MetricValue> {
        self.values.get(&metric)
    }

    pub fn risk(&self, metric: Metric) -> Option<f64> {
        self.values.get(&metric).map(|value| value.risk)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Unknown,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
            RiskTier::Unknown => "unknown",
        }
    }

    pub fn is_at_risk(&self) -> bool {
        matches!(self, RiskTier::Medium | RiskTier::High)
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskTier::Low),
            "medium" => Ok(RiskTier::Medium),
            "high" => Ok(RiskTier::High),
            "unknown" => Ok(RiskTier::Unknown),
            other => Err(format!("unknown risk tier '{other}'")),
        }
    }
}

/// A threshold breach worth surfacing to an advisor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Flag {
    pub metric: Metric,
    pub raw: f64,
    pub cutoff: f64,
    pub message: String,
}

impl Flag {
    pub fn name(&self) -> &'static str {
        self.metric.as_str()
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskResult {
    pub student_id: StudentId,
    /// `None` when the student could not be scored.
    pub score: Option<f64>,
    pub tier: RiskTier,
    /// 1 is the most urgent. Unscored students carry no rank.
    pub rank: Option<usize>,
    pub flags: Vec<Flag>,
}

impl RiskResult {
    pub fn flag_names(&self) -> Vec<&'static str> {
        self.flags.iter().map(Flag::name).collect()
    }
}
