use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context};
use csv::StringRecord;
use tracing::debug;

use crate::models::{StudentId, StudentRecord};

pub const SUBJECTS: [&str; 15] = [
    "Mathematics",
    "Programming",
    "Statistics",
    "Database",
    "Algorithms",
    "Literature",
    "History",
    "Economics",
    "Psychology",
    "Chemistry",
    "Physics",
    "Biology",
    "Business",
    "Arts",
    "Languages",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceScale {
    /// 0-100
    Percent,
    /// 0.0-1.0
    Ratio,
}

/// Which spreadsheet column feeds which record field. Columns missing from
/// the header are treated as absent data, except the id column.
#[derive(Debug, Clone)]
pub struct ColumnMapping {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub department: String,
    pub semester: String,
    pub academic_year: String,
    pub attendance: String,
    pub attendance_scale: AttendanceScale,
    pub engagement: String,
    pub grade_columns: Vec<String>,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            id: "Student_ID".to_string(),
            first_name: "First_Name".to_string(),
            last_name: "Last_Name".to_string(),
            department: "Department".to_string(),
            semester: "Semester".to_string(),
            academic_year: "Academic_Year".to_string(),
            attendance: "Attendance_Perc".to_string(),
            attendance_scale: AttendanceScale::Percent,
            engagement: "LMS_Logins".to_string(),
            grade_columns: SUBJECTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

struct ResolvedColumns {
    id: usize,
    first_name: Option<usize>,
    last_name: Option<usize>,
    department: Option<usize>,
    semester: Option<usize>,
    academic_year: Option<usize>,
    attendance: Option<usize>,
    engagement: Option<usize>,
    grades: Vec<(String, usize)>,
}

impl ResolvedColumns {
    fn resolve(headers: &StringRecord, mapping: &ColumnMapping) -> anyhow::Result<Self> {
        let find = |name: &str| headers.iter().position(|header| header.trim() == name);

        let Some(id) = find(mapping.id.as_str()) else {
            bail!("missing required column '{}'", mapping.id);
        };

        let grades = mapping
            .grade_columns
            .iter()
            .filter_map(|course| find(course.as_str()).map(|index| (course.clone(), index)))
            .collect();

        Ok(Self {
            id,
            first_name: find(mapping.first_name.as_str()),
            last_name: find(mapping.last_name.as_str()),
            department: find(mapping.department.as_str()),
            semester: find(mapping.semester.as_str()),
            academic_year: find(mapping.academic_year.as_str()),
            attendance: find(mapping.attendance.as_str()),
            engagement: find(mapping.engagement.as_str()),
            grades,
        })
    }
}

pub fn read_records(
    path: &Path,
    mapping: &ColumnMapping,
    semester: Option<&str>,
) -> anyhow::Result<Vec<StudentRecord>> {
    Ok(latest_per_student(&read_history(path, mapping, semester)?))
}

/// Every row on file, one record per row, in file order.
pub fn read_history(
    path: &Path,
    mapping: &ColumnMapping,
    semester: Option<&str>,
) -> anyhow::Result<Vec<StudentRecord>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    read_history_from(file, mapping, semester)
        .with_context(|| format!("failed to import {}", path.display()))
}

pub fn read_from<R: Read>(
    source: R,
    mapping: &ColumnMapping,
    semester: Option<&str>,
) -> anyhow::Result<Vec<StudentRecord>> {
    Ok(latest_per_student(&read_history_from(source, mapping, semester)?))
}

pub fn read_history_from<R: Read>(
    source: R,
    mapping: &ColumnMapping,
    semester: Option<&str>,
) -> anyhow::Result<Vec<StudentRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(source);
    let headers = reader.headers()?.clone();
    let columns = ResolvedColumns::resolve(&headers, mapping)?;

    if semester.is_some() && columns.semester.is_none() {
        bail!(
            "missing column '{}' required by the semester filter",
            mapping.semester
        );
    }

    let mut rows = Vec::new();
    for row in reader.records() {
        let row = row?;
        let line = row.position().map(|p| p.line()).unwrap_or_default();

        if let Some(wanted) = semester {
            if cell(&row, columns.semester) != Some(wanted.trim()) {
                continue;
            }
        }

        let record = parse_row(&row, &columns, mapping)
            .with_context(|| format!("invalid row at line {line}"))?;
        rows.push(record);
    }

    debug!(count = rows.len(), "Read student rows");
    Ok(rows)
}

/// Collapses one-row-per-semester history to each student's most recent
/// row. Students keep the order of their first appearance; equal periods
/// resolve to the later row.
pub fn latest_per_student(rows: &[StudentRecord]) -> Vec<StudentRecord> {
    let mut order: Vec<&StudentId> = Vec::new();
    let mut latest: HashMap<&StudentId, &StudentRecord> = HashMap::new();

    for row in rows {
        let newer_on_file = latest
            .get(&row.id)
            .map(|existing| existing.period() > row.period());
        match newer_on_file {
            Some(true) => {
                debug!(student_id = %row.id, "Keeping more recent row");
            }
            Some(false) => {
                debug!(student_id = %row.id, "Replacing earlier row");
                latest.insert(&row.id, row);
            }
            None => {
                order.push(&row.id);
                latest.insert(&row.id, row);
            }
        }
    }

    let records: Vec<StudentRecord> = order
        .into_iter()
        .filter_map(|id| latest.get(id).map(|record| (*record).clone()))
        .collect();
    debug!(count = records.len(), "Collapsed to latest row per student");
    records
}

fn cell(row: &StringRecord, index: Option<usize>) -> Option<&str> {
    index
        .and_then(|index| row.get(index))
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn parse_number(row: &StringRecord, index: Option<usize>, column: &str) -> anyhow::Result<Option<f64>> {
    let Some(raw) = cell(row, index) else {
        return Ok(None);
    };
    let value: f64 = raw
        .parse()
        .with_context(|| format!("column '{column}' is not a number: '{raw}'"))?;
    if !value.is_finite() {
        bail!("column '{column}' is not a finite number: '{raw}'");
    }
    Ok(Some(value))
}

fn parse_row(
    row: &StringRecord,
    columns: &ResolvedColumns,
    mapping: &ColumnMapping,
) -> anyhow::Result<StudentRecord> {
    let Some(id) = cell(row, Some(columns.id)) else {
        bail!("column '{}' is empty", mapping.id);
    };

    let name = [cell(row, columns.first_name), cell(row, columns.last_name)]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    let mut record = StudentRecord::new(id, if name.is_empty() { id.to_string() } else { name });
    record.department = cell(row, columns.department).map(str::to_string);
    record.semester = cell(row, columns.semester).map(str::to_string);
    record.academic_year = cell(row, columns.academic_year).map(str::to_string);

    for (course, index) in &columns.grades {
        if let Some(grade) = parse_number(row, Some(*index), course)? {
            record.grades.insert(course.clone(), grade);
        }
    }

    record.attendance = parse_number(row, columns.attendance, &mapping.attendance)?.map(|value| {
        match mapping.attendance_scale {
            AttendanceScale::Percent => value / 100.0,
            AttendanceScale::Ratio => value,
        }
    });

    if let Some(logins) = parse_number(row, columns.engagement, &mapping.engagement)? {
        if logins < 0.0 || logins.fract() != 0.0 || logins > f64::from(u32::MAX) {
            bail!(
                "column '{}' must be a whole, non-negative count: '{logins}'",
                mapping.engagement
            );
        }
        record.engagement = Some(logins as u32);
    }

    Ok(record)
}
