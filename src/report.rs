use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ingest::SUBJECTS;
use crate::models::{
    index_by_id, unique_records, AcademicPeriod, RiskResult, RiskTier, StudentId, StudentRecord,
};
use crate::pipeline::{AnalysisReport, RejectedRecord};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub students: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub unknown: usize,
    /// Share of scored students in the Medium or High tier.
    pub at_risk_share: f64,
    pub average_grade: Option<f64>,
    pub average_attendance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepartmentSummary {
    pub department: String,
    pub students: usize,
    pub at_risk: usize,
    pub at_risk_share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectAverage {
    pub subject: String,
    pub average: f64,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodTrend {
    pub period: AcademicPeriod,
    pub label: String,
    pub rows: usize,
    pub average_grade: Option<f64>,
    pub average_attendance: Option<f64>,
}

#[derive(Serialize)]
struct JsonExport<'a> {
    generated_at: DateTime<Utc>,
    summary: Summary,
    departments: Vec<DepartmentSummary>,
    subjects: Vec<SubjectAverage>,
    trends: Vec<PeriodTrend>,
    results: &'a [RiskResult],
    rejected: &'a [RejectedRecord],
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (total, count) = values.fold((0.0, 0usize), |(total, count), v| (total + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(total / count as f64)
    }
}

pub fn summarize(report: &AnalysisReport, records: &[StudentRecord]) -> Summary {
    let accepted = unique_records(records);
    let counts = report.tier_counts();
    let count = |tier: RiskTier| counts.get(&tier).copied().unwrap_or(0);
    let (high, medium, low, unknown) = (
        count(RiskTier::High),
        count(RiskTier::Medium),
        count(RiskTier::Low),
        count(RiskTier::Unknown),
    );

    let scored = high + medium + low;
    let at_risk_share = if scored == 0 {
        0.0
    } else {
        (high + medium) as f64 / scored as f64
    };

    Summary {
        students: report.results.len(),
        high,
        medium,
        low,
        unknown,
        at_risk_share,
        average_grade: mean(accepted.iter().filter_map(|record| grade_average(record))),
        average_attendance: mean(accepted.iter().filter_map(|record| record.attendance)),
    }
}

pub fn summarize_by_department(
    report: &AnalysisReport,
    records: &[StudentRecord],
) -> Vec<DepartmentSummary> {
    let by_id = index_by_id(records);

    let mut tally: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for result in report.ranked() {
        let department = by_id
            .get(&result.student_id)
            .and_then(|record| record.department.as_deref())
            .unwrap_or("Unassigned");
        let entry = tally.entry(department).or_insert((0, 0));
        entry.0 += 1;
        if result.tier.is_at_risk() {
            entry.1 += 1;
        }
    }

    let mut summaries: Vec<DepartmentSummary> = tally
        .into_iter()
        .map(|(department, (students, at_risk))| DepartmentSummary {
            department: department.to_string(),
            students,
            at_risk,
            at_risk_share: at_risk as f64 / students as f64,
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.at_risk_share
            .total_cmp(&a.at_risk_share)
            .then_with(|| a.department.cmp(&b.department))
    });
    summaries
}

fn grade_average(record: &StudentRecord) -> Option<f64> {
    mean(record.grades.values().copied())
}

/// Mean grade per subject over every row that has one, highest first.
pub fn subject_averages<S: AsRef<str>>(
    rows: &[StudentRecord],
    subjects: &[S],
) -> Vec<SubjectAverage> {
    let mut averages: Vec<SubjectAverage> = subjects
        .iter()
        .filter_map(|subject| {
            let subject = subject.as_ref();
            let grades: Vec<f64> = rows
                .iter()
                .filter_map(|row| row.grades.get(subject).copied())
                .collect();
            let count = grades.len();
            mean(grades.into_iter()).map(|average| SubjectAverage {
                subject: subject.to_string(),
                average,
                rows: count,
            })
        })
        .collect();

    averages.sort_by(|a, b| {
        b.average
            .total_cmp(&a.average)
            .then_with(|| a.subject.cmp(&b.subject))
    });
    averages
}

/// Average grade and attendance per academic period, oldest first. Built
/// from every row, not just each student's latest.
pub fn period_trends(rows: &[StudentRecord]) -> Vec<PeriodTrend> {
    let mut periods: BTreeMap<AcademicPeriod, Vec<&StudentRecord>> = BTreeMap::new();
    for row in rows {
        periods.entry(row.period()).or_default().push(row);
    }

    periods
        .into_iter()
        .map(|(period, members)| PeriodTrend {
            label: period.to_string(),
            rows: members.len(),
            average_grade: mean(members.iter().filter_map(|row| grade_average(row))),
            average_attendance: mean(members.iter().filter_map(|row| row.attendance)),
            period,
        })
        .collect()
}

fn format_result(result: &RiskResult, records: &HashMap<&StudentId, &StudentRecord>) -> String {
    let name = records
        .get(&result.student_id)
        .map(|record| record.name.as_str())
        .unwrap_or("unknown");
    let mut line = match (result.rank, result.score) {
        (Some(rank), Some(score)) => format!(
            "{rank}. {name} ({}) {} risk, score {score:.2}",
            result.student_id, result.tier
        ),
        _ => format!("- {name} ({}) not scored", result.student_id),
    };
    if !result.flags.is_empty() {
        let reasons: Vec<String> = result.flags.iter().map(|flag| flag.to_string()).collect();
        let _ = write!(line, " [{}]", reasons.join("; "));
    }
    line
}

/// One line per result, for terminal output.
pub fn format_results(results: &[&RiskResult], records: &[StudentRecord]) -> Vec<String> {
    let by_id = index_by_id(records);
    results
        .iter()
        .map(|result| format_result(result, &by_id))
        .collect()
}

pub fn build_markdown(
    scope: Option<&str>,
    report: &AnalysisReport,
    records: &[StudentRecord],
    history: &[StudentRecord],
    limit: usize,
) -> String {
    let summary = summarize(report, records);
    let departments = summarize_by_department(report, records);
    let subjects = subject_averages(history, &SUBJECTS[..]);
    let trends = period_trends(history);
    let by_id = index_by_id(records);

    let mut output = String::new();
    let scope_label = scope.unwrap_or("all students");

    let _ = writeln!(output, "# Student Risk Report");
    let _ = writeln!(
        output,
        "Generated for {} at {}",
        scope_label,
        Utc::now().format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Key Metrics");
    let _ = writeln!(output, "- Students: {}", summary.students);
    let _ = writeln!(
        output,
        "- At risk (medium or high): {} ({:.1}%)",
        summary.high + summary.medium,
        summary.at_risk_share * 100.0
    );
    match summary.average_grade {
        Some(grade) => {
            let _ = writeln!(output, "- Average grade: {grade:.1}");
        }
        None => {
            let _ = writeln!(output, "- Average grade: n/a");
        }
    }
    match summary.average_attendance {
        Some(ratio) => {
            let _ = writeln!(output, "- Average attendance: {:.1}%", ratio * 100.0);
        }
        None => {
            let _ = writeln!(output, "- Average attendance: n/a");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Tier Mix");
    for (label, count) in [
        ("High", summary.high),
        ("Medium", summary.medium),
        ("Low", summary.low),
        ("Unknown", summary.unknown),
    ] {
        let _ = writeln!(output, "- {label}: {count}");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## At Risk by Department");
    if departments.is_empty() {
        let _ = writeln!(output, "No scored students.");
    } else {
        for department in &departments {
            let _ = writeln!(
                output,
                "- {}: {} of {} ({:.0}%)",
                department.department,
                department.at_risk,
                department.students,
                department.at_risk_share * 100.0
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Performance by Subject");
    if subjects.is_empty() {
        let _ = writeln!(output, "No subject grades recorded.");
    } else {
        for subject in &subjects {
            let _ = writeln!(
                output,
                "- {}: {:.1} across {} rows",
                subject.subject, subject.average, subject.rows
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Trends by Period");
    if trends.is_empty() {
        let _ = writeln!(output, "No rows recorded.");
    } else {
        for trend in &trends {
            let grade = trend
                .average_grade
                .map_or_else(|| "n/a".to_string(), |grade| format!("{grade:.1}"));
            let attendance = trend
                .average_attendance
                .map_or_else(|| "n/a".to_string(), |ratio| format!("{:.1}%", ratio * 100.0));
            let _ = writeln!(
                output,
                "- {}: average grade {grade}, attendance {attendance} ({} rows)",
                trend.label, trend.rows
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Priority Students");
    let mut ranked = report.ranked().peekable();
    if ranked.peek().is_none() {
        let _ = writeln!(output, "No scored students.");
    } else {
        for result in ranked.take(limit) {
            let _ = writeln!(output, "{}", format_result(result, &by_id));
        }
    }

    let unscored: Vec<&RiskResult> = report.unscored().collect();
    if !unscored.is_empty() || !report.rejected.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Unscored Students");
        for result in unscored {
            let _ = writeln!(output, "{}", format_result(result, &by_id));
        }
        for rejected in &report.rejected {
            let _ = writeln!(output, "- {} rejected: {}", rejected.student_id, rejected.reason);
        }
    }

    output
}

pub fn to_json(
    report: &AnalysisReport,
    records: &[StudentRecord],
    history: &[StudentRecord],
) -> anyhow::Result<String> {
    let export = JsonExport {
        generated_at: Utc::now(),
        summary: summarize(report, records),
        departments: summarize_by_department(report, records),
        subjects: subject_averages(history, &SUBJECTS[..]),
        trends: period_trends(history),
        results: &report.results,
        rejected: &report.rejected,
    };
    Ok(serde_json::to_string_pretty(&export)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{analyze, Execution};
    use crate::policy::ThresholdPolicy;

    fn sample() -> (Vec<StudentRecord>, AnalysisReport) {
        let records = vec![
            StudentRecord::new("S001", "Avery Lee")
                .with_department("Science")
                .with_grade("Mathematics", 40.0)
                .with_attendance(0.5)
                .with_engagement(0),
            StudentRecord::new("S002", "Jules Moreno")
                .with_department("Science")
                .with_grade("Mathematics", 90.0)
                .with_attendance(0.9),
            StudentRecord::new("S003", "Kiara Patel")
                .with_department("Arts")
                .with_grade("Arts", 80.0),
            StudentRecord::new("S004", "Rowan Diaz"),
        ];
        let report = analyze(&records, &ThresholdPolicy::default(), Execution::Sequential);
        (records, report)
    }

    #[test]
    fn summary_counts_tiers_and_averages() {
        let (records, report) = sample();
        let summary = summarize(&report, &records);

        assert_eq!(summary.students, 4);
        assert_eq!(summary.high, 1);
        assert_eq!(summary.low, 2);
        assert_eq!(summary.unknown, 1);
        assert!((summary.at_risk_share - 1.0 / 3.0).abs() < 1e-9);
        assert!((summary.average_grade.unwrap() - 70.0).abs() < 1e-9);
        assert!((summary.average_attendance.unwrap() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn departments_sorted_by_at_risk_share() {
        let (records, report) = sample();
        let departments = summarize_by_department(&report, &records);

        assert_eq!(departments[0].department, "Science");
        assert_eq!(departments[0].at_risk, 1);
        assert_eq!(departments[0].students, 2);
        assert_eq!(departments[1].department, "Arts");
    }

    #[test]
    fn markdown_lists_priority_and_unscored_students() {
        let (records, report) = sample();
        let markdown = build_markdown(Some("Science"), &report, &records, &records, 10);

        assert!(markdown.starts_with("# Student Risk Report"));
        assert!(markdown.contains("Generated for Science"));
        assert!(markdown.contains("1. Avery Lee (S001) high risk, score 0.65 [low grades"));
        assert!(markdown.contains("## Unscored Students"));
        assert!(markdown.contains("Rowan Diaz (S004) not scored"));
        assert!(markdown.contains("## Performance by Subject"));
        assert!(markdown.contains("- Arts: 80.0 across 1 rows"));
        assert!(markdown.contains("## Trends by Period"));
    }

    #[test]
    fn duplicate_ids_present_the_first_record() {
        let records = vec![
            StudentRecord::new("S001", "Avery Lee")
                .with_department("Science")
                .with_grade("Mathematics", 40.0)
                .with_attendance(0.1),
            StudentRecord::new("S001", "Zed Other")
                .with_department("Arts")
                .with_grade("Mathematics", 95.0)
                .with_attendance(0.9),
        ];
        let report = analyze(&records, &ThresholdPolicy::default(), Execution::Sequential);

        let ranked: Vec<&RiskResult> = report.ranked().collect();
        let lines = format_results(&ranked, &records);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("Avery Lee (S001)"), "{}", lines[0]);

        let departments = summarize_by_department(&report, &records);
        assert_eq!(departments.len(), 1);
        assert_eq!(departments[0].department, "Science");

        let summary = summarize(&report, &records);
        assert!((summary.average_attendance.unwrap() - 0.1).abs() < 1e-9);
        assert!((summary.average_grade.unwrap() - 40.0).abs() < 1e-9);

        let markdown = build_markdown(None, &report, &records, &records, 10);
        assert!(markdown.contains("Avery Lee (S001)"));
        assert!(!markdown.contains("Zed Other"));
    }

    #[test]
    fn subject_averages_skip_subjects_without_grades() {
        let (records, _) = sample();
        let averages = subject_averages(&records, &SUBJECTS[..]);

        assert_eq!(averages.len(), 2);
        assert_eq!(averages[0].subject, "Arts");
        assert_eq!(averages[0].rows, 1);
        assert_eq!(averages[1].subject, "Mathematics");
        assert!((averages[1].average - 65.0).abs() < 1e-9);
        assert_eq!(averages[1].rows, 2);
    }

    #[test]
    fn period_trends_use_every_row_in_chronological_order() {
        let history = vec![
            StudentRecord::new("S001", "Avery Lee")
                .with_academic_year("2025-2026")
                .with_semester("1")
                .with_grade("Mathematics", 50.0)
                .with_attendance(0.6),
            StudentRecord::new("S001", "Avery Lee")
                .with_academic_year("2024-2025")
                .with_semester("2")
                .with_grade("Mathematics", 70.0)
                .with_grade("Physics", 90.0)
                .with_attendance(0.9),
            StudentRecord::new("S002", "Jules Moreno")
                .with_academic_year("2025-2026")
                .with_semester("1")
                .with_grade("History", 70.0),
        ];
        let trends = period_trends(&history);

        assert_eq!(trends.len(), 2);
        assert_eq!(trends[0].label, "2024-2025 - Sem 2");
        assert_eq!(trends[0].rows, 1);
        assert!((trends[0].average_grade.unwrap() - 80.0).abs() < 1e-9);
        assert_eq!(trends[1].label, "2025-2026 - Sem 1");
        assert_eq!(trends[1].rows, 2);
        assert!((trends[1].average_grade.unwrap() - 60.0).abs() < 1e-9);
        assert!((trends[1].average_attendance.unwrap() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn json_export_contains_results() {
        let (records, report) = sample();
        let json = to_json(&report, &records, &records).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["results"][0]["student_id"], "S001");
        assert_eq!(value["results"][0]["tier"], "high");
        assert_eq!(value["results"][3]["tier"], "unknown");
        assert_eq!(value["summary"]["unknown"], 1);
        assert_eq!(value["subjects"][0]["subject"], "Arts");
        assert_eq!(value["trends"][0]["label"], "unspecified");
    }
}
