use std::collections::BTreeMap;

use crate::error::{Result, ScoringError};
use crate::models::{Metric, MetricValue, NormalizedMetrics, StudentRecord};
use crate::policy::ThresholdPolicy;

pub fn normalize(record: &StudentRecord, policy: &ThresholdPolicy) -> Result<NormalizedMetrics> {
    if record.id.as_str().trim().is_empty() {
        return Err(ScoringError::malformed(&record.id, "empty student identifier"));
    }

    let mut values = BTreeMap::new();

    if let Some(average) = grade_average(record, policy)? {
        values.insert(
            Metric::Grades,
            MetricValue {
                raw: average,
                risk: grade_risk(average),
            },
        );
    }

    if let Some(ratio) = record.attendance {
        if !ratio.is_finite() {
            return Err(ScoringError::malformed(
                &record.id,
                format!("attendance ratio {ratio} is not a number"),
            ));
        }
        let ratio = ratio.clamp(0.0, 1.0);
        values.insert(
            Metric::Attendance,
            MetricValue {
                raw: ratio,
                risk: attendance_risk(ratio),
            },
        );
    }

    if let Some(logins) = record.engagement {
        let count = f64::from(logins);
        values.insert(
            Metric::Engagement,
            MetricValue {
                raw: count,
                risk: engagement_risk(count, policy.engagement_reference()),
            },
        );
    }

    Ok(NormalizedMetrics {
        student_id: record.id.clone(),
        values,
    })
}

/// Mean of the participating course grades, each clamped to 0-100 first.
fn grade_average(record: &StudentRecord, policy: &ThresholdPolicy) -> Result<Option<f64>> {
    let expected = policy.expected_grades();
    let mut total = 0.0;
    let mut count = 0usize;

    for (course, grade) in &record.grades {
        if !expected.is_empty() && !expected.contains(course) {
            continue;
        }
        if !grade.is_finite() {
            return Err(ScoringError::malformed(
                &record.id,
                format!("grade for '{course}' is not a number"),
            ));
        }
        total += grade.clamp(0.0, 100.0);
        count += 1;
    }

    if count == 0 {
        return Ok(None);
    }
    Ok(Some(total / count as f64))
}

pub fn grade_risk(grade: f64) -> f64 {
    (1.0 - grade.clamp(0.0, 100.0) / 100.0).clamp(0.0, 1.0)
}

pub fn attendance_risk(ratio: f64) -> f64 {
    (1.0 - ratio).clamp(0.0, 1.0)
}

pub fn engagement_risk(count: f64, reference: f64) -> f64 {
    (1.0 - count / reference).clamp(0.0, 1.0)
}
