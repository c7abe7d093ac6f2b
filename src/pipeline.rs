use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::alerts;
use crate::classify::classify;
use crate::error::{Result, ScoringError};
use crate::models::{Flag, RiskResult, RiskTier, StudentId, StudentRecord};
use crate::normalize::normalize;
use crate::policy::ThresholdPolicy;
use crate::risk;

/// How the per-student stage is executed. Output is identical either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Execution {
    #[default]
    Sequential,
    Parallel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedRecord {
    pub student_id: StudentId,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    /// Priority order: ranked students first, then the `Unknown` tier.
    pub results: Vec<RiskResult>,
    /// Records that broke the ingestion contract, in input order.
    pub rejected: Vec<RejectedRecord>,
}

impl AnalysisReport {
    pub fn get(&self, student_id: &StudentId) -> Option<&RiskResult> {
        self.results.iter().find(|result| &result.student_id == student_id)
    }

    pub fn ranked(&self) -> impl Iterator<Item = &RiskResult> {
        self.results.iter().filter(|result| result.rank.is_some())
    }

    pub fn unscored(&self) -> impl Iterator<Item = &RiskResult> {
        self.results.iter().filter(|result| result.rank.is_none())
    }

    pub fn tier_counts(&self) -> BTreeMap<RiskTier, usize> {
        let mut counts = BTreeMap::new();
        for result in &self.results {
            *counts.entry(result.tier).or_insert(0) += 1;
        }
        counts
    }
}

struct Assessment {
    student_id: StudentId,
    outcome: Result<f64>,
    flags: Vec<Flag>,
}

fn assess(record: &StudentRecord, policy: &ThresholdPolicy) -> Assessment {
    match normalize(record, policy) {
        Ok(metrics) => Assessment {
            student_id: record.id.clone(),
            outcome: risk::score(&metrics, policy),
            flags: alerts::flags(&metrics, policy),
        },
        Err(err) => Assessment {
            student_id: record.id.clone(),
            outcome: Err(err),
            flags: Vec::new(),
        },
    }
}

pub fn analyze(
    records: &[StudentRecord],
    policy: &ThresholdPolicy,
    execution: Execution,
) -> AnalysisReport {
    let run_id = Uuid::new_v4();
    let span = info_span!("analysis", %run_id, students = records.len());
    let _guard = span.enter();

    debug!(?execution, "Assessing students");
    let assessments: Vec<Assessment> = match execution {
        Execution::Sequential => records.iter().map(|record| assess(record, policy)).collect(),
        Execution::Parallel => records
            .par_iter()
            .map(|record| assess(record, policy))
            .collect(),
    };

    let mut outcomes: BTreeMap<StudentId, Result<f64>> = BTreeMap::new();
    let mut flags_by_student: BTreeMap<StudentId, Vec<Flag>> = BTreeMap::new();
    let mut rejected = Vec::new();

    for assessment in assessments {
        if outcomes.contains_key(&assessment.student_id) {
            warn!(student_id = %assessment.student_id, "Duplicate student identifier skipped");
            rejected.push(RejectedRecord {
                student_id: assessment.student_id,
                reason: "duplicate student identifier".to_string(),
            });
            continue;
        }

        match &assessment.outcome {
            Err(ScoringError::MalformedRecord { student_id, reason }) => {
                warn!(%student_id, %reason, "Malformed record isolated");
                rejected.push(RejectedRecord {
                    student_id: student_id.clone(),
                    reason: reason.clone(),
                });
            }
            Err(err) => debug!(student_id = %assessment.student_id, error = %err, "Student left unscored"),
            Ok(score) => debug!(student_id = %assessment.student_id, score, "Student scored"),
        }

        flags_by_student.insert(assessment.student_id.clone(), assessment.flags);
        outcomes.insert(assessment.student_id, assessment.outcome);
    }

    let mut results = classify(&outcomes, policy);
    for result in &mut results {
        if let Some(flags) = flags_by_student.remove(&result.student_id) {
            result.flags = flags;
        }
    }

    let report = AnalysisReport { results, rejected };
    info!(
        scored = report.ranked().count(),
        unscored = report.unscored().count(),
        rejected = report.rejected.len(),
        "Analysis complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cohort() -> Vec<StudentRecord> {
        vec![
            StudentRecord::new("S003", "Kiara Patel")
                .with_grade("Mathematics", 55.0)
                .with_attendance(0.7),
            StudentRecord::new("S001", "Avery Lee")
                .with_grade("Mathematics", 92.0)
                .with_attendance(0.97)
                .with_engagement(14),
            StudentRecord::new("S002", "Jules Moreno"),
            StudentRecord::new("S004", "Rowan Diaz").with_grade("Physics", f64::NAN),
        ]
    }

    #[test]
    fn every_record_gets_exactly_one_result() {
        let report = analyze(&cohort(), &ThresholdPolicy::default(), Execution::Sequential);

        assert_eq!(report.results.len(), 4);
        let order: Vec<_> = report.results.iter().map(|r| r.student_id.as_str()).collect();
        assert_eq!(order, vec!["S003", "S001", "S002", "S004"]);
        assert_eq!(report.ranked().count(), 2);
    }

    #[test]
    fn malformed_records_are_isolated_and_reported() {
        let report = analyze(&cohort(), &ThresholdPolicy::default(), Execution::Sequential);

        let placeholder = report.get(&"S004".into()).unwrap();
        assert_eq!(placeholder.tier, RiskTier::Unknown);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].student_id.as_str(), "S004");
        assert!(report.rejected[0].reason.contains("Physics"));
    }

    #[test]
    fn flags_are_attached_to_results() {
        let report = analyze(&cohort(), &ThresholdPolicy::default(), Execution::Sequential);

        let kiara = report.get(&"S003".into()).unwrap();
        assert_eq!(kiara.flag_names(), vec!["grades", "attendance"]);
        assert!(report.get(&"S001".into()).unwrap().flags.is_empty());
    }

    #[test]
    fn duplicate_identifiers_keep_the_first_record() {
        let records = vec![
            StudentRecord::new("S001", "Avery Lee").with_attendance(0.9),
            StudentRecord::new("S001", "Avery Lee").with_attendance(0.1),
        ];
        let report = analyze(&records, &ThresholdPolicy::default(), Execution::Sequential);

        assert_eq!(report.results.len(), 1);
        let score = report.results[0].score.unwrap();
        assert!((score - 0.1).abs() < 1e-12);
        assert_eq!(report.rejected[0].reason, "duplicate student identifier");
    }

    #[test]
    fn parallel_matches_sequential() {
        let policy = ThresholdPolicy::default();
        let records: Vec<_> = (0..200)
            .map(|index| {
                StudentRecord::new(format!("S{index:04}"), format!("Student {index}"))
                    .with_grade("Mathematics", (index * 37 % 100) as f64)
                    .with_attendance((index * 13 % 100) as f64 / 100.0)
                    .with_engagement(index % 17)
            })
            .collect();

        assert_eq!(
            analyze(&records, &policy, Execution::Sequential),
            analyze(&records, &policy, Execution::Parallel)
        );
    }

    #[test]
    fn tier_counts_cover_every_result() {
        let report = analyze(&cohort(), &ThresholdPolicy::default(), Execution::Sequential);
        let counts = report.tier_counts();
        assert_eq!(counts.values().sum::<usize>(), report.results.len());
        assert_eq!(counts.get(&RiskTier::Unknown), Some(&2));
    }
}
