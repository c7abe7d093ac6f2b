use crate::error::{Result, ScoringError};
use crate::models::NormalizedMetrics;
use crate::policy::ThresholdPolicy;

/// Weighted average over the metrics the student has. Walks metrics in
/// their fixed key order so repeated runs are bit-identical.
pub fn score(metrics: &NormalizedMetrics, policy: &ThresholdPolicy) -> Result<f64> {
    let mut weighted = 0.0;
    let mut total_weight = 0.0;

    for (metric, value) in &metrics.values {
        let weight = policy.weight(*metric);
        if weight <= 0.0 {
            continue;
        }
        weighted += weight * value.risk;
        total_weight += weight;
    }

    if total_weight <= 0.0 {
        return Err(ScoringError::insufficient_data(&metrics.student_id));
    }

    Ok((weighted / total_weight).clamp(0.0, 1.0))
}
