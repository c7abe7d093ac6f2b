use crate::models::{Flag, Metric, NormalizedMetrics};
use crate::policy::{Direction, MetricThreshold, ThresholdPolicy};

/// Threshold breaches for one student, in fixed metric priority order.
pub fn flags(metrics: &NormalizedMetrics, policy: &ThresholdPolicy) -> Vec<Flag> {
    Metric::PRIORITY
        .iter()
        .filter_map(|metric| {
            let value = metrics.get(*metric)?;
            let threshold = policy.threshold(*metric)?;
            if !threshold.is_breached(value.raw) {
                return None;
            }
            Some(Flag {
                metric: *metric,
                raw: value.raw,
                cutoff: threshold.cutoff,
                message: describe(*metric, value.raw, threshold),
            })
        })
        .collect()
}

fn describe(metric: Metric, raw: f64, threshold: &MetricThreshold) -> String {
    let comparison = threshold.direction;

    match (metric, threshold.direction) {
        (Metric::Grades, Direction::Below) => format!(
            "low grades: average {raw:.1} {comparison} {:.1}",
            threshold.cutoff
        ),
        (Metric::Attendance, Direction::Below) => format!(
            "low attendance: {:.0}% {comparison} {:.0}%",
            raw * 100.0,
            threshold.cutoff * 100.0
        ),
        (Metric::Engagement, Direction::Below) => format!(
            "low engagement: {raw:.0} logins {comparison} {:.0}",
            threshold.cutoff
        ),
        (Metric::Attendance, Direction::Above) => format!(
            "attendance {:.0}% {comparison} {:.0}%",
            raw * 100.0,
            threshold.cutoff * 100.0
        ),
        _ => format!("{metric} {raw:.1} {comparison} {:.1}", threshold.cutoff),
    }
}
