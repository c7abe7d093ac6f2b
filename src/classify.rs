use std::cmp::Ordering;

use crate::error::Result;
use crate::models::{RiskResult, RiskTier, StudentId};
use crate::policy::{ThresholdPolicy, TierCutoffs};

pub fn tier_for(score: f64, cutoffs: TierCutoffs) -> RiskTier {
    if score >= cutoffs.high {
        RiskTier::High
    } else if score >= cutoffs.medium {
        RiskTier::Medium
    } else {
        RiskTier::Low
    }
}

/// Assigns tiers and priority ranks across the whole population.
///
/// Results come back in priority order: scored students by descending score,
/// ties broken by ascending student id, ranked 1..=n. Students whose score is
/// an error land in the `Unknown` tier after every ranked student, in id
/// order, with no rank. Input iteration order never affects the output.
pub fn classify<'a, I>(scores: I, policy: &ThresholdPolicy) -> Vec<RiskResult>
where
    I: IntoIterator<Item = (&'a StudentId, &'a Result<f64>)>,
{
    let cutoffs = policy.tiers();
    let mut scored: Vec<(&StudentId, f64)> = Vec::new();
    let mut unscored: Vec<&StudentId> = Vec::new();

    for (student_id, outcome) in scores {
        match outcome {
            Ok(score) => scored.push((student_id, *score)),
            Err(_) => unscored.push(student_id),
        }
    }

    scored.sort_by(|a, b| by_priority(a, b));
    unscored.sort();

    let ranked = scored
        .into_iter()
        .enumerate()
        .map(|(index, (student_id, score))| RiskResult {
            student_id: student_id.clone(),
            score: Some(score),
            tier: tier_for(score, cutoffs),
            rank: Some(index + 1),
            flags: Vec::new(),
        });

    let trailing = unscored.into_iter().map(|student_id| RiskResult {
        student_id: student_id.clone(),
        score: None,
        tier: RiskTier::Unknown,
        rank: None,
        flags: Vec::new(),
    });

    ranked.chain(trailing).collect()
}

fn by_priority(a: &(&StudentId, f64), b: &(&StudentId, f64)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0))
}
