use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoringError};
use crate::models::Metric;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub tiers: TierConfig,
    pub normalization: NormalizationConfig,
    /// Keyed by metric name. A metric left out carries no weight and
    /// never raises a flag.
    pub metrics: BTreeMap<String, MetricThresholdConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    pub medium: f64,
    pub high: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    /// Login count at which engagement risk reaches zero.
    pub engagement_reference: f64,
    /// Grade components that count toward the grades metric. Empty means
    /// every course on the record counts.
    pub expected_grades: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricThresholdConfig {
    pub cutoff: f64,
    pub direction: String,
    pub weight: f64,
}

impl MetricThresholdConfig {
    pub fn new(cutoff: f64, direction: &str, weight: f64) -> Self {
        Self {
            cutoff,
            direction: direction.to_string(),
            weight,
        }
    }
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            medium: 0.4,
            high: 0.6,
        }
    }
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            engagement_reference: 10.0,
            expected_grades: Vec::new(),
        }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        let mut metrics = BTreeMap::new();
        metrics.insert(
            Metric::Grades.as_str().to_string(),
            MetricThresholdConfig::new(60.0, "below", 0.5),
        );
        metrics.insert(
            Metric::Attendance.as_str().to_string(),
            MetricThresholdConfig::new(0.75, "below", 0.3),
        );
        metrics.insert(
            Metric::Engagement.as_str().to_string(),
            MetricThresholdConfig::new(5.0, "below", 0.2),
        );

        Self {
            tiers: TierConfig::default(),
            normalization: NormalizationConfig::default(),
            metrics,
        }
    }
}

impl ThresholdConfig {
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ScoringError::invalid_config(format!("failed to serialize: {e}")))
    }
}

/// Which side of the cutoff counts as a breach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Below,
    Above,
}

impl Direction {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "below" => Some(Direction::Below),
            "above" => Some(Direction::Above),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Below => f.write_str("below"),
            Direction::Above => f.write_str("above"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricThreshold {
    pub cutoff: f64,
    pub direction: Direction,
    pub weight: f64,
}

impl MetricThreshold {
    /// Cutoff itself is not a breach: "below 0.75" means strictly below.
    pub fn is_breached(&self, raw: f64) -> bool {
        match self.direction {
            Direction::Below => raw < self.cutoff,
            Direction::Above => raw > self.cutoff,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TierCutoffs {
    pub medium: f64,
    pub high: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdPolicy {
    tiers: TierCutoffs,
    engagement_reference: f64,
    expected_grades: BTreeSet<String>,
    thresholds: BTreeMap<Metric, MetricThreshold>,
}

impl ThresholdPolicy {
    pub fn new(config: ThresholdConfig) -> Result<Self> {
        let tiers = validate_tiers(&config.tiers)?;

        let reference = config.normalization.engagement_reference;
        if !reference.is_finite() || reference <= 0.0 {
            return Err(ScoringError::invalid_config(format!(
                "engagement_reference must be a positive number, got {reference}"
            )));
        }

        let mut thresholds = BTreeMap::new();
        for (name, entry) in &config.metrics {
            let metric = name.parse::<Metric>().map_err(ScoringError::invalid_config)?;
            thresholds.insert(metric, validate_metric(metric, entry)?);
        }
        rescale_weights(&mut thresholds);

        let expected_grades = config
            .normalization
            .expected_grades
            .iter()
            .map(|course| course.trim().to_string())
            .filter(|course| !course.is_empty())
            .collect();

        Ok(Self {
            tiers,
            engagement_reference: reference,
            expected_grades,
            thresholds,
        })
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config = toml::from_str::<ThresholdConfig>(contents)
            .map_err(|e| ScoringError::invalid_config(format!("failed to parse thresholds: {e}")))?;
        Self::new(config)
    }

    pub fn tiers(&self) -> TierCutoffs {
        self.tiers
    }

    pub fn engagement_reference(&self) -> f64 {
        self.engagement_reference
    }

    pub fn expected_grades(&self) -> &BTreeSet<String> {
        &self.expected_grades
    }

    pub fn threshold(&self, metric: Metric) -> Option<&MetricThreshold> {
        self.thresholds.get(&metric)
    }

    pub fn weight(&self, metric: Metric) -> f64 {
        self.thresholds
            .get(&metric)
            .map(|threshold| threshold.weight)
            .unwrap_or(0.0)
    }
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        let defaults = ThresholdConfig::default();
        let mut thresholds = defaults
            .metrics
            .iter()
            .filter_map(|(name, entry)| {
                let metric = name.parse::<Metric>().ok()?;
                let direction = Direction::parse(&entry.direction)?;
                Some((
                    metric,
                    MetricThreshold {
                        cutoff: entry.cutoff,
                        direction,
                        weight: entry.weight,
                    },
                ))
            })
            .collect();
        rescale_weights(&mut thresholds);

        Self {
            tiers: TierCutoffs {
                medium: defaults.tiers.medium,
                high: defaults.tiers.high,
            },
            engagement_reference: defaults.normalization.engagement_reference,
            expected_grades: BTreeSet::new(),
            thresholds,
        }
    }
}

/// Divides every weight by the largest so sums over the metrics stay
/// finite. Relative weights, and therefore scores, are unchanged.
fn rescale_weights(thresholds: &mut BTreeMap<Metric, MetricThreshold>) {
    let largest = thresholds
        .values()
        .map(|threshold| threshold.weight)
        .fold(0.0, f64::max);
    if largest > 0.0 {
        for threshold in thresholds.values_mut() {
            threshold.weight /= largest;
        }
    }
}

fn validate_tiers(tiers: &TierConfig) -> Result<TierCutoffs> {
    let TierConfig { medium, high } = *tiers;
    let ordered = medium.is_finite() && high.is_finite() && 0.0 <= medium && medium < high && high <= 1.0;
    if !ordered {
        return Err(ScoringError::invalid_config(format!(
            "tier cutoffs must satisfy 0 <= medium < high <= 1, got medium={medium} high={high}"
        )));
    }
    Ok(TierCutoffs { medium, high })
}

fn validate_metric(metric: Metric, entry: &MetricThresholdConfig) -> Result<MetricThreshold> {
    if !entry.weight.is_finite() || entry.weight < 0.0 {
        return Err(ScoringError::invalid_config(format!(
            "{metric} weight must be a non-negative number, got {}",
            entry.weight
        )));
    }

    let (low, high) = cutoff_domain(metric);
    if !entry.cutoff.is_finite() || entry.cutoff < low || entry.cutoff > high {
        return Err(ScoringError::invalid_config(format!(
            "{metric} cutoff {} is outside [{low}, {high}]",
            entry.cutoff
        )));
    }

    let direction = Direction::parse(&entry.direction).ok_or_else(|| {
        ScoringError::invalid_config(format!(
            "{metric} direction must be 'below' or 'above', got '{}'",
            entry.direction
        ))
    })?;

    Ok(MetricThreshold {
        cutoff: entry.cutoff,
        direction,
        weight: entry.weight,
    })
}

/// Valid cutoff range per metric, in the metric's raw units.
fn cutoff_domain(metric: Metric) -> (f64, f64) {
    match metric {
        Metric::Grades => (0.0, 100.0),
        Metric::Attendance => (0.0, 1.0),
        Metric::Engagement => (0.0, f64::MAX),
    }
}
