pub mod alerts;
pub mod classify;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod policy;
pub mod report;
pub mod risk;

pub use error::{Result, ScoringError};
pub use models::{
    Flag, Metric, MetricValue, NormalizedMetrics, RiskResult, RiskTier, StudentId, StudentRecord,
};
pub use pipeline::{analyze, AnalysisReport, Execution, RejectedRecord};
pub use policy::{ThresholdConfig, ThresholdPolicy};
