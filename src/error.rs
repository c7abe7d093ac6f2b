//! Error types for the scoring engine

use thiserror::Error;

use crate::models::StudentId;

/// Result type alias using the engine's error type
pub type Result<T> = std::result::Result<T, ScoringError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoringError {
    /// Threshold configuration rejected at construction; fatal to the run
    #[error("Invalid threshold configuration: {0}")]
    InvalidConfig(String),

    /// No weighted metric was available for the student
    #[error("Insufficient data to score student {student_id}")]
    InsufficientData { student_id: StudentId },

    /// A record that violates the ingestion contract
    #[error("Malformed record for student {student_id}: {reason}")]
    MalformedRecord {
        student_id: StudentId,
        reason: String,
    },
}

impl ScoringError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn insufficient_data(student_id: &StudentId) -> Self {
        Self::InsufficientData {
            student_id: student_id.clone(),
        }
    }

    pub fn malformed(student_id: &StudentId, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            student_id: student_id.clone(),
            reason: reason.into(),
        }
    }
}
