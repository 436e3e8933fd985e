//! Visits and phlebotomy records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::{PatientStatus, TransitionError};
use crate::validation::{ValidationErrorCode, ValidationResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitType {
    Consultation,
    FollowUp,
    LabOnly,
    Telehealth,
}

/// Subjective / Objective / Assessment / Plan
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoapNotes {
    pub subjective: Option<String>,
    pub objective: Option<String>,
    pub assessment: Option<String>,
    pub plan: Option<String>,
}

impl SoapNotes {
    pub fn is_empty(&self) -> bool {
        [&self.subjective, &self.objective, &self.assessment, &self.plan]
            .iter()
            .all(|section| section.as_deref().map_or(true, |s| s.trim().is_empty()))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewVisit {
    pub patient_id: String,
    pub visit_type: VisitType,
    pub reason: String,
    pub copay_vnd: i64,
}

impl NewVisit {
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();
        result.require("patient_id", &self.patient_id, "Patient is required");
        result.require("reason", &self.reason, "Reason for visit is required");
        if self.copay_vnd < 0 {
            result.add_error("copay_vnd", "Copay cannot be negative", ValidationErrorCode::OutOfRange);
        }
        result
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    pub id: String,
    pub patient_id: String,
    pub visit_type: VisitType,
    pub reason: String,
    pub notes: SoapNotes,
    pub status: PatientStatus,
    pub copay_vnd: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Visit {
    pub fn from_new(id: String, input: NewVisit, now: DateTime<Utc>) -> Self {
        Self {
            id,
            patient_id: input.patient_id,
            visit_type: input.visit_type,
            reason: input.reason.trim().to_string(),
            notes: SoapNotes::default(),
            status: PatientStatus::Intake,
            copay_vnd: input.copay_vnd,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Move along the status pipeline. Entering a terminal state stamps
    /// `completed_at`.
    pub fn advance(&mut self, to: PatientStatus, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.status = self.status.transition(to)?;
        self.updated_at = now;
        if self.status.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.status.is_terminal()
    }
}

/// One phlebotomy draw. Immutable once recorded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloodWorkEntry {
    pub patient_id: String,
    pub visit_id: Option<String>,
    /// Tube codes in draw order
    pub tube_codes: Vec<String>,
    pub collected_by: String,
    pub collected_at: DateTime<Utc>,
    pub notes: Option<String>,
}

impl BloodWorkEntry {
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();
        result.require("patient_id", &self.patient_id, "Patient is required");
        result.require("collected_by", &self.collected_by, "Collector is required");
        if self.tube_codes.is_empty() {
            result.add_error("tube_codes", "At least one tube must be drawn", ValidationErrorCode::Required);
        }
        let mut seen = std::collections::HashSet::new();
        if !self.tube_codes.iter().all(|code| seen.insert(code)) {
            result.add_error("tube_codes", "A tube is listed twice", ValidationErrorCode::DuplicateValue);
        }
        result
    }
}
