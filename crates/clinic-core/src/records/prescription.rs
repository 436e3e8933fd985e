//! Prescriptions
//!
//! `Active → Discontinued` is one way. Refills draw down
//! `refills_remaining` and are refused once it reaches zero or the
//! prescription is discontinued.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reference::MedicationGuide;
use crate::validation::{ValidationErrorCode, ValidationResult};

use super::RecordError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Oral,
    Sublingual,
    Topical,
    Inhalation,
    Nasal,
    Ophthalmic,
    Otic,
    Rectal,
    Subcutaneous,
    Intramuscular,
    Intravenous,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrescriptionStatus {
    Active,
    Discontinued,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrescriptionError {
    #[error("Prescription is already discontinued")]
    AlreadyDiscontinued,
    #[error("A reason is required to discontinue a prescription")]
    ReasonRequired,
    #[error("Cannot refill a discontinued prescription")]
    Discontinued,
    #[error("No refills remaining")]
    NoRefillsRemaining,
}

impl From<PrescriptionError> for RecordError {
    fn from(err: PrescriptionError) -> Self {
        RecordError::Rejected(err.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewPrescription {
    pub patient_id: String,
    pub visit_id: Option<String>,
    pub medication_name: String,
    pub strength: Option<String>,
    pub dosage: String,
    pub frequency: String,
    pub route: Route,
    pub quantity: u32,
    pub refills_authorized: u32,
    pub controlled: bool,
    pub instructions: Option<String>,
    pub prescriber: String,
}

impl NewPrescription {
    /// Form pre-filled from the dosing guide.
    pub fn from_guide(patient_id: &str, prescriber: &str, guide: &MedicationGuide) -> Self {
        Self {
            patient_id: patient_id.to_string(),
            visit_id: None,
            medication_name: guide.name.clone(),
            strength: Some(guide.strength.clone()),
            dosage: guide.adult_dose.clone(),
            frequency: guide.frequency.clone(),
            route: guide.route,
            quantity: 0,
            refills_authorized: 0,
            controlled: guide.controlled,
            instructions: Some(format!("Do not exceed {} per day", guide.max_daily_dose)),
            prescriber: prescriber.to_string(),
        }
    }

    /// Fill blank fields from the guide. A guide marking the drug as
    /// controlled always wins.
    pub fn apply_guide(&mut self, guide: &MedicationGuide) {
        if self.strength.as_deref().map_or(true, |s| s.trim().is_empty()) {
            self.strength = Some(guide.strength.clone());
        }
        if self.dosage.trim().is_empty() {
            self.dosage = guide.adult_dose.clone();
        }
        if self.frequency.trim().is_empty() {
            self.frequency = guide.frequency.clone();
        }
        self.controlled |= guide.controlled;
    }

    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();
        result.require("patient_id", &self.patient_id, "Patient is required");
        result.require("medication_name", &self.medication_name, "Medication is required");
        result.require("dosage", &self.dosage, "Dosage is required");
        result.require("frequency", &self.frequency, "Frequency is required");
        result.require("prescriber", &self.prescriber, "Prescriber is required");
        if self.quantity == 0 {
            result.add_error("quantity", "Quantity must be at least 1", ValidationErrorCode::OutOfRange);
        }
        if self.controlled && self.refills_authorized > 0 {
            result.add_error(
                "refills_authorized",
                "Controlled substances cannot be refilled",
                ValidationErrorCode::OutOfRange,
            );
        }
        result
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
    pub id: String,
    pub patient_id: String,
    pub visit_id: Option<String>,
    pub medication_name: String,
    pub strength: Option<String>,
    pub dosage: String,
    pub frequency: String,
    pub route: Route,
    pub quantity: u32,
    pub refills_authorized: u32,
    pub refills_remaining: u32,
    pub controlled: bool,
    pub instructions: Option<String>,
    pub prescriber: String,
    pub status: PrescriptionStatus,
    pub discontinued_reason: Option<String>,
    pub discontinued_at: Option<DateTime<Utc>>,
    pub last_refill_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Prescription {
    pub fn from_new(id: String, input: NewPrescription, now: DateTime<Utc>) -> Self {
        Self {
            id,
            patient_id: input.patient_id,
            visit_id: input.visit_id,
            medication_name: input.medication_name.trim().to_string(),
            strength: input.strength,
            dosage: input.dosage,
            frequency: input.frequency,
            route: input.route,
            quantity: input.quantity,
            refills_authorized: input.refills_authorized,
            refills_remaining: input.refills_authorized,
            controlled: input.controlled,
            instructions: input.instructions,
            prescriber: input.prescriber,
            status: PrescriptionStatus::Active,
            discontinued_reason: None,
            discontinued_at: None,
            last_refill_at: None,
            created_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == PrescriptionStatus::Active
    }

    pub fn discontinue(&mut self, reason: &str, now: DateTime<Utc>) -> Result<(), PrescriptionError> {
        if !self.is_active() {
            return Err(PrescriptionError::AlreadyDiscontinued);
        }
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(PrescriptionError::ReasonRequired);
        }
        self.status = PrescriptionStatus::Discontinued;
        self.discontinued_reason = Some(reason.to_string());
        self.discontinued_at = Some(now);
        Ok(())
    }

    pub fn record_refill(&mut self, now: DateTime<Utc>) -> Result<u32, PrescriptionError> {
        if !self.is_active() {
            return Err(PrescriptionError::Discontinued);
        }
        if self.refills_remaining == 0 {
            return Err(PrescriptionError::NoRefillsRemaining);
        }
        self.refills_remaining -= 1;
        self.last_refill_at = Some(now);
        Ok(self.refills_remaining)
    }

    /// Checks an updated version against the one it replaces.
    pub fn validate_update(&self, updated: &Prescription) -> Result<(), String> {
        if self.status == PrescriptionStatus::Discontinued
            && updated.status == PrescriptionStatus::Active
        {
            return Err("A discontinued prescription cannot be reactivated".to_string());
        }
        if updated.refills_remaining > self.refills_remaining {
            return Err("Refills remaining can only decrease".to_string());
        }
        if updated.status == PrescriptionStatus::Discontinued
            && updated.discontinued_reason.as_deref().map_or(true, |r| r.trim().is_empty())
        {
            return Err("A reason is required to discontinue a prescription".to_string());
        }
        if updated.medication_name != self.medication_name || updated.patient_id != self.patient_id {
            return Err("Medication and patient cannot change".to_string());
        }
        Ok(())
    }
}
