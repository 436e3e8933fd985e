//! Vitals Capture State Machine
//!
//! Walks a clinician through the fixed vitals checklist for one patient:
//!
//! 1. Each field accepts a numeric string. Anything else is ignored and the
//!    field stays as it was.
//! 2. An accepted value completes the field. Height and weight both feed
//!    BMI, which is recomputed whenever either of them changes.
//! 3. Focus moves to the next incomplete field in checklist order.
//! 4. Values outside the checklist band are flagged but never block.
//! 5. Submission is allowed only once every checklist field is complete.
//!    Height may be satisfied by explicitly accepting the height carried
//!    forward from a previous visit.
//!
//! A successful submission produces an immutable [`VitalSignsEntry`], hands
//! it to the record service and resets the capture for the next patient. A
//! failed service call leaves the capture untouched.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ClinicError;
use crate::records::{Committed, RecordService};
use crate::reference::ChecklistItem;
use crate::units::UnitSystem;
use crate::validation::{ValidationErrorCode, ValidationResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VitalField {
    Height,
    Weight,
    Temperature,
    SystolicBp,
    DiastolicBp,
    HeartRate,
    RespiratoryRate,
    Spo2,
}

impl VitalField {
    /// Checklist order.
    pub const ALL: [VitalField; 8] = [
        VitalField::Height,
        VitalField::Weight,
        VitalField::Temperature,
        VitalField::SystolicBp,
        VitalField::DiastolicBp,
        VitalField::HeartRate,
        VitalField::RespiratoryRate,
        VitalField::Spo2,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VitalField::Height => "height",
            VitalField::Weight => "weight",
            VitalField::Temperature => "temperature",
            VitalField::SystolicBp => "systolic_bp",
            VitalField::DiastolicBp => "diastolic_bp",
            VitalField::HeartRate => "heart_rate",
            VitalField::RespiratoryRate => "respiratory_rate",
            VitalField::Spo2 => "spo2",
        }
    }

    fn feeds_bmi(self) -> bool {
        matches!(self, VitalField::Height | VitalField::Weight)
    }
}

impl std::fmt::Display for VitalField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// BMI from height in centimetres and weight in kilograms, rounded to one
/// decimal place. `None` unless both inputs are positive.
pub fn compute_bmi(height_cm: f64, weight_kg: f64) -> Option<f64> {
    if !(height_cm > 0.0 && weight_kg > 0.0) {
        return None;
    }
    let height_m = height_cm / 100.0;
    Some(round_to_tenth(weight_kg / (height_m * height_m)))
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn parse_measurement(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value > 0.0)
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VitalsError {
    #[error("Please complete all required vitals before submitting ({} remaining)", .missing.len())]
    SubmissionBlocked { missing: Vec<VitalField> },
    #[error("No previous height is on file for this patient")]
    NoPriorHeight,
}

/// The full set of measurements of one recording. Stored metric.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VitalMeasurements {
    pub height_cm: f64,
    pub weight_kg: f64,
    pub bmi: Option<f64>,
    pub temperature_c: f64,
    pub systolic_bp: f64,
    pub diastolic_bp: f64,
    pub heart_rate: f64,
    pub respiratory_rate: f64,
    pub spo2: f64,
    pub glucose_mg_dl: Option<f64>,
}

impl VitalMeasurements {
    pub fn value(&self, field: VitalField) -> f64 {
        match field {
            VitalField::Height => self.height_cm,
            VitalField::Weight => self.weight_kg,
            VitalField::Temperature => self.temperature_c,
            VitalField::SystolicBp => self.systolic_bp,
            VitalField::DiastolicBp => self.diastolic_bp,
            VitalField::HeartRate => self.heart_rate,
            VitalField::RespiratoryRate => self.respiratory_rate,
            VitalField::Spo2 => self.spo2,
        }
    }

    /// Every value positive and finite; BMI, when present, must equal the
    /// rounded computation from this recording's own height and weight.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();
        for field in VitalField::ALL {
            let value = self.value(field);
            if !(value.is_finite() && value > 0.0) {
                result.add_error(
                    field.as_str(),
                    "Measurement must be a positive number",
                    ValidationErrorCode::OutOfRange,
                );
            }
        }
        if let Some(glucose) = self.glucose_mg_dl {
            if !(glucose.is_finite() && glucose > 0.0) {
                result.add_error(
                    "glucose_mg_dl",
                    "Glucose must be a positive number",
                    ValidationErrorCode::OutOfRange,
                );
            }
        }
        if let Some(bmi) = self.bmi {
            if compute_bmi(self.height_cm, self.weight_kg) != Some(bmi) {
                result.add_error(
                    "bmi",
                    "BMI does not match the recorded height and weight",
                    ValidationErrorCode::InvalidReference,
                );
            }
        }
        result
    }
}

/// One immutable vitals recording
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VitalSignsEntry {
    pub patient_id: String,
    pub visit_id: Option<String>,
    pub measurements: VitalMeasurements,
    /// Height was accepted from a previous visit rather than measured.
    pub height_carried_forward: bool,
    pub notes: Option<String>,
    pub recorded_by: String,
    pub recorded_at: DateTime<Utc>,
}

impl VitalSignsEntry {
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();
        result.require("patient_id", &self.patient_id, "Patient is required");
        result.require("recorded_by", &self.recorded_by, "Recorder is required");
        result.merge(self.measurements.validate());
        result
    }
}

/// Who, when and for whom a capture is being submitted
#[derive(Clone, Debug, PartialEq)]
pub struct VitalsSubmission {
    pub patient_id: String,
    pub visit_id: Option<String>,
    pub notes: Option<String>,
    pub recorded_by: String,
    pub recorded_at: DateTime<Utc>,
}

/// Outcome of an accepted field value
#[derive(Clone, Debug, PartialEq)]
pub struct FieldUpdate {
    pub field: VitalField,
    pub value: f64,
    pub out_of_range: bool,
    pub bmi: Option<f64>,
    pub next_focus: Option<VitalField>,
    pub ready_to_submit: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangeDirection {
    Low,
    High,
}

/// Advisory out-of-range flag for display
#[derive(Clone, Debug, PartialEq)]
pub struct RangeFlag {
    pub field: VitalField,
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub direction: RangeDirection,
}

#[derive(Clone, Debug)]
pub struct VitalsCapture {
    checklist: Vec<ChecklistItem>,
    values: BTreeMap<VitalField, f64>,
    completed: BTreeSet<VitalField>,
    bmi: Option<f64>,
    focus: Option<VitalField>,
    prior_height: Option<f64>,
    height_carried_forward: bool,
    glucose: Option<f64>,
}

impl VitalsCapture {
    pub fn new(checklist: &[ChecklistItem]) -> Self {
        Self {
            focus: checklist.first().map(|item| item.field),
            checklist: checklist.to_vec(),
            values: BTreeMap::new(),
            completed: BTreeSet::new(),
            bmi: None,
            prior_height: None,
            height_carried_forward: false,
            glucose: None,
        }
    }

    /// Offer a height from a previous visit. It only counts once accepted
    /// with [`accept_prior_height`](Self::accept_prior_height).
    pub fn with_prior_height(mut self, height_cm: Option<f64>) -> Self {
        self.prior_height = height_cm.filter(|h| h.is_finite() && *h > 0.0);
        self
    }

    pub fn prior_height(&self) -> Option<f64> {
        self.prior_height
    }

    /// Enter a metric value typed as text. Returns `None`, leaving the
    /// capture unchanged, when the text is not a positive number.
    pub fn enter(&mut self, field: VitalField, raw: &str) -> Option<FieldUpdate> {
        let value = parse_measurement(raw)?;
        Some(self.accept(field, value))
    }

    /// Like [`enter`](Self::enter), with the text typed in `units`.
    pub fn enter_with_units(
        &mut self,
        field: VitalField,
        raw: &str,
        units: UnitSystem,
    ) -> Option<FieldUpdate> {
        let value = parse_measurement(raw)?;
        Some(self.accept(field, units.to_metric(field, value)))
    }

    pub fn accept_prior_height(&mut self) -> Result<FieldUpdate, VitalsError> {
        let height = self.prior_height.ok_or(VitalsError::NoPriorHeight)?;
        let update = self.accept(VitalField::Height, height);
        self.height_carried_forward = true;
        Ok(update)
    }

    /// Optional glucose reading. Not part of the checklist and never gates
    /// submission.
    pub fn set_glucose(&mut self, raw: &str) -> Option<f64> {
        let value = parse_measurement(raw)?;
        self.glucose = Some(value);
        Some(value)
    }

    /// Move focus by hand, e.g. when the clinician clicks a field.
    pub fn focus_on(&mut self, field: VitalField) {
        self.focus = Some(field);
    }

    fn accept(&mut self, field: VitalField, value: f64) -> FieldUpdate {
        self.values.insert(field, value);
        self.completed.insert(field);
        if field == VitalField::Height {
            self.height_carried_forward = false;
        }
        if field.feeds_bmi() {
            self.recompute_bmi();
        }
        self.focus = self.next_incomplete_after(field);

        let out_of_range = self.is_out_of_range(field);
        debug!(
            field = %field,
            value,
            out_of_range,
            completed = self.completed.len(),
            "vital accepted"
        );

        FieldUpdate {
            field,
            value,
            out_of_range,
            bmi: self.bmi,
            next_focus: self.focus,
            ready_to_submit: self.can_submit(),
        }
    }

    fn recompute_bmi(&mut self) {
        self.bmi = match (
            self.values.get(&VitalField::Height),
            self.values.get(&VitalField::Weight),
        ) {
            (Some(height), Some(weight)) => compute_bmi(*height, *weight),
            _ => None,
        };
    }

    fn next_incomplete_after(&self, field: VitalField) -> Option<VitalField> {
        let order: Vec<VitalField> = self.checklist.iter().map(|item| item.field).collect();
        let start = order.iter().position(|f| *f == field).map_or(0, |pos| pos + 1);
        order
            .iter()
            .cycle()
            .skip(start)
            .take(order.len())
            .find(|f| !self.completed.contains(f))
            .copied()
    }

    pub fn value(&self, field: VitalField) -> Option<f64> {
        self.values.get(&field).copied()
    }

    pub fn bmi(&self) -> Option<f64> {
        self.bmi
    }

    pub fn glucose(&self) -> Option<f64> {
        self.glucose
    }

    pub fn focus(&self) -> Option<VitalField> {
        self.focus
    }

    pub fn is_completed(&self, field: VitalField) -> bool {
        self.completed.contains(&field)
    }

    pub fn height_carried_forward(&self) -> bool {
        self.height_carried_forward
    }

    pub fn completed_count(&self) -> usize {
        self.checklist
            .iter()
            .filter(|item| self.completed.contains(&item.field))
            .count()
    }

    pub fn required_count(&self) -> usize {
        self.checklist.len()
    }

    /// Incomplete fields in checklist order.
    pub fn missing(&self) -> Vec<VitalField> {
        self.checklist
            .iter()
            .map(|item| item.field)
            .filter(|field| !self.completed.contains(field))
            .collect()
    }

    pub fn can_submit(&self) -> bool {
        self.completed_count() == self.required_count()
    }

    pub fn is_out_of_range(&self, field: VitalField) -> bool {
        match (self.values.get(&field), self.item(field)) {
            (Some(value), Some(item)) => !item.in_range(*value),
            _ => false,
        }
    }

    /// Flags for every completed value outside its band, in checklist order.
    pub fn range_flags(&self) -> Vec<RangeFlag> {
        self.checklist
            .iter()
            .filter_map(|item| {
                let value = *self.values.get(&item.field)?;
                let direction = if value < item.min {
                    RangeDirection::Low
                } else if value > item.max {
                    RangeDirection::High
                } else {
                    return None;
                };
                Some(RangeFlag {
                    field: item.field,
                    value,
                    min: item.min,
                    max: item.max,
                    direction,
                })
            })
            .collect()
    }

    fn item(&self, field: VitalField) -> Option<&ChecklistItem> {
        self.checklist.iter().find(|item| item.field == field)
    }

    /// Package the capture into an entry without submitting it.
    pub fn build_entry(&self, submission: VitalsSubmission) -> Result<VitalSignsEntry, VitalsError> {
        if !self.can_submit() {
            return Err(VitalsError::SubmissionBlocked {
                missing: self.missing(),
            });
        }
        let value = |field: VitalField| self.values.get(&field).copied().unwrap_or_default();
        let measurements = VitalMeasurements {
            height_cm: value(VitalField::Height),
            weight_kg: value(VitalField::Weight),
            bmi: self.bmi,
            temperature_c: value(VitalField::Temperature),
            systolic_bp: value(VitalField::SystolicBp),
            diastolic_bp: value(VitalField::DiastolicBp),
            heart_rate: value(VitalField::HeartRate),
            respiratory_rate: value(VitalField::RespiratoryRate),
            spo2: value(VitalField::Spo2),
            glucose_mg_dl: self.glucose,
        };
        Ok(VitalSignsEntry {
            patient_id: submission.patient_id,
            visit_id: submission.visit_id,
            measurements,
            height_carried_forward: self.height_carried_forward,
            notes: submission
                .notes
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            recorded_by: submission.recorded_by,
            recorded_at: submission.recorded_at,
        })
    }

    /// Submit to the record service. Resets on success; on any failure the
    /// capture is left exactly as it was.
    pub fn submit<S: RecordService + ?Sized>(
        &mut self,
        service: &mut S,
        submission: VitalsSubmission,
    ) -> Result<Committed<VitalSignsEntry>, ClinicError> {
        let entry = self.build_entry(submission).map_err(|err| {
            warn!(missing = self.required_count() - self.completed_count(), "vitals submission blocked");
            err
        })?;
        let committed = service.record_vitals(entry)?;
        info!(
            patient_id = %committed.record.patient_id,
            bmi = ?committed.record.measurements.bmi,
            "vitals recorded"
        );
        self.reset();
        Ok(committed)
    }

    /// Clear everything for the next patient.
    pub fn reset(&mut self) {
        self.values.clear();
        self.completed.clear();
        self.bmi = None;
        self.glucose = None;
        self.prior_height = None;
        self.height_carried_forward = false;
        self.focus = self.checklist.first().map(|item| item.field);
    }
}
