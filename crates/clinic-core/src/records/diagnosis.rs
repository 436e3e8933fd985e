//! Diagnoses

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::validation::{ValidationErrorCode, ValidationResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Mild,
    Moderate,
    Severe,
    Critical,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosisStatus {
    Active,
    Chronic,
    Resolved,
}

/// ICD-10 shape: a letter, a digit, a letter or digit, then optionally a
/// dot and up to four more letters or digits (`E11`, `J45.909`, `C7A.0`).
pub fn is_valid_icd10(code: &str) -> bool {
    let (category, subcategory) = match code.split_once('.') {
        Some((cat, sub)) => (cat, Some(sub)),
        None => (code, None),
    };
    let cat: Vec<char> = category.chars().collect();
    let category_ok = cat.len() == 3
        && cat[0].is_ascii_uppercase()
        && cat[1].is_ascii_digit()
        && (cat[2].is_ascii_digit() || cat[2].is_ascii_uppercase());
    let sub_ok = subcategory.map_or(true, |sub| {
        (1..=4).contains(&sub.len())
            && sub.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
    });
    category_ok && sub_ok
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewDiagnosis {
    pub patient_id: String,
    pub visit_id: Option<String>,
    pub disease_name: Option<String>,
    pub icd10_code: Option<String>,
    pub severity: Severity,
    pub status: DiagnosisStatus,
    pub is_primary: bool,
    pub notes: Option<String>,
    pub diagnosed_by: String,
}

impl NewDiagnosis {
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();
        result.require("patient_id", &self.patient_id, "Patient is required");
        result.require("diagnosed_by", &self.diagnosed_by, "Diagnosing clinician is required");

        let name = self.disease_name.as_deref().map(str::trim).unwrap_or("");
        let code = self.icd10_code.as_deref().map(str::trim).unwrap_or("");
        if name.is_empty() && code.is_empty() {
            result.add_error(
                "disease_name",
                "Enter a disease name or an ICD-10 code",
                ValidationErrorCode::Required,
            );
        }
        if !code.is_empty() && !is_valid_icd10(&code.to_ascii_uppercase()) {
            result.add_error(
                "icd10_code",
                "ICD-10 code format is invalid",
                ValidationErrorCode::InvalidFormat,
            );
        }
        result
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub id: String,
    pub patient_id: String,
    pub visit_id: Option<String>,
    pub disease_name: Option<String>,
    pub icd10_code: Option<String>,
    pub severity: Severity,
    pub status: DiagnosisStatus,
    pub is_primary: bool,
    pub notes: Option<String>,
    pub diagnosed_by: String,
    pub created_at: DateTime<Utc>,
}

impl Diagnosis {
    pub fn from_new(id: String, input: NewDiagnosis, now: DateTime<Utc>) -> Self {
        let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Self {
            id,
            patient_id: input.patient_id,
            visit_id: input.visit_id,
            disease_name: clean(input.disease_name),
            icd10_code: clean(input.icd10_code).map(|c| c.to_ascii_uppercase()),
            severity: input.severity,
            status: input.status,
            is_primary: input.is_primary,
            notes: clean(input.notes),
            diagnosed_by: input.diagnosed_by,
            created_at: now,
        }
    }

    /// Name when known, otherwise the code.
    pub fn display_name(&self) -> &str {
        self.disease_name
            .as_deref()
            .or(self.icd10_code.as_deref())
            .unwrap_or("")
    }
}
