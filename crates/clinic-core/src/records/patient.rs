//! Patients and guardians

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::bhyt::is_valid_citizen_id;
use crate::validation::{validate_email, validate_phone, ValidationErrorCode, ValidationResult};

const MAX_NAME_LEN: usize = 200;
const BHYT_CARD_LEN: usize = 15;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BloodType {
    #[serde(rename = "A+")]
    APositive,
    #[serde(rename = "A-")]
    ANegative,
    #[serde(rename = "B+")]
    BPositive,
    #[serde(rename = "B-")]
    BNegative,
    #[serde(rename = "AB+")]
    ABPositive,
    #[serde(rename = "AB-")]
    ABNegative,
    #[serde(rename = "O+")]
    OPositive,
    #[serde(rename = "O-")]
    ONegative,
}

/// National health-insurance card fields kept on the patient
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BhytCardInfo {
    pub card_number: String,
    pub facility_code: String,
    pub valid_from: NaiveDate,
    pub valid_to: NaiveDate,
}

impl BhytCardInfo {
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();
        let card = self.card_number.trim();
        if card.len() != BHYT_CARD_LEN || !card.chars().all(|c| c.is_ascii_alphanumeric()) {
            result.add_error(
                "bhyt.card_number",
                "BHYT card number must be 15 letters and digits",
                ValidationErrorCode::InvalidFormat,
            );
        }
        result.require("bhyt.facility_code", &self.facility_code, "Registered facility is required");
        if self.valid_from > self.valid_to {
            result.add_error(
                "bhyt.valid_to",
                "BHYT validity must end after it starts",
                ValidationErrorCode::OutOfRange,
            );
        }
        result
    }

    pub fn covers(&self, date: NaiveDate) -> bool {
        self.valid_from <= date && date <= self.valid_to
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGuardian {
    pub full_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub relationship: String,
    pub is_legal_guardian: bool,
    pub is_emergency_contact: bool,
}

impl NewGuardian {
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();
        result.require("guardian.full_name", &self.full_name, "Guardian name is required");
        result.require("guardian.relationship", &self.relationship, "Relationship is required");
        if result.require("guardian.phone", &self.phone, "Guardian phone is required") {
            result.merge(validate_phone(&self.phone, "guardian.phone"));
        }
        if let Some(email) = non_blank(&self.email) {
            result.merge(validate_email(email, "guardian.email"));
        }
        result
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guardian {
    pub id: String,
    pub full_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub relationship: String,
    pub is_legal_guardian: bool,
    pub is_emergency_contact: bool,
    pub created_at: DateTime<Utc>,
}

impl Guardian {
    pub fn from_new(id: String, input: NewGuardian, now: DateTime<Utc>) -> Self {
        Self {
            id,
            full_name: input.full_name.trim().to_string(),
            phone: input.phone.trim().to_string(),
            email: trimmed(input.email),
            relationship: input.relationship.trim().to_string(),
            is_legal_guardian: input.is_legal_guardian,
            is_emergency_contact: input.is_emergency_contact,
            created_at: now,
        }
    }
}

/// Receptionist intake form
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatientIntake {
    pub citizen_id: String,
    pub full_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Gender,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub blood_type: Option<BloodType>,
    pub allergies: BTreeSet<String>,
    pub medical_notes: Option<String>,
    pub bhyt: Option<BhytCardInfo>,
    pub guardian: Option<NewGuardian>,
}

impl PatientIntake {
    pub fn new(citizen_id: &str, full_name: &str, date_of_birth: NaiveDate) -> Self {
        Self {
            citizen_id: citizen_id.to_string(),
            full_name: full_name.to_string(),
            date_of_birth: Some(date_of_birth),
            gender: Gender::Unknown,
            phone: None,
            email: None,
            address: None,
            blood_type: None,
            allergies: BTreeSet::new(),
            medical_notes: None,
            bhyt: None,
            guardian: None,
        }
    }

    /// `today` bounds the date of birth.
    pub fn validate(&self, today: NaiveDate) -> ValidationResult {
        let mut result = ValidationResult::new();

        if result.require("citizen_id", &self.citizen_id, "Citizen ID is required")
            && !is_valid_citizen_id(self.citizen_id.trim())
        {
            result.add_error(
                "citizen_id",
                "Citizen ID must be 9 or 12 digits",
                ValidationErrorCode::InvalidFormat,
            );
        }

        result.merge(validate_name(&self.full_name));

        match self.date_of_birth {
            None => result.add_error(
                "date_of_birth",
                "Date of birth is required",
                ValidationErrorCode::Required,
            ),
            Some(dob) if dob > today => result.add_error(
                "date_of_birth",
                "Date of birth cannot be in the future",
                ValidationErrorCode::OutOfRange,
            ),
            Some(_) => {}
        }

        if let Some(phone) = non_blank(&self.phone) {
            result.merge(validate_phone(phone, "phone"));
        }
        if let Some(email) = non_blank(&self.email) {
            result.merge(validate_email(email, "email"));
        }
        if self.allergies.iter().any(|a| a.trim().is_empty()) {
            result.add_error("allergies", "Allergies cannot be blank", ValidationErrorCode::Required);
        }
        if let Some(bhyt) = &self.bhyt {
            result.merge(bhyt.validate());
        }
        if let Some(guardian) = &self.guardian {
            result.merge(guardian.validate());
        }
        result
    }
}

/// Partial demographics update. `None` leaves a field as it is.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientUpdate {
    pub full_name: Option<String>,
    pub gender: Option<Gender>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub blood_type: Option<BloodType>,
    pub allergies: Option<BTreeSet<String>>,
    pub medical_notes: Option<String>,
    pub bhyt: Option<BhytCardInfo>,
}

impl PatientUpdate {
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();
        if let Some(name) = &self.full_name {
            result.merge(validate_name(name));
        }
        if let Some(phone) = non_blank(&self.phone) {
            result.merge(validate_phone(phone, "phone"));
        }
        if let Some(email) = non_blank(&self.email) {
            result.merge(validate_email(email, "email"));
        }
        if let Some(bhyt) = &self.bhyt {
            result.merge(bhyt.validate());
        }
        result
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: String,
    /// Unique external identifier
    pub citizen_id: String,
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub blood_type: Option<BloodType>,
    pub allergies: BTreeSet<String>,
    pub medical_notes: Option<String>,
    pub bhyt: Option<BhytCardInfo>,
    pub primary_guardian_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    /// Build from a validated intake. The intake's guardian is ignored here;
    /// the service creates it and passes its ID.
    pub fn from_intake(
        id: String,
        intake: PatientIntake,
        primary_guardian_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let date_of_birth = intake.date_of_birth.unwrap_or_else(|| now.date_naive());
        Self {
            id,
            citizen_id: intake.citizen_id.trim().to_string(),
            full_name: intake.full_name.trim().to_string(),
            date_of_birth,
            gender: intake.gender,
            phone: trimmed(intake.phone),
            email: trimmed(intake.email),
            address: trimmed(intake.address),
            blood_type: intake.blood_type,
            allergies: normalize_allergies(intake.allergies),
            medical_notes: trimmed(intake.medical_notes),
            bhyt: intake.bhyt,
            primary_guardian_id,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Re-intake of a known patient: demographics are replaced, identity
    /// (ID, citizen ID, creation time) is kept. A returning patient is
    /// reactivated. The existing guardian link stays unless a new one is
    /// given.
    pub fn apply_intake(
        &mut self,
        intake: PatientIntake,
        primary_guardian_id: Option<String>,
        now: DateTime<Utc>,
    ) {
        if let Some(dob) = intake.date_of_birth {
            self.date_of_birth = dob;
        }
        self.full_name = intake.full_name.trim().to_string();
        self.gender = intake.gender;
        self.phone = trimmed(intake.phone);
        self.email = trimmed(intake.email);
        self.address = trimmed(intake.address);
        self.blood_type = intake.blood_type;
        self.allergies = normalize_allergies(intake.allergies);
        self.medical_notes = trimmed(intake.medical_notes);
        self.bhyt = intake.bhyt;
        if primary_guardian_id.is_some() {
            self.primary_guardian_id = primary_guardian_id;
        }
        self.is_active = true;
        self.updated_at = now;
    }

    pub fn apply_update(&mut self, update: PatientUpdate, now: DateTime<Utc>) {
        if let Some(name) = update.full_name {
            self.full_name = name.trim().to_string();
        }
        if let Some(gender) = update.gender {
            self.gender = gender;
        }
        if update.phone.is_some() {
            self.phone = trimmed(update.phone);
        }
        if update.email.is_some() {
            self.email = trimmed(update.email);
        }
        if update.address.is_some() {
            self.address = trimmed(update.address);
        }
        if let Some(blood_type) = update.blood_type {
            self.blood_type = Some(blood_type);
        }
        if let Some(allergies) = update.allergies {
            self.allergies = normalize_allergies(allergies);
        }
        if update.medical_notes.is_some() {
            self.medical_notes = trimmed(update.medical_notes);
        }
        if let Some(bhyt) = update.bhyt {
            self.bhyt = Some(bhyt);
        }
        self.updated_at = now;
    }

    /// Age in completed years on `date`.
    pub fn age_on(&self, date: NaiveDate) -> u32 {
        date.years_since(self.date_of_birth).unwrap_or(0)
    }

    pub fn is_minor_on(&self, date: NaiveDate) -> bool {
        self.age_on(date) < 18
    }

    pub fn birth_year(&self) -> i32 {
        self.date_of_birth.year()
    }
}

fn validate_name(name: &str) -> ValidationResult {
    let mut result = ValidationResult::new();
    if result.require("full_name", name, "Full name is required") && name.trim().len() > MAX_NAME_LEN {
        result.add_error(
            "full_name",
            "Full name must be 200 characters or less",
            ValidationErrorCode::TooLong,
        );
    }
    result
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Allergies are a set; case and surrounding whitespace don't make a new one.
fn normalize_allergies(allergies: BTreeSet<String>) -> BTreeSet<String> {
    allergies
        .into_iter()
        .map(|a| a.trim().to_lowercase())
        .filter(|a| !a.is_empty())
        .collect()
}
