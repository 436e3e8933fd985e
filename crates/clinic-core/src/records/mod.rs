//! Patient / Clinical Record Service contract
//!
//! The workflow code never talks to storage. It hands fully built entities to
//! a [`RecordService`], which validates them, fills in derived fields
//! (`patient_owes`, the `is_active` snapshot, timestamps) and persists them.
//!
//! Every write answers with a [`Committed`] value carrying the stored entity
//! and the [`ViewKey`]s whose cached views are now stale.

pub mod diagnosis;
pub mod memory;
pub mod order;
pub mod patient;
pub mod prescription;
pub mod visit;

use serde::{Deserialize, Serialize};

use crate::insurance::{InsuranceCard, NewInsuranceCard};
use crate::pipeline::{PatientStatus, TransitionError};
use crate::validation::ValidationFailure;
use crate::vitals::VitalSignsEntry;

use self::diagnosis::{Diagnosis, NewDiagnosis};
use self::order::{NewOrder, Order, OrderStatus};
use self::patient::{Guardian, Patient, PatientIntake, PatientUpdate};
use self::prescription::{NewPrescription, Prescription};
use self::visit::{BloodWorkEntry, NewVisit, SoapNotes, Visit};

pub use memory::MemoryRecordService;

/// A cached view that a write can make stale
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "view", content = "id", rename_all = "snake_case")]
pub enum ViewKey {
    PatientList,
    Patient(String),
    PatientVisits(String),
    PatientVitals(String),
    PatientBloodWork(String),
    PatientOrders(String),
    PatientPrescriptions(String),
    PatientDiagnoses(String),
    PatientCards(String),
    Visit(String),
    Order(String),
}

impl ViewKey {
    /// Patient the view belongs to, if it is keyed by one.
    pub fn patient_id(&self) -> Option<&str> {
        match self {
            ViewKey::Patient(id)
            | ViewKey::PatientVisits(id)
            | ViewKey::PatientVitals(id)
            | ViewKey::PatientBloodWork(id)
            | ViewKey::PatientOrders(id)
            | ViewKey::PatientPrescriptions(id)
            | ViewKey::PatientDiagnoses(id)
            | ViewKey::PatientCards(id) => Some(id),
            ViewKey::PatientList | ViewKey::Visit(_) | ViewKey::Order(_) => None,
        }
    }
}

/// Views to drop after a patient's demographics change
pub fn patient_views(patient_id: &str) -> Vec<ViewKey> {
    vec![ViewKey::PatientList, ViewKey::Patient(patient_id.to_string())]
}

pub fn visit_views(patient_id: &str, visit_id: &str) -> Vec<ViewKey> {
    vec![
        ViewKey::Visit(visit_id.to_string()),
        ViewKey::PatientVisits(patient_id.to_string()),
    ]
}

pub fn order_views(patient_id: &str, order_id: &str) -> Vec<ViewKey> {
    vec![
        ViewKey::Order(order_id.to_string()),
        ViewKey::PatientOrders(patient_id.to_string()),
    ]
}

/// A successful write
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Committed<T> {
    pub record: T,
    pub invalidated: Vec<ViewKey>,
}

impl<T> Committed<T> {
    pub fn new(record: T, mut invalidated: Vec<ViewKey>) -> Self {
        invalidated.sort();
        invalidated.dedup();
        Self {
            record,
            invalidated,
        }
    }

    pub fn into_record(self) -> T {
        self.record
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error(transparent)]
    Validation(#[from] ValidationFailure),
    #[error("{0}")]
    Rejected(String),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

impl RecordError {
    pub fn not_found(entity: &'static str, id: &str) -> Self {
        RecordError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Validated writes and keyed reads over the clinical record store
pub trait RecordService {
    /// Create the patient, or update demographics of the patient already
    /// registered under the same citizen ID. A guardian in the intake is
    /// created first and linked as primary guardian. Nothing is written when
    /// either fails validation.
    fn upsert_patient(&mut self, intake: PatientIntake) -> Result<Committed<Patient>, RecordError>;
    fn get_patient(&self, patient_id: &str) -> Result<Patient, RecordError>;
    fn find_patient_by_citizen_id(&self, citizen_id: &str) -> Result<Option<Patient>, RecordError>;
    /// Active patients only, sorted by name.
    fn list_patients(&self) -> Result<Vec<Patient>, RecordError>;
    fn update_patient(
        &mut self,
        patient_id: &str,
        update: PatientUpdate,
    ) -> Result<Committed<Patient>, RecordError>;
    /// Soft delete.
    fn deactivate_patient(&mut self, patient_id: &str) -> Result<Committed<Patient>, RecordError>;
    fn get_guardian(&self, guardian_id: &str) -> Result<Guardian, RecordError>;

    fn create_visit(&mut self, visit: NewVisit) -> Result<Committed<Visit>, RecordError>;
    fn get_visit(&self, visit_id: &str) -> Result<Visit, RecordError>;
    fn patient_visits(&self, patient_id: &str) -> Result<Vec<Visit>, RecordError>;
    fn advance_visit(
        &mut self,
        visit_id: &str,
        to: PatientStatus,
    ) -> Result<Committed<Visit>, RecordError>;
    fn update_visit_notes(
        &mut self,
        visit_id: &str,
        notes: SoapNotes,
    ) -> Result<Committed<Visit>, RecordError>;

    fn record_vitals(
        &mut self,
        entry: VitalSignsEntry,
    ) -> Result<Committed<VitalSignsEntry>, RecordError>;
    /// Newest first.
    fn patient_vitals(&self, patient_id: &str) -> Result<Vec<VitalSignsEntry>, RecordError>;
    fn latest_vitals(&self, patient_id: &str) -> Result<Option<VitalSignsEntry>, RecordError> {
        Ok(self.patient_vitals(patient_id)?.into_iter().next())
    }
    fn record_blood_work(
        &mut self,
        entry: BloodWorkEntry,
    ) -> Result<Committed<BloodWorkEntry>, RecordError>;
    fn patient_blood_work(&self, patient_id: &str) -> Result<Vec<BloodWorkEntry>, RecordError>;

    /// The service computes `patient_owes`; the caller cannot supply it.
    fn create_order(&mut self, order: NewOrder) -> Result<Committed<Order>, RecordError>;
    fn get_order(&self, order_id: &str) -> Result<Order, RecordError>;
    fn patient_orders(&self, patient_id: &str) -> Result<Vec<Order>, RecordError>;
    fn update_order_status(
        &mut self,
        order_id: &str,
        to: OrderStatus,
    ) -> Result<Committed<Order>, RecordError>;

    fn create_prescription(
        &mut self,
        prescription: NewPrescription,
    ) -> Result<Committed<Prescription>, RecordError>;
    fn patient_prescriptions(&self, patient_id: &str) -> Result<Vec<Prescription>, RecordError>;
    fn discontinue_prescription(
        &mut self,
        prescription_id: &str,
        reason: &str,
    ) -> Result<Committed<Prescription>, RecordError>;
    fn record_refill(
        &mut self,
        prescription_id: &str,
    ) -> Result<Committed<Prescription>, RecordError>;

    fn create_diagnosis(
        &mut self,
        diagnosis: NewDiagnosis,
    ) -> Result<Committed<Diagnosis>, RecordError>;
    fn patient_diagnoses(&self, patient_id: &str) -> Result<Vec<Diagnosis>, RecordError>;

    fn add_insurance_card(
        &mut self,
        card: NewInsuranceCard,
    ) -> Result<Committed<InsuranceCard>, RecordError>;
    fn insurance_cards(&self, patient_id: &str) -> Result<Vec<InsuranceCard>, RecordError>;
}
