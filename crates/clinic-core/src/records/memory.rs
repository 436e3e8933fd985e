//! In-memory record service
//!
//! Backs local sessions and tests. Enforces the same contract as the
//! coordinator zomes: validation before any write, patient existence before
//! dependent records, derived fields computed here.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, info};

use crate::clock::Clock;
use crate::insurance::{InsuranceCard, NewInsuranceCard};
use crate::pipeline::PatientStatus;
use crate::validation::{ValidationErrorCode, ValidationFailure};
use crate::vitals::VitalSignsEntry;

use super::diagnosis::{Diagnosis, NewDiagnosis};
use super::order::{NewOrder, Order, OrderStatus};
use super::patient::{Guardian, Patient, PatientIntake, PatientUpdate};
use super::prescription::{NewPrescription, Prescription};
use super::visit::{BloodWorkEntry, NewVisit, SoapNotes, Visit};
use super::{order_views, patient_views, visit_views, Committed, RecordError, RecordService, ViewKey};

pub struct MemoryRecordService {
    clock: Arc<dyn Clock>,
    sequence: u64,
    writes: usize,
    fail_next_write: Option<String>,
    fail_next_advance: Option<String>,
    patients: BTreeMap<String, Patient>,
    citizen_index: HashMap<String, String>,
    guardians: BTreeMap<String, Guardian>,
    visits: BTreeMap<String, Visit>,
    vitals: Vec<VitalSignsEntry>,
    blood_work: Vec<BloodWorkEntry>,
    orders: BTreeMap<String, Order>,
    prescriptions: BTreeMap<String, Prescription>,
    diagnoses: BTreeMap<String, Diagnosis>,
    cards: BTreeMap<String, InsuranceCard>,
}

impl MemoryRecordService {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            sequence: 0,
            writes: 0,
            fail_next_write: None,
            fail_next_advance: None,
            patients: BTreeMap::new(),
            citizen_index: HashMap::new(),
            guardians: BTreeMap::new(),
            visits: BTreeMap::new(),
            vitals: Vec::new(),
            blood_work: Vec::new(),
            orders: BTreeMap::new(),
            prescriptions: BTreeMap::new(),
            diagnoses: BTreeMap::new(),
            cards: BTreeMap::new(),
        }
    }

    /// Make the next write fail as if the store were unreachable.
    pub fn fail_next_write(&mut self, reason: &str) {
        self.fail_next_write = Some(reason.to_string());
    }

    /// Make the next visit advance fail as unavailable, leaving other
    /// writes alone.
    pub fn fail_next_advance(&mut self, reason: &str) {
        self.fail_next_advance = Some(reason.to_string());
    }

    /// Successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.sequence += 1;
        format!("{}-{:06}", prefix, self.sequence)
    }

    fn check_available(&mut self) -> Result<(), RecordError> {
        match self.fail_next_write.take() {
            Some(reason) => Err(RecordError::Unavailable(reason)),
            None => Ok(()),
        }
    }

    fn commit<T>(&mut self, record: T, invalidated: Vec<ViewKey>) -> Committed<T> {
        self.writes += 1;
        Committed::new(record, invalidated)
    }

    fn active_patient(&self, patient_id: &str) -> Result<&Patient, RecordError> {
        let patient = self
            .patients
            .get(patient_id)
            .ok_or_else(|| RecordError::not_found("patient", patient_id))?;
        if !patient.is_active {
            return Err(RecordError::Rejected(format!(
                "Patient {} is inactive",
                patient_id
            )));
        }
        Ok(patient)
    }

    /// The visit must exist and belong to `patient_id`.
    fn check_visit(&self, patient_id: &str, visit_id: Option<&str>) -> Result<(), RecordError> {
        let Some(visit_id) = visit_id else {
            return Ok(());
        };
        let visit = self
            .visits
            .get(visit_id)
            .ok_or_else(|| RecordError::not_found("visit", visit_id))?;
        if visit.patient_id != patient_id {
            return Err(RecordError::Validation(ValidationFailure::single(
                "visit_id",
                "Visit belongs to a different patient",
                ValidationErrorCode::InvalidReference,
            )));
        }
        Ok(())
    }
}

impl RecordService for MemoryRecordService {
    fn upsert_patient(&mut self, intake: PatientIntake) -> Result<Committed<Patient>, RecordError> {
        let now = self.clock.now();
        intake.validate(now.date_naive()).into_result()?;
        self.check_available()?;

        let existing = self.citizen_index.get(intake.citizen_id.trim()).cloned();
        let guardian_id = match intake.guardian.clone() {
            Some(input) => {
                let id = self.next_id("GRD");
                self.guardians
                    .insert(id.clone(), Guardian::from_new(id.clone(), input, now));
                debug!(guardian_id = %id, "guardian created");
                Some(id)
            }
            None => None,
        };

        let patient = match existing.and_then(|id| self.patients.get_mut(&id)) {
            Some(patient) => {
                patient.apply_intake(intake, guardian_id, now);
                info!(patient_id = %patient.id, "patient updated from intake");
                patient.clone()
            }
            None => {
                let id = self.next_id("PAT");
                let patient = Patient::from_intake(id.clone(), intake, guardian_id, now);
                self.citizen_index
                    .insert(patient.citizen_id.clone(), id.clone());
                self.patients.insert(id, patient.clone());
                info!(patient_id = %patient.id, "patient registered");
                patient
            }
        };
        let keys = patient_views(&patient.id);
        Ok(self.commit(patient, keys))
    }

    fn get_patient(&self, patient_id: &str) -> Result<Patient, RecordError> {
        self.patients
            .get(patient_id)
            .cloned()
            .ok_or_else(|| RecordError::not_found("patient", patient_id))
    }

    fn find_patient_by_citizen_id(&self, citizen_id: &str) -> Result<Option<Patient>, RecordError> {
        Ok(self
            .citizen_index
            .get(citizen_id.trim())
            .and_then(|id| self.patients.get(id))
            .cloned())
    }

    fn list_patients(&self) -> Result<Vec<Patient>, RecordError> {
        let mut patients: Vec<Patient> = self
            .patients
            .values()
            .filter(|p| p.is_active)
            .cloned()
            .collect();
        patients.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(patients)
    }

    fn update_patient(
        &mut self,
        patient_id: &str,
        update: PatientUpdate,
    ) -> Result<Committed<Patient>, RecordError> {
        update.validate().into_result()?;
        self.active_patient(patient_id)?;
        self.check_available()?;
        let now = self.clock.now();
        let patient = self
            .patients
            .get_mut(patient_id)
            .ok_or_else(|| RecordError::not_found("patient", patient_id))?;
        patient.apply_update(update, now);
        let patient = patient.clone();
        info!(patient_id, "patient updated");
        Ok(self.commit(patient, patient_views(patient_id)))
    }

    fn deactivate_patient(&mut self, patient_id: &str) -> Result<Committed<Patient>, RecordError> {
        if !self.patients.contains_key(patient_id) {
            return Err(RecordError::not_found("patient", patient_id));
        }
        self.check_available()?;
        let now = self.clock.now();
        let patient = self
            .patients
            .get_mut(patient_id)
            .ok_or_else(|| RecordError::not_found("patient", patient_id))?;
        patient.is_active = false;
        patient.updated_at = now;
        let patient = patient.clone();
        info!(patient_id, "patient deactivated");
        Ok(self.commit(patient, patient_views(patient_id)))
    }

    fn get_guardian(&self, guardian_id: &str) -> Result<Guardian, RecordError> {
        self.guardians
            .get(guardian_id)
            .cloned()
            .ok_or_else(|| RecordError::not_found("guardian", guardian_id))
    }

    fn create_visit(&mut self, visit: NewVisit) -> Result<Committed<Visit>, RecordError> {
        visit.validate().into_result()?;
        self.active_patient(&visit.patient_id)?;
        self.check_available()?;
        let id = self.next_id("VIS");
        let visit = Visit::from_new(id.clone(), visit, self.clock.now());
        self.visits.insert(id.clone(), visit.clone());
        info!(visit_id = %id, patient_id = %visit.patient_id, "visit opened");
        let keys = visit_views(&visit.patient_id, &id);
        Ok(self.commit(visit, keys))
    }

    fn get_visit(&self, visit_id: &str) -> Result<Visit, RecordError> {
        self.visits
            .get(visit_id)
            .cloned()
            .ok_or_else(|| RecordError::not_found("visit", visit_id))
    }

    fn patient_visits(&self, patient_id: &str) -> Result<Vec<Visit>, RecordError> {
        let mut visits: Vec<Visit> = self
            .visits
            .values()
            .filter(|v| v.patient_id == patient_id)
            .cloned()
            .collect();
        visits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(visits)
    }

    fn advance_visit(
        &mut self,
        visit_id: &str,
        to: PatientStatus,
    ) -> Result<Committed<Visit>, RecordError> {
        let mut visit = self.get_visit(visit_id)?;
        let from = visit.status;
        visit.advance(to, self.clock.now())?;
        if let Some(reason) = self.fail_next_advance.take() {
            return Err(RecordError::Unavailable(reason));
        }
        self.check_available()?;
        self.visits.insert(visit_id.to_string(), visit.clone());
        info!(visit_id, %from, %to, "visit advanced");
        let keys = visit_views(&visit.patient_id, visit_id);
        Ok(self.commit(visit, keys))
    }

    fn update_visit_notes(
        &mut self,
        visit_id: &str,
        notes: SoapNotes,
    ) -> Result<Committed<Visit>, RecordError> {
        let mut visit = self.get_visit(visit_id)?;
        if visit.is_closed() {
            return Err(RecordError::Rejected(format!(
                "Visit is {} and can no longer be edited",
                visit.status.display().label
            )));
        }
        self.check_available()?;
        visit.notes = notes;
        visit.updated_at = self.clock.now();
        self.visits.insert(visit_id.to_string(), visit.clone());
        let keys = visit_views(&visit.patient_id, visit_id);
        Ok(self.commit(visit, keys))
    }

    fn record_vitals(
        &mut self,
        entry: VitalSignsEntry,
    ) -> Result<Committed<VitalSignsEntry>, RecordError> {
        entry.validate().into_result()?;
        self.active_patient(&entry.patient_id)?;
        self.check_visit(&entry.patient_id, entry.visit_id.as_deref())?;
        self.check_available()?;
        self.vitals.push(entry.clone());
        info!(patient_id = %entry.patient_id, "vitals stored");
        let keys = vec![ViewKey::PatientVitals(entry.patient_id.clone())];
        Ok(self.commit(entry, keys))
    }

    fn patient_vitals(&self, patient_id: &str) -> Result<Vec<VitalSignsEntry>, RecordError> {
        let mut entries: Vec<VitalSignsEntry> = self
            .vitals
            .iter()
            .rev()
            .filter(|v| v.patient_id == patient_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        Ok(entries)
    }

    fn record_blood_work(
        &mut self,
        entry: BloodWorkEntry,
    ) -> Result<Committed<BloodWorkEntry>, RecordError> {
        entry.validate().into_result()?;
        self.active_patient(&entry.patient_id)?;
        self.check_visit(&entry.patient_id, entry.visit_id.as_deref())?;
        self.check_available()?;
        self.blood_work.push(entry.clone());
        info!(patient_id = %entry.patient_id, tubes = entry.tube_codes.len(), "blood work stored");
        let keys = vec![ViewKey::PatientBloodWork(entry.patient_id.clone())];
        Ok(self.commit(entry, keys))
    }

    fn patient_blood_work(&self, patient_id: &str) -> Result<Vec<BloodWorkEntry>, RecordError> {
        let mut entries: Vec<BloodWorkEntry> = self
            .blood_work
            .iter()
            .rev()
            .filter(|b| b.patient_id == patient_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.collected_at.cmp(&a.collected_at));
        Ok(entries)
    }

    fn create_order(&mut self, order: NewOrder) -> Result<Committed<Order>, RecordError> {
        order.validate().into_result()?;
        self.active_patient(&order.patient_id)?;
        self.check_visit(&order.patient_id, order.visit_id.as_deref())?;
        self.check_available()?;
        let id = self.next_id("ORD");
        let order = Order::from_new(id.clone(), order, self.clock.now())?;
        self.orders.insert(id.clone(), order.clone());
        info!(
            order_id = %id,
            patient_id = %order.patient_id,
            total = order.total_amount_vnd,
            patient_owes = order.patient_owes_vnd,
            "order created"
        );
        let keys = order_views(&order.patient_id, &id);
        Ok(self.commit(order, keys))
    }

    fn get_order(&self, order_id: &str) -> Result<Order, RecordError> {
        self.orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| RecordError::not_found("order", order_id))
    }

    fn patient_orders(&self, patient_id: &str) -> Result<Vec<Order>, RecordError> {
        let mut orders: Vec<Order> = self
            .orders
            .values()
            .filter(|o| o.patient_id == patient_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    fn update_order_status(
        &mut self,
        order_id: &str,
        to: OrderStatus,
    ) -> Result<Committed<Order>, RecordError> {
        let mut order = self.get_order(order_id)?;
        if !order.status.can_transition_to(to) {
            return Err(RecordError::Rejected(format!(
                "Cannot move order from {:?} to {:?}",
                order.status, to
            )));
        }
        self.check_available()?;
        order.status = to;
        order.updated_at = self.clock.now();
        self.orders.insert(order_id.to_string(), order.clone());
        info!(order_id, status = ?to, "order status changed");
        let keys = order_views(&order.patient_id, order_id);
        Ok(self.commit(order, keys))
    }

    fn create_prescription(
        &mut self,
        prescription: NewPrescription,
    ) -> Result<Committed<Prescription>, RecordError> {
        prescription.validate().into_result()?;
        self.active_patient(&prescription.patient_id)?;
        self.check_visit(&prescription.patient_id, prescription.visit_id.as_deref())?;
        self.check_available()?;
        let id = self.next_id("RX");
        let prescription = Prescription::from_new(id.clone(), prescription, self.clock.now());
        self.prescriptions.insert(id.clone(), prescription.clone());
        info!(
            prescription_id = %id,
            medication = %prescription.medication_name,
            controlled = prescription.controlled,
            "prescription created"
        );
        let keys = vec![ViewKey::PatientPrescriptions(prescription.patient_id.clone())];
        Ok(self.commit(prescription, keys))
    }

    fn patient_prescriptions(&self, patient_id: &str) -> Result<Vec<Prescription>, RecordError> {
        Ok(self
            .prescriptions
            .values()
            .filter(|p| p.patient_id == patient_id)
            .cloned()
            .collect())
    }

    fn discontinue_prescription(
        &mut self,
        prescription_id: &str,
        reason: &str,
    ) -> Result<Committed<Prescription>, RecordError> {
        let mut prescription = self
            .prescriptions
            .get(prescription_id)
            .cloned()
            .ok_or_else(|| RecordError::not_found("prescription", prescription_id))?;
        prescription.discontinue(reason, self.clock.now())?;
        self.check_available()?;
        self.prescriptions
            .insert(prescription_id.to_string(), prescription.clone());
        info!(prescription_id, "prescription discontinued");
        let keys = vec![ViewKey::PatientPrescriptions(prescription.patient_id.clone())];
        Ok(self.commit(prescription, keys))
    }

    fn record_refill(
        &mut self,
        prescription_id: &str,
    ) -> Result<Committed<Prescription>, RecordError> {
        let mut prescription = self
            .prescriptions
            .get(prescription_id)
            .cloned()
            .ok_or_else(|| RecordError::not_found("prescription", prescription_id))?;
        let remaining = prescription.record_refill(self.clock.now())?;
        self.check_available()?;
        self.prescriptions
            .insert(prescription_id.to_string(), prescription.clone());
        info!(prescription_id, remaining, "refill recorded");
        let keys = vec![ViewKey::PatientPrescriptions(prescription.patient_id.clone())];
        Ok(self.commit(prescription, keys))
    }

    fn create_diagnosis(
        &mut self,
        diagnosis: NewDiagnosis,
    ) -> Result<Committed<Diagnosis>, RecordError> {
        diagnosis.validate().into_result()?;
        self.active_patient(&diagnosis.patient_id)?;
        self.check_visit(&diagnosis.patient_id, diagnosis.visit_id.as_deref())?;
        self.check_available()?;
        let id = self.next_id("DX");
        let diagnosis = Diagnosis::from_new(id.clone(), diagnosis, self.clock.now());

        // One primary diagnosis per visit
        if diagnosis.is_primary && diagnosis.visit_id.is_some() {
            for other in self.diagnoses.values_mut() {
                if other.patient_id == diagnosis.patient_id && other.visit_id == diagnosis.visit_id {
                    other.is_primary = false;
                }
            }
        }
        self.diagnoses.insert(id.clone(), diagnosis.clone());
        info!(diagnosis_id = %id, code = ?diagnosis.icd10_code, "diagnosis recorded");
        let keys = vec![ViewKey::PatientDiagnoses(diagnosis.patient_id.clone())];
        Ok(self.commit(diagnosis, keys))
    }

    fn patient_diagnoses(&self, patient_id: &str) -> Result<Vec<Diagnosis>, RecordError> {
        Ok(self
            .diagnoses
            .values()
            .filter(|d| d.patient_id == patient_id)
            .cloned()
            .collect())
    }

    fn add_insurance_card(
        &mut self,
        card: NewInsuranceCard,
    ) -> Result<Committed<InsuranceCard>, RecordError> {
        card.validate().into_result()?;
        self.active_patient(&card.patient_id)?;
        self.check_available()?;
        let id = self.next_id("CARD");
        let card = InsuranceCard::create(id.clone(), card, self.clock.now())?;
        self.cards.insert(id.clone(), card.clone());
        info!(card_id = %id, is_active = card.is_active, "insurance card added");
        let keys = vec![ViewKey::PatientCards(card.patient_id.clone())];
        Ok(self.commit(card, keys))
    }

    fn insurance_cards(&self, patient_id: &str) -> Result<Vec<InsuranceCard>, RecordError> {
        let mut cards: Vec<InsuranceCard> = self
            .cards
            .values()
            .filter(|c| c.patient_id == patient_id)
            .cloned()
            .collect();
        cards.sort_by_key(|c| c.expiry_date);
        Ok(cards)
    }
}
