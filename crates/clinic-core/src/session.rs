//! Clinic Session
//!
//! The application context for one signed-in clinician. Created when the
//! session starts and consumed by [`ClinicSession::end`]; nothing in it
//! outlives the session. It owns:
//!
//! - the record service handle,
//! - the shared read-only reference tables,
//! - the clinic configuration, including the unit-system preference,
//! - a small view cache (patient list, insurance cards, latest vitals)
//!   that every write invalidates through its [`ViewKey`]s.
//!
//! Insurance classification is never cached: cards may come from cache,
//! but their status is recomputed against the clock on every read.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::bhyt::{BhytEligibility, BhytLookupRequest, InsuranceLookup, MockBhytLookup};
use crate::clock::Clock;
use crate::config::ClinicConfig;
use crate::error::ClinicError;
use crate::insurance::{CardSummary, CardTracker, InsuranceCard, InsuranceOverview, NewInsuranceCard};
use crate::pipeline::PatientStatus;
use crate::records::diagnosis::{Diagnosis, NewDiagnosis};
use crate::records::order::{NewOrder, Order, OrderStatus};
use crate::records::patient::{Patient, PatientIntake, PatientUpdate};
use crate::records::prescription::{NewPrescription, Prescription};
use crate::records::visit::{BloodWorkEntry, NewVisit, SoapNotes, Visit};
use crate::records::{Committed, RecordService, ViewKey};
use crate::reference::ReferenceData;
use crate::specimen::{CollectionManifest, LabelHeader, LabelPrinter, SpecimenSelection};
use crate::units::UnitSystem;
use crate::vitals::{VitalField, VitalSignsEntry, VitalsCapture, VitalsSubmission};

/// What a session did, reported when it ends
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSummary {
    pub clinician: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration: Duration,
    pub writes: usize,
}

/// A saved vitals or blood-work entry and what happened to its visit.
///
/// The entry is committed either way. `advance_error` is set when the
/// visit should have moved on but the service refused or failed; the
/// visit is then left where it was and can be advanced by hand.
#[derive(Clone, Debug, PartialEq)]
pub struct Recorded<T> {
    pub entry: T,
    pub advanced_to: Option<PatientStatus>,
    pub advance_error: Option<String>,
}

pub struct ClinicSession<S: RecordService> {
    service: S,
    reference: Arc<ReferenceData>,
    config: ClinicConfig,
    clock: Arc<dyn Clock>,
    clinician: String,
    started_at: DateTime<Utc>,
    tracker: CardTracker,
    writes: usize,
    patient_list: Option<Vec<Patient>>,
    cards: HashMap<String, Vec<InsuranceCard>>,
    latest_vitals: HashMap<String, Option<VitalSignsEntry>>,
}

impl<S: RecordService> ClinicSession<S> {
    pub fn start(
        service: S,
        reference: Arc<ReferenceData>,
        config: ClinicConfig,
        clinician: &str,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ClinicError> {
        config.validate()?;
        let started_at = clock.now();
        info!(clinician, clinic = %config.clinic_name, "session started");
        Ok(Self {
            tracker: CardTracker::from_config(&config),
            service,
            reference,
            config,
            clock,
            clinician: clinician.to_string(),
            started_at,
            writes: 0,
            patient_list: None,
            cards: HashMap::new(),
            latest_vitals: HashMap::new(),
        })
    }

    /// Tear the session down, dropping every cached view.
    pub fn end(self) -> SessionSummary {
        let ended_at = self.clock.now();
        let summary = SessionSummary {
            clinician: self.clinician,
            started_at: self.started_at,
            ended_at,
            duration: ended_at - self.started_at,
            writes: self.writes,
        };
        info!(
            clinician = %summary.clinician,
            writes = summary.writes,
            minutes = summary.duration.num_minutes(),
            "session ended"
        );
        summary
    }

    pub fn clinician(&self) -> &str {
        &self.clinician
    }

    pub fn reference(&self) -> &Arc<ReferenceData> {
        &self.reference
    }

    pub fn config(&self) -> &ClinicConfig {
        &self.config
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn service_mut(&mut self) -> &mut S {
        &mut self.service
    }

    pub fn unit_system(&self) -> UnitSystem {
        self.config.unit_system
    }

    pub fn set_unit_system(&mut self, units: UnitSystem) {
        self.config.unit_system = units;
    }

    /// A stored metric value in the session's units.
    pub fn format_vital(&self, field: VitalField, metric_value: f64) -> String {
        self.config.unit_system.format(field, metric_value)
    }

    // ---- cache ----

    pub fn is_cached(&self, key: &ViewKey) -> bool {
        match key {
            ViewKey::PatientList => self.patient_list.is_some(),
            ViewKey::PatientCards(id) => self.cards.contains_key(id),
            ViewKey::PatientVitals(id) => self.latest_vitals.contains_key(id),
            _ => false,
        }
    }

    /// Drop every cached view named by `keys`.
    pub fn invalidate(&mut self, keys: &[ViewKey]) {
        for key in keys {
            match key {
                ViewKey::PatientList | ViewKey::Patient(_) => self.patient_list = None,
                ViewKey::PatientCards(id) => {
                    self.cards.remove(id);
                }
                ViewKey::PatientVitals(id) => {
                    self.latest_vitals.remove(id);
                }
                _ => {}
            }
        }
        debug!(keys = keys.len(), "views invalidated");
    }

    fn accept<T>(&mut self, committed: Committed<T>) -> T {
        self.invalidate(&committed.invalidated);
        self.writes += 1;
        committed.record
    }

    // ---- patients ----

    pub fn register_patient(&mut self, intake: PatientIntake) -> Result<Patient, ClinicError> {
        let committed = self.service.upsert_patient(intake)?;
        Ok(self.accept(committed))
    }

    pub fn update_patient(
        &mut self,
        patient_id: &str,
        update: PatientUpdate,
    ) -> Result<Patient, ClinicError> {
        let committed = self.service.update_patient(patient_id, update)?;
        Ok(self.accept(committed))
    }

    pub fn deactivate_patient(&mut self, patient_id: &str) -> Result<Patient, ClinicError> {
        let committed = self.service.deactivate_patient(patient_id)?;
        Ok(self.accept(committed))
    }

    /// Active patients, served from cache until a write invalidates it.
    pub fn patients(&mut self) -> Result<&[Patient], ClinicError> {
        let list = match self.patient_list.take() {
            Some(list) => list,
            None => self.service.list_patients()?,
        };
        Ok(self.patient_list.insert(list).as_slice())
    }

    // ---- visits ----

    pub fn open_visit(&mut self, visit: NewVisit) -> Result<Visit, ClinicError> {
        let committed = self.service.create_visit(visit)?;
        Ok(self.accept(committed))
    }

    pub fn advance_visit(&mut self, visit_id: &str, to: PatientStatus) -> Result<Visit, ClinicError> {
        let committed = self.service.advance_visit(visit_id, to)?;
        Ok(self.accept(committed))
    }

    pub fn update_visit_notes(&mut self, visit_id: &str, notes: SoapNotes) -> Result<Visit, ClinicError> {
        let committed = self.service.update_visit_notes(visit_id, notes)?;
        Ok(self.accept(committed))
    }

    /// Advance only when the visit sits exactly at `from`.
    fn advance_if_at(
        &mut self,
        visit_id: Option<&str>,
        from: PatientStatus,
    ) -> Result<Option<PatientStatus>, ClinicError> {
        let Some(visit_id) = visit_id else {
            return Ok(None);
        };
        let visit = self.service.get_visit(visit_id)?;
        match from.next() {
            Some(next) if visit.status == from => {
                self.advance_visit(visit_id, next)?;
                Ok(Some(next))
            }
            _ => Ok(None),
        }
    }

    /// Follow-up advance for an entry that is already saved. A failure
    /// here is reported on the result, never as an error.
    fn settle<T>(&mut self, entry: T, visit_id: Option<&str>, from: PatientStatus) -> Recorded<T> {
        match self.advance_if_at(visit_id, from) {
            Ok(advanced_to) => Recorded {
                entry,
                advanced_to,
                advance_error: None,
            },
            Err(e) => {
                warn!(
                    visit_id = visit_id.unwrap_or_default(),
                    error = %e,
                    "entry saved but visit not advanced"
                );
                Recorded {
                    entry,
                    advanced_to: None,
                    advance_error: Some(e.user_message()),
                }
            }
        }
    }

    // ---- vitals ----

    fn latest_vitals(&mut self, patient_id: &str) -> Result<Option<VitalSignsEntry>, ClinicError> {
        if let Some(cached) = self.latest_vitals.get(patient_id) {
            return Ok(cached.clone());
        }
        let latest = self.service.latest_vitals(patient_id)?;
        self.latest_vitals
            .insert(patient_id.to_string(), latest.clone());
        Ok(latest)
    }

    /// A fresh capture for `patient_id`, offering the last recorded height.
    pub fn begin_vitals(&mut self, patient_id: &str) -> Result<VitalsCapture, ClinicError> {
        let prior_height = self
            .latest_vitals(patient_id)?
            .map(|entry| entry.measurements.height_cm);
        Ok(VitalsCapture::new(self.reference.vitals_checklist()).with_prior_height(prior_height))
    }

    /// Submit a complete capture. A visit waiting on vitals moves on to
    /// `VitalsDone`. Only the write itself can fail the call.
    pub fn submit_vitals(
        &mut self,
        capture: &mut VitalsCapture,
        patient_id: &str,
        visit_id: Option<&str>,
        notes: Option<String>,
    ) -> Result<Recorded<VitalSignsEntry>, ClinicError> {
        let submission = VitalsSubmission {
            patient_id: patient_id.to_string(),
            visit_id: visit_id.map(str::to_string),
            notes,
            recorded_by: self.clinician.clone(),
            recorded_at: self.clock.now(),
        };
        let committed = capture.submit(&mut self.service, submission)?;
        let entry = self.accept(committed);
        Ok(self.settle(entry, visit_id, PatientStatus::VitalsPending))
    }

    // ---- phlebotomy ----

    pub fn new_specimen_selection(&self) -> SpecimenSelection {
        SpecimenSelection::new()
    }

    pub fn print_labels<P: LabelPrinter + ?Sized>(
        &self,
        selection: &SpecimenSelection,
        patient: &Patient,
        printer: &mut P,
    ) -> Result<Option<CollectionManifest>, ClinicError> {
        let header = LabelHeader {
            clinic_name: self.config.clinic_name.clone(),
            patient_id: patient.id.clone(),
            patient_name: patient.full_name.clone(),
            printed_at: self.clock.now(),
        };
        Ok(selection.print_labels(self.reference.lab_tubes(), header, printer)?)
    }

    /// Record the draw. A visit waiting on phlebotomy moves on to
    /// `PhlebotomyDone`.
    pub fn record_blood_work(
        &mut self,
        manifest: &CollectionManifest,
        patient_id: &str,
        visit_id: Option<&str>,
        notes: Option<String>,
    ) -> Result<Recorded<BloodWorkEntry>, ClinicError> {
        let entry = manifest.to_blood_work(
            patient_id,
            visit_id.map(str::to_string),
            &self.clinician,
            self.clock.now(),
            notes,
        );
        let committed = self.service.record_blood_work(entry)?;
        let entry = self.accept(committed);
        Ok(self.settle(entry, visit_id, PatientStatus::PhlebotomyPending))
    }

    // ---- orders, prescriptions, diagnoses ----

    pub fn place_order(&mut self, order: NewOrder) -> Result<Order, ClinicError> {
        let committed = self.service.create_order(order)?;
        Ok(self.accept(committed))
    }

    pub fn update_order_status(&mut self, order_id: &str, to: OrderStatus) -> Result<Order, ClinicError> {
        let committed = self.service.update_order_status(order_id, to)?;
        Ok(self.accept(committed))
    }

    /// Blank dosing fields are filled from the medication guide when the
    /// drug is listed there.
    pub fn prescribe(&mut self, mut prescription: NewPrescription) -> Result<Prescription, ClinicError> {
        if let Some(guide) = self.reference.medication(&prescription.medication_name) {
            prescription.apply_guide(guide);
        }
        let committed = self.service.create_prescription(prescription)?;
        Ok(self.accept(committed))
    }

    pub fn discontinue_prescription(
        &mut self,
        prescription_id: &str,
        reason: &str,
    ) -> Result<Prescription, ClinicError> {
        let committed = self.service.discontinue_prescription(prescription_id, reason)?;
        Ok(self.accept(committed))
    }

    pub fn record_refill(&mut self, prescription_id: &str) -> Result<Prescription, ClinicError> {
        let committed = self.service.record_refill(prescription_id)?;
        Ok(self.accept(committed))
    }

    pub fn diagnose(&mut self, diagnosis: NewDiagnosis) -> Result<Diagnosis, ClinicError> {
        let committed = self.service.create_diagnosis(diagnosis)?;
        Ok(self.accept(committed))
    }

    // ---- insurance ----

    pub fn add_insurance_card(&mut self, card: NewInsuranceCard) -> Result<InsuranceCard, ClinicError> {
        let committed = self.service.add_insurance_card(card)?;
        Ok(self.accept(committed))
    }

    fn cards_for(&mut self, patient_id: &str) -> Result<&[InsuranceCard], ClinicError> {
        if !self.cards.contains_key(patient_id) {
            let cards = self.service.insurance_cards(patient_id)?;
            self.cards.insert(patient_id.to_string(), cards);
        }
        Ok(self
            .cards
            .get(patient_id)
            .map(Vec::as_slice)
            .unwrap_or_default())
    }

    /// Live classification of every card, recomputed now.
    pub fn insurance_cards(&mut self, patient_id: &str) -> Result<Vec<CardSummary>, ClinicError> {
        let now = self.clock.now();
        let tracker = self.tracker;
        Ok(self
            .cards_for(patient_id)?
            .iter()
            .map(|card| tracker.summarize(card, now))
            .collect())
    }

    pub fn insurance_overview(&mut self, patient_id: &str) -> Result<InsuranceOverview, ClinicError> {
        let now = self.clock.now();
        let tracker = self.tracker;
        let cards = self.cards_for(patient_id)?;
        Ok(tracker.overview(cards, now))
    }

    /// The mocked BHYT gateway with this clinic's configured latency.
    pub fn bhyt_lookup(&self) -> MockBhytLookup {
        MockBhytLookup::from_config(&self.config)
    }

    /// Check the patient's national insurance as of today.
    pub fn lookup_bhyt<L: InsuranceLookup + ?Sized>(
        &self,
        lookup: &L,
        patient: &Patient,
    ) -> Result<BhytEligibility, ClinicError> {
        let request = BhytLookupRequest {
            citizen_id: patient.citizen_id.clone(),
            date_of_birth: patient.date_of_birth,
            full_name: patient.full_name.clone(),
            as_of: self.clock.today(),
        };
        Ok(lookup.lookup(&request)?)
    }
}
