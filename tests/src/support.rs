//! Shared fixtures for the scenario tests

use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use mycelix_clinic_core::records::patient::{Patient, PatientIntake};
use mycelix_clinic_core::{
    ClinicConfig, ClinicSession, LabelDocument, LabelPrinter, ManualClock, MemoryRecordService,
    PrintError, ReferenceData, VitalField, VitalsCapture,
};

pub type Session = ClinicSession<MemoryRecordService>;

pub struct Clinic {
    pub clock: Arc<ManualClock>,
    pub session: Session,
}

/// A session for `clinician` opened at 08:00 on 2 March 2026.
pub fn clinic(clinician: &str) -> Clinic {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap(),
    ));
    let service = MemoryRecordService::new(clock.clone());
    let reference = Arc::new(ReferenceData::builtin().expect("builtin reference tables"));
    let session = ClinicSession::start(
        service,
        reference,
        ClinicConfig {
            lookup_delay_ms: 10,
            ..ClinicConfig::default()
        },
        clinician,
        clock.clone(),
    )
    .expect("test config is valid");
    Clinic { clock, session }
}

pub fn register(session: &mut Session, citizen_id: &str, name: &str) -> Patient {
    session
        .register_patient(PatientIntake::new(
            citizen_id,
            name,
            NaiveDate::from_ymd_opt(1988, 9, 9).unwrap(),
        ))
        .expect("intake is valid")
}

/// Enter a full set of normal adult vitals.
pub fn fill_vitals(capture: &mut VitalsCapture) {
    for (field, raw) in [
        (VitalField::Height, "170"),
        (VitalField::Weight, "70"),
        (VitalField::Temperature, "36.8"),
        (VitalField::SystolicBp, "118"),
        (VitalField::DiastolicBp, "76"),
        (VitalField::HeartRate, "72"),
        (VitalField::RespiratoryRate, "16"),
        (VitalField::Spo2, "98"),
    ] {
        capture.enter(field, raw);
    }
}

/// Keeps every rendered label sheet
#[derive(Default)]
pub struct PaperTray {
    pub sheets: Vec<String>,
    pub jammed: bool,
}

impl LabelPrinter for PaperTray {
    fn print(&mut self, document: &LabelDocument) -> Result<(), PrintError> {
        if self.jammed {
            return Err(PrintError::Unavailable("paper jam".to_string()));
        }
        self.sheets.push(document.render());
        Ok(())
    }
}
