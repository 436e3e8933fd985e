//! Prescriptions Tests
//!
//! Prescribing from the dosing guide, controlled substances, refills,
//! discontinuation and primary diagnoses.

#[cfg(test)]
mod tests {
    use mycelix_clinic_core::records::diagnosis::{DiagnosisStatus, NewDiagnosis, Severity};
    use mycelix_clinic_core::records::prescription::{NewPrescription, PrescriptionStatus, Route};
    use mycelix_clinic_core::records::visit::{NewVisit, VisitType};
    use mycelix_clinic_core::records::RecordError;
    use mycelix_clinic_core::{ClinicError, Clock, RecordService};

    use crate::support::{clinic, register, Session};

    fn amoxicillin(patient_id: &str, refills: u32) -> NewPrescription {
        NewPrescription {
            patient_id: patient_id.to_string(),
            visit_id: None,
            medication_name: "Amoxicillin".to_string(),
            strength: None,
            dosage: String::new(),
            frequency: String::new(),
            route: Route::Oral,
            quantity: 21,
            refills_authorized: refills,
            controlled: false,
            instructions: None,
            prescriber: "dr.tuan".to_string(),
        }
    }

    fn rejection(err: ClinicError) -> String {
        match err {
            ClinicError::Record(RecordError::Rejected(reason)) => reason,
            other => panic!("expected a rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_dosing_filled_from_guide() {
        let mut clinic = clinic("dr.tuan");
        let patient = register(&mut clinic.session, "079088004321", "Truong Van Nam");
        let rx = clinic.session.prescribe(amoxicillin(&patient.id, 1)).unwrap();
        assert_eq!(rx.strength.as_deref(), Some("500 mg"));
        assert_eq!(rx.dosage, "500 mg");
        assert_eq!(rx.frequency, "Every 8 hours");
        assert_eq!(rx.status, PrescriptionStatus::Active);
        assert_eq!(rx.refills_remaining, 1);
    }

    #[test]
    fn test_guide_forces_controlled_flag() {
        let mut clinic = clinic("dr.tuan");
        let patient = register(&mut clinic.session, "079088004321", "Truong Van Nam");
        let guide = clinic.session.reference().medication("Tramadol").unwrap().clone();

        let mut form = NewPrescription::from_guide(&patient.id, "dr.tuan", &guide);
        form.controlled = false;
        form.quantity = 10;
        let rx = clinic.session.prescribe(form.clone()).unwrap();
        assert!(rx.controlled);

        form.refills_authorized = 1;
        let err = clinic.session.prescribe(form).unwrap_err();
        assert_eq!(err.user_message(), "Controlled substances cannot be refilled");
    }

    #[test]
    fn test_refills_run_out() {
        let mut clinic = clinic("dr.tuan");
        let patient = register(&mut clinic.session, "079088004321", "Truong Van Nam");
        let rx = clinic.session.prescribe(amoxicillin(&patient.id, 2)).unwrap();

        assert_eq!(clinic.session.record_refill(&rx.id).unwrap().refills_remaining, 1);
        let last = clinic.session.record_refill(&rx.id).unwrap();
        assert_eq!(last.refills_remaining, 0);
        assert_eq!(last.last_refill_at, Some(clinic.clock.now()));

        let err = clinic.session.record_refill(&rx.id).unwrap_err();
        assert_eq!(rejection(err), "No refills remaining");
    }

    #[test]
    fn test_discontinue_needs_reason_and_stops_refills() {
        let mut clinic = clinic("dr.tuan");
        let patient = register(&mut clinic.session, "079088004321", "Truong Van Nam");
        let rx = clinic.session.prescribe(amoxicillin(&patient.id, 3)).unwrap();

        let err = clinic.session.discontinue_prescription(&rx.id, "  ").unwrap_err();
        assert_eq!(
            rejection(err),
            "A reason is required to discontinue a prescription"
        );

        let stopped = clinic
            .session
            .discontinue_prescription(&rx.id, "Rash after second dose")
            .unwrap();
        assert_eq!(stopped.status, PrescriptionStatus::Discontinued);
        assert_eq!(
            stopped.discontinued_reason.as_deref(),
            Some("Rash after second dose")
        );

        let err = clinic.session.record_refill(&rx.id).unwrap_err();
        assert_eq!(rejection(err), "Cannot refill a discontinued prescription");
        let err = clinic
            .session
            .discontinue_prescription(&rx.id, "again")
            .unwrap_err();
        assert_eq!(rejection(err), "Prescription is already discontinued");
    }

    fn diagnose(session: &mut Session, patient_id: &str, visit_id: &str, code: &str) -> String {
        session
            .diagnose(NewDiagnosis {
                patient_id: patient_id.to_string(),
                visit_id: Some(visit_id.to_string()),
                disease_name: None,
                icd10_code: Some(code.to_string()),
                severity: Severity::Moderate,
                status: DiagnosisStatus::Active,
                is_primary: true,
                notes: None,
                diagnosed_by: "dr.tuan".to_string(),
            })
            .unwrap()
            .id
    }

    #[test]
    fn test_one_primary_diagnosis_per_visit() {
        let mut clinic = clinic("dr.tuan");
        let patient = register(&mut clinic.session, "079088004321", "Truong Van Nam");
        let visit = clinic
            .session
            .open_visit(NewVisit {
                patient_id: patient.id.clone(),
                visit_type: VisitType::FollowUp,
                reason: "Cough".to_string(),
                copay_vnd: 0,
            })
            .unwrap();

        let first = diagnose(&mut clinic.session, &patient.id, &visit.id, "J20.9");
        let second = diagnose(&mut clinic.session, &patient.id, &visit.id, "J45.909");

        let diagnoses = clinic.session.service().patient_diagnoses(&patient.id).unwrap();
        let primaries: Vec<&str> = diagnoses
            .iter()
            .filter(|d| d.is_primary)
            .map(|d| d.id.as_str())
            .collect();
        assert_eq!(primaries, vec![second.as_str()]);
        assert!(diagnoses.iter().any(|d| d.id == first && !d.is_primary));
    }

    #[test]
    fn test_prescription_visit_must_belong_to_patient() {
        let mut clinic = clinic("dr.tuan");
        let nam = register(&mut clinic.session, "079088004321", "Truong Van Nam");
        let mai = register(&mut clinic.session, "001199012345", "Le Thi Mai");
        let visit = clinic
            .session
            .open_visit(NewVisit {
                patient_id: mai.id.clone(),
                visit_type: VisitType::Consultation,
                reason: "Sore throat".to_string(),
                copay_vnd: 0,
            })
            .unwrap();

        let mut form = amoxicillin(&nam.id, 0);
        form.visit_id = Some(visit.id.clone());
        let err = clinic.session.prescribe(form).unwrap_err();
        assert_eq!(err.user_message(), "Visit belongs to a different patient");
        assert!(clinic
            .session
            .service()
            .patient_prescriptions(&nam.id)
            .unwrap()
            .is_empty());
    }
}
