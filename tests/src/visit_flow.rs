//! Visit Flow Tests
//!
//! Intake, vitals, phlebotomy, lab order and checkout for one visit, driven
//! through a single clinician session.

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use mycelix_clinic_core::bhyt::MockBhytLookup;
    use mycelix_clinic_core::records::order::{NewOrder, OrderLine, OrderStatus};
    use mycelix_clinic_core::records::visit::{NewVisit, SoapNotes, VisitType};
    use mycelix_clinic_core::records::RecordError;
    use mycelix_clinic_core::{Clock, ClinicError, PatientStatus, RecordService, ViewKey};
    use rand::seq::SliceRandom;

    use crate::support::{clinic, fill_vitals, register, PaperTray};

    fn consultation(patient_id: &str) -> NewVisit {
        NewVisit {
            patient_id: patient_id.to_string(),
            visit_type: VisitType::Consultation,
            reason: "Annual check-up".to_string(),
            copay_vnd: 50_000,
        }
    }

    #[test]
    fn test_full_visit_reaches_completed() {
        let mut clinic = clinic("nurse.hoa");
        let patient = register(&mut clinic.session, "079088004321", "Truong Van Nam");
        let visit = clinic.session.open_visit(consultation(&patient.id)).unwrap();
        assert_eq!(visit.status, PatientStatus::Intake);

        // Vitals
        clinic
            .session
            .advance_visit(&visit.id, PatientStatus::VitalsPending)
            .unwrap();
        let mut capture = clinic.session.begin_vitals(&patient.id).unwrap();
        fill_vitals(&mut capture);
        assert!(capture.can_submit());
        let vitals = clinic
            .session
            .submit_vitals(&mut capture, &patient.id, Some(&visit.id), None)
            .unwrap()
            .entry;
        assert!(vitals.measurements.bmi.is_some());

        // Phlebotomy, tubes picked in arbitrary order
        clinic.clock.advance(Duration::minutes(10));
        clinic
            .session
            .advance_visit(&visit.id, PatientStatus::PhlebotomyPending)
            .unwrap();
        let mut codes = vec!["BT004", "BT001", "BT005", "BT003"];
        codes.shuffle(&mut rand::thread_rng());
        let mut selection = clinic.session.new_specimen_selection();
        for code in &codes {
            selection.toggle(code);
        }
        let mut tray = PaperTray::default();
        let manifest = clinic
            .session
            .print_labels(&selection, &patient, &mut tray)
            .unwrap()
            .unwrap();
        assert_eq!(manifest.codes(), vec!["BT001", "BT005", "BT003", "BT004"]);
        assert_eq!(tray.sheets.len(), 1);

        let draw = clinic
            .session
            .record_blood_work(&manifest, &patient.id, Some(&visit.id), None)
            .unwrap();
        assert_eq!(draw.entry.collected_by, "nurse.hoa");
        assert_eq!(draw.advanced_to, Some(PatientStatus::PhlebotomyDone));

        // Lab order with BHYT coverage
        let eligibility = clinic
            .session
            .lookup_bhyt(&MockBhytLookup::instant(), &patient)
            .unwrap();
        let total = 300_000;
        let coverage = eligibility
            .coverage_for(total, clinic.clock.now().date_naive())
            .unwrap();
        let order = clinic
            .session
            .place_order(NewOrder {
                patient_id: patient.id.clone(),
                visit_id: Some(visit.id.clone()),
                lines: vec![
                    OrderLine {
                        test_code: "CMP".to_string(),
                        test_name: "Comprehensive Metabolic Panel".to_string(),
                        price_vnd: 180_000,
                    },
                    OrderLine {
                        test_code: "CBC".to_string(),
                        test_name: "Complete Blood Count".to_string(),
                        price_vnd: 120_000,
                    },
                ],
                discount_vnd: 0,
                coverage: vec![coverage],
                notes: None,
            })
            .unwrap();
        // Digit sum 42 puts the card at benefit level 3 (95%)
        assert_eq!(order.total_amount_vnd, 300_000);
        assert_eq!(order.patient_owes_vnd, 15_000);

        for to in [
            PatientStatus::LabsPending,
            PatientStatus::LabsDone,
            PatientStatus::ProviderReview,
            PatientStatus::Checkout,
        ] {
            clinic.session.advance_visit(&visit.id, to).unwrap();
        }
        clinic
            .session
            .update_order_status(&order.id, OrderStatus::Processing)
            .unwrap();
        clinic
            .session
            .update_order_status(&order.id, OrderStatus::Completed)
            .unwrap();

        clinic.clock.advance(Duration::minutes(30));
        let done = clinic
            .session
            .advance_visit(&visit.id, PatientStatus::Completed)
            .unwrap();
        assert_eq!(done.completed_at, Some(clinic.clock.now()));

        let summary = clinic.session.end();
        assert_eq!(summary.duration, Duration::minutes(40));
    }

    #[test]
    fn test_vitals_submission_advances_only_waiting_visit() {
        let mut clinic = clinic("nurse.hoa");
        let patient = register(&mut clinic.session, "079088004321", "Truong Van Nam");
        let visit = clinic.session.open_visit(consultation(&patient.id)).unwrap();

        // Still at intake, so the visit is left alone
        let mut capture = clinic.session.begin_vitals(&patient.id).unwrap();
        fill_vitals(&mut capture);
        clinic
            .session
            .submit_vitals(&mut capture, &patient.id, Some(&visit.id), None)
            .unwrap();
        let visit = clinic.session.service().get_visit(&visit.id).unwrap();
        assert_eq!(visit.status, PatientStatus::Intake);
    }

    #[test]
    fn test_draw_kept_when_visit_cannot_advance() {
        let mut clinic = clinic("tech.minh");
        let patient = register(&mut clinic.session, "079088004321", "Truong Van Nam");
        let visit = clinic.session.open_visit(consultation(&patient.id)).unwrap();
        for to in [
            PatientStatus::VitalsPending,
            PatientStatus::VitalsDone,
            PatientStatus::PhlebotomyPending,
        ] {
            clinic.session.advance_visit(&visit.id, to).unwrap();
        }

        let mut selection = clinic.session.new_specimen_selection();
        selection.select("BT001");
        let manifest = clinic
            .session
            .print_labels(&selection, &patient, &mut PaperTray::default())
            .unwrap()
            .unwrap();

        clinic.session.service_mut().fail_next_advance("gateway timeout");
        let draw = clinic
            .session
            .record_blood_work(&manifest, &patient.id, Some(&visit.id), None)
            .unwrap();
        assert_eq!(draw.advanced_to, None);
        assert!(draw.advance_error.is_some());

        let stored = clinic.session.service().patient_blood_work(&patient.id).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].tube_codes, vec!["BT001".to_string()]);
        let visit = clinic.session.service().get_visit(&visit.id).unwrap();
        assert_eq!(visit.status, PatientStatus::PhlebotomyPending);

        // The nurse advances by hand once the store is back
        clinic
            .session
            .advance_visit(&visit.id, PatientStatus::PhlebotomyDone)
            .unwrap();
    }

    #[test]
    fn test_skipping_a_stage_is_rejected() {
        let mut clinic = clinic("nurse.hoa");
        let patient = register(&mut clinic.session, "079088004321", "Truong Van Nam");
        let visit = clinic.session.open_visit(consultation(&patient.id)).unwrap();

        let err = clinic
            .session
            .advance_visit(&visit.id, PatientStatus::PhlebotomyPending)
            .unwrap_err();
        assert!(matches!(
            err,
            ClinicError::Record(RecordError::Transition(_))
        ));
        assert!(!err.is_external());
    }

    #[test]
    fn test_closed_visit_notes_are_frozen() {
        let mut clinic = clinic("dr.tuan");
        let patient = register(&mut clinic.session, "079088004321", "Truong Van Nam");
        let visit = clinic.session.open_visit(consultation(&patient.id)).unwrap();
        clinic
            .session
            .advance_visit(&visit.id, PatientStatus::NoShow)
            .unwrap();

        let err = clinic
            .session
            .update_visit_notes(
                &visit.id,
                SoapNotes {
                    subjective: Some("Patient called back".to_string()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, ClinicError::Record(RecordError::Rejected(_))));
    }

    #[test]
    fn test_jammed_printer_reports_external_failure() {
        let mut clinic = clinic("tech.minh");
        let patient = register(&mut clinic.session, "079088004321", "Truong Van Nam");
        let mut selection = clinic.session.new_specimen_selection();
        selection.select("BT002");

        let mut tray = PaperTray {
            jammed: true,
            ..Default::default()
        };
        let err = clinic
            .session
            .print_labels(&selection, &patient, &mut tray)
            .unwrap_err();
        assert!(err.is_external());
        assert_eq!(err.user_message(), "Could not send labels to the printer");
        assert!(selection.is_selected("BT002"));
    }

    #[test]
    fn test_registration_invalidates_patient_list() {
        let mut clinic = clinic("reception.lan");
        assert!(clinic.session.patients().unwrap().is_empty());
        assert!(clinic.session.is_cached(&ViewKey::PatientList));

        register(&mut clinic.session, "079088004321", "Truong Van Nam");
        register(&mut clinic.session, "001199012345", "Le Thi Mai");
        assert!(!clinic.session.is_cached(&ViewKey::PatientList));

        let names: Vec<&str> = clinic
            .session
            .patients()
            .unwrap()
            .iter()
            .map(|p| p.full_name.as_str())
            .collect();
        assert_eq!(names, vec!["Le Thi Mai", "Truong Van Nam"]);
    }
}
