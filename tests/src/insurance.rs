//! Insurance Tests
//!
//! Card lifecycle classification against a moving clock, and national
//! BHYT eligibility feeding order coverage.

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use chrono::{Duration, NaiveDate};
    use mycelix_clinic_core::records::RecordError;
    use mycelix_clinic_core::{CardStatus, ClinicError, Clock, NewInsuranceCard, ViewKey};

    use crate::support::{clinic, register, Clinic};

    fn add_card(clinic: &mut Clinic, patient_id: &str, member_id: &str, expiry: NaiveDate) {
        clinic
            .session
            .add_insurance_card(NewInsuranceCard {
                patient_id: patient_id.to_string(),
                provider_name: "Bao Viet".to_string(),
                member_id: member_id.to_string(),
                expiry_date: Some(expiry),
                ..Default::default()
            })
            .unwrap();
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn test_overview_counts_and_orders_cards() {
        let mut clinic = clinic("reception.lan");
        let patient = register(&mut clinic.session, "079088004321", "Truong Van Nam");
        add_card(&mut clinic, &patient.id, "BV-A", date(2026, 12, 31));
        add_card(&mut clinic, &patient.id, "BV-B", date(2026, 3, 20));
        add_card(&mut clinic, &patient.id, "BV-C", date(2026, 2, 1));

        let overview = clinic.session.insurance_overview(&patient.id).unwrap();
        assert_eq!(
            (overview.expired, overview.expiring_soon, overview.active),
            (1, 1, 1)
        );
        let members: Vec<&str> = overview.cards.iter().map(|c| c.member_id.as_str()).collect();
        assert_eq!(members, vec!["BV-C", "BV-B", "BV-A"]);

        assert_eq!(overview.alerts.len(), 2);
        assert_eq!(overview.alerts[0].status, CardStatus::Expired);
        assert!(overview.alerts[0].message.contains("expired"));
        // 17 days and 16 hours left rounds down
        assert_eq!(overview.alerts[1].message, "Bao Viet card BV-B expires in 17 days.");
    }

    #[test]
    fn test_stored_flag_is_a_creation_snapshot() {
        let mut clinic = clinic("reception.lan");
        let patient = register(&mut clinic.session, "079088004321", "Truong Van Nam");
        add_card(&mut clinic, &patient.id, "BV-B", date(2026, 3, 20));
        add_card(&mut clinic, &patient.id, "BV-C", date(2026, 2, 1));

        let cards = clinic.session.insurance_cards(&patient.id).unwrap();
        let expired = cards.iter().find(|c| c.member_id == "BV-C").unwrap();
        assert!(!expired.stored_is_active);

        clinic.clock.advance(Duration::days(20));
        let cards = clinic.session.insurance_cards(&patient.id).unwrap();
        let lapsed = cards.iter().find(|c| c.member_id == "BV-B").unwrap();
        assert_eq!(lapsed.status, CardStatus::Expired);
        assert!(lapsed.stored_is_active);
    }

    #[test]
    fn test_expiry_boundary_is_midnight_utc() {
        let mut clinic = clinic("reception.lan");
        let patient = register(&mut clinic.session, "079088004321", "Truong Van Nam");
        add_card(&mut clinic, &patient.id, "BV-D", date(2026, 3, 3));

        // 16 hours before midnight on the expiry date
        let cards = clinic.session.insurance_cards(&patient.id).unwrap();
        assert_eq!(cards[0].status, CardStatus::ExpiringSoon);
        assert_eq!(cards[0].days_until_expiry, 0);

        clinic.clock.advance(Duration::hours(16));
        let cards = clinic.session.insurance_cards(&patient.id).unwrap();
        assert_eq!(cards[0].status, CardStatus::ExpiringSoon);

        clinic.clock.advance(Duration::seconds(1));
        let cards = clinic.session.insurance_cards(&patient.id).unwrap();
        assert_eq!(cards[0].status, CardStatus::Expired);
    }

    #[test]
    fn test_new_card_invalidates_cached_cards() {
        let mut clinic = clinic("reception.lan");
        let patient = register(&mut clinic.session, "079088004321", "Truong Van Nam");
        assert!(clinic.session.insurance_cards(&patient.id).unwrap().is_empty());
        let key = ViewKey::PatientCards(patient.id.clone());
        assert!(clinic.session.is_cached(&key));

        add_card(&mut clinic, &patient.id, "BV-A", date(2026, 12, 31));
        assert!(!clinic.session.is_cached(&key));
        assert_eq!(clinic.session.insurance_cards(&patient.id).unwrap().len(), 1);
    }

    #[test]
    fn test_card_without_expiry_is_rejected() {
        let mut clinic = clinic("reception.lan");
        let patient = register(&mut clinic.session, "079088004321", "Truong Van Nam");
        let err = clinic
            .session
            .add_insurance_card(NewInsuranceCard {
                patient_id: patient.id.clone(),
                provider_name: "Bao Viet".to_string(),
                member_id: "BV-A".to_string(),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.user_message(), "Expiry date is required");
        assert_eq!(clinic.session.service().writes(), 1);
    }

    #[test]
    fn test_inactive_patient_cannot_gain_cards() {
        let mut clinic = clinic("reception.lan");
        let patient = register(&mut clinic.session, "079088004321", "Truong Van Nam");
        clinic.session.deactivate_patient(&patient.id).unwrap();

        let err = clinic
            .session
            .add_insurance_card(NewInsuranceCard {
                patient_id: patient.id.clone(),
                provider_name: "Bao Viet".to_string(),
                member_id: "BV-A".to_string(),
                expiry_date: Some(date(2026, 12, 31)),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, ClinicError::Record(RecordError::Rejected(_))));
    }

    #[test]
    fn test_session_lookup_carries_configured_delay() {
        let clinic = clinic("reception.lan");
        assert_eq!(clinic.session.config().lookup_delay_ms, 10);
        assert_eq!(clinic.session.bhyt_lookup().delay(), StdDuration::from_millis(10));
    }

    #[test]
    fn test_lapsed_bhyt_card_gives_no_coverage() {
        let mut clinic = clinic("reception.lan");
        let patient = register(&mut clinic.session, "079088004000", "Pham Thi Thu");
        let lookup = clinic.session.bhyt_lookup();
        let eligibility = clinic.session.lookup_bhyt(&lookup, &patient).unwrap();
        assert!(!eligibility.is_valid);
        assert_eq!(
            eligibility.coverage_for(200_000, clinic.clock.today()),
            None
        );
    }

    #[test]
    fn test_bhyt_coverage_outside_validity_window() {
        let mut clinic = clinic("reception.lan");
        let patient = register(&mut clinic.session, "079088004321", "Truong Van Nam");
        let lookup = clinic.session.bhyt_lookup();
        let eligibility = clinic.session.lookup_bhyt(&lookup, &patient).unwrap();
        assert!(eligibility.covers(date(2026, 12, 31)));
        assert!(!eligibility.covers(date(2027, 1, 1)));
        assert_eq!(eligibility.coverage_for(100_000, date(2027, 1, 1)), None);
    }
}
