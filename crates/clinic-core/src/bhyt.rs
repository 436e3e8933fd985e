//! BHYT eligibility lookup
//!
//! The national health-insurance gateway is not integrated. [`MockBhytLookup`]
//! answers with deterministic data derived from the citizen ID so intake
//! screens can be exercised end to end.

use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ClinicConfig;
use crate::records::order::Coverage;
use crate::validation::is_digits;

const MOCK_FACILITY_CODE: &str = "79-024";
const MOCK_FACILITY_NAME: &str = "Phong kham Da khoa Mycelix";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("Insurance lookup failed. Please check the details and try again.")]
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BhytLookupRequest {
    pub citizen_id: String,
    pub date_of_birth: NaiveDate,
    pub full_name: String,
    /// Date the eligibility is checked for
    pub as_of: NaiveDate,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BhytEligibility {
    pub card_number: String,
    pub is_valid: bool,
    pub benefit_level: u8,
    pub coverage_percent: u8,
    pub facility_code: String,
    pub facility_name: String,
    pub valid_from: NaiveDate,
    pub valid_to: NaiveDate,
}

impl BhytEligibility {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.is_valid && self.valid_from <= date && date <= self.valid_to
    }

    /// BHYT share of an order total, if the card is usable on `date`.
    pub fn coverage_for(&self, total_vnd: i64, date: NaiveDate) -> Option<Coverage> {
        self.covers(date)
            .then(|| Coverage::percent_of("BHYT", self.coverage_percent, total_vnd))
    }
}

/// Insurance lookup boundary
pub trait InsuranceLookup {
    fn lookup(&self, request: &BhytLookupRequest) -> Result<BhytEligibility, LookupError>;
}

/// Deterministic stand-in for the gateway
#[derive(Clone, Debug, Default)]
pub struct MockBhytLookup {
    delay: Duration,
}

impl MockBhytLookup {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Latency taken from the clinic's `lookup_delay_ms`.
    pub fn from_config(config: &ClinicConfig) -> Self {
        Self::new(config.lookup_delay())
    }

    /// No simulated latency, for tests and WASM hosts.
    pub fn instant() -> Self {
        Self::default()
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    fn wait(&self) {
        #[cfg(feature = "native")]
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
    }
}

impl InsuranceLookup for MockBhytLookup {
    fn lookup(&self, request: &BhytLookupRequest) -> Result<BhytEligibility, LookupError> {
        self.wait();
        let result = mock_eligibility(request);
        match &result {
            Ok(eligibility) => debug!(
                card_number = %eligibility.card_number,
                coverage = eligibility.coverage_percent,
                "bhyt lookup answered"
            ),
            Err(_) => warn!("bhyt lookup failed for malformed request"),
        }
        result
    }
}

/// Legacy 9-digit or national 12-digit citizen ID
pub fn is_valid_citizen_id(citizen_id: &str) -> bool {
    is_digits(citizen_id) && matches!(citizen_id.len(), 9 | 12)
}

/// Coverage for a benefit level
pub fn coverage_for_level(level: u8) -> u8 {
    match level {
        3 => 95,
        4 => 80,
        _ => 100,
    }
}

/// Pure core of the mock, no delay.
pub fn mock_eligibility(request: &BhytLookupRequest) -> Result<BhytEligibility, LookupError> {
    let citizen_id = request.citizen_id.trim();
    if request.full_name.trim().is_empty()
        || !is_valid_citizen_id(citizen_id)
        || request.date_of_birth > request.as_of
    {
        return Err(LookupError::Failed);
    }

    let digit_sum: u32 = citizen_id.chars().filter_map(|c| c.to_digit(10)).sum();
    let benefit_level = (digit_sum % 5) as u8 + 1;
    let tail = &citizen_id[citizen_id.len().saturating_sub(10)..];
    let card_number = format!("DN{}79{:0>10}", benefit_level, tail);

    let year = request.as_of.year();
    let valid_from = NaiveDate::from_ymd_opt(year, 1, 1).ok_or(LookupError::Failed)?;
    let valid_to = NaiveDate::from_ymd_opt(year, 12, 31).ok_or(LookupError::Failed)?;

    Ok(BhytEligibility {
        card_number,
        // IDs ending in 000 model a lapsed card
        is_valid: !citizen_id.ends_with("000"),
        benefit_level,
        coverage_percent: coverage_for_level(benefit_level),
        facility_code: MOCK_FACILITY_CODE.to_string(),
        facility_name: MOCK_FACILITY_NAME.to_string(),
        valid_from,
        valid_to,
    })
}
