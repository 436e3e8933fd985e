//! Insurance Card Lifecycle Tracker
//!
//! Cards carry two notions of "active":
//!
//! - the stored `is_active` flag, a snapshot taken once when the card is
//!   created and never touched afterwards;
//! - the live [`CardStatus`], recomputed from the expiry date on every read.
//!
//! The two are allowed to disagree. A card created active that has since
//! expired keeps `is_active == true` while classifying as `Expired`.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ClinicConfig;
use crate::validation::{ValidationErrorCode, ValidationFailure, ValidationResult};

const SECONDS_PER_DAY: i64 = 86_400;

/// Card details as typed at the front desk
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NewInsuranceCard {
    pub patient_id: String,
    pub provider_name: String,
    pub member_id: String,
    pub group_number: Option<String>,
    pub plan_type: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub front_photo_ref: Option<String>,
    pub back_photo_ref: Option<String>,
}

impl NewInsuranceCard {
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();
        result.require("patient_id", &self.patient_id, "Patient is required");
        result.require("provider_name", &self.provider_name, "Provider name is required");
        result.require("member_id", &self.member_id, "Member ID is required");
        if self.expiry_date.is_none() {
            result.add_error(
                "expiry_date",
                "Expiry date is required",
                ValidationErrorCode::Required,
            );
        }
        if self.provider_name.len() > 200 {
            result.add_error(
                "provider_name",
                "Provider name must be 200 characters or less",
                ValidationErrorCode::TooLong,
            );
        }
        result
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InsuranceCard {
    pub id: String,
    pub patient_id: String,
    pub provider_name: String,
    pub member_id: String,
    pub group_number: Option<String>,
    pub plan_type: Option<String>,
    pub expiry_date: NaiveDate,
    /// Snapshot of `!is_expired` at creation time. Never reconciled.
    pub is_active: bool,
    pub front_photo_ref: Option<String>,
    pub back_photo_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl InsuranceCard {
    /// Validate `input` and build the card. Fails before anything is
    /// constructed when a required field is missing.
    pub fn create(
        id: String,
        input: NewInsuranceCard,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationFailure> {
        input.validate().into_result()?;
        let expiry_date = input.expiry_date.ok_or_else(|| {
            ValidationFailure::single("expiry_date", "Expiry date is required", ValidationErrorCode::Required)
        })?;
        Ok(Self {
            id,
            patient_id: input.patient_id,
            provider_name: input.provider_name.trim().to_string(),
            member_id: input.member_id.trim().to_string(),
            group_number: input.group_number,
            plan_type: input.plan_type,
            is_active: !is_expired(expiry_date, now),
            expiry_date,
            front_photo_ref: input.front_photo_ref,
            back_photo_ref: input.back_photo_ref,
            created_at: now,
        })
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        expires_at(self.expiry_date)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        is_expired(self.expiry_date, now)
    }

    pub fn days_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        days_until_expiry(self.expiry_date, now)
    }
}

/// Expiry dates are read as midnight UTC at the start of that day.
pub fn expires_at(expiry_date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&expiry_date.and_time(NaiveTime::MIN))
}

pub fn is_expired(expiry_date: NaiveDate, now: DateTime<Utc>) -> bool {
    expires_at(expiry_date) < now
}

/// Whole days until expiry, rounded down. Negative once expired; this alone
/// does not say whether the card has expired.
pub fn days_until_expiry(expiry_date: NaiveDate, now: DateTime<Utc>) -> i64 {
    (expires_at(expiry_date) - now)
        .num_seconds()
        .div_euclid(SECONDS_PER_DAY)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    Expired,
    ExpiringSoon,
    Active,
}

impl CardStatus {
    pub fn label(self) -> &'static str {
        match self {
            CardStatus::Expired => "Expired",
            CardStatus::ExpiringSoon => "Expiring Soon",
            CardStatus::Active => "Active",
        }
    }
}

/// Live view of one card
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CardSummary {
    pub card_id: String,
    pub provider_name: String,
    pub member_id: String,
    pub expiry_date: NaiveDate,
    pub status: CardStatus,
    pub days_until_expiry: i64,
    /// The stored creation-time flag, reported as-is
    pub stored_is_active: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CardAlert {
    pub card_id: String,
    pub status: CardStatus,
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InsuranceOverview {
    pub expired: usize,
    pub expiring_soon: usize,
    pub active: usize,
    /// Soonest expiry first
    pub cards: Vec<CardSummary>,
    pub alerts: Vec<CardAlert>,
}

/// Classifies cards against a configurable "expiring soon" threshold
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CardTracker {
    expiring_soon_days: i64,
}

impl Default for CardTracker {
    fn default() -> Self {
        Self {
            expiring_soon_days: 30,
        }
    }
}

impl CardTracker {
    pub fn new(expiring_soon_days: i64) -> Self {
        Self { expiring_soon_days }
    }

    pub fn from_config(config: &ClinicConfig) -> Self {
        Self::new(config.expiring_soon_days)
    }

    pub fn classify(&self, card: &InsuranceCard, now: DateTime<Utc>) -> CardStatus {
        if card.is_expired(now) {
            CardStatus::Expired
        } else if card.days_until_expiry(now) < self.expiring_soon_days {
            CardStatus::ExpiringSoon
        } else {
            CardStatus::Active
        }
    }

    pub fn summarize(&self, card: &InsuranceCard, now: DateTime<Utc>) -> CardSummary {
        CardSummary {
            card_id: card.id.clone(),
            provider_name: card.provider_name.clone(),
            member_id: card.member_id.clone(),
            expiry_date: card.expiry_date,
            status: self.classify(card, now),
            days_until_expiry: card.days_until_expiry(now),
            stored_is_active: card.is_active,
        }
    }

    pub fn overview(&self, cards: &[InsuranceCard], now: DateTime<Utc>) -> InsuranceOverview {
        let mut summaries: Vec<CardSummary> =
            cards.iter().map(|card| self.summarize(card, now)).collect();
        summaries.sort_by_key(|s| s.expiry_date);

        let mut overview = InsuranceOverview::default();
        for summary in &summaries {
            match summary.status {
                CardStatus::Expired => overview.expired += 1,
                CardStatus::ExpiringSoon => overview.expiring_soon += 1,
                CardStatus::Active => overview.active += 1,
            }
            if let Some(message) = alert_message(summary) {
                overview.alerts.push(CardAlert {
                    card_id: summary.card_id.clone(),
                    status: summary.status,
                    message,
                });
            }
        }
        overview.cards = summaries;
        overview
    }
}

fn alert_message(summary: &CardSummary) -> Option<String> {
    match summary.status {
        CardStatus::Expired => {
            let ago = -summary.days_until_expiry;
            Some(format!(
                "{} card {} expired {} day{} ago. Please update insurance.",
                summary.provider_name,
                summary.member_id,
                ago,
                if ago == 1 { "" } else { "s" }
            ))
        }
        CardStatus::ExpiringSoon => Some(format!(
            "{} card {} expires in {} day{}.",
            summary.provider_name,
            summary.member_id,
            summary.days_until_expiry,
            if summary.days_until_expiry == 1 { "" } else { "s" }
        )),
        CardStatus::Active => None,
    }
}
