//! Mycelix Clinic Core
//!
//! Pure Rust workflow logic for clinic operations. Everything here runs in a
//! single clinician session and never touches storage directly: completed
//! entities are handed to a [`RecordService`] implementation (the in-memory
//! service in [`records::memory`], or the coordinator zomes).
//!
//! # Components
//!
//! - [`reference`]: read-only lab tube, vitals checklist and medication tables
//! - [`vitals`]: vitals capture state machine with BMI derivation
//! - [`specimen`]: lab tube selection and draw-ordered label manifests
//! - [`insurance`]: insurance card lifecycle classification
//! - [`bhyt`]: national health-insurance eligibility lookup (mocked)
//! - [`pipeline`]: patient status pipeline for a clinical visit
//! - [`records`]: record-service contract, entities and validation
//! - [`session`]: per-clinician application context
//!
//! # Example
//!
//! ```rust
//! use mycelix_clinic_core::{ReferenceData, VitalField, VitalsCapture};
//!
//! let reference = ReferenceData::builtin().unwrap();
//! let mut capture = VitalsCapture::new(reference.vitals_checklist());
//!
//! capture.enter(VitalField::Height, "165");
//! let update = capture.enter(VitalField::Weight, "60").unwrap();
//!
//! assert_eq!(update.bmi, Some(22.0));
//! assert_eq!(update.next_focus, Some(VitalField::Temperature));
//! ```

pub mod bhyt;
pub mod clock;
pub mod config;
pub mod error;
pub mod insurance;
pub mod pipeline;
pub mod records;
pub mod reference;
pub mod session;
pub mod specimen;
pub mod units;
pub mod validation;
pub mod vitals;

pub use bhyt::{BhytEligibility, BhytLookupRequest, InsuranceLookup, LookupError, MockBhytLookup};
pub use clock::{Clock, ManualClock};
#[cfg(feature = "native")]
pub use clock::SystemClock;
pub use config::{ClinicConfig, ConfigError};
pub use error::ClinicError;
pub use insurance::{
    CardAlert, CardStatus, CardSummary, CardTracker, InsuranceCard, InsuranceOverview,
    NewInsuranceCard,
};
pub use pipeline::{PatientStatus, StatusDisplay, TransitionError};
pub use records::{
    Committed, MemoryRecordService, RecordError, RecordService, ViewKey,
};
pub use reference::{ChecklistItem, LabTube, MedicationGuide, ReferenceData, ReferenceError};
pub use session::{ClinicSession, Recorded, SessionSummary};
pub use specimen::{
    CollectionManifest, LabelBlock, LabelDocument, LabelHeader, LabelPrinter, PrintError,
    SpecimenSelection,
};
pub use units::UnitSystem;
pub use validation::{ValidationError, ValidationErrorCode, ValidationFailure, ValidationResult};
pub use vitals::{
    compute_bmi, FieldUpdate, RangeDirection, RangeFlag, VitalField, VitalMeasurements, VitalSignsEntry,
    VitalsCapture, VitalsError, VitalsSubmission,
};
