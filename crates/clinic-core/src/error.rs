//! Umbrella error for session-level operations
//!
//! Every variant is recoverable: the user fixes the input or retries.

use crate::bhyt::LookupError;
use crate::config::ConfigError;
use crate::pipeline::TransitionError;
use crate::records::RecordError;
use crate::reference::ReferenceError;
use crate::specimen::PrintError;
use crate::validation::ValidationFailure;
use crate::vitals::VitalsError;

#[derive(Debug, thiserror::Error)]
pub enum ClinicError {
    #[error(transparent)]
    Validation(#[from] ValidationFailure),
    #[error(transparent)]
    Vitals(#[from] VitalsError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("record service call failed: {0}")]
    Record(#[from] RecordError),
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error("label printing failed: {0}")]
    Print(#[from] PrintError),
    #[error(transparent)]
    Reference(#[from] ReferenceError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ClinicError {
    /// Message shown to staff. Local input problems are explained; failures
    /// of external collaborators get a generic retry hint.
    pub fn user_message(&self) -> String {
        match self {
            ClinicError::Validation(failure) => failure
                .first_message()
                .unwrap_or("Please check the highlighted fields")
                .to_string(),
            ClinicError::Vitals(err) => err.to_string(),
            ClinicError::Transition(err) => err.to_string(),
            ClinicError::Record(RecordError::Validation(failure)) => failure
                .first_message()
                .unwrap_or("Please check the highlighted fields")
                .to_string(),
            ClinicError::Record(RecordError::NotFound { entity, .. }) => {
                format!("The {} could not be found", entity)
            }
            ClinicError::Record(RecordError::Rejected(reason)) => reason.clone(),
            ClinicError::Record(RecordError::Transition(err)) => err.to_string(),
            ClinicError::Record(RecordError::Unavailable(_)) => {
                "Could not save the record. Please try again.".to_string()
            }
            ClinicError::Lookup(err) => err.to_string(),
            ClinicError::Print(_) => "Could not send labels to the printer".to_string(),
            ClinicError::Reference(_) | ClinicError::Config(_) => {
                "Clinic reference data is unavailable".to_string()
            }
        }
    }

    /// True when the failure came from outside the session (storage,
    /// lookup or print surface) rather than from the user's input.
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            ClinicError::Record(RecordError::Unavailable(_))
                | ClinicError::Lookup(_)
                | ClinicError::Print(_)
        )
    }
}
