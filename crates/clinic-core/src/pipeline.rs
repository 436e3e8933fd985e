//! Patient Status Pipeline
//!
//! A visit moves through a fixed sequence of states, one step at a time.
//! `NoShow` and `Cancelled` can be reached from any non-terminal state and
//! end the visit, as does `Completed`.
//!
//! Display labels and color tags live in a separate static table so the
//! state machine stays free of presentation concerns.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatientStatus {
    Intake,
    VitalsPending,
    VitalsDone,
    PhlebotomyPending,
    PhlebotomyDone,
    LabsPending,
    LabsDone,
    ProviderReview,
    Checkout,
    Completed,
    NoShow,
    Cancelled,
}

impl Default for PatientStatus {
    fn default() -> Self {
        PatientStatus::Intake
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("Visit is already {from} and cannot change status")]
    Terminal { from: PatientStatus },
    #[error("Cannot move visit from {from} to {to}")]
    NotAllowed {
        from: PatientStatus,
        to: PatientStatus,
    },
}

impl PatientStatus {
    /// The main progression, excluding the two overrides.
    pub const SEQUENCE: [PatientStatus; 10] = [
        PatientStatus::Intake,
        PatientStatus::VitalsPending,
        PatientStatus::VitalsDone,
        PatientStatus::PhlebotomyPending,
        PatientStatus::PhlebotomyDone,
        PatientStatus::LabsPending,
        PatientStatus::LabsDone,
        PatientStatus::ProviderReview,
        PatientStatus::Checkout,
        PatientStatus::Completed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PatientStatus::Intake => "intake",
            PatientStatus::VitalsPending => "vitals_pending",
            PatientStatus::VitalsDone => "vitals_done",
            PatientStatus::PhlebotomyPending => "phlebotomy_pending",
            PatientStatus::PhlebotomyDone => "phlebotomy_done",
            PatientStatus::LabsPending => "labs_pending",
            PatientStatus::LabsDone => "labs_done",
            PatientStatus::ProviderReview => "provider_review",
            PatientStatus::Checkout => "checkout",
            PatientStatus::Completed => "completed",
            PatientStatus::NoShow => "no_show",
            PatientStatus::Cancelled => "cancelled",
        }
    }

    fn position(self) -> Option<usize> {
        Self::SEQUENCE.iter().position(|s| *s == self)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PatientStatus::Completed | PatientStatus::NoShow | PatientStatus::Cancelled
        )
    }

    /// The single forward step, if any.
    pub fn next(self) -> Option<PatientStatus> {
        if self.is_terminal() {
            return None;
        }
        self.position()
            .and_then(|pos| Self::SEQUENCE.get(pos + 1))
            .copied()
    }

    pub fn can_transition_to(self, to: PatientStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match to {
            PatientStatus::NoShow | PatientStatus::Cancelled => true,
            _ => self.next() == Some(to),
        }
    }

    pub fn transition(self, to: PatientStatus) -> Result<PatientStatus, TransitionError> {
        if self.is_terminal() {
            return Err(TransitionError::Terminal { from: self });
        }
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(TransitionError::NotAllowed { from: self, to })
        }
    }

    /// Fraction of the main progression reached, for progress bars.
    /// Overrides report no progress.
    pub fn progress(self) -> f64 {
        match self.position() {
            Some(pos) => pos as f64 / (Self::SEQUENCE.len() - 1) as f64,
            None => 0.0,
        }
    }

    pub fn display(self) -> &'static StatusDisplay {
        status_display(self)
    }
}

impl std::fmt::Display for PatientStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label and color tag shown for a status
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusDisplay {
    pub status: PatientStatus,
    pub label: &'static str,
    pub color: &'static str,
}

pub fn status_display(status: PatientStatus) -> &'static StatusDisplay {
    use PatientStatus::*;
    match status {
        Intake => &StatusDisplay { status: Intake, label: "Intake", color: "gray" },
        VitalsPending => &StatusDisplay { status: VitalsPending, label: "Vitals Pending", color: "yellow" },
        VitalsDone => &StatusDisplay { status: VitalsDone, label: "Vitals Done", color: "blue" },
        PhlebotomyPending => &StatusDisplay { status: PhlebotomyPending, label: "Phlebotomy Pending", color: "yellow" },
        PhlebotomyDone => &StatusDisplay { status: PhlebotomyDone, label: "Phlebotomy Done", color: "blue" },
        LabsPending => &StatusDisplay { status: LabsPending, label: "Labs Pending", color: "orange" },
        LabsDone => &StatusDisplay { status: LabsDone, label: "Labs Done", color: "blue" },
        ProviderReview => &StatusDisplay { status: ProviderReview, label: "Provider Review", color: "purple" },
        Checkout => &StatusDisplay { status: Checkout, label: "Checkout", color: "teal" },
        Completed => &StatusDisplay { status: Completed, label: "Completed", color: "green" },
        NoShow => &StatusDisplay { status: NoShow, label: "No Show", color: "red" },
        Cancelled => &StatusDisplay { status: Cancelled, label: "Cancelled", color: "red" },
    }
}
