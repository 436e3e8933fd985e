//! Mycelix Clinic Test Suite
//!
//! Scenario tests that walk a clinician session through whole workflows:
//! - Visit flow from intake through checkout
//! - Insurance card lifecycle and BHYT coverage
//! - Prescribing, refills and diagnoses

pub mod support;

pub mod insurance;
pub mod prescriptions;
pub mod visit_flow;
