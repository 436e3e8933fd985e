//! Static reference tables
//!
//! Lab tube draw order, the vitals checklist with its normal ranges, and the
//! medication dosing guide. Tables are parsed once at startup, checked for
//! consistency, and then shared read-only (usually behind an `Arc`).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::records::prescription::Route;
use crate::vitals::VitalField;

const LAB_TUBES_JSON: &str = include_str!("../data/lab_tubes.json");
const VITALS_CHECKLIST_JSON: &str = include_str!("../data/vitals_checklist.json");
const MEDICATIONS_JSON: &str = include_str!("../data/medications.json");

#[derive(Debug, thiserror::Error)]
pub enum ReferenceError {
    #[error("could not parse {table} table: {source}")]
    Parse {
        table: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("inconsistent {table} table: {message}")]
    Inconsistent { table: &'static str, message: String },
}

/// A blood collection tube and the test it is drawn for
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabTube {
    pub code: String,
    pub test_name: String,
    pub tube_color: String,
    pub volume_ml: f64,
    pub additive: String,
    /// Position in the mandated fill sequence, 1 first
    pub draw_order: u32,
    pub special_instructions: Option<String>,
}

/// One row of the vitals checklist
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub field: VitalField,
    pub label: String,
    pub unit: String,
    /// Lower bound of the normal band
    pub min: f64,
    /// Upper bound of the normal band
    pub max: f64,
}

impl ChecklistItem {
    pub fn in_range(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Dosing guide entry used to pre-fill prescriptions
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MedicationGuide {
    pub name: String,
    pub strength: String,
    pub adult_dose: String,
    pub frequency: String,
    pub route: Route,
    pub max_daily_dose: String,
    pub controlled: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceData {
    lab_tubes: Vec<LabTube>,
    vitals_checklist: Vec<ChecklistItem>,
    medications: Vec<MedicationGuide>,
}

impl ReferenceData {
    /// The tables bundled with the crate.
    pub fn builtin() -> Result<Self, ReferenceError> {
        Self::from_json(LAB_TUBES_JSON, VITALS_CHECKLIST_JSON, MEDICATIONS_JSON)
    }

    pub fn from_json(
        lab_tubes: &str,
        vitals_checklist: &str,
        medications: &str,
    ) -> Result<Self, ReferenceError> {
        let data = Self {
            lab_tubes: parse("lab tube", lab_tubes)?,
            vitals_checklist: parse("vitals checklist", vitals_checklist)?,
            medications: parse("medication", medications)?,
        };
        data.check()?;
        Ok(data)
    }

    fn check(&self) -> Result<(), ReferenceError> {
        let mut codes = HashSet::new();
        let mut orders = HashSet::new();
        for tube in &self.lab_tubes {
            if !codes.insert(tube.code.as_str()) {
                return Err(inconsistent("lab tube", format!("duplicate code {}", tube.code)));
            }
            if !orders.insert(tube.draw_order) {
                return Err(inconsistent(
                    "lab tube",
                    format!("draw order {} used twice", tube.draw_order),
                ));
            }
        }

        for field in VitalField::ALL {
            let rows = self
                .vitals_checklist
                .iter()
                .filter(|item| item.field == field)
                .count();
            if rows != 1 {
                return Err(inconsistent(
                    "vitals checklist",
                    format!("expected one row for {}, found {}", field, rows),
                ));
            }
        }
        if let Some(item) = self.vitals_checklist.iter().find(|item| item.min >= item.max) {
            return Err(inconsistent(
                "vitals checklist",
                format!("{} has min >= max", item.field),
            ));
        }

        let mut names = HashSet::new();
        for guide in &self.medications {
            if !names.insert(guide.name.to_lowercase()) {
                return Err(inconsistent("medication", format!("duplicate {}", guide.name)));
            }
        }
        Ok(())
    }

    pub fn lab_tubes(&self) -> &[LabTube] {
        &self.lab_tubes
    }

    pub fn lab_tube(&self, code: &str) -> Option<&LabTube> {
        self.lab_tubes.iter().find(|tube| tube.code == code)
    }

    /// Checklist rows in declared order.
    pub fn vitals_checklist(&self) -> &[ChecklistItem] {
        &self.vitals_checklist
    }

    pub fn checklist_item(&self, field: VitalField) -> Option<&ChecklistItem> {
        self.vitals_checklist.iter().find(|item| item.field == field)
    }

    pub fn medications(&self) -> &[MedicationGuide] {
        &self.medications
    }

    /// Case-insensitive exact lookup.
    pub fn medication(&self, name: &str) -> Option<&MedicationGuide> {
        self.medications
            .iter()
            .find(|guide| guide.name.eq_ignore_ascii_case(name.trim()))
    }

    /// Case-insensitive prefix search for the prescription form.
    pub fn search_medications(&self, prefix: &str) -> Vec<&MedicationGuide> {
        let prefix = prefix.trim().to_lowercase();
        if prefix.is_empty() {
            return Vec::new();
        }
        self.medications
            .iter()
            .filter(|guide| guide.name.to_lowercase().starts_with(&prefix))
            .collect()
    }
}

fn parse<T: for<'de> Deserialize<'de>>(table: &'static str, json: &str) -> Result<T, ReferenceError> {
    serde_json::from_str(json).map_err(|source| ReferenceError::Parse { table, source })
}

fn inconsistent(table: &'static str, message: String) -> ReferenceError {
    ReferenceError::Inconsistent { table, message }
}
