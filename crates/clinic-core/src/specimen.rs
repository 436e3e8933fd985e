//! Specimen Collection Selector
//!
//! Staff toggle which tubes to draw. The selection is just a set of codes;
//! ordering is imposed only when a manifest is generated, by sorting the
//! selected reference tubes on their fixed draw order.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::records::visit::BloodWorkEntry;
use crate::reference::LabTube;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrintError {
    #[error("printer unavailable: {0}")]
    Unavailable(String),
    #[error("printer rejected the document: {0}")]
    Rejected(String),
}

/// External print/export surface. Nothing is read back from it.
pub trait LabelPrinter {
    fn print(&mut self, document: &LabelDocument) -> Result<(), PrintError>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpecimenSelection {
    selected: BTreeSet<String>,
}

impl SpecimenSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip membership of `code`. Returns whether it is now selected.
    pub fn toggle(&mut self, code: &str) -> bool {
        let now_selected = if self.selected.remove(code) {
            false
        } else {
            self.selected.insert(code.to_string());
            true
        };
        debug!(code, selected = now_selected, "tube toggled");
        now_selected
    }

    pub fn select(&mut self, code: &str) {
        self.selected.insert(code.to_string());
    }

    pub fn deselect(&mut self, code: &str) {
        self.selected.remove(code);
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    pub fn is_selected(&self, code: &str) -> bool {
        self.selected.contains(code)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Selected reference tubes sorted by draw order. `None` when nothing
    /// from `tubes` is selected. Codes absent from `tubes` are ignored.
    pub fn manifest(&self, tubes: &[LabTube]) -> Option<CollectionManifest> {
        let mut chosen: Vec<&LabTube> = tubes
            .iter()
            .filter(|tube| self.selected.contains(&tube.code))
            .collect();
        if chosen.is_empty() {
            return None;
        }
        chosen.sort_by_key(|tube| tube.draw_order);

        let blocks = chosen
            .into_iter()
            .enumerate()
            .map(|(i, tube)| LabelBlock {
                sequence: i + 1,
                code: tube.code.clone(),
                test_name: tube.test_name.clone(),
                tube_color: tube.tube_color.clone(),
                volume_ml: tube.volume_ml,
                additive: tube.additive.clone(),
                special_instructions: tube.special_instructions.clone(),
            })
            .collect();
        Some(CollectionManifest { blocks })
    }

    /// Build the manifest and send it to `printer`. With nothing selected
    /// the printer is never invoked and `Ok(None)` is returned.
    pub fn print_labels<P: LabelPrinter + ?Sized>(
        &self,
        tubes: &[LabTube],
        header: LabelHeader,
        printer: &mut P,
    ) -> Result<Option<CollectionManifest>, PrintError> {
        let Some(manifest) = self.manifest(tubes) else {
            debug!("no tubes selected, skipping print");
            return Ok(None);
        };
        let document = manifest.document(header);
        printer.print(&document)?;
        info!(
            patient_id = %document.header.patient_id,
            tubes = manifest.blocks.len(),
            "labels printed"
        );
        Ok(Some(manifest))
    }
}

/// One printed label
#[derive(Clone, Debug, PartialEq)]
pub struct LabelBlock {
    /// 1-based draw sequence
    pub sequence: usize,
    pub code: String,
    pub test_name: String,
    pub tube_color: String,
    pub volume_ml: f64,
    pub additive: String,
    pub special_instructions: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CollectionManifest {
    pub blocks: Vec<LabelBlock>,
}

impl CollectionManifest {
    pub fn codes(&self) -> Vec<&str> {
        self.blocks.iter().map(|b| b.code.as_str()).collect()
    }

    pub fn document(&self, header: LabelHeader) -> LabelDocument {
        LabelDocument {
            header,
            blocks: self.blocks.clone(),
        }
    }

    /// Record of the draw once the tubes have been collected.
    pub fn to_blood_work(
        &self,
        patient_id: &str,
        visit_id: Option<String>,
        collected_by: &str,
        collected_at: DateTime<Utc>,
        notes: Option<String>,
    ) -> BloodWorkEntry {
        BloodWorkEntry {
            patient_id: patient_id.to_string(),
            visit_id,
            tube_codes: self.blocks.iter().map(|b| b.code.clone()).collect(),
            collected_by: collected_by.to_string(),
            collected_at,
            notes,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LabelHeader {
    pub clinic_name: String,
    pub patient_id: String,
    pub patient_name: String,
    pub printed_at: DateTime<Utc>,
}

/// Plain-text label sheet handed to the printer
#[derive(Clone, Debug, PartialEq)]
pub struct LabelDocument {
    pub header: LabelHeader,
    pub blocks: Vec<LabelBlock>,
}

impl LabelDocument {
    pub fn render(&self) -> String {
        let mut out = format!(
            "{}\n{} ({})\n{}\n",
            self.header.clinic_name,
            self.header.patient_name,
            self.header.patient_id,
            self.header.printed_at.format("%Y-%m-%d %H:%M"),
        );
        for block in &self.blocks {
            out.push_str(&format!(
                "\n#{} {} [{}]\n  Tube: {} {:.1} mL ({})\n",
                block.sequence,
                block.test_name,
                block.code,
                block.tube_color,
                block.volume_ml,
                block.additive,
            ));
            if let Some(note) = &block.special_instructions {
                out.push_str(&format!("  Note: {}\n", note));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::ReferenceData;

    #[derive(Default)]
    struct RecordingPrinter {
        printed: Vec<String>,
    }

    impl LabelPrinter for RecordingPrinter {
        fn print(&mut self, document: &LabelDocument) -> Result<(), PrintError> {
            self.printed.push(document.render());
            Ok(())
        }
    }

    fn header() -> LabelHeader {
        LabelHeader {
            clinic_name: "Mycelix Clinic".to_string(),
            patient_id: "PAT-1".to_string(),
            patient_name: "Nguyen Van A".to_string(),
            printed_at: Utc::now(),
        }
    }

    #[test]
    fn test_manifest_sorted_by_draw_order() {
        let reference = ReferenceData::builtin().unwrap();
        let mut selection = SpecimenSelection::new();
        for code in ["BT004", "BT001", "BT003"] {
            selection.toggle(code);
        }
        let manifest = selection.manifest(reference.lab_tubes()).unwrap();
        assert_eq!(manifest.codes(), vec!["BT001", "BT003", "BT004"]);
        let sequence: Vec<usize> = manifest.blocks.iter().map(|b| b.sequence).collect();
        assert_eq!(sequence, vec![1, 2, 3]);
    }

    #[test]
    fn test_toggle_flips_membership() {
        let mut selection = SpecimenSelection::new();
        assert!(selection.toggle("BT002"));
        assert!(selection.is_selected("BT002"));
        assert!(!selection.toggle("BT002"));
        assert!(selection.is_empty());
    }

    #[test]
    fn test_selection_does_not_touch_reference() {
        let reference = ReferenceData::builtin().unwrap();
        let before = reference.lab_tubes().to_vec();
        let mut selection = SpecimenSelection::new();
        selection.select("BT007");
        selection.select("BT001");
        let _ = selection.manifest(reference.lab_tubes());
        assert_eq!(reference.lab_tubes(), before.as_slice());
    }

    #[test]
    fn test_empty_selection_never_prints() {
        let reference = ReferenceData::builtin().unwrap();
        let mut printer = RecordingPrinter::default();
        let result = SpecimenSelection::new()
            .print_labels(reference.lab_tubes(), header(), &mut printer)
            .unwrap();
        assert!(result.is_none());
        assert!(printer.printed.is_empty());
    }

    #[test]
    fn test_unknown_codes_ignored() {
        let reference = ReferenceData::builtin().unwrap();
        let mut selection = SpecimenSelection::new();
        selection.select("NOPE");
        assert!(selection.manifest(reference.lab_tubes()).is_none());
    }

    #[test]
    fn test_print_renders_each_block() {
        let reference = ReferenceData::builtin().unwrap();
        let mut selection = SpecimenSelection::new();
        selection.select("BT002");
        selection.select("BT001");
        let mut printer = RecordingPrinter::default();
        selection
            .print_labels(reference.lab_tubes(), header(), &mut printer)
            .unwrap();
        assert_eq!(printer.printed.len(), 1);
        let text = &printer.printed[0];
        assert!(text.contains("#1 "));
        assert!(text.contains("#2 "));
        assert!(text.find("[BT001]").unwrap() < text.find("[BT002]").unwrap());
    }

    #[test]
    fn test_blood_work_keeps_draw_order() {
        let reference = ReferenceData::builtin().unwrap();
        let mut selection = SpecimenSelection::new();
        selection.select("BT006");
        selection.select("BT005");
        let manifest = selection.manifest(reference.lab_tubes()).unwrap();
        let entry = manifest.to_blood_work("PAT-1", None, "tech.minh", Utc::now(), None);
        // BT005 draws 3rd, BT006 5th
        assert_eq!(entry.tube_codes, vec!["BT005", "BT006"]);
    }
}
