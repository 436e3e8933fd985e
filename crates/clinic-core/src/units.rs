//! Unit system preference and conversions
//!
//! Measurements are always stored metric. The session's unit preference
//! only affects how values are typed in and shown.

use serde::{Deserialize, Serialize};

use crate::vitals::VitalField;

const CM_PER_INCH: f64 = 2.54;
const LB_PER_KG: f64 = 2.204_622_621_8;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
}

pub fn cm_to_inches(cm: f64) -> f64 {
    cm / CM_PER_INCH
}

pub fn inches_to_cm(inches: f64) -> f64 {
    inches * CM_PER_INCH
}

pub fn kg_to_pounds(kg: f64) -> f64 {
    kg * LB_PER_KG
}

pub fn pounds_to_kg(pounds: f64) -> f64 {
    pounds / LB_PER_KG
}

pub fn celsius_to_fahrenheit(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

pub fn fahrenheit_to_celsius(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

impl UnitSystem {
    /// Convert a value typed in this unit system into the metric value the
    /// checklist stores. Fields without an imperial unit pass through.
    pub fn to_metric(self, field: VitalField, value: f64) -> f64 {
        match (self, field) {
            (UnitSystem::Imperial, VitalField::Height) => inches_to_cm(value),
            (UnitSystem::Imperial, VitalField::Weight) => pounds_to_kg(value),
            (UnitSystem::Imperial, VitalField::Temperature) => fahrenheit_to_celsius(value),
            _ => value,
        }
    }

    pub fn from_metric(self, field: VitalField, value: f64) -> f64 {
        match (self, field) {
            (UnitSystem::Imperial, VitalField::Height) => cm_to_inches(value),
            (UnitSystem::Imperial, VitalField::Weight) => kg_to_pounds(value),
            (UnitSystem::Imperial, VitalField::Temperature) => celsius_to_fahrenheit(value),
            _ => value,
        }
    }

    pub fn unit_label(self, field: VitalField) -> &'static str {
        match (self, field) {
            (UnitSystem::Metric, VitalField::Height) => "cm",
            (UnitSystem::Imperial, VitalField::Height) => "in",
            (UnitSystem::Metric, VitalField::Weight) => "kg",
            (UnitSystem::Imperial, VitalField::Weight) => "lb",
            (UnitSystem::Metric, VitalField::Temperature) => "°C",
            (UnitSystem::Imperial, VitalField::Temperature) => "°F",
            (_, VitalField::SystolicBp) | (_, VitalField::DiastolicBp) => "mmHg",
            (_, VitalField::HeartRate) => "bpm",
            (_, VitalField::RespiratoryRate) => "/min",
            (_, VitalField::Spo2) => "%",
        }
    }

    /// Display string for a stored metric value, one decimal place.
    pub fn format(self, field: VitalField, metric_value: f64) -> String {
        format!(
            "{:.1} {}",
            self.from_metric(field, metric_value),
            self.unit_label(field)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_imperial_round_trip_height() {
        let cm = UnitSystem::Imperial.to_metric(VitalField::Height, 65.0);
        assert!((cm - 165.1).abs() < 1e-9);
        let inches = UnitSystem::Imperial.from_metric(VitalField::Height, cm);
        assert!((inches - 65.0).abs() < 1e-9);
    }

    #[test]
    fn test_temperature_conversion() {
        assert!((celsius_to_fahrenheit(37.0) - 98.6).abs() < 1e-9);
        assert!((fahrenheit_to_celsius(212.0) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_metric_passes_through() {
        assert_eq!(UnitSystem::Metric.to_metric(VitalField::Weight, 60.0), 60.0);
        assert_eq!(UnitSystem::Imperial.to_metric(VitalField::HeartRate, 72.0), 72.0);
    }

    #[test]
    fn test_format() {
        assert_eq!(UnitSystem::Metric.format(VitalField::Weight, 60.0), "60.0 kg");
        assert_eq!(UnitSystem::Imperial.format(VitalField::Temperature, 37.0), "98.6 °F");
        assert_eq!(UnitSystem::Imperial.format(VitalField::Spo2, 98.0), "98.0 %");
    }
}
