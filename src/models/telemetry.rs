use std::collections::BTreeMap;
use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The failure classes a sensor or capture component is allowed to surface.
/// Lower-level errors never cross a component boundary unconverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FaultKind {
    /// Driver, library, or bus was unavailable when the component
    /// initialized. Permanent for that component's lifetime.
    HardwareAbsent,
    /// A hardware transaction failed at read time. Retried on the next
    /// scheduled tick, never immediately.
    HardwareError,
    /// An operation exceeded its bound. Abandon it and move to the next
    /// fallback.
    Timeout,
    /// An image encoder was unavailable or rejected its input.
    EncodeFailure,
    /// Every capture strategy was exhausted. Terminal for that call only.
    NotFound,
}

impl Display for FaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FaultKind::HardwareAbsent => "hardware-absent",
            FaultKind::HardwareError => "hardware-error",
            FaultKind::Timeout => "timeout",
            FaultKind::EncodeFailure => "encode-failure",
            FaultKind::NotFound => "not-found",
        };
        write!(f, "{}", name)
    }
}

/// Structured failure value used uniformly by sensor reads and snapshot
/// capture. Carries the fault class and a human-readable detail string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {detail}")]
pub struct FaultDescriptor {
    pub kind: FaultKind,
    pub detail: String,
}

impl FaultDescriptor {
    pub fn new(kind: FaultKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn hardware_absent(detail: impl Into<String>) -> Self {
        Self::new(FaultKind::HardwareAbsent, detail)
    }

    pub fn hardware_error(detail: impl Into<String>) -> Self {
        Self::new(FaultKind::HardwareError, detail)
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(FaultKind::Timeout, detail)
    }

    pub fn encode_failure(detail: impl Into<String>) -> Self {
        Self::new(FaultKind::EncodeFailure, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(FaultKind::NotFound, detail)
    }
}

/// One named field of a sensor reading. Readings carry either scalars
/// (pressure, temperature) or small fixed vectors (three-axis accel/gyro).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Scalar(f64),
    Vector(Vec<f64>),
}

/// A successful sample from one sensor: a mapping of named numeric fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reading {
    fields: BTreeMap<String, FieldValue>,
}

impl Reading {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scalar(mut self, name: &str, value: f64) -> Self {
        self.fields
            .insert(name.to_string(), FieldValue::Scalar(value));
        self
    }

    pub fn with_vector(mut self, name: &str, value: Vec<f64>) -> Self {
        self.fields
            .insert(name.to_string(), FieldValue::Vector(value));
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// The outcome of sampling one sensor: a reading or a structured fault.
/// Serialized untagged so a reading appears as its field map and a fault
/// appears as `{"kind": ..., "detail": ...}`, matching the push format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SensorSample {
    Reading(Reading),
    Fault(FaultDescriptor),
}

impl SensorSample {
    pub fn is_fault(&self) -> bool {
        matches!(self, SensorSample::Fault(_))
    }
}

impl From<Reading> for SensorSample {
    fn from(value: Reading) -> Self {
        SensorSample::Reading(value)
    }
}

impl From<FaultDescriptor> for SensorSample {
    fn from(value: FaultDescriptor) -> Self {
        SensorSample::Fault(value)
    }
}

/// One complete set of sensor outcomes for a single broadcast tick.
/// Contains exactly one entry per registered sensor; a sensor that failed
/// is present as a fault entry, never a missing key.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TelemetryRecord {
    sensors: BTreeMap<String, SensorSample>,
}

impl TelemetryRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: &str, sample: SensorSample) {
        self.sensors.insert(kind.to_string(), sample);
    }

    pub fn get(&self, kind: &str) -> Option<&SensorSample> {
        self.sensors.get(kind)
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SensorSample)> {
        self.sensors.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&FaultKind::HardwareAbsent).unwrap();
        assert_eq!(json, "\"hardware-absent\"");

        let json = serde_json::to_string(&FaultKind::EncodeFailure).unwrap();
        assert_eq!(json, "\"encode-failure\"");
    }

    #[test]
    fn test_reading_serializes_as_field_map() {
        let reading = Reading::new()
            .with_vector("accel", vec![0.0, 0.0, 9.81])
            .with_scalar("temperature_c", 20.0);

        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["accel"][2], 9.81);
        assert_eq!(json["temperature_c"], 20.0);
    }

    #[test]
    fn test_record_keeps_faults_as_entries() {
        let mut record = TelemetryRecord::new();
        record.insert(
            "imu",
            Reading::new()
                .with_vector("accel", vec![0.0, 0.0, 9.81])
                .with_vector("gyro", vec![0.0, 0.0, 0.0])
                .into(),
        );
        record.insert(
            "barometer",
            FaultDescriptor::hardware_error("bus transaction failed").into(),
        );

        assert_eq!(record.len(), 2);
        assert!(!record.get("imu").unwrap().is_fault());
        assert!(record.get("barometer").unwrap().is_fault());

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["barometer"]["kind"], "hardware-error");
        assert_eq!(json["imu"]["accel"][2], 9.81);
    }

    #[test]
    fn test_sample_round_trips_untagged() {
        let fault: SensorSample = FaultDescriptor::timeout("no response").into();
        let json = serde_json::to_string(&fault).unwrap();
        let back: SensorSample = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fault);

        let reading: SensorSample = Reading::new().with_scalar("pressure_hpa", 1013.25).into();
        let json = serde_json::to_string(&reading).unwrap();
        let back: SensorSample = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reading);
    }
}
