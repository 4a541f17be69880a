use crate::models::telemetry::{SensorSample, TelemetryRecord};

/// This trait separates the external logic of talking to one physical
/// sensor kind from the broadcast and read-path logic, which makes the
/// system easier to unit test.
///
/// A port never blocks longer than its hardware transaction and never
/// panics past this boundary; every lower-level failure is converted into
/// a fault sample.
pub trait SensorPort: Send + Sync {
    /// Stable name for this sensor kind, used as the record key.
    fn kind(&self) -> &'static str;

    /// Sample the sensor once. Returns a reading on success and a
    /// `hardware-absent` or `hardware-error` fault otherwise.
    fn sample(&self) -> SensorSample;

    /// True when no physical hardware was detected at initialization and
    /// the port is permanently returning its fixed placeholder reading.
    fn is_simulated(&self) -> bool {
        false
    }
}

/// The full set of registered sensor ports. Shared by the broadcast tick
/// and the on-demand sensor read operation.
pub struct SensorSuite {
    ports: Vec<Box<dyn SensorPort>>,
}

impl SensorSuite {
    pub fn new(ports: Vec<Box<dyn SensorPort>>) -> Self {
        Self { ports }
    }

    /// Sample every registered port, producing one record with exactly one
    /// entry per port. A faulting port is included as a fault entry and
    /// never prevents inclusion of the others.
    pub fn sample_all(&self) -> TelemetryRecord {
        let mut record = TelemetryRecord::new();
        for port in &self.ports {
            record.insert(port.kind(), port.sample());
        }
        record
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::telemetry::{FaultDescriptor, Reading};

    struct FixedPort {
        kind: &'static str,
        fail: bool,
    }

    impl SensorPort for FixedPort {
        fn kind(&self) -> &'static str {
            self.kind
        }

        fn sample(&self) -> SensorSample {
            if self.fail {
                FaultDescriptor::hardware_error("transaction failed").into()
            } else {
                Reading::new()
                    .with_vector("accel", vec![0.0, 0.0, 9.81])
                    .with_vector("gyro", vec![0.0, 0.0, 0.0])
                    .into()
            }
        }
    }

    #[test]
    fn test_sample_all_has_one_entry_per_port() {
        let suite = SensorSuite::new(vec![
            Box::new(FixedPort {
                kind: "imu",
                fail: false,
            }),
            Box::new(FixedPort {
                kind: "barometer",
                fail: true,
            }),
        ]);

        let record = suite.sample_all();
        assert_eq!(record.len(), 2);
        assert!(!record.get("imu").unwrap().is_fault());
        assert!(record.get("barometer").unwrap().is_fault());
    }

    #[test]
    fn test_sample_all_with_every_port_faulting_still_completes() {
        let suite = SensorSuite::new(vec![
            Box::new(FixedPort {
                kind: "imu",
                fail: true,
            }),
            Box::new(FixedPort {
                kind: "barometer",
                fail: true,
            }),
        ]);

        let record = suite.sample_all();
        assert_eq!(record.len(), 2);
        assert!(record.iter().all(|(_, sample)| sample.is_fault()));
    }
}
