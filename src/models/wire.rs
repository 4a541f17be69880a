use serde::{Deserialize, Serialize};

use super::telemetry::{FaultDescriptor, TelemetryRecord};

/// Message pushed to every registered subscriber once per broadcast tick.
/// One JSON line per message on the subscriber connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    Telemetry { payload: TelemetryRecord },
}

impl PushMessage {
    pub fn telemetry(record: TelemetryRecord) -> Self {
        PushMessage::Telemetry { payload: record }
    }
}

/// One-shot request accepted on the control listener. Each request is a
/// single JSON frame; the connection serves requests until the peer closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlRequest {
    /// Current instantaneous reading (or fault) for all sensors,
    /// independent of the broadcast cadence.
    Sensors,
    /// Capture one still image. The success reply is a raw JPEG frame,
    /// not JSON.
    Snapshot,
    /// Send a newline-terminated text command over the radio serial link.
    Radio { command: String },
}

/// JSON replies on the control listener. A successful snapshot is answered
/// with raw JPEG bytes instead (a JPEG frame starts with 0xFF, never `{`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ControlReply {
    Sensors { payload: TelemetryRecord },
    Radio { ok: bool },
    Error { fault: FaultDescriptor },
    BadRequest { detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::telemetry::Reading;

    #[test]
    fn test_push_message_is_tagged_telemetry() {
        let mut record = TelemetryRecord::new();
        record.insert(
            "imu",
            Reading::new().with_vector("gyro", vec![0.0, 0.0, 0.0]).into(),
        );

        let json = serde_json::to_value(PushMessage::telemetry(record)).unwrap();
        assert_eq!(json["type"], "telemetry");
        assert!(json["payload"]["imu"].is_object());
    }

    #[test]
    fn test_control_request_parses_ops() {
        let req: ControlRequest = serde_json::from_str(r#"{"op":"sensors"}"#).unwrap();
        assert_eq!(req, ControlRequest::Sensors);

        let req: ControlRequest =
            serde_json::from_str(r#"{"op":"radio","command":"FWD 10"}"#).unwrap();
        assert_eq!(
            req,
            ControlRequest::Radio {
                command: "FWD 10".to_string()
            }
        );
    }

    #[test]
    fn test_error_reply_carries_fault() {
        let reply = ControlReply::Error {
            fault: crate::models::telemetry::FaultDescriptor::not_found(
                "every capture strategy exhausted",
            ),
        };
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["fault"]["kind"], "not-found");
    }
}
