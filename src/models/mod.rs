pub mod telemetry;
pub mod wire;
