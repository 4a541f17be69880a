use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Substituted with the temp output path in external capture variants.
pub const OUTPUT_PLACEHOLDER: &str = "{output}";
/// Substituted with the configured capture width.
pub const WIDTH_PLACEHOLDER: &str = "{width}";
/// Substituted with the configured capture height.
pub const HEIGHT_PLACEHOLDER: &str = "{height}";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse environment variable {name}: {detail}")]
    BadValue { name: &'static str, detail: String },
}

/// Everything the relay consumes from its environment. All values are
/// externally supplied; nothing here is computed by the core.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Listener for persistent telemetry subscriber connections.
    pub subscriber_bind_addr: SocketAddr,
    /// Listener for one-shot control requests (sensors, snapshot, radio).
    pub control_bind_addr: SocketAddr,
    /// Nominal broadcast tick period.
    pub broadcast_period: Duration,
    /// Depth of each subscriber's outbound queue. A full queue is treated
    /// the same as a dead subscriber.
    pub push_buffer: usize,
    pub capture: CaptureConfig,
    pub radio: RadioConfig,
}

/// Configuration for the still-capture pipeline.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub width: u32,
    pub height: u32,
    /// JPEG quality for the in-process encoder.
    pub jpeg_quality: u8,
    /// External capture binaries probed on PATH, in preference order.
    pub tool_candidates: Vec<String>,
    /// Hard timeout per capture attempt (in-process or one external
    /// command variant).
    pub attempt_timeout: Duration,
}

impl CaptureConfig {
    /// Ordered command-line variants tried against the external tool:
    /// default, explicit resolution, explicit sensor mode string. Each is
    /// a template; placeholders are substituted per attempt.
    pub fn command_variants(&self) -> Vec<Vec<String>> {
        vec![
            vec![
                "-n".into(),
                "--immediate".into(),
                "-o".into(),
                OUTPUT_PLACEHOLDER.into(),
            ],
            vec![
                "-n".into(),
                "--immediate".into(),
                "--width".into(),
                WIDTH_PLACEHOLDER.into(),
                "--height".into(),
                HEIGHT_PLACEHOLDER.into(),
                "-o".into(),
                OUTPUT_PLACEHOLDER.into(),
            ],
            vec![
                "-n".into(),
                "--immediate".into(),
                "--mode".into(),
                format!("{}:{}:12", WIDTH_PLACEHOLDER, HEIGHT_PLACEHOLDER),
                "-o".into(),
                OUTPUT_PLACEHOLDER.into(),
            ],
        ]
    }
}

/// Serial link used for fire-and-forget radio commands.
#[derive(Debug, Clone)]
pub struct RadioConfig {
    pub port: String,
    pub baud: u32,
    /// I/O timeout on the open port.
    pub timeout: Duration,
    /// Short wait before checking for an immediate reply.
    pub reply_grace: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            subscriber_bind_addr: "0.0.0.0:8000".parse().expect("static addr"),
            control_bind_addr: "0.0.0.0:8001".parse().expect("static addr"),
            broadcast_period: Duration::from_secs(1),
            push_buffer: 8,
            capture: CaptureConfig::default(),
            radio: RadioConfig::default(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            jpeg_quality: 85,
            tool_candidates: vec!["rpicam-still".to_string(), "libcamera-still".to_string()],
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            port: "/dev/serial0".to_string(),
            baud: 9600,
            timeout: Duration::from_secs(2),
            reply_grace: Duration::from_millis(100),
        }
    }
}

impl RelayConfig {
    /// Build a config from `ROVER_*` environment variables, falling back to
    /// defaults for anything unset. Unparseable values are errors rather
    /// than silent fallbacks.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(addr) = read_parsed("ROVER_SUBSCRIBER_ADDR")? {
            config.subscriber_bind_addr = addr;
        }
        if let Some(addr) = read_parsed("ROVER_CONTROL_ADDR")? {
            config.control_bind_addr = addr;
        }
        if let Some(ms) = read_parsed::<u64>("ROVER_BROADCAST_PERIOD_MS")? {
            config.broadcast_period = Duration::from_millis(ms);
        }
        if let Some(depth) = read_parsed("ROVER_PUSH_BUFFER")? {
            config.push_buffer = depth;
        }
        if let Some(width) = read_parsed("ROVER_CAPTURE_WIDTH")? {
            config.capture.width = width;
        }
        if let Some(height) = read_parsed("ROVER_CAPTURE_HEIGHT")? {
            config.capture.height = height;
        }
        if let Some(ms) = read_parsed::<u64>("ROVER_CAPTURE_TIMEOUT_MS")? {
            config.capture.attempt_timeout = Duration::from_millis(ms);
        }
        if let Some(tool) = read_string("ROVER_CAPTURE_TOOL") {
            config.capture.tool_candidates = vec![tool];
        }
        if let Some(port) = read_string("ROVER_SERIAL_PORT") {
            config.radio.port = port;
        }
        if let Some(baud) = read_parsed("ROVER_SERIAL_BAUD")? {
            config.radio.baud = baud;
        }

        Ok(config)
    }
}

fn read_string(name: &'static str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_parsed<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match read_string(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::BadValue {
                name,
                detail: e.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_nominal_cadence() {
        let config = RelayConfig::default();
        assert_eq!(config.broadcast_period, Duration::from_secs(1));
        assert_eq!(config.capture.attempt_timeout, Duration::from_secs(10));
        assert_eq!(config.radio.baud, 9600);
    }

    #[test]
    fn test_command_variants_are_ordered_default_resolution_mode() {
        let variants = CaptureConfig::default().command_variants();
        assert_eq!(variants.len(), 3);
        assert!(!variants[0].contains(&"--width".to_string()));
        assert!(variants[1].contains(&"--width".to_string()));
        assert!(variants[2].iter().any(|a| a.contains(":12")));
        for variant in &variants {
            assert!(variant.contains(&OUTPUT_PLACEHOLDER.to_string()));
        }
    }
}
