use std::io::Read;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::config::RadioConfig;

/// Send one newline-terminated text command over the radio serial link.
/// Fire and forget: any immediate reply is read and logged, nothing is
/// retried, and delivery is never confirmed. Returns false on any I/O
/// error.
pub fn send_command(config: &RadioConfig, command: &str) -> bool {
    match try_send(config, command) {
        Ok(Some(reply)) => {
            info!("Radio reply: {}", reply);
            true
        }
        Ok(None) => {
            debug!("Radio command sent, no immediate reply.");
            true
        }
        Err(e) => {
            warn!("Radio send failed. Error: {}", e);
            false
        }
    }
}

fn try_send(config: &RadioConfig, command: &str) -> Result<Option<String>> {
    let mut port = serialport::new(config.port.as_str(), config.baud)
        .timeout(config.timeout)
        .open()?;

    port.write_all(command.as_bytes())?;
    port.write_all(b"\n")?;
    port.flush()?;

    // Give the radio a moment, then drain whatever is already waiting.
    std::thread::sleep(config.reply_grace);
    let waiting = port.bytes_to_read()?;
    if waiting == 0 {
        return Ok(None);
    }

    let mut buf = vec![0u8; waiting as usize];
    port.read_exact(&mut buf)?;
    Ok(Some(String::from_utf8_lossy(&buf).trim().to_string()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_missing_serial_device_reports_failure() {
        let config = RadioConfig {
            port: "/dev/definitely-not-a-serial-port".to_string(),
            baud: 9600,
            timeout: Duration::from_millis(100),
            reply_grace: Duration::from_millis(1),
        };
        assert!(!send_command(&config, "PING"));
    }
}
