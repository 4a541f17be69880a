pub mod adapters;
pub mod services;

#[cfg(all(feature = "hardware-i2c", target_os = "linux"))]
pub mod i2c;

use services::SensorSuite;

/// Build the standard onboard sensor suite: IMU, barometer, and the host
/// system port. Ports that find no hardware come up in simulation mode.
pub fn default_suite() -> SensorSuite {
    SensorSuite::new(vec![
        Box::new(adapters::Lsm6dsoxPort::new()),
        Box::new(adapters::Bmp388Port::new()),
        Box::new(adapters::HostSystemPort::new()),
    ])
}
