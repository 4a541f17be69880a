//! Register-level access to the I2C sensors over the Linux i2c-dev
//! interface. Only compiled with the `hardware-i2c` feature on Linux;
//! default builds leave the sensor ports in simulation mode.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;

use thiserror::Error;

const I2C_SLAVE: libc::c_ulong = 0x0703;

#[derive(Error, Debug)]
pub enum I2cError {
    #[error("Failed to open i2c bus {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to select device address {addr:#04x}: {source}")]
    SelectAddress {
        addr: u16,
        source: std::io::Error,
    },

    #[error("I2C transfer failed: {0}")]
    Transfer(#[from] std::io::Error),

    #[error("Unexpected chip id {found:#04x} (expected {expected:#04x})")]
    WrongChip { found: u8, expected: u8 },
}

/// One open i2c-dev bus handle bound to a single device address.
pub struct I2cBus {
    file: File,
}

impl I2cBus {
    pub fn open(path: &str, addr: u16) -> Result<Self, I2cError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| I2cError::Open {
                path: path.to_string(),
                source,
            })?;

        let rc = unsafe { libc::ioctl(file.as_raw_fd(), I2C_SLAVE, libc::c_ulong::from(addr)) };
        if rc < 0 {
            return Err(I2cError::SelectAddress {
                addr,
                source: std::io::Error::last_os_error(),
            });
        }

        Ok(Self { file })
    }

    pub fn write_register(&mut self, register: u8, value: u8) -> Result<(), I2cError> {
        self.file.write_all(&[register, value])?;
        Ok(())
    }

    pub fn read_registers(&mut self, register: u8, buf: &mut [u8]) -> Result<(), I2cError> {
        self.file.write_all(&[register])?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    pub fn read_register(&mut self, register: u8) -> Result<u8, I2cError> {
        let mut buf = [0u8; 1];
        self.read_registers(register, &mut buf)?;
        Ok(buf[0])
    }
}

const LSM6DSOX_ADDR: u16 = 0x6A;
const LSM6DSOX_WHO_AM_I: u8 = 0x0F;
const LSM6DSOX_CHIP_ID: u8 = 0x6C;
const LSM6DSOX_CTRL1_XL: u8 = 0x10;
const LSM6DSOX_CTRL2_G: u8 = 0x11;
const LSM6DSOX_OUTX_L_G: u8 = 0x22;

// 104 Hz, ±2 g / ±250 dps.
const LSM6DSOX_ODR_104HZ: u8 = 0x40;
const ACCEL_MS2_PER_LSB: f64 = 0.061e-3 * 9.80665;
const GYRO_RADS_PER_LSB: f64 = 8.75e-3 * std::f64::consts::PI / 180.0;

/// LSM6DSOX six-axis IMU at its default bus address.
pub struct Lsm6dsox {
    bus: I2cBus,
}

impl Lsm6dsox {
    pub fn open_default() -> Result<Self, I2cError> {
        Self::open("/dev/i2c-1")
    }

    pub fn open(path: &str) -> Result<Self, I2cError> {
        let mut bus = I2cBus::open(path, LSM6DSOX_ADDR)?;

        let chip_id = bus.read_register(LSM6DSOX_WHO_AM_I)?;
        if chip_id != LSM6DSOX_CHIP_ID {
            return Err(I2cError::WrongChip {
                found: chip_id,
                expected: LSM6DSOX_CHIP_ID,
            });
        }

        bus.write_register(LSM6DSOX_CTRL1_XL, LSM6DSOX_ODR_104HZ)?;
        bus.write_register(LSM6DSOX_CTRL2_G, LSM6DSOX_ODR_104HZ)?;

        Ok(Self { bus })
    }

    /// Read one sample: acceleration in m/s² and angular rate in rad/s.
    pub fn read(&mut self) -> Result<([f64; 3], [f64; 3]), I2cError> {
        // Gyro then accel, six i16 little-endian values starting at OUTX_L_G.
        let mut raw = [0u8; 12];
        self.bus.read_registers(LSM6DSOX_OUTX_L_G, &mut raw)?;

        let word = |i: usize| i16::from_le_bytes([raw[i], raw[i + 1]]);
        let gyro = [
            f64::from(word(0)) * GYRO_RADS_PER_LSB,
            f64::from(word(2)) * GYRO_RADS_PER_LSB,
            f64::from(word(4)) * GYRO_RADS_PER_LSB,
        ];
        let accel = [
            f64::from(word(6)) * ACCEL_MS2_PER_LSB,
            f64::from(word(8)) * ACCEL_MS2_PER_LSB,
            f64::from(word(10)) * ACCEL_MS2_PER_LSB,
        ];

        Ok((accel, gyro))
    }
}

const BMP388_ADDR: u16 = 0x77;
const BMP388_CHIP_ID_REG: u8 = 0x00;
const BMP388_CHIP_ID: u8 = 0x50;
const BMP388_DATA_REG: u8 = 0x04;
const BMP388_PWR_CTRL: u8 = 0x1B;
const BMP388_CALIB_REG: u8 = 0x31;

// press_en | temp_en | forced mode.
const BMP388_FORCED_MEASUREMENT: u8 = 0x13;

/// Trimming coefficients converted to the floating point form used by the
/// datasheet compensation formulas.
struct Bmp388Calibration {
    par_t1: f64,
    par_t2: f64,
    par_t3: f64,
    par_p1: f64,
    par_p2: f64,
    par_p3: f64,
    par_p4: f64,
    par_p5: f64,
    par_p6: f64,
    par_p7: f64,
    par_p8: f64,
    par_p9: f64,
    par_p10: f64,
    par_p11: f64,
}

impl Bmp388Calibration {
    fn from_registers(raw: &[u8; 21]) -> Self {
        let u16le = |i: usize| f64::from(u16::from_le_bytes([raw[i], raw[i + 1]]));
        let i16le = |i: usize| f64::from(i16::from_le_bytes([raw[i], raw[i + 1]]));
        let i8at = |i: usize| f64::from(raw[i] as i8);

        Self {
            par_t1: u16le(0) * 2f64.powi(8),
            par_t2: u16le(2) / 2f64.powi(30),
            par_t3: i8at(4) / 2f64.powi(48),
            par_p1: (i16le(5) - 2f64.powi(14)) / 2f64.powi(20),
            par_p2: (i16le(7) - 2f64.powi(14)) / 2f64.powi(29),
            par_p3: i8at(9) / 2f64.powi(32),
            par_p4: i8at(10) / 2f64.powi(37),
            par_p5: u16le(11) * 2f64.powi(3),
            par_p6: u16le(13) / 2f64.powi(6),
            par_p7: i8at(15) / 2f64.powi(8),
            par_p8: i8at(16) / 2f64.powi(15),
            par_p9: i16le(17) / 2f64.powi(48),
            par_p10: i8at(19) / 2f64.powi(48),
            par_p11: i8at(20) / 2f64.powi(65),
        }
    }

    fn compensate_temperature(&self, raw: f64) -> f64 {
        let pd1 = raw - self.par_t1;
        let pd2 = pd1 * self.par_t2;
        pd2 + pd1 * pd1 * self.par_t3
    }

    fn compensate_pressure(&self, raw: f64, t_lin: f64) -> f64 {
        let po1 = self.par_p5
            + self.par_p6 * t_lin
            + self.par_p7 * t_lin * t_lin
            + self.par_p8 * t_lin * t_lin * t_lin;
        let po2 = raw
            * (self.par_p1
                + self.par_p2 * t_lin
                + self.par_p3 * t_lin * t_lin
                + self.par_p4 * t_lin * t_lin * t_lin);
        let po3 = raw * raw * (self.par_p9 + self.par_p10 * t_lin)
            + raw * raw * raw * self.par_p11;
        po1 + po2 + po3
    }
}

/// BMP388 barometer in forced-measurement mode at its default bus address.
pub struct Bmp388 {
    bus: I2cBus,
    calibration: Bmp388Calibration,
}

impl Bmp388 {
    pub fn open_default() -> Result<Self, I2cError> {
        Self::open("/dev/i2c-1")
    }

    pub fn open(path: &str) -> Result<Self, I2cError> {
        let mut bus = I2cBus::open(path, BMP388_ADDR)?;

        let chip_id = bus.read_register(BMP388_CHIP_ID_REG)?;
        if chip_id != BMP388_CHIP_ID {
            return Err(I2cError::WrongChip {
                found: chip_id,
                expected: BMP388_CHIP_ID,
            });
        }

        let mut raw = [0u8; 21];
        bus.read_registers(BMP388_CALIB_REG, &mut raw)?;
        let calibration = Bmp388Calibration::from_registers(&raw);

        Ok(Self { bus, calibration })
    }

    /// Trigger one forced measurement and return (pressure hPa, °C).
    pub fn read(&mut self) -> Result<(f64, f64), I2cError> {
        self.bus
            .write_register(BMP388_PWR_CTRL, BMP388_FORCED_MEASUREMENT)?;
        // Worst case conversion time at default oversampling.
        std::thread::sleep(std::time::Duration::from_millis(10));

        let mut raw = [0u8; 6];
        self.bus.read_registers(BMP388_DATA_REG, &mut raw)?;

        let raw_pressure =
            f64::from(u32::from(raw[0]) | u32::from(raw[1]) << 8 | u32::from(raw[2]) << 16);
        let raw_temperature =
            f64::from(u32::from(raw[3]) | u32::from(raw[4]) << 8 | u32::from(raw[5]) << 16);

        let temperature = self.calibration.compensate_temperature(raw_temperature);
        let pressure_pa = self.calibration.compensate_pressure(raw_pressure, temperature);

        Ok((pressure_pa / 100.0, temperature))
    }
}
