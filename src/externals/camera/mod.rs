#[cfg(feature = "camera-v4l2")]
pub mod v4l2;

use crate::models::telemetry::FaultDescriptor;

/// Pixel layout of a frame delivered by a camera driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed 8-bit RGB, 3 bytes per pixel.
    Rgb8,
    /// A complete JPEG-compressed image as produced by the sensor ISP.
    Mjpeg,
}

/// One frame handed over by an in-process camera driver.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

/// Camera configuration attempted when the handle is first acquired.
/// `Still` is preferred; `Preview` is the fallback at the same resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    Still,
    Preview,
}

/// This trait separates the in-process camera hardware from the capture
/// chain so the chain and the snapshot service can be tested without a
/// device. Implementations are driven by a single owner and never called
/// concurrently.
pub trait CameraDriver: Send {
    /// Apply a capture configuration. Called once per acquisition;
    /// a failure for `Still` is retried as `Preview` before the driver is
    /// given up on for that call.
    fn configure(
        &mut self,
        mode: CaptureMode,
        width: u32,
        height: u32,
    ) -> Result<(), FaultDescriptor>;

    /// Grab one frame from the configured camera.
    fn capture_frame(&mut self) -> Result<RawFrame, FaultDescriptor>;
}

/// Factory used by the snapshot service to lazily acquire a driver.
/// Returns `None` when no in-process driver is available; the in-process
/// strategy then fails fast and the chain moves to the external tool.
pub type DriverFactory = Box<dyn Fn() -> Option<Box<dyn CameraDriver>> + Send + Sync>;

/// Probe for an in-process camera driver. Without the `camera-v4l2`
/// feature there is none and capture falls through to the external tool.
pub fn probe_driver() -> Option<Box<dyn CameraDriver>> {
    #[cfg(feature = "camera-v4l2")]
    {
        v4l2::V4l2Driver::probe().map(|driver| Box::new(driver) as Box<dyn CameraDriver>)
    }
    #[cfg(not(feature = "camera-v4l2"))]
    {
        None
    }
}
