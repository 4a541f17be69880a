//! V4L2-backed in-process camera driver (`camera-v4l2` feature).

use std::path::Path;

use tracing::{debug, warn};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

use crate::models::telemetry::FaultDescriptor;

use super::{CameraDriver, CaptureMode, PixelFormat, RawFrame};

const DEVICE_PATH: &str = "/dev/video0";

pub struct V4l2Driver {
    device: Device,
    format: Option<Format>,
}

impl V4l2Driver {
    /// Open the default video device if it exists. Returns `None` when the
    /// node is absent or cannot be opened, leaving the in-process strategy
    /// out of the capture chain.
    pub fn probe() -> Option<Self> {
        if !Path::new(DEVICE_PATH).exists() {
            debug!("No video device node at {}.", DEVICE_PATH);
            return None;
        }
        match Device::with_path(DEVICE_PATH) {
            Ok(device) => Some(Self {
                device,
                format: None,
            }),
            Err(e) => {
                warn!("Failed to open {}. Error: {}", DEVICE_PATH, e);
                None
            }
        }
    }

    fn fourcc_for(mode: CaptureMode) -> FourCC {
        match mode {
            CaptureMode::Still => FourCC::new(b"MJPG"),
            CaptureMode::Preview => FourCC::new(b"RGB3"),
        }
    }
}

impl CameraDriver for V4l2Driver {
    fn configure(
        &mut self,
        mode: CaptureMode,
        width: u32,
        height: u32,
    ) -> Result<(), FaultDescriptor> {
        let requested = Format::new(width, height, Self::fourcc_for(mode));
        let actual = self
            .device
            .set_format(&requested)
            .map_err(|e| FaultDescriptor::hardware_error(format!("set_format failed: {}", e)))?;

        if actual.fourcc != requested.fourcc {
            return Err(FaultDescriptor::hardware_error(format!(
                "device refused {} (offered {})",
                requested.fourcc, actual.fourcc
            )));
        }

        debug!(
            "Configured camera {}x{} {}.",
            actual.width, actual.height, actual.fourcc
        );
        self.format = Some(actual);
        Ok(())
    }

    fn capture_frame(&mut self) -> Result<RawFrame, FaultDescriptor> {
        let format = self
            .format
            .clone()
            .ok_or_else(|| FaultDescriptor::hardware_error("capture before configure"))?;

        let mut stream =
            v4l::io::mmap::Stream::with_buffers(&mut self.device, Type::VideoCapture, 2).map_err(
                |e| FaultDescriptor::hardware_error(format!("failed to start stream: {}", e)),
            )?;

        let (data, _meta) = stream
            .next()
            .map_err(|e| FaultDescriptor::hardware_error(format!("frame dequeue failed: {}", e)))?;

        let pixel_format = if &format.fourcc.repr == b"MJPG" {
            PixelFormat::Mjpeg
        } else {
            PixelFormat::Rgb8
        };

        Ok(RawFrame {
            width: format.width,
            height: format.height,
            format: pixel_format,
            data: data.to_vec(),
        })
    }
}
