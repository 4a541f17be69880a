use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use tracing::debug;

use crate::externals::camera::{PixelFormat, RawFrame};
use crate::models::telemetry::FaultDescriptor;

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// Encode a raw frame to JPEG by walking an ordered encoder list: the
/// primary RGB encoder first, then the MJPEG passthrough. The first
/// encoder to produce bytes wins; if all of them reject the frame the
/// result is one `encode-failure` fault.
pub fn encode_frame(frame: &RawFrame, quality: u8) -> Result<Vec<u8>, FaultDescriptor> {
    let encoders: [(&str, EncodeFn); 2] =
        [("rgb-jpeg", encode_rgb), ("mjpeg-passthrough", passthrough)];

    let mut last_detail = String::new();
    for (name, encode) in encoders {
        match encode(frame, quality) {
            Ok(bytes) => {
                debug!("Encoder {} produced {} bytes.", name, bytes.len());
                return Ok(bytes);
            }
            Err(detail) => {
                debug!("Encoder {} rejected frame: {}.", name, detail);
                last_detail = detail;
            }
        }
    }

    Err(FaultDescriptor::encode_failure(last_detail))
}

type EncodeFn = fn(&RawFrame, u8) -> Result<Vec<u8>, String>;

fn encode_rgb(frame: &RawFrame, quality: u8) -> Result<Vec<u8>, String> {
    if frame.format != PixelFormat::Rgb8 {
        return Err("frame is not packed RGB".to_string());
    }
    let expected = frame.width as usize * frame.height as usize * 3;
    if frame.data.len() != expected {
        return Err(format!(
            "rgb frame length {} does not match {}x{}",
            frame.data.len(),
            frame.width,
            frame.height
        ));
    }

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode(
            &frame.data,
            frame.width,
            frame.height,
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| format!("jpeg encode failed: {}", e))?;
    Ok(out)
}

/// Some sensors deliver frames already JPEG-compressed; those pass through
/// untouched after a sanity check on the start-of-image marker.
fn passthrough(frame: &RawFrame, _quality: u8) -> Result<Vec<u8>, String> {
    if frame.format != PixelFormat::Mjpeg {
        return Err("frame is not MJPEG".to_string());
    }
    if frame.data.len() < 2 || frame.data[..2] != JPEG_SOI {
        return Err("MJPEG frame has no JPEG start-of-image marker".to_string());
    }
    Ok(frame.data.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::telemetry::FaultKind;

    fn rgb_frame(width: u32, height: u32) -> RawFrame {
        RawFrame {
            width,
            height,
            format: PixelFormat::Rgb8,
            data: vec![128u8; (width * height * 3) as usize],
        }
    }

    #[test]
    fn test_rgb_frame_encodes_to_jpeg() {
        let bytes = encode_frame(&rgb_frame(32, 24), 85).unwrap();
        assert_eq!(&bytes[..2], &JPEG_SOI);
    }

    #[test]
    fn test_mjpeg_frame_passes_through() {
        let data = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
        let frame = RawFrame {
            width: 32,
            height: 24,
            format: PixelFormat::Mjpeg,
            data: data.clone(),
        };
        assert_eq!(encode_frame(&frame, 85).unwrap(), data);
    }

    #[test]
    fn test_mjpeg_without_soi_marker_is_encode_failure() {
        let frame = RawFrame {
            width: 32,
            height: 24,
            format: PixelFormat::Mjpeg,
            data: vec![0x00, 0x01, 0x02],
        };
        let fault = encode_frame(&frame, 85).unwrap_err();
        assert_eq!(fault.kind, FaultKind::EncodeFailure);
    }

    #[test]
    fn test_truncated_rgb_frame_is_encode_failure() {
        let mut frame = rgb_frame(32, 24);
        frame.data.truncate(10);
        let fault = encode_frame(&frame, 85).unwrap_err();
        assert_eq!(fault.kind, FaultKind::EncodeFailure);
    }
}
