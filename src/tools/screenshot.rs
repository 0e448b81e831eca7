//! Screen capture of the primary monitor

use super::ToolError;

#[cfg(feature = "capture")]
pub use self::xcap_capture::{capture, primary_geometry};

#[cfg(not(feature = "capture"))]
pub fn capture(_target: Option<(u32, u32)>) -> Result<String, ToolError> {
    Err(ToolError::Screenshot(
        "screen capture support is not compiled in".to_string(),
    ))
}

#[cfg(not(feature = "capture"))]
pub fn primary_geometry() -> Option<(u32, u32)> {
    None
}

#[cfg(feature = "capture")]
mod xcap_capture {
    use super::ToolError;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use image::imageops::FilterType;
    use image::ImageFormat;
    use std::io::Cursor;
    use xcap::Monitor;

    fn primary_monitor() -> Result<Monitor, ToolError> {
        let mut monitors = Monitor::all()
            .map_err(|e| ToolError::Screenshot(format!("failed to get monitors: {}", e)))?;

        if monitors.is_empty() {
            return Err(ToolError::Screenshot("no monitors found".to_string()));
        }

        let idx = monitors.iter().position(|m| m.is_primary()).unwrap_or(0);
        Ok(monitors.swap_remove(idx))
    }

    /// Size of the primary monitor, if one can be found
    pub fn primary_geometry() -> Option<(u32, u32)> {
        match primary_monitor() {
            Ok(m) => Some((m.width(), m.height())),
            Err(e) => {
                tracing::warn!("Could not detect screen geometry: {}", e);
                None
            }
        }
    }

    /// Capture the primary monitor as a base64 PNG, resized to `target` if given
    pub fn capture(target: Option<(u32, u32)>) -> Result<String, ToolError> {
        let monitor = primary_monitor()?;
        let img = monitor
            .capture_image()
            .map_err(|e| ToolError::Screenshot(format!("failed to capture monitor: {}", e)))?;

        encode_image(img, target).map_err(ToolError::Screenshot)
    }

    pub(crate) fn encode_image(
        img: image::RgbaImage,
        target: Option<(u32, u32)>,
    ) -> Result<String, String> {
        let img = match target {
            Some((w, h)) if (w, h) != img.dimensions() => {
                image::imageops::resize(&img, w, h, FilterType::Triangle)
            }
            _ => img,
        };

        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .map_err(|e| format!("failed to encode image: {}", e))?;

        Ok(STANDARD.encode(buf.into_inner()))
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn decode(b64: &str) -> image::DynamicImage {
            let bytes = STANDARD.decode(b64).unwrap();
            image::load_from_memory_with_format(&bytes, ImageFormat::Png).unwrap()
        }

        #[test]
        fn test_encode_resizes_to_target() {
            let img = image::RgbaImage::from_pixel(40, 30, image::Rgba([255, 0, 0, 255]));
            let png = decode(&encode_image(img, Some((20, 15))).unwrap());
            assert_eq!((png.width(), png.height()), (20, 15));
        }

        #[test]
        fn test_encode_without_target_keeps_size() {
            let img = image::RgbaImage::new(8, 6);
            let png = decode(&encode_image(img, None).unwrap());
            assert_eq!((png.width(), png.height()), (8, 6));
        }
    }
}
