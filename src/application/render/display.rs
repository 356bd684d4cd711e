//! Notebook display bundle for rendered images.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::Serialize;
use tracing::debug;

const PNG_MIME: &str = "image/png";

/// MIME-keyed payload understood by Jupyter frontends (`display_data`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayData {
    pub data: DisplayBundle,
    pub metadata: DisplayMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayBundle {
    /// Base64-encoded PNG bytes.
    #[serde(rename = "image/png")]
    pub image_png: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct DisplayMetadata {
    #[serde(rename = "image/png", skip_serializing_if = "Option::is_none")]
    pub image_png: Option<ImageDimensions>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageDimensions {
    pub width: usize,
    pub height: usize,
}

impl DisplayData {
    /// Wrap PNG bytes, recording pixel dimensions when the header can be read.
    pub fn from_png(png: &[u8]) -> Self {
        let dimensions = match imagesize::blob_size(png) {
            Ok(size) => Some(ImageDimensions {
                width: size.width,
                height: size.height,
            }),
            Err(err) => {
                debug!(
                    target = "application::render::display",
                    mime = PNG_MIME,
                    error = %err,
                    "Could not read image dimensions"
                );
                None
            }
        };

        Self {
            data: DisplayBundle {
                image_png: STANDARD.encode(png),
            },
            metadata: DisplayMetadata {
                image_png: dimensions,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_header(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = vec![0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];
        bytes.extend_from_slice(&13u32.to_be_bytes());
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&width.to_be_bytes());
        bytes.extend_from_slice(&height.to_be_bytes());
        bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
        bytes
    }

    #[test]
    fn bundle_carries_base64_png_and_dimensions() {
        let png = png_header(120, 48);
        let display = DisplayData::from_png(&png);

        assert_eq!(display.data.image_png, STANDARD.encode(&png));
        assert_eq!(
            display.metadata.image_png,
            Some(ImageDimensions {
                width: 120,
                height: 48
            })
        );

        let json = serde_json::to_value(&display).expect("serialize");
        assert_eq!(json["metadata"]["image/png"]["width"], 120);
        assert!(json["data"]["image/png"].is_string());
    }

    #[test]
    fn unreadable_header_omits_metadata() {
        let display = DisplayData::from_png(b"not a png");
        assert_eq!(display.metadata.image_png, None);

        let json = serde_json::to_value(&display).expect("serialize");
        assert_eq!(json["metadata"], serde_json::json!({}));
    }
}
