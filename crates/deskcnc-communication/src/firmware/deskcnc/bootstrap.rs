//! Firmware bootstrap resources
//!
//! The controller boots into a loader that expects the host to upload the
//! firmware image after every reset. The loader echoes a fixed byte
//! sequence which the host compares against a known-good capture.
//!
//! Both resources are text files of whitespace-separated hex bytes.

use deskcnc_core::FirmwareError;
use std::path::Path;
use std::sync::Arc;

/// Firmware image plus the response expected while uploading it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    image: Arc<[u8]>,
    expected_response: Arc<[u8]>,
}

impl FirmwareImage {
    /// Wrap already decoded bytes
    pub fn from_bytes(image: impl Into<Vec<u8>>, expected_response: impl Into<Vec<u8>>) -> Self {
        Self {
            image: image.into().into(),
            expected_response: expected_response.into().into(),
        }
    }

    /// Read and decode both hex resource files
    pub fn load(image_path: &Path, response_path: &Path) -> Result<Self, FirmwareError> {
        let image = read_hex_file(image_path)?;
        if image.is_empty() {
            return Err(FirmwareError::EmptyResource {
                path: image_path.display().to_string(),
            });
        }
        let expected_response = read_hex_file(response_path)?;

        tracing::debug!(
            image_len = image.len(),
            response_len = expected_response.len(),
            "Loaded firmware resources"
        );

        Ok(Self::from_bytes(image, expected_response))
    }

    /// Firmware bytes
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    /// Bytes the loader sends back during a successful upload
    pub fn expected_response(&self) -> &[u8] {
        &self.expected_response
    }
}

fn read_hex_file(path: &Path) -> Result<Vec<u8>, FirmwareError> {
    let text = std::fs::read_to_string(path).map_err(|e| FirmwareError::ResourceUnreadable {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse_hex_bytes(&text, &path.display().to_string())
}

/// Decode whitespace-separated hex bytes ("4A 0f 2")
///
/// `source` only labels errors.
pub fn parse_hex_bytes(text: &str, source: &str) -> Result<Vec<u8>, FirmwareError> {
    text.split_whitespace()
        .map(|token| {
            let valid = token.len() <= 2 && token.chars().all(|c| c.is_ascii_hexdigit());
            valid
                .then(|| u8::from_str_radix(token, 16).ok())
                .flatten()
                .ok_or_else(|| FirmwareError::InvalidHexByte {
                    path: source.to_string(),
                    token: token.to_string(),
                })
        })
        .collect()
}
