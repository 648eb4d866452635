use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use super::error::GenerationError;

/// Uploaded product photo ready to be sent inline to a vision model.
#[derive(Clone)]
pub struct EncodedImage {
    bytes: Vec<u8>,
    mime_type: &'static str,
}

impl EncodedImage {
    pub async fn from_path(path: &Path) -> Result<Self, GenerationError> {
        let mime_type = mime_type_for(path).ok_or_else(|| {
            GenerationError::Image(format!(
                "{} is not a JPEG or PNG image",
                path.display()
            ))
        })?;

        let image = Self {
            bytes: tokio::fs::read(path).await?,
            mime_type,
        };
        if image.is_empty() {
            return Err(GenerationError::Image(format!("{} is empty", path.display())));
        }
        Ok(image)
    }

    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }
}

pub fn mime_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        _ => None,
    }
}
