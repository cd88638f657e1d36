use std::fs;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest file accepted as an attachment.
pub const MAX_ATTACHMENT_SIZE: u64 = 10 * 1024 * 1024;

/// Broad category of an attached file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    /// A raster image.
    Image,
    /// A PDF document.
    Pdf,
    /// Anything else.
    Other,
}

/// A file riding alongside a user message.  The core treats it as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Unique identifier.
    pub id: String,
    /// File name as shown to the user.
    pub name: String,
    /// Category of the file.
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    /// Size in bytes.
    pub size: u64,
    /// Inline preview (a data URL for images).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    /// Location of an uploaded copy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Attachment {
    /// Describe a local file as an attachment.
    ///
    /// Only images and PDFs up to [`MAX_ATTACHMENT_SIZE`] are accepted.  Images carry a base64
    /// data URL preview.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = fs::metadata(path)
            .map_err(|err| Error::io(format!("cannot read {}", path.display()), err))?;
        if !metadata.is_file() {
            return Err(Error::validation(
                format!("{} is not a regular file", path.display()),
                Some("path".to_string()),
            ));
        }
        let size = metadata.len();
        if size > MAX_ATTACHMENT_SIZE {
            return Err(Error::validation(
                format!(
                    "File size exceeds {}MB limit",
                    MAX_ATTACHMENT_SIZE / 1024 / 1024
                ),
                Some("size".to_string()),
            ));
        }
        let mime = mime_type(path).ok_or_else(|| {
            Error::validation(
                "File type not supported. Please attach images (JPG, PNG, GIF, WebP) or PDFs.",
                Some("type".to_string()),
            )
        })?;
        let kind = if mime.starts_with("image/") {
            AttachmentKind::Image
        } else if mime == "application/pdf" {
            AttachmentKind::Pdf
        } else {
            AttachmentKind::Other
        };
        let preview = match kind {
            AttachmentKind::Image => {
                let bytes = fs::read(path)
                    .map_err(|err| Error::io(format!("cannot read {}", path.display()), err))?;
                Some(format!("data:{mime};base64,{}", STANDARD.encode(bytes)))
            }
            AttachmentKind::Pdf | AttachmentKind::Other => None,
        };
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            kind,
            size,
            preview,
            url: None,
        })
    }
}

fn mime_type(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "pdf" => Some("application/pdf"),
        _ => None,
    }
}
