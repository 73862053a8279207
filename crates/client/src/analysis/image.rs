//! Captured or uploaded food images.

use std::path::Path;

/// An image ready to be sent for analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHandle {
    /// Opaque reference kept alongside the analysis result.
    pub id: String,
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub content_type: String,
}

impl ImageHandle {
    /// Wrap in-memory image bytes. The content type is inferred from the
    /// file name's extension.
    #[must_use]
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let content_type = content_type_for(&file_name).to_string();
        Self {
            id: format!("img:{}", uuid::Uuid::new_v4()),
            bytes,
            file_name,
            content_type,
        }
    }

    /// Read an image file from disk.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be read.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map_or_else(|| "image".to_string(), |name| name.to_string_lossy().into_owned());
        tracing::debug!(file_name = %file_name, size = bytes.len(), "Image loaded");
        Ok(Self::new(file_name, bytes))
    }

    /// Lower-cased file extension, if any.
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
    }
}

fn content_type_for(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("heic") => "image/heic",
        _ => "application/octet-stream",
    }
}
