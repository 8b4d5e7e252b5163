use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

const ALLOWED_CONTENT_TYPES: &[(&str, &str)] = &[("image/png", "png"), ("image/jpeg", "jpg")];

pub fn is_allowed_content_type(content_type: &str) -> bool {
    ALLOWED_CONTENT_TYPES.iter().any(|(ct, _)| *ct == content_type)
}

fn extension_for(content_type: &str) -> Option<&'static str> {
    ALLOWED_CONTENT_TYPES
        .iter()
        .find(|(ct, _)| *ct == content_type)
        .map(|(_, ext)| *ext)
}

/// Removes a photo's backing file after the row is deleted. Best-effort:
/// runs off the request path and its outcome never reaches the caller.
pub trait PhotoCleaner: Send + Sync {
    fn clean(&self, filename: &str);
}

/// Stores uploaded photos under generated filenames in a flat directory.
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, filename: &str) -> PathBuf {
        // Filenames are generated server-side, but never join a
        // client-supplied path component.
        self.root.join(Path::new(filename).file_name().unwrap_or_default())
    }

    /// Write the uploaded bytes and return the generated file reference.
    pub async fn save(&self, data: &[u8], content_type: &str) -> AppResult<String> {
        let ext = extension_for(content_type)
            .ok_or_else(|| AppError::BadRequest("No image was posted".to_string()))?;
        let filename = format!("{}.{}", uuid::Uuid::now_v7(), ext);

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| AppError::Internal(format!("Creating uploads dir: {}", e)))?;
        tokio::fs::write(self.path_for(&filename), data)
            .await
            .map_err(|e| AppError::Internal(format!("Writing upload: {}", e)))?;

        Ok(filename)
    }
}

impl PhotoCleaner for UploadStore {
    fn clean(&self, filename: &str) {
        let path = self.path_for(filename);
        tokio::spawn(async move {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::warn!("Failed to remove stored file {}: {}", path.display(), e);
            }
        });
    }
}
