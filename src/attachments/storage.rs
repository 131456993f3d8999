use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::Result;

/// On-disk copies of attachment content, one file per attachment named
/// `{id}_{filename}` directly under the base directory.
#[derive(Debug, Clone)]
pub struct AttachmentStorage {
    base_path: PathBuf,
}

impl AttachmentStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    #[must_use]
    pub fn file_path(&self, attachment_id: i64, filename: &str) -> PathBuf {
        self.base_path
            .join(format!("{attachment_id}_{}", sanitize_filename(filename)))
    }

    fn temp_path(&self) -> PathBuf {
        self.base_path.join(format!(".tmp-{}", Uuid::new_v4()))
    }

    /// Writes the content, creating the base directory if needed. The file is
    /// written under a temporary name and renamed into place.
    pub async fn put(&self, attachment_id: i64, filename: &str, data: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.base_path).await?;

        let temp_path = self.temp_path();
        let mut temp_file = File::create(&temp_path).await?;
        temp_file.write_all(data).await?;
        temp_file.sync_all().await?;

        let final_path = self.file_path(attachment_id, filename);
        fs::rename(&temp_path, &final_path).await?;

        Ok(final_path)
    }

    /// Reads a stored file back, `None` if it was never written.
    pub async fn get(&self, attachment_id: i64, filename: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.file_path(attachment_id, filename)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Keeps the file name inside the base directory.
fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect()
}
