//! Checks the on-disk attachment copies against the blobs in the database.

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::attachments::AttachmentStorage;
use crate::error::Result;
use crate::store::Store;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub checked: u64,
    pub matched: u64,
    pub missing_files: Vec<i64>,
    pub missing_blobs: Vec<i64>,
    pub mismatched: Vec<i64>,
}

impl VerifyReport {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.missing_files.is_empty() && self.missing_blobs.is_empty() && self.mismatched.is_empty()
    }

    #[must_use]
    pub fn failures(&self) -> usize {
        self.missing_files.len() + self.missing_blobs.len() + self.mismatched.len()
    }
}

fn digest(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

pub async fn verify_attachments<S: Store + ?Sized>(
    store: &S,
    storage: &AttachmentStorage,
) -> Result<VerifyReport> {
    let mut report = VerifyReport::default();

    for attachment in store.list_file_attachments()? {
        report.checked += 1;

        let Some(blob) = store.get_file_attachment_blob(attachment.id)? else {
            warn!(attachment_id = attachment.id, "No stored content for attachment");
            report.missing_blobs.push(attachment.id);
            continue;
        };

        let Some(file) = storage.get(attachment.id, &attachment.filename).await? else {
            warn!(
                attachment_id = attachment.id,
                path = %storage.file_path(attachment.id, &attachment.filename).display(),
                "Attachment file is missing"
            );
            report.missing_files.push(attachment.id);
            continue;
        };

        let expected = digest(&blob);
        let actual = digest(&file);
        if expected == actual {
            debug!(attachment_id = attachment.id, sha256 = %expected, "Attachment verified");
            report.matched += 1;
        } else {
            warn!(
                attachment_id = attachment.id,
                %expected,
                %actual,
                "Attachment file differs from stored content"
            );
            report.mismatched.push(attachment.id);
        }
    }

    Ok(report)
}
