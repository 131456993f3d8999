pub mod migrate;
pub mod schema;
mod sqlite;

pub use migrate::Migration;
pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::*;

/// Store defines the append-only sink the export writes into.
///
/// Inserts must be issued parent-first: the backing database enforces
/// foreign keys at insert time and a violation aborts the export.
pub trait Store: Send + Sync {
    fn initialize(&self, migrations: &[Migration]) -> Result<()>;

    fn insert_project(&self, project: &Project) -> Result<()>;
    fn insert_people(&self, people: &[Person]) -> Result<()>;
    fn insert_labels(&self, labels: &[Label]) -> Result<()>;

    // Story operations
    fn insert_story(&self, story: &Story) -> Result<()>;
    fn insert_story_owners(&self, story_id: i64, person_ids: &[i64]) -> Result<()>;
    fn insert_story_labels(&self, story_id: i64, label_ids: &[i64]) -> Result<()>;
    fn insert_comments(&self, comments: &[Comment]) -> Result<()>;

    // Attachment operations
    fn insert_file_attachment(&self, attachment: &FileAttachment, comment_id: i64) -> Result<()>;
    fn insert_file_attachment_file(&self, attachment_id: i64, blob: &[u8]) -> Result<()>;
    fn list_file_attachments(&self) -> Result<Vec<StoredAttachment>>;
    fn get_file_attachment_blob(&self, attachment_id: i64) -> Result<Option<Vec<u8>>>;

    fn table_counts(&self) -> Result<TableCounts>;

    fn close(&self) -> Result<()>;
}
