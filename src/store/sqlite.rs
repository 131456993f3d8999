use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};

use super::Store;
use super::migrate::{Migration, migrate};
use crate::error::{Error, Result};
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Option<Connection>>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Opens an existing database without write access. Nothing is created
    /// and no pragma is changed, so inspecting an export leaves it as it was.
    pub fn open_read_only<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut guard = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let conn = guard.as_mut().ok_or(Error::Closed)?;
        f(conn)
    }
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn format_optional(dt: Option<&DateTime<Utc>>) -> Option<String> {
    dt.map(format_datetime)
}

fn count(conn: &Connection, table: &str) -> Result<i64> {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })
    .map_err(Error::from)
}

impl Store for SqliteStore {
    fn initialize(&self, migrations: &[Migration]) -> Result<()> {
        self.with_conn(|conn| migrate(conn, migrations).map(|_| ()))
    }

    fn insert_project(&self, project: &Project) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO project (id, name) VALUES (?1, ?2)",
                params![project.id, project.name],
            )?;
            Ok(())
        })
    }

    fn insert_people(&self, people: &[Person]) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO person (id, name, email, initials, username)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for person in people {
                    stmt.execute(params![
                        person.id,
                        person.name,
                        person.email,
                        person.initials,
                        person.username,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn insert_labels(&self, labels: &[Label]) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO label (id, project_id, name, description, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for label in labels {
                    stmt.execute(params![
                        label.id,
                        label.project_id,
                        label.name,
                        label.description,
                        format_optional(label.created_at.as_ref()),
                        format_optional(label.updated_at.as_ref()),
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    // Story operations

    fn insert_story(&self, story: &Story) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO story (id, project_id, name, description, story_type, current_state,
                                    estimate, accepted_at, created_at, owned_by_id, requested_by_id,
                                    updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    story.id,
                    story.project_id,
                    story.name,
                    story.description,
                    story.story_type,
                    story.current_state,
                    story.estimate,
                    format_optional(story.accepted_at.as_ref()),
                    format_datetime(&story.created_at),
                    story.owned_by_id,
                    story.requested_by_id,
                    format_optional(story.updated_at.as_ref()),
                ],
            )?;
            Ok(())
        })
    }

    fn insert_story_owners(&self, story_id: i64, person_ids: &[i64]) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt =
                    tx.prepare("INSERT INTO story_owner (story_id, person_id) VALUES (?1, ?2)")?;
                for person_id in person_ids {
                    stmt.execute(params![story_id, person_id])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn insert_story_labels(&self, story_id: i64, label_ids: &[i64]) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt =
                    tx.prepare("INSERT INTO story_label (story_id, label_id) VALUES (?1, ?2)")?;
                for label_id in label_ids {
                    stmt.execute(params![story_id, label_id])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn insert_comments(&self, comments: &[Comment]) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO story_comment (id, story_id, text, person_id, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for comment in comments {
                    stmt.execute(params![
                        comment.id,
                        comment.story_id,
                        comment.text,
                        comment.person_id,
                        format_datetime(&comment.created_at),
                        format_optional(comment.updated_at.as_ref()),
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    // Attachment operations

    fn insert_file_attachment(&self, attachment: &FileAttachment, comment_id: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO file_attachment (id, filename, content_type, size, download_url,
                                              uploader_id, created_at, comment_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    attachment.id,
                    attachment.filename,
                    attachment.content_type,
                    attachment.size,
                    attachment.download_url,
                    attachment.uploader_id,
                    format_optional(attachment.created_at.as_ref()),
                    comment_id,
                ],
            )?;
            Ok(())
        })
    }

    fn insert_file_attachment_file(&self, attachment_id: i64, blob: &[u8]) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO file_attachment_file (file_attachment_id, blob) VALUES (?1, ?2)",
                params![attachment_id, blob],
            )?;
            Ok(())
        })
    }

    fn list_file_attachments(&self) -> Result<Vec<StoredAttachment>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, filename, size, comment_id FROM file_attachment ORDER BY id",
            )?;

            let rows = stmt.query_map([], |row| {
                Ok(StoredAttachment {
                    id: row.get(0)?,
                    filename: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    size: row.get(2)?,
                    comment_id: row.get(3)?,
                })
            })?;

            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Error::from)
        })
    }

    fn get_file_attachment_blob(&self, attachment_id: i64) -> Result<Option<Vec<u8>>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT blob FROM file_attachment_file WHERE file_attachment_id = ?1",
                params![attachment_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(Error::from)
        })
    }

    fn table_counts(&self) -> Result<TableCounts> {
        self.with_conn(|conn| {
            Ok(TableCounts {
                project: count(conn, "project")?,
                person: count(conn, "person")?,
                label: count(conn, "label")?,
                story: count(conn, "story")?,
                story_owner: count(conn, "story_owner")?,
                story_label: count(conn, "story_label")?,
                story_comment: count(conn, "story_comment")?,
                file_attachment: count(conn, "file_attachment")?,
                file_attachment_file: count(conn, "file_attachment_file")?,
            })
        })
    }

    fn close(&self) -> Result<()> {
        let mut guard = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        match guard.take() {
            Some(conn) => conn.close().map_err(|(_, e)| Error::from(e)),
            None => Ok(()),
        }
    }
}
