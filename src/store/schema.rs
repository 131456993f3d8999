use super::migrate::Migration;

const INITIAL: &str = r#"
CREATE TABLE IF NOT EXISTS project (
    id INTEGER PRIMARY KEY NOT NULL,
    name TEXT NOT NULL
);

-- Person ids are referenced by stories and comments but not declared as
-- foreign keys: former members are absent from the membership list.
CREATE TABLE IF NOT EXISTS person (
    id INTEGER PRIMARY KEY NOT NULL,
    name TEXT,
    email TEXT,
    initials TEXT,
    username TEXT
);

CREATE TABLE IF NOT EXISTS label (
    id INTEGER PRIMARY KEY NOT NULL,
    project_id INTEGER NOT NULL REFERENCES project(id),
    name TEXT NOT NULL,
    description TEXT,
    created_at TEXT,
    updated_at TEXT
);

CREATE TABLE IF NOT EXISTS story (
    id INTEGER PRIMARY KEY NOT NULL,
    project_id INTEGER NOT NULL REFERENCES project(id),
    name TEXT NOT NULL,
    description TEXT,
    story_type TEXT NOT NULL,
    current_state TEXT NOT NULL,
    estimate REAL,
    accepted_at TEXT,
    created_at TEXT NOT NULL,
    owned_by_id INTEGER,
    requested_by_id INTEGER NOT NULL,
    updated_at TEXT
);

-- Join tables carry a surrogate key and no uniqueness constraint
CREATE TABLE IF NOT EXISTS story_owner (
    _id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    story_id INTEGER NOT NULL REFERENCES story(id),
    person_id INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS story_label (
    _id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    story_id INTEGER NOT NULL REFERENCES story(id),
    label_id INTEGER NOT NULL REFERENCES label(id)
);

CREATE TABLE IF NOT EXISTS story_comment (
    id INTEGER PRIMARY KEY NOT NULL,
    story_id INTEGER NOT NULL REFERENCES story(id),
    text TEXT,
    person_id INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT
);

CREATE TABLE IF NOT EXISTS file_attachment (
    id INTEGER PRIMARY KEY NOT NULL,
    filename TEXT,
    content_type TEXT,
    size INTEGER,
    download_url TEXT,
    uploader_id INTEGER,
    created_at TEXT,
    comment_id INTEGER REFERENCES story_comment(id)
);

-- Blobs live apart from metadata so listing attachments stays cheap
CREATE TABLE IF NOT EXISTS file_attachment_file (
    file_attachment_id INTEGER PRIMARY KEY NOT NULL REFERENCES file_attachment(id),
    blob BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS story_idx_1 ON story_owner(story_id);
CREATE INDEX IF NOT EXISTS story_label_idx_1 ON story_label(story_id);
CREATE INDEX IF NOT EXISTS story_label_idx_2 ON story_label(label_id);
CREATE INDEX IF NOT EXISTS story_comment_idx_1 ON story_comment(story_id);
CREATE INDEX IF NOT EXISTS file_attachment_idx_1 ON file_attachment(comment_id);
"#;

/// Migrations compiled into the binary, in application order.
#[must_use]
pub fn embedded() -> Vec<Migration> {
    vec![Migration::new(1, "initial", INITIAL)]
}
