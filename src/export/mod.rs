//! Dependency-ordered export of one project.
//!
//! The export runs strictly in order: schema, project, people, labels, then
//! every story with its owners, labels, comments and attachments. Parents are
//! always written before their children, one story at a time. Any failure
//! aborts the run; rows written so far are left in place.

pub mod progress;

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info};

pub use progress::{LogProgress, ProgressReporter};

use crate::attachments::AttachmentStorage;
use crate::error::Result;
use crate::store::{Migration, Store};
use crate::tracker::{Paginator, StoryPages, TrackerApi};
use crate::types::{Comment, FileAttachment, Story};

pub const DEFAULT_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub project_id: i64,
    pub page_size: u64,
    pub migrations: Vec<Migration>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub project_name: String,
    pub people: u64,
    pub skipped_people: u64,
    pub labels: u64,
    pub stories: u64,
    pub story_owners: u64,
    pub story_labels: u64,
    pub comments: u64,
    pub attachments: u64,
    pub files_written: u64,
}

pub struct Exporter<'a, A: ?Sized, S: ?Sized> {
    api: &'a A,
    store: &'a S,
    progress: &'a mut dyn ProgressReporter,
    attachments: Option<&'a AttachmentStorage>,
    options: ExportOptions,
    seen_people: HashSet<i64>,
    summary: ExportSummary,
}

impl<'a, A, S> Exporter<'a, A, S>
where
    A: TrackerApi + ?Sized,
    S: Store + ?Sized,
{
    pub fn new(
        api: &'a A,
        store: &'a S,
        progress: &'a mut dyn ProgressReporter,
        options: ExportOptions,
    ) -> Self {
        Self {
            api,
            store,
            progress,
            attachments: None,
            options,
            seen_people: HashSet::new(),
            summary: ExportSummary::default(),
        }
    }

    /// Additionally writes every downloaded attachment to `storage`.
    #[must_use]
    pub fn with_attachment_storage(mut self, storage: &'a AttachmentStorage) -> Self {
        self.attachments = Some(storage);
        self
    }

    pub async fn run(mut self) -> Result<ExportSummary> {
        let result = self.export().await;
        self.api.close();
        result.map(|()| self.summary)
    }

    async fn export(&mut self) -> Result<()> {
        self.store.initialize(&self.options.migrations)?;

        info!("Start dumping data from Pivotal Tracker");

        self.export_project().await?;
        self.export_people().await?;
        self.export_labels().await?;
        self.export_stories().await?;

        self.store.close()?;
        info!("Dumping data from Pivotal Tracker is done");

        Ok(())
    }

    async fn export_project(&mut self) -> Result<()> {
        let project = self.api.fetch_project(self.options.project_id).await?;
        self.store.insert_project(&project)?;
        info!("Project: {}", project.name);
        self.summary.project_name = project.name;
        Ok(())
    }

    async fn export_people(&mut self) -> Result<()> {
        let memberships = self.api.fetch_memberships(self.options.project_id).await?;
        let fetched = memberships.len();

        let mut people = Vec::with_capacity(fetched);
        for membership in memberships {
            if self.seen_people.insert(membership.person.id) {
                people.push(membership.person);
            } else {
                debug!(
                    person_id = membership.person.id,
                    "Skipping person already exported"
                );
                self.summary.skipped_people += 1;
            }
        }

        if !people.is_empty() {
            self.store.insert_people(&people)?;
        }
        self.summary.people = people.len() as u64;
        info!("Fetched {fetched} memberships");
        Ok(())
    }

    async fn export_labels(&mut self) -> Result<()> {
        let labels = self.api.fetch_labels(self.options.project_id).await?;
        if !labels.is_empty() {
            self.store.insert_labels(&labels)?;
        }
        self.summary.labels = labels.len() as u64;
        info!("Fetched {} labels", labels.len());
        Ok(())
    }

    async fn export_stories(&mut self) -> Result<()> {
        let pages = StoryPages::new(self.api, self.options.project_id);
        let mut stories = Paginator::new(pages, self.options.page_size);
        let mut reported_total = None;

        while let Some(story) = stories.next().await? {
            let total = stories.total().unwrap_or_default();
            match reported_total {
                None => self.progress.start(total),
                Some(previous) if previous != total => self.progress.set_total(total),
                Some(_) => {}
            }
            reported_total = Some(total);

            self.export_story(&story).await?;
            self.summary.stories += 1;
            self.progress.increment();
        }

        if reported_total.is_some() {
            self.progress.stop();
        }

        info!(
            requests = stories.requests(),
            "Fetched {} stories", self.summary.stories
        );
        Ok(())
    }

    async fn export_story(&mut self, story: &Story) -> Result<()> {
        self.store.insert_story(story)?;
        self.report(&format!("Inserted story: {}", story.name));

        if !story.owner_ids.is_empty() {
            self.store.insert_story_owners(story.id, &story.owner_ids)?;
            self.summary.story_owners += story.owner_ids.len() as u64;
            self.report(&format!(
                "Inserted {} owners for #{}",
                story.owner_ids.len(),
                story.id
            ));
        }

        if !story.labels.is_empty() {
            let label_ids: Vec<i64> = story.labels.iter().map(|label| label.id).collect();
            self.store.insert_story_labels(story.id, &label_ids)?;
            self.summary.story_labels += label_ids.len() as u64;
            self.report(&format!(
                "Inserted {} labels for #{}",
                label_ids.len(),
                story.id
            ));
        }

        let comments = self
            .api
            .fetch_comments(self.options.project_id, story.id)
            .await?;
        if comments.is_empty() {
            return Ok(());
        }

        self.export_comments(story.id, &comments).await
    }

    async fn export_comments(&mut self, story_id: i64, comments: &[Comment]) -> Result<()> {
        self.store.insert_comments(comments)?;
        self.summary.comments += comments.len() as u64;
        self.report(&format!(
            "Inserted {} comments for #{story_id}",
            comments.len()
        ));

        for comment in comments {
            for attachment in &comment.file_attachments {
                self.export_attachment(comment.id, attachment).await?;
            }
        }
        Ok(())
    }

    async fn export_attachment(
        &mut self,
        comment_id: i64,
        attachment: &FileAttachment,
    ) -> Result<()> {
        let content = self.api.download_attachment(attachment.id).await?;
        self.report(&format!(
            "Downloaded file attachment: {}",
            attachment.filename
        ));

        self.store.insert_file_attachment(attachment, comment_id)?;
        self.store.insert_file_attachment_file(attachment.id, &content)?;
        self.summary.attachments += 1;
        self.report(&format!(
            "Inserted file attachment: {}",
            attachment.filename
        ));

        if let Some(storage) = self.attachments {
            let path = storage
                .put(attachment.id, &attachment.filename, &content)
                .await?;
            debug!(path = %path.display(), "Wrote file attachment");
            self.summary.files_written += 1;
        }

        Ok(())
    }

    fn report(&mut self, message: &str) {
        self.progress.update(message);
    }
}
