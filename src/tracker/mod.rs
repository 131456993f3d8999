//! Access to the Pivotal Tracker v5 REST API.

mod client;
pub mod pagination;
pub mod rate_limit;

pub use client::{DEFAULT_TRACKER_HOST, TrackerClient};
pub use pagination::{Page, PageSource, Paginator};
pub use rate_limit::{RateLimit, RateLimiter};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::types::{Comment, Label, Membership, Project, Story};

/// The read-only Tracker operations an export needs.
#[async_trait]
pub trait TrackerApi: Send + Sync {
    async fn fetch_project(&self, project_id: i64) -> Result<Project>;

    async fn fetch_memberships(&self, project_id: i64) -> Result<Vec<Membership>>;

    async fn fetch_labels(&self, project_id: i64) -> Result<Vec<Label>>;

    /// Fetches one page of stories. The page total is the collection size
    /// reported by the server, or 0 when it did not report one.
    async fn fetch_stories_page(
        &self,
        project_id: i64,
        offset: u64,
        limit: u64,
    ) -> Result<Page<Story>>;

    async fn fetch_comments(&self, project_id: i64, story_id: i64) -> Result<Vec<Comment>>;

    async fn download_attachment(&self, attachment_id: i64) -> Result<Bytes>;

    /// Called once when an export ends, successfully or not. No request may
    /// be issued afterwards.
    fn close(&self) {}
}

/// Pages through a project's stories.
pub struct StoryPages<'a, A: ?Sized> {
    api: &'a A,
    project_id: i64,
}

impl<'a, A: TrackerApi + ?Sized> StoryPages<'a, A> {
    pub fn new(api: &'a A, project_id: i64) -> Self {
        Self { api, project_id }
    }
}

#[async_trait]
impl<A: TrackerApi + ?Sized> PageSource for StoryPages<'_, A> {
    type Item = Story;

    async fn fetch_page(&self, offset: u64, limit: u64) -> Result<Page<Story>> {
        self.api
            .fetch_stories_page(self.project_id, offset, limit)
            .await
    }
}
