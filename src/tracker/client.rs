use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, ClientBuilder, RequestBuilder, Response, Url, redirect};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::TrackerApi;
use super::pagination::Page;
use super::rate_limit::RateLimiter;
use crate::error::{Error, Result};
use crate::types::{Comment, Label, Membership, Project, Story};

pub const DEFAULT_TRACKER_HOST: &str = "https://www.pivotaltracker.com";

const TOKEN_HEADER: &str = "x-trackertoken";
const PAGINATION_TOTAL_HEADER: &str = "x-tracker-pagination-total";
const MAX_REDIRECTS: usize = 10;

const STORY_FIELDS: &str = "id,created_at,updated_at,accepted_at,estimate,story_type,story_priority,name,description,current_state,requested_by_id,url,project_id,owner_ids,labels,owned_by_id,blockers";
const COMMENT_FIELDS: &str = "id,story_id,text,person_id,created_at,updated_at,file_attachments";

/// HTTP client for the Tracker v5 API. Every request, downloads included, is
/// admitted through the shared [`RateLimiter`].
///
/// The token is only ever sent to the Tracker host. API calls stop at a
/// redirect to another origin; attachment downloads follow it without the
/// token, since Tracker hands the content off to blob storage.
#[derive(Clone)]
pub struct TrackerClient {
    client: Client,
    downloads: Client,
    host: String,
    base: Url,
    token: HeaderValue,
    limiter: Arc<RateLimiter>,
}

fn client_builder(timeout: Option<Duration>) -> ClientBuilder {
    let builder = Client::builder();
    match timeout {
        Some(timeout) => builder.timeout(timeout),
        None => builder,
    }
}

impl TrackerClient {
    /// `timeout` bounds each whole request, body included. `None` leaves only
    /// the transport's own limits in place.
    pub fn new(
        host: &str,
        token: &str,
        timeout: Option<Duration>,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self> {
        let host = host.trim_end_matches('/').to_string();
        let base = Url::parse(&host)
            .map_err(|e| Error::Config(format!("invalid tracker url {host:?}: {e}")))?;

        let mut token = HeaderValue::from_str(token)
            .map_err(|e| Error::Config(format!("tracker token is not a valid header: {e}")))?;
        token.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(TOKEN_HEADER, token.clone());
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        let origin = base.origin();
        let same_origin = redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else if attempt.url().origin() == origin {
                attempt.follow()
            } else {
                attempt.stop()
            }
        });

        let client = client_builder(timeout)
            .default_headers(headers)
            .redirect(same_origin)
            .build()?;
        let downloads = client_builder(timeout)
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            downloads,
            host,
            base,
            token,
            limiter,
        })
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/services/v5{}", self.host, path)
    }

    fn is_tracker_url(&self, url: &Url) -> bool {
        url.origin() == self.base.origin()
    }

    async fn get_json<T: DeserializeOwned + Send>(&self, request: RequestBuilder) -> Result<T> {
        self.limiter
            .schedule(move || async move {
                let response = send(request).await?;
                let body = response.bytes().await?;
                Ok(serde_json::from_slice(&body)?)
            })
            .await
    }

    /// Follows redirects by hand so the token stays on the Tracker origin.
    async fn download(&self, mut url: Url) -> Result<Bytes> {
        let mut hops = 0;
        loop {
            let mut request = self.downloads.get(url.clone());
            if self.is_tracker_url(&url) {
                request = request.header(TOKEN_HEADER, self.token.clone());
            }
            let response = request.send().await?;
            let status = response.status();

            let location = status
                .is_redirection()
                .then(|| response.headers().get(header::LOCATION))
                .flatten()
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned);

            let Some(location) = location else {
                let response = check_status(response).await?;
                return Ok(response.bytes().await?);
            };

            if hops == MAX_REDIRECTS {
                return Err(Error::Api {
                    status: status.as_u16(),
                    body: format!("too many redirects downloading {url}"),
                });
            }
            hops += 1;

            let next = url.join(&location).map_err(|e| Error::Api {
                status: status.as_u16(),
                body: format!("invalid redirect location {location:?}: {e}"),
            })?;
            debug!(from = %url, to = %next, "Following download redirect");
            url = next;
        }
    }
}

async fn send(request: RequestBuilder) -> Result<Response> {
    check_status(request.send().await?).await
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    debug!(url = %response.url(), %status, "Tracker response");

    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(Error::Api {
        status: status.as_u16(),
        body,
    })
}

/// Parses the pagination total header; absent or malformed means 0.
fn parse_total(headers: &HeaderMap) -> u64 {
    headers
        .get(PAGINATION_TOTAL_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(0)
}

#[async_trait]
impl TrackerApi for TrackerClient {
    async fn fetch_project(&self, project_id: i64) -> Result<Project> {
        let request = self
            .client
            .get(self.api_url(&format!("/projects/{project_id}")));
        self.get_json(request).await
    }

    async fn fetch_memberships(&self, project_id: i64) -> Result<Vec<Membership>> {
        let request = self
            .client
            .get(self.api_url(&format!("/projects/{project_id}/memberships")));
        self.get_json(request).await
    }

    async fn fetch_labels(&self, project_id: i64) -> Result<Vec<Label>> {
        let request = self
            .client
            .get(self.api_url(&format!("/projects/{project_id}/labels")));
        self.get_json(request).await
    }

    async fn fetch_stories_page(
        &self,
        project_id: i64,
        offset: u64,
        limit: u64,
    ) -> Result<Page<Story>> {
        let request = self
            .client
            .get(self.api_url(&format!("/projects/{project_id}/stories")))
            .query(&[
                ("fields", STORY_FIELDS.to_string()),
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
            ]);

        self.limiter
            .schedule(move || async move {
                let response = send(request).await?;
                let total = parse_total(response.headers());
                let body = response.bytes().await?;
                Ok(Page {
                    items: serde_json::from_slice(&body)?,
                    total,
                })
            })
            .await
    }

    async fn fetch_comments(&self, project_id: i64, story_id: i64) -> Result<Vec<Comment>> {
        let request = self
            .client
            .get(self.api_url(&format!(
                "/projects/{project_id}/stories/{story_id}/comments"
            )))
            .query(&[("fields", COMMENT_FIELDS)]);
        self.get_json(request).await
    }

    async fn download_attachment(&self, attachment_id: i64) -> Result<Bytes> {
        let url = format!("{}/file_attachments/{attachment_id}/download", self.host);
        let url = Url::parse(&url)
            .map_err(|e| Error::Config(format!("invalid download url {url:?}: {e}")))?;

        self.limiter.schedule(|| self.download(url)).await
    }

    fn close(&self) {
        self.limiter.close();
    }
}
