//! In-process fake of the Tracker v5 API, served by axum on a random port.
//!
//! Project 42 has two members, one label and a configurable number of
//! stories. Story 100 carries two comments; the second one has attachment 500
//! (`notes.txt`, content `hello`). Downloads redirect to a second server
//! standing in for blob storage, on another port.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};

pub const PROJECT_ID: i64 = 42;
pub const TOKEN: &str = "test-token";
pub const ATTACHMENT_ID: i64 = 500;
pub const ATTACHMENT_FILENAME: &str = "notes.txt";
pub const ATTACHMENT_CONTENT: &[u8] = b"hello";

const TIMESTAMP: &str = "2024-01-02T03:04:05Z";

struct TrackerState {
    stories: usize,
    blob_url: String,
    blob_delay: Duration,
    requests: AtomicUsize,
    story_requests: AtomicUsize,
    blob_requests: AtomicUsize,
    leaked_tokens: AtomicUsize,
}

pub struct FakeTracker {
    pub base_url: String,
    state: Arc<TrackerState>,
}

impl FakeTracker {
    pub async fn start(stories: usize) -> Self {
        Self::start_with_blob_delay(stories, Duration::ZERO).await
    }

    /// Like [`FakeTracker::start`], with blob storage waiting `blob_delay`
    /// before answering.
    pub async fn start_with_blob_delay(stories: usize, blob_delay: Duration) -> Self {
        let blob_listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind blob storage");
        let blob_addr = blob_listener.local_addr().expect("blob local addr");

        let state = Arc::new(TrackerState {
            stories,
            blob_url: format!("http://{blob_addr}"),
            blob_delay,
            requests: AtomicUsize::new(0),
            story_requests: AtomicUsize::new(0),
            blob_requests: AtomicUsize::new(0),
            leaked_tokens: AtomicUsize::new(0),
        });

        let blobs = Router::new()
            .route("/blobs/{attachment_id}", get(blob))
            .with_state(state.clone());
        tokio::spawn(async move {
            axum::serve(blob_listener, blobs)
                .await
                .expect("serve blob storage");
        });

        let app = Router::new()
            .route("/services/v5/projects/{project_id}", get(project))
            .route(
                "/services/v5/projects/{project_id}/memberships",
                get(memberships),
            )
            .route("/services/v5/projects/{project_id}/labels", get(labels))
            .route("/services/v5/projects/{project_id}/stories", get(self::stories))
            .route(
                "/services/v5/projects/{project_id}/stories/{story_id}/comments",
                get(comments),
            )
            .route("/file_attachments/{attachment_id}/download", get(download))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve fake tracker");
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    pub fn requests(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    pub fn story_requests(&self) -> usize {
        self.state.story_requests.load(Ordering::SeqCst)
    }

    pub fn blob_requests(&self) -> usize {
        self.state.blob_requests.load(Ordering::SeqCst)
    }

    /// Requests that reached blob storage carrying the Tracker token.
    pub fn leaked_tokens(&self) -> usize {
        self.state.leaked_tokens.load(Ordering::SeqCst)
    }
}

fn authorize(state: &TrackerState, headers: &HeaderMap) -> Result<(), StatusCode> {
    state.requests.fetch_add(1, Ordering::SeqCst);
    match headers.get("x-trackertoken").and_then(|v| v.to_str().ok()) {
        Some(TOKEN) => Ok(()),
        _ => Err(StatusCode::FORBIDDEN),
    }
}

fn known_project(project_id: i64) -> Result<(), StatusCode> {
    if project_id == PROJECT_ID {
        Ok(())
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

fn label_json() -> Value {
    json!({
        "id": 9,
        "project_id": PROJECT_ID,
        "name": "backend",
        "created_at": TIMESTAMP,
        "updated_at": TIMESTAMP,
        "kind": "label"
    })
}

fn story_json(index: usize) -> Value {
    json!({
        "id": (100 + index as i64),
        "project_id": PROJECT_ID,
        "name": format!("Story {index}"),
        "description": "As a user I want things",
        "story_type": "feature",
        "current_state": "accepted",
        "estimate": 2.0,
        "accepted_at": TIMESTAMP,
        "created_at": TIMESTAMP,
        "updated_at": TIMESTAMP,
        "requested_by_id": 7,
        "owned_by_id": 7,
        "owner_ids": [7],
        "labels": [label_json()],
        "url": format!("https://www.pivotaltracker.com/story/show/{}", 100 + index)
    })
}

async fn project(
    State(state): State<Arc<TrackerState>>,
    Path(project_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    authorize(&state, &headers)?;
    known_project(project_id)?;
    Ok(Json(json!({ "id": PROJECT_ID, "name": "Demo project", "kind": "project" })))
}

async fn memberships(
    State(state): State<Arc<TrackerState>>,
    Path(project_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    authorize(&state, &headers)?;
    known_project(project_id)?;
    Ok(Json(json!([
        {
            "id": 1,
            "role": "owner",
            "person": { "id": 7, "name": "Ada Lovelace", "email": "ada@example.com", "initials": "AL", "username": "ada" }
        },
        {
            "id": 2,
            "role": "member",
            "person": { "id": 8, "name": "Charles Babbage", "initials": "CB", "username": "charles" }
        }
    ])))
}

async fn labels(
    State(state): State<Arc<TrackerState>>,
    Path(project_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    authorize(&state, &headers)?;
    known_project(project_id)?;
    Ok(Json(json!([label_json()])))
}

#[derive(Deserialize)]
struct PageQuery {
    offset: Option<usize>,
    limit: Option<usize>,
}

async fn stories(
    State(state): State<Arc<TrackerState>>,
    Path(project_id): Path<i64>,
    Query(page): Query<PageQuery>,
    headers: HeaderMap,
) -> Result<Response, StatusCode> {
    authorize(&state, &headers)?;
    known_project(project_id)?;
    state.story_requests.fetch_add(1, Ordering::SeqCst);

    let offset = page.offset.unwrap_or(0);
    let limit = page.limit.unwrap_or(100);
    let items: Vec<Value> = (0..state.stories)
        .skip(offset)
        .take(limit)
        .map(story_json)
        .collect();

    Ok((
        [("x-tracker-pagination-total", state.stories.to_string())],
        Json(Value::Array(items)),
    )
        .into_response())
}

async fn comments(
    State(state): State<Arc<TrackerState>>,
    Path((project_id, story_id)): Path<(i64, i64)>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    authorize(&state, &headers)?;
    known_project(project_id)?;
    if story_id != 100 {
        return Ok(Json(json!([])));
    }

    Ok(Json(json!([
        {
            "id": 1,
            "story_id": 100,
            "text": "Looks good",
            "person_id": 7,
            "created_at": TIMESTAMP,
            "updated_at": TIMESTAMP
        },
        {
            "id": 2,
            "story_id": 100,
            "text": "See attached",
            "person_id": 8,
            "created_at": TIMESTAMP,
            "file_attachments": [
                {
                    "id": ATTACHMENT_ID,
                    "filename": ATTACHMENT_FILENAME,
                    "content_type": "text/plain",
                    "size": ATTACHMENT_CONTENT.len(),
                    "download_url": format!("/file_attachments/{ATTACHMENT_ID}/download"),
                    "uploader_id": 8,
                    "created_at": TIMESTAMP
                }
            ]
        }
    ])))
}

async fn download(
    State(state): State<Arc<TrackerState>>,
    Path(attachment_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Redirect, StatusCode> {
    authorize(&state, &headers)?;
    if attachment_id != ATTACHMENT_ID {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Redirect::to(&format!(
        "{}/blobs/{attachment_id}?signature=abc",
        state.blob_url
    )))
}

async fn blob(
    State(state): State<Arc<TrackerState>>,
    Path(attachment_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Vec<u8>, StatusCode> {
    state.blob_requests.fetch_add(1, Ordering::SeqCst);
    if headers.contains_key("x-trackertoken") {
        state.leaked_tokens.fetch_add(1, Ordering::SeqCst);
    }
    if !state.blob_delay.is_zero() {
        tokio::time::sleep(state.blob_delay).await;
    }
    if attachment_id != ATTACHMENT_ID {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(ATTACHMENT_CONTENT.to_vec())
}
