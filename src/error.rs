use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("tracker api returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed api response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("migration {name} failed: {reason}")]
    Migration { name: String, reason: String },

    #[error("store is closed")]
    Closed,

    #[error("rate limiter is closed")]
    RateLimiterClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
