use std::time::Duration;

use thiserror::Error;

pub use anyhow::Context;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("upstream failure: {0}")]
    UpstreamFailure(String),
    #[error("malformed upstream response: {0}")]
    MalformedUpstreamResponse(String),
    #[error("request queue is full ({depth} pending)")]
    RateLimited { depth: usize },
    #[error("upstream call exceeded its {0:?} deadline")]
    Timeout(Duration),
    #[error("scheduler is no longer running")]
    SchedulerClosed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn message<T: Into<String>>(msg: T) -> Self {
        AppError::Message(msg.into())
    }

    pub fn invalid<T: Into<String>>(msg: T) -> Self {
        AppError::InvalidRequest(msg.into())
    }

    pub fn upstream<T: Into<String>>(msg: T) -> Self {
        AppError::UpstreamFailure(msg.into())
    }

    pub fn malformed<T: Into<String>>(msg: T) -> Self {
        AppError::MalformedUpstreamResponse(msg.into())
    }

    /// True for failures that originate at the data provider rather than in the relay itself.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            AppError::UpstreamFailure(_) | AppError::MalformedUpstreamResponse(_)
        )
    }
}
