//! Error types for the Corrosion client SDK.

use thiserror::Error;

use crate::change_id::ChangeId;

#[derive(Error, Debug)]
pub enum Error {
  #[error("HTTP error: {0}")]
  Http(String),

  #[error("Unexpected status {status}: {body}")]
  Status { status: u16, body: String },

  #[error("Missing response header: {0}")]
  MissingHeader(&'static str),

  #[error("Configuration error: {0}")]
  Configuration(String),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("Serialization error: {0}")]
  Serialization(String),

  #[error("Malformed frame: {0}")]
  MalformedFrame(String),

  #[error("Unknown event in subscription")]
  UnknownEvent,

  #[error("Missed change: expected {expected}, got {got}")]
  MissedChange { expected: ChangeId, got: ChangeId },

  #[error("Row has {values} values but schema has {columns} columns")]
  SchemaMismatch { columns: usize, values: usize },

  #[error("Remote error: {0}")]
  Remote(String),

  #[error("Unrecoverable subscription")]
  UnrecoverableSubscription,

  #[error("Subscription not found")]
  SubscriptionNotFound,

  #[error("Lost connection: max retries exceeded")]
  MaxRetriesExceeded,

  #[error("Subscription closed")]
  SubscriptionClosed,

  #[error("Scan error: {0}")]
  Scan(#[from] ScanError),
}

/// Caller misuse reported by `scan`. Never fatal to a subscription.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScanError {
  #[error("expected {expected} destinations, got {got}")]
  DestinationCount { expected: usize, got: usize },

  #[error("cannot scan {value} into {target}")]
  Coercion { value: String, target: &'static str },

  #[error("advance must be called before scan")]
  NotAdvanced,
}

impl ScanError {
  pub(crate) fn coercion(value: impl std::fmt::Display, target: &'static str) -> Self {
    Self::Coercion {
      value: value.to_string(),
      target,
    }
  }
}

impl From<serde_json::Error> for Error {
  fn from(e: serde_json::Error) -> Self {
    Self::Serialization(e.to_string())
  }
}

impl From<reqwest::Error> for Error {
  fn from(e: reqwest::Error) -> Self {
    match e.status() {
      Some(status) => Self::Status {
        status: status.as_u16(),
        body: e.to_string(),
      },
      None => Self::Http(e.to_string()),
    }
  }
}

pub type Result<T> = std::result::Result<T, Error>;
