//! Corrosion Rust Client SDK
//!
//! An HTTP client for Corrosion with resumable query subscriptions.
//!
//! # Example
//!
//! ```no_run
//! use corro_client::{ClientConfig, CorroClient, Event, Statement, SubscribeOptions};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> corro_client::Result<()> {
//!     let client = CorroClient::new(ClientConfig::new("http://localhost:8080"))?;
//!
//!     // Apply the schema
//!     client
//!         .update_schema(&[Statement::new(
//!             "CREATE TABLE IF NOT EXISTS users (id INTEGER PRIMARY KEY, name TEXT)",
//!         )])
//!         .await?;
//!
//!     // One-shot query
//!     let rows = client.query(&"SELECT id, name FROM users".into()).await?;
//!     while rows.advance() {
//!         let (mut id, mut name) = (0i64, String::new());
//!         rows.scan(&mut [&mut id, &mut name])?;
//!         println!("{} {}", id, name);
//!     }
//!
//!     // Subscribe to changes, resuming transparently on disconnect
//!     let options = SubscribeOptions::new().with_retry(Duration::from_millis(500), 20);
//!     let mut sub = client
//!         .subscribe(&"SELECT id, name FROM users".into(), options)
//!         .await?;
//!     loop {
//!         match sub.next().await? {
//!             Event::Change(change) => println!("{}: {:?}", change.kind, change.row.values()),
//!             event => println!("{:?}", event),
//!         }
//!     }
//! }
//! ```

mod change_id;
mod client;
mod error;
mod event;
pub mod protocol;
mod rows;
mod service;
mod subscription;
mod value;

pub use change_id::ChangeId;
pub use client::{ClientConfig, CorroClient};
pub use error::{Error, Result, ScanError};
pub use event::{decode_event, Change, ChangeKind, EndOfQuery, Event, Row};
pub use protocol::{ExecResponse, ExecResult, Statement};
pub use rows::Rows;
pub use service::{ByteStream, OpenedSubscription, SubscriptionService};
pub use subscription::{
  CloseHandle, SubscribeOptions, Subscription, SubscriptionState, DEFAULT_BACKOFF,
  DEFAULT_BUFFER_SIZE, DEFAULT_MAX_RETRIES,
};
pub use value::{scan_values, Scan, SqliteValue};
