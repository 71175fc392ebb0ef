//! Client tests for the Corrosion Rust SDK.

use corro_client::{ClientConfig, CorroClient, Error, ScanError, Statement, SubscribeOptions};
use std::time::Duration;

#[test]
fn test_client_config_default() {
  let config = ClientConfig::new("http://localhost:8080");
  assert_eq!(config.url, "http://localhost:8080");
  assert!(config.bearer.is_none());
  assert!(config.connect_timeout.is_none());
}

#[test]
fn test_client_config_with_bearer() {
  let config = ClientConfig::new("http://localhost:8080").with_bearer("Bearer my-secret-token");
  assert_eq!(config.bearer, Some("Bearer my-secret-token".to_string()));
}

#[test]
fn test_error_display() {
  let err = Error::Http("failed to connect".to_string());
  assert_eq!(format!("{}", err), "HTTP error: failed to connect");

  let err = Error::Status {
    status: 500,
    body: "boom".to_string(),
  };
  assert_eq!(format!("{}", err), "Unexpected status 500: boom");

  let err = Error::MissedChange {
    expected: 11.into(),
    got: 13.into(),
  };
  assert_eq!(format!("{}", err), "Missed change: expected 11, got 13");

  let err = Error::MaxRetriesExceeded;
  assert_eq!(format!("{}", err), "Lost connection: max retries exceeded");

  let err = Error::SubscriptionClosed;
  assert_eq!(format!("{}", err), "Subscription closed");

  let err = Error::Remote("database is locked".to_string());
  assert_eq!(format!("{}", err), "Remote error: database is locked");

  let err: Error = ScanError::NotAdvanced.into();
  assert_eq!(format!("{}", err), "Scan error: advance must be called before scan");
}

#[test]
fn test_error_from_io() {
  let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
  let err: Error = io_err.into();
  match err {
    Error::Io(_) => {}
    _ => panic!("Expected Io error"),
  }
}

#[test]
fn test_error_from_json() {
  let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
  let err: Error = json_err.into();
  match err {
    Error::Serialization(_) => {}
    _ => panic!("Expected Serialization error"),
  }
}

#[tokio::test]
async fn test_query_refused() {
  // Try to reach a port that's likely not listening
  let config =
    ClientConfig::new("http://127.0.0.1:59999").with_connect_timeout(Duration::from_secs(2));
  let client = CorroClient::new(config).unwrap();

  let result = client.query(&Statement::new("SELECT 1")).await;
  match result {
    Err(Error::Http(_)) => {}
    other => panic!("Expected Http error, got: {:?}", other.map(|rows| rows.len())),
  }
}

#[tokio::test]
async fn test_subscribe_refused() {
  let client = CorroClient::new(ClientConfig::new("http://127.0.0.1:59999")).unwrap();
  let result = client
    .subscribe(&"SELECT 1".into(), SubscribeOptions::default())
    .await;
  assert!(result.is_err());
}

#[tokio::test]
async fn test_update_schema_refused() {
  let client = CorroClient::new(ClientConfig::new("http://127.0.0.1:59999")).unwrap();
  let result = client
    .update_schema(&[Statement::new("CREATE TABLE t (id INTEGER PRIMARY KEY)")])
    .await;
  assert!(result.is_err());
}
