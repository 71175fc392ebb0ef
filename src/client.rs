//! HTTP client for the Corrosion API.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::io::StreamReader;

use crate::change_id::ChangeId;
use crate::error::{Error, Result};
use crate::protocol::{
  ExecResponse, Statement, MIGRATIONS_PATH, QUERIES_PATH, QUERY_ID_HEADER, SUBSCRIPTIONS_PATH,
  SUB_HASH_HEADER, TRANSACTIONS_PATH,
};
use crate::rows::Rows;
use crate::service::{ByteStream, OpenedSubscription, SubscriptionService};
use crate::subscription::{SubscribeOptions, Subscription};

/// Connection options for [`CorroClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
  pub url: String,
  pub bearer: Option<String>,
  pub connect_timeout: Option<Duration>,
}

impl ClientConfig {
  pub fn new(url: impl Into<String>) -> Self {
    Self {
      url: url.into(),
      bearer: None,
      connect_timeout: None,
    }
  }

  /// Value sent verbatim as the `Authorization` header.
  pub fn with_bearer(mut self, bearer: impl Into<String>) -> Self {
    self.bearer = Some(bearer.into());
    self
  }

  pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
    self.connect_timeout = Some(timeout);
    self
  }
}

/// Corrosion API client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CorroClient {
  http: reqwest::Client,
  url: String,
  bearer: Option<String>,
}

impl CorroClient {
  pub fn new(config: ClientConfig) -> Result<Self> {
    let url = config.url.trim().trim_end_matches('/').to_string();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
      return Err(Error::Configuration(format!(
        "url must start with http:// or https://, got '{}'",
        config.url
      )));
    }

    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = config.connect_timeout {
      builder = builder.connect_timeout(timeout);
    }
    let http = builder
      .build()
      .map_err(|e| Error::Configuration(e.to_string()))?;

    Ok(Self {
      http,
      url,
      bearer: config.bearer,
    })
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  fn request(&self, method: Method, path: &str) -> RequestBuilder {
    let url = format!("{}{}", self.url, path);
    log::debug!("[corro-client] {} {}", method, url);

    let mut req = self.http.request(method, url).header(ACCEPT, "application/json");
    if let Some(bearer) = &self.bearer {
      req = req.header(AUTHORIZATION, bearer);
    }
    req
  }

  /// Apply schema statements through `/v1/migrations`.
  pub async fn update_schema(&self, statements: &[Statement]) -> Result<ExecResponse> {
    self.exec(MIGRATIONS_PATH, statements).await
  }

  /// Run statements in a single transaction through `/v1/transactions`.
  pub async fn execute(&self, statements: &[Statement]) -> Result<ExecResponse> {
    self.exec(TRANSACTIONS_PATH, statements).await
  }

  async fn exec(&self, path: &str, statements: &[Statement]) -> Result<ExecResponse> {
    let resp = self
      .request(Method::POST, path)
      .json(statements)
      .send()
      .await?;
    let resp = check_status(resp).await?;
    Ok(resp.json::<ExecResponse>().await?)
  }

  /// Run a one-shot query and buffer its full result.
  pub async fn query(&self, statement: &Statement) -> Result<Rows> {
    let resp = self
      .request(Method::POST, QUERIES_PATH)
      .json(statement)
      .send()
      .await?;
    let resp = check_status(resp).await?;
    Rows::read_from(byte_stream(resp)).await
  }

  /// Open a resumable subscription on `statement`.
  pub async fn subscribe(
    &self,
    statement: &Statement,
    options: SubscribeOptions,
  ) -> Result<Subscription> {
    Subscription::open(Arc::new(self.clone()), statement, options).await
  }
}

#[async_trait]
impl SubscriptionService for CorroClient {
  async fn open_subscription(
    &self,
    statement: &Statement,
    skip_rows: bool,
  ) -> Result<OpenedSubscription> {
    let path = format!("{}?skip_rows={}", SUBSCRIPTIONS_PATH, skip_rows);
    let resp = self.request(Method::POST, &path).json(statement).send().await?;
    let resp = check_status(resp).await?;

    let id = header(&resp, QUERY_ID_HEADER)?.ok_or(Error::MissingHeader(QUERY_ID_HEADER))?;
    let hash = header(&resp, SUB_HASH_HEADER)?.unwrap_or_default();

    Ok(OpenedSubscription {
      id,
      hash,
      stream: byte_stream(resp),
    })
  }

  async fn resume_subscription(
    &self,
    id: &str,
    from: ChangeId,
    skip_rows: bool,
  ) -> Result<ByteStream> {
    let path = resume_path(id, from, skip_rows);
    let resp = self.request(Method::GET, &path).send().await?;
    if resp.status() == StatusCode::NOT_FOUND {
      return Err(Error::SubscriptionNotFound);
    }
    let resp = check_status(resp).await?;
    Ok(byte_stream(resp))
  }
}

fn resume_path(id: &str, from: ChangeId, skip_rows: bool) -> String {
  let mut path = format!(
    "{}/{}?skip_rows={}",
    SUBSCRIPTIONS_PATH,
    urlencoding::encode(id),
    skip_rows
  );
  if from != ChangeId::default() {
    path.push_str(&format!("&from={}", from));
  }
  path
}

fn header(resp: &Response, name: &'static str) -> Result<Option<String>> {
  match resp.headers().get(name) {
    Some(value) => value
      .to_str()
      .map(|v| Some(v.to_string()))
      .map_err(|_| Error::Http(format!("non-ASCII value in header {}", name))),
    None => Ok(None),
  }
}

async fn check_status(resp: Response) -> Result<Response> {
  let status = resp.status();
  if status.is_success() {
    return Ok(resp);
  }

  let body = resp.text().await.unwrap_or_default();
  log::debug!("[corro-client] Request failed with {}: {}", status, body);
  Err(Error::Status {
    status: status.as_u16(),
    body,
  })
}

/// Body errors mean the connection broke mid-stream, which the subscription
/// engine treats as a disconnect.
fn body_error(err: reqwest::Error) -> io::Error {
  if err.is_body() || err.is_timeout() {
    io::Error::new(io::ErrorKind::ConnectionAborted, err)
  } else {
    io::Error::other(err)
  }
}

fn byte_stream(resp: Response) -> ByteStream {
  let chunks = Box::pin(resp.bytes_stream()).map(|chunk| chunk.map_err(body_error));
  Box::new(StreamReader::new(chunks))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_config_builder_chain() {
    let config = ClientConfig::new("http://db.internal:8080")
      .with_bearer("Bearer abc")
      .with_connect_timeout(Duration::from_secs(3));

    assert_eq!(config.url, "http://db.internal:8080");
    assert_eq!(config.bearer.as_deref(), Some("Bearer abc"));
    assert_eq!(config.connect_timeout, Some(Duration::from_secs(3)));
  }

  #[test]
  fn test_new_normalizes_url() {
    let client = CorroClient::new(ClientConfig::new("http://localhost:8080/")).unwrap();
    assert_eq!(client.url(), "http://localhost:8080");
  }

  #[test]
  fn test_new_rejects_bad_scheme() {
    let err = CorroClient::new(ClientConfig::new("localhost:8080")).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
  }

  #[test]
  fn test_resume_path() {
    assert_eq!(
      resume_path("abc", ChangeId::new(0), true),
      "/v1/subscriptions/abc?skip_rows=true"
    );
    assert_eq!(
      resume_path("a b", ChangeId::new(42), true),
      "/v1/subscriptions/a%20b?skip_rows=true&from=42"
    );
  }
}
