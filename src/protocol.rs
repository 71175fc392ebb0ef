//! Wire types and constants for the Corrosion HTTP API.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Response header carrying the subscription id
pub const QUERY_ID_HEADER: &str = "corro-query-id";

/// Response header carrying the subscription result hash
pub const SUB_HASH_HEADER: &str = "corro-sub-hash";

pub const SUBSCRIPTIONS_PATH: &str = "/v1/subscriptions";
pub const QUERIES_PATH: &str = "/v1/queries";
pub const TRANSACTIONS_PATH: &str = "/v1/transactions";
pub const MIGRATIONS_PATH: &str = "/v1/migrations";

/// A SQL statement, optionally with bound parameters. The SQL is opaque to
/// the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Statement {
  Simple(String),
  WithParams(String, Vec<serde_json::Value>),
  WithNamedParams {
    query: String,
    named_params: HashMap<String, serde_json::Value>,
  },
}

impl Statement {
  pub fn new(sql: impl Into<String>) -> Self {
    Statement::Simple(sql.into())
  }

  pub fn with_params(sql: impl Into<String>, params: Vec<serde_json::Value>) -> Self {
    Statement::WithParams(sql.into(), params)
  }

  pub fn with_named_params(
    sql: impl Into<String>,
    named_params: HashMap<String, serde_json::Value>,
  ) -> Self {
    Statement::WithNamedParams {
      query: sql.into(),
      named_params,
    }
  }

  pub fn sql(&self) -> &str {
    match self {
      Statement::Simple(sql) | Statement::WithParams(sql, _) => sql,
      Statement::WithNamedParams { query, .. } => query,
    }
  }
}

impl From<&str> for Statement {
  fn from(sql: &str) -> Self {
    Statement::new(sql)
  }
}

impl From<String> for Statement {
  fn from(sql: String) -> Self {
    Statement::Simple(sql)
  }
}

/// Outcome of a single statement in a transaction or migration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExecResult {
  Execute {
    rows_affected: u64,
    #[serde(default)]
    time: f64,
  },
  Error {
    error: String,
  },
}

/// Response body of `/v1/transactions` and `/v1/migrations`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecResponse {
  pub results: Vec<ExecResult>,
  #[serde(default)]
  pub time: f64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version: Option<u64>,
}

impl ExecResponse {
  /// First per-statement error, if any statement failed
  pub fn first_error(&self) -> Option<&str> {
    self.results.iter().find_map(|r| match r {
      ExecResult::Error { error } => Some(error.as_str()),
      ExecResult::Execute { .. } => None,
    })
  }

  pub fn rows_affected(&self) -> u64 {
    self
      .results
      .iter()
      .map(|r| match r {
        ExecResult::Execute { rows_affected, .. } => *rows_affected,
        ExecResult::Error { .. } => 0,
      })
      .sum()
  }
}
