//! Subscription and query events decoded from newline-delimited JSON frames.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::change_id::ChangeId;
use crate::error::{Error, Result, ScanError};
use crate::value::{scan_values, Scan, SqliteValue};

/// Kind of row-level change. Passed through from the service as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
  Insert,
  Update,
  Delete,
}

impl fmt::Display for ChangeKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ChangeKind::Insert => write!(f, "insert"),
      ChangeKind::Update => write!(f, "update"),
      ChangeKind::Delete => write!(f, "delete"),
    }
  }
}

/// One row of values, paired by position with the schema in effect when it
/// was received.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
  rowid: u64,
  values: Vec<SqliteValue>,
  columns: Arc<[String]>,
}

impl Row {
  pub fn new(rowid: u64, values: Vec<SqliteValue>) -> Self {
    Self {
      rowid,
      values,
      columns: Arc::from(Vec::new()),
    }
  }

  pub fn rowid(&self) -> u64 {
    self.rowid
  }

  pub fn values(&self) -> &[SqliteValue] {
    &self.values
  }

  pub fn columns(&self) -> &[String] {
    &self.columns
  }

  /// Value of the named column, if the schema has one.
  pub fn get(&self, column: &str) -> Option<&SqliteValue> {
    let idx = self.columns.iter().position(|c| c == column)?;
    self.values.get(idx)
  }

  /// Scan this row's values positionally into `dest`.
  ///
  /// ```
  /// use corro_client::{Row, SqliteValue};
  ///
  /// let row = Row::new(1, vec![SqliteValue::from(7), SqliteValue::from("bob")]);
  /// let (mut id, mut name) = (0i64, String::new());
  /// row.scan(&mut [&mut id, &mut name]).unwrap();
  /// assert_eq!((id, name.as_str()), (7, "bob"));
  /// ```
  pub fn scan(&self, dest: &mut [&mut dyn Scan]) -> std::result::Result<(), ScanError> {
    scan_values(&self.values, dest)
  }

  pub(crate) fn set_columns(&mut self, columns: Arc<[String]>) {
    self.columns = columns;
  }
}

/// A row-level change observed after the end of the initial result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
  pub kind: ChangeKind,
  pub change_id: ChangeId,
  pub row: Row,
}

/// Boundary between the initial result set and the live change stream.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EndOfQuery {
  #[serde(default)]
  pub time: f64,
  #[serde(default)]
  pub change_id: Option<ChangeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
  /// Schema for the rows and changes that follow.
  Columns(Vec<String>),
  Row(Row),
  Change(Change),
  EndOfQuery(EndOfQuery),
  /// Fatal error reported by the service. A subscription surfaces it as
  /// [`Error::Remote`] instead of delivering it.
  Error(String),
}

impl Event {
  pub fn kind(&self) -> &'static str {
    match self {
      Event::Columns(_) => "columns",
      Event::Row(_) => "row",
      Event::Change(_) => "change",
      Event::EndOfQuery(_) => "eoq",
      Event::Error(_) => "error",
    }
  }

  /// Change id carried by a change or end-of-query event.
  pub fn change_id(&self) -> Option<ChangeId> {
    match self {
      Event::Change(change) => Some(change.change_id),
      Event::EndOfQuery(eoq) => Some(eoq.change_id.unwrap_or_default()),
      _ => None,
    }
  }
}

/// Raw wire envelope. Exactly one field is populated per frame.
#[derive(Debug, Deserialize)]
struct Envelope {
  eoq: Option<EndOfQuery>,
  columns: Option<Vec<String>>,
  row: Option<(u64, Vec<SqliteValue>)>,
  change: Option<(ChangeKind, u64, Vec<SqliteValue>, ChangeId)>,
  error: Option<String>,
}

/// Decode one frame (without its trailing newline) into an [`Event`].
pub fn decode_event(frame: &[u8]) -> Result<Event> {
  let envelope: Envelope =
    serde_json::from_slice(frame).map_err(|e| Error::MalformedFrame(e.to_string()))?;

  let populated = [
    envelope.eoq.is_some(),
    envelope.columns.is_some(),
    envelope.row.is_some(),
    envelope.change.is_some(),
    envelope.error.is_some(),
  ]
  .iter()
  .filter(|set| **set)
  .count();

  match populated {
    0 => return Err(Error::UnknownEvent),
    1 => {}
    n => {
      return Err(Error::MalformedFrame(format!(
        "{} event fields in a single frame",
        n
      )))
    }
  }

  if let Some(columns) = envelope.columns {
    return Ok(Event::Columns(columns));
  }
  if let Some((rowid, values)) = envelope.row {
    return Ok(Event::Row(Row::new(rowid, values)));
  }
  if let Some((kind, rowid, values, change_id)) = envelope.change {
    return Ok(Event::Change(Change {
      kind,
      change_id,
      row: Row::new(rowid, values),
    }));
  }
  if let Some(eoq) = envelope.eoq {
    return Ok(Event::EndOfQuery(eoq));
  }
  match envelope.error {
    Some(message) => Ok(Event::Error(message)),
    None => Err(Error::UnknownEvent),
  }
}
