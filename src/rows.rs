//! Forward-only cursor over a fully buffered query result.

use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{Error, Result, ScanError};
use crate::event::{decode_event, Event, Row};
use crate::service::{read_frame, ByteStream};
use crate::value::Scan;

/// Buffered result set of a one-shot query.
///
/// `advance` and `scan` take `&self` and are serialized internally, so a
/// `Rows` can be shared, but reads are not parallel.
#[derive(Debug)]
pub struct Rows {
  columns: Vec<String>,
  rows: Vec<Row>,
  position: RwLock<Option<usize>>,
}

impl Rows {
  pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
    let schema: Arc<[String]> = Arc::from(columns.clone());
    let rows = rows
      .into_iter()
      .map(|mut row| {
        row.set_columns(schema.clone());
        row
      })
      .collect();

    Self {
      columns,
      rows,
      position: RwLock::new(None),
    }
  }

  /// Read a query response stream up to its end-of-query marker.
  pub(crate) async fn read_from(mut stream: ByteStream) -> Result<Self> {
    let mut columns: Option<Vec<String>> = None;
    let mut rows = Vec::new();
    let mut complete = false;

    while let Some(frame) = read_frame(&mut stream).await? {
      match decode_event(&frame)? {
        Event::Columns(names) => columns = Some(names),
        Event::Row(row) => {
          let Some(names) = &columns else {
            return Err(Error::MalformedFrame("row before columns".to_string()));
          };
          if row.values().len() != names.len() {
            return Err(Error::SchemaMismatch {
              columns: names.len(),
              values: row.values().len(),
            });
          }
          rows.push(row);
        }
        Event::EndOfQuery(_) => {
          complete = true;
          break;
        }
        Event::Error(message) => return Err(Error::Remote(message)),
        Event::Change(_) => {
          return Err(Error::MalformedFrame(
            "change event in a query result".to_string(),
          ))
        }
      }
    }

    if !complete {
      log::debug!(
        "[corro-client] Query response ended after {} rows without eoq",
        rows.len()
      );
      return Err(Error::MalformedFrame(
        "query response ended before eoq".to_string(),
      ));
    }

    log::debug!("[corro-client] Buffered {} rows", rows.len());
    Ok(Self::new(columns.unwrap_or_default(), rows))
  }

  pub fn columns(&self) -> &[String] {
    &self.columns
  }

  pub fn len(&self) -> usize {
    self.rows.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rows.is_empty()
  }

  /// Move to the next row. Returns false once the rows are exhausted.
  pub fn advance(&self) -> bool {
    let mut position = self.position.write().unwrap_or_else(PoisonError::into_inner);
    let next = position.map_or(0, |i| i + 1);
    if next >= self.rows.len() {
      return false;
    }
    *position = Some(next);
    true
  }

  /// Row under the cursor, cloned out of the buffer.
  pub fn current(&self) -> Option<Row> {
    let position = self.position.read().unwrap_or_else(PoisonError::into_inner);
    position.and_then(|i| self.rows.get(i).cloned())
  }

  /// Scan the current row into `dest`.
  pub fn scan(&self, dest: &mut [&mut dyn Scan]) -> std::result::Result<(), ScanError> {
    let position = self.position.read().unwrap_or_else(PoisonError::into_inner);
    match *position {
      Some(i) => self.rows[i].scan(dest),
      None => Err(ScanError::NotAdvanced),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::value::SqliteValue;

  fn sample() -> Rows {
    Rows::new(
      vec!["id".to_string(), "name".to_string()],
      vec![
        Row::new(1, vec![SqliteValue::from(1), SqliteValue::from("alice")]),
        Row::new(2, vec![SqliteValue::from(2), SqliteValue::Null]),
      ],
    )
  }

  #[test]
  fn test_scan_before_advance() {
    let rows = sample();
    let mut id = 0i64;
    let mut name = String::new();
    assert_eq!(
      rows.scan(&mut [&mut id, &mut name]),
      Err(ScanError::NotAdvanced)
    );
  }

  #[test]
  fn test_iterates_all_rows() {
    let rows = sample();
    assert_eq!(rows.columns(), ["id", "name"]);

    let mut seen = Vec::new();
    while rows.advance() {
      let mut id = 0i64;
      let mut name = "unset".to_string();
      rows.scan(&mut [&mut id, &mut name]).unwrap();
      seen.push((id, name));
    }

    assert_eq!(
      seen,
      vec![(1, "alice".to_string()), (2, "unset".to_string())]
    );
    assert!(!rows.advance());
  }

  #[test]
  fn test_empty_result() {
    let rows = Rows::new(vec!["id".to_string()], Vec::new());
    assert!(rows.is_empty());
    assert!(!rows.advance());
    assert!(rows.current().is_none());
  }

  #[test]
  fn test_rows_carry_schema() {
    let rows = sample();
    assert!(rows.advance());
    let row = rows.current().unwrap();
    assert_eq!(row.get("name"), Some(&SqliteValue::from("alice")));
  }

  #[tokio::test]
  async fn test_read_from_stream() {
    let body: &'static [u8] =
      b"{\"columns\":[\"id\"]}\n{\"row\":[1,[10]]}\n{\"row\":[2,[20]]}\n{\"eoq\":{\"time\":0.1}}\n";
    let rows = Rows::read_from(Box::new(body)).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.advance());
    let mut v = 0u32;
    rows.scan(&mut [&mut v]).unwrap();
    assert_eq!(v, 10);
  }

  #[tokio::test]
  async fn test_read_from_truncated_body() {
    let body: &'static [u8] = b"{\"columns\":[\"id\"]}\n{\"row\":[1,[10]]}\n{\"row\":[2,[2";
    let err = Rows::read_from(Box::new(body)).await.unwrap_err();
    assert!(matches!(err, Error::MalformedFrame(_)));
  }

  #[tokio::test]
  async fn test_read_from_eof_before_eoq() {
    let body: &'static [u8] = b"{\"columns\":[\"id\"]}\n{\"row\":[1,[10]]}\n";
    let err = Rows::read_from(Box::new(body)).await.unwrap_err();
    assert!(matches!(err, Error::MalformedFrame(_)));

    let err = Rows::read_from(Box::new(&b""[..])).await.unwrap_err();
    assert!(matches!(err, Error::MalformedFrame(_)));
  }

  #[tokio::test]
  async fn test_read_from_checks_row_width() {
    let body: &'static [u8] = b"{\"columns\":[]}\n{\"row\":[1,[5]]}\n{\"eoq\":{\"time\":0.1}}\n";
    let err = Rows::read_from(Box::new(body)).await.unwrap_err();
    assert!(matches!(err, Error::SchemaMismatch { columns: 0, values: 1 }));

    let body: &'static [u8] = b"{\"row\":[1,[5]]}\n{\"eoq\":{\"time\":0.1}}\n";
    let err = Rows::read_from(Box::new(body)).await.unwrap_err();
    assert!(matches!(err, Error::MalformedFrame(_)));
  }

  #[tokio::test]
  async fn test_read_from_remote_error() {
    let body: &'static [u8] = b"{\"columns\":[\"id\"]}\n{\"error\":\"no such table\"}\n";
    let err = Rows::read_from(Box::new(body)).await.unwrap_err();
    assert!(matches!(err, Error::Remote(msg) if msg == "no such table"));
  }
}
