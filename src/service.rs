//! The two remote calls the subscription engine depends on.
//!
//! [`CorroClient`](crate::CorroClient) implements [`SubscriptionService`] over
//! HTTP; tests drive the engine with in-memory implementations.

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::change_id::ChangeId;
use crate::error::Result;
use crate::protocol::Statement;

/// Newline-delimited JSON byte stream returned by the streaming endpoints.
pub type ByteStream = Box<dyn AsyncBufRead + Send + Unpin>;

/// A freshly opened subscription stream and its identity on the service.
pub struct OpenedSubscription {
  pub id: String,
  pub hash: String,
  pub stream: ByteStream,
}

#[async_trait]
pub trait SubscriptionService: Send + Sync {
  /// Open a subscription for `statement`.
  async fn open_subscription(
    &self,
    statement: &Statement,
    skip_rows: bool,
  ) -> Result<OpenedSubscription>;

  /// Reopen the stream of subscription `id` strictly after `from`.
  ///
  /// Returns [`Error::SubscriptionNotFound`](crate::Error::SubscriptionNotFound)
  /// when the service has discarded the subscription.
  async fn resume_subscription(
    &self,
    id: &str,
    from: ChangeId,
    skip_rows: bool,
  ) -> Result<ByteStream>;
}

/// Read the next frame, without its line terminator.
///
/// Returns `Ok(None)` when the stream ended. A trailing line with no newline
/// was cut off mid-frame and counts as the end of the stream.
pub(crate) async fn read_frame(stream: &mut ByteStream) -> io::Result<Option<Vec<u8>>> {
  let mut buf = Vec::new();
  loop {
    buf.clear();
    let n = stream.read_until(b'\n', &mut buf).await?;
    if n == 0 {
      return Ok(None);
    }
    if buf.last() != Some(&b'\n') {
      log::debug!("[corro-sub] Dropping {} byte partial frame at end of stream", n);
      return Ok(None);
    }

    buf.pop();
    if buf.last() == Some(&b'\r') {
      buf.pop();
    }
    if buf.iter().all(u8::is_ascii_whitespace) {
      continue;
    }
    return Ok(Some(buf));
  }
}

/// Whether a read error means the connection went away rather than
/// something unexpected happening on it.
pub(crate) fn is_disconnect(err: &io::Error) -> bool {
  matches!(
    err.kind(),
    io::ErrorKind::UnexpectedEof
      | io::ErrorKind::BrokenPipe
      | io::ErrorKind::ConnectionReset
      | io::ErrorKind::ConnectionAborted
  )
}
