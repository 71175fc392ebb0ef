//! Resumable query subscriptions.
//!
//! A [`Subscription`] owns one background pump task. The pump reads frames
//! from the service stream, checks change-id continuity, and forwards events
//! through a bounded channel; a full channel pauses reads. When the stream
//! drops after the initial result set has been fully received, the pump
//! reopens it from the last delivered change id, so the caller sees one
//! gap-free ordered sequence of events.
//!
//! ```text
//!   Open ──▶ Streaming ◀──▶ Reconnecting
//!               │               │
//!               ▼               ▼
//!        Closed | Errored  Closed | Errored
//! ```

use futures::Stream;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::change_id::ChangeId;
use crate::error::{Error, Result};
use crate::event::{decode_event, Event, Row};
use crate::protocol::Statement;
use crate::service::{is_disconnect, read_frame, ByteStream, SubscriptionService};

/// Default delay between resume attempts
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// Default number of resume attempts before giving up
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Default capacity of the delivery channel
pub const DEFAULT_BUFFER_SIZE: usize = 5;

/// Options for [`Subscription::open`]
#[derive(Debug, Clone)]
pub struct SubscribeOptions {
  pub backoff: Duration,
  pub max_retries: u32,
  pub buffer_size: usize,
  pub skip_rows: bool,
}

impl Default for SubscribeOptions {
  fn default() -> Self {
    Self {
      backoff: DEFAULT_BACKOFF,
      max_retries: DEFAULT_MAX_RETRIES,
      buffer_size: DEFAULT_BUFFER_SIZE,
      skip_rows: false,
    }
  }
}

impl SubscribeOptions {
  pub fn new() -> Self {
    Self::default()
  }

  /// Constant delay between resume attempts, and how many attempts to make.
  pub fn with_retry(mut self, backoff: Duration, max_retries: u32) -> Self {
    self.backoff = backoff;
    self.max_retries = max_retries;
    self
  }

  pub fn with_buffer_size(mut self, size: usize) -> Self {
    self.buffer_size = size;
    self
  }

  /// Ask the service not to send the initial result rows.
  pub fn with_skip_rows(mut self) -> Self {
    self.skip_rows = true;
    self
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
  Open,
  Streaming,
  Reconnecting,
  Closed,
  Errored,
}

impl SubscriptionState {
  pub fn is_terminal(&self) -> bool {
    matches!(self, SubscriptionState::Closed | SubscriptionState::Errored)
  }
}

type SharedState = Arc<watch::Sender<SubscriptionState>>;

/// Moves the state forward unless it already reached a terminal state.
fn transition(state: &SharedState, next: SubscriptionState) {
  state.send_if_modified(|current| {
    if current.is_terminal() || *current == next {
      return false;
    }
    *current = next;
    true
  });
}

/// Closes a subscription from any task.
#[derive(Debug, Clone)]
pub struct CloseHandle {
  token: CancellationToken,
  state: SharedState,
}

impl CloseHandle {
  /// Request shutdown. Does not wait for the pump to stop.
  pub fn close(&self) {
    self.token.cancel();
    transition(&self.state, SubscriptionState::Closed);
  }

  pub fn is_closed(&self) -> bool {
    self.token.is_cancelled()
  }
}

/// A live, resumable query subscription.
///
/// # Example
///
/// ```no_run
/// use corro_client::{ClientConfig, CorroClient, Event, SubscribeOptions};
///
/// # async fn example() -> corro_client::Result<()> {
/// let client = CorroClient::new(ClientConfig::new("http://localhost:8080"))?;
/// let mut sub = client
///   .subscribe(&"SELECT id, name FROM users".into(), SubscribeOptions::default())
///   .await?;
///
/// loop {
///   match sub.next().await? {
///     Event::Change(change) => println!("{} #{}", change.kind, change.change_id),
///     other => println!("{:?}", other),
///   }
/// }
/// # }
/// ```
pub struct Subscription {
  id: String,
  hash: String,
  events: mpsc::Receiver<Result<Event>>,
  handle: CloseHandle,
  done: bool,
}

impl Subscription {
  /// Open a subscription through `service` and start its pump.
  pub async fn open(
    service: Arc<dyn SubscriptionService>,
    statement: &Statement,
    options: SubscribeOptions,
  ) -> Result<Self> {
    let opened = service
      .open_subscription(statement, options.skip_rows)
      .await?;
    log::debug!(
      "[corro-sub] Opened subscription id={} hash={}",
      opened.id,
      opened.hash
    );

    let (events_tx, events_rx) = mpsc::channel(options.buffer_size.max(1));
    let (state_tx, _) = watch::channel(SubscriptionState::Open);
    let handle = CloseHandle {
      token: CancellationToken::new(),
      state: Arc::new(state_tx),
    };

    let pump = Pump {
      service,
      id: opened.id.clone(),
      stream: opened.stream,
      events: events_tx,
      token: handle.token.clone(),
      state: handle.state.clone(),
      columns: None,
      last_change_id: ChangeId::default(),
      seen_eoq: false,
      retries: 0,
      max_retries: options.max_retries,
      backoff: options.backoff,
    };
    tokio::spawn(pump.run());

    Ok(Self {
      id: opened.id,
      hash: opened.hash,
      events: events_rx,
      handle,
      done: false,
    })
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn hash(&self) -> &str {
    &self.hash
  }

  pub fn state(&self) -> SubscriptionState {
    *self.handle.state.borrow()
  }

  /// Receiver notified on every state transition.
  pub fn watch_state(&self) -> watch::Receiver<SubscriptionState> {
    self.handle.state.subscribe()
  }

  /// Wait for the next event.
  ///
  /// A fatal error is returned once, after every event delivered before it.
  /// Once closed or failed, every call returns [`Error::SubscriptionClosed`].
  pub async fn next(&mut self) -> Result<Event> {
    if self.done || self.handle.is_closed() {
      return Err(Error::SubscriptionClosed);
    }

    tokio::select! {
      biased;
      _ = self.handle.token.cancelled() => Err(Error::SubscriptionClosed),
      received = self.events.recv() => match received {
        Some(Ok(event)) => Ok(event),
        Some(Err(err)) => {
          self.done = true;
          Err(err)
        }
        None => {
          self.done = true;
          Err(Error::SubscriptionClosed)
        }
      },
    }
  }

  /// Request shutdown. Idempotent and non-blocking.
  pub fn close(&self) {
    self.handle.close();
  }

  pub fn close_handle(&self) -> CloseHandle {
    self.handle.clone()
  }

  /// Adapt into a stream that ends when the subscription closes.
  pub fn into_stream(self) -> impl Stream<Item = Result<Event>> + Send {
    futures::stream::unfold(self, |mut sub| async move {
      match sub.next().await {
        Err(Error::SubscriptionClosed) => None,
        item => Some((item, sub)),
      }
    })
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.handle.close();
  }
}

/// Background task that owns the byte stream of one subscription.
struct Pump {
  service: Arc<dyn SubscriptionService>,
  id: String,
  stream: ByteStream,
  events: mpsc::Sender<Result<Event>>,
  token: CancellationToken,
  state: SharedState,
  /// Schema from the latest `Columns` event, none until one arrives.
  columns: Option<Arc<[String]>>,
  last_change_id: ChangeId,
  seen_eoq: bool,
  retries: u32,
  max_retries: u32,
  backoff: Duration,
}

impl Pump {
  async fn run(mut self) {
    transition(&self.state, SubscriptionState::Streaming);

    match self.pump().await {
      Ok(()) => {
        log::debug!("[corro-sub] Subscription {} closed", self.id);
        transition(&self.state, SubscriptionState::Closed);
      }
      Err(err) => {
        log::error!("[corro-sub] Subscription {} failed: {}", self.id, err);
        transition(&self.state, SubscriptionState::Errored);
        self.deliver(Err(err)).await;
      }
    }
  }

  /// Returns `Ok(())` when stopped by the caller, `Err` on a fatal condition.
  async fn pump(&mut self) -> Result<()> {
    loop {
      let read = tokio::select! {
        biased;
        _ = self.token.cancelled() => return Ok(()),
        read = read_frame(&mut self.stream) => read,
      };

      match read {
        Ok(Some(frame)) => {
          let event = self.accept(&frame)?;
          if !self.deliver(Ok(event)).await {
            return Ok(());
          }
        }
        Ok(None) => {
          if !self.reconnect("stream ended").await? {
            return Ok(());
          }
        }
        Err(err) if is_disconnect(&err) => {
          if !self.reconnect(&err.to_string()).await? {
            return Ok(());
          }
        }
        Err(err) => {
          if self.token.is_cancelled() {
            return Ok(());
          }
          return Err(Error::Io(err));
        }
      }
    }
  }

  /// Decode a frame and apply it to the subscription state.
  fn accept(&mut self, frame: &[u8]) -> Result<Event> {
    let mut event = decode_event(frame)?;

    match &mut event {
      Event::Columns(names) => {
        self.columns = Some(Arc::from(names.clone()));
      }
      Event::Row(row) => {
        if self.columns.is_none() {
          return Err(Error::MalformedFrame("row before columns".to_string()));
        }
        self.attach_columns(row)?
      }
      Event::EndOfQuery(eoq) => {
        self.seen_eoq = true;
        self.last_change_id = eoq.change_id.unwrap_or_default();
      }
      Event::Change(change) => {
        let expected = self.last_change_id.next();
        if change.change_id != expected {
          return Err(Error::MissedChange {
            expected,
            got: change.change_id,
          });
        }
        self.attach_columns(&mut change.row)?;
        self.last_change_id = change.change_id;
      }
      Event::Error(message) => return Err(Error::Remote(message.clone())),
    }

    Ok(event)
  }

  /// Check the row against the current schema and attach it. Changes that
  /// arrive before any schema are passed through without one.
  fn attach_columns(&self, row: &mut Row) -> Result<()> {
    let Some(columns) = &self.columns else {
      return Ok(());
    };
    if row.values().len() != columns.len() {
      return Err(Error::SchemaMismatch {
        columns: columns.len(),
        values: row.values().len(),
      });
    }
    row.set_columns(columns.clone());
    Ok(())
  }

  /// Push onto the delivery channel, waiting for room. Returns false if the
  /// subscription was closed meanwhile.
  async fn deliver(&mut self, item: Result<Event>) -> bool {
    tokio::select! {
      biased;
      _ = self.token.cancelled() => false,
      sent = self.events.send(item) => sent.is_ok(),
    }
  }

  /// Swap in a resumed stream. Returns false if closed while reconnecting.
  async fn reconnect(&mut self, reason: &str) -> Result<bool> {
    if self.token.is_cancelled() {
      return Ok(false);
    }
    log::debug!(
      "[corro-sub] Subscription {} lost its stream: {}",
      self.id,
      reason
    );

    match self.resume().await? {
      Some(stream) => {
        self.stream = stream;
        Ok(true)
      }
      None => Ok(false),
    }
  }

  async fn resume(&mut self) -> Result<Option<ByteStream>> {
    // Before the end-of-query marker there is no change id to resume from.
    if !self.seen_eoq {
      return Err(Error::UnrecoverableSubscription);
    }
    transition(&self.state, SubscriptionState::Reconnecting);

    while self.retries < self.max_retries {
      if self.token.is_cancelled() {
        return Ok(None);
      }
      self.retries += 1;

      let attempt = tokio::select! {
        biased;
        _ = self.token.cancelled() => return Ok(None),
        attempt = self.service.resume_subscription(&self.id, self.last_change_id, true) => attempt,
      };

      match attempt {
        Ok(stream) => {
          log::info!(
            "[corro-sub] Resumed subscription {} after change {} (attempt {})",
            self.id,
            self.last_change_id,
            self.retries
          );
          self.retries = 0;
          transition(&self.state, SubscriptionState::Streaming);
          return Ok(Some(stream));
        }
        Err(Error::SubscriptionNotFound) => return Err(Error::SubscriptionNotFound),
        Err(err) => {
          log::warn!(
            "[corro-sub] Resume attempt {}/{} for {} failed: {}",
            self.retries,
            self.max_retries,
            self.id,
            err
          );
        }
      }

      if self.retries < self.max_retries {
        tokio::select! {
          biased;
          _ = self.token.cancelled() => return Ok(None),
          _ = tokio::time::sleep(self.backoff) => {}
        }
      }
    }

    Err(Error::MaxRetriesExceeded)
  }
}
