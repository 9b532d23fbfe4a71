//! Persistence model - saves committed trees without blocking navigation.
//!
//! Architecture:
//! - Requests are serialized on the caller's side and queued on a channel
//! - A single tokio writer task drains the queue, skipping requests that a
//!   newer one has already superseded
//! - Results flow back over an event channel that the owner drains with
//!   [`PersistModel::process_pending_events`]
//!
//! Every request carries a sequence number. A result older than the newest one
//! already reported is ignored, so a slow save can never mask a newer outcome.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::{KifuFormat, MoveTree};
use crate::error::{KifuError, KifuResult};

/// A file and the format it is written in
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveTarget {
    pub path: PathBuf,
    pub format: KifuFormat,
}

impl SaveTarget {
    pub fn new(path: impl Into<PathBuf>, format: KifuFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }
}

/// Storage backend for serialized kifu
#[async_trait]
pub trait KifuStore: Send + Sync + 'static {
    async fn save(&self, target: &SaveTarget, payload: &str) -> Result<(), String>;
}

/// Writes kifu files to the local filesystem
#[derive(Clone, Copy, Debug, Default)]
pub struct FsStore;

#[async_trait]
impl KifuStore for FsStore {
    async fn save(&self, target: &SaveTarget, payload: &str) -> Result<(), String> {
        tokio::fs::write(&target.path, payload)
            .await
            .map_err(|e| format!("{}: {}", target.path.display(), e))
    }
}

/// Messages sent from the writer task to the model
#[derive(Debug, Clone, PartialEq)]
pub enum PersistEvent {
    Saved { seq: u64 },
    Failed { seq: u64, message: String },
}

impl PersistEvent {
    fn seq(&self) -> u64 {
        match self {
            PersistEvent::Saved { seq } | PersistEvent::Failed { seq, .. } => *seq,
        }
    }
}

#[derive(Debug)]
struct SaveRequest {
    seq: u64,
    target: SaveTarget,
    payload: String,
}

/// The persistence model - owns the writer task and its channels
pub struct PersistModel {
    /// Sequence number of the most recent request
    last_enqueued: u64,
    /// Sequence number of the newest result seen
    last_reported: Option<u64>,
    /// Sequence number of the newest successful save
    last_saved: Option<u64>,
    /// Newest unacknowledged failure
    failure: Option<(u64, String)>,
    command_sender: Option<UnboundedSender<SaveRequest>>,
    event_receiver: Option<UnboundedReceiver<PersistEvent>>,
    writer: Option<JoinHandle<()>>,
}

impl PersistModel {
    pub fn new() -> Self {
        Self {
            last_enqueued: 0,
            last_reported: None,
            last_saved: None,
            failure: None,
            command_sender: None,
            event_receiver: None,
            writer: None,
        }
    }

    /// Spawn the writer task. Must be called from within a tokio runtime.
    pub fn start(&mut self, store: Arc<dyn KifuStore>) {
        if self.is_running() {
            return;
        }
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        self.writer = Some(tokio::spawn(run_writer(store, cmd_rx, event_tx)));
        self.command_sender = Some(cmd_tx);
        self.event_receiver = Some(event_rx);
    }

    /// Check if the writer task is accepting requests
    pub fn is_running(&self) -> bool {
        self.command_sender.is_some() && self.writer.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Sequence number of the newest successful save
    pub fn last_saved(&self) -> Option<u64> {
        self.last_saved
    }

    /// Whether a request is still waiting for its result
    pub fn is_dirty(&self) -> bool {
        self.last_enqueued > self.last_reported.unwrap_or(0)
    }

    /// Serialize `tree` and queue it for writing. Returns the request's
    /// sequence number.
    pub fn enqueue(&mut self, tree: &MoveTree, target: &SaveTarget) -> KifuResult<u64> {
        let payload = target.format.serialize(tree)?;
        let sender = self
            .command_sender
            .as_ref()
            .ok_or_else(|| KifuError::PersistenceFailure {
                message: "persistence is not running".to_string(),
            })?;
        let seq = self.last_enqueued + 1;
        sender
            .send(SaveRequest {
                seq,
                target: target.clone(),
                payload,
            })
            .map_err(|_| KifuError::PersistenceFailure {
                message: "writer task has stopped".to_string(),
            })?;
        self.last_enqueued = seq;
        debug!(seq, path = %target.path.display(), format = %target.format, "save queued");
        Ok(seq)
    }

    /// Process all pending events from the channel
    /// Returns true if any events were processed
    pub fn process_pending_events(&mut self) -> bool {
        let events: Vec<PersistEvent> = match &mut self.event_receiver {
            Some(rx) => {
                let mut collected = Vec::new();
                while let Ok(event) = rx.try_recv() {
                    collected.push(event);
                }
                collected
            }
            None => return false,
        };

        if events.is_empty() {
            return false;
        }
        for event in events {
            self.handle_event(event);
        }
        true
    }

    fn handle_event(&mut self, event: PersistEvent) {
        let seq = event.seq();
        if self.last_reported.is_some_and(|newest| seq < newest) {
            debug!(seq, "ignoring stale save result");
            return;
        }
        self.last_reported = Some(seq);
        match event {
            PersistEvent::Saved { seq } => {
                self.last_saved = Some(seq);
                self.failure = None;
            }
            PersistEvent::Failed { seq, message } => {
                warn!(seq, %message, "save failed");
                self.failure = Some((seq, message));
            }
        }
    }

    /// Take the newest failure, if the latest result was one
    pub fn take_failure(&mut self) -> Option<KifuError> {
        self.failure
            .take()
            .map(|(_, message)| KifuError::PersistenceFailure { message })
    }

    /// Wait until the most recent request has reported its result
    pub async fn flush(&mut self) {
        self.process_pending_events();
        while self.is_dirty() {
            let Some(rx) = self.event_receiver.as_mut() else {
                return;
            };
            match rx.recv().await {
                Some(event) => self.handle_event(event),
                None => return,
            }
        }
    }
}

impl Default for PersistModel {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_writer(
    store: Arc<dyn KifuStore>,
    mut requests: UnboundedReceiver<SaveRequest>,
    events: UnboundedSender<PersistEvent>,
) {
    while let Some(mut request) = requests.recv().await {
        while let Ok(newer) = requests.try_recv() {
            debug!(skipped = request.seq, seq = newer.seq, "coalescing save");
            request = newer;
        }
        let event = match store.save(&request.target, &request.payload).await {
            Ok(()) => PersistEvent::Saved { seq: request.seq },
            Err(message) => PersistEvent::Failed {
                seq: request.seq,
                message,
            },
        };
        if events.send(event).is_err() {
            break;
        }
    }
}
