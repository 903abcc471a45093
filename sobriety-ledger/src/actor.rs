//! Actor-based dispatch for the ledger
//!
//! Implements the single-writer pattern with a Tokio task:
//! - One task runs every command to completion before taking the next
//! - Bounded mailbox gives callers backpressure
//! - Callers hold a cloneable handle and await a oneshot reply
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │           Request façade (JSON lines, tests)         │
//! └─────────────────────┬────────────────────────────────┘
//!                       │ Envelope
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │               LedgerHandle (Clone)                   │
//! └─────────────────────┬────────────────────────────────┘
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (Single Task)               │
//! │          Dispatcher::dispatch(envelope)              │
//! │                       │                              │
//! │                       ▼                              │
//! │        Ledger → RecordStore::commit(batch)           │
//! └──────────────────────────────────────────────────────┘
//! ```

use crate::api::{Dispatcher, Envelope, Reply};
use crate::{Error, Result};
use tokio::sync::{mpsc, oneshot};

/// Message sent to the ledger actor
#[derive(Debug)]
pub enum LedgerMessage {
    /// Run a command
    Execute {
        /// Command and caller
        envelope: Envelope,
        /// Reply channel
        response: oneshot::Sender<Result<Reply>>,
    },

    /// Stop after draining nothing further
    Shutdown,
}

/// Actor that processes ledger messages
#[derive(Debug)]
pub struct LedgerActor {
    /// Command runner
    dispatcher: Dispatcher,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,

    /// Commands processed so far
    processed: u64,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(dispatcher: Dispatcher, mailbox: mpsc::Receiver<LedgerMessage>) -> Self {
        Self {
            dispatcher,
            mailbox,
            processed: 0,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                LedgerMessage::Execute { envelope, response } => {
                    let result = self.dispatcher.dispatch(envelope);
                    if let Err(e) = &result {
                        tracing::error!("Fatal error handling command: {}", e);
                    }
                    self.processed += 1;
                    // Caller may have given up waiting
                    let _ = response.send(result);
                }
                LedgerMessage::Shutdown => break,
            }
        }

        tracing::info!(processed = self.processed, "Ledger actor stopped");
    }
}

/// Handle for sending messages to the actor
#[derive(Clone, Debug)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    /// Run a command and wait for its reply
    pub async fn execute(&self, envelope: Envelope) -> Result<Reply> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(LedgerMessage::Execute {
                envelope,
                response: tx,
            })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(LedgerMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(dispatcher: Dispatcher, mailbox_capacity: usize) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity);
    let actor = LedgerActor::new(dispatcher, rx);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}
