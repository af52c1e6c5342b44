//! A registered user's live connection.
//!
//! A session never writes to its socket directly. Outbound bytes go onto a
//! bounded queue (the SendQ) drained by the session's own writer task, so
//! queueing never waits on the peer. A peer that stops reading fills its
//! queue and is disconnected instead of stalling whoever is sending to it.

use crate::error::SendError;
use bytes::Bytes;
use std::fmt;
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Type-erased write half of a client connection.
pub type SessionWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// The input prompt shown to `name`.
pub fn prompt(name: &str) -> String {
    format!("{name} >> ")
}

pub struct Session {
    name: String,
    queue: mpsc::Sender<Bytes>,
    closed: CancellationToken,
}

/// Receiving end of a session's SendQ.
pub struct Outbox {
    name: String,
    queue: mpsc::Receiver<Bytes>,
    closed: CancellationToken,
}

impl Session {
    /// Create a session with room for `capacity` queued messages.
    ///
    /// Nothing is written until the returned [`Outbox`] is run against a
    /// writer.
    pub fn new(name: impl Into<String>, capacity: usize) -> (Self, Outbox) {
        let name = name.into();
        let (tx, rx) = mpsc::channel(capacity);
        let closed = CancellationToken::new();
        let outbox = Outbox {
            name: name.clone(),
            queue: rx,
            closed: closed.clone(),
        };
        let session = Self {
            name,
            queue: tx,
            closed,
        };
        (session, outbox)
    }

    /// Create a session and spawn its writer task on `writer`.
    ///
    /// The task hands the writer back once every handle to the session is
    /// gone and the queue is drained, or once the session is disconnected.
    pub fn spawn<W>(name: impl Into<String>, writer: W, capacity: usize) -> (Self, JoinHandle<W>)
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (session, outbox) = Self::new(name, capacity);
        (session, tokio::spawn(outbox.run(writer)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue `bytes` without waiting.
    ///
    /// A full queue disconnects the session.
    pub fn send(&self, bytes: impl Into<Bytes>) -> Result<(), SendError> {
        if self.closed.is_cancelled() {
            return Err(SendError::Closed);
        }
        match self.queue.try_send(bytes.into()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(user = %self.name, "SendQ exceeded, disconnecting");
                self.disconnect();
                Err(SendError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(SendError::Closed),
        }
    }

    /// Re-issue this session's own input prompt.
    pub fn send_prompt(&self) -> Result<(), SendError> {
        self.send(prompt(&self.name))
    }

    /// Stop the writer and signal the owning connection to close.
    pub fn disconnect(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the session has been disconnected.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("name", &self.name).finish_non_exhaustive()
    }
}

impl Outbox {
    /// Write queued messages in order until the queue closes or the session
    /// is disconnected. A failed write disconnects the session.
    pub async fn run<W>(mut self, mut writer: W) -> W
    where
        W: AsyncWrite + Unpin,
    {
        loop {
            let bytes = tokio::select! {
                () = self.closed.cancelled() => break,
                next = self.queue.recv() => match next {
                    Some(bytes) => bytes,
                    None => break,
                },
            };
            let result = tokio::select! {
                () = self.closed.cancelled() => break,
                result = write(&mut writer, &bytes) => result,
            };
            if let Err(e) = result {
                debug!(user = %self.name, error = %e, "Write failed, disconnecting");
                self.closed.cancel();
                break;
            }
        }
        writer
    }
}

async fn write<W: AsyncWrite + Unpin>(writer: &mut W, bytes: &[u8]) -> io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await
}
