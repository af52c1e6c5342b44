//! Unified error handling for linechat.
//!
//! Errors are split by the layer that produces them: the user registry,
//! the transcript sink and the broadcast engine. Each carries a static
//! error code used as a metric label.

use std::fmt;
use thiserror::Error;

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors returned by [`crate::state::UserRegistry`] mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("name cannot be blank")]
    EmptyName,

    #[error("name already in use: {0}")]
    NameConflict(String),

    #[error("no such user: {0}")]
    NotFound(String),
}

impl RegistryError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyName => "empty_name",
            Self::NameConflict(_) => "name_conflict",
            Self::NotFound(_) => "not_found",
        }
    }
}

// ============================================================================
// Transcript Errors
// ============================================================================

/// A transcript append failed. Fatal to the operation that triggered it.
#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("unable to write to chat transcript: {0}")]
    Io(#[from] std::io::Error),
}

impl TranscriptError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Io(_) => "transcript_io",
        }
    }
}

// ============================================================================
// Send Errors (per-session queue)
// ============================================================================

/// Why bytes could not be queued for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// The peer is not reading; the session has been disconnected.
    #[error("send queue exceeded")]
    QueueFull,

    /// The session's connection is already gone.
    #[error("connection closed")]
    Closed,
}

impl SendError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::QueueFull => "sendq_exceeded",
            Self::Closed => "closed",
        }
    }
}

// ============================================================================
// Delivery Errors (per-peer fan-out)
// ============================================================================

/// Which write to a peer failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStage {
    /// Queueing the message body.
    Message,
    /// Queueing the peer's input prompt.
    Prompt,
}

impl DeliveryStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Prompt => "prompt",
        }
    }
}

/// A single failed delivery to one peer.
#[derive(Debug)]
pub struct PeerFailure {
    pub peer: String,
    pub stage: DeliveryStage,
    pub error: SendError,
}

impl fmt::Display for PeerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unable to write {} to user {}: {}",
            self.stage.as_str(),
            self.peer,
            self.error
        )
    }
}

/// Every per-peer failure collected during one fan-out.
///
/// Delivery to the remaining peers continues past each failure, so this is
/// only ever reported after the whole fan-out has been attempted.
#[derive(Debug, Default)]
pub struct DeliveryError {
    pub failures: Vec<PeerFailure>,
}

impl DeliveryError {
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn push(&mut self, failure: PeerFailure) {
        self.failures.push(failure);
    }

    /// Names of the peers that could not be reached.
    pub fn peers(&self) -> Vec<&str> {
        let mut peers: Vec<&str> = self.failures.iter().map(|f| f.peer.as_str()).collect();
        peers.dedup();
        peers
    }

    /// `Ok(())` if no failures were recorded.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} delivery failure(s)", self.failures.len())?;
        for (i, failure) in self.failures.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for DeliveryError {}

// ============================================================================
// Broadcast Errors
// ============================================================================

/// Errors from the broadcast engine.
#[derive(Debug, Error)]
pub enum BroadcastError {
    /// Durability failure: nothing was delivered.
    #[error(transparent)]
    Transcript(#[from] TranscriptError),

    /// Message injected on behalf of a name that is not registered.
    #[error("no such user: {0}")]
    UnknownSender(String),

    /// Fan-out completed but some peers could not be written to.
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

impl BroadcastError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Transcript(e) => e.error_code(),
            Self::UnknownSender(_) => "unknown_sender",
            Self::Delivery(_) => "delivery",
        }
    }

    /// Whether this error means nothing was recorded or delivered.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Delivery(_))
    }
}
