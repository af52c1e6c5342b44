//! Broadcast engine: transcript-first fan-out to every other session.
//!
//! Each event is appended to the transcript before anything reaches a peer;
//! a failed append aborts the broadcast. Fan-out itself is best effort: a
//! peer that cannot take the message is recorded and delivery to the others
//! goes on. Messages are queued on each peer's SendQ from a registry
//! snapshot, so neither the registry lock nor the sender ever waits on a
//! peer's socket; a peer whose queue overflows is disconnected.

use crate::error::{BroadcastError, DeliveryError, DeliveryStage, PeerFailure, SendError};
use crate::state::{Session, UserRegistry, prompt};
use crate::transcript::{Transcript, TranscriptRecord};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, warn};

/// Bytes sent to peers for `record`.
///
/// User messages carry the sender's prompt; join/exit events are sent as
/// the raw transcript line.
pub fn wire_payload(record: &TranscriptRecord<'_>) -> String {
    match record {
        TranscriptRecord::Message { name, text } => format!("\n{name} >> {text}\n"),
        other => format!("\n{other}\n"),
    }
}

/// The roster line sent to a newly joined session.
pub fn roster_line(names: &[String]) -> String {
    format!("Current logged in users: {}\n", names.join(", "))
}

#[derive(Clone)]
pub struct BroadcastEngine {
    registry: Arc<UserRegistry>,
    transcript: Transcript,
}

impl BroadcastEngine {
    pub fn new(registry: Arc<UserRegistry>, transcript: Transcript) -> Self {
        Self {
            registry,
            transcript,
        }
    }

    pub fn registry(&self) -> &Arc<UserRegistry> {
        &self.registry
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Record `record` in the transcript, then fan it out.
    ///
    /// Returns the number of peers that received the event.
    pub fn deliver(&self, record: TranscriptRecord<'_>) -> Result<usize, BroadcastError> {
        self.transcript.append(&record)?;
        Ok(self.fan_out(&record)?)
    }

    /// Broadcast a chat line from `sender`.
    pub fn send_message(&self, sender: &str, text: &str) -> Result<usize, BroadcastError> {
        self.deliver(TranscriptRecord::message(sender, text))
    }

    /// Broadcast on behalf of `sender` without a socket of its own, e.g.
    /// from the HTTP control surface. `sender` must be registered.
    pub fn inject(&self, sender: &str, text: &str) -> Result<usize, BroadcastError> {
        if !self.registry.contains(sender) {
            return Err(BroadcastError::UnknownSender(sender.to_string()));
        }
        self.send_message(sender, text)
    }

    /// Queue an already-recorded event for every session except its sender,
    /// then re-issue the sender's prompt if it is still registered.
    pub(crate) fn fan_out(&self, record: &TranscriptRecord<'_>) -> Result<usize, DeliveryError> {
        let sender = record.name();
        let payload = Bytes::from(wire_payload(record));

        let snapshot = self.registry.snapshot();
        let mut errors = DeliveryError::default();
        let mut recipients = 0;
        let mut delivered = 0;
        for peer in snapshot.values().filter(|session| session.name() != sender) {
            recipients += 1;
            match deliver_to(peer, &payload) {
                Ok(()) => delivered += 1,
                Err(failure) => {
                    warn!(
                        sender,
                        peer = %failure.peer,
                        stage = failure.stage.as_str(),
                        error = %failure.error,
                        "Delivery to peer failed"
                    );
                    crate::metrics::record_delivery_failure(failure.stage.as_str());
                    errors.push(failure);
                }
            }
        }

        if let Some(own) = self.registry.get(sender)
            && let Err(error) = own.send_prompt()
        {
            warn!(sender, error = %error, "Failed to rewrite sender prompt");
            crate::metrics::record_delivery_failure(DeliveryStage::Prompt.as_str());
            errors.push(PeerFailure {
                peer: sender.to_string(),
                stage: DeliveryStage::Prompt,
                error,
            });
        }

        crate::metrics::record_broadcast(record.kind(), recipients, delivered);
        debug!(sender, kind = record.kind(), recipients, delivered, "Broadcast complete");

        errors.into_result().map(|()| delivered)
    }

    /// Send `target` the names of everyone else currently registered.
    ///
    /// Nothing is sent when `target` is alone. Returns whether a roster
    /// line was sent.
    pub fn announce_roster(&self, target: &Session) -> Result<bool, SendError> {
        let others: Vec<String> = self
            .registry
            .snapshot()
            .keys()
            .filter(|name| name.as_str() != target.name())
            .cloned()
            .collect();
        if others.is_empty() {
            return Ok(false);
        }
        target.send(roster_line(&others))?;
        Ok(true)
    }
}

fn deliver_to(peer: &Session, payload: &Bytes) -> Result<(), PeerFailure> {
    let fail = |stage, error| PeerFailure {
        peer: peer.name().to_string(),
        stage,
        error,
    };
    peer.send(payload.clone())
        .map_err(|e| fail(DeliveryStage::Message, e))?;
    peer.send(prompt(peer.name()))
        .map_err(|e| fail(DeliveryStage::Prompt, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::MemorySink;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, DuplexStream};

    struct Harness {
        engine: BroadcastEngine,
        sink: Arc<MemorySink>,
    }

    impl Harness {
        fn new() -> Self {
            let sink = Arc::new(MemorySink::new());
            let engine = BroadcastEngine::new(
                Arc::new(UserRegistry::new()),
                Transcript::new(sink.clone()),
            );
            Self { engine, sink }
        }

        /// Register `name` and return the client end of its connection.
        fn connect(&self, name: &str) -> DuplexStream {
            self.connect_with(name, 4096, 16).0
        }

        fn connect_with(&self, name: &str, pipe: usize, queue: usize) -> (DuplexStream, Arc<Session>) {
            let (client, server) = tokio::io::duplex(pipe);
            let (session, _writer) = Session::spawn(name, server, queue);
            let session = Arc::new(session);
            self.engine.registry().join(Arc::clone(&session)).unwrap();
            (client, session)
        }

        /// Register `name` with a connection that is already closed.
        fn connect_dead(&self, name: &str) {
            let (session, outbox) = Session::new(name, 16);
            drop(outbox);
            self.engine.registry().join(Arc::new(session)).unwrap();
        }
    }

    async fn read_available(client: &mut DuplexStream) -> String {
        let mut buf = vec![0u8; 4096];
        let mut out = String::new();
        while let Ok(Ok(n)) =
            tokio::time::timeout(Duration::from_millis(50), client.read(&mut buf)).await
        {
            if n == 0 {
                break;
            }
            out.push_str(&String::from_utf8_lossy(&buf[..n]));
        }
        out
    }

    #[test]
    fn test_wire_payloads() {
        let msg = TranscriptRecord::message("bob", "hi");
        assert_eq!(wire_payload(&msg), "\nbob >> hi\n");

        let names = vec!["alice".to_string(), "bob".to_string()];
        assert_eq!(roster_line(&names), "Current logged in users: alice, bob\n");
    }

    #[tokio::test]
    async fn test_message_reaches_peers_but_not_sender() {
        let h = Harness::new();
        let mut alice = h.connect("alice");
        let mut bob = h.connect("bob");

        let delivered = h.engine.send_message("bob", "hi").unwrap();
        assert_eq!(delivered, 1);

        assert_eq!(read_available(&mut alice).await, "\nbob >> hi\nalice >> ");
        // Sender only gets its prompt back.
        assert_eq!(read_available(&mut bob).await, "bob >> ");
        assert_eq!(h.sink.lines(), vec!["user: bob sent message: hi"]);
    }

    #[tokio::test]
    async fn test_failed_peer_does_not_block_others() {
        let h = Harness::new();
        let mut alice = h.connect("alice");
        h.connect_dead("bob");
        let mut carol = h.connect("carol");
        let _dave = h.connect("dave");

        let err = h.engine.send_message("dave", "still here").unwrap_err();
        let BroadcastError::Delivery(delivery) = err else {
            panic!("expected delivery error, got {err:?}");
        };
        assert_eq!(delivery.peers(), vec!["bob"]);
        assert_eq!(delivery.failures[0].stage, DeliveryStage::Message);
        assert_eq!(delivery.failures[0].error, SendError::Closed);

        assert_eq!(read_available(&mut alice).await, "\ndave >> still here\nalice >> ");
        assert_eq!(read_available(&mut carol).await, "\ndave >> still here\ncarol >> ");
        // Transcript is independent of delivery success.
        assert_eq!(h.sink.lines(), vec!["user: dave sent message: still here"]);
    }

    #[tokio::test]
    async fn test_stalled_peer_is_dropped_not_waited_on() {
        let h = Harness::new();
        // Never read from `_stalled`; its pipe holds less than one message.
        let (_stalled, stalled) = h.connect_with("bob", 64, 2);
        let mut carol = h.connect("carol");
        let _alice = h.connect("alice");
        let text = "x".repeat(200);

        let mut overflowed = false;
        for _ in 0..8 {
            // Queueing returns at once even though bob's writer is stuck.
            if let Err(BroadcastError::Delivery(delivery)) = h.engine.send_message("alice", &text) {
                assert_eq!(delivery.peers(), vec!["bob"]);
                overflowed = true;
                break;
            }
            tokio::task::yield_now().await;
        }

        assert!(overflowed);
        assert!(stalled.is_closed());
        let carol_out = read_available(&mut carol).await;
        assert!(carol_out.starts_with(&format!("\nalice >> {text}\ncarol >> ")));
    }

    #[tokio::test]
    async fn test_transcript_failure_aborts_before_delivery() {
        let h = Harness::new();
        let mut alice = h.connect("alice");
        let mut bob = h.connect("bob");
        h.sink.set_failing(true);

        let err = h.engine.send_message("bob", "lost").unwrap_err();
        assert!(matches!(err, BroadcastError::Transcript(_)));
        assert!(err.is_fatal());

        assert_eq!(read_available(&mut alice).await, "");
        assert_eq!(read_available(&mut bob).await, "");
    }

    #[tokio::test]
    async fn test_inject_requires_registered_sender() {
        let h = Harness::new();
        let mut alice = h.connect("alice");

        let err = h.engine.inject("mallory", "hello").unwrap_err();
        assert!(matches!(err, BroadcastError::UnknownSender(ref n) if n == "mallory"));
        assert!(h.sink.lines().is_empty());
        assert_eq!(read_available(&mut alice).await, "");
    }

    #[tokio::test]
    async fn test_system_event_payload() {
        let h = Harness::new();
        let mut alice = h.connect("alice");

        let record = TranscriptRecord::message("bob", "x");
        assert_eq!(h.engine.fan_out(&record).unwrap(), 1);
        read_available(&mut alice).await;

        let at = chrono::Utc::now();
        let left = TranscriptRecord::Left { name: "bob", at };
        h.engine.deliver(left.clone()).unwrap();
        assert_eq!(
            read_available(&mut alice).await,
            format!("\n{left}\nalice >> ")
        );
    }

    #[tokio::test]
    async fn test_roster_excludes_target() {
        let h = Harness::new();
        let _alice = h.connect("alice");
        let _bob = h.connect("bob");
        let (mut client, carol) = h.connect_with("carol", 4096, 16);

        assert!(h.engine.announce_roster(&carol).unwrap());
        assert_eq!(
            read_available(&mut client).await,
            "Current logged in users: alice, bob\n"
        );
    }

    #[tokio::test]
    async fn test_roster_skipped_when_alone() {
        let h = Harness::new();
        let (mut client, alice) = h.connect_with("alice", 4096, 16);

        assert!(!h.engine.announce_roster(&alice).unwrap());
        assert_eq!(read_available(&mut client).await, "");
    }
}
