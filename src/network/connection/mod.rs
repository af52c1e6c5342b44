//! Connection - Handles an individual chat client.
//!
//! Each Connection runs in its own Tokio task:
//!
//! ```text
//! Phase 1: Negotiation   prompt for a name until a free one is given
//!    ↓
//! Phase 2: Joined        transcript, registry insert, roster, announcement
//!    ↓
//! Phase 3: Read loop     every line is broadcast to the other sessions
//!    ↓
//! Phase 4: Exited        SessionGuard deregisters and announces the exit
//! ```
//!
//! Phase 4 runs on every path out of phase 3, including errors and panics.

mod handshake;

pub use handshake::{BLANK_NAME, NAME_PROMPT, name_in_use};

use crate::config::ServerConfig;
use crate::network::codec::{ChatCodec, Input};
use crate::state::{JoinError, Matrix, Session, SessionGuard, SessionWriter};
use futures_util::StreamExt;
use handshake::Negotiated;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::FramedRead;
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};

/// Per-connection resource limits.
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    /// Longest accepted input line, in bytes.
    pub max_line_length: usize,
    /// Outbound messages queued before the client is disconnected.
    pub send_queue: usize,
}

impl From<&ServerConfig> for SessionLimits {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_line_length: config.max_line_length,
            send_queue: config.send_queue,
        }
    }
}

/// A client connection handler.
pub struct Connection<R> {
    peer: String,
    matrix: Arc<Matrix>,
    lines: FramedRead<R, ChatCodec>,
    writer: SessionWriter,
    limits: SessionLimits,
}

impl<R> Connection<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Create a handler over any split byte stream.
    pub fn new<W>(
        reader: R,
        writer: W,
        peer: impl Into<String>,
        matrix: Arc<Matrix>,
        limits: SessionLimits,
    ) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            peer: peer.into(),
            matrix,
            lines: FramedRead::new(reader, ChatCodec::new(limits.max_line_length)),
            writer: Box::new(writer),
            limits,
        }
    }

    /// Run the connection until the client leaves.
    #[instrument(skip(self), fields(peer = %self.peer), name = "connection")]
    pub async fn run(self) -> anyhow::Result<()> {
        let Self {
            matrix,
            mut lines,
            mut writer,
            limits,
            ..
        } = self;
        debug!("Client connected");

        // Phase 1 + 2: negotiate until the registry accepts the name. A name
        // can be taken between the negotiation check and the join; that is
        // treated like any other conflict.
        let (guard, session) = loop {
            let name = match handshake::negotiate(&mut lines, &mut writer, matrix.registry()).await? {
                Negotiated::Name(name) => name,
                Negotiated::Closed => {
                    debug!("Client left during negotiation");
                    return Ok(());
                }
            };

            let (session, writer_task) = Session::spawn(name, writer, limits.send_queue);
            let session = Arc::new(session);
            match matrix.join(Arc::clone(&session)) {
                Ok(guard) => break (guard, session),
                Err(JoinError::Registry(e)) => {
                    // Dropping the last handle closes the queue; the writer
                    // task then hands the socket back.
                    drop(
                        Arc::try_unwrap(session)
                            .map_err(|_| anyhow::anyhow!("session still shared after rejected join"))?,
                    );
                    writer = writer_task.await?;
                    handshake::reject(&mut writer, &e).await?;
                }
                Err(e @ JoinError::Transcript(_)) => {
                    error!(error = %e, "Unable to join chat server");
                    return Err(e.into());
                }
            }
        };

        // Phase 3 + 4
        let span = info_span!("session", name = %guard.name());
        let result = read_loop(&guard, &session, &mut lines, &matrix)
            .instrument(span)
            .await;
        guard.release();
        result
    }
}

async fn read_loop<R>(
    guard: &SessionGuard,
    session: &Session,
    lines: &mut FramedRead<R, ChatCodec>,
    matrix: &Matrix,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
{
    let name = guard.name();
    loop {
        let item = tokio::select! {
            item = lines.next() => item,
            () = session.closed() => {
                info!("Session disconnected, closing");
                return Ok(());
            }
        };
        let Some(item) = item else {
            break;
        };
        let text = match item {
            Ok(Input::Line(text)) => text,
            Ok(discarded) => {
                if let Some(notice) = discarded.notice() {
                    session.send(notice)?;
                }
                session.send_prompt()?;
                continue;
            }
            Err(e) => {
                info!(error = %e, "Read error, closing session");
                return Ok(());
            }
        };

        if let Err(e) = matrix.broadcaster.send_message(name, &text) {
            if e.is_fatal() {
                warn!(error = %e, code = e.error_code(), "Unable to send message, closing session");
                return Err(e.into());
            }
            // Peers that failed were logged by the engine; keep reading.
            debug!(error = %e, "Message partially delivered");
        }
    }
    debug!("Client closed connection");
    Ok(())
}
