//! Gateway - TCP listener that accepts incoming chat connections.
//!
//! The Gateway binds the chat socket and spawns a Connection task for each
//! incoming client. The accept loop never waits on a connection. A failed
//! accept marks the listener down (see `/health_check`) and ends the loop.

use crate::network::{Connection, SessionLimits};
use crate::state::Matrix;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, instrument};

/// Source of incoming client streams.
pub trait Acceptor: Send + 'static {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    fn accept(&mut self) -> impl Future<Output = io::Result<(Self::Stream, SocketAddr)>> + Send;
}

impl Acceptor for TcpListener {
    type Stream = TcpStream;

    fn accept(&mut self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
        TcpListener::accept(self)
    }
}

/// The Gateway accepts incoming connections and spawns handlers.
pub struct Gateway<A = TcpListener> {
    acceptor: A,
    matrix: Arc<Matrix>,
    limits: SessionLimits,
}

impl Gateway<TcpListener> {
    /// Bind the gateway to the specified address.
    pub async fn bind(
        addr: SocketAddr,
        matrix: Arc<Matrix>,
        limits: SessionLimits,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "Chat listener bound");
        Ok(Self::new(listener, matrix, limits))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.acceptor.local_addr()
    }
}

impl<A: Acceptor> Gateway<A> {
    pub fn new(acceptor: A, matrix: Arc<Matrix>, limits: SessionLimits) -> Self {
        Self {
            acceptor,
            matrix,
            limits,
        }
    }

    /// Run the gateway, accepting connections until accept fails.
    #[instrument(skip(self), name = "gateway")]
    pub async fn run(mut self) -> anyhow::Result<()> {
        self.matrix.set_listening(true);

        loop {
            match self.acceptor.accept().await {
                Ok((stream, addr)) => {
                    debug!(%addr, "Connection accepted");
                    crate::metrics::record_connection_accepted();

                    let (read, write) = tokio::io::split(stream);
                    let connection = Connection::new(
                        read,
                        write,
                        addr.to_string(),
                        Arc::clone(&self.matrix),
                        self.limits,
                    );
                    tokio::spawn(async move {
                        if let Err(e) = connection.run().await {
                            error!(%addr, error = %e, "Connection error");
                        }
                        debug!(%addr, "Connection closed");
                    });
                }
                Err(e) => {
                    error!(error = %e, "Unable to accept a connection, chat listener is down");
                    self.matrix.set_listening(false);
                    return Err(e.into());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NAME_PROMPT;
    use crate::transcript::{MemorySink, Transcript};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, DuplexStream};
    use tokio::sync::mpsc;

    /// Hands out whatever the test queues up.
    struct Scripted(mpsc::Receiver<io::Result<(DuplexStream, SocketAddr)>>);

    impl Acceptor for Scripted {
        type Stream = DuplexStream;

        async fn accept(&mut self) -> io::Result<(DuplexStream, SocketAddr)> {
            match self.0.recv().await {
                Some(next) => next,
                None => std::future::pending().await,
            }
        }
    }

    const LIMITS: SessionLimits = SessionLimits {
        max_line_length: 256,
        send_queue: 16,
    };

    fn addr() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_accept_error_marks_listener_down() {
        let matrix = Arc::new(Matrix::new(Transcript::new(Arc::new(MemorySink::new()))));
        let (tx, rx) = mpsc::channel(4);
        let gateway = Gateway::new(Scripted(rx), Arc::clone(&matrix), LIMITS);
        let task = tokio::spawn(gateway.run());

        // A healthy accept first: the client gets the name prompt.
        let (mut client, server) = tokio::io::duplex(1024);
        tx.send(Ok((server, addr()))).await.unwrap();
        let mut buf = vec![0u8; NAME_PROMPT.len()];
        tokio::time::timeout(Duration::from_secs(1), client.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(buf, NAME_PROMPT.as_bytes());
        assert!(matrix.is_listening());

        tx.send(Err(io::Error::other("too many open files"))).await.unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();

        assert!(result.is_err());
        assert!(!matrix.is_listening());
    }
}
