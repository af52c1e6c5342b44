//! Server assembly: binds both frontends around one shared Matrix.

use crate::config::Config;
use crate::http::{HttpLimits, HttpServer};
use crate::network::{Gateway, SessionLimits};
use crate::state::Matrix;
use crate::transcript::Transcript;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info};

/// Both listeners bound, nothing accepted yet.
pub struct ChatServer {
    matrix: Arc<Matrix>,
    gateway: Gateway,
    http: HttpServer,
}

impl ChatServer {
    /// Bind the chat and HTTP listeners described by `config`.
    pub async fn bind(config: &Config, transcript: Transcript) -> anyhow::Result<Self> {
        let server = &config.server;
        let matrix = Arc::new(Matrix::new(transcript));

        let gateway = Gateway::bind(server.chat_addr(), Arc::clone(&matrix), SessionLimits::from(server)).await?;
        let limits = HttpLimits {
            max_body: server.max_http_body,
            timeout: server.http_timeout(),
        };
        let http = HttpServer::bind(server.http_addr(), Arc::clone(&matrix), limits).await?;

        Ok(Self {
            matrix,
            gateway,
            http,
        })
    }

    pub fn matrix(&self) -> &Arc<Matrix> {
        &self.matrix
    }

    /// Start both accept loops on their own tasks.
    pub fn start(self) -> anyhow::Result<RunningServer> {
        let chat_addr = self.gateway.local_addr()?;
        let http_addr = self.http.local_addr()?;
        let span = crate::telemetry::spans::server(&chat_addr.to_string(), &http_addr.to_string());

        let http = self.http;
        let http_task = tokio::spawn(
            async move {
                if let Err(e) = http.run().await {
                    error!(error = %e, "HTTP server error");
                }
            }
            .instrument(span.clone()),
        );

        let gateway = self.gateway;
        let gateway_task = tokio::spawn(
            async move {
                if let Err(e) = gateway.run().await {
                    error!(error = %e, "Chat listener stopped");
                }
            }
            .instrument(span),
        );

        info!(%chat_addr, %http_addr, "Chat server started");
        Ok(RunningServer {
            matrix: self.matrix,
            chat_addr,
            http_addr,
            gateway_task,
            http_task,
        })
    }
}

/// Handles to a started server.
pub struct RunningServer {
    pub matrix: Arc<Matrix>,
    pub chat_addr: SocketAddr,
    pub http_addr: SocketAddr,
    gateway_task: JoinHandle<()>,
    http_task: JoinHandle<()>,
}

impl RunningServer {
    /// Stop accepting on both frontends. Open sessions are dropped with
    /// their tasks' runtime.
    pub fn shutdown(self) {
        self.gateway_task.abort();
        self.http_task.abort();
        self.matrix.set_listening(false);
    }
}
