//! Test server management.
//!
//! Runs a linechat server inside the test's runtime on ephemeral ports with
//! an in-memory transcript.

use linechat::config::Config;
use linechat::state::Matrix;
use linechat::transcript::{MemorySink, Transcript};
use linechat::{ChatServer, RunningServer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// A test server instance.
pub struct TestServer {
    running: Option<RunningServer>,
    pub sink: Arc<MemorySink>,
}

#[allow(dead_code)]
impl TestServer {
    /// Spawn a server with default settings on ephemeral ports.
    pub async fn spawn() -> anyhow::Result<Self> {
        Self::spawn_with(|_| {}).await
    }

    /// Spawn a server after letting the caller adjust the config.
    pub async fn spawn_with<F: FnOnce(&mut Config)>(configure: F) -> anyhow::Result<Self> {
        let mut config = Config::default();
        config.server.chat_port = 0;
        config.server.http_port = 0;
        configure(&mut config);

        let sink = Arc::new(MemorySink::new());
        let server = ChatServer::bind(&config, Transcript::new(sink.clone())).await?;
        let running = server.start()?;

        // The gateway flips the liveness flag once its task is scheduled.
        for _ in 0..50 {
            if running.matrix.is_listening() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        Ok(Self {
            running: Some(running),
            sink,
        })
    }

    fn running(&self) -> &RunningServer {
        self.running.as_ref().expect("server already shut down")
    }

    pub fn chat_addr(&self) -> SocketAddr {
        self.running().chat_addr
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.running().http_addr, path)
    }

    pub fn matrix(&self) -> &Arc<Matrix> {
        &self.running().matrix
    }

    /// Create a new test client connected to this server.
    pub async fn connect(&self) -> anyhow::Result<super::client::TestClient> {
        super::client::TestClient::connect(self.chat_addr()).await
    }

    /// Connect and complete name negotiation as `name`.
    pub async fn join(&self, name: &str) -> anyhow::Result<super::client::TestClient> {
        let mut client = self.connect().await?;
        client.negotiate(name).await?;
        Ok(client)
    }

    /// Wait until the registry satisfies `cond`.
    pub async fn wait_for<F: Fn(&Matrix) -> bool>(&self, cond: F) -> anyhow::Result<()> {
        for _ in 0..100 {
            if cond(self.matrix()) {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        anyhow::bail!("registry condition not met within 1 second")
    }

    /// Wait until the transcript contains `count` lines.
    pub async fn wait_for_transcript(&self, count: usize) -> anyhow::Result<Vec<String>> {
        for _ in 0..100 {
            let lines = self.sink.lines();
            if lines.len() >= count {
                return Ok(lines);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        anyhow::bail!("transcript did not reach {count} lines: {:?}", self.sink.lines())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.shutdown();
        }
    }
}
