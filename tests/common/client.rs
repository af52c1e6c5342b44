//! Test chat client.
//!
//! The chat protocol ends prompts without a newline, so the client works on
//! raw text: it buffers everything received and hands it out up to an
//! expected marker.

use linechat::network::NAME_PROMPT;
use linechat::state::prompt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// A test chat client.
pub struct TestClient {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    pending: String,
}

#[allow(dead_code)]
impl TestClient {
    /// Connect to a test server.
    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader,
            writer,
            pending: String::new(),
        })
    }

    /// Send one line, CRLF terminated like a telnet client.
    pub async fn send_line(&mut self, line: &str) -> anyhow::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Receive until `marker` has arrived; return everything up to and
    /// including it.
    pub async fn expect(&mut self, marker: &str) -> anyhow::Result<String> {
        loop {
            if let Some(pos) = self.pending.find(marker) {
                let end = pos + marker.len();
                let taken: String = self.pending.drain(..end).collect();
                return Ok(taken);
            }
            let mut buf = [0u8; 1024];
            let n = timeout(RECV_TIMEOUT, self.reader.read(&mut buf))
                .await
                .map_err(|_| anyhow::anyhow!("timed out waiting for {marker:?}, have {:?}", self.pending))??;
            if n == 0 {
                anyhow::bail!("connection closed waiting for {marker:?}, have {:?}", self.pending);
            }
            self.pending.push_str(&String::from_utf8_lossy(&buf[..n]));
        }
    }

    /// Receive until any of `markers` has arrived. Returns the index of the
    /// marker that came first and the text up to and including it.
    pub async fn expect_any(&mut self, markers: &[&str]) -> anyhow::Result<(usize, String)> {
        loop {
            let found = markers
                .iter()
                .enumerate()
                .filter_map(|(i, m)| self.pending.find(m).map(|pos| (pos + m.len(), i)))
                .min();
            if let Some((end, i)) = found {
                let taken: String = self.pending.drain(..end).collect();
                return Ok((i, taken));
            }
            let mut buf = [0u8; 1024];
            let n = timeout(RECV_TIMEOUT, self.reader.read(&mut buf))
                .await
                .map_err(|_| anyhow::anyhow!("timed out waiting for {markers:?}, have {:?}", self.pending))??;
            if n == 0 {
                anyhow::bail!("connection closed waiting for {markers:?}, have {:?}", self.pending);
            }
            self.pending.push_str(&String::from_utf8_lossy(&buf[..n]));
        }
    }

    /// Collect whatever arrives within `dur`, including anything buffered.
    pub async fn drain(&mut self, dur: Duration) -> String {
        let mut buf = [0u8; 1024];
        while let Ok(Ok(n)) = timeout(dur, self.reader.read(&mut buf)).await {
            if n == 0 {
                break;
            }
            self.pending.push_str(&String::from_utf8_lossy(&buf[..n]));
        }
        std::mem::take(&mut self.pending)
    }

    /// Answer the name prompt with `name` and wait for the first prompt.
    pub async fn negotiate(&mut self, name: &str) -> anyhow::Result<String> {
        self.expect(NAME_PROMPT).await?;
        self.send_line(name).await?;
        self.expect(&prompt(name)).await
    }

    /// Close the write side, as a client hanging up does.
    pub async fn hang_up(mut self) -> anyhow::Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
