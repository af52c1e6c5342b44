//! Name negotiation.
//!
//! A new connection is prompted for a display name until it supplies one
//! that is non-blank and not already registered, or hangs up. Blank and
//! taken names are not errors: the client is simply asked again.

use crate::error::RegistryError;
use crate::network::codec::{ChatCodec, Input};
use crate::state::{SessionWriter, UserRegistry};
use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio_util::codec::FramedRead;
use tracing::debug;

pub const NAME_PROMPT: &str = "Please enter your name: ";
pub const BLANK_NAME: &str = "Name cannot be blank, please try again: ";

pub fn name_in_use(name: &str) -> String {
    format!("The name: {name} is already in use, please try again: ")
}

/// Negotiation exit condition.
#[derive(Debug)]
pub(super) enum Negotiated {
    /// A free name was chosen.
    Name(String),
    /// The client hung up first.
    Closed,
}

/// Prompt for a name and read candidates until one is acceptable.
///
/// A read error ends negotiation with an error; nothing is registered.
pub(super) async fn negotiate<R>(
    lines: &mut FramedRead<R, ChatCodec>,
    writer: &mut SessionWriter,
    registry: &UserRegistry,
) -> anyhow::Result<Negotiated>
where
    R: AsyncRead + Unpin,
{
    send(writer, NAME_PROMPT).await?;

    while let Some(item) = lines.next().await {
        let line = match item? {
            Input::Line(line) => line,
            discarded => {
                if let Some(notice) = discarded.notice() {
                    send(writer, notice).await?;
                }
                send(writer, NAME_PROMPT).await?;
                continue;
            }
        };

        let name = line.trim();
        if name.is_empty() {
            send(writer, BLANK_NAME).await?;
            continue;
        }
        if registry.contains(name) {
            debug!(name, "Name already in use");
            send(writer, &name_in_use(name)).await?;
            continue;
        }
        return Ok(Negotiated::Name(name.to_string()));
    }

    Ok(Negotiated::Closed)
}

/// Tell the client why registration refused its name so it can retry.
pub(super) async fn reject(writer: &mut SessionWriter, err: &RegistryError) -> anyhow::Result<()> {
    match err {
        RegistryError::EmptyName => send(writer, BLANK_NAME).await,
        RegistryError::NameConflict(name) | RegistryError::NotFound(name) => {
            send(writer, &name_in_use(name)).await
        }
    }
}

async fn send(writer: &mut SessionWriter, text: &str) -> anyhow::Result<()> {
    writer.write_all(text.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Session;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn run(input: &[u8], registry: &UserRegistry) -> (anyhow::Result<Negotiated>, String) {
        let (mut client, server) = tokio::io::duplex(4096);
        let (read, write) = tokio::io::split(server);
        let mut lines = FramedRead::new(read, ChatCodec::new(32));
        let mut writer: SessionWriter = Box::new(write);

        client.write_all(input).await.unwrap();
        client.shutdown().await.unwrap();

        let result = negotiate(&mut lines, &mut writer, registry).await;
        drop(writer);
        drop(lines);

        let mut out = String::new();
        client.read_to_string(&mut out).await.unwrap();
        (result, out)
    }

    #[tokio::test]
    async fn test_first_name_accepted() {
        let registry = UserRegistry::new();
        let (result, out) = run(b"alice\r\n", &registry).await;
        assert!(matches!(result.unwrap(), Negotiated::Name(n) if n == "alice"));
        assert_eq!(out, NAME_PROMPT);
    }

    #[tokio::test]
    async fn test_blank_name_reprompts() {
        let registry = UserRegistry::new();
        let (result, out) = run(b"\n   \nbob\n", &registry).await;
        assert!(matches!(result.unwrap(), Negotiated::Name(n) if n == "bob"));
        assert_eq!(out, format!("{NAME_PROMPT}{BLANK_NAME}{BLANK_NAME}"));
    }

    #[tokio::test]
    async fn test_taken_name_reprompts() {
        let registry = UserRegistry::new();
        registry
            .join(Arc::new(Session::new("alice", 8).0))
            .unwrap();

        let (result, out) = run(b"alice\nalice2\n", &registry).await;
        assert!(matches!(result.unwrap(), Negotiated::Name(n) if n == "alice2"));
        assert_eq!(out, format!("{NAME_PROMPT}{}", name_in_use("alice")));
    }

    #[tokio::test]
    async fn test_hangup_during_negotiation() {
        let registry = UserRegistry::new();
        let (result, _) = run(b"\n", &registry).await;
        assert!(matches!(result.unwrap(), Negotiated::Closed));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_overlong_name_reprompts() {
        let registry = UserRegistry::new();
        let long = format!("{}\ncarol\n", "x".repeat(64));
        let (result, out) = run(long.as_bytes(), &registry).await;
        assert!(matches!(result.unwrap(), Negotiated::Name(n) if n == "carol"));
        assert!(out.contains("Input line too long"));
    }
}
