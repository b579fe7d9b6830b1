//! Delivery of authorization links to the identity that must consent.
//!
//! The relay never formats or routes messages itself; it hands the link to a
//! [`MessageSink`] and moves on.

use async_trait::async_trait;
use colored::Colorize;
use tokio::sync::mpsc;

use crate::error::RelayError;

#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn deliver_authorization_link(&self, identity: &str, url: &str) -> Result<(), RelayError>;
}

/// Prints the link on stdout.
pub struct ConsoleSink;

#[async_trait]
impl MessageSink for ConsoleSink {
    async fn deliver_authorization_link(&self, identity: &str, url: &str) -> Result<(), RelayError> {
        println!(
            "{} {} must authorize access:\n  {}",
            "→".cyan(),
            identity.bold(),
            url.underline()
        );
        Ok(())
    }
}

/// Opens the link in the local browser, falling back to the console.
pub struct BrowserSink;

#[async_trait]
impl MessageSink for BrowserSink {
    async fn deliver_authorization_link(&self, identity: &str, url: &str) -> Result<(), RelayError> {
        if webbrowser::open(url).is_err() {
            tracing::warn!(identity, "could not open browser automatically");
            return ConsoleSink.deliver_authorization_link(identity, url).await;
        }
        Ok(())
    }
}

/// A link handed to a [`ChannelSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub identity: String,
    pub url: String,
}

/// Forwards links over a channel to whatever owns the chat surface.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl ChannelSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl MessageSink for ChannelSink {
    async fn deliver_authorization_link(&self, identity: &str, url: &str) -> Result<(), RelayError> {
        self.tx
            .send(Delivery {
                identity: identity.to_string(),
                url: url.to_string(),
            })
            .map_err(|_| RelayError::Messaging("delivery channel closed".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_sink_forwards_delivery() {
        let (sink, mut rx) = ChannelSink::channel();
        sink.deliver_authorization_link("u1", "https://auth/x")
            .await
            .unwrap();
        assert_eq!(
            rx.recv().await,
            Some(Delivery {
                identity: "u1".into(),
                url: "https://auth/x".into(),
            })
        );
    }

    #[tokio::test]
    async fn channel_sink_reports_closed_receiver() {
        let (sink, rx) = ChannelSink::channel();
        drop(rx);
        let err = sink
            .deliver_authorization_link("u1", "https://auth/x")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "messaging_error");
    }

    #[tokio::test]
    async fn console_sink_succeeds() {
        assert!(ConsoleSink
            .deliver_authorization_link("u1", "https://auth/x")
            .await
            .is_ok());
    }
}
