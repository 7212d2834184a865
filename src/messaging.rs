//! Messaging seams consumed by the saga commands
//!
//! The orchestrator never talks to a broker directly; commands publish and
//! consume through the [`Producer`] and [`Subscriber`] traits. The bundled
//! [`InMemoryBroker`] is a flume-backed implementation for in-process use
//! and tests; adapters for real brokers implement the same two traits.

use crate::error::{OrchestratorError, Result};
use async_trait::async_trait;
use flume::{Receiver, Sender};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Publishes a payload to a named channel
#[async_trait]
pub trait Producer: Send + Sync {
    async fn push(&self, ctx: &CancellationToken, channel: &str, payload: Vec<u8>) -> Result<()>;
}

/// Consumes the next available payload from a named channel
///
/// At most one caller at a time is expected per channel.
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn consume(&self, ctx: &CancellationToken, channel: &str) -> Result<Vec<u8>>;
}

/// In-process broker backed by one bounded flume channel per channel name
pub struct InMemoryBroker {
    capacity: usize,
    channels: RwLock<HashMap<String, (Sender<Vec<u8>>, Receiver<Vec<u8>>)>>,
}

impl InMemoryBroker {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            channels: RwLock::new(HashMap::new()),
        }
    }

    async fn endpoint(&self, channel: &str) -> (Sender<Vec<u8>>, Receiver<Vec<u8>>) {
        {
            let channels = self.channels.read().await;
            if let Some(endpoint) = channels.get(channel) {
                return endpoint.clone();
            }
        }

        let mut channels = self.channels.write().await;
        channels
            .entry(channel.to_string())
            .or_insert_with(|| flume::bounded::<Vec<u8>>(self.capacity))
            .clone()
    }

    /// Number of messages currently buffered on a channel
    pub async fn depth(&self, channel: &str) -> usize {
        let channels = self.channels.read().await;
        channels.get(channel).map_or(0, |(_, rx)| rx.len())
    }
}

#[async_trait]
impl Producer for InMemoryBroker {
    async fn push(&self, ctx: &CancellationToken, channel: &str, payload: Vec<u8>) -> Result<()> {
        if ctx.is_cancelled() {
            return Err(OrchestratorError::Cancelled(format!(
                "push to {channel} aborted"
            )));
        }

        let (sender, _) = self.endpoint(channel).await;
        tokio::select! {
            result = sender.send_async(payload) => result.map_err(|e| {
                OrchestratorError::Transport(format!("failed to publish to {channel}: {e}"))
            }),
            _ = ctx.cancelled() => Err(OrchestratorError::Cancelled(format!(
                "push to {channel} aborted"
            ))),
        }
    }
}

#[async_trait]
impl Subscriber for InMemoryBroker {
    async fn consume(&self, ctx: &CancellationToken, channel: &str) -> Result<Vec<u8>> {
        let (_, receiver) = self.endpoint(channel).await;
        tokio::select! {
            result = receiver.recv_async() => result.map_err(|e| {
                OrchestratorError::Transport(format!("failed to consume from {channel}: {e}"))
            }),
            _ = ctx.cancelled() => Err(OrchestratorError::Cancelled(format!(
                "consume from {channel} aborted"
            ))),
        }
    }
}
