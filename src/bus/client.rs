//! Message bus connection management
//!
//! Handles WebSocket connection, reconnection, incoming event filtering and
//! outgoing messages.

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, trace, warn};

use super::{BusEvent, Message};

const EVENT_CHANNEL_SIZE: usize = 64;
const OUTGOING_CHANNEL_SIZE: usize = 32;
const MAX_RECONNECT_DELAY_MS: u64 = 30_000;

/// Delay before reconnect attempt `attempt` (1-based)
pub(crate) fn reconnect_delay(attempt: u32) -> Duration {
    Duration::from_millis(std::cmp::min(
        MAX_RECONNECT_DELAY_MS,
        1000 * u64::from(attempt),
    ))
}

/// Owner side of a running bus client
pub struct BusHandle {
    events: mpsc::Receiver<BusEvent>,
    outgoing: mpsc::Sender<Message>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl BusHandle {
    /// Wait for the next lifecycle event
    /// Returns None once the client has stopped
    pub async fn next_event(&mut self) -> Option<BusEvent> {
        self.events.recv().await
    }

    /// Queue a message; dropped with a warning when the queue is full
    pub fn publish(&self, message: Message) {
        if let Err(e) = self.outgoing.try_send(message) {
            warn!("Dropping bus message: {}", e);
        }
    }

    /// Stop the client and wait for its task to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            if !e.is_cancelled() {
                warn!("Bus client task failed: {}", e);
            }
        }
    }
}

/// WebSocket client for the assistant's message bus
pub struct BusClient {
    url: String,
    reconnect_count: u32,
}

impl BusClient {
    /// Start a client task connecting to `url`
    pub fn spawn(url: impl Into<String>) -> BusHandle {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let (outgoing_tx, outgoing_rx) = mpsc::channel(OUTGOING_CHANNEL_SIZE);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let client = BusClient {
            url: url.into(),
            reconnect_count: 0,
        };
        let task = tokio::spawn(client.run(events_tx, outgoing_rx, shutdown_rx));

        BusHandle {
            events: events_rx,
            outgoing: outgoing_tx,
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(
        mut self,
        events_tx: mpsc::Sender<BusEvent>,
        mut outgoing_rx: mpsc::Receiver<Message>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            if *shutdown_rx.borrow() {
                debug!("Bus client shutting down");
                return;
            }

            match self
                .session(&events_tx, &mut outgoing_rx, &mut shutdown_rx)
                .await
            {
                Ok(()) if *shutdown_rx.borrow() => return,
                Ok(()) => warn!("🔌 Message bus connection closed"),
                Err(e) => debug!("Message bus session ended: {:#}", e),
            }

            if events_tx.is_closed() {
                return;
            }

            // Volume requests queued while offline are stale by now
            let mut dropped = 0;
            while outgoing_rx.try_recv().is_ok() {
                dropped += 1;
            }
            if dropped > 0 {
                debug!("Dropped {} queued bus messages", dropped);
            }

            self.reconnect_count += 1;
            let delay = reconnect_delay(self.reconnect_count);
            debug!(
                "⏳ Message bus reconnect #{} in {}ms",
                self.reconnect_count,
                delay.as_millis()
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_rx.changed() => {}
            }
        }
    }

    /// One connection, until it closes or shutdown is requested
    async fn session(
        &mut self,
        events_tx: &mpsc::Sender<BusEvent>,
        outgoing_rx: &mut mpsc::Receiver<Message>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let (ws, _) = connect_async(self.url.as_str())
            .await
            .with_context(|| format!("Failed to connect to message bus at {}", self.url))?;
        if self.reconnect_count > 0 {
            info!("✅ Message bus reconnected after {} attempts", self.reconnect_count);
        } else {
            info!("✅ Message bus connected at {}", self.url);
        }
        self.reconnect_count = 0;

        let (mut sink, mut stream) = ws.split();

        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        if let Some(event) = parse_event(&text) {
                            debug!("Bus event: {:?}", event);
                            if events_tx.send(event).await.is_err() {
                                return Ok(());
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e).context("Message bus read failed"),
                },

                Some(message) = outgoing_rx.recv() => {
                    let json = message.to_json().context("Failed to encode bus message")?;
                    debug!("📤 Bus message: {}", message.msg_type);
                    sink.send(WsMessage::Text(json))
                        .await
                        .context("Message bus write failed")?;
                }

                _ = shutdown_rx.changed() => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    return Ok(());
                }
            }
        }
    }
}

/// Decode a text frame into a lifecycle event the knob reacts to
pub(crate) fn parse_event(text: &str) -> Option<BusEvent> {
    match Message::parse(text) {
        Ok(message) => BusEvent::from_message_type(&message.msg_type),
        Err(e) => {
            trace!("Ignoring undecodable bus frame: {}", e);
            None
        }
    }
}
