// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket channel to a battle room.
//!
//! [`BattleChannel::connect`] opens the duplex channel addressed by
//! `(room, player)` and hands back an event stream. Sending is
//! fire-and-forget with no delivery acknowledgment; there is no keepalive
//! and no reconnection, a close simply ends the session.

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;

/// Events surfaced by the channel, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The transport is established
    Opened,
    /// A raw text frame arrived; self-echo filtering is the consumer's job
    Message(String),
    /// The transport closed, with the close code when the peer sent one
    Closed { code: Option<u16> },
}

/// Outbound frames queued to the writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Close,
}

/// Fire-and-forget sender half of a room channel.
pub struct BattleChannel {
    outbound_tx: mpsc::UnboundedSender<Frame>,
}

impl BattleChannel {
    /// Open the channel to `ws_base/ws/{room_id}/{player_id}`.
    ///
    /// Returns the send handle and the inbound event stream. An `Opened`
    /// event is delivered first; a `Closed` event is always delivered
    /// last, whichever side initiated the close.
    pub async fn connect(
        ws_base: &str,
        room_id: &str,
        player_id: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ChannelEvent>)> {
        let url = format!(
            "{}/ws/{}/{}",
            ws_base.trim_end_matches('/'),
            room_id,
            player_id
        );
        let (stream, _response) = connect_async(&url)
            .await
            .with_context(|| format!("failed to open websocket to {url}"))?;
        tracing::debug!(%url, "room channel opened");

        let (mut sink, mut reader) = stream.split();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();

        let _ = events_tx.send(ChannelEvent::Opened);

        // Writer task: drains the outbound queue into the socket.
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                match frame {
                    Frame::Text(text) => {
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Frame::Close => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        });

        // Reader task: forwards text frames and reports the close code.
        tokio::spawn(async move {
            let mut close_code = None;
            while let Some(message) = reader.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if events_tx.send(ChannelEvent::Message(text)).is_err() {
                            return;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        close_code = frame.map(|f| u16::from(f.code));
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(error = %e, "websocket read failed");
                        break;
                    }
                }
            }
            let _ = events_tx.send(ChannelEvent::Closed { code: close_code });
        });

        Ok((Self { outbound_tx }, events_rx))
    }

    /// Channel backed by a plain queue instead of a socket, for driving a
    /// session in tests.
    pub fn detached() -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        (Self { outbound_tx }, outbound_rx)
    }

    /// Queue a text frame. Best-effort: a send after close is dropped.
    pub fn send(&self, text: String) {
        if self.outbound_tx.send(Frame::Text(text)).is_err() {
            tracing::debug!("send after channel closed, dropping frame");
        }
    }

    /// Ask the writer to close the socket.
    pub fn close(&self) {
        let _ = self.outbound_tx.send(Frame::Close);
    }
}
