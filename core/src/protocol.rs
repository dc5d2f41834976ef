// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text wire protocol relayed between the two sides of a battle.
//!
//! Every frame is a plain string of the form `sender:BODY`. The relay fans
//! frames out to every member of the room including the sender, so echo
//! suppression happens here, on the consuming side: a frame whose sender
//! prefix equals the local player name is dropped before interpretation.
//!
//! The three semantic bodies (`SCORE_UP`, `MISS`, `RETRY`) are recognized
//! by substring containment. A `NAME:` body carries the sender's display
//! name and `MATCHED` is the relay's room-ready notice. Anything else is
//! surfaced as a freeform chat line for the lobby and ignored by the
//! state machine.

/// Message bodies this side can emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// "I answered correctly"
    Score,
    /// "I answered incorrectly"
    Miss,
    /// "I want a rematch"
    Retry,
    /// Announce the local display name
    Name(String),
    /// Freeform lobby chat
    Chat(String),
}

impl Outbound {
    fn body(&self) -> String {
        match self {
            Outbound::Score => "SCORE_UP".to_string(),
            Outbound::Miss => "MISS".to_string(),
            Outbound::Retry => "RETRY".to_string(),
            Outbound::Name(name) => format!("NAME:{name}"),
            Outbound::Chat(text) => text.clone(),
        }
    }

    /// Render the full wire frame, prefixed with the sender name.
    pub fn encode(&self, sender: &str) -> String {
        format!("{}:{}", sender, self.body())
    }
}

/// Interpreted inbound frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// The opponent answered correctly
    Score,
    /// The opponent answered incorrectly
    Miss,
    /// The opponent wants a rematch
    Retry,
    /// The opponent's display name
    Name(String),
    /// The relay reports the room is full with two players
    Matched,
    /// Unrecognized text, kept for the lobby chat log
    Chat {
        sender: Option<String>,
        text: String,
    },
}

/// Parse a raw relayed frame. Returns `None` for frames this session
/// produced itself (self-echo) — with the exception of `MATCHED`, which
/// the relay addresses to the whole room.
pub fn parse(local_name: &str, raw: &str) -> Option<Inbound> {
    let (sender, command) = match raw.split_once(':') {
        Some((sender, rest)) => (Some(sender), rest),
        None => (None, raw),
    };

    if command == "MATCHED" {
        return Some(Inbound::Matched);
    }
    if sender == Some(local_name) {
        tracing::trace!(frame = raw, "dropping self-echo");
        return None;
    }
    if let Some(name) = command.strip_prefix("NAME:") {
        return Some(Inbound::Name(name.to_string()));
    }
    if command.contains("SCORE_UP") {
        return Some(Inbound::Score);
    }
    if command.contains("RETRY") {
        return Some(Inbound::Retry);
    }
    if command.contains("MISS") {
        return Some(Inbound::Miss);
    }
    Some(Inbound::Chat {
        sender: sender.map(str::to_string),
        text: command.to_string(),
    })
}
