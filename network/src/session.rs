// SPDX-License-Identifier: MIT OR Apache-2.0

//! Async driver around the core battle state machine.
//!
//! Every transition is serialized through one `select!` loop: local
//! commands, relayed channel events and timer firings all funnel into
//! [`wordbattle_core::battle::BattleState::apply`] one at a time, which
//! stands in for the run-to-completion atomicity the state machine
//! assumes. Timers are spawned tasks that post round-tagged events back
//! into the loop; a timer that outlives its round is suppressed inside
//! the state machine, so nothing here needs explicit cancellation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use wordbattle_core::battle::{BattleEvent, BattleState, Effect};
use wordbattle_core::protocol::{self, Inbound, Outbound};
use wordbattle_core::{BattleConfig, Outcome};

use crate::channel::{BattleChannel, ChannelEvent};

/// Local player actions fed into the session.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    /// The player answered the current problem correctly
    Correct,
    /// The player answered incorrectly
    Miss { problem: Option<String> },
    /// The player hit a wrong key
    Typo { expected: char },
    /// The player wants a rematch
    Retry,
    /// Freeform lobby chat
    Chat(String),
    /// Leave the battle and close the channel
    Leave,
}

/// Why the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The relay rejected the room id (close code 4000)
    RoomNotFound,
    /// The room already held two players (close code 4001)
    RoomFull,
    /// The transport dropped or the peer went away
    ConnectionLost,
    /// The local player left
    Left,
}

impl DisconnectReason {
    fn from_close_code(code: Option<u16>) -> Self {
        match code {
            Some(4000) => DisconnectReason::RoomNotFound,
            Some(4001) => DisconnectReason::RoomFull,
            _ => DisconnectReason::ConnectionLost,
        }
    }
}

/// Events broadcast to session observers (HUD, CLI).
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The channel opened
    Connected,
    /// The countdown value changed
    CountdownChanged(u8),
    /// A new round began; fetch a problem keyed by this token
    RoundStarted { round: u64 },
    /// Either score changed
    ScoresChanged { mine: u32, theirs: u32 },
    /// The opponent announced its display name
    OpponentNamed(String),
    /// The relay reported the room is full with two players
    Matched,
    /// Freeform chat line from the room
    Chat {
        sender: Option<String>,
        text: String,
    },
    /// The game ended
    GameOver { outcome: Outcome, duration: Duration },
    /// Both sides agreed to a rematch; a fresh countdown is running
    Restarted,
    /// The session is over
    Disconnected { reason: DisconnectReason },
}

/// Handle to a running battle session.
pub struct BattleSession {
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    events_tx: broadcast::Sender<SessionEvent>,
    state: Arc<RwLock<BattleState>>,
    _task: JoinHandle<()>,
}

impl BattleSession {
    /// Spawn the session loop over an established channel.
    pub fn spawn(
        channel: BattleChannel,
        channel_events: mpsc::UnboundedReceiver<ChannelEvent>,
        player_name: String,
        config: BattleConfig,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (events_tx, _keepalive_rx) = broadcast::channel(100);
        let state = Arc::new(RwLock::new(BattleState::new(config)));

        let driver = Driver {
            channel,
            player_name,
            state: state.clone(),
            events_tx: events_tx.clone(),
            game_started_at: None,
            last_close_code: None,
            leaving: false,
        };
        let task = tokio::spawn(driver.run(cmd_rx, channel_events, _keepalive_rx));

        Self {
            cmd_tx,
            events_tx,
            state,
            _task: task,
        }
    }

    /// Get a receiver for session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    /// Snapshot of the current battle state.
    pub async fn state(&self) -> BattleState {
        self.state.read().await.clone()
    }

    /// Queue a local command; dropped if the session already ended.
    pub fn command(&self, cmd: SessionCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            tracing::debug!("command after session end, dropping");
        }
    }

    pub fn answered_correctly(&self) {
        self.command(SessionCommand::Correct);
    }

    pub fn answered_wrong(&self, problem: Option<String>) {
        self.command(SessionCommand::Miss { problem });
    }

    pub fn request_retry(&self) {
        self.command(SessionCommand::Retry);
    }

    pub fn leave(&self) {
        self.command(SessionCommand::Leave);
    }
}

/// What the loop does after handling one event.
enum Flow {
    Continue,
    Stop,
}

struct Driver {
    channel: BattleChannel,
    player_name: String,
    state: Arc<RwLock<BattleState>>,
    events_tx: broadcast::Sender<SessionEvent>,
    /// Set when the first round of a game starts; cleared on restart.
    game_started_at: Option<Instant>,
    last_close_code: Option<u16>,
    leaving: bool,
}

impl Driver {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<SessionCommand>,
        mut channel_rx: mpsc::UnboundedReceiver<ChannelEvent>,
        _keepalive_rx: broadcast::Receiver<SessionEvent>,
    ) {
        let (timer_tx, mut timer_rx) = mpsc::unbounded_channel::<BattleEvent>();

        loop {
            let event = tokio::select! {
                cmd = cmd_rx.recv() => self.map_command(cmd),
                chan = channel_rx.recv() => self.map_channel_event(chan),
                Some(timed) = timer_rx.recv() => Some(timed),
            };

            let Some(event) = event else { continue };
            // A close always ends the loop, even when the state machine
            // already saw one and treats the event as a no-op.
            let closing = matches!(event, BattleEvent::ChannelClosed);
            let effects = {
                let mut state = self.state.write().await;
                state.apply(event.clone())
            };
            self.emit_progress(&event).await;
            if let Flow::Stop = self.handle_effects(effects, &timer_tx).await {
                break;
            }
            if closing {
                break;
            }
        }
        tracing::debug!("session loop ended");
    }

    /// Translate a local command into a state machine event, handling the
    /// out-of-band ones (chat, leave) directly.
    fn map_command(&mut self, cmd: Option<SessionCommand>) -> Option<BattleEvent> {
        match cmd {
            None | Some(SessionCommand::Leave) => {
                self.leaving = true;
                self.channel.close();
                Some(BattleEvent::ChannelClosed)
            }
            Some(SessionCommand::Correct) => Some(BattleEvent::LocalCorrect),
            Some(SessionCommand::Miss { problem }) => Some(BattleEvent::LocalMiss { problem }),
            Some(SessionCommand::Typo { expected }) => Some(BattleEvent::LocalTypo { expected }),
            Some(SessionCommand::Retry) => Some(BattleEvent::LocalRetry),
            Some(SessionCommand::Chat(text)) => {
                self.channel
                    .send(Outbound::Chat(text).encode(&self.player_name));
                None
            }
        }
    }

    fn map_channel_event(&mut self, event: Option<ChannelEvent>) -> Option<BattleEvent> {
        match event {
            None => Some(BattleEvent::ChannelClosed),
            Some(ChannelEvent::Opened) => {
                let _ = self.events_tx.send(SessionEvent::Connected);
                // Announce our display name to the opponent.
                self.channel
                    .send(Outbound::Name(self.player_name.clone()).encode(&self.player_name));
                Some(BattleEvent::ChannelOpened)
            }
            Some(ChannelEvent::Closed { code }) => {
                self.last_close_code = code;
                Some(BattleEvent::ChannelClosed)
            }
            Some(ChannelEvent::Message(raw)) => {
                match protocol::parse(&self.player_name, &raw)? {
                    Inbound::Score => Some(BattleEvent::RemoteScore),
                    Inbound::Miss => Some(BattleEvent::RemoteMiss),
                    Inbound::Retry => Some(BattleEvent::RemoteRetry),
                    Inbound::Name(name) => Some(BattleEvent::RemoteName(name)),
                    Inbound::Matched => {
                        // Re-announce our name; a peer that joined after
                        // us missed the announcement made on open.
                        self.channel.send(
                            Outbound::Name(self.player_name.clone()).encode(&self.player_name),
                        );
                        let _ = self.events_tx.send(SessionEvent::Matched);
                        None
                    }
                    Inbound::Chat { sender, text } => {
                        let _ = self.events_tx.send(SessionEvent::Chat { sender, text });
                        None
                    }
                }
            }
        }
    }

    /// Report state changes tied to the event itself rather than to an
    /// effect: countdown digits, score updates, the opponent name.
    async fn emit_progress(&self, event: &BattleEvent) {
        match event {
            BattleEvent::CountdownTick { .. } => {
                let state = self.state.read().await;
                if state.phase == wordbattle_core::Phase::Countdown {
                    let _ = self
                        .events_tx
                        .send(SessionEvent::CountdownChanged(state.countdown));
                }
            }
            BattleEvent::LocalCorrect | BattleEvent::RemoteScore => {
                let state = self.state.read().await;
                let _ = self.events_tx.send(SessionEvent::ScoresChanged {
                    mine: state.my_score,
                    theirs: state.opponent_score,
                });
            }
            BattleEvent::RemoteName(name) => {
                let _ = self
                    .events_tx
                    .send(SessionEvent::OpponentNamed(name.clone()));
            }
            _ => {}
        }
    }

    async fn handle_effects(
        &mut self,
        effects: Vec<Effect>,
        timer_tx: &mpsc::UnboundedSender<BattleEvent>,
    ) -> Flow {
        let config = { self.state.read().await.config().clone() };
        for effect in effects {
            match effect {
                Effect::Send(outbound) => {
                    self.channel.send(outbound.encode(&self.player_name));
                }
                Effect::StartCountdown { round } => {
                    if round > 0 {
                        // A countdown at a non-zero token is a rematch.
                        self.game_started_at = None;
                        let _ = self.events_tx.send(SessionEvent::Restarted);
                    }
                    let _ = self
                        .events_tx
                        .send(SessionEvent::CountdownChanged(config.countdown_from));
                    spawn_countdown(timer_tx.clone(), round, config.countdown_from);
                }
                Effect::ScheduleAdvance { round } => {
                    spawn_timer(
                        timer_tx.clone(),
                        config.advance_delay,
                        BattleEvent::AdvanceElapsed { round },
                    );
                }
                Effect::ArmStallTimer { round } => {
                    spawn_timer(
                        timer_tx.clone(),
                        config.stall_timeout,
                        BattleEvent::StallElapsed { round },
                    );
                }
                Effect::RoundStarted { round } => {
                    if self.game_started_at.is_none() {
                        self.game_started_at = Some(Instant::now());
                    }
                    let _ = self.events_tx.send(SessionEvent::RoundStarted { round });
                }
                Effect::GameOver { outcome } => {
                    let duration = self
                        .game_started_at
                        .map(|t| t.elapsed())
                        .unwrap_or_default();
                    let _ = self
                        .events_tx
                        .send(SessionEvent::GameOver { outcome, duration });
                }
                Effect::Disconnected => {
                    let reason = if self.leaving {
                        DisconnectReason::Left
                    } else {
                        DisconnectReason::from_close_code(self.last_close_code)
                    };
                    let _ = self.events_tx.send(SessionEvent::Disconnected { reason });
                    return Flow::Stop;
                }
            }
        }
        Flow::Continue
    }
}

/// Tick the countdown once per second. One extra tick past zero moves
/// the held start cue into play. The ticks carry the round token they
/// were armed with; the state machine drops ticks from a countdown that
/// is no longer current.
fn spawn_countdown(timer_tx: mpsc::UnboundedSender<BattleEvent>, round: u64, from: u8) {
    tokio::spawn(async move {
        for _ in 0..=from {
            tokio::time::sleep(Duration::from_secs(1)).await;
            if timer_tx
                .send(BattleEvent::CountdownTick { round })
                .is_err()
            {
                return;
            }
        }
    });
}

fn spawn_timer(timer_tx: mpsc::UnboundedSender<BattleEvent>, after: Duration, event: BattleEvent) {
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        let _ = timer_tx.send(event);
    });
}
