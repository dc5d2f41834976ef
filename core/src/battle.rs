// SPDX-License-Identifier: MIT OR Apache-2.0

//! Round state machine for a two-player battle.
//!
//! Each side of a battle owns one [`BattleState`] and feeds it every local
//! action, every relayed opponent message and every timer firing as a
//! [`BattleEvent`]. The transition function is pure: it mutates the state
//! record and returns the [`Effect`]s the surrounding driver must perform
//! (send a message, arm a timer, fetch a new problem). Timers are tagged
//! with the round token they were armed in, so a stale firing is a no-op
//! once the round has advanced by other means.

use std::collections::HashMap;

use crate::{BattleConfig, Outcome, Phase};

/// Input to the state machine: local actions, relayed opponent events and
/// timer firings.
#[derive(Debug, Clone, PartialEq)]
pub enum BattleEvent {
    /// The duplex channel to the room opened
    ChannelOpened,
    /// One second of the pre-game countdown elapsed
    CountdownTick { round: u64 },
    /// The local player answered correctly
    LocalCorrect,
    /// The local player answered incorrectly; carries the missed word for
    /// the end-of-game review list
    LocalMiss { problem: Option<String> },
    /// The local player hit a wrong key mid-answer
    LocalTypo { expected: char },
    /// The local player asked for a rematch
    LocalRetry,
    /// The opponent answered correctly
    RemoteScore,
    /// The opponent answered incorrectly
    RemoteMiss,
    /// The opponent asked for a rematch
    RemoteRetry,
    /// The opponent announced its display name
    RemoteName(String),
    /// The post-answer presentation delay elapsed
    AdvanceElapsed { round: u64 },
    /// The stall failsafe fired
    StallElapsed { round: u64 },
    /// The duplex channel closed
    ChannelClosed,
}

/// Side effects requested by a transition. The async driver executes these;
/// the state machine itself performs no I/O.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send a message to the opponent via the relay
    Send(crate::protocol::Outbound),
    /// Begin ticking the countdown once per second, tagged with the
    /// current round token
    StartCountdown { round: u64 },
    /// Arm the post-answer presentation delay for the given round
    ScheduleAdvance { round: u64 },
    /// Arm the stall failsafe for the given round
    ArmStallTimer { round: u64 },
    /// A new round began; fetch and display a fresh problem
    RoundStarted { round: u64 },
    /// The game ended
    GameOver { outcome: Outcome },
    /// The channel closed; tear down
    Disconnected,
}

/// Per-game statistics surfaced on the finished screen.
///
/// `win_streak` survives rematch resets; everything else is per-game.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BattleStats {
    /// Wrong keystrokes this game
    pub typo_count: u32,
    /// Per-key tally of wrong keystrokes
    pub missed_keys: HashMap<char, u32>,
    /// Words the local player answered incorrectly
    pub missed_words: Vec<String>,
    /// Consecutive wins across rematches in this session
    pub win_streak: u32,
}

/// One side's complete view of a battle.
#[derive(Debug, Clone)]
pub struct BattleState {
    config: BattleConfig,
    /// Current game phase
    pub phase: Phase,
    /// Remaining countdown value while in [`Phase::Countdown`]
    pub countdown: u8,
    /// Round token; strictly greater than the previous value means a new
    /// round. Also guards timer and fetch staleness.
    pub round: u64,
    /// Local score, monotonically non-decreasing within a game
    pub my_score: u32,
    /// Opponent score as reported over the channel
    pub opponent_score: u32,
    /// The local player answered this round incorrectly
    pub i_missed: bool,
    /// The opponent reported a miss this round
    pub opponent_missed: bool,
    /// The local player requested a rematch
    pub retry_ready: bool,
    /// The opponent requested a rematch
    pub opponent_retry_ready: bool,
    /// Opponent display name, once announced
    pub opponent_name: Option<String>,
    /// Set when the phase reaches [`Phase::Finished`]
    pub outcome: Option<Outcome>,
    /// Finished-screen statistics
    pub stats: BattleStats,
}

impl BattleState {
    /// Create a fresh session state in [`Phase::Waiting`].
    pub fn new(config: BattleConfig) -> Self {
        Self {
            config,
            phase: Phase::Waiting,
            countdown: 0,
            round: 0,
            my_score: 0,
            opponent_score: 0,
            i_missed: false,
            opponent_missed: false,
            retry_ready: false,
            opponent_retry_ready: false,
            opponent_name: None,
            outcome: None,
            stats: BattleStats::default(),
        }
    }

    /// The configured winning threshold.
    pub fn winning_score(&self) -> u32 {
        self.config.winning_score
    }

    pub fn config(&self) -> &BattleConfig {
        &self.config
    }

    /// Apply one event and return the effects the driver must perform.
    pub fn apply(&mut self, event: BattleEvent) -> Vec<Effect> {
        if self.phase == Phase::Closed {
            return Vec::new();
        }
        match event {
            BattleEvent::ChannelOpened => self.on_channel_opened(),
            BattleEvent::CountdownTick { round } => self.on_countdown_tick(round),
            BattleEvent::LocalCorrect => self.on_local_correct(),
            BattleEvent::LocalMiss { problem } => self.on_local_miss(problem),
            BattleEvent::LocalTypo { expected } => self.on_local_typo(expected),
            BattleEvent::LocalRetry => self.on_local_retry(),
            BattleEvent::RemoteScore => self.on_remote_score(),
            BattleEvent::RemoteMiss => self.on_remote_miss(),
            BattleEvent::RemoteRetry => self.on_remote_retry(),
            BattleEvent::RemoteName(name) => {
                self.opponent_name = Some(name);
                Vec::new()
            }
            BattleEvent::AdvanceElapsed { round } => self.on_advance_elapsed(round),
            BattleEvent::StallElapsed { round } => self.on_stall_elapsed(round),
            BattleEvent::ChannelClosed => {
                tracing::debug!(phase = ?self.phase, "channel closed, tearing down");
                self.phase = Phase::Closed;
                vec![Effect::Disconnected]
            }
        }
    }

    fn on_channel_opened(&mut self) -> Vec<Effect> {
        if self.phase != Phase::Waiting {
            return Vec::new();
        }
        self.start_countdown()
    }

    fn start_countdown(&mut self) -> Vec<Effect> {
        self.phase = Phase::Countdown;
        self.countdown = self.config.countdown_from;
        tracing::debug!(from = self.countdown, round = self.round, "countdown started");
        vec![Effect::StartCountdown { round: self.round }]
    }

    fn on_countdown_tick(&mut self, round: u64) -> Vec<Effect> {
        if self.phase != Phase::Countdown || round != self.round {
            return Vec::new();
        }
        if self.countdown > 0 {
            // Zero is held for one full tick so the start cue is shown
            // before the first problem appears.
            self.countdown -= 1;
            return Vec::new();
        }
        self.phase = Phase::Playing;
        self.round += 1;
        self.i_missed = false;
        self.opponent_missed = false;
        tracing::debug!(round = self.round, "battle started");
        vec![Effect::RoundStarted { round: self.round }]
    }

    fn on_local_correct(&mut self) -> Vec<Effect> {
        if self.phase != Phase::Playing {
            return Vec::new();
        }
        self.my_score += 1;
        let mut effects = vec![Effect::Send(crate::protocol::Outbound::Score)];
        if self.my_score >= self.config.winning_score {
            effects.extend(self.finish(Outcome::Victory));
        } else {
            // A local correct answer always advances, after a short
            // presentation delay.
            effects.push(Effect::ScheduleAdvance { round: self.round });
        }
        effects
    }

    fn on_local_miss(&mut self, problem: Option<String>) -> Vec<Effect> {
        if self.phase != Phase::Playing || self.i_missed {
            return Vec::new();
        }
        self.i_missed = true;
        if let Some(word) = problem {
            self.stats.missed_words.push(word);
        }
        let mut effects = vec![Effect::Send(crate::protocol::Outbound::Miss)];
        if self.opponent_missed {
            // The opponent had already missed; we were the straggler.
            effects.extend(self.advance_round());
        } else {
            effects.push(Effect::ArmStallTimer { round: self.round });
        }
        effects
    }

    fn on_local_typo(&mut self, expected: char) -> Vec<Effect> {
        if self.phase == Phase::Playing {
            self.stats.typo_count += 1;
            let key = expected.to_ascii_uppercase();
            *self.stats.missed_keys.entry(key).or_insert(0) += 1;
        }
        Vec::new()
    }

    fn on_remote_score(&mut self) -> Vec<Effect> {
        if self.phase != Phase::Playing {
            return Vec::new();
        }
        self.opponent_score += 1;
        if self.opponent_score >= self.config.winning_score {
            self.finish(Outcome::Defeat)
        } else {
            // The opponent's correct answer forces both sides onto the
            // next problem.
            self.advance_round()
        }
    }

    fn on_remote_miss(&mut self) -> Vec<Effect> {
        if self.phase != Phase::Playing || self.opponent_missed {
            return Vec::new();
        }
        self.opponent_missed = true;
        if self.i_missed {
            self.advance_round()
        } else {
            vec![Effect::ArmStallTimer { round: self.round }]
        }
    }

    fn on_local_retry(&mut self) -> Vec<Effect> {
        if self.phase != Phase::Finished || self.retry_ready {
            return Vec::new();
        }
        self.retry_ready = true;
        let mut effects = vec![Effect::Send(crate::protocol::Outbound::Retry)];
        effects.extend(self.maybe_restart());
        effects
    }

    fn on_remote_retry(&mut self) -> Vec<Effect> {
        if self.phase != Phase::Finished {
            return Vec::new();
        }
        self.opponent_retry_ready = true;
        self.maybe_restart()
    }

    fn on_advance_elapsed(&mut self, round: u64) -> Vec<Effect> {
        if self.phase != Phase::Playing || round != self.round {
            return Vec::new();
        }
        self.advance_round()
    }

    fn on_stall_elapsed(&mut self, round: u64) -> Vec<Effect> {
        if self.phase != Phase::Playing || round != self.round {
            return Vec::new();
        }
        tracing::debug!(round, "stall timeout, forcing round advance");
        self.advance_round()
    }

    /// Move to the next round. Incrementing the round token invalidates
    /// every timer armed in the finished round.
    fn advance_round(&mut self) -> Vec<Effect> {
        self.round += 1;
        self.i_missed = false;
        self.opponent_missed = false;
        vec![Effect::RoundStarted { round: self.round }]
    }

    fn finish(&mut self, outcome: Outcome) -> Vec<Effect> {
        self.phase = Phase::Finished;
        self.outcome = Some(outcome);
        match outcome {
            Outcome::Victory => self.stats.win_streak += 1,
            Outcome::Defeat => self.stats.win_streak = 0,
        }
        tracing::info!(
            ?outcome,
            my_score = self.my_score,
            opponent_score = self.opponent_score,
            "battle finished"
        );
        vec![Effect::GameOver { outcome }]
    }

    /// Restart the game once both sides have agreed to a rematch.
    fn maybe_restart(&mut self) -> Vec<Effect> {
        if !(self.retry_ready && self.opponent_retry_ready) {
            return Vec::new();
        }
        self.my_score = 0;
        self.opponent_score = 0;
        self.i_missed = false;
        self.opponent_missed = false;
        self.retry_ready = false;
        self.opponent_retry_ready = false;
        self.outcome = None;
        self.round += 1;
        // Per-game stats reset; the win streak carries across rematches.
        self.stats.typo_count = 0;
        self.stats.missed_keys.clear();
        self.stats.missed_words.clear();
        tracing::info!(round = self.round, "rematch agreed, restarting");
        self.start_countdown()
    }
}
