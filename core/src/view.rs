// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-only HUD derivation.
//!
//! Everything here is a pure function of [`BattleState`]; nothing feeds
//! back into the state machine.

use crate::battle::{BattleState, BattleStats};
use crate::{Outcome, Phase};

/// Banner shown on the finished screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Banner {
    Win,
    Lose,
}

/// State of the rematch affordance on the finished screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryControl {
    /// Not on the finished screen
    Hidden,
    /// Clickable retry button
    Enabled,
    /// Local side is ready; show a "waiting for opponent" indicator
    WaitingForOpponent,
}

/// Renderable snapshot of a battle session.
#[derive(Debug, Clone, PartialEq)]
pub struct HudView {
    /// Score HUD is shown during countdown and play
    pub hud_visible: bool,
    /// Countdown digit, or `START!` at zero
    pub countdown_label: Option<String>,
    /// The quiz widget is mounted
    pub quiz_mounted: bool,
    /// Overlay telling the local player to wait for the opponent's answer
    pub waiting_for_opponent: bool,
    pub banner: Option<Banner>,
    pub retry: RetryControl,
    pub my_score: u32,
    pub opponent_score: u32,
    pub winning_score: u32,
    pub opponent_name: String,
}

impl HudView {
    /// Derive the view for the current state.
    pub fn derive(state: &BattleState) -> Self {
        let hud_visible = matches!(state.phase, Phase::Countdown | Phase::Playing);
        let countdown_label = (state.phase == Phase::Countdown).then(|| {
            if state.countdown > 0 {
                state.countdown.to_string()
            } else {
                "START!".to_string()
            }
        });
        let banner = (state.phase == Phase::Finished).then(|| {
            match state.outcome {
                Some(Outcome::Victory) => Banner::Win,
                // The banner compares the final local score against the
                // winning threshold.
                _ if state.my_score >= state.winning_score() => Banner::Win,
                _ => Banner::Lose,
            }
        });
        let retry = if state.phase != Phase::Finished {
            RetryControl::Hidden
        } else if state.retry_ready && !state.opponent_retry_ready {
            RetryControl::WaitingForOpponent
        } else {
            RetryControl::Enabled
        };

        Self {
            hud_visible,
            countdown_label,
            quiz_mounted: state.phase == Phase::Playing,
            waiting_for_opponent: state.phase == Phase::Playing
                && state.i_missed
                && !state.opponent_missed,
            banner,
            retry,
            my_score: state.my_score,
            opponent_score: state.opponent_score,
            winning_score: state.winning_score(),
            opponent_name: state
                .opponent_name
                .clone()
                .unwrap_or_else(|| "Rival".to_string()),
        }
    }
}

/// Letter grade for memorization accuracy: perfect recall is an S, each
/// band below allows a few more missed words.
pub fn memory_rank(score: u32, missed_words: usize) -> char {
    if score == 0 && missed_words == 0 {
        return '-';
    }
    match missed_words {
        0 => 'S',
        1 => 'A',
        2..=3 => 'B',
        4 => 'C',
        5 => 'D',
        _ => 'E',
    }
}

/// Letter grade for typing accuracy based on the typo count.
pub fn typing_rank(typo_count: u32, score: u32) -> char {
    if score == 0 && typo_count == 0 {
        return '-';
    }
    match typo_count {
        0 => 'S',
        1..=3 => 'A',
        4..=8 => 'B',
        9..=12 => 'C',
        13..=15 => 'D',
        _ => 'E',
    }
}

/// The five keys the player mistyped most often, worst first.
pub fn worst_keys(stats: &BattleStats) -> Vec<(char, u32)> {
    let mut keys: Vec<(char, u32)> = stats
        .missed_keys
        .iter()
        .map(|(key, count)| (*key, *count))
        .collect();
    keys.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    keys.truncate(5);
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::{BattleEvent, BattleState};
    use crate::BattleConfig;

    fn finished_state(win: bool) -> BattleState {
        let config = BattleConfig {
            winning_score: 2,
            ..BattleConfig::default()
        };
        let mut state = BattleState::new(config);
        state.apply(BattleEvent::ChannelOpened);
        for _ in 0..4 {
            state.apply(BattleEvent::CountdownTick { round: 0 });
        }
        for _ in 0..2 {
            if win {
                state.apply(BattleEvent::LocalCorrect);
            } else {
                state.apply(BattleEvent::RemoteScore);
            }
        }
        state
    }

    #[test]
    fn hud_hidden_while_waiting() {
        let state = BattleState::new(BattleConfig::default());
        let view = HudView::derive(&state);
        assert!(!view.hud_visible);
        assert!(!view.quiz_mounted);
        assert_eq!(view.retry, RetryControl::Hidden);
    }

    #[test]
    fn start_cue_shown_while_zero_is_held() {
        let mut state = BattleState::new(BattleConfig::default());
        state.apply(BattleEvent::ChannelOpened);
        for _ in 0..2 {
            state.apply(BattleEvent::CountdownTick { round: 0 });
        }
        assert_eq!(HudView::derive(&state).countdown_label.as_deref(), Some("1"));

        state.apply(BattleEvent::CountdownTick { round: 0 });
        let view = HudView::derive(&state);
        assert_eq!(view.countdown_label.as_deref(), Some("START!"));
        assert!(!view.quiz_mounted);

        state.apply(BattleEvent::CountdownTick { round: 0 });
        let view = HudView::derive(&state);
        assert!(view.countdown_label.is_none());
        assert!(view.quiz_mounted);
    }

    #[test]
    fn banner_follows_outcome() {
        assert_eq!(HudView::derive(&finished_state(true)).banner, Some(Banner::Win));
        assert_eq!(HudView::derive(&finished_state(false)).banner, Some(Banner::Lose));
    }

    #[test]
    fn retry_waits_for_opponent() {
        let mut state = finished_state(true);
        assert_eq!(HudView::derive(&state).retry, RetryControl::Enabled);
        state.apply(BattleEvent::LocalRetry);
        assert_eq!(HudView::derive(&state).retry, RetryControl::WaitingForOpponent);
    }

    #[test]
    fn ranks_follow_grade_bands() {
        assert_eq!(memory_rank(0, 0), '-');
        assert_eq!(memory_rank(5, 0), 'S');
        assert_eq!(memory_rank(5, 3), 'B');
        assert_eq!(typing_rank(0, 4), 'S');
        assert_eq!(typing_rank(10, 4), 'C');
        assert_eq!(typing_rank(20, 4), 'E');
    }
}
