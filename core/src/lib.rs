// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wordbattle Core - Battle Synchronization Logic
//!
//! This crate provides the core battle functionality including:
//! - The round state machine driving a two-player word battle
//! - The text wire protocol relayed between the two sides
//! - Read-only view derivation for the battle HUD
//!
//! Both sides of a battle run this state machine independently and
//! exchange relayed text messages; there is no server-side authority.

#![deny(unsafe_code)]
#![deny(clippy::all)]

pub mod battle;
pub mod protocol;
pub mod view;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Game phase of one side of a battle session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Connected but the game has not started yet
    Waiting,
    /// Pre-game countdown is running
    Countdown,
    /// A round is live
    Playing,
    /// Someone reached the winning score
    Finished,
    /// The channel closed; no further transitions
    Closed,
}

/// Final outcome of a game as seen by the local side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// The local score reached the winning threshold
    Victory,
    /// The opponent reached the winning threshold first
    Defeat,
}

/// Tunable timing and scoring parameters for a battle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleConfig {
    /// Score a side must reach to end the game
    pub winning_score: u32,
    /// Countdown start value, ticked down once per second
    pub countdown_from: u8,
    /// Presentation delay before a locally-won round advances
    pub advance_delay: Duration,
    /// Failsafe that forces round advancement when one side stalls
    pub stall_timeout: Duration,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            winning_score: 10,
            countdown_from: 3,
            advance_delay: Duration::from_millis(200),
            stall_timeout: Duration::from_secs(5),
        }
    }
}

impl BattleConfig {
    /// Check the configuration for values that would make a game unplayable
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.winning_score == 0 {
            return Err(CoreError::InvalidConfig("winning_score must be at least 1"));
        }
        if self.countdown_from == 0 {
            return Err(CoreError::InvalidConfig("countdown_from must be at least 1"));
        }
        Ok(())
    }
}

/// Errors produced by the core battle logic
#[derive(Debug, Error)]
pub enum CoreError {
    /// A configuration value is out of range
    #[error("invalid battle config: {0}")]
    InvalidConfig(&'static str),
}
