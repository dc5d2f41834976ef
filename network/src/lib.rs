// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wordbattle Network - relay transport and session driver
//!
//! This crate provides the networking functionality including:
//! - A WebSocket channel to a named room on the relay
//! - The async battle session loop around the core state machine
//! - The problem-fetch client with stale-response suppression
//! - The room lobby registry and the relay's warp routes

#![deny(unsafe_code)]

pub mod channel;
pub mod config;
pub mod lobby;
pub mod problems;
pub mod relay;
pub mod session;

/// Room identifier; doubles as the relay's broadcast-domain key.
pub type RoomId = String;

/// Player identifier inside a room. Also the echo-suppression prefix on
/// every wire frame the player sends.
pub type PlayerId = String;
