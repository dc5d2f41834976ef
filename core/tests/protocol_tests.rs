// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire frame parsing: echo suppression, substring recognition and the
//! fallback chat path for unrecognized bodies.

use wordbattle_core::protocol::{parse, Inbound, Outbound};

#[test]
fn self_echo_is_discarded() {
    // Our own SCORE_UP fanned back by the relay must never count as an
    // opponent event.
    assert_eq!(parse("Player7", "Player7:SCORE_UP"), None);
    assert_eq!(parse("Player7", "Player7:MISS"), None);
    assert_eq!(parse("Player7", "Player7:RETRY"), None);
}

#[test]
fn opponent_commands_are_recognized() {
    assert_eq!(parse("Player7", "Rival:SCORE_UP"), Some(Inbound::Score));
    assert_eq!(parse("Player7", "Rival:MISS"), Some(Inbound::Miss));
    assert_eq!(parse("Player7", "Rival:RETRY"), Some(Inbound::Retry));
}

#[test]
fn recognition_is_by_substring() {
    assert_eq!(
        parse("Player7", "Rival:SCORE_UP please"),
        Some(Inbound::Score)
    );
    assert_eq!(parse("Player7", "Rival:a MISS here"), Some(Inbound::Miss));
}

#[test]
fn unrecognized_body_falls_back_to_chat() {
    assert_eq!(
        parse("Player7", "Rival:good luck!"),
        Some(Inbound::Chat {
            sender: Some("Rival".into()),
            text: "good luck!".into(),
        })
    );
    // No sender prefix at all.
    assert_eq!(
        parse("Player7", "hello"),
        Some(Inbound::Chat {
            sender: None,
            text: "hello".into(),
        })
    );
}

#[test]
fn round_trip_through_relay_frame() {
    let frame = Outbound::Retry.encode("Rival");
    assert_eq!(parse("Player7", &frame), Some(Inbound::Retry));
    let frame = Outbound::Name("Rival".into()).encode("Rival");
    assert_eq!(parse("Player7", &frame), Some(Inbound::Name("Rival".into())));
}

#[test]
fn similarly_named_players_are_distinct() {
    // "Player7" must not swallow frames from "Player77".
    assert_eq!(parse("Player7", "Player77:SCORE_UP"), Some(Inbound::Score));
}
