// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session driver behavior under virtual time: countdown pacing, the
//! stall failsafe bound, rematch restarts and close-code mapping. The
//! channel is detached, so every relayed frame is injected by hand.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use wordbattle_core::{BattleConfig, Outcome, Phase};
use wordbattle_network::channel::{BattleChannel, ChannelEvent, Frame};
use wordbattle_network::session::{BattleSession, DisconnectReason, SessionEvent};

fn config(winning_score: u32) -> BattleConfig {
    BattleConfig {
        winning_score,
        ..BattleConfig::default()
    }
}

fn spawn_session(
    winning_score: u32,
) -> (
    BattleSession,
    mpsc::UnboundedSender<ChannelEvent>,
    mpsc::UnboundedReceiver<Frame>,
) {
    let (channel, outbound_rx) = BattleChannel::detached();
    let (chan_tx, chan_rx) = mpsc::unbounded_channel();
    let session = BattleSession::spawn(channel, chan_rx, "Alice".to_string(), config(winning_score));
    (session, chan_tx, outbound_rx)
}

async fn wait_for<F>(rx: &mut broadcast::Receiver<SessionEvent>, pred: F) -> SessionEvent
where
    F: Fn(&SessionEvent) -> bool,
{
    loop {
        let event = rx.recv().await.expect("session event stream ended");
        if pred(&event) {
            return event;
        }
    }
}

fn sent_frames(outbound_rx: &mut mpsc::UnboundedReceiver<Frame>) -> Vec<Frame> {
    let mut frames = Vec::new();
    while let Ok(frame) = outbound_rx.try_recv() {
        frames.push(frame);
    }
    frames
}

#[tokio::test(start_paused = true)]
async fn countdown_shows_the_start_cue_then_plays() {
    let (session, chan_tx, mut outbound_rx) = spawn_session(10);
    let mut events = session.subscribe();

    let started = Instant::now();
    chan_tx.send(ChannelEvent::Opened).unwrap();

    wait_for(&mut events, |e| matches!(e, SessionEvent::Connected)).await;
    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::CountdownChanged(0))
    })
    .await;
    assert!(started.elapsed() >= Duration::from_secs(3));
    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::RoundStarted { round: 1 })
    })
    .await;

    // Three digit ticks plus one full second with the cue on screen.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(4), "countdown too fast: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5));

    let state = session.state().await;
    assert_eq!(state.phase, Phase::Playing);

    // The session announces the local name right after opening.
    let frames = sent_frames(&mut outbound_rx);
    assert!(frames.contains(&Frame::Text("Alice:NAME:Alice".to_string())));
}

#[tokio::test(start_paused = true)]
async fn lone_miss_advances_only_after_the_stall_timeout() {
    let (session, chan_tx, mut outbound_rx) = spawn_session(10);
    let mut events = session.subscribe();
    chan_tx.send(ChannelEvent::Opened).unwrap();
    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::RoundStarted { round: 1 })
    })
    .await;

    let missed_at = Instant::now();
    session.answered_wrong(None);
    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::RoundStarted { round: 2 })
    })
    .await;

    let elapsed = missed_at.elapsed();
    assert!(elapsed >= Duration::from_secs(5), "advanced too soon: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(6), "advanced too late: {elapsed:?}");
    assert!(sent_frames(&mut outbound_rx).contains(&Frame::Text("Alice:MISS".to_string())));
}

#[tokio::test(start_paused = true)]
async fn opponent_miss_beats_the_stall_timer() {
    let (session, chan_tx, _outbound_rx) = spawn_session(10);
    let mut events = session.subscribe();
    chan_tx.send(ChannelEvent::Opened).unwrap();
    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::RoundStarted { round: 1 })
    })
    .await;

    session.answered_wrong(None);
    let missed_at = Instant::now();
    chan_tx
        .send(ChannelEvent::Message("Bob:MISS".to_string()))
        .unwrap();
    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::RoundStarted { round: 2 })
    })
    .await;
    assert!(missed_at.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn opponent_reaching_threshold_ends_the_game() {
    let (session, chan_tx, _outbound_rx) = spawn_session(2);
    let mut events = session.subscribe();
    chan_tx.send(ChannelEvent::Opened).unwrap();
    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::RoundStarted { round: 1 })
    })
    .await;

    chan_tx
        .send(ChannelEvent::Message("Bob:SCORE_UP".to_string()))
        .unwrap();
    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::RoundStarted { round: 2 })
    })
    .await;
    chan_tx
        .send(ChannelEvent::Message("Bob:SCORE_UP".to_string()))
        .unwrap();
    let event = wait_for(&mut events, |e| matches!(e, SessionEvent::GameOver { .. })).await;
    match event {
        SessionEvent::GameOver { outcome, .. } => assert_eq!(outcome, Outcome::Defeat),
        _ => unreachable!(),
    }
    assert_eq!(session.state().await.phase, Phase::Finished);
}

#[tokio::test(start_paused = true)]
async fn mutual_retry_restarts_with_fresh_scores() {
    let (session, chan_tx, mut outbound_rx) = spawn_session(1);
    let mut events = session.subscribe();
    chan_tx.send(ChannelEvent::Opened).unwrap();
    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::RoundStarted { round: 1 })
    })
    .await;

    session.answered_correctly();
    let event = wait_for(&mut events, |e| matches!(e, SessionEvent::GameOver { .. })).await;
    match event {
        SessionEvent::GameOver { outcome, .. } => assert_eq!(outcome, Outcome::Victory),
        _ => unreachable!(),
    }

    session.request_retry();
    chan_tx
        .send(ChannelEvent::Message("Bob:RETRY".to_string()))
        .unwrap();
    wait_for(&mut events, |e| matches!(e, SessionEvent::Restarted)).await;

    let state = session.state().await;
    assert_eq!(state.phase, Phase::Countdown);
    assert_eq!(state.my_score, 0);
    assert_eq!(state.opponent_score, 0);
    assert_eq!(state.stats.win_streak, 1);

    let frames = sent_frames(&mut outbound_rx);
    assert!(frames.contains(&Frame::Text("Alice:RETRY".to_string())));

    // The rematch countdown runs back down into a new round.
    wait_for(&mut events, |e| matches!(e, SessionEvent::RoundStarted { .. })).await;
    assert_eq!(session.state().await.phase, Phase::Playing);
}

#[tokio::test(start_paused = true)]
async fn own_frames_fanned_back_are_ignored() {
    let (session, chan_tx, _outbound_rx) = spawn_session(10);
    let mut events = session.subscribe();
    chan_tx.send(ChannelEvent::Opened).unwrap();
    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::RoundStarted { round: 1 })
    })
    .await;

    chan_tx
        .send(ChannelEvent::Message("Alice:SCORE_UP".to_string()))
        .unwrap();
    // Force a later observable event through, then check nothing scored.
    chan_tx
        .send(ChannelEvent::Message("Bob:NAME:Bob".to_string()))
        .unwrap();
    wait_for(&mut events, |e| matches!(e, SessionEvent::OpponentNamed(_))).await;

    let state = session.state().await;
    assert_eq!(state.opponent_score, 0);
    assert_eq!(state.round, 1);
}

#[tokio::test(start_paused = true)]
async fn close_codes_map_to_reasons() {
    let (session, chan_tx, _outbound_rx) = spawn_session(10);
    let mut events = session.subscribe();
    chan_tx
        .send(ChannelEvent::Closed { code: Some(4001) })
        .unwrap();
    let event = wait_for(&mut events, |e| {
        matches!(e, SessionEvent::Disconnected { .. })
    })
    .await;
    match event {
        SessionEvent::Disconnected { reason } => assert_eq!(reason, DisconnectReason::RoomFull),
        _ => unreachable!(),
    }
    assert_eq!(session.state().await.phase, Phase::Closed);
}

#[tokio::test(start_paused = true)]
async fn leaving_closes_the_channel() {
    let (session, chan_tx, mut outbound_rx) = spawn_session(10);
    let mut events = session.subscribe();
    chan_tx.send(ChannelEvent::Opened).unwrap();
    wait_for(&mut events, |e| matches!(e, SessionEvent::Connected)).await;

    session.leave();
    let event = wait_for(&mut events, |e| {
        matches!(e, SessionEvent::Disconnected { .. })
    })
    .await;
    match event {
        SessionEvent::Disconnected { reason } => assert_eq!(reason, DisconnectReason::Left),
        _ => unreachable!(),
    }
    let frames = sent_frames(&mut outbound_rx);
    assert!(frames.contains(&Frame::Close));
}
