// SPDX-License-Identifier: MIT OR Apache-2.0

//! Headless wordbattle client.
//!
//! Joins (or creates) a room on the relay and plays a battle from the
//! terminal: each round prints the fetched problem, and stdin lines are
//! interpreted as answers. `--bot` answers automatically instead, which
//! is what the integration smoke scripts use.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use rand::Rng;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use wordbattle_core::view::{memory_rank, typing_rank, worst_keys};
use wordbattle_core::Outcome;
use wordbattle_network::channel::BattleChannel;
use wordbattle_network::config::{self, ClientConfig};
use wordbattle_network::problems::{Problem, ProblemClient};
use wordbattle_network::session::{BattleSession, SessionCommand, SessionEvent};

#[derive(Debug, Parser)]
#[command(name = "wordbattle", about = "Word-battle terminal client", version)]
struct Args {
    /// Relay base URL; overrides the config file
    #[arg(long)]
    server: Option<String>,

    /// Room to join
    #[arg(long, default_value = "arena")]
    room: String,

    /// Display name
    #[arg(long, default_value = "Player")]
    name: String,

    /// Create the room before joining
    #[arg(long)]
    create: bool,

    /// Room password, used with --create
    #[arg(long, default_value = "")]
    password: String,

    /// Winning score, used with --create
    #[arg(long)]
    win_score: Option<u32>,

    /// Memory set to fetch problems from
    #[arg(long, default_value = "default")]
    set: String,

    /// List rooms on the relay and exit
    #[arg(long)]
    list: bool,

    /// Answer automatically instead of reading stdin
    #[arg(long)]
    bot: bool,

    /// Bot answer accuracy, 0.0 to 1.0
    #[arg(long, default_value_t = 0.9)]
    accuracy: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let args = Args::parse();
    let mut config = match config::load_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(error = %e, "config unavailable, using defaults");
            ClientConfig::default()
        }
    };
    if let Some(server) = &args.server {
        config.relay_url = server.clone();
    }

    let http = reqwest::Client::new();
    if args.list {
        return list_rooms(&http, &config.relay_url).await;
    }
    if args.create {
        create_room(&http, &config.relay_url, &args).await?;
    }

    let mut battle = config.battle();
    if let Some(score) = args.win_score {
        battle.winning_score = score;
    }
    battle.validate()?;

    println!("joining room '{}' as {}", args.room, args.name);
    let (channel, channel_events) = BattleChannel::connect(&config.ws_base(), &args.room, &args.name)
        .await
        .context("failed to connect to relay")?;
    let session = Arc::new(BattleSession::spawn(
        channel,
        channel_events,
        args.name.clone(),
        battle,
    ));
    let mut events = session.subscribe();
    let problems = ProblemClient::new(config.relay_url.clone());

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut current: Option<Problem> = None;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Ok(event) = event else { break };
                match event {
                    SessionEvent::Connected => println!("connected, waiting for the countdown"),
                    SessionEvent::Matched => println!("an opponent is here"),
                    SessionEvent::OpponentNamed(name) => println!("playing against {name}"),
                    SessionEvent::CountdownChanged(0) => println!("START!"),
                    SessionEvent::CountdownChanged(n) => println!("{n}..."),
                    SessionEvent::RoundStarted { round } => {
                        let generation = problems.begin();
                        let seed = format!("{}-{}", args.room, round);
                        match problems.fetch(&args.set, &seed, generation).await {
                            Ok(Some(problem)) => {
                                show_problem(&problem);
                                if args.bot {
                                    spawn_bot_answer(
                                        session.clone(),
                                        args.accuracy,
                                        problem.correct.text.clone(),
                                    );
                                }
                                current = Some(problem);
                            }
                            Ok(None) => {}
                            Err(e) => tracing::warn!(error = %e, "problem fetch failed"),
                        }
                    }
                    SessionEvent::ScoresChanged { mine, theirs } => {
                        println!("score: you {mine} - {theirs} them");
                    }
                    SessionEvent::Chat { sender, text } => {
                        let sender = sender.unwrap_or_else(|| "???".to_string());
                        println!("[{sender}] {text}");
                    }
                    SessionEvent::GameOver { outcome, duration } => {
                        show_results(&session, outcome, duration).await;
                        if args.bot {
                            session.leave();
                        } else {
                            println!("type 'retry' for a rematch or 'quit' to leave");
                        }
                    }
                    SessionEvent::Restarted => {
                        current = None;
                        println!("rematch accepted, get ready");
                    }
                    SessionEvent::Disconnected { reason } => {
                        println!("disconnected: {reason:?}");
                        break;
                    }
                }
            }
            line = lines.next_line(), if !args.bot => {
                match line.context("stdin read failed")? {
                    Some(text) => handle_line(&session, current.as_ref(), text.trim()),
                    None => session.leave(),
                }
            }
        }
    }
    Ok(())
}

async fn list_rooms(http: &reqwest::Client, base_url: &str) -> Result<()> {
    let rooms: serde_json::Value = http
        .get(format!("{base_url}/api/rooms"))
        .send()
        .await
        .context("room list request failed")?
        .error_for_status()?
        .json()
        .await?;
    let Some(rooms) = rooms.as_array() else {
        anyhow::bail!("unexpected room list shape");
    };
    if rooms.is_empty() {
        println!("no rooms open");
        return Ok(());
    }
    for room in rooms {
        println!(
            "{}  host={} players={} status={} first-to={}",
            room["name"].as_str().unwrap_or("?"),
            room["hostName"].as_str().unwrap_or("?"),
            room["playerCount"],
            room["status"].as_str().unwrap_or("?"),
            room["winScore"],
        );
    }
    Ok(())
}

async fn create_room(http: &reqwest::Client, base_url: &str, args: &Args) -> Result<()> {
    let response = http
        .post(format!("{base_url}/api/rooms"))
        .json(&serde_json::json!({
            "name": args.room,
            "hostName": args.name,
            "password": args.password,
            "winScore": args.win_score.unwrap_or(10),
            "memorySetId": args.set,
        }))
        .send()
        .await
        .context("room creation request failed")?;
    if !response.status().is_success() {
        let detail: serde_json::Value = response.json().await.unwrap_or_default();
        anyhow::bail!("room creation rejected: {}", detail["detail"]);
    }
    println!("room '{}' created", args.room);
    Ok(())
}

fn show_problem(problem: &Problem) {
    println!();
    println!("=== {} ({}) ===", problem.correct.text, problem.correct.kana);
    for (i, option) in problem.options.iter().enumerate() {
        println!("  {}. {}", i + 1, option.text);
    }
    println!("type the word (or its number); 'miss' to concede the round");
}

/// Interpret one stdin line, either a control word or an answer attempt.
fn handle_line(session: &BattleSession, current: Option<&Problem>, line: &str) {
    match line {
        "" => {}
        "quit" | "q" => session.leave(),
        "retry" => session.request_retry(),
        "ok" => session.answered_correctly(),
        "miss" => session.answered_wrong(current.map(|p| p.correct.text.clone())),
        _ if line.starts_with("say ") => {
            session.command(SessionCommand::Chat(line[4..].to_string()));
        }
        answer => {
            let Some(problem) = current else {
                println!("no problem on screen yet");
                return;
            };
            if answer_matches(problem, answer) {
                session.answered_correctly();
            } else {
                // Charge the first wrong character against typing stats
                // before conceding the round.
                if let Some(expected) = first_mismatch(&problem.correct.text, answer) {
                    session.command(SessionCommand::Typo { expected });
                }
                session.answered_wrong(Some(problem.correct.text.clone()));
            }
        }
    }
}

fn answer_matches(problem: &Problem, answer: &str) -> bool {
    if answer.eq_ignore_ascii_case(&problem.correct.text) {
        return true;
    }
    answer
        .parse::<usize>()
        .ok()
        .and_then(|n| problem.options.get(n.wrapping_sub(1)))
        .is_some_and(|option| option.text == problem.correct.text)
}

fn first_mismatch(expected: &str, typed: &str) -> Option<char> {
    expected
        .chars()
        .zip(typed.chars().chain(std::iter::repeat('\0')))
        .find(|(want, got)| want != got)
        .map(|(want, _)| want)
}

fn spawn_bot_answer(session: Arc<BattleSession>, accuracy: f64, word: String) {
    let (delay_ms, correct) = {
        let mut rng = rand::thread_rng();
        (
            rng.gen_range(400u64..1500),
            rng.gen_bool(accuracy.clamp(0.0, 1.0)),
        )
    };
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        if correct {
            session.answered_correctly();
        } else {
            session.answered_wrong(Some(word));
        }
    });
}

async fn show_results(session: &BattleSession, outcome: Outcome, duration: Duration) {
    let state = session.state().await;
    println!();
    match outcome {
        Outcome::Victory => println!("*** YOU WIN ***"),
        Outcome::Defeat => println!("--- you lose ---"),
    }
    println!(
        "final score: you {} - {} them ({}s)",
        state.my_score,
        state.opponent_score,
        duration.as_secs()
    );
    println!(
        "memory rank: {}   typing rank: {}",
        memory_rank(state.my_score, state.stats.missed_words.len()),
        typing_rank(state.stats.typo_count, state.my_score),
    );
    if state.stats.win_streak > 1 {
        println!("win streak: {}", state.stats.win_streak);
    }
    if !state.stats.missed_words.is_empty() {
        println!("words to review: {}", state.stats.missed_words.join(", "));
    }
    let keys = worst_keys(&state.stats);
    if !keys.is_empty() {
        let keys: Vec<String> = keys.iter().map(|(k, n)| format!("{k} x{n}")).collect();
        println!("trouble keys: {}", keys.join(", "));
    }
}
