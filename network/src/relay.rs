// SPDX-License-Identifier: MIT OR Apache-2.0

//! Relay HTTP/WebSocket surface.
//!
//! The relay is a semantics-free fan-out pipe: `/ws/{room}/{player}`
//! joins the room's broadcast domain and every text frame a member sends
//! is delivered to every member, the sender included. Game meaning lives
//! entirely in the clients. The REST routes expose the room lobby and a
//! problem endpoint backed by the built-in memory sets.
//!
//! Join rejections use the close codes the battle screen expects:
//! 4000 for an unknown room, 4001 for a full one.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::convert::Infallible;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use warp::http::StatusCode;
use warp::ws::{Message, WebSocket};
use warp::Filter;

use crate::lobby::{CreateRoomRequest, JoinError, LobbyError, RoomRegistry};
use crate::problems::{Problem, Word};

/// Close code for a join against a room that does not exist.
pub const CLOSE_ROOM_NOT_FOUND: u16 = 4000;
/// Close code for a join against a room already holding two players.
pub const CLOSE_ROOM_FULL: u16 = 4001;

/// All relay routes: room lobby REST, the problem endpoint and the
/// room WebSocket.
pub fn routes(
    registry: Arc<RoomRegistry>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let list = warp::path!("api" / "rooms")
        .and(warp::get())
        .and(with_registry(registry.clone()))
        .and_then(list_rooms);

    let create = warp::path!("api" / "rooms")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_registry(registry.clone()))
        .and_then(create_room);

    let verify = warp::path!("api" / "rooms" / "verify")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_registry(registry.clone()))
        .and_then(verify_password);

    let delete = warp::path!("api" / "rooms" / String)
        .and(warp::delete())
        .and(warp::query::<HashMap<String, String>>())
        .and(with_registry(registry.clone()))
        .and_then(delete_room);

    let problem = warp::path!("api" / "problem")
        .and(warp::get())
        .and(warp::query::<ProblemQuery>())
        .and(with_registry(registry.clone()))
        .and_then(get_problem);

    let socket = warp::path!("ws" / String / String)
        .and(warp::ws())
        .and(with_registry(registry))
        .map(|room_id: String, player_id: String, ws: warp::ws::Ws, registry| {
            ws.on_upgrade(move |socket| client_session(socket, room_id, player_id, registry))
        });

    list.or(create)
        .or(verify)
        .or(delete)
        .or(problem)
        .or(socket)
}

fn with_registry(
    registry: Arc<RoomRegistry>,
) -> impl Filter<Extract = (Arc<RoomRegistry>,), Error = Infallible> + Clone {
    warp::any().map(move || registry.clone())
}

async fn list_rooms(registry: Arc<RoomRegistry>) -> Result<impl warp::Reply, Infallible> {
    let rooms = registry.list_rooms().await;
    Ok(warp::reply::with_status(
        warp::reply::json(&rooms),
        StatusCode::OK,
    ))
}

async fn create_room(
    request: CreateRoomRequest,
    registry: Arc<RoomRegistry>,
) -> Result<impl warp::Reply, Infallible> {
    match registry.create_room(request).await {
        Ok((info, owner_token)) => Ok(warp::reply::with_status(
            warp::reply::json(&serde_json::json!({
                "message": "Room created",
                "room": info,
                "ownerToken": owner_token,
            })),
            StatusCode::OK,
        )),
        Err(e) => Ok(error_reply(StatusCode::BAD_REQUEST, &e)),
    }
}

#[derive(Debug, Deserialize)]
struct VerifyRequest {
    #[serde(rename = "roomId")]
    room_id: String,
    password: String,
}

async fn verify_password(
    request: VerifyRequest,
    registry: Arc<RoomRegistry>,
) -> Result<impl warp::Reply, Infallible> {
    match registry
        .verify_password(&request.room_id, &request.password)
        .await
    {
        Ok(()) => Ok(warp::reply::with_status(
            warp::reply::json(&serde_json::json!({"message": "OK"})),
            StatusCode::OK,
        )),
        Err(e @ LobbyError::WrongPassword(_)) => Ok(error_reply(StatusCode::UNAUTHORIZED, &e)),
        Err(e) => Ok(error_reply(StatusCode::NOT_FOUND, &e)),
    }
}

async fn delete_room(
    room_id: String,
    query: HashMap<String, String>,
    registry: Arc<RoomRegistry>,
) -> Result<impl warp::Reply, Infallible> {
    match registry
        .remove_room(&room_id, query.get("token").map(String::as_str))
        .await
    {
        Ok(()) => Ok(warp::reply::with_status(
            warp::reply::json(&serde_json::json!({"message": "Room deleted"})),
            StatusCode::OK,
        )),
        Err(e @ LobbyError::Forbidden(_)) => Ok(error_reply(StatusCode::FORBIDDEN, &e)),
        Err(e) => Ok(error_reply(StatusCode::NOT_FOUND, &e)),
    }
}

fn error_reply(
    status: StatusCode,
    error: &LobbyError,
) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(
        warp::reply::json(&serde_json::json!({"detail": error.to_string()})),
        status,
    )
}

#[derive(Debug, Deserialize)]
struct ProblemQuery {
    set_id: Option<String>,
    room_id: Option<String>,
    seed: Option<String>,
}

/// Serve a problem from the built-in memory sets. Selection is a pure
/// function of the seed, so both sides of a battle fetching with the
/// same `{room}-{round}` seed see the same problem.
async fn get_problem(
    query: ProblemQuery,
    registry: Arc<RoomRegistry>,
) -> Result<impl warp::Reply, Infallible> {
    let mut set_id = query.set_id.unwrap_or_else(|| "default".to_string());
    if let Some(room_id) = &query.room_id {
        if let Some(info) = registry.room_info(room_id).await {
            set_id = info.memory_set_id;
        }
    }
    let words = builtin_set(&set_id);
    let seed = query.seed.unwrap_or_default();
    let problem = pick_problem(&words, &seed);
    Ok(warp::reply::with_status(
        warp::reply::json(&problem),
        StatusCode::OK,
    ))
}

/// One member's WebSocket lifetime inside a room.
async fn client_session(
    socket: WebSocket,
    room_id: String,
    player_id: String,
    registry: Arc<RoomRegistry>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let outcome = match registry.join(&room_id, &player_id, tx).await {
        Ok(outcome) => outcome,
        Err(JoinError::NotFound(_)) => {
            let _ = ws_tx
                .send(Message::close_with(CLOSE_ROOM_NOT_FOUND, "room not found"))
                .await;
            return;
        }
        Err(JoinError::Full(_)) => {
            let _ = ws_tx
                .send(Message::close_with(CLOSE_ROOM_FULL, "room full"))
                .await;
            return;
        }
    };
    if outcome.matched {
        registry.broadcast(&room_id, "MATCHED").await;
    }

    loop {
        tokio::select! {
            Some(queued) = rx.recv() => {
                if ws_tx.send(Message::text(queued)).await.is_err() {
                    break;
                }
            }
            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(msg)) if msg.is_text() => {
                        if let Ok(text) = msg.to_str() {
                            // A relayed rematch notice flips the room
                            // back to playing; the relay does not
                            // interpret anything else.
                            if text.ends_with(":MATCHED") {
                                registry.mark_playing(&room_id).await;
                            }
                            registry.broadcast(&room_id, text).await;
                        }
                    }
                    Some(Ok(msg)) if msg.is_close() => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(%room_id, %player_id, error = %e, "websocket error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    registry.leave(&room_id, &player_id).await;
}

fn builtin_set(set_id: &str) -> Vec<Word> {
    let pairs: &[(&str, &str)] = match set_id {
        "programming" => &[
            ("closure", "クロージャ"),
            ("iterator", "イテレータ"),
            ("pointer", "ポインタ"),
            ("compile", "コンパイル"),
            ("recursion", "再帰"),
            ("variable", "変数"),
            ("function", "関数"),
            ("thread", "スレッド"),
        ],
        "animals" => &[
            ("elephant", "ぞう"),
            ("giraffe", "きりん"),
            ("squirrel", "りす"),
            ("penguin", "ペンギン"),
            ("dolphin", "いるか"),
            ("rabbit", "うさぎ"),
            ("turtle", "かめ"),
            ("eagle", "わし"),
        ],
        "english_hard" => &[
            ("ephemeral", "つかのまの"),
            ("ubiquitous", "いたるところにある"),
            ("serendipity", "思いがけない発見"),
            ("meticulous", "几帳面な"),
            ("resilient", "回復力のある"),
            ("ambiguous", "あいまいな"),
            ("pragmatic", "実用的な"),
            ("tenacious", "粘り強い"),
        ],
        _ => &[
            ("apple", "りんご"),
            ("grape", "ぶどう"),
            ("peach", "もも"),
            ("cherry", "さくらんぼ"),
            ("melon", "メロン"),
            ("orange", "みかん"),
            ("banana", "バナナ"),
            ("strawberry", "いちご"),
        ],
    };
    pairs
        .iter()
        .map(|(text, kana)| Word {
            text: text.to_string(),
            kana: kana.to_string(),
        })
        .collect()
}

/// Deterministic problem selection: hash the seed to pick the correct
/// word, take the following words as distractors and rotate the option
/// order so the correct answer is not always first.
fn pick_problem(words: &[Word], seed: &str) -> Problem {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    let digest = hasher.finish();

    let idx = (digest as usize) % words.len();
    let correct = words[idx].clone();
    let count = words.len().min(4);
    let mut options: Vec<Word> = (0..count)
        .map(|step| words[(idx + step) % words.len()].clone())
        .collect();
    options.rotate_left(((digest >> 8) as usize) % count);
    Problem { correct, options }
}
