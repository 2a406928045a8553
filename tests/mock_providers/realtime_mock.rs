//! WebSocket Mock Server for the OpenAI Realtime API
//!
//! Records every client event and answers each `response.create` with the
//! next scripted [`Reply`]. Tracks how many responses are outstanding so
//! tests can assert the client never starts a request while one is in flight.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::Frame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::{CloseCode, Data, OpCode};

/// Scripted answer to one `response.create`.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Stream text deltas, optional audio, then `response.done`.
    Complete {
        text: Vec<String>,
        audio: Option<Vec<u8>>,
        delay: Duration,
    },
    /// Send an `error` event and never finish the response.
    Error(String),
    /// Say nothing.
    Silent,
    /// Close the WebSocket with a reason.
    Close(String),
    /// Send one text frame exactly as given.
    Raw(String),
    /// Send one text message split across continuation frames.
    Fragmented(Vec<String>),
    /// Finish the response with a bare `response.done`.
    Done,
    /// Play several replies in order for the same response.
    Sequence(Vec<Reply>),
}

impl Reply {
    pub fn text(parts: &[&str]) -> Self {
        Reply::Complete {
            text: parts.iter().map(|p| p.to_string()).collect(),
            audio: None,
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(parts: &[&str], delay: Duration) -> Self {
        Reply::Complete {
            text: parts.iter().map(|p| p.to_string()).collect(),
            audio: None,
            delay,
        }
    }

    /// Split `message` into `pieces` roughly equal continuation frames.
    pub fn fragmented(message: &str, pieces: usize) -> Self {
        let size = message.len().div_ceil(pieces.max(1)).max(1);
        let parts = message
            .as_bytes()
            .chunks(size)
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
            .collect();
        Reply::Fragmented(parts)
    }

    pub fn with_audio(parts: &[&str], pcm16: Vec<u8>) -> Self {
        Reply::Complete {
            text: parts.iter().map(|p| p.to_string()).collect(),
            audio: Some(pcm16),
            delay: Duration::ZERO,
        }
    }
}

/// One recorded client event.
#[derive(Debug, Clone)]
pub struct Received {
    pub connection: u64,
    pub event: Value,
}

impl Received {
    pub fn event_type(&self) -> &str {
        self.event["type"].as_str().unwrap_or("")
    }
}

/// Shared mock state
#[derive(Default)]
pub struct RealtimeMockState {
    pub received: Mutex<Vec<Received>>,
    pub auth_headers: Mutex<Vec<String>>,
    pub replies: Mutex<VecDeque<Reply>>,
    pub connections: AtomicU64,
    pub outstanding: AtomicU64,
    pub overlaps: AtomicU64,
    response_seq: AtomicU64,
}

/// Mock realtime server bound to a local port.
pub struct RealtimeMockServer {
    pub addr: SocketAddr,
    pub state: Arc<RealtimeMockState>,
}

impl RealtimeMockServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(RealtimeMockState::default());

        let accept_state = state.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = accept_state.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, state).await {
                        eprintln!("Mock realtime connection error: {}", e);
                    }
                });
            }
        });

        Self { addr, state }
    }

    pub fn endpoint(&self) -> String {
        format!("ws://{}/v1/realtime", self.addr)
    }

    pub fn push_reply(&self, reply: Reply) {
        self.state.replies.lock().push_back(reply);
    }

    pub fn received(&self) -> Vec<Received> {
        self.state.received.lock().clone()
    }

    pub fn received_types(&self) -> Vec<String> {
        self.received()
            .iter()
            .map(|r| r.event_type().to_string())
            .collect()
    }

    pub fn count_of(&self, event_type: &str) -> usize {
        self.state
            .received
            .lock()
            .iter()
            .filter(|r| r.event_type() == event_type)
            .count()
    }

    /// Text of every user conversation item, in arrival order.
    pub fn user_texts(&self) -> Vec<String> {
        self.received()
            .iter()
            .filter(|r| r.event_type() == "conversation.item.create")
            .filter_map(|r| r.event["item"]["content"][0]["text"].as_str().map(String::from))
            .collect()
    }

    pub fn connections(&self) -> u64 {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub fn overlaps(&self) -> u64 {
        self.state.overlaps.load(Ordering::SeqCst)
    }
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<RealtimeMockState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let headers = state.clone();
    let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        if let Some(auth) = request.headers().get("authorization")
            && let Ok(auth) = auth.to_str()
        {
            headers.auth_headers.lock().push(auth.to_string());
        }
        Ok(response)
    };

    let ws_stream = accept_hdr_async(stream, callback).await?;
    let (mut write, mut read) = ws_stream.split();

    let connection = state.connections.fetch_add(1, Ordering::SeqCst) + 1;
    // A new session starts with nothing outstanding.
    state.outstanding.store(0, Ordering::SeqCst);

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if write.send(message).await.is_err() || closing {
                break;
            }
        }
    });

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let Ok(event) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };
                let event_type = event["type"].as_str().unwrap_or("").to_string();

                if matches!(
                    event_type.as_str(),
                    "conversation.item.create" | "input_audio_buffer.clear"
                ) && state.outstanding.load(Ordering::SeqCst) > 0
                {
                    state.overlaps.fetch_add(1, Ordering::SeqCst);
                }

                state.received.lock().push(Received { connection, event });

                if event_type == "response.create" {
                    state.outstanding.fetch_add(1, Ordering::SeqCst);
                    let reply = state
                        .replies
                        .lock()
                        .pop_front()
                        .unwrap_or_else(|| Reply::text(&["OK."]));
                    let response_id = format!(
                        "resp_{}",
                        state.response_seq.fetch_add(1, Ordering::SeqCst)
                    );
                    tokio::spawn(play_reply(reply, response_id, tx.clone(), state.clone()));
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(data)) => {
                let _ = tx.send(Message::Pong(data));
            }
            Err(_) => break,
            _ => {}
        }
    }

    drop(tx);
    let _ = writer.await;
    Ok(())
}

async fn play_reply(
    reply: Reply,
    response_id: String,
    tx: mpsc::UnboundedSender<Message>,
    state: Arc<RealtimeMockState>,
) {
    let steps = match reply {
        Reply::Sequence(steps) => steps,
        other => vec![other],
    };
    for step in steps {
        play_step(step, &response_id, &tx, &state).await;
    }
}

async fn play_step(
    reply: Reply,
    response_id: &str,
    tx: &mpsc::UnboundedSender<Message>,
    state: &RealtimeMockState,
) {
    let send = |value: Value| {
        let _ = tx.send(Message::Text(value.to_string().into()));
    };
    let finish = || {
        // Release before the client can see response.done.
        state.outstanding.fetch_sub(1, Ordering::SeqCst);
        send(json!({
            "type": "response.done",
            "response": { "id": response_id, "status": "completed" }
        }));
    };

    match reply {
        Reply::Complete { text, audio, delay } => {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            for delta in &text {
                send(json!({ "type": "response.output_text.delta", "delta": delta }));
            }
            send(json!({ "type": "response.output_text.done", "text": text.concat() }));
            if let Some(pcm) = audio {
                send(json!({ "type": "response.output_audio.delta", "delta": BASE64.encode(pcm) }));
                send(json!({ "type": "response.output_audio.done" }));
            }
            finish();
        }
        Reply::Error(message) => {
            send(json!({
                "type": "error",
                "error": { "type": "invalid_request_error", "message": message }
            }));
        }
        Reply::Silent => {}
        Reply::Close(reason) => {
            let _ = tx.send(Message::Close(Some(CloseFrame {
                code: CloseCode::Away,
                reason: reason.into(),
            })));
        }
        Reply::Raw(text) => {
            let _ = tx.send(Message::Text(text.into()));
        }
        Reply::Fragmented(pieces) => {
            let last = pieces.len().saturating_sub(1);
            for (i, piece) in pieces.into_iter().enumerate() {
                let opcode = if i == 0 {
                    OpCode::Data(Data::Text)
                } else {
                    OpCode::Data(Data::Continue)
                };
                let frame = Frame::message(piece.into_bytes(), opcode, i == last);
                let _ = tx.send(Message::Frame(frame));
            }
        }
        Reply::Done => finish(),
        // Nested sequences are flattened by `play_reply`.
        Reply::Sequence(_) => {}
    }
}
