use axum::Json;
use axum::extract::State;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Response};
use futures::StreamExt;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::chat::{Assistant, Chunk, Conversation};
use crate::llm::error_reply;
use crate::session::SharedSession;
use crate::web::{AppState, SESSION_COOKIE, TurnView, WebError, markdown};

fn session_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value).ok())
}

async fn open_session(state: &AppState, headers: &HeaderMap) -> (Uuid, SharedSession, bool) {
    state.sessions.get_or_create(session_id(headers)).await
}

/// Attach the session cookie when the session was just created.
fn with_cookie(body: impl IntoResponse, id: Uuid, created: bool) -> Response {
    let mut resp = body.into_response();
    if created
        && let Ok(value) = HeaderValue::from_str(&format!(
            "{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax"
        ))
    {
        resp.headers_mut().insert(SET_COOKIE, value);
    }
    resp
}

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn index(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, WebError> {
    let (id, session, created) = open_session(&state, &headers).await;
    let html = {
        let s = session.lock().await;
        state.page.render(s.conversation().turns())?
    };
    Ok(with_cookie(Html(html), id, created))
}

pub async fn history(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (id, session, created) = open_session(&state, &headers).await;
    let s = session.lock().await;
    with_cookie(Json(TurnView::all(s.conversation().turns())), id, created)
}

#[derive(Debug, Deserialize)]
pub struct NewMessage {
    content: String,
}

pub async fn post_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(msg): Json<NewMessage>,
) -> Result<Response, WebError> {
    if msg.content.trim().is_empty() {
        return Err(WebError::EmptyMessage);
    }
    let (id, session, created) = open_session(&state, &headers).await;
    let mut s = session.lock().await;
    s.push_user(msg.content)?;
    debug!(session = %id, "user turn appended");
    let turn = s.conversation().turns().last().map(TurnView::new);
    Ok(with_cookie((StatusCode::CREATED, Json(turn)), id, created))
}

pub async fn reset(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (id, session, created) = open_session(&state, &headers).await;
    let mut s = session.lock().await;
    s.reset();
    info!(session = %id, "conversation reset");
    with_cookie(Json(TurnView::all(s.conversation().turns())), id, created)
}

/// SSE data lines may not carry a bare `\r`.
fn sse_text(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

fn chunk_event(chunk: &Chunk) -> Event {
    match chunk {
        Chunk::Text(text) => Event::default().event("fragment").data(sse_text(text)),
        Chunk::Failure(text) => Event::default().event("error").data(sse_text(text)),
    }
}

/// Forward the answer to `tx` until it ends or the client goes away. Returns the text sent.
async fn generate(
    assistant: Arc<Assistant>,
    conversation: Conversation,
    tx: mpsc::Sender<Event>,
    id: Uuid,
) -> String {
    let cancel = CancellationToken::new();
    let mut chunks = assistant.respond(&conversation, cancel.clone());
    let mut text = String::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = tx.closed() => None,
            chunk = chunks.next() => Some(chunk),
        };
        let Some(chunk) = next else {
            info!(session = %id, "client disconnected, cancelling reply");
            cancel.cancel();
            break;
        };
        let Some(chunk) = chunk else { break };

        if let Chunk::Failure(msg) = &chunk {
            warn!(session = %id, error = %msg, "reply failed");
        }
        text.push_str(chunk.text());
        if tx.send(chunk_event(&chunk)).await.is_err() {
            cancel.cancel();
            break;
        }
    }
    text
}

/// Stream the answer to the latest user turn as SSE.
///
/// Generation runs in its own task and a second task always releases the reply,
/// so the session is never left mid-reply. A disconnect cancels generation and
/// keeps the partial text. The closing `done` event carries the recorded turn as HTML.
pub async fn reply(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, WebError> {
    let (id, session, created) = open_session(&state, &headers).await;
    let (ticket, conversation) = session.lock().await.begin_reply()?;

    let (tx, rx) = mpsc::channel::<Event>(32);
    let generation = tokio::spawn(generate(
        state.assistant.clone(),
        conversation,
        tx.clone(),
        id,
    ));
    tokio::spawn(async move {
        let text = match generation.await {
            Ok(text) => text,
            Err(e) => {
                error!(session = %id, error = %e, "reply task failed");
                let msg = error_reply(&anyhow::anyhow!("the reply could not be completed"));
                let _ = tx.send(Event::default().event("error").data(msg)).await;
                String::new()
            }
        };
        let html = markdown::to_html(&text);
        let recorded = session.lock().await.finish_reply(ticket, text);
        debug!(session = %id, recorded, "reply finished");
        let done = if recorded { sse_text(&html) } else { String::new() };
        let _ = tx.send(Event::default().event("done").data(done)).await;
    });

    let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    let sse = Sse::new(stream).keep_alive(KeepAlive::default());
    Ok(with_cookie(sse, id, created))
}
