//! STOMP over WebSocket.
//!
//! The first frame must be CONNECT (or STOMP). Its `Authorization` header is
//! validated once; the resulting [`IdentityContext`] is then passed with
//! every frame of the session.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use database::models::NewUser;
use database::{user, DatabaseError};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::identity::{IdentityContext, IdentityError, Principal, ProvisioningPolicy};
use crate::relay::AnalyzeMessage;
use crate::state::AppState;
use crate::stomp::{Command, Frame, StompError};

pub const STOMP_SUBPROTOCOLS: [&str; 3] = ["v12.stomp", "v11.stomp", "v10.stomp"];
pub const ANALYZE_DESTINATION: &str = "/app/analyze";

/// Provider tag for accounts created from a bare token at CONNECT.
pub const TOKEN_PROVIDER: &str = "token";

const HEART_BEAT: &str = "0,0";

/// CONNECT-time identity policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WsPolicy {
    /// Accept CONNECT without an `Authorization` header.
    pub allow_anonymous: bool,
    pub provisioning: ProvisioningPolicy,
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("expected CONNECT frame, got {0}")]
    NotConnect(Command),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("account lookup failed: {0}")]
    Database(#[from] DatabaseError),
}

/// Validate a CONNECT frame and build the session identity.
pub async fn connect_session(
    state: &AppState,
    session_id: &str,
    frame: &Frame,
) -> Result<IdentityContext, HandshakeError> {
    if !matches!(frame.command, Command::Connect | Command::Stomp) {
        return Err(HandshakeError::NotConnect(frame.command));
    }

    let header = frame
        .header("Authorization")
        .or_else(|| frame.header("authorization"));

    let principal = match state.tokens.resolve_bearer(header) {
        Ok(principal) => principal,
        Err(IdentityError::MissingToken) if header.is_none() && state.ws_policy.allow_anonymous => {
            debug!(session_id, "Anonymous session");
            return Ok(IdentityContext::anonymous(session_id));
        }
        Err(err) => return Err(err.into()),
    };

    ensure_account(state, &principal).await?;
    Ok(IdentityContext::authenticated(session_id, principal))
}

async fn ensure_account(state: &AppState, principal: &Principal) -> Result<(), HandshakeError> {
    let pool = state.db.pool();
    if user::find_user_by_email(pool, &principal.email).await?.is_some() {
        return Ok(());
    }

    match state.ws_policy.provisioning {
        ProvisioningPolicy::Reject => Err(IdentityError::UnknownUser(principal.email.clone()).into()),
        ProvisioningPolicy::AutoProvision => {
            let new_user = NewUser::with_provider(&principal.email, TOKEN_PROVIDER, &principal.email);
            match user::create_user(pool, &new_user).await {
                Ok(created) => {
                    info!(user_id = created.id, "Provisioned account at CONNECT");
                    Ok(())
                }
                // Another session provisioned it first.
                Err(DatabaseError::AlreadyExists { .. }) => Ok(()),
                Err(err) => Err(err.into()),
            }
        }
    }
}

/// What the connection should do after a client frame.
#[derive(Debug, PartialEq, Eq)]
pub enum Flow {
    Continue(Vec<Frame>),
    Close(Vec<Frame>),
}

/// Process one client frame of a connected session.
pub async fn handle_frame(state: &AppState, ctx: &IdentityContext, frame: Frame) -> Flow {
    let receipt = frame.header("receipt").map(Frame::receipt);

    let flow = match frame.command {
        Command::Subscribe => {
            let (Some(id), Some(destination)) = (frame.header("id"), frame.header("destination"))
            else {
                return Flow::Close(vec![Frame::error("SUBSCRIBE requires id and destination")]);
            };
            match state.broker.subscribe(&ctx.session_id, id, destination).await {
                Ok(()) => Flow::Continue(Vec::new()),
                Err(err) => Flow::Close(vec![Frame::error(err.to_string())]),
            }
        }
        Command::Unsubscribe => {
            let Some(id) = frame.header("id") else {
                return Flow::Close(vec![Frame::error("UNSUBSCRIBE requires id")]);
            };
            state.broker.unsubscribe(&ctx.session_id, id).await;
            Flow::Continue(Vec::new())
        }
        Command::Send => {
            let Some(destination) = frame.header("destination") else {
                return Flow::Close(vec![Frame::error("SEND requires destination")]);
            };
            route_send(state, ctx, destination, &frame.body).await;
            Flow::Continue(Vec::new())
        }
        Command::Disconnect => Flow::Close(Vec::new()),
        Command::Ack | Command::Nack | Command::Begin | Command::Commit | Command::Abort => {
            Flow::Continue(Vec::new())
        }
        Command::Connect | Command::Stomp => {
            return Flow::Close(vec![Frame::error("session is already connected")]);
        }
        other => {
            return Flow::Close(vec![Frame::error(format!("{other} is a server frame"))]);
        }
    };

    match (flow, receipt) {
        (Flow::Continue(mut out), Some(r)) => {
            out.push(r);
            Flow::Continue(out)
        }
        (Flow::Close(mut out), Some(r)) => {
            out.push(r);
            Flow::Close(out)
        }
        (flow, None) => flow,
    }
}

async fn route_send(state: &AppState, ctx: &IdentityContext, destination: &str, body: &str) {
    if destination == ANALYZE_DESTINATION {
        match serde_json::from_str::<AnalyzeMessage>(body) {
            Ok(message) => {
                // Detached: the result arrives through the broker.
                state.relay.dispatch(ctx.clone(), message);
            }
            Err(err) => {
                state.relay.reject(ctx, &err.to_string()).await;
            }
        }
    } else if destination.starts_with("/topic/") {
        let payload = serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()));
        state.broker.publish(destination, &payload).await;
    } else {
        debug!(destination, "No handler for destination");
    }
}

/// Read the next frame, skipping heart-beats and control messages.
/// `Ok(None)` means the peer went away.
async fn next_frame<St, E>(stream: &mut St) -> Result<Option<Frame>, StompError>
where
    St: Stream<Item = Result<Message, E>> + Unpin,
{
    while let Some(message) = stream.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => continue,
            },
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(_)) | Err(_) => return Ok(None),
        };
        if let Some(frame) = Frame::parse(&text)? {
            return Ok(Some(frame));
        }
    }
    Ok(None)
}

fn text(frame: &Frame) -> Message {
    Message::Text(frame.to_wire())
}

pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.protocols(STOMP_SUBPROTOCOLS)
        .on_upgrade(move |socket| run_session(socket, state))
}

async fn run_session(socket: WebSocket, state: AppState) {
    let (sink, stream) = socket.split();
    serve_session(state, stream, sink).await;
}

/// Run one STOMP session over a message stream and sink until either side
/// closes.
pub async fn serve_session<St, Si, E>(state: AppState, mut stream: St, mut sink: Si)
where
    St: Stream<Item = Result<Message, E>> + Unpin,
    Si: Sink<Message> + Unpin,
{
    let session_id = Uuid::new_v4().to_string();

    let connect = match next_frame(&mut stream).await {
        Ok(Some(frame)) => frame,
        Ok(None) => return,
        Err(err) => {
            let _ = sink.send(text(&Frame::error(err.to_string()))).await;
            return;
        }
    };

    let ctx = match connect_session(&state, &session_id, &connect).await {
        Ok(ctx) => ctx,
        Err(err) => {
            warn!(session_id = %session_id, error = %err, "CONNECT refused");
            let _ = sink.send(text(&Frame::error(err.to_string()))).await;
            let _ = sink.close().await;
            return;
        }
    };

    let principal = ctx.principal.as_ref().map(|p| p.email.clone());
    let mut outbound = state.broker.register(&session_id, principal).await;

    let connected = Frame::connected(HEART_BEAT).with_header("user-name", ctx.user_key());
    if sink.send(text(&connected)).await.is_ok() {
        info!(session_id = %session_id, user = ctx.user_key(), "STOMP session connected");

        loop {
            tokio::select! {
                frame = outbound.recv() => match frame {
                    Some(frame) => {
                        if sink.send(text(&frame)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                incoming = next_frame(&mut stream) => match incoming {
                    Ok(Some(frame)) => {
                        let (replies, close) = match handle_frame(&state, &ctx, frame).await {
                            Flow::Continue(replies) => (replies, false),
                            Flow::Close(replies) => (replies, true),
                        };
                        let mut failed = false;
                        for reply in &replies {
                            if sink.send(text(reply)).await.is_err() {
                                failed = true;
                                break;
                            }
                        }
                        if close || failed {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        let _ = sink.send(text(&Frame::error(err.to_string()))).await;
                        break;
                    }
                },
            }
        }
    }

    state.broker.unregister(&session_id).await;
    let _ = sink.close().await;
    debug!(session_id = %session_id, "STOMP session closed");
}
