//! In-process message broker for STOMP sessions.
//!
//! Clients subscribe to `/topic/...`, `/queue/...`, or user destinations
//! (`/user/queue/...`). A message sent to a user reaches every session of
//! that principal subscribed to the matching `/user` destination.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use crate::stomp::{Command, Frame};

pub const USER_PREFIX: &str = "/user";
pub const BROKER_PREFIXES: [&str; 2] = ["/topic", "/queue"];

/// Frames buffered per session before new ones are dropped.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BrokerError {
    #[error("unknown session: {0}")]
    UnknownSession(String),

    #[error("destination not served by the broker: {0}")]
    InvalidDestination(String),
}

struct Subscription {
    id: String,
    destination: String,
}

struct Session {
    principal: Option<String>,
    outbound: mpsc::Sender<Frame>,
    subscriptions: Vec<Subscription>,
}

impl Session {
    /// Push a MESSAGE to every subscription on `destination`.
    fn deliver(&self, destination: &str, body: &str, next_id: &AtomicU64) -> usize {
        let mut delivered = 0;
        for sub in self.subscriptions.iter().filter(|s| s.destination == destination) {
            let message_id = next_id.fetch_add(1, Ordering::Relaxed);
            let frame = Frame::new(Command::Message)
                .with_header("destination", destination)
                .with_header("subscription", sub.id.as_str())
                .with_header("message-id", message_id.to_string())
                .with_header("content-type", "application/json")
                .with_body(body);
            match self.outbound.try_send(frame) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        principal = self.principal.as_deref().unwrap_or("anonymous"),
                        destination,
                        "Outbound queue full, dropping message"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }
}

/// Shared broker handle.
#[derive(Clone)]
pub struct Broker {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    message_ids: Arc<AtomicU64>,
    capacity: usize,
}

impl Default for Broker {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_OUTBOUND_CAPACITY)
    }
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A broker whose sessions buffer at most `capacity` outbound frames.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sessions: Arc::default(),
            message_ids: Arc::default(),
            capacity: capacity.max(1),
        }
    }

    /// Register a connected session and return its outbound frame stream.
    pub async fn register(
        &self,
        session_id: &str,
        principal: Option<String>,
    ) -> mpsc::Receiver<Frame> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.sessions.write().await.insert(
            session_id.to_string(),
            Session {
                principal,
                outbound: tx,
                subscriptions: Vec::new(),
            },
        );
        debug!(session_id, "Session registered");
        rx
    }

    pub async fn unregister(&self, session_id: &str) {
        if self.sessions.write().await.remove(session_id).is_some() {
            debug!(session_id, "Session unregistered");
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn subscribe(
        &self,
        session_id: &str,
        subscription_id: &str,
        destination: &str,
    ) -> Result<(), BrokerError> {
        if !is_broker_destination(destination) {
            return Err(BrokerError::InvalidDestination(destination.to_string()));
        }
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| BrokerError::UnknownSession(session_id.to_string()))?;
        session.subscriptions.retain(|s| s.id != subscription_id);
        session.subscriptions.push(Subscription {
            id: subscription_id.to_string(),
            destination: destination.to_string(),
        });
        debug!(session_id, subscription_id, destination, "Subscribed");
        Ok(())
    }

    pub async fn unsubscribe(&self, session_id: &str, subscription_id: &str) {
        if let Some(session) = self.sessions.write().await.get_mut(session_id) {
            session.subscriptions.retain(|s| s.id != subscription_id);
        }
    }

    /// Broadcast to every subscriber of `destination`.
    pub async fn publish(&self, destination: &str, payload: &Value) -> usize {
        let body = payload.to_string();
        self.sessions
            .read()
            .await
            .values()
            .map(|session| session.deliver(destination, &body, &self.message_ids))
            .sum()
    }

    /// Deliver to every session of `user` subscribed to `/user{destination}`.
    pub async fn send_to_user(&self, user: &str, destination: &str, payload: &Value) -> usize {
        let target = user_destination(destination);
        let body = payload.to_string();
        let delivered: usize = self
            .sessions
            .read()
            .await
            .values()
            .filter(|session| session.principal.as_deref() == Some(user))
            .map(|session| session.deliver(&target, &body, &self.message_ids))
            .sum();
        debug!(user, destination = %target, delivered, "Sent to user");
        delivered
    }

    /// Deliver to one session's `/user{destination}` subscriptions.
    pub async fn send_to_session(
        &self,
        session_id: &str,
        destination: &str,
        payload: &Value,
    ) -> usize {
        let target = user_destination(destination);
        let body = payload.to_string();
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|session| session.deliver(&target, &body, &self.message_ids))
            .unwrap_or(0)
    }
}

fn user_destination(destination: &str) -> String {
    format!("{USER_PREFIX}{destination}")
}

fn has_prefix(destination: &str, prefix: &str) -> bool {
    destination
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// Whether clients may subscribe to `destination`.
pub fn is_broker_destination(destination: &str) -> bool {
    let routed = destination
        .strip_prefix(USER_PREFIX)
        .filter(|rest| rest.starts_with('/'))
        .unwrap_or(destination);
    BROKER_PREFIXES.iter().any(|p| has_prefix(routed, p))
}
