//! Per-connection session state
//!
//! A [`Session`] is everything the event loop knows about one TCP connection:
//! where outbound frames go, which player entity (if any) it controls, which
//! entities its client already knows about and which input events it has
//! subscribed to. Sessions are owned by the [`SessionManager`] and only ever
//! touched from the event loop.

use crate::error::GameError;
use crate::relay::{EventHandler, EventRelay};
use crate::sync::KnownEntities;
use log::info;
use shared::messages::Kick;
use shared::{EventArg, Message, Outbound};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use tokio::task::JoinHandle;

/// Identifier assigned to each accepted connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Represents a connected client
///
/// Dropping a session closes its outbound queue, which lets the writer task
/// flush whatever is still queued and shut the socket down, and stops its
/// reader task.
pub struct Session {
    pub id: SessionId,
    pub addr: SocketAddr,
    outbound: Outbound,
    /// Entity controlled by this connection once logged in
    pub player: Option<String>,
    /// Entities this client has been told exist
    pub known: KnownEntities,
    pub relay: EventRelay,
    kicked: bool,
    reader: Option<JoinHandle<()>>,
}

impl Session {
    pub fn new(id: SessionId, addr: SocketAddr, outbound: Outbound) -> Self {
        Self {
            id,
            addr,
            outbound,
            player: None,
            known: KnownEntities::new(),
            relay: EventRelay::new(),
            kicked: false,
            reader: None,
        }
    }

    /// Ties the connection's reader task to this session's lifetime
    pub fn attach_reader(&mut self, reader: JoinHandle<()>) {
        self.reader = Some(reader);
    }

    /// Queues a message for the writer task
    pub fn send(&self, message: impl Into<Message>) -> Result<(), GameError> {
        let bytes = message.into().encode()?;
        self.outbound
            .send(bytes)
            .map_err(|_| GameError::ConnectionClosed)
    }

    pub fn send_all(&self, messages: Vec<Message>) -> Result<(), GameError> {
        for message in messages {
            self.send(message)?;
        }
        Ok(())
    }

    /// Subscribes to an input event on this client and returns its tag
    pub fn accept(
        &mut self,
        event: &str,
        handler: EventHandler,
        preset: Vec<EventArg>,
    ) -> Result<u32, GameError> {
        let listen = self.relay.accept(event, handler, preset);
        let tag = listen.tag;
        self.send(listen)?;
        Ok(tag)
    }

    /// Sends `Kick`; the event loop drops the session afterwards
    pub fn kick(&mut self) -> Result<(), GameError> {
        self.kicked = true;
        self.send(Kick)
    }

    pub fn is_kicked(&self) -> bool {
        self.kicked
    }

    pub fn is_in_world(&self) -> bool {
        self.player.is_some()
    }

    /// Forgets the player binding and everything tied to it
    pub fn leave_world(&mut self) -> Option<String> {
        self.relay.clear();
        self.known.clear();
        self.player.take()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Manages all connected sessions
///
/// Session IDs start from 1 and are never reused. The manager refuses new
/// sessions once `max_sessions` are connected.
pub struct SessionManager {
    sessions: HashMap<SessionId, Session>,
    next_session_id: u32,
    max_sessions: usize,
}

impl SessionManager {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            next_session_id: 1,
            max_sessions,
        }
    }

    /// Reserves the next session ID, or `None` when the server is full
    pub fn next_id(&mut self) -> Option<SessionId> {
        if self.sessions.len() >= self.max_sessions {
            return None;
        }

        let id = SessionId(self.next_session_id);
        self.next_session_id += 1;
        Some(id)
    }

    pub fn insert(&mut self, session: Session) {
        info!("Session {} connected from {}", session.id, session.addr);
        self.sessions.insert(session.id, session);
    }

    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        let session = self.sessions.remove(&id)?;
        info!("Session {} from {} disconnected", id, session.addr);
        Some(session)
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.values_mut()
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.keys().copied().collect()
    }

    /// Sessions that have a player in the world
    pub fn in_world_count(&self) -> usize {
        self.sessions
            .values()
            .filter(|session| session.is_in_world())
            .count()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
