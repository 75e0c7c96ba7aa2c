//! Server network layer: TCP listeners, per-connection tasks and the event loop
//!
//! Every accepted connection gets a reader task that turns bytes into frames
//! and a writer task that drains the session's outbound queue. Neither touches
//! game state. Frames travel over one channel to the event loop, which owns
//! the world, the sessions and the account store and handles one event at a
//! time, interleaved with fixed-rate world ticks.

use crate::accounts::AccountStore;
use crate::config::ServerConfig;
use crate::controls;
use crate::error::GameError;
use crate::physics::KinematicWorld;
use crate::session::{Session, SessionId, SessionManager};
use crate::sync;
use crate::world::World;
use log::{debug, error, info, warn};
use shared::framing::drain_outbound;
use shared::messages::{ErrorMessage, EventOccurred, Login, NewAccount, Start, TellUser};
use shared::rpc::{dispatch, report};
use shared::{ChannelFailure, Disposition, Frame, FrameError, FrameReader, Message, RpcHandler};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

pub const ACCOUNT_CREATED: &str = "Your account has been created.  Thank you for registering.";

/// Longest simulated step; a stalled loop catches up in one capped step
const MAX_TICK_DT: f32 = 0.25;

/// Events sent from network tasks to the event loop
#[derive(Debug)]
pub enum ServerEvent {
    Connected {
        stream: TcpStream,
        addr: SocketAddr,
    },
    Frame {
        id: SessionId,
        frame: Frame,
    },
    Failed {
        id: SessionId,
        error: FrameError,
    },
    Disconnected {
        id: SessionId,
    },
    Shutdown,
}

/// Stops a running server from another task
#[derive(Debug, Clone)]
pub struct ShutdownHandle(mpsc::UnboundedSender<ServerEvent>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        if self.0.send(ServerEvent::Shutdown).is_err() {
            debug!("Server already stopped");
        }
    }
}

/// Main server coordinating connections and the world simulation
pub struct Server {
    listeners: Vec<TcpListener>,
    local_addrs: Vec<SocketAddr>,
    world: World,
    sessions: SessionManager,
    accounts: Box<dyn AccountStore>,
    tick_duration: Duration,
    max_frame_len: usize,

    events_tx: mpsc::UnboundedSender<ServerEvent>,
    events_rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Server {
    /// Binds every configured listen address
    pub async fn bind(
        config: &ServerConfig,
        accounts: Box<dyn AccountStore>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let mut listeners = Vec::new();
        let mut local_addrs = Vec::new();

        for addr in config.listen_addrs()? {
            let listener = TcpListener::bind(addr).await?;
            let local = listener.local_addr()?;
            info!("Server listening on {}", local);
            local_addrs.push(local);
            listeners.push(listener);
        }

        let world = World::with_intervals(
            Box::new(KinematicWorld::new()),
            config.sync.moving_interval(),
            config.sync.stationary_interval(),
        );
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listeners,
            local_addrs,
            world,
            sessions: SessionManager::new(config.network.max_clients),
            accounts,
            tick_duration: config.tick_duration(),
            max_frame_len: config.sync.max_frame_len,
            events_tx,
            events_rx,
        })
    }

    /// Bound addresses, with ephemeral ports resolved
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.events_tx.clone())
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Spawns one accept loop per listener
    fn spawn_acceptors(&mut self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut self.listeners)
            .into_iter()
            .map(|listener| {
                let events_tx = self.events_tx.clone();
                tokio::spawn(async move {
                    loop {
                        match listener.accept().await {
                            Ok((stream, addr)) => {
                                if events_tx
                                    .send(ServerEvent::Connected { stream, addr })
                                    .is_err()
                                {
                                    break;
                                }
                            }
                            Err(e) => {
                                error!("Error accepting connection: {}", e);
                                tokio::time::sleep(Duration::from_millis(10)).await;
                            }
                        }
                    }
                })
            })
            .collect()
    }

    /// Main server loop; returns once shut down
    pub async fn run(&mut self) {
        let acceptors = self.spawn_acceptors();

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();

        info!("Server started successfully");

        loop {
            tokio::select! {
                event = self.events_rx.recv() => {
                    match event {
                        Some(ServerEvent::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                        Some(event) => self.handle_event(event, Instant::now()),
                    }
                }

                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32().min(MAX_TICK_DT);
                    last_tick = now;
                    self.step(now, dt);
                }
            }
        }

        for acceptor in acceptors {
            acceptor.abort();
        }
        let ids: Vec<SessionId> = self.sessions.ids();
        for id in ids {
            self.disconnect(id);
        }
    }

    fn handle_event(&mut self, event: ServerEvent, now: Instant) {
        match event {
            ServerEvent::Connected { stream, addr } => self.accept_connection(stream, addr),
            ServerEvent::Frame { id, frame } => {
                let disposition = self.with_context(id, now, |context| dispatch(context, &frame));
                self.settle(id, disposition);
            }
            ServerEvent::Failed { id, error } => {
                let disposition = self.with_context(id, now, |context| {
                    report(context, ChannelFailure::Framing(error))
                });
                self.settle(id, disposition);
            }
            ServerEvent::Disconnected { id } => self.disconnect(id),
            ServerEvent::Shutdown => {}
        }
    }

    /// Runs `f` against the session's connection context
    fn with_context<R>(
        &mut self,
        id: SessionId,
        now: Instant,
        f: impl FnOnce(&mut ConnectionContext<'_>) -> R,
    ) -> Option<R> {
        let Some(session) = self.sessions.get_mut(id) else {
            debug!("Dropping event for closed session {}", id);
            return None;
        };

        let mut context = ConnectionContext {
            session,
            world: &mut self.world,
            accounts: self.accounts.as_mut(),
            now,
        };
        Some(f(&mut context))
    }

    /// Closes the session if its handler asked for it or it was kicked
    fn settle(&mut self, id: SessionId, disposition: Option<Disposition>) {
        let kicked = self
            .sessions
            .get(id)
            .map_or(false, |session| session.is_kicked());

        if kicked || disposition == Some(Disposition::Close) {
            self.disconnect(id);
        }
    }

    fn accept_connection(&mut self, stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY for {}: {}", addr, e);
        }
        let (reader, writer) = stream.into_split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            if let Err(e) = drain_outbound(writer, outbound_rx).await {
                debug!("Writer for {} stopped: {}", addr, e);
            }
        });

        let Some(id) = self.sessions.next_id() else {
            warn!("Turning away {}: server full", addr);
            let refusal = Message::from(ErrorMessage {
                message: "Server full".to_string(),
            });
            if let Ok(bytes) = refusal.encode() {
                let _ = outbound_tx.send(bytes);
            }
            return;
        };

        let reader_task = tokio::spawn(read_frames(
            id,
            reader,
            self.max_frame_len,
            self.events_tx.clone(),
        ));

        let mut session = Session::new(id, addr, outbound_tx);
        session.attach_reader(reader_task);
        self.sessions.insert(session);
    }

    /// Drops the session and removes its player from the world
    pub fn disconnect(&mut self, id: SessionId) {
        let Some(mut session) = self.sessions.remove(id) else {
            return;
        };

        if let Some(player) = session.leave_world() {
            if let Err(e) = self.world.despawn(&player) {
                warn!("Session {} lost its player: {}", id, e);
            }
        }
    }

    /// One world tick: simulate, then bring every player's view up to date
    pub fn step(&mut self, now: Instant, dt: f32) {
        self.world.advance(dt);
        let due = self.world.collect_due(now);

        let mut closed = Vec::new();
        for session in self.sessions.iter_mut() {
            if !session.is_in_world() {
                continue;
            }

            let messages = sync::visibility_diff(&mut session.known, &self.world, &due);
            if let Err(e) = session.send_all(messages) {
                warn!("Failed to sync session {}: {}", session.id, e);
                closed.push(session.id);
            }
        }

        if !due.is_empty() {
            debug!(
                "Broadcast {} entities to {} players",
                due.len(),
                self.sessions.in_world_count()
            );
        }

        for id in closed {
            self.disconnect(id);
        }
    }
}

/// Reads frames until the peer goes away or the stream breaks
async fn read_frames(
    id: SessionId,
    reader: OwnedReadHalf,
    max_frame_len: usize,
    events: mpsc::UnboundedSender<ServerEvent>,
) {
    let mut frames = FrameReader::new(reader, max_frame_len);

    loop {
        match frames.read_frame().await {
            Ok(Some(frame)) => {
                if events.send(ServerEvent::Frame { id, frame }).is_err() {
                    return;
                }
            }
            Ok(None) => break,
            Err(error) => {
                let fatal = error.is_fatal();
                if events.send(ServerEvent::Failed { id, error }).is_err() {
                    return;
                }
                if fatal {
                    break;
                }
            }
        }
    }

    let _ = events.send(ServerEvent::Disconnected { id });
}

/// Everything a message handler may touch while serving one connection
pub struct ConnectionContext<'a> {
    pub session: &'a mut Session,
    pub world: &'a mut World,
    pub accounts: &'a mut dyn AccountStore,
    pub now: Instant,
}

impl ConnectionContext<'_> {
    fn new_account(&mut self, request: NewAccount) -> Result<(), GameError> {
        match self
            .accounts
            .create_account(&request.user_id, &request.password)
        {
            Ok(()) => {
                self.session.send(TellUser {
                    message: ACCOUNT_CREATED.to_string(),
                })?;
                self.session.kick()
            }
            Err(e) => {
                warn!("Session {}: {}", self.session.id, e);
                self.session.send(ErrorMessage {
                    message: e.to_string(),
                })
            }
        }
    }

    fn login(&mut self, request: Login) -> Result<(), GameError> {
        if let Some(player) = &self.session.player {
            let refusal = GameError::AlreadyLoggedIn(player.clone());
            return self.session.send(ErrorMessage {
                message: refusal.to_string(),
            });
        }

        if let Err(e) = self
            .accounts
            .authenticate(&request.user_id, &request.password)
        {
            warn!(
                "Session {} failed to log in as {}: {}",
                self.session.id, request.user_id, e
            );
            self.session.send(ErrorMessage {
                message: e.to_string(),
            })?;
            return self.session.kick();
        }

        let player = self.world.spawn_player(self.session.id, self.now);
        info!(
            "{} logged in on session {} as {}",
            request.user_id, self.session.id, player
        );
        self.session.player = Some(player.clone());
        self.session.send(Start { player })?;
        controls::bind_movement(self.session)
    }

    fn event_occurred(&mut self, event: EventOccurred) -> Result<(), GameError> {
        let player = self
            .session
            .player
            .as_deref()
            .ok_or(GameError::NotLoggedIn)?;

        self.session
            .relay
            .fire(event.tag, &event.args, self.world, player, self.now)?;
        Ok(())
    }
}

impl RpcHandler for ConnectionContext<'_> {
    type Error = GameError;

    fn message_received(&mut self, message: Message) -> Result<(), GameError> {
        match message {
            Message::NewAccount(request) => self.new_account(request),
            Message::Login(request) => self.login(request),
            Message::EventOccurred(event) => self.event_occurred(event),
            other => {
                warn!(
                    "Session {} sent unexpected {}",
                    self.session.id,
                    other.name()
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::MemoryAccountStore;
    use crate::world::PLAYER_SPAWN;
    use bytes::Bytes;
    use shared::messages::{AddObject, EventListen, Kick, ThingState};
    use shared::{EventArg, FrameDecoder, Vec3};

    struct Harness {
        session: Session,
        world: World,
        accounts: MemoryAccountStore,
        rx: mpsc::UnboundedReceiver<Bytes>,
    }

    impl Harness {
        fn new() -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            let mut accounts = MemoryAccountStore::new();
            accounts.create_account("alice", "pw").unwrap();

            Self {
                session: Session::new(SessionId(1), "127.0.0.1:50000".parse().unwrap(), tx),
                world: World::default(),
                accounts,
                rx,
            }
        }

        fn handle(&mut self, message: impl Into<Message>) -> Disposition {
            let frame = message.into().to_frame().unwrap();
            let mut context = ConnectionContext {
                session: &mut self.session,
                world: &mut self.world,
                accounts: &mut self.accounts,
                now: Instant::now(),
            };
            dispatch(&mut context, &frame)
        }

        fn received(&mut self) -> Vec<Message> {
            let mut decoder = FrameDecoder::default();
            while let Ok(bytes) = self.rx.try_recv() {
                decoder.extend(&bytes);
            }

            let mut messages = Vec::new();
            while let Some(frame) = decoder.decode().unwrap() {
                messages.push(Message::from_frame(&frame).unwrap().unwrap());
            }
            messages
        }

        fn login(&mut self) {
            self.handle(Login {
                user_id: "alice".to_string(),
                password: "pw".to_string(),
            });
        }
    }

    #[test]
    fn test_new_account_then_kick() {
        let mut harness = Harness::new();

        harness.handle(NewAccount {
            user_id: "bob".to_string(),
            password: "secret".to_string(),
        });

        assert_eq!(
            harness.received(),
            vec![
                Message::TellUser(TellUser {
                    message: ACCOUNT_CREATED.to_string()
                }),
                Message::Kick(Kick),
            ]
        );
        assert!(harness.session.is_kicked());
        assert!(harness.accounts.authenticate("bob", "secret").is_ok());
    }

    #[test]
    fn test_duplicate_account_is_an_error_message() {
        let mut harness = Harness::new();

        let disposition = harness.handle(NewAccount {
            user_id: "alice".to_string(),
            password: "other".to_string(),
        });

        assert_eq!(disposition, Disposition::Continue);
        let messages = harness.received();
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0], Message::ErrorMessage(_)));
        assert!(!harness.session.is_kicked());
    }

    #[test]
    fn test_login_spawns_player_and_subscribes_controls() {
        let mut harness = Harness::new();

        harness.login();

        let messages = harness.received();
        assert_eq!(
            messages[0],
            Message::Start(Start {
                player: "Player1".to_string()
            })
        );
        let listens = messages
            .iter()
            .filter(|message| matches!(message, Message::EventListen(_)))
            .count();
        assert_eq!(listens, controls::BINDINGS.len());

        assert_eq!(harness.session.player.as_deref(), Some("Player1"));
        assert_eq!(harness.world.position("Player1").unwrap(), PLAYER_SPAWN);
    }

    #[test]
    fn test_bad_credentials_kick() {
        let mut harness = Harness::new();

        harness.handle(Login {
            user_id: "alice".to_string(),
            password: "wrong".to_string(),
        });

        let messages = harness.received();
        assert!(matches!(messages[0], Message::ErrorMessage(_)));
        assert_eq!(messages[1], Message::Kick(Kick));
        assert!(harness.world.is_empty());
    }

    #[test]
    fn test_second_login_is_refused() {
        let mut harness = Harness::new();
        harness.login();
        harness.received();

        harness.login();

        let messages = harness.received();
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0], Message::ErrorMessage(_)));
        assert_eq!(harness.world.len(), 1);
    }

    #[test]
    fn test_event_moves_player() {
        let mut harness = Harness::new();
        harness.login();

        let tag = harness
            .received()
            .into_iter()
            .find_map(|message| match message {
                Message::EventListen(EventListen { event, tag }) if event == "w" => Some(tag),
                _ => None,
            })
            .unwrap();

        harness.handle(EventOccurred {
            tag,
            args: Vec::new(),
        });

        assert_eq!(
            harness.world.entity("Player1").unwrap().velocity,
            Vec3::new(0.0, 75.0, 0.0)
        );
    }

    #[test]
    fn test_unknown_tag_is_ignored() {
        let mut harness = Harness::new();
        harness.login();
        harness.received();

        let disposition = harness.handle(EventOccurred {
            tag: 7000,
            args: vec![EventArg::Bool(true)],
        });

        assert_eq!(disposition, Disposition::Continue);
        assert!(harness.received().is_empty());
        assert!(!harness.world.entity("Player1").unwrap().is_moving());
    }

    #[test]
    fn test_handler_failure_keeps_connection() {
        let mut harness = Harness::new();

        // Not logged in yet
        let disposition = harness.handle(EventOccurred {
            tag: 1,
            args: Vec::new(),
        });

        assert_eq!(disposition, Disposition::Continue);
    }

    #[test]
    fn test_fatal_framing_error_closes() {
        let mut harness = Harness::new();
        let mut context = ConnectionContext {
            session: &mut harness.session,
            world: &mut harness.world,
            accounts: &mut harness.accounts,
            now: Instant::now(),
        };

        let truncated = ChannelFailure::Framing(FrameError::Truncated {
            expected: 5,
            received: 3,
        });
        assert_eq!(report(&mut context, truncated), Disposition::Close);

        let malformed = ChannelFailure::Framing(FrameError::MissingSeparator);
        assert_eq!(report(&mut context, malformed), Disposition::Continue);
    }

    async fn test_server() -> Server {
        let mut config = ServerConfig::default();
        config.network.listen4 = vec!["127.0.0.1, 0".to_string()];
        Server::bind(&config, Box::new(MemoryAccountStore::new()))
            .await
            .unwrap()
    }

    fn add_session(server: &mut Server, player: Option<&str>) -> (SessionId, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = server.sessions.next_id().unwrap();
        let mut session = Session::new(id, "127.0.0.1:50000".parse().unwrap(), tx);
        session.player = player.map(str::to_string);
        server.sessions.insert(session);
        (id, rx)
    }

    fn names(rx: &mut mpsc::UnboundedReceiver<Bytes>) -> Vec<String> {
        let mut decoder = FrameDecoder::default();
        while let Ok(bytes) = rx.try_recv() {
            decoder.extend(&bytes);
        }

        let mut names = Vec::new();
        while let Some(frame) = decoder.decode().unwrap() {
            names.push(frame.name.clone());
        }
        names
    }

    #[tokio::test]
    async fn test_step_syncs_only_players_in_world() {
        let mut server = test_server().await;
        let now = Instant::now();
        let (first, mut first_rx) = add_session(&mut server, None);
        let player = server.world.spawn_player(first, now);
        server.sessions.get_mut(first).unwrap().player = Some(player.clone());
        server.world.move_to(&player, Vec3::new(0.0, -20.0, 5.0), now).unwrap();
        let (_, mut lobby_rx) = add_session(&mut server, None);

        server.step(now, 0.0);

        assert_eq!(names(&mut first_rx), vec!["game.AddObject", "game.ThingState"]);
        assert!(names(&mut lobby_rx).is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_removes_player_for_everyone() {
        let mut server = test_server().await;
        let now = Instant::now();

        let (first, _first_rx) = add_session(&mut server, None);
        let (second, mut second_rx) = add_session(&mut server, None);
        for id in [first, second] {
            let player = server.world.spawn_player(id, now);
            server.sessions.get_mut(id).unwrap().player = Some(player);
        }
        server.step(now, 0.0);
        names(&mut second_rx);

        server.disconnect(first);
        server.step(now + Duration::from_millis(10), 0.0);

        assert_eq!(server.world().len(), 1);
        assert!(!server.world().contains("Player1"));

        let mut decoder = FrameDecoder::default();
        while let Ok(bytes) = second_rx.try_recv() {
            decoder.extend(&bytes);
        }
        let frame = decoder.decode().unwrap().unwrap();
        assert_eq!(
            Message::from_frame(&frame).unwrap(),
            Some(Message::RemoveObject(shared::messages::RemoveObject {
                tag: "Player1".to_string()
            }))
        );
        assert!(decoder.decode().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_new_player_sees_existing_entities() {
        let mut server = test_server().await;
        let now = Instant::now();
        server.world.spawn_thing("Rock", Vec3::new(5.0, 5.0, 0.0), now);
        server.step(now, 0.0);

        let later = now + Duration::from_secs(1);
        let (id, mut rx) = add_session(&mut server, None);
        let player = server.world.spawn_player(id, later);
        server.sessions.get_mut(id).unwrap().player = Some(player);
        server.step(later, 0.0);

        let mut decoder = FrameDecoder::default();
        while let Ok(bytes) = rx.try_recv() {
            decoder.extend(&bytes);
        }
        let mut messages = Vec::new();
        while let Some(frame) = decoder.decode().unwrap() {
            messages.push(Message::from_frame(&frame).unwrap().unwrap());
        }

        let adds: Vec<&AddObject> = messages
            .iter()
            .filter_map(|message| match message {
                Message::AddObject(add) => Some(add),
                _ => None,
            })
            .collect();
        let states: Vec<&ThingState> = messages
            .iter()
            .filter_map(|message| match message {
                Message::ThingState(state) => Some(state),
                _ => None,
            })
            .collect();

        assert_eq!(adds.len(), 2);
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].tag, "Player2");
        assert_eq!(states[1].tag, "Rock1");
    }
}
