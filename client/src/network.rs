//! Client network layer: the connection to the server and message handling

use crate::game::WorldMirror;
use crate::input::{LocalEvent, Subscriptions};
use log::{debug, error, info, warn};
use shared::framing::drain_outbound;
use shared::messages::{ErrorMessage, Login, NewAccount, Start, TellUser};
use shared::rpc::{dispatch, report};
use shared::{
    ChannelFailure, Disposition, FrameReader, Message, Outbound, ProtocolError, RpcHandler,
    DEFAULT_MAX_FRAME_LEN,
};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::interval;

const STATUS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("connection to server closed")]
    ConnectionClosed,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("fatal channel failure: {0}")]
    Fatal(#[from] ChannelFailure),
}

/// How a session with the server ended without a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientExit {
    /// The server sent `Kick`
    Kicked,
    /// The server closed the stream without a `Kick`
    Closed,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub user_id: String,
    pub password: String,
}

impl Credentials {
    /// The first message of a session: registration or login
    pub fn request(&self, register: bool) -> Message {
        if register {
            NewAccount {
                user_id: self.user_id.clone(),
                password: self.password.clone(),
            }
            .into()
        } else {
            Login {
                user_id: self.user_id.clone(),
                password: self.password.clone(),
            }
            .into()
        }
    }
}

/// Receiver of everything the server sends
///
/// Any failure caught at the channel boundary is fatal on the client: the
/// hook records it and closes the connection.
pub struct ServerConnection {
    outbound: Outbound,
    pub world: WorldMirror,
    pub subscriptions: Subscriptions,
    kicked: bool,
    failure: Option<ChannelFailure>,
}

impl ServerConnection {
    pub fn new(outbound: Outbound) -> Self {
        Self {
            outbound,
            world: WorldMirror::new(),
            subscriptions: Subscriptions::new(),
            kicked: false,
            failure: None,
        }
    }

    pub fn send(&self, message: impl Into<Message>) -> Result<(), ClientError> {
        let bytes = message.into().encode()?;
        self.outbound
            .send(bytes)
            .map_err(|_| ClientError::ConnectionClosed)
    }

    /// Reports a local event under every tag subscribed to it
    pub fn local_event(&self, event: &LocalEvent) -> Result<usize, ClientError> {
        let reports = self.subscriptions.occurred(event);
        let count = reports.len();
        if count == 0 {
            debug!("Nobody listens for {}", event.name);
        }

        for report in reports {
            self.send(report)?;
        }
        Ok(count)
    }

    pub fn is_kicked(&self) -> bool {
        self.kicked
    }

    pub fn failure(&self) -> Option<&ChannelFailure> {
        self.failure.as_ref()
    }
}

impl RpcHandler for ServerConnection {
    type Error = ClientError;

    fn message_received(&mut self, message: Message) -> Result<(), ClientError> {
        match message {
            Message::TellUser(TellUser { message }) => println!("{}", message),
            Message::ErrorMessage(ErrorMessage { message }) => {
                warn!("Server reported an error: {}", message);
                println!("{}", message);
            }
            Message::Kick(_) => {
                info!("Server ended the session");
                self.kicked = true;
            }
            Message::Start(Start { player }) => {
                info!("Entered the world as {}", player);
                self.world.start(player);
            }
            Message::AddObject(add) => self.world.apply_add(add),
            Message::RemoveObject(remove) => {
                if !self.world.apply_remove(&remove) {
                    debug!("Removal of unknown entity {}", remove.tag);
                }
            }
            Message::ThingState(state) => {
                self.world.apply_state(state, Instant::now());
            }
            Message::EventListen(request) => self.subscriptions.listen(request),
            other => warn!("Server sent unexpected {}", other.name()),
        }
        Ok(())
    }

    fn uncaught_failure(&mut self, failure: ChannelFailure) -> Disposition {
        error!("Closing connection after {}", failure);
        self.failure = Some(failure);
        Disposition::Close
    }
}

/// A TCP session with the game server
pub struct Client {
    connection: ServerConnection,
    frames: FrameReader<OwnedReadHalf>,
}

impl Client {
    pub async fn connect(host: &str, port: u16) -> Result<Self, Box<dyn std::error::Error>> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        info!("Connected to {}", stream.peer_addr()?);

        let (reader, writer) = stream.into_split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            if let Err(e) = drain_outbound(writer, outbound_rx).await {
                debug!("Writer stopped: {}", e);
            }
        });

        Ok(Client {
            connection: ServerConnection::new(outbound_tx),
            frames: FrameReader::new(reader, DEFAULT_MAX_FRAME_LEN),
        })
    }

    pub fn connection(&self) -> &ServerConnection {
        &self.connection
    }

    pub fn world(&self) -> &WorldMirror {
        &self.connection.world
    }

    pub fn send(&self, message: impl Into<Message>) -> Result<(), ClientError> {
        self.connection.send(message)
    }

    /// Handles server messages and local events until the session ends
    pub async fn run(
        &mut self,
        mut local_events: mpsc::UnboundedReceiver<LocalEvent>,
    ) -> Result<ClientExit, ClientError> {
        let mut status_interval = interval(STATUS_INTERVAL);
        let mut events_open = true;

        loop {
            tokio::select! {
                result = self.frames.read_frame() => {
                    let disposition = match result {
                        Ok(Some(frame)) => dispatch(&mut self.connection, &frame),
                        Ok(None) => return Ok(ClientExit::Closed),
                        Err(e) => report(&mut self.connection, e.into()),
                    };

                    if self.connection.is_kicked() {
                        return Ok(ClientExit::Kicked);
                    }
                    if disposition == Disposition::Close {
                        return Err(self
                            .connection
                            .failure
                            .take()
                            .map_or(ClientError::ConnectionClosed, ClientError::Fatal));
                    }
                }

                event = local_events.recv(), if events_open => {
                    match event {
                        Some(event) => {
                            self.connection.local_event(&event)?;
                        }
                        None => events_open = false,
                    }
                }

                _ = status_interval.tick() => self.log_status(),
            }
        }
    }

    fn log_status(&self) {
        let world = &self.connection.world;
        let Some(player) = world.player() else {
            return;
        };

        let now = Instant::now();
        if let Some(thing) = world.get(player) {
            let (location, heading) = thing.extrapolate(now);
            info!(
                "{} at ({:.1}, {:.1}, {:.1}) facing {:.0}, {} entities in view",
                player,
                location.x,
                location.y,
                location.z,
                heading,
                world.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use shared::messages::{AddObject, EventListen, EventOccurred, Kick, ThingState};
    use shared::{Frame, FrameDecoder, FrameError, Vec3};
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    fn connection() -> (ServerConnection, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ServerConnection::new(tx), rx)
    }

    fn feed(connection: &mut ServerConnection, message: impl Into<Message>) -> Disposition {
        dispatch(connection, &message.into().to_frame().unwrap())
    }

    #[test]
    fn test_credentials_request() {
        let credentials = Credentials {
            user_id: "alice".to_string(),
            password: "pw".to_string(),
        };

        assert_eq!(credentials.request(true).name(), "account.NewAccount");
        assert_eq!(credentials.request(false).name(), "account.Login");
    }

    #[test]
    fn test_world_messages_update_mirror() {
        let (mut connection, _rx) = connection();

        feed(
            &mut connection,
            Start {
                player: "Player1".to_string(),
            },
        );
        feed(
            &mut connection,
            AddObject {
                tag: "Player1".to_string(),
                height: 1.75,
                radius: 0.4,
            },
        );
        feed(
            &mut connection,
            ThingState {
                tag: "Player1".to_string(),
                location: Vec3::new(0.0, -20.0, 5.0),
                velocity: Vec3::ZERO,
                heading: 0.0,
                angular_velocity: 0.0,
            },
        );

        assert_eq!(connection.world.player(), Some("Player1"));
        assert_eq!(
            connection.world.get("Player1").unwrap().location,
            Vec3::new(0.0, -20.0, 5.0)
        );
        assert!(!connection.is_kicked());
    }

    #[test]
    fn test_local_event_reports_subscribed_tags() {
        let (mut connection, mut rx) = connection();
        feed(
            &mut connection,
            EventListen {
                event: "w".to_string(),
                tag: 4,
            },
        );

        let sent = connection
            .local_event(&LocalEvent::parse("w").unwrap())
            .unwrap();
        assert_eq!(sent, 1);
        assert_eq!(
            connection
                .local_event(&LocalEvent::parse("q").unwrap())
                .unwrap(),
            0
        );

        let mut decoder = FrameDecoder::default();
        decoder.extend(&rx.try_recv().unwrap());
        let frame = decoder.decode().unwrap().unwrap();
        assert_eq!(
            Message::from_frame(&frame).unwrap(),
            Some(Message::EventOccurred(EventOccurred {
                tag: 4,
                args: Vec::new()
            }))
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_decode_failure_is_fatal() {
        let (mut connection, _rx) = connection();

        let disposition = dispatch(&mut connection, &Frame::new("game.Start", vec![200]));

        assert_eq!(disposition, Disposition::Close);
        assert!(matches!(
            connection.failure(),
            Some(ChannelFailure::Protocol(_))
        ));
    }

    async fn serve_once(frames: Vec<Bytes>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            for frame in frames {
                stream.write_all(&frame).await.unwrap();
            }
            stream.shutdown().await.unwrap();
        });
        port
    }

    #[tokio::test]
    async fn test_run_ends_on_kick() {
        let kick = Message::from(Kick).encode().unwrap();
        let port = serve_once(vec![kick]).await;

        let mut client = Client::connect("127.0.0.1", port).await.unwrap();
        let (_events_tx, events_rx) = mpsc::unbounded_channel();

        assert_eq!(client.run(events_rx).await.unwrap(), ClientExit::Kicked);
    }

    #[tokio::test]
    async fn test_run_ends_when_server_closes() {
        let port = serve_once(Vec::new()).await;

        let mut client = Client::connect("127.0.0.1", port).await.unwrap();
        let (_events_tx, events_rx) = mpsc::unbounded_channel();

        assert_eq!(client.run(events_rx).await.unwrap(), ClientExit::Closed);
    }

    #[tokio::test]
    async fn test_run_fails_on_truncated_frame() {
        let mut partial = 5u32.to_be_bytes().to_vec();
        partial.extend_from_slice(b"a\0b");
        let port = serve_once(vec![Bytes::from(partial)]).await;

        let mut client = Client::connect("127.0.0.1", port).await.unwrap();
        let (_events_tx, events_rx) = mpsc::unbounded_channel();

        let result = client.run(events_rx).await;
        assert!(matches!(
            result,
            Err(ClientError::Fatal(ChannelFailure::Framing(
                FrameError::Truncated {
                    expected: 5,
                    received: 3
                }
            )))
        ));
    }
}
