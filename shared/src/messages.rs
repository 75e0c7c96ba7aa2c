//! The closed set of messages exchanged between client and server
//!
//! Each message is a plain serde struct whose payload is encoded with
//! bincode. On the wire a message is identified by its schema-qualified name,
//! e.g. `account.Login` or `game.ThingState`. Decoding goes through a table
//! from wire name to decoder that is built once, the first time it is needed.

use crate::error::ProtocolError;
use crate::framing::Frame;
use crate::math::Vec3;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

pub const ACCOUNT_SCHEMA: &str = "account";
pub const GAME_SCHEMA: &str = "game";

/// A payload type with a fixed wire name
pub trait WireMessage: Serialize + DeserializeOwned + Into<Message> {
    const NAME: &'static str;
}

/// Requests creation of a new account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAccount {
    pub user_id: String,
    pub password: String,
}

/// Requests entry into the world with an existing account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Login {
    pub user_id: String,
    pub password: String,
}

/// Informational text for the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TellUser {
    pub message: String,
}

/// A request could not be honoured; sent as `account.Error`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub message: String,
}

/// The server is about to close the connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kick;

/// The client has entered the synchronized world as entity `player`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Start {
    pub player: String,
}

/// An entity became visible; carries its static attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddObject {
    pub tag: String,
    pub height: f32,
    pub radius: f32,
}

/// An entity is no longer visible
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveObject {
    pub tag: String,
}

/// Kinematic state of one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThingState {
    pub tag: String,
    pub location: Vec3,
    pub velocity: Vec3,
    /// Degrees counter-clockwise around Z
    pub heading: f32,
    /// Degrees per second
    pub angular_velocity: f32,
}

/// Asks the client to report occurrences of `event` under `tag`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventListen {
    pub event: String,
    pub tag: u32,
}

/// The client observed a subscribed event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventOccurred {
    pub tag: u32,
    pub args: Vec<EventArg>,
}

/// One argument of an event, tagged with its type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventArg {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Vector(Vec3),
}

impl EventArg {
    /// Numeric view of the argument, if it has one
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            EventArg::Int(value) => Some(*value as f32),
            EventArg::Float(value) => Some(*value as f32),
            _ => None,
        }
    }
}

type Decoder = fn(&[u8]) -> Result<Message, bincode::Error>;

fn decode_as<M: WireMessage>(payload: &[u8]) -> Result<Message, bincode::Error> {
    bincode::deserialize::<M>(payload).map(Into::into)
}

macro_rules! wire_messages {
    ($($variant:ident => $schema:ident . $name:literal),* $(,)?) => {
        /// Every message either side may send
        #[derive(Debug, Clone, PartialEq)]
        pub enum Message {
            $($variant($variant),)*
        }

        $(
            impl WireMessage for $variant {
                const NAME: &'static str = concat!(stringify!($schema), ".", $name);
            }

            impl From<$variant> for Message {
                fn from(message: $variant) -> Self {
                    Message::$variant(message)
                }
            }
        )*

        impl Message {
            /// Schema-qualified wire name
            pub fn name(&self) -> &'static str {
                match self {
                    $(Message::$variant(_) => <$variant as WireMessage>::NAME,)*
                }
            }

            fn encode_payload(&self) -> Result<Vec<u8>, bincode::Error> {
                match self {
                    $(Message::$variant(inner) => bincode::serialize(inner),)*
                }
            }
        }

        fn decoders() -> &'static HashMap<&'static str, Decoder> {
            static DECODERS: OnceLock<HashMap<&'static str, Decoder>> = OnceLock::new();
            DECODERS.get_or_init(|| {
                let mut table: HashMap<&'static str, Decoder> = HashMap::new();
                $(table.insert(<$variant as WireMessage>::NAME, decode_as::<$variant>);)*
                table
            })
        }
    };
}

wire_messages! {
    NewAccount => account."NewAccount",
    Login => account."Login",
    TellUser => account."TellUser",
    ErrorMessage => account."Error",
    Kick => account."Kick",
    Start => game."Start",
    AddObject => game."AddObject",
    RemoveObject => game."RemoveObject",
    ThingState => game."ThingState",
    EventListen => game."EventListen",
    EventOccurred => game."EventOccurred",
}

impl Message {
    /// Encodes the message as a complete wire frame, length prefix included
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        Ok(self.to_frame()?.encode())
    }

    pub fn to_frame(&self) -> Result<Frame, ProtocolError> {
        let payload = self
            .encode_payload()
            .map_err(|source| ProtocolError::Encode {
                name: self.name(),
                source,
            })?;
        Ok(Frame::new(self.name(), payload))
    }

    /// Decodes a frame into a typed message
    ///
    /// Returns `Ok(None)` for names outside the known set so that newer
    /// peers can add messages without breaking older ones.
    pub fn from_frame(frame: &Frame) -> Result<Option<Message>, ProtocolError> {
        let Some(decode) = decoders().get(frame.name.as_str()) else {
            return Ok(None);
        };

        decode(&frame.payload)
            .map(Some)
            .map_err(|source| ProtocolError::Decode {
                name: frame.name.clone(),
                source,
            })
    }
}
