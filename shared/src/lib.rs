//! # Shared protocol library
//!
//! Everything both ends of a connection must agree on lives here: the
//! length-prefixed framing, the closed set of typed messages and the dispatch
//! boundary that turns frames into handler calls.
//!
//! ## Wire format
//!
//! ```text
//! +----------------+---------------------+------+-----------------+
//! | u32 BE length  | name (UTF-8)        | 0x00 | bincode payload |
//! +----------------+---------------------+------+-----------------+
//!                  \___________________ length bytes ____________/
//! ```
//!
//! Names are schema-qualified (`account.Login`, `game.ThingState`). A name
//! the receiver does not know is skipped so peers can evolve independently.

pub mod error;
pub mod framing;
pub mod math;
pub mod messages;
pub mod rpc;

pub use error::{FrameError, ProtocolError};
pub use framing::{Frame, FrameDecoder, FrameReader, Outbound, DEFAULT_MAX_FRAME_LEN};
pub use math::{wrap_degrees, Vec3};
pub use messages::{EventArg, Message, WireMessage};
pub use rpc::{ChannelFailure, Disposition, RpcHandler};

/// Default TCP port for the game service
pub const DEFAULT_PORT: u16 = 41810;
