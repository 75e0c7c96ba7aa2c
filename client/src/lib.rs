//! # Game Client Library
//!
//! A headless client for the synchronized world. It logs in or registers,
//! mirrors the entities the server tells it about, and forwards local input
//! events the server has subscribed to.
//!
//! ## Architecture Overview
//!
//! ### Server Authority
//! The client never moves anything itself. Input events go to the server,
//! which changes velocities and pushes the resulting state back. Between
//! state updates the [`game::WorldMirror`] extrapolates each entity from its
//! last known velocity and turn rate.
//!
//! ### Fatal Failures
//! Unlike the server, the client treats any failure caught at the channel
//! boundary as fatal: the session ends and the binary exits non-zero. A
//! `Kick` from the server ends the session normally.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! The world mirror fed by `AddObject`, `RemoveObject` and `ThingState`.
//!
//! ### Input Module (`input`)
//! The subscription table fed by `EventListen` and the stdin event source.
//!
//! ### Network Module (`network`)
//! The TCP connection, message handling and the client's main loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::input::spawn_stdin_reader;
//! use client::network::{Client, Credentials};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let credentials = Credentials {
//!         user_id: "alice".to_string(),
//!         password: "secret".to_string(),
//!     };
//!
//!     let mut client = Client::connect("127.0.0.1", shared::DEFAULT_PORT).await?;
//!     client.send(credentials.request(false))?;
//!
//!     // Type `w`, `w-up`, `arrow_left`... to move once logged in
//!     let exit = client.run(spawn_stdin_reader()).await?;
//!     println!("Session ended: {:?}", exit);
//!
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod input;
pub mod network;
