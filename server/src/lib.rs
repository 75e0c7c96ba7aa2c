//! # Game Server Library
//!
//! This library provides the authoritative server for the synchronized world.
//! It owns every entity, decides when each entity's state is pushed to which
//! client, and routes account and input messages arriving over TCP.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative State
//! The [`world::World`] holds the entity registry, the update scheduler and
//! the physics collaborator. Handlers never touch entities directly; they go
//! through the world so that every visible change forces a broadcast.
//!
//! ### Adaptive Update Cadence
//! Moving entities are refreshed twice a second, stationary ones every five
//! seconds, and any explicit change goes out on the very next tick. The
//! scheduler keeps a lazy-deletion min-heap and rechecks the due time of every
//! popped entry, so stale entries never cause a second broadcast.
//!
//! ### Visibility Sync
//! Each logged in client has its own set of known entities. Once per tick the
//! [`sync`] module diffs that set against the world and emits removals,
//! additions and state updates, in that order.
//!
//! ## Architecture Design
//!
//! ### Single-Owner Event Loop
//! Per-connection reader and writer tasks only move bytes. All game state is
//! owned by one loop in [`network::Server::run`] that handles one event at a
//! time, so no locks guard the world or the sessions.
//!
//! ### Length-Prefixed Framing
//! Frames are `u32` big-endian length, name, NUL, bincode payload. See the
//! `shared` crate for the codec and the closed message set.
//!
//! ## Module Organization
//!
//! - `config`: JSON and command-line configuration
//! - `accounts`: account collaborator and its in-memory store
//! - `physics`: physics collaborator and the kinematic implementation
//! - `registry`, `scheduler`, `world`: entity ownership and update timing
//! - `sync`: per-client visibility diff
//! - `relay`, `controls`: input event subscriptions and the movement handlers
//! - `session`, `network`: connections and the event loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::accounts::MemoryAccountStore;
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let mut server = Server::bind(&config, Box::new(MemoryAccountStore::new())).await?;
//!
//!     // Accepts connections and ticks the world until shut down
//!     server.run().await;
//!
//!     Ok(())
//! }
//! ```

pub mod accounts;
pub mod config;
pub mod controls;
pub mod error;
pub mod network;
pub mod physics;
pub mod registry;
pub mod relay;
pub mod scheduler;
pub mod session;
pub mod sync;
pub mod world;
