//! # Motion Relay Client Library
//!
//! A headless client for the motion relay. It opens an authenticated
//! WebSocket session, reports this player's motion with `update` messages,
//! and keeps a local [`world::WorldView`] of everyone else in sync with the
//! relay's `init`, `playerJoined`, `playerUpdate` and `playerLeft` events.
//!
//! ## Module Organization
//!
//! ### Connection Module (`connection`)
//! The transport side of a session:
//! - Token-carrying connect and HTTP rejection reporting
//! - `update` encoding
//! - Server message decoding, skipping transport pings
//!
//! ### World Module (`world`)
//! The local player table. Events are merged idempotently so duplicates and
//! late arrivals leave it consistent.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::connection::RelayClient;
//! use client::world::WorldView;
//! use shared::{axes, Motion};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut relay = RelayClient::connect("ws://127.0.0.1:8888/ws", "my-token").await?;
//!     let mut world = WorldView::new();
//!
//!     // The first message is always our own init snapshot
//!     world.apply(relay.recv().await?);
//!
//!     relay
//!         .send_update(&Motion {
//!             position: axes(1.0, 10.0, 0.0),
//!             ..Motion::default()
//!         })
//!         .await?;
//!
//!     while let Some(message) = relay.next_message().await? {
//!         world.apply(message);
//!         println!("{} players visible", world.len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod error;
pub mod world;
