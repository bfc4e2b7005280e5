//! # Motion Relay Server Library
//!
//! This library implements a real-time position relay for multiplayer 3D
//! scenes. Clients connect over WebSocket, report their own position,
//! rotation and velocity, and receive every other participant's reports as
//! they arrive. The server performs no simulation: it stores the latest
//! reported state of each player and fans it out.
//!
//! ## Core Responsibilities
//!
//! ### Admission
//! Every connection presents a bearer token in the `token` query parameter.
//! The token is checked by an [`auth::AuthProvider`] during the WebSocket
//! handshake; rejected callers get `401 Unauthorized` and never touch the
//! shared state.
//!
//! ### Player Registry
//! Admitted players receive a unique id, a palette color and a spawn point
//! on a five-column grid. The [`registry::Registry`] holds the latest
//! motion of every connected player and is the single source for the
//! `init` snapshot sent to newcomers.
//!
//! ### Event Fan-out
//! Joins, updates and departures are pushed to all other connected players
//! through the [`broadcast::Broadcaster`]. A slow or dead recipient never
//! delays delivery to the rest.
//!
//! ## Architecture Design
//!
//! ### Task per Concern
//! Each connection is served by three tasks: a writer that owns the socket's
//! sending half, an ingestion loop that reads client frames, and a keepalive
//! loop that probes liveness. All outbound frames for a connection pass
//! through its bounded queue, so the socket is never written concurrently.
//!
//! ### Lifecycle
//! Connections move through `Connecting → Admitted → Active → Closed`
//! (see [`lifecycle`]). Teardown runs exactly once whether the client hung
//! up, a read failed, a frame was malformed or the keepalive failed.
//!
//! ## Module Organization
//!
//! - `auth`: token validation seam, in-memory session table
//! - `broadcast`: event fan-out with per-recipient isolation
//! - `config`: keepalive and delivery tuning
//! - `error`: crate error type
//! - `identity`: player id and color assignment
//! - `ingest`: per-connection reader
//! - `lifecycle`: connection state machine and task wiring
//! - `network`: TCP listener and WebSocket handshake
//! - `outbound`: per-connection send queue and writer task
//! - `registry`: authoritative player table
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::auth::SessionTable;
//! use server::config::RelayConfig;
//! use server::identity::RandomIdentity;
//! use server::lifecycle::Relay;
//! use server::network::RelayServer;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sessions = Arc::new(SessionTable::default());
//!     let token = sessions.issue("alice");
//!     println!("connect with ws://127.0.0.1:8888/ws?token={}", token);
//!
//!     let relay = Relay::new(sessions, Arc::new(RandomIdentity), RelayConfig::default());
//!     let server = RelayServer::bind("127.0.0.1:8888", relay).await?;
//!
//!     // Runs until `Relay::shutdown` is called
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod identity;
pub mod ingest;
pub mod lifecycle;
pub mod network;
pub mod outbound;
pub mod registry;
