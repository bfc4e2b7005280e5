//! Connection lifecycle: `Connecting → Admitted → Active → Closed`.
//!
//! [`Relay`] bundles the shared services (registry, broadcaster, auth and
//! identity providers, tuning). For each connection it authorizes the token,
//! admits a [`Session`], and runs three tasks bound to it:
//! - the writer, sole owner of the socket's sending half
//! - the ingestion loop, reading client frames
//! - the keepalive loop, probing liveness on a fixed interval
//!
//! The ingestion loop and the keepalive loop can both end the session.
//! [`Session::close`] is guarded so the teardown (registry removal, then the
//! `playerLeft` broadcast) runs once no matter who calls it or how often.

use crate::auth::{self, AuthProvider, Principal};
use crate::broadcast::{BroadcastReport, Broadcaster, Event};
use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::identity::IdentityGenerator;
use crate::ingest;
use crate::outbound::{run_writer, Outbound};
use crate::registry::{Player, Registry};
use futures::{Sink, Stream};
use log::{debug, error, info, warn};
use shared::{Motion, PlayerId, PlayerView, ServerMessage};
use std::fmt;
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Token presented, not yet validated. No registry entry exists.
    Connecting,
    /// Registry entry created, `init` queued.
    Admitted,
    /// Join broadcast sent; ingestion and keepalive running.
    Active,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Admitted => "admitted",
            ConnectionState::Active => "active",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ClientClosed,
    ReadError,
    DecodeFailure,
    KeepaliveFailed,
    ServerShutdown,
}

/// Shared services handed to every connection.
#[derive(Clone)]
pub struct Relay {
    registry: Arc<Registry>,
    broadcaster: Broadcaster,
    auth: Arc<dyn AuthProvider>,
    identity: Arc<dyn IdentityGenerator>,
    config: RelayConfig,
    shutdown: CancellationToken,
}

impl Relay {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        identity: Arc<dyn IdentityGenerator>,
        config: RelayConfig,
    ) -> Self {
        let registry = Arc::new(Registry::new());
        Self {
            broadcaster: Broadcaster::new(Arc::clone(&registry)),
            registry,
            auth,
            identity,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Closes every session with [`CloseReason::ServerShutdown`] and stops
    /// the listener.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub(crate) fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// The `Connecting` step: validates the presented token.
    pub fn authorize(&self, token: Option<&str>) -> Result<Principal> {
        auth::authorize(self.auth.as_ref(), token)
            .map_err(|e| RelayError::AdmissionRejected(e.to_string()))
    }

    /// The `Admitted` step: creates the registry entry and queues `init`.
    ///
    /// Returns the session and the receiving end of its outbound queue, or
    /// `None` if the generated id was already taken.
    pub async fn admit(&self, principal: Principal) -> Option<(Arc<Session>, mpsc::Receiver<Message>)> {
        let (outbound, rx) = Outbound::channel(self.config.outbound_capacity);
        let id = self.identity.next_id();
        let color = self.identity.pick_color();

        let view = self
            .registry
            .admit(
                |size| {
                    Player::new(
                        id,
                        principal.display_name,
                        Motion::spawn(size),
                        color,
                        outbound.clone(),
                    )
                },
                |player, players| {
                    let init = ServerMessage::Init {
                        id: player.id.clone(),
                        username: player.display_name.clone(),
                        players,
                    };
                    match init.to_json() {
                        Ok(text) => {
                            if let Err(e) = player.outbound().try_deliver(Message::Text(text)) {
                                warn!("Failed to queue init for {}: {}", player.id, e);
                            }
                        }
                        Err(e) => error!("Failed to serialize init for {}: {}", player.id, e),
                    }
                },
            )
            .await?;

        info!(
            "Player {} ({}) connected. Total players: {}",
            view.username.as_deref().unwrap_or("anonymous"),
            view.id,
            self.registry.len().await
        );

        let session = Arc::new(Session {
            view,
            relay: self.clone(),
            outbound,
            cancel: self.shutdown.child_token(),
            lifecycle: Mutex::new(Lifecycle {
                state: ConnectionState::Admitted,
                reason: None,
            }),
        });
        Some((session, rx))
    }

    /// Runs one admitted connection to completion over the given transport
    /// halves and returns why it closed.
    pub async fn serve<S, R>(&self, principal: Principal, sink: S, stream: R) -> Option<CloseReason>
    where
        S: Sink<Message> + Send + Unpin + 'static,
        S::Error: Display + Send,
        R: Stream<Item = std::result::Result<Message, tungstenite::Error>> + Send + Unpin + 'static,
    {
        let (session, rx) = self.admit(principal).await?;

        let writer = tokio::spawn(run_writer(
            session.id().clone(),
            sink,
            rx,
            self.config.send_timeout,
            session.cancel.clone(),
        ));

        session.activate().await;

        let ingestion = tokio::spawn({
            let session = Arc::clone(&session);
            async move {
                let reason = ingest::run(&session, stream).await;
                session.close(reason).await;
            }
        });
        let keepalive = tokio::spawn(Arc::clone(&session).keepalive());

        session.cancelled().await;
        session.close(CloseReason::ServerShutdown).await;

        let (ingestion, keepalive, writer) = tokio::join!(ingestion, keepalive, writer);
        for result in [ingestion, keepalive, writer] {
            if let Err(e) = result {
                error!("Connection task for {} panicked: {}", session.id(), e);
            }
        }

        session.close_reason().await
    }
}

#[derive(Debug)]
struct Lifecycle {
    state: ConnectionState,
    reason: Option<CloseReason>,
}

/// One admitted connection.
///
/// The lifecycle lock orders this connection's own events: the join
/// broadcast, each update broadcast and the leave broadcast are published
/// while holding it, so other players see them in that order.
pub struct Session {
    view: PlayerView,
    relay: Relay,
    outbound: Outbound,
    cancel: CancellationToken,
    lifecycle: Mutex<Lifecycle>,
}

impl Session {
    pub fn id(&self) -> &PlayerId {
        &self.view.id
    }

    pub fn display_name(&self) -> Option<&str> {
        self.view.username.as_deref()
    }

    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }

    pub async fn state(&self) -> ConnectionState {
        self.lifecycle.lock().await.state
    }

    pub async fn close_reason(&self) -> Option<CloseReason> {
        self.lifecycle.lock().await.reason
    }

    /// Resolves once teardown has started or the relay is shutting down.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// The `Active` step: announces this player to everyone else.
    pub async fn activate(&self) -> BroadcastReport {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.state != ConnectionState::Admitted {
            return BroadcastReport::default();
        }
        lifecycle.state = ConnectionState::Active;

        self.relay
            .broadcaster
            .publish(Event::Joined(self.view.clone()))
            .await
    }

    /// Stores reported motion and relays it to the other players.
    ///
    /// Returns false when the update was dropped because the session is
    /// closed or the registry entry is gone.
    pub async fn apply_update(&self, motion: Motion) -> bool {
        let lifecycle = self.lifecycle.lock().await;
        if lifecycle.state == ConnectionState::Closed {
            return false;
        }

        if !self.relay.registry.update(self.id(), motion.clone()).await {
            debug!("Dropped stale update for {}", self.id());
            return false;
        }

        self.relay
            .broadcaster
            .publish(Event::Updated {
                id: self.id().clone(),
                motion,
            })
            .await;
        true
    }

    /// Moves to `Closed`: removes the registry entry, tells the remaining
    /// players and cancels this connection's tasks.
    ///
    /// Only the first call does anything; it returns true.
    pub async fn close(&self, reason: CloseReason) -> bool {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.state == ConnectionState::Closed {
            return false;
        }
        lifecycle.state = ConnectionState::Closed;
        lifecycle.reason = Some(reason);

        self.relay.registry.remove(self.id()).await;
        self.relay
            .broadcaster
            .publish(Event::Left {
                id: self.id().clone(),
            })
            .await;
        self.cancel.cancel();

        info!(
            "Player {} ({}) disconnected ({:?}). Total players: {}",
            self.display_name().unwrap_or("anonymous"),
            self.id(),
            reason,
            self.relay.registry.len().await
        );
        true
    }

    /// Queues a ping every keepalive interval. A ping that cannot be queued
    /// within the send timeout closes the session.
    pub async fn keepalive(self: Arc<Self>) {
        let period = self.relay.config.keepalive_interval;
        let send_timeout = self.relay.config.send_timeout;

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = ticker.tick() => {
                    if let Err(e) = self
                        .outbound
                        .send_within(Message::Ping(Vec::new()), send_timeout)
                        .await
                    {
                        debug!("Keepalive to {} failed: {}", self.id(), e);
                        self.close(CloseReason::KeepaliveFailed).await;
                        return;
                    }
                }
            }
        }
    }
}
