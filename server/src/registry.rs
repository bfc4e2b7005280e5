//! Process-wide store of connected players
//!
//! The registry is the single source of truth for who is connected and
//! where they are. One reader/writer lock guards the whole map:
//! - `snapshot`, `recipients`, `get` and `len` take the shared lock
//! - `insert`, `admit`, `remove` and `update` take the exclusive lock
//!
//! Nothing here performs network I/O. Broadcasts collect the recipients'
//! [`Outbound`] handles under the read lock and deliver after releasing it.

use crate::outbound::Outbound;
use log::debug;
use shared::{Motion, PlayerId, PlayerView};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// One connected participant.
///
/// Identity and color are fixed at admission. Only the motion fields change
/// afterwards, and only through [`Registry::update`].
#[derive(Debug)]
pub struct Player {
    pub id: PlayerId,
    pub display_name: Option<String>,
    pub motion: Motion,
    pub color: String,
    outbound: Outbound,
}

impl Player {
    pub fn new(
        id: PlayerId,
        display_name: Option<String>,
        motion: Motion,
        color: String,
        outbound: Outbound,
    ) -> Self {
        Self {
            id,
            display_name,
            motion,
            color,
            outbound,
        }
    }

    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }

    /// Deep copy of everything other clients may see.
    pub fn view(&self) -> PlayerView {
        PlayerView {
            id: self.id.clone(),
            username: self.display_name.clone(),
            motion: self.motion.clone(),
            color: self.color.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    players: RwLock<HashMap<PlayerId, Player>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a player. An id that is already present leaves the existing
    /// entry untouched and returns false.
    pub async fn insert(&self, player: Player) -> bool {
        let mut players = self.players.write().await;
        match players.entry(player.id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(player);
                true
            }
        }
    }

    /// Builds and inserts a player in one critical section.
    ///
    /// `build` receives the registry size before insertion, which drives
    /// spawn placement. `greet` runs after insertion, still under the write
    /// lock, with a snapshot that includes the new player; no broadcast can
    /// reach the newcomer before it. `greet` must not block.
    ///
    /// Returns the newcomer's view, or `None` on an id collision.
    pub async fn admit<B, G>(&self, build: B, greet: G) -> Option<PlayerView>
    where
        B: FnOnce(usize) -> Player,
        G: FnOnce(&Player, HashMap<PlayerId, PlayerView>),
    {
        let mut players = self.players.write().await;
        let player = build(players.len());
        let id = player.id.clone();

        match players.entry(id.clone()) {
            Entry::Occupied(_) => {
                debug!("Player id {} already registered, admission dropped", id);
                return None;
            }
            Entry::Vacant(slot) => {
                slot.insert(player);
            }
        }

        let snapshot = players
            .iter()
            .map(|(id, player)| (id.clone(), player.view()))
            .collect();
        let player = players.get(&id)?;
        greet(player, snapshot);
        Some(player.view())
    }

    /// Deletes the entry if present. Returns whether anything was removed.
    pub async fn remove(&self, id: &PlayerId) -> bool {
        self.players.write().await.remove(id).is_some()
    }

    /// Replaces all three motion fields wholesale.
    ///
    /// Returns false when the player is gone; the update is dropped.
    pub async fn update(&self, id: &PlayerId, motion: Motion) -> bool {
        match self.players.write().await.get_mut(id) {
            Some(player) => {
                player.motion = motion;
                true
            }
            None => false,
        }
    }

    /// Point-in-time copy of every entry.
    pub async fn snapshot(&self) -> HashMap<PlayerId, PlayerView> {
        self.players
            .read()
            .await
            .iter()
            .map(|(id, player)| (id.clone(), player.view()))
            .collect()
    }

    /// Outbound handles of every registered player except `exclude`.
    pub async fn recipients(&self, exclude: Option<&PlayerId>) -> Vec<(PlayerId, Outbound)> {
        self.players
            .read()
            .await
            .iter()
            .filter(|(id, _)| Some(*id) != exclude)
            .map(|(id, player)| (id.clone(), player.outbound.clone()))
            .collect()
    }

    pub async fn get(&self, id: &PlayerId) -> Option<PlayerView> {
        self.players.read().await.get(id).map(Player::view)
    }

    pub async fn len(&self) -> usize {
        self.players.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.players.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::{axes, zero_axes, Axes};
    use std::sync::Arc;

    fn test_player(id: &str) -> Player {
        let (outbound, _rx) = Outbound::channel(8);
        Player::new(
            PlayerId::new(id),
            Some(format!("user-{}", id)),
            Motion::spawn(0),
            "#FF6B6B".to_string(),
            outbound,
        )
    }

    async fn admit_named(registry: &Registry, id: &str) -> PlayerView {
        registry
            .admit(
                |size| {
                    let mut player = test_player(id);
                    player.motion = Motion::spawn(size);
                    player
                },
                |_, _| {},
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_len() {
        let registry = Registry::new();
        assert!(registry.is_empty().await);

        assert!(registry.insert(test_player("a")).await);
        assert!(registry.insert(test_player("b")).await);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_insert_duplicate_keeps_original() {
        let registry = Registry::new();
        assert!(registry.insert(test_player("a")).await);

        let mut imposter = test_player("a");
        imposter.color = "#000000".to_string();
        assert!(!registry.insert(imposter).await);

        assert_eq!(registry.len().await, 1);
        assert_eq!(
            registry.get(&PlayerId::new("a")).await.unwrap().color,
            "#FF6B6B"
        );
    }

    #[tokio::test]
    async fn test_remove() {
        let registry = Registry::new();
        registry.insert(test_player("a")).await;

        assert!(registry.remove(&PlayerId::new("a")).await);
        assert!(!registry.remove(&PlayerId::new("a")).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_update_replaces_whole_fields() {
        let registry = Registry::new();
        registry.insert(test_player("a")).await;
        let id = PlayerId::new("a");

        let first = Motion {
            position: axes(1.0, 2.0, 3.0),
            rotation: axes(0.1, 0.2, 0.3),
            velocity: axes(4.0, 5.0, 6.0),
        };
        assert!(registry.update(&id, first).await);

        let partial = Motion {
            position: Axes::from([("x".to_string(), 5.0)]),
            ..Motion::default()
        };
        assert!(registry.update(&id, partial).await);

        let stored = registry.get(&id).await.unwrap().motion;
        assert_eq!(stored.position, Axes::from([("x".to_string(), 5.0)]));
        assert!(stored.rotation.is_empty());
        assert!(stored.velocity.is_empty());
    }

    #[tokio::test]
    async fn test_update_for_missing_player_is_dropped() {
        let registry = Registry::new();
        assert!(!registry.update(&PlayerId::new("ghost"), Motion::spawn(0)).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_snapshot_is_independent_copy() {
        let registry = Registry::new();
        registry.insert(test_player("a")).await;
        let id = PlayerId::new("a");

        let snapshot = registry.snapshot().await;
        registry
            .update(
                &id,
                Motion {
                    position: axes(9.0, 9.0, 9.0),
                    ..Motion::default()
                },
            )
            .await;

        assert_eq!(snapshot[&id].motion.position, axes(0.0, 10.0, 0.0));
        assert_eq!(snapshot[&id].motion.rotation, zero_axes());
        assert_eq!(snapshot[&id].username.as_deref(), Some("user-a"));
    }

    #[tokio::test]
    async fn test_admit_places_players_on_grid() {
        let registry = Registry::new();

        let first = admit_named(&registry, "p0").await;
        assert_eq!(first.motion.position, axes(0.0, 10.0, 0.0));

        let mut fifth = first;
        for i in 1..5 {
            fifth = admit_named(&registry, &format!("p{}", i)).await;
        }
        assert_approx_eq!(fifth.motion.position["x"], 200.0);
        assert_approx_eq!(fifth.motion.position["z"], 0.0);

        let sixth = admit_named(&registry, "p5").await;
        assert_eq!(sixth.motion.position, axes(0.0, 10.0, 50.0));
        assert_eq!(registry.len().await, 6);
    }

    #[tokio::test]
    async fn test_admit_greets_with_snapshot_including_self() {
        let registry = Registry::new();
        admit_named(&registry, "a").await;

        let mut seen = Vec::new();
        registry
            .admit(
                |_| test_player("b"),
                |player, snapshot| {
                    assert_eq!(player.id, PlayerId::new("b"));
                    seen = snapshot.into_keys().collect();
                },
            )
            .await
            .unwrap();

        seen.sort();
        assert_eq!(seen, vec![PlayerId::new("a"), PlayerId::new("b")]);
    }

    #[tokio::test]
    async fn test_admit_collision_skips_greeting() {
        let registry = Registry::new();
        admit_named(&registry, "a").await;

        let mut greeted = false;
        let result = registry
            .admit(|_| test_player("a"), |_, _| greeted = true)
            .await;

        assert!(result.is_none());
        assert!(!greeted);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_recipients_excludes_originator() {
        let registry = Registry::new();
        for id in ["a", "b", "c"] {
            registry.insert(test_player(id)).await;
        }

        let mut others: Vec<PlayerId> = registry
            .recipients(Some(&PlayerId::new("b")))
            .await
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        others.sort();
        assert_eq!(others, vec![PlayerId::new("a"), PlayerId::new("c")]);

        assert_eq!(registry.recipients(None).await.len(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_admissions_and_removals() {
        let registry = Arc::new(Registry::new());

        let mut handles = Vec::new();
        for i in 0..32 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                let id = format!("p{}", i);
                admit_named(&registry, &id).await;
                if i % 2 == 0 {
                    registry.remove(&PlayerId::new(id)).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.len().await, 16);
    }
}
