//! Player id and color assignment.

use rand::seq::SliceRandom;
use shared::{PlayerId, PALETTE};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

pub trait IdentityGenerator: Send + Sync {
    /// Must not repeat while any player holds the returned id.
    fn next_id(&self) -> PlayerId;

    fn pick_color(&self) -> String;
}

/// Random 128-bit ids and a uniformly chosen palette color.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIdentity;

impl IdentityGenerator for RandomIdentity {
    fn next_id(&self) -> PlayerId {
        PlayerId::new(Uuid::new_v4().to_string())
    }

    fn pick_color(&self) -> String {
        PALETTE
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(PALETTE[0])
            .to_string()
    }
}

/// Deterministic ids (`prefix-1`, `prefix-2`, ...) and round-robin colors.
#[derive(Debug)]
pub struct SequentialIdentity {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIdentity {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdentityGenerator for SequentialIdentity {
    fn next_id(&self) -> PlayerId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        PlayerId::new(format!("{}-{}", self.prefix, n))
    }

    fn pick_color(&self) -> String {
        let n = self.next.load(Ordering::Relaxed) as usize;
        PALETTE[n % PALETTE.len()].to_string()
    }
}
