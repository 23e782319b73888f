//! Cached progress store over the persistence gateway.
//!
//! The gateway owns the truth; this store is a read-through/write-through
//! mirror. The cache is written only after a confirmed save, so a failed
//! save leaves both the persisted copy and the cache at their pre-operation
//! values. Reads outside a player's critical section may trail the newest
//! write by one update; reads inside it cannot, because every cache write
//! happens under that same lock.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::milestone::errors::GatewayError;
use crate::milestone::types::PlayerMilestoneState;
use crate::storage::StateGateway;

pub struct ProgressStore {
    gateway: Arc<dyn StateGateway>,
    cache: RwLock<HashMap<String, PlayerMilestoneState>>,
}

impl ProgressStore {
    pub fn new(gateway: Arc<dyn StateGateway>) -> Self {
        Self {
            gateway,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Current state for a player: cache first, then the gateway, defaulting
    /// to a fresh all-zero record for players never seen before.
    pub async fn load(&self, player: &str) -> Result<PlayerMilestoneState, GatewayError> {
        if let Some(state) = self
            .cache
            .read()
            .expect("progress cache poisoned")
            .get(player)
        {
            return Ok(state.clone());
        }
        let state = self
            .gateway
            .load_state(player)
            .await?
            .unwrap_or_else(|| PlayerMilestoneState::new(player));
        // Insert-if-vacant: a serialized writer may have committed while
        // this uncached read was in flight, and its copy is newer.
        let mut cache = self.cache.write().expect("progress cache poisoned");
        Ok(cache.entry(player.to_string()).or_insert(state).clone())
    }

    /// Persist a state, then mirror it into the cache. The cache is only
    /// touched on confirmed saves.
    pub async fn commit(&self, state: PlayerMilestoneState) -> Result<(), GatewayError> {
        self.gateway.save_state(&state.player, &state).await?;
        self.cache
            .write()
            .expect("progress cache poisoned")
            .insert(state.player.clone(), state);
        Ok(())
    }

    /// Drop a player's cache entry (disconnect/shutdown flush). Write-through
    /// means there is never dirty data to lose.
    pub fn evict(&self, player: &str) {
        self.cache
            .write()
            .expect("progress cache poisoned")
            .remove(player);
    }

    /// Sum a state's counters across link-group members.
    pub fn aggregate_of(state: &PlayerMilestoneState, members: &[String]) -> u64 {
        members
            .iter()
            .fold(0u64, |acc, member| acc.saturating_add(state.raw(member)))
    }
}
