//! # Storage Module - Persistence Gateway
//!
//! The engine's long-term owner of player milestone state. The gateway is an
//! asynchronous boundary: `load_state`/`save_state` round-trips are awaited,
//! and the engine serializes read-modify-write cycles per player around them
//! (the gateway itself provides no read-modify-write primitive).
//!
//! Two implementations ship with the crate:
//!
//! - [`SledGateway`] - sled-backed, bincode-serialized, schema-versioned
//!   records; the production store. Blocking sled work runs on the runtime's
//!   blocking pool. Read-your-writes holds within the process.
//! - [`MemoryGateway`] - a HashMap behind a mutex, for tests and ephemeral
//!   runs.
//!
//! Consistency contract: `save_state` returns only after the write is
//! durable; callers fire side effects strictly after a confirmed save.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use sled::IVec;

use crate::milestone::errors::GatewayError;
use crate::milestone::types::{PlayerMilestoneState, STATE_SCHEMA_VERSION};

const TREE_PLAYERS: &str = "milestone_players";

/// Asynchronous persistence boundary for per-player milestone state.
#[async_trait]
pub trait StateGateway: Send + Sync {
    /// Fetch a player's state, or `None` if the player has no record yet.
    async fn load_state(&self, player: &str)
        -> Result<Option<PlayerMilestoneState>, GatewayError>;

    /// Durably persist a player's state. Must not return success before the
    /// write is confirmed.
    async fn save_state(
        &self,
        player: &str,
        state: &PlayerMilestoneState,
    ) -> Result<(), GatewayError>;
}

/// Helper builder so tests can easily create throwaway stores.
pub struct SledGatewayBuilder {
    path: PathBuf,
}

impl SledGatewayBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn open(self) -> Result<SledGateway, GatewayError> {
        SledGateway::open(self.path)
    }
}

/// Sled-backed persistence for player milestone state.
pub struct SledGateway {
    _db: sled::Db,
    players: sled::Tree,
}

impl SledGateway {
    /// Open (or create) the store rooted at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GatewayError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        let players = db.open_tree(TREE_PLAYERS)?;
        Ok(Self { _db: db, players })
    }

    fn player_key(player: &str) -> Vec<u8> {
        format!("players:{}", player.to_ascii_lowercase()).into_bytes()
    }

    fn decode(bytes: IVec) -> Result<PlayerMilestoneState, GatewayError> {
        let state: PlayerMilestoneState = bincode::deserialize(&bytes)?;
        if state.schema_version != STATE_SCHEMA_VERSION {
            return Err(GatewayError::SchemaMismatch {
                entity: "player_milestone_state",
                expected: STATE_SCHEMA_VERSION,
                found: state.schema_version,
            });
        }
        Ok(state)
    }
}

#[async_trait]
impl StateGateway for SledGateway {
    async fn load_state(
        &self,
        player: &str,
    ) -> Result<Option<PlayerMilestoneState>, GatewayError> {
        let players = self.players.clone();
        let key = Self::player_key(player);
        let bytes = tokio::task::spawn_blocking(move || players.get(key))
            .await
            .map_err(|e| GatewayError::Internal(format!("join error: {e}")))??;
        match bytes {
            Some(bytes) => Ok(Some(Self::decode(bytes)?)),
            None => Ok(None),
        }
    }

    async fn save_state(
        &self,
        player: &str,
        state: &PlayerMilestoneState,
    ) -> Result<(), GatewayError> {
        let mut record = state.clone();
        record.schema_version = STATE_SCHEMA_VERSION;
        let bytes = bincode::serialize(&record)?;
        let players = self.players.clone();
        let key = Self::player_key(player);
        tokio::task::spawn_blocking(move || -> Result<(), sled::Error> {
            players.insert(key, bytes)?;
            players.flush()?;
            Ok(())
        })
        .await
        .map_err(|e| GatewayError::Internal(format!("join error: {e}")))??;
        Ok(())
    }
}

/// In-memory gateway for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryGateway {
    states: Mutex<HashMap<String, PlayerMilestoneState>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateGateway for MemoryGateway {
    async fn load_state(
        &self,
        player: &str,
    ) -> Result<Option<PlayerMilestoneState>, GatewayError> {
        let states = self.states.lock().expect("memory gateway poisoned");
        Ok(states.get(&player.to_ascii_lowercase()).cloned())
    }

    async fn save_state(
        &self,
        player: &str,
        state: &PlayerMilestoneState,
    ) -> Result<(), GatewayError> {
        let mut states = self.states.lock().expect("memory gateway poisoned");
        states.insert(player.to_ascii_lowercase(), state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn sled_gateway_round_trips_state() {
        let dir = tempdir().unwrap();
        let gateway = SledGatewayBuilder::new(dir.path()).open().unwrap();

        assert!(gateway.load_state("steve").await.unwrap().is_none());

        let mut state = PlayerMilestoneState::new("steve");
        state.add("iron_ore", 100);
        state.mark_claimed("iron_ore", 1);
        gateway.save_state("steve", &state).await.unwrap();

        let loaded = gateway.load_state("steve").await.unwrap().unwrap();
        assert_eq!(loaded.raw("iron_ore"), 100);
        assert!(loaded.is_claimed("iron_ore", 1));
    }

    #[tokio::test]
    async fn sled_gateway_keys_are_case_insensitive() {
        let dir = tempdir().unwrap();
        let gateway = SledGateway::open(dir.path()).unwrap();

        let state = PlayerMilestoneState::new("steve");
        gateway.save_state("Steve", &state).await.unwrap();
        assert!(gateway.load_state("STEVE").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn memory_gateway_round_trips_state() {
        let gateway = MemoryGateway::new();
        let mut state = PlayerMilestoneState::new("alex");
        state.add("oak_log", 7);
        gateway.save_state("alex", &state).await.unwrap();
        let loaded = gateway.load_state("alex").await.unwrap().unwrap();
        assert_eq!(loaded.raw("oak_log"), 7);
    }
}
