use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

pub const STATE_SCHEMA_VERSION: u8 = 1;

/// One configured milestone level for a resource.
///
/// Levels are stored in configuration order; nothing in the engine assumes
/// thresholds are sorted, and evaluation checks every level independently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MilestoneLevel {
    /// Ordinal of the level, positive and unique within its resource.
    pub level: u32,
    /// Aggregate count required for this level to count as reached.
    pub threshold: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    /// Templated action dispatched when an organic update crosses the
    /// threshold. Crossing never auto-grants; claiming is separate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_cross: Option<String>,
    /// Templated action dispatched when the level is explicitly claimed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_claim: Option<String>,
}

/// Derived status of one (resource, level) pair for a player.
/// `Reached` is never persisted; it falls out of aggregate vs. threshold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LevelStatus {
    NotReached,
    Reached,
    Claimed,
}

/// Persisted per-player milestone state: raw progress counters keyed by
/// resource and the set of claimed level ordinals per resource. Claim keys
/// are always the original resource, never its link group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerMilestoneState {
    pub player: String,
    #[serde(default)]
    pub progress: HashMap<String, u64>,
    #[serde(default)]
    pub claims: HashMap<String, BTreeSet<u32>>,
    pub updated_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl PlayerMilestoneState {
    pub fn new(player: &str) -> Self {
        Self {
            player: player.to_string(),
            progress: HashMap::new(),
            claims: HashMap::new(),
            updated_at: Utc::now(),
            schema_version: STATE_SCHEMA_VERSION,
        }
    }

    /// Single-resource counter, zero when absent.
    pub fn raw(&self, resource: &str) -> u64 {
        self.progress.get(resource).copied().unwrap_or(0)
    }

    /// Add a gathered amount to one resource counter, saturating at the top.
    pub fn add(&mut self, resource: &str, amount: u64) {
        let entry = self.progress.entry(resource.to_string()).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    /// Administrative overwrite of one resource counter.
    pub fn set(&mut self, resource: &str, value: u64) {
        self.progress.insert(resource.to_string(), value);
    }

    pub fn is_claimed(&self, resource: &str, level: u32) -> bool {
        self.claims
            .get(resource)
            .map(|set| set.contains(&level))
            .unwrap_or(false)
    }

    /// Record a claim. Returns false if the level was already claimed.
    pub fn mark_claimed(&mut self, resource: &str, level: u32) -> bool {
        self.claims
            .entry(resource.to_string())
            .or_default()
            .insert(level)
    }

    /// Administrative reset of one resource: progress and claims both clear,
    /// so previously claimed levels become claimable again once re-reached.
    pub fn clear_resource(&mut self, resource: &str) {
        self.progress.remove(resource);
        self.claims.remove(resource);
    }

    pub fn clear_all(&mut self) {
        self.progress.clear();
        self.claims.clear();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// A level whose threshold was newly crossed by an update, tagged with the
/// link-group member resource whose level list it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossedLevel {
    pub resource: String,
    pub level: u32,
    pub threshold: u64,
    pub display: Option<String>,
}

/// Result of one applied progress update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatherReceipt {
    pub player: String,
    pub resource: String,
    pub previous_aggregate: u64,
    pub new_aggregate: u64,
    pub crossed: Vec<CrossedLevel>,
}

/// Outcome of a claim request. `AlreadyClaimed` and `NotReached` are normal
/// results, not faults; `PersistFailed` means retry later and is the only
/// outcome a caller should surface as an operational error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Success(ClaimedLevel),
    AlreadyClaimed,
    NotReached { aggregate: u64, threshold: u64 },
    PersistFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedLevel {
    pub resource: String,
    pub level: u32,
    pub threshold: u64,
    pub aggregate: u64,
}
