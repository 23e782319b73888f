//! Engine facade: wires the registry, progress store, update serializer,
//! and action executor into the update pipeline.
//!
//! Every mutation follows the same shape: capture a registry snapshot, enter
//! the player's critical section, load, mutate a working copy, save, and
//! mirror into the cache only on confirmed success. Side effects run after
//! the section is released, and only for organic gameplay deltas.

use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::config::Config;
use crate::logutil::escape_log;
use crate::metrics;
use crate::milestone::actions::{render_template, ActionContext, ActionExecutor, LogExecutor};
use crate::milestone::errors::MilestoneError;
use crate::milestone::locks::PlayerLocks;
use crate::milestone::progress::ProgressStore;
use crate::milestone::registry::{ConfigIssue, MilestoneRegistry, RegistryHandle};
use crate::milestone::threshold::{crossed_levels, level_status};
use crate::milestone::types::{
    CrossedLevel, GatherReceipt, LevelStatus, MilestoneLevel, PlayerMilestoneState,
};
use crate::storage::StateGateway;
use crate::validation::{normalize_resource_key, validate_player_name};

pub struct MilestoneEngine {
    pub(super) registry: RegistryHandle,
    pub(super) store: ProgressStore,
    pub(super) locks: PlayerLocks,
    pub(super) executor: Arc<dyn ActionExecutor>,
    announce_crossings: bool,
}

impl MilestoneEngine {
    pub fn new(registry: MilestoneRegistry, gateway: Arc<dyn StateGateway>) -> Self {
        Self {
            registry: RegistryHandle::new(registry),
            store: ProgressStore::new(gateway),
            locks: PlayerLocks::new(),
            executor: Arc::new(LogExecutor),
            announce_crossings: true,
        }
    }

    /// Replace the default logging executor with a host-owned one.
    pub fn with_executor(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_announcements(mut self, announce: bool) -> Self {
        self.announce_crossings = announce;
        self
    }

    /// Snapshot of the current registry.
    pub fn registry(&self) -> Arc<MilestoneRegistry> {
        self.registry.current()
    }

    /// Apply an organic "resource gathered" delta. Returns `None` for
    /// resources the registry does not track (callers probe generically),
    /// otherwise a receipt with the levels this update newly crossed.
    ///
    /// Eligibility is the caller's concern; by the time this runs, the
    /// player was already allowed to gather the resource.
    pub async fn record_gather(
        &self,
        player: &str,
        resource: &str,
        amount: u64,
    ) -> Result<Option<GatherReceipt>, MilestoneError> {
        if amount == 0 {
            return Err(MilestoneError::InvalidAmount);
        }
        let player = validate_player_name(player)?;
        let resource = normalize_resource_key(resource)?;
        let registry = self.registry.current();
        if !registry.is_tracked(&resource) {
            debug!(
                "ignoring gather of untracked resource {} by {}",
                resource,
                escape_log(&player)
            );
            return Ok(None);
        }

        let receipt = self
            .apply_update(&registry, &player, &resource, |state| {
                state.add(&resource, amount);
            })
            .await?;
        metrics::inc_deltas_applied();
        self.finish_update(&registry, &receipt, true);
        Ok(Some(receipt))
    }

    /// Administrative overwrite of one raw counter. Crossings are computed
    /// and reported in the receipt, but no on-cross action fires: admin
    /// jumps are corrections, not gameplay.
    pub async fn set_progress(
        &self,
        player: &str,
        resource: &str,
        value: u64,
    ) -> Result<Option<GatherReceipt>, MilestoneError> {
        let player = validate_player_name(player)?;
        let resource = normalize_resource_key(resource)?;
        let registry = self.registry.current();
        if !registry.is_tracked(&resource) {
            warn!("set ignored for untracked resource {resource}");
            return Ok(None);
        }

        let receipt = self
            .apply_update(&registry, &player, &resource, |state| {
                state.set(&resource, value);
            })
            .await?;
        info!(
            "admin set {} {} to {}",
            escape_log(&player),
            resource,
            value
        );
        self.finish_update(&registry, &receipt, false);
        Ok(Some(receipt))
    }

    /// Administrative reset of one resource: clears its counter and its
    /// claim flags, making previously claimed levels claimable again once
    /// re-reached.
    pub async fn reset_resource(&self, player: &str, resource: &str) -> Result<(), MilestoneError> {
        let player = validate_player_name(player)?;
        let resource = normalize_resource_key(resource)?;
        let _gate = self.locks.acquire(&player).await;
        let mut state = self.store.load(&player).await?;
        state.clear_resource(&resource);
        state.touch();
        self.commit_or_fail(state, &player).await?;
        info!("admin reset {} for {}", resource, escape_log(&player));
        Ok(())
    }

    /// Administrative reset of everything a player has collected or claimed.
    pub async fn reset_player(&self, player: &str) -> Result<(), MilestoneError> {
        let player = validate_player_name(player)?;
        let _gate = self.locks.acquire(&player).await;
        let mut state = self.store.load(&player).await?;
        state.clear_all();
        state.touch();
        self.commit_or_fail(state, &player).await?;
        info!("admin reset all milestones for {}", escape_log(&player));
        Ok(())
    }

    /// Single-resource counter, for per-resource display.
    pub async fn raw(&self, player: &str, resource: &str) -> Result<u64, MilestoneError> {
        let player = validate_player_name(player)?;
        let resource = normalize_resource_key(resource)?;
        let state = self.store.load(&player).await?;
        Ok(state.raw(&resource))
    }

    /// Shared-pool progress: the sum across the resource's link group.
    pub async fn aggregate(&self, player: &str, resource: &str) -> Result<u64, MilestoneError> {
        let player = validate_player_name(player)?;
        let resource = normalize_resource_key(resource)?;
        let registry = self.registry.current();
        let state = self.store.load(&player).await?;
        let members = registry.link_group(&resource);
        if members.is_empty() {
            return Ok(state.raw(&resource));
        }
        Ok(ProgressStore::aggregate_of(&state, members))
    }

    /// Derived status of every configured level for a resource, in
    /// configuration order.
    pub async fn level_statuses(
        &self,
        player: &str,
        resource: &str,
    ) -> Result<Vec<(MilestoneLevel, LevelStatus)>, MilestoneError> {
        let player = validate_player_name(player)?;
        let resource = normalize_resource_key(resource)?;
        let registry = self.registry.current();
        let state = self.store.load(&player).await?;
        let aggregate = ProgressStore::aggregate_of(&state, registry.link_group(&resource));
        Ok(registry
            .levels(&resource)
            .iter()
            .map(|level| {
                let status =
                    level_status(level, aggregate, state.is_claimed(&resource, level.level));
                (level.clone(), status)
            })
            .collect())
    }

    /// Full state record for a player (CLI export, host inspection).
    pub async fn state(&self, player: &str) -> Result<PlayerMilestoneState, MilestoneError> {
        let player = validate_player_name(player)?;
        Ok(self.store.load(&player).await?)
    }

    /// Drop a player's cache entry on disconnect. Write-through caching
    /// means there is nothing to flush.
    pub fn evict_player(&self, player: &str) {
        if let Ok(player) = validate_player_name(player) {
            self.store.evict(&player);
        }
    }

    /// Rebuild the registry from configuration and publish it atomically.
    /// In-flight operations finish against the snapshot they captured.
    pub fn reload(&self, config: &Config) -> Vec<ConfigIssue> {
        let (registry, issues) = MilestoneRegistry::load(config);
        info!(
            "milestone registry reloaded: {} resources, {} issues",
            registry.resources().len(),
            issues.len()
        );
        self.registry.replace(registry);
        issues
    }

    /// The serialized read-modify-write cycle shared by gather and admin
    /// set. Holds the player's lock across the gateway load and save.
    async fn apply_update(
        &self,
        registry: &MilestoneRegistry,
        player: &str,
        resource: &str,
        mutate: impl FnOnce(&mut PlayerMilestoneState),
    ) -> Result<GatherReceipt, MilestoneError> {
        let members = registry.link_group(resource);
        let _gate = self.locks.acquire(player).await;
        let mut state = self.store.load(player).await?;
        let previous = ProgressStore::aggregate_of(&state, members);
        mutate(&mut state);
        state.touch();
        let new_aggregate = ProgressStore::aggregate_of(&state, members);
        let crossed = Self::collect_crossings(registry, members, previous, new_aggregate);
        self.commit_or_fail(state, player).await?;
        Ok(GatherReceipt {
            player: player.to_string(),
            resource: resource.to_string(),
            previous_aggregate: previous,
            new_aggregate,
            crossed,
        })
    }

    pub(super) async fn commit_or_fail(
        &self,
        state: PlayerMilestoneState,
        player: &str,
    ) -> Result<(), MilestoneError> {
        if let Err(err) = self.store.commit(state).await {
            metrics::inc_persist_failures();
            error!("state save failed for {}: {err}", escape_log(player));
            return Err(MilestoneError::Persistence(err));
        }
        Ok(())
    }

    /// Crossings for every member of the link group, since `Reached` is
    /// derived from the shared aggregate for all of them. Ascending
    /// threshold order.
    fn collect_crossings(
        registry: &MilestoneRegistry,
        members: &[String],
        previous: u64,
        new_aggregate: u64,
    ) -> Vec<CrossedLevel> {
        let mut crossed = Vec::new();
        for member in members {
            for level in crossed_levels(registry.levels(member), previous, new_aggregate) {
                crossed.push(CrossedLevel {
                    resource: member.clone(),
                    level: level.level,
                    threshold: level.threshold,
                    display: level.display.clone(),
                });
            }
        }
        crossed.sort_by(|a, b| {
            (a.threshold, &a.resource, a.level).cmp(&(b.threshold, &b.resource, b.level))
        });
        crossed
    }

    /// Post-commit bookkeeping for an update: crossing log lines, counters,
    /// and (organic updates only) on-cross action dispatch. Runs outside
    /// the player's critical section.
    fn finish_update(&self, registry: &MilestoneRegistry, receipt: &GatherReceipt, organic: bool) {
        if receipt.crossed.is_empty() {
            return;
        }
        metrics::inc_crossings_detected(receipt.crossed.len() as u64);
        for crossed in &receipt.crossed {
            if self.announce_crossings {
                info!(
                    "{} crossed {} level {} (threshold {}, aggregate {})",
                    escape_log(&receipt.player),
                    crossed.resource,
                    crossed.level,
                    crossed.threshold,
                    receipt.new_aggregate
                );
            }
            if !organic {
                continue;
            }
            let Some(def) = registry.level(&crossed.resource, crossed.level) else {
                continue;
            };
            if let Some(template) = &def.on_cross {
                let rendered = render_template(
                    template,
                    &ActionContext {
                        player: &receipt.player,
                        resource: &crossed.resource,
                        level: crossed.level,
                        threshold: crossed.threshold,
                        progress: receipt.new_aggregate,
                    },
                );
                self.executor.dispatch(rendered);
            }
        }
    }
}
