//! Claim coordination: converting a reached level into its one-time reward.
//!
//! The reward action must never execute before the claim flag is durably
//! persisted; a crash between reward and save would let the player claim
//! again after reload. The flag is therefore saved first, and the action
//! dispatched only on confirmed success.

use log::info;

use crate::logutil::escape_log;
use crate::metrics;
use crate::milestone::actions::{render_template, ActionContext};
use crate::milestone::engine::MilestoneEngine;
use crate::milestone::errors::MilestoneError;
use crate::milestone::progress::ProgressStore;
use crate::milestone::types::{ClaimOutcome, ClaimedLevel};
use crate::validation::{normalize_resource_key, validate_player_name};

impl MilestoneEngine {
    /// Attempt to claim `level` of `resource` for `player`.
    ///
    /// `AlreadyClaimed` and `NotReached` are normal outcomes, not faults;
    /// callers render them as distinct messages. `PersistFailed` means the
    /// claim was not recorded and may be retried. A level the registry does
    /// not define is an [`MilestoneError::UnknownLevel`] error instead.
    pub async fn claim(
        &self,
        player: &str,
        resource: &str,
        level: u32,
    ) -> Result<ClaimOutcome, MilestoneError> {
        let player = validate_player_name(player)?;
        let resource = normalize_resource_key(resource)?;
        let registry = self.registry.current();
        let Some(def) = registry.level(&resource, level) else {
            return Err(MilestoneError::UnknownLevel { resource, level });
        };
        let members = registry.link_group(&resource);

        let gate = self.locks.acquire(&player).await;
        let mut state = self.store.load(&player).await?;

        if state.is_claimed(&resource, level) {
            metrics::inc_claims_rejected();
            return Ok(ClaimOutcome::AlreadyClaimed);
        }

        let aggregate = ProgressStore::aggregate_of(&state, members);
        if aggregate < def.threshold {
            metrics::inc_claims_rejected();
            return Ok(ClaimOutcome::NotReached {
                aggregate,
                threshold: def.threshold,
            });
        }

        state.mark_claimed(&resource, level);
        state.touch();
        if self.commit_or_fail(state, &player).await.is_err() {
            // commit_or_fail already counted and logged the failure; the
            // claim flag was never persisted and the cache is untouched.
            return Ok(ClaimOutcome::PersistFailed);
        }
        drop(gate);

        metrics::inc_claims_granted();
        info!(
            "{} claimed {} level {} (threshold {}, aggregate {})",
            escape_log(&player),
            resource,
            level,
            def.threshold,
            aggregate
        );
        if let Some(template) = &def.on_claim {
            let rendered = render_template(
                template,
                &ActionContext {
                    player: &player,
                    resource: &resource,
                    level,
                    threshold: def.threshold,
                    progress: aggregate,
                },
            );
            self.executor.dispatch(rendered);
        }

        Ok(ClaimOutcome::Success(ClaimedLevel {
            resource,
            level,
            threshold: def.threshold,
            aggregate,
        }))
    }
}
