//! Persistence failure paths: no reward before a confirmed write, no cache
//! divergence from the persisted copy.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use lodestone::config::Config;
use lodestone::milestone::{
    ChannelExecutor, ClaimOutcome, GatewayError, MilestoneEngine, MilestoneError,
    MilestoneRegistry, PlayerMilestoneState, RenderedAction,
};
use lodestone::storage::{MemoryGateway, StateGateway};
use tokio::sync::mpsc::UnboundedReceiver;

const TEST_CONFIG: &str = r#"
[storage]
data_dir = "./data"

[[milestones.iron_ore.levels]]
level = 1
threshold = 100
on_claim = "give {player} reward_iron_1"
"#;

/// Gateway wrapper that fails saves on demand.
struct FlakyGateway {
    inner: MemoryGateway,
    fail_saves: AtomicBool,
}

impl FlakyGateway {
    fn new() -> Self {
        Self {
            inner: MemoryGateway::new(),
            fail_saves: AtomicBool::new(false),
        }
    }

    fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl StateGateway for FlakyGateway {
    async fn load_state(
        &self,
        player: &str,
    ) -> Result<Option<PlayerMilestoneState>, GatewayError> {
        self.inner.load_state(player).await
    }

    async fn save_state(
        &self,
        player: &str,
        state: &PlayerMilestoneState,
    ) -> Result<(), GatewayError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(GatewayError::Internal("injected save failure".to_string()));
        }
        self.inner.save_state(player, state).await
    }
}

fn build_engine() -> (
    MilestoneEngine,
    Arc<FlakyGateway>,
    UnboundedReceiver<RenderedAction>,
) {
    let config = Config::parse(TEST_CONFIG).unwrap();
    let (registry, issues) = MilestoneRegistry::load(&config);
    assert!(issues.is_empty());
    let gateway = Arc::new(FlakyGateway::new());
    let (executor, rx) = ChannelExecutor::new();
    let engine =
        MilestoneEngine::new(registry, gateway.clone()).with_executor(Arc::new(executor));
    (engine, gateway, rx)
}

#[tokio::test]
async fn failed_claim_save_fires_no_reward_and_stays_claimable() {
    let (engine, gateway, mut rx) = build_engine();

    engine
        .record_gather("steve", "iron_ore", 100)
        .await
        .unwrap();

    gateway.set_fail_saves(true);
    assert_eq!(
        engine.claim("steve", "iron_ore", 1).await.unwrap(),
        ClaimOutcome::PersistFailed
    );
    // The reward must never execute on an unconfirmed write.
    assert!(rx.try_recv().is_err());

    // Once the store recovers, the level is still claimable exactly once.
    gateway.set_fail_saves(false);
    assert!(matches!(
        engine.claim("steve", "iron_ore", 1).await.unwrap(),
        ClaimOutcome::Success(_)
    ));
    assert!(rx.try_recv().is_ok());
    assert_eq!(
        engine.claim("steve", "iron_ore", 1).await.unwrap(),
        ClaimOutcome::AlreadyClaimed
    );
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn failed_gather_save_leaves_pre_operation_state() {
    let (engine, gateway, _rx) = build_engine();

    engine.record_gather("steve", "iron_ore", 50).await.unwrap();

    gateway.set_fail_saves(true);
    assert!(matches!(
        engine.record_gather("steve", "iron_ore", 10).await,
        Err(MilestoneError::Persistence(_))
    ));
    gateway.set_fail_saves(false);

    // The failed delta is gone from cache and store alike; the next one
    // applies on top of the last confirmed value.
    assert_eq!(engine.aggregate("steve", "iron_ore").await.unwrap(), 50);
    engine.record_gather("steve", "iron_ore", 50).await.unwrap();
    assert_eq!(engine.aggregate("steve", "iron_ore").await.unwrap(), 100);
}

#[tokio::test]
async fn failed_save_does_not_resurface_crossings_later() {
    let (engine, gateway, _rx) = build_engine();

    gateway.set_fail_saves(true);
    assert!(engine.record_gather("steve", "iron_ore", 150).await.is_err());
    gateway.set_fail_saves(false);

    // The failed update never happened; a real one crosses level 1 now.
    let receipt = engine
        .record_gather("steve", "iron_ore", 150)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(receipt.previous_aggregate, 0);
    assert_eq!(receipt.crossed.len(), 1);
}
