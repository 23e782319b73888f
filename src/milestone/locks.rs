//! Per-player update serialization.
//!
//! The persistence gateway only offers asynchronous load/save, so a
//! read-modify-write cycle is not atomic on its own: two concurrent gather
//! events for the same player would both load the same counter, each add
//! their own delta, and the second save would clobber the first. The fix is
//! call-level serialization: every load→mutate→save cycle for a player runs
//! under that player's async mutex, while cycles for different players
//! proceed concurrently.
//!
//! Lock entries are created on demand and removed once the last holder
//! drops. Acquisition and cleanup both run under the table mutex, so a
//! cleanup in progress can never hand a newly arriving acquirer a stale
//! entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockTable = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Keyed async mutex table, one logical lock per active player.
#[derive(Default)]
pub struct PlayerLocks {
    table: LockTable,
}

/// RAII guard for one player's critical section. The section spans any
/// gateway awaits performed while the guard is alive; dropping it releases
/// the player's lock and retires the table entry if nobody else wants it.
pub struct PlayerGate {
    key: String,
    entry: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
    table: LockTable,
}

impl PlayerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter `player`'s critical section, waiting behind any in-flight
    /// operation for the same player.
    pub async fn acquire(&self, player: &str) -> PlayerGate {
        let entry = {
            let mut table = self.table.lock().expect("player lock table poisoned");
            table
                .entry(player.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        let guard = entry.clone().lock_owned().await;
        PlayerGate {
            key: player.to_string(),
            entry,
            guard: Some(guard),
            table: self.table.clone(),
        }
    }

    /// Number of players with a live lock entry.
    pub fn active(&self) -> usize {
        self.table.lock().expect("player lock table poisoned").len()
    }
}

impl Drop for PlayerGate {
    fn drop(&mut self) {
        // Release the mutex before inspecting refcounts so a queued waiter
        // can proceed.
        self.guard.take();
        let mut table = self.table.lock().expect("player lock table poisoned");
        if let Some(current) = table.get(&self.key) {
            // Two strong references mean ours and the table's: no holder, no
            // waiter. Waiters each own a clone, which keeps the count higher
            // and the entry alive.
            if Arc::ptr_eq(current, &self.entry) && Arc::strong_count(&self.entry) == 2 {
                table.remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn entry_is_retired_after_last_guard_drops() {
        let locks = PlayerLocks::new();
        let gate = locks.acquire("steve").await;
        assert_eq!(locks.active(), 1);
        drop(gate);
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn different_players_do_not_block_each_other() {
        let locks = PlayerLocks::new();
        let gate_a = locks.acquire("steve").await;
        // Would deadlock if keyed incorrectly.
        let gate_b = locks.acquire("alex").await;
        assert_eq!(locks.active(), 2);
        drop(gate_a);
        drop(gate_b);
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_player_sections_never_overlap() {
        let locks = Arc::new(PlayerLocks::new());
        let in_section = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..32 {
            let locks = locks.clone();
            let in_section = in_section.clone();
            handles.push(tokio::spawn(async move {
                let _gate = locks.acquire("steve").await;
                assert_eq!(in_section.fetch_add(1, Ordering::SeqCst), 0);
                tokio::time::sleep(Duration::from_millis(1)).await;
                assert_eq!(in_section.fetch_sub(1, Ordering::SeqCst), 1);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(locks.active(), 0);
    }
}
