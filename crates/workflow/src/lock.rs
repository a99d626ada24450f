//! Per-pipeline write serialisation.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::types::PipelineId;

/// Exclusive sections keyed by pipeline id.
///
/// Every read-modify-write of a pipeline document runs while holding the
/// guard for that id; writes to different pipelines never wait on each other.
/// Reads do not take the guard.
#[derive(Debug, Default)]
pub struct PipelineLocks {
    slots: Mutex<HashMap<PipelineId, Arc<Mutex<()>>>>,
}

impl PipelineLocks {
    /// Create an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`. Access ends when the guard drops.
    pub async fn acquire(&self, id: &PipelineId) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().await;
            // a slot only referenced by the table has no holder and no waiter
            slots.retain(|key, slot| key == id || Arc::strong_count(slot) > 1);
            Arc::clone(slots.entry(id.clone()).or_default())
        };
        slot.lock_owned().await
    }

    /// Number of pipelines with a live slot.
    pub async fn tracked(&self) -> usize {
        self.slots.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;
    use std::time::Duration;

    fn pid(raw: &str) -> PipelineId {
        PipelineId::parse(raw).expect("valid id")
    }

    #[tokio::test]
    async fn test_same_pipeline_is_exclusive() {
        let locks = Arc::new(PipelineLocks::new());
        let guard = locks.acquire(&pid("p")).await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _g = locks.acquire(&pid("p")).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        let joined = tokio::time::timeout(Duration::from_secs(1), contender).await;
        assert!(joined.is_ok());
    }

    #[tokio::test]
    async fn test_different_pipelines_do_not_block() {
        let locks = PipelineLocks::new();
        let _a = locks.acquire(&pid("a")).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire(&pid("b"))).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_idle_slots_are_pruned() {
        let locks = PipelineLocks::new();
        drop(locks.acquire(&pid("a")).await);
        drop(locks.acquire(&pid("b")).await);
        drop(locks.acquire(&pid("c")).await);
        assert_eq!(locks.tracked().await, 1);
    }
}
