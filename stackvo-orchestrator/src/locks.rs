//! Per-unit serialization of mutating operations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use stackvo_core::{UnitKind, UnitName};

type Key = (UnitKind, UnitName);

/// One async mutex per `(kind, name)`, created on first use.
///
/// Operations on different units never contend. Callers acquire a dependency's
/// lock while holding the dependent's, so lock order follows the (acyclic)
/// dependency graph.
#[derive(Default)]
pub struct UnitLocks {
    locks: Mutex<HashMap<Key, Arc<AsyncMutex<()>>>>,
}

impl UnitLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, kind: UnitKind, name: &UnitName) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.locks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            locks
                .entry((kind, name.clone()))
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_unit_is_serialized() {
        let locks = Arc::new(UnitLocks::new());
        let redis = UnitName::from("redis");
        let guard = locks.acquire(UnitKind::Service, &redis).await;

        let contender = {
            let locks = locks.clone();
            let redis = redis.clone();
            tokio::spawn(async move {
                let _g = locks.acquire(UnitKind::Service, &redis).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.expect("join");
    }

    #[tokio::test]
    async fn different_units_do_not_contend() {
        let locks = UnitLocks::new();
        let _a = locks.acquire(UnitKind::Service, &UnitName::from("redis")).await;
        let _b = locks.acquire(UnitKind::Service, &UnitName::from("mysql")).await;
        let _c = locks.acquire(UnitKind::Tool, &UnitName::from("redis")).await;
    }
}
