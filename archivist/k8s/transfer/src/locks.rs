use ahash::AHashMap as HashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Serializes exports and imports that target the same namespace.
#[derive(Clone, Debug, Default)]
pub struct NamespaceLocks(Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>);

impl NamespaceLocks {
    /// Waits for exclusive access to a namespace. Access is released when the guard is dropped.
    pub async fn lock(&self, namespace: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.0.lock();
            // Forget locks that nobody holds or waits on.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(namespace.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}
