use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// One read/write lock per application ID.
///
/// Lifecycle operations rename and delete files under the deployment directory,
/// so they hold the lock exclusively. Status queries only read and share it.
/// An entry lives as long as someone holds or waits for it.
#[derive(Default)]
pub struct AppLocks {
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

/// Lock held on one application, released from the registry on drop.
pub struct AppGuard<'a, G> {
    guard: Option<G>,
    app_id: String,
    locks: &'a AppLocks,
}

impl<G> Drop for AppGuard<'_, G> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.release(&self.app_id);
    }
}

impl AppLocks {
    fn lock_for(&self, app_id: &str) -> Arc<RwLock<()>> {
        self.locks
            .lock()
            .entry(app_id.to_string())
            .or_default()
            .clone()
    }

    // Clones are only handed out under the map lock, so a count of one means idle.
    fn release(&self, app_id: &str) {
        let mut locks = self.locks.lock();
        if locks
            .get(app_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(app_id);
        }
    }

    fn guard<G>(&self, app_id: &str, guard: G) -> AppGuard<'_, G> {
        AppGuard {
            guard: Some(guard),
            app_id: app_id.to_string(),
            locks: self,
        }
    }

    pub async fn exclusive(&self, app_id: &str) -> AppGuard<'_, OwnedRwLockWriteGuard<()>> {
        let guard = self.lock_for(app_id).write_owned().await;
        self.guard(app_id, guard)
    }

    pub async fn shared(&self, app_id: &str) -> AppGuard<'_, OwnedRwLockReadGuard<()>> {
        let guard = self.lock_for(app_id).read_owned().await;
        self.guard(app_id, guard)
    }
}
