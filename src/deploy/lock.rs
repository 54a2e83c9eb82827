use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Advisory locks keyed by working copy, so only one pipeline runs on a
/// working copy at a time.
#[derive(Clone, Default)]
pub struct WorkingCopyLocks {
    locks: Arc<Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>>,
}

impl WorkingCopyLocks {
    pub fn new() -> Self {
        WorkingCopyLocks::default()
    }

    fn lock_for(&self, working_copy: &Path) -> Arc<AsyncMutex<()>> {
        // "repo" and "repo/" are the same working copy
        let key: PathBuf = working_copy.components().collect();
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .clone()
    }

    /// Wait until no other pipeline holds the working copy. The lock is released
    /// when the guard is dropped.
    pub async fn acquire(&self, working_copy: &Path) -> OwnedMutexGuard<()> {
        self.lock_for(working_copy).lock_owned().await
    }
}
