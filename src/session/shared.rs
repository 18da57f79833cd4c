use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};

use super::Session;
use crate::driver::DbConnection;

/// A session shared between tasks; each checkout has exclusive use until the guard
/// is dropped.
pub struct SharedSession<C: DbConnection> {
    inner: Arc<Mutex<Session<C>>>,
}

impl<C: DbConnection> SharedSession<C> {
    #[must_use]
    pub fn new(session: Session<C>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Wait for exclusive access.
    pub async fn lock(&self) -> MutexGuard<'_, Session<C>> {
        self.inner.lock().await
    }

    /// Wait for exclusive access with a guard that can move into another task.
    pub async fn checkout(&self) -> OwnedMutexGuard<Session<C>> {
        Arc::clone(&self.inner).lock_owned().await
    }

    /// Exclusive access if nobody else holds the session right now.
    #[must_use]
    pub fn try_checkout(&self) -> Option<OwnedMutexGuard<Session<C>>> {
        Arc::clone(&self.inner).try_lock_owned().ok()
    }
}

impl<C: DbConnection> Clone for SharedSession<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: DbConnection> From<Session<C>> for SharedSession<C> {
    fn from(session: Session<C>) -> Self {
        Self::new(session)
    }
}
