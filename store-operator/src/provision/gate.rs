use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Process-wide counting gate shared by every in-flight provisioning
/// section, independent of the reconciler worker-pool width.
#[derive(Clone)]
pub struct ProvisionGate {
    sem: Arc<Semaphore>,
}

#[derive(thiserror::Error, Debug)]
#[error("no provisioning slot became available within {0:?}")]
pub struct GateTimeout(pub Duration);

/// RAII slot holder: the slot is returned when the permit drops, on every
/// exit path including cancellation.
pub struct ProvisionPermit {
    _permit: OwnedSemaphorePermit,
}

impl ProvisionGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            sem: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Blocks the calling worker up to `max_wait` for a slot.
    pub async fn acquire(
        &self,
        max_wait: Duration,
    ) -> Result<ProvisionPermit, GateTimeout> {
        match tokio::time::timeout(max_wait, self.sem.clone().acquire_owned())
            .await
        {
            Ok(Ok(permit)) => Ok(ProvisionPermit { _permit: permit }),
            // The semaphore is never closed; fold that case into timeout.
            Ok(Err(_)) | Err(_) => Err(GateTimeout(max_wait)),
        }
    }

    pub fn available(&self) -> usize {
        self.sem.available_permits()
    }
}
