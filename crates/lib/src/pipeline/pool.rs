use std::num::NonZeroUsize;
use std::sync::Arc;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Bounds how many parse tasks run at once.
///
/// Created by the caller and passed into the loader; tasks take a permit
/// before doing blocking work and release it when they finish.
#[derive(Debug, Clone)]
pub struct WorkerPool {
  semaphore: Arc<Semaphore>,
  size: usize,
}

impl WorkerPool {
  pub fn new(size: usize) -> Self {
    let size = size.max(1);
    Self {
      semaphore: Arc::new(Semaphore::new(size)),
      size,
    }
  }

  /// One worker per available CPU, falling back to 4.
  pub fn with_available_parallelism() -> Self {
    Self::new(std::thread::available_parallelism().map_or(4, NonZeroUsize::get))
  }

  pub fn size(&self) -> usize {
    self.size
  }

  pub(crate) async fn acquire(&self) -> Result<OwnedSemaphorePermit, AcquireError> {
    self.semaphore.clone().acquire_owned().await
  }
}

impl Default for WorkerPool {
  fn default() -> Self {
    Self::with_available_parallelism()
  }
}
