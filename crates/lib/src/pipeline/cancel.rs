use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;

/// Returned by a stage that stopped because its token was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Cooperative cancellation shared between a caller and a running load.
///
/// Clones observe the same signal. Once cancelled, a token stays cancelled.
#[derive(Debug, Clone)]
pub struct CancelToken {
  sender: Arc<watch::Sender<bool>>,
  receiver: watch::Receiver<bool>,
}

impl CancelToken {
  pub fn new() -> Self {
    let (sender, receiver) = watch::channel(false);
    Self {
      sender: Arc::new(sender),
      receiver,
    }
  }

  pub fn cancel(&self) {
    self.sender.send_replace(true);
  }

  pub fn is_cancelled(&self) -> bool {
    *self.receiver.borrow()
  }

  /// Resolves once the token is cancelled.
  pub async fn cancelled(&self) {
    let mut receiver = self.receiver.clone();
    if receiver.wait_for(|cancelled| *cancelled).await.is_err() {
      // The sender lives as long as any clone, so this cannot close while we hold one.
      std::future::pending::<()>().await;
    }
  }
}

impl Default for CancelToken {
  fn default() -> Self {
    Self::new()
  }
}
