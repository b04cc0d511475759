//! Cooperative cancellation for batch resolution.

use std::sync::Arc;

use tokio::sync::watch;

/// Batch-scoped cancellation flag.
///
/// Clones share the same flag. Workers check it before each geocoding
/// attempt and race in-flight calls and retry delays against
/// [`CancellationToken::cancelled`]; records already resolved when the flag
/// flips keep their result.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Completes once the token is cancelled (immediately if it already is).
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        let flipped = receiver.wait_for(|cancelled| *cancelled).await.is_ok();
        if !flipped {
            // The sender lives as long as `self`, so this is unreachable in practice.
            std::future::pending::<()>().await;
        }
    }
}
