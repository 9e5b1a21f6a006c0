//! Per-query cancellation and deadline

use super::error::{AuditError, AuditResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation token and optional deadline carried by every query
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl QueryContext {
    /// A context that never fires
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Child context that is cancelled together with `parent`
    pub fn child_of(parent: &CancellationToken) -> Self {
        Self {
            cancel: parent.child_token(),
            deadline: None,
        }
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Fail fast if the context already fired
    pub fn check(&self) -> AuditResult<()> {
        if self.cancel.is_cancelled() {
            return Err(AuditError::Cancelled);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(AuditError::Timeout);
        }
        Ok(())
    }

    /// Drive `fut` until it completes or the context fires
    pub async fn run<T, F>(&self, fut: F) -> AuditResult<T>
    where
        F: Future<Output = AuditResult<T>>,
    {
        self.check()?;

        let guarded = async {
            match self.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, fut)
                    .await
                    .map_err(|_| AuditError::Timeout)?,
                None => fut.await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AuditError::Cancelled),
            result = guarded => result,
        }
    }
}
