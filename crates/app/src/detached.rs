//! Fire-and-forget completion of bus requests.

use tokio::runtime::Handle;

use crate::ports::TransportFuture;

/// Awaits bus request futures in the background and logs their failures.
///
/// Captures the runtime current at construction, so requests issued from
/// threads outside the runtime (synchronous listeners) are still driven.
#[derive(Debug, Clone)]
pub struct Detacher {
    runtime: Option<Handle>,
}

impl Detacher {
    /// Bind to the current tokio runtime, if any.
    #[must_use]
    pub fn current() -> Self {
        let runtime = Handle::try_current().ok();
        if runtime.is_none() {
            tracing::warn!("no tokio runtime; bus request failures will not be observed");
        }
        Self { runtime }
    }

    /// Drive `request` to completion without waiting for it.
    pub fn detach(&self, operation: &'static str, path: String, request: TransportFuture) {
        let Some(runtime) = &self.runtime else {
            tracing::error!(operation, %path, "bus request dropped: no runtime");
            return;
        };
        runtime.spawn(async move {
            match request.await {
                Ok(()) => tracing::trace!(operation, %path, "bus request completed"),
                Err(err) => tracing::warn!(operation, %path, error = %err, "bus request failed"),
            }
        });
    }
}
