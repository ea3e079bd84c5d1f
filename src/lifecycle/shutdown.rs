//! Shutdown coordination for one server.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::Error;

/// Graceful-then-forced shutdown of a server.
///
/// The server watches [`Shutdown::graceful_token`]. An interrupt cancels it
/// and waits up to the timeout for the server to finish; past the deadline
/// the server future is dropped.
#[derive(Debug, Clone)]
pub struct Shutdown {
    graceful: CancellationToken,
    force: CancellationToken,
    finished: CancellationToken,
    timeout: Duration,
}

impl Shutdown {
    pub fn new(timeout: Duration) -> Self {
        Self {
            graceful: CancellationToken::new(),
            force: CancellationToken::new(),
            finished: CancellationToken::new(),
            timeout,
        }
    }

    /// Cancelled when a graceful shutdown starts.
    pub fn graceful_token(&self) -> CancellationToken {
        self.graceful.clone()
    }

    /// Run a server until it returns or is forced to stop.
    pub async fn serve<F>(&self, name: &'static str, server: F) -> Result<(), Error>
    where
        F: Future<Output = std::io::Result<()>>,
    {
        let _finished = self.finished.clone().drop_guard();
        tokio::select! {
            result = server => result.map_err(|source| Error::Serve { server: name, source }),
            _ = self.force.cancelled() => Ok(()),
        }
    }

    /// Start a graceful shutdown and force it after the timeout. Timing out
    /// is logged, never an error.
    pub async fn interrupt(&self, name: &'static str) {
        self.graceful.cancel();
        if tokio::time::timeout(self.timeout, self.finished.cancelled())
            .await
            .is_err()
        {
            tracing::warn!(server = name, timeout = ?self.timeout, "graceful shutdown timed out, forcing");
            self.force.cancel();
        }
    }
}
