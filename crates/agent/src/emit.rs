use std::{sync::Arc, time::Duration};

use {
    futures::future::join_all,
    tracing::{debug, warn},
    twitchbridge_sinks::Sink,
};

/// Fans rendered lines out to every sink, each bounded by a timeout.
pub struct Emitter {
    sinks: Vec<Arc<dyn Sink>>,
    timeout: Duration,
}

impl Emitter {
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn Sink>>, timeout: Duration) -> Self {
        Self { sinks, timeout }
    }

    #[must_use]
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Send `lines` to all sinks concurrently. Returns how many succeeded;
    /// failures and timeouts are logged.
    pub async fn emit(&self, lines: &[String]) -> usize {
        let timeout = self.timeout;
        let sends = self.sinks.iter().map(|sink| async move {
            match tokio::time::timeout(timeout, sink.send(lines)).await {
                Ok(Ok(())) => {
                    debug!(sink = sink.name(), lines = lines.len(), "emitted");
                    true
                },
                Ok(Err(e)) => {
                    warn!(sink = sink.name(), error = %e, "sink send failed");
                    false
                },
                Err(_) => {
                    warn!(
                        sink = sink.name(),
                        timeout_ms = timeout.as_millis() as u64,
                        "sink send timed out"
                    );
                    false
                },
            }
        });
        join_all(sends).await.into_iter().filter(|ok| *ok).count()
    }
}
