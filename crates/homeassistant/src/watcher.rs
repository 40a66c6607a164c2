use std::{future::Future, time::Duration};

use {
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::HaClient;

/// Polls one entity and reports its state whenever it changes.
///
/// The first successful poll is always reported, so consumers receive the
/// initial value at startup. A missing entity is reported as `None`.
pub struct EntityWatcher {
    client: HaClient,
    entity_id: String,
    interval: Duration,
}

impl EntityWatcher {
    #[must_use]
    pub fn new(client: HaClient, entity_id: impl Into<String>, interval: Duration) -> Self {
        Self {
            client,
            entity_id: entity_id.into(),
            interval,
        }
    }

    /// Poll until `cancel` fires, awaiting `on_change` for every new value.
    pub async fn run<F, Fut>(self, cancel: CancellationToken, mut on_change: F)
    where
        F: FnMut(Option<String>) -> Fut,
        Fut: Future<Output = ()>,
    {
        info!(entity_id = %self.entity_id, interval_s = self.interval.as_secs(), "watching entity");
        let mut last: Option<Option<String>> = None;
        let mut failing = false;

        loop {
            let polled = tokio::select! {
                _ = cancel.cancelled() => break,
                polled = self.client.get_state(&self.entity_id) => polled,
            };

            match polled {
                Ok(state) => {
                    if failing {
                        info!(entity_id = %self.entity_id, "entity polling recovered");
                        failing = false;
                    }
                    let value = state.map(|s| s.state);
                    if last.as_ref() != Some(&value) {
                        debug!(entity_id = %self.entity_id, value = ?value, "entity changed");
                        on_change(value.clone()).await;
                        last = Some(value);
                    }
                },
                Err(e) => {
                    // Only the first failure in a row is worth a warning.
                    if failing {
                        debug!(entity_id = %self.entity_id, error = %e, "entity poll failed");
                    } else {
                        warn!(entity_id = %self.entity_id, error = %e, "entity poll failed");
                        failing = true;
                    }
                },
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {},
            }
        }
        debug!(entity_id = %self.entity_id, "entity watcher stopped");
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        secrecy::Secret,
        tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel},
    };

    const POLL: Duration = Duration::from_millis(10);

    fn state_body(state: &str) -> String {
        serde_json::json!({
            "entity_id": "input_text.twitch_channel",
            "state": state,
            "attributes": {}
        })
        .to_string()
    }

    fn spawn_watcher(
        server: &mockito::Server,
        cancel: &CancellationToken,
    ) -> (
        tokio::task::JoinHandle<()>,
        UnboundedReceiver<Option<String>>,
    ) {
        let client = HaClient::new(server.url(), Secret::new("tok".into())).unwrap();
        let watcher = EntityWatcher::new(client, "input_text.twitch_channel", POLL);
        let (tx, rx) = unbounded_channel();
        let cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            watcher
                .run(cancel, move |value| {
                    let tx = tx.clone();
                    async move {
                        let _ = tx.send(value);
                    }
                })
                .await;
        });
        (handle, rx)
    }

    async fn next(rx: &mut UnboundedReceiver<Option<String>>) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("watcher reported nothing")
            .expect("watcher channel closed")
    }

    #[tokio::test]
    async fn reports_initial_value_once() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/states/input_text.twitch_channel")
            .with_status(200)
            .with_body(state_body("somechannel"))
            .expect_at_least(3)
            .create_async()
            .await;

        let cancel = CancellationToken::new();
        let (handle, mut rx) = spawn_watcher(&server, &cancel);
        assert_eq!(next(&mut rx).await.as_deref(), Some("somechannel"));

        // Several more polls of the same value produce nothing new.
        tokio::time::sleep(POLL * 10).await;
        assert!(rx.try_recv().is_err());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn reports_changes() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", "/api/states/input_text.twitch_channel")
            .with_status(200)
            .with_body(state_body("first"))
            .create_async()
            .await;

        let cancel = CancellationToken::new();
        let (handle, mut rx) = spawn_watcher(&server, &cancel);
        assert_eq!(next(&mut rx).await.as_deref(), Some("first"));

        first.remove_async().await;
        let _second = server
            .mock("GET", "/api/states/input_text.twitch_channel")
            .with_status(200)
            .with_body(state_body("second"))
            .create_async()
            .await;
        assert_eq!(next(&mut rx).await.as_deref(), Some("second"));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn missing_entity_reports_none() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/states/input_text.twitch_channel")
            .with_status(404)
            .create_async()
            .await;

        let cancel = CancellationToken::new();
        let (handle, mut rx) = spawn_watcher(&server, &cancel);
        assert_eq!(next(&mut rx).await, None);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn failures_report_nothing_and_cancel_stops() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/states/input_text.twitch_channel")
            .with_status(500)
            .create_async()
            .await;

        let cancel = CancellationToken::new();
        let (handle, mut rx) = spawn_watcher(&server, &cancel);
        tokio::time::sleep(POLL * 5).await;
        assert!(rx.try_recv().is_err());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
