use {
    async_trait::async_trait,
    serde::Serialize,
    tracing::debug,
    twitchbridge_common::time::unix_now,
    twitchbridge_homeassistant::HaClient,
};

use crate::{Result, Sink, error::Context};

/// Topic suffix carrying the JSON array of all lines.
pub const SNAPSHOT_TOPIC: &str = "last3";

/// One `mqtt.publish` service call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Publish {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

#[derive(Serialize)]
struct TimedLine<'a> {
    text: &'a str,
    ts: i64,
}

/// Publishes the lines through Home Assistant's MQTT integration.
pub struct MqttSink {
    client: HaClient,
    base_topic: String,
    retain: bool,
}

impl MqttSink {
    #[must_use]
    pub fn new(client: HaClient, base_topic: &str, retain: bool) -> Self {
        Self {
            client,
            base_topic: base_topic.trim_end_matches('/').to_owned(),
            retain,
        }
    }
}

/// The snapshot publish followed by one publish per line.
pub fn build_publishes(base: &str, lines: &[String], retain: bool, ts: i64) -> Result<Vec<Publish>> {
    let snapshot: Vec<TimedLine<'_>> = lines
        .iter()
        .map(|text| TimedLine { text, ts })
        .collect();

    let mut publishes = Vec::with_capacity(lines.len() + 1);
    publishes.push(Publish {
        topic: format!("{base}/{SNAPSHOT_TOPIC}"),
        payload: serde_json::to_string(&snapshot)?,
        retain,
    });
    publishes.extend(lines.iter().enumerate().map(|(i, line)| Publish {
        topic: format!("{base}/line{}", i + 1),
        payload: line.clone(),
        retain,
    }));
    Ok(publishes)
}

#[async_trait]
impl Sink for MqttSink {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    async fn send(&self, lines: &[String]) -> Result<()> {
        for publish in build_publishes(&self.base_topic, lines, self.retain, unix_now())? {
            self.client
                .call_service("mqtt", "publish", serde_json::to_value(&publish)?)
                .await
                .with_context(|| format!("publishing {}", publish.topic))?;
            debug!(topic = %publish.topic, "published");
        }
        Ok(())
    }
}
