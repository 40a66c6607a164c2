//! Downstream consumers of the rolling chat lines.
//!
//! Every sink receives the same fixed-length, oldest-to-newest list of
//! display lines on each emission. Sinks share nothing with each other; the
//! agent isolates their failures.

pub mod error;
pub mod ha;
pub mod mqtt;
pub mod udp;

use std::sync::Arc;

use {
    async_trait::async_trait,
    tracing::info,
    twitchbridge_config::{BridgeConfig, TransportMode},
    twitchbridge_homeassistant::HaClient,
};

pub use {
    error::{Error, Result},
    ha::HaAttributeSink,
    mqtt::MqttSink,
    udp::UdpSink,
};

/// A destination for rendered chat lines.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Deliver `lines` (fixed length, oldest first, blanks allowed).
    async fn send(&self, lines: &[String]) -> Result<()>;
}

/// Build one sink per enabled transport, in configuration order.
pub fn build_sinks(config: &BridgeConfig, ha: &HaClient) -> Result<Vec<Arc<dyn Sink>>> {
    let mut sinks: Vec<Arc<dyn Sink>> = Vec::with_capacity(config.transports.len());
    for mode in &config.transports {
        let sink: Arc<dyn Sink> = match mode {
            TransportMode::Ha => Arc::new(HaAttributeSink::new(
                ha.clone(),
                config.ha_entity_id.clone(),
            )),
            TransportMode::Mqtt => Arc::new(MqttSink::new(
                ha.clone(),
                &config.mqtt_base_topic,
                config.mqtt_retain,
            )),
            TransportMode::Udp => Arc::new(UdpSink::new(
                config.udp_hosts.clone(),
                config.udp_port,
                config.udp_line_max_chars,
            )?),
        };
        info!(sink = sink.name(), "sink enabled");
        sinks.push(sink);
    }
    Ok(sinks)
}
