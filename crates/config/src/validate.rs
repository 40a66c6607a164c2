//! Field validation for [`RawBridgeConfig`].
//!
//! Every check reports the field name, the expected constraint and the
//! observed value, and the first violation aborts construction.

use crate::{
    Error, Result,
    schema::{BridgeConfig, RawBridgeConfig, TransportMode},
};

/// Highest port number accepted by the configuration.
pub const MAX_PORT: i64 = 65555;

pub fn validate(raw: RawBridgeConfig) -> Result<BridgeConfig> {
    let entity_id = match raw.entity_id {
        Some(id) => non_empty("entity_id", id)?,
        None => return Err(Error::invalid("entity_id", "a string", "missing")),
    };

    let transports = transports(&raw.transport_mode)?;
    let max_messages = positive("max_messages", raw.max_messages)? as usize;
    let irc_host = non_empty("irc_host", raw.irc_host)?;
    let irc_port = port("irc_port", raw.irc_port)?;
    let reconnect_delay_s = positive("reconnect_delay_s", raw.reconnect_delay_s)?;

    let mut udp_hosts = Vec::with_capacity(raw.udp_hosts.len());
    for (i, host) in raw.udp_hosts.into_iter().enumerate() {
        udp_hosts.push(non_empty(&format!("udp_hosts[{i}]"), host)?);
    }
    if transports.contains(&TransportMode::Udp) && udp_hosts.is_empty() {
        return Err(Error::invalid(
            "udp_hosts",
            "at least one host when transport_mode includes udp",
            "[]",
        ));
    }

    let udp_port = port("udp_port", raw.udp_port)?;
    let udp_line_max_chars = positive("udp_line_max_chars", raw.udp_line_max_chars)? as usize;
    let mqtt_base_topic = non_empty("mqtt_base_topic", raw.mqtt_base_topic)?;
    let ha_entity_id = non_empty("ha_entity_id", raw.ha_entity_id)?;
    let ha_url = http_url("ha_url", raw.ha_url)?;
    let entity_poll_interval_s = positive("entity_poll_interval_s", raw.entity_poll_interval_s)?;
    let sink_timeout_s = positive("sink_timeout_s", raw.sink_timeout_s)?;

    Ok(BridgeConfig {
        entity_id,
        transports,
        max_messages,
        irc_host,
        irc_port,
        reconnect_delay_s,
        udp_hosts,
        udp_port,
        udp_line_max_chars,
        mqtt_base_topic,
        mqtt_retain: raw.mqtt_retain,
        ha_entity_id,
        ha_url,
        ha_token: raw.ha_token,
        entity_poll_interval_s,
        sink_timeout_s,
    })
}

fn non_empty(field: &str, value: String) -> Result<String> {
    if value.is_empty() {
        return Err(Error::invalid(
            field,
            "string of length > 0",
            "length=0",
        ));
    }
    Ok(value)
}

fn positive(field: &str, value: i64) -> Result<u64> {
    if value < 1 {
        return Err(Error::invalid(field, "positive integer", value));
    }
    Ok(value as u64)
}

fn port(field: &str, value: i64) -> Result<u32> {
    if !(0..=MAX_PORT).contains(&value) {
        return Err(Error::invalid(
            field,
            format!("value 0 <= x <= {MAX_PORT}"),
            value,
        ));
    }
    Ok(value as u32)
}

fn http_url(field: &str, value: String) -> Result<String> {
    let value = non_empty(field, value)?;
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return Err(Error::invalid(field, "an http:// or https:// URL", value));
    }
    Ok(value.trim_end_matches('/').to_owned())
}

fn transports(raw: &[String]) -> Result<Vec<TransportMode>> {
    if raw.is_empty() {
        return Err(Error::invalid(
            "transport_mode",
            "one of [ha, udp, mqtt]",
            "[]",
        ));
    }
    let mut modes = Vec::with_capacity(raw.len());
    for value in raw {
        let mode: TransportMode = value.parse()?;
        if !modes.contains(&mode) {
            modes.push(mode);
        }
    }
    Ok(modes)
}
