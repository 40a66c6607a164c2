//! Config schema types.
//!
//! [`RawBridgeConfig`] mirrors the file on disk and keeps integers signed so
//! that out-of-range values can be reported verbatim. [`BridgeConfig`] is the
//! validated, typed record every other crate consumes.

use std::{fmt, str::FromStr, time::Duration};

use {
    secrecy::Secret,
    serde::{Deserialize, Deserializer, de},
};

use crate::{Error, Result, validate};

/// Smallest number of lines ever emitted to the sinks.
pub const MIN_LINES: usize = 3;

/// Which downstream sink(s) receive the rolling chat lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportMode {
    /// Home Assistant entity attributes.
    Ha,
    /// UDP datagrams.
    Udp,
    /// MQTT publish through Home Assistant.
    Mqtt,
}

impl TransportMode {
    pub const ALL: &'static [TransportMode] = &[Self::Ha, Self::Udp, Self::Mqtt];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ha => "ha",
            Self::Udp => "udp",
            Self::Mqtt => "mqtt",
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ha" => Ok(Self::Ha),
            "udp" => Ok(Self::Udp),
            "mqtt" => Ok(Self::Mqtt),
            _ => Err(Error::invalid(
                "transport_mode",
                "one of [ha, udp, mqtt]",
                s,
            )),
        }
    }
}

/// Configuration as written in the file.
#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawBridgeConfig {
    /// Home Assistant entity whose state names the channel to follow.
    pub entity_id: Option<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub transport_mode: Vec<String>,
    pub max_messages: i64,
    pub irc_host: String,
    pub irc_port: i64,
    pub reconnect_delay_s: i64,
    #[serde(deserialize_with = "string_or_list")]
    pub udp_hosts: Vec<String>,
    pub udp_port: i64,
    pub udp_line_max_chars: i64,
    pub mqtt_base_topic: String,
    pub mqtt_retain: bool,
    pub ha_entity_id: String,
    pub ha_url: String,
    pub ha_token: Secret<String>,
    pub entity_poll_interval_s: i64,
    pub sink_timeout_s: i64,
}

impl Default for RawBridgeConfig {
    fn default() -> Self {
        Self {
            entity_id: None,
            transport_mode: vec!["ha".into()],
            max_messages: 3,
            irc_host: "irc.chat.twitch.tv".into(),
            irc_port: 6697,
            reconnect_delay_s: 5,
            udp_hosts: Vec::new(),
            udp_port: 7777,
            udp_line_max_chars: 160,
            mqtt_base_topic: "twitch_chat".into(),
            mqtt_retain: true,
            ha_entity_id: "sensor.twitch_chat_bridge".into(),
            ha_url: "http://supervisor/core".into(),
            ha_token: Secret::new(String::new()),
            entity_poll_interval_s: 5,
            sink_timeout_s: 5,
        }
    }
}

impl fmt::Debug for RawBridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawBridgeConfig")
            .field("entity_id", &self.entity_id)
            .field("transport_mode", &self.transport_mode)
            .field("irc_host", &self.irc_host)
            .field("ha_token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// Validated bridge settings.
#[derive(Clone)]
pub struct BridgeConfig {
    pub entity_id: String,
    /// Enabled sinks, deduplicated, in configuration order.
    pub transports: Vec<TransportMode>,
    pub max_messages: usize,
    pub irc_host: String,
    /// Accepted range is 0–65555; values above 65535 fail at connect time.
    pub irc_port: u32,
    pub reconnect_delay_s: u64,
    pub udp_hosts: Vec<String>,
    pub udp_port: u32,
    pub udp_line_max_chars: usize,
    pub mqtt_base_topic: String,
    pub mqtt_retain: bool,
    pub ha_entity_id: String,
    pub ha_url: String,
    pub ha_token: Secret<String>,
    pub entity_poll_interval_s: u64,
    pub sink_timeout_s: u64,
}

impl BridgeConfig {
    /// Number of lines in every emission (and capacity of the rolling buffer).
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.max_messages.max(MIN_LINES)
    }

    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_s)
    }

    #[must_use]
    pub fn entity_poll_interval(&self) -> Duration {
        Duration::from_secs(self.entity_poll_interval_s)
    }

    #[must_use]
    pub fn sink_timeout(&self) -> Duration {
        Duration::from_secs(self.sink_timeout_s)
    }

    #[must_use]
    pub fn uses(&self, mode: TransportMode) -> bool {
        self.transports.contains(&mode)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let raw: RawBridgeConfig = toml::from_str(raw).map_err(Error::parse)?;
        Self::try_from(raw)
    }
}

impl TryFrom<RawBridgeConfig> for BridgeConfig {
    type Error = Error;

    fn try_from(raw: RawBridgeConfig) -> Result<Self> {
        validate::validate(raw)
    }
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("entity_id", &self.entity_id)
            .field("transports", &self.transports)
            .field("max_messages", &self.max_messages)
            .field("irc_host", &self.irc_host)
            .field("irc_port", &self.irc_port)
            .field("reconnect_delay_s", &self.reconnect_delay_s)
            .field("udp_hosts", &self.udp_hosts)
            .field("udp_port", &self.udp_port)
            .field("udp_line_max_chars", &self.udp_line_max_chars)
            .field("mqtt_base_topic", &self.mqtt_base_topic)
            .field("mqtt_retain", &self.mqtt_retain)
            .field("ha_entity_id", &self.ha_entity_id)
            .field("ha_url", &self.ha_url)
            .field("ha_token", &"[REDACTED]")
            .field("entity_poll_interval_s", &self.entity_poll_interval_s)
            .field("sink_timeout_s", &self.sink_timeout_s)
            .finish()
    }
}

/// Accept either a single string or a list of strings.
fn string_or_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrList;

    impl<'de> de::Visitor<'de> for StringOrList {
        type Value = Vec<String>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a string or a list of strings")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> std::result::Result<Self::Value, E> {
            Ok(vec![value.to_owned()])
        }

        fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(item) = seq.next_element::<String>()? {
                out.push(item);
            }
            Ok(out)
        }
    }

    deserializer.deserialize_any(StringOrList)
}
