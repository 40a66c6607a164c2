use {
    async_trait::async_trait,
    serde_json::{Map, Value},
    twitchbridge_common::time::unix_now,
    twitchbridge_homeassistant::HaClient,
};

use crate::{Result, Sink};

pub const FRIENDLY_NAME: &str = "Twitch Chat Bridge";
pub const ICON: &str = "mdi:chat";

/// Constant entity state; the attributes carry the payload.
pub const STATE: &str = "ok";

/// Writes the lines as attributes of a Home Assistant entity.
pub struct HaAttributeSink {
    client: HaClient,
    entity_id: String,
}

impl HaAttributeSink {
    #[must_use]
    pub fn new(client: HaClient, entity_id: impl Into<String>) -> Self {
        Self {
            client,
            entity_id: entity_id.into(),
        }
    }
}

/// `line1..lineN`, `updated`, `friendly_name` and `icon`.
#[must_use]
pub fn build_attributes(lines: &[String], updated: i64) -> Value {
    let mut attrs = Map::with_capacity(lines.len() + 3);
    for (i, line) in lines.iter().enumerate() {
        attrs.insert(format!("line{}", i + 1), Value::String(line.clone()));
    }
    attrs.insert("updated".into(), Value::from(updated));
    attrs.insert("friendly_name".into(), Value::from(FRIENDLY_NAME));
    attrs.insert("icon".into(), Value::from(ICON));
    Value::Object(attrs)
}

#[async_trait]
impl Sink for HaAttributeSink {
    fn name(&self) -> &'static str {
        "ha"
    }

    async fn send(&self, lines: &[String]) -> Result<()> {
        self.client
            .set_state(&self.entity_id, STATE, build_attributes(lines, unix_now()))
            .await?;
        Ok(())
    }
}
