use std::sync::{Arc, Mutex, PoisonError};

use {async_trait::async_trait, tracing::info};

use crate::Agent;

/// Values that mean "no channel", compared case-insensitively.
const NO_CHANNEL: &[&str] = &["unknown", "unavailable", "none"];

/// Anything that can follow a target channel.
#[async_trait]
pub trait ChannelSwitch: Send + Sync {
    async fn switch_channel(&self, channel: Option<String>);
}

#[async_trait]
impl ChannelSwitch for Agent {
    async fn switch_channel(&self, channel: Option<String>) {
        Agent::switch_channel(self, channel).await;
    }
}

/// Trim, strip leading `#`, lowercase. Empty and placeholder values map to
/// `None`.
#[must_use]
pub fn normalize_channel(raw: Option<&str>) -> Option<String> {
    let name = raw?.trim().trim_start_matches('#').trim().to_lowercase();
    if name.is_empty() || NO_CHANNEL.contains(&name.as_str()) {
        None
    } else {
        Some(name)
    }
}

/// Turns an external textual signal into agent channel switches.
pub struct ChannelSelector {
    target: Arc<dyn ChannelSwitch>,
    last: Mutex<Option<String>>,
}

impl ChannelSelector {
    #[must_use]
    pub fn new(target: Arc<dyn ChannelSwitch>) -> Self {
        Self {
            target,
            last: Mutex::new(None),
        }
    }

    /// Normalize `raw` and forward it. Repeats are forwarded again.
    pub async fn on_value(&self, raw: Option<&str>) -> Option<String> {
        let channel = normalize_channel(raw);
        match &channel {
            Some(name) => info!(raw = ?raw, channel = %name, "channel selected"),
            None => info!(raw = ?raw, "no channel selected"),
        }
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = channel.clone();
        self.target.switch_channel(channel.clone()).await;
        channel
    }

    /// Last normalized value forwarded.
    #[must_use]
    pub fn last_forwarded(&self) -> Option<String> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[derive(Default)]
    struct Calls(Mutex<Vec<Option<String>>>);

    #[async_trait]
    impl ChannelSwitch for Calls {
        async fn switch_channel(&self, channel: Option<String>) {
            self.0.lock().unwrap().push(channel);
        }
    }

    #[rstest]
    #[case(Some("SomeChannel"), Some("somechannel"))]
    #[case(Some("  #SomeChannel \n"), Some("somechannel"))]
    #[case(Some("##double"), Some("double"))]
    #[case(Some("# spaced"), Some("spaced"))]
    #[case(Some(""), None)]
    #[case(Some("   "), None)]
    #[case(Some("#"), None)]
    #[case(Some("unknown"), None)]
    #[case(Some("Unavailable"), None)]
    #[case(Some("NONE"), None)]
    #[case(Some("#unknown"), None)]
    #[case(None, None)]
    fn normalization(#[case] raw: Option<&str>, #[case] expected: Option<&str>) {
        assert_eq!(normalize_channel(raw).as_deref(), expected);
    }

    #[tokio::test]
    async fn forwards_every_value_including_repeats() {
        let calls = Arc::new(Calls::default());
        let selector = ChannelSelector::new(Arc::clone(&calls) as Arc<dyn ChannelSwitch>);

        selector.on_value(Some("#Foo")).await;
        selector.on_value(Some("foo")).await;
        assert_eq!(selector.last_forwarded().as_deref(), Some("foo"));
        selector.on_value(Some("unavailable")).await;
        assert_eq!(selector.last_forwarded(), None);

        assert_eq!(*calls.0.lock().unwrap(), vec![
            Some("foo".to_string()),
            Some("foo".to_string()),
            None,
        ]);
    }
}
