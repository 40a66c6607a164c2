//! Join/part reconciliation between the joined set and the target channel.

use std::collections::BTreeSet;

use {
    tracing::{info, warn},
    twitchbridge_irc::Session,
};

/// Protocol channel names (`#name`) the live session believes it is in.
pub type JoinedSet = BTreeSet<String>;

/// Protocol name for a normalized target channel.
#[must_use]
pub fn protocol_channel(target: &str) -> String {
    format!("#{target}")
}

/// Channels to leave and to enter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub part: Vec<String>,
    pub join: Vec<String>,
}

impl Plan {
    /// Compare `joined` against the desired membership for `target`.
    #[must_use]
    pub fn new(joined: &JoinedSet, target: Option<&str>) -> Self {
        let want: JoinedSet = target.map(protocol_channel).into_iter().collect();
        Self {
            part: joined.difference(&want).cloned().collect(),
            join: want.difference(joined).cloned().collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.part.is_empty() && self.join.is_empty()
    }
}

/// A membership change that went through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Membership {
    Parted(String),
    Joined(String),
}

impl Membership {
    pub fn apply_to(&self, joined: &mut JoinedSet) {
        match self {
            Self::Parted(channel) => {
                joined.remove(channel);
            },
            Self::Joined(channel) => {
                joined.insert(channel.clone());
            },
        }
    }
}

/// Carry out `plan` on `session`, reporting each success to `record`.
///
/// Failures are logged and skipped; the channel stays pending and the next
/// plan retries it.
pub async fn execute(plan: &Plan, session: &mut dyn Session, mut record: impl FnMut(Membership)) {
    for channel in &plan.part {
        match session.part(channel).await {
            Ok(()) => {
                info!(channel, "parted");
                record(Membership::Parted(channel.clone()));
            },
            Err(e) => warn!(channel, error = %e, "part failed"),
        }
    }
    for channel in &plan.join {
        match session.join(channel).await {
            Ok(()) => {
                info!(channel, "joined");
                record(Membership::Joined(channel.clone()));
            },
            Err(e) => warn!(channel, error = %e, "join failed"),
        }
    }
}
