use std::collections::VecDeque;

/// User name recorded when a message carries no sender.
pub const UNKNOWN_USER: &str = "unknown";

/// One public chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    /// Channel name without the leading `#`.
    pub channel: String,
    pub user: String,
    pub message: String,
    /// UTC seconds.
    pub timestamp: i64,
}

impl ChatEvent {
    #[must_use]
    pub fn new(
        channel: impl Into<String>,
        user: impl Into<String>,
        message: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            channel: channel.into(),
            user: user.into(),
            message: message.into(),
            timestamp,
        }
    }

    /// `"<user>: <message>"`.
    #[must_use]
    pub fn display_line(&self) -> String {
        format!("{}: {}", self.user, self.message)
    }
}

/// Bounded FIFO of recent chat events; the oldest is evicted on overflow.
#[derive(Debug, Clone)]
pub struct RollingBuffer {
    events: VecDeque<ChatEvent>,
    capacity: usize,
}

impl RollingBuffer {
    /// A zero capacity is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, event: ChatEvent) {
        while self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &ChatEvent> {
        self.events.iter()
    }

    /// Exactly `line_count` display lines: blanks first, then the newest
    /// events oldest to newest.
    #[must_use]
    pub fn render(&self, line_count: usize) -> Vec<String> {
        let shown = self.events.len().min(line_count);
        let mut lines = vec![String::new(); line_count - shown];
        lines.extend(
            self.events
                .iter()
                .skip(self.events.len() - shown)
                .map(ChatEvent::display_line),
        );
        lines
    }
}
