//! The connection supervisor state machine.
//!
//! One background task owns the live [`Session`]. Everything other tasks may
//! touch (target, connection state, joined set, rolling buffer, and the
//! cancellation handle of the current connection) lives behind a single
//! `std::sync::Mutex` that is never held across an `.await`.

use std::{
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    tokio::{sync::Notify, task::JoinHandle},
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, trace, warn},
    twitchbridge_common::time::unix_now,
    twitchbridge_config::BridgeConfig,
    twitchbridge_irc::{Connector, IrcEvent, Session, anonymous_nick, channel_display_name},
    twitchbridge_sinks::Sink,
};

use crate::{
    Error, Result,
    backoff::Backoff,
    buffer::{ChatEvent, RollingBuffer, UNKNOWN_USER},
    emit::Emitter,
    error::Context,
    reconcile::{self, JoinedSet, Plan},
};

/// Longest a single protocol read blocks the loop.
pub const POLL_SLICE: Duration = Duration::from_millis(500);

/// Runtime knobs, usually derived from [`BridgeConfig`].
#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub reconnect_delay: Duration,
    /// Lines per emission; also the rolling buffer capacity.
    pub line_count: usize,
    pub sink_timeout: Duration,
    pub poll_slice: Duration,
}

impl From<&BridgeConfig> for AgentOptions {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            reconnect_delay: config.reconnect_delay(),
            line_count: config.line_count(),
            sink_timeout: config.sink_timeout(),
            poll_slice: POLL_SLICE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        })
    }
}

/// Point-in-time copy of the agent's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSnapshot {
    pub connection: ConnectionState,
    pub target: Option<String>,
    pub joined: JoinedSet,
    pub buffered: usize,
    /// Nick of the current connection handle, if any.
    pub nick: Option<String>,
}

struct ConnectionHandle {
    nick: String,
    cancel: CancellationToken,
}

struct AgentState {
    connection: ConnectionState,
    target: Option<String>,
    handle: Option<ConnectionHandle>,
    joined: JoinedSet,
    buffer: RollingBuffer,
}

impl AgentState {
    /// Drop the connection handle and reset to `Disconnected`. Returns whether
    /// a handle was present.
    fn teardown(&mut self) -> bool {
        let had_handle = match self.handle.take() {
            Some(handle) => {
                handle.cancel.cancel();
                true
            },
            None => false,
        };
        self.connection = ConnectionState::Disconnected;
        self.joined.clear();
        had_handle
    }
}

/// Session owned by the loop, paired with the token that tears it down.
struct Live {
    session: Box<dyn Session>,
    cancel: CancellationToken,
}

struct Inner {
    options: AgentOptions,
    connector: Arc<dyn Connector>,
    emitter: Emitter,
    state: Mutex<AgentState>,
    stop: CancellationToken,
    target_changed: Notify,
    started: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to the connection supervisor. Cheap to clone.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Agent {
    #[must_use]
    pub fn new(
        options: AgentOptions,
        connector: Arc<dyn Connector>,
        sinks: Vec<Arc<dyn Sink>>,
    ) -> Self {
        let state = AgentState {
            connection: ConnectionState::Disconnected,
            target: None,
            handle: None,
            joined: JoinedSet::new(),
            buffer: RollingBuffer::new(options.line_count),
        };
        Self {
            inner: Arc::new(Inner {
                emitter: Emitter::new(sinks, options.sink_timeout),
                options,
                connector,
                state: Mutex::new(state),
                stop: CancellationToken::new(),
                target_changed: Notify::new(),
                started: AtomicBool::new(false),
                task: Mutex::new(None),
            }),
        }
    }

    #[must_use]
    pub fn from_config(
        config: &BridgeConfig,
        connector: Arc<dyn Connector>,
        sinks: Vec<Arc<dyn Sink>>,
    ) -> Self {
        Self::new(AgentOptions::from(config), connector, sinks)
    }

    /// Spawn the control loop. Later calls are no-ops.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            debug!("agent already started");
            return;
        }
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { inner.run().await });
        *lock(&self.inner.task) = Some(handle);
    }

    /// Follow `channel` (already normalized), or disconnect when `None`.
    ///
    /// The rolling buffer is cleared and an all-blank emission is sent before
    /// this returns.
    pub async fn switch_channel(&self, channel: Option<String>) {
        let torn_down = {
            let mut state = self.inner.lock_state();
            state.target = channel.clone();
            state.buffer.clear();
            if channel.is_none() {
                state.teardown()
            } else {
                false
            }
        };
        match &channel {
            Some(name) => info!(channel = %name, "switching channel"),
            None => info!(torn_down, "no channel selected; disconnecting"),
        }
        self.inner.target_changed.notify_one();

        let blank = vec![String::new(); self.inner.options.line_count];
        self.inner.emitter.emit(&blank).await;
    }

    /// Ask the loop to stop and tear down the connection.
    pub fn terminate(&self) {
        info!("terminating agent");
        self.inner.stop.cancel();
        self.inner.lock_state().teardown();
    }

    /// Wait for the control loop to exit.
    pub async fn wait(&self) {
        let handle = lock(&self.inner.task).take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            error!(error = %e, "agent loop ended abnormally");
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> AgentSnapshot {
        let state = self.inner.lock_state();
        AgentSnapshot {
            connection: state.connection,
            target: state.target.clone(),
            joined: state.joined.clone(),
            buffered: state.buffer.len(),
            nick: state.handle.as_ref().map(|h| h.nick.clone()),
        }
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, AgentState> {
        lock(&self.state)
    }

    async fn run(self: Arc<Self>) {
        info!(
            reconnect_delay_s = self.options.reconnect_delay.as_secs(),
            sinks = self.emitter.sink_count(),
            "agent loop started"
        );
        let mut backoff = Backoff::new(self.options.reconnect_delay);
        let mut live: Option<Live> = None;

        while !self.stop.is_cancelled() {
            // Torn down from another task since the last iteration.
            if live.as_ref().is_some_and(|l| l.cancel.is_cancelled())
                && let Some(stale) = live.take()
            {
                close(stale, "leaving").await;
            }

            let has_target = self.lock_state().target.is_some();
            if !has_target {
                if let Some(current) = live.take() {
                    self.lock_state().teardown();
                    close(current, "leaving").await;
                }
                self.idle().await;
                continue;
            }

            if live.is_none() {
                match self.connect().await {
                    Ok(Some(connected)) => {
                        backoff.reset();
                        live = Some(connected);
                    },
                    Ok(None) => continue,
                    Err(e) => {
                        self.back_off(&mut backoff, e).await;
                        continue;
                    },
                }
            }
            let Some(current) = live.as_mut() else {
                continue;
            };

            if let Err(e) = self.step(current).await {
                if let Some(failed) = live.take() {
                    close(failed, "connection error").await;
                }
                self.back_off(&mut backoff, e).await;
            }
        }

        if let Some(current) = live.take() {
            close(current, "shutting down").await;
        }
        self.lock_state().teardown();
        info!("agent loop stopped");
    }

    /// Sleep until the reconnect delay elapses, the target changes, or stop.
    async fn idle(&self) {
        trace!("no target channel; idling");
        tokio::select! {
            _ = self.stop.cancelled() => {},
            _ = self.target_changed.notified() => {},
            _ = tokio::time::sleep(self.options.reconnect_delay) => {},
        }
    }

    async fn back_off(&self, backoff: &mut Backoff, err: Error) {
        self.lock_state().teardown();
        let delay = backoff.next_delay();
        warn!(
            error = %err,
            delay_ms = delay.as_millis() as u64,
            "connection lost; retrying after backoff"
        );
        tokio::select! {
            _ = self.stop.cancelled() => {},
            _ = tokio::time::sleep(delay) => {},
        }
    }

    /// Open a fresh anonymous session. `Ok(None)` means the attempt was
    /// abandoned because the target went away or a teardown was requested.
    async fn connect(&self) -> Result<Option<Live>> {
        let nick = anonymous_nick();
        let cancel = CancellationToken::new();
        {
            let mut state = self.lock_state();
            if state.target.is_none() {
                return Ok(None);
            }
            state.connection = ConnectionState::Connecting;
            state.joined.clear();
            state.handle = Some(ConnectionHandle {
                nick: nick.clone(),
                cancel: cancel.clone(),
            });
        }
        info!(nick, "connecting");

        let connected = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(nick, "connect abandoned");
                return Ok(None);
            },
            connected = self.connector.connect(&nick) => connected,
        };
        let session = match connected {
            Ok(session) => session,
            Err(e) => {
                self.lock_state().teardown();
                return Err(e.into());
            },
        };

        let accepted = {
            let mut state = self.lock_state();
            let accepted = !cancel.is_cancelled();
            if accepted {
                state.connection = ConnectionState::Connected;
            }
            accepted
        };
        let live = Live { session, cancel };
        if accepted {
            info!(nick, "connected");
            Ok(Some(live))
        } else {
            close(live, "leaving").await;
            Ok(None)
        }
    }

    /// One tick: reconcile membership, then handle at most one event.
    async fn step(&self, live: &mut Live) -> Result<()> {
        let plan = {
            let state = self.lock_state();
            Plan::new(&state.joined, state.target.as_deref())
        };
        if !plan.is_empty() {
            let cancel = live.cancel.clone();
            reconcile::execute(&plan, live.session.as_mut(), |change| {
                if !cancel.is_cancelled() {
                    change.apply_to(&mut self.lock_state().joined);
                }
            })
            .await;
        }

        let event = tokio::select! {
            _ = live.cancel.cancelled() => return Ok(()),
            event = live.session.next_event(self.options.poll_slice) => event?,
        };
        match event {
            None => {},
            Some(IrcEvent::Ping { token }) => {
                live.session
                    .pong(&token)
                    .await
                    .with_context(|| format!("answering PING {token}"))?;
                trace!(token, "answered PING");
            },
            Some(IrcEvent::PubMsg {
                channel,
                nick,
                text,
            }) => self.on_message(&channel, nick, text).await,
            Some(IrcEvent::Disconnected { reason }) => {
                return Err(Error::Disconnected { reason });
            },
            Some(IrcEvent::Notice { text }) => info!(text, "server notice"),
            Some(IrcEvent::Other { command }) => trace!(command, "ignoring IRC command"),
        }
        Ok(())
    }

    async fn on_message(&self, channel: &str, nick: Option<String>, text: Option<String>) {
        let event = ChatEvent::new(
            channel_display_name(channel),
            nick.filter(|n| !n.is_empty())
                .unwrap_or_else(|| UNKNOWN_USER.to_owned()),
            text.unwrap_or_default(),
            unix_now(),
        );
        debug!(channel = %event.channel, user = %event.user, "chat message");
        let lines = {
            let mut state = self.lock_state();
            state.buffer.push(event);
            state.buffer.render(self.options.line_count)
        };
        self.emitter.emit(&lines).await;
    }
}

/// Best-effort goodbye; never fails.
async fn close(mut live: Live, reason: &str) {
    debug!(nick = live.session.nick(), reason, "closing session");
    live.cancel.cancel();
    live.session.quit(reason).await;
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        async_trait::async_trait,
        std::{
            collections::HashSet,
            sync::atomic::AtomicUsize,
        },
        tokio::{sync::mpsc, time::Instant},
        twitchbridge_irc::{Error as IrcError, Result as IrcResult},
        twitchbridge_sinks::{Error as SinkError, Result as SinkResult},
    };

    /// Shared view of everything the fake network saw.
    #[derive(Default)]
    struct Wire {
        log: Mutex<Vec<String>>,
        senders: Mutex<Vec<mpsc::UnboundedSender<IrcEvent>>>,
        connects: AtomicUsize,
        refuse_connects: AtomicUsize,
        refuse_joins: Mutex<HashSet<String>>,
    }

    impl Wire {
        fn record(&self, line: String) {
            self.log.lock().unwrap().push(line);
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        fn count(&self, line: &str) -> usize {
            self.log().iter().filter(|l| l.as_str() == line).count()
        }

        /// Deliver an event on the newest session.
        fn push(&self, event: IrcEvent) {
            let senders = self.senders.lock().unwrap();
            senders.last().unwrap().send(event).unwrap();
        }

        fn chat(&self, nick: &str, text: &str) {
            self.push(IrcEvent::PubMsg {
                channel: "#chan".into(),
                nick: Some(nick.into()),
                text: Some(text.into()),
            });
        }
    }

    struct FakeConnector(Arc<Wire>);

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(&self, nick: &str) -> IrcResult<Box<dyn Session>> {
            self.0.connects.fetch_add(1, Ordering::SeqCst);
            let refused = self
                .0
                .refuse_connects
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if refused {
                self.0.record("REFUSED".into());
                return Err(IrcError::closed("connection refused"));
            }
            let (tx, rx) = mpsc::unbounded_channel();
            self.0.senders.lock().unwrap().push(tx);
            self.0.record(format!("CONNECT {nick}"));
            Ok(Box::new(FakeSession {
                nick: nick.to_owned(),
                events: rx,
                wire: Arc::clone(&self.0),
            }))
        }
    }

    struct FakeSession {
        nick: String,
        events: mpsc::UnboundedReceiver<IrcEvent>,
        wire: Arc<Wire>,
    }

    #[async_trait]
    impl Session for FakeSession {
        fn nick(&self) -> &str {
            &self.nick
        }

        async fn join(&mut self, channel: &str) -> IrcResult<()> {
            if self.wire.refuse_joins.lock().unwrap().contains(channel) {
                self.wire.record(format!("JOIN-FAILED {channel}"));
                return Err(IrcError::closed("write failed"));
            }
            self.wire.record(format!("JOIN {channel}"));
            Ok(())
        }

        async fn part(&mut self, channel: &str) -> IrcResult<()> {
            self.wire.record(format!("PART {channel}"));
            Ok(())
        }

        async fn pong(&mut self, token: &str) -> IrcResult<()> {
            self.wire.record(format!("PONG {token}"));
            Ok(())
        }

        async fn next_event(&mut self, slice: Duration) -> IrcResult<Option<IrcEvent>> {
            match tokio::time::timeout(slice, self.events.recv()).await {
                Err(_) => Ok(None),
                Ok(Some(event)) => Ok(Some(event)),
                Ok(None) => Ok(Some(IrcEvent::Disconnected {
                    reason: "wire dropped".into(),
                })),
            }
        }

        async fn quit(&mut self, _reason: &str) {
            self.wire.record("QUIT".into());
        }
    }

    #[derive(Default)]
    struct Recording(Mutex<Vec<Vec<String>>>);

    impl Recording {
        fn last(&self) -> Option<Vec<String>> {
            self.0.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl Sink for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn send(&self, lines: &[String]) -> SinkResult<()> {
            self.0.lock().unwrap().push(lines.to_vec());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Sink for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn send(&self, _lines: &[String]) -> SinkResult<()> {
            Err(SinkError::message("downstream offline"))
        }
    }

    fn options() -> AgentOptions {
        AgentOptions {
            reconnect_delay: Duration::from_millis(10),
            line_count: 3,
            sink_timeout: Duration::from_secs(1),
            poll_slice: Duration::from_millis(10),
        }
    }

    fn fixture(extra: Vec<Arc<dyn Sink>>) -> (Agent, Arc<Wire>, Arc<Recording>) {
        let wire = Arc::new(Wire::default());
        let recording = Arc::new(Recording::default());
        let mut sinks = extra;
        sinks.push(Arc::clone(&recording) as Arc<dyn Sink>);
        let agent = Agent::new(
            options(),
            Arc::new(FakeConnector(Arc::clone(&wire))),
            sinks,
        );
        (agent, wire, recording)
    }

    async fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    async fn joined_to(agent: &Agent, channel: &str) {
        let want = format!("#{channel}");
        eventually("join", || agent.snapshot().joined.contains(&want)).await;
    }

    #[tokio::test]
    async fn idles_without_target() {
        let (agent, wire, _) = fixture(Vec::new());
        agent.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(wire.connects.load(Ordering::SeqCst), 0);
        assert_eq!(agent.snapshot().connection, ConnectionState::Disconnected);
        agent.terminate();
        agent.wait().await;
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let (agent, wire, _) = fixture(Vec::new());
        agent.start();
        agent.start();
        agent.switch_channel(Some("chan".into())).await;
        joined_to(&agent, "chan").await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(wire.connects.load(Ordering::SeqCst), 1);
        assert_eq!(wire.count("JOIN #chan"), 1);
        agent.terminate();
        agent.wait().await;
    }

    #[tokio::test]
    async fn connects_with_anonymous_nick() {
        let (agent, wire, _) = fixture(Vec::new());
        agent.start();
        agent.switch_channel(Some("chan".into())).await;
        joined_to(&agent, "chan").await;

        let snapshot = agent.snapshot();
        assert_eq!(snapshot.connection, ConnectionState::Connected);
        assert_eq!(snapshot.target.as_deref(), Some("chan"));
        let nick = snapshot.nick.unwrap();
        assert!(nick.starts_with("justinfan"));
        assert_eq!(wire.log()[0], format!("CONNECT {nick}"));
        agent.terminate();
        agent.wait().await;
    }

    #[tokio::test]
    async fn rolling_window_of_three() {
        let (agent, wire, recording) = fixture(Vec::new());
        agent.start();
        agent.switch_channel(Some("chan".into())).await;
        assert_eq!(recording.last().unwrap(), lines(&["", "", ""]));
        joined_to(&agent, "chan").await;

        wire.chat("a", "hi");
        wire.chat("b", "yo");
        wire.chat("c", "sup");
        let expected = lines(&["a: hi", "b: yo", "c: sup"]);
        eventually("three messages", || recording.last() == Some(expected.clone())).await;

        wire.chat("d", "later");
        let expected = lines(&["b: yo", "c: sup", "d: later"]);
        eventually("eviction", || recording.last() == Some(expected.clone())).await;
        assert_eq!(agent.snapshot().buffered, 3);
        agent.terminate();
        agent.wait().await;
    }

    #[tokio::test]
    async fn missing_text_and_sender_still_buffer() {
        let (agent, wire, recording) = fixture(Vec::new());
        agent.start();
        agent.switch_channel(Some("chan".into())).await;
        joined_to(&agent, "chan").await;

        wire.push(IrcEvent::PubMsg {
            channel: "#chan".into(),
            nick: Some("a".into()),
            text: None,
        });
        wire.push(IrcEvent::PubMsg {
            channel: "#chan".into(),
            nick: None,
            text: Some("who?".into()),
        });
        let expected = lines(&["", "a: ", "unknown: who?"]);
        eventually("partial messages", || recording.last() == Some(expected.clone())).await;
        agent.terminate();
        agent.wait().await;
    }

    #[tokio::test]
    async fn switching_channels_parts_joins_and_blanks() {
        let (agent, wire, recording) = fixture(Vec::new());
        agent.start();
        agent.switch_channel(Some("a".into())).await;
        joined_to(&agent, "a").await;
        wire.push(IrcEvent::PubMsg {
            channel: "#a".into(),
            nick: Some("x".into()),
            text: Some("hello".into()),
        });
        eventually("message", || agent.snapshot().buffered == 1).await;

        agent.switch_channel(Some("b".into())).await;
        assert_eq!(agent.snapshot().buffered, 0);
        assert_eq!(recording.last().unwrap(), lines(&["", "", ""]));

        joined_to(&agent, "b").await;
        assert_eq!(
            agent.snapshot().joined,
            JoinedSet::from(["#b".to_string()])
        );
        let log = wire.log();
        let part = log.iter().position(|l| l == "PART #a").unwrap();
        let join = log.iter().position(|l| l == "JOIN #b").unwrap();
        assert!(part < join);
        assert_eq!(wire.connects.load(Ordering::SeqCst), 1);
        agent.terminate();
        agent.wait().await;
    }

    #[tokio::test]
    async fn failed_join_is_retried() {
        let (agent, wire, _) = fixture(Vec::new());
        wire.refuse_joins.lock().unwrap().insert("#chan".into());
        agent.start();
        agent.switch_channel(Some("chan".into())).await;
        eventually("failed join", || wire.count("JOIN-FAILED #chan") >= 2).await;
        assert!(agent.snapshot().joined.is_empty());
        assert_eq!(agent.snapshot().connection, ConnectionState::Connected);

        wire.refuse_joins.lock().unwrap().clear();
        joined_to(&agent, "chan").await;
        assert_eq!(wire.connects.load(Ordering::SeqCst), 1);
        agent.terminate();
        agent.wait().await;
    }

    #[tokio::test]
    async fn no_channel_tears_down_immediately() {
        let (agent, wire, recording) = fixture(Vec::new());
        agent.start();
        agent.switch_channel(Some("chan".into())).await;
        joined_to(&agent, "chan").await;

        agent.switch_channel(None).await;
        let snapshot = agent.snapshot();
        assert_eq!(snapshot.connection, ConnectionState::Disconnected);
        assert_eq!(snapshot.nick, None);
        assert_eq!(snapshot.target, None);
        assert!(snapshot.joined.is_empty());
        assert_eq!(recording.last().unwrap(), lines(&["", "", ""]));

        eventually("quit", || wire.count("QUIT") == 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(wire.connects.load(Ordering::SeqCst), 1);
        assert_eq!(agent.snapshot().connection, ConnectionState::Disconnected);
        agent.terminate();
        agent.wait().await;
    }

    #[tokio::test]
    async fn returning_target_reconnects() {
        let (agent, wire, _) = fixture(Vec::new());
        agent.start();
        agent.switch_channel(Some("chan".into())).await;
        joined_to(&agent, "chan").await;
        agent.switch_channel(None).await;
        agent.switch_channel(Some("other".into())).await;
        joined_to(&agent, "other").await;
        assert_eq!(wire.connects.load(Ordering::SeqCst), 2);
        agent.terminate();
        agent.wait().await;
    }

    #[tokio::test]
    async fn answers_ping() {
        let (agent, wire, _) = fixture(Vec::new());
        agent.start();
        agent.switch_channel(Some("chan".into())).await;
        joined_to(&agent, "chan").await;
        wire.push(IrcEvent::Ping {
            token: "tmi.twitch.tv".into(),
        });
        eventually("pong", || wire.count("PONG tmi.twitch.tv") == 1).await;
        agent.terminate();
        agent.wait().await;
    }

    #[tokio::test]
    async fn server_disconnect_reconnects_and_rejoins() {
        let (agent, wire, _) = fixture(Vec::new());
        agent.start();
        agent.switch_channel(Some("chan".into())).await;
        joined_to(&agent, "chan").await;
        let first_nick = agent.snapshot().nick;

        wire.push(IrcEvent::Disconnected {
            reason: "server requested reconnect".into(),
        });
        eventually("second join", || wire.count("JOIN #chan") == 2).await;
        assert_eq!(wire.connects.load(Ordering::SeqCst), 2);
        let snapshot = agent.snapshot();
        assert_eq!(snapshot.connection, ConnectionState::Connected);
        assert_ne!(snapshot.nick, first_nick);
        agent.terminate();
        agent.wait().await;
    }

    #[tokio::test]
    async fn connect_failures_back_off_and_recover() {
        let (agent, wire, _) = fixture(Vec::new());
        wire.refuse_connects.store(2, Ordering::SeqCst);
        agent.start();
        agent.switch_channel(Some("chan".into())).await;
        joined_to(&agent, "chan").await;
        assert_eq!(wire.connects.load(Ordering::SeqCst), 3);
        assert_eq!(wire.count("REFUSED"), 2);
        agent.terminate();
        agent.wait().await;
    }

    #[tokio::test]
    async fn failing_sink_is_isolated() {
        let (agent, wire, recording) = fixture(vec![Arc::new(Failing) as Arc<dyn Sink>]);
        agent.start();
        agent.switch_channel(Some("chan".into())).await;
        assert_eq!(*recording.0.lock().unwrap(), vec![lines(&["", "", ""])]);
        joined_to(&agent, "chan").await;

        wire.chat("a", "hi");
        let expected = lines(&["", "", "a: hi"]);
        eventually("delivery", || recording.last() == Some(expected.clone())).await;
        let snapshot = agent.snapshot();
        assert_eq!(snapshot.connection, ConnectionState::Connected);
        assert_eq!(snapshot.buffered, 1);
        agent.terminate();
        agent.wait().await;
    }

    #[tokio::test]
    async fn terminate_stops_loop_and_quits() {
        let (agent, wire, _) = fixture(Vec::new());
        agent.start();
        agent.switch_channel(Some("chan".into())).await;
        joined_to(&agent, "chan").await;

        agent.terminate();
        tokio::time::timeout(Duration::from_secs(5), agent.wait())
            .await
            .unwrap();
        assert_eq!(wire.count("QUIT"), 1);
        let snapshot = agent.snapshot();
        assert_eq!(snapshot.connection, ConnectionState::Disconnected);
        assert_eq!(snapshot.nick, None);
    }

    #[tokio::test]
    async fn switch_before_start_only_emits() {
        let (agent, wire, recording) = fixture(Vec::new());
        agent.switch_channel(Some("chan".into())).await;
        assert_eq!(recording.last().unwrap(), lines(&["", "", ""]));
        assert_eq!(wire.connects.load(Ordering::SeqCst), 0);
        assert_eq!(agent.snapshot().target.as_deref(), Some("chan"));
    }
}
