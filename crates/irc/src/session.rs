//! Connection establishment and the per-connection session.

use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    futures::{SinkExt, StreamExt},
    rand::Rng,
    rustls::{ClientConfig, pki_types::ServerName},
    tokio::{
        io::{AsyncRead, AsyncWrite},
        net::TcpStream,
    },
    tokio_rustls::TlsConnector,
    tokio_util::codec::Framed,
    tracing::{debug, info, warn},
};

use crate::{DEFAULT_PING_TOKEN, Error, Message, Result, codec::IrcCodec, error::Context};

/// Twitch-specific capabilities requested right after connecting.
pub const TWITCH_CAPABILITIES: &[&str] = &[
    "twitch.tv/tags",
    "twitch.tv/commands",
    "twitch.tv/membership",
];

/// Bound on TCP connect plus TLS handshake.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Bound on IRC registration (waiting for the `001` welcome).
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

/// Bound on the farewell `QUIT` and TLS shutdown.
const QUIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Events surfaced by a [`Session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrcEvent {
    /// `PRIVMSG` to a channel. Sender and text stay optional so the caller
    /// decides how to treat a truncated line.
    PubMsg {
        channel: String,
        nick: Option<String>,
        text: Option<String>,
    },
    /// Keep-alive probe that must be answered with [`Session::pong`].
    Ping { token: String },
    /// The server ended the session (`ERROR`, `RECONNECT`, or EOF).
    Disconnected { reason: String },
    /// Server notice, e.g. a failed join.
    Notice { text: String },
    /// Anything else (membership, numerics, capability acks).
    Other { command: String },
}

impl From<Message> for IrcEvent {
    fn from(msg: Message) -> Self {
        match msg.command.as_str() {
            "PING" => Self::Ping {
                token: msg.param(0).unwrap_or(DEFAULT_PING_TOKEN).to_owned(),
            },
            "PRIVMSG" if msg.param(0).is_some_and(|t| t.starts_with('#')) => Self::PubMsg {
                channel: msg.param(0).unwrap_or_default().to_owned(),
                nick: msg.prefix.as_ref().map(|p| p.nick().to_owned()),
                text: msg.param(1).map(str::to_owned),
            },
            "ERROR" => Self::Disconnected {
                reason: msg.param(0).unwrap_or("server error").to_owned(),
            },
            "RECONNECT" => Self::Disconnected {
                reason: "server requested reconnect".into(),
            },
            "NOTICE" => Self::Notice {
                text: msg.params.last().cloned().unwrap_or_default(),
            },
            _ => Self::Other {
                command: msg.command,
            },
        }
    }
}

/// A live, registered IRC connection.
#[async_trait]
pub trait Session: Send {
    /// Nickname this session registered with.
    fn nick(&self) -> &str;

    async fn join(&mut self, channel: &str) -> Result<()>;

    async fn part(&mut self, channel: &str) -> Result<()>;

    async fn pong(&mut self, token: &str) -> Result<()>;

    /// Wait at most `slice` for the next event. `Ok(None)` means nothing
    /// arrived in time or a malformed line was dropped.
    async fn next_event(&mut self, slice: Duration) -> Result<Option<IrcEvent>>;

    /// Best-effort farewell. Never fails.
    async fn quit(&mut self, reason: &str);
}

/// Opens new sessions. One call per (re)connection.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, nick: &str) -> Result<Box<dyn Session>>;
}

/// Random anonymous Twitch login (`justinfan` + 6 digits).
#[must_use]
pub fn anonymous_nick() -> String {
    let mut rng = rand::rng();
    let digits: String = (0..6)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect();
    format!("justinfan{digits}")
}

/// Channel name as shown to users: protocol names carry a leading `#`.
#[must_use]
pub fn channel_display_name(channel: &str) -> &str {
    channel.trim_start_matches('#')
}

/// Production connector: TCP + verified TLS + anonymous registration.
pub struct TwitchConnector {
    host: String,
    port: u32,
    tls: Arc<ClientConfig>,
    connect_timeout: Duration,
    handshake_timeout: Duration,
}

impl TwitchConnector {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u32, tls: Arc<ClientConfig>) -> Self {
        Self {
            host: host.into(),
            port,
            tls,
            connect_timeout: CONNECT_TIMEOUT,
            handshake_timeout: HANDSHAKE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeouts(mut self, connect: Duration, handshake: Duration) -> Self {
        self.connect_timeout = connect;
        self.handshake_timeout = handshake;
        self
    }
}

#[async_trait]
impl Connector for TwitchConnector {
    async fn connect(&self, nick: &str) -> Result<Box<dyn Session>> {
        let port = u16::try_from(self.port)
            .with_context(|| format!("port {} is not a valid TCP port", self.port))?;
        let server_name = ServerName::try_from(self.host.clone())?;
        let connector = TlsConnector::from(Arc::clone(&self.tls));

        info!(host = %self.host, port, nick, "connecting (anonymous)");
        let stream = tokio::time::timeout(self.connect_timeout, async {
            let tcp = TcpStream::connect((self.host.as_str(), port)).await?;
            tcp.set_nodelay(true)?;
            connector.connect(server_name, tcp).await
        })
        .await
        .map_err(|_| Error::Timeout {
            what: "TLS connect",
            secs: self.connect_timeout.as_secs(),
        })??;

        let session = TwitchSession::register(stream, nick, self.handshake_timeout).await?;
        info!(host = %self.host, nick, "registered with IRC server");
        Ok(Box::new(session))
    }
}

/// IRC session over any byte stream (TLS in production, in-memory in tests).
pub struct TwitchSession<S> {
    nick: String,
    framed: Framed<S, IrcCodec>,
}

impl<S> TwitchSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Request capabilities, register `nick`, and wait for the welcome.
    pub async fn register(stream: S, nick: &str, timeout: Duration) -> Result<Self> {
        let mut framed = Framed::new(stream, IrcCodec::new());
        framed.send(Message::cap_req(TWITCH_CAPABILITIES)).await?;
        framed.send(Message::nick(nick)).await?;
        framed.send(Message::user(nick)).await?;

        tokio::time::timeout(timeout, wait_for_welcome(&mut framed))
            .await
            .map_err(|_| Error::Timeout {
                what: "IRC handshake",
                secs: timeout.as_secs(),
            })??;

        Ok(Self {
            nick: nick.to_owned(),
            framed,
        })
    }
}

async fn wait_for_welcome<S>(framed: &mut Framed<S, IrcCodec>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    while let Some(line) = framed.next().await {
        let line = line?;
        let msg = match Message::parse(&line) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(error = %e, "ignoring malformed line during handshake");
                continue;
            },
        };
        match msg.command.as_str() {
            "001" => return Ok(()),
            "PING" => {
                framed
                    .send(Message::pong(msg.param(0).unwrap_or(DEFAULT_PING_TOKEN)))
                    .await?;
            },
            "CAP" if msg.param(1) == Some("NAK") => {
                warn!(
                    capabilities = msg.params.last().map(String::as_str).unwrap_or_default(),
                    "server rejected capability request"
                );
            },
            "NOTICE" => {
                return Err(Error::message(format!(
                    "server notice during registration: {}",
                    msg.params.last().map(String::as_str).unwrap_or_default()
                )));
            },
            "ERROR" => {
                return Err(Error::closed(msg.param(0).unwrap_or("server error")));
            },
            _ => {},
        }
    }
    Err(Error::closed("connection closed during registration"))
}

#[async_trait]
impl<S> Session for TwitchSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn nick(&self) -> &str {
        &self.nick
    }

    async fn join(&mut self, channel: &str) -> Result<()> {
        self.framed.send(Message::join(channel)).await
    }

    async fn part(&mut self, channel: &str) -> Result<()> {
        self.framed.send(Message::part(channel)).await
    }

    async fn pong(&mut self, token: &str) -> Result<()> {
        self.framed.send(Message::pong(token)).await
    }

    async fn next_event(&mut self, slice: Duration) -> Result<Option<IrcEvent>> {
        let line = match tokio::time::timeout(slice, self.framed.next()).await {
            Err(_) => return Ok(None),
            Ok(None) => {
                return Ok(Some(IrcEvent::Disconnected {
                    reason: "connection closed by server".into(),
                }));
            },
            Ok(Some(line)) => line?,
        };
        match Message::parse(&line) {
            Ok(msg) => Ok(Some(IrcEvent::from(msg))),
            Err(e) => {
                warn!(error = %e, "dropping malformed IRC line");
                Ok(None)
            },
        }
    }

    async fn quit(&mut self, reason: &str) {
        let farewell = async {
            self.framed.send(Message::quit(reason)).await?;
            self.framed.close().await
        };
        match tokio::time::timeout(QUIT_TIMEOUT, farewell).await {
            Ok(Ok(())) => debug!(nick = %self.nick, "sent QUIT"),
            Ok(Err(e)) => debug!(nick = %self.nick, error = %e, "QUIT failed"),
            Err(_) => debug!(nick = %self.nick, "QUIT timed out"),
        }
    }
}
