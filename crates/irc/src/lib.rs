//! Anonymous, read-only IRC client for Twitch chat.
//!
//! The [`Connector`] and [`Session`] traits are the seam the agent drives;
//! [`TwitchConnector`] is the production implementation that speaks IRC over
//! a certificate-verified TLS connection.

pub mod codec;
pub mod error;
pub mod message;
pub mod session;
pub mod tls;

pub use {
    error::{Error, Result},
    message::{Message, Prefix},
    session::{
        Connector, IrcEvent, Session, TwitchConnector, TwitchSession, anonymous_nick,
        channel_display_name,
    },
};

/// Default Twitch chat endpoint (TLS).
pub const DEFAULT_HOST: &str = "irc.chat.twitch.tv";

/// Server name used when a PING carries no token.
pub const DEFAULT_PING_TOKEN: &str = "tmi.twitch.tv";
