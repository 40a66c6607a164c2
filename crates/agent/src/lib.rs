//! The connection supervisor.
//!
//! [`Agent`] owns the live IRC session, follows a single target channel,
//! reconnects with backoff, and pushes the rolling last-N chat lines to every
//! configured [`Sink`](twitchbridge_sinks::Sink). [`ChannelSelector`] turns a
//! noisy external value into the agent's target.

pub mod agent;
pub mod backoff;
pub mod buffer;
pub mod emit;
pub mod error;
pub mod reconcile;
pub mod selector;

pub use {
    agent::{Agent, AgentOptions, AgentSnapshot, ConnectionState},
    backoff::Backoff,
    buffer::{ChatEvent, RollingBuffer},
    emit::Emitter,
    error::{Error, Result},
    reconcile::{JoinedSet, Plan},
    selector::{ChannelSelector, ChannelSwitch, normalize_channel},
};
