//! Configuration loading and validation.
//!
//! Config files: `twitchbridge.toml`, `twitchbridge.yaml`, or `twitchbridge.json`
//! Searched in `./` then `~/.config/twitchbridge/`.
//!
//! `${ENV_VAR}` and `${ENV_VAR:-default}` are expanded in the raw file before
//! parsing. Every field is validated once when the file is loaded; the
//! resulting [`BridgeConfig`] is never mutated afterwards.

mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{config_dir, discover_config_file, load, load_config, parse_config},
    schema::{BridgeConfig, RawBridgeConfig, TransportMode},
};
