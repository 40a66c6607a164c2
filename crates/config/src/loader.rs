use std::path::{Path, PathBuf};

use {
    secrecy::{ExposeSecret, Secret},
    tracing::debug,
};

use crate::{
    Error, Result,
    env_subst::substitute_env_with,
    error::Context,
    schema::{BridgeConfig, RawBridgeConfig},
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "twitchbridge.toml",
    "twitchbridge.yaml",
    "twitchbridge.yml",
    "twitchbridge.json",
];

/// Environment variables consulted, in order, when `ha_token` is left empty.
/// `SUPERVISOR_TOKEN` is injected into Home Assistant add-on containers.
const TOKEN_ENV_VARS: &[&str] = &["SUPERVISOR_TOKEN", "HA_TOKEN"];

/// Load and validate config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<BridgeConfig> {
    load_config_with(path, |name| std::env::var(name).ok())
}

fn load_config_with(path: &Path, lookup: impl Fn(&str) -> Option<String>) -> Result<BridgeConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = substitute_env_with(&raw, &lookup);
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .with_context(|| format!("{} has no file extension", path.display()))?;
    let mut parsed = parse_config(&raw, ext)?;
    apply_token_fallback(&mut parsed, &lookup);
    BridgeConfig::try_from(parsed)
}

/// Load the explicit path when given, otherwise the first file found in the
/// standard locations. Returns the path that was loaded with the config.
pub fn load(explicit: Option<&Path>) -> Result<(PathBuf, BridgeConfig)> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => discover_config_file().ok_or_else(|| Error::Message {
            message: format!(
                "no config file found (looked for {} in ./ and {})",
                CONFIG_FILENAMES.join(", "),
                config_dir()
                    .map(|d| d.display().to_string())
                    .unwrap_or_else(|| "the user config dir".into())
            ),
        })?,
    };
    debug!(path = %path.display(), "loading config");
    let config = load_config(&path)?;
    Ok((path, config))
}

/// Find the first config file in standard locations.
///
/// Search order:
/// 1. `./twitchbridge.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/twitchbridge/twitchbridge.{toml,yaml,yml,json}` (user-global)
pub fn discover_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/twitchbridge/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "twitchbridge").map(|d| d.config_dir().to_path_buf())
}

/// Parse raw file contents according to the file extension.
pub fn parse_config(raw: &str, ext: &str) -> Result<RawBridgeConfig> {
    match ext {
        "toml" => toml::from_str(raw).map_err(Error::parse),
        "yaml" | "yml" => serde_yaml::from_str(raw).map_err(Error::parse),
        "json" => serde_json::from_str(raw).map_err(Error::parse),
        _ => Err(Error::UnsupportedFormat(ext.to_owned())),
    }
}

/// Fill an empty or unresolved `ha_token` from the environment.
fn apply_token_fallback(raw: &mut RawBridgeConfig, lookup: impl Fn(&str) -> Option<String>) {
    let current = raw.ha_token.expose_secret();
    if !current.is_empty() && !current.starts_with("${") {
        return;
    }
    if let Some((name, token)) = TOKEN_ENV_VARS
        .iter()
        .find_map(|name| lookup(*name).filter(|v| !v.is_empty()).map(|v| (*name, v)))
    {
        debug!(source = name, "using Home Assistant token from environment");
        raw.ha_token = Secret::new(token);
    }
}
