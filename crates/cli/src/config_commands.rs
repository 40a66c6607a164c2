use std::path::Path;

use {
    anyhow::{Result, bail},
    clap::Subcommand,
    secrecy::ExposeSecret,
    twitchbridge_config::{BridgeConfig, TransportMode},
};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration file and print the effective settings.
    Check,
}

pub fn handle_config(action: ConfigAction, path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Check => check(path),
    }
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const GREEN: &str = "\x1b[32m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn check(path: Option<&Path>) -> Result<()> {
    let (path, config) = match twitchbridge_config::load(path) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("{RED}{BOLD}error{RESET}: {e}");
            bail!("configuration is invalid");
        },
    };

    eprintln!("Checking {}\n", path.display());
    for line in summary(&config) {
        eprintln!("  {line}");
    }

    let warnings = warnings(&config);
    if !warnings.is_empty() {
        eprintln!();
    }
    for warning in &warnings {
        eprintln!("{YELLOW}{BOLD}warning{RESET}: {warning}");
    }

    eprintln!(
        "\n{GREEN}{BOLD}ok{RESET}: configuration is valid ({} warning(s))",
        warnings.len()
    );
    Ok(())
}

fn summary(config: &BridgeConfig) -> Vec<String> {
    let transports: Vec<_> = config.transports.iter().map(|t| t.as_str()).collect();
    let mut lines = vec![
        format!("entity_id        = {}", config.entity_id),
        format!("transports       = {}", transports.join(", ")),
        format!("lines per update = {}", config.line_count()),
        format!("irc              = {}:{}", config.irc_host, config.irc_port),
        format!("reconnect delay  = {}s", config.reconnect_delay_s),
        format!("home assistant   = {}", config.ha_url),
    ];
    if config.uses(TransportMode::Udp) {
        lines.push(format!(
            "udp              = {} (port {}, {} chars/line)",
            config.udp_hosts.join(", "),
            config.udp_port,
            config.udp_line_max_chars
        ));
    }
    if config.uses(TransportMode::Mqtt) {
        lines.push(format!(
            "mqtt             = {}/* (retain: {})",
            config.mqtt_base_topic, config.mqtt_retain
        ));
    }
    if config.uses(TransportMode::Ha) {
        lines.push(format!("ha entity        = {}", config.ha_entity_id));
    }
    lines
}

fn warnings(config: &BridgeConfig) -> Vec<String> {
    let mut out = Vec::new();
    if config.ha_token.expose_secret().is_empty() {
        out.push(
            "ha_token is empty and neither SUPERVISOR_TOKEN nor HA_TOKEN is set; Home Assistant \
             requests will be unauthenticated"
                .to_string(),
        );
    }
    if config.line_count() != config.max_messages {
        out.push(format!(
            "max_messages = {} is below the minimum; {} lines are emitted",
            config.max_messages,
            config.line_count()
        ));
    }
    for (field, port) in [("irc_port", config.irc_port), ("udp_port", config.udp_port)] {
        if port > u32::from(u16::MAX) {
            out.push(format!(
                "{field} = {port} is accepted by validation but cannot be used for a connection"
            ));
        }
    }
    out
}
