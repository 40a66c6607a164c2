use std::{path::Path, sync::Arc};

use {
    anyhow::Result,
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
    twitchbridge_agent::{Agent, ChannelSelector, ChannelSwitch},
    twitchbridge_homeassistant::{EntityWatcher, HaClient},
    twitchbridge_irc::{TwitchConnector, tls},
    twitchbridge_sinks::build_sinks,
};

/// Load config, wire the agent to its sinks and channel source, and run until
/// interrupted.
pub async fn run(config_path: Option<&Path>, channel: Option<String>) -> Result<()> {
    let (path, config) = twitchbridge_config::load(config_path)?;
    info!(
        path = %path.display(),
        entity_id = %config.entity_id,
        transports = ?config.transports,
        irc_host = %config.irc_host,
        "config loaded"
    );

    let ha = HaClient::new(config.ha_url.clone(), config.ha_token.clone())?;
    let sinks = build_sinks(&config, &ha)?;
    let connector = Arc::new(TwitchConnector::new(
        config.irc_host.clone(),
        config.irc_port,
        tls::client_config()?,
    ));

    let agent = Agent::from_config(&config, connector, sinks);
    agent.start();
    let selector = Arc::new(ChannelSelector::new(
        Arc::new(agent.clone()) as Arc<dyn ChannelSwitch>
    ));

    let cancel = CancellationToken::new();
    let watcher = match channel {
        Some(fixed) => {
            info!(channel = %fixed, "fixed channel given; not watching Home Assistant");
            selector.on_value(Some(&fixed)).await;
            None
        },
        None => {
            let watcher =
                EntityWatcher::new(ha, config.entity_id.clone(), config.entity_poll_interval());
            let cancel = cancel.clone();
            let selector = Arc::clone(&selector);
            Some(tokio::spawn(async move {
                watcher
                    .run(cancel, move |value| {
                        let selector = Arc::clone(&selector);
                        async move {
                            selector.on_value(value.as_deref()).await;
                        }
                    })
                    .await;
            }))
        },
    };

    shutdown_signal().await?;
    info!("shutdown requested");

    cancel.cancel();
    if let Some(task) = watcher
        && let Err(e) = task.await
    {
        warn!(error = %e, "entity watcher ended abnormally");
    }
    agent.terminate();
    agent.wait().await;
    info!("twitchbridge stopped");
    Ok(())
}

/// Ctrl-C, or SIGTERM on Unix (how add-on supervisors stop containers).
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut term =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = term.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
