mod cli;

use anyhow::{bail, Context, Result};
use autoroute_client::transport::{
    BridgeConfig, BridgeTransport, Transport, TransportKind, WebSocketConfig, WebSocketTransport,
};
use autoroute_client::{AuthState, ClientConfig, ClientEvent, ClientHandle, Credentials};
use clap::Parser;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use url::Url;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = ClientConfig::from_env();

    let transport = connect(&cli, &config).await?;
    let (client, driver) = ClientHandle::spawn(transport, config.log_capacity);
    let mut events = client.subscribe();
    let wait = Duration::from_secs(cli.wait_secs);
    let json = cli.json;

    client
        .login(Credentials::new(cli.user.clone(), cli.password.clone()))
        .await
        .context("login could not be started")?;
    tokio::time::timeout(wait, wait_for_login(&mut events, json))
        .await
        .context("timed out waiting for login")??;
    info!(user = %cli.user, "logged in");

    for edit in cli.edits() {
        client
            .edit(edit.clone())
            .await
            .with_context(|| format!("edit {edit:?} rejected"))?;
    }

    if !client.snapshot().await?.start_allowed {
        tokio::time::timeout(wait, wait_for_start_gate(&mut events, json))
            .await
            .context("departure and destination did not resolve in time")??;
    }
    client.start().await.context("start rejected")?;
    info!("route computation started; Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted; stopping");
                if let Err(err) = client.stop().await {
                    warn!(error = %err, "stop failed");
                }
                break;
            }
            event = events.recv() => match event {
                Ok(ClientEvent::Disconnected) => {
                    warn!("autorouter connection lost");
                    break;
                }
                Ok(ClientEvent::StopDisabled) => {
                    info!("route computation finished");
                    break;
                }
                Ok(event) => print_event(&event, json),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event stream lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    }

    if let Some(route) = client.snapshot().await.ok().and_then(|snapshot| snapshot.route) {
        if json {
            println!("{}", serde_json::to_string(&*route)?);
        } else {
            println!("final: {}", route.summary());
            println!("{}", route.plan);
        }
    }
    let _ = client.close().await;
    let _ = driver.await;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();
}

async fn connect(cli: &Cli, config: &ClientConfig) -> Result<Box<dyn Transport>> {
    match cli.transport {
        TransportKind::WebSocket => {
            let url = cli.url.clone().unwrap_or_else(|| config.ws_url.clone());
            let transport = WebSocketTransport::connect(WebSocketConfig::new(url))
                .await
                .context("failed to connect to autorouter websocket")?;
            Ok(Box::new(transport))
        }
        TransportKind::Bridge => {
            let raw = cli.url.as_deref().unwrap_or(&config.bridge_url);
            let endpoint = Url::parse(raw).with_context(|| format!("invalid relay url {raw}"))?;
            let transport = BridgeTransport::connect(BridgeConfig::new(
                endpoint,
                config.bridge_session(),
            ))
            .await
            .context("failed to reach autoroute relay")?;
            Ok(Box::new(transport))
        }
        TransportKind::Mock => bail!("the mock transport is only available in tests"),
    }
}

async fn wait_for_login(
    events: &mut broadcast::Receiver<ClientEvent>,
    json: bool,
) -> Result<()> {
    loop {
        match events.recv().await {
            Ok(ClientEvent::AuthChanged(AuthState::Authenticated)) => return Ok(()),
            Ok(ClientEvent::LoginRejected(reason)) => bail!("login rejected: {reason}"),
            Ok(ClientEvent::Disconnected) => bail!("connection lost during login"),
            Ok(event) => print_event(&event, json),
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => bail!("client driver stopped"),
        }
    }
}

async fn wait_for_start_gate(
    events: &mut broadcast::Receiver<ClientEvent>,
    json: bool,
) -> Result<()> {
    loop {
        match events.recv().await {
            Ok(ClientEvent::StartAllowed(true)) => return Ok(()),
            Ok(ClientEvent::Disconnected) => bail!("connection lost before start"),
            Ok(event) => print_event(&event, json),
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => bail!("client driver stopped"),
        }
    }
}

fn print_event(event: &ClientEvent, json: bool) {
    match event {
        ClientEvent::RouteUpdated(route) if json => print_json(&**route),
        ClientEvent::RouteUpdated(route) => println!("{}", route.summary()),
        ClientEvent::Log(entry) if json => print_json(entry),
        ClientEvent::Log(entry) => println!("[{}] {}", entry.category, entry.text),
        ClientEvent::Status(status) => info!(status = %status, "autorouter status"),
        ClientEvent::ValidationCleared => println!("[validation] cleared"),
        _ => {}
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{line}"),
        Err(err) => warn!(error = %err, "failed to encode event"),
    }
}
