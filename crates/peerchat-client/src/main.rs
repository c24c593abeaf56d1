//! `peerchat`: terminal front-end.
//!
//! Logs in (from the environment, the stored session or a prompt), joins
//! the room over the QUIC/GossipSub transport and then multiplexes stdin
//! commands, room events and Ctrl-C on one thread.

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use peerchat_client::commands::{self, Outcome};
use peerchat_client::format::format_size;
use peerchat_client::{init_tracing, AppState, ChatEvent, ClientConfig, EventBus, Room};
use peerchat_net::SwarmTransport;
use peerchat_shared::Credentials;
use peerchat_store::Database;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    info!(version = env!("CARGO_PKG_VERSION"), "Starting peerchat");

    let config = ClientConfig::from_env();
    let database = match &config.database_path {
        Some(path) => Database::open_at(path),
        None => Database::open_default(),
    }
    .context("opening settings database")?;
    let mut state = AppState::load(database)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    if let Some((login, password, device_name)) = config.login_details() {
        state.login(login, password, device_name)?;
    }
    let credentials = match state.credentials.clone() {
        Some(credentials) => credentials,
        None => match prompt_login(&mut lines, &mut state).await? {
            Some(credentials) => credentials,
            None => return Ok(()),
        },
    };

    let transport = SwarmTransport::generate(config.swarm_config());
    info!(peer_id = %transport.local_peer_id(), "Local peer identity");

    let events = EventBus::new();
    let mut updates = events.subscribe();
    let mut room = Room::open(&transport, &credentials, events)?;
    println!(
        "Joined as {} ({}). Type /help for commands.",
        room.local_name(),
        credentials.login
    );

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match commands::parse(&line) {
                    Ok(None) => {}
                    Ok(Some(command)) => match commands::execute(command, &room, &mut state).await {
                        Ok(Outcome::Lines(output)) => output.iter().for_each(|l| println!("{l}")),
                        Ok(Outcome::Logout) => {
                            println!("Logged out");
                            break;
                        }
                        Ok(Outcome::Quit) => break,
                        Err(e) => println!("error: {e}"),
                    },
                    Err(e) => println!("{e} (try /help)"),
                }
            }
            running = room.next_event() => {
                if !running {
                    warn!("Transport stopped");
                    break;
                }
            }
            update = updates.recv() => match update {
                Ok(event) => show(&event, &room, &mut state),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed room events"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    room.close();
    info!("Bye");
    Ok(())
}

async fn prompt_login(
    lines: &mut Lines<BufReader<Stdin>>,
    state: &mut AppState,
) -> anyhow::Result<Option<Credentials>> {
    loop {
        let Some(login) = prompt(lines, "Login: ").await? else {
            return Ok(None);
        };
        let Some(password) = prompt(lines, "Password: ").await? else {
            return Ok(None);
        };
        let Some(device_name) = prompt(lines, "Device name: ").await? else {
            return Ok(None);
        };
        match state.login(&login, &password, &device_name) {
            Ok(credentials) => return Ok(Some(credentials.clone())),
            Err(e) => println!("{e}"),
        }
    }
}

async fn prompt(lines: &mut Lines<BufReader<Stdin>>, label: &str) -> anyhow::Result<Option<String>> {
    use std::io::Write;

    print!("{label}");
    std::io::stdout().flush()?;
    Ok(lines.next_line().await?)
}

fn show(event: &ChatEvent, room: &Room, state: &mut AppState) {
    match event {
        ChatEvent::DeviceJoined { name, .. } => println!("* {name} joined"),
        ChatEvent::DeviceRenamed { peer, name } => println!("* {} is now {name}", peer.short()),
        ChatEvent::DeviceOffline { peer } => {
            let name = room.device(peer).map(|d| d.name()).unwrap_or_else(|| peer.to_string());
            println!("* {name} went offline");
        }
        ChatEvent::DeviceRemoved { .. } | ChatEvent::SelectionChanged { .. } => {}
        ChatEvent::MessageReceived { peer, preview } => {
            let name = room.device(peer).map(|d| d.name()).unwrap_or_else(|| peer.to_string());
            println!("[{name}] {preview}");
        }
        ChatEvent::TransferUpdated { peer, file_id, status } => {
            let Some(transfer) = room.device(peer).and_then(|d| d.transfer(*file_id)) else {
                return;
            };
            if transfer.status().is_terminal() || transfer.status().progress().is_none() {
                println!(
                    "* {} ({}): {status}",
                    transfer.name(),
                    format_size(transfer.size())
                );
            }
        }
        ChatEvent::LocalNameChanged { name } => {
            println!("* This device is now {name}");
            if let Err(e) = state.set_device_name(name) {
                warn!(error = %e, "Failed to store device name");
            }
        }
    }
}
