//! # ephchat
//!
//! Terminal driver for the ephemeral chat.
//!
//! Logs in under a display name, runs one sync engine against a SQLite
//! store shared by every session on this machine, and turns stdin lines
//! into engine commands. Messages older than ten hours disappear.

mod commands;
mod config;

use std::sync::Arc;

use anyhow::Context;
use chrono::{Local, TimeZone};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ephchat_client::{
    spawn_engine, ChatError, ChatSession, EngineDeps, EngineEvent, EngineHandle, SyncState,
};
use ephchat_shared::{ConnectionState, Message};
use ephchat_store::{Database, SqliteThreadStore};

use crate::commands::{is_confirmation, CliCommand, HELP};
use crate::config::{CliConfig, DEFAULT_LOG_FILTER};

type InputLines = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting ephchat v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration and log in
    // -----------------------------------------------------------------------
    let config = CliConfig::from_env();
    info!(?config, "Loaded configuration");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let name = match config.display_name.clone() {
        Some(name) => name,
        None => match prompt_name(&mut lines).await? {
            Some(name) => name,
            None => return Ok(()),
        },
    };

    // -----------------------------------------------------------------------
    // 3. Open the store and start the engine
    // -----------------------------------------------------------------------
    let db_path = match &config.db_path {
        Some(path) => path.clone(),
        None => Database::default_path().context("no data directory for the database")?,
    };
    let store = SqliteThreadStore::open(&db_path, config.poll_interval)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    let device = Arc::new(store.device_flags());

    let session = ChatSession::for_identity(&name, &config.admin_name);
    info!(name = %session.display_name, role = ?session.role, "Logged in");

    let (handle, events) = spawn_engine(
        Arc::new(store),
        session,
        EngineDeps::new(device),
        config.engine_config(),
    );

    if let Some(permission) = config.notifications {
        handle.set_permission(permission).await?;
    }

    let printer = tokio::spawn(print_events(events));
    println!("Logged in as {name}. Type /help for commands.");

    // -----------------------------------------------------------------------
    // 4. Command loop (until /quit, end of input or Ctrl+C)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = command_loop(&handle, &mut lines) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    match handle.shutdown().await {
        Ok(()) | Err(ChatError::EngineStopped) => {}
        Err(e) => warn!(error = %e, "engine shutdown failed"),
    }
    printer.abort();

    Ok(())
}

async fn prompt_name(lines: &mut InputLines) -> anyhow::Result<Option<String>> {
    loop {
        println!("Your name:");
        let Some(line) = lines.next_line().await? else {
            return Ok(None);
        };
        let name = line.trim();
        if !name.is_empty() {
            return Ok(Some(name.to_string()));
        }
    }
}

async fn command_loop(handle: &EngineHandle, lines: &mut InputLines) -> anyhow::Result<()> {
    while let Some(line) = lines.next_line().await? {
        let command = match commands::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        if command == CliCommand::Quit {
            break;
        }
        match run_command(handle, lines, command).await {
            Ok(()) => {}
            Err(ChatError::EngineStopped) => return Err(ChatError::EngineStopped.into()),
            Err(e) => println!("! {e}"),
        }
    }
    Ok(())
}

async fn run_command(
    handle: &EngineHandle,
    lines: &mut InputLines,
    command: CliCommand,
) -> Result<(), ChatError> {
    match command {
        CliCommand::Send(text) => {
            handle.send(text).await?;
        }
        CliCommand::Threads => {
            let status = handle.status().await?;
            if status.threads.is_empty() {
                println!("No conversations.");
            }
            for thread in &status.threads {
                let marker = if status.session.active_thread.as_ref() == Some(thread) {
                    "*"
                } else {
                    " "
                };
                println!("{marker} {} ({thread})", thread.display_label());
            }
        }
        CliCommand::Select(thread) => handle.select_thread(thread).await?,
        CliCommand::Delete(target) => {
            let thread = match target {
                Some(thread) => thread,
                None => match handle.status().await?.session.active_thread {
                    Some(thread) => thread,
                    None => return Err(ChatError::ThreadNotSelected),
                },
            };
            let request = handle.request_delete(thread).await?;
            println!("Delete the conversation with {}? [y/N]", request.label());
            let answer = lines.next_line().await.ok().flatten().unwrap_or_default();
            if is_confirmation(&answer) {
                handle.confirm_delete(request).await?;
                println!("Conversation deleted.");
            } else {
                handle.cancel_delete(request)?;
                println!("Cancelled.");
            }
        }
        CliCommand::Sweep => {
            let removed = handle.sweep_now().await?;
            println!("Removed {removed} expired message(s).");
        }
        CliCommand::Reconnect => handle.reconnect()?,
        CliCommand::Visible(visible) => handle.set_app_visible(visible)?,
        CliCommand::Permission(permission) => handle.set_permission(permission).await?,
        CliCommand::ResetDevice => {
            handle.reset_device().await?;
            println!("Device reset.");
        }
        CliCommand::Messages => {
            for message in handle.messages().await? {
                println!("{}", format_message(&message));
            }
        }
        CliCommand::Status => {
            let status = handle.status().await?;
            let thread = status
                .session
                .active_thread
                .as_ref()
                .map(|t| t.display_label())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{} ({:?}) | thread: {} | {:?} | {:?} | notifications: {:?}",
                status.session.display_name,
                status.session.role,
                thread,
                status.sync_state,
                status.session.connection,
                status.eligibility.permission,
            );
        }
        CliCommand::Help => println!("{HELP}"),
        CliCommand::Quit => {}
    }
    Ok(())
}

async fn print_events(mut events: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::MessageAdded { message, .. } => println!("{}", format_message(&message)),
            EngineEvent::MessagesExpired { ids, .. } => {
                println!("({} message(s) expired)", ids.len());
            }
            EngineEvent::ActiveThreadChanged { thread: Some(thread) } => {
                println!("-- {} --", thread.display_label());
            }
            EngineEvent::ActiveThreadChanged { thread: None } => {
                println!("-- no conversation selected --");
            }
            EngineEvent::ThreadListChanged { threads } => {
                println!("({} conversation(s))", threads.len());
            }
            EngineEvent::SyncStateChanged {
                state: SyncState::Unsubscribed,
            } => println!("(connection lost, /reconnect to retry)"),
            EngineEvent::SyncStateChanged { .. } => {}
            EngineEvent::ConnectionChanged {
                state: ConnectionState::Disconnected,
            } => println!("(disconnected)"),
            EngineEvent::ConnectionChanged { .. } => {}
            EngineEvent::NotificationDispatched { notification, .. } => {
                println!("[notification] {}: {}", notification.title, notification.body);
            }
        }
    }
}

fn format_message(message: &Message) -> String {
    let time = Local
        .timestamp_millis_opt(message.sent_at_millis)
        .single()
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string());
    let admin = if message.is_from_admin { " (admin)" } else { "" };
    format!("[{time}] {}{admin}: {}", message.sender_name, message.text)
}
