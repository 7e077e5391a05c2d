//! Companion link client binary.
//!
//! Connects to the desktop companion, logs in with the pairing code and
//! forwards commands typed on stdin as protocol messages.

use anyhow::Context;
use clap::Parser;
use link_session::{
    ConnectionManager, ConnectionStatus, LinkEventHandler, Message, SessionId, StaticDeviceInfo,
};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod logging;

use config::LinkConfig;
use logging::LinkLogFormatter;

/// Device-side client for the companion pairing protocol
#[derive(Parser, Debug)]
#[command(name = "companion-link", version, about = "Pair this device with its desktop companion")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(long, default_value = "companion-link.yaml")]
    config: PathBuf,

    /// Companion host, overrides the config file
    #[arg(long)]
    host: Option<String>,

    /// Companion port, overrides the config file
    #[arg(long)]
    port: Option<u16>,

    /// Pairing code, overrides the config file
    #[arg(long)]
    code: Option<String>,

    /// Connect attempts before giving up
    #[arg(long, default_value_t = 3)]
    retries: i32,

    /// Bound on each connect attempt, e.g. 3s
    #[arg(long)]
    connect_timeout: Option<humantime::Duration>,

    /// Pause between connect attempts, e.g. 2s
    #[arg(long)]
    retry_delay: Option<humantime::Duration>,

    /// Device descriptor sent at login instead of the host's
    #[arg(long)]
    device_name: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// A line typed on stdin
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Mute,
    Volume(i32),
    Click(i32),
    Text { data_type: i32, text: String },
    Cmd { command: String, data: String },
    Resend,
    Photo(PathBuf),
    Reconnect,
    Status,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let number = |what: &str| -> Result<i32, String> {
            rest.parse::<i32>()
                .map_err(|_| format!("{} expects a number, got {:?}", what, rest))
        };

        match word {
            "mute" => Ok(Self::Mute),
            "volume" => number("volume").map(Self::Volume),
            "click" => number("click").map(Self::Click),
            "text" => {
                let (data_type, text) = rest
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| "usage: text <type> <text>".to_string())?;
                let data_type = data_type
                    .parse::<i32>()
                    .map_err(|_| format!("text type must be a number, got {:?}", data_type))?;
                Ok(Self::Text {
                    data_type,
                    text: text.trim_start().to_string(),
                })
            }
            "cmd" if !rest.is_empty() => {
                let (command, data) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                Ok(Self::Cmd {
                    command: command.to_string(),
                    data: data.trim_start().to_string(),
                })
            }
            "cmd" => Err("usage: cmd <command> [data]".to_string()),
            "resend" => Ok(Self::Resend),
            "photo" if !rest.is_empty() => Ok(Self::Photo(PathBuf::from(rest))),
            "photo" => Err("usage: photo <path>".to_string()),
            "reconnect" => Ok(Self::Reconnect),
            "status" => Ok(Self::Status),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(format!("unknown command {:?}", other)),
        }
    }
}

/// Logs everything the link reports
struct ConsoleHandler;

impl LinkEventHandler for ConsoleHandler {
    fn on_status_changed(&mut self, status: ConnectionStatus, message: Option<&str>) {
        match (status, message) {
            (ConnectionStatus::LoginFailed, Some(reason)) => {
                component_warn!("link", "Login failed: {}", reason)
            }
            (status, Some(detail)) => component_info!("link", "Status: {} ({})", status, detail),
            (status, None) => component_info!("link", "Status: {}", status),
        }
    }

    fn on_message(&mut self, session: SessionId, message: &Message) {
        component_info!("link", "Session {} received {:?}", session, message);
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::new("info")
        .add_directive(format!("companion_link={}", args.log_level).parse()?)
        .add_directive(format!("link_session={}", args.log_level).parse()?)
        .add_directive(format!("link_wire={}", args.log_level).parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(true)
        .event_format(LinkLogFormatter::new("companion-link"))
        .init();

    info!("Starting companion link v{}", env!("CARGO_PKG_VERSION"));

    let mut link_config = LinkConfig::load_from_file(&args.config)?;
    apply_args(&args, &mut link_config);

    let mut builder = ConnectionManager::builder(link_config.client.clone())
        .settings(link_config.settings.clone());
    if let Some(name) = &args.device_name {
        builder = builder.device_info(StaticDeviceInfo::new(name.clone()));
    }
    let manager = builder.build();
    let handler = manager.event_channel().spawn_handler(ConsoleHandler);

    manager.connect(args.retries).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            line = lines.next_line() => {
                let line = match line.context("reading stdin")? {
                    Some(line) => line,
                    None => break,
                };
                if line.trim().is_empty() {
                    continue;
                }
                match Command::parse(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => {
                        if let Err(e) = run_command(&manager, command, args.retries).await {
                            error!("{:#}", e);
                        }
                    }
                    Err(usage) => warn!("{}", usage),
                }
            }
        }
    }

    manager.shutdown().await;
    handler.abort();
    info!("Companion link stopped");
    Ok(())
}

/// Command line flags take precedence over the file and environment
fn apply_args(args: &Args, config: &mut LinkConfig) {
    if let Some(host) = &args.host {
        config.client.server_host = host.clone();
    }
    if let Some(port) = args.port {
        config.client.server_port = port;
    }
    if let Some(code) = &args.code {
        config.client.connection_code = code.clone();
    }
    if let Some(timeout) = &args.connect_timeout {
        config.settings.connect_timeout_ms = millis(timeout);
    }
    if let Some(delay) = &args.retry_delay {
        config.settings.retry_delay_ms = millis(delay);
    }
}

fn millis(duration: &humantime::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

async fn run_command(
    manager: &ConnectionManager,
    command: Command,
    retries: i32,
) -> anyhow::Result<()> {
    match command {
        Command::Mute => manager.send_toggle_mute().await,
        Command::Volume(level) => manager.send_update_volume(level).await,
        Command::Click(index) => manager.send_button_click(index).await,
        Command::Text { data_type, text } => manager.send_text(data_type, text).await,
        Command::Cmd { command, data } => manager.send_command(command, data).await,
        Command::Resend => manager.request_resend_state().await,
        Command::Photo(path) => {
            let content = tokio::fs::read(&path)
                .await
                .with_context(|| format!("reading photo {}", path.display()))?;
            manager.send_photo(file_name(&path), &content).await;
        }
        Command::Reconnect => manager.connect(retries).await,
        Command::Status => {
            let config = manager.config().await;
            component_info!(
                "cli",
                "{} to {} (transport {})",
                manager.status().await,
                config.endpoint(),
                if manager.is_connected().await { "up" } else { "down" }
            );
        }
        Command::Quit => {}
    }
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(Command::parse("mute"), Ok(Command::Mute));
        assert_eq!(Command::parse("  volume 50 "), Ok(Command::Volume(50)));
        assert_eq!(Command::parse("click 3"), Ok(Command::Click(3)));
        assert_eq!(Command::parse("resend"), Ok(Command::Resend));
        assert_eq!(Command::parse("exit"), Ok(Command::Quit));
    }

    #[test]
    fn test_parse_payload_commands() {
        assert_eq!(
            Command::parse("text 1 hello there"),
            Ok(Command::Text {
                data_type: 1,
                text: "hello there".to_string()
            })
        );
        assert_eq!(
            Command::parse("cmd OpenUrl https://example.com"),
            Ok(Command::Cmd {
                command: "OpenUrl".to_string(),
                data: "https://example.com".to_string()
            })
        );
        assert_eq!(
            Command::parse("cmd Lock"),
            Ok(Command::Cmd {
                command: "Lock".to_string(),
                data: String::new()
            })
        );
        assert_eq!(
            Command::parse("photo /tmp/shot.jpg"),
            Ok(Command::Photo(PathBuf::from("/tmp/shot.jpg")))
        );
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(Command::parse("volume loud").is_err());
        assert!(Command::parse("text hello").is_err());
        assert!(Command::parse("cmd").is_err());
        assert!(Command::parse("dance").is_err());
    }

    #[test]
    fn test_args_override_config() {
        let args = Args::parse_from([
            "companion-link",
            "--host",
            "10.0.0.3",
            "--code",
            "ABCD",
            "--retry-delay",
            "500ms",
        ]);
        let mut config = LinkConfig::default();
        apply_args(&args, &mut config);

        assert_eq!(config.client.server_host, "10.0.0.3");
        assert_eq!(config.client.server_port, 9000);
        assert_eq!(config.client.connection_code, "ABCD");
        assert_eq!(config.settings.retry_delay_ms, 500);
        assert_eq!(args.retries, 3);
    }

    #[test]
    fn test_photo_file_name() {
        assert_eq!(file_name(Path::new("/tmp/pics/shot.jpg")), "shot.jpg");
    }
}
