use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use livecast::config::ConfigStore;
use livecast::events::{EventBus, SessionEvent};
use livecast::media::{DeviceCatalog, TrackController};
use livecast::negotiation::RtcTransportFactory;
use livecast::session::{
    run_session, StreamerCommand, StreamerSession, ViewerCommand, ViewerSession,
};
use livecast::signaling::{streamer_url, viewer_url, SignalingChannel};

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// livecast command line arguments
#[derive(Parser, Debug)]
#[command(name = "livecast")]
#[command(version, about = "Live camera broadcast over WebRTC", long_about = None)]
struct CliArgs {
    #[command(subcommand)]
    command: Command,

    /// Signaling server URL (overrides config file)
    #[arg(short = 's', long, value_name = "URL", global = true)]
    server: Option<String>,

    /// Configuration file (default: ./livecast.json)
    #[arg(short = 'c', long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open a room and broadcast the local camera and microphone
    Stream {
        /// Camera device id (overrides config file)
        #[arg(long, value_name = "ID")]
        video_device: Option<String>,

        /// Microphone device id (overrides config file)
        #[arg(long, value_name = "ID")]
        audio_device: Option<String>,
    },
    /// Watch a room
    View {
        /// Room id from the streamer's share link
        #[arg(short = 'r', long, value_name = "ROOM")]
        room: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_level, args.verbose);

    tracing::info!("Starting livecast v{}", env!("CARGO_PKG_VERSION"));

    let config_path = args.config.unwrap_or_else(get_config_path);
    let store = ConfigStore::load(&config_path).await?;
    let mut config = (*store.get()).clone();
    if let Some(server) = args.server {
        config.signaling.server_url = server;
    }

    let events = Arc::new(EventBus::new());
    spawn_status_printer(&events);

    let factory = Arc::new(RtcTransportFactory::new(config.webrtc.clone()));
    let keepalive = Duration::from_secs(config.signaling.keepalive_secs.max(1));

    match args.command {
        Command::Stream {
            video_device,
            audio_device,
        } => {
            let video = video_device.or(config.media.video_device.clone());
            let audio = audio_device.or(config.media.audio_device.clone());

            let catalog = DeviceCatalog::new(config.media.devices.clone());
            let controller = TrackController::new(Arc::new(catalog));

            let channel =
                SignalingChannel::connect(&streamer_url(&config.signaling), keepalive).await?;
            let (mut session, peer_rx) = StreamerSession::new(
                channel.sender(),
                events.clone(),
                factory,
                controller,
                config.signaling.server_url.clone(),
            );

            for device in session.devices().await? {
                println!("  {} device {}: {}", device.kind, device.device_id, device.label);
            }
            session.start(video.as_deref(), audio.as_deref()).await?;

            let (command_tx, command_rx) = mpsc::unbounded_channel();
            spawn_stdin_commands(command_tx.clone());
            spawn_ctrl_c(command_tx, StreamerCommand::Stop);

            run_session(&mut session, channel, peer_rx, command_rx).await?;
        }
        Command::View { room } => {
            let channel =
                SignalingChannel::connect(&viewer_url(&config.signaling, &room), keepalive)
                    .await?;
            let (mut session, peer_rx) =
                ViewerSession::new(room, channel.sender(), events.clone(), factory);
            session.start().await?;

            let (command_tx, command_rx) = mpsc::unbounded_channel();
            spawn_ctrl_c(command_tx, ViewerCommand::Stop);

            run_session(&mut session, channel, peer_rx, command_rx).await?;
        }
    }

    tracing::info!("livecast exiting");
    Ok(())
}

/// Initialize logging with tracing
fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "livecast=error,webrtc=error",
        LogLevel::Warn => "livecast=warn,webrtc=warn",
        LogLevel::Info => "livecast=info,webrtc=warn",
        LogLevel::Verbose => "livecast=debug,webrtc=warn",
        LogLevel::Debug => "livecast=debug,webrtc=info",
        LogLevel::Trace => "livecast=trace,webrtc=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}

/// Get the configuration file path
fn get_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("LIVECAST_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("livecast.json")
}

/// Print status lines and the share link for the user
fn spawn_status_printer(events: &EventBus) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(SessionEvent::Status { message, .. }) => println!("{}", message),
                Ok(SessionEvent::RoomCreated { share_link, .. }) => {
                    println!("Share link: {}", share_link)
                }
                Ok(SessionEvent::ViewerCountChanged { count }) => println!("Viewers: {}", count),
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Status printer lagged by {} events", n)
                }
                Err(_) => break,
            }
        }
    });
}

fn spawn_ctrl_c<C: Send + 'static>(commands: mpsc::UnboundedSender<C>, stop: C) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            let _ = commands.send(stop);
        }
    });
}

/// Read streamer commands from stdin, one per line
fn spawn_stdin_commands(commands: mpsc::UnboundedSender<StreamerCommand>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!("Commands: close-video, video <id|default>, audio <id|default>, mute, unmute, stop");

        while let Ok(Some(line)) = lines.next_line().await {
            match parse_command(&line) {
                Some(command) => {
                    if commands.send(command).is_err() {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => println!("Unknown command: {}", line.trim()),
            }
        }
    });
}

fn parse_command(line: &str) -> Option<StreamerCommand> {
    let mut parts = line.split_whitespace();
    let verb = parts.next()?;
    let device = parts
        .next()
        .filter(|d| *d != "default")
        .map(str::to_string);

    match verb {
        "close-video" => Some(StreamerCommand::CloseVideo),
        "video" => Some(StreamerCommand::SelectVideo(device)),
        "audio" => Some(StreamerCommand::SelectAudio(device)),
        "mute" => Some(StreamerCommand::MuteAudio),
        "unmute" => Some(StreamerCommand::UnmuteAudio),
        "stop" | "quit" => Some(StreamerCommand::Stop),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("close-video"), Some(StreamerCommand::CloseVideo));
        assert_eq!(
            parse_command("video cam1"),
            Some(StreamerCommand::SelectVideo(Some("cam1".to_string())))
        );
        assert_eq!(
            parse_command("audio default"),
            Some(StreamerCommand::SelectAudio(None))
        );
        assert_eq!(parse_command("  mute "), Some(StreamerCommand::MuteAudio));
        assert_eq!(parse_command("dance"), None);
        assert_eq!(parse_command(""), None);
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let args = CliArgs::parse_from(["livecast", "view", "--room", "abc123", "-vv"]);
        assert_eq!(args.verbose, 2);
        assert!(matches!(args.command, Command::View { ref room } if room == "abc123"));

        let args = CliArgs::parse_from([
            "livecast",
            "--server",
            "ws://relay:8080",
            "stream",
            "--video-device",
            "cam1",
        ]);
        assert_eq!(args.server.as_deref(), Some("ws://relay:8080"));
        assert!(matches!(
            args.command,
            Command::Stream { video_device: Some(ref v), audio_device: None } if v == "cam1"
        ));
    }
}
