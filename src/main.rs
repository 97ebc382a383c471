use anyhow::Result;
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use storycast::app::run_play_command;
use storycast::cli::{BroadcastArgs, Cli, Commands, ConfigAction};
use storycast::config::Config;
use storycast::daemon::run_daemon;
use storycast::ipc::client::{follow, send_command};
use storycast::ipc::protocol::{Command, Response};
use storycast::ipc::server::IpcServer;
use storycast::output::{ViewRenderer, describe_view};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    storycast::logging::init(cli.quiet, cli.verbose);

    match cli.command {
        Commands::Play {
            topic,
            broadcast,
            silent,
            scripts,
        } => {
            let config = apply_broadcast_args(load_config(cli.config.as_deref())?, &broadcast);
            run_play_command(config, &topic, broadcast.simulate, silent, scripts).await?;
        }
        Commands::Daemon { broadcast } => {
            let config = apply_broadcast_args(load_config(cli.config.as_deref())?, &broadcast);
            run_daemon(config, cli.socket, broadcast.simulate, cli.quiet).await?;
        }
        Commands::Start { topic } => {
            handle_ipc_command(cli.socket, Command::Start { topic }).await?;
        }
        Commands::Stop => {
            handle_ipc_command(cli.socket, Command::Stop).await?;
        }
        Commands::Status => {
            handle_ipc_command(cli.socket, Command::Status).await?;
        }
        Commands::Shutdown => {
            handle_ipc_command(cli.socket, Command::Shutdown).await?;
        }
        Commands::Follow => {
            let config = load_config(cli.config.as_deref())?;
            handle_follow(cli.socket, &config).await?;
        }
        Commands::Devices => {
            list_audio_devices()?;
        }
        Commands::Config { action } => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "storycast",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config), which must exist
/// 2. Default config path (~/.config/storycast/config.toml)
/// 3. Built-in defaults
///
/// Environment variable overrides are applied last.
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = match custom_path {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(&Config::default_path())?,
    };
    Ok(config.with_env_overrides())
}

/// Fold command-line overrides into the loaded configuration.
fn apply_broadcast_args(mut config: Config, args: &BroadcastArgs) -> Config {
    if let Some(device) = &args.device {
        config.audio.device = Some(device.clone());
    }
    if let Some(secs) = args.cool_down {
        config.pacing.cool_down_secs = secs;
    }
    if let Some(secs) = args.retry_delay {
        config.pacing.retry_delay_secs = secs;
    }
    config
}

/// List available audio output devices.
#[cfg(feature = "cpal-audio")]
fn list_audio_devices() -> Result<()> {
    let devices = storycast::audio::cpal_output::list_output_devices()?;

    if devices.is_empty() {
        eprintln!("No audio output devices found");
        std::process::exit(1);
    }

    println!("Available audio output devices:");
    for (idx, device) in devices.iter().enumerate() {
        println!("  [{idx}] {device}");
    }

    Ok(())
}

#[cfg(not(feature = "cpal-audio"))]
fn list_audio_devices() -> Result<()> {
    anyhow::bail!("built without audio output support (enable the `cpal-audio` feature)")
}

/// Handle configuration commands.
fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    let config_path = custom_path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);

    match action {
        ConfigAction::Path => {
            println!("{}", config_path.display());
        }
        ConfigAction::Show => {
            let config = Config::load_or_default(&config_path)?.with_env_overrides();
            print!("{}", config.to_display_toml()?);
        }
    }
    Ok(())
}

/// Send IPC command to daemon and handle response.
async fn handle_ipc_command(socket: Option<PathBuf>, command: Command) -> Result<()> {
    let socket_path = socket.unwrap_or_else(IpcServer::default_socket_path);

    match send_command(&socket_path, command).await {
        Ok(Response::Ok { message }) => {
            println!("{}", message.green());
        }
        Ok(Response::Status { view, version }) => {
            let client_version = storycast::version_string();

            println!("Status:");
            println!("  {}    {}", "Client:".dimmed(), client_version);
            print!("  {}    {}", "Daemon:".dimmed(), version);
            if client_version != version {
                print!(" {}", "(version mismatch!)".yellow());
            }
            println!();
            println!("  {} {}", "Broadcast:".dimmed(), describe_view(&view));
            println!("  {}     {}", "Stage:".dimmed(), view.stage);
            if let Some(segment) = &view.current_segment {
                println!("  {}   {}", "Segment:".dimmed(), segment.display_title);
            }
        }
        Ok(Response::View { view }) => {
            println!("{}", describe_view(&view));
        }
        Ok(Response::Error { message }) => {
            eprintln!("{} {}", "Error:".red(), message);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red(), e);
            eprintln!("Is the daemon running? Start it with `storycast daemon`.");
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Render live view changes until the daemon goes away.
async fn handle_follow(socket: Option<PathBuf>, config: &Config) -> Result<()> {
    let socket_path = socket.unwrap_or_else(IpcServer::default_socket_path);
    let (low, high) = (config.pacing.low_water_secs, config.pacing.high_water_secs);
    let mut renderer = ViewRenderer::new(false);

    follow(&socket_path, |view| {
        renderer.render(view, low, high);
        true
    })
    .await?;

    storycast::output::clear_line();
    eprintln!("Daemon disconnected.");
    Ok(())
}
