//! Command-line parsing and command routing.

use crate::commands;
use crate::config::get_config_path;
use crate::logging;
use anyhow::anyhow;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;
use std::process;

/// Writes the default config when it is missing or older than this release.
fn check_and_run_setup() -> Result<(), anyhow::Error> {
    let config_path = get_config_path()?;

    match crate::setup::version::check_setup_needed(&config_path)? {
        Some(reason) => {
            tracing::info!(
                "Setup needed ({reason}); writing config for version {}",
                env!("CARGO_PKG_VERSION")
            );
            crate::setup::run_setup(&config_path).map_err(|e| {
                tracing::error!("Setup failed: {e}");
                anyhow!("Setup failed: {e}")
            })?;
        }
        None => {
            tracing::debug!("Config version up to date ({})", env!("CARGO_PKG_VERSION"));
        }
    }
    Ok(())
}

/// Hum a tune, get a song back.
#[derive(Parser)]
#[command(name = "charade")]
#[command(version)]
#[command(about = "Music generation in the style of \"Piranha Plants on Parade\"")]
#[command(long_about = "Music generation in the style of \"Piranha Plants on Parade\".\n\nRecord a melody with real-time waveform visualization, send it to a generation\nservice and play back the result.\n\nDEFAULT COMMAND:\n    If no command is specified, 'record' is used. The -o option can be used\n    without explicitly saying 'record'.\n\nEXAMPLES:\n    # Record, generate and listen\n    $ charade\n\n    # Also save the generated audio\n    $ charade -o song.wav\n\n    # Generate from an existing recording\n    $ charade upload hum.wav -o song.wav\n\n    # Listen to the last result again\n    $ charade play")]
#[command(
    after_help = "KEYS:\n    Space/Enter   record, stop, play, pause or retry\n    u             upload an audio file instead\n    s             save the generated audio as output.wav\n    q/Esc         quit\n\nCONFIGURATION:\n    Config file:        ~/.config/charade/charade.toml\n    Logs:               ~/.local/state/charade/charade.log.*\n\nFor more information, visit: https://github.com/max-y-huang/piranha-plants-as-charade"
)]
struct Cli {
    /// Also save the generated audio to FILE (record default command)
    #[arg(short, long, value_name = "FILE", global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a melody and generate music from it (default)
    ///
    /// Space/Enter starts recording, stops it, then plays and pauses the result.
    #[command(visible_alias = "r")]
    Record {
        /// Also save the generated audio to FILE
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Generate music from an existing audio file
    ///
    /// Examples:
    ///   charade upload hum.wav
    ///   charade upload memo.ogg -o song.wav
    #[command(visible_alias = "u")]
    Upload {
        /// Audio file to upload
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Also save the generated audio to OUTPUT
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,
    },

    /// Play the most recently generated audio
    #[command(visible_alias = "p")]
    Play,

    /// List available audio devices
    ///
    /// Shows input device IDs and names for `audio.device` in charade.toml.
    #[command(name = "list-devices")]
    ListDevices,

    /// Show recent log entries
    Logs,

    /// Open the configuration file in your editor
    #[command(visible_alias = "c")]
    Config,

    /// Show project information and links
    About,

    /// Generate shell completion script
    ///
    /// Examples:
    ///   charade completions bash > charade.bash
    ///   charade completions zsh > _charade
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Runs the command selected on the command line.
///
/// # Errors
/// - If setup or logging initialization fails
/// - If the command fails
pub async fn run() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Commands that need neither logging nor config
    match &cli.command {
        Some(Commands::Completions { shell }) => {
            generate(*shell, &mut Cli::command(), "charade", &mut io::stdout());
            return Ok(());
        }
        Some(Commands::About) => {
            commands::handle_about();
            return Ok(());
        }
        Some(Commands::ListDevices) => {
            if let Err(e) = commands::handle_list_devices() {
                eprintln!("Error: {e}");
                process::exit(1);
            }
            return Ok(());
        }
        Some(Commands::Logs) => {
            if let Err(e) = commands::handle_logs() {
                eprintln!("Error: {e}");
                process::exit(1);
            }
            return Ok(());
        }
        _ => {}
    }

    logging::init_logging()?;
    check_and_run_setup()?;

    match cli.command {
        None => commands::handle_record(cli.output).await?,
        Some(Commands::Record { output }) => {
            // The explicit option wins over the global one
            commands::handle_record(output.or(cli.output)).await?
        }
        Some(Commands::Upload { file, output }) => {
            commands::handle_upload(file, output.or(cli.output)).await?
        }
        Some(Commands::Play) => commands::handle_play().await?,
        Some(Commands::Config) => commands::handle_config()?,
        Some(Commands::Completions { .. })
        | Some(Commands::About)
        | Some(Commands::ListDevices)
        | Some(Commands::Logs) => unreachable!("handled before logging starts"),
    }

    Ok(())
}
