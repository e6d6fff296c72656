//! omx-enc: G.729 encoder component driver
//!
//! Usage:
//!   omx-enc encode -i speech.pcm -o speech.g729   - Encode a file
//!   omx-enc show-config [--streaming 3]           - Print the effective config

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use omx_core::ComponentConfig;

#[derive(Parser)]
#[command(name = "omx-enc", version, about = "G.729 encoder component driver")]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode raw 8 kHz 16-bit mono PCM to a G.729 frame stream
    Encode {
        /// Raw little-endian PCM input
        #[arg(short, long)]
        input: PathBuf,
        /// Output frame stream
        #[arg(short, long)]
        output: PathBuf,
        /// Component configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// MIME storage frames without the frame-type header
        #[arg(long)]
        mime: bool,
        /// Discontinuous transmission
        #[arg(long)]
        dtx: bool,
    },
    /// Print the effective component configuration as TOML
    ShowConfig {
        /// Component configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Start from the streaming preset with this stream id
        #[arg(long)]
        streaming: Option<u32>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Encode {
            input,
            output,
            config,
            mime,
            dtx,
        } => {
            let mut config = load_config(config.as_deref(), None)?;
            if mime {
                config = config.with_mime(true);
            }
            if dtx {
                config = config.with_dtx(true);
            }
            let summary = omx_cli::encode_file(&input, &output, config)?;
            println!(
                "Encoded {} frame(s) into {} byte(s) in {:?}",
                summary.frames_in, summary.bytes_out, summary.elapsed
            );
            Ok(())
        }
        Commands::ShowConfig { config, streaming } => {
            let config = load_config(config.as_deref(), streaming)?;
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>, streaming: Option<u32>) -> Result<ComponentConfig> {
    match (path, streaming) {
        (Some(path), _) => {
            let text =
                fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            ComponentConfig::from_toml(&text).with_context(|| format!("parsing {}", path.display()))
        }
        (None, Some(stream_id)) => Ok(ComponentConfig::streaming(stream_id)),
        (None, None) => Ok(ComponentConfig::application()),
    }
}
