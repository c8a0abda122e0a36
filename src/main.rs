//! chunked-ogg command line
//!
//! Encodes any FFmpeg-readable audio file to Ogg/Vorbis through the chunk
//! scheduler, and prints the tags of an existing container.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chunked_ogg::config_file::{generate_default_config, ConfigFile};
use chunked_ogg::ffmpeg::{self, FfmpegEngine};
use chunked_ogg::{EncodeOptions, EncoderConfig, OggCodec, Result, Tag};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "chunked-ogg";

/// Channels the Vorbis encoder accepts; wider sources are downmixed.
const MAX_CHANNELS: usize = 2;

#[derive(Parser, Debug)]
#[command(name = "chunked-ogg")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode an audio file to Ogg/Vorbis
    Encode {
        input: PathBuf,
        output: PathBuf,
        /// VBR quality from -0.1 to 1.0
        #[arg(short, long)]
        quality: Option<f32>,
        /// Tag to embed, as NAME=VALUE (repeatable)
        #[arg(short, long = "tag", value_parser = parse_tag)]
        tags: Vec<Tag>,
    },
    /// Print the tags of an Ogg container
    Tags { file: PathBuf },
    /// Write a default configuration file
    InitConfig { path: PathBuf },
}

fn parse_tag(arg: &str) -> std::result::Result<Tag, String> {
    match arg.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok(Tag::new(name, value)),
        _ => Err(format!("expected NAME=VALUE, got {:?}", arg)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    init_logging(&config);

    tracing::info!("{} v{} starting", APP_NAME, VERSION);

    if let Command::InitConfig { path } = &cli.command {
        generate_default_config(path)?;
        tracing::info!(path = ?path, "default configuration written");
        return Ok(());
    }

    ffmpeg::init()?;
    ffmpeg::set_log_level(&config.logging.level);
    tracing::info!("FFmpeg version: {}", ffmpeg::version_info());

    let codec = OggCodec::new(Arc::new(FfmpegEngine::new())).with_config(config);

    match cli.command {
        Command::Encode {
            input,
            output,
            quality,
            tags,
        } => {
            let mut options = EncodeOptions::default().with_tags(tags);
            options.quality = quality;
            encode(&codec, &input, &output, &options).await
        }
        Command::Tags { file } => print_tags(&codec, &file).await,
        Command::InitConfig { .. } => Ok(()),
    }
}

async fn encode(
    codec: &OggCodec<FfmpegEngine>,
    input: &Path,
    output: &Path,
    options: &EncodeOptions,
) -> Result<()> {
    let buffer = ffmpeg::decode_file(input, Some(MAX_CHANNELS))?;
    tracing::info!(
        input = ?input,
        channels = buffer.channel_count(),
        sample_rate = buffer.sample_rate(),
        duration_secs = buffer.duration_secs(),
        "input decoded"
    );

    let blob = codec.encode(&buffer, options).await?;
    tokio::fs::write(output, &blob.data).await?;
    tracing::info!(output = ?output, bytes = blob.len(), mime = blob.mime_type, "written");
    Ok(())
}

async fn print_tags(codec: &OggCodec<FfmpegEngine>, file: &Path) -> Result<()> {
    let container = tokio::fs::read(file).await?;
    for tag in codec.decode_tags(&container).await? {
        println!("{}={}", tag.name, tag.value);
    }
    Ok(())
}

/// Load the configuration file if one was given, defaults otherwise.
fn load_config(path: Option<&Path>) -> Result<EncoderConfig> {
    match path {
        Some(path) => ConfigFile::from_file(path)?.into_encoder_config(),
        None => Ok(EncoderConfig::default()),
    }
}

/// Initialize logging with tracing
fn init_logging(config: &EncoderConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log_filter().into());
    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
