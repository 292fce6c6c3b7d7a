//! Neural vocoder CLI - mel-to-waveform synthesis and oracle resynthesis

use anyhow::{Context, Result};
use candle_core::{IndexOp, Tensor};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use neural_vocoder::audio::AudioOutput;
use neural_vocoder::debug::load_npy_tensor;
use neural_vocoder::{DeviceSelection, Vocoder, VocoderConfig, MEL_BINS, VERSION};

/// Pretrained GAN vocoder: mel spectrograms to 44.1 kHz audio
#[derive(Parser, Debug)]
#[command(name = "neural-vocoder")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Run on CUDA/Metal instead of the CPU
    #[arg(long, global = true)]
    accelerated: bool,

    /// Path to the generator checkpoint
    #[arg(long, global = true, default_value = "checkpoints/model.ckpt-1490000_trimed.pt")]
    checkpoint: PathBuf,

    /// Sample rate preset
    #[arg(long, global = true, default_value = "44100")]
    sample_rate: u32,

    /// YAML file overriding the sample rate preset
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Synthesize audio from a mel spectrogram stored as .npy
    Synthesize {
        /// Mel spectrogram, shape [frames, 128], [batch, frames, 128] or [batch, 1, frames, 128]
        #[arg(short, long)]
        mel: PathBuf,

        /// Output audio file path
        #[arg(short, long, default_value = "output.wav")]
        output: PathBuf,
    },

    /// Resynthesize a wave file through the vocoder
    Oracle {
        /// Input wave file
        #[arg(short, long)]
        input: PathBuf,

        /// Output audio file path
        #[arg(short, long, default_value = "oracle.wav")]
        output: PathBuf,
    },

    /// Show configuration and checkpoint coverage
    Info,
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")
}

fn create_progress_bar(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn resolve_config(cli: &Cli) -> Result<VocoderConfig> {
    match &cli.config {
        Some(path) => VocoderConfig::load(path),
        None => VocoderConfig::for_sample_rate(cli.sample_rate),
    }
}

fn load_vocoder(cli: &Cli) -> Result<Vocoder> {
    let config = resolve_config(cli)?;
    let pb = create_progress_bar("Loading vocoder...");
    let vocoder = Vocoder::with_options(
        config,
        &cli.checkpoint,
        DeviceSelection::from_flag(cli.accelerated),
    );
    match &vocoder {
        Ok(_) => pb.finish_with_message("Vocoder loaded"),
        Err(_) => pb.finish_and_clear(),
    }
    vocoder
}

/// Reshape an NPY mel array to (batch, 1, frames, 128)
fn mel_batch(path: &Path) -> Result<Tensor> {
    let mel = load_npy_tensor(path, &candle_core::Device::Cpu)
        .with_context(|| format!("Failed to load mel spectrogram {:?}", path))?;
    let mel = match mel.rank() {
        2 => mel.unsqueeze(0)?.unsqueeze(0)?,
        3 => mel.unsqueeze(1)?,
        _ => mel,
    };
    info!("Mel input {:?} (expecting {} bins)", mel.dims(), MEL_BINS);
    Ok(mel)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    info!("neural-vocoder v{}", VERSION);

    match &cli.command {
        Commands::Synthesize { mel, output } => {
            let mel = mel_batch(mel)?;
            let vocoder = load_vocoder(&cli)?;

            let wav = vocoder.synthesize(&mel)?;
            let samples: Vec<f32> = wav.i((0, 0))?.to_vec1()?;
            AudioOutput::save(&samples, vocoder.sample_rate(), output)?;

            info!(
                "Wrote {:.2}s of audio to {:?}",
                samples.len() as f32 / vocoder.sample_rate() as f32,
                output
            );
            Ok(())
        }

        Commands::Oracle { input, output } => {
            let vocoder = load_vocoder(&cli)?;
            vocoder.oracle(input, output)?;
            info!("Wrote {:?}", output);
            Ok(())
        }

        Commands::Info => {
            let config = resolve_config(&cli)?;
            println!("{}", serde_yaml::to_string(&config)?);

            if cli.checkpoint.exists() {
                let vocoder = load_vocoder(&cli)?;
                println!("{}", vocoder.load_report().summary());
            } else {
                eprintln!("Checkpoint not found: {:?}", cli.checkpoint);
                eprintln!("Download it from: {}", neural_vocoder::error::CHECKPOINT_DOWNLOAD_URL);
            }
            Ok(())
        }
    }
}
