//! ugenflow CLI - render and inspect unit generator definitions

use clap::{Parser, Subcommand};
use hound::{SampleFormat, WavSpec, WavWriter};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;
use ugenflow::{AudioSettings, Environment, SynthOptions};

#[derive(Parser)]
#[command(name = "ugenflow")]
#[command(about = "Unit generator graph engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a JSON synth def to a WAV file
    Render {
        /// Synth def (JSON)
        def: PathBuf,

        /// Output WAV file path
        output: PathBuf,

        /// Duration in seconds (default: 2.0)
        #[arg(short, long, default_value = "2.0")]
        duration: f64,

        /// TOML settings file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Sample rate in Hz, overrides the config
        #[arg(short, long)]
        sample_rate: Option<f64>,

        /// Block size, overrides the config
        #[arg(short, long)]
        block_size: Option<usize>,

        /// Output channels, overrides the config
        #[arg(long)]
        chans: Option<usize>,
    },

    /// Print the compiled evaluation order of a synth def
    Inspect {
        /// Synth def (JSON)
        def: PathBuf,

        /// TOML settings file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn load_def(path: &Path) -> Result<Value, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn load_settings(config: Option<&Path>) -> Result<AudioSettings, Box<dyn std::error::Error>> {
    Ok(match config {
        Some(path) => AudioSettings::from_file(path)?,
        None => AudioSettings::default(),
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            def,
            output,
            duration,
            config,
            sample_rate,
            block_size,
            chans,
        } => {
            let mut settings = load_settings(config.as_deref())?;
            if let Some(sr) = sample_rate {
                settings.sample_rate = sr;
            }
            if let Some(bs) = block_size {
                settings.block_size = bs;
            }
            if let Some(c) = chans {
                settings.chans = c;
            }
            if !(settings.sample_rate.is_finite() && settings.sample_rate > 0.0) {
                return Err(format!("sample rate must be positive, got {}", settings.sample_rate).into());
            }
            let settings = settings.clamped();

            let def_value = load_def(&def)?;
            let mut env = Environment::new(settings.clone());
            env.add_synth(&def_value, SynthOptions::default())?;

            let num_frames = (duration.max(0.0) * settings.sample_rate).round() as usize;
            info!(
                frames = num_frames,
                sample_rate = settings.sample_rate,
                chans = settings.chans,
                "rendering"
            );
            let channels = env.render(num_frames);

            let spec = WavSpec {
                channels: settings.chans as u16,
                sample_rate: settings.sample_rate.round() as u32,
                bits_per_sample: 32,
                sample_format: SampleFormat::Float,
            };
            let mut writer = WavWriter::create(&output, spec)?;
            for i in 0..num_frames {
                for channel in &channels {
                    writer.write_sample(channel[i])?;
                }
            }
            writer.finalize()?;

            let peak = channels
                .iter()
                .flat_map(|c| c.iter())
                .fold(0.0f32, |acc, s| acc.max(s.abs()));
            println!("Wrote {} ({:.2}s, {} ch, peak {:.3})", output.display(), duration, settings.chans, peak);
        }

        Commands::Inspect { def, config } => {
            let settings = load_settings(config.as_deref())?;
            let def_value = load_def(&def)?;
            let env = Environment::new(settings);
            let synth = env.compile_synth(&def_value, &SynthOptions::default())?;

            println!("{:>4}  {:<12} {:<12} {}", "#", "type", "name", "rate");
            for (i, (_, slot)) in synth.nodes().enumerate() {
                println!(
                    "{:>4}  {:<12} {:<12} {}",
                    i,
                    slot.type_name,
                    slot.name.as_deref().unwrap_or("-"),
                    slot.rate.as_str()
                );
            }
        }
    }

    Ok(())
}
