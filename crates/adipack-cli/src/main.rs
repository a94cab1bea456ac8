//! adipack - package a video asset with an ADI descriptor and publish it
//!
//! # Usage
//!
//! ```bash
//! # Inspect a file
//! adipack probe episode.mp4
//!
//! # Print the descriptor that would be packaged
//! adipack describe episode.mp4 --title "Pilot" --field Genre=Drama
//!
//! # Build the zip locally
//! adipack package episode.mp4 --title "Pilot" --out pilot.zip
//!
//! # Full pipeline: package and upload, prints the package URL
//! AWS_S3_BUCKET_NAME=media AWS_REGION=us-east-1 adipack run episode.mp4 --title "Pilot"
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use adipack_core::core::adi::DescriptiveFields;
use adipack_core::core::ffmpeg::{detect_system_ffmpeg, FFmpegRunner, MediaProbe};
use adipack_core::core::pipeline::{
    CancelToken, MediaSource, Packager, Pipeline, PublishOptions, Submission,
};
use adipack_core::core::settings::{resolve_settings, PackagerSettings};
use adipack_core::core::storage::{Publisher, StorageCredentials};
use adipack_core::core::MediaArtifact;

#[derive(Parser, Debug)]
#[command(name = "adipack", version)]
#[command(about = "Package a video asset with an ADI 1.1 descriptor and publish it to S3", long_about = None)]
struct Cli {
    /// Settings file (defaults to the per-user settings.json)
    #[arg(long, global = true, value_name = "PATH")]
    settings: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Give up between stages once this many seconds have passed
    #[arg(long, global = true, value_name = "SECS")]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print technical metadata as JSON
    Probe {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Print the ADI descriptor XML
    Describe {
        #[arg(value_name = "FILE")]
        input: PathBuf,

        #[command(flatten)]
        fields: FieldArgs,
    },

    /// Build the package locally without publishing
    Package {
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Where to write the zip
        #[arg(long, value_name = "ZIP")]
        out: PathBuf,

        #[command(flatten)]
        fields: FieldArgs,
    },

    /// Package and publish, printing the package URL
    Run {
        #[arg(value_name = "FILE")]
        input: PathBuf,

        #[command(flatten)]
        fields: FieldArgs,
    },
}

#[derive(Args, Debug)]
struct FieldArgs {
    #[arg(long)]
    title: String,

    /// Defaults to the title
    #[arg(long)]
    original_title: Option<String>,

    #[arg(long, default_value = "")]
    summary_short: String,

    #[arg(long, default_value = "")]
    summary_long: String,

    /// Extra descriptor field, repeatable
    #[arg(long = "field", value_name = "KEY=VALUE", value_parser = parse_field)]
    extra: Vec<(String, String)>,
}

impl FieldArgs {
    fn into_fields(self) -> Result<DescriptiveFields> {
        let original_title = self.original_title.unwrap_or_else(|| self.title.clone());
        let mut fields = DescriptiveFields::new(
            self.title,
            original_title,
            self.summary_short,
            self.summary_long,
        );
        for (key, value) in self.extra {
            fields
                .insert(key.clone(), value)
                .with_context(|| format!("Invalid --field {}", key))?;
        }
        Ok(fields)
    }
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty field name in '{}'", raw));
    }
    Ok((key.to_string(), value.to_string()))
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("adipack=debug,adipack_core=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("adipack=info,adipack_core=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn media_probe() -> Result<Arc<dyn MediaProbe>> {
    let info = detect_system_ffmpeg().context("FFmpeg is required")?;
    tracing::debug!(
        "Using ffmpeg {} ({})",
        info.version,
        info.ffmpeg_path.display()
    );
    Ok(Arc::new(FFmpegRunner::new(info)))
}

fn cancel_token(timeout_secs: Option<u64>) -> CancelToken {
    match timeout_secs {
        Some(secs) => CancelToken::new().with_timeout(Duration::from_secs(secs)),
        None => CancelToken::new(),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings: PackagerSettings =
        resolve_settings(cli.settings.as_deref(), |name| std::env::var(name).ok())
            .context("Failed to load settings")?;
    let cancel = cancel_token(cli.timeout_secs);

    match cli.command {
        Command::Probe { input } => {
            let packager = Packager::from_settings(media_probe()?, &settings);
            let probe = packager.inspect(&input).await?;
            println!("{}", serde_json::to_string_pretty(&probe)?);
        }

        Command::Describe { input, fields } => {
            let fields = fields.into_fields()?;
            let packager = Packager::from_settings(media_probe()?, &settings);
            let probe = packager.inspect(&input).await?;
            let xml = packager.describe(&fields, &probe).to_xml()?;
            println!("{}", xml);
        }

        Command::Package { input, out, fields } => {
            let fields = fields.into_fields()?;
            let media = MediaArtifact::from_path(&input)?;
            let packager = Packager::from_settings(media_probe()?, &settings);
            let prepared = packager.prepare(&media, &fields, &out, &cancel).await?;
            println!(
                "{} ({} entries, {} bytes)",
                out.display(),
                prepared.package.entry_names().len(),
                prepared.package.size_bytes()
            );
        }

        Command::Run { input, fields } => {
            let fields = fields.into_fields()?;
            let publisher = Publisher::new(settings.publisher_config(StorageCredentials::from_env()))
                .context("Storage is not configured")?;
            let packager = Packager::from_settings(media_probe()?, &settings);
            let pipeline = Pipeline::new(packager, Arc::new(publisher))
                .with_options(PublishOptions::from(&settings.storage));

            let output = pipeline
                .run(Submission::new(MediaSource::Path(input), fields), &cancel)
                .await?;

            if let Some(descriptor) = &output.descriptor {
                tracing::info!("Descriptor: {}", descriptor.url);
            }
            for thumbnail in &output.thumbnails {
                tracing::info!("Thumbnail: {}", thumbnail.url);
            }
            println!("{}", output.package.url);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
