use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod mic_test;
mod rest;
mod settings;
mod stream;

#[derive(Parser, Debug)]
#[command(author, version, about = "Voice tutoring client for the EQiLevel backend")]
struct Cli {
    /// Backend base URL; overrides the settings file
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stream microphone audio over the duplex voice socket
    Stream(stream::StreamArgs),
    /// Create a session and print its id
    Session,
    /// Run one typed turn through the tutoring pipeline
    Text(rest::TextArgs),
    /// List curriculum objectives
    Objectives(rest::ObjectivesArgs),
    /// Show aggregate tutoring metrics
    Metrics(rest::MetricsArgs),
    /// Meter microphone input without connecting anywhere
    MicTest(mic_test::MicTestArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut settings = settings::Settings::load();
    if let Some(base_url) = cli.base_url {
        settings.base_url = base_url;
    }

    match cli.command {
        Commands::Stream(args) => stream::run_stream(&settings, args).await?,
        Commands::Session => rest::run_session(&settings).await?,
        Commands::Text(args) => rest::run_text(&settings, args).await?,
        Commands::Objectives(args) => rest::run_objectives(&settings, args).await?,
        Commands::Metrics(args) => rest::run_metrics(&settings, args).await?,
        Commands::MicTest(args) => mic_test::run_mic_test(&settings, args).await?,
    }

    Ok(())
}
