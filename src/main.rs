//! Weather Sensor Bridge CLI
//!
//! Publishes rtl_433 weather station readings to MQTT.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use weather_sensor_bridge::{
    broker::BrokerConnection,
    config::{Config, LogLevel, SourceCommand},
    ConsoleBroker, MqttBroker, Pipeline, Shutdown, SourceInput, TopicBuilder, VERSION,
};

#[derive(Parser)]
#[command(name = "weather-bridge")]
#[command(version = VERSION)]
#[command(about = "Bridge rtl_433 weather sensor readings to MQTT", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read the sensor source and publish to the MQTT broker
    Run {
        /// Sensor command line, overriding config and SOURCE_CMD
        #[arg(long)]
        source_cmd: Option<String>,
    },

    /// Push a JSON-lines capture through the pipeline and print the messages
    Replay {
        /// Capture file, or `-` for stdin
        input: PathBuf,
    },

    /// Show configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { source_cmd } => cmd_run(source_cmd),
        Commands::Replay { input } => cmd_replay(input),
        Commands::Config { save } => cmd_config(save),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn cmd_run(source_cmd: Option<String>) -> anyhow::Result<()> {
    let mut config = Config::resolve()?;
    if let Some(line) = source_cmd {
        config.source = SourceCommand::parse(&line).context("--source-cmd must not be blank")?;
    }
    init_logging(config.log_level);

    let settings = config.mqtt_settings()?;
    info!(version = VERSION, source = %config.source, "Starting weather bridge");

    let shutdown = Shutdown::new();
    ctrlc_handler(shutdown.clone())?;

    let broker = MqttBroker::connect(&settings)?;
    let pipeline = Pipeline::new(SourceInput::Command(config.source.clone()), broker)
        .with_topics(TopicBuilder::new(config.base_topic.as_str()));

    run_pipeline(pipeline, &shutdown)
}

fn cmd_replay(input: PathBuf) -> anyhow::Result<()> {
    let config = Config::resolve()?;
    init_logging(config.log_level);

    let source = if input.as_os_str() == "-" {
        SourceInput::reader(BufReader::new(std::io::stdin()))
    } else {
        let file = File::open(&input)
            .with_context(|| format!("cannot open capture {}", input.display()))?;
        SourceInput::reader(BufReader::new(file))
    };

    let shutdown = Shutdown::new();
    ctrlc_handler(shutdown.clone())?;

    let pipeline = Pipeline::new(source, ConsoleBroker::stdout())
        .with_topics(TopicBuilder::new(config.base_topic.as_str()));

    run_pipeline(pipeline, &shutdown)
}

fn cmd_config(save: bool) -> anyhow::Result<()> {
    let config = Config::resolve()?;

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);

    if save {
        config.save()?;
        println!();
        println!("Saved.");
    }

    Ok(())
}

fn run_pipeline<B: BrokerConnection + 'static>(
    pipeline: Pipeline<B>,
    shutdown: &Shutdown,
) -> anyhow::Result<()> {
    let counters = pipeline.counters();
    let result = pipeline.run(shutdown);

    eprintln!();
    eprintln!("{}", counters.summary());

    result.context("pipeline failed")
}

/// Log to stderr, filtered by `RUST_LOG` or else the configured level.
fn init_logging(level: LogLevel) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Set up Ctrl+C / SIGTERM handler.
fn ctrlc_handler(shutdown: Shutdown) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        info!("Interrupt received, shutting down");
        shutdown.trigger();
    })
    .context("Error setting Ctrl+C handler")
}
