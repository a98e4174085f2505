use anyhow::{Context, Result};
use clap::Parser;
use mqttline::config::MqttlineConfig;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mqttline")]
#[command(about = "Publish terminal lines to an MQTT topic and print what arrives on it")]
#[command(version)]
struct Args {
    #[arg(short, long, help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(short, long, help = "Enable verbose logging")]
    verbose: bool,

    #[arg(long, help = "MQTT broker host (overrides config)")]
    host: Option<String>,

    #[arg(long, help = "MQTT broker port (overrides config)")]
    port: Option<u16>,

    #[arg(long, help = "Topic to subscribe and publish to (overrides config)")]
    topic: Option<String>,

    #[arg(long, help = "QoS level 0, 1, or 2 (overrides config)")]
    qos: Option<u8>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging on stderr; stdout belongs to the operator
    let log_filter = if args.verbose {
        "debug,rumqttc=info"
    } else {
        "warn,rumqttc=error"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting mqttline v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            std::process::exit(2);
        }
    };

    info!(
        "MQTT Broker: {}:{}, topic '{}'",
        config.broker.host, config.broker.port, config.session.topic
    );

    match mqttline::terminal::run(&config).await {
        Ok(summary) => {
            info!(
                "Published {} message(s), {} failed",
                summary.published, summary.failed
            );
            Ok(())
        }
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{:#}", e);
            std::process::exit(1);
        }
    }
}

fn load_config(args: &Args) -> Result<MqttlineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {:?}", path);
            }
            MqttlineConfig::load_from_file(path).context("Failed to load configuration")?
        }
        None => MqttlineConfig::load_from_file(&MqttlineConfig::get_config_path())
            .context("Failed to load configuration")?,
    };

    if let Some(host) = &args.host {
        config.broker.host = host.clone();
    }
    if let Some(port) = args.port {
        config.broker.port = port;
    }
    if let Some(topic) = &args.topic {
        config.session.topic = topic.clone();
    }
    if let Some(qos) = args.qos {
        config.session.qos = qos;
    }

    config.validate()?;
    Ok(config)
}
