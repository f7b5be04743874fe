mod config;

use clap::{Args, Parser, Subcommand};
use config::{Config, LoggingConfig, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "relay", about = "Donation webhook relay")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Run the relay
    Run(ConfigArgs),
    /// Load and validate the config file, then exit
    CheckConfig(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    #[arg(long)]
    config: PathBuf,
}

fn load_config(args: &ConfigArgs) -> Config {
    match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading {}: {e}", args.config.display());
            process::exit(1);
        }
    }
}

/// Installs the subscriber. The returned guard keeps Sentry alive.
fn init_logging(logging: &LoggingConfig) -> Option<sentry::ClientInitGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let guard = logging.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });
    let sentry_layer = guard
        .as_ref()
        .map(|_| sentry::integrations::tracing::layer());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_layer)
        .init();

    guard
}

fn init_metrics(metrics: &MetricsConfig) {
    let recorder = match StatsdBuilder::from(metrics.statsd_host.as_str(), metrics.statsd_port)
        .build(Some(metrics.prefix.as_str()))
    {
        Ok(recorder) => recorder,
        Err(e) => {
            tracing::error!(error = %e, "Could not create statsd recorder, metrics disabled");
            return;
        }
    };
    if let Err(e) = metrics::set_global_recorder(recorder) {
        tracing::error!(error = %e, "Metrics recorder already installed");
        return;
    }
    shared::metrics_defs::describe_all(donations::metrics_defs::ALL_METRICS);
    tracing::info!(
        host = %metrics.statsd_host,
        port = metrics.statsd_port,
        "Sending metrics to statsd"
    );
}

fn run(config: Config) {
    let logging = config.common.logging.unwrap_or_default();
    let _sentry = init_logging(&logging);
    if let Some(metrics) = &config.common.metrics {
        init_metrics(metrics);
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "Could not start tokio runtime");
            process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(donations::run(config.relay)) {
        tracing::error!(error = %e, "Relay stopped with an error");
        process::exit(1);
    }
}

fn main() {
    let cli = Cli::parse();

    match &cli.command {
        CliCommand::Run(args) => run(load_config(args)),
        CliCommand::CheckConfig(args) => {
            load_config(args);
            println!("{} is valid", args.config.display());
        }
    }
}
