//! Trellis Demo
//!
//! Runs the sample `Counter` host: a default echo service on the configured
//! listen address and a `foo` service without a listener, each logging its
//! own tick counter.
//!
//! Configuration comes from `TRELLIS_*` environment variables, overridden by
//! command-line flags.

mod host;

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trellis_registrar::{Registrar, RegistrarConfig, RegistrarError};
use trellis_runtime::TokioRuntime;

use crate::host::Counter;

#[derive(Parser)]
#[command(name = "trellis-demo")]
#[command(about = "Sample Trellis services: an echo server and two counters", long_about = None)]
struct Cli {
    /// Listen address of the default service, overriding TRELLIS_LISTEN_<NAME>
    #[arg(long)]
    listen: Option<String>,

    /// Services to skip (comma separated)
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<String>,

    /// Seconds between counter ticks
    #[arg(long, default_value_t = 1)]
    interval: u64,

    /// Print the resolved service bindings as JSON and exit
    #[arg(long)]
    plan: bool,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "trellis_demo=info,trellis_registrar=info,trellis_runtime=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let host = Counter::new(Duration::from_secs(cli.interval.max(1)));
    let mut registrar = Registrar::new(config, host, TokioRuntime::new());

    if cli.plan {
        let plan = serde_json::to_string_pretty(&registrar.plan())
            .context("Failed to serialize service plan")?;
        println!("{}", plan);
        return Ok(());
    }

    info!("Starting Trellis demo");
    match registrar.run() {
        Ok(()) => {
            info!("Trellis demo stopped");
            Ok(())
        }
        Err(RegistrarError::Environment(err)) => {
            eprintln!("{}", err.report());
            std::process::exit(1);
        }
        Err(err) => Err(err).context("Failed to run services"),
    }
}

/// Listen address of the default service when neither the environment nor
/// the command line sets one
const DEFAULT_LISTEN: &str = "text://0.0.0.0:5678";

/// Loads configuration from the environment and applies command-line overrides
fn load_config(cli: &Cli) -> Result<RegistrarConfig> {
    let config =
        RegistrarConfig::from_env().context("Failed to load configuration from environment")?;
    let config = apply_overrides(config, cli);

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn apply_overrides(mut config: RegistrarConfig, cli: &Cli) -> RegistrarConfig {
    let default_service = config.default_service.clone();
    if !default_service.is_empty() {
        let listen = match &cli.listen {
            Some(listen) => Some(listen.clone()),
            None if config.listen_for(&default_service).is_empty() => {
                Some(DEFAULT_LISTEN.to_string())
            }
            None => None,
        };

        if let Some(listen) = listen {
            config
                .listens
                .retain(|service, _| !service.eq_ignore_ascii_case(&default_service));
            config = config.with_listen(default_service, listen);
        }
    }

    for service in &cli.exclude {
        let service = service.trim();
        if !service.is_empty() {
            config = config.with_exclusion(service);
        }
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> RegistrarConfig {
        RegistrarConfig::from_vars(
            pairs
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string())),
        )
        .unwrap()
    }

    #[test]
    fn test_environment_listen_of_renamed_default_is_kept() {
        let config = env(&[
            ("TRELLIS_DEFAULT_SERVICE", "main"),
            ("TRELLIS_LISTEN_MAIN", "tcp://127.0.0.1:7000"),
        ]);
        let cli = Cli::parse_from(["trellis-demo"]);

        let config = apply_overrides(config, &cli);
        assert_eq!(config.listen_for("main"), "tcp://127.0.0.1:7000");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_listen_flag_overrides_environment() {
        let config = env(&[
            ("TRELLIS_DEFAULT_SERVICE", "main"),
            ("TRELLIS_LISTEN_MAIN", "tcp://127.0.0.1:7000"),
        ]);
        let cli = Cli::parse_from(["trellis-demo", "--listen", "tcp://127.0.0.1:7100"]);

        let config = apply_overrides(config, &cli);
        assert_eq!(config.listen_for("main"), "tcp://127.0.0.1:7100");
        assert_eq!(config.listens.len(), 1);
    }

    #[test]
    fn test_fallback_listen_and_exclusions() {
        let cli = Cli::parse_from(["trellis-demo", "--exclude", "foo, ,bar"]);

        let config = apply_overrides(env(&[]), &cli);
        assert_eq!(config.listen_for("default"), DEFAULT_LISTEN);
        assert_eq!(config.exclusions, vec!["foo", "bar"]);
    }
}
