mod clock;
mod config;
mod notify;
#[cfg(feature = "serve")]
mod serve;
mod watchdog;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

/// Watchdog service for a remote worker: counts time since the worker last
/// checked in and pushes a notification when it looks stalled.
#[derive(Parser, Debug)]
#[command(name = "stall-watchdog", version, about)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "watchdog.toml")]
    config: PathBuf,

    /// Bind address (overrides config)
    #[arg(long)]
    bind: Option<String>,

    /// Listen port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Stall threshold in seconds (overrides config)
    #[arg(long)]
    threshold: Option<u64>,

    /// Tick interval in seconds (overrides config)
    #[arg(long)]
    tick_interval: Option<u64>,

    /// Validate config and print resolved settings, don't run
    #[arg(long)]
    dry_run: bool,

    /// Extra logging (per-tick state)
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply_overrides(&self, cfg: &mut config::ServiceConfig) {
        if let Some(bind) = &self.bind {
            cfg.serve.bind = bind.clone();
        }
        if let Some(port) = self.port {
            cfg.serve.port = port;
        }
        if let Some(threshold) = self.threshold {
            cfg.watchdog.threshold_secs = threshold;
        }
        if let Some(tick) = self.tick_interval {
            cfg.watchdog.tick_interval_secs = tick;
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "stall_watchdog=debug"
    } else {
        "stall_watchdog=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .with_thread_ids(false)
        .init();

    tracing::info!("stall-watchdog starting");
    tracing::debug!(?cli, "parsed CLI arguments");

    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "stall-watchdog exiting");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut cfg = config::load_config(&cli.config)?;
    cli.apply_overrides(&mut cfg);
    cfg.validate()?;

    let credentials = cfg.notify.credentials();

    if cli.dry_run {
        println!("stall-watchdog v{}", env!("CARGO_PKG_VERSION"));
        println!("Config file: {}", cli.config.display());
        println!("Job name: {}", cfg.watchdog.job_name);
        println!("Threshold: {}s", cfg.watchdog.threshold_secs);
        println!("Tick interval: {}s", cfg.watchdog.tick_interval_secs);
        println!("Listen: {}:{}", cfg.serve.bind, cfg.serve.port);
        println!("Push endpoint: {}", cfg.notify.endpoint);
        println!(
            "Credentials: {}",
            if credentials.is_some() { "present" } else { "missing" }
        );
        return Ok(());
    }

    let line = notify::LineNotifier::new(&cfg.notify, credentials)?;
    if !line.has_credentials() {
        tracing::warn!(
            token_env = %cfg.notify.token_env,
            destination_env = %cfg.notify.destination_env,
            "push credentials missing, notifications will fail"
        );
    }
    let notifier: Arc<dyn notify::Notifier> = Arc::new(line);
    let clock: Arc<dyn clock::Clock> = Arc::new(clock::MonotonicClock::new());

    let watchdog = Arc::new(watchdog::Watchdog::new(
        &cfg.watchdog,
        Arc::clone(&notifier),
        Arc::clone(&clock),
    ));
    let ticker = tokio::spawn(Arc::clone(&watchdog).run());

    #[cfg(feature = "serve")]
    {
        let state = serve::AppState {
            watchdog,
            notifier,
            clock,
            job_name: cfg.watchdog.job_name.clone(),
        };
        serve::run(&cfg.serve, state).await?;
    }

    #[cfg(not(feature = "serve"))]
    {
        let _ = (watchdog, notifier, clock);
        tracing::info!("built without `serve`, running tick loop only");
        ticker.await?;
    }

    #[cfg(feature = "serve")]
    ticker.abort();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_config_values() {
        let cli = Cli::try_parse_from([
            "stall-watchdog",
            "--threshold",
            "300",
            "--tick-interval",
            "5",
            "--port",
            "8080",
            "--bind",
            "127.0.0.1",
        ])
        .unwrap();

        let mut cfg = config::ServiceConfig::default();
        cli.apply_overrides(&mut cfg);
        assert_eq!(cfg.watchdog.threshold_secs, 300);
        assert_eq!(cfg.watchdog.tick_interval_secs, 5);
        assert_eq!(cfg.serve.port, 8080);
        assert_eq!(cfg.serve.bind, "127.0.0.1");
    }

    #[test]
    fn test_no_flags_keep_config_values() {
        let cli = Cli::try_parse_from(["stall-watchdog"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("watchdog.toml"));
        assert!(!cli.dry_run);

        let mut cfg = config::ServiceConfig::default();
        cfg.watchdog.threshold_secs = 900;
        cli.apply_overrides(&mut cfg);
        assert_eq!(cfg.watchdog.threshold_secs, 900);
        assert_eq!(cfg.watchdog.tick_interval_secs, 1);
        assert_eq!(cfg.serve.port, 5000);
    }

    #[test]
    fn test_overridden_threshold_still_validated() {
        let cli = Cli::try_parse_from(["stall-watchdog", "--threshold", "0"]).unwrap();
        let mut cfg = config::ServiceConfig::default();
        cli.apply_overrides(&mut cfg);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_non_numeric_port_rejected() {
        assert!(Cli::try_parse_from(["stall-watchdog", "--port", "http"]).is_err());
    }
}
