use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use journey_relay::config::{self, ServiceConfig};
use journey_relay::journeys::default_registry;
use journey_relay::logging::LogControl;
use journey_relay::operator::{DEFAULT_OPERATOR_API, Operator, OperatorClient, OperatorImpl};
use journey_relay::server::JourneyService;

/// How long in-flight journey requests get to finish on shutdown.
const SERVICE_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "journey-relay", version, about = "Hosts webhook journeys behind HTTP routes")]
struct Cli {
    /// Default log level.
    #[arg(long, global = true, env = "JOURNEY_RELAY_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Per-subsystem levels, `name:level,name:level`.
    #[arg(long, global = true, env = "JOURNEY_RELAY_LOG_LEVEL_NAMED", default_value = "")]
    log_level_named: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the journey and operator servers.
    Run(RunArgs),

    /// Print a default config, commented out.
    DefaultConfig {
        /// Print the config of one journey instead of the service config.
        #[arg(long)]
        journey: Option<String>,
    },

    /// Talk to a running service's operator API.
    Operator(OperatorArgs),
}

#[derive(Args)]
struct RunArgs {
    #[arg(long, env = "JOURNEY_RELAY_SERVICE_LISTEN", default_value = "127.0.0.1:5100")]
    service_listen: String,

    #[arg(long, env = "JOURNEY_RELAY_OPERATOR_LISTEN", default_value = "127.0.0.1:5101")]
    operator_listen: String,

    #[arg(long, env = "JOURNEY_RELAY_CONFIG_PATH", default_value = "./config.toml")]
    config_path: PathBuf,
}

#[derive(Args)]
struct OperatorArgs {
    #[arg(long, env = "JOURNEY_RELAY_OPERATOR_API", default_value = DEFAULT_OPERATOR_API)]
    operator_api: String,

    #[command(subcommand)]
    command: OperatorCommand,
}

#[derive(Subcommand)]
enum OperatorCommand {
    /// Print the version of the running service.
    Version,

    /// List log subsystems.
    LogList,

    /// Set the level of one or more subsystems (all of them if none given).
    LogSetLevel {
        #[arg(long = "logger")]
        loggers: Vec<String>,

        level: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log = LogControl::init(&cli.log_level, &cli.log_level_named)
        .context("failed to set up logging")?;

    match cli.command {
        Command::Run(args) => run(args, log).await,
        Command::DefaultConfig { journey } => default_config(journey.as_deref()),
        Command::Operator(args) => operator(args).await,
    }
}

async fn run(args: RunArgs, log: LogControl) -> Result<()> {
    let service_config: ServiceConfig = config::from_file(&args.config_path)
        .with_context(|| format!("failed to load config {}", args.config_path.display()))?;

    let service = JourneyService::new(default_registry());
    let service_router = service.setup_service(&service_config);
    let operator_router = service.operator_router(Arc::new(OperatorImpl::new(log)));

    let service_listener = TcpListener::bind(&args.service_listen)
        .await
        .with_context(|| format!("failed to bind service listener {}", args.service_listen))?;
    let operator_listener = TcpListener::bind(&args.operator_listen)
        .await
        .with_context(|| format!("failed to bind operator listener {}", args.operator_listen))?;

    info!(
        service_listen = %args.service_listen,
        operator_listen = %args.operator_listen,
        "Listening"
    );

    let (stop_service, service_stopped) = watch::channel(false);
    let (stop_operator, operator_stopped) = watch::channel(false);

    let mut service_server = tokio::spawn(async move {
        axum::serve(service_listener, service_router)
            .with_graceful_shutdown(wait_for(service_stopped))
            .await
    });
    let operator_server = tokio::spawn(async move {
        axum::serve(operator_listener, operator_router)
            .with_graceful_shutdown(wait_for(operator_stopped))
            .await
    });

    let service_exited = tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
            false
        }
        result = &mut service_server => {
            error!(?result, "Service server exited unexpectedly");
            true
        }
    };

    service.shutdown();
    let _ = stop_service.send(true);
    if !service_exited {
        match tokio::time::timeout(SERVICE_SHUTDOWN_TIMEOUT, service_server).await {
            Ok(Ok(Ok(()))) => info!("Service server stopped"),
            Ok(Ok(Err(e))) => error!(error = %e, "Service server failed"),
            Ok(Err(e)) => error!(error = %e, "Service server task panicked"),
            Err(_) => warn!("Timed out waiting for service server to stop"),
        }
    }

    let _ = stop_operator.send(true);
    operator_server
        .await
        .context("operator server task panicked")?
        .context("operator server failed")?;
    info!("Operator server stopped");
    Ok(())
}

async fn wait_for(mut stop: watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn default_config(journey: Option<&str>) -> Result<()> {
    let registry = default_registry();
    let rendered = match journey {
        Some(name) => config::config_comment(registry.get(name)?.default_config())?,
        None => config::config_comment(&config::default_service_config(&registry))?,
    };
    print!("{rendered}");
    Ok(())
}

async fn operator(args: OperatorArgs) -> Result<()> {
    let client = OperatorClient::new(&args.operator_api)?;

    match args.command {
        OperatorCommand::Version => {
            println!("{}", client.version().await?);
        }
        OperatorCommand::LogList => {
            for subsystem in client.log_list().await? {
                println!("{subsystem}");
            }
        }
        OperatorCommand::LogSetLevel { loggers, level } => {
            let loggers = if loggers.is_empty() {
                client.log_list().await?
            } else {
                loggers
            };
            for logger in &loggers {
                client
                    .log_set_level(logger, &level)
                    .await
                    .with_context(|| format!("failed to set level of {logger}"))?;
            }
        }
    }
    Ok(())
}
