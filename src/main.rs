use anyhow::Context;
use loom::cli::{Cli, Commands, commands, output::Output};
use loom::utils::toml_config::{ConfigManager, LogFormat, LoomConfig, ServerConfig};
use loom::{AppState, build_router};
use std::path::Path;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    let output = Output::from_flag(cli.no_color);

    match cli.command() {
        Commands::Serve => serve(&cli, &output).await,
        Commands::Run { input, pretty } => run(&cli, &input, pretty).await,
        Commands::Config { validate } => show_config(&cli, &output, validate),
    }
}

async fn serve(cli: &Cli, output: &Output) -> anyhow::Result<()> {
    let manager = load_manager(&cli.config, output)?;
    let config = manager.config();
    init_logging(&config.server, cli.verbose);

    let state = AppState::from_config_manager(manager)
        .context("Failed to build the coordinator")?;
    let addr = config.bind_address();

    output.banner();
    output.info(&format!(
        "Coordinator '{}' answering on http://{}",
        config.coordinator.name, addr
    ));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(address = %addr, "Server listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn run(cli: &Cli, input: &str, pretty: bool) -> anyhow::Result<()> {
    let config = LoomConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    init_logging(&config.server, cli.verbose);

    let raw = commands::read_payload(input)?;
    let response = commands::run_once(&config, &raw).await?;
    println!("{}", commands::render_envelope(&response, pretty)?);

    if !response.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn show_config(cli: &Cli, output: &Output, validate: bool) -> anyhow::Result<()> {
    if validate {
        return match LoomConfig::load(&cli.config) {
            Ok(_) => {
                output.success(&format!("{} is valid", cli.config.display()));
                Ok(())
            }
            Err(e) => {
                output.error(&e.to_string());
                std::process::exit(1);
            }
        };
    }

    let source = cli.config.exists().then_some(cli.config.as_path());
    let config = LoomConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    commands::show_config(output, &config, source);
    Ok(())
}

fn load_manager(path: &Path, output: &Output) -> anyhow::Result<ConfigManager> {
    if path.exists() {
        return ConfigManager::new(path)
            .with_context(|| format!("Failed to load {}", path.display()));
    }

    output.warning(&format!(
        "{} not found, starting with built-in defaults",
        path.display()
    ));
    output.hint("Point at another file with --config:");
    output.command("loom-server --config path/to/loom.toml serve");
    Ok(ConfigManager::from_config(LoomConfig::default()))
}

/// Logs go to stderr so `run` keeps stdout for the envelope.
fn init_logging(server: &ServerConfig, verbose: bool) {
    let default_directive = if verbose {
        "debug".to_string()
    } else {
        server.log_level.clone()
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    let installed = match server.log_format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    };
    if let Err(e) = installed {
        eprintln!("Failed to install tracing subscriber: {}", e);
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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
    info!("Shutdown signal received");
}
