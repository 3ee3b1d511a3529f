use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use keel_host::{App, Config, ConfigOverrides};

/// Keel - plugin host with composite health reporting
#[derive(Parser)]
#[command(name = "keel", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/keel/config.toml when present)
    #[arg(short, long, env = "KEEL_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "KEEL_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "KEEL_PORT")]
    port: Option<u16>,

    /// Plugins root directory
    #[arg(long, env = "KEEL_PLUGINS_DIR")]
    plugins_dir: Option<PathBuf>,

    /// Entry file that marks a plugin directory
    #[arg(long, env = "KEEL_ENTRY_FILE")]
    entry_file: Option<String>,

    /// Database URL (`sqlite://path`, a bare path, or `:memory:`)
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Directory essential files and the lockfile are resolved against
    #[arg(long, env = "KEEL_BASE_DIR")]
    base_dir: Option<PathBuf>,

    /// Time limit for each health probe, in milliseconds
    #[arg(long, env = "KEEL_PROBE_TIMEOUT_MS")]
    probe_timeout_ms: Option<u64>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Load plugins and serve HTTP (default)
    Serve,
    /// List discovered plugins and their load status
    Plugins,
    /// Print the health report as JSON; exits non-zero unless healthy
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,keel_host=info",
        1 => "info,keel_host=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let overrides = ConfigOverrides {
        host: cli.host,
        port: cli.port,
        plugins_dir: cli.plugins_dir,
        entry_file: cli.entry_file,
        database_url: cli.database_url,
        base_dir: cli.base_dir,
        probe_timeout_ms: cli.probe_timeout_ms,
    };
    let config = Config::load(overrides, cli.config.as_deref())?;

    tracing::info!(
        plugins_dir = %config.plugins_dir.display(),
        database = config.database_url.is_some(),
        "starting keel"
    );

    let app = App::bootstrap(config)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            app.run().await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Plugins => {
            cmd_plugins(&app);
            Ok(ExitCode::SUCCESS)
        }
        Command::Check => cmd_check(&app).await,
    }
}

fn cmd_plugins(app: &App) {
    if app.plugins().is_empty() {
        println!("no plugins found in {}", app.config().plugins_dir.display());
        return;
    }

    for plugin in app.plugins() {
        println!("{}", plugin.summary());
    }
}

async fn cmd_check(app: &App) -> anyhow::Result<ExitCode> {
    let report = app.health_report().await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(if report.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
