//! fleetssh CLI
//!
//! Runs one command or file operation across a fleet of hosts and prints
//! the per-host results as JSON.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use fleetssh_core::{
    ClientConfig, CoreError, DefaultTransportFactory, FleetResults, ParallelClient, ResultStatus,
    Success, TransportFactory, derive_concurrency, parse_host_list, result_status,
};

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "fleetssh")]
#[command(about = "Run commands and copy files across a fleet over SSH", long_about = None)]
struct Cli {
    /// Config file (defaults to the usual fleetssh.toml locations)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Comma separated host list, e.g. `web-1,web-2:2222`
    #[arg(long, global = true)]
    hosts: Option<String>,

    /// SSH user
    #[arg(long, short, global = true)]
    user: Option<String>,

    /// Default SSH port
    #[arg(long, short, global = true)]
    port: Option<u16>,

    /// Private key file
    #[arg(long, global = true)]
    key: Option<PathBuf>,

    /// Environment variable holding a base64 private key
    #[arg(long, global = true)]
    key_env: Option<String>,

    /// Environment variable holding the SSH password
    #[arg(long, global = true)]
    password_env: Option<String>,

    /// Hosts worked on at once (derived from the fleet size when unset)
    #[arg(long, short = 'c', global = true)]
    concurrency: Option<usize>,

    /// Work on one host at a time
    #[arg(long, global = true)]
    serial: bool,

    /// Connect timeout in seconds
    #[arg(long, global = true)]
    connect_timeout: Option<u64>,

    /// Abort on the first host that cannot be reached
    #[arg(long, global = true)]
    fail_fast: bool,

    /// Exit successfully when at least one host succeeded
    #[arg(long, global = true)]
    allow_partial_failure: bool,

    /// Emit JSON log lines on stderr
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to every host and report which ones are reachable
    Connect,
    /// Run a shell command on every host
    Run {
        /// Command line, passed to the remote shell
        cmd: String,
        /// Directory to run the command from
        #[arg(long)]
        cwd: Option<String>,
        /// Per-host timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Upload a file or directory
    Put {
        /// Local file or directory
        local: PathBuf,
        /// Remote destination
        remote: String,
        /// Octal mode applied to uploaded files, e.g. 0644
        #[arg(long, value_parser = parse_mode)]
        mode: Option<u32>,
        /// Copy the local file mode
        #[arg(long)]
        mirror_local_mode: bool,
    },
    /// Create a directory
    Mkdir {
        path: String,
    },
    /// Delete a file
    Rm {
        path: String,
    },
    /// Delete a directory
    Rmdir {
        path: String,
        /// Remove recursively
        #[arg(long, short)]
        force: bool,
        /// Timeout in seconds for a recursive delete
        #[arg(long)]
        timeout: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    init_logging(&cli, &config);

    let client_config = client_config(&cli, &config)?;
    let status = execute(&cli, client_config, Arc::new(DefaultTransportFactory)).await?;

    Ok(if status.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Initialize tracing; `RUST_LOG` wins over the configured level
fn init_logging(cli: &Cli, config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level));

    if cli.json_logs || config.log.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

/// Merge flags over file settings
fn client_config(cli: &Cli, config: &Config) -> Result<ClientConfig> {
    let fleet = &config.fleet;

    let hosts = match &cli.hosts {
        Some(raw) => parse_host_list(raw),
        None => fleet.hosts.clone(),
    };

    let concurrency = cli.concurrency.unwrap_or_else(|| {
        derive_concurrency(hosts.len(), fleet.parallel && !cli.serial, fleet.max_parallel)
    });

    let mut client_config = ClientConfig::new(hosts)
        .with_user(cli.user.clone().unwrap_or_else(|| fleet.user.clone()))
        .with_port(cli.port.unwrap_or(fleet.port))
        .with_concurrency(concurrency)
        .with_raise_on_connect_error(cli.fail_fast)
        .with_connect_on_construct(false);

    if let Some(secs) = cli.connect_timeout.or(fleet.connect_timeout_secs) {
        client_config = client_config.with_connect_timeout(Duration::from_secs(secs));
    }

    if let Some(var) = cli.password_env.as_ref().or(fleet.password_env.as_ref()) {
        let password = std::env::var(var)
            .map_err(|_| eyre::eyre!("password variable {var} is not set"))?;
        client_config = client_config.with_password(password);
    } else if let Some(path) = cli.key.clone().or_else(|| fleet.private_key.clone()) {
        client_config = client_config.with_private_key(path);
    } else if let Some(var) = cli.key_env.clone().or_else(|| fleet.private_key_env.clone()) {
        client_config = client_config.with_private_key_env(var);
    } else if let Some(path) = config::default_key() {
        debug!(key = %path.display(), "using default key");
        client_config = client_config.with_private_key(path);
    }

    Ok(client_config)
}

/// Connect, run the requested operation, print its results and close
///
/// A missing upload source fails before any host is contacted. Sessions
/// opened on the way are closed on every exit path.
async fn execute(
    cli: &Cli,
    client_config: ClientConfig,
    factory: Arc<dyn TransportFactory>,
) -> Result<ResultStatus> {
    if let Commands::Put { local, .. } = &cli.command
        && !local.exists()
    {
        return Err(CoreError::LocalPathNotFound(local.clone()).into());
    }

    let mut client = ParallelClient::new(client_config, factory).await?;
    let status = dispatch(cli, &mut client).await;
    client.close().await;
    status
}

async fn dispatch(cli: &Cli, client: &mut ParallelClient) -> Result<ResultStatus> {
    let raise = client.config().raise_on_connect_error;
    let connected = client.connect(raise).await?;
    info!(
        live = client.live_hosts().count(),
        bad = client.bad_hosts().count(),
        "connected"
    );

    let allow = cli.allow_partial_failure;
    let status = match &cli.command {
        Commands::Connect => report(&connected, allow)?,
        Commands::Run { cmd, cwd, timeout } => {
            let results = client
                .run(cmd, timeout.map(Duration::from_secs), cwd.as_deref())
                .await;
            report(&results, allow)?
        }
        Commands::Put {
            local,
            remote,
            mode,
            mirror_local_mode,
        } => {
            let results = client.put(local, remote, *mode, *mirror_local_mode).await?;
            report(&results, allow)?
        }
        Commands::Mkdir { path } => report(&client.mkdir(path).await, allow)?,
        Commands::Rm { path } => report(&client.delete_file(path).await, allow)?,
        Commands::Rmdir {
            path,
            force,
            timeout,
        } => {
            let results = client
                .delete_dir(path, *force, timeout.map(Duration::from_secs))
                .await;
            report(&results, allow)?
        }
    };

    Ok(status)
}

/// Print `results` as pretty JSON and collapse them into a status
fn report<T: Serialize + Success>(
    results: &FleetResults<T>,
    allow_partial_failure: bool,
) -> Result<ResultStatus> {
    println!("{}", serde_json::to_string_pretty(results)?);
    Ok(result_status(results, allow_partial_failure))
}

fn parse_mode(raw: &str) -> Result<u32, String> {
    let digits = raw.strip_prefix("0o").unwrap_or(raw);
    u32::from_str_radix(digits, 8)
        .ok()
        .filter(|mode| *mode <= 0o7777)
        .ok_or_else(|| format!("{raw:?} is not an octal file mode"))
}
