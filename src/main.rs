mod config;
mod policy;
mod process;
mod runner;
mod status;
mod throttle;
mod unix;

use clap::Parser;
use config::ProcwatchConfig;
use policy::WatchdogPolicy;
use runner::Runner;
use std::path::PathBuf;
use unix::UnixChildProcess;

/// Keeps a child process alive: launches it, watches a heartbeat channel,
/// kills it when it goes silent, and relaunches it after a cooldown.
#[derive(Parser, Debug)]
#[command(name = "procwatch", version, about)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "procwatch.toml")]
    config: PathBuf,

    /// Child command to supervise (overrides config)
    #[arg(long)]
    command: Option<String>,

    /// Seconds without a heartbeat before the child is killed (overrides config)
    #[arg(long)]
    kill_period: Option<u64>,

    /// Seconds a killed child stays down before relaunch (overrides config)
    #[arg(long)]
    resurrection_period: Option<u64>,

    /// Startup grace period in seconds (overrides config)
    #[arg(long)]
    grace_period: Option<u64>,

    /// Memory ceiling for the child in bytes, 0 disables (overrides config)
    #[arg(long)]
    memory_limit: Option<u64>,

    /// Heartbeat file path (overrides config)
    #[arg(long)]
    heartbeat_file: Option<PathBuf>,

    /// Validate config and print resolved settings, don't run
    #[arg(long)]
    dry_run: bool,

    /// Extra logging (tick decisions, corrective waits)
    #[arg(short, long)]
    verbose: bool,

    /// Arguments for the child command, after `--`
    #[arg(last = true)]
    args: Vec<String>,
}

fn apply_overrides(config: &mut ProcwatchConfig, cli: &Cli) {
    if let Some(command) = &cli.command {
        config.child.command = command.clone();
    }
    if !cli.args.is_empty() {
        config.child.args = cli.args.clone();
    }
    if let Some(secs) = cli.kill_period {
        config.watchdog.unresponsive_kill_period_secs = secs;
    }
    if let Some(secs) = cli.resurrection_period {
        config.watchdog.resurrection_period_secs = secs;
    }
    if let Some(secs) = cli.grace_period {
        config.watchdog.unresponsive_grace_period_secs = secs;
    }
    if let Some(bytes) = cli.memory_limit {
        config.watchdog.memory_limit_bytes = bytes;
    }
    if let Some(path) = &cli.heartbeat_file {
        config.paths.heartbeat_file = path.clone();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "procwatch failed");
        std::process::exit(2);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ProcwatchConfig::load(&cli.config)?;
    apply_overrides(&mut config, &cli);
    config.validate()?;

    if cli.dry_run {
        println!("procwatch v{}", env!("CARGO_PKG_VERSION"));
        println!(
            "Child command:       {} {}",
            config.child.command,
            config.child.args.join(" ")
        );
        println!(
            "Kill period:         {}s",
            config.watchdog.unresponsive_kill_period_secs
        );
        println!(
            "Resurrection period: {}s",
            config.watchdog.resurrection_period_secs
        );
        println!(
            "Grace period:        {}s",
            config.watchdog.unresponsive_grace_period_secs
        );
        println!(
            "Memory limit:        {} bytes",
            config.watchdog.memory_limit_bytes
        );
        println!(
            "Heartbeat file:      {}",
            config.paths.heartbeat_file.display()
        );
        println!("Status file:         {}", config.paths.status_file.display());
        println!("Dry run mode — config validated, not running.");
        return Ok(());
    }

    tracing::info!(child = %config.child.command, "procwatch starting");

    let process = UnixChildProcess::new(&config);
    let policy = WatchdogPolicy::new(
        config.watchdog.unresponsive_kill_period_secs,
        config.watchdog.resurrection_period_secs,
        process,
    );
    let mut runner = Runner::new(
        policy,
        config.watchdog.unresponsive_grace_period_secs,
        config.watchdog.memory_limit_bytes,
    );
    runner.run().await?;
    runner.process_mut().cleanup();
    Ok(())
}
