use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use turnstile::config::TurnstileConfig;
use turnstile::ratelimit::{RequestContext, Sweeper};
use turnstile::simulate::{self, HandlerKind, RuleKind, SimulationPlan};

/// Turnstile admission control toolkit.
#[derive(Debug, Parser)]
#[command(name = "turnstile", version, about)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Drive a rule with synthetic requests and report the outcome
    Simulate(SimulateArgs),
    /// Print the default rule configuration as YAML
    Defaults,
}

#[derive(Debug, clap::Args)]
struct SimulateArgs {
    #[arg(long, value_enum, default_value = "ip")]
    rule: RuleKind,

    #[arg(long, value_enum, default_value = "default")]
    handler: HandlerKind,

    /// Total number of requests
    #[arg(long, default_value_t = 150)]
    requests: usize,

    /// Number of concurrent callers
    #[arg(long, default_value_t = 1)]
    threads: usize,

    /// Pause between requests on each caller, in milliseconds
    #[arg(long, default_value_t = 0)]
    pause_ms: u64,

    #[arg(long, default_value = "user-1")]
    user_id: String,

    #[arg(long, default_value = "normal")]
    user_level: String,

    #[arg(long, default_value = "order")]
    resource: String,

    #[arg(long, default_value = "GET")]
    method: String,

    #[arg(long, default_value = "127.0.0.1")]
    ip: String,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = TurnstileConfig::default();

    match cli.command {
        Command::Defaults => {
            print!("{}", serde_yaml::to_string(&config)?);
        }
        Command::Simulate(args) => simulate_command(&config, args).await?,
    }

    Ok(())
}

async fn simulate_command(config: &TurnstileConfig, args: SimulateArgs) -> anyhow::Result<()> {
    let plan = SimulationPlan {
        rule: args.rule,
        handler: args.handler,
        requests: args.requests,
        threads: args.threads,
        pause: Duration::from_millis(args.pause_ms),
        context: RequestContext::new(
            args.user_id,
            args.user_level,
            args.resource,
            args.method,
            args.ip,
        ),
    };

    let rule = simulate::build_rule(plan.rule, config)?;
    let sweeper = Sweeper::for_rule(rule.as_ref(), config.sweeper.interval())?;

    info!(rule = rule.name(), requests = plan.requests, threads = plan.threads, "Starting simulation");
    let report = tokio::task::spawn_blocking(move || simulate::run(rule, &plan)).await?;

    sweeper.shutdown().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{:?} rule, {:?} handler: {} requests, {} admitted, {} rejected ({} fallback, {} error) in {} ms",
            report.rule,
            report.handler,
            report.requests,
            report.admitted,
            report.rejected(),
            report.fallbacks,
            report.errors,
            report.elapsed_ms
        );
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
