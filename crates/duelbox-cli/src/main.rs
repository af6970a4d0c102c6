//! Duelbox CLI
//!
//! A command-line tool for validating and running battle submissions against
//! the configured challenge library.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use duelbox::{
    Arena, Config, EXAMPLE_CONFIG, Event, FailureKind, ResourceLimits, Sandbox, TestStatus,
    validate,
};
use tokio::sync::mpsc;
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "duelbox")]
#[command(about = "A tool for running 1v1 code battle submissions in a sandbox")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: duelbox.toml)
        #[arg(short, long, default_value = "duelbox.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Check a submission against the capability policy without running it
    Check {
        /// Submission file to check
        #[arg(value_name = "FILE")]
        source: PathBuf,
    },

    /// Run a submission against a challenge's hidden tests
    Run {
        /// Submission file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Challenge ID (e.g., palindrome, two_sum)
        #[arg(short = 'C', long)]
        challenge: String,

        /// Wall clock limit in seconds
        #[arg(short, long)]
        time_limit: Option<f64>,

        /// Memory limit in bytes
        #[arg(short, long)]
        memory_limit: Option<u64>,
    },

    /// Run a scripted battle between two submission files
    Duel {
        /// First player's submission file
        #[arg(value_name = "FILE1")]
        player1: PathBuf,

        /// Second player's submission file
        #[arg(value_name = "FILE2")]
        player2: PathBuf,

        /// Challenge ID (e.g., palindrome, two_sum)
        #[arg(short = 'C', long)]
        challenge: String,
    },

    /// List available challenges
    Challenges,

    /// Show the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Load configuration
    let config = if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
        Config::from_file(path).context("failed to load configuration")?
    } else {
        debug!("using default configuration");
        Config::default()
    };

    match cli.command {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Check { source } => run_check(&config, &source).await,
        Commands::Run {
            source,
            challenge,
            time_limit,
            memory_limit,
        } => run_submission(config, &source, &challenge, time_limit, memory_limit).await,
        Commands::Duel {
            player1,
            player2,
            challenge,
        } => run_duel(config, &player1, &player2, &challenge).await,
        Commands::Challenges => {
            list_challenges(&config);
            Ok(())
        }
        Commands::ShowConfig => {
            show_config(&config);
            Ok(())
        }
    }
}

async fn run_check(config: &Config, source: &PathBuf) -> Result<()> {
    let code = tokio::fs::read_to_string(source)
        .await
        .context("failed to read submission file")?;

    match validate(&code, config.max_code_length_bytes) {
        Ok(()) => {
            println!("Submission passes the capability policy");
            Ok(())
        }
        Err(reason) => {
            println!("Submission rejected: {reason}");
            std::process::exit(1);
        }
    }
}

async fn run_submission(
    config: Config,
    source: &PathBuf,
    challenge_id: &str,
    time_limit: Option<f64>,
    memory_limit: Option<u64>,
) -> Result<()> {
    let code = tokio::fs::read_to_string(source)
        .await
        .context("failed to read submission file")?;

    let challenge = config
        .get_challenge(challenge_id)
        .context("unknown challenge")?
        .clone();

    // Only include explicitly-specified values so they don't override
    // per-challenge limits
    let user_limits = ResourceLimits {
        wall_time_limit: time_limit,
        memory_limit,
        ..ResourceLimits::none()
    };
    let has_user_limits = time_limit.is_some() || memory_limit.is_some();
    let limits_ref = if has_user_limits {
        Some(&user_limits)
    } else {
        None
    };

    info!(challenge = %challenge.name, "running submission");

    let sandbox = Sandbox::new(config);
    let result = sandbox
        .execute(&code, &challenge, limits_ref)
        .await
        .context("execution failed")?;

    for outcome in &result.tests {
        match outcome.status {
            TestStatus::Pass => println!("test {:>2}: pass", outcome.index),
            TestStatus::Fail => {
                println!(
                    "test {:>2}: fail (expected {}, got {})",
                    outcome.index,
                    outcome.expected.as_deref().unwrap_or("?"),
                    outcome.got.as_deref().unwrap_or("?"),
                );
            }
            TestStatus::Error => {
                println!("test {:>2}: error", outcome.index);
                if let Some(detail) = &outcome.detail {
                    for line in detail.lines() {
                        println!("         {line}");
                    }
                }
            }
        }
    }

    println!();
    println!("Passed: {}/{}", result.passed, result.total);
    if result.failure.is_failure() {
        println!("Failure: {}", result.failure);
        if let Some(diagnostic) = &result.diagnostic {
            println!("Detail: {diagnostic}");
        }
    }

    // Log timing via tracing (stderr), keeping stdout clean for piping
    info!(
        duration = format_args!("{:.3}s", result.duration.as_secs_f64()),
        failure = %result.failure,
        "run complete"
    );

    if result.failure == FailureKind::None && result.is_full_pass() {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

async fn run_duel(
    config: Config,
    player1: &PathBuf,
    player2: &PathBuf,
    challenge_id: &str,
) -> Result<()> {
    let code1 = tokio::fs::read_to_string(player1)
        .await
        .context("failed to read first submission")?;
    let code2 = tokio::fs::read_to_string(player2)
        .await
        .context("failed to read second submission")?;
    config
        .get_challenge(challenge_id)
        .context("unknown challenge")?;

    let arena = Arena::spawn(config);
    let (tx1, mut rx1) = mpsc::unbounded_channel();
    let (tx2, _rx2) = mpsc::unbounded_channel();
    arena.register("player1", &display_name(player1), 1000, tx1);
    arena.register("player2", &display_name(player2), 1000, tx2);
    arena.join_queue("player1", challenge_id);
    arena.join_queue("player2", challenge_id);

    // Both submission results are broadcast to each side, so one channel
    // sees the whole battle
    let room_id = loop {
        match next_event(&mut rx1).await? {
            Event::Matched {
                room_id,
                challenge,
                opponent,
                ..
            } => {
                println!(
                    "Matched on '{}' against {} ({} tests)",
                    challenge.name, opponent.display_name, challenge.test_count
                );
                break room_id;
            }
            _ => continue,
        }
    };

    arena.submit("player1", &room_id, &code1);
    arena.submit("player2", &room_id, &code2);

    let mut fell_short = 0;
    loop {
        match next_event(&mut rx1).await? {
            Event::SubmissionResult {
                identity,
                passed,
                total,
                failure,
                ..
            } => {
                match failure {
                    Some(failure) => println!("{identity}: {passed}/{total} ({failure})"),
                    None => println!("{identity}: {passed}/{total}"),
                }
                // A full pass is followed by the completion broadcast;
                // two shortfalls mean nobody is winning this round
                if total == 0 || passed < total {
                    fell_short += 1;
                    if fell_short == 2 {
                        println!();
                        println!("No winner: neither submission passed every test");
                        return Ok(());
                    }
                }
            }
            Event::BattleComplete {
                winner_display_name,
                loser_display_name,
                ..
            } => {
                println!();
                println!("{winner_display_name} defeats {loser_display_name}");
                return Ok(());
            }
            _ => continue,
        }
    }
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Result<Event> {
    tokio::time::timeout(std::time::Duration::from_secs(60), rx.recv())
        .await
        .context("timed out waiting for the battle to progress")?
        .context("arena closed the event channel")
}

fn display_name(path: &PathBuf) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "player".to_string())
}

fn list_challenges(config: &Config) {
    println!("Available challenges:\n");

    let mut challenges: Vec<_> = config.challenges.iter().collect();
    challenges.sort_by_key(|(id, _)| *id);

    for (id, challenge) in challenges {
        println!(
            "  {:<15} {} ({}, {} tests)",
            id,
            challenge.name,
            challenge.difficulty,
            challenge.test_count()
        );
    }
}

fn show_config(config: &Config) {
    println!("Execution limits:");
    println!("  Timeout: {}s", config.execution_timeout_seconds);
    println!("  Memory: {} bytes", config.memory_limit_bytes);
    println!("  Max code length: {} bytes", config.max_code_length_bytes);
    println!("  Max output: {} bytes", config.max_output_bytes);
    println!(
        "  Concurrent executions: {}",
        config.max_concurrent_executions
    );
    println!();
    println!("Matchmaking:");
    println!("  Rating tolerance: {}", config.rating_tolerance);
    println!("  Queue expiry: {}s", config.queue_expiry_seconds);
    println!("  Disconnect grace: {}s", config.disconnect_grace_seconds);
    println!("  Room retention: {}s", config.room_retention_seconds);
    println!();
    println!("Python interpreter: {}", config.python_binary().display());
    println!();
    println!("Challenges configured: {}", config.challenges.len());
}

async fn init_config(output: &PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
