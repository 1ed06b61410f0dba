mod script;
mod sim;
mod theme;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use botpilot_core::config::Config;
use botpilot_core::logging::{self, LogConfig};
use botpilot_core::tasks::{
    GOAL_LABEL, GatedTask, RunOptions, TaskManager, TaskOutcome, format_outcome, format_snapshot,
    goal_task,
};
use botpilot_core::{Agent, ExecStatus};
use clap::{ArgAction, Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::script::{Action, Script, WalkSpec};
use crate::sim::SimBot;

// ── CLI ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(
    name = "botpilot",
    version,
    about = "Replay scripted bot commands through the task manager"
)]
struct Cli {
    /// Path to a config.toml file
    #[arg(
        short = 'c',
        long,
        value_name = "PATH",
        env = "BOTPILOT_CONFIG",
        global = true
    )]
    config: Option<PathBuf>,

    /// Disable coloured terminal output
    #[arg(long = "no-color", action = ArgAction::SetTrue, env = "NO_COLOR", global = true)]
    no_color: bool,

    /// Verbose logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Replay a command script against a simulated bot
    Run {
        /// Script file (TOML)
        #[arg(value_name = "SCRIPT")]
        script: PathBuf,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    theme::init_color(cli.no_color);
    let config = Config::load(cli.config.clone()).context("failed to load configuration")?;
    let log_config = if cli.verbose {
        LogConfig::debug()
    } else {
        config.log_config()
    };
    logging::init(&log_config).context("failed to initialise logging")?;

    match cli.command {
        Commands::Run { script } => {
            let script = Script::load(&script)?;
            replay(&config, script).await
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

// ── Replay ──────────────────────────────────────────────────────────────────

async fn replay(config: &Config, script: Script) -> Result<()> {
    let bot = SimBot::new();
    let agent: Arc<dyn Agent> = bot.clone();
    let manager = TaskManager::new(agent.clone(), config.scheduler.clone());
    let started = Instant::now();

    let printer = tokio::spawn({
        let mut events = manager.subscribe();
        async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        println!("{}", theme::event_line(started.elapsed().as_millis(), &event))
                    }
                    Err(RecvError::Lagged(missed)) => warn!(missed, "Event printer fell behind"),
                    Err(RecvError::Closed) => break,
                }
            }
        }
    });

    info!(commands = script.commands.len(), "Replaying script");
    let mut running = JoinSet::new();
    for command in script.commands {
        tokio::time::sleep_until(started + Duration::from_millis(command.at_ms)).await;
        match command.action {
            Action::Run(spec) => {
                let label = spec.label.clone();
                let manager = manager.clone();
                let bot = bot.clone();
                running.spawn(async move {
                    let opts = run_options(&spec);
                    let outcome = manager
                        .run_task(
                            label.clone(),
                            move || {
                                let bot = bot.clone();
                                let skills = sim::skills().bind(bot.clone());
                                sim::walk(bot, skills, spec.clone())
                            },
                            opts,
                        )
                        .await;
                    (label, outcome)
                });
            }
            Action::Gated(spec) => {
                let label = spec.label.clone();
                let timeout = run_options(&spec).timeout;
                let task = Arc::new(GatedTask::restartable(
                    label.clone(),
                    sim::skills().bind(bot.clone()),
                    {
                        let bot = bot.clone();
                        move |skills| sim::walk(bot, skills, spec)
                    },
                ));
                let manager = manager.clone();
                running.spawn(async move { (label, manager.run(task, timeout).await) });
            }
            Action::Goal { prompt, turns } => {
                bot.prompter().set_turns(turns);
                let task = Arc::new(goal_task(&agent, prompt));
                let manager = manager.clone();
                running.spawn(async move { (GOAL_LABEL.to_string(), manager.run(task, None).await) });
            }
            Action::Stop => report_status("stop", manager.stop().await),
            Action::Start => report_status("start", manager.start().await),
            Action::Resume => {
                let manager = manager.clone();
                running.spawn(async move { ("resume".to_string(), manager.resume_task().await) });
            }
            Action::CancelResume => manager.cancel_resume(),
        }
    }

    while let Some(joined) = running.join_next().await {
        let (label, outcome) = joined.context("task runner panicked")?;
        print_outcome(&label, &outcome);
    }

    // Let the printer catch up with the last events.
    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("{} {}", theme::muted("queue:"), format_snapshot(&manager.snapshot()));
    println!("{} x={}", theme::muted("bot position:"), bot.position());
    printer.abort();
    Ok(())
}

fn run_options(spec: &WalkSpec) -> RunOptions {
    let mut opts = match spec.timeout_mins {
        Some(mins) => RunOptions::timeout_mins(mins),
        None => RunOptions::default(),
    };
    opts.resume = spec.resume;
    opts
}

fn report_status(command: &str, status: ExecStatus) {
    let line = format!("{command}: {status}");
    if status.is_fatal() {
        println!("{}", theme::error(&line));
    } else {
        println!("{}", theme::muted(&line));
    }
}

fn print_outcome(label: &str, outcome: &TaskOutcome) {
    let line = format_outcome(label, outcome);
    if outcome.success {
        println!("{}", theme::success(&line));
    } else {
        println!("{}", theme::warn(&line));
    }
}
