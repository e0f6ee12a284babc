//! Trialscope — ask questions about clinical trials in plain language.
//!
//! Usage:
//!   trialscope ask "<question>"   Answer one question
//!   trialscope demo               Run the built-in example questions
//!   trialscope repl               Interactive question loop
//!   trialscope tools              Print the tool schemas sent to the model
//!   trialscope init               Write a default config file

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::future::Future;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use trialscope::agent::{Agent, AgentError, AgentSettings};
use trialscope::config::{self, TrialscopeConfig};
use trialscope::inference::InferenceClient;
use trialscope::tools::{self, ToolDispatcher};
use trialscope::trials::TrialsClient;
use trialscope::types::Answer;

/// Questions run by `trialscope demo`.
const DEMO_QUESTIONS: &[&str] = &[
    "How many trials are currently recruiting for diabetes?",
    "What are typical eligibility criteria for Ulcerative Colitis trials?",
    "Which clinical sites in Spain have been used for depression trials?",
    "Show me Phase 3 Asthma trials",
];

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "trialscope")]
#[command(version)]
#[command(about = "Ask questions about ClinicalTrials.gov in plain language")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the config file.
    #[arg(long)]
    config: Option<String>,

    /// Log level (debug, info, warn, error). Defaults to the config value.
    #[arg(long)]
    log_level: Option<String>,

    /// Print each tool call and its result.
    #[arg(long, short)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Answer a single question.
    Ask {
        /// The question, in plain language.
        question: Vec<String>,
    },

    /// Run the built-in example questions.
    Demo,

    /// Read questions from stdin until `quit`.
    Repl,

    /// Print the tool schemas as JSON.
    Tools,

    /// Write a default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A missing .env is fine; the key may come from the shell or the config.
    let _ = dotenvy::dotenv();

    let config_path = cli
        .config
        .as_deref()
        .map(config::resolve_path)
        .unwrap_or_else(config::default_config_path);
    let mut cfg = config::load_config(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    cfg.apply_env();

    // Initialize logging
    let level = cli.log_level.clone().unwrap_or_else(|| cfg.log_level.clone());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Ask { question } => cmd_ask(&cfg, &question.join(" "), cli.verbose).await,
        Commands::Demo => cmd_demo(&cfg, cli.verbose).await,
        Commands::Repl => cmd_repl(&cfg, cli.verbose).await,
        Commands::Tools => cmd_tools(),
        Commands::Init { force } => cmd_init(&cfg, &config_path, force),
    }
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

async fn cmd_ask(cfg: &TrialscopeConfig, question: &str, verbose: bool) -> Result<()> {
    if question.trim().is_empty() {
        anyhow::bail!("Question must not be empty");
    }
    let agent = build_agent(cfg)?;
    let answer = ask_interruptible(&agent, cfg, question).await?;
    print_answer(&answer, verbose);
    Ok(())
}

async fn cmd_demo(cfg: &TrialscopeConfig, verbose: bool) -> Result<()> {
    let agent = build_agent(cfg)?;

    println!("{}", "=".repeat(80));
    println!("{}", "CLINICAL TRIALS AGENT".bold());
    println!("{}", "=".repeat(80));

    for (i, question) in DEMO_QUESTIONS.iter().enumerate() {
        println!();
        println!("{} {}", format!("QUESTION {}:", i + 1).cyan().bold(), question);
        println!("{}", "-".repeat(80));

        match ask_interruptible(&agent, cfg, question).await {
            Ok(answer) => print_answer(&answer, verbose),
            Err(e) if is_cancelled(&e) => return Err(e),
            Err(e) => eprintln!("{} {:#}", "Error:".red().bold(), e),
        }
    }
    Ok(())
}

async fn cmd_repl(cfg: &TrialscopeConfig, verbose: bool) -> Result<()> {
    let agent = build_agent(cfg)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{}", "Interactive mode (type 'quit' to exit)".bold());

    loop {
        print!("\n{} ", "Your question:".green().bold());
        std::io::stdout().flush().ok();

        let Some(line) = next_question(&mut lines, interrupted()).await? else {
            println!();
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question.to_lowercase().as_str(), "quit" | "exit" | "q") {
            break;
        }

        match ask_interruptible(&agent, cfg, question).await {
            Ok(answer) => print_answer(&answer, verbose),
            Err(e) => eprintln!("{} {:#}", "Error:".red().bold(), e),
        }
    }

    info!("Leaving interactive mode");
    Ok(())
}

/// Next line typed at the prompt, or `None` on EOF or when `interrupt`
/// resolves first.
async fn next_question<R, F>(lines: &mut Lines<R>, interrupt: F) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    F: Future<Output = ()>,
{
    tokio::select! {
        line = lines.next_line() => line.context("Failed to read stdin"),
        _ = interrupt => Ok(None),
    }
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn cmd_tools() -> Result<()> {
    let defs = tools::tool_definitions();
    println!(
        "{}",
        serde_json::to_string_pretty(&defs).context("Failed to serialize tool definitions")?
    );
    Ok(())
}

fn cmd_init(cfg: &TrialscopeConfig, path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    // The key stays in the environment rather than on disk.
    let fresh = TrialscopeConfig {
        api_key: String::new(),
        ..cfg.clone()
    };
    config::save_config(&fresh, path)?;
    println!("{} Wrote {}", ">>>".green().bold(), path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Wire the registry client, model client and dispatcher into an agent.
fn build_agent(cfg: &TrialscopeConfig) -> Result<Agent> {
    config::validate(cfg)?;

    let trials = TrialsClient::new(&cfg.registry_url, cfg.http_timeout())
        .context("Failed to build registry client")?;
    let model = InferenceClient::new(&cfg.inference_url, &cfg.api_key, &cfg.model, cfg.http_timeout())
        .context("Failed to build inference client")?
        .with_sampling(cfg.max_tokens, cfg.temperature);

    info!("Using model {} against {}", model.model(), cfg.registry_url);

    Ok(Agent::new(
        Arc::new(model),
        ToolDispatcher::new(Arc::new(trials)),
        AgentSettings::from_config(cfg),
    ))
}

/// Ask a question, cancelling it on Ctrl-C and resubmitting it after a
/// malformed tool call as often as the config allows.
async fn ask_interruptible(
    agent: &Agent,
    cfg: &TrialscopeConfig,
    question: &str,
) -> Result<Answer> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let mut attempt = 0;
    let outcome = loop {
        match agent.ask(question, &cancel).await {
            Err(AgentError::ModelToolCallMalformed(detail))
                if attempt < cfg.resubmit_on_malformed =>
            {
                attempt += 1;
                warn!(
                    "Malformed tool call ({}), resubmitting question ({}/{})",
                    detail, attempt, cfg.resubmit_on_malformed
                );
            }
            other => break other,
        }
    };
    watcher.abort();

    outcome.map_err(|e| {
        error!("Question failed: {}", e);
        anyhow::Error::new(e)
    })
}

fn is_cancelled(e: &anyhow::Error) -> bool {
    matches!(e.downcast_ref::<AgentError>(), Some(AgentError::Cancelled))
}

fn print_answer(answer: &Answer, verbose: bool) {
    if verbose {
        for turn in &answer.turns {
            for (call, result) in turn.tool_calls.iter().zip(&turn.tool_results) {
                let marker = if result.success {
                    "tool".green()
                } else {
                    "tool".red()
                };
                println!("  [{}] {} {}", marker, call.name.bold(), call.arguments);
                let content = result.content.to_string();
                let preview: String = content.chars().take(300).collect();
                println!("         {}", preview.dimmed());
            }
        }
    }
    println!("\n{}\n{}", "ANSWER:".bold(), answer.text);
}
