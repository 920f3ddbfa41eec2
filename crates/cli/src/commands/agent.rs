//! `swarmline agent` — Interactive or single-message session mode.

use std::io::Write;
use std::sync::Arc;
use swarmline_agent::{AgentRuntime, DriveStatus, RuntimeEvent, TurnContext};
use swarmline_config::AppConfig;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Flags for the `agent` command.
pub struct AgentOptions {
    pub agent: Option<String>,
    pub verbose: bool,
    pub detail: bool,
}

/// Providers that run without a key.
const LOCAL_PROVIDERS: &[&str] = &["ollama", "vllm", "llamacpp", "llama.cpp"];

pub async fn run(
    message: Option<String>,
    options: AgentOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() && !LOCAL_PROVIDERS.contains(&config.default_provider.as_str()) {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    SWARMLINE_API_KEY = 'sk-...'   (generic)");
        eprintln!("    OPENAI_API_KEY    = 'sk-...'   (for OpenAI direct)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    if let Some(agent) = options.agent.clone() {
        config.default_agent = Some(agent);
        config.validate()?;
    }

    let runtime = build_runtime(&config)?;

    match message {
        Some(msg) => {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let ctx = TurnContext::new().with_events(tx).detailed(options.detail);
            let verbose = options.verbose;
            let (outcome, ()) = tokio::join!(runtime.submit(&msg, ctx), async move {
                while let Some(event) = rx.recv().await {
                    if verbose && event.is_verbose_only() {
                        eprintln!("{}", render_event(&event).join("\n"));
                    }
                }
            });
            let outcome = outcome?;
            println!("{}", outcome.final_text());
            if let DriveStatus::Failed { message, .. } = &outcome.status {
                return Err(message.clone().into());
            }
        }
        None => interactive(&runtime, &config, &options).await?,
    }

    Ok(())
}

fn build_runtime(config: &AppConfig) -> Result<AgentRuntime, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(config.tool_root())?;
    let providers = swarmline_providers::build_from_config(config);
    let provider = providers.default().ok_or("No default provider configured")?;
    let tools = Arc::new(swarmline_tools::registry_from_config(config));
    Ok(AgentRuntime::from_config(config, provider, tools)?)
}

async fn interactive(
    runtime: &AgentRuntime,
    config: &AppConfig,
    options: &AgentOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let names: Vec<&str> = runtime.agents().iter().map(|a| a.name.as_str()).collect();
    println!();
    println!("  Swarmline — Interactive Session");
    println!();
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", config.default_model);
    println!("  Agents:    {}", names.join(", "));
    println!("  Active:    {}", runtime.active_agent());
    println!("  Tool root: {}", config.tool_root().display());
    println!();
    println!("  Type your message and press Enter. Ctrl+C cancels a running turn.");
    println!("  Commands: /agents, /status, /mail, /switch <agent> [reason], exit");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt(runtime)?;

    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.is_empty() {
            prompt(runtime)?;
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }

        if let Some(command) = input.strip_prefix('/') {
            run_command(runtime, command).await;
        } else {
            turn(runtime, input, options).await;
        }
        prompt(runtime)?;
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

fn prompt(runtime: &AgentRuntime) -> std::io::Result<()> {
    print!("  You ({}) > ", runtime.active_agent());
    std::io::stdout().flush()
}

/// Drive one submission, printing events as they arrive.
async fn turn(runtime: &AgentRuntime, input: &str, options: &AgentOptions) {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let ctx = TurnContext::new()
        .with_events(tx)
        .with_cancel(cancel)
        .detailed(options.detail);
    let verbose = options.verbose;

    println!();
    let (result, ()) = tokio::join!(runtime.submit(input, ctx), async move {
        while let Some(event) = rx.recv().await {
            if verbose || !event.is_verbose_only() {
                for line in render_event(&event) {
                    println!("{line}");
                }
            }
        }
    });
    watcher.abort();

    if let Err(e) = result {
        eprintln!("  [Error] {e}");
    }
    println!();
}

async fn run_command(runtime: &AgentRuntime, command: &str) {
    let mut parts = command.splitn(3, ' ');
    match parts.next().unwrap_or_default() {
        "agents" => {
            let active = runtime.active_agent();
            for profile in runtime.agents() {
                let marker = if profile.name == active { "*" } else { " " };
                println!("  {marker} {} {}", profile.name, profile.role);
            }
        }
        "status" => {
            let status = runtime.status();
            println!("  Active: {} (depth {})", status.active, status.switch_depth);
            println!("  Pending requests: {}", status.pending_requests);
            for agent in status.agents {
                let decision = agent
                    .last_decision
                    .map(|d| format!("{} ({})", d.kind, d.reason))
                    .unwrap_or_else(|| "-".into());
                println!(
                    "  {:<12} unread {:>2}  last decision {decision}",
                    agent.name, agent.unread_mail
                );
            }
        }
        "mail" => {
            let active = runtime.active_agent();
            let mail = runtime.mailbox().all_mail(&active);
            if mail.is_empty() {
                println!("  No mail for {active}.");
            }
            for message in mail {
                for line in message.render().lines() {
                    println!("  {line}");
                }
                println!();
            }
        }
        "switch" => {
            let Some(to) = parts.next() else {
                println!("  Usage: /switch <agent> [reason]");
                return;
            };
            let reason = parts.next().unwrap_or("requested by user");
            match runtime.switch_to(to, reason, None).await {
                Ok(record) => println!("  ({} -> {}: {})", record.from, record.to, record.reason),
                Err(e) => eprintln!("  [Error] {e}"),
            }
        }
        other => println!("  Unknown command: /{other}"),
    }
}

/// Terminal lines for one event.
fn render_event(event: &RuntimeEvent) -> Vec<String> {
    match event {
        RuntimeEvent::Final { agent, content } => {
            content.lines().map(|l| format!("  {agent} > {l}")).collect()
        }
        RuntimeEvent::Commentary { agent, content } => {
            content.lines().map(|l| format!("  [{agent}] {l}")).collect()
        }
        RuntimeEvent::ToolCall {
            agent, name, input, ..
        } => vec![format!("  [{agent}] -> {name} {input}")],
        RuntimeEvent::ToolResult {
            agent,
            name,
            output,
            success,
            ..
        } => {
            let first = output.lines().next().unwrap_or_default();
            let mark = if *success { "<-" } else { "<- FAILED" };
            vec![format!("  [{agent}] {mark} {name}: {first}")]
        }
        RuntimeEvent::Continuation {
            agent,
            iteration,
            decision,
        } => vec![format!(
            "  [{agent}] iteration {iteration}: {} ({})",
            decision.kind, decision.reason
        )],
        RuntimeEvent::Warning { agent, message } => vec![format!("  [{agent}] warning: {message}")],
        RuntimeEvent::Switched { from, to, reason } => {
            vec![format!("  ({from} -> {to}: {reason})")]
        }
        RuntimeEvent::Done { status, iterations, .. } => match status {
            DriveStatus::LoopLimit => vec![format!("  [Stopped after {iterations} iterations]")],
            DriveStatus::Cancelled => vec!["  [Cancelled]".to_string()],
            _ => Vec::new(),
        },
        RuntimeEvent::Error { message, .. } => vec![format!("  [Error] {message}")],
    }
}
