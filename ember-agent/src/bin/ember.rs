//! ember -- standalone CLI for exercising the assistant backend.
//!
//! Usage:
//!   cargo run --release --bin ember -- "explain this error"
//!   cargo run --release --bin ember -- --agent "rename the User struct"

use std::io::Write;
use std::time::Instant;

use clap::Parser;
use serde_json::Value;

use ember_agent::api::{
    AgentClient, AgentRequest, ChatRequest, Outcome, ResumeDecision, ResumeRequest, create_stream,
};
use ember_agent::config::Config;
use ember_rpc::StreamEvent;

// ── ANSI colors ──────────────────────────────────────────────────
const CYAN: &str = "\x1b[36m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const DIM: &str = "\x1b[2m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

#[derive(Parser)]
#[command(name = "ember", about = "Send a prompt to the assistant backend")]
struct Cli {
    /// Run in agent mode (multi-step, may pause for approval)
    #[arg(long)]
    agent: bool,

    /// Backend base URL; overrides the configured one
    #[arg(long)]
    backend: Option<String>,

    /// File whose contents are attached as editor context (chat mode)
    #[arg(long)]
    context_file: Option<String>,

    /// The prompt to send
    prompt: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let mut config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{RED}Error:{RESET} could not load configuration: {e}");
            std::process::exit(1);
        }
    };
    if let Some(backend) = &cli.backend {
        config.backend_url = backend.clone();
    }

    let client = AgentClient::new(&config);

    match client.health().await {
        Ok(_) => eprintln!("{CYAN}[backend]{RESET} {} is up", config.backend_url),
        Err(e) => {
            eprintln!("{RED}Error:{RESET} backend at {} is unreachable: {e}", config.backend_url);
            std::process::exit(1);
        }
    }

    let start = Instant::now();
    let mut outcome = if cli.agent {
        run_agent(&client, &cli.prompt).await
    } else {
        run_chat(&client, &cli, &config).await
    };

    // Agent exchanges may pause for approval; keep resuming until terminal.
    loop {
        match outcome {
            Ok(Outcome::Completed { .. }) => {
                eprintln!(
                    "{GREEN}{BOLD}[done]{RESET} finished in {:.1}s",
                    start.elapsed().as_secs_f64(),
                );
                return;
            }
            Ok(Outcome::Stopped) => {
                eprintln!("{YELLOW}[stopped]{RESET}");
                return;
            }
            Ok(Outcome::Interrupted(request)) => {
                eprintln!(
                    "{YELLOW}{BOLD}[approval]{RESET} agent wants to run {BOLD}{}{RESET}",
                    request.action,
                );
                if !request.description.is_empty() {
                    eprintln!("{DIM}{}{RESET}", request.description);
                }
                if !request.args.is_null() {
                    eprintln!("{DIM}{}{RESET}", request.args);
                }
                let decision = if confirm("approve? [y/N] ") {
                    ResumeDecision::Approve
                } else {
                    ResumeDecision::Reject
                };
                let resume = ResumeRequest {
                    session_id: request.session_id.clone(),
                    decision,
                    args: None,
                    feedback: None,
                };
                let (events, printer) = spawn_printer();
                outcome = client.resume(&resume, events, None).await;
                let _ = printer.await;
            }
            Err(e) => {
                eprintln!("{RED}{BOLD}[error]{RESET} {e}");
                std::process::exit(1);
            }
        }
    }
}

async fn run_chat(
    client: &AgentClient,
    cli: &Cli,
    config: &Config,
) -> Result<Outcome, ember_agent::error::ClientError> {
    let mut request = ChatRequest::new(&cli.prompt);
    if let Some(path) = &cli.context_file {
        match std::fs::read_to_string(path) {
            Ok(contents) => request = request.with_context(contents),
            Err(e) => {
                eprintln!("{YELLOW}Warning:{RESET} could not read {path}: {e}");
            }
        }
    }

    eprintln!("{CYAN}[chat]{RESET} sending to {} ({})", config.backend_url, config.provider);
    let (events, printer) = spawn_printer();
    let outcome = client.chat(&request, events, None).await;
    let _ = printer.await;
    outcome
}

async fn run_agent(
    client: &AgentClient,
    prompt: &str,
) -> Result<Outcome, ember_agent::error::ClientError> {
    let cwd = std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let request =
        AgentRequest::new(prompt).with_project_context(serde_json::json!({ "root": cwd }));

    eprintln!("{CYAN}[agent]{RESET} starting task");
    let (events, printer) = spawn_printer();
    let outcome = client.agent(&request, events, None).await;
    let _ = printer.await;
    outcome
}

/// Drain a stream onto the terminal on its own task.
fn spawn_printer() -> (ember_agent::api::EventSender, tokio::task::JoinHandle<()>) {
    let (sender, mut receiver) = create_stream();
    let handle = tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            print_event(&event);
        }
    });
    (sender, handle)
}

fn print_event(event: &StreamEvent) {
    match event {
        StreamEvent::Content { text } => {
            print!("{text}");
            let _ = std::io::stdout().flush();
        }
        StreamEvent::CodeBlock(block) => {
            println!();
            if let Some(hint) = &block.file_hint {
                eprintln!("{CYAN}[code]{RESET} {hint}");
            }
            println!("```{}", block.language);
            println!("{}", block.code);
            println!("```");
        }
        StreamEvent::Status { message } => {
            eprintln!("{DIM}[status] {message}{RESET}");
        }
        StreamEvent::ToolCall { name, args } => {
            if matches!(args, Value::Null) {
                eprintln!("{CYAN}[tool]{RESET} {name}");
            } else {
                eprintln!("{CYAN}[tool]{RESET} {name} {DIM}{args}{RESET}");
            }
        }
        StreamEvent::TodoUpdate(todos) => {
            eprintln!("{CYAN}[plan]{RESET}");
            for todo in todos {
                eprintln!("  {DIM}{:?}{RESET} {}", todo.status, todo.text);
            }
        }
        StreamEvent::Error { message, .. } => {
            eprintln!("{RED}[error]{RESET} {message}");
        }
        // Terminal markers are reported by the outcome handling.
        StreamEvent::Completed { .. } | StreamEvent::Interrupt(_) => {
            println!();
        }
    }
}

fn confirm(prompt: &str) -> bool {
    eprint!("{prompt}");
    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
