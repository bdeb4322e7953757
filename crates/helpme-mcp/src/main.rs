use anyhow::Result;
use clap::{Parser, Subcommand};
use helpme_core::{Error, ResultEnvelope};
use helpme_mcp::capabilities::Assistant;
use helpme_mcp::config::{self, AssistantConfig};
use helpme_mcp::guard::SessionGuard;
use helpme_mcp::supersede::TaskSlot;
use helpme_mcp::envelope::{payload_for, SCHEMA_VERSION};
use helpme_mcp::{descriptors, logging};
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;

#[derive(Parser, Debug)]
#[command(name = "helpme")]
#[command(about = "Voice assistant capabilities (MCP stdio server + CLI)", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as an MCP stdio server for the conversational agent.
    #[cfg(feature = "stdio")]
    McpStdio,
    /// Invoke one capability and print its result.
    Call(CallCmd),
    /// Interactive mode: each line is `<capability> [json args]`.
    ///
    /// A new line interrupts the request still running, the way a user talking over the
    /// assistant would.
    Repl,
    /// List capabilities and their trigger phrases (json).
    Capabilities,
    /// Report configuration (json; no secrets).
    Doctor,
    /// Print version info.
    Version(VersionCmd),
}

impl Commands {
    /// Commands that serve capabilities also log to the rolling file.
    fn logs_to_file(&self) -> bool {
        match self {
            #[cfg(feature = "stdio")]
            Self::McpStdio => true,
            Self::Call(_) | Self::Repl => true,
            Self::Capabilities | Self::Doctor | Self::Version(_) => false,
        }
    }
}

#[derive(clap::Args, Debug)]
struct CallCmd {
    /// Capability name, e.g. `web_search` (see `helpme capabilities`).
    capability: String,
    /// Arguments as a JSON object, or `@path` to read them from a file.
    #[arg(long)]
    args: Option<String>,
    /// Output format: json (default) or text (speech only).
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json (default) or text.
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

fn parse_call_args(raw: Option<&str>) -> Result<serde_json::Value, Error> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(serde_json::Value::Null);
    };
    let text = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidArgument(format!("couldn't read {path}: {e}")))?,
        None => raw.to_string(),
    };
    serde_json::from_str(&text).map_err(|e| Error::InvalidArgument(format!("--args is not JSON: {e}")))
}

/// `web_search {"topic": "rust"}` -> name and args.
fn parse_repl_line(line: &str) -> (&str, Result<serde_json::Value, Error>) {
    let line = line.trim();
    match line.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, parse_call_args(Some(rest))),
        None => (line, Ok(serde_json::Value::Null)),
    }
}

async fn run_repl(assistant: Arc<Assistant>) -> Result<()> {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut slot: TaskSlot<()> = TaskSlot::new();
    eprintln!("helpme repl: `<capability> [json args]`, `quit` to exit");
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        if line == "quit" || line == "exit" {
            break;
        }
        if slot.is_running() {
            tracing::info!("new request interrupts the one in flight");
        }
        let a = assistant.clone();
        slot.start(async move {
            let (name, args) = parse_repl_line(&line);
            let env = match args {
                Ok(args) => a.invoke(name, args).await,
                Err(e) => ResultEnvelope::from_error(&e),
            };
            println!("{}", env.speech_text());
        })
        .await;
    }
    slot.join().await;
    Ok(())
}

fn doctor(cfg: &AssistantConfig, t0: std::time::Instant) -> serde_json::Value {
    let grabber = helpme_local::screen::Grabber::detect();
    let node = helpme_local::shellout::has("node");
    let checks = vec![
        serde_json::json!({
            "name": "screen_capture",
            "ok": grabber.is_some(),
            "tool": grabber.map(|g| g.binary()),
            "hint": if grabber.is_some() { "" } else { "Install grim, scrot or ImageMagick (import) for explain_screen." },
        }),
        serde_json::json!({
            "name": "headless_browser",
            "ok": node,
            "hint": if node { "" } else { "Install Node.js and playwright for the screenshot fallback." },
        }),
    ];
    serde_json::json!({
        "schema_version": SCHEMA_VERSION,
        "kind": "doctor",
        "ok": true,
        "name": "helpme",
        "version": env!("CARGO_PKG_VERSION"),
        "elapsed_ms": t0.elapsed().as_millis(),
        "features": { "stdio": cfg!(feature = "stdio") },
        "configured": {
            "services": AssistantConfig::configured_report(),
            "search_provider": cfg.search_provider,
            "timezone": cfg.reference_zone.label(),
            "lock_file": cfg.lock_file.display().to_string(),
            "log_dir": cfg.log_dir.as_ref().map(|d| d.display().to_string()),
        },
        "checks": checks,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Opt-in; never overrides explicit process env.
    config::load_env_file_from_env();

    let cli = Cli::parse();
    let (cfg, warnings) = AssistantConfig::from_env();
    let _log = logging::init(if cli.command.logs_to_file() {
        cfg.log_dir.as_deref()
    } else {
        None
    });
    for w in &warnings {
        w.log();
    }

    match cli.command {
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "kind": "version",
                "ok": true,
                "name": "helpme",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("helpme {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{v}"),
            }
        }
        Commands::Capabilities => {
            let v = serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "kind": "capabilities",
                "ok": true,
                "capabilities": descriptors::ALL,
            });
            println!("{v}");
        }
        Commands::Doctor => {
            let t0 = std::time::Instant::now();
            println!("{}", doctor(&cfg, t0));
        }
        Commands::Call(args) => {
            let assistant = Assistant::from_config(&cfg)?;
            let t0 = std::time::Instant::now();
            let env = match parse_call_args(args.args.as_deref()) {
                Ok(v) => assistant.invoke(&args.capability, v).await,
                Err(e) => ResultEnvelope::from_error(&e),
            };
            let elapsed = t0.elapsed().as_millis();
            assistant.shutdown().await;
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("{}", env.speech_text()),
                _ => println!("{}", payload_for(&args.capability, &env, elapsed)),
            }
        }
        Commands::Repl => {
            let _guard = SessionGuard::acquire(&cfg.lock_file)?;
            let assistant = Arc::new(Assistant::from_config(&cfg)?);
            let res = run_repl(assistant.clone()).await;
            assistant.shutdown().await;
            res?;
        }
        #[cfg(feature = "stdio")]
        Commands::McpStdio => {
            let _guard = SessionGuard::acquire(&cfg.lock_file)?;
            let assistant = Arc::new(Assistant::from_config(&cfg)?);
            tracing::info!(lock = %cfg.lock_file.display(), "starting mcp stdio server");
            let res = helpme_mcp::mcp::serve_stdio(assistant.clone()).await;
            assistant.shutdown().await;
            res.map_err(|e| anyhow::anyhow!(e.to_string()))?;
        }
    }
    Ok(())
}
