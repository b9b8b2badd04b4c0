mod config;
mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use authority::{Authority, Intent, IssueRequest, PlaceCallback};
use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use policy::{ActionType, Subject};
use protocol::{IntentRelay, ServerOptions};
use serde_json::json;
use storage::{AuditEvent, AuditKind, AuditLog};
use tracing_subscriber::EnvFilter;

use config::Config;
use error::{Error, Result};

const CONFIG_FILE: &str = "capgate.toml";

#[derive(Parser)]
#[command(name = "capgate")]
#[command(about = "Capability authorization service for CRM actions", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: ./capgate.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the capability API as JSON-RPC on stdin/stdout
    Serve,
    /// Walk through issuance and consumption in-process
    Demo,
    /// Show the audit trail
    Audit {
        /// Only events for this capability
        #[arg(long)]
        capability: Option<String>,
        /// Filter by event kind (issued, denied, consumed, rejected)
        #[arg(short, long)]
        kind: Option<String>,
        /// Show only the last N events
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_logging(&config);

    match cli.command {
        Some(Commands::Serve) | None => cmd_serve(config).await,
        Some(Commands::Demo) => cmd_demo(config).await,
        Some(Commands::Audit {
            capability,
            kind,
            limit,
        }) => cmd_audit(&config, capability.as_deref(), kind.as_deref(), limit),
    }
}

/// An explicit path must exist; the default file is optional.
fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Ok(Config::load(path)?),
        None if Path::new(CONFIG_FILE).exists() => Ok(Config::load(CONFIG_FILE)?),
        None => Ok(Config::default()),
    }
}

/// Logs go to stderr; stdout belongs to the protocol.
fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log.filter.as_deref().unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn cmd_serve(config: Config) -> Result<()> {
    let audit_path = audit_path(&config);
    if let Some(dir) = audit_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let audit = AuditLog::open(&audit_path)?;

    let authority = Authority::builder(config.policy)
        .config(config.authority.clone())
        .handler(PlaceCallback)
        .audit(audit)
        .build()?;

    let purge_interval = match config.authority.purge_interval_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };
    tracing::info!(
        audit = %audit_path.display(),
        ttl_secs = config.authority.ttl_secs,
        "capgate serving on stdio"
    );

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    protocol::serve(
        Arc::new(authority),
        stdin,
        tokio::io::stdout(),
        ServerOptions { purge_interval },
    )
    .await?;

    tracing::info!("stdin closed, shutting down");
    Ok(())
}

async fn cmd_demo(config: Config) -> Result<()> {
    println!("capgate v{} demo\n", env!("CARGO_PKG_VERSION"));

    let authority = Authority::builder(config.policy)
        .config(config.authority)
        .handler(PlaceCallback)
        .audit(AuditLog::in_memory()?)
        .build()?;

    // Module A publishes an intent; module B publishes noise.
    let relay = IntentRelay::default();
    let mut listener = relay.subscribe();
    relay.publish(json!({"source": "mf-b", "payload": {"filter": "vip"}}));
    relay.publish(json!({
        "correlationId": "demo-1",
        "source": "mf-a",
        "clientId": "C-105",
        "phone": "+79001234567",
    }));
    drop(relay);

    let Some(relayed) = listener.next_intent().await else {
        println!("no intent received");
        return Ok(());
    };
    let source = relayed.source.unwrap_or_else(|| "unknown".to_string());
    println!(
        "relay: intent for {} ({}) from {source}",
        relayed.intent.client_id, relayed.intent.phone
    );

    let operator = Subject::operator("operator-1");
    let callback = ActionType::callback();
    let intent = relayed.intent;

    let token = authority.issue(&operator, &IssueRequest::callback(intent.clone(), &source));
    show("issue (operator)", &token);
    let Ok(token) = token else {
        return Ok(());
    };
    println!("  token {} expires in {}s", token.capability_id, token.expires_in_seconds);

    let first = authority.consume(&operator, &token.capability_id, &callback, &intent);
    show("callback", &first);
    if let Ok(receipt) = &first {
        println!("  action id {}", receipt.action_id);
    }
    show(
        "callback again",
        &authority.consume(&operator, &token.capability_id, &callback, &intent),
    );

    if let Ok(second) = authority.issue(&operator, &IssueRequest::callback(intent.clone(), &source)) {
        let tampered = Intent::new(intent.client_id.clone(), "+79990000000");
        show(
            "callback with another phone",
            &authority.consume(&operator, &second.capability_id, &callback, &tampered),
        );
    }

    show(
        "issue (trainee)",
        &authority.issue(
            &Subject::trainee("trainee-1"),
            &IssueRequest::callback(intent.clone(), &source),
        ),
    );
    show(
        "issue (client C-999)",
        &authority.issue(
            &Subject::operator("operator-2"),
            &IssueRequest::callback(Intent::new("C-999", intent.phone.clone()), &source),
        ),
    );

    if let Some(log) = authority.audit_log() {
        println!("\nAudit trail:");
        for event in log.recent(None, 50)? {
            print_event(&event);
        }
    }
    Ok(())
}

fn show<T>(label: &str, outcome: &authority::Result<T>) {
    match outcome {
        Ok(_) => println!("{label}: OK"),
        Err(e) => println!("{label}: {} ({e})", e.reason_code()),
    }
}

fn cmd_audit(
    config: &Config,
    capability: Option<&str>,
    kind: Option<&str>,
    limit: usize,
) -> Result<()> {
    let path = audit_path(config);
    if !path.exists() {
        return Err(Error::AuditNotFound { path });
    }
    let log = AuditLog::open(&path)?;

    let events = match capability {
        Some(id) => log
            .for_capability(id)?
            .into_iter()
            .filter(|e| kind.is_none_or(|k| e.kind.name() == k))
            .collect(),
        None => log.recent(kind, limit)?,
    };

    if events.is_empty() {
        println!("No audit events found.");
        return Ok(());
    }
    for event in &events {
        print_event(event);
    }
    Ok(())
}

fn print_event(event: &AuditEvent) {
    let time = Local
        .from_utc_datetime(&event.timestamp.naive_utc())
        .format("%Y-%m-%d %H:%M:%S");

    match &event.kind {
        AuditKind::Issued {
            capability_id,
            user_id,
            role,
            client_id,
            source_module,
            ..
        } => {
            println!("[{time}] ISSUED   {capability_id} to {user_id} ({role}) for {client_id} via {source_module}");
        }
        AuditKind::Denied {
            user_id,
            role,
            client_id,
            reason,
        } => {
            println!("[{time}] DENIED   {user_id} ({role}) for {client_id}: {reason}");
        }
        AuditKind::Consumed {
            capability_id,
            user_id,
            action_id,
            ..
        } => {
            println!("[{time}] CONSUMED {capability_id} by {user_id} -> {action_id}");
        }
        AuditKind::Rejected {
            capability_id,
            user_id,
            reason,
        } => {
            println!("[{time}] REJECTED {capability_id} by {user_id}: {reason}");
        }
    }
}

fn audit_path(config: &Config) -> PathBuf {
    config.audit.path.clone().unwrap_or_else(|| {
        dirs_data_dir()
            .unwrap_or_else(|| ".capgate".into())
            .join("audit.db")
    })
}

fn dirs_data_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share/capgate"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))
            .map(|p| p.join("capgate"))
    }
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|h| PathBuf::from(h).join("capgate"))
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        None
    }
}
