use std::io::Read;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Client;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "snipvault", about = "Encrypted, self-expiring text snippets", version)]
struct Cli {
    /// snipvault server URL (default: http://localhost:5002 or $SNIPVAULT_SERVER)
    #[arg(long, env = "SNIPVAULT_SERVER", default_value = "http://localhost:5002")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the snipvault HTTP server
    Serve {
        /// Port to listen on (default: $SNIPVAULT_PORT or 5002)
        #[arg(long, env = "SNIPVAULT_PORT", default_value = "5002")]
        port: u16,
        /// Host to bind (default: $SNIPVAULT_HOST or 0.0.0.0)
        #[arg(long, env = "SNIPVAULT_HOST", default_value = "0.0.0.0")]
        host: String,
    },
    /// Store a snippet and print its id
    Create {
        /// Snippet text, or `-` to read it from stdin
        #[arg(value_name = "TEXT")]
        text: String,
        /// Lifetime e.g. 30s, 1h, 7d (server default: 24h)
        #[arg(long)]
        ttl: Option<String>,
    },
    /// Fetch a snippet by id
    Get {
        /// Snippet id
        id: String,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; a malformed one is reported.
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(e).context("load .env");
        }
    }

    let cli = Cli::parse();

    let default_level = match cli.command {
        Commands::Serve { .. } => "info",
        _ => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("SNIPVAULT_LOG").unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Serve { port, host } => cmd_serve(host, port).await,
        Commands::Create { text, ttl } => cmd_create(&cli.server, &text, ttl.as_deref()).await,
        Commands::Get { id } => cmd_get(&cli.server, &id).await,
    }
}

// ── Command implementations ───────────────────────────────────────────────────

async fn cmd_serve(host: String, port: u16) -> Result<()> {
    let cfg = snipvault_server::ServerConfig {
        host,
        port,
        ..Default::default()
    };
    snipvault_server::run(cfg).await
}

async fn cmd_create(server: &str, text: &str, ttl: Option<&str>) -> Result<()> {
    let expiration_seconds = ttl.map(parse_duration).transpose()?;

    let text = if text == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("read snippet from stdin")?;
        buf
    } else {
        text.to_owned()
    };

    let body = serde_json::json!({
        "text": text,
        "expiration_seconds": expiration_seconds,
    });

    let resp = Client::new()
        .post(format!("{}/api/snippets", server.trim_end_matches('/')))
        .json(&body)
        .send()
        .await
        .context("HTTP request failed")?;

    let status = resp.status();
    let json: Value = resp.json().await.context("parse response")?;

    if !status.is_success() {
        let error = json["error"].as_str().unwrap_or("unknown error");
        anyhow::bail!("server returned {status}: {error}");
    }

    let id = json["id"].as_str().context("response is missing the snippet id")?;
    println!("{id}");
    eprintln!(
        "expires {} ({})",
        json["expiration_time"].as_str().unwrap_or("?"),
        json["timezone"].as_str().unwrap_or("?")
    );
    eprintln!("{}", share_url(server, id));
    Ok(())
}

async fn cmd_get(server: &str, id: &str) -> Result<()> {
    let resp = Client::new()
        .get(share_url(server, id))
        .send()
        .await
        .context("HTTP request failed")?;

    let status = resp.status();
    let json: Value = resp.json().await.context("parse response")?;

    if status.is_success() {
        let text = json["text"].as_str().unwrap_or("");
        println!("{text}");
    } else {
        let error = json["error"].as_str().unwrap_or("unknown error");
        anyhow::bail!("{error}");
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Parse human duration strings like "1h", "30m", "7d", "5s" into seconds.
fn parse_duration(s: &str) -> Result<u64> {
    let d: humantime::Duration = s
        .parse()
        .with_context(|| format!("invalid duration: {s}"))?;
    Ok(d.as_secs())
}

fn share_url(server: &str, id: &str) -> String {
    format!("{}/api/snippets/{}", server.trim_end_matches('/'), id)
}
