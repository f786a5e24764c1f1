use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::{Value, json};
use std::time::Instant;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "tiercache-cli")]
#[command(about = "Tiercache CLI - inspect and manage a running cache server", long_about = None)]
struct Args {
    /// Server host
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short = 'p', long, default_value = "15600")]
    port: u16,

    /// Print raw JSON responses
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the server is up
    Health,
    /// Show hit/miss counters and per-tier key counts
    Stats,
    /// Drop cached results of one operation
    Invalidate {
        operation: String,
        /// Limit to one tier (hot, warm, cold)
        #[arg(short, long)]
        tier: Option<String>,
    },
    /// Flush one tier or the whole cache
    Clear {
        #[arg(short, long)]
        tier: Option<String>,
    },
    /// Run an operation through the caching proxy
    Call {
        operation: String,
        #[arg(short, long, default_value = "hot")]
        tier: String,
        /// JSON payload sent to the upstream
        #[arg(long, default_value = "{}")]
        payload: String,
    },
}

struct TiercacheClient {
    base_url: String,
    client: reqwest::Client,
}

impl TiercacheClient {
    fn new(host: &str, port: u16) -> Self {
        Self {
            base_url: format!("http://{}:{}", host, port),
            client: reqwest::Client::new(),
        }
    }

    async fn get(&self, path: &str) -> Result<(Option<String>, Value)> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("cannot reach {}", self.base_url))?;
        Self::decode(res).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<(Option<String>, Value)> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);
        let res = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("cannot reach {}", self.base_url))?;
        Self::decode(res).await
    }

    /// Split a response into its x-cache header and JSON body, turning
    /// error bodies into errors
    async fn decode(res: reqwest::Response) -> Result<(Option<String>, Value)> {
        let status = res.status();
        let cache_status = res
            .headers()
            .get("x-cache")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = res.text().await.context("failed to read response body")?;

        Ok((cache_status, parse_body(status, &text)?))
    }

    async fn execute(&self, command: &Command, raw: bool) -> Result<String> {
        let start = Instant::now();

        let (cache_status, body) = match command {
            Command::Health => self.get("/health").await?,
            Command::Stats => self.get("/cache/stats").await?,
            Command::Invalidate { operation, tier } => {
                self.post(
                    "/cache/invalidate",
                    &json!({"operation": operation, "tier": tier}),
                )
                .await?
            }
            Command::Clear { tier } => self.post("/cache/clear", &json!({"tier": tier})).await?,
            Command::Call {
                operation,
                tier,
                payload,
            } => {
                let payload: Value =
                    serde_json::from_str(payload).context("--payload must be valid JSON")?;
                self.post(
                    &format!("/cache/call/{}", operation),
                    &json!({"tier": tier, "payload": payload}),
                )
                .await?
            }
        };

        let output = if raw {
            serde_json::to_string_pretty(&body)?
        } else {
            match command {
                Command::Health => format_health(&body),
                Command::Stats => format_stats(&body),
                Command::Invalidate { .. } | Command::Clear { .. } => format_removal(&body),
                Command::Call { .. } => format_call(cache_status.as_deref(), &body)?,
            }
        };

        let elapsed = start.elapsed();
        Ok(format!(
            "{}\n{}",
            output,
            format!("({:.2?})", elapsed).dimmed()
        ))
    }
}

/// Decode a response body, keeping the status for errors whose body is not JSON
fn parse_body(status: reqwest::StatusCode, text: &str) -> Result<Value> {
    let body = serde_json::from_str::<Value>(text);

    if !status.is_success() {
        let message = match &body {
            Ok(body) => body["error"].as_str().unwrap_or("Unknown").to_string(),
            Err(_) if text.trim().is_empty() => "Unknown".to_string(),
            Err(_) => text.trim().to_string(),
        };
        return Err(anyhow::anyhow!("Error ({}): {}", status.as_u16(), message));
    }

    body.context("invalid JSON response")
}

fn format_health(body: &Value) -> String {
    format!(
        "{} {} v{}",
        "PONG".green(),
        body["service"].as_str().unwrap_or("tiercache"),
        body["version"].as_str().unwrap_or("?")
    )
}

fn format_stats(body: &Value) -> String {
    let mut lines = vec![
        format!("{} {}", "hits:".bold(), body["hits"]),
        format!("{} {}", "misses:".bold(), body["misses"]),
        format!("{} {}", "errors:".bold(), body["errors"]),
        format!(
            "{} {}",
            "hit rate:".bold(),
            body["hit_rate"].as_str().unwrap_or("0.00%").cyan()
        ),
        format!(
            "{} ${:.2}",
            "est. saved:".bold(),
            body["estimated_cost_saved"].as_f64().unwrap_or(0.0)
        ),
    ];

    if let Some(tiers) = body["tiers"].as_object() {
        for (name, tier) in tiers {
            lines.push(format!(
                "  {:<5} keys={} ttl={}s",
                name.yellow(),
                tier["keys"],
                tier["ttl_secs"]
            ));
        }
    }

    lines.join("\n")
}

fn format_removal(body: &Value) -> String {
    let mut lines = vec![format!("(integer) {}", body["total"])];
    if let Some(removed) = body["removed"].as_object() {
        for (tier, count) in removed {
            lines.push(format!("  {} {}", tier.yellow(), count).dimmed().to_string());
        }
    }
    lines.join("\n")
}

fn format_call(cache_status: Option<&str>, body: &Value) -> Result<String> {
    let label = match cache_status {
        Some("hit") => "HIT".green(),
        Some("miss") => "MISS".yellow(),
        _ => "?".dimmed(),
    };
    Ok(format!("[{}]\n{}", label, serde_json::to_string_pretty(body)?))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let client = TiercacheClient::new(&args.host, args.port);

    match client.execute(&args.command, args.json).await {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", format!("{:#}", e).red());
            std::process::exit(1);
        }
    }
}
