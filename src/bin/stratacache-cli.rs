//! Command-line client for the stratacache batch API.
//!
//! ```text
//! stratacache-cli --cache users get-all --key 1 --key 2
//! stratacache-cli --cache users put-all --entry '1={"name":"a"}'
//! stratacache-cli --cache users evict-all --key 1
//! ```

use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::value::RawValue;
use serde_json::json;
use thiserror::Error;

#[derive(Parser)]
#[command(name = "stratacache-cli")]
#[command(about = "Command-line client for the stratacache batch API")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Server address.
    #[arg(long, default_value = "http://localhost:8080", env = "STRATACACHE_ADDR")]
    addr: String,

    /// Cache name for every key in the batch.
    #[arg(long)]
    cache: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch values for one or more keys.
    GetAll {
        /// Key to fetch (repeatable).
        #[arg(long = "key", required = true)]
        keys: Vec<String>,
    },
    /// Store one or more key=JSON entries.
    PutAll {
        /// Entry in `key=JSON` form (repeatable).
        #[arg(long = "entry", required = true)]
        entries: Vec<String>,
    },
    /// Evict one or more keys from every layer.
    EvictAll {
        /// Key to evict (repeatable).
        #[arg(long = "key", required = true)]
        keys: Vec<String>,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error("invalid entry {entry:?}: expected key=JSON")]
    InvalidEntry { entry: String },

    #[error("invalid JSON for key {key:?}: {source}")]
    InvalidJson {
        key: String,
        source: serde_json::Error,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server error: {0}")]
    Server(String),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("stratacache-cli/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(5))
        .build()?;
    let base = cli.addr.trim_end_matches('/');

    match cli.command {
        Commands::GetAll { keys } => {
            let requests: Vec<_> = keys
                .iter()
                .map(|k| json!({"c": cli.cache, "k": k}))
                .collect();
            let body = post(
                &client,
                &format!("{base}/api/cache/batch/get"),
                json!({"requests": requests}),
            )
            .await?;
            println!("{body}");
        }
        Commands::PutAll { entries } => {
            let mut requests = Vec::with_capacity(entries.len());
            for entry in &entries {
                let (key, value) = parse_entry(entry)?;
                requests.push(json!({"c": cli.cache, "k": key, "v": value}));
            }
            post(
                &client,
                &format!("{base}/api/cache/batch/put"),
                json!({"requests": requests}),
            )
            .await?;
        }
        Commands::EvictAll { keys } => {
            let requests: Vec<_> = keys
                .iter()
                .map(|k| json!({"c": cli.cache, "k": k}))
                .collect();
            post(
                &client,
                &format!("{base}/api/cache/batch/delete"),
                json!({"requests": requests}),
            )
            .await?;
        }
    }
    Ok(())
}

/// Split a `key=JSON` argument and validate the JSON part.
fn parse_entry(entry: &str) -> Result<(&str, Box<RawValue>), CliError> {
    let (key, raw) = entry
        .split_once('=')
        .ok_or_else(|| CliError::InvalidEntry {
            entry: entry.to_string(),
        })?;
    let value =
        RawValue::from_string(raw.to_string()).map_err(|source| CliError::InvalidJson {
            key: key.to_string(),
            source,
        })?;
    Ok((key, value))
}

async fn post(
    client: &reqwest::Client,
    url: &str,
    body: serde_json::Value,
) -> Result<String, CliError> {
    let response = client.post(url).json(&body).send().await?;
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(CliError::Server(format!("{status}: {text}")));
    }
    Ok(text)
}
