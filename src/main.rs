//! Mock Validate - CLI Entry Point
//!
//! Loads stubs from YAML and replays recorded requests against them.

use anyhow::{Context, Result};
use clap::Parser;
use mock_validate::request::InterceptedRequest;
use mock_validate::{MockResponse, MockServerConfig};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "mock-validate",
    about = "Validate requests against mocked HTTP endpoints",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "mock-validate.yaml")]
    config: PathBuf,

    /// JSON array of recorded requests to replay
    #[arg(short, long)]
    requests: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print default configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

/// One request from the replay file.
#[derive(Debug, Deserialize)]
struct RecordedRequest {
    #[serde(default = "default_method")]
    method: String,
    url: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    /// Strings are sent as-is, anything else as JSON
    #[serde(default)]
    body: Option<Value>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl RecordedRequest {
    fn into_request(self) -> Result<InterceptedRequest> {
        let mut request = InterceptedRequest::new(&self.method, &self.url)?;
        let has_content_type = self
            .headers
            .keys()
            .any(|name| name.eq_ignore_ascii_case("content-type"));

        for (name, value) in self.headers {
            request = request.with_header(name, value);
        }

        request = match self.body {
            None => request,
            Some(Value::String(text)) => request.with_body(text),
            Some(value) if has_content_type => request.with_body(value.to_string()),
            Some(value) => request.with_json(&value),
        };
        Ok(request)
    }
}

fn describe(url: &str, response: Option<&MockResponse>) -> Value {
    let Some(response) = response else {
        return json!({"url": url, "handled": false});
    };

    let headers: BTreeMap<_, _> = response.headers.iter().cloned().collect();
    let body = response
        .json_body()
        .unwrap_or_else(|| Value::String(response.text_body()));
    json!({
        "url": url,
        "handled": true,
        "status": response.status,
        "headers": headers,
        "body": body,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Print default config if requested
    if args.print_config {
        let default_config = include_str!("../demos/default-config.yaml");
        println!("{}", default_config);
        return Ok(());
    }

    // Load configuration
    let config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        MockServerConfig::from_file(&args.config)?
    } else if args.validate || args.requests.is_some() {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    } else {
        info!("Using default configuration (no stubs)");
        MockServerConfig::default()
    };

    // Validate and exit if requested
    if args.validate {
        config.validate()?;
        println!(
            "Configuration is valid ({} stubs defined)",
            config.stubs.len()
        );
        return Ok(());
    }

    let server = config.build_server()?;
    info!(stubs = config.stubs.len(), "Mock handlers registered");

    let Some(path) = args.requests else {
        return Ok(());
    };

    let content = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read requests file {:?}", path))?;
    let recorded: Vec<RecordedRequest> =
        serde_json::from_str(&content).context("Requests file must be a JSON array")?;

    for entry in recorded {
        let url = entry.url.clone();
        let response = server.handle(entry.into_request()?).await?;
        println!("{}", describe(&url, response.as_ref()));
    }

    info!(
        total = server.total_requests(),
        handled = server.total_handled(),
        unhandled = server.total_unhandled(),
        "Replay complete"
    );

    Ok(())
}
