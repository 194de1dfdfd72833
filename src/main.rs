//! resilient-fetch: perform one resilient HTTP call and report the result.
//!
//! # Architecture Overview
//!
//! ```text
//!   caller ──▶ Client facade ──▶ retry loop ──▶ attempt ──▶ pool ──▶ upstream
//!                  │                 │             │
//!                  │                 │             ├─ connect / response timeouts
//!                  │                 │             ├─ read / write stall guards
//!                  │                 │             └─ status classifier → Outcome
//!                  │                 └─ backoff + eligibility + retry-safety
//!                  └─ failover rules → Reply | Failure
//! ```

use std::path::PathBuf;

use clap::Parser;
use http::Method;
use serde_json::json;

use resilient_client::config::loader::load_config;
use resilient_client::config::ClientConfig;
use resilient_client::lifecycle::signals;
use resilient_client::observability::{logging, metrics};
use resilient_client::{Client, Failure, Reply, RequestDescriptor};

#[derive(Debug, Parser)]
#[command(name = "resilient-fetch", version, about = "Fetch a URL through the resilient client")]
struct Args {
    /// Absolute http(s) URL to call.
    url: String,

    /// TOML configuration file (pool, timeouts, retries, status rules, failover).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP method.
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    /// Request body.
    #[arg(short, long)]
    data: Option<String>,

    /// Header in `Name: value` form. May be repeated.
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Allow retries even if the method is not idempotent.
    #[arg(long)]
    retry_unsafe: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ClientConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!("resilient-fetch v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let method = Method::from_bytes(args.method.to_ascii_uppercase().as_bytes())?;
    let mut builder = RequestDescriptor::builder(method.clone(), &args.url);
    for header in &args.headers {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| format!("header `{header}` is not in `Name: value` form"))?;
        builder = builder.header(name.trim(), value.trim());
    }
    if let Some(data) = args.data {
        builder = builder.body(data);
    }
    if args.retry_unsafe {
        builder = builder.retry_safe(true);
    }
    let request = builder.build()?;

    let client = Client::new(config)?;
    let policy = client.default_policy().clone();
    let result = client
        .execute_until(&request, &policy, signals::interrupted())
        .await;
    client.shutdown();

    let summary = match &result {
        Ok(Reply::Upstream(response)) => json!({
            "result": "success",
            "status": response.status.as_u16(),
            "body": response.text(),
        }),
        Ok(Reply::Fallback(body)) => json!({
            "result": "fallback",
            "body": String::from_utf8_lossy(body),
        }),
        Err(failure) => json!({
            "result": "failure",
            "error": failure.to_string(),
            "status": failure.status().map(|s| s.as_u16()),
            "transport": failure.transport_kind().map(|k| k.as_str()),
        }),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    match result {
        Ok(_) => Ok(()),
        Err(Failure::Cancelled) => {
            tracing::info!("Call cancelled");
            Ok(())
        }
        Err(failure) => Err(failure.into()),
    }
}
