//! # filterhose
//!
//! Subscribes to the filtered status stream and prints every event as one
//! JSON object per line on stdout. Logs go to stderr.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::Level;

use filterhose_core::{Credentials, FilterCategory, StreamConfig, StreamEvent};
use filterhose_stream::{FilterStream, StaticHeaderSigner};
use filterhose_telemetry::{init_telemetry, TelemetryConfig};

const AUTHORIZATION_VAR: &str = "FILTERHOSE_AUTHORIZATION";

/// Filtered status stream client.
#[derive(Parser, Debug)]
#[command(name = "filterhose", about = "Stream statuses matching keywords, users, or places")]
struct Cli {
    /// JSON config file (endpoint, stallTimeoutMs, tweetMode, rateLimitMaxMs, eventBuffer).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Keyword to track. Repeatable.
    #[arg(long = "track")]
    track: Vec<String>,

    /// User id to follow. Repeatable.
    #[arg(long = "follow")]
    follow: Vec<String>,

    /// Bounding box "sw_lng,sw_lat,ne_lng,ne_lat". Repeatable.
    #[arg(long = "location")]
    location: Vec<String>,

    /// Language code. Repeatable.
    #[arg(long = "language")]
    language: Vec<String>,

    /// Override the endpoint from the config file.
    #[arg(long)]
    endpoint: Option<String>,

    /// Override the stall timeout from the config file.
    #[arg(long)]
    stall_timeout_ms: Option<u64>,

    #[arg(long)]
    tweet_mode: Option<String>,

    /// Precomputed Authorization header. Falls back to $FILTERHOSE_AUTHORIZATION.
    ///
    /// Sent unchanged on every reconnect, so it suits bearer or proxy
    /// authorization only. A per-request OAuth 1.0a signature needs a
    /// `RequestSigner` built on the FILTERHOSE_CONSUMER_KEY,
    /// FILTERHOSE_CONSUMER_SECRET, FILTERHOSE_TOKEN and FILTERHOSE_TOKEN_SECRET
    /// credentials, which this binary does not ship.
    #[arg(long)]
    authorization: Option<String>,

    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,

    #[arg(long, default_value = "info")]
    log_level: Level,
}

impl Cli {
    fn stream_config(&self) -> Result<StreamConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config: {}", path.display()))?;
                StreamConfig::from_json(&raw)?
            }
            None => StreamConfig::default(),
        };
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(ms) = self.stall_timeout_ms {
            config.stall_timeout_ms = ms;
        }
        if self.tweet_mode.is_some() {
            config.tweet_mode = self.tweet_mode.clone();
        }
        Ok(config)
    }

    fn authorization(&self) -> Result<String> {
        match &self.authorization {
            Some(value) => Ok(value.clone()),
            None => std::env::var(AUTHORIZATION_VAR)
                .with_context(|| format!("--authorization or ${AUTHORIZATION_VAR} is required")),
        }
    }

    fn has_filters(&self) -> bool {
        !(self.track.is_empty()
            && self.follow.is_empty()
            && self.location.is_empty()
            && self.language.is_empty())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_telemetry(&TelemetryConfig {
        log_level: cli.log_level,
        module_levels: Vec::new(),
        json: cli.json_logs,
    })?;

    if !cli.has_filters() {
        bail!("nothing to stream: pass at least one --track, --follow, --location, or --language");
    }

    let config = cli.stream_config()?;
    let credentials = Credentials::from_env()?;
    let signer = Arc::new(StaticHeaderSigner::new(cli.authorization()?));
    let stream = FilterStream::new(credentials, config, signer)?;
    let mut events = stream.subscribe();

    stream.add_many(FilterCategory::Tracking, &cli.track);
    stream.add_many(FilterCategory::Follow, &cli.follow);
    stream.add_many(FilterCategory::Location, &cli.location);
    stream.add_many(FilterCategory::Language, &cli.language);
    tracing::info!(track = ?stream.tracking(), "filterhose started");

    let outcome = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break Ok(());
            }
            event = events.recv() => match event {
                Ok(event) => {
                    println!("{}", event.to_json());
                    if let StreamEvent::Error { error } = event {
                        break Err(anyhow::Error::new(error).context("stream stopped"));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "output fell behind, events dropped");
                }
                Err(RecvError::Closed) => break Ok(()),
            },
        }
    };

    stream.shutdown().await;
    outcome
}
