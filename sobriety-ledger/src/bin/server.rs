//! Ledger server binary
//!
//! Reads one JSON envelope per line on stdin and writes one JSON reply per
//! line on stdout. Logs go to stderr, ending with the Prometheus counters.
//!
//! ```text
//! ledger-server [config.toml]
//! ```

use anyhow::Context;
use sobriety_ledger::{spawn_ledger_actor, Config, Dispatcher, Envelope, Ledger, Reply};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting Sobriety Ledger Server");

    // Load configuration
    let config = match std::env::args().nth(1) {
        Some(path) => {
            let mut config = Config::from_file(&path)
                .with_context(|| format!("failed to load config from {}", path))?;
            config.apply_env(|key| std::env::var(key).ok())?;
            config
        }
        None => Config::from_env()?,
    };

    // Open ledger
    let ledger = Arc::new(Ledger::open(&config)?);
    let dispatcher = Dispatcher::new(ledger.clone(), config.authorization.enforce_roles);
    let handle = spawn_ledger_actor(dispatcher, config.actor.mailbox_capacity);
    tracing::info!(
        enforce_roles = config.authorization.enforce_roles,
        "Ledger ready, reading requests from stdin"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        };

        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<Envelope>(&line) {
            Ok(envelope) => handle.execute(envelope).await?,
            Err(e) => Reply::malformed(e),
        };

        let mut out = serde_json::to_vec(&reply)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }

    handle.shutdown().await?;
    match ledger.metrics().render() {
        Ok(text) => tracing::info!("Final counters:\n{}", text),
        Err(e) => tracing::warn!("Failed to render metrics: {}", e),
    }
    tracing::info!("Shutting down ledger server");
    Ok(())
}
