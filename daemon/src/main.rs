//! gatehouse daemon — entry point for the verification service.
//!
//! Reads gateway events as JSON lines on stdin, handles each as an
//! independent task, and emits platform actions as JSON lines on stdout
//! (see [`wire`]). A background sweep expires stale sessions.

mod wire;

use clap::Parser;
use gatehouse_gateway::{GatewayEvent, Platform};
use gatehouse_roster::RosterStore;
use gatehouse_types::{ChannelId, RoleId, SystemClock};
use gatehouse_verification::{EngineConfig, VerificationEngine};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::sync::broadcast;
use wire::StdioPlatform;

#[derive(Parser)]
#[command(name = "gatehouse-daemon", about = "Community identity verification daemon")]
struct Cli {
    /// Path to the participant roster CSV.
    #[arg(long, default_value = "./confirmed.csv", env = "GATEHOUSE_ROSTER_PATH")]
    roster_path: PathBuf,

    /// Channel in which the /verify command is accepted.
    #[arg(long, env = "GATEHOUSE_CHANNEL_ID")]
    verification_channel: u64,

    /// Role granted on successful verification.
    #[arg(long, env = "GATEHOUSE_ROLE_ID")]
    verified_role: u64,

    /// Contact named in user-facing failure messages.
    #[arg(
        long,
        default_value = "your event organizers",
        env = "GATEHOUSE_SUPPORT_CONTACT"
    )]
    support_contact: String,

    /// Seconds before confirmation prompts go inert.
    #[arg(long, default_value_t = 300, env = "GATEHOUSE_PROMPT_TIMEOUT_SECS")]
    prompt_timeout_secs: u64,

    /// Maximum age of an idle verification session before it is swept.
    #[arg(long, default_value_t = 1800, env = "GATEHOUSE_SESSION_MAX_AGE_SECS")]
    session_max_age_secs: u64,

    /// How often the expiry sweep runs.
    #[arg(long, default_value_t = 60, env = "GATEHOUSE_SWEEP_INTERVAL_SECS")]
    sweep_interval_secs: u64,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, default_value = "info", env = "GATEHOUSE_LOG_LEVEL")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    tracing::info!(
        channel = cli.verification_channel,
        role = cli.verified_role,
        roster = %cli.roster_path.display(),
        "starting gatehouse daemon"
    );

    let store = RosterStore::new(&cli.roster_path);
    let roster = store.load_or_empty();
    tracing::info!(rows = roster.len(), "participant roster ready");

    let mut config = EngineConfig::new(
        ChannelId::new(cli.verification_channel),
        RoleId::new(cli.verified_role),
    );
    config.support_contact = cli.support_contact.clone();
    config.prompt_timeout_secs = cli.prompt_timeout_secs;
    config.session_max_age_secs = cli.session_max_age_secs;

    let platform = Arc::new(StdioPlatform::new());
    let engine = Arc::new(VerificationEngine::new(
        config,
        store,
        platform.clone(),
        Arc::new(SystemClock),
    ));

    if let Err(err) = platform.set_presence("Verification").await {
        tracing::warn!(error = %err, "could not set presence");
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Expiry sweep, independent of the UI prompt timeout.
    let sweep_engine = engine.clone();
    let mut sweep_rx = shutdown_tx.subscribe();
    let sweep_every = Duration::from_secs(cli.sweep_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_every);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    sweep_engine.purge_expired_sessions().await;
                }
                _ = sweep_rx.recv() => break,
            }
        }
    });

    // Event intake: one JSON gateway event per stdin line, one task per
    // event, so a slow handler never blocks intake.
    let intake_engine = engine.clone();
    let mut intake_rx = shutdown_tx.subscribe();
    let mut intake = tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                _ = intake_rx.recv() => break,
                line = lines.next_line() => match line {
                    Ok(Some(line)) => dispatch(&intake_engine, &line),
                    Ok(None) => {
                        tracing::info!("event stream closed");
                        break;
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "failed to read event stream");
                        break;
                    }
                },
            }
        }
    });

    tokio::select! {
        _ = shutdown_signal() => {}
        _ = &mut intake => {}
    }
    let _ = shutdown_tx.send(());

    tracing::info!("gatehouse daemon exited cleanly");
    Ok(())
}

fn dispatch(engine: &Arc<VerificationEngine>, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    match serde_json::from_str::<GatewayEvent>(line) {
        Ok(event) => {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine.handle(event).await;
            });
        }
        Err(err) => tracing::warn!(error = %err, "ignoring malformed gateway event"),
    }
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

fn init_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
