//! CLI entry point: wire sources into the manager, the manager into the
//! display, and run until quit or interrupt.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use simulchat::chat::ChatManager;
use simulchat::config::Config;
use simulchat::display::{ChatDisplay, ShutdownReason, TerminalGuard, spawn_key_watcher};
use simulchat::forward::Forwarder;
use simulchat::source::Source;

/// Grace period before a forwarder child is killed outright.
const FORWARDER_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "simulchat")]
#[command(about = "Aggregate live chat from multiple streaming platforms in one terminal view")]
#[command(version)]
struct Cli {
    /// Chat source URLs (twitch.tv, youtube.com, kick.com domains)
    #[arg(required = true)]
    sources: Vec<String>,

    /// Poll interval for polling-based sources, in milliseconds
    #[arg(long, env = "SIMULCHAT_POLL_INTERVAL_MS")]
    poll_interval_ms: Option<u64>,

    /// Scrollback capacity in display lines
    #[arg(long, env = "SIMULCHAT_BUFFER_CAPACITY")]
    buffer_capacity: Option<usize>,

    /// Spawn an RTMP forwarder: ORIENTATION,URL,KEY (repeatable, max 2)
    #[arg(long = "forward", value_name = "SPEC")]
    forwards: Vec<String>,
}

/// Split a `--forward` value into (orientation, url, key).
fn parse_forward_spec(spec: &str) -> anyhow::Result<(String, String, String)> {
    let mut parts = spec.splitn(3, ',');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(orientation), Some(url), Some(key))
            if !orientation.is_empty() && !url.is_empty() && !key.is_empty() =>
        {
            Ok((orientation.to_string(), url.to_string(), key.to_string()))
        }
        _ => anyhow::bail!("invalid --forward spec {:?}, expected ORIENTATION,URL,KEY", spec),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr: the painter owns stdout, and the parked cursor
    // keeps interleaved diagnostics below the chat view.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("simulchat=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if cli.forwards.len() > 2 {
        anyhow::bail!("at most two forwarders are supported");
    }

    let mut config = Config::from_env().context("reading configuration")?;
    if let Some(ms) = cli.poll_interval_ms {
        config.poll_interval = Duration::from_millis(ms.max(1));
    }
    if let Some(capacity) = cli.buffer_capacity {
        config.buffer_capacity = capacity.max(1);
    }

    let sources: Vec<Source> = cli
        .sources
        .iter()
        .map(|raw| Source::parse_url(raw))
        .collect::<Result<_, _>>()
        .context("parsing chat sources")?;

    let mut forwarders = Vec::new();
    for spec in &cli.forwards {
        let (orientation, url, key) = parse_forward_spec(spec)?;
        forwarders.push(
            Forwarder::spawn(orientation.clone(), &orientation, &url, &key)
                .context("spawning RTMP forwarder")?,
        );
    }
    let forwarders = Arc::new(std::sync::Mutex::new(forwarders));

    let manager = Arc::new(ChatManager::new(config.clone()));

    let mut display =
        ChatDisplay::start(&config, Arc::clone(&forwarders)).context("starting display")?;
    let guard = TerminalGuard::enter().context("entering raw mode")?;

    let sender = display.sender();
    manager.add_listener(move |message| {
        // Best effort: a render side that has fallen a full queue behind
        // loses the message rather than stalling the adapters.
        if sender.try_send(message).is_err() {
            tracing::debug!("Render queue full, dropping message");
        }
    });

    let mut started = 0usize;
    for source in sources {
        let key = source.key();
        match manager.start(source).await {
            Ok(()) => started += 1,
            Err(e) => tracing::error!(source = %key, error = %e, "Source failed to start"),
        }
    }
    if started == 0 {
        for forwarder in forwarders.lock().expect("forwarder lock poisoned").iter_mut() {
            let _ = forwarder.terminate(FORWARDER_GRACE);
        }
        display.stop();
        drop(guard);
        anyhow::bail!("no chat sources could be started");
    }

    // Quit key and interrupt funnel into one ordered shutdown path.
    let key_stop = Arc::new(AtomicBool::new(false));
    let (quit_tx, mut quit_rx) = tokio::sync::mpsc::channel(1);
    let key_thread = spawn_key_watcher(Arc::clone(&key_stop), quit_tx);

    let reason = tokio::select! {
        pressed = quit_rx.recv() => pressed.unwrap_or(ShutdownReason::QuitKey),
        _ = tokio::signal::ctrl_c() => ShutdownReason::Interrupt,
    };
    tracing::info!(?reason, "Shutting down");

    // Ordered shutdown: stop accepting messages, terminate children,
    // stop the render threads, restore the terminal.
    manager.stop().await;

    for forwarder in forwarders.lock().expect("forwarder lock poisoned").iter_mut() {
        if let Err(e) = forwarder.terminate(FORWARDER_GRACE) {
            tracing::warn!(label = %forwarder.label(), error = %e, "Forwarder cleanup failed");
        }
    }

    display.stop();
    key_stop.store(true, Ordering::Relaxed);
    let _ = key_thread.join();
    drop(guard);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forward_spec() {
        let (orientation, url, key) =
            parse_forward_spec("LANDSCAPE,rtmps://ingest.example.com/app,abc123").unwrap();
        assert_eq!(orientation, "LANDSCAPE");
        assert_eq!(url, "rtmps://ingest.example.com/app");
        assert_eq!(key, "abc123");
    }

    #[test]
    fn test_parse_forward_spec_key_may_contain_commas() {
        let (_, _, key) = parse_forward_spec("PORTRAIT,rtmp://x/,k,extra").unwrap();
        assert_eq!(key, "k,extra");
    }

    #[test]
    fn test_parse_forward_spec_rejects_missing_parts() {
        assert!(parse_forward_spec("LANDSCAPE,rtmp://x/").is_err());
        assert!(parse_forward_spec("").is_err());
        assert!(parse_forward_spec(",url,key").is_err());
    }

    #[test]
    fn test_cli_parses_sources_and_flags() {
        let cli = Cli::parse_from([
            "simulchat",
            "https://www.twitch.tv/somechannel",
            "https://kick.com/api/v2/channels/xyz/messages",
            "--poll-interval-ms",
            "500",
        ]);
        assert_eq!(cli.sources.len(), 2);
        assert_eq!(cli.poll_interval_ms, Some(500));
        assert!(cli.forwards.is_empty());
    }
}
