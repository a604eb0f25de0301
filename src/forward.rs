//! RTMP forwarder subprocess glue.
//!
//! Spawns ffmpeg to relay a local RTMP ingest to a platform's endpoint
//! and exposes the liveness/termination surface the display header and
//! the shutdown path need. Thin by design; the interesting work happens
//! in ffmpeg.

use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::ForwardError;

/// Local RTMP ingest port ffmpeg reads from.
pub const RTMP_LOCAL_PORT: u16 = 1935;

const VIDEO_CODEC: &str = "libx264";
const FFMPEG_PRESET: &str = "veryfast";
const FFMPEG_CRF: &str = "23";
const VIDEO_BITRATE: &str = "4M";
const AUDIO_CODEC: &str = "aac";
const AUDIO_BITRATE: &str = "128k";

/// Build the ffmpeg argument list for one forwarded stream.
///
/// `url` gains a trailing slash if missing; the output URL is `url` +
/// `key`.
pub fn forward_args(orientation: &str, url: &str, key: &str) -> Vec<String> {
    let base = if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    };
    let input_url = format!("rtmp://localhost:{}/{}", RTMP_LOCAL_PORT, orientation);
    let output_url = format!("{}{}", base, key);

    vec![
        "-f".into(),
        "flv".into(),
        "-i".into(),
        input_url,
        "-c:v".into(),
        VIDEO_CODEC.into(),
        "-preset".into(),
        FFMPEG_PRESET.into(),
        "-crf".into(),
        FFMPEG_CRF.into(),
        "-b:v".into(),
        VIDEO_BITRATE.into(),
        "-c:a".into(),
        AUDIO_CODEC.into(),
        "-b:a".into(),
        AUDIO_BITRATE.into(),
        "-f".into(),
        "flv".into(),
        "-tls_verify".into(),
        "1".into(),
        output_url,
    ]
}

/// A monitored forwarder child process.
pub struct Forwarder {
    label: String,
    child: Child,
}

impl Forwarder {
    /// Spawn ffmpeg forwarding the local RTMP ingest to `url` + `key`.
    pub fn spawn(
        label: impl Into<String>,
        orientation: &str,
        url: &str,
        key: &str,
    ) -> Result<Self, ForwardError> {
        let label = label.into();
        let child = Command::new("ffmpeg")
            .args(forward_args(orientation, url, key))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ForwardError::Spawn {
                label: label.clone(),
                source,
            })?;
        tracing::info!(label = %label, "Started RTMP forwarder");
        Ok(Self { label, child })
    }

    /// Wrap an externally-spawned child for monitoring.
    pub fn from_child(label: impl Into<String>, child: Child) -> Self {
        Self {
            label: label.into(),
            child,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Non-blocking liveness check; polled once per header refresh.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Terminate the child: polite signal first, then a forced kill once
    /// the grace period expires.
    pub fn terminate(&mut self, grace: Duration) -> Result<(), ForwardError> {
        if !self.is_running() {
            return Ok(());
        }

        send_term(&self.child);
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if !self.is_running() {
                tracing::info!(label = %self.label, "Forwarder exited gracefully");
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        tracing::warn!(label = %self.label, "Forwarder ignored SIGTERM, killing");
        let _ = self.child.kill();
        self.child.wait().map_err(|_| ForwardError::GraceExpired {
            label: self.label.clone(),
        })?;
        Ok(())
    }
}

#[cfg(unix)]
fn send_term(child: &Child) {
    unsafe {
        libc::kill(child.id() as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn send_term(_child: &Child) {}
