//! External media probe.
//!
//! A media probe opens a stream, reads a short sample and discards it. The
//! default implementation runs `ffmpeg` with the null muxer.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use iptv_rank_protocol::Delay;
use log::trace;
use tokio::process::Command;

/// Placeholder replaced by the stream URL in argument templates.
pub const URL_PLACEHOLDER: &str = "{url}";

/// Placeholder replaced by the sample duration in seconds.
pub const DURATION_PLACEHOLDER: &str = "{duration}";

/// Default probe program.
pub const DEFAULT_PROGRAM: &str = "ffmpeg";

/// Default argument template: read `{duration}` seconds and write nothing.
pub const DEFAULT_ARGS: &[&str] = &[
    "-hide_banner",
    "-nostdin",
    "-loglevel",
    "error",
    "-i",
    URL_PLACEHOLDER,
    "-t",
    DURATION_PLACEHOLDER,
    "-f",
    "null",
    "-",
];

/// Result of one media probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The sample was read; wall-clock time of the whole probe.
    Success { elapsed: Duration },
    /// The probe could not start or exited non-zero.
    Failure { reason: String },
    /// The probe exceeded its timeout and was killed.
    Timeout,
}

impl ProbeOutcome {
    /// Delay value for ranking. Failure and timeout are both unreachable.
    pub fn delay(&self) -> Delay {
        match self {
            ProbeOutcome::Success { elapsed } => Delay::Millis(elapsed.as_millis() as u64),
            ProbeOutcome::Failure { .. } | ProbeOutcome::Timeout => Delay::Unreachable,
        }
    }
}

/// Something that can sample a stream URL.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// Read `sample` worth of the stream, giving up after `timeout`.
    async fn probe(&self, url: &str, sample: Duration, timeout: Duration) -> ProbeOutcome;
}

/// Media probe backed by an external command.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    program: String,
    args: Vec<String>,
}

impl CommandProbe {
    /// Create a probe running `program` with an argument template.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `ffmpeg` with the default argument template.
    pub fn ffmpeg() -> Self {
        Self::new(
            DEFAULT_PROGRAM,
            DEFAULT_ARGS.iter().map(|arg| arg.to_string()).collect(),
        )
    }

    /// Expand the argument template for one URL.
    fn build_args(&self, url: &str, sample: Duration) -> Vec<String> {
        let duration = format_seconds(sample);
        self.args
            .iter()
            .map(|arg| {
                arg.replace(URL_PLACEHOLDER, url)
                    .replace(DURATION_PLACEHOLDER, &duration)
            })
            .collect()
    }
}

impl Default for CommandProbe {
    fn default() -> Self {
        Self::ffmpeg()
    }
}

#[async_trait]
impl MediaProbe for CommandProbe {
    async fn probe(&self, url: &str, sample: Duration, timeout: Duration) -> ProbeOutcome {
        let args = self.build_args(url, sample);
        trace!("Running {} {:?}", self.program, args);

        let start = Instant::now();
        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                return ProbeOutcome::Failure {
                    reason: format!("failed to spawn {}: {}", self.program, e),
                }
            }
        };

        // Dropping the wait future on timeout drops the child, which kills it.
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Err(_) => ProbeOutcome::Timeout,
            Ok(Err(e)) => ProbeOutcome::Failure {
                reason: format!("failed to wait for {}: {}", self.program, e),
            },
            Ok(Ok(output)) if output.status.success() => ProbeOutcome::Success {
                elapsed: start.elapsed(),
            },
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let last_line = stderr.lines().last().unwrap_or("").trim();
                ProbeOutcome::Failure {
                    reason: if last_line.is_empty() {
                        format!("{} exited with {}", self.program, output.status)
                    } else {
                        format!("{} exited with {}: {}", self.program, output.status, last_line)
                    },
                }
            }
        }
    }
}

/// Seconds with millisecond precision, without trailing zeros (`3`, `2.5`).
fn format_seconds(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 == 0 {
        format!("{}", millis / 1000)
    } else {
        let text = format!("{}.{:03}", millis / 1000, millis % 1000);
        text.trim_end_matches('0').to_string()
    }
}
