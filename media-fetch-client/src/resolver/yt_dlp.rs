use super::{MediaResolver, MediaTransfer, ResolutionError};
use crate::media::MediaMetadata;
use crate::progress::{ProgressSink, ProgressUpdate};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{future, stream, StreamExt};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::io;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, Command};
use tokio_util::io::ReaderStream;

lazy_static! {
    static ref PROGRESS_LINE: Regex = Regex::new(
        r"^\[download\]\s+(?P<percent>\d+(?:\.\d+)?)%(?:.*?\s+at\s+(?P<speed>\S+))?(?:.*?\s+ETA\s+(?P<eta>\S+))?"
    )
    .unwrap();
}

/// Resolver backed by the `yt-dlp` executable
#[derive(Clone, Debug)]
pub struct YtDlp {
    program: String,
    format: String,
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new("yt-dlp", "best")
    }
}

#[derive(Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    format: Option<String>,
    ext: Option<String>,
}

impl YtDlpInfo {
    fn into_metadata(self) -> MediaMetadata {
        MediaMetadata::new(
            self.title
                .filter(|title| !title.trim().is_empty())
                .unwrap_or_else(|| "video".to_string()),
            self.duration,
            self.thumbnail,
            self.format.unwrap_or_default(),
            self.ext.unwrap_or_else(|| "mp4".to_string()),
        )
    }
}

impl YtDlp {
    pub fn new(program: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            format: format.into(),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(["-f", self.format.as_str(), "--no-playlist", "--no-warnings"])
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl MediaResolver for YtDlp {
    async fn resolve(&self, url: &str) -> Result<MediaMetadata, ResolutionError> {
        log::debug!("Resolving metadata for {}", url);
        let output = self
            .command()
            .args(["-J", "--", url])
            .output()
            .await
            .map_err(ResolutionError::Launch)?;

        if !output.status.success() {
            return Err(ResolutionError::Failed(error_message(&output.stderr)));
        }

        let info: YtDlpInfo = serde_json::from_slice(&output.stdout)?;
        Ok(info.into_metadata())
    }

    async fn transfer(
        &self,
        url: &str,
        _metadata: &MediaMetadata,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<MediaTransfer, ResolutionError> {
        log::debug!("Starting transfer for {}", url);
        let mut child = self
            .command()
            .args(["--newline", "-o", "-", "--", url])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(ResolutionError::Launch)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ResolutionError::Failed("resolver output unavailable".to_string()))?;
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(follow_progress(stderr, progress)));

        // Surfaces a failed exit as the last item of the body
        let exit = stream::once(async move {
            let status = child.wait().await;
            let last_message = match stderr_task {
                Some(task) => task.await.ok().flatten(),
                None => None,
            };
            let result: Option<io::Result<Bytes>> = match status {
                Ok(status) if status.success() => None,
                Ok(status) => Some(Err(io::Error::other(
                    last_message.unwrap_or_else(|| format!("yt-dlp exited with {status}")),
                ))),
                Err(err) => Some(Err(err)),
            };
            result
        })
        .filter_map(future::ready);

        Ok(MediaTransfer::new(ReaderStream::new(stdout).chain(exit).boxed()))
    }
}

/// Forward progress lines to `progress`; returns the last other message seen
async fn follow_progress(stderr: ChildStderr, progress: Arc<dyn ProgressSink>) -> Option<String> {
    let mut lines = BufReader::new(stderr).lines();
    let mut last_message = None;
    while let Ok(Some(line)) = lines.next_line().await {
        match parse_progress_line(&line) {
            Some(update) => progress.report(update),
            None => {
                let line = line.trim();
                if !line.is_empty() {
                    last_message = Some(line.to_string());
                }
            }
        }
    }
    last_message
}

/// Parse a `[download]  42.3% of 10.00MiB at 1.50MiB/s ETA 00:04` line
pub fn parse_progress_line(line: &str) -> Option<ProgressUpdate> {
    let captures = PROGRESS_LINE.captures(line.trim())?;
    let percent = captures.name("percent")?.as_str().parse::<f32>().ok()?;
    Some(ProgressUpdate::Downloading {
        percent,
        speed: captures.name("speed").map(|speed| speed.as_str().to_string()),
        eta: captures.name("eta").map(|eta| eta.as_str().to_string()),
    })
}

fn error_message(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .unwrap_or("yt-dlp could not complete the request")
        .to_string()
}
