//! Copying a response body to disk with optional throttling and progress.

use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

use super::body::ReadAheadBody;
use super::error::TransportError;
use super::progress::ProgressReporter;
use super::settings::HttpSettings;
use crate::actions::{ControlError, FlagKind, Flags};
use crate::config::units::RateSpec;

/// Why a receive loop stopped early.
#[derive(Debug)]
pub enum ReceiveError {
    /// Reading the body failed; the attempt may be retried.
    Transport(TransportError),
    /// Writing to the file failed.
    Io(std::io::Error),
    /// The download flag was set.
    Control(ControlError),
}

/// Body-to-file copy loop.
///
/// With neither a rate cap nor progress reporting configured the loop copies
/// chunks as they arrive. Otherwise it tracks elapsed time and bytes since
/// the loop started, reports progress at most once per interval, and sleeps
/// whenever it runs ahead of the sampled rate.
#[derive(Debug, Clone, Copy)]
pub struct Receiver {
    rate: Option<RateSpec>,
    progress: Option<Duration>,
}

impl Receiver {
    /// Creates a receiver from the rate and progress settings.
    #[must_use]
    pub fn new(settings: &HttpSettings) -> Self {
        Self {
            rate: settings.rate,
            progress: settings.progress,
        }
    }

    /// Copies `body` into `writer`, returning the number of bytes written.
    ///
    /// `total` and `offset` are only used for progress display: `offset`
    /// bytes were already on disk before this call.
    ///
    /// # Errors
    ///
    /// Stops at the first transport error, write error, or set download flag.
    /// Bytes written before the error stay written.
    pub async fn receive<W>(
        &self,
        writer: &mut W,
        body: &mut ReadAheadBody,
        total: Option<u64>,
        offset: u64,
        flags: &Flags,
        reporter: &dyn ProgressReporter,
    ) -> Result<u64, ReceiveError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        if self.rate.is_none() && self.progress.is_none() {
            return receive_plain(writer, body, flags).await;
        }
        self.receive_rate(writer, body, total, offset, flags, reporter)
            .await
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    async fn receive_rate<W>(
        &self,
        writer: &mut W,
        body: &mut ReadAheadBody,
        total: Option<u64>,
        offset: u64,
        flags: &Flags,
        reporter: &dyn ProgressReporter,
    ) -> Result<u64, ReceiveError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let rate = self.rate.map(|rate| rate.sample());
        let started = Instant::now();
        let mut last_report = started;
        let mut downloaded: u64 = 0;

        while let Some(chunk) = body.next_chunk().await {
            let chunk = chunk.map_err(ReceiveError::Transport)?;
            let elapsed = started.elapsed();
            downloaded += chunk.len() as u64;

            writer.write_all(&chunk).await.map_err(ReceiveError::Io)?;
            flags
                .process(FlagKind::Download)
                .map_err(ReceiveError::Control)?;

            if let Some(interval) = self.progress {
                let now = Instant::now();
                if now.duration_since(last_report) > interval {
                    let seconds = elapsed.as_secs_f64();
                    let speed = if seconds > 0.0 {
                        (downloaded as f64 / seconds) as u64
                    } else {
                        0
                    };
                    reporter.progress(total, offset + downloaded, speed);
                    last_report = now;
                }
            }

            if let Some(rate) = rate.filter(|rate| *rate > 0) {
                let expected = Duration::from_secs_f64(downloaded as f64 / rate as f64);
                if expected > elapsed {
                    tokio::time::sleep(expected - elapsed).await;
                }
            }
        }
        Ok(downloaded)
    }
}

async fn receive_plain<W>(
    writer: &mut W,
    body: &mut ReadAheadBody,
    flags: &Flags,
) -> Result<u64, ReceiveError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut downloaded: u64 = 0;
    while let Some(chunk) = body.next_chunk().await {
        let chunk = chunk.map_err(ReceiveError::Transport)?;
        writer.write_all(&chunk).await.map_err(ReceiveError::Io)?;
        downloaded += chunk.len() as u64;
        flags
            .process(FlagKind::Download)
            .map_err(ReceiveError::Control)?;
    }
    Ok(downloaded)
}
