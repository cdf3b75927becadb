//! Host side of the line protocol.
//!
//! The host writes one command per line and treats the literal `ACK` line as
//! the only success signal. Everything else the controller prints is
//! diagnostic text. There is no negative acknowledgement, so a dropped or
//! rejected command surfaces as [`HostError::Timeout`].

use crate::command::MotionCommand;
use crate::communication::{serial, spawn_line_reader, LineSink, LineWriter};
use crate::controller::ACK;
use serial2_tokio::SerialPort;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

#[derive(Debug, Error)]
pub enum HostError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("No ACK for '{token}' after {after:?}")]
    Timeout { token: String, after: Duration },
    #[error("Controller link closed")]
    Closed,
}

/// Outcome of one acknowledged command.
#[derive(Debug, Clone, PartialEq)]
pub struct HostReport {
    pub token: String,
    /// Diagnostic lines received before the `ACK`.
    pub responses: Vec<String>,
    pub round_trip: Duration,
}

/// Longest controller response line the link keeps.
const MAX_RESPONSE_LEN: usize = 1024;

/// Host end of the line protocol.
///
/// A command that timed out may still be acknowledged later. The link
/// counts such commands and, while any are outstanding, only accepts an
/// `ACK` once the controller has announced it is executing the command
/// being sent; earlier `ACK`s are discarded as late.
pub struct HostLink<W> {
    lines: mpsc::Receiver<String>,
    writer: LineWriter<W>,
    unacknowledged: usize,
}

impl HostLink<WriteHalf<SerialPort>> {
    pub fn open_serial(port: &str, baud: u32) -> Result<Self, HostError> {
        let link = serial::SerialLink::open(port, baud, MAX_RESPONSE_LEN)?;
        Ok(Self::new(link.lines, link.writer.into_inner()))
    }
}

impl<W: AsyncWrite + Unpin + Send> HostLink<W> {
    pub fn new(lines: mpsc::Receiver<String>, writer: W) -> Self {
        Self {
            lines,
            writer: LineWriter::new(writer),
            unacknowledged: 0,
        }
    }

    /// Link over any split byte stream.
    pub fn from_split<R>(reader: R, writer: W) -> Self
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
    {
        Self::new(spawn_line_reader(reader, MAX_RESPONSE_LEN), writer)
    }

    /// Commands sent that timed out and whose late `ACK` has not been seen.
    pub fn unacknowledged(&self) -> usize {
        self.unacknowledged
    }

    /// Shuts down the outgoing direction; the controller reads end of input.
    pub async fn close(self) -> Result<(), HostError> {
        self.writer.into_inner().shutdown().await?;
        Ok(())
    }

    /// Sends `command` and waits up to `timeout` for its `ACK`.
    pub async fn send(&mut self, command: &MotionCommand, timeout: Duration) -> Result<HostReport, HostError> {
        self.discard_buffered();
        let line = serde_json::to_string(command)?;
        let started = Instant::now();
        tracing::info!("Sending '{}' ({} keyframes)", command.token, command.frame_count());
        self.writer.send_line(&line).await?;

        let executing = format!("Executing token: {}", command.token);
        let mut announced = false;
        let mut responses = Vec::new();
        let deadline = started + timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.lines.recv()).await {
                Ok(Some(response)) => {
                    let response = response.trim();
                    if response == ACK {
                        if self.unacknowledged > 0 && !announced {
                            self.late_ack();
                            continue;
                        }
                        // The controller runs commands in order, so anything
                        // sent before this one has finished or was dropped.
                        self.unacknowledged = 0;
                        let round_trip = started.elapsed();
                        tracing::info!("'{}' executed in {:?}", command.token, round_trip);
                        return Ok(HostReport {
                            token: command.token.clone(),
                            responses,
                            round_trip,
                        });
                    }
                    if response.ends_with(&executing) {
                        announced = true;
                    }
                    if !response.is_empty() {
                        tracing::debug!("Controller: {}", response);
                        responses.push(response.to_string());
                    }
                }
                Ok(None) => return Err(HostError::Closed),
                Err(_) => {
                    self.unacknowledged += 1;
                    tracing::warn!("No ACK for '{}' within {:?}", command.token, timeout);
                    return Err(HostError::Timeout {
                        token: command.token.clone(),
                        after: timeout,
                    });
                }
            }
        }
    }

    /// Drops lines that arrived between commands, counting late `ACK`s.
    fn discard_buffered(&mut self) {
        while let Ok(response) = self.lines.try_recv() {
            if response.trim() == ACK {
                self.late_ack();
            } else {
                tracing::debug!("Controller: {}", response.trim());
            }
        }
    }

    fn late_ack(&mut self) {
        self.unacknowledged = self.unacknowledged.saturating_sub(1);
        tracing::warn!("Discarding late ACK ({} still outstanding)", self.unacknowledged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Keyframe;
    use crate::communication::spawn_line_writer;

    fn wave() -> MotionCommand {
        MotionCommand::new("WAVE", 0.5, vec![Keyframe::new().with_group("L", &[0, 0, 0, 0, 0])])
    }

    #[tokio::test]
    async fn test_send_waits_for_ack() {
        let (host_end, controller_end) = tokio::io::duplex(1024);
        let (host_read, host_write) = tokio::io::split(host_end);
        let (ctrl_read, ctrl_write) = tokio::io::split(controller_end);
        let mut link = HostLink::from_split(host_read, host_write);

        let mut received = spawn_line_reader(ctrl_read, 1024);
        let replies = spawn_line_writer(ctrl_write);
        tokio::spawn(async move {
            if let Some(line) = received.recv().await {
                let cmd: MotionCommand = serde_json::from_str(&line).unwrap();
                replies.send(format!("[ARM] Executing token: {}", cmd.token)).unwrap();
                replies.send(ACK.to_string()).unwrap();
            }
        });

        let report = link.send(&wave(), Duration::from_secs(5)).await.unwrap();
        assert_eq!(report.token, "WAVE");
        assert_eq!(report.responses, vec!["[ARM] Executing token: WAVE".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_times_out_without_ack() {
        let (tx, rx) = mpsc::channel(8);
        let mut link = HostLink::new(rx, tokio::io::sink());
        let sender = tokio::spawn(async move {
            tx.send("[ARM] Queue full, discarding command".to_string()).await.unwrap();
            tx
        });
        let err = link.send(&wave(), Duration::from_millis(500)).await.unwrap_err();
        assert!(matches!(err, HostError::Timeout { ref token, .. } if token == "WAVE"));
        assert_eq!(link.unacknowledged(), 1);
        drop(sender.await.unwrap());
    }

    #[tokio::test]
    async fn test_send_reports_closed_link() {
        let (tx, rx) = mpsc::channel::<String>(1);
        drop(tx);
        let mut link = HostLink::new(rx, tokio::io::sink());
        assert!(matches!(
            link.send(&wave(), Duration::from_secs(1)).await,
            Err(HostError::Closed)
        ));
    }

    fn nudge(token: &str) -> MotionCommand {
        MotionCommand::new(token, 0.1, vec![Keyframe::new().with_group("LE", &[91])])
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffered_late_ack_is_not_credited() {
        let (tx, rx) = mpsc::channel(8);
        let mut link = HostLink::new(rx, tokio::io::sink());
        let timeout = Duration::from_millis(100);
        assert!(matches!(
            link.send(&nudge("SLOW"), timeout).await,
            Err(HostError::Timeout { .. })
        ));

        // SLOW finishes after the host gave up on it
        tx.send(ACK.to_string()).await.unwrap();
        let err = link.send(&nudge("NEXT"), timeout).await.unwrap_err();
        assert!(matches!(err, HostError::Timeout { ref token, .. } if token == "NEXT"));
        assert_eq!(link.unacknowledged(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_ack_during_wait_is_skipped() {
        let (tx, rx) = mpsc::channel(8);
        let mut link = HostLink::new(rx, tokio::io::sink());
        assert!(link.send(&nudge("SLOW"), Duration::from_millis(100)).await.is_err());

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            tx.send(ACK.to_string()).await.unwrap();
            tx.send("[ARM] Executing token: NEXT".to_string()).await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            tx.send(ACK.to_string()).await.unwrap();
        });

        let start = Instant::now();
        let report = link.send(&nudge("NEXT"), Duration::from_secs(1)).await.unwrap();
        assert_eq!(report.token, "NEXT");
        assert_eq!(report.responses, vec!["[ARM] Executing token: NEXT".to_string()]);
        assert!(start.elapsed() >= Duration::from_millis(150));
        assert_eq!(link.unacknowledged(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_sync_link_accepts_bare_ack() {
        let (tx, rx) = mpsc::channel(8);
        let mut link = HostLink::new(rx, tokio::io::sink());
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            tx.send(ACK.to_string()).await.unwrap();
        });
        let report = link.send(&nudge("A"), Duration::from_secs(1)).await.unwrap();
        assert!(report.responses.is_empty());
    }
}
