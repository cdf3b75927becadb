// src/controller.rs - Control loop: line input -> queue -> decode -> motion -> ACK
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::time::Instant;

use crate::command::{CommandDecoder, CommandQueue, MotionCommand};
use crate::communication::LineSink;
use crate::config::{Config, ExecutionMode};
use crate::hardware::{self, ActuatorGroup, HardwareError};
use crate::motion::{self, MotionScheduler, Progress};

/// Completion marker sent once per executed command.
pub const ACK: &str = "ACK";

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Hardware error: {0}")]
    Hardware(#[from] HardwareError),
}

/// Counters for everything that crossed the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerStats {
    pub received: u64,
    pub dropped: u64,
    pub executed: u64,
    pub failed: u64,
}

pub struct Controller {
    label: String,
    execution: ExecutionMode,
    queue: CommandQueue,
    decoder: CommandDecoder,
    scheduler: MotionScheduler,
    stats: ControllerStats,
}

impl Controller {
    /// Controller over already attached groups.
    pub fn new(config: &Config, groups: Vec<ActuatorGroup>) -> Self {
        let policy = motion::policy_from_config(&config.motion);
        Self {
            label: config.controller.label.clone(),
            execution: config.controller.execution,
            queue: CommandQueue::new(config.controller.queue_capacity),
            decoder: CommandDecoder::from_config(config),
            scheduler: MotionScheduler::new(groups, policy),
            stats: ControllerStats::default(),
        }
    }

    /// Attaches every configured actuator on the configured driver.
    pub async fn from_config(config: &Config) -> Result<Self, ControllerError> {
        let groups = hardware::connect_groups(config).await?;
        Ok(Self::new(config, groups))
    }

    pub fn groups(&self) -> &[ActuatorGroup] {
        self.scheduler.groups()
    }

    pub fn scheduler(&self) -> &MotionScheduler {
        &self.scheduler
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub fn stats(&self) -> ControllerStats {
        self.stats.clone()
    }

    pub fn execution(&self) -> ExecutionMode {
        self.execution
    }

    pub async fn boot(&mut self, out: &mut dyn LineSink) -> std::io::Result<()> {
        Self::diag(&self.label, out, "Booting...").await?;
        for group in self.scheduler.groups() {
            tracing::info!("Group {} at {:?}", group.name(), group.last_angles());
        }
        Self::diag(&self.label, out, "Ready for motion commands.").await
    }

    /// Queues one input line. Returns `false` when the line was dropped.
    pub async fn accept_line(&mut self, line: &str, out: &mut dyn LineSink) -> std::io::Result<bool> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(true);
        }
        self.stats.received += 1;
        match self.queue.push(line) {
            Ok(()) => {
                tracing::debug!("Queued command ({}/{})", self.queue.len(), self.queue.capacity());
                Self::diag(&self.label, out, "Command queued").await?;
                Ok(true)
            }
            Err(e) => {
                self.stats.dropped += 1;
                tracing::warn!("{}", e);
                Self::diag(&self.label, out, "Queue full, discarding command").await?;
                Ok(false)
            }
        }
    }

    /// Runs the oldest queued command to completion. Returns `false` when
    /// the queue was empty.
    pub async fn process_next(&mut self, out: &mut dyn LineSink) -> Result<bool, ControllerError> {
        let Some(text) = self.queue.dequeue() else {
            return Ok(false);
        };
        let Some(command) = self.decode(&text, out).await? else {
            return Ok(true);
        };
        match self.scheduler.run(command).await {
            Ok(report) => {
                tracing::debug!("Steps per keyframe: {:?}", report.steps);
                self.finish(out).await?;
            }
            Err(e) => self.abort(out, e).await?,
        }
        Ok(true)
    }

    /// Serves `lines` until the stream ends and every queued command has run.
    pub async fn run(
        &mut self,
        lines: mpsc::Receiver<String>,
        out: &mut dyn LineSink,
    ) -> Result<(), ControllerError> {
        match self.execution {
            ExecutionMode::Blocking => self.run_blocking(lines, out).await,
            ExecutionMode::Concurrent => self.run_concurrent(lines, out).await,
        }
    }

    async fn run_blocking(
        &mut self,
        mut lines: mpsc::Receiver<String>,
        out: &mut dyn LineSink,
    ) -> Result<(), ControllerError> {
        let mut open = true;
        loop {
            if open {
                open = self.drain(&mut lines, out).await?;
            }
            if self.process_next(out).await? {
                continue;
            }
            if !open {
                break;
            }
            match lines.recv().await {
                Some(line) => {
                    self.accept_line(&line, out).await?;
                }
                None => open = false,
            }
        }
        tracing::info!("Input closed, controller stopping");
        Ok(())
    }

    async fn run_concurrent(
        &mut self,
        mut lines: mpsc::Receiver<String>,
        out: &mut dyn LineSink,
    ) -> Result<(), ControllerError> {
        let mut open = true;
        loop {
            if self.scheduler.is_idle() {
                self.start_next(out).await?;
            }
            let deadline = self.scheduler.deadline();
            if deadline.is_none() && !open {
                break;
            }
            tokio::select! {
                line = lines.recv(), if open => match line {
                    Some(line) => {
                        self.accept_line(&line, out).await?;
                    }
                    None => open = false,
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.tick(out).await?;
                }
            }
        }
        tracing::info!("Input closed, controller stopping");
        Ok(())
    }

    /// Dequeues until one command decodes and starts, or the queue is empty.
    async fn start_next(&mut self, out: &mut dyn LineSink) -> Result<(), ControllerError> {
        while let Some(text) = self.queue.dequeue() {
            let Some(command) = self.decode(&text, out).await? else {
                continue;
            };
            match self.scheduler.start(command, Instant::now()) {
                Ok(()) => return Ok(()),
                Err(e) => self.abort(out, e).await?,
            }
        }
        Ok(())
    }

    async fn tick(&mut self, out: &mut dyn LineSink) -> Result<(), ControllerError> {
        match self.scheduler.advance(Instant::now()) {
            Ok(Progress::Completed(report)) => {
                tracing::debug!("Steps per keyframe: {:?}", report.steps);
                self.finish(out).await?;
            }
            Ok(_) => {}
            Err(e) => self.abort(out, e).await?,
        }
        Ok(())
    }

    /// Moves every line already received into the queue. Returns `false`
    /// once the input stream has closed.
    async fn drain(
        &mut self,
        lines: &mut mpsc::Receiver<String>,
        out: &mut dyn LineSink,
    ) -> std::io::Result<bool> {
        loop {
            match lines.try_recv() {
                Ok(line) => {
                    self.accept_line(&line, out).await?;
                }
                Err(TryRecvError::Empty) => return Ok(true),
                Err(TryRecvError::Disconnected) => return Ok(false),
            }
        }
    }

    async fn decode(
        &mut self,
        text: &str,
        out: &mut dyn LineSink,
    ) -> std::io::Result<Option<MotionCommand>> {
        match self.decoder.decode(text) {
            Ok(command) => {
                Self::diag(&self.label, out, &format!("Executing token: {}", command.token)).await?;
                Ok(Some(command))
            }
            Err(e) => {
                self.stats.failed += 1;
                tracing::warn!("Rejected command: {}", e);
                Self::diag(&self.label, out, &e.to_string()).await?;
                Ok(None)
            }
        }
    }

    async fn finish(&mut self, out: &mut dyn LineSink) -> std::io::Result<()> {
        self.stats.executed += 1;
        out.send_line(ACK).await
    }

    async fn abort(&mut self, out: &mut dyn LineSink, error: motion::MotionError) -> std::io::Result<()> {
        self.stats.failed += 1;
        tracing::error!("Motion aborted: {}", error);
        Self::diag(&self.label, out, &format!("Motion aborted: {}", error)).await
    }

    async fn diag(label: &str, out: &mut dyn LineSink, message: &str) -> std::io::Result<()> {
        out.send_line(&format!("[{}] {}", label, message)).await
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("label", &self.label)
            .field("execution", &self.execution)
            .field("queue", &self.queue)
            .field("scheduler", &self.scheduler)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{build_groups, SimulatedServo};

    fn controller() -> Controller {
        let config = Config::hand();
        let groups = build_groups(&config.groups, 90, |_, pin| Box::new(SimulatedServo::new(pin))).unwrap();
        Controller::new(&config, groups)
    }

    #[tokio::test]
    async fn test_accept_line_reports_drops() {
        let mut c = controller();
        let mut out: Vec<String> = Vec::new();
        for _ in 0..3 {
            assert!(c.accept_line("{}", &mut out).await.unwrap());
        }
        assert!(!c.accept_line("{}", &mut out).await.unwrap());
        assert_eq!(c.queue().len(), 3);
        assert_eq!(out.last().map(String::as_str), Some("[ESP32] Queue full, discarding command"));
        assert_eq!(c.stats().dropped, 1);
    }

    #[tokio::test]
    async fn test_blank_lines_are_ignored() {
        let mut c = controller();
        let mut out: Vec<String> = Vec::new();
        assert!(c.accept_line("   \r", &mut out).await.unwrap());
        assert!(c.queue().is_empty());
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_process_next_on_empty_queue() {
        let mut c = controller();
        let mut out: Vec<String> = Vec::new();
        assert!(!c.process_next(&mut out).await.unwrap());
    }

    #[tokio::test]
    async fn test_malformed_command_gets_no_ack() {
        let mut c = controller();
        let mut out: Vec<String> = Vec::new();
        c.accept_line("not-json", &mut out).await.unwrap();
        assert!(c.process_next(&mut out).await.unwrap());
        assert!(out.iter().any(|l| l.starts_with("[ESP32] JSON parse error")));
        assert!(!out.iter().any(|l| l == ACK));
        assert_eq!(c.stats().failed, 1);
    }
}
