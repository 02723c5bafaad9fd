//! Cycle scheduling
//!
//! Runs the repost pipeline once, or forever with a fixed delay between the end
//! of one cycle and the start of the next. Cycles never overlap, and no cycle
//! outcome stops the loop. Only shutdown (or `max_cycles`) does.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::config::{RunMode, SchedulingConfig};
use crate::error::Result;
use crate::pipeline::RepostPipeline;
use crate::types::CycleOutcome;

/// Granularity of shutdown checks while sleeping
const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

/// Cooperative shutdown flag shared by the signal handler, pipeline and scheduler
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early on shutdown
    ///
    /// Returns false if shutdown cut the sleep short.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_triggered() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            sleep(SHUTDOWN_POLL.min(deadline - now)).await;
        }
    }
}

/// Totals over one scheduler run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub cycles: u64,
    pub published: u64,
    pub no_new_content: u64,
    pub failed: u64,
    pub last_outcome: Option<CycleOutcome>,
}

impl RunSummary {
    fn record(&mut self, outcome: &CycleOutcome) {
        self.cycles += 1;
        match outcome {
            CycleOutcome::Published { .. } => self.published += 1,
            CycleOutcome::NoNewContent { .. } => self.no_new_content += 1,
            CycleOutcome::Failed { .. } => self.failed += 1,
            CycleOutcome::Interrupted { .. } => {}
        }
        self.last_outcome = Some(outcome.clone());
    }

    /// Exit code for the process: the last outcome's, or 0 if nothing ran
    pub fn exit_code(&self) -> i32 {
        self.last_outcome
            .as_ref()
            .map(CycleOutcome::exit_code)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    mode: RunMode,
    interval: Duration,
    max_cycles: Option<u64>,
}

impl Scheduler {
    pub fn new(mode: RunMode, interval: Duration) -> Self {
        Self {
            mode,
            interval,
            max_cycles: None,
        }
    }

    pub fn from_config(config: &SchedulingConfig) -> Result<Self> {
        Ok(Self::new(config.mode, config.interval()?))
    }

    /// Stop looping after `cycles` cycles
    pub fn with_max_cycles(mut self, cycles: Option<u64>) -> Self {
        self.max_cycles = cycles;
        self
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Drive `pipeline` until the mode, `max_cycles` or shutdown says stop
    ///
    /// `on_outcome` sees every cycle outcome as soon as the cycle ends.
    pub async fn run<F>(&self, pipeline: &mut RepostPipeline, mut on_outcome: F) -> RunSummary
    where
        F: FnMut(&CycleOutcome),
    {
        let shutdown = pipeline.shutdown();
        let mut summary = RunSummary::default();

        loop {
            let outcome = pipeline.run_cycle().await;
            summary.record(&outcome);
            on_outcome(&outcome);

            if self.mode == RunMode::Once {
                break;
            }
            if matches!(outcome, CycleOutcome::Interrupted { .. }) || shutdown.is_triggered() {
                info!("Shutdown requested, stopping after {} cycle(s)", summary.cycles);
                break;
            }
            if self.max_cycles.is_some_and(|max| summary.cycles >= max) {
                debug!(cycles = summary.cycles, "Reached cycle limit");
                break;
            }

            debug!(interval = %humantime::format_duration(self.interval), "Waiting for next cycle");
            if !shutdown.sleep(self.interval).await {
                info!("Shutdown requested while waiting, stopping after {} cycle(s)", summary.cycles);
                break;
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sleep_completes_without_shutdown() {
        let shutdown = Shutdown::new();
        assert!(shutdown.sleep(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_sleep_wakes_on_shutdown() {
        let shutdown = Shutdown::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            trigger.trigger();
        });

        let started = std::time::Instant::now();
        assert!(!shutdown.sleep(Duration::from_secs(30)).await);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_summary_counts_outcomes() {
        use crate::error::ErrorKind;
        use crate::types::{Creator, Stage};

        let mut summary = RunSummary::default();
        summary.record(&CycleOutcome::NoNewContent {
            creator: Creator::new("alice"),
        });
        summary.record(&CycleOutcome::Failed {
            stage: Stage::Publish,
            kind: ErrorKind::AuthChallenge,
            message: "login".to_string(),
        });

        assert_eq!(summary.cycles, 2);
        assert_eq!(summary.no_new_content, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.exit_code(), 3);
    }

    #[test]
    fn test_empty_summary_exits_zero() {
        assert_eq!(RunSummary::default().exit_code(), 0);
    }
}
