// src/pipeline/scheduler.rs

//! Fixed-interval tick driver.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use crate::models::SchedulerConfig;
use crate::pipeline::Pipeline;

/// Fires a pipeline tick every `period`, starting one period after launch.
///
/// A firing that finds the previous tick still running is dropped, not
/// queued.
pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    period: Duration,
}

impl Scheduler {
    pub fn new(pipeline: Arc<Pipeline>, period: Duration) -> Self {
        Self { pipeline, period }
    }

    pub fn from_config(pipeline: Arc<Pipeline>, config: &SchedulerConfig) -> Self {
        Self::new(pipeline, Duration::from_secs(config.interval_secs))
    }

    /// Loop until `shutdown` resolves. An in-flight tick is aborted on exit.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut timer = interval_at(Instant::now() + self.period, self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        log::info!(
            "Scheduler started; first tick in {}s",
            self.period.as_secs()
        );

        let mut ticks = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    log::info!("Shutdown signal received");
                    break;
                }
                _ = timer.tick() => {
                    let pipeline = Arc::clone(&self.pipeline);
                    ticks.spawn(async move {
                        pipeline.try_run().await;
                    });
                }
                Some(joined) = ticks.join_next(), if !ticks.is_empty() => {
                    if let Err(e) = joined {
                        log::error!("Tick task failed: {}", e);
                    }
                }
            }
        }

        if !ticks.is_empty() {
            log::warn!("Cancelling in-flight tick");
            ticks.abort_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Config;
    use crate::pipeline::tick::tests::Harness;

    const URL: &str = "https://www.kijiji.ca/b-bikes/k0";

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_waits_one_period() {
        let h = Harness::new(&Config::default());
        h.track("s1", URL).await;

        let scheduler = Scheduler::new(h.pipeline.clone(), Duration::from_secs(300));
        scheduler
            .run(tokio::time::sleep(Duration::from_secs(299)))
            .await;

        assert!(h.pages.requests.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_repeat_until_shutdown() {
        let h = Harness::new(&Config::default());
        h.track("s1", URL).await;

        // Ticks fire at 300s, 600s and 900s.
        let scheduler = Scheduler::new(h.pipeline.clone(), Duration::from_secs(300));
        scheduler
            .run(tokio::time::sleep(Duration::from_secs(1050)))
            .await;

        assert_eq!(h.pages.requests.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_from_config_uses_interval() {
        let h = Harness::new(&Config::default());
        let scheduler = Scheduler::from_config(h.pipeline.clone(), &Config::default().scheduler);
        assert_eq!(scheduler.period, Duration::from_secs(300));
    }
}
