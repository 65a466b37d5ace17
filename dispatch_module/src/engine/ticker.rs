use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info};

use super::dispatch::DispatchEngine;
use super::types::EngineError;

/// Finds due scheduled/recurring campaigns and hands them to the dispatch
/// pipeline. A one-minute poll interval is plenty for email-campaign timing.
pub struct DispatchTicker {
    engine: Arc<DispatchEngine>,
}

impl DispatchTicker {
    pub fn new(engine: Arc<DispatchEngine>) -> Self {
        Self { engine }
    }

    /// One pass over due campaigns. Returns how many were fired. Safe to run
    /// from multiple concurrent ticker instances: the store-level status
    /// claim inside `fire_due_campaign` lets exactly one of them win.
    pub fn tick(&self) -> Result<usize, EngineError> {
        let due = self.engine.store().due_campaigns(Utc::now())?;
        let mut fired = 0usize;
        for campaign in due {
            match self.engine.fire_due_campaign(campaign.id) {
                Ok(Some(summary)) => {
                    fired += 1;
                    info!(
                        campaign_id = %campaign.id,
                        sent = summary.sent,
                        failed = summary.failed,
                        "ticker dispatched due campaign"
                    );
                }
                Ok(None) => {}
                Err(err) => {
                    // One broken campaign must not starve the rest.
                    error!(campaign_id = %campaign.id, "ticker dispatch failed: {err}");
                }
            }
        }
        Ok(fired)
    }

    pub fn run_loop(&self, poll_interval: Duration, stop_flag: &AtomicBool) {
        while !stop_flag.load(Ordering::Relaxed) {
            if let Err(err) = self.tick() {
                error!("ticker pass failed: {err}");
            }
            thread::sleep(poll_interval);
        }
    }
}

pub struct TickerControl {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl TickerControl {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn stop_and_join(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

pub fn start_ticker_thread(engine: Arc<DispatchEngine>, poll_interval: Duration) -> TickerControl {
    let stop = Arc::new(AtomicBool::new(false));
    let thread_stop = stop.clone();
    let handle = thread::spawn(move || {
        let ticker = DispatchTicker::new(engine);
        ticker.run_loop(poll_interval, &thread_stop);
    });
    TickerControl {
        stop,
        handle: Some(handle),
    }
}
