use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::thread;
use std::time::{Duration, Instant};

use tracing::info;

/// Shared counters for a pipeline run, with an optional heartbeat thread
/// that logs them periodically.
#[derive(Clone)]
pub struct Progress {
    enabled: bool,
    interval: Duration,
    pub stage: Arc<Mutex<String>>,
    pub families_done: Arc<AtomicUsize>,
    pub families_total: Arc<AtomicUsize>,
    pub assets_done: Arc<AtomicUsize>,
    pub assets_total: Arc<AtomicUsize>,
    running: Arc<AtomicBool>,
}

impl Progress {
    pub fn new(enabled: bool) -> Self {
        Self::with_interval(enabled, Duration::from_secs(5))
    }

    pub fn with_interval(enabled: bool, interval: Duration) -> Self {
        Self {
            enabled,
            interval,
            stage: Arc::new(Mutex::new(String::new())),
            families_done: Arc::new(AtomicUsize::new(0)),
            families_total: Arc::new(AtomicUsize::new(0)),
            assets_done: Arc::new(AtomicUsize::new(0)),
            assets_total: Arc::new(AtomicUsize::new(0)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_stage(&self, s: &str) {
        if self.enabled {
            if let Ok(mut stage) = self.stage.lock() {
                *stage = s.to_string();
            }
        }
    }
    pub fn set_families_total(&self, n: usize) {
        self.families_total.store(n, Ordering::Relaxed);
    }
    pub fn inc_family(&self) {
        self.families_done.fetch_add(1, Ordering::Relaxed);
    }
    pub fn add_assets_total(&self, n: usize) {
        self.assets_total.fetch_add(n, Ordering::Relaxed);
    }
    pub fn inc_asset(&self) {
        self.assets_done.fetch_add(1, Ordering::Relaxed);
    }

    pub fn start(&self) {
        if !self.enabled {
            return;
        }
        self.running.store(true, Ordering::Relaxed);
        let this = self.clone();
        thread::spawn(move || {
            let t0 = Instant::now();
            while this.running.load(Ordering::Relaxed) {
                thread::sleep(this.interval);
                if !this.running.load(Ordering::Relaxed) {
                    break;
                }
                let stage = this.stage.lock().map(|s| s.clone()).unwrap_or_default();
                let ad = this.assets_done.load(Ordering::Relaxed);
                let at = this.assets_total.load(Ordering::Relaxed);
                let pct = if at > 0 { (ad as f64 / at as f64) * 100.0 } else { 0.0 };
                info!(
                    elapsed_s = t0.elapsed().as_secs(),
                    stage = %stage,
                    families = %format!(
                        "{}/{}",
                        this.families_done.load(Ordering::Relaxed),
                        this.families_total.load(Ordering::Relaxed)
                    ),
                    assets = %format!("{ad}/{at}"),
                    percent = pct as i32,
                    "progress"
                );
            }
        });
    }

    pub fn stop(&self) {
        if self.enabled {
            self.running.store(false, Ordering::Relaxed);
        }
    }
}
