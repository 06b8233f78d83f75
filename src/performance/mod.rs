//! # Performance Metrics
//!
//! Tracks how long solver steps take over a rolling window and derives
//! throughput from it, most usefully MLUPS (million lattice-cell updates
//! per second), which makes runs on different domain sizes comparable.
//!
//! ## Usage
//!
//! ```rust
//! use lbm_free_surface::performance::PerformanceMonitor;
//!
//! let mut monitor = PerformanceMonitor::new();
//!
//! for _ in 0..3 {
//!     monitor.begin_step();
//!     // ... solver.simulation_step() ...
//!     monitor.end_step(32 * 32 * 32);
//! }
//! monitor.update_metrics();
//! assert_eq!(monitor.get_metrics().total_steps, 3);
//! ```

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Aggregated step timing
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceMetrics {
    pub steps_per_second: f64,
    /// Average step time in milliseconds
    pub step_time_ms: f64,
    pub min_step_time_ms: f64,
    pub max_step_time_ms: f64,
    /// Million lattice-cell updates per second over the window
    pub mlups: f64,
    /// Steps recorded since the last reset
    pub total_steps: u64,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self {
            steps_per_second: 0.0,
            step_time_ms: 0.0,
            min_step_time_ms: f64::MAX,
            max_step_time_ms: 0.0,
            mlups: 0.0,
            total_steps: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct StepSample {
    duration: Duration,
    cells: usize,
}

/// Rolling-window step timer
pub struct PerformanceMonitor {
    samples: VecDeque<StepSample>,
    max_samples: usize,
    step_start: Option<Instant>,
    current_metrics: PerformanceMetrics,
    total_steps: u64,
    last_update: Instant,
    /// Metrics are recalculated at most this often
    update_interval: Duration,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::with_config(120, Duration::from_millis(100))
    }

    pub fn with_config(max_samples: usize, update_interval: Duration) -> Self {
        let max_samples = max_samples.max(1);
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples,
            step_start: None,
            current_metrics: PerformanceMetrics::default(),
            total_steps: 0,
            last_update: Instant::now(),
            update_interval,
        }
    }

    pub fn begin_step(&mut self) {
        self.step_start = Some(Instant::now());
    }

    /// Close the step opened by [`begin_step`](Self::begin_step); `cells`
    /// is the number of lattice cells it updated
    pub fn end_step(&mut self, cells: usize) {
        if let Some(start) = self.step_start.take() {
            self.record_step(start.elapsed(), cells);
        }
    }

    /// Record a step timed elsewhere
    pub fn record_step(&mut self, duration: Duration, cells: usize) {
        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(StepSample { duration, cells });
        self.total_steps += 1;

        if self.last_update.elapsed() >= self.update_interval {
            self.update_metrics();
            self.last_update = Instant::now();
        }
    }

    /// Recalculate metrics from the current window
    pub fn update_metrics(&mut self) {
        self.current_metrics.total_steps = self.total_steps;
        if self.samples.is_empty() {
            return;
        }

        let total_time: Duration = self.samples.iter().map(|s| s.duration).sum();
        let total_cells: usize = self.samples.iter().map(|s| s.cells).sum();
        let seconds = total_time.as_secs_f64();
        let average_ms = seconds * 1000.0 / self.samples.len() as f64;

        let metrics = &mut self.current_metrics;
        metrics.step_time_ms = average_ms;
        if seconds > 0.0 {
            metrics.steps_per_second = self.samples.len() as f64 / seconds;
            metrics.mlups = total_cells as f64 / seconds / 1e6;
        } else {
            metrics.steps_per_second = 0.0;
            metrics.mlups = 0.0;
        }

        if let (Some(min), Some(max)) = (
            self.samples.iter().map(|s| s.duration).min(),
            self.samples.iter().map(|s| s.duration).max(),
        ) {
            metrics.min_step_time_ms = min.as_secs_f64() * 1000.0;
            metrics.max_step_time_ms = max.as_secs_f64() * 1000.0;
        }
    }

    pub fn get_metrics(&self) -> &PerformanceMetrics {
        &self.current_metrics
    }

    /// Step times in the window, in milliseconds
    pub fn get_step_time_history(&self) -> Vec<f64> {
        self.samples
            .iter()
            .map(|s| s.duration.as_secs_f64() * 1000.0)
            .collect()
    }

    /// One-line summary for logging
    pub fn summary(&self) -> String {
        let m = &self.current_metrics;
        format!(
            "{} steps, {:.3} ms/step, {:.1} steps/s, {:.2} MLUPS",
            m.total_steps, m.step_time_ms, m.steps_per_second, m.mlups
        )
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.current_metrics = PerformanceMetrics::default();
        self.total_steps = 0;
        self.step_start = None;
        self.last_update = Instant::now();
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}
