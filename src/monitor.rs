//! Per-render performance accounting.

use crate::error::display_path;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

/// Aggregate timings of one render session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerfReport {
    pub components: usize,
    pub cache_hits: usize,
    pub total_ms: f64,
    pub average_ms: f64,
    pub slow: usize,
    pub very_slow: usize,
    /// Tag and duration of the slowest component
    pub slowest: Option<(String, f64)>,
}

pub trait PerformanceMonitor {
    fn start_session(&mut self);
    /// `file` is the module that defined the component, when known.
    fn record(&mut self, component: &str, elapsed: Duration, file: Option<&Path>, from_cache: bool);
    fn end_session(&mut self) -> PerfReport;
}

/// Counts renders against two thresholds and warns on each slow one.
#[derive(Debug, Clone)]
pub struct SessionMonitor {
    slow: Duration,
    very_slow: Duration,
    report: PerfReport,
}

impl SessionMonitor {
    pub fn new(slow_ms: u64, very_slow_ms: u64) -> Self {
        Self {
            slow: Duration::from_millis(slow_ms),
            very_slow: Duration::from_millis(very_slow_ms.max(slow_ms)),
            report: PerfReport::default(),
        }
    }
}

impl PerformanceMonitor for SessionMonitor {
    fn start_session(&mut self) {
        self.report = PerfReport::default();
    }

    fn record(&mut self, component: &str, elapsed: Duration, file: Option<&Path>, from_cache: bool) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        let report = &mut self.report;
        report.components += 1;
        report.total_ms += ms;
        if from_cache {
            report.cache_hits += 1;
        }

        if elapsed >= self.very_slow {
            report.very_slow += 1;
            tracing::warn!(component, file = %display_path(file), elapsed_ms = ms, "Very slow component render");
        } else if elapsed >= self.slow {
            report.slow += 1;
            tracing::warn!(component, file = %display_path(file), elapsed_ms = ms, "Slow component render");
        }

        if report.slowest.as_ref().map_or(true, |(_, worst)| ms > *worst) {
            report.slowest = Some((component.to_string(), ms));
        }
    }

    fn end_session(&mut self) -> PerfReport {
        let mut report = std::mem::take(&mut self.report);
        if report.components > 0 {
            report.average_ms = report.total_ms / report.components as f64;
        }
        report
    }
}
