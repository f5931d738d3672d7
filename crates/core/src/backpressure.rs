//! Backpressure Governor: samples process RSS and system CPU, derives a
//! pressure ratio, and turns it into a slowdown factor and a Frame Queue
//! size suggestion.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use sysinfo::{Pid, System};

/// Slowdown factor `S` range and starting point (§4.5: producers sleep
/// `0.033 * (S - 1)`, so S = 1.0 means no extra sleep at all).
const SLOWDOWN_MIN: f32 = 1.0;
const SLOWDOWN_MAX: f32 = 3.0;
const SLOWDOWN_MID_CAP: f32 = 2.0;
const SLOWDOWN_HIGH_STEP: f32 = 1.2;
const SLOWDOWN_MID_STEP: f32 = 1.1;
const SLOWDOWN_RELAX_STEP: f32 = 0.9;

#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub rss_bytes: u64,
    pub cpu_percent: f32,
    pub pressure: f32,
}

/// Tracks RSS/CPU pressure across repeated `sample()` calls and maintains a
/// slowdown factor `S` in `[1.0, 3.0]` that climbs multiplicatively under
/// pressure and relaxes multiplicatively once it falls.
pub struct BackpressureGovernor {
    system: Mutex<System>,
    pid: Pid,
    mem_threshold_bytes: u64,
    cpu_threshold_percent: f32,
    slowdown_millipercent: AtomicU32,
}

impl BackpressureGovernor {
    pub fn new(mem_threshold_bytes: u64, cpu_threshold_percent: f32) -> Self {
        let pid = Pid::from_u32(std::process::id());
        let mut system = System::new();
        system.refresh_process(pid);
        Self {
            system: Mutex::new(system),
            pid,
            mem_threshold_bytes,
            cpu_threshold_percent,
            slowdown_millipercent: AtomicU32::new((SLOWDOWN_MIN * 1000.0) as u32),
        }
    }

    /// Refreshes process stats and recomputes the slowdown factor. Call on
    /// a roughly 1s cadence from each Render Worker's supervising loop.
    pub fn sample(&self) -> Sample {
        let mut system = self.system.lock().unwrap();
        system.refresh_process(self.pid);
        let (rss_bytes, cpu_percent) = match system.process(self.pid) {
            Some(p) => (p.memory(), p.cpu_usage()),
            None => (0, 0.0),
        };
        drop(system);

        let mem_ratio = rss_bytes as f32 / self.mem_threshold_bytes.max(1) as f32;
        let cpu_ratio = cpu_percent / self.cpu_threshold_percent.max(0.01);
        let pressure = mem_ratio.max(cpu_ratio);

        self.update_slowdown(pressure);

        Sample {
            rss_bytes,
            cpu_percent,
            pressure,
        }
    }

    fn update_slowdown(&self, pressure: f32) {
        let current = self.slowdown_millipercent.load(Ordering::Relaxed) as f32 / 1000.0;
        let next = if pressure > 1.5 {
            (current * SLOWDOWN_HIGH_STEP).min(SLOWDOWN_MAX)
        } else if pressure > 1.0 {
            (current * SLOWDOWN_MID_STEP).min(SLOWDOWN_MID_CAP)
        } else if pressure < 0.7 {
            (current * SLOWDOWN_RELAX_STEP).max(SLOWDOWN_MIN)
        } else {
            current
        };
        self.slowdown_millipercent
            .store((next * 1000.0) as u32, Ordering::Relaxed);
    }

    /// Current slowdown factor `S`: producers sleep `0.033 * (S - 1)`
    /// seconds before pulling the next frame.
    pub fn slowdown_factor(&self) -> f32 {
        self.slowdown_millipercent.load(Ordering::Relaxed) as f32 / 1000.0
    }

    /// Suggested Frame Queue element capacity given the current slowdown,
    /// linearly interpolated between `max_capacity` (no pressure) and
    /// `min_capacity` (max pressure).
    pub fn suggest_queue_capacity(&self, min_capacity: usize, max_capacity: usize) -> usize {
        let s = (self.slowdown_factor() - SLOWDOWN_MIN) / (SLOWDOWN_MAX - SLOWDOWN_MIN);
        let span = max_capacity.saturating_sub(min_capacity) as f32;
        max_capacity - (span * s).round() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_slowdown_one() {
        let gov = BackpressureGovernor::new(8 * 1024 * 1024 * 1024, 80.0);
        assert_eq!(gov.slowdown_factor(), 1.0);
    }

    #[test]
    fn high_pressure_steps_up_by_1_2x_and_caps_at_3() {
        let gov = BackpressureGovernor::new(1, 1.0);
        gov.update_slowdown(2.0);
        assert!((gov.slowdown_factor() - 1.2).abs() < 1e-6);
        for _ in 0..50 {
            gov.update_slowdown(2.0);
        }
        assert!(gov.slowdown_factor() <= SLOWDOWN_MAX);
        assert!((gov.slowdown_factor() - SLOWDOWN_MAX).abs() < 1e-3);
    }

    #[test]
    fn moderate_pressure_steps_up_by_1_1x_and_caps_at_2() {
        let gov = BackpressureGovernor::new(1, 1.0);
        for _ in 0..50 {
            gov.update_slowdown(1.2);
        }
        assert!((gov.slowdown_factor() - SLOWDOWN_MID_CAP).abs() < 1e-3);
    }

    #[test]
    fn low_pressure_relaxes_slowdown_toward_one() {
        let gov = BackpressureGovernor::new(1, 1.0);
        gov.update_slowdown(2.0);
        let raised = gov.slowdown_factor();
        gov.update_slowdown(0.1);
        assert!(gov.slowdown_factor() < raised);
        for _ in 0..50 {
            gov.update_slowdown(0.1);
        }
        assert!((gov.slowdown_factor() - SLOWDOWN_MIN).abs() < 1e-3);
    }

    #[test]
    fn mid_pressure_band_holds_steady() {
        let gov = BackpressureGovernor::new(1, 1.0);
        gov.update_slowdown(2.0);
        let raised = gov.slowdown_factor();
        gov.update_slowdown(0.9); // neither > 1.0 nor < 0.7
        assert_eq!(gov.slowdown_factor(), raised);
    }

    #[test]
    fn queue_capacity_suggestion_shrinks_under_pressure() {
        let gov = BackpressureGovernor::new(1, 1.0);
        let relaxed = gov.suggest_queue_capacity(15, 120);
        assert_eq!(relaxed, 120);
        for _ in 0..10 {
            gov.update_slowdown(10.0);
        }
        let loaded = gov.suggest_queue_capacity(15, 120);
        assert!(loaded < relaxed);
    }
}
