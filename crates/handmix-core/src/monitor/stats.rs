//! Fixed-capacity rolling window statistics

use serde::Serialize;

/// Summary of a window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WindowStats {
    pub mean: f32,
    pub p95: f32,
    pub max: f32,
    pub count: usize,
}

/// Rolling window over the last `capacity` samples
///
/// Storage and the sort scratch are allocated once; pushing never allocates.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    values: Vec<f32>,
    scratch: Vec<f32>,
    capacity: usize,
    next: usize,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: Vec::with_capacity(capacity),
            scratch: Vec::with_capacity(capacity),
            capacity,
            next: 0,
        }
    }

    /// Add a sample, evicting the oldest once full (non-finite values are ignored)
    pub fn push(&mut self, value: f32) {
        if !value.is_finite() {
            return;
        }
        if self.values.len() < self.capacity {
            self.values.push(value);
        } else {
            self.values[self.next] = value;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.next = 0;
    }

    /// Most recently pushed value
    pub fn last(&self) -> Option<f32> {
        if self.values.is_empty() {
            return None;
        }
        let idx = (self.next + self.capacity - 1) % self.capacity;
        self.values.get(idx).copied()
    }

    /// 95th percentile (nearest rank), 0 when empty
    pub fn p95(&mut self) -> f32 {
        self.percentile(0.95)
    }

    pub fn stats(&mut self) -> WindowStats {
        if self.values.is_empty() {
            return WindowStats::default();
        }
        let sum: f32 = self.values.iter().sum();
        let max = self.values.iter().copied().fold(f32::MIN, f32::max);
        WindowStats {
            mean: sum / self.values.len() as f32,
            p95: self.p95(),
            max,
            count: self.values.len(),
        }
    }

    fn percentile(&mut self, q: f32) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.scratch.clear();
        self.scratch.extend_from_slice(&self.values);
        self.scratch.sort_by(|a, b| a.total_cmp(b));
        let rank = (q * self.scratch.len() as f32).ceil() as usize;
        self.scratch[rank.clamp(1, self.scratch.len()) - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_over_known_values() {
        let mut window = RollingWindow::new(100);
        for i in 1..=100 {
            window.push(i as f32);
        }
        let stats = window.stats();
        assert_eq!(stats.count, 100);
        assert_eq!(stats.max, 100.0);
        assert!((stats.mean - 50.5).abs() < 1e-4);
        assert_eq!(stats.p95, 95.0);
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut window = RollingWindow::new(3);
        for v in [100.0, 1.0, 2.0, 3.0] {
            window.push(v);
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.stats().max, 3.0);
        assert_eq!(window.last(), Some(3.0));
    }

    #[test]
    fn test_empty_and_non_finite() {
        let mut window = RollingWindow::new(4);
        window.push(f32::NAN);
        assert!(window.is_empty());
        assert_eq!(window.stats(), WindowStats::default());
    }
}
