//! Trajectory buffer.

use serde::{Deserialize, Serialize};

/// Times and stacked states `y = [q; q̇]` of every step taken.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub t: Vec<f64>,
    pub y: Vec<Vec<f64>>,
}

impl Solution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sample. Times are expected to be non-decreasing.
    pub fn push(&mut self, t: f64, y: Vec<f64>) {
        self.t.push(t);
        self.y.push(y);
    }

    /// State of sample `i`.
    pub fn step(&self, i: usize) -> Option<&[f64]> {
        self.y.get(i).map(Vec::as_slice)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.t.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    /// Locates `ti` by a forward scan starting at `hint`.
    ///
    /// Returns `(k, s)` with `ti ≈ t[k] + s (t[k+1] - t[k])`. Times before
    /// the first sample clamp to `(0, 0.0)`, times after the last to
    /// `(len - 2, 1.0)`. Fewer than two samples always give `(0, 0.0)`.
    pub fn search_time(&self, ti: f64, hint: usize) -> (usize, f64) {
        let n = self.t.len();
        if n < 2 {
            return (0, 0.0);
        }
        let mut i = hint.min(n - 1);
        // the hint may overshoot; back up until t[i - 1] < ti
        while i > 0 && ti <= self.t[i - 1] {
            i -= 1;
        }
        while i < n && ti > self.t[i] {
            i += 1;
        }
        if i == 0 {
            return (0, 0.0);
        }
        let k = i - 1;
        if k >= n - 1 {
            return (n - 2, 1.0);
        }
        let span = self.t[k + 1] - self.t[k];
        let s = if span > 0.0 { (ti - self.t[k]) / span } else { 0.0 };
        (k, s)
    }

    /// Linearly interpolated state at `ti`, clamped to the recorded range.
    pub fn interpolate(&self, ti: f64, hint: usize) -> Option<Vec<f64>> {
        match self.y.len() {
            0 => None,
            1 => Some(self.y[0].clone()),
            _ => {
                let (k, s) = self.search_time(ti, hint);
                Some(
                    self.y[k]
                        .iter()
                        .zip(&self.y[k + 1])
                        .map(|(a, b)| a + s * (b - a))
                        .collect(),
                )
            }
        }
    }
}
