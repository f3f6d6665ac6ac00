//! Time-series aggregation
//!
//! - **series**: per-zone periodic means of metric records
//! - **compare**: group means (dam vs. control, upstream vs. downstream)

mod compare;
mod series;

pub use compare::{compare, group_of};
pub use series::aggregate;

/// Running mean that ignores absent values.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    pub(crate) fn push(&mut self, value: Option<f64>) {
        if let Some(v) = value.filter(|v| v.is_finite()) {
            self.sum += v;
            self.count += 1;
        }
    }

    pub(crate) fn value(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}
