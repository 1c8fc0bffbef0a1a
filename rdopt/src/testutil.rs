//! Scripted toolchain for exercising the engine without codec binaries.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::Path;

use anyhow::Result;

use crate::tools::{ExpandJob, Toolchain, TruncateJob};

/// Deterministic stand-in for the external codec suite.
///
/// Truncation yields `100 >> reduce` bytes per layer per component file and
/// accrues "quality points" weighted by subband importance (low band
/// heaviest, motion lightest); expansion snapshots the accrued points; the
/// measured RMSE then falls monotonically with them, so more layers always
/// mean more rate and less distortion. A test can override individual
/// measurements by queueing explicit RMSE values.
#[derive(Default)]
pub struct MockToolchain {
    accrued: Cell<f64>,
    snapshot: Cell<f64>,
    pub scripted_rmse: RefCell<VecDeque<f64>>,
    pub truncations: Cell<usize>,
    pub expansions: Cell<usize>,
}

impl MockToolchain {
    fn weight(name: &str) -> f64 {
        if name.starts_with("low_") {
            8.0
        } else if let Some(rest) = name.strip_prefix("high_") {
            let level: f64 = rest
                .split('_')
                .next()
                .and_then(|l| l.parse().ok())
                .unwrap_or(1.0);
            level.exp2()
        } else {
            0.5
        }
    }

    pub fn rmse_for(points: f64) -> f64 {
        1000.0 * 64.0 / (64.0 + points)
    }
}

impl Toolchain for MockToolchain {
    fn truncate(&self, job: &TruncateJob) -> Result<u64> {
        self.truncations.set(self.truncations.get() + 1);
        let bytes = (job.layers as u64 * 100) >> job.reduce.min(6);
        let name = job
            .input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.accrued
            .set(self.accrued.get() + bytes as f64 * Self::weight(&name));
        Ok(bytes)
    }

    fn expand(&self, _job: &ExpandJob) -> Result<()> {
        self.expansions.set(self.expansions.get() + 1);
        self.snapshot.set(self.accrued.replace(0.0));
        Ok(())
    }

    fn measure(&self, _reference: &Path, _reconstruction: &Path) -> Result<f64> {
        if let Some(rmse) = self.scripted_rmse.borrow_mut().pop_front() {
            return Ok(rmse);
        }
        Ok(Self::rmse_for(self.snapshot.get()))
    }

    fn measure_per_frame(
        &self,
        _reference: &Path,
        _reconstruction: &Path,
        _frame_bytes: u64,
    ) -> Result<String> {
        Ok(String::new())
    }

    fn header_size(&self, _file: &Path) -> Result<u64> {
        Ok(0)
    }
}
