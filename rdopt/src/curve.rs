//! Per-GOP rate/distortion curves and their aggregation.
//!
//! Per-GOP strategies produce one curve per GOP, generally of differing
//! lengths. The aggregator folds them into the unweighted mean over GOPs
//! 1..N (truncated to the shortest curve) and the final weighted curve that
//! folds the GOP-0 anchor back in.

use anyhow::Result;

use crate::rate::KbpsReport;
use crate::report::Reporter;

/// One point of a rate/distortion curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveSample {
    pub kbps: f64,
    pub rmse: f64,
}

/// Curves of all GOPs of one run.
#[derive(Debug, Clone)]
pub struct CurveSet {
    /// The GOP-0 anchor frame, recorded with the first GOP-1 sample.
    anchor: Option<CurveSample>,
    /// One curve per GOP, 1-based GOP index at offset 0.
    gops: Vec<Vec<CurveSample>>,
}

impl CurveSet {
    pub fn new(gops: usize) -> Self {
        Self {
            anchor: None,
            gops: vec![Vec::new(); gops],
        }
    }

    /// Appends one sample to `igop`'s curve.
    pub fn push(&mut self, igop: usize, kbps: &KbpsReport, rmse: f64) {
        if igop == 1 && self.anchor.is_none() {
            self.anchor = Some(CurveSample {
                kbps: kbps.anchor_rate(),
                rmse: 0.0,
            });
        }
        self.gops[igop - 1].push(CurveSample {
            kbps: kbps.comparison_rate(),
            rmse,
        });
    }

    pub fn anchor(&self) -> Option<CurveSample> {
        self.anchor
    }

    pub fn gop_curve(&self, igop: usize) -> &[CurveSample] {
        &self.gops[igop - 1]
    }

    /// Unweighted arithmetic mean over GOPs 1..N, truncated to the shortest
    /// curve length.
    pub fn mean_curve(&self) -> Vec<CurveSample> {
        let Some(shortest) = self.gops.iter().map(|curve| curve.len()).min() else {
            return Vec::new();
        };
        let n = self.gops.len() as f64;
        (0..shortest)
            .map(|k| CurveSample {
                kbps: self.gops.iter().map(|curve| curve[k].kbps).sum::<f64>() / n,
                rmse: self.gops.iter().map(|curve| curve[k].rmse).sum::<f64>() / n,
            })
            .collect()
    }

    /// Weighted final curve combining the GOP-0 anchor with the mean curve,
    /// weighted by `(pictures - 1) / pictures`.
    pub fn weighted_curve(&self, pictures: usize) -> Vec<CurveSample> {
        let weight = (pictures as f64 - 1.0) / pictures as f64;
        let anchor = self.anchor.unwrap_or(CurveSample {
            kbps: 0.0,
            rmse: 0.0,
        });
        self.mean_curve()
            .into_iter()
            .map(|mean| CurveSample {
                kbps: anchor.kbps * (1.0 - weight) + mean.kbps * weight,
                rmse: anchor.rmse * (1.0 - weight) + mean.rmse * weight,
            })
            .collect()
    }

    /// Emits the raw per-GOP data and the gnuplot-ready final curve.
    pub fn write(&self, reporter: &Reporter, pictures: usize) -> Result<()> {
        reporter.averages(&format!("anchor: {:?}", self.anchor))?;
        for (i, curve) in self.gops.iter().enumerate() {
            reporter.averages(&format!("gop {}: {curve:?}", i + 1))?;
        }
        reporter.averages(&format!("mean 1..N: {:?}", self.mean_curve()))?;

        for sample in self.weighted_curve(pictures) {
            reporter.gnuplot(&format!("{:.3}\t {:.6}", sample.kbps, sample.rmse))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(anchor: f64, gop: f64) -> KbpsReport {
        KbpsReport {
            per_gop: vec![anchor, gop],
            average: gop,
            texture: vec![],
            motion: vec![],
        }
    }

    #[test]
    fn anchor_is_recorded_once_with_the_first_gop1_sample() {
        let mut set = CurveSet::new(2);
        set.push(1, &report(10.0, 2.0), 5.0);
        set.push(1, &report(11.0, 3.0), 4.0);
        set.push(2, &report(12.0, 5.0), 6.0);

        let anchor = set.anchor().unwrap();
        assert_eq!(anchor.kbps, 10.0);
        assert_eq!(anchor.rmse, 0.0);
        assert_eq!(set.gop_curve(1).len(), 2);
        assert_eq!(set.gop_curve(2).len(), 1);
    }

    #[test]
    fn mean_curve_is_truncated_to_the_shortest_gop() {
        let mut set = CurveSet::new(2);
        set.push(1, &report(1.0, 2.0), 2.0);
        set.push(1, &report(1.0, 3.0), 3.0);
        set.push(1, &report(1.0, 4.0), 4.0);
        set.push(2, &report(1.0, 5.0), 5.0);
        set.push(2, &report(1.0, 6.0), 6.0);

        let mean = set.mean_curve();
        assert_eq!(mean.len(), 2);
        assert_eq!(mean[0].kbps, 3.5);
        assert_eq!(mean[1].kbps, 4.5);
        assert_eq!(mean[0].rmse, 3.5);
        assert!(mean.len() <= set.gop_curve(2).len());
    }

    #[test]
    fn single_frame_sequence_degenerates_to_the_anchor() {
        let mut set = CurveSet::new(1);
        set.push(1, &report(7.0, 3.0), 9.0);
        let weighted = set.weighted_curve(1);
        assert_eq!(weighted.len(), 1);
        assert_eq!(weighted[0].kbps, 7.0);
        assert_eq!(weighted[0].rmse, 0.0);
    }

    #[test]
    fn weighted_curve_blends_anchor_and_mean() {
        let mut set = CurveSet::new(1);
        set.push(1, &report(1.0, 3.0), 4.0);
        // 17 pictures: weight 16/17.
        let weighted = set.weighted_curve(17);
        let w = 16.0 / 17.0;
        assert!((weighted[0].kbps - (1.0 * (1.0 - w) + 3.0 * w)).abs() < 1e-12);
        assert!((weighted[0].rmse - 4.0 * w).abs() < 1e-12);
    }

    #[test]
    fn empty_set_produces_empty_curves() {
        let set = CurveSet::new(0);
        assert!(set.mean_curve().is_empty());
        assert!(set.weighted_curve(5).is_empty());
    }
}
