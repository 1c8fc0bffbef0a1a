//! Rate accounting.
//!
//! The extraction sweep records how many payload bytes each subband
//! contributed per frame; this module folds that ledger into kb/s figures:
//! the whole-span aggregate, one figure per GOP (index 0 being the GOP-0
//! anchor frame), and the per-subband detail used by the candidate logs.

use crate::geometry::{FrameSpan, Geometry};

const BITS_PER_KB: f64 = 1000.0;

/// Payload bytes per frame, per subband, in allocation-index order.
///
/// Subbands that were skipped (zero requested layers) keep an empty row and
/// contribute nothing.
#[derive(Debug, Clone)]
pub struct RateLedger {
    per_subband: Vec<Vec<u64>>,
}

impl RateLedger {
    pub fn new(subbands: usize) -> Self {
        Self {
            per_subband: vec![Vec::new(); subbands],
        }
    }

    pub fn push(&mut self, subband: usize, bytes: u64) {
        self.per_subband[subband].push(bytes);
    }

    pub fn frames(&self, subband: usize) -> &[u64] {
        &self.per_subband[subband]
    }

    pub fn subband_total(&self, subband: usize) -> u64 {
        self.per_subband[subband].iter().sum()
    }

    pub fn total(&self) -> u64 {
        self.per_subband.iter().flatten().sum()
    }
}

/// Rate figures of one evaluated candidate, all in kb/s.
#[derive(Debug, Clone)]
pub struct KbpsReport {
    /// Index 0 is the GOP-0 anchor; 1.. are the GOPs of the span.
    pub per_gop: Vec<f64>,
    /// Whole-span aggregate.
    pub average: f64,
    /// Per texture subband, allocation-index order.
    pub texture: Vec<f64>,
    /// Per motion field, allocation-index order.
    pub motion: Vec<f64>,
}

impl KbpsReport {
    /// The rate the search compares against: the first GOP of the span.
    pub fn comparison_rate(&self) -> f64 {
        self.per_gop.get(1).copied().unwrap_or(0.0)
    }

    pub fn anchor_rate(&self) -> f64 {
        self.per_gop.first().copied().unwrap_or(0.0)
    }

    /// One-line breakdown for the candidate detail log.
    pub fn detail(&self) -> String {
        let csv = |values: &[f64]| {
            values
                .iter()
                .map(|v| format!("{v:.3}"))
                .collect::<Vec<_>>()
                .join(" ")
        };
        format!(
            "  M {}\toutL {:.3}\tT {}\tTM {}\tTM_average {:.3}",
            csv(&self.motion),
            self.texture.first().copied().unwrap_or(0.0),
            csv(&self.texture),
            csv(&self.per_gop),
            self.average,
        )
    }
}

/// Folds a ledger into the kb/s report for `span`.
pub fn kbps_report(ledger: &RateLedger, geo: &Geometry, span: &FrameSpan, fps: f64) -> KbpsReport {
    let duration = span.pictures as f64 / fps;
    let kbps = |bytes: u64, seconds: f64| bytes as f64 * 8.0 / BITS_PER_KB / seconds;

    let texture: Vec<f64> = (0..geo.trls)
        .map(|z| kbps(ledger.subband_total(z), duration))
        .collect();
    let motion: Vec<f64> = (geo.trls..geo.subbands())
        .map(|z| kbps(ledger.subband_total(z), duration))
        .collect();

    // The first low-band frame is the GOP-0 anchor.
    let anchor_bytes = ledger.frames(0).first().copied().unwrap_or(0);
    let mut per_gop = vec![kbps(anchor_bytes, 1.0 / fps)];

    let gop_seconds = geo.gop_size as f64 / fps;
    for g in 0..span.gops_to_expand {
        let mut bytes = gop_slice(ledger.frames(0), 1 + g * geo.low_frames_per_gop(), geo.low_frames_per_gop());
        for level in 1..geo.trls {
            let per_gop_frames = geo.high_frames_per_gop(level);
            bytes += gop_slice(
                ledger.frames(geo.texture_index(level)),
                g * per_gop_frames,
                per_gop_frames,
            );
        }
        for field in 1..geo.trls {
            let per_gop_fields = geo.high_frames_per_gop(field);
            bytes += gop_slice(
                ledger.frames(geo.motion_index(field)),
                g * per_gop_fields,
                per_gop_fields,
            );
        }
        per_gop.push(kbps(bytes, gop_seconds));
    }

    KbpsReport {
        per_gop,
        average: kbps(ledger.total(), duration),
        texture,
        motion,
    }
}

fn gop_slice(frames: &[u64], start: usize, count: usize) -> u64 {
    frames
        .iter()
        .skip(start)
        .take(count)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_subbands_contribute_nothing() {
        let geo = Geometry::new(3, 1);
        let ledger = RateLedger::new(geo.subbands());
        let report = kbps_report(&ledger, &geo, &geo.span_whole(), 30.0);
        assert_eq!(report.average, 0.0);
        assert_eq!(report.comparison_rate(), 0.0);
    }

    #[test]
    fn anchor_and_gop_rates_are_separated() {
        // T=2: one low band, one high band, one motion field; GOP of 2.
        let geo = Geometry::new(2, 1);
        let span = geo.span_whole();
        let mut ledger = RateLedger::new(geo.subbands());
        // Low band: anchor frame + one GOP frame.
        ledger.push(0, 1000);
        ledger.push(0, 500);
        // High band: one frame.
        ledger.push(1, 250);
        // Motion field: one field.
        ledger.push(2, 125);

        let report = kbps_report(&ledger, &geo, &span, 30.0);
        // Anchor: 1000 bytes over one frame time.
        assert!((report.anchor_rate() - 1000.0 * 8.0 / 1000.0 * 30.0).abs() < 1e-9);
        // GOP 1: remaining 875 bytes over the GOP duration.
        assert!((report.comparison_rate() - 875.0 * 8.0 / 1000.0 / (2.0 / 30.0)).abs() < 1e-9);
        // Aggregate over the 3-picture span.
        assert!((report.average - 1875.0 * 8.0 / 1000.0 / (3.0 / 30.0)).abs() < 1e-9);
    }

    #[test]
    fn rate_grows_with_allocation() {
        let geo = Geometry::new(2, 1);
        let span = geo.span_whole();
        let mut small = RateLedger::new(geo.subbands());
        small.push(0, 100);
        small.push(0, 100);
        let mut large = RateLedger::new(geo.subbands());
        large.push(0, 100);
        large.push(0, 300);
        large.push(1, 50);

        let a = kbps_report(&small, &geo, &span, 30.0);
        let b = kbps_report(&large, &geo, &span, 30.0);
        assert!(b.comparison_rate() > a.comparison_rate());
        assert!(b.average > a.average);
    }
}
