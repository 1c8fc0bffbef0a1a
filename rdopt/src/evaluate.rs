//! The bit-allocation evaluator.
//!
//! One [`SearchRun`] carries everything a search needs between candidate
//! evaluations: the reference rate/distortion point, the best candidate seen
//! since the last accepted improvement, and the empty-layer counter. A call
//! to [`SearchRun::evaluate`] truncates the candidate, reconstructs it,
//! measures rate and distortion, derives the R-D slope against the reference
//! point, and updates the best candidate when the slope beats the run's
//! record.

use anyhow::Result;
use log::debug;

use crate::alloc::{Allocation, Candidate, Reduction};
use crate::extract;
use crate::geometry::{self, FrameSpan, Geometry};
use crate::params::{MAX_RATE, Params};
use crate::rate::{KbpsReport, kbps_report};
use crate::report::Reporter;
use crate::scope::Scope;
use crate::tools::{ExpandJob, Toolchain};
use crate::utils::errors::ConfigError;
use crate::workspace::Workspace;

/// Rate epsilon for the equal-rate slope rule, in kb/s.
///
/// Improving quality without spending bits seems impossible, but happens:
/// per-GOP searches only look at their own GOP while the codestream's GOP-0
/// anchor can grow on its own, leaving the compared rate unchanged.
pub const RATE_EPSILON: f64 = 0.001;

/// Outcome class of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    /// The zero-allocation candidate: slope undefined, becomes the
    /// reference point.
    Baseline,
    /// Distortion improved and the slope beats the run's best.
    Accepted { slope: f64 },
    /// Distortion did not improve (`slope` is `None`, an empty layer), or
    /// improved with a slope that does not beat the best.
    Rejected { slope: Option<f64> },
}

/// Everything measured for one candidate.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub kbps: KbpsReport,
    pub rmse: f64,
    pub verdict: Verdict,
}

impl Evaluation {
    /// The derived slope, zero for the baseline and empty layers.
    pub fn slope(&self) -> f64 {
        match self.verdict {
            Verdict::Accepted { slope } => slope,
            Verdict::Rejected { slope } => slope.unwrap_or(0.0),
            Verdict::Baseline => 0.0,
        }
    }
}

/// The best candidate of a run, decoupled from whatever the search mutates
/// next.
#[derive(Debug, Clone)]
pub struct Best {
    pub layers: Allocation,
    pub reduces: Reduction,
    pub reduces_normalized: Reduction,
    pub kbps: KbpsReport,
    pub rmse: f64,
    pub slope: f64,
}

/// Which reconstruction is measured against which reference.
///
/// The reconstruction name resolves under `tmp/`, the reference under the
/// base directory.
#[derive(Debug, Clone)]
pub struct MeasurePair {
    pub reconstruction: String,
    pub reference: String,
}

impl MeasurePair {
    pub fn new(reconstruction: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            reconstruction: reconstruction.into(),
            reference: reference.into(),
        }
    }
}

/// Mutable context of one search run.
pub struct SearchRun<'a> {
    pub params: &'a Params,
    pub geo: Geometry,
    pub tools: &'a dyn Toolchain,
    pub ws: &'a Workspace,
    pub reporter: &'a Reporter,
    pub scope: Scope,
    /// Per-subband reduction maxima the candidates are clamped against.
    pub limits: Reduction,
    pub prev_rate: f64,
    pub prev_rmse: f64,
    /// Baseline distortion, restorable when a full-search round stalls.
    pub first_rmse: f64,
    pub best: Option<Best>,
    pub best_slope: f64,
    /// Consecutive evaluations of the current subband that added rate
    /// without improving distortion.
    pub empty_layers: usize,
}

impl<'a> SearchRun<'a> {
    pub fn new(
        params: &'a Params,
        tools: &'a dyn Toolchain,
        ws: &'a Workspace,
        reporter: &'a Reporter,
        scope: Scope,
        limits: Reduction,
    ) -> Self {
        Self {
            params,
            geo: params.geometry(),
            tools,
            ws,
            reporter,
            scope,
            limits,
            prev_rate: 0.0,
            prev_rmse: MAX_RATE,
            first_rmse: MAX_RATE,
            best: None,
            best_slope: -MAX_RATE,
            empty_layers: 0,
        }
    }

    /// Truncate, reconstruct, measure, and rank one candidate.
    pub fn evaluate(
        &mut self,
        cand: &Candidate,
        span: &FrameSpan,
        refs: &MeasurePair,
    ) -> Result<Evaluation> {
        let normalized = cand.reduces.normalized(&self.limits);
        let (px, py, blocks) = self.derive_resolution(&normalized)?;

        // Extraction.
        self.ws.recreate_extract()?;
        let ledger = extract::sweep(
            &self.geo,
            self.ws,
            self.tools,
            span,
            &cand.layers,
            &normalized,
        )?;
        self.stage_frame_types(span)?;

        // Reconstruction.
        self.ws.stage_reconstruction()?;
        self.tools.expand(&ExpandJob {
            work_dir: &self.ws.tmp_dir(),
            gops: span.gops_to_expand,
            trls: self.params.trls,
            srls: self.params.srls,
            update_factor: self.params.update_factor,
            block_sizes: &blocks,
            block_size_min: self.params.block_size_min,
            search_range: self.params.search_range,
            pixels_in_x: &px,
            pixels_in_y: &py,
            subpixel_accuracy: &normalized.entries()[..self.params.trls],
        })?;

        // Measurement.
        let rmse = self.measure(cand, refs)?;
        let kbps = kbps_report(&ledger, &self.geo, span, self.params.fps);
        let rate = kbps.comparison_rate();

        // Slope against the reference point.
        if cand.layers.is_zero() {
            self.prev_rmse = rmse;
            self.first_rmse = rmse;
            self.prev_rate = rate;
            self.log_candidate(cand, &normalized, &kbps, rmse, 0.0)?;
            return Ok(Evaluation {
                kbps,
                rmse,
                verdict: Verdict::Baseline,
            });
        }

        if rmse >= self.prev_rmse {
            self.empty_layers += 1;
            self.reporter.detail(
                &self.scope,
                &format!(
                    "{} * {}{}\tRMSE {:.6}\tempty",
                    cand.layers,
                    normalized,
                    kbps.detail(),
                    rmse
                ),
            )?;
            return Ok(Evaluation {
                kbps,
                rmse,
                verdict: Verdict::Rejected { slope: None },
            });
        }

        self.empty_layers = 0;
        let improvement = self.prev_rmse - rmse;
        let slope = if rate == self.prev_rate {
            (improvement / RATE_EPSILON).atan()
        } else {
            (improvement / (rate - self.prev_rate)).atan()
        };

        let verdict = if slope > self.best_slope {
            self.best_slope = slope;
            self.best = Some(Best {
                layers: cand.layers.clone(),
                reduces: cand.reduces.clone(),
                reduces_normalized: normalized.clone(),
                kbps: kbps.clone(),
                rmse,
                slope,
            });
            Verdict::Accepted { slope }
        } else {
            Verdict::Rejected { slope: Some(slope) }
        };

        self.log_candidate(cand, &normalized, &kbps, rmse, slope)?;
        Ok(Evaluation {
            kbps,
            rmse,
            verdict,
        })
    }

    /// Moves the reference point to the given evaluation. The independence
    /// heuristics rank each probe against the previous one rather than the
    /// last accepted candidate.
    pub fn rebase_to_previous(&mut self, eval: &Evaluation) {
        self.prev_rmse = eval.rmse;
        self.prev_rate = eval.kbps.comparison_rate();
    }

    /// Moves the reference point to the best candidate, ahead of the next
    /// full-search round.
    pub fn rebase_to_best(&mut self) {
        if let Some(best) = &self.best {
            self.prev_rate = best.kbps.comparison_rate();
            self.prev_rmse = best.rmse;
        }
    }

    /// Re-arms the slope record for a new full-search round.
    pub fn reset_round(&mut self) {
        self.best_slope = -MAX_RATE;
        self.empty_layers = 0;
    }

    /// Falls back to the baseline distortion after a stalled round.
    pub fn restore_first_rmse(&mut self) {
        self.prev_rmse = self.first_rmse;
    }

    /// Resolution and block size per subband after reduction. Fails when
    /// the result is unusable by the codec.
    fn derive_resolution(
        &self,
        normalized: &Reduction,
    ) -> Result<(Vec<usize>, Vec<usize>, Vec<usize>)> {
        let trls = self.params.trls;
        let mut px = Vec::with_capacity(trls);
        let mut py = Vec::with_capacity(trls);
        let mut blocks = Vec::with_capacity(trls.saturating_sub(1));

        for i in 0..trls {
            px.push(self.params.pixels_in_x >> normalized.get(i));
            py.push(self.params.pixels_in_y >> normalized.get(i));
            if i > 0 {
                blocks.push(self.params.block_size >> normalized.get(i));
            }
        }
        // Reducing a motion field enlarges its block footprint.
        for i in trls..self.geo.subbands() {
            blocks[i - trls] <<= normalized.get(i);
        }

        for i in 1..trls {
            let block = blocks[i - 1];
            if block == 0 || px[i] % block != 0 || py[i] % block != 0 {
                return Err(ConfigError::BlockDivisibility {
                    x: px[i],
                    y: py[i],
                    block,
                }
                .into());
            }
        }
        Ok((px, py, blocks))
    }

    /// Stages the frame-type maps for the expanded GOP range.
    fn stage_frame_types(&self, span: &FrameSpan) -> Result<()> {
        let igop = self.scope.igop();
        let mut chunk = self.geo.gop_size + 1;
        for level in 1..self.params.trls {
            chunk /= 2;
            let name = format!("frame_types_{level}");
            let src = self.ws.base_file(&name);
            if !src.exists() {
                debug!("no {name} to stage");
                continue;
            }
            self.ws.copy_frames(
                &src,
                &self.ws.extract_dir().join(&name),
                igop - 1,
                Some(span.gops_to_expand),
                chunk as u64,
            )?;
        }
        Ok(())
    }

    fn measure(&self, cand: &Candidate, refs: &MeasurePair) -> Result<f64> {
        let reconstruction = self.ws.tmp_dir().join(&refs.reconstruction);
        let reference = self.ws.base_file(&refs.reference);

        self.reporter.snr_files(&format!(
            "snr fileA={} fileB={} [{}]",
            refs.reconstruction, refs.reference, cand.layers
        ))?;
        let per_frame = self.tools.measure_per_frame(
            &reference,
            &reconstruction,
            geometry::frame_bytes(self.params.pixels_in_x, self.params.pixels_in_y),
        )?;
        self.reporter.snr_frames(self.scope.igop(), &per_frame)?;

        self.tools.measure(&reference, &reconstruction)
    }

    fn log_candidate(
        &self,
        cand: &Candidate,
        normalized: &Reduction,
        kbps: &KbpsReport,
        rmse: f64,
        slope: f64,
    ) -> Result<()> {
        self.reporter.detail(
            &self.scope,
            &format!(
                "{} * {}{}\tRMSE {:.6}\t:: {:.9}",
                cand.layers,
                normalized,
                kbps.detail(),
                rmse,
                slope
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Reporter;
    use crate::testutil::MockToolchain;

    struct Fixture {
        _dir: tempfile::TempDir,
        params: Params,
        ws: Workspace,
        reporter: Reporter,
        tools: MockToolchain,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let params = Params {
            trls: 3,
            gops: 1,
            texture_layers: 4,
            discard_srls: vec![0; 5],
            ..Params::default()
        };
        let ws = Workspace::new(dir.path());
        let reporter = Reporter::new(ws.clone(), &params);
        Fixture {
            _dir: dir,
            params,
            ws,
            reporter,
            tools: MockToolchain::default(),
        }
    }

    fn run<'a>(f: &'a Fixture) -> SearchRun<'a> {
        SearchRun::new(
            &f.params,
            &f.tools,
            &f.ws,
            &f.reporter,
            Scope::Whole,
            Reduction::zeros(5),
        )
    }

    fn eval(
        run: &mut SearchRun<'_>,
        layers: Vec<usize>,
    ) -> Evaluation {
        let span = run.geo.span_whole();
        let cand = Candidate::new(Allocation::new(layers), Reduction::zeros(5));
        run.evaluate(&cand, &span, &MeasurePair::new("low_0", "low_0"))
            .unwrap()
    }

    #[test]
    fn baseline_sets_the_reference_point() {
        let f = fixture();
        let mut run = run(&f);
        let eval = eval(&mut run, vec![0, 0, 0, 0, 0]);
        assert_eq!(eval.verdict, Verdict::Baseline);
        assert_eq!(run.prev_rmse, eval.rmse);
        assert_eq!(run.prev_rate, eval.kbps.comparison_rate());
        assert!(run.best.is_none());
    }

    #[test]
    fn improving_candidate_becomes_best_with_positive_slope() {
        let f = fixture();
        let mut run = run(&f);
        let baseline = eval(&mut run, vec![0, 0, 0, 0, 0]);
        let improved = eval(&mut run, vec![1, 0, 0, 0, 0]);

        let Verdict::Accepted { slope } = improved.verdict else {
            panic!("expected acceptance, got {:?}", improved.verdict);
        };
        assert!(slope > 0.0);
        assert!(improved.rmse < baseline.rmse);
        assert!(improved.kbps.comparison_rate() > baseline.kbps.comparison_rate());
        let expected = ((baseline.rmse - improved.rmse)
            / (improved.kbps.comparison_rate() - baseline.kbps.comparison_rate()))
        .atan();
        assert!((slope - expected).abs() < 1e-12);
        assert_eq!(run.best.as_ref().unwrap().layers.entries(), &[1, 0, 0, 0, 0]);
    }

    #[test]
    fn equal_rate_improvement_outranks_any_spending_candidate() {
        let f = fixture();
        let mut run = run(&f);

        // Establish a nonzero reference point, then re-evaluate the same
        // allocation (identical rate) with a scripted distortion gain.
        let reference = eval(&mut run, vec![1, 0, 0, 0, 0]);
        run.prev_rate = reference.kbps.comparison_rate();
        run.prev_rmse = reference.rmse;
        f.tools
            .scripted_rmse
            .borrow_mut()
            .push_back(reference.rmse - 5.0);
        let same_rate = eval(&mut run, vec![1, 0, 0, 0, 0]);

        let epsilon_slope = same_rate.slope();
        assert!((epsilon_slope - (5.0f64 / RATE_EPSILON).atan()).abs() < 1e-12);
        // Any candidate paying real rate for the same distortion gain ranks
        // below the equal-rate slope.
        assert!(epsilon_slope > (5.0f64 / 10.0).atan());
    }

    #[test]
    fn non_improving_candidate_is_rejected_and_best_unchanged() {
        let f = fixture();
        let mut run = run(&f);
        eval(&mut run, vec![0, 0, 0, 0, 0]);
        let accepted = eval(&mut run, vec![1, 0, 0, 0, 0]);
        assert!(matches!(accepted.verdict, Verdict::Accepted { .. }));
        run.rebase_to_best();

        let best_before = run.best.as_ref().unwrap().layers.clone();
        let prev_rmse = run.prev_rmse;
        let prev_rate = run.prev_rate;

        // Script a distortion no better than the reference.
        f.tools.scripted_rmse.borrow_mut().push_back(prev_rmse);
        let rejected = eval(&mut run, vec![1, 1, 0, 0, 0]);
        assert_eq!(rejected.verdict, Verdict::Rejected { slope: None });
        assert_eq!(run.best.as_ref().unwrap().layers, best_before);
        assert_eq!(run.prev_rmse, prev_rmse);
        assert_eq!(run.prev_rate, prev_rate);
        assert_eq!(run.empty_layers, 1);
    }

    #[test]
    fn reduction_breaking_block_divisibility_is_fatal() {
        let f = fixture();
        // 352 >> 3 = 44 against a derived block of 24 >> 3 = 3: 44 % 3 != 0.
        let params = Params {
            block_size: 24,
            ..f.params.clone()
        };
        let reporter = Reporter::new(f.ws.clone(), &params);
        let mut run = SearchRun::new(
            &params,
            &f.tools,
            &f.ws,
            &reporter,
            Scope::Whole,
            Reduction::new(vec![3; 5]),
        );
        let span = run.geo.span_whole();
        let cand = Candidate::new(
            Allocation::new(vec![1, 1, 1, 0, 0]),
            Reduction::new(vec![3; 5]),
        );
        let result = run.evaluate(&cand, &span, &MeasurePair::new("low_0", "low_0"));
        assert!(result.is_err());
    }

    #[test]
    fn accepted_allocations_never_shrink_the_rate() {
        let f = fixture();
        let mut run = run(&f);
        eval(&mut run, vec![0, 0, 0, 0, 0]);
        let one = eval(&mut run, vec![1, 0, 0, 0, 0]);
        run.rebase_to_best();
        let two = eval(&mut run, vec![1, 1, 0, 0, 0]);
        assert!(two.kbps.comparison_rate() >= one.kbps.comparison_rate());
        assert!(two.rmse <= one.rmse);
    }
}
