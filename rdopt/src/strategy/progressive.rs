//! Fixed-order generators: ITS, PTS and PTL.
//!
//! These do not search. Each enumerates a predetermined sequence of
//! allocations and evaluates every one of them to draw a monotone R-D curve
//! for comparison against the adaptive strategies; no candidate is ever
//! rejected.

use anyhow::Result;

use crate::alloc::{Allocation, Candidate, Reduction};
use crate::evaluate::{MeasurePair, SearchRun};
use crate::scope::Scope;

use super::RunContext;

/// Progressive transmission by subbands: every layer of the low band, its
/// motion field, then every layer of the next band, and so on. Distortion
/// is measured against the full-resolution original.
pub fn run_pts(ctx: &RunContext<'_>) -> Result<()> {
    let refs = MeasurePair::new("low_0", "low_0");
    run_schedule(ctx, &subband_schedule(ctx.params), |_| refs.clone())
}

/// PTS variant measuring each probe against the reconstruction of the same
/// subband subset rather than the full video.
pub fn run_its(ctx: &RunContext<'_>) -> Result<()> {
    let trls = ctx.params.trls;
    run_schedule(ctx, &subband_schedule(ctx.params), |touched| {
        let mut z = touched.first_nonzero().unwrap_or(0);
        if z >= trls {
            z -= trls - 1;
        }
        let name = format!("low_{}", trls - 1 - z);
        MeasurePair::new(name.clone(), name)
    })
}

/// Progressive transmission by layers: the first layer of every band (with
/// its motion field), then all second layers, and so on.
pub fn run_ptl(ctx: &RunContext<'_>) -> Result<()> {
    let refs = MeasurePair::new("low_0", "low_0");
    run_schedule(ctx, &layer_schedule(ctx.params), |_| refs.clone())
}

fn run_schedule(
    ctx: &RunContext<'_>,
    schedule: &[(Allocation, Allocation)],
    refs_for: impl Fn(&Allocation) -> MeasurePair,
) -> Result<()> {
    let params = ctx.params;
    let geo = params.geometry();
    let span = geo.span_whole();
    let discards = Reduction::new(params.discard_srls.clone());
    let mut run = SearchRun::new(
        params,
        ctx.tools,
        ctx.ws,
        ctx.reporter,
        Scope::Whole,
        discards.clone(),
    );

    for (send, touched) in schedule {
        let refs = refs_for(touched);
        let eval = run.evaluate(
            &Candidate::new(send.clone(), discards.clone()),
            &span,
            &refs,
        )?;
        ctx.reporter.gnuplot(&format!(
            "{:.3}\t {:.6}\t {}\t [{}]",
            eval.kbps.average,
            eval.rmse,
            touched.first_nonzero().unwrap_or(0),
            send
        ))?;
    }
    Ok(())
}

/// Subband-progressive schedule: pairs of (allocation to send, mask of the
/// subband the step adds). Each texture band is exhausted layer by layer,
/// then its motion field is appended before the next band starts.
pub(crate) fn subband_schedule(params: &crate::params::Params) -> Vec<(Allocation, Allocation)> {
    let caps = params.complete_layers();
    let trls = params.trls;
    let n = caps.len();

    let mut sends = vec![vec![0usize; n]];
    let mut probes = vec![vec![0usize; n]];
    for uu in 0..trls {
        for u in 1..=caps[uu] {
            set_last(&mut sends, uu, u);
            set_last(&mut probes, uu, 1);
            if u < caps[uu] {
                dup_last(&mut sends);
                probes.push(vec![0; n]);
            }
            if u == caps[uu] && uu < trls - 1 {
                dup_last(&mut sends);
                set_last(&mut sends, uu + trls, 1);
                dup_last(&mut sends);
                probes.push(vec![0; n]);
                set_last(&mut probes, uu + trls, 1);
                probes.push(vec![0; n]);
            }
        }
    }
    zip_schedule(sends, probes)
}

/// Layer-progressive schedule: bands interleave so that at any instant the
/// same (or almost the same) number of layers of each band has been sent.
pub(crate) fn layer_schedule(params: &crate::params::Params) -> Vec<(Allocation, Allocation)> {
    let caps = params.complete_layers();
    let trls = params.trls;
    let n = caps.len();

    let mut sends = vec![vec![0usize; n]];
    let mut probes = vec![vec![0usize; n]];
    for u in 1..=params.texture_layers {
        for uu in 0..trls {
            set_last(&mut sends, uu, u);
            set_last(&mut probes, uu, 1);
            if sends.last().expect("nonempty")[trls - 1] < params.texture_layers {
                dup_last(&mut sends);
                probes.push(vec![0; n]);
            }
            if uu < trls - 1 && sends.last().expect("nonempty")[uu + trls] == 0 {
                set_last(&mut sends, uu + trls, 1);
                dup_last(&mut sends);
                set_last(&mut probes, uu + trls, 1);
                probes.push(vec![0; n]);
            }
        }
    }
    zip_schedule(sends, probes)
}

fn set_last(rows: &mut [Vec<usize>], z: usize, value: usize) {
    *rows.last_mut().expect("nonempty").get_mut(z).expect("in range") = value;
}

fn dup_last(rows: &mut Vec<Vec<usize>>) {
    let last = rows.last().expect("nonempty").clone();
    rows.push(last);
}

fn zip_schedule(
    sends: Vec<Vec<usize>>,
    probes: Vec<Vec<usize>>,
) -> Vec<(Allocation, Allocation)> {
    sends
        .into_iter()
        .zip(probes)
        .map(|(s, p)| (Allocation::new(s), Allocation::new(p)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Params;

    fn params(trls: usize, layers: usize) -> Params {
        Params {
            trls,
            texture_layers: layers,
            discard_srls: vec![0; 2 * trls - 1],
            ..Params::default()
        }
    }

    #[test]
    fn subband_schedule_exhausts_bands_in_order() {
        // T=2, 2 layers: L, L, L+M, then the high band.
        let schedule = subband_schedule(&params(2, 2));
        let sends: Vec<_> = schedule.iter().map(|(s, _)| s.entries().to_vec()).collect();
        assert_eq!(
            sends,
            vec![
                vec![1, 0, 0],
                vec![2, 0, 0],
                vec![2, 0, 1],
                vec![2, 1, 1],
                vec![2, 2, 1],
            ]
        );
    }

    #[test]
    fn subband_schedule_is_entrywise_monotone() {
        let schedule = subband_schedule(&params(3, 3));
        for pair in schedule.windows(2) {
            for z in 0..5 {
                assert!(pair[0].0.get(z) <= pair[1].0.get(z));
            }
        }
    }

    #[test]
    fn layer_schedule_interleaves_bands() {
        // T=2, 2 layers: first layers of both bands with the motion field in
        // between, then the second layers.
        let schedule = layer_schedule(&params(2, 2));
        let sends: Vec<_> = schedule.iter().map(|(s, _)| s.entries().to_vec()).collect();
        assert_eq!(
            sends,
            vec![
                vec![1, 0, 0],
                vec![1, 0, 1],
                vec![1, 1, 1],
                vec![2, 1, 1],
                vec![2, 2, 1],
            ]
        );
    }

    #[test]
    fn layer_schedule_never_leads_with_motion_alone() {
        let schedule = layer_schedule(&params(3, 2));
        let (first, _) = &schedule[0];
        assert!(first.entries()[..3].iter().any(|&l| l > 0));
    }
}
