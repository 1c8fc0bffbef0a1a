//! Subband-removal R/D optimization.
//!
//! Assumes each subband's contribution to the reconstructed GOP's
//! distortion is independent of the others: every layer count of every
//! subband is probed while the rest of the codestream keeps its full
//! allocation, each probe ranked against the previous one. Sorting the
//! probes by slope then yields the transmission order directly, at sort
//! cost instead of combinatorial-search cost.

use anyhow::Result;

use crate::alloc::{Allocation, Candidate, Reduction};
use crate::curve::CurveSet;
use crate::evaluate::{MeasurePair, SearchRun};
use crate::scope::Scope;

use super::{Probe, RunContext, monotone_schedule, sort_by_slope};

pub fn run_gop(ctx: &RunContext<'_>, igop: usize, curves: &mut CurveSet) -> Result<()> {
    let params = ctx.params;
    let geo = params.geometry();
    let n = geo.subbands();
    let caps = params.complete_layers();
    let span = geo.span_gop(igop);
    let scope = Scope::Gop(igop);
    let refs = MeasurePair::new("low_0", format!("low_0{igop}"));

    let discards = Reduction::new(params.discard_srls.clone());
    let mut run = SearchRun::new(
        params,
        ctx.tools,
        ctx.ws,
        ctx.reporter,
        scope,
        discards.clone(),
    );
    ctx.reporter.reset_detail(&scope);

    // Probe plan: for each subband, the empty codestream followed by the
    // full codestream holding that subband at 0..=cap layers.
    let mut sends: Vec<Allocation> = Vec::new();
    let mut touched: Vec<Allocation> = Vec::new();
    for uu in 0..n {
        sends.push(Allocation::zeros(n));
        touched.push(Allocation::zeros(n));
        sends.push(Allocation::new(caps.clone()));
        touched.push(Allocation::zeros(n));
        for u in 0..=caps[uu] {
            sends.last_mut().expect("nonempty").set(uu, u);
            touched.last_mut().expect("nonempty").set(uu, 1);
            if u < caps[uu] {
                let send = sends.last().expect("nonempty").clone();
                let touch = touched.last().expect("nonempty").clone();
                sends.push(send);
                touched.push(touch);
            }
        }
    }

    // Probe, ranking each evaluation against the previous point.
    let mut probes = Vec::with_capacity(sends.len());
    for (send, touch) in sends.into_iter().zip(touched) {
        let eval = run.evaluate(&Candidate::new(send.clone(), discards.clone()), &span, &refs)?;
        run.rebase_to_previous(&eval);
        probes.push(Probe {
            layers: send,
            touched: touch,
            slope: eval.slope(),
        });
    }

    sort_by_slope(&mut probes);
    ctx.reporter.promote_detail_to_evaluations(&scope)?;
    ctx.reporter
        .evaluations(&scope, "# probes ordered by slope")?;
    for probe in &probes {
        ctx.reporter.evaluations(&scope, &probe.log_line())?;
    }

    // The anchor probes only exist to give the slopes a reference; drop
    // them along with everything that contributed nothing.
    probes.retain(|p| !p.layers.contains_zero() && p.slope != 0.0);

    // Texture must lead motion for a usable reconstruction: the first
    // texture entry of the order is promoted to the front.
    if let Some(pos) = probes
        .iter()
        .position(|p| p.touched.entries()[..params.trls].contains(&1))
    {
        if pos != 0 {
            let promoted = probes.remove(pos);
            probes.insert(0, promoted);
        }
    }

    let schedule = monotone_schedule(&probes, n);
    for alloc in &schedule {
        ctx.reporter.optimized(&scope, &alloc.to_string())?;
    }

    // Replay the optimized order to draw the curve.
    for alloc in schedule.into_iter().skip(1) {
        let eval = run.evaluate(&Candidate::new(alloc, discards.clone()), &span, &refs)?;
        curves.push(igop, &eval.kbps, eval.rmse);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Params;
    use crate::report::Reporter;
    use crate::testutil::MockToolchain;
    use crate::workspace::Workspace;

    #[test]
    fn schedule_is_monotone_and_texture_leads() {
        let dir = tempfile::tempdir().unwrap();
        let params = Params {
            trls: 2,
            gops: 1,
            texture_layers: 2,
            discard_srls: vec![0; 3],
            ..Params::default()
        };
        let ws = Workspace::new(dir.path());
        let reporter = Reporter::new(ws.clone(), &params);
        let tools = MockToolchain::default();
        let ctx = RunContext {
            params: &params,
            tools: &tools,
            ws: &ws,
            reporter: &reporter,
        };

        let mut curves = CurveSet::new(1);
        run_gop(&ctx, 1, &mut curves).unwrap();

        let curve = curves.gop_curve(1);
        assert!(!curve.is_empty());
        for pair in curve.windows(2) {
            assert!(pair[1].kbps >= pair[0].kbps);
        }

        // The optimized log starts at zero and raises one entry per line.
        let sig = crate::report::signature(&params);
        let text = std::fs::read_to_string(
            dir.path().join(format!("{sig}_gop1of1_optimized")),
        )
        .unwrap();
        let rows: Vec<Vec<usize>> = text
            .lines()
            .map(|l| l.split(',').map(|v| v.parse().unwrap()).collect())
            .collect();
        assert_eq!(rows[0], vec![0, 0, 0]);
        // First step raises a texture subband, never motion alone.
        assert!(rows[1][0] > 0 || rows[1][1] > 0);
        for pair in rows.windows(2) {
            let raised: Vec<_> = (0..3).filter(|&z| pair[1][z] > pair[0][z]).collect();
            assert_eq!(raised.len(), 1);
            for z in 0..3 {
                assert!(pair[1][z] >= pair[0][z]);
            }
        }
    }
}
