//! Isolated-subband-removal R/D optimization.
//!
//! Cuts the subband-removal cost further by measuring every texture
//! subband's layers against that subband's own reference band instead of
//! the full reconstruction. Motion fields are not searched at all; they are
//! appended at fixed allocation right after the best texture entry,
//! consistent with their smaller contribution to quality.
//!
//! Because the per-GOP references keep their GOP-0 head while the isolated
//! comparisons do not, a post-pass trims one GOP-leading frame from each
//! texture reference file to re-align the comparison windows.

use anyhow::Result;

use crate::alloc::{Allocation, Candidate, Reduction};
use crate::curve::CurveSet;
use crate::evaluate::{MeasurePair, SearchRun};
use crate::geometry::frame_bytes;
use crate::scope::Scope;

use super::{Probe, RunContext, monotone_schedule, sort_by_slope};

pub fn run_gop(ctx: &RunContext<'_>, igop: usize, curves: &mut CurveSet) -> Result<()> {
    let params = ctx.params;
    let geo = params.geometry();
    let n = geo.subbands();
    let trls = params.trls;
    let caps = params.complete_layers();
    let span = geo.span_gop(igop);
    let scope = Scope::Gop(igop);

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

    // Probe plan: textures only, each subband alone at 1..=cap layers.
    let mut sends: Vec<Allocation> = Vec::new();
    let mut touched: Vec<Allocation> = Vec::new();
    for uu in 0..trls {
        sends.push(Allocation::zeros(n));
        touched.push(Allocation::zeros(n));
        for u in 0..caps[uu] {
            let current = sends.last_mut().expect("nonempty");
            current.set(uu, current.get(uu) + 1);
            touched.last_mut().expect("nonempty").set(uu, 1);
            if u + 1 < caps[uu] {
                let send = sends.last().expect("nonempty").clone();
                let touch = touched.last().expect("nonempty").clone();
                sends.push(send);
                touched.push(touch);
            }
        }
    }

    // Probe each subband against its own reference band.
    let mut probes = Vec::with_capacity(sends.len());
    for (send, touch) in sends.into_iter().zip(touched) {
        let refs = isolated_reference(trls, &send);
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
    probes.retain(|p| p.slope != 0.0);

    // Motion fields join at fixed allocation, right behind the best texture
    // entry.
    for (k, z) in (trls..n).enumerate() {
        let mut send = Allocation::zeros(n);
        send.set(z, 1);
        let mut touch = Allocation::zeros(n);
        touch.set(z, 1);
        let at = (k + 1).min(probes.len());
        probes.insert(
            at,
            Probe {
                layers: send,
                touched: touch,
                slope: 0.0,
            },
        );
    }

    let schedule = monotone_schedule(&probes, n);
    for alloc in &schedule {
        ctx.reporter.optimized(&scope, &alloc.to_string())?;
    }

    // Replay against the per-GOP reference to draw the curve.
    let refs = MeasurePair::new("low_0", format!("low_0{igop}"));
    for alloc in schedule.into_iter().skip(1) {
        let eval = run.evaluate(&Candidate::new(alloc, discards.clone()), &span, &refs)?;
        curves.push(igop, &eval.kbps, eval.rmse);
    }

    // Re-align the texture reference windows for the next GOP.
    let fb = frame_bytes(params.pixels_in_x, params.pixels_in_y);
    ctx.ws
        .trim_leading_frames(&ctx.ws.base_file(&format!("low_{}", trls - 1)), 1, fb)?;
    for level in 1..trls {
        ctx.ws.trim_leading_frames(
            &ctx.ws.base_file(&format!("high_{level}")),
            geo.gop_size >> level,
            fb,
        )?;
    }
    Ok(())
}

/// The reference band a one-subband probe is measured against.
fn isolated_reference(trls: usize, send: &Allocation) -> MeasurePair {
    let name = match send.first_nonzero() {
        Some(0) | None => format!("low_{}", trls - 1),
        Some(z) => format!("high_{}", trls - z),
    };
    MeasurePair::new(name.clone(), name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Params;
    use crate::report::Reporter;
    use crate::testutil::MockToolchain;
    use crate::workspace::Workspace;

    #[test]
    fn isolated_references_follow_the_probed_band() {
        assert_eq!(
            isolated_reference(3, &Allocation::new(vec![2, 0, 0, 0, 0])).reference,
            "low_2"
        );
        assert_eq!(
            isolated_reference(3, &Allocation::new(vec![0, 1, 0, 0, 0])).reference,
            "high_2"
        );
        assert_eq!(
            isolated_reference(3, &Allocation::new(vec![0, 0, 3, 0, 0])).reference,
            "high_1"
        );
    }

    #[test]
    fn motion_joins_after_the_best_texture_entry() {
        let dir = tempfile::tempdir().unwrap();
        let params = Params {
            trls: 2,
            gops: 1,
            texture_layers: 2,
            discard_srls: vec![0; 3],
            ..Params::default()
        };
        let ws = Workspace::new(dir.path());
        // Reference files the post-pass trims.
        let fb = frame_bytes(params.pixels_in_x, params.pixels_in_y) as usize;
        std::fs::write(dir.path().join("low_1"), vec![0u8; fb * 3]).unwrap();
        std::fs::write(dir.path().join("high_1"), vec![0u8; fb * 2]).unwrap();

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
        assert!(!curves.gop_curve(1).is_empty());

        let sig = crate::report::signature(&params);
        let text = std::fs::read_to_string(
            dir.path().join(format!("{sig}_gop1of1_optimized")),
        )
        .unwrap();
        let rows: Vec<Vec<usize>> = text
            .lines()
            .map(|l| l.split(',').map(|v| v.parse().unwrap()).collect())
            .collect();
        // The motion field enters at the second schedule step, not first.
        assert_eq!(rows[0], vec![0, 0, 0]);
        assert!(rows[1][2] == 0);
        assert!(rows.iter().any(|r| r[2] == 1));

        // The post-pass dropped one GOP-leading frame from each reference.
        assert_eq!(
            std::fs::metadata(dir.path().join("low_1")).unwrap().len(),
            (fb * 2) as u64
        );
        assert_eq!(
            std::fs::metadata(dir.path().join("high_1")).unwrap().len(),
            fb as u64
        );
    }
}
