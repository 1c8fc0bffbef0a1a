//! Full-search R/D optimization.
//!
//! The accuracy baseline: at every round, each subband in turn proposes one
//! incremental change to the current best allocation (one unit of its
//! remaining spatial reduction if any is left, otherwise one more quality
//! layer), and the round keeps whichever single-subband increment produced
//! the best slope. The winner becomes the base of the next round, until the
//! allocation is complete, the rate budget is met, or no subband can
//! propose anything.
//!
//! A subband whose extra layer failed to improve distortion is retried with
//! a wider layer step (the empty-layer counter) and effectively skipped
//! once the step passes its layer cap.

use anyhow::Result;
use log::{debug, info};

use crate::alloc::{Allocation, Candidate, Reduction};
use crate::curve::CurveSet;
use crate::evaluate::{MeasurePair, SearchRun};
use crate::scope::Scope;

use super::RunContext;

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

    // Baseline: the empty codestream becomes the reference point.
    run.evaluate(
        &Candidate::new(Allocation::zeros(n), discards.clone()),
        &span,
        &refs,
    )?;

    let full = Allocation::new(caps.clone());
    let mut accepted_layers = Allocation::zeros(n);
    // One extra unit per requested reduction: the search decrements before
    // it evaluates, so the first consumption lands on the requested value.
    let mut accepted_reduces = discards.denormalized();
    let mut stalled = false;

    while accepted_layers != full {
        if run
            .best
            .as_ref()
            .is_some_and(|best| best.kbps.comparison_rate() >= params.brc)
        {
            info!("rate budget met for GOP {igop}");
            break;
        }

        run.reset_round();
        let base_layers = accepted_layers.clone();
        let base_reduces = accepted_reduces.clone();
        ctx.reporter.detail(
            &scope,
            &format!("-> {} * {}", base_layers, base_reduces.normalized(&run.limits)),
        )?;

        let mut generated = 0usize;
        let mut z = 0;
        while z < n {
            let step = propose(
                &mut run,
                ctx,
                &span,
                &refs,
                &base_layers,
                &base_reduces,
                &caps,
                z,
            )?;
            if step.is_some() {
                generated += 1;
            }

            // An empty layer widens the step and retries the same subband;
            // a reduction step or an exhausted subband moves on.
            if run.empty_layers == 0 || step != Some(Step::Layer) {
                z += 1;
            }
        }

        if generated == 0 {
            info!("no candidate can be generated for GOP {igop}; search exhausted");
            break;
        }

        let best = run.best.as_ref().expect("baseline established a best slot");
        if best.layers == base_layers && best.reduces == base_reduces {
            // Nothing beat the round's base. Re-anchor on the baseline
            // distortion and retry once; a second stall cannot progress.
            ctx.reporter
                .detail(&scope, "distortion increased; re-anchoring on the baseline")?;
            run.restore_first_rmse();
            if stalled {
                break;
            }
            stalled = true;
            continue;
        }
        stalled = false;

        accepted_layers = best.layers.clone();
        accepted_reduces = best.reduces.clone();
        ctx.reporter.optimized(
            &scope,
            &format!(
                "{} * {}{}\tRMSE {:.6}\t:: {:.9}",
                best.layers,
                best.reduces_normalized,
                best.kbps.detail(),
                best.rmse,
                best.slope
            ),
        )?;
        curves.push(igop, &best.kbps, best.rmse);
        run.rebase_to_best();
    }
    Ok(())
}

/// The increment a subband proposed this round. Reduction and layer steps
/// are mutually exclusive per subband per round: remaining reduction is
/// consumed before any layer is added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Reduce,
    Layer,
}

/// Proposes and evaluates subband `z`'s single increment for this round.
/// Returns `None` when the subband has nothing left to propose.
#[allow(clippy::too_many_arguments)]
fn propose(
    run: &mut SearchRun<'_>,
    ctx: &RunContext<'_>,
    span: &crate::geometry::FrameSpan,
    refs: &MeasurePair,
    base_layers: &Allocation,
    base_reduces: &Reduction,
    caps: &[usize],
    z: usize,
) -> Result<Option<Step>> {
    let params = ctx.params;
    let trls = params.trls;
    let is_texture = z < trls;
    let cap = caps[z];
    let clevels = if is_texture {
        params.texture_clevels
    } else {
        params.motion_clevels
    };

    let mut layers = base_layers.clone();
    let mut reduces = base_reduces.clone();
    let mut step = None;

    if base_reduces.get(z) > 0 {
        // Textures change resolution together; motion fields independently.
        if is_texture {
            reduces.set_textures(trls, base_reduces.get(z) - 1);
        } else {
            reduces.set(z, base_reduces.get(z) - 1);
        }
        if layers.get(z) == 0 {
            layers.set(z, 1);
        }
        run.evaluate(&Candidate::new(layers.clone(), reduces), span, refs)?;
        step = Some(Step::Reduce);
    } else if base_layers.get(z) + run.empty_layers < cap {
        let next = base_layers.get(z) + 1 + run.empty_layers;
        layers.set(z, next);
        if next < cap {
            if is_texture {
                reduces.set_textures(trls, clevels);
            } else {
                reduces.set(z, clevels);
            }
        }
        run.evaluate(&Candidate::new(layers.clone(), reduces), span, refs)?;
        step = Some(Step::Layer);
    } else {
        debug!("subband {z} exhausted this round");
    }

    // A subband that reached its layer cap clears the skip counter.
    if layers.get(z) == cap {
        run.empty_layers = 0;
    }
    Ok(step)
}
