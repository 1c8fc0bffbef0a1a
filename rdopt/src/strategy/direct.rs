//! Direct transcoding: evaluate an operator-given allocation without any
//! search, either once for the whole video or once per GOP from a schedule.

use anyhow::Result;

use crate::alloc::{Allocation, Candidate, Reduction};
use crate::curve::CurveSet;
use crate::evaluate::{MeasurePair, SearchRun};
use crate::scope::Scope;
use crate::utils::errors::ConfigError;

use super::RunContext;

/// One allocation for the full sequence.
pub fn run_video(ctx: &RunContext<'_>, combination: &[usize]) -> Result<()> {
    let params = ctx.params;
    let geo = params.geometry();
    let layers = parse_combination(combination, geo.subbands())?;
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

    let eval = run.evaluate(
        &Candidate::new(layers.clone(), discards),
        &span,
        &MeasurePair::new("low_0", "low_0"),
    )?;
    ctx.reporter.gnuplot(&format!(
        "{:.3}\t {:.6}\t [{}]",
        eval.kbps.comparison_rate(),
        eval.rmse,
        layers
    ))?;
    Ok(())
}

/// One allocation for one GOP of a per-GOP schedule.
pub fn run_gop(
    ctx: &RunContext<'_>,
    igop: usize,
    combination: &[usize],
    curves: &mut CurveSet,
) -> Result<()> {
    let params = ctx.params;
    let geo = params.geometry();
    let layers = parse_combination(combination, geo.subbands())?;
    let span = geo.span_gop(igop);
    let discards = Reduction::new(params.discard_srls.clone());
    let mut run = SearchRun::new(
        params,
        ctx.tools,
        ctx.ws,
        ctx.reporter,
        Scope::Gop(igop),
        discards.clone(),
    );

    let eval = run.evaluate(
        &Candidate::new(layers.clone(), discards),
        &span,
        &MeasurePair::new("low_0", format!("low_0{igop}")),
    )?;
    ctx.reporter.gnuplot(&format!(
        "{:.3}\t {:.6}\t [{}]",
        eval.kbps.comparison_rate(),
        eval.rmse,
        layers
    ))?;
    curves.push(igop, &eval.kbps, eval.rmse);
    Ok(())
}

fn parse_combination(combination: &[usize], expected: usize) -> Result<Allocation> {
    if combination.len() != expected {
        return Err(ConfigError::CombinationLength {
            expected,
            got: combination.len(),
        }
        .into());
    }
    Ok(Allocation::new(combination.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Params;
    use crate::report::Reporter;
    use crate::testutil::MockToolchain;
    use crate::workspace::Workspace;

    #[test]
    fn combination_length_is_validated() {
        let dir = tempfile::tempdir().unwrap();
        let params = Params {
            trls: 3,
            discard_srls: vec![0; 5],
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
        assert!(run_video(&ctx, &[1, 2]).is_err());
        assert!(run_video(&ctx, &[1, 1, 1, 0, 0]).is_ok());
    }
}
