//! Scope control: whole-video vs per-GOP strategy runs.
//!
//! Whole-video strategies see one frame range and one reference
//! codestream. Per-GOP strategies additionally need the decoded
//! low-frequency reference sliced into one independent segment per GOP
//! before each run, and their per-GOP curves folded together afterwards.

use anyhow::Result;
use log::info;

use crate::curve::CurveSet;
use crate::geometry::frame_bytes;
use crate::strategy::{
    Algorithm, RunContext, direct, full_search, gains, isolated, progressive, subband_removal,
};

/// The unit a strategy run operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// One run over the full sequence.
    Whole,
    /// One run per GOP; the payload is the 1-based GOP index.
    Gop(usize),
}

impl Scope {
    pub fn igop(&self) -> usize {
        match self {
            Scope::Whole => 1,
            Scope::Gop(igop) => *igop,
        }
    }
}

/// Observer the CLI hooks progress bars into.
pub trait ProgressSink {
    fn begin(&self, _total_gops: usize) {}
    fn gop_done(&self, _igop: usize) {}
    fn finish(&self) {}
}

/// No-op sink for headless runs.
pub struct NullProgress;

impl ProgressSink for NullProgress {}

/// Runs `algo` in its natural scope.
pub fn run(algo: Algorithm, ctx: &RunContext<'_>, progress: &dyn ProgressSink) -> Result<()> {
    if !algo.per_gop() {
        return match algo {
            Algorithm::Its => progressive::run_its(ctx),
            Algorithm::Pts => progressive::run_pts(ctx),
            Algorithm::Ptl => progressive::run_ptl(ctx),
            Algorithm::AmPtl => gains::run_amptl(ctx),
            _ => unreachable!("per-GOP algorithms handled below"),
        };
    }

    per_gop(ctx, progress, |ctx, igop, curves| match algo {
        Algorithm::FullSearch => full_search::run_gop(ctx, igop, curves),
        Algorithm::SubbandRemoval => subband_removal::run_gop(ctx, igop, curves),
        Algorithm::IsolatedRemoval => isolated::run_gop(ctx, igop, curves),
        _ => unreachable!("whole-video algorithms handled above"),
    })
}

/// Direct transcoding of an operator-given allocation (whole video) or a
/// per-GOP schedule.
pub fn run_direct(
    ctx: &RunContext<'_>,
    combination: Option<&[usize]>,
    schedule: Option<&[Vec<usize>]>,
    progress: &dyn ProgressSink,
) -> Result<()> {
    if let Some(combination) = combination {
        return direct::run_video(ctx, combination);
    }
    let schedule = schedule.expect("either a combination or a schedule");
    if schedule.len() != ctx.params.gops {
        return Err(crate::utils::errors::ConfigError::ScheduleLength {
            expected: ctx.params.gops,
            got: schedule.len(),
        }
        .into());
    }

    per_gop(ctx, progress, |ctx, igop, curves| {
        direct::run_gop(ctx, igop, &schedule[igop - 1], curves)?;
        // Keep each GOP's shipment around for inspection.
        let extract = ctx.ws.extract_dir();
        std::fs::rename(&extract, extract.with_file_name(format!("extract_gop{igop}")))?;
        Ok(())
    })
}

/// Shared per-GOP drive loop: sets the original low band aside, slices one
/// reference segment per GOP, runs the strategy, then aggregates.
fn per_gop(
    ctx: &RunContext<'_>,
    progress: &dyn ProgressSink,
    mut run_one: impl FnMut(&RunContext<'_>, usize, &mut CurveSet) -> Result<()>,
) -> Result<()> {
    let params = ctx.params;
    let geo = params.geometry();
    let fb = frame_bytes(params.pixels_in_x, params.pixels_in_y);

    let original = ctx.ws.set_aside("low_0", "low_0_original")?;
    let mut curves = CurveSet::new(params.gops);
    progress.begin(params.gops);

    for igop in 1..=params.gops {
        let span = geo.span_gop(igop);
        // One independent reference segment for this GOP: its frames plus
        // the anchor.
        ctx.ws.copy_frames(
            &original,
            &ctx.ws.base_file(&format!("low_0{igop}")),
            geo.gop_size * (igop - 1),
            Some(geo.gop_size * span.gops_to_expand + 1),
            fb,
        )?;
        info!("GOP {igop}/{}: frames {}..{}", params.gops, span.first_picture, span.pictures);

        run_one(ctx, igop, &mut curves)?;
        progress.gop_done(igop);
    }
    progress.finish();

    curves.write(ctx.reporter, geo.pictures())?;
    Ok(())
}
