//! The per-candidate truncation sweep.
//!
//! For one candidate allocation, every sub-codestream file that contributes
//! a nonzero number of layers is truncated into `extract/`: motion fields
//! first (4 components per field), then the high-frequency texture bands
//! (Y/U/V per frame, frame ranges halving per level), then the low band.
//! Subbands with zero requested layers are skipped entirely; their absence
//! is what makes the candidate cheaper. Per-GOP runs renumber the output
//! frames to GOP-local indices so the expander sees a self-contained stream.
//!
//! Alongside the truncated files, a size manifest per subband records the
//! cumulative payload bytes frame by frame; the same numbers feed the
//! in-memory [`RateLedger`].

use std::path::Path;

use anyhow::Result;

use crate::alloc::{Allocation, Reduction};
use crate::geometry::{FrameSpan, Geometry, HIGH, LOW, MOTION, MOTION_COMPONENTS};
use crate::rate::RateLedger;
use crate::tools::{Toolchain, TruncateJob};
use crate::workspace::Workspace;

const TEXTURE_COMPONENTS: [&str; 3] = ["Y", "U", "V"];

/// Truncates everything `layers` asks for and returns the rate ledger.
pub fn sweep(
    geo: &Geometry,
    ws: &Workspace,
    tools: &dyn Toolchain,
    span: &FrameSpan,
    layers: &Allocation,
    reduces: &Reduction,
) -> Result<RateLedger> {
    let mut ledger = RateLedger::new(geo.subbands());
    // GOP-to-GOP extraction renumbers output frames; a whole-video run keeps
    // the input names.
    let renumber = span.first_picture != 0;

    sweep_motion(geo, ws, tools, span, layers, reduces, renumber, &mut ledger)?;
    sweep_textures(geo, ws, tools, span, layers, reduces, renumber, &mut ledger)?;

    Ok(ledger)
}

#[allow(clippy::too_many_arguments)]
fn sweep_motion(
    geo: &Geometry,
    ws: &Workspace,
    tools: &dyn Toolchain,
    span: &FrameSpan,
    layers: &Allocation,
    reduces: &Reduction,
    renumber: bool,
    ledger: &mut RateLedger,
) -> Result<()> {
    if geo.trls <= 1 {
        return Ok(());
    }

    let mut fields = span.pictures / 2;
    let mut first = span.first_picture / 2;

    for level in 1..geo.trls {
        let z = geo.motion_index(level);
        if layers.get(z) != 0 {
            let manifest = ws.extract_dir().join(format!("{MOTION}{level}.mjc"));
            let mut total = 0u64;

            for field in first..fields {
                let out_field = if renumber { field - first } else { field };
                let mut field_bytes = 0u64;
                for comp in 0..MOTION_COMPONENTS {
                    let name = format!("{MOTION}{level}_comp{comp}_{field:04}.j2c");
                    let out = format!("{MOTION}{level}_comp{comp}_{out_field:04}.j2c");
                    field_bytes += truncate_one(
                        ws,
                        tools,
                        &name,
                        &out,
                        layers.get(z),
                        reduces.get(z),
                    )?;
                }
                ledger.push(z, field_bytes);
                total += field_bytes;
                ws.append_line(&manifest, &total.to_string())?;
            }
        }
        fields /= 2;
        first /= 2;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn sweep_textures(
    geo: &Geometry,
    ws: &Workspace,
    tools: &dyn Toolchain,
    span: &FrameSpan,
    layers: &Allocation,
    reduces: &Reduction,
    renumber: bool,
    ledger: &mut RateLedger,
) -> Result<()> {
    let mut pictures = span.pictures;
    let mut first = span.first_picture;

    // High-frequency bands, finest first.
    for level in 1..geo.trls {
        pictures = Geometry::halve(pictures);
        first /= 2;

        let z = geo.texture_index(level);
        if layers.get(z) != 0 {
            let manifest = ws.extract_dir().join(format!("{HIGH}{level}.j2c"));
            let mut total = 0u64;

            for image in first..pictures.saturating_sub(1) {
                let bytes = truncate_frame(
                    ws,
                    tools,
                    &format!("{HIGH}{level}"),
                    image,
                    if renumber { image - first } else { image },
                    layers.get(z),
                    reduces.get(z),
                )?;
                ledger.push(z, bytes);
                total += bytes;
                ws.append_line(&manifest, &total.to_string())?;
            }
        }
    }

    // Low-frequency band.
    let level = geo.trls - 1;
    if layers.get(0) != 0 {
        let manifest = ws.extract_dir().join(format!("{LOW}{level}.j2c"));
        let mut total = 0u64;

        for image in first..pictures {
            let bytes = truncate_frame(
                ws,
                tools,
                &format!("{LOW}{level}"),
                image,
                if renumber { image - first } else { image },
                layers.get(0),
                reduces.get(0),
            )?;
            ledger.push(0, bytes);
            total += bytes;
            ws.append_line(&manifest, &total.to_string())?;
        }
    }
    Ok(())
}

fn truncate_frame(
    ws: &Workspace,
    tools: &dyn Toolchain,
    prefix: &str,
    image: usize,
    out_image: usize,
    layers: usize,
    reduce: usize,
) -> Result<u64> {
    let mut bytes = 0;
    for comp in TEXTURE_COMPONENTS {
        let name = format!("{prefix}_{comp}_{image:04}.j2c");
        let out = format!("{prefix}_{comp}_{out_image:04}.j2c");
        bytes += truncate_one(ws, tools, &name, &out, layers, reduce)?;
    }
    Ok(bytes)
}

fn truncate_one(
    ws: &Workspace,
    tools: &dyn Toolchain,
    name: &str,
    out: &str,
    layers: usize,
    reduce: usize,
) -> Result<u64> {
    let input = ws.base_file(name);
    let output = ws.extract_dir().join(out);
    truncate_job(tools, &input, &output, layers, reduce)
}

fn truncate_job(
    tools: &dyn Toolchain,
    input: &Path,
    output: &Path,
    layers: usize,
    reduce: usize,
) -> Result<u64> {
    tools.truncate(&TruncateJob {
        input,
        output,
        layers,
        reduce,
        rate_hint: None,
    })
}
