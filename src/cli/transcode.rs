use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use indicatif::MultiProgress;
use serde::Deserialize;

use rdopt::report::Reporter;
use rdopt::scope::{self, NullProgress};
use rdopt::strategy::RunContext;
use rdopt::tools::ShellToolchain;
use rdopt::workspace::Workspace;

use super::command::{Cli, TranscodeArgs};
use super::optimize::{GopProgress, build_params, parse_list};

/// Per-GOP combinations loaded from YAML.
#[derive(Debug, Deserialize)]
struct ScheduleFile {
    gops: Vec<Vec<usize>>,
}

pub fn cmd_transcode(args: &TranscodeArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let mut params = build_params(&args.stream, cli)?;
    params.resolve_discards()?;

    let combination = args
        .combination
        .as_deref()
        .map(parse_list)
        .transpose()
        .context("parsing --combination")?;
    let schedule = args
        .schedule
        .as_deref()
        .map(load_schedule)
        .transpose()?;
    if combination.is_none() && schedule.is_none() {
        bail!("transcode needs either --combination or --schedule");
    }

    log::info!(
        "Direct transcoding of {} ({})",
        args.stream.stream_dir.display(),
        match &combination {
            Some(layers) => format!("whole video, layers {layers:?}"),
            None => format!("{} GOPs from schedule", params.gops),
        },
    );

    let ws = Workspace::new(&args.stream.stream_dir);
    let tools = ShellToolchain::default();
    let reporter = Reporter::new(ws.clone(), &params);
    let ctx = RunContext {
        params: &params,
        tools: &tools,
        ws: &ws,
        reporter: &reporter,
    };

    match multi {
        Some(multi) => {
            let sink = GopProgress::new(multi);
            scope::run_direct(&ctx, combination.as_deref(), schedule.as_deref(), &sink)
        }
        None => scope::run_direct(
            &ctx,
            combination.as_deref(),
            schedule.as_deref(),
            &NullProgress,
        ),
    }
}

fn load_schedule(path: &Path) -> Result<Vec<Vec<usize>>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading schedule {}", path.display()))?;
    let file: ScheduleFile = serde_yaml_ng::from_str(&text).context("parsing schedule YAML")?;
    Ok(file.gops)
}
