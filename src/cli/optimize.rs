use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::Deserialize;

use rdopt::params::{MAX_RATE, Params};
use rdopt::report::Reporter;
use rdopt::scope::{self, NullProgress, ProgressSink};
use rdopt::strategy::RunContext;
use rdopt::tools::ShellToolchain;
use rdopt::workspace::Workspace;

use super::command::{Cli, OptimizeArgs, StreamArgs};

/// Gain-ordered transmission schedule loaded from YAML.
#[derive(Debug, Deserialize)]
struct GainTableFile {
    schedule: Vec<Vec<usize>>,
}

pub fn cmd_optimize(args: &OptimizeArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let mut params = build_params(&args.stream, cli)?;
    if let Some(brc) = args.brc {
        params.brc = brc.min(MAX_RATE - 1.0);
    }
    if let Some(path) = &args.gain_table {
        params.gain_table = Some(load_gain_table(path)?);
    }
    params.resolve_discards()?;

    let algorithm = args.algorithm.to_algorithm();
    log::info!(
        "Ordering layers of {} with {:?} (TRLs: {}, GOPs: {}, budget: {})",
        args.stream.stream_dir.display(),
        algorithm,
        params.trls,
        params.gops,
        if params.brc >= MAX_RATE {
            "unbounded".to_string()
        } else {
            format!("{} kb/s", params.brc)
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
            scope::run(algorithm, &ctx, &sink)
        }
        None => scope::run(algorithm, &ctx, &NullProgress),
    }
}

pub fn build_params(stream: &StreamArgs, cli: &Cli) -> Result<Params> {
    Ok(Params {
        trls: stream.trls,
        srls: stream.srls,
        gops: stream.gops,
        fps: stream.fps,
        pixels_in_x: stream.pixels_in_x,
        pixels_in_y: stream.pixels_in_y,
        block_size: stream.block_size,
        block_size_min: stream.block_size_min,
        search_range: stream.search_range,
        update_factor: stream.update_factor,
        texture_layers: stream.layers,
        discard_srls: parse_list(&stream.discard_srls)
            .context("parsing --discard-srls")?,
        fail_level: if cli.strict {
            log::Level::Warn
        } else {
            log::Level::Error
        },
        ..Params::default()
    })
}

pub fn parse_list(list: &str) -> Result<Vec<usize>> {
    list.split(',')
        .map(|v| {
            v.trim()
                .parse::<usize>()
                .with_context(|| format!("invalid entry {v:?}"))
        })
        .collect()
}

fn load_gain_table(path: &Path) -> Result<Vec<Vec<usize>>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading gain table {}", path.display()))?;
    let file: GainTableFile =
        serde_yaml_ng::from_str(&text).context("parsing gain table YAML")?;
    Ok(file.schedule)
}

/// One bar over the per-GOP drive loop.
pub struct GopProgress {
    bar: ProgressBar,
}

impl GopProgress {
    pub fn new(multi: &MultiProgress) -> Self {
        let bar = multi.add(ProgressBar::no_length());
        bar.set_style(
            ProgressStyle::with_template("{spinner} GOP {pos}/{len} [{elapsed_precise}] {msg}")
                .expect("valid template"),
        );
        Self { bar }
    }
}

impl ProgressSink for GopProgress {
    fn begin(&self, total_gops: usize) {
        self.bar.set_length(total_gops as u64);
    }

    fn gop_done(&self, _igop: usize) {
        self.bar.inc(1);
    }

    fn finish(&self) {
        self.bar.finish_with_message("done");
    }
}
