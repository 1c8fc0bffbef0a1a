//! Plain-text run artifacts.
//!
//! Every run appends to a family of files keyed by its configuration
//! signature: a per-candidate detail log, the sorted evaluation log the
//! heuristics promote it to, the optimized monotone-schedule log, the raw
//! averages dump and the gnuplot-ready curve file, plus the SNR side logs.

use std::fs;
use std::path::PathBuf;

use anyhow::Result;

use crate::params::{MAX_RATE, Params};
use crate::scope::Scope;
use crate::workspace::Workspace;

/// Configuration signature the artifact files are keyed by.
pub fn signature(params: &Params) -> String {
    let caps = params
        .complete_layers()
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(",");
    let reduces = params
        .discard_srls
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join("");
    if params.brc >= MAX_RATE {
        format!("info_{}_{}.{}", params.trls, caps, reduces)
    } else {
        format!("info_{}_{:.0}_{}.{}", params.trls, params.brc, caps, reduces)
    }
}

pub struct Reporter {
    ws: Workspace,
    signature: String,
    gops: usize,
}

impl Reporter {
    pub fn new(ws: Workspace, params: &Params) -> Self {
        Self {
            ws,
            signature: signature(params),
            gops: params.gops,
        }
    }

    fn path(&self, suffix: &str) -> PathBuf {
        self.ws.base_file(&format!("{}{}", self.signature, suffix))
    }

    fn scope_tag(&self, scope: &Scope) -> String {
        match scope {
            Scope::Whole => format!("_{}gops", self.gops),
            Scope::Gop(igop) => format!("_gop{}of{}", igop, self.gops),
        }
    }

    /// Removes a previous run's detail log so the new run starts clean.
    pub fn reset_detail(&self, scope: &Scope) {
        let tag = self.scope_tag(scope);
        let _ = fs::remove_file(self.path(&format!("{tag}_detail")));
    }

    /// One line per evaluated candidate.
    pub fn detail(&self, scope: &Scope, line: &str) -> Result<()> {
        let tag = self.scope_tag(scope);
        self.ws
            .append_line(&self.path(&format!("{tag}_detail")), line)
    }

    /// Renames the detail log to the evaluation log before the sorted
    /// results are appended to it.
    pub fn promote_detail_to_evaluations(&self, scope: &Scope) -> Result<()> {
        let tag = self.scope_tag(scope);
        let detail = self.path(&format!("{tag}_detail"));
        let evaluations = self.path(&format!("{tag}_evaluations"));
        if detail.exists() {
            fs::rename(&detail, &evaluations)?;
        }
        Ok(())
    }

    pub fn evaluations(&self, scope: &Scope, line: &str) -> Result<()> {
        let tag = self.scope_tag(scope);
        self.ws
            .append_line(&self.path(&format!("{tag}_evaluations")), line)
    }

    /// The monotone schedule a heuristic settled on.
    pub fn optimized(&self, scope: &Scope, line: &str) -> Result<()> {
        let tag = self.scope_tag(scope);
        self.ws
            .append_line(&self.path(&format!("{tag}_optimized")), line)
    }

    /// Raw aggregator dump.
    pub fn averages(&self, line: &str) -> Result<()> {
        self.ws
            .append_line(&self.path(&format!("_{}gops_averages", self.gops)), line)
    }

    /// Final rate/distortion curve, one `rate\tdistortion` pair per line.
    pub fn gnuplot(&self, line: &str) -> Result<()> {
        self.ws.append_line(
            &self.path(&format!("_{}gops_averages_gnuplot", self.gops)),
            line,
        )
    }

    /// Which file pair every measurement compared.
    pub fn snr_files(&self, line: &str) -> Result<()> {
        self.ws
            .append_line(&self.ws.base_file("snr_files.log"), line)
    }

    /// Per-frame distortion breakdown for one GOP.
    pub fn snr_frames(&self, igop: usize, text: &str) -> Result<()> {
        let path = self.ws.base_file(&format!("snr_frames_gop{igop}.log"));
        for line in text.lines() {
            self.ws.append_line(&path, line)?;
        }
        Ok(())
    }
}
